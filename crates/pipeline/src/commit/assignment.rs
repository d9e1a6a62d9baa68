//! Owner assignment for leads created by an import.

use std::collections::{BTreeMap, HashMap};

use leadimport_core::importer::AssignmentConfig;
use leadimport_core::lead::AssignableUser;
use leadimport_core::lead_store::{LeadStore, StoreError};
use leadimport_core::normalize::match_key;
use leadimport_core::types::UserId;

#[derive(Debug)]
enum Strategy {
    None,
    RoundRobin(Vec<UserId>),
    ByColumn {
        column: String,
        users: HashMap<String, UserId>,
    },
}

/// Picks the owner of each created lead.
///
/// The round-robin position is shared by every lead of the job.
#[derive(Debug)]
pub struct Assigner {
    strategy: Strategy,
    next: usize,
}

impl Assigner {
    /// Build an assigner, fetching assignable users once when the
    /// configuration looks owners up by name.
    pub async fn prepare(store: &dyn LeadStore, config: &AssignmentConfig) -> Result<Self, StoreError> {
        let users = match config {
            AssignmentConfig::ByColumn { .. } => store.list_assignable_users().await?,
            _ => Vec::new(),
        };
        Ok(Self::new(config, &users))
    }

    pub fn new(config: &AssignmentConfig, users: &[AssignableUser]) -> Self {
        let strategy = match config {
            AssignmentConfig::None => Strategy::None,
            AssignmentConfig::RoundRobin { user_ids } if !user_ids.is_empty() => {
                Strategy::RoundRobin(user_ids.clone())
            }
            AssignmentConfig::RoundRobin { .. } => Strategy::None,
            AssignmentConfig::ByColumn { column } => {
                let mut by_name = HashMap::new();
                // Display names take precedence over emails.
                for user in users {
                    by_name.entry(match_key(&user.display_name)).or_insert(user.id);
                }
                for user in users {
                    by_name.entry(match_key(&user.email)).or_insert(user.id);
                }
                Strategy::ByColumn {
                    column: column.clone(),
                    users: by_name,
                }
            }
        };
        Self { strategy, next: 0 }
    }

    /// Owner for the next created lead, given its raw cell values.
    pub fn assign(&mut self, raw_data: &BTreeMap<String, String>) -> Option<UserId> {
        match &self.strategy {
            Strategy::None => None,
            Strategy::RoundRobin(ids) => {
                let id = ids[self.next % ids.len()];
                self.next += 1;
                Some(id)
            }
            Strategy::ByColumn { column, users } => {
                let value = raw_data.get(column).or_else(|| {
                    raw_data
                        .iter()
                        .find(|(header, _)| header.eq_ignore_ascii_case(column))
                        .map(|(_, v)| v)
                })?;
                users.get(&match_key(value)).copied()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(name: &str, email: &str) -> AssignableUser {
        AssignableUser {
            id: Uuid::new_v4(),
            display_name: name.into(),
            email: email.into(),
        }
    }

    #[test]
    fn round_robin_cycles_across_calls() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut assigner = Assigner::new(&AssignmentConfig::RoundRobin { user_ids: vec![a, b] }, &[]);
        let raw = BTreeMap::new();
        let picks: Vec<_> = (0..5).map(|_| assigner.assign(&raw)).collect();
        assert_eq!(picks, vec![Some(a), Some(b), Some(a), Some(b), Some(a)]);
    }

    #[test]
    fn by_column_matches_name_or_email_ignoring_case() {
        let alice = user("Alice Roy", "alice@x.com");
        let bob = user("Bob Martin", "bob@x.com");
        let mut assigner = Assigner::new(
            &AssignmentConfig::ByColumn { column: "Owner".into() },
            &[alice.clone(), bob.clone()],
        );

        let raw = |v: &str| BTreeMap::from([("owner".to_string(), v.to_string())]);
        assert_eq!(assigner.assign(&raw(" alice roy ")), Some(alice.id));
        assert_eq!(assigner.assign(&raw("BOB@X.COM")), Some(bob.id));
        assert_eq!(assigner.assign(&raw("Carol")), None);
        assert_eq!(assigner.assign(&BTreeMap::new()), None);
    }

    #[test]
    fn none_assigns_nobody() {
        let mut assigner = Assigner::new(&AssignmentConfig::None, &[]);
        assert_eq!(assigner.assign(&BTreeMap::new()), None);
    }
}
