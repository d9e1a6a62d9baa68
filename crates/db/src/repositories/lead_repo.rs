//! Repository for the `leads` table.

use leadimport_core::field::FieldKey;
use leadimport_core::lead::{LeadUpdate, NewLead};
use leadimport_core::types::LeadId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::lead::Lead;

/// Column list for `leads` SELECT queries.
const COLUMNS: &str = "\
    id, first_name, last_name, email, phone, company, job_title, \
    address, city, postal_code, country, website, notes, source, \
    external_id, status, assigned_to, import_job_id, created_at, updated_at";

/// Column list for INSERT. Field columns follow `FieldKey::ALL` order.
const INSERT_COLUMNS: &str = "\
    id, first_name, last_name, email, phone, company, job_title, \
    address, city, postal_code, country, website, notes, source, \
    external_id, status, assigned_to, import_job_id";

const INSERT_PARAMS_PER_ROW: usize = 4 + FieldKey::ALL.len();

/// Provides lookup, insert and update operations for leads.
pub struct LeadRepo;

impl LeadRepo {
    pub async fn find_by_id(pool: &PgPool, id: LeadId) -> Result<Option<Lead>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM leads WHERE id = $1");
        sqlx::query_as::<_, Lead>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Leads whose `field` matches one of `values`, ignoring case.
    ///
    /// Oldest leads come first.
    pub async fn find_by_field_values(
        pool: &PgPool,
        field: FieldKey,
        values: &[String],
    ) -> Result<Vec<Lead>, sqlx::Error> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let lowered: Vec<String> = values.iter().map(|v| v.to_lowercase()).collect();
        let query = format!(
            "SELECT {COLUMNS} FROM leads WHERE LOWER({}) = ANY($1) ORDER BY created_at ASC, id ASC",
            field.column()
        );
        sqlx::query_as::<_, Lead>(&query)
            .bind(&lowered)
            .fetch_all(pool)
            .await
    }

    /// Insert many leads with one multi-row INSERT.
    ///
    /// Ids are generated here so they can be returned in input order.
    pub async fn batch_insert(pool: &PgPool, leads: &[NewLead]) -> Result<Vec<LeadId>, sqlx::Error> {
        if leads.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<LeadId> = leads.iter().map(|_| Uuid::new_v4()).collect();

        let mut query = format!("INSERT INTO leads ({INSERT_COLUMNS}) VALUES ");
        let mut param_idx = 1usize;
        for i in 0..leads.len() {
            if i > 0 {
                query.push_str(", ");
            }
            query.push('(');
            for p in 0..INSERT_PARAMS_PER_ROW {
                if p > 0 {
                    query.push_str(", ");
                }
                query.push_str(&format!("${param_idx}"));
                param_idx += 1;
            }
            query.push(')');
        }

        let mut q = sqlx::query(&query);
        for (lead, id) in leads.iter().zip(&ids) {
            q = q.bind(*id);
            for field in FieldKey::ALL {
                q = q.bind(lead.fields.get(&field).cloned());
            }
            q = q
                .bind(&lead.status)
                .bind(lead.assigned_to)
                .bind(lead.import_job_id);
        }
        q.execute(pool).await?;

        Ok(ids)
    }

    /// Overwrite the fields present in `update` and return the lead as it
    /// was before. `None` when the lead does not exist.
    ///
    /// The row is locked for the read-then-write so the returned snapshot is
    /// exactly what was replaced.
    pub async fn update_fields(
        pool: &PgPool,
        id: LeadId,
        update: &LeadUpdate,
    ) -> Result<Option<Lead>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let select = format!("SELECT {COLUMNS} FROM leads WHERE id = $1 FOR UPDATE");
        let Some(before) = sqlx::query_as::<_, Lead>(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        if !update.fields.is_empty() {
            let sets: Vec<String> = update
                .fields
                .keys()
                .enumerate()
                .map(|(i, field)| format!("{} = ${}", field.column(), i + 2))
                .collect();
            let query = format!("UPDATE leads SET {} WHERE id = $1", sets.join(", "));
            let mut q = sqlx::query(&query).bind(id);
            for value in update.fields.values() {
                q = q.bind(value);
            }
            q.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(Some(before))
    }

    pub async fn count_for_job(pool: &PgPool, job_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*)::BIGINT FROM leads WHERE import_job_id = $1")
            .bind(job_id)
            .fetch_one(pool)
            .await
    }
}
