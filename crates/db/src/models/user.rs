//! Models for the `users` table.

use leadimport_core::lead::AssignableUser;
use leadimport_core::types::{Timestamp, UserId};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub is_active: bool,
    pub can_receive_leads: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<User> for AssignableUser {
    fn from(user: User) -> Self {
        AssignableUser {
            id: user.id,
            display_name: user.display_name,
            email: user.email,
        }
    }
}
