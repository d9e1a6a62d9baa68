//! Repository for the `users` table.

use sqlx::PgPool;

use crate::models::user::User;

const COLUMNS: &str = "id, display_name, email, is_active, can_receive_leads, created_at, updated_at";

/// Provides lookups of users that can own leads.
pub struct UserRepo;

impl UserRepo {
    pub async fn create(pool: &PgPool, display_name: &str, email: &str) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (display_name, email) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(display_name)
            .bind(email)
            .fetch_one(pool)
            .await
    }

    /// Active users eligible for lead assignment, by name.
    pub async fn list_assignable(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM users \
             WHERE is_active AND can_receive_leads \
             ORDER BY display_name ASC, id ASC"
        );
        sqlx::query_as::<_, User>(&query).fetch_all(pool).await
    }
}
