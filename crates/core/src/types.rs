/// Import jobs, import rows and history entries use PostgreSQL BIGSERIAL keys.
pub type DbId = i64;

/// Leads are addressed by UUID (they are exposed to clients and other services).
pub type LeadId = uuid::Uuid;

/// Users that leads can be assigned to.
pub type UserId = uuid::Uuid;

/// 1-based data row number within an uploaded file (header excluded).
pub type RowNumber = i32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
