//! Shared id, time and media-position aliases.

/// Session and document ids come from the external CRUD layer (BIGSERIAL).
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Media positions and durations, in seconds.
pub type Seconds = f64;
