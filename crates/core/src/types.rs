/// All database primary keys are PostgreSQL BIGSERIAL.
///
/// Client-side optimistic temporary ids are drawn from the negative half of
/// this space; real ids are always positive, so the two can never collide.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
