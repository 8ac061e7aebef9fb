//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking.
//! Supports both SQLite and PostgreSQL backends.

pub mod context;
pub mod experiment;
pub mod models;
pub mod pool;
pub mod protocol;
pub mod util;

pub use context::DbContext;
pub use experiment::ExperimentRepository;
pub use pool::{DbPool, DieselError};
pub use protocol::ProtocolRepository;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Format a timestamp for storage.
///
/// Fixed-width UTC with nanoseconds, so text ordering matches time ordering
/// and values round-trip exactly.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn format_datetime_opt(dt: Option<&DateTime<Utc>>) -> Option<String> {
    dt.map(format_datetime)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// Parse a stored identifier; a malformed one is a deserialization failure.
pub fn parse_uuid(s: &str) -> Result<Uuid, DieselError> {
    Uuid::parse_str(s).map_err(|e| DieselError::DeserializationError(Box::new(e)))
}

pub fn parse_uuid_opt(s: Option<&str>) -> Result<Option<Uuid>, DieselError> {
    s.map(parse_uuid).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_datetime_round_trip_is_exact() {
        let now = Utc::now();
        assert_eq!(parse_datetime(&format_datetime(&now)), now);
    }

    #[test]
    fn test_datetime_text_orders_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1);
        assert!(format_datetime(&early) < format_datetime(&late));
    }

    #[test]
    fn test_parse_datetime_defaults_to_epoch() {
        assert_eq!(parse_datetime("garbage"), DateTime::UNIX_EPOCH);
        assert_eq!(parse_datetime_opt(Some("garbage".to_string())), None);
    }

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        assert!(parse_uuid("not-a-uuid").is_err());
        assert_eq!(parse_uuid_opt(None).unwrap(), None);
    }
}
