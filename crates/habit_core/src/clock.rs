//! Host clock access and timestamp text handling.
//!
//! Engine functions never read the wall clock themselves; callers obtain
//! `now` here once and pass it down.

use crate::error::AppError;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(local_offset())
}

pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, AppError> {
    parse_timestamp_in(raw, local_offset())
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]` or `YYYY-MM-DD` (midnight).
/// Values without an offset are read in `offset`.
pub fn parse_timestamp_in(raw: &str, offset: UtcOffset) -> Result<OffsetDateTime, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("datetime is required"));
    }

    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(parsed.to_offset(offset));
    }

    let with_seconds = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(parsed) = PrimitiveDateTime::parse(trimmed, &with_seconds) {
        return Ok(parsed.assume_offset(offset));
    }

    let without_seconds = format_description!("[year]-[month]-[day] [hour]:[minute]");
    if let Ok(parsed) = PrimitiveDateTime::parse(trimmed, &without_seconds) {
        return Ok(parsed.assume_offset(offset));
    }

    let date_only = format_description!("[year]-[month]-[day]");
    if let Ok(parsed) = Date::parse(trimmed, &date_only) {
        return Ok(parsed.with_time(Time::MIDNIGHT).assume_offset(offset));
    }

    Err(AppError::invalid_input(
        "datetime must be RFC3339, YYYY-MM-DD HH:MM[:SS] or YYYY-MM-DD",
    ))
}

pub fn format_timestamp(at: OffsetDateTime) -> Result<String, AppError> {
    at.format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, parse_timestamp_in};
    use time::UtcOffset;
    use time::macros::{datetime, offset};

    #[test]
    fn parses_rfc3339_and_keeps_instant() {
        let parsed = parse_timestamp_in("2025-12-20T09:00:00Z", offset!(+2)).unwrap();
        assert_eq!(parsed, datetime!(2025-12-20 11:00 +2));
        assert_eq!(parsed.offset(), offset!(+2));
    }

    #[test]
    fn parses_local_forms() {
        let utc = UtcOffset::UTC;
        assert_eq!(
            parse_timestamp_in("2025-12-20 09:30:15", utc).unwrap(),
            datetime!(2025-12-20 09:30:15 UTC)
        );
        assert_eq!(
            parse_timestamp_in("2025-12-20 09:30", utc).unwrap(),
            datetime!(2025-12-20 09:30 UTC)
        );
        assert_eq!(
            parse_timestamp_in(" 2025-12-20 ", utc).unwrap(),
            datetime!(2025-12-20 00:00 UTC)
        );
    }

    #[test]
    fn rejects_blank_and_garbage() {
        assert_eq!(
            parse_timestamp_in("  ", UtcOffset::UTC).unwrap_err().code(),
            "invalid_input"
        );
        assert_eq!(
            parse_timestamp_in("next tuesday", UtcOffset::UTC)
                .unwrap_err()
                .code(),
            "invalid_input"
        );
    }

    #[test]
    fn formats_as_rfc3339() {
        let formatted = format_timestamp(datetime!(2025-12-20 09:00 UTC)).unwrap();
        assert_eq!(formatted, "2025-12-20T09:00:00Z");
    }
}
