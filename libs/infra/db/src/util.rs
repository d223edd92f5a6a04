// [libs/infra/db/src/util.rs]
//! Conversión de columnas DATETIME de libSQL (texto) a `DateTime<Utc>`.

use crate::errors::DbError;
use chrono::{DateTime, NaiveDateTime, Utc};

pub fn parse_ts(raw: impl AsRef<str>) -> Result<DateTime<Utc>, DbError> {
    let raw = raw.as_ref();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        })
        .map_err(|e| DbError::MappingError(format!("bad timestamp '{raw}': {e}")))
}

pub fn parse_ts_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    raw.map(parse_ts).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_offset() {
        let parsed = parse_ts("2026-07-28T12:00:00+00:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-07-28T12:00:00+00:00");
    }

    #[test]
    fn parses_sqlite_naive_datetime_as_utc() {
        let parsed = parse_ts("2026-07-28 12:00:00").unwrap();
        assert_eq!(parsed.timestamp(), 1785240000);
    }

    #[test]
    fn rejects_garbage_input() {
        assert!(parse_ts("not-a-timestamp").is_err());
    }

    #[test]
    fn parse_ts_opt_passes_through_none() {
        assert!(parse_ts_opt(None).unwrap().is_none());
    }

    #[test]
    fn parse_ts_opt_propagates_parse_errors() {
        assert!(parse_ts_opt(Some("garbage".into())).is_err());
    }
}
