/// Utility functions for timestamps and filename formatting
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::format_description::FormatItem;
use time::{OffsetDateTime, UtcOffset};

const LOG_FORMAT: &[FormatItem<'static>] =
    format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
const CLOCK_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
const FILE_STAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

/// Current wall-clock time as fractional seconds since the Unix epoch
pub fn now_secs() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}

/// Local offset when the platform can report it safely, UTC otherwise
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Convert epoch seconds to a date time in the local offset.
pub fn datetime_from_secs(secs: f64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos((secs * 1e9) as i128)
        .ok()
        .map(|dt| dt.to_offset(local_offset()))
}

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format.
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    dt.format(LOG_FORMAT).unwrap_or_else(|_| dt.to_string())
}

/// HH:MM:SS clock used in the live status line
pub fn format_clock(secs: f64) -> String {
    datetime_from_secs(secs)
        .and_then(|dt| dt.format(CLOCK_FORMAT).ok())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// RFC 3339 rendering of epoch seconds, used in export files
pub fn format_rfc3339(secs: f64) -> String {
    datetime_from_secs(secs)
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| secs.to_string())
}

/// YYYYMMDD_HHMMSS stamp used in output filenames
pub fn file_stamp(dt: &OffsetDateTime) -> String {
    dt.format(FILE_STAMP_FORMAT).unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

/// Arithmetic mean, None for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn file_stamp_is_compact() {
        let dt = datetime!(2024-01-05 07:08:09 UTC);
        assert_eq!(file_stamp(&dt), "20240105_070809");
    }

    #[test]
    fn format_datetime_matches_log_layout() {
        let dt = datetime!(2024-01-05 07:08:09 UTC);
        assert_eq!(format_datetime(&dt), "05.01.2024 - 07:08:09");
    }

    #[test]
    fn rfc3339_parses_back_to_same_instant() {
        let secs = 1_700_000_000.0;
        let text = format_rfc3339(secs);
        let parsed = OffsetDateTime::parse(&text, &Rfc3339).unwrap();
        assert_eq!(parsed.unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[10.0, 20.0, 30.0]), Some(20.0));
    }
}
