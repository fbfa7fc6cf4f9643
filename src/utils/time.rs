use chrono::NaiveDateTime;

use crate::utils::error::Result;

/// Bus Tracker timestamps, e.g. `20240815 16:05`.
pub const BUS_FMT: &str = "%Y%m%d %H:%M";

/// Train Tracker timestamps, e.g. `2024-08-15T16:05:21`.
pub const TRAIN_FMT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn parse_bus_timestamp(value: &str) -> Result<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(value, BUS_FMT)?)
}

pub fn parse_train_timestamp(value: &str) -> Result<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(value, TRAIN_FMT)?)
}

/// Whole minutes between the prediction time and the ETA. Negative
/// differences (a train already at the platform) clamp to zero.
pub fn minutes_until(predicted_at: NaiveDateTime, eta: NaiveDateTime) -> i64 {
    (eta - predicted_at).num_minutes().max(0)
}

/// Seconds between the feed timestamp and the prediction time, as the
/// "updated N seconds ago" figure shown next to each arrival.
pub fn seconds_since_update(feed_timestamp: NaiveDateTime, predicted_at: NaiveDateTime) -> i64 {
    (feed_timestamp - predicted_at).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bus_timestamp() {
        let ts = parse_bus_timestamp("20240815 16:05").unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M").to_string(), "2024-08-15 16:05");
    }

    #[test]
    fn parses_train_timestamp() {
        let ts = parse_train_timestamp("2024-08-15T16:05:21").unwrap();
        assert_eq!(ts.format("%H:%M:%S").to_string(), "16:05:21");
    }

    #[test]
    fn rejects_malformed_timestamp() {
        assert!(parse_train_timestamp("tomorrow-ish").is_err());
    }

    #[test]
    fn minutes_until_clamps_negative() {
        let prdt = parse_train_timestamp("2024-08-15T16:05:21").unwrap();
        let arr = parse_train_timestamp("2024-08-15T16:02:00").unwrap();
        assert_eq!(minutes_until(prdt, arr), 0);
        assert_eq!(minutes_until(arr, prdt), 3);
    }
}
