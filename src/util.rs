use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Unix seconds of a file modification time, 0 when unavailable.
pub fn system_time_secs(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Accepts unix seconds or `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return Some(secs);
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Signed amount with an explicit sign, for deltas.
pub fn format_delta(delta: i64) -> String {
    if delta > 0 {
        format!("+{delta}")
    } else {
        delta.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_through_text() {
        let ts = 1_760_000_000;
        assert_eq!(parse_timestamp(&format_timestamp(ts)), Some(ts));
        assert_eq!(parse_timestamp("1760000000"), Some(ts));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn deltas_carry_sign() {
        assert_eq!(format_delta(20), "+20");
        assert_eq!(format_delta(-5), "-5");
        assert_eq!(format_delta(0), "0");
    }
}
