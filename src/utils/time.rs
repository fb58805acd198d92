use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

pub fn elapsed_seconds(start: i64, end: i64) -> i64 {
    end - start
}

/// Seconds since a unix timestamp reported by a client, never negative
pub fn seconds_since(timestamp: i64) -> i64 {
    seconds_since_at(timestamp, current_timestamp())
}

fn seconds_since_at(timestamp: i64, now: i64) -> i64 {
    if timestamp <= 0 {
        return 0;
    }
    elapsed_seconds(timestamp, now).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_timestamp() {
        let ts = current_timestamp();
        // Should be a reasonable timestamp (after 2020-01-01)
        assert!(ts > 1577836800);
        // Should be before 2100-01-01
        assert!(ts < 4102444800);
    }

    #[test]
    fn test_elapsed_seconds() {
        assert_eq!(elapsed_seconds(100, 150), 50);
        assert_eq!(elapsed_seconds(1000, 1000), 0);
        assert_eq!(elapsed_seconds(200, 100), -100);
    }

    #[test]
    fn test_seconds_since_clamps() {
        assert_eq!(seconds_since_at(900, 1000), 100);
        // clock skew between client and host
        assert_eq!(seconds_since_at(1100, 1000), 0);
        // unknown addition date
        assert_eq!(seconds_since_at(0, 1000), 0);
        assert_eq!(seconds_since_at(-1, 1000), 0);
    }
}
