/// Helper utilities for stackcheck

use std::time::Duration;

/// Format duration to a short human-readable string
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let secs = seconds % 60;

    if seconds == 0 {
        format!("{}ms", duration.as_millis())
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Truncate string with ellipsis, respecting char boundaries
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Mask sensitive data (show only first and last N characters)
pub fn mask_sensitive(value: &str, visible_chars: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= visible_chars * 2 {
        "*".repeat(chars.len())
    } else {
        let start: String = chars[..visible_chars].iter().collect();
        let end: String = chars[chars.len() - visible_chars..].iter().collect();
        format!("{}...{}", start, end)
    }
}

/// Keys whose values should never be printed in full
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    ["KEY", "SECRET", "TOKEN", "PASSWORD"].iter().any(|marker| key.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(10)), "10s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m 0s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("connection refused by peer", 13), "connection...");
        assert_eq!(truncate_string("ünïcödé text", 7), "ünïc...");
    }

    #[test]
    fn test_mask_sensitive() {
        assert_eq!(mask_sensitive("hf_abcdefgh1234", 3), "hf_...234");
        assert_eq!(mask_sensitive("short", 3), "*****");
    }

    #[test]
    fn test_is_sensitive_key() {
        assert!(is_sensitive_key("HUGGINGFACE_API_KEY"));
        assert!(is_sensitive_key("db_password"));
        assert!(!is_sensitive_key("REDIS_URL"));
    }
}
