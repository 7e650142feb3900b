//! Shared `\d+[smhd]` duration-string parsing, used by GitHub Actions gate
//! polling and convergence wall-clock limits.

use std::time::Duration;

/// Parse a duration string like `"30s"`, `"5m"`, `"2h"`, `"1d"`. Returns
/// `default` when the string doesn't match the `\d+[smhd]` grammar.
pub fn parse_duration_spec(spec: &str, default: Duration) -> Duration {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return default;
    }
    let (digits, unit) = trimmed.split_at(trimmed.len() - 1);
    let Ok(value) = digits.parse::<u64>() else {
        return default;
    };
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return default,
    };
    Duration::from_secs(value.saturating_mul(multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration_spec("30s", Duration::from_secs(1)), Duration::from_secs(30));
        assert_eq!(parse_duration_spec("5m", Duration::from_secs(1)), Duration::from_secs(300));
        assert_eq!(parse_duration_spec("2h", Duration::from_secs(1)), Duration::from_secs(7200));
        assert_eq!(parse_duration_spec("1d", Duration::from_secs(1)), Duration::from_secs(86400));
    }

    #[test]
    fn malformed_falls_back_to_default() {
        let default = Duration::from_secs(3600);
        assert_eq!(parse_duration_spec("garbage", default), default);
        assert_eq!(parse_duration_spec("", default), default);
        assert_eq!(parse_duration_spec("10x", default), default);
    }
}
