//! Extract "retry after" hints from 429 responses.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

static DURATION_REGEX: OnceLock<Regex> = OnceLock::new();
static TEXT_HINT_REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();

fn duration_regex() -> &'static Regex {
    DURATION_REGEX.get_or_init(|| {
        Regex::new(r"^\s*(?:(\d+)\s*h)?\s*(?:(\d+)\s*m(?:in)?)?\s*(?:(\d+(?:\.\d+)?)\s*s)?\s*(?:(\d+(?:\.\d+)?)\s*ms)?\s*$")
            .expect("Duration regex is valid")
    })
}

/// Free-text phrasings seen in Google error messages, each capturing seconds.
fn text_hint_regexes() -> &'static [Regex] {
    TEXT_HINT_REGEXES.get_or_init(|| {
        [
            r"(?i)(?:try again|retry|reset) in (\d+)\s*s(?:econds?)?\b",
            r"(?i)retry after (\d+) seconds?",
            r"(?i)quota will reset in (\d+) seconds?",
            r"\(wait (\d+)s\)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("Retry hint regex is valid"))
        .collect()
    })
}

/// Parse Google-style durations: `"12s"`, `"1.5s"`, `"1h2m3s"`, `"250ms"`.
/// Fractions round up to the next whole second.
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let caps = duration_regex().captures(s)?;
    if (1..=4).all(|i| caps.get(i).is_none()) {
        return None;
    }

    let hours = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok()).unwrap_or(0);
    let minutes = caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok()).unwrap_or(0);
    let seconds = caps.get(3).and_then(|m| m.as_str().parse::<f64>().ok()).unwrap_or(0.0);
    let millis = caps.get(4).and_then(|m| m.as_str().parse::<f64>().ok()).unwrap_or(0.0);

    // `as` saturates for out-of-range floats
    let fractional = (seconds + millis / 1000.0).ceil() as u64;
    let total = hours
        .saturating_mul(3600)
        .saturating_add(minutes.saturating_mul(60))
        .saturating_add(fractional);
    Some(Duration::from_secs(total))
}

/// Hint from the `Retry-After` header (delta-seconds form only).
pub fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Hint carried by a Google error body.
///
/// Checks `google.rpc.RetryInfo.retryDelay` and `ErrorInfo.metadata.quotaResetDelay`
/// in `error.details`, then falls back to phrases in the message text.
pub fn parse_retry_time_from_body(body: &str) -> Option<Duration> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
            if let Some(delay) = hint_from_details(&json) {
                return Some(delay);
            }
        }
    }

    text_hint_regexes().iter().find_map(|re| {
        re.captures(body)
            .and_then(|caps| caps[1].parse::<u64>().ok())
            .map(Duration::from_secs)
    })
}

fn hint_from_details(json: &Value) -> Option<Duration> {
    let error = match json {
        Value::Array(items) => items.first()?.get("error")?,
        _ => json.get("error")?,
    };
    let details = error.get("details")?.as_array()?;

    details.iter().find_map(|detail| {
        detail
            .get("retryDelay")
            .and_then(Value::as_str)
            .or_else(|| {
                detail.get("metadata").and_then(|m| m.get("quotaResetDelay")).and_then(Value::as_str)
            })
            .and_then(parse_duration_string)
    })
}

/// Combined hint: header first, then body.
pub fn retry_hint(retry_after_header: Option<&str>, body: &str) -> Option<Duration> {
    retry_after_header.and_then(parse_retry_after_header).or_else(|| parse_retry_time_from_body(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration_string("12s"), Some(Duration::from_secs(12)));
        assert_eq!(parse_duration_string("1.2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration_string("1h2m3s"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_duration_string("250ms"), Some(Duration::from_secs(1)));
        assert_eq!(parse_duration_string("soon"), None);
        assert_eq!(parse_duration_string(""), None);
    }

    #[test]
    fn test_huge_values_saturate() {
        assert_eq!(
            parse_duration_string("9999999999999999999h"),
            Some(Duration::from_secs(u64::MAX))
        );
        assert_eq!(
            parse_retry_after_header("100000000000000000"),
            Some(Duration::from_secs(100_000_000_000_000_000))
        );
    }

    #[test]
    fn test_retry_info_detail() {
        let body = r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED",
            "details":[
                {"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"RATE_LIMIT_EXCEEDED"},
                {"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"37s"}
            ]}}"#;
        assert_eq!(parse_retry_time_from_body(body), Some(Duration::from_secs(37)));
    }

    #[test]
    fn test_quota_reset_delay_metadata() {
        let body = r#"[{"error":{"code":429,"details":[{"metadata":{"quotaResetDelay":"1m30.5s"}}]}}]"#;
        assert_eq!(parse_retry_time_from_body(body), Some(Duration::from_secs(91)));
    }

    #[test]
    fn test_text_fallbacks() {
        assert_eq!(
            parse_retry_time_from_body("Quota exceeded, please retry after 20 seconds"),
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            parse_retry_time_from_body("Rate limited (wait 5s)"),
            Some(Duration::from_secs(5))
        );
        assert_eq!(parse_retry_time_from_body("Too many requests"), None);
    }

    #[test]
    fn test_header_takes_precedence() {
        assert_eq!(retry_hint(Some("15"), "retry after 99 seconds"), Some(Duration::from_secs(15)));
        assert_eq!(
            retry_hint(Some("Wed, 21 Oct 2015 07:28:00 GMT"), "retry after 99 seconds"),
            Some(Duration::from_secs(99))
        );
    }
}
