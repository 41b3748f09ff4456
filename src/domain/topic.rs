//! Topic naming: `<prefix>/<intersection_id>/counts`

use crate::domain::types::UNKNOWN_INTERSECTION;

const COUNTS_SUFFIX: &str = "counts";

/// Topic a sensing agent publishes its counts on
pub fn counts_topic(prefix: &str, intersection_id: &str) -> String {
    format!("{prefix}/{intersection_id}/{COUNTS_SUFFIX}")
}

/// Single-level wildcard filter matching every intersection under `prefix`
pub fn counts_filter(prefix: &str) -> String {
    format!("{prefix}/+/{COUNTS_SUFFIX}")
}

/// Recover the intersection id from a counts topic.
///
/// Returns `None` when the topic does not have the `<prefix>/<id>/...` shape
/// or the id segment is empty.
pub fn parse_intersection(prefix: &str, topic: &str) -> Option<String> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let segment = rest.split('/').next()?;
    if segment.is_empty() {
        return None;
    }
    Some(segment.to_string())
}

/// Like [`parse_intersection`], falling back to the `unknown` identity
pub fn intersection_or_unknown(prefix: &str, topic: &str) -> (String, bool) {
    match parse_intersection(prefix, topic) {
        Some(id) => (id, false),
        None => (UNKNOWN_INTERSECTION.to_string(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_topic() {
        assert_eq!(counts_topic("puthisaalai", "A"), "puthisaalai/A/counts");
        assert_eq!(counts_filter("puthisaalai"), "puthisaalai/+/counts");
    }

    #[test]
    fn test_parse_intersection() {
        assert_eq!(parse_intersection("p", "p/A/counts").as_deref(), Some("A"));
        assert_eq!(parse_intersection("p", "p/north-5/counts").as_deref(), Some("north-5"));
        assert_eq!(parse_intersection("a/b", "a/b/X/counts").as_deref(), Some("X"));
    }

    #[test]
    fn test_parse_malformed_topic() {
        assert!(parse_intersection("p", "p").is_none());
        assert!(parse_intersection("p", "p//counts").is_none());
        assert!(parse_intersection("p", "other/A/counts").is_none());
        assert!(parse_intersection("p", "pA/counts").is_none());
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(intersection_or_unknown("p", "garbage"), ("unknown".to_string(), true));
        assert_eq!(intersection_or_unknown("p", "p/A/counts"), ("A".to_string(), false));
    }
}
