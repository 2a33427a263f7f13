//! Backend choice, sticky bucketing and cookie helpers.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Name of the cookie storing the client's bucket value.
pub const BUCKET_COOKIE: &str = "useFrontend";

/// Name of the cookie set by the legacy backend for signed-in users.
pub const AUTHENTICATED_COOKIE: &str = "authenticated";

/// Pattern of a well-formed bucket value. A compile failure rejects every
/// cookie, so clients are simply drawn afresh.
static BUCKET_VALUE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\d(\.\d+)?$"));

/// Which backend serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Legacy,
    Frontend,
}

impl Backend {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Legacy => "legacy",
            Backend::Frontend => "frontend",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing a client's bucket value with the rollout probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingDecision {
    pub use_frontend: bool,
    /// Value in `[0, 1]`, read from the sticky cookie or freshly drawn.
    pub bucket_value: f64,
    pub sticky_cookie_present: bool,
}

impl RoutingDecision {
    /// Decides for `bucket_value` against `probability` (inclusive bound).
    #[must_use]
    pub fn new(bucket_value: f64, probability: f64, sticky_cookie_present: bool) -> Self {
        Self {
            use_frontend: bucket_value <= probability,
            bucket_value,
            sticky_cookie_present,
        }
    }

    #[must_use]
    pub fn backend(&self) -> Backend {
        if self.use_frontend {
            Backend::Frontend
        } else {
            Backend::Legacy
        }
    }

    /// The bucket value to persist in a cookie, if one must be written.
    ///
    /// A decision made from an existing sticky cookie never writes a new one.
    #[must_use]
    pub fn cookie_to_set(&self) -> Option<f64> {
        (!self.sticky_cookie_present).then_some(self.bucket_value)
    }
}

/// Looks up a cookie value by exact name in a `Cookie` header.
///
/// # Examples
///
/// ```
/// use edgeroute_core::routing::cookie_value;
///
/// assert_eq!(cookie_value("b", Some("a=1; b=2")), Some("2"));
/// assert_eq!(cookie_value("b", Some("ab=2")), None);
/// assert_eq!(cookie_value("b", None), None);
/// ```
#[must_use]
pub fn cookie_value<'a>(name: &str, cookie_header: Option<&'a str>) -> Option<&'a str> {
    cookie_header?
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
}

/// Parses a sticky bucket value.
///
/// Accepts a single digit optionally followed by a decimal fraction
/// (`0`, `1`, `0.25`) whose value lies in `[0, 1]`.
#[must_use]
pub fn parse_bucket_value(raw: &str) -> Option<f64> {
    let well_formed = BUCKET_VALUE
        .as_ref()
        .is_ok_and(|pattern| pattern.is_match(raw));
    if !well_formed {
        return None;
    }
    raw.parse::<f64>()
        .ok()
        .filter(|value| (0.0..=1.0).contains(value))
}

/// Renders a `Set-Cookie` header value for the bucket cookie.
#[must_use]
pub fn bucket_cookie(value: f64, cookie_domain: Option<&str>) -> String {
    match cookie_domain {
        Some(domain) => format!("{BUCKET_COOKIE}={value}; path=/; domain=.{domain}"),
        None => format!("{BUCKET_COOKIE}={value}; path=/"),
    }
}

/// Returns `true` when the `Cookie` header marks a signed-in user.
#[must_use]
pub fn is_authenticated(cookie_header: Option<&str>) -> bool {
    cookie_value(AUTHENTICATED_COOKIE, cookie_header) == Some("1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_pattern_compiles() {
        assert!(BUCKET_VALUE.is_ok());
    }

    #[test]
    fn decision_is_inclusive_at_the_threshold() {
        assert!(RoutingDecision::new(0.5, 0.5, false).use_frontend);
        assert!(!RoutingDecision::new(0.75, 0.5, false).use_frontend);
        assert!(RoutingDecision::new(0.0, 0.0, false).use_frontend);
        assert!(!RoutingDecision::new(0.1, 0.0, false).use_frontend);
    }

    #[test]
    fn sticky_decision_writes_no_cookie() {
        let decision = RoutingDecision::new(0.3, 0.5, true);
        assert_eq!(decision.backend(), Backend::Frontend);
        assert_eq!(decision.cookie_to_set(), None);
    }

    #[test]
    fn fresh_decision_writes_its_value() {
        let decision = RoutingDecision::new(0.8, 0.5, false);
        assert_eq!(decision.backend(), Backend::Legacy);
        assert_eq!(decision.cookie_to_set(), Some(0.8));
    }

    #[test]
    fn cookie_value_matches_exact_names_only() {
        let header = Some("xuseFrontend=0.1; useFrontend=0.5; otherCookie=42;");
        assert_eq!(cookie_value("useFrontend", header), Some("0.5"));
        assert_eq!(cookie_value("otherCookie", header), Some("42"));
        assert_eq!(cookie_value("missing", header), None);
    }

    #[test]
    fn cookie_value_returns_first_occurrence() {
        assert_eq!(cookie_value("a", Some("a=1;a=2")), Some("1"));
    }

    #[test]
    fn parses_well_formed_bucket_values() {
        assert_eq!(parse_bucket_value("0"), Some(0.0));
        assert_eq!(parse_bucket_value("1"), Some(1.0));
        assert_eq!(parse_bucket_value("0.25"), Some(0.25));
        assert_eq!(parse_bucket_value("0.123456789"), Some(0.123_456_789));
    }

    #[test]
    fn rejects_malformed_bucket_values() {
        for raw in ["foo", "", ".5", "0.", "-0.5", "10", "5", "1.5", "0.5x", "1e-3", " 0.5"] {
            assert_eq!(parse_bucket_value(raw), None, "accepted {raw:?}");
        }
    }

    #[test]
    fn drawn_values_render_in_accepted_format() {
        for value in [0.0, 0.25, 0.999_999, 1e-9, 0.1 + 0.2] {
            let rendered = value.to_string();
            assert_eq!(parse_bucket_value(&rendered), Some(value), "{rendered}");
        }
    }

    #[test]
    fn bucket_cookie_with_and_without_domain() {
        assert_eq!(bucket_cookie(0.25, None), "useFrontend=0.25; path=/");
        assert_eq!(
            bucket_cookie(0.25, Some("example.org")),
            "useFrontend=0.25; path=/; domain=.example.org"
        );
        assert_eq!(bucket_cookie(1.0, None), "useFrontend=1; path=/");
    }

    #[test]
    fn authenticated_requires_exact_marker() {
        assert!(is_authenticated(Some("authenticated=1")));
        assert!(is_authenticated(Some("a=b; authenticated=1")));
        assert!(!is_authenticated(Some("authenticated=0")));
        assert!(!is_authenticated(Some("notauthenticated=1")));
        assert!(!is_authenticated(None));
    }
}
