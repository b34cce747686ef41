//! Input resolution: turn a user-supplied string into a fetchable URL.
//!
//! A bare `example.com/page` is accepted and becomes
//! `https://example.com/page`; anything whose scheme is not http(s), or
//! that has no host, is rejected before any network activity.

use crate::error::DeclutterError;
use tracing::debug;
use url::Url;

/// A validated absolute http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    url: Url,
}

impl TargetUrl {
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Host name without port, e.g. `www.example.com`.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

impl std::fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Check if the input string already carries an http(s) scheme.
pub fn is_url(input: &str) -> bool {
    let lower = input.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Validate `input`, prefixing `https://` when no scheme is present.
pub fn resolve_url(input: &str) -> Result<TargetUrl, DeclutterError> {
    let trimmed = input.trim();
    let invalid = |reason: String| DeclutterError::InvalidUrl {
        input: input.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("empty input".into()));
    }

    let candidate = if is_url(trimmed) || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".into()));
    }

    debug!("Resolved input URL: {}", url);
    Ok(TargetUrl { url })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/a"));
        assert!(is_url("HTTP://example.com"));
        assert!(!is_url("example.com"));
        assert!(!is_url("ftp://example.com"));
        assert!(!is_url(""));
    }

    #[test]
    fn bare_host_gets_https() {
        let u = resolve_url("example.com/blog/post").unwrap();
        assert_eq!(u.as_str(), "https://example.com/blog/post");
        assert_eq!(u.host(), "example.com");
    }

    #[test]
    fn explicit_http_kept() {
        let u = resolve_url("  http://www.example.org/  ").unwrap();
        assert_eq!(u.as_str(), "http://www.example.org/");
        assert_eq!(u.host(), "www.example.org");
    }

    #[test]
    fn other_schemes_rejected() {
        let err = resolve_url("ftp://example.com/file").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme 'ftp'"), "{err}");
    }

    #[test]
    fn garbage_rejected() {
        assert!(resolve_url("").is_err());
        assert!(resolve_url("https://").is_err());
        assert!(resolve_url("http://exa mple.com").is_err());
    }
}
