//! Origin trust check for donor-facing mutation endpoints
//!
//! The retry endpoint is called from the donation site's frontend. With a
//! configured allowlist, requests must carry an Origin or Referer that
//! matches one of the allowed prefixes. An empty allowlist disables the
//! check, which is the development default.

use http::HeaderMap;

/// True when the request may proceed.
pub fn is_trusted_origin(headers: &HeaderMap, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }

    let origin = header_value(headers, "origin").or_else(|| header_value(headers, "referer"));
    let Some(origin) = origin else {
        return false;
    };

    allowed
        .iter()
        .any(|candidate| matches_origin(&origin, candidate))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn matches_origin(origin: &str, allowed: &str) -> bool {
    let allowed = allowed.trim_end_matches('/');
    if allowed.is_empty() {
        return false;
    }
    let origin_base = origin.trim_end_matches('/');
    // Referer carries a path; an exact origin or an allowed prefix
    // followed by a path separator both count.
    origin_base.eq_ignore_ascii_case(allowed)
        || origin
            .get(..allowed.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(allowed))
            && origin[allowed.len()..].starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn allowlist() -> Vec<String> {
        vec!["https://yip.org.my".to_string()]
    }

    #[test]
    fn empty_allowlist_trusts_everything() {
        assert!(is_trusted_origin(&HeaderMap::new(), &[]));
        assert!(is_trusted_origin(
            &headers_with("origin", "https://evil.example"),
            &[]
        ));
    }

    #[test]
    fn matching_origin_is_trusted() {
        let headers = headers_with("origin", "https://yip.org.my");
        assert!(is_trusted_origin(&headers, &allowlist()));
    }

    #[test]
    fn referer_with_path_matches_prefix() {
        let headers = headers_with("referer", "https://yip.org.my/donate/orphan-care");
        assert!(is_trusted_origin(&headers, &allowlist()));
    }

    #[test]
    fn unlisted_origin_is_refused() {
        let headers = headers_with("origin", "https://evil.example");
        assert!(!is_trusted_origin(&headers, &allowlist()));
    }

    #[test]
    fn prefix_lookalike_host_is_refused() {
        let headers = headers_with("origin", "https://yip.org.my.evil.example");
        assert!(!is_trusted_origin(&headers, &allowlist()));
    }

    #[test]
    fn missing_origin_with_allowlist_is_refused() {
        assert!(!is_trusted_origin(&HeaderMap::new(), &allowlist()));
    }
}
