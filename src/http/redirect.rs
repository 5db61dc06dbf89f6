//! Redirect following rules.
//!
//! # Rules
//! - 301/302: POST becomes GET, body dropped
//! - 303: everything but HEAD becomes GET, body dropped
//! - 307/308: method and body preserved
//! - A 3xx without `Location` is a final response
//! - Host override survives a hop only for relative `Location` values
//! - Credentials are not forwarded to foreign hosts
//! - No `Referer` when going from `https` to `http`

use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use url::Url;

use crate::error::Error;

/// Default limit on followed redirects.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Bytes of an intermediate redirect body read before it is released.
pub(crate) const MAX_DRAIN_BYTES: usize = 2 << 10;

/// How the next request of a redirect chain is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    pub method: Method,
    pub keep_body: bool,
}

/// Method and body handling for `status`, or `None` when it does not redirect.
pub fn next_hop(status: StatusCode, method: &Method) -> Option<NextHop> {
    match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => Some(NextHop {
            method: if *method == Method::POST {
                Method::GET
            } else {
                method.clone()
            },
            keep_body: false,
        }),
        StatusCode::SEE_OTHER => Some(NextHop {
            method: if *method == Method::HEAD {
                Method::HEAD
            } else {
                Method::GET
            },
            keep_body: false,
        }),
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => Some(NextHop {
            method: method.clone(),
            keep_body: true,
        }),
        _ => None,
    }
}

/// The `Location` header, if present and non-empty.
pub fn location(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Resolve `location` against the URL that produced it.
pub fn resolve(base: &Url, location: &str) -> Result<Url, Error> {
    let next = base.join(location).map_err(|e| Error::InvalidRedirect {
        location: location.to_string(),
        reason: e.to_string(),
    })?;

    check_scheme(next)
}

/// Pass `url` through if the transport can reach it (`http` or `https`).
pub fn check_scheme(url: Url) -> Result<Url, Error> {
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::UnsupportedScheme(other.to_string())),
    }
}

/// Whether `location` is a relative reference (no scheme).
pub fn is_relative(location: &str) -> bool {
    matches!(
        Url::parse(location),
        Err(url::ParseError::RelativeUrlWithoutBase)
    )
}

/// Headers that carry credentials.
pub fn is_sensitive(name: &HeaderName) -> bool {
    *name == header::AUTHORIZATION
        || *name == header::WWW_AUTHENTICATE
        || *name == header::COOKIE
        || name.as_str() == "cookie2"
}

/// Whether credentials set for `initial` may be sent to `dest`.
///
/// True when `dest` is `initial` or one of its subdomains.
pub fn may_forward_credentials(initial: &str, dest: &str) -> bool {
    let initial = initial.to_ascii_lowercase();
    let dest = dest.to_ascii_lowercase();
    if dest == initial {
        return true;
    }
    dest.strip_suffix(initial.as_str())
        .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Value for the `Referer` header of the hop from `previous` to `next`.
///
/// `None` when the chain downgrades from `https` to `http`.
pub fn referer(previous: &Url, next: &Url) -> Option<String> {
    if previous.scheme() == "https" && next.scheme() == "http" {
        return None;
    }
    let mut url = previous.clone();
    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.set_fragment(None);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn post_becomes_get_on_found() {
        let hop = next_hop(StatusCode::FOUND, &Method::POST).unwrap();
        assert_eq!(hop.method, Method::GET);
        assert!(!hop.keep_body);

        let hop = next_hop(StatusCode::MOVED_PERMANENTLY, &Method::PUT).unwrap();
        assert_eq!(hop.method, Method::PUT);
        assert!(!hop.keep_body);
    }

    #[test]
    fn see_other_keeps_head() {
        assert_eq!(
            next_hop(StatusCode::SEE_OTHER, &Method::HEAD).unwrap().method,
            Method::HEAD
        );
        assert_eq!(
            next_hop(StatusCode::SEE_OTHER, &Method::DELETE).unwrap().method,
            Method::GET
        );
    }

    #[test]
    fn temporary_and_permanent_preserve_request() {
        for status in [StatusCode::TEMPORARY_REDIRECT, StatusCode::PERMANENT_REDIRECT] {
            let hop = next_hop(status, &Method::POST).unwrap();
            assert_eq!(hop.method, Method::POST);
            assert!(hop.keep_body);
        }
    }

    #[test]
    fn other_statuses_do_not_redirect() {
        assert!(next_hop(StatusCode::NOT_MODIFIED, &Method::GET).is_none());
        assert!(next_hop(StatusCode::MULTIPLE_CHOICES, &Method::GET).is_none());
        assert!(next_hop(StatusCode::OK, &Method::GET).is_none());
    }

    #[test]
    fn location_requires_non_empty_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(location(&headers), None);

        headers.insert(header::LOCATION, HeaderValue::from_static(""));
        assert_eq!(location(&headers), None);

        headers.insert(header::LOCATION, HeaderValue::from_static("/next"));
        assert_eq!(location(&headers), Some("/next"));
    }

    #[test]
    fn resolves_relative_and_checks_scheme() {
        let base = Url::parse("http://example.com/a/b?x=1").unwrap();
        assert_eq!(
            resolve(&base, "c").unwrap().as_str(),
            "http://example.com/a/c"
        );
        assert_eq!(
            resolve(&base, "//other.test/z").unwrap().as_str(),
            "http://other.test/z"
        );
        assert_eq!(
            resolve(&base, "https://example.com/").unwrap().as_str(),
            "https://example.com/"
        );
        assert!(matches!(
            resolve(&base, "ftp://example.com/"),
            Err(Error::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn relative_detection() {
        assert!(is_relative("/path"));
        assert!(is_relative("next?x=1"));
        assert!(!is_relative("http://example.com/"));
    }

    #[test]
    fn credentials_follow_subdomains_only() {
        assert!(may_forward_credentials("example.com", "example.com"));
        assert!(may_forward_credentials("example.com", "api.Example.com"));
        assert!(!may_forward_credentials("example.com", "badexample.com"));
        assert!(!may_forward_credentials("api.example.com", "example.com"));
    }

    #[test]
    fn sensitive_headers() {
        assert!(is_sensitive(&header::AUTHORIZATION));
        assert!(is_sensitive(&HeaderName::from_static("cookie2")));
        assert!(!is_sensitive(&header::USER_AGENT));
    }

    #[test]
    fn referer_strips_credentials_and_fragment() {
        let url = Url::parse("http://user:pw@example.com/p?q=1#frag").unwrap();
        let next = Url::parse("http://example.com/next").unwrap();
        assert_eq!(
            referer(&url, &next).as_deref(),
            Some("http://example.com/p?q=1")
        );
    }

    #[test]
    fn referer_withheld_on_https_downgrade() {
        let secure = Url::parse("https://example.com/p").unwrap();
        let plain = Url::parse("http://example.com/q").unwrap();
        assert_eq!(referer(&secure, &plain), None);
        assert_eq!(
            referer(&plain, &secure).as_deref(),
            Some("http://example.com/q")
        );
    }
}
