use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Errors that can occur during URL validation.
///
/// These errors cover both parsing failures and the host policy applied
/// before the transport issues a request.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed as an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Which hosts a fetch may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostPolicy {
    /// Reject localhost and private address ranges (SSRF guard).
    #[default]
    PublicOnly,
    /// Accept any host. Used for self-hosted subscription lists and in tests.
    AllowPrivate,
}

/// Validates a URL string before fetching it.
///
/// Always rejects non-HTTP(S) schemes (e.g. `file://`, `ftp://`). Under
/// [`HostPolicy::PublicOnly`] it also rejects:
/// - Localhost addresses (`localhost`, `127.0.0.1`, `::1`)
/// - Private IP ranges (RFC 1918, link-local, unique local IPv6)
///
/// # Examples
///
/// ```
/// use blogroll::util::{validate_url, HostPolicy};
///
/// let url = validate_url("https://example.com/opml.xml", HostPolicy::PublicOnly).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://192.168.1.1/feed", HostPolicy::PublicOnly).is_err());
/// assert!(validate_url("http://192.168.1.1/feed", HostPolicy::AllowPrivate).is_ok());
/// assert!(validate_url("file:///etc/passwd", HostPolicy::AllowPrivate).is_err());
/// ```
pub fn validate_url(url_str: &str, policy: HostPolicy) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if policy == HostPolicy::AllowPrivate {
        return Ok(url);
    }

    let ip = match url.host() {
        Some(Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => {
            return Err(UrlValidationError::Localhost);
        }
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
        _ => return Ok(url),
    };

    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    if is_private_ip(&ip) {
        return Err(UrlValidationError::PrivateIp(ip.to_string()));
    }

    Ok(url)
}

/// RFC 1918, link-local, unspecified, and IPv6 unique-local/link-local.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_accepted() {
        assert!(validate_url("https://example.com/opml.xml", HostPolicy::PublicOnly).is_ok());
        assert!(validate_url("http://blog.example.org/feed", HostPolicy::PublicOnly).is_ok());
        assert!(validate_url("https://example.com:443/feed.xml", HostPolicy::PublicOnly).is_ok());
    }

    #[test]
    fn test_relative_url_rejected() {
        let err = validate_url("/feed.xml", HostPolicy::AllowPrivate).unwrap_err();
        assert!(matches!(err, UrlValidationError::InvalidUrl(_)));
    }

    #[test]
    fn test_invalid_schemes_rejected_under_any_policy() {
        for policy in [HostPolicy::PublicOnly, HostPolicy::AllowPrivate] {
            assert!(validate_url("file:///etc/passwd", policy).is_err());
            assert!(validate_url("ftp://example.com/list.opml", policy).is_err());
        }
    }

    #[test]
    fn test_localhost_rejected_when_public_only() {
        assert!(matches!(
            validate_url("http://localhost/feed", HostPolicy::PublicOnly),
            Err(UrlValidationError::Localhost)
        ));
        assert!(validate_url("http://127.0.0.1/feed", HostPolicy::PublicOnly).is_err());
        assert!(validate_url("http://[::1]/feed", HostPolicy::PublicOnly).is_err());
    }

    #[test]
    fn test_private_ranges_rejected_when_public_only() {
        assert!(validate_url("http://192.168.1.1/feed", HostPolicy::PublicOnly).is_err());
        assert!(validate_url("http://10.0.0.1:3000/feed", HostPolicy::PublicOnly).is_err());
        assert!(validate_url("http://172.16.0.1/feed", HostPolicy::PublicOnly).is_err());
        assert!(validate_url("http://169.254.1.1/feed", HostPolicy::PublicOnly).is_err());
        assert!(validate_url("http://[fe80::1]/feed", HostPolicy::PublicOnly).is_err());
        assert!(validate_url("http://0.0.0.0/feed", HostPolicy::PublicOnly).is_err());
        assert!(validate_url("http://[fd00::1]/feed", HostPolicy::PublicOnly).is_err());
        assert!(validate_url("http://LOCALHOST/feed", HostPolicy::PublicOnly).is_err());
    }

    #[test]
    fn test_allow_private_accepts_loopback() {
        let url = validate_url("http://127.0.0.1:8080/opml", HostPolicy::AllowPrivate).unwrap();
        assert_eq!(url.port(), Some(8080));
    }
}
