//! SSRF-safe URL validation.
//!
//! Rejects non-HTTP schemes and any host — literal or resolved via DNS —
//! that falls into a private, link-local, carrier-NAT, benchmark, or cloud
//! metadata range. DNS *failures* are permitted; an unresolvable host will
//! simply fail at fetch time.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::error::{CoreError, Result};

/// IPv4 ranges that are never fetchable.
const BLOCKED_V4: &[(Ipv4Addr, u32)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(100, 64, 0, 0), 10),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 0, 0, 0), 24),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(198, 18, 0, 0), 15),
];

/// Returns true when `ip` must not be fetched. Loopback is exempted only when
/// `allow_localhost` is set (development mode).
pub fn is_blocked_ip(ip: IpAddr, allow_localhost: bool) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            if allow_localhost && v4.is_loopback() {
                return false;
            }
            BLOCKED_V4.iter().any(|&(net, prefix)| v4_in(v4, net, prefix))
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_blocked_ip(IpAddr::V4(mapped), allow_localhost);
            }
            if allow_localhost && v6 == Ipv6Addr::LOCALHOST {
                return false;
            }
            v6 == Ipv6Addr::LOCALHOST
        }
    }
}

fn v4_in(ip: Ipv4Addr, net: Ipv4Addr, prefix: u32) -> bool {
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    (u32::from(ip) & mask) == (u32::from(net) & mask)
}

/// Parse and validate a URL without DNS resolution (literal hosts only).
///
/// Used by the synchronous browser-interception path; named hosts pass and
/// are caught by [`validate_url`] on the async path.
pub fn validate_url_literal(raw: &str, allow_localhost: bool) -> Result<Url> {
    let parsed = Url::parse(raw).map_err(|e| CoreError::validation(format!("invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(CoreError::security(format!(
                "URL scheme '{scheme}' is not permitted (http/https only)"
            )));
        }
    }

    match parsed.host() {
        Some(Host::Ipv4(ip)) if is_blocked_ip(IpAddr::V4(ip), allow_localhost) => {
            return Err(CoreError::security(format!("address {ip} is in a blocked range")));
        }
        Some(Host::Ipv6(ip)) if is_blocked_ip(IpAddr::V6(ip), allow_localhost) => {
            return Err(CoreError::security(format!("address {ip} is in a blocked range")));
        }
        None => return Err(CoreError::validation("URL has no host")),
        _ => {}
    }

    Ok(parsed)
}

/// Full validation: literal checks plus A-record resolution for named hosts.
pub async fn validate_url(raw: &str, allow_localhost: bool) -> Result<Url> {
    let parsed = validate_url_literal(raw, allow_localhost)?;

    if let Some(Host::Domain(domain)) = parsed.host() {
        let port = parsed.port_or_known_default().unwrap_or(80);
        // DNS failure is not a rejection — the fetch itself will fail.
        if let Ok(addrs) = tokio::net::lookup_host((domain, port)).await {
            for addr in addrs {
                if is_blocked_ip(addr.ip(), allow_localhost) {
                    return Err(CoreError::security(format!(
                        "host '{domain}' resolves to blocked address {}",
                        addr.ip()
                    )));
                }
            }
        }
    }

    Ok(parsed)
}

/// Suffix match against a configured domain list (`example.com` matches
/// `example.com` and `sub.example.com`).
pub fn domain_in_list(host: &str, list: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    list.iter().any(|entry| {
        let entry = entry.to_ascii_lowercase();
        host == entry || host.ends_with(&format!(".{entry}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_blocked() {
        let err = validate_url_literal("http://127.0.0.1/admin", false).unwrap_err();
        assert!(err.is_security());
    }

    #[test]
    fn metadata_endpoint_blocked() {
        assert!(validate_url_literal("http://169.254.169.254/latest/meta-data", false).is_err());
    }

    #[test]
    fn private_ranges_blocked() {
        for bad in [
            "http://10.0.0.1/",
            "http://172.20.1.1/",
            "http://192.168.0.1/",
            "http://100.64.1.1/",
            "http://198.18.0.5/",
            "http://0.0.0.0/",
            "http://192.0.0.10/",
        ] {
            assert!(validate_url_literal(bad, false).is_err(), "{bad} should be blocked");
        }
    }

    #[test]
    fn ipv6_loopback_blocked() {
        assert!(validate_url_literal("http://[::1]:8080/", false).is_err());
    }

    #[test]
    fn mapped_v4_loopback_blocked() {
        assert!(validate_url_literal("http://[::ffff:127.0.0.1]/", false).is_err());
    }

    #[test]
    fn non_http_schemes_rejected() {
        assert!(validate_url_literal("file:///etc/passwd", false).is_err());
        assert!(validate_url_literal("gopher://x", false).is_err());
        assert!(validate_url_literal("ftp://example.com/", false).is_err());
    }

    #[test]
    fn public_literal_allowed() {
        assert!(validate_url_literal("https://93.184.216.34/", false).is_ok());
    }

    #[test]
    fn localhost_allowed_in_dev_mode() {
        assert!(validate_url_literal("http://127.0.0.1:3000/", true).is_ok());
        assert!(validate_url_literal("http://[::1]:3000/", true).is_ok());
    }

    #[tokio::test]
    async fn named_host_with_failing_dns_passes() {
        // Resolution failure must not reject — the fetch will fail on its own.
        let r = validate_url("http://nonexistent-host-zz-for-tests.invalid/", false).await;
        assert!(r.is_ok());
    }

    #[test]
    fn domain_list_suffix_semantics() {
        let list = vec!["example.com".to_string()];
        assert!(domain_in_list("example.com", &list));
        assert!(domain_in_list("api.example.com", &list));
        assert!(!domain_in_list("notexample.com", &list));
    }
}
