//! Client identity resolution for rate-limit keying.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Derive the rate-limit key for an inbound request.
///
/// Precedence: the first comma-separated entry of `X-Forwarded-For`
/// (trimmed), then `X-Real-IP`, then the transport-level remote address.
/// A non-empty `X-Forwarded-For` always decides the key, even when its
/// first entry trims to the empty string; clients behind a proxy that
/// emits such a header share one bucket rather than being keyed by a
/// later, less trustworthy field. The first-hop proxy is trusted to set
/// these headers correctly; a client talking to the service directly can
/// spoof them. That trust assumption is deliberate and not hardened
/// further here.
pub fn client_key(headers: &HeaderMap, remote_addr: SocketAddr) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if !forwarded.is_empty() {
            let first = forwarded.split(',').next().unwrap_or_default();
            return first.trim().to_string();
        }
    }

    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    remote_addr.ip().to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn remote() -> SocketAddr {
        "127.0.0.1:54321".parse().unwrap()
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );

        assert_eq!(client_key(&headers, remote()), "192.168.1.1");
    }

    #[test]
    fn test_forwarded_for_trims_whitespace() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("  203.0.113.9 , 10.0.0.1"),
        );

        assert_eq!(client_key(&headers, remote()), "203.0.113.9");
    }

    #[test]
    fn test_real_ip_when_no_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.2"));

        assert_eq!(client_key(&headers, remote()), "192.168.1.2");
    }

    #[test]
    fn test_forwarded_for_wins_over_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("192.168.1.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.2"));

        assert_eq!(client_key(&headers, remote()), "192.168.1.1");
    }

    #[test]
    fn test_falls_back_to_remote_address() {
        let headers = HeaderMap::new();
        assert_eq!(client_key(&headers, remote()), "127.0.0.1");
    }

    #[test]
    fn test_empty_headers_fall_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        headers.insert("x-real-ip", HeaderValue::from_static(""));

        assert_eq!(client_key(&headers, remote()), "127.0.0.1");
    }

    #[test]
    fn test_forwarded_for_with_empty_first_entry_still_decides_key() {
        // A malformed header like ", 1.2.3.4" keys the request on the
        // empty string; it does not fall through to X-Real-IP or the
        // remote address.
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(", 1.2.3.4"));
        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.2"));

        assert_eq!(client_key(&headers, remote()), "");
    }
}
