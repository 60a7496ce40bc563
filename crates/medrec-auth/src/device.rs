//! Client origin and device metadata.
//!
//! The origin address keys lockout buckets and is recorded on refresh
//! tokens; the user agent is recorded for session listings.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

use crate::types::DeviceMetadata;

/// Stored user agents are cut to this many bytes.
const MAX_USER_AGENT_LEN: usize = 512;

/// Origin used when no address can be determined.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Browser markers, most specific first (Edge and Opera also claim Chrome,
/// Chrome also claims Safari).
const BROWSERS: &[(&str, &str)] = &[
    ("edg/", "Edge"),
    ("opr/", "Opera"),
    ("firefox/", "Firefox"),
    ("chrome/", "Chrome"),
    ("safari/", "Safari"),
    ("curl/", "curl"),
];

/// OS markers, most specific first (iOS user agents mention Mac OS X).
const SYSTEMS: &[(&str, &str)] = &[
    ("iphone", "iOS"),
    ("ipad", "iPadOS"),
    ("android", "Android"),
    ("windows", "Windows"),
    ("mac os x", "macOS"),
    ("cros", "ChromeOS"),
    ("linux", "Linux"),
];

/// Resolves the client origin.
///
/// Forwarding headers are honored only when the connection peer is one of
/// `trusted_proxies`. Then the rightmost `X-Forwarded-For` hop that is not
/// itself a trusted proxy is the client, falling back to `X-Real-IP`.
/// Otherwise the peer address is the origin, whatever the headers say.
#[must_use]
pub fn client_origin(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[IpAddr],
) -> String {
    let Some(peer) = peer.map(|p| p.ip()) else {
        return UNKNOWN_ORIGIN.to_string();
    };
    if !trusted_proxies.contains(&peer) {
        return peer.to_string();
    }

    forwarded_client(headers, trusted_proxies)
        .or_else(|| header_str(headers, "x-real-ip").map(str::to_string))
        .unwrap_or_else(|| peer.to_string())
}

fn forwarded_client(headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> Option<String> {
    let hops: Vec<&str> = header_str(headers, "x-forwarded-for")?
        .split(',')
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();

    hops.iter()
        .rev()
        .find(|hop| {
            !hop.parse::<IpAddr>()
                .is_ok_and(|ip| trusted_proxies.contains(&ip))
        })
        .or_else(|| hops.first())
        .map(|hop| (*hop).to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Reads the `User-Agent` header, truncated on a char boundary.
#[must_use]
pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    let ua = headers.get("user-agent")?.to_str().ok()?.trim();
    if ua.is_empty() {
        return None;
    }
    let mut end = ua.len().min(MAX_USER_AGENT_LEN);
    while !ua.is_char_boundary(end) {
        end -= 1;
    }
    Some(ua[..end].to_string())
}

/// Collects origin and user agent for a request.
#[must_use]
pub fn device_metadata(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[IpAddr],
) -> DeviceMetadata {
    DeviceMetadata {
        origin: Some(client_origin(headers, peer, trusted_proxies)),
        user_agent: user_agent(headers),
    }
}

/// Short label such as "Firefox on Linux".
#[must_use]
pub fn device_name(user_agent: Option<&str>) -> String {
    let Some(ua) = user_agent else {
        return "Unknown device".to_string();
    };
    let lower = ua.to_lowercase();
    let find = |table: &[(&str, &'static str)]| {
        table
            .iter()
            .find(|(marker, _)| lower.contains(marker))
            .map(|(_, name)| *name)
    };

    match (find(BROWSERS), find(SYSTEMS)) {
        (Some(b), Some(os)) => format!("{b} on {os}"),
        (Some(b), None) => b.to_string(),
        (None, Some(os)) => format!("Unknown browser on {os}"),
        (None, None) => "Unknown device".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    fn peer(addr: &str) -> Option<SocketAddr> {
        Some(addr.parse().unwrap())
    }

    fn proxies() -> Vec<IpAddr> {
        vec!["10.0.0.2".parse().unwrap(), "10.0.0.3".parse().unwrap()]
    }

    #[test]
    fn test_untrusted_peer_ignores_forwarding_headers() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.9"),
            ("x-real-ip", "198.51.100.4"),
        ]);
        assert_eq!(client_origin(&h, peer("192.0.2.1:5555"), &[]), "192.0.2.1");
        assert_eq!(
            client_origin(&h, peer("192.0.2.1:5555"), &proxies()),
            "192.0.2.1"
        );
    }

    #[test]
    fn test_trusted_proxy_takes_rightmost_untrusted_hop() {
        let h = headers(&[("x-forwarded-for", "6.6.6.6, 203.0.113.9, 10.0.0.3")]);
        assert_eq!(
            client_origin(&h, peer("10.0.0.2:443"), &proxies()),
            "203.0.113.9"
        );

        let h = headers(&[("x-forwarded-for", "10.0.0.3")]);
        assert_eq!(client_origin(&h, peer("10.0.0.2:443"), &proxies()), "10.0.0.3");
    }

    #[test]
    fn test_trusted_proxy_real_ip_then_peer() {
        let h = headers(&[("x-real-ip", "198.51.100.4")]);
        assert_eq!(
            client_origin(&h, peer("10.0.0.2:443"), &proxies()),
            "198.51.100.4"
        );
        assert_eq!(
            client_origin(&HeaderMap::new(), peer("10.0.0.2:443"), &proxies()),
            "10.0.0.2"
        );
    }

    #[test]
    fn test_no_peer_is_unknown() {
        let h = headers(&[("x-forwarded-for", "203.0.113.9")]);
        assert_eq!(client_origin(&h, None, &proxies()), UNKNOWN_ORIGIN);
        assert_eq!(client_origin(&HeaderMap::new(), None, &[]), UNKNOWN_ORIGIN);
    }

    #[test]
    fn test_user_agent_truncated() {
        let long = "a".repeat(1000);
        let h = headers(&[("user-agent", &long)]);
        assert_eq!(user_agent(&h).unwrap().len(), MAX_USER_AGENT_LEN);
        assert!(user_agent(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_device_name() {
        let edge = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
        assert_eq!(device_name(Some(edge)), "Edge on Windows");

        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";
        assert_eq!(device_name(Some(iphone)), "Safari on iOS");

        let firefox = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
        assert_eq!(device_name(Some(firefox)), "Firefox on Linux");

        assert_eq!(device_name(Some("curl/8.5.0")), "curl");
        assert_eq!(device_name(None), "Unknown device");
    }
}
