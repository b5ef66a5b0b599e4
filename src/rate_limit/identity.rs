//! # Client Identity Derivation
//!
//! Resolves the identity a rate limit counter is keyed by. Identity
//! sources, strongest first: an authenticated user id, a session id, and
//! finally proxy-forwarded addresses. Header-derived identity is
//! trivially spoofable by a client that controls its own headers — it is
//! kept as the documented fallback for anonymous traffic, and callers
//! needing abuse resistance must pass the authenticated id instead.

const FORWARDED_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Fallback identity when nothing identifies the client.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Derive the rate-limit identity for a request.
///
/// `headers` is the request's header list as `(name, value)` pairs;
/// lookup is case-insensitive. `x-forwarded-for` may carry a
/// comma-separated chain, of which the first (client-most) entry wins.
pub fn client_identifier(
    user_id: Option<&str>,
    session_id: Option<&str>,
    headers: &[(&str, &str)],
) -> String {
    if let Some(user_id) = non_empty(user_id) {
        return format!("user:{user_id}");
    }

    if let Some(session_id) = non_empty(session_id) {
        return format!("session:{session_id}");
    }

    match forwarded_address(headers) {
        Some(address) => format!("ip:{address}"),
        None => UNKNOWN_IDENTIFIER.to_string(),
    }
}

/// First populated value among the forwarded-address headers.
pub fn forwarded_address(headers: &[(&str, &str)]) -> Option<String> {
    for header in FORWARDED_HEADERS {
        let Some(value) = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(header))
            .map(|(_, value)| *value)
        else {
            continue;
        };

        let first_hop = value.split(',').next().unwrap_or("").trim();
        if !first_hop.is_empty() {
            return Some(first_hop.to_string());
        }
    }
    None
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_wins_over_everything() {
        let headers = [("x-forwarded-for", "10.0.0.1")];
        assert_eq!(
            client_identifier(Some("42"), Some("abc"), &headers),
            "user:42"
        );
    }

    #[test]
    fn test_session_wins_over_headers() {
        let headers = [("x-forwarded-for", "10.0.0.1")];
        assert_eq!(
            client_identifier(None, Some("abc"), &headers),
            "session:abc"
        );
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let headers = [("X-Forwarded-For", "203.0.113.7, 10.0.0.1, 10.0.0.2")];
        assert_eq!(
            client_identifier(None, None, &headers),
            "ip:203.0.113.7"
        );
    }

    #[test]
    fn test_header_priority_order() {
        let headers = [
            ("cf-connecting-ip", "198.51.100.4"),
            ("x-real-ip", "203.0.113.9"),
        ];
        // x-real-ip outranks cf-connecting-ip.
        assert_eq!(client_identifier(None, None, &headers), "ip:203.0.113.9");
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(client_identifier(None, None, &[]), UNKNOWN_IDENTIFIER);
        assert_eq!(
            client_identifier(Some("  "), None, &[("content-type", "application/json")]),
            UNKNOWN_IDENTIFIER
        );
    }
}
