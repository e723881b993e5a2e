//! LABGATE Security Module
//!
//! Identifier validation, session id checks and request metadata helpers.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;
use uuid::Uuid;

/// Role and scenario identifiers: short, url-safe, no path separators.
static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").expect("valid regex"));

/// Validate a role or scenario identifier
pub fn validate_identifier(id: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(id)
}

/// Parse a session id presented by a client. Only canonical UUIDs are accepted,
/// anything else is treated as absent.
pub fn parse_session_id(raw: &str) -> Option<String> {
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => Some(id.to_string()),
        Err(_) => {
            warn!(target: "security", "Rejected malformed session id ({} bytes)", raw.len());
            None
        }
    }
}

/// Pull a named cookie out of a `Cookie` header value.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

/// Shortened session id for log lines.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Escape text for embedding inside an HTML element.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Extract client IP from request headers (supports proxies)
pub fn extract_client_ip(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    remote_addr: Option<&str>,
) -> Option<String> {
    // Try X-Forwarded-For first (first IP in chain)
    if let Some(xff) = forwarded_for {
        if let Some(first_ip) = xff.split(',').next() {
            let ip = first_ip.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }

    if let Some(real) = real_ip {
        if !real.is_empty() {
            return Some(real.to_string());
        }
    }

    remote_addr.map(|s| s.to_string())
}
