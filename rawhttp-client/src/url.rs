//! Base URL and request-target handling.

use rawhttp_common::{HttpError, HttpResult};

use crate::connection::Transport;

/// Splits a base URL into its transport and `host:port` authority.
///
/// `http://` selects the plain transport (default port 80), `https://` the
/// secured one (default port 443). Any path after the authority is ignored.
pub fn parse_base_url(base_url: &str) -> HttpResult<(Transport, String)> {
    let (transport, rest, default_port) = if let Some(rest) = base_url.strip_prefix("http://") {
        (Transport::Plain, rest, 80)
    } else if let Some(rest) = base_url.strip_prefix("https://") {
        (Transport::Secured, rest, 443)
    } else {
        return Err(HttpError::InvalidUrl(base_url.to_string()));
    };

    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(HttpError::InvalidUrl(base_url.to_string()));
    }

    let has_port = match authority.rfind(']') {
        // IPv6 literal: a port can only follow the closing bracket.
        Some(end) => authority[end..].contains(':'),
        None => authority.contains(':'),
    };
    let host = if has_port {
        authority.to_string()
    } else {
        format!("{authority}:{default_port}")
    };
    Ok((transport, host))
}

/// Reduces a URL or path to the origin-form request target.
///
/// Absolute URLs lose their scheme and authority, paths starting with `/`
/// pass through, anything else gains a leading `/`.
pub fn resolve_target(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    if let Some(rest) = without_scheme {
        return match rest.find('/') {
            Some(idx) => rest[idx..].to_string(),
            None => "/".to_string(),
        };
    }
    if url.starts_with('/') {
        url.to_string()
    } else {
        format!("/{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_default_ports() {
        let (transport, host) = parse_base_url("http://localhost").unwrap();
        assert_eq!(transport, Transport::Plain);
        assert_eq!(host, "localhost:80");

        let (transport, host) = parse_base_url("https://example.test/api").unwrap();
        assert_eq!(transport, Transport::Secured);
        assert_eq!(host, "example.test:443");
    }

    #[test]
    fn keeps_explicit_ports() {
        let (_, host) = parse_base_url("http://127.0.0.1:8888/").unwrap();
        assert_eq!(host, "127.0.0.1:8888");
        let (_, host) = parse_base_url("http://[::1]:9000").unwrap();
        assert_eq!(host, "[::1]:9000");
        let (_, host) = parse_base_url("http://[::1]").unwrap();
        assert_eq!(host, "[::1]:80");
    }

    #[test]
    fn rejects_unknown_schemes() {
        assert!(matches!(parse_base_url("ftp://x"), Err(HttpError::InvalidUrl(_))));
        assert!(matches!(parse_base_url("localhost:80"), Err(HttpError::InvalidUrl(_))));
        assert!(matches!(parse_base_url("http:///path"), Err(HttpError::InvalidUrl(_))));
    }

    #[test]
    fn resolves_targets() {
        assert_eq!(resolve_target("http://localhost:888/hello?x=1"), "/hello?x=1");
        assert_eq!(resolve_target("https://host"), "/");
        assert_eq!(resolve_target("/json"), "/json");
        assert_eq!(resolve_target("head"), "/head");
    }
}
