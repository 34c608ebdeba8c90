//! Origin validation policy for the WebSocket upgrade.
//!
//! If no `Origin` header is present, accept (non-browser client). If an
//! allow-list is configured, match exact or prefix; `*` disables the check
//! entirely. Otherwise, parse the URL and require the hostname to be
//! `localhost`, `127.0.0.1`, or the bound host. Any parse failure rejects.

/// Decide whether `origin` (the raw `Origin` header value, if any) may
/// open a connection to a server bound on `bound_host` with `allow_list`
/// configured.
pub fn is_origin_allowed(origin: Option<&str>, allow_list: &[String], bound_host: &str) -> bool {
    let Some(origin) = origin else {
        return true;
    };

    if !allow_list.is_empty() {
        if allow_list.iter().any(|a| a == "*") {
            return true;
        }
        return allow_list
            .iter()
            .any(|allowed| origin == allowed || origin.starts_with(allowed.as_str()));
    }

    match extract_hostname(origin) {
        Some(host) => host == "localhost" || host == "127.0.0.1" || host == bound_host,
        None => false,
    }
}

/// Pull the hostname out of an `Origin` header value (`scheme://host[:port]`)
/// without pulling in a full URL-parsing dependency for one field.
fn extract_hostname(origin: &str) -> Option<String> {
    let after_scheme = origin.split("://").nth(1)?;
    let host_port = after_scheme.split('/').next()?;
    let host = host_port.rsplit_once(':').map_or(host_port, |(h, _)| h);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_origin_header_is_accepted() {
        assert!(is_origin_allowed(None, &[], "127.0.0.1"));
    }

    #[test]
    fn loopback_origin_is_accepted_by_default() {
        assert!(is_origin_allowed(Some("http://localhost:3000"), &[], "127.0.0.1"));
        assert!(is_origin_allowed(Some("http://127.0.0.1:3000"), &[], "127.0.0.1"));
    }

    #[test]
    fn foreign_origin_is_rejected_by_default() {
        assert!(!is_origin_allowed(Some("https://evil.example.com"), &[], "127.0.0.1"));
    }

    #[test]
    fn bound_host_matches_when_not_loopback() {
        assert!(is_origin_allowed(Some("http://editor.local:9000"), &[], "editor.local"));
    }

    #[test]
    fn wildcard_allow_list_disables_the_check() {
        assert!(is_origin_allowed(Some("https://anything.example.com"), &["*".into()], "127.0.0.1"));
    }

    #[test]
    fn allow_list_matches_exact_or_prefix() {
        let allow = vec!["https://app.example.com".to_string()];
        assert!(is_origin_allowed(Some("https://app.example.com"), &allow, "127.0.0.1"));
        assert!(is_origin_allowed(Some("https://app.example.com:8443"), &allow, "127.0.0.1"));
        assert!(!is_origin_allowed(Some("https://other.example.com"), &allow, "127.0.0.1"));
    }

    #[test]
    fn unparseable_origin_is_rejected() {
        assert!(!is_origin_allowed(Some("not-a-url"), &[], "127.0.0.1"));
    }
}
