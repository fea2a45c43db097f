use tracing::debug;
use url::{Host, Url};

use crate::error::{ShellError, ShellResult};

/// Turns user input into the canonical absolute URL stored on a record
///
/// - Trims whitespace and defaults the scheme to `https://`
/// - Repairs unparseable input once per kind: a dot-less host gets `.com`,
///   a scheme-less string gets `https://`
/// - Strips a leading `www.` from the host
///
/// Pure and deterministic; never touches the network.
pub fn normalize_url(raw: &str) -> ShellResult<String> {
    let original = raw.trim();
    if original.is_empty() {
        return Err(ShellError::InvalidUrl(raw.to_string()));
    }

    let mut candidate = original.to_string();
    let mut appended_tld = false;
    let mut prepended_scheme = false;

    loop {
        if !has_web_scheme(&candidate) {
            candidate = format!("https://{}", candidate);
        }

        match parse_with_host(&candidate) {
            Some(mut url) => {
                strip_www(&mut url);
                return Ok(url.to_string());
            }
            None if !appended_tld && !candidate.contains('.') => {
                debug!("Retrying URL normalization with .com suffix: {}", candidate);
                appended_tld = true;
                candidate.push_str(".com");
            }
            None if !prepended_scheme && !candidate.contains("://") => {
                prepended_scheme = true;
                candidate = format!("https://{}", candidate);
            }
            None => return Err(ShellError::InvalidUrl(original.to_string())),
        }
    }
}

fn has_web_scheme(candidate: &str) -> bool {
    let lower = candidate.get(..8).unwrap_or(candidate).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn parse_with_host(candidate: &str) -> Option<Url> {
    let url = Url::parse(candidate).ok()?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Some(url),
        _ => None,
    }
}

fn strip_www(url: &mut Url) {
    let stripped = match url.host() {
        Some(Host::Domain(host)) if host.len() > 4 && host.starts_with("www.") => host[4..].to_string(),
        _ => return,
    };
    // set_host only fails for hosts the parser would have rejected already
    let _ = url.set_host(Some(&stripped));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepends_https() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com/");
        assert_eq!(normalize_url("  example.com/path?q=1  ").unwrap(), "https://example.com/path?q=1");
    }

    #[test]
    fn test_keeps_http() {
        assert_eq!(normalize_url("http://example.com").unwrap(), "http://example.com/");
        assert_eq!(normalize_url("HTTPS://Example.COM").unwrap(), "https://example.com/");
    }

    #[test]
    fn test_strips_www_once() {
        assert_eq!(normalize_url("https://www.example.com").unwrap(), "https://example.com/");
        assert_eq!(normalize_url("www.example.com/a").unwrap(), "https://example.com/a");
        assert_eq!(normalize_url("https://wwwexample.com").unwrap(), "https://wwwexample.com/");
        assert_eq!(normalize_url("https://sub.www.example.com").unwrap(), "https://sub.www.example.com/");
    }

    #[test]
    fn test_dotless_hosts_parse_as_is() {
        assert_eq!(normalize_url("localhost:3000").unwrap(), "https://localhost:3000/");
        assert_eq!(normalize_url("notion").unwrap(), "https://notion/");
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(normalize_url(""), Err(ShellError::InvalidUrl(_))));
        assert!(matches!(normalize_url("   "), Err(ShellError::InvalidUrl(_))));
        assert!(matches!(normalize_url("exa mple.com"), Err(ShellError::InvalidUrl(_))));
        assert!(matches!(normalize_url("http://[::1"), Err(ShellError::InvalidUrl(_))));
    }

    #[test]
    fn test_idempotent() {
        for input in ["example.com", "https://www.example.com/a?b=c#d", "http://localhost:8080", "mail.google.com/mail/u/0"] {
            let once = normalize_url(input).unwrap();
            assert_eq!(normalize_url(&once).unwrap(), once, "input {}", input);
        }
    }
}
