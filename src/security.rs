//! Pre-flight URL validation.
//!
//! Every batch item passes through here before any compliance or network
//! activity. Rejects malformed URLs, non-HTTP(S) schemes, and targets that
//! would let a hostile job link reach internal services (localhost, private
//! ranges, cloud metadata endpoints).

use std::collections::HashSet;
use std::net::IpAddr;

use url::Url;

use crate::error::ExtractError;

/// Validates and normalizes candidate job-posting URLs.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,
    blocked_cidrs: Vec<ipnet::IpNet>,
    /// Hosts that bypass the block lists (test fixtures, allow-listed intranets).
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "127.0.0.1",
                "::1",
                "[::1]",
                "0.0.0.0",
                "metadata.google.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs: vec![
                "10.0.0.0/8".parse().unwrap(),
                "172.16.0.0/12".parse().unwrap(),
                "192.168.0.0/16".parse().unwrap(),
                "169.254.0.0/16".parse().unwrap(), // Link-local / cloud metadata
                "127.0.0.0/8".parse().unwrap(),
                "::1/128".parse().unwrap(),
                "fc00::/7".parse().unwrap(),
                "fe80::/10".parse().unwrap(),
            ],
            allowed_hosts: HashSet::new(),
        }
    }

    /// Allow a host to bypass the block lists.
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    /// Block an additional host.
    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into());
        self
    }

    /// Normalize then validate a caller-supplied URL.
    ///
    /// Scheme-less input gets `https://` prefixed (people paste bare
    /// `company.com/careers/123` links). Returns the parsed URL on success.
    pub fn validate(&self, raw: &str) -> Result<Url, ExtractError> {
        let candidate = normalize_url(raw);

        let parsed = Url::parse(&candidate).map_err(|e| ExtractError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(ExtractError::InvalidUrl {
                url: raw.to_string(),
                reason: format!("disallowed scheme: {}", parsed.scheme()),
            });
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ExtractError::InvalidUrl {
                url: raw.to_string(),
                reason: "URL has no host".to_string(),
            })?
            .to_string();

        if self.allowed_hosts.contains(&host) {
            return Ok(parsed);
        }

        if self.blocked_hosts.contains(&host) {
            return Err(ExtractError::InvalidUrl {
                url: raw.to_string(),
                reason: format!("blocked host: {host}"),
            });
        }

        if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
            for cidr in &self.blocked_cidrs {
                if cidr.contains(&ip) {
                    return Err(ExtractError::InvalidUrl {
                        url: raw.to_string(),
                        reason: format!("blocked IP range: {ip}"),
                    });
                }
            }
        }

        Ok(parsed)
    }
}

/// Prefix `https://` when the caller pasted a scheme-less URL.
///
/// Inputs that already carry a scheme are left untouched so the validator's
/// scheme allow-list sees them as written: rewriting `file:///etc/passwd`
/// into an https URL would sneak it past the guard.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// RFC 3986 scheme detection: `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`
/// followed by `:`. A digit right after the colon is a port on a bare host
/// (`example.com:8080`), not a scheme.
fn has_scheme(candidate: &str) -> bool {
    let Some((scheme, rest)) = candidate.split_once(':') else {
        return false;
    };
    if rest.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return false;
    }
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
