//! RFC 2109 cookies: parsing `Set-Cookie` values, validating them against
//! the producer endpoint they came from, and the comma coalescing used for
//! multi-valued cookie headers.

use chrono::{DateTime, NaiveDateTime};
use url::Url;

use crate::error::CookieError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Always set once the cookie has been accepted for an origin.
    pub domain: Option<String>,
    /// Always set once the cookie has been accepted for an origin.
    pub path: Option<String>,
    /// Ports the cookie may be returned to; any port when absent.
    pub ports: Option<Vec<u16>>,
    pub secure: bool,
    pub version: Option<u32>,
    /// Milliseconds since the epoch; session cookie when absent.
    pub expires_at: Option<i64>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            ports: None,
            secure: false,
            version: None,
            expires_at: None,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }

    /// Two cookies with the same identity replace each other.
    pub fn same_identity(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    /// `name=value`, as sent back in a `Cookie` header.
    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    /// Validate the cookie against the endpoint that set it and fill in
    /// the default domain and path.
    pub fn accept(mut self, origin: &Url) -> Result<Self, CookieError> {
        validate(&self, origin)?;
        if self.domain.is_none() {
            self.domain = Some(origin_host(origin)?);
        }
        if self.path.is_none() {
            self.path = Some(default_path(origin.path()));
        }
        Ok(self)
    }

    /// Whether the cookie should be sent with a request to `url`.
    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return false;
        };
        let domain_ok = match &self.domain {
            None => true,
            Some(domain) if domain.starts_with('.') => {
                host.ends_with(domain.as_str()) || host == domain[1..]
            }
            Some(domain) => host == *domain,
        };
        let path_ok = self.path.as_deref().is_none_or(|p| path_matches(url.path(), p));
        let port_ok = match (&self.ports, url.port_or_known_default()) {
            (Some(ports), Some(port)) => ports.contains(&port),
            _ => true,
        };
        let secure_ok = !self.secure || url.scheme() == "https";
        domain_ok && path_ok && port_ok && secure_ok
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coalescing
// ─────────────────────────────────────────────────────────────────────────────

/// Join several cookie header values into one, separated by commas
/// (RFC 2109 §4.2.2).
pub fn coalesce_cookies<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Split a coalesced header back into single cookies. A comma inside an
/// `Expires` date does not start a new cookie.
pub fn split_cookies(header: &str) -> Vec<String> {
    let mut cookies: Vec<String> = Vec::new();
    for part in header.split(',') {
        let starts_cookie = part.split(';').next().is_some_and(|head| head.contains('='));
        match cookies.last_mut() {
            Some(last) if !starts_cookie => {
                last.push(',');
                last.push_str(part);
            }
            _ => cookies.push(part.to_string()),
        }
    }
    cookies
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a (possibly coalesced) `Set-Cookie` value. `now` anchors
/// `Max-Age`.
pub fn parse_set_cookie(header: &str, now: i64) -> Result<Vec<Cookie>, CookieError> {
    split_cookies(header)
        .iter()
        .map(|c| parse_one(c, now))
        .collect()
}

fn parse_one(raw: &str, now: i64) -> Result<Cookie, CookieError> {
    let mut parts = raw.split(';');
    let pair = parts.next().unwrap_or_default();
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| CookieError::Malformed(format!("missing '=' in '{raw}'")))?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(CookieError::Malformed(format!("invalid cookie name in '{raw}'")));
    }

    let mut cookie = Cookie::new(name, unquote(value.trim()));
    for attribute in parts {
        let (key, value) = match attribute.split_once('=') {
            Some((k, v)) => (k.trim().to_ascii_lowercase(), unquote(v.trim())),
            None => (attribute.trim().to_ascii_lowercase(), String::new()),
        };
        match key.as_str() {
            "domain" if !value.is_empty() => cookie.domain = Some(value.to_ascii_lowercase()),
            "path" if !value.is_empty() => cookie.path = Some(value),
            "secure" => cookie.secure = true,
            "version" => {
                let version = value
                    .parse()
                    .map_err(|_| CookieError::Malformed(format!("invalid version '{value}' of cookie '{name}'")))?;
                cookie.version = Some(version);
            }
            "max-age" => {
                let seconds: i64 = value
                    .parse()
                    .ok()
                    .filter(|s| *s >= 0)
                    .ok_or_else(|| CookieError::Malformed(format!("invalid max-age '{value}' of cookie '{name}'")))?;
                cookie.expires_at = Some(now.saturating_add(seconds.saturating_mul(1000)));
            }
            // Max-Age wins over Expires.
            "expires" if cookie.expires_at.is_none() => {
                cookie.expires_at = Some(parse_expires(&value).ok_or_else(|| {
                    CookieError::Malformed(format!("invalid expires '{value}' of cookie '{name}'"))
                })?);
            }
            "port" => {
                let ports = value
                    .split(',')
                    .filter(|p| !p.trim().is_empty())
                    .map(|p| p.trim().parse::<u16>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| CookieError::Malformed(format!("invalid port list '{value}' of cookie '{name}'")))?;
                cookie.ports = Some(ports);
            }
            _ => {}
        }
    }
    Ok(cookie)
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

fn parse_expires(value: &str) -> Option<i64> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.timestamp_millis());
    }
    // Netscape draft format: Wdy, DD-Mon-YYYY HH:MM:SS GMT
    NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|date| date.and_utc().timestamp_millis())
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation (RFC 2109 §4.3.2)
// ─────────────────────────────────────────────────────────────────────────────

pub fn validate(cookie: &Cookie, origin: &Url) -> Result<(), CookieError> {
    let reject = |reason: String| CookieError::Rejected {
        name: cookie.name.clone(),
        reason,
    };

    if cookie.name.starts_with('$') {
        return Err(reject("names starting with '$' are reserved".into()));
    }

    if let Some(path) = &cookie.path {
        if !path_matches(origin.path(), path) {
            return Err(reject(format!("path '{path}' is not a prefix of '{}'", origin.path())));
        }
    }

    let host = origin_host(origin)?;
    if let Some(domain) = &cookie.domain {
        if *domain != host {
            if !domain.starts_with('.') {
                return Err(reject(format!("domain '{domain}' does not start with a dot")));
            }
            if !domain[1..].trim_end_matches('.').contains('.') {
                return Err(reject(format!("domain '{domain}' has no embedded dot")));
            }
            let Some(prefix) = host.strip_suffix(domain.as_str()) else {
                return Err(reject(format!("host '{host}' is not in domain '{domain}'")));
            };
            if prefix.contains('.') {
                return Err(reject(format!("host '{host}' is more than one level below '{domain}'")));
            }
        }
    }

    if let Some(ports) = &cookie.ports {
        let port = origin.port_or_known_default();
        if !port.is_some_and(|p| ports.contains(&p)) {
            return Err(reject(format!("port {} is not in the cookie's port list", port.unwrap_or(0))));
        }
    }

    if cookie.secure && origin.scheme() != "https" {
        return Err(reject(format!("secure cookie set over {}", origin.scheme())));
    }
    Ok(())
}

fn origin_host(origin: &Url) -> Result<String, CookieError> {
    origin
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| CookieError::IllegalArgument(format!("endpoint '{origin}' has no host")))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path.starts_with(cookie_path)
}

/// Request path up to, but not including, its last `/`.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(i) if i > 0 => request_path[..i].to_string(),
        _ => "/".to_string(),
    }
}
