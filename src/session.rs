//! Authentication session loading
//!
//! Cookies exported from a logged-in browser (Cookie-Editor, EditThisCookie
//! and similar produce the accepted shapes) are normalized into a [`Session`]
//! that can be replayed into a fresh browser context. Expired cookies and
//! records missing identity fields are dropped during loading; a file that
//! yields nothing usable, or nothing for the target site, is rejected.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// SameSite policy of a cookie, coerced into the closed set Chrome accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    /// Coerce an export's free-form hint. Unrecognized or non-string values
    /// map to `Option::None` so the browser default applies.
    ///
    /// Total and idempotent: "lax"/"Lax" -> Lax, "strict" -> Strict,
    /// "none"/"no_restriction"/"no-restriction" (case-insensitive) -> None.
    pub fn coerce(raw: Option<&str>) -> Option<Self> {
        let normalized = raw?.to_ascii_lowercase();
        match normalized.as_str() {
            "lax" => Some(SameSite::Lax),
            "strict" => Some(SameSite::Strict),
            "none" | "no_restriction" | "no-restriction" => Some(SameSite::None),
            _ => Option::None,
        }
    }

    /// CDP wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
            SameSite::None => "None",
        }
    }
}

/// A normalized browser cookie
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Whole-second epoch expiry; absent for session-only cookies
    pub expires: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

/// A validated, immutable authentication session
#[derive(Debug, Clone)]
pub struct Session {
    cookies: Vec<SessionCookie>,
    path: PathBuf,
}

impl Session {
    /// Load and validate a session from a cookies file.
    ///
    /// Accepts a bare JSON array of cookie records or an object with a
    /// `cookies` array; anything else normalizes to an empty set. Records
    /// missing name, value, or domain (after trimming) and cookies already
    /// expired at load time are dropped silently. Fails if nothing survives
    /// or if no surviving cookie belongs to `registrable_domain` or one of
    /// its subdomains.
    pub fn load(path: impl AsRef<Path>, registrable_domain: &str) -> Result<Self> {
        let resolved = resolve_path(path.as_ref());

        let raw = std::fs::read_to_string(&resolved).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CookiesNotFound {
                    path: resolved.clone(),
                }
            } else {
                Error::Io(e)
            }
        })?;

        let parsed: Value = serde_json::from_str(&raw).map_err(|source| Error::CookiesParse {
            path: resolved.clone(),
            source,
        })?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let cookies = normalize_cookies(&parsed, now);

        if cookies.is_empty() {
            return Err(Error::NoUsableCookies { path: resolved });
        }

        let on_site = cookies
            .iter()
            .any(|c| domain_matches(&c.domain, registrable_domain));
        if !on_site {
            return Err(Error::DomainMismatch {
                domain: registrable_domain.to_string(),
                path: resolved,
            });
        }

        tracing::debug!(
            count = cookies.len(),
            path = %resolved.display(),
            "loaded session cookies"
        );

        Ok(Self {
            cookies,
            path: resolved,
        })
    }

    /// The surviving cookies, in file order
    pub fn cookies(&self) -> &[SessionCookie] {
        &self.cookies
    }

    /// Resolved path the session was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Absolute form of the configured path, for unambiguous error messages
fn resolve_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// `domain` equals the site's registrable domain or is a subdomain of it.
/// Cookie domains with a leading dot (".nexusmods.com") match via the
/// subdomain arm.
fn domain_matches(domain: &str, registrable: &str) -> bool {
    domain == registrable || domain.ends_with(&format!(".{registrable}"))
}

/// Raw cookie record as found in export files. Expiry and same-site stay
/// untyped because exports disagree on their types; derivation happens in
/// [`normalize_record`].
#[derive(Debug, Deserialize)]
struct RawCookie {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, rename = "expirationDate")]
    expiration_date: Option<Value>,
    #[serde(default)]
    expires: Option<Value>,
    #[serde(default, rename = "httpOnly")]
    http_only: Option<bool>,
    #[serde(default)]
    secure: Option<bool>,
    #[serde(default, rename = "sameSite")]
    same_site: Option<Value>,
}

fn normalize_cookies(parsed: &Value, now_epoch: i64) -> Vec<SessionCookie> {
    let records = match parsed {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("cookies") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    records
        .iter()
        .filter_map(|record| {
            let raw: RawCookie = serde_json::from_value(record.clone()).ok()?;
            normalize_record(raw, now_epoch)
        })
        .collect()
}

/// Normalize one record; `None` means the record is filtered out, which is
/// not an error.
fn normalize_record(raw: RawCookie, now_epoch: i64) -> Option<SessionCookie> {
    let name = raw.name?.trim().to_string();
    let value = raw.value?;
    let domain = raw.domain?.trim().to_string();

    if name.is_empty() || value.is_empty() || domain.is_empty() {
        return None;
    }

    // Prefer the extension-style "expirationDate", fall back to "expires",
    // floored to whole seconds. Non-numeric values mean session-only.
    let expires = raw
        .expiration_date
        .as_ref()
        .and_then(Value::as_f64)
        .or_else(|| raw.expires.as_ref().and_then(Value::as_f64))
        .map(|secs| secs.floor() as i64);

    // Keep session cookies and cookies that are still live.
    if let Some(expiry) = expires {
        if expiry > 0 && expiry <= now_epoch {
            return None;
        }
    }

    Some(SessionCookie {
        name,
        value,
        domain,
        path: raw.path.filter(|p| !p.is_empty()).unwrap_or_else(|| "/".into()),
        expires,
        http_only: raw.http_only.unwrap_or(false),
        secure: raw.secure.unwrap_or(false),
        same_site: SameSite::coerce(raw.same_site.as_ref().and_then(Value::as_str)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SITE: &str = "nexusmods.com";

    fn write_cookies(content: &Value) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    fn cookie(name: &str, domain: &str) -> Value {
        json!({ "name": name, "value": "v", "domain": domain })
    }

    #[test]
    fn test_load_bare_array() {
        let file = write_cookies(&json!([cookie("sid", "nexusmods.com")]));
        let session = Session::load(file.path(), SITE).unwrap();
        assert_eq!(session.cookies().len(), 1);
        assert_eq!(session.cookies()[0].name, "sid");
        assert_eq!(session.cookies()[0].path, "/");
    }

    #[test]
    fn test_load_wrapper_object() {
        let file = write_cookies(&json!({ "cookies": [cookie("sid", ".nexusmods.com")] }));
        let session = Session::load(file.path(), SITE).unwrap();
        assert_eq!(session.cookies().len(), 1);
    }

    #[test]
    fn test_unrecognized_shape_is_empty() {
        let file = write_cookies(&json!({ "exported": true }));
        let err = Session::load(file.path(), SITE).unwrap_err();
        assert!(matches!(err, Error::NoUsableCookies { .. }));
    }

    #[test]
    fn test_not_found_names_resolved_path() {
        let err = Session::load("./definitely-missing-cookies.json", SITE).unwrap_err();
        match err {
            Error::CookiesNotFound { path } => {
                assert!(path.is_absolute());
                assert!(path.ends_with("definitely-missing-cookies.json"));
            }
            other => panic!("expected CookiesNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = Session::load(file.path(), SITE).unwrap_err();
        assert!(matches!(err, Error::CookiesParse { .. }));
    }

    #[test]
    fn test_records_missing_identity_fields_are_dropped() {
        let file = write_cookies(&json!([
            { "value": "v", "domain": "nexusmods.com" },
            { "name": "n", "domain": "nexusmods.com" },
            { "name": "n", "value": "v" },
            { "name": "  ", "value": "v", "domain": "nexusmods.com" },
        ]));
        let err = Session::load(file.path(), SITE).unwrap_err();
        assert!(matches!(err, Error::NoUsableCookies { .. }));
    }

    #[test]
    fn test_expired_cookies_are_dropped() {
        let file = write_cookies(&json!([
            { "name": "old", "value": "v", "domain": "nexusmods.com", "expirationDate": 100 },
        ]));
        let err = Session::load(file.path(), SITE).unwrap_err();
        assert!(matches!(err, Error::NoUsableCookies { .. }));
    }

    #[test]
    fn test_session_and_future_cookies_survive() {
        let future = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 3600;
        let file = write_cookies(&json!([
            { "name": "session_only", "value": "v", "domain": "nexusmods.com" },
            { "name": "live", "value": "v", "domain": "nexusmods.com", "expires": future },
        ]));
        let session = Session::load(file.path(), SITE).unwrap();
        assert_eq!(session.cookies().len(), 2);
        assert_eq!(session.cookies()[0].expires, None);
        assert_eq!(session.cookies()[1].expires, Some(future as i64));
    }

    #[test]
    fn test_expiration_date_preferred_over_expires() {
        let future = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
            + 3600;
        let file = write_cookies(&json!([
            {
                "name": "sid", "value": "v", "domain": "nexusmods.com",
                "expirationDate": (future as f64) + 0.75,
                "expires": 1,
            },
        ]));
        let session = Session::load(file.path(), SITE).unwrap();
        assert_eq!(session.cookies()[0].expires, Some(future));
    }

    #[test]
    fn test_non_numeric_expiry_means_session_only() {
        let file = write_cookies(&json!([
            { "name": "sid", "value": "v", "domain": "nexusmods.com", "expirationDate": "soon" },
        ]));
        let session = Session::load(file.path(), SITE).unwrap();
        assert_eq!(session.cookies()[0].expires, None);
    }

    #[test]
    fn test_domain_mismatch() {
        let file = write_cookies(&json!([cookie("sid", "example.com")]));
        let err = Session::load(file.path(), SITE).unwrap_err();
        match err {
            Error::DomainMismatch { domain, .. } => assert_eq!(domain, SITE),
            other => panic!("expected DomainMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_subdomain_satisfies_site_check() {
        let file = write_cookies(&json!([cookie("sid", "forums.nexusmods.com")]));
        assert!(Session::load(file.path(), SITE).is_ok());
    }

    #[test]
    fn test_lookalike_domain_does_not_match() {
        let file = write_cookies(&json!([cookie("sid", "notnexusmods.com")]));
        let err = Session::load(file.path(), SITE).unwrap_err();
        assert!(matches!(err, Error::DomainMismatch { .. }));
    }

    #[test]
    fn test_same_site_coercion_table() {
        assert_eq!(SameSite::coerce(Some("lax")), Some(SameSite::Lax));
        assert_eq!(SameSite::coerce(Some("Lax")), Some(SameSite::Lax));
        assert_eq!(SameSite::coerce(Some("strict")), Some(SameSite::Strict));
        assert_eq!(SameSite::coerce(Some("none")), Some(SameSite::None));
        assert_eq!(SameSite::coerce(Some("NO_RESTRICTION")), Some(SameSite::None));
        assert_eq!(SameSite::coerce(Some("no-restriction")), Some(SameSite::None));
        assert_eq!(SameSite::coerce(Some("unspecified")), None);
        assert_eq!(SameSite::coerce(None), None);
    }

    #[test]
    fn test_same_site_flows_into_cookie() {
        let file = write_cookies(&json!([
            { "name": "a", "value": "v", "domain": "nexusmods.com", "sameSite": "strict" },
            { "name": "b", "value": "v", "domain": "nexusmods.com", "sameSite": 3 },
        ]));
        let session = Session::load(file.path(), SITE).unwrap();
        assert_eq!(session.cookies()[0].same_site, Some(SameSite::Strict));
        assert_eq!(session.cookies()[1].same_site, None);
    }
}
