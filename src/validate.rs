//! Sanity checks on extracted values
//!
//! Extraction hands over raw strings scraped from a live page; nothing is
//! trusted until it passes the rule for its field. Failure messages describe
//! the value (length) without echoing the secret itself.

use url::Url;

use crate::error::{Error, Result};

/// Minimum plausible API key length
const API_KEY_MIN_LEN: usize = 16;

/// Validate a raw API key field value: trimmed, non-empty, at least 16
/// characters, no interior whitespace. Returns the trimmed key.
pub fn validate_api_key(raw: &str) -> Result<String> {
    let key = raw.trim();

    if key.is_empty() {
        return Err(Error::field_empty("API key"));
    }

    if key.len() < API_KEY_MIN_LEN || key.chars().any(char::is_whitespace) {
        return Err(Error::Format {
            reason: format!("API key has unexpected format (length={})", key.len()),
        });
    }

    Ok(key.to_string())
}

/// Parse a generated `nxm://` download link and pull out the `key` and
/// `expires` query parameters. Both must be present; the failure names the
/// one that is not.
pub fn parse_download_link(href: &str) -> Result<(String, String)> {
    let parsed = Url::parse(href).map_err(|e| Error::Format {
        reason: format!("download link is not a valid URI: {e}"),
    })?;

    let mut key = None;
    let mut expires = None;
    for (name, value) in parsed.query_pairs() {
        match name.as_ref() {
            "key" => key = Some(value.into_owned()),
            "expires" => expires = Some(value.into_owned()),
            _ => {}
        }
    }

    let key = key.ok_or_else(|| Error::field_missing("download link 'key' parameter"))?;
    let expires = expires.ok_or_else(|| Error::field_missing("download link 'expires' parameter"))?;

    Ok((key, expires))
}
