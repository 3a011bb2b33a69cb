//! Masking of sensitive values before they reach logs or error payloads.
//!
//! Request and response bodies are logged at DEBUG level, and API errors
//! embed the request that triggered them. Both paths run through
//! [`hide_sensitive`] first, so passwords and session tokens never appear
//! in plain text. Covered patterns: JSON `password`/`auth` fields and bare
//! 32-character lowercase hex strings (the shape of a Zabbix session id).

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Replacement written over every masked value.
pub const HIDE_MASK: &str = "********";

fn sensitive_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?P<prefix>"(?:password|auth)"\s*:\s*")(?P<secret>[^"]+)(?P<quote>")|(?P<token>\b[a-f0-9]{32}\b)"#,
        )
        .expect("sensitive pattern is a valid regex")
    })
}

/// Returns `message` with every password, auth field, and session token
/// replaced by [`HIDE_MASK`].
pub fn hide_sensitive(message: &str) -> String {
    sensitive_pattern()
        .replace_all(message, |caps: &Captures| {
            match (caps.name("prefix"), caps.name("quote")) {
                (Some(prefix), Some(quote)) => {
                    format!("{}{}{}", prefix.as_str(), HIDE_MASK, quote.as_str())
                }
                _ => HIDE_MASK.to_string(),
            }
        })
        .into_owned()
}
