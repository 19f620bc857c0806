// src/core/analyzer/cookies.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::{Check, auto_response};
use crate::core::errors::CheckError;
use crate::core::knowledge_base::resolve;
use crate::core::models::{CheckResult, RetrievalBundle};

// Cookie names that look like they carry a session or credential.
static RE_SESSION_COOKIE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)sess|token|auth|login|sid").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookieFlags {
    pub name: String,
    pub secure: bool,
    #[serde(rename = "httponly")]
    pub http_only: bool,
    pub samesite: Option<String>,
}

/// Parses the attributes of one `Set-Cookie` value. Returns `None` when the
/// value has no `name=` pair.
pub fn parse_set_cookie(value: &str) -> Option<CookieFlags> {
    let mut parts = value.split(';').map(str::trim);
    let (name, _) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut flags = CookieFlags {
        name: name.to_string(),
        secure: false,
        http_only: false,
        samesite: None,
    };
    for attribute in parts {
        let (key, val) = attribute.split_once('=').unwrap_or((attribute, ""));
        match key.trim().to_ascii_lowercase().as_str() {
            "secure" => flags.secure = true,
            "httponly" => flags.http_only = true,
            "samesite" => flags.samesite = Some(val.trim().to_ascii_lowercase()),
            _ => {}
        }
    }
    Some(flags)
}

pub struct Cookies;

impl Check for Cookies {
    fn id(&self) -> &'static str {
        "cookies"
    }

    fn evaluate(&self, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError> {
        const EXPECTATION: &str = "cookies-secure-with-httponly-sessions";
        let response = auto_response(bundle)?;

        let cookies: Vec<CookieFlags> = response
            .header_values("set-cookie")
            .iter()
            .filter_map(|v| parse_set_cookie(v))
            .collect();
        debug!(count = cookies.len(), "Parsed Set-Cookie headers.");

        let code = if cookies.is_empty() {
            "cookies-not-found"
        } else if cookies.iter().any(|c| RE_SESSION_COOKIE.is_match(&c.name) && !c.http_only) {
            "cookies-session-without-httponly-flag"
        } else if cookies.iter().any(|c| !c.secure) {
            "cookies-without-secure-flag"
        } else {
            "cookies-secure-with-httponly-sessions"
        };
        resolve(EXPECTATION, code, json!({ "data": cookies }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analyzer::test_support::bundle_with_headers;

    #[test]
    fn parses_flags() {
        let flags = parse_set_cookie("SESSIONID=abc; Path=/; Secure; HttpOnly; SameSite=Lax").unwrap();
        assert_eq!(flags.name, "SESSIONID");
        assert!(flags.secure && flags.http_only);
        assert_eq!(flags.samesite.as_deref(), Some("lax"));
        assert!(parse_set_cookie("garbage").is_none());
        assert!(parse_set_cookie("=value").is_none());
    }

    #[test]
    fn cookie_results() {
        let result = |headers: &[(&str, &str)]| {
            Cookies
                .evaluate(&bundle_with_headers("https://example.com/", headers))
                .unwrap()
                .result
        };
        assert_eq!(result(&[]), "cookies-not-found");
        assert_eq!(
            result(&[("Set-Cookie", "sessionid=1; Secure; HttpOnly"), ("Set-Cookie", "theme=dark; Secure")]),
            "cookies-secure-with-httponly-sessions"
        );
        assert_eq!(result(&[("Set-Cookie", "theme=dark")]), "cookies-without-secure-flag");
        assert_eq!(result(&[("Set-Cookie", "auth_token=1; Secure")]), "cookies-session-without-httponly-flag");
    }
}
