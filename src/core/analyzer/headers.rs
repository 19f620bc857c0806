// src/core/analyzer/headers.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{Check, auto_response};
use crate::core::errors::CheckError;
use crate::core::knowledge_base::resolve;
use crate::core::models::{CheckResult, ResponseSnapshot, RetrievalBundle};

/// Six months, the minimum HSTS max-age considered adequate.
const HSTS_MINIMUM_MAX_AGE: u64 = 15_768_000;

static RE_HSTS_MAX_AGE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)^max-age\s*=\s*"?(\d+)"?$"#).unwrap());
static RE_XXSS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*([01])\s*(;\s*mode\s*=\s*block\s*)?(;\s*report\s*=\s*\S+\s*)?;?\s*$").unwrap());

pub type CspPolicy = BTreeMap<String, Vec<String>>;

/// Parses a Content-Security-Policy value into directive -> sources.
///
/// Returns `None` for an empty policy or when a directive appears twice.
pub fn parse_csp(value: &str) -> Option<CspPolicy> {
    let mut policy = CspPolicy::new();
    for directive in value.split(';').map(str::trim).filter(|d| !d.is_empty()) {
        let mut parts = directive.split_whitespace();
        let name = parts.next()?.to_ascii_lowercase();
        let sources = parts.map(|s| s.to_ascii_lowercase()).collect();
        if policy.insert(name, sources).is_some() {
            return None;
        }
    }
    if policy.is_empty() { None } else { Some(policy) }
}

// Effective script sources: script-src, falling back to default-src.
fn script_sources(policy: &CspPolicy) -> Option<&Vec<String>> {
    policy.get("script-src").or_else(|| policy.get("default-src"))
}

fn allows_inline_scripts(policy: &CspPolicy) -> bool {
    match script_sources(policy) {
        Some(sources) => sources.iter().any(|s| s == "'unsafe-inline'" || s == "data:"),
        None => true,
    }
}

fn csp_of(response: &ResponseSnapshot) -> Option<CspPolicy> {
    response.header("content-security-policy").and_then(parse_csp)
}

// --- Content-Security-Policy ---

pub struct ContentSecurityPolicy;

impl Check for ContentSecurityPolicy {
    fn id(&self) -> &'static str {
        "content_security_policy"
    }

    fn evaluate(&self, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError> {
        const EXPECTATION: &str = "csp-implemented-with-no-unsafe";
        let response = auto_response(bundle)?;

        let Some(raw) = response.header("content-security-policy") else {
            debug!("CSP header missing.");
            return resolve(EXPECTATION, "csp-not-implemented", json!({ "data": null }));
        };
        let Some(policy) = parse_csp(raw) else {
            warn!(value = raw, "CSP header could not be parsed.");
            return resolve(EXPECTATION, "csp-header-invalid", json!({ "data": raw }));
        };

        let code = if allows_inline_scripts(&policy) {
            "csp-implemented-with-unsafe-inline"
        } else if script_sources(&policy).is_some_and(|s| s.iter().any(|v| v == "'unsafe-eval'")) {
            "csp-implemented-with-unsafe-eval"
        } else if policy.get("default-src").is_some_and(|s| s == &["'none'"]) {
            "csp-implemented-with-no-unsafe-default-src-none"
        } else {
            "csp-implemented-with-no-unsafe"
        };
        resolve(EXPECTATION, code, json!({ "data": policy }))
    }
}

// --- Referrer-Policy ---

const PRIVATE_REFERRER_POLICIES: &[&str] =
    &["no-referrer", "same-origin", "strict-origin", "strict-origin-when-cross-origin"];
const UNSAFE_REFERRER_POLICIES: &[&str] =
    &["origin", "origin-when-cross-origin", "unsafe-url", "no-referrer-when-downgrade"];

pub struct ReferrerPolicy;

impl Check for ReferrerPolicy {
    fn id(&self) -> &'static str {
        "referrer_policy"
    }

    fn evaluate(&self, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError> {
        const EXPECTATION: &str = "referrer-policy-private";
        let response = auto_response(bundle)?;

        let Some(raw) = response.header("referrer-policy") else {
            return resolve(EXPECTATION, "referrer-policy-not-implemented", json!({ "data": null }));
        };

        // Browsers honour the last policy they understand.
        let effective = raw
            .split(',')
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| PRIVATE_REFERRER_POLICIES.contains(&p.as_str()) || UNSAFE_REFERRER_POLICIES.contains(&p.as_str()))
            .last();

        let code = match effective.as_deref() {
            Some(p) if PRIVATE_REFERRER_POLICIES.contains(&p) => "referrer-policy-private",
            Some(_) => "referrer-policy-unsafe",
            None => "referrer-policy-header-invalid",
        };
        resolve(EXPECTATION, code, json!({ "data": raw }))
    }
}

// --- Strict-Transport-Security ---

pub struct StrictTransportSecurity;

impl Check for StrictTransportSecurity {
    fn id(&self) -> &'static str {
        "strict_transport_security"
    }

    fn evaluate(&self, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError> {
        const EXPECTATION: &str = "hsts-implemented-max-age-at-least-six-months";
        let response = auto_response(bundle)?;

        if !response.verified {
            return resolve(EXPECTATION, "hsts-not-implemented-no-https", json!({ "data": null }));
        }
        let Some(raw) = response.header("strict-transport-security") else {
            return resolve(EXPECTATION, "hsts-not-implemented", json!({ "data": null }));
        };

        let mut max_age = None;
        let mut include_subdomains = false;
        let mut preload = false;
        for directive in raw.split(';').map(str::trim).filter(|d| !d.is_empty()) {
            if let Some(caps) = RE_HSTS_MAX_AGE.captures(directive) {
                max_age = caps[1].parse::<u64>().ok();
            } else if directive.eq_ignore_ascii_case("includesubdomains") {
                include_subdomains = true;
            } else if directive.eq_ignore_ascii_case("preload") {
                preload = true;
            }
        }

        let output = json!({
            "data": raw,
            "max-age": max_age,
            "includeSubDomains": include_subdomains,
            "preload": preload,
        });
        let code = match max_age {
            None => "hsts-header-invalid",
            Some(age) if age >= HSTS_MINIMUM_MAX_AGE => "hsts-implemented-max-age-at-least-six-months",
            Some(_) => "hsts-implemented-max-age-less-than-six-months",
        };
        resolve(EXPECTATION, code, output)
    }
}

// --- X-Content-Type-Options ---

pub struct XContentTypeOptions;

impl Check for XContentTypeOptions {
    fn id(&self) -> &'static str {
        "x_content_type_options"
    }

    fn evaluate(&self, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError> {
        const EXPECTATION: &str = "x-content-type-options-nosniff";
        let response = auto_response(bundle)?;

        let code = match response.header("x-content-type-options") {
            None => "x-content-type-options-not-implemented",
            Some(v) if v.trim().eq_ignore_ascii_case("nosniff") => "x-content-type-options-nosniff",
            Some(_) => "x-content-type-options-header-invalid",
        };
        resolve(EXPECTATION, code, json!({ "data": response.header("x-content-type-options") }))
    }
}

// --- X-Frame-Options ---

pub struct XFrameOptions;

impl Check for XFrameOptions {
    fn id(&self) -> &'static str {
        "x_frame_options"
    }

    fn evaluate(&self, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError> {
        const EXPECTATION: &str = "x-frame-options-sameorigin-or-deny";
        let response = auto_response(bundle)?;
        let raw = response.header("x-frame-options");

        // frame-ancestors supersedes X-Frame-Options in every current browser.
        if csp_of(response).is_some_and(|p| p.contains_key("frame-ancestors")) {
            return resolve(EXPECTATION, "x-frame-options-implemented-via-csp", json!({ "data": raw }));
        }

        let code = match raw.map(|v| v.trim().to_ascii_uppercase()) {
            None => "x-frame-options-not-implemented",
            Some(v) if v == "DENY" || v == "SAMEORIGIN" || v.starts_with("ALLOW-FROM") => {
                "x-frame-options-sameorigin-or-deny"
            }
            Some(_) => "x-frame-options-header-invalid",
        };
        resolve(EXPECTATION, code, json!({ "data": raw }))
    }
}

// --- X-XSS-Protection ---

pub struct XXssProtection;

impl Check for XXssProtection {
    fn id(&self) -> &'static str {
        "x_xss_protection"
    }

    fn evaluate(&self, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError> {
        const EXPECTATION: &str = "x-xss-protection-enabled-mode-block";
        let response = auto_response(bundle)?;
        let raw = response.header("x-xss-protection");

        if csp_of(response).is_some_and(|p| !allows_inline_scripts(&p)) {
            return resolve(EXPECTATION, "x-xss-protection-not-needed-due-to-csp", json!({ "data": raw }));
        }

        let code = match raw {
            None => "x-xss-protection-not-implemented",
            Some(v) => match RE_XXSS.captures(v) {
                None => "x-xss-protection-header-invalid",
                Some(caps) if &caps[1] == "0" => "x-xss-protection-disabled",
                Some(caps) if caps.get(2).is_some() => "x-xss-protection-enabled-mode-block",
                Some(_) => "x-xss-protection-enabled",
            },
        };
        resolve(EXPECTATION, code, json!({ "data": raw }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analyzer::test_support::bundle_with_headers;

    fn result_of(check: &dyn Check, headers: &[(&str, &str)]) -> String {
        let bundle = bundle_with_headers("https://example.com/", headers);
        check.evaluate(&bundle).unwrap().result
    }

    #[test]
    fn csp_parsing() {
        let policy = parse_csp("default-src 'self'; script-src 'self' cdn.example.com").unwrap();
        assert_eq!(policy["script-src"], vec!["'self'", "cdn.example.com"]);
        assert!(parse_csp("  ;  ").is_none());
        assert!(parse_csp("script-src a; script-src b").is_none());
    }

    #[test]
    fn csp_results() {
        let check = ContentSecurityPolicy;
        assert_eq!(result_of(&check, &[]), "csp-not-implemented");
        assert_eq!(result_of(&check, &[("Content-Security-Policy", ";")]), "csp-header-invalid");
        assert_eq!(
            result_of(&check, &[("Content-Security-Policy", "default-src 'self' 'unsafe-inline'")]),
            "csp-implemented-with-unsafe-inline"
        );
        assert_eq!(
            result_of(&check, &[("Content-Security-Policy", "img-src 'self'")]),
            "csp-implemented-with-unsafe-inline"
        );
        assert_eq!(
            result_of(&check, &[("Content-Security-Policy", "script-src 'self' 'unsafe-eval'")]),
            "csp-implemented-with-unsafe-eval"
        );
        assert_eq!(
            result_of(&check, &[("Content-Security-Policy", "default-src 'none'")]),
            "csp-implemented-with-no-unsafe-default-src-none"
        );
        assert_eq!(
            result_of(&check, &[("Content-Security-Policy", "default-src 'self'")]),
            "csp-implemented-with-no-unsafe"
        );
    }

    #[test]
    fn hsts_results() {
        let check = StrictTransportSecurity;
        assert_eq!(result_of(&check, &[]), "hsts-not-implemented");
        assert_eq!(
            result_of(&check, &[("Strict-Transport-Security", "max-age=31536000; includeSubDomains")]),
            "hsts-implemented-max-age-at-least-six-months"
        );
        assert_eq!(
            result_of(&check, &[("Strict-Transport-Security", "max-age=300")]),
            "hsts-implemented-max-age-less-than-six-months"
        );
        assert_eq!(result_of(&check, &[("Strict-Transport-Security", "preload")]), "hsts-header-invalid");

        let plain = bundle_with_headers("http://example.com/", &[("Strict-Transport-Security", "max-age=31536000")]);
        assert_eq!(check.evaluate(&plain).unwrap().result, "hsts-not-implemented-no-https");
    }

    #[test]
    fn referrer_policy_uses_last_known_value() {
        let check = ReferrerPolicy;
        assert_eq!(result_of(&check, &[]), "referrer-policy-not-implemented");
        assert_eq!(result_of(&check, &[("Referrer-Policy", "no-referrer")]), "referrer-policy-private");
        assert_eq!(result_of(&check, &[("Referrer-Policy", "no-referrer, unsafe-url")]), "referrer-policy-unsafe");
        assert_eq!(result_of(&check, &[("Referrer-Policy", "unsafe-url, bogus")]), "referrer-policy-unsafe");
        assert_eq!(result_of(&check, &[("Referrer-Policy", "bogus")]), "referrer-policy-header-invalid");
    }

    #[test]
    fn framing_and_sniffing() {
        assert_eq!(result_of(&XContentTypeOptions, &[("X-Content-Type-Options", "NoSniff")]), "x-content-type-options-nosniff");
        assert_eq!(result_of(&XContentTypeOptions, &[("X-Content-Type-Options", "sniff")]), "x-content-type-options-header-invalid");
        assert_eq!(result_of(&XFrameOptions, &[("X-Frame-Options", "deny")]), "x-frame-options-sameorigin-or-deny");
        assert_eq!(result_of(&XFrameOptions, &[("X-Frame-Options", "whatever")]), "x-frame-options-header-invalid");
        assert_eq!(
            result_of(&XFrameOptions, &[("Content-Security-Policy", "frame-ancestors 'none'")]),
            "x-frame-options-implemented-via-csp"
        );
    }

    #[test]
    fn xss_protection_results() {
        let check = XXssProtection;
        assert_eq!(result_of(&check, &[]), "x-xss-protection-not-implemented");
        assert_eq!(result_of(&check, &[("X-XSS-Protection", "0")]), "x-xss-protection-disabled");
        assert_eq!(result_of(&check, &[("X-XSS-Protection", "1; mode=block")]), "x-xss-protection-enabled-mode-block");
        assert_eq!(result_of(&check, &[("X-XSS-Protection", "1")]), "x-xss-protection-enabled");
        assert_eq!(result_of(&check, &[("X-XSS-Protection", "yes")]), "x-xss-protection-header-invalid");
        assert_eq!(
            result_of(&check, &[("Content-Security-Policy", "script-src 'self'")]),
            "x-xss-protection-not-needed-due-to-csp"
        );
    }
}
