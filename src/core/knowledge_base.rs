//! Static table of every result code an analyzer check can emit.
//! Checks only decide *which* code applies; whether that code passes and how
//! much it moves the score is looked up here, so grading stays in one place.

use crate::core::errors::CheckError;
use crate::core::models::CheckResult;
use std::fmt;

/// Groups result codes by the part of the response they judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FindingCategory {
    Headers,
    Cookies,
    Content,
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingCategory::Headers => write!(f, "HTTP Security Headers"),
            FindingCategory::Cookies => write!(f, "Cookies"),
            FindingCategory::Content => write!(f, "Page Content"),
        }
    }
}

/// Everything known about one result code.
pub struct FindingDetail {
    /// Machine-readable code, e.g. "hsts-not-implemented".
    pub code: &'static str,
    pub title: &'static str,
    pub category: FindingCategory,
    /// Added to the base score of 100 when this code is recorded.
    pub score_modifier: i32,
    pub pass: bool,
}

static FINDINGS: &[FindingDetail] = &[
    // --- Content Security Policy ---
    FindingDetail { code: "csp-implemented-with-no-unsafe-default-src-none", title: "CSP with default-src 'none' and no unsafe sources", category: FindingCategory::Headers, score_modifier: 10, pass: true },
    FindingDetail { code: "csp-implemented-with-no-unsafe", title: "CSP without unsafe sources", category: FindingCategory::Headers, score_modifier: 5, pass: true },
    FindingDetail { code: "csp-implemented-with-unsafe-eval", title: "CSP allows 'unsafe-eval'", category: FindingCategory::Headers, score_modifier: -10, pass: false },
    FindingDetail { code: "csp-implemented-with-unsafe-inline", title: "CSP allows 'unsafe-inline'", category: FindingCategory::Headers, score_modifier: -20, pass: false },
    FindingDetail { code: "csp-header-invalid", title: "CSP header could not be parsed", category: FindingCategory::Headers, score_modifier: -25, pass: false },
    FindingDetail { code: "csp-not-implemented", title: "CSP header missing", category: FindingCategory::Headers, score_modifier: -25, pass: false },

    // --- Cookies ---
    FindingDetail { code: "cookies-not-found", title: "No cookies set", category: FindingCategory::Cookies, score_modifier: 0, pass: true },
    FindingDetail { code: "cookies-secure-with-httponly-sessions", title: "All cookies Secure, session cookies HttpOnly", category: FindingCategory::Cookies, score_modifier: 0, pass: true },
    FindingDetail { code: "cookies-without-secure-flag", title: "Cookies set without the Secure flag", category: FindingCategory::Cookies, score_modifier: -20, pass: false },
    FindingDetail { code: "cookies-session-without-httponly-flag", title: "Session cookie set without HttpOnly", category: FindingCategory::Cookies, score_modifier: -30, pass: false },

    // --- Referrer Policy ---
    FindingDetail { code: "referrer-policy-private", title: "Referrer-Policy keeps referrers private", category: FindingCategory::Headers, score_modifier: 5, pass: true },
    FindingDetail { code: "referrer-policy-not-implemented", title: "Referrer-Policy header missing", category: FindingCategory::Headers, score_modifier: 0, pass: true },
    FindingDetail { code: "referrer-policy-unsafe", title: "Referrer-Policy leaks full URLs", category: FindingCategory::Headers, score_modifier: -5, pass: false },
    FindingDetail { code: "referrer-policy-header-invalid", title: "Referrer-Policy header invalid", category: FindingCategory::Headers, score_modifier: -5, pass: false },

    // --- Strict Transport Security ---
    FindingDetail { code: "hsts-implemented-max-age-at-least-six-months", title: "HSTS with max-age of at least six months", category: FindingCategory::Headers, score_modifier: 0, pass: true },
    FindingDetail { code: "hsts-implemented-max-age-less-than-six-months", title: "HSTS max-age below six months", category: FindingCategory::Headers, score_modifier: -10, pass: false },
    FindingDetail { code: "hsts-not-implemented", title: "HSTS header missing", category: FindingCategory::Headers, score_modifier: -20, pass: false },
    FindingDetail { code: "hsts-header-invalid", title: "HSTS header invalid", category: FindingCategory::Headers, score_modifier: -20, pass: false },
    FindingDetail { code: "hsts-not-implemented-no-https", title: "HSTS impossible, site not served over HTTPS", category: FindingCategory::Headers, score_modifier: -20, pass: false },

    // --- Subresource Integrity ---
    FindingDetail { code: "sri-implemented-and-external-scripts-loaded-securely", title: "External scripts use SRI over HTTPS", category: FindingCategory::Content, score_modifier: 5, pass: true },
    FindingDetail { code: "sri-not-implemented-but-all-scripts-loaded-from-secure-origin", title: "All scripts served from the same origin", category: FindingCategory::Content, score_modifier: 0, pass: true },
    FindingDetail { code: "sri-not-implemented-but-no-scripts-loaded", title: "No scripts loaded", category: FindingCategory::Content, score_modifier: 0, pass: true },
    FindingDetail { code: "sri-not-implemented-response-not-html", title: "Response is not HTML", category: FindingCategory::Content, score_modifier: 0, pass: true },
    FindingDetail { code: "sri-not-implemented-and-external-scripts-loaded-securely", title: "External scripts over HTTPS without SRI", category: FindingCategory::Content, score_modifier: -5, pass: false },
    FindingDetail { code: "sri-not-implemented-and-external-scripts-not-loaded-securely", title: "External scripts over plain HTTP without SRI", category: FindingCategory::Content, score_modifier: -50, pass: false },

    // --- X-Content-Type-Options ---
    FindingDetail { code: "x-content-type-options-nosniff", title: "X-Content-Type-Options set to nosniff", category: FindingCategory::Headers, score_modifier: 0, pass: true },
    FindingDetail { code: "x-content-type-options-not-implemented", title: "X-Content-Type-Options header missing", category: FindingCategory::Headers, score_modifier: -5, pass: false },
    FindingDetail { code: "x-content-type-options-header-invalid", title: "X-Content-Type-Options header invalid", category: FindingCategory::Headers, score_modifier: -5, pass: false },

    // --- X-Frame-Options ---
    FindingDetail { code: "x-frame-options-implemented-via-csp", title: "Framing restricted by CSP frame-ancestors", category: FindingCategory::Headers, score_modifier: 5, pass: true },
    FindingDetail { code: "x-frame-options-sameorigin-or-deny", title: "X-Frame-Options set to SAMEORIGIN or DENY", category: FindingCategory::Headers, score_modifier: 0, pass: true },
    FindingDetail { code: "x-frame-options-not-implemented", title: "X-Frame-Options header missing", category: FindingCategory::Headers, score_modifier: -20, pass: false },
    FindingDetail { code: "x-frame-options-header-invalid", title: "X-Frame-Options header invalid", category: FindingCategory::Headers, score_modifier: -20, pass: false },

    // --- X-XSS-Protection ---
    FindingDetail { code: "x-xss-protection-not-needed-due-to-csp", title: "X-XSS-Protection superseded by a strict CSP", category: FindingCategory::Headers, score_modifier: 0, pass: true },
    FindingDetail { code: "x-xss-protection-enabled-mode-block", title: "X-XSS-Protection enabled in block mode", category: FindingCategory::Headers, score_modifier: 0, pass: true },
    FindingDetail { code: "x-xss-protection-enabled", title: "X-XSS-Protection enabled", category: FindingCategory::Headers, score_modifier: 0, pass: true },
    FindingDetail { code: "x-xss-protection-disabled", title: "X-XSS-Protection explicitly disabled", category: FindingCategory::Headers, score_modifier: -10, pass: false },
    FindingDetail { code: "x-xss-protection-not-implemented", title: "X-XSS-Protection header missing", category: FindingCategory::Headers, score_modifier: -10, pass: false },
    FindingDetail { code: "x-xss-protection-header-invalid", title: "X-XSS-Protection header invalid", category: FindingCategory::Headers, score_modifier: -10, pass: false },
];

/// Retrieves the full detail for a given result code.
pub fn get_finding_detail(code: &str) -> Option<&'static FindingDetail> {
    FINDINGS.iter().find(|f| f.code == code)
}

/// Builds a [`CheckResult`] for `code`, taking pass/modifier from the table.
pub fn resolve(
    expectation: &'static str,
    code: &'static str,
    output: serde_json::Value,
) -> Result<CheckResult, CheckError> {
    let detail = get_finding_detail(code).ok_or(CheckError::UnknownResult(code))?;
    Ok(CheckResult {
        expectation: expectation.to_string(),
        result: detail.code.to_string(),
        pass: detail.pass,
        score_modifier: detail.score_modifier,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique() {
        let mut seen = HashSet::new();
        for finding in FINDINGS {
            assert!(seen.insert(finding.code), "duplicate code {}", finding.code);
        }
    }

    #[test]
    fn passing_codes_never_lower_the_score() {
        for finding in FINDINGS.iter().filter(|f| f.pass) {
            assert!(finding.score_modifier >= 0, "{} passes but costs points", finding.code);
        }
    }

    #[test]
    fn resolve_rejects_unknown_codes() {
        let err = resolve("x", "no-such-code", serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, CheckError::UnknownResult("no-such-code")));
    }

    #[test]
    fn resolve_copies_modifier_and_pass() {
        let result = resolve("hsts-implemented-max-age-at-least-six-months", "hsts-not-implemented", serde_json::json!({})).unwrap();
        assert_eq!(result.score_modifier, -20);
        assert!(!result.pass);
        assert_eq!(get_finding_detail("hsts-not-implemented").unwrap().category, FindingCategory::Headers);
    }
}
