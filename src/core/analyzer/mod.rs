// src/core/analyzer/mod.rs

// Analyzer checks and the ordered registry the scan controller walks.
pub mod cookies;
pub mod headers;
pub mod subresource_integrity;

use crate::core::errors::CheckError;
use crate::core::models::{CheckResult, ResponseSnapshot, RetrievalBundle};

use self::cookies::Cookies;
use self::headers::{
    ContentSecurityPolicy, ReferrerPolicy, StrictTransportSecurity, XContentTypeOptions, XFrameOptions,
    XXssProtection,
};
use self::subresource_integrity::SubresourceIntegrity;

/// A single named evaluation over a [`RetrievalBundle`].
///
/// Implementations must be deterministic: the same bundle always yields the
/// same result, so that a re-run scan records identical values.
pub trait Check: Send + Sync {
    /// Stable identifier in snake_case, e.g. `strict_transport_security`.
    fn id(&self) -> &'static str;

    fn evaluate(&self, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError>;
}

/// The name a check's results are stored under: its id with `_` mapped to `-`.
pub fn check_name(id: &str) -> String {
    id.replace('_', "-")
}

/// Adapter turning a closure into a [`Check`].
pub struct FnCheck<F> {
    id: &'static str,
    f: F,
}

pub fn from_fn<F>(id: &'static str, f: F) -> FnCheck<F>
where
    F: Fn(&RetrievalBundle) -> Result<CheckResult, CheckError> + Send + Sync,
{
    FnCheck { id, f }
}

impl<F> Check for FnCheck<F>
where
    F: Fn(&RetrievalBundle) -> Result<CheckResult, CheckError> + Send + Sync,
{
    fn id(&self) -> &'static str {
        self.id
    }

    fn evaluate(&self, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError> {
        (self.f)(bundle)
    }
}

/// Ordered collection of checks. Iteration order is registration order.
#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<Box<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, check: impl Check + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// The checks a production worker runs, in the order results are recorded.
    pub fn default_checks() -> Self {
        Self::new()
            .register(ContentSecurityPolicy)
            .register(Cookies)
            .register(ReferrerPolicy)
            .register(StrictTransportSecurity)
            .register(SubresourceIntegrity)
            .register(XContentTypeOptions)
            .register(XFrameOptions)
            .register(XXssProtection)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Check> {
        self.checks.iter().map(|c| c.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|c| check_name(c.id())).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter().map(|c| c.id())).finish()
    }
}

// Every shipped check reads the primary response; a bundle without one never
// reaches the analyzer, but a direct caller may still pass it.
pub(crate) fn auto_response(bundle: &RetrievalBundle) -> Result<&ResponseSnapshot, CheckError> {
    bundle.auto().ok_or(CheckError::MissingResponse(crate::core::models::AUTO))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::core::models::{AUTO, ResponseSnapshot, RetrievalBundle};

    pub fn bundle_with_headers(url: &str, headers: &[(&str, &str)]) -> RetrievalBundle {
        let mut response = ResponseSnapshot {
            url: url.to_string(),
            status: 200,
            verified: url.starts_with("https://"),
            ..Default::default()
        };
        for (name, value) in headers {
            response
                .headers
                .entry(name.to_ascii_lowercase())
                .or_default()
                .push(value.to_string());
        }
        RetrievalBundle::new("example.com").with_response(AUTO, Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_names_are_hyphenated() {
        assert_eq!(check_name("content_security_policy"), "content-security-policy");
        assert_eq!(check_name("cookies"), "cookies");
    }

    #[test]
    fn default_registry_order_is_stable() {
        assert_eq!(
            CheckRegistry::default_checks().names(),
            vec![
                "content-security-policy",
                "cookies",
                "referrer-policy",
                "strict-transport-security",
                "subresource-integrity",
                "x-content-type-options",
                "x-frame-options",
                "x-xss-protection",
            ]
        );
    }

    #[test]
    fn missing_auto_is_a_check_error() {
        let bundle = RetrievalBundle::new("example.com");
        for check in CheckRegistry::default_checks().iter() {
            assert!(matches!(check.evaluate(&bundle), Err(CheckError::MissingResponse(_))));
        }
    }
}
