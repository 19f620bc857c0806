// src/core/analyzer/subresource_integrity.rs

use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{Check, auto_response};
use crate::core::errors::CheckError;
use crate::core::knowledge_base::resolve;
use crate::core::models::{CheckResult, RetrievalBundle};

/// Resource key under which the retriever stores the body of the root page.
pub const ROOT_PAGE: &str = "__path__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptTag {
    pub src: String,
    pub integrity: Option<String>,
    pub crossorigin: Option<String>,
    #[serde(skip)]
    external: bool,
    #[serde(skip)]
    secure: bool,
}

/// Collects every `<script src>` in `html`, resolving sources against `base`.
pub fn collect_scripts(html: &str, base: &Url) -> Vec<ScriptTag> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script[src]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let raw = el.value().attr("src")?;
            let resolved = base.join(raw).ok()?;
            Some(ScriptTag {
                src: raw.to_string(),
                integrity: el.value().attr("integrity").map(String::from),
                crossorigin: el.value().attr("crossorigin").map(String::from),
                external: resolved.host_str() != base.host_str(),
                secure: resolved.scheme() == "https",
            })
        })
        .collect()
}

pub struct SubresourceIntegrity;

impl Check for SubresourceIntegrity {
    fn id(&self) -> &'static str {
        "subresource_integrity"
    }

    fn evaluate(&self, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError> {
        const EXPECTATION: &str = "sri-implemented-and-external-scripts-loaded-securely";
        let response = auto_response(bundle)?;

        let is_html = response
            .header("content-type")
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("html"));
        let body = bundle.resource(ROOT_PAGE).or(response.body.as_deref());
        let (true, Some(body)) = (is_html, body) else {
            return resolve(EXPECTATION, "sri-not-implemented-response-not-html", json!({ "data": [] }));
        };

        let base = Url::parse(&response.url).map_err(|e| CheckError::Evaluation(format!("invalid response url '{}': {}", response.url, e)))?;
        let scripts = collect_scripts(body, &base);
        debug!(scripts = scripts.len(), "Collected script tags.");

        let external: Vec<&ScriptTag> = scripts.iter().filter(|s| s.external).collect();
        let code = if scripts.is_empty() {
            "sri-not-implemented-but-no-scripts-loaded"
        } else if external.is_empty() {
            "sri-not-implemented-but-all-scripts-loaded-from-secure-origin"
        } else if external.iter().any(|s| !s.secure && s.integrity.is_none()) {
            "sri-not-implemented-and-external-scripts-not-loaded-securely"
        } else if external.iter().all(|s| s.secure && s.integrity.is_some()) {
            "sri-implemented-and-external-scripts-loaded-securely"
        } else {
            "sri-not-implemented-and-external-scripts-loaded-securely"
        };
        resolve(EXPECTATION, code, json!({ "data": scripts }))
    }
}
