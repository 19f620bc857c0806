// src/core/retriever.rs

use async_trait::async_trait;
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use crate::core::analyzer::subresource_integrity::ROOT_PAGE;
use crate::core::errors::RetrieveError;
use crate::core::models::{AUTO, ResponseSnapshot, RetrievalBundle};

/// Origin sent with the CORS probe.
pub const CORS_ORIGIN: &str = "https://http-observatory.security.mozilla.org";

const MAX_REDIRECTS: usize = 10;

/// Fetches everything the analyzer checks need for one hostname.
///
/// An implementation may block for a long time. It reports a host it cannot
/// reach at all through `auto == None` in the bundle, never through `Err`.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve_all(&self, hostname: &str) -> Result<RetrievalBundle, RetrieveError>;
}

/// [`Retriever`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: reqwest::Client,
    https_base: Option<Url>,
    http_base: Option<Url>,
}

impl HttpRetriever {
    pub fn new(user_agent: &str, request_timeout: Duration) -> Result<Self, RetrieveError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self {
            client,
            https_base: None,
            http_base: None,
        })
    }

    /// Sends the "https" and "http" probes to fixed base URLs instead of the
    /// hostname. Used to point the retriever at a local server.
    pub fn with_base_urls(mut self, https_base: Url, http_base: Url) -> Self {
        self.https_base = Some(https_base);
        self.http_base = Some(http_base);
        self
    }

    fn probe_url(&self, scheme: &str, hostname: &str) -> Result<Url, RetrieveError> {
        let base = match scheme {
            "https" => self.https_base.as_ref(),
            _ => self.http_base.as_ref(),
        };
        match base {
            Some(url) => Ok(url.clone()),
            None => Url::parse(&format!("{}://{}/", scheme, hostname))
                .map_err(|_| RetrieveError::Hostname(hostname.to_string())),
        }
    }

    async fn fetch(&self, url: &Url, origin: Option<&str>) -> Option<ResponseSnapshot> {
        let mut request = self.client.get(url.clone());
        if let Some(origin) = origin {
            request = request.header(reqwest::header::ORIGIN, origin);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %url, error = %e, timeout = e.is_timeout(), "Request failed.");
                return None;
            }
        };

        let final_url = response.url().clone();
        let status = response.status().as_u16();
        let mut snapshot = ResponseSnapshot {
            url: final_url.to_string(),
            status,
            verified: final_url.scheme() == "https",
            redirects: if &final_url != url {
                vec![url.to_string(), final_url.to_string()]
            } else {
                Vec::new()
            },
            ..Default::default()
        };
        for (name, value) in response.headers() {
            let value = value.to_str().unwrap_or("[Invalid UTF-8]").to_string();
            snapshot.headers.entry(name.as_str().to_ascii_lowercase()).or_default().push(value);
        }

        snapshot.body = match response.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(url = %url, error = %e, "Failed to read response body.");
                None
            }
        };
        debug!(url = %snapshot.url, status, "Response captured.");
        Some(snapshot)
    }
}

/// Reduces user input such as `https://Example.com/path` to its host.
pub fn normalize_hostname(raw: &str) -> String {
    let raw = raw.trim();
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    Url::parse(&with_scheme)
        .ok()
        .and_then(|url| url.host_str().map(String::from))
        .unwrap_or_else(|| raw.to_string())
}

/// Rejects anything that is not a bare hostname.
pub fn validate_hostname(hostname: &str) -> Result<(), RetrieveError> {
    let invalid = || RetrieveError::Hostname(hostname.to_string());
    if hostname.is_empty() || hostname.contains(['/', '?', '#', '@', ' ']) {
        return Err(invalid());
    }
    let url = Url::parse(&format!("https://{}/", hostname)).map_err(|_| invalid())?;
    url.host_str().map(|_| ()).ok_or_else(invalid)
}

#[async_trait]
impl Retriever for HttpRetriever {
    #[instrument(skip(self))]
    async fn retrieve_all(&self, hostname: &str) -> Result<RetrievalBundle, RetrieveError> {
        validate_hostname(hostname)?;
        let https_url = self.probe_url("https", hostname)?;
        let http_url = self.probe_url("http", hostname)?;

        let (https, http) = tokio::join!(self.fetch(&https_url, None), self.fetch(&http_url, None));
        let auto = https.clone().or_else(|| http.clone());

        let cors = match auto.as_ref().and_then(|a| Url::parse(&a.url).ok()) {
            Some(url) => self.fetch(&url, Some(CORS_ORIGIN)).await,
            None => None,
        };
        let root_page = auto.as_ref().and_then(|a| a.body.clone());

        info!(
            reachable = auto.is_some(),
            https = https.is_some(),
            http = http.is_some(),
            "Retrieval finished."
        );
        Ok(RetrievalBundle::new(hostname)
            .with_response(AUTO, auto)
            .with_response("https", https)
            .with_response("http", http)
            .with_response("cors", cors)
            .with_resource(ROOT_PAGE, root_page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_validation() {
        assert!(validate_hostname("example.com").is_ok());
        assert!(validate_hostname("sub.example.com:8443").is_ok());
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("example.com/path").is_err());
        assert!(validate_hostname("user@example.com").is_err());
    }

    #[test]
    fn hostnames_are_normalized() {
        assert_eq!(normalize_hostname("https://Example.com/login?next=1"), "example.com");
        assert_eq!(normalize_hostname("  example.com "), "example.com");
        assert_eq!(normalize_hostname("http://mozilla.org:8080"), "mozilla.org");
    }

    #[test]
    fn probe_urls_use_hostname_by_default() {
        let retriever = HttpRetriever::new("test", Duration::from_secs(1)).unwrap();
        assert_eq!(retriever.probe_url("https", "example.com").unwrap().as_str(), "https://example.com/");
        assert_eq!(retriever.probe_url("http", "example.com").unwrap().as_str(), "http://example.com/");
    }
}
