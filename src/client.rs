//! reqwest-backed transport and project reference helpers.

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::sync::OnceLock;
use tracing::{debug, info};
use url::Url;

use crate::contract::{ApiRequest, ApiResponse, BodyFormat, Fetch, Method};
use crate::error::ExportError;

pub const DEFAULT_API_HOST_TEST: &str = "https://api.test.osf.io/v2";
pub const DEFAULT_API_HOST_PROD: &str = "https://api.osf.io/v2";

/// Pinned so response shapes stay stable.
const JSON_API_ACCEPT: &str = "application/vnd.api+json;version=2.20";

fn user_agent() -> String {
    format!("osf-export/{} (Rust)", env!("CARGO_PKG_VERSION"))
}

/// [`Fetch`] over HTTPS with an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpFetcher {
    /// An empty token means anonymous requests.
    pub fn new(token: impl Into<String>) -> Result<Self, ExportError> {
        let token = token.into();
        let client = reqwest::Client::builder()
            .build()
            .map_err(|source| ExportError::Transport {
                url: String::new(),
                source,
            })?;
        Ok(Self {
            client,
            token: (!token.trim().is_empty()).then_some(token),
        })
    }

    pub fn anonymous() -> Result<Self, ExportError> {
        Self::new("")
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &ApiRequest) -> Result<ApiResponse, ExportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
        }
        .header(USER_AGENT, user_agent());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if request.format == BodyFormat::JsonApi {
            builder = builder.header(ACCEPT, JSON_API_ACCEPT);
        }
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let transport = |source| ExportError::Transport {
            url: request.url.clone(),
            source,
        };
        let response = builder.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport)?.to_vec();
        debug!(url = %request.url, status = status, bytes = body.len(), "HTTP exchange");
        Ok(ApiResponse { status, body })
    }
}

/// Test or production API root.
pub fn api_host(use_test: bool, test_host: &str, prod_host: &str) -> String {
    let host = if use_test { test_host } else { prod_host };
    host.trim_end_matches('/').to_string()
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static pattern compiles"))
}

/// Project id from a project URL, an API node URL or a bare id.
///
/// Blank input means every accessible project and gives `None`.
pub fn extract_project_id(input: &str) -> Result<Option<String>, ExportError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let malformed = || ExportError::MalformedUrl(input.to_string());

    let path = if trimmed.contains("://") {
        let parsed = Url::parse(trimmed).map_err(|_| malformed())?;
        parsed.path().to_string()
    } else {
        trimmed.to_string()
    };

    let id = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    if id_pattern().is_match(id) {
        Ok(Some(id.to_string()))
    } else {
        Err(malformed())
    }
}

/// True when an anonymous GET of `url` answers 200.
pub async fn is_public(fetcher: &dyn Fetch, url: &str) -> bool {
    let request = ApiRequest::raw(url);
    let public = match fetcher.fetch(&request).await {
        Ok(response) => response.status == 200,
        Err(e) => {
            debug!(url = %url, error = %e, "Visibility probe failed");
            false
        }
    };
    info!(url = %url, public = public, "Checked project visibility");
    public
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_come_from_the_last_path_segment() {
        assert_eq!(
            extract_project_id("https://osf.io/x/").unwrap().as_deref(),
            Some("x")
        );
        assert_eq!(
            extract_project_id("https://api.test.osf.io/v2/nodes/abc12/").unwrap().as_deref(),
            Some("abc12")
        );
        assert_eq!(extract_project_id("  x  ").unwrap().as_deref(), Some("x"));
        assert_eq!(extract_project_id("").unwrap(), None);
        assert_eq!(extract_project_id("   ").unwrap(), None);
    }

    #[test]
    fn malformed_references_are_rejected() {
        assert!(matches!(
            extract_project_id("https://"),
            Err(ExportError::MalformedUrl(_))
        ));
        assert!(matches!(
            extract_project_id("https://osf.io/"),
            Err(ExportError::MalformedUrl(_))
        ));
        assert!(matches!(
            extract_project_id("osf.io/x?y=z"),
            Err(ExportError::MalformedUrl(_))
        ));
    }

    #[test]
    fn api_host_picks_and_trims() {
        assert_eq!(api_host(true, "https://t/v2/", "https://p/v2"), "https://t/v2");
        assert_eq!(api_host(false, "https://t/v2/", "https://p/v2"), "https://p/v2");
    }
}
