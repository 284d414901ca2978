//! Web search over the Serper API.
//!
//! Failures never reach the caller: a missing key, a network error, a bad
//! status or an undecodable body are logged and turn into an empty result.

use async_trait::async_trait;
use reqwest::{Client, Proxy};

use crate::config::SearchConfig;
use crate::error::{MultiChatError, Result};
use crate::models::{OrganicResult, SearchRequest, SearchResponse};

pub const NO_RESULTS: &str = "未找到搜索结果";
pub const SEARCH_EXCEPTION_PREFIX: &str = "搜索异常: ";

/// Upper bound on retained organic results
pub const MAX_RESULTS: usize = 10;
/// Requested result count when going through a proxy
pub const PROXIED_RESULTS: usize = 5;

/// Source of formatted web snippets for prompt augmentation
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Formatted snippets, [`NO_RESULTS`], or a [`SEARCH_EXCEPTION_PREFIX`] message
    async fn web_search(&self, query: &str) -> String;
}

pub struct SerperClient {
    endpoint: String,
    api_key: Option<String>,
    proxy_url: Option<String>,
}

impl SerperClient {
    pub fn new(cfg: &SearchConfig) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
            proxy_url: cfg.proxy_url.clone().filter(|p| !p.is_empty()),
        }
    }

    /// Body of the outbound request for `query`
    pub fn request_for(&self, query: &str) -> SearchRequest {
        let num = if self.proxy_url.is_some() {
            PROXIED_RESULTS
        } else {
            MAX_RESULTS
        };
        SearchRequest {
            q: query.to_string(),
            num,
        }
    }

    fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder();
        if let Some(proxy) = &self.proxy_url {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        Ok(builder.build()?)
    }

    /// Organic results for `query`, at most the requested count.
    ///
    /// Only a client that cannot be built (bad proxy address) is an error.
    pub async fn search(&self, query: &str) -> Result<Vec<OrganicResult>> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::error!("SERPER_API_KEY not set");
            return Ok(Vec::new());
        };

        let client = self.build_client()?;
        let req = self.request_for(query);

        match self.fetch(&client, api_key, &req).await {
            Ok(results) => {
                tracing::info!(
                    count = results.len(),
                    proxied = self.proxy_url.is_some(),
                    "web search complete"
                );
                Ok(retain_results(results, req.num))
            }
            Err(MultiChatError::Http(e)) => {
                tracing::error!("Search request failed: {}", e);
                Ok(Vec::new())
            }
            Err(MultiChatError::Json(e)) => {
                tracing::error!("Search JSON error: {}", e);
                Ok(Vec::new())
            }
            Err(e) => {
                tracing::error!("Unknown search error: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn fetch(
        &self,
        client: &Client,
        api_key: &str,
        req: &SearchRequest,
    ) -> Result<Vec<OrganicResult>> {
        let response = client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .header("Content-Type", "application/json")
            .json(req)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;
        Ok(parsed.organic)
    }
}

#[async_trait]
impl WebSearch for SerperClient {
    async fn web_search(&self, query: &str) -> String {
        match self.search(query).await {
            Ok(results) if results.is_empty() => NO_RESULTS.to_string(),
            Ok(results) => format_results(&results),
            Err(e) => format!("{SEARCH_EXCEPTION_PREFIX}{e}"),
        }
    }
}

/// Keep the first `requested` results, never more than [`MAX_RESULTS`]
pub fn retain_results(mut results: Vec<OrganicResult>, requested: usize) -> Vec<OrganicResult> {
    results.truncate(requested.min(MAX_RESULTS));
    results
}

/// Three-line blocks separated by a blank line
pub fn format_results(results: &[OrganicResult]) -> String {
    results
        .iter()
        .map(|r| {
            format!(
                "Title: {}\nLink: {}\nSnippet: {}",
                r.title.as_deref().unwrap_or("N/A"),
                r.link.as_deref().unwrap_or("N/A"),
                r.snippet.as_deref().unwrap_or("N/A")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
