use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SearchConfig;

pub const NO_RESULTS: &str = "No results found.";
pub const SEARCH_UNAVAILABLE: &str = "Search is temporarily unavailable.";
pub const QUERY_MISSING: &str = "Search query is missing.";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped { results: Vec<SearchHit> },
    Bare(Vec<SearchHit>),
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    content: Option<String>,
}

impl SearchResponse {
    fn into_hits(self) -> Vec<SearchHit> {
        match self {
            SearchResponse::Wrapped { results } => results,
            SearchResponse::Bare(results) => results,
        }
    }
}

/// Client for the external web search API behind the `web_search` tool.
///
/// Every failure is soft: the caller always gets text it can hand back to
/// the model as a tool result.
pub struct WebSearch {
    client: reqwest::Client,
    config: SearchConfig,
}

impl WebSearch {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .context("Failed to build search HTTP client")?;
        Ok(Self { client, config })
    }

    pub async fn search(&self, query: &str) -> String {
        debug!("Web search: {}", query);

        let request = SearchRequest {
            query,
            num_results: self.config.num_results,
        };

        let response = match self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Search request failed: {}", e.without_url());
                return SEARCH_UNAVAILABLE.to_string();
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Search API error ({}): {}", status, body);
            return SEARCH_UNAVAILABLE.to_string();
        }

        let hits = match response.json::<SearchResponse>().await {
            Ok(parsed) => parsed.into_hits(),
            Err(e) => {
                warn!("Failed to parse search response: {}", e.without_url());
                return SEARCH_UNAVAILABLE.to_string();
            }
        };

        let snippets: Vec<String> = hits
            .into_iter()
            .filter_map(|hit| hit.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .take(self.config.num_results)
            .collect();

        if snippets.is_empty() {
            NO_RESULTS.to_string()
        } else {
            snippets.join("\n")
        }
    }
}
