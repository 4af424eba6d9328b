//! Mercari search API client.

use serde::Deserialize;
use thiserror::Error;

use super::normalize::RawListing;

const DEFAULT_BASE_URL: &str = "https://api.mercari.com/v2/search";

/// Results requested per search pass.
const RESULT_LIMIT: u32 = 100;

#[derive(Error, Debug)]
pub enum MercariError {
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Search filters, mirroring what the scan pipeline exposes to users.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub keywords: String,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub include_sold: bool,
}

impl SearchQuery {
    pub fn new(keywords: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            ..Self::default()
        }
    }

    /// Query parameters for the search endpoint.
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("keyword", self.keywords.clone()),
            ("limit", RESULT_LIMIT.to_string()),
        ];
        if let Some(category) = &self.category {
            params.push(("category_id", category.clone()));
        }
        if let Some(condition) = &self.condition {
            params.push(("condition", condition_code(condition)));
        }
        if let Some(min) = self.min_price {
            params.push(("price_min", min.to_string()));
        }
        if let Some(max) = self.max_price {
            params.push(("price_max", max.to_string()));
        }
        if !self.include_sold {
            params.push(("status", "on_sale".to_string()));
        }
        params
    }
}

/// Mercari's numeric condition codes; unrecognized labels pass through
/// unchanged so callers can supply a raw code directly.
fn condition_code(condition: &str) -> String {
    match condition.to_lowercase().as_str() {
        "new" => "1".to_string(),
        "like_new" => "2".to_string(),
        "good" => "3".to_string(),
        "fair" => "4".to_string(),
        _ => condition.to_string(),
    }
}

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    items: Vec<RawListing>,
}

pub struct MercariClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl MercariClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run one search and return the raw listings.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<RawListing>, MercariError> {
        let mut request = self.http.get(&self.base_url).query(&query.params());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let envelope: SearchEnvelope = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tracing::info!(
            results = envelope.items.len(),
            keywords = %query.keywords,
            "mercari search returned",
        );
        Ok(envelope.items)
    }
}
