use crate::domain::model::{LookupOutcome, PostalCode};
use crate::domain::ports::LookupClient;
use crate::utils::error::{EnrichError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://api.postcodes.io/postcodes";

#[derive(Debug, Serialize)]
struct BulkLookupRequest<'a> {
    postcodes: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BulkLookupResponse {
    #[serde(default)]
    result: Vec<Option<BulkLookupItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkLookupItem {
    query: Option<String>,
    result: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Client for a postcodes.io style bulk lookup (`POST {"postcodes": [...]}`).
#[derive(Debug, Clone)]
pub struct HttpLookupClient {
    client: Client,
    endpoint: String,
}

impl HttpLookupClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LookupClient for HttpLookupClient {
    async fn lookup_batch(&self, codes: &[PostalCode]) -> Result<Vec<LookupOutcome>> {
        let body = BulkLookupRequest {
            postcodes: codes.iter().map(PostalCode::as_str).collect(),
        };

        tracing::debug!(
            "POST {} with {} postcodes",
            self.endpoint,
            body.postcodes.len()
        );
        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        tracing::debug!("API response status: {}", response.status());

        if !response.status().is_success() {
            return Err(EnrichError::HttpStatus {
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await?;
        let parsed: BulkLookupResponse = serde_json::from_str(&text)?;
        Ok(into_outcomes(codes, parsed))
    }
}

// API 回傳 null 時以送出的郵遞區號作為查詢值
fn into_outcomes(codes: &[PostalCode], response: BulkLookupResponse) -> Vec<LookupOutcome> {
    response
        .result
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let sent = codes.get(index).map(|c| c.to_string()).unwrap_or_default();
            match item {
                Some(BulkLookupItem {
                    query,
                    result: Some(fields),
                }) => LookupOutcome::Matched {
                    query: query.unwrap_or(sent),
                    fields,
                },
                Some(BulkLookupItem { query, result: None }) => LookupOutcome::Unmatched {
                    query: query.unwrap_or(sent),
                },
                None => LookupOutcome::Unmatched { query: sent },
            }
        })
        .collect()
}
