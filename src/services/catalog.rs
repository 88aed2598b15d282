use crate::error::{AppError, Result};
use crate::models::Track;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const SERVICE: &str = "Catalog API";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResults {
    pub total: usize,
    #[serde(default)]
    pub items: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: SearchResults,
}

/// Track metadata lookups against the external catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn search(&self, token: &str, track: &str, artist: &str, limit: usize)
        -> Result<SearchResults>;
    async fn track(&self, token: &str, id: &str) -> Result<Track>;
}

#[derive(Debug, Clone)]
pub struct CatalogClient {
    base_url: String,
    client: Client,
}

impl CatalogClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(params)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Catalog request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Catalog API error: {} - {}", status, body);
            return Err(AppError::UpstreamUnavailable {
                service: SERVICE,
                status: status.as_u16(),
            });
        }

        let response_text = response.text().await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to read catalog response: {}", e))
        })?;

        serde_json::from_str(&response_text).map_err(|e| {
            AppError::MalformedPayload(format!(
                "catalog: {} - Response: {}",
                e,
                response_text.chars().take(200).collect::<String>()
            ))
        })
    }
}

#[async_trait]
impl Catalog for CatalogClient {
    async fn search(
        &self,
        token: &str,
        track: &str,
        artist: &str,
        limit: usize,
    ) -> Result<SearchResults> {
        let url = format!("{}/v1/search", self.base_url);
        let query = format!("track:{} artist:{}", track, artist);
        let limit = limit.to_string();

        tracing::debug!("Searching catalog with query: {}", query);

        let data: SearchResponse = self
            .get(&url, token, &[("q", &query), ("type", "track"), ("limit", &limit)])
            .await?;

        tracing::debug!(
            "Catalog reported {} tracks, returned {}",
            data.tracks.total,
            data.tracks.items.len()
        );
        Ok(data.tracks)
    }

    async fn track(&self, token: &str, id: &str) -> Result<Track> {
        let url = format!("{}/v1/tracks/{}", self.base_url, id);
        tracing::debug!("Fetching catalog track {}", id);
        self.get(&url, token, &[]).await
    }
}
