use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

const SERVICE: &str = "Primary lyrics provider";

/// What the primary provider said about one track.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryOutcome {
    /// Raw, not yet classified payload
    Found(Value),
    NotFound,
    /// Success with an empty body: the provider knows the track but has no lyrics for it.
    Empty,
}

#[async_trait]
pub trait PrimaryLyrics: Send + Sync {
    async fn fetch(&self, track_id: &str, token: &str) -> Result<PrimaryOutcome>;
}

#[derive(Debug, Clone)]
pub struct PrimaryLyricsClient {
    base_url: String,
    client: Client,
}

impl PrimaryLyricsClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl PrimaryLyrics for PrimaryLyricsClient {
    async fn fetch(&self, track_id: &str, token: &str) -> Result<PrimaryOutcome> {
        let url = format!("{}/lyrics/{}", self.base_url, track_id);
        tracing::debug!("Fetching primary lyrics for {}", track_id);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", "insomnia/9.2.0")
            .header("Origin", "https://xpui.app.spotify.com")
            .header("Referer", "https://xpui.app.spotify.com/")
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Primary request failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(PrimaryOutcome::NotFound),
            status if !status.is_success() => {
                tracing::error!("Primary lyrics provider error: {}", status);
                return Err(AppError::UpstreamUnavailable {
                    service: SERVICE,
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let body = response.text().await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to read primary response: {}", e))
        })?;

        Ok(interpret_body(track_id, &body))
    }
}

fn interpret_body(track_id: &str, body: &str) -> PrimaryOutcome {
    if body.trim().is_empty() {
        return PrimaryOutcome::Empty;
    }
    match serde_json::from_str(body) {
        Ok(value) => PrimaryOutcome::Found(value),
        Err(e) => {
            tracing::warn!("Unparseable primary payload for {}: {}", track_id, e);
            PrimaryOutcome::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetch_with(response: ResponseTemplate) -> Result<PrimaryOutcome> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lyrics/abc"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(response)
            .mount(&server)
            .await;
        PrimaryLyricsClient::new(server.uri()).fetch("abc", "tok").await
    }

    #[tokio::test]
    async fn test_not_found_and_empty_are_distinct() {
        assert_eq!(
            fetch_with(ResponseTemplate::new(404)).await.unwrap(),
            PrimaryOutcome::NotFound
        );
        assert_eq!(
            fetch_with(ResponseTemplate::new(200)).await.unwrap(),
            PrimaryOutcome::Empty
        );
    }

    #[tokio::test]
    async fn test_payload_is_returned_raw() {
        let payload = json!({"Type": "Line", "Content": []});
        let outcome = fetch_with(ResponseTemplate::new(200).set_body_json(payload.clone()))
            .await
            .unwrap();
        assert_eq!(outcome, PrimaryOutcome::Found(payload));
    }

    #[tokio::test]
    async fn test_server_error_is_upstream_unavailable() {
        let err = fetch_with(ResponseTemplate::new(503)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::UpstreamUnavailable { status: 503, .. }
        ));
    }

    #[test]
    fn test_garbage_body_counts_as_not_found() {
        assert_eq!(interpret_body("abc", "<html>"), PrimaryOutcome::NotFound);
    }
}
