use crate::config::Config;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Credential row name holding the secondary provider's user token.
pub const SECONDARY_TOKEN_KEY: &str = "musixmatch_token";

pub(crate) const SECONDARY_APP_ID: &str = "web-desktop-app-v1.0";
pub(crate) const SECONDARY_COOKIE: &str = "AWSELBCORS=0; AWSELB=0";

/// Durable single-value credential storage with upsert semantics.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load_token(&self, name: &str) -> Result<Option<String>>;
    async fn save_token(&self, name: &str, value: &str) -> Result<()>;
}

/// Issues service-owned catalog bearer tokens.
#[async_trait]
pub trait CatalogAuth: Send + Sync {
    async fn catalog_token(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ClientCredentialsGrant {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GrantError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct CredentialManager {
    client: Client,
    store: Arc<dyn TokenStore>,
    accounts_url: String,
    client_id: String,
    client_secret: String,
    secondary_url: String,
}

impl CredentialManager {
    pub fn new(config: &Config, store: Arc<dyn TokenStore>) -> Self {
        Self::with_endpoints(
            store,
            config.catalog_accounts_url.clone(),
            config.catalog_client_id.clone(),
            config.catalog_client_secret.clone(),
            config.secondary_lyrics_url.clone(),
        )
    }

    pub fn with_endpoints(
        store: Arc<dyn TokenStore>,
        accounts_url: String,
        client_id: String,
        client_secret: String,
        secondary_url: String,
    ) -> Self {
        Self {
            client: Client::new(),
            store,
            accounts_url,
            client_id,
            client_secret,
            secondary_url,
        }
    }

    /// Client-credentials grant. Never cached; callers hold it for one request at most.
    pub async fn request_catalog_token(&self) -> Result<String> {
        let url = format!("{}/api/token", self.accounts_url);
        tracing::debug!("Requesting catalog client-credentials grant");

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::UpstreamAuth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: GrantError = response.json().await.unwrap_or(GrantError {
                error: None,
                error_description: None,
            });
            return Err(AppError::UpstreamAuth(format!(
                "Catalog rejected grant ({}): {}",
                status,
                body.error_description
                    .or(body.error)
                    .unwrap_or_else(|| "Token generation failed".to_string())
            )));
        }

        let grant: ClientCredentialsGrant = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamAuth(format!("Failed to parse grant: {}", e)))?;

        Ok(grant.access_token)
    }

    /// Persisted secondary token, fetching and storing a new one when none exists.
    pub async fn secondary_token(&self) -> Result<String> {
        if let Some(token) = self.store.load_token(SECONDARY_TOKEN_KEY).await? {
            return Ok(token);
        }

        tracing::info!("No stored secondary token, requesting one");
        self.refresh_secondary_token().await
    }

    /// Requests a new secondary token and overwrites the stored one.
    pub async fn refresh_secondary_token(&self) -> Result<String> {
        let token = self.request_secondary_token().await?;
        self.store.save_token(SECONDARY_TOKEN_KEY, &token).await?;
        tracing::info!("Secondary token refreshed");
        Ok(token)
    }

    async fn request_secondary_token(&self) -> Result<String> {
        let url = format!("{}/token.get", self.secondary_url);
        let t = Utc::now().timestamp_millis().to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("app_id", SECONDARY_APP_ID),
                ("user_language", "en"),
                ("t", t.as_str()),
            ])
            .header("cookie", SECONDARY_COOKIE)
            .send()
            .await
            .map_err(|e| AppError::UpstreamAuth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamAuth(format!(
                "Secondary token endpoint returned {}",
                response.status()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamAuth(format!("Failed to parse token response: {}", e)))?;

        parse_secondary_token(&json)
    }
}

fn parse_secondary_token(json: &Value) -> Result<String> {
    let status = json
        .pointer("/message/header/status_code")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if status != 200 {
        return Err(AppError::UpstreamAuth(format!(
            "Secondary token endpoint reported status {}",
            status
        )));
    }

    // The provider hands out a placeholder token while it is throttling the caller.
    match json.pointer("/message/body/user_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() && !token.starts_with("UpgradeOnly") => {
            Ok(token.to_string())
        }
        _ => Err(AppError::UpstreamAuth(
            "Secondary token endpoint returned no usable token".to_string(),
        )),
    }
}

#[async_trait]
impl CatalogAuth for CredentialManager {
    async fn catalog_token(&self) -> Result<String> {
        self.request_catalog_token().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    pub(crate) struct MemoryTokenStore {
        values: Mutex<HashMap<String, String>>,
        pub saves: AtomicUsize,
    }

    impl MemoryTokenStore {
        pub(crate) fn with_token(token: &str) -> Self {
            let store = Self::default();
            store
                .values
                .try_lock()
                .unwrap()
                .insert(SECONDARY_TOKEN_KEY.to_string(), token.to_string());
            store
        }

        pub(crate) async fn current(&self) -> Option<String> {
            self.values.lock().await.get(SECONDARY_TOKEN_KEY).cloned()
        }
    }

    #[async_trait]
    impl TokenStore for MemoryTokenStore {
        async fn load_token(&self, name: &str) -> Result<Option<String>> {
            Ok(self.values.lock().await.get(name).cloned())
        }

        async fn save_token(&self, name: &str, value: &str) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.values
                .lock()
                .await
                .insert(name.to_string(), value.to_string());
            Ok(())
        }
    }

    pub(crate) fn token_body(token: &str) -> Value {
        json!({
            "message": {
                "header": {"status_code": 200},
                "body": {"user_token": token}
            }
        })
    }

    pub(crate) fn manager(server: &MockServer, store: Arc<dyn TokenStore>) -> CredentialManager {
        CredentialManager::with_endpoints(
            store,
            server.uri(),
            "client".to_string(),
            "secret".to_string(),
            server.uri(),
        )
    }

    #[tokio::test]
    async fn test_catalog_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "abc",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let creds = manager(&server, Arc::new(MemoryTokenStore::default()));
        assert_eq!(creds.catalog_token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_rejected_catalog_grant_is_upstream_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_client"
            })))
            .mount(&server)
            .await;

        let creds = manager(&server, Arc::new(MemoryTokenStore::default()));
        let err = creds.catalog_token().await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamAuth(msg) if msg.contains("invalid_client")));
    }

    #[tokio::test]
    async fn test_stored_secondary_token_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token.get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh")))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("stored"));
        let creds = manager(&server, store.clone());
        assert_eq!(creds.secondary_token().await.unwrap(), "stored");
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_secondary_token_is_fetched_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token.get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh")))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::default());
        let creds = manager(&server, store.clone());
        assert_eq!(creds.secondary_token().await.unwrap(), "fresh");
        assert_eq!(store.current().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_refresh_overwrites_existing_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token.get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("second")))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("first"));
        let creds = manager(&server, store.clone());
        assert_eq!(creds.refresh_secondary_token().await.unwrap(), "second");
        assert_eq!(store.current().await.as_deref(), Some("second"));
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_placeholder_token_is_rejected() {
        let json = token_body("UpgradeOnlyUpgradeOnlyUpgradeOnly");
        assert!(matches!(
            parse_secondary_token(&json),
            Err(AppError::UpstreamAuth(_))
        ));
        let json = json!({"message": {"header": {"status_code": 401}, "body": ""}});
        assert!(parse_secondary_token(&json).is_err());
    }
}
