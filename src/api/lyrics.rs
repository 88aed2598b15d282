use crate::api::middleware::{RateLimit, RateLimiter};
use crate::error::Result;
use crate::models::target::{IdQuery, SearchQuery};
use crate::models::LyricsTarget;
use crate::services::{LyricsReply, LyricsResolver, ResolveOptions};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

pub struct AppState {
    pub resolver: Arc<LyricsResolver>,
    pub limiter: Arc<RateLimiter>,
    /// Ignore caller tokens and always use the service-issued one.
    pub dev_mode: bool,
}

pub fn lyrics_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lyrics/id", get(lyrics_by_id))
        .route("/lyrics/search", get(lyrics_by_search))
}

impl IntoResponse for LyricsReply {
    fn into_response(self) -> Response {
        match self {
            LyricsReply::Single(lyrics) => Json(lyrics).into_response(),
            LyricsReply::Bulk(bulk) => Json(bulk).into_response(),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn options(state: &AppState, headers: &HeaderMap, force_secondary: bool) -> ResolveOptions {
    ResolveOptions {
        force_secondary,
        caller_token: if state.dev_mode {
            None
        } else {
            bearer_token(headers)
        },
    }
}

async fn lyrics_by_id(
    State(state): State<Arc<AppState>>,
    _: RateLimit,
    headers: HeaderMap,
    Query(query): Query<IdQuery>,
) -> Result<LyricsReply> {
    let target = LyricsTarget::try_from(&query)?;
    tracing::info!("Lyrics by id: {:?}", target);

    state
        .resolver
        .resolve(target, options(&state, &headers, query.force_secondary))
        .await
}

async fn lyrics_by_search(
    State(state): State<Arc<AppState>>,
    _: RateLimit,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<LyricsReply> {
    let target = LyricsTarget::try_from(&query)?;
    tracing::info!("Lyrics by search: {:?}", target);

    state
        .resolver
        .resolve(target, options(&state, &headers, query.force_secondary))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::tests::limiter;
    use crate::services::catalog::SearchResults;
    use crate::services::resolver::tests::{track, Harness, SecondaryBehavior};
    use axum::{body::Body, http::Request, http::StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    fn app_with_limit(harness: &Harness, dev_mode: bool, max: u64) -> Router {
        let state = Arc::new(AppState {
            resolver: Arc::new(harness.resolver()),
            limiter: Arc::new(limiter(max, &[])),
            dev_mode,
        });
        lyrics_routes().with_state(state)
    }

    fn app(harness: &Harness, dev_mode: bool) -> Router {
        app_with_limit(harness, dev_mode, 1_000)
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_single_id_returns_lyrics_object() {
        let h = Harness::new(SecondaryBehavior::Subtitles(vec![0.0, 5.0, 12.0]));
        let (status, body) = call(app(&h, false), get("/lyrics/id?id=X")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "X");
        assert_eq!(body["Type"], "Line");
        assert_eq!(body["alternative_api"], true);
        assert_eq!(body["EndTime"], 20.0);
    }

    #[tokio::test]
    async fn test_id_list_returns_bulk_envelope() {
        let h = Harness::new(SecondaryBehavior::Subtitles(vec![1.0]));
        let (status, body) = call(app(&h, false), get("/lyrics/id?ids=a,b,c")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bulk"], true);
        assert_eq!(body["error"], false);
        assert_eq!(body["total"], 3);
        assert_eq!(body["total_fetched"], 3);
        assert_eq!(body["content"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_oversized_id_list_is_bad_request_without_upstream_calls() {
        let h = Harness::new(SecondaryBehavior::NotFound);
        let ids: Vec<String> = (0..101).map(|i| format!("t{i}")).collect();
        let uri = format!("/lyrics/id?ids={}", ids.join(","));
        let (status, body) = call(app(&h, false), get(&uri)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], true);
        assert_eq!(body["status"], 400);
        assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.auth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_parameters_are_bad_request() {
        let h = Harness::new(SecondaryBehavior::NotFound);
        let (status, _) = call(app(&h, false), get("/lyrics/id")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(app(&h, false), get("/lyrics/search?track=Song")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], "Track or Artist query missing.");
    }

    #[tokio::test]
    async fn test_search_without_tracks_is_not_found() {
        let h = Harness::new(SecondaryBehavior::NotFound);
        let (status, body) =
            call(app(&h, false), get("/lyrics/search?track=Song&artist=Band")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["details"], "No Tracks Found");
    }

    #[tokio::test]
    async fn test_bulk_search_reports_catalog_total() {
        let mut h = Harness::new(SecondaryBehavior::Subtitles(vec![0.0]));
        Arc::get_mut(&mut h.catalog).unwrap().search = SearchResults {
            total: 3,
            items: vec![track("a"), track("b"), track("c")],
        };
        let (status, body) = call(
            app(&h, false),
            get("/lyrics/search?track=Song&artist=Band&bulk=true"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["total_fetched"], 3);
    }

    #[tokio::test]
    async fn test_caller_token_forwarded_unless_dev_mode() {
        let h = Harness::new(SecondaryBehavior::Subtitles(vec![0.0]));
        let request = Request::builder()
            .uri("/lyrics/id?id=a")
            .header("Authorization", "Bearer mine")
            .body(Body::empty())
            .unwrap();
        call(app(&h, false), request).await;

        let request = Request::builder()
            .uri("/lyrics/id?id=b")
            .header("Authorization", "Bearer mine")
            .body(Body::empty())
            .unwrap();
        call(app(&h, true), request).await;

        assert_eq!(
            h.catalog.tokens.lock().unwrap().as_slice(),
            &["mine".to_string(), "service-token".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rate_limited_requests_get_429() {
        let h = Harness::new(SecondaryBehavior::Subtitles(vec![0.0]));
        let app = app_with_limit(&h, false, 1);

        let (status, _) = call(app.clone(), get("/lyrics/id?id=a")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(app, get("/lyrics/id?id=a")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["status"], 429);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));
    }
}
