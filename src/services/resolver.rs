use crate::error::{AppError, Result};
use crate::models::{
    BulkLyricsResponse, LyricsResponse, LyricsTarget, Provenance, ResolvedLyrics, Track,
    MAX_IDS, MAX_SEARCH_RESULTS,
};
use crate::services::cache::LyricsStore;
use crate::services::catalog::Catalog;
use crate::services::credentials::CatalogAuth;
use crate::services::normalizer::{classify, normalize, parse_document};
use crate::services::primary::{PrimaryLyrics, PrimaryOutcome};
use crate::services::secondary::{SecondaryLyrics, SecondaryOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Suspends between consecutive targets of one request.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self);
}

pub struct IntervalPacer(pub Duration);

#[async_trait]
impl Pacer for IntervalPacer {
    async fn pause(&self) {
        tokio::time::sleep(self.0).await;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Consult the fallback engine even when the primary provider returned synced lyrics.
    pub force_secondary: bool,
    /// Catalog token supplied by the caller, used for catalog calls instead of our own.
    pub caller_token: Option<String>,
}

#[derive(Debug, Clone)]
pub enum LyricsReply {
    Single(LyricsResponse),
    Bulk(BulkLyricsResponse),
}

/// Per-request tokens. The service token is issued on first use and reused for the
/// rest of the request, so cache hits never reach the network.
struct Session<'a> {
    auth: &'a dyn CatalogAuth,
    caller_token: Option<String>,
    service_token: OnceCell<String>,
}

impl<'a> Session<'a> {
    fn new(auth: &'a dyn CatalogAuth, caller_token: Option<String>) -> Self {
        Self {
            auth,
            caller_token,
            service_token: OnceCell::new(),
        }
    }

    async fn service_token(&self) -> Result<&str> {
        self.service_token
            .get_or_try_init(|| self.auth.catalog_token())
            .await
            .map(String::as_str)
    }

    async fn catalog_token(&self) -> Result<&str> {
        match &self.caller_token {
            Some(token) => Ok(token.as_str()),
            None => self.service_token().await,
        }
    }
}

enum Candidate {
    Id(String),
    Track(Track),
}

impl Candidate {
    fn id(&self) -> &str {
        match self {
            Candidate::Id(id) => id,
            Candidate::Track(track) => &track.id,
        }
    }
}

#[derive(Clone, Copy)]
struct Mode {
    single: bool,
    force_secondary: bool,
}

pub struct LyricsResolver {
    store: Arc<dyn LyricsStore>,
    catalog: Arc<dyn Catalog>,
    auth: Arc<dyn CatalogAuth>,
    primary: Arc<dyn PrimaryLyrics>,
    secondary: Arc<dyn SecondaryLyrics>,
    pacer: Arc<dyn Pacer>,
}

impl LyricsResolver {
    pub fn new(
        store: Arc<dyn LyricsStore>,
        catalog: Arc<dyn Catalog>,
        auth: Arc<dyn CatalogAuth>,
        primary: Arc<dyn PrimaryLyrics>,
        secondary: Arc<dyn SecondaryLyrics>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            store,
            catalog,
            auth,
            primary,
            secondary,
            pacer,
        }
    }

    pub async fn resolve(&self, target: LyricsTarget, options: ResolveOptions) -> Result<LyricsReply> {
        let session = Session::new(self.auth.as_ref(), options.caller_token);
        let mode = Mode {
            single: target.is_single(),
            force_secondary: options.force_secondary,
        };

        match target {
            LyricsTarget::Id(id) => {
                let content = self.run_batch(&session, vec![Candidate::Id(id)], mode).await?;
                single_reply(content)
            }
            LyricsTarget::Ids(ids) => {
                if ids.len() > MAX_IDS {
                    return Err(AppError::InvalidRequest(format!(
                        "At most {} track IDs per request",
                        MAX_IDS
                    )));
                }
                let total = ids.len();
                let candidates = ids.into_iter().map(Candidate::Id).collect();
                let content = self.run_batch(&session, candidates, mode).await?;
                Ok(LyricsReply::Bulk(BulkLyricsResponse::new(total, content)))
            }
            LyricsTarget::Search { track, artist, bulk } => {
                let limit = if bulk { MAX_SEARCH_RESULTS } else { 1 };
                let results = self
                    .catalog
                    .search(session.catalog_token().await?, &track, &artist, limit)
                    .await
                    .map_err(|e| {
                        if e.is_target_miss() {
                            AppError::NotFound("No Tracks Found".to_string())
                        } else {
                            e
                        }
                    })?;

                if results.total == 0 || results.items.is_empty() {
                    return Err(AppError::NotFound("No Tracks Found".to_string()));
                }

                let candidates = results
                    .items
                    .into_iter()
                    .take(limit)
                    .map(Candidate::Track)
                    .collect();
                let content = self.run_batch(&session, candidates, mode).await?;

                if bulk {
                    Ok(LyricsReply::Bulk(BulkLyricsResponse::new(results.total, content)))
                } else {
                    single_reply(content)
                }
            }
        }
    }

    /// Strictly sequential; one pause before every target but the first.
    async fn run_batch(
        &self,
        session: &Session<'_>,
        candidates: Vec<Candidate>,
        mode: Mode,
    ) -> Result<Vec<LyricsResponse>> {
        let mut content = Vec::with_capacity(candidates.len());

        for (i, candidate) in candidates.into_iter().enumerate() {
            if i > 0 {
                self.pacer.pause().await;
            }
            if let Some(lyrics) = self.resolve_one(session, candidate, mode).await? {
                content.push(lyrics);
            }
        }

        Ok(content)
    }

    async fn resolve_one(
        &self,
        session: &Session<'_>,
        candidate: Candidate,
        mode: Mode,
    ) -> Result<Option<LyricsResponse>> {
        let id = candidate.id().to_string();
        match self.resolve_candidate(session, candidate, mode).await {
            Ok(None) if !mode.single => {
                tracing::warn!("No lyrics for {}, skipping", id);
                Ok(None)
            }
            Err(e) if e.is_target_miss() => {
                tracing::warn!("Dropping {}: {}", id, e);
                Ok(None)
            }
            other => other,
        }
    }

    async fn resolve_candidate(
        &self,
        session: &Session<'_>,
        candidate: Candidate,
        mode: Mode,
    ) -> Result<Option<LyricsResponse>> {
        if let Some(cached) = self.store.find_lyrics(candidate.id()).await? {
            tracing::debug!("Cache hit for {}", candidate.id());
            let font = self.store.find_font(candidate.id()).await?;
            let resolved = ResolvedLyrics {
                document: cached.document,
                provenance: Provenance::Cache,
                common_track_id: cached.common_track_id,
                alternative_api: cached.alternative_api,
            };
            return Ok(Some(normalize(cached.track, resolved, font)));
        }

        let by_id = matches!(candidate, Candidate::Id(_));
        let track = match candidate {
            Candidate::Track(track) => track,
            Candidate::Id(id) => self.catalog.track(session.catalog_token().await?, &id).await?,
        };

        let primary = self
            .primary
            .fetch(&track.id, session.service_token().await?)
            .await?;

        let seed = match primary {
            PrimaryOutcome::NotFound if mode.single && by_id => return Ok(None),
            PrimaryOutcome::NotFound | PrimaryOutcome::Empty => None,
            PrimaryOutcome::Found(raw) => {
                if classify(&raw).is_synced() && !mode.force_secondary {
                    match parse_document(&raw) {
                        Ok(document) => {
                            let font = self.store.find_font(&track.id).await?;
                            let resolved = ResolvedLyrics::new(document, Provenance::Primary);
                            return Ok(Some(normalize(track.identity(), resolved, font)));
                        }
                        Err(e) => tracing::warn!("Primary payload for {} unusable: {}", track.id, e),
                    }
                }
                Some(raw)
            }
        };

        let resolved = match self.secondary.resolve(&track, seed.as_ref()).await {
            Ok(SecondaryOutcome::Found(resolved)) => resolved,
            Ok(SecondaryOutcome::NotFound) => return Ok(None),
            Err(e @ AppError::UpstreamAuth(_)) if mode.single => return Err(e),
            Err(e) => {
                tracing::warn!("Fallback lookup failed for {}: {}", track.id, e);
                return Ok(None);
            }
        };

        let font = self.store.find_font(&track.id).await?;
        Ok(Some(normalize(track.identity(), resolved, font)))
    }
}

fn single_reply(content: Vec<LyricsResponse>) -> Result<LyricsReply> {
    content
        .into_iter()
        .next()
        .map(LyricsReply::Single)
        .ok_or_else(|| AppError::NotFound("Lyrics Not Found".to_string()))
}
