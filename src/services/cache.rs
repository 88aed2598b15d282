use crate::error::{Malformed, Result};
use crate::models::{Artist, FontOverride, LyricDocument, TrackIdentity};
use crate::services::credentials::TokenStore;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, PgPool};

/// A previously normalized document, with the track identity it was stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedLyrics {
    pub track: TrackIdentity,
    pub document: LyricDocument,
    pub common_track_id: Option<i64>,
    pub alternative_api: bool,
}

/// Read side of the lyric and font cache. Misses are `Ok(None)`, never errors.
#[async_trait]
pub trait LyricsStore: Send + Sync {
    async fn find_lyrics(&self, track_id: &str) -> Result<Option<CachedLyrics>>;
    async fn find_font(&self, track_id: &str) -> Result<Option<FontOverride>>;
}

#[derive(Debug, FromRow)]
struct LyricsRow {
    track_id: String,
    name: String,
    artists: Value,
    lyrics: Value,
}

impl LyricsRow {
    fn parse(self) -> std::result::Result<CachedLyrics, Malformed> {
        let artists: Vec<Artist> = serde_json::from_value(self.artists)
            .map_err(|e| Malformed(format!("cached artists: {}", e)))?;
        let common_track_id = self.lyrics.get("commonTrackId").and_then(Value::as_i64);
        let alternative_api = self
            .lyrics
            .get("alternative_api")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let document: LyricDocument = serde_json::from_value(self.lyrics)
            .map_err(|e| Malformed(format!("cached lyrics: {}", e)))?;

        Ok(CachedLyrics {
            track: TrackIdentity {
                id: self.track_id,
                name: self.name,
                artists,
            },
            document,
            common_track_id,
            alternative_api,
        })
    }
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LyricsStore for PgStore {
    async fn find_lyrics(&self, track_id: &str) -> Result<Option<CachedLyrics>> {
        let row = sqlx::query_as::<_, LyricsRow>(
            "SELECT track_id, name, artists, lyrics FROM lyrics_cache WHERE track_id = $1",
        )
        .bind(track_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.and_then(|row| match row.parse() {
            Ok(cached) => Some(cached),
            Err(e) => {
                tracing::warn!("Ignoring unreadable cache row for {}: {}", track_id, e);
                None
            }
        }))
    }

    async fn find_font(&self, track_id: &str) -> Result<Option<FontOverride>> {
        let font: Option<Value> =
            sqlx::query_scalar("SELECT font FROM track_fonts WHERE track_id = $1")
                .bind(track_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(font.and_then(|value| match serde_json::from_value(value) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::warn!("Ignoring unreadable font row for {}: {}", track_id, e);
                None
            }
        }))
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn load_token(&self, name: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM credentials WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.db)
            .await?;
        Ok(value)
    }

    async fn save_token(&self, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO credentials (name, value, updated_at) VALUES ($1, $2, NOW())
             ON CONFLICT (name) DO UPDATE SET value = $2, updated_at = NOW()",
        )
        .bind(name)
        .bind(value)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
