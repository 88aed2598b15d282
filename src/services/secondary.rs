//! Fallback engine backed by the secondary provider's `macro.subtitles.get` call.
//!
//! One macro request matches the track, fetches its line subtitles and its
//! static lyrics. The result is reduced to a single document with a fixed
//! preference: provider subtitles, then a synced seed from the primary
//! provider, then static text, then nothing.

use crate::error::{AppError, Malformed, Result};
use crate::models::{
    LineVocal, LyricDocument, LyricKind, Provenance, ResolvedLyrics, StaticLine, Track, VOCAL,
};
use crate::services::credentials::{CredentialManager, SECONDARY_APP_ID, SECONDARY_COOKIE};
use crate::services::normalizer::{classify, parse_document};
use async_trait::async_trait;
use reqwest::{redirect, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const SERVICE: &str = "Secondary lyrics provider";

#[derive(Debug, Clone, PartialEq)]
pub enum SecondaryOutcome {
    Found(ResolvedLyrics),
    NotFound,
}

#[async_trait]
pub trait SecondaryLyrics: Send + Sync {
    /// `seed` is the raw primary payload, if there was one.
    async fn resolve(&self, track: &Track, seed: Option<&Value>) -> Result<SecondaryOutcome>;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subtitle {
    #[serde(default)]
    pub text: String,
    pub time: SubtitleTime,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubtitleTime {
    pub total: f64,
}

/// Converts provider subtitles into a line document. Each line ends where the
/// next one starts; the last one ends at `duration`.
pub fn subtitles_to_line_document(subtitles: &[Subtitle], duration: f64) -> LyricDocument {
    let content = subtitles
        .iter()
        .enumerate()
        .map(|(i, sub)| {
            let start = sub.time.total;
            let end = subtitles
                .get(i + 1)
                .map(|next| next.time.total)
                .unwrap_or_else(|| duration.max(start));
            LineVocal {
                kind: VOCAL.to_string(),
                text: sub.text.clone(),
                start_time: start,
                end_time: end,
                opposite_aligned: false,
            }
        })
        .collect();

    LyricDocument::Line { content }
}

pub fn static_lyrics_to_document(body: &str) -> LyricDocument {
    LyricDocument::Static {
        lines: body
            .split('\n')
            .map(|line| StaticLine {
                text: line.to_string(),
            })
            .collect(),
    }
}

enum MacroReply {
    Body(Value),
    TokenRejected(&'static str),
}

pub struct SecondaryLyricsClient {
    base_url: String,
    client: Client,
    credentials: Arc<CredentialManager>,
}

impl SecondaryLyricsClient {
    pub fn new(base_url: String, credentials: Arc<CredentialManager>) -> Result<Self> {
        // Redirects mean the token went stale; `lookup` handles them.
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            credentials,
        })
    }

    /// Macro lookup with at most one token refresh.
    async fn lookup(&self, track: &Track) -> Result<Value> {
        let mut token = self.credentials.secondary_token().await?;
        let mut refreshed = false;

        loop {
            match self.macro_call(track, &token).await? {
                MacroReply::Body(body) => return Ok(body),
                MacroReply::TokenRejected(reason) if !refreshed => {
                    tracing::info!("Secondary token rejected ({}), refreshing", reason);
                    token = self.credentials.refresh_secondary_token().await?;
                    refreshed = true;
                }
                MacroReply::TokenRejected(reason) => {
                    return Err(AppError::UpstreamAuth(format!(
                        "Secondary token rejected after refresh ({})",
                        reason
                    )));
                }
            }
        }
    }

    async fn macro_call(&self, track: &Track, token: &str) -> Result<MacroReply> {
        let url = format!("{}/macro.subtitles.get", self.base_url);
        let artists = track.artist_names();
        let spotify_id = format!("spotify:track:{}", track.id);
        let duration = track
            .duration_secs()
            .map(|d| d.round().to_string())
            .unwrap_or_default();

        let mut params = vec![
            ("format", "json"),
            ("namespace", "lyrics_richsynched"),
            ("subtitle_format", "mxm"),
            ("app_id", SECONDARY_APP_ID),
            ("q_track", track.name.as_str()),
            ("q_artist", artists.as_str()),
            ("q_artists", artists.as_str()),
            ("q_album", track.album.name.as_str()),
            ("track_spotify_id", spotify_id.as_str()),
            ("usertoken", token),
        ];
        if !duration.is_empty() {
            params.push(("q_duration", duration.as_str()));
            params.push(("f_subtitle_length", duration.as_str()));
        }

        tracing::debug!("Secondary macro lookup for {}", track.id);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .header("cookie", SECONDARY_COOKIE)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Secondary request failed: {}", e)))?;

        let status = response.status();
        if status.is_redirection() {
            return Ok(MacroReply::TokenRejected("redirect"));
        }
        if status == StatusCode::UNAUTHORIZED {
            return Ok(MacroReply::TokenRejected("unauthorized"));
        }
        if !status.is_success() {
            tracing::error!("Secondary lyrics provider error: {}", status);
            return Err(AppError::UpstreamUnavailable {
                service: SERVICE,
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Malformed(format!("secondary macro response: {}", e)))?;

        let inner_status = body
            .pointer("/message/header/status_code")
            .and_then(Value::as_i64);
        if inner_status == Some(401) {
            return Ok(MacroReply::TokenRejected("unauthorized"));
        }

        Ok(MacroReply::Body(body))
    }
}

#[async_trait]
impl SecondaryLyrics for SecondaryLyricsClient {
    async fn resolve(&self, track: &Track, seed: Option<&Value>) -> Result<SecondaryOutcome> {
        let body = self.lookup(track).await?;
        Ok(interpret_macro(&body, track, seed)?)
    }
}

enum Subtitles {
    Parsed(Vec<Subtitle>),
    /// Lookup failed or returned nothing to parse.
    Unavailable,
    Unparseable,
}

fn macro_call<'a>(macro_calls: &'a Value, name: &str) -> Option<&'a Value> {
    macro_calls.get(name).and_then(|call| call.get("message"))
}

fn call_succeeded(message: &Value) -> bool {
    let status = message
        .pointer("/header/status_code")
        .and_then(Value::as_i64);
    // A failed inner call reports its body as "" or [] instead of an object.
    status == Some(200) && message.get("body").is_some_and(Value::is_object)
}

fn read_subtitles(macro_calls: &Value) -> Subtitles {
    let Some(message) = macro_call(macro_calls, "track.subtitles.get") else {
        return Subtitles::Unavailable;
    };
    if !call_succeeded(message) {
        return Subtitles::Unavailable;
    }

    let Some(raw) = message
        .pointer("/body/subtitle_list/0/subtitle/subtitle_body")
        .and_then(Value::as_str)
    else {
        return Subtitles::Unavailable;
    };

    match serde_json::from_str::<Vec<Subtitle>>(raw) {
        Ok(subtitles) if subtitles.is_empty() => Subtitles::Unavailable,
        Ok(subtitles) => Subtitles::Parsed(subtitles),
        Err(e) => {
            tracing::warn!("Unparseable subtitle body: {}", e);
            Subtitles::Unparseable
        }
    }
}

fn read_static_lyrics(macro_calls: &Value) -> Option<&str> {
    let message = macro_call(macro_calls, "track.lyrics.get")?;
    if !call_succeeded(message) {
        return None;
    }
    message
        .pointer("/body/lyrics/lyrics_body")
        .and_then(Value::as_str)
        .filter(|body| !body.trim().is_empty())
}

/// A recognized, parseable primary payload. `synced_only` restricts it to Line/Syllable.
fn usable_seed(seed: Option<&Value>, synced_only: bool) -> Option<LyricDocument> {
    let seed = seed?;
    let kind = classify(seed);
    if kind == LyricKind::Unusable || (synced_only && !kind.is_synced()) {
        return None;
    }
    match parse_document(seed) {
        Ok(document) => Some(document),
        Err(e) => {
            tracing::debug!("Discarding unparseable seed: {}", e);
            None
        }
    }
}

pub(crate) fn interpret_macro(
    body: &Value,
    track: &Track,
    seed: Option<&Value>,
) -> std::result::Result<SecondaryOutcome, Malformed> {
    let macro_calls = body
        .pointer("/message/body/macro_calls")
        .filter(|v| v.is_object())
        .ok_or_else(|| Malformed("macro response has no macro_calls".to_string()))?;

    let matched = macro_call(macro_calls, "matcher.track.get")
        .and_then(|m| m.pointer("/body/track"));
    let common_track_id = matched
        .and_then(|t| t.get("commontrack_id"))
        .and_then(Value::as_i64)
        .ok_or_else(|| Malformed("macro response has no commontrack_id".to_string()))?;
    let track_length = matched
        .and_then(|t| t.get("track_length"))
        .and_then(Value::as_f64)
        .filter(|len| *len > 0.0);

    let found = |document: LyricDocument, provenance: Provenance| {
        let mut resolved = ResolvedLyrics::new(document, provenance);
        resolved.common_track_id = Some(common_track_id);
        SecondaryOutcome::Found(resolved)
    };

    match read_subtitles(macro_calls) {
        Subtitles::Parsed(subtitles) => {
            let duration = track
                .duration_secs()
                .or(track_length)
                .unwrap_or_else(|| subtitles.last().map(|s| s.time.total).unwrap_or(0.0));
            return Ok(found(
                subtitles_to_line_document(&subtitles, duration),
                Provenance::Secondary,
            ));
        }
        Subtitles::Unparseable => return Ok(SecondaryOutcome::NotFound),
        Subtitles::Unavailable => {}
    }

    if let Some(document) = usable_seed(seed, true) {
        tracing::debug!("No provider subtitles for {}, serving synced primary seed", track.id);
        return Ok(found(document, Provenance::PrimaryFallback));
    }

    if let Some(lyrics) = read_static_lyrics(macro_calls) {
        return Ok(found(static_lyrics_to_document(lyrics), Provenance::Secondary));
    }

    if let Some(document) = usable_seed(seed, false) {
        tracing::debug!("No provider lyrics for {}, serving static primary seed", track.id);
        return Ok(found(document, Provenance::PrimaryFallback));
    }

    Ok(SecondaryOutcome::NotFound)
}
