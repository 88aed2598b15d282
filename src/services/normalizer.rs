//! Single place where every source's document is turned into the output shape.

use crate::error::Malformed;
use crate::models::{
    FontOverride, LyricDocument, LyricKind, LyricsResponse, ResolvedLyrics, TrackIdentity,
};
use serde::Deserialize;
use serde_json::Value;

/// Reads the declared `Type` tag of an untyped payload.
pub fn classify(raw: &Value) -> LyricKind {
    match raw.get("Type").and_then(Value::as_str) {
        Some("Static") => LyricKind::Static,
        Some("Line") => LyricKind::Line,
        Some("Syllable") => LyricKind::Syllable,
        _ => LyricKind::Unusable,
    }
}

pub fn parse_document(raw: &Value) -> Result<LyricDocument, Malformed> {
    if classify(raw) == LyricKind::Unusable {
        return Err(Malformed(format!(
            "unrecognized lyric type {}",
            raw.get("Type").unwrap_or(&Value::Null)
        )));
    }
    LyricDocument::deserialize(raw).map_err(|e| Malformed(e.to_string()))
}

pub fn normalize(
    track: TrackIdentity,
    resolved: ResolvedLyrics,
    font: Option<FontOverride>,
) -> LyricsResponse {
    let timing = resolved.document.timing();

    LyricsResponse {
        track,
        start_time: timing.map(|(start, _)| start),
        end_time: timing.map(|(_, end)| end),
        alternative_api: resolved.alternative_api,
        source: resolved.provenance,
        common_track_id: resolved.common_track_id,
        font,
        document: resolved.document,
    }
}
