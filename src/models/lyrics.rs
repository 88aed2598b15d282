use crate::models::{FontOverride, TrackIdentity};
use serde::{Deserialize, Serialize};

/// Canonical lyric shape shared by every source. Field names follow the
/// wire format consumers already read (`Type`, `Content`, `StartTime`...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum LyricDocument {
    Static {
        #[serde(rename = "Lines")]
        lines: Vec<StaticLine>,
    },
    Line {
        #[serde(rename = "Content")]
        content: Vec<LineVocal>,
    },
    Syllable {
        #[serde(rename = "Content")]
        content: Vec<VocalGroup>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StaticLine {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineVocal {
    #[serde(rename = "Type", default = "vocal")]
    pub kind: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub opposite_aligned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VocalGroup {
    #[serde(rename = "Type", default = "vocal")]
    pub kind: String,
    #[serde(default)]
    pub opposite_aligned: bool,
    pub lead: SyllableLine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Vec<SyllableLine>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyllableLine {
    pub syllables: Vec<Syllable>,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Syllable {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub is_part_of_word: bool,
}

pub const VOCAL: &str = "Vocal";

fn vocal() -> String {
    VOCAL.to_string()
}

/// The variant tag a raw payload declares, before it is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyricKind {
    Static,
    Line,
    Syllable,
    Unusable,
}

impl LyricKind {
    pub fn is_synced(self) -> bool {
        matches!(self, LyricKind::Line | LyricKind::Syllable)
    }
}

impl LyricDocument {
    /// First entry's start and last entry's end. `None` for static or empty documents.
    pub fn timing(&self) -> Option<(f64, f64)> {
        match self {
            LyricDocument::Static { .. } => None,
            LyricDocument::Line { content } => {
                Some((content.first()?.start_time, content.last()?.end_time))
            }
            LyricDocument::Syllable { content } => {
                Some((content.first()?.lead.start_time, content.last()?.lead.end_time))
            }
        }
    }
}

/// Where a served document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Cache,
    Primary,
    /// Derived by the secondary provider's subtitle or static lyric data.
    Secondary,
    /// The secondary lookup came up empty and the primary seed was served instead.
    PrimaryFallback,
}

/// A document together with the facts the fallback engine learned about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLyrics {
    pub document: LyricDocument,
    pub provenance: Provenance,
    pub common_track_id: Option<i64>,
    /// Derived by the secondary provider. Survives caching, unlike `provenance`.
    pub alternative_api: bool,
}

impl ResolvedLyrics {
    pub fn new(document: LyricDocument, provenance: Provenance) -> Self {
        Self {
            document,
            provenance,
            common_track_id: None,
            alternative_api: provenance == Provenance::Secondary,
        }
    }
}

/// Output object for one track.
#[derive(Debug, Clone, Serialize)]
pub struct LyricsResponse {
    #[serde(flatten)]
    pub track: TrackIdentity,
    #[serde(flatten)]
    pub document: LyricDocument,
    #[serde(rename = "StartTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(rename = "EndTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    pub alternative_api: bool,
    pub source: Provenance,
    #[serde(rename = "commonTrackId", skip_serializing_if = "Option::is_none")]
    pub common_track_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<FontOverride>,
}

/// Output object for id-list and bulk search requests.
#[derive(Debug, Clone, Serialize)]
pub struct BulkLyricsResponse {
    pub error: bool,
    pub bulk: bool,
    pub total: usize,
    pub total_fetched: usize,
    pub content: Vec<LyricsResponse>,
}

impl BulkLyricsResponse {
    pub fn new(total: usize, content: Vec<LyricsResponse>) -> Self {
        Self {
            error: false,
            bulk: true,
            total,
            total_fetched: content.len(),
            content,
        }
    }
}
