use crate::error::{self, AppError};
use serde::Deserialize;
use validator::Validate;

/// Largest id list accepted by one request.
pub const MAX_IDS: usize = 100;
/// Candidates processed in bulk search mode, whatever the catalog reports.
pub const MAX_SEARCH_RESULTS: usize = 20;

/// What a single request asks lyrics for.
#[derive(Debug, Clone, PartialEq)]
pub enum LyricsTarget {
    Id(String),
    Ids(Vec<String>),
    Search {
        track: String,
        artist: String,
        bulk: bool,
    },
}

impl LyricsTarget {
    /// Single-target requests turn a miss into a not-found response; multi-target ones skip it.
    pub fn is_single(&self) -> bool {
        match self {
            LyricsTarget::Id(_) => true,
            LyricsTarget::Ids(_) => false,
            LyricsTarget::Search { bulk, .. } => !bulk,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
    pub ids: Option<String>,
    #[serde(default)]
    pub force_secondary: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SearchQuery {
    #[validate(length(min = 1, max = 200))]
    pub track: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub artist: Option<String>,
    #[serde(default)]
    pub bulk: bool,
    #[serde(default)]
    pub force_secondary: bool,
}

impl TryFrom<&IdQuery> for LyricsTarget {
    type Error = AppError;

    fn try_from(query: &IdQuery) -> error::Result<Self> {
        match (non_blank(query.id.as_deref()), non_blank(query.ids.as_deref())) {
            (Some(_), Some(_)) => Err(AppError::InvalidRequest(
                "Pass either id or ids, not both.".to_string(),
            )),
            (Some(id), None) => Ok(LyricsTarget::Id(id.to_string())),
            (None, Some(ids)) => {
                let ids: Vec<String> = ids
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if ids.is_empty() {
                    return Err(AppError::InvalidRequest("Track IDs missing.".to_string()));
                }
                if ids.len() > MAX_IDS {
                    return Err(AppError::InvalidRequest(format!(
                        "At most {} track IDs per request, got {}.",
                        MAX_IDS,
                        ids.len()
                    )));
                }
                Ok(LyricsTarget::Ids(ids))
            }
            (None, None) => Err(AppError::InvalidRequest(
                "Track ID or IDs missing.".to_string(),
            )),
        }
    }
}

impl TryFrom<&SearchQuery> for LyricsTarget {
    type Error = AppError;

    fn try_from(query: &SearchQuery) -> error::Result<Self> {
        query
            .validate()
            .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

        match (non_blank(query.track.as_deref()), non_blank(query.artist.as_deref())) {
            (Some(track), Some(artist)) => Ok(LyricsTarget::Search {
                track: track.to_string(),
                artist: artist.to_string(),
                bulk: query.bulk,
            }),
            _ => Err(AppError::InvalidRequest(
                "Track or Artist query missing.".to_string(),
            )),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
