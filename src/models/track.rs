use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
}

/// A catalog track, as returned by the search and fetch-by-id endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<Artist>,
    pub album: Album,
    #[serde(default)]
    pub duration_ms: u64,
}

impl Track {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn duration_secs(&self) -> Option<f64> {
        (self.duration_ms > 0).then(|| self.duration_ms as f64 / 1000.0)
    }

    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity {
            id: self.id.clone(),
            name: self.name.clone(),
            artists: self.artists.clone(),
        }
    }
}

/// The subset of a track echoed back alongside its lyrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackIdentity {
    pub id: String,
    pub name: String,
    pub artists: Vec<Artist>,
}
