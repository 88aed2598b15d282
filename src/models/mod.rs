pub mod font;
pub mod lyrics;
pub mod target;
pub mod track;

pub use font::FontOverride;
pub use lyrics::{
    BulkLyricsResponse, LineVocal, LyricDocument, LyricKind, LyricsResponse, Provenance,
    ResolvedLyrics, StaticLine, VOCAL,
};
pub use target::{LyricsTarget, MAX_IDS, MAX_SEARCH_RESULTS};
pub use track::{Album, Artist, Track, TrackIdentity};
