pub mod lyrics;
pub mod middleware;

pub use lyrics::{lyrics_routes, AppState};
