pub mod cache;
pub mod catalog;
pub mod credentials;
pub mod normalizer;
pub mod primary;
pub mod resolver;
pub mod secondary;

pub use cache::{LyricsStore, PgStore};
pub use catalog::{Catalog, CatalogClient};
pub use credentials::{CatalogAuth, CredentialManager, TokenStore};
pub use primary::{PrimaryLyrics, PrimaryLyricsClient};
pub use resolver::{IntervalPacer, LyricsReply, LyricsResolver, Pacer, ResolveOptions};
pub use secondary::{SecondaryLyrics, SecondaryLyricsClient};
