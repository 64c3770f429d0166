// Library interface for rust_manga_mapper
// The binary and the integration tests both go through these modules

pub mod chapters;
pub mod config;
pub mod error;
pub mod extraction;
pub mod helpers;
pub mod http_client;
pub mod logging;
pub mod matcher;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod similarity;
pub mod sources;

pub use config::Config;
pub use error::{CatalogError, FetchError, MappingError, MatchError};
pub use metadata::{AniListCatalog, CatalogProvider};
pub use orchestrator::Aggregator;
pub use sources::{MangaProvider, ProviderRegistry};
