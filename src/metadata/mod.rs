//! Catalog metadata collaborators.
//!
//! The catalog is the system of record for identity: a numeric ID resolves
//! to the canonical titles that are then searched on the target sites.

pub mod anilist;

use crate::error::CatalogError;
use crate::models::CatalogMedia;

pub use anilist::AniListCatalog;

#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetch canonical metadata for `id`.
    async fn get_info(&self, id: i64) -> Result<CatalogMedia, CatalogError>;
}
