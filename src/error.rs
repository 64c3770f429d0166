//! Error taxonomy shared by the adapters, the catalog client and the
//! orchestrator.
//!
//! Adapters only ever produce [`FetchError`]. The orchestrator wraps whatever
//! it receives into a [`MappingError`] carrying the provider name, so callers
//! can tell a missing catalog entry from a missing listing from a broken site.

/// Failure talking to (or making sense of) a remote site.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not parse response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("invalid chapter reference: {0}")]
    InvalidReference(String),
}

impl FetchError {
    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Parse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Upstream HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Failure resolving a catalog ID into canonical metadata.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog entry {0} not found")]
    NotFound(i64),

    #[error("catalog request failed: {0}")]
    Upstream(#[from] FetchError),
}

/// Failure selecting a listing out of a search result set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("no candidates to match against")]
    NoCandidates,
}

/// Terminal failure states of the aggregation orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("catalog entry {catalog_id} could not be resolved: {message}")]
    IdentityNotFound { catalog_id: i64, message: String },

    #[error("{provider}: no listing found for \"{title}\" or any alternate title")]
    NoListingFound { provider: String, title: String },

    #[error("{provider}: search returned no candidates")]
    NoCandidates { provider: String },

    #[error("{provider}: {source}")]
    Downstream {
        provider: String,
        #[source]
        source: FetchError,
    },

    #[error("catalog lookup for {catalog_id} failed: {source}")]
    Catalog {
        catalog_id: i64,
        #[source]
        source: FetchError,
    },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl MappingError {
    pub fn downstream(provider: &str, source: FetchError) -> Self {
        MappingError::Downstream {
            provider: provider.to_string(),
            source,
        }
    }

    /// Whether this error belongs to the "not found" response class.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MappingError::IdentityNotFound { .. }
                | MappingError::NoListingFound { .. }
                | MappingError::UnknownProvider(_)
        )
    }
}
