//! Per-request logging handle.
//!
//! One `RequestLog` is created for each incoming listing/page request and
//! passed down by reference, so every line emitted while resolving that
//! request carries the same `[request_id provider]` prefix.

use log::Level;
use std::sync::atomic::{AtomicU64, Ordering};

const TARGET: &str = "rust_manga_mapper::request";

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct RequestLog {
    request_id: String,
    provider: String,
}

impl RequestLog {
    pub fn new(request_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            provider: provider.into(),
        }
    }

    /// Create a handle with a process-unique sequential id.
    pub fn for_provider(provider: &str) -> Self {
        let n = NEXT_REQUEST.fetch_add(1, Ordering::Relaxed);
        Self::new(format!("req-{}", n), provider)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn log(&self, level: Level, message: &str) {
        log::log!(target: TARGET, level, "[{} {}] {}", self.request_id, self.provider, message);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Level::Debug, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(Level::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::Error, message.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let a = RequestLog::for_provider("mangapill");
        let b = RequestLog::for_provider("mangapill");
        assert_ne!(a.request_id(), b.request_id());
        assert_eq!(a.provider(), "mangapill");
    }
}
