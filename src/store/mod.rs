//! Dual-backend article persistence.
//!
//! Articles are split across two independently failing backends:
//!
//! - **Hot store** ([`HotStore`]): low-latency key/value service holding the
//!   metadata record of every article, the FIFO work queue and a bounded
//!   most-recent-first index. Redis in production ([`RedisHotStore`]), an
//!   in-process map for tests and embedded use ([`MemoryHotStore`]).
//! - **Cold store** ([`ContentStore`]): embedded sled database holding the
//!   large extracted bodies, keyed by article id. Optional: a process that
//!   only enqueues work runs without one.
//!
//! [`HybridStore`] unifies both behind the [`ArticleStore`] capability trait,
//! which is all the worker and the CLI depend on.
//!
//! # Record layout
//!
//! ```text
//!  hot store                                  cold store
//!  ─────────                                  ──────────
//!  article:{id}   JSON metadata (no content)  {id}        gzip(content)
//!  queue:archive  LPUSH / BRPOP  (FIFO)       src:{hash}  gzip(content), keyed by sha256(url)
//!  list:recent    LPUSH + LTRIM 0..49
//! ```
//!
//! # Consistency
//!
//! There is no transaction spanning both backends. Content is written (and
//! flushed) before the metadata record that flips an article to `archived`,
//! so a crash between the two writes leaves the article visibly `pending`
//! rather than falsely `archived`.

pub mod content;
pub mod hot;
pub mod hybrid;
pub mod memory;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::article::{Article, ArticleStatus};
use crate::error::StoreError;

pub use content::{ContentKey, ContentStore};
pub use hot::{Enqueue, HotStore, RedisHotStore, Upsert};
pub use hybrid::{HybridStore, StoreConfig};
pub use memory::MemoryHotStore;

/// Work queue list key.
pub const QUEUE_KEY: &str = "queue:archive";

/// Recency index list key.
pub const RECENT_KEY: &str = "list:recent";

/// Number of ids kept in the recency index.
pub const DEFAULT_RECENT_CAPACITY: usize = 50;

/// Hot store key of an article's metadata record.
pub fn metadata_key(id: Uuid) -> String {
    format!("article:{}", id)
}

/// Capability interface over article persistence.
///
/// The worker and request handlers only see this trait, so alternate
/// backends can be substituted without touching them.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Upserts an article.
    ///
    /// The first save of a pending article also enqueues it for archiving.
    /// Non-empty content goes to the cold store and fails with
    /// [`StoreError::ContentStoreUnavailable`] when none is configured.
    async fn save(&self, article: &Article) -> Result<(), StoreError>;

    /// Merged view: hot metadata plus cold content when present.
    async fn get(&self, id: Uuid) -> Result<Article, StoreError>;

    /// Up to `limit` articles from the recency index, most recent first.
    async fn list(&self, limit: usize) -> Result<Vec<Article>, StoreError>;

    /// Read-modify-write of the status field. Last write wins.
    async fn update_status(&self, id: Uuid, status: ArticleStatus) -> Result<(), StoreError>;

    /// Blocks until a queued id is available or `cancel` fires.
    ///
    /// Each queued id is delivered to exactly one caller.
    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Uuid, StoreError>;
}

/// Statistics about queue state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Ids waiting in the work queue.
    pub pending_jobs: usize,
    /// Ids currently held by the recency index.
    pub recent_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_key_format() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").expect("valid uuid");
        assert_eq!(
            metadata_key(id),
            "article:67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
    }

    #[test]
    fn test_queue_stats_default() {
        let stats = QueueStats::default();
        assert_eq!(stats.pending_jobs, 0);
        assert_eq!(stats.recent_entries, 0);
    }
}
