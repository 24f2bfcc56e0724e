//! Store façade combining the hot and cold backends.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::content::{ContentKey, ContentStore};
use super::hot::{Enqueue, HotStore, RedisHotStore, Upsert};
use super::{
    metadata_key, ArticleStore, QueueStats, DEFAULT_RECENT_CAPACITY, QUEUE_KEY, RECENT_KEY,
};
use crate::article::{Article, ArticleStatus};
use crate::error::StoreError;

/// Configuration for [`HybridStore::open`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis connection URL.
    pub redis_url: String,
    /// Cold store directory. `None` runs in metadata-only mode.
    pub content_path: Option<PathBuf>,
    /// Capacity of the recency index.
    pub recent_capacity: usize,
    /// Length of each blocking pop while waiting in `dequeue`. Bounds how long
    /// a cancelled dequeue takes to return.
    pub poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            content_path: None,
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl StoreConfig {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            ..Default::default()
        }
    }

    /// Sets the cold store directory. An empty path means no cold store.
    pub fn with_content_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.content_path = if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        };
        self
    }

    pub fn with_recent_capacity(mut self, capacity: usize) -> Self {
        self.recent_capacity = capacity;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Hot store for metadata and queue, optional cold store for content.
pub struct HybridStore {
    hot: Arc<dyn HotStore>,
    cold: Option<ContentStore>,
    config: StoreConfig,
}

impl HybridStore {
    /// Connects to Redis and opens the cold store if a path is configured.
    ///
    /// # Errors
    ///
    /// Fails if Redis does not answer the connection probe or the cold store
    /// directory cannot be opened (e.g. another process holds its lock).
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let hot = RedisHotStore::connect(&config.redis_url).await?;

        let cold = match &config.content_path {
            Some(path) => Some(ContentStore::open(path)?),
            None => None,
        };

        info!(
            redis_url = %config.redis_url,
            content_store = cold.is_some(),
            "Article store opened"
        );

        Ok(Self::new(Arc::new(hot), cold, config))
    }

    /// Builds a store over already-opened backends.
    pub fn new(hot: Arc<dyn HotStore>, cold: Option<ContentStore>, config: StoreConfig) -> Self {
        Self { hot, cold, config }
    }

    pub fn has_content_store(&self) -> bool {
        self.cold.is_some()
    }

    pub fn content_store(&self) -> Option<&ContentStore> {
        self.cold.as_ref()
    }

    /// Flushes the cold store. The hot store needs no explicit shutdown.
    pub async fn close(&self) -> Result<(), StoreError> {
        if let Some(cold) = &self.cold {
            cold.flush().await?;
        }
        Ok(())
    }

    pub async fn stats(&self) -> Result<QueueStats, StoreError> {
        let (pending_jobs, recent_entries) =
            tokio::try_join!(self.hot.len(QUEUE_KEY), self.hot.len(RECENT_KEY))?;
        Ok(QueueStats {
            pending_jobs,
            recent_entries,
        })
    }

    /// Upserts the metadata record; the first write of a pending article
    /// also enqueues it. Returns whether the record was created.
    ///
    /// A pending record is refused over a stored terminal one.
    async fn write_metadata(&self, article: &Article) -> Result<bool, StoreError> {
        let key = metadata_key(article.id);
        let value = serde_json::to_string(&article.metadata())?;
        let member = article.id.to_string();

        let enqueue = article.is_pending().then(|| Enqueue {
            queue_key: QUEUE_KEY,
            recent_key: RECENT_KEY,
            member: &member,
            recent_capacity: self.config.recent_capacity,
        });

        match self.hot.upsert(&key, &value, enqueue).await? {
            Upsert::Created => Ok(true),
            Upsert::Updated => Ok(false),
            Upsert::Rejected { current } => {
                warn!(
                    article_id = %article.id,
                    stored_status = %current,
                    "Refusing to overwrite a terminal article with a pending copy"
                );
                Err(StoreError::InvalidTransition {
                    from: current,
                    to: article.status.to_string(),
                    reason: "terminal states are final".to_string(),
                })
            }
        }
    }

    async fn load_metadata(&self, id: Uuid) -> Result<Article, StoreError> {
        let key = metadata_key(id);
        let raw = self.hot.get(&key).await?.ok_or(StoreError::NotFound(id))?;
        parse_metadata(&key, &raw)
    }
}

fn parse_metadata(key: &str, raw: &str) -> Result<Article, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl ArticleStore for HybridStore {
    /// Without a cold store, an article carrying content is refused with
    /// `ContentStoreUnavailable`. Its metadata is still written unless it is
    /// `archived`: an archived record is never published without content, so
    /// an archived article that was never saved before stays absent.
    async fn save(&self, article: &Article) -> Result<(), StoreError> {
        if article.has_content() {
            match &self.cold {
                Some(cold) => {
                    // Content must be durable before metadata can point at it
                    cold.put(&ContentKey::Article(article.id), &article.content)
                        .await?;
                }
                None => {
                    // Never publish `archived` without retrievable content
                    if article.status != ArticleStatus::Archived {
                        self.write_metadata(article).await?;
                    }
                    warn!(
                        article_id = %article.id,
                        status = %article.status,
                        "Refusing to save content without a content store"
                    );
                    return Err(StoreError::ContentStoreUnavailable);
                }
            }
        }

        let created = self.write_metadata(article).await?;
        debug!(
            article_id = %article.id,
            status = %article.status,
            created = created,
            "Article saved"
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Article, StoreError> {
        let mut article = self.load_metadata(id).await?;

        if let Some(cold) = &self.cold {
            if let Some(content) = cold.get(&ContentKey::Article(id)).await? {
                article.content = content;
            }
        }

        Ok(article)
    }

    async fn list(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        let ids = self.hot.range(RECENT_KEY, limit).await?;
        let mut articles = Vec::with_capacity(ids.len());

        for raw_id in ids {
            let Ok(id) = Uuid::parse_str(&raw_id) else {
                warn!(entry = %raw_id, "Skipping malformed recency index entry");
                continue;
            };

            let key = metadata_key(id);
            let Some(raw) = self.hot.get(&key).await? else {
                debug!(article_id = %id, "Skipping listed article without metadata");
                continue;
            };

            match parse_metadata(&key, &raw) {
                Ok(article) => articles.push(article),
                Err(e) => warn!(article_id = %id, error = %e, "Skipping unreadable metadata"),
            }
        }

        Ok(articles)
    }

    async fn update_status(&self, id: Uuid, status: ArticleStatus) -> Result<(), StoreError> {
        // Merged view, so an archive transition can see whether content exists
        let mut article = self.get(id).await?;
        article.set_status(status)?;

        // Content, if any, is already in the cold store
        self.write_metadata(&article).await?;
        Ok(())
    }

    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Uuid, StoreError> {
        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let Some(raw_id) = self
                .hot
                .pop_blocking(QUEUE_KEY, self.config.poll_interval)
                .await?
            else {
                continue;
            };

            match Uuid::parse_str(&raw_id) {
                Ok(id) => return Ok(id),
                Err(e) => warn!(entry = %raw_id, error = %e, "Discarding malformed queue entry"),
            }
        }
    }
}
