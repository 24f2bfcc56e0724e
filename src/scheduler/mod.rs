//! Background archiving workers.
//!
//! Producers push article ids onto the hot store's work queue; workers pop
//! them, extract the page content and record a terminal status.
//!
//! ```text
//!                      ┌──────────────┐
//!                      │   Producer   │
//!                      │ (crusty add) │
//!                      └──────┬───────┘
//!                             │ save (pending)
//!                      ┌──────▼───────┐
//!                      │    Redis     │
//!                      │queue:archive │
//!                      └──────┬───────┘
//!                             │ dequeue
//!         ┌───────────────────┼───────────────────┐
//!         │                   │                   │
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 1│         │ Worker 2│         │ Worker N│
//!    └─────────┘         └─────────┘         └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use crusty_buffer::extract::HttpExtractor;
//! use crusty_buffer::scheduler::{WorkerPool, WorkerPoolConfig};
//! use crusty_buffer::store::{HybridStore, StoreConfig};
//! use std::sync::Arc;
//!
//! let config = StoreConfig::new("redis://localhost:6379").with_content_path("./crusty-data");
//! let store = Arc::new(HybridStore::open(config).await?);
//!
//! let mut pool = WorkerPool::new(
//!     WorkerPoolConfig::new(4),
//!     store.clone(),
//!     Arc::new(HttpExtractor::new()?),
//! );
//! pool.start()?;
//!
//! // Graceful shutdown
//! pool.shutdown().await?;
//! store.close().await?;
//! ```

pub mod worker_pool;

pub use worker_pool::{
    JobOutcome, PoolError, PoolStats, Worker, WorkerPool, WorkerPoolConfig,
};
