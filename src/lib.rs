//! crusty-buffer: read-it-later article archiving.
//!
//! URLs are queued in a hot store (Redis) and archived by background workers
//! that extract each page's readable content into a local cold store.

pub mod article;
pub mod cli;
pub mod error;
pub mod extract;
pub mod scheduler;
pub mod store;

pub use article::{Article, ArticleStatus};
pub use error::{ExtractionError, StoreError};
pub use store::{ArticleStore, HybridStore, StoreConfig};
