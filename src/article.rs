//! Article entity and its status state machine.
//!
//! An [`Article`] is both the unit of work (a URL waiting to be archived) and
//! the stored result. Its status only ever moves forward:
//!
//! ```text
//!              ┌──────────► archived
//!   pending ───┤
//!              └──────────► failed
//! ```
//!
//! Both terminal states are sticky. Re-applying the current terminal status is
//! accepted so that status-flip helpers can re-save a record, but nothing leads
//! back to `pending`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Lifecycle status of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    /// Queued, waiting for a worker.
    Pending,
    /// Content extracted and stored.
    Archived,
    /// Extraction or persistence failed; `error_message` says why.
    Failed,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Archived => "archived",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A web article to be archived.
///
/// `content` is the only large field. It is never part of the hot metadata
/// record and is skipped when serializing an empty value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub status: ArticleStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl Article {
    /// Creates a pending article for `url` with a fresh id.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            title: String::new(),
            excerpt: String::new(),
            content: String::new(),
            status: ArticleStatus::Pending,
            created_at: Utc::now(),
            archived_at: None,
            error_message: String::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ArticleStatus::Pending
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    /// Copy of this article without its content, as stored in the hot store.
    pub fn metadata(&self) -> Self {
        Self {
            content: String::new(),
            ..self.clone()
        }
    }

    /// Moves a pending article to `archived` with the extracted text.
    pub fn mark_archived(
        &mut self,
        title: impl Into<String>,
        excerpt: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.ensure_pending(ArticleStatus::Archived)?;
        self.title = title.into();
        self.excerpt = excerpt.into();
        self.content = content.into();
        self.status = ArticleStatus::Archived;
        self.archived_at = Some(Utc::now());
        self.error_message.clear();
        Ok(())
    }

    /// Moves a pending article to `failed`, recording `message`.
    ///
    /// Derived text is cleared: a failed article never carries content.
    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), StoreError> {
        self.ensure_pending(ArticleStatus::Failed)?;
        let message = message.into();
        self.error_message = if message.is_empty() {
            "unknown error".to_string()
        } else {
            message
        };
        self.status = ArticleStatus::Failed;
        self.archived_at = None;
        self.title.clear();
        self.excerpt.clear();
        self.content.clear();
        Ok(())
    }

    /// Applies a bare status change, as used by the store's status-flip helper.
    ///
    /// Re-applying the current status is a no-op. Archiving requires content
    /// to already be present on this value.
    pub fn set_status(&mut self, status: ArticleStatus) -> Result<(), StoreError> {
        if status == self.status {
            return Ok(());
        }
        match status {
            ArticleStatus::Pending => Err(self.transition_error(status, "terminal states are final")),
            ArticleStatus::Archived => {
                self.ensure_pending(status)?;
                if !self.has_content() {
                    return Err(self.transition_error(status, "no archived content exists"));
                }
                let (title, excerpt, content) = (
                    std::mem::take(&mut self.title),
                    std::mem::take(&mut self.excerpt),
                    std::mem::take(&mut self.content),
                );
                self.mark_archived(title, excerpt, content)
            }
            ArticleStatus::Failed => self.mark_failed("marked as failed"),
        }
    }

    fn ensure_pending(&self, to: ArticleStatus) -> Result<(), StoreError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(self.transition_error(to, "terminal states are final"))
        }
    }

    fn transition_error(&self, to: ArticleStatus, reason: &str) -> StoreError {
        StoreError::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_article_is_pending() {
        let article = Article::new("http://example.com");

        assert_eq!(article.status, ArticleStatus::Pending);
        assert_eq!(article.url, "http://example.com");
        assert!(article.title.is_empty());
        assert!(!article.has_content());
        assert!(article.archived_at.is_none());
        assert!(article.error_message.is_empty());
    }

    #[test]
    fn test_mark_archived() {
        let mut article = Article::new("http://example.com");
        article
            .mark_archived("T", "short", "<p>c</p>")
            .expect("pending article should archive");

        assert_eq!(article.status, ArticleStatus::Archived);
        assert_eq!(article.title, "T");
        assert_eq!(article.content, "<p>c</p>");
        assert!(article.archived_at.is_some());
        assert!(article.error_message.is_empty());
    }

    #[test]
    fn test_mark_failed_clears_content() {
        let mut article = Article::new("http://example.com");
        article.content = "stray".to_string();
        article.mark_failed("404").expect("pending article should fail");

        assert_eq!(article.status, ArticleStatus::Failed);
        assert_eq!(article.error_message, "404");
        assert!(article.content.is_empty());
        assert!(article.archived_at.is_none());
    }

    #[test]
    fn test_mark_failed_never_leaves_message_empty() {
        let mut article = Article::new("http://example.com");
        article.mark_failed("").expect("pending article should fail");
        assert!(!article.error_message.is_empty());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut archived = Article::new("http://a");
        archived.mark_archived("T", "", "c").expect("archive");
        let archived_at = archived.archived_at;

        assert!(archived.mark_failed("late").is_err());
        assert!(archived.mark_archived("T2", "", "c2").is_err());
        assert!(archived.set_status(ArticleStatus::Pending).is_err());
        assert_eq!(archived.archived_at, archived_at);

        let mut failed = Article::new("http://b");
        failed.mark_failed("boom").expect("fail");
        assert!(failed.set_status(ArticleStatus::Pending).is_err());
        assert!(failed.set_status(ArticleStatus::Archived).is_err());
        assert_eq!(failed.status, ArticleStatus::Failed);
    }

    #[test]
    fn test_set_status_same_terminal_is_noop() {
        let mut article = Article::new("http://a");
        article.mark_failed("boom").expect("fail");
        article
            .set_status(ArticleStatus::Failed)
            .expect("re-applying the same status is allowed");
        assert_eq!(article.error_message, "boom");
    }

    #[test]
    fn test_set_status_archived_requires_content() {
        let mut article = Article::new("http://a");
        let err = article
            .set_status(ArticleStatus::Archived)
            .expect_err("no content to archive");
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert!(article.is_pending());

        article.content = "<p>c</p>".to_string();
        article
            .set_status(ArticleStatus::Archived)
            .expect("content present");
        assert_eq!(article.content, "<p>c</p>");
        assert!(article.archived_at.is_some());
    }

    #[test]
    fn test_metadata_excludes_content() {
        let mut article = Article::new("http://a");
        article.mark_archived("T", "e", "<p>big</p>").expect("archive");

        let meta = article.metadata();
        assert!(meta.content.is_empty());
        assert_eq!(meta.title, "T");

        let json = serde_json::to_string(&meta).expect("serialize");
        assert!(!json.contains("content"));
        assert!(json.contains("\"status\":\"archived\""));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ArticleStatus::Pending.to_string(), "pending");
        assert!(ArticleStatus::Failed.is_terminal());
        assert!(!ArticleStatus::Pending.is_terminal());
    }
}
