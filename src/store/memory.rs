//! In-process hot store.
//!
//! Mirrors the Redis semantics the façade relies on (left push, right pop,
//! atomic create-and-enqueue) behind one async mutex. Useful for tests and
//! for single-process deployments that do not need a network service.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::hot::{Enqueue, HotStore, Upsert, PENDING_STATUS};
use crate::error::StoreError;

#[derive(Default)]
struct State {
    values: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
}

/// Hot store held entirely in memory.
#[derive(Default)]
pub struct MemoryHotStore {
    state: Mutex<State>,
    pushed: Notify,
}

impl MemoryHotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes a plain key. Lists are untouched.
    pub async fn remove(&self, key: &str) -> Option<String> {
        self.state.lock().await.values.remove(key)
    }

    /// Snapshot of a list, left to right.
    pub async fn list_snapshot(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HotStore for MemoryHotStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().await.values.get(key).cloned())
    }

    async fn upsert(
        &self,
        key: &str,
        value: &str,
        enqueue: Option<Enqueue<'_>>,
    ) -> Result<Upsert, StoreError> {
        let mut state = self.state.lock().await;

        if enqueue.is_some() {
            if let Some(current) = state.values.get(key).and_then(|raw| stored_status(raw)) {
                if current != PENDING_STATUS {
                    return Ok(Upsert::Rejected { current });
                }
            }
        }

        let created = state
            .values
            .insert(key.to_string(), value.to_string())
            .is_none();
        if !created {
            return Ok(Upsert::Updated);
        }

        if let Some(enqueue) = enqueue {
            state
                .lists
                .entry(enqueue.queue_key.to_string())
                .or_default()
                .push_front(enqueue.member.to_string());

            let recent = state
                .lists
                .entry(enqueue.recent_key.to_string())
                .or_default();
            recent.push_front(enqueue.member.to_string());
            recent.truncate(enqueue.recent_capacity.max(1));

            drop(state);
            self.pushed.notify_waiters();
        }

        Ok(Upsert::Created)
    }

    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .lists
            .get(key)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn pop_blocking(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a push in between is not missed
            let pushed = self.pushed.notified();

            if let Some(value) = self
                .state
                .lock()
                .await
                .lists
                .get_mut(key)
                .and_then(|list| list.pop_back())
            {
                return Ok(Some(value));
            }

            if tokio::time::timeout_at(deadline, pushed).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .lists
            .get(key)
            .map_or(0, VecDeque::len))
    }
}

/// `status` field of a stored JSON record; unreadable records have none.
fn stored_status(raw: &str) -> Option<String> {
    let record: serde_json::Value = serde_json::from_str(raw).ok()?;
    record.get("status")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn enqueue(member: &str) -> Enqueue<'_> {
        Enqueue {
            queue_key: "q",
            recent_key: "r",
            member,
            recent_capacity: 3,
        }
    }

    #[tokio::test]
    async fn test_upsert_enqueues_only_on_creation() {
        let store = MemoryHotStore::new();

        assert_eq!(
            store.upsert("k", "v1", Some(enqueue("a"))).await.expect("upsert"),
            Upsert::Created
        );
        assert_eq!(
            store.upsert("k", "v2", Some(enqueue("a"))).await.expect("upsert"),
            Upsert::Updated
        );

        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("v2"));
        assert_eq!(store.len("q").await.expect("len"), 1);
        assert_eq!(store.list_snapshot("r").await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_recent_list_is_trimmed_most_recent_first() {
        let store = MemoryHotStore::new();
        for member in ["a", "b", "c", "d"] {
            store
                .upsert(member, "v", Some(enqueue(member)))
                .await
                .expect("upsert");
        }

        assert_eq!(store.range("r", 10).await.expect("range"), vec!["d", "c", "b"]);
        assert_eq!(store.range("r", 2).await.expect("range"), vec!["d", "c"]);
        assert!(store.range("r", 0).await.expect("range").is_empty());
    }

    #[tokio::test]
    async fn test_pop_is_fifo() {
        let store = MemoryHotStore::new();
        for member in ["a", "b"] {
            store
                .upsert(member, "v", Some(enqueue(member)))
                .await
                .expect("upsert");
        }

        let timeout = Duration::from_millis(10);
        assert_eq!(store.pop_blocking("q", timeout).await.expect("pop").as_deref(), Some("a"));
        assert_eq!(store.pop_blocking("q", timeout).await.expect("pop").as_deref(), Some("b"));
        assert_eq!(store.pop_blocking("q", timeout).await.expect("pop"), None);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let store = Arc::new(MemoryHotStore::new());

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.pop_blocking("q", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .upsert("k", "v", Some(enqueue("late")))
            .await
            .expect("upsert");

        let popped = waiter.await.expect("join").expect("pop");
        assert_eq!(popped.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_pending_write_cannot_replace_terminal_record() {
        let store = MemoryHotStore::new();
        let pending = r#"{"status":"pending","title":""}"#;
        let archived = r#"{"status":"archived","title":"T"}"#;

        store.upsert("k", pending, Some(enqueue("a"))).await.expect("upsert");
        assert_eq!(
            store.upsert("k", archived, None).await.expect("upsert"),
            Upsert::Updated
        );

        let outcome = store.upsert("k", pending, Some(enqueue("a"))).await.expect("upsert");
        assert_eq!(
            outcome,
            Upsert::Rejected {
                current: "archived".to_string()
            }
        );
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some(archived));
        assert_eq!(store.len("q").await.expect("len"), 1);

        // Terminal-to-terminal writes are not pending writes and go through
        let failed = r#"{"status":"failed"}"#;
        assert_eq!(
            store.upsert("k", failed, None).await.expect("upsert"),
            Upsert::Updated
        );
    }

    #[tokio::test]
    async fn test_pending_write_replaces_unreadable_record() {
        let store = MemoryHotStore::new();
        store.upsert("k", "not json", None).await.expect("upsert");

        assert_eq!(
            store
                .upsert("k", r#"{"status":"pending"}"#, Some(enqueue("a")))
                .await
                .expect("upsert"),
            Upsert::Updated
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryHotStore::new();
        store.upsert("k", "v", None).await.expect("upsert");

        assert_eq!(store.remove("k").await.as_deref(), Some("v"));
        assert_eq!(store.get("k").await.expect("get"), None);
    }
}
