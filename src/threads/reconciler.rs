//! Merges the server thread list with a locally created thread.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::ConversationThread;
use crate::client::Client;
use crate::error::Result;

/// Where the authoritative thread list comes from.
#[async_trait]
pub trait ThreadSource: Send + Sync {
    /// All threads whose metadata names `assistant_id`.
    async fn search_threads(&self, assistant_id: &str) -> Result<Vec<ConversationThread>>;
}

#[async_trait]
impl ThreadSource for Client {
    async fn search_threads(&self, assistant_id: &str) -> Result<Vec<ConversationThread>> {
        self.threads().search(assistant_id).await
    }
}

/// Proof that a refresh was requested; only the latest one may be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct RefreshTicket {
    generation: u64,
    assistant_id: String,
}

impl RefreshTicket {
    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }
}

/// Thread history of one assistant.
///
/// The server list is replaced wholesale on every refresh. A thread created
/// locally lives in a separate slot and is only shown while the server list
/// does not contain its id, so an id is never listed twice.
#[derive(Debug)]
pub struct ThreadReconciler {
    assistant_id: String,
    threads: Vec<ConversationThread>,
    optimistic: Option<ConversationThread>,
    refresh_key: u64,
    generation: u64,
    loading: bool,
    last_error: Option<String>,
}

impl ThreadReconciler {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            threads: Vec::new(),
            optimistic: None,
            refresh_key: 0,
            generation: 0,
            loading: false,
            last_error: None,
        }
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    /// Whether a requested refresh has not been applied yet.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message of the last failed refresh, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Switch to another assistant. Drops everything and asks for a refresh.
    pub fn set_assistant(&mut self, assistant_id: impl Into<String>) -> RefreshTicket {
        self.assistant_id = assistant_id.into();
        self.threads.clear();
        self.optimistic = None;
        self.last_error = None;
        self.begin_refresh()
    }

    /// Request a refresh; any older outstanding ticket becomes stale.
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.generation += 1;
        self.loading = true;
        RefreshTicket {
            generation: self.generation,
            assistant_id: self.assistant_id.clone(),
        }
    }

    /// Apply the result of a fetch. Returns `false` if the ticket is stale.
    ///
    /// A failed fetch keeps the current list.
    pub fn apply_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<ConversationThread>>,
    ) -> bool {
        if ticket.generation != self.generation || ticket.assistant_id != self.assistant_id {
            debug!(
                stale = ticket.generation,
                current = self.generation,
                "Discarding stale thread refresh"
            );
            return false;
        }
        self.loading = false;
        match result {
            Ok(mut threads) => {
                threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                if self
                    .optimistic
                    .as_ref()
                    .is_some_and(|o| threads.iter().any(|t| t.thread_id == o.thread_id))
                {
                    self.optimistic = None;
                }
                self.threads = threads;
                self.last_error = None;
            }
            Err(err) => {
                warn!(
                    name: "threads.refresh.failed",
                    assistant_id = %self.assistant_id,
                    error = %err,
                    "Failed to fetch threads"
                );
                self.last_error = Some(err.to_string());
            }
        }
        true
    }

    /// Fetch and apply in one step.
    pub async fn refresh<S: ThreadSource + ?Sized>(&mut self, source: &S) -> bool {
        let ticket = self.begin_refresh();
        let result = source.search_threads(ticket.assistant_id()).await;
        self.apply_refresh(ticket, result)
    }

    /// Follow the caller's refresh counter. A changed value asks for a refresh.
    pub fn sync_refresh_key(&mut self, key: u64) -> Option<RefreshTicket> {
        if key == self.refresh_key {
            return None;
        }
        self.refresh_key = key;
        Some(self.begin_refresh())
    }

    /// Show a thread the server may not report yet.
    ///
    /// Ignored if the id is already listed. Replaces any earlier optimistic entry.
    pub fn insert_optimistic(&mut self, thread_id: &str, preview: &str) -> bool {
        if self.contains(thread_id) {
            return false;
        }
        self.optimistic = Some(ConversationThread::optimistic(
            thread_id,
            self.assistant_id.clone(),
            preview,
        ));
        true
    }

    fn contains(&self, thread_id: &str) -> bool {
        self.threads.iter().any(|t| t.thread_id == thread_id)
            || self
                .optimistic
                .as_ref()
                .is_some_and(|o| o.thread_id == thread_id)
    }

    /// Threads to display, most recent first.
    pub fn threads(&self) -> Vec<&ConversationThread> {
        let pending = self
            .optimistic
            .as_ref()
            .filter(|o| !self.threads.iter().any(|t| t.thread_id == o.thread_id));
        pending.into_iter().chain(self.threads.iter()).collect()
    }

    pub fn len(&self) -> usize {
        self.threads().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty() && self.optimistic.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::{TimeZone, Utc};
    use serde_json::Map;

    fn server_thread(id: &str, day: u32) -> ConversationThread {
        let at = Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap();
        ConversationThread {
            thread_id: id.to_string(),
            assistant_id: "a1".to_string(),
            created_at: at,
            updated_at: at,
            metadata: Map::new(),
            values: None,
            preview: format!("thread {id}"),
        }
    }

    fn ids(reconciler: &ThreadReconciler) -> Vec<&str> {
        reconciler
            .threads()
            .into_iter()
            .map(|t| t.thread_id.as_str())
            .collect()
    }

    #[test]
    fn refresh_sorts_by_most_recent_update() {
        let mut threads = ThreadReconciler::new("a1");
        let ticket = threads.begin_refresh();
        assert!(threads.is_loading());
        assert!(threads.apply_refresh(
            ticket,
            Ok(vec![server_thread("old", 1), server_thread("new", 9), server_thread("mid", 5)])
        ));
        assert!(!threads.is_loading());
        assert_eq!(ids(&threads), ["new", "mid", "old"]);
    }

    #[test]
    fn optimistic_thread_is_superseded_by_server_record() {
        let mut threads = ThreadReconciler::new("a1");
        let ticket = threads.begin_refresh();
        threads.apply_refresh(ticket, Ok(vec![server_thread("t0", 1)]));

        assert!(threads.insert_optimistic("t1", "hello"));
        assert_eq!(ids(&threads), ["t1", "t0"]);

        let ticket = threads.begin_refresh();
        threads.apply_refresh(ticket, Ok(vec![server_thread("t1", 2), server_thread("t0", 1)]));

        let listed = threads.threads();
        assert_eq!(listed.iter().filter(|t| t.thread_id == "t1").count(), 1);
        assert_eq!(listed[0].preview, "thread t1");
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn optimistic_insert_skips_known_ids() {
        let mut threads = ThreadReconciler::new("a1");
        let ticket = threads.begin_refresh();
        threads.apply_refresh(ticket, Ok(vec![server_thread("t1", 1)]));

        assert!(!threads.insert_optimistic("t1", "dup"));
        assert_eq!(ids(&threads), ["t1"]);

        assert!(threads.insert_optimistic("t2", "first"));
        assert!(!threads.insert_optimistic("t2", "again"));
        assert_eq!(threads.threads()[0].preview, "first");
    }

    #[test]
    fn stale_results_are_discarded() {
        let mut threads = ThreadReconciler::new("a1");
        let first = threads.begin_refresh();
        let second = threads.begin_refresh();

        assert!(!threads.apply_refresh(first, Ok(vec![server_thread("stale", 1)])));
        assert!(threads.is_loading());
        assert!(threads.apply_refresh(second, Ok(vec![server_thread("fresh", 2)])));
        assert_eq!(ids(&threads), ["fresh"]);
    }

    #[test]
    fn switching_assistant_invalidates_outstanding_tickets() {
        let mut threads = ThreadReconciler::new("a1");
        let ticket = threads.begin_refresh();
        let switched = threads.set_assistant("a2");
        assert_eq!(switched.assistant_id(), "a2");
        assert!(!threads.apply_refresh(ticket, Ok(vec![server_thread("t1", 1)])));
        assert!(threads.is_empty());
    }

    #[test]
    fn failed_refresh_keeps_previous_list() {
        let mut threads = ThreadReconciler::new("a1");
        let ticket = threads.begin_refresh();
        threads.apply_refresh(ticket, Ok(vec![server_thread("t1", 1)]));

        let ticket = threads.begin_refresh();
        let failure = Error::Api {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert!(threads.apply_refresh(ticket, Err(failure)));
        assert_eq!(ids(&threads), ["t1"]);
        assert_eq!(threads.last_error(), Some("API Error (502): bad gateway"));
    }

    #[test]
    fn refresh_key_changes_request_a_refresh() {
        let mut threads = ThreadReconciler::new("a1");
        assert!(threads.sync_refresh_key(0).is_none());
        assert!(threads.sync_refresh_key(1).is_some());
        assert!(threads.sync_refresh_key(1).is_none());
    }
}
