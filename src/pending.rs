//! Pending tool calls awaiting a human decision
//!
//! # How it works
//!
//! 1. When a call pauses, the engine stores a [`PendingToolContext`] keyed by
//!    the original tool-call id.
//! 2. On resume the context is removed and returned in one atomic step, so
//!    two concurrent resumes for the same id can never both succeed.
//! 3. Contexts never expire unless a TTL is configured; then
//!    [`PendingCallStore::evict_expired`] (or the background task from
//!    [`spawn_eviction_task`]) drops stale ones.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::{Error, Result};

/// State of a paused tool call
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolContext {
    /// Tool-call id the model used
    pub original_tool_call_id: String,
    /// Tool name the model called
    pub tool_name: String,
    /// Client that owns the operation
    pub client_name: String,
    /// Operation to execute on approval
    pub operation_id: String,
    /// Arguments as validated before the pause
    pub original_args: Value,
    /// When the call paused
    pub created_at: Instant,
}

impl PendingToolContext {
    /// Return `true` when older than `ttl`
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

// ── PendingCallStore ──────────────────────────────────────────────────────────

/// Thread-safe store of paused calls
///
/// All operations are O(1) amortised thanks to the underlying `DashMap`.
///
/// # Example
///
/// ```
/// use std::time::Instant;
/// use openapi_toolkit::pending::{PendingCallStore, PendingToolContext};
/// use serde_json::json;
///
/// let store = PendingCallStore::new();
/// store.insert(PendingToolContext {
///     original_tool_call_id: "T1".to_string(),
///     tool_name: "deletePet".to_string(),
///     client_name: "petstore".to_string(),
///     operation_id: "deletePet".to_string(),
///     original_args: json!({ "path": { "petId": 10 } }),
///     created_at: Instant::now(),
/// });
///
/// assert!(store.consume("T1").is_ok());
/// assert!(store.consume("T1").is_err());
/// ```
#[derive(Debug, Default)]
pub struct PendingCallStore {
    entries: DashMap<String, PendingToolContext>,
    ttl: Option<Duration>,
}

impl PendingCallStore {
    /// Create a store whose contexts never expire
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose contexts expire after `ttl`
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    /// Store a context, replacing any earlier one with the same id
    pub fn insert(&self, context: PendingToolContext) {
        debug!(
            tool_call_id = %context.original_tool_call_id,
            tool = %context.tool_name,
            "Stored pending tool call"
        );
        self.entries
            .insert(context.original_tool_call_id.clone(), context);
    }

    /// Remove and return the context for `tool_call_id`
    ///
    /// # Errors
    ///
    /// Returns [`Error::PendingContextNotFound`] if there is no live context,
    /// including when it was already consumed or has expired.
    pub fn consume(&self, tool_call_id: &str) -> Result<PendingToolContext> {
        let (_, context) = self
            .entries
            .remove(tool_call_id)
            .ok_or_else(|| Error::PendingContextNotFound(tool_call_id.to_string()))?;

        if self.ttl.is_some_and(|ttl| context.is_expired(ttl)) {
            debug!(tool_call_id, "Pending tool call expired before resume");
            return Err(Error::PendingContextNotFound(tool_call_id.to_string()));
        }
        Ok(context)
    }

    /// Copy of the context without consuming it
    #[must_use]
    pub fn get(&self, tool_call_id: &str) -> Option<PendingToolContext> {
        self.entries.get(tool_call_id).map(|e| e.value().clone())
    }

    /// Return `true` if `tool_call_id` is paused
    #[must_use]
    pub fn contains(&self, tool_call_id: &str) -> bool {
        self.entries.contains_key(tool_call_id)
    }

    /// Drop a context without resuming it
    pub fn remove(&self, tool_call_id: &str) {
        self.entries.remove(tool_call_id);
    }

    /// Evict contexts older than the configured TTL; no-op without one
    pub fn evict_expired(&self) {
        let Some(ttl) = self.ttl else {
            return;
        };
        let before = self.entries.len();
        self.entries.retain(|_, context| !context.is_expired(ttl));
        let count = before.saturating_sub(self.entries.len());
        if count > 0 {
            debug!(count, "Evicted expired pending tool calls");
        }
    }

    /// Configured TTL
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Number of paused calls
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is paused
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Background eviction ───────────────────────────────────────────────────────

/// Spawn a task calling [`PendingCallStore::evict_expired`] every `interval`
///
/// The task stops once every other `Arc` to the store is dropped.
pub fn spawn_eviction_task(
    store: Arc<PendingCallStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if Arc::strong_count(&store) <= 1 {
                debug!("Pending store dropped, stopping eviction task");
                break;
            }
            store.evict_expired();
        }
    })
}
