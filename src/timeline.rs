use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Success,
    Error,
    Step,
}

/// One displayed unit of the result timeline. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub id: Uuid,
    /// Insertion order, strictly increasing within a timeline.
    pub seq: u64,
    pub kind: ResultKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

struct Inner {
    entries: VecDeque<ResultEntry>,
    next_seq: u64,
}

/// Append-only result log, newest first. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Timeline {
    inner: Arc<Mutex<Inner>>,
    tx: broadcast::Sender<ResultEntry>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: VecDeque::new(),
                next_seq: 0,
            })),
            tx,
        }
    }

    pub fn push(&self, kind: ResultKind, content: impl Into<String>, confidence: Option<f64>) -> ResultEntry {
        let mut inner = self.lock();
        let entry = ResultEntry {
            id: Uuid::new_v4(),
            seq: inner.next_seq,
            kind,
            content: content.into(),
            confidence,
            created_at: Utc::now(),
        };
        inner.next_seq += 1;
        inner.entries.push_front(entry.clone());
        // Broadcast under the lock so subscribers see `seq` in order.
        // No subscribers is fine.
        let _ = self.tx.send(entry.clone());
        drop(inner);
        tracing::debug!(seq = entry.seq, kind = ?entry.kind, "timeline entry added");
        entry
    }

    pub fn success(&self, content: impl Into<String>, confidence: f64) -> ResultEntry {
        self.push(ResultKind::Success, content, Some(confidence))
    }

    pub fn error(&self, content: impl Into<String>) -> ResultEntry {
        self.push(ResultKind::Error, content, None)
    }

    pub fn step(&self, content: impl Into<String>, confidence: f64) -> ResultEntry {
        self.push(ResultKind::Step, content, Some(confidence))
    }

    /// Entries in display order, newest first.
    pub fn snapshot(&self) -> Vec<ResultEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Entries in insertion order, oldest first.
    pub fn chronological(&self) -> Vec<ResultEntry> {
        self.lock().entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Live feed of entries as they are recorded.
    pub fn subscribe(&self) -> broadcast::Receiver<ResultEntry> {
        self.tx.subscribe()
    }

    /// Full session reset.
    pub fn clear(&self) {
        self.lock().entries.clear();
        tracing::debug!("timeline cleared");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
