//! Debounced message buffering
//!
//! Rapid-fire message fragments from one (group, user) are coalesced into a
//! single query. Every append restarts a per-key debounce timer; the buffer
//! flushes when the quiet period elapses, or immediately when it fills up.
//! Flush payloads are handed to the consumer over an mpsc channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::session::RoomKey;

/// Quiet period after which buffered fragments are flushed
pub const DEBOUNCE_WINDOW: std::time::Duration = std::time::Duration::from_secs(10);
/// Fragment count that forces an immediate flush
pub const MAX_BUFFERED: usize = 10;

/// A drained buffer: the merged text plus any pending file references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushPayload {
    pub key: RoomKey,
    pub text: String,
    pub files: Vec<String>,
}

#[derive(Debug)]
struct BufferEntry {
    fragments: Vec<String>,
    files: Vec<String>,
    count: usize,
    last_append: Instant,
    // At most one live debounce timer per key; replaced on every append
    timer: Option<JoinHandle<()>>,
}

impl BufferEntry {
    fn new(now: Instant) -> Self {
        Self {
            fragments: Vec::new(),
            files: Vec::new(),
            count: 0,
            last_append: now,
            timer: None,
        }
    }

    fn drain(&mut self, key: &RoomKey) -> FlushPayload {
        let text = self.fragments.join("\n");
        let files = self.files.clone();
        self.fragments.clear();
        self.files.clear();
        self.count = 0;
        FlushPayload {
            key: key.clone(),
            text,
            files,
        }
    }
}

/// Per-key buffer table shared with the debounce timer tasks
#[derive(Debug)]
pub struct BufferTable {
    inner: Arc<Mutex<HashMap<RoomKey, BufferEntry>>>,
    flush_tx: mpsc::UnboundedSender<FlushPayload>,
}

impl BufferTable {
    /// Create the table together with the receiving end of the flush channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FlushPayload>) {
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(Mutex::new(HashMap::new())),
                flush_tx,
            },
            flush_rx,
        )
    }

    /// Append a fragment and restart the debounce timer for the key. The
    /// fragment that fills the buffer flushes it immediately instead.
    pub fn append(&self, key: &RoomKey, text: impl Into<String>, files: Vec<String>) {
        let now = Instant::now();
        let full_payload = {
            let mut table = self.inner.lock().unwrap();
            let entry = table
                .entry(key.clone())
                .or_insert_with(|| BufferEntry::new(now));
            entry.fragments.push(text.into());
            entry.files.extend(files);
            entry.count += 1;
            entry.last_append = now;
            debug!(
                group = %key.group_id,
                user = %key.user_id,
                count = entry.count,
                "buffered message fragment"
            );

            if entry.count >= MAX_BUFFERED {
                // A canceled timer never flushes; the payload sent here is
                // exactly what was buffered at the decision point.
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
                Some(entry.drain(key))
            } else {
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
                entry.timer = Some(self.spawn_timer(key.clone()));
                None
            }
        };

        if let Some(payload) = full_payload {
            debug!(group = %key.group_id, user = %key.user_id, "buffer full, flushing");
            let _ = self.flush_tx.send(payload);
        }
    }

    fn spawn_timer(&self, key: RoomKey) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let flush_tx = self.flush_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(DEBOUNCE_WINDOW).await;
                let payload = {
                    let mut table = inner.lock().unwrap();
                    let Some(entry) = table.get_mut(&key) else {
                        return;
                    };
                    if entry.fragments.is_empty() {
                        entry.timer = None;
                        return;
                    }
                    if Instant::now().saturating_duration_since(entry.last_append)
                        >= DEBOUNCE_WINDOW
                    {
                        entry.timer = None;
                        Some(entry.drain(&key))
                    } else {
                        // An append raced with the expiry; wait out another
                        // full quiet window.
                        None
                    }
                };
                match payload {
                    Some(payload) => {
                        let _ = flush_tx.send(payload);
                        return;
                    }
                    None => continue,
                }
            }
        })
    }

    /// Drain the buffered fragments and files for a key, leaving the entry
    /// in place. Absent or empty entries yield an empty payload.
    pub fn drain(&self, key: &RoomKey) -> (String, Vec<String>) {
        let mut table = self.inner.lock().unwrap();
        match table.get_mut(key) {
            Some(entry) => {
                let payload = entry.drain(key);
                (payload.text, payload.files)
            }
            None => (String::new(), Vec::new()),
        }
    }

    /// Cancel the timer and delete the entry. No-op if absent.
    pub fn remove(&self, key: &RoomKey) {
        let mut table = self.inner.lock().unwrap();
        if let Some(entry) = table.remove(key) {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
    }

    /// Number of live buffer entries
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for BufferTable {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            flush_tx: self.flush_tx.clone(),
        }
    }
}
