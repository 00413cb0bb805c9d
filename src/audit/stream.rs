//! Buffered audit stream with multi-subscriber fan-out.
//!
//! `write` appends under the buffer lock; a full buffer flushes
//! synchronously. `flush` detaches the buffer under the lock and emits
//! outside it, so slow subscribers and the persistence sink never block
//! writers. Handler errors are logged and swallowed; the stream stays
//! live.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::entry::{AuditEntry, AuditEventType, AuditSeverity};
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::types::new_id;

/// Pluggable persistence for flushed batches. May block; the stream
/// always calls it off the hot path.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn persist(&self, entries: &[AuditEntry]);
}

/// Keeps every persisted batch in memory. The default sink for tests and
/// the demo binary.
#[derive(Default)]
pub struct MemorySink {
    persisted: Mutex<Vec<AuditEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn persisted(&self) -> Vec<AuditEntry> {
        self.persisted.lock().await.clone()
    }

    pub async fn persisted_count(&self) -> usize {
        self.persisted.lock().await.len()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn persist(&self, entries: &[AuditEntry]) {
        self.persisted.lock().await.extend_from_slice(entries);
    }
}

type HandlerFn = Box<dyn Fn(&[AuditEntry]) -> Result<(), AuditError> + Send + Sync>;

struct Subscriber {
    name: String,
    handler: HandlerFn,
}

/// Unsubscribe token returned by [`AuditStream::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(Uuid);

/// Predicates for querying buffered entries. Unset fields match all.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub event_types: Option<Vec<AuditEventType>>,
    pub severities: Option<Vec<AuditSeverity>>,
    pub actor: Option<String>,
    pub trace_id: Option<Uuid>,
}

impl AuditFilter {
    pub fn for_trace(trace_id: Uuid) -> Self {
        Self {
            trace_id: Some(trace_id),
            ..Self::default()
        }
    }

    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(start) = self.start_time
            && entry.timestamp < start
        {
            return false;
        }
        if let Some(end) = self.end_time
            && entry.timestamp > end
        {
            return false;
        }
        if let Some(types) = &self.event_types
            && !types.contains(&entry.event_type)
        {
            return false;
        }
        if let Some(severities) = &self.severities
            && !severities.contains(&entry.severity)
        {
            return false;
        }
        if let Some(actor) = &self.actor
            && &entry.actor != actor
        {
            return false;
        }
        if let Some(trace_id) = self.trace_id
            && entry.trace_id != trace_id
        {
            return false;
        }
        true
    }
}

pub struct AuditStream {
    config: AuditConfig,
    buffer: Mutex<Vec<AuditEntry>>,
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    sink: std::sync::Arc<dyn AuditSink>,
}

impl AuditStream {
    pub fn new(sink: std::sync::Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        Self {
            config,
            buffer: Mutex::new(Vec::new()),
            subscribers: RwLock::new(HashMap::new()),
            sink,
        }
    }

    /// Append an entry. A buffer at capacity flushes synchronously.
    pub async fn write(&self, entry: AuditEntry) {
        let full_batch = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(entry);
            if buffer.len() >= self.config.buffer_size {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };
        if let Some(batch) = full_batch {
            self.emit(batch).await;
        }
    }

    /// Detach the buffer and emit it to subscribers and the sink.
    pub async fn flush(&self) {
        let batch = std::mem::take(&mut *self.buffer.lock().await);
        if !batch.is_empty() {
            self.emit(batch).await;
        }
    }

    async fn emit(&self, batch: Vec<AuditEntry>) {
        {
            let subscribers = self.subscribers.read().await;
            for subscriber in subscribers.values() {
                if let Err(error) = (subscriber.handler)(&batch) {
                    tracing::warn!(
                        subscriber = %subscriber.name,
                        %error,
                        "Audit handler failed; continuing"
                    );
                }
            }
        }
        self.sink.persist(&batch).await;
        tracing::trace!(entries = batch.len(), "Audit batch emitted");
    }

    /// Register a fan-out handler. Every flushed batch is delivered to
    /// every live subscriber exactly once.
    pub async fn subscribe(
        &self,
        name: impl Into<String>,
        handler: HandlerFn,
    ) -> SubscriptionHandle {
        let id = new_id();
        self.subscribers.write().await.insert(
            id,
            Subscriber {
                name: name.into(),
                handler,
            },
        );
        SubscriptionHandle(id)
    }

    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers.write().await.remove(&handle.0);
    }

    /// Entries currently buffered (not yet flushed) that match the filter.
    pub async fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .await
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Spawn the periodic flush task. Stop the handle to end it.
    pub fn start_periodic_flush(self: &std::sync::Arc<Self>) -> FlushHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let stream = std::sync::Arc::clone(self);
        let period = Duration::from_millis(self.config.flush_interval_ms);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => stream.flush().await,
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            // Final drain so nothing buffered is lost on shutdown.
            stream.flush().await;
        });
        FlushHandle { stop_tx, task }
    }
}

/// Stop contract for the periodic flush task.
pub struct FlushHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FlushHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}
