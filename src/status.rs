use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::model::JobId;

/// Default buffer per topic; slow observers lose the oldest messages
const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// Rough classification of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Progress,
    ItemDone,
    ItemSkipped,
    ItemFailed,
    /// The job was aborted; emitted at most once per job
    Fatal,
    /// The job stopped early on request
    Cancelled,
    /// Final summary
    Completed,
}

/// A single progress message for one job
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub job_id: JobId,
    pub kind: StatusKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Destination for status events.
///
/// Implementations must tolerate concurrent publishers, since every running
/// job shares the same sink.
pub trait StatusSink: Send + Sync {
    fn publish(&self, event: StatusEvent);
}

/// A shared reference to a status sink
pub type SharedStatusSink = Arc<dyn StatusSink>;

/// A sink that silently drops every event.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn publish(&self, _event: StatusEvent) {}
}

impl NoopSink {
    pub fn shared() -> SharedStatusSink {
        Arc::new(Self)
    }
}

/// Publish/subscribe hub with one topic per job.
///
/// Delivery is best-effort: an observer only sees events emitted after it
/// subscribed, and a lagging observer may miss some.
pub struct StatusHub {
    topics: Mutex<HashMap<JobId, broadcast::Sender<StatusEvent>>>,
    all: broadcast::Sender<StatusEvent>,
    capacity: usize,
}

impl StatusHub {
    pub fn new(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        Self {
            topics: Mutex::new(HashMap::new()),
            all,
            capacity,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to one job's events
    pub fn subscribe(&self, job_id: JobId) -> broadcast::Receiver<StatusEvent> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to the events of every job
    pub fn subscribe_all(&self) -> broadcast::Receiver<StatusEvent> {
        self.all.subscribe()
    }

    /// Drop a finished job's topic; its subscribers see the channel close
    pub fn close(&self, job_id: JobId) {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics.remove(&job_id);
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

impl StatusSink for StatusHub {
    fn publish(&self, event: StatusEvent) {
        {
            let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(topic) = topics.get(&event.job_id) {
                // No subscribers is fine
                let _ = topic.send(event.clone());
            }
        }
        let _ = self.all.send(event);
    }
}

/// Emitter bound to one job; stamps and logs every message
#[derive(Clone)]
pub struct JobStatus {
    job_id: JobId,
    sink: SharedStatusSink,
}

impl JobStatus {
    pub fn new(job_id: JobId, sink: SharedStatusSink) -> Self {
        Self { job_id, sink }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn emit(&self, kind: StatusKind, message: impl Into<String>) {
        let message = message.into();

        match kind {
            StatusKind::Fatal => tracing::error!(job_id = %self.job_id, "{message}"),
            StatusKind::ItemFailed => tracing::warn!(job_id = %self.job_id, "{message}"),
            _ => tracing::info!(job_id = %self.job_id, "{message}"),
        }

        self.sink.publish(StatusEvent {
            job_id: self.job_id,
            kind,
            message,
            timestamp: Utc::now(),
        });
    }

    pub fn progress(&self, message: impl Into<String>) {
        self.emit(StatusKind::Progress, message);
    }
}
