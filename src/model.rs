use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::Rejection;

/// Identifier of one conversion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The two kinds of video collections a job can convert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Channel,
    Playlist,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Channel => f.write_str("channel"),
            SourceKind::Playlist => f.write_str("playlist"),
        }
    }
}

/// A canonical channel or playlist id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    pub id: String,
}

impl Source {
    pub fn channel(id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Channel,
            id: id.into(),
        }
    }

    pub fn playlist(id: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Playlist,
            id: id.into(),
        }
    }

    /// Platform ids only use letters, digits, `-` and `_`.
    ///
    /// The id becomes a directory name and a storage key segment, so anything
    /// else is refused.
    pub fn has_valid_id(&self) -> bool {
        !self.id.is_empty()
            && self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

/// What the caller asked to convert: either already canonical, or raw input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInput {
    Resolved(Source),
    Url(String),
}

/// Per-job selection criteria
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCriteria {
    /// Inclusive lower bound
    pub min_duration_seconds: Option<u64>,
    /// Videos longer than this are skipped
    pub max_duration_seconds: Option<u64>,
    /// Case-insensitive substring the title must contain
    pub title_filter: Option<String>,
}

/// One conversion request
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub source: SourceInput,
    pub criteria: ItemCriteria,
}

impl Job {
    pub fn new(source: SourceInput, criteria: ItemCriteria) -> Self {
        Self {
            id: JobId::new(),
            source,
            criteria,
        }
    }
}

/// A video as returned by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    pub url: String,
    pub description: String,
}

/// A published episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    pub description: String,
    pub audio_url: String,
    pub host_episode_id: u64,
    /// `sha256:<hex>` of the uploaded audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Step of item processing at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    Inspecting,
    Fetching,
    Uploading,
    Publishing,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemStage::Inspecting => "inspect",
            ItemStage::Fetching => "fetch",
            ItemStage::Uploading => "upload",
            ItemStage::Publishing => "publish",
        };
        f.write_str(name)
    }
}

/// How one item ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Created on the host; `ready` is false when polling did not confirm processing
    Published { host_episode_id: u64, ready: bool },
    Skipped(Rejection),
    Failed { stage: ItemStage, error: String },
}

/// Structured per-item result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub video: VideoRef,
    pub title: Option<String>,
    pub outcome: ItemOutcome,
}

/// Terminal state of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    Aborted { reason: String },
    Cancelled,
}

/// What a job hands back to its caller
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub job_id: JobId,
    pub outcome: JobOutcome,
    /// Episodes in enumeration order
    pub episodes: Vec<Episode>,
    pub items: Vec<ItemReport>,
}

impl ConversionResult {
    pub(crate) fn aborted(job_id: JobId, reason: String) -> Self {
        Self {
            job_id,
            outcome: JobOutcome::Aborted { reason },
            episodes: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, ItemOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, ItemOutcome::Skipped(_)))
            .count()
    }
}
