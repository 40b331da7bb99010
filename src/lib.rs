pub mod config;
pub mod error;
pub mod filter;
pub mod http;
pub mod media;
pub mod model;
pub mod pipeline;
pub mod publisher;
pub mod source;
pub mod status;
pub mod storage;

// Re-export main types for convenience
pub use config::{ConversionConfig, Credentials, HostCredentials, PollConfig, RetryConfig};
pub use error::{
    ConfigError, ConversionError, EnumerationError, FetchError, PublishError, ResolveError,
    StorageError,
};
pub use filter::{ItemFilter, Rejection};
pub use http::{HttpClient, HttpReply, HttpRequest, HttpResponse, ReqwestClient};
pub use media::{FfmpegTranscoder, MediaFetcher, MediaProbe, Transcoder, YtDlpProbe};
pub use model::{
    ConversionResult, Episode, ItemCriteria, ItemOutcome, ItemReport, ItemStage, Job, JobId,
    JobOutcome, Source, SourceInput, SourceKind, VideoRef,
};
pub use pipeline::{JobState, Pipeline, run_conversion};
pub use publisher::{EpisodeDraft, PodcastPublisher};
pub use source::{SourceResolver, VideoLister, YouTubeResolver};
pub use status::{
    JobStatus, NoopSink, SharedStatusSink, StatusEvent, StatusHub, StatusKind, StatusSink,
};
pub use storage::{HttpObjectStore, ObjectStore, public_url};
