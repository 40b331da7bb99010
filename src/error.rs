use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating the resolved configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors that can occur when turning user input into a channel or playlist id
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Unrecognised channel or playlist reference: {0}")]
    Unrecognised(String),

    #[error("Invalid channel or playlist id: {0:?}")]
    InvalidId(String),

    #[error("No channel found for handle {0}")]
    UnknownHandle(String),

    #[error("Lookup request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Malformed lookup response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors that can occur while paginating the video listing API
#[derive(Error, Debug)]
pub enum EnumerationError {
    #[error("Failed to fetch page {page} from {url}: {source}")]
    FetchFailed {
        url: String,
        page: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for page {page} ({url})")]
    HttpStatus {
        url: String,
        page: usize,
        status: u16,
    },

    #[error("Malformed listing page {page}: {source}")]
    Malformed {
        page: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid listing URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors that can occur while resolving, downloading or transcoding a video
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to run {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("Malformed metadata for {url}: {source}")]
    Metadata {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No audio stream available for {0}")]
    NoAudioStream(String),

    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to write {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcode of {path} failed: {message}")]
    TranscodeFailed { path: PathBuf, message: String },
}

/// Errors raised by object storage
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },
}

/// Errors raised by the podcast host
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Audio URL is not reachable: {0}")]
    AudioUnreachable(String),

    #[error("Podcast host request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Podcast host rejected the request with HTTP {status}")]
    Rejected { status: u16, body: String },

    #[error("Podcast host kept answering HTTP {status} after {attempts} attempts")]
    RetriesExhausted { status: u16, attempts: u32 },

    #[error("Malformed podcast host response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Episode {episode_id} was still processing after {attempts} status checks")]
    PollTimedOut { episode_id: u64, attempts: u32 },

    #[error("Cancelled")]
    Cancelled,
}

/// Job-fatal errors; any of these aborts the whole conversion
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Enumeration error: {0}")]
    Enumeration(#[from] EnumerationError),

    #[error("Failed to prepare work directory {path}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
