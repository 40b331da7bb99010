mod fetch;
mod filename;
mod probe;
mod tool;
mod transcode;

pub use fetch::{CandidateItem, FetchedAudio, MediaFetcher};
pub use filename::{
    PLACEHOLDER, TARGET_EXTENSION, audio_filename, download_filename, is_target_format,
    sanitize_title, storage_key,
};
pub use probe::{AudioStream, MediaInfo, MediaProbe, YtDlpProbe};
pub use transcode::{FfmpegTranscoder, Transcoder};
