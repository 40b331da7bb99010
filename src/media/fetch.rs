use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::FetchError;
use crate::http::HttpClient;
use crate::model::VideoRef;

use super::filename::{audio_filename, download_filename, is_target_format};
use super::probe::{AudioStream, MediaProbe};
use super::transcode::Transcoder;

/// A video plus the metadata needed to filter it
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub video: VideoRef,
    pub title: String,
    pub duration: Option<Duration>,
    pub stream: Option<AudioStream>,
}

/// A local audio file ready for upload
#[derive(Debug, Clone)]
pub struct FetchedAudio {
    pub path: PathBuf,
    pub filename: String,
    pub bytes_downloaded: u64,
}

/// Resolves metadata, downloads the chosen stream and converts it to mp3
#[derive(Clone)]
pub struct MediaFetcher {
    probe: Arc<dyn MediaProbe>,
    transcoder: Arc<dyn Transcoder>,
}

impl MediaFetcher {
    pub fn new(probe: Arc<dyn MediaProbe>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self { probe, transcoder }
    }

    /// Look up title, duration and the best stream for a video
    pub async fn inspect(&self, video: &VideoRef) -> Result<CandidateItem, FetchError> {
        let info = self.probe.probe(&video.url).await?;
        Ok(CandidateItem {
            video: video.clone(),
            title: info.title,
            duration: info.duration,
            stream: info.stream,
        })
    }

    /// Download the candidate's stream into `dir` and transcode it if needed.
    ///
    /// Intermediate files are removed on both success and failure.
    pub async fn fetch<C: HttpClient>(
        &self,
        client: &C,
        candidate: &CandidateItem,
        dir: &Path,
    ) -> Result<FetchedAudio, FetchError> {
        let stream = candidate
            .stream
            .as_ref()
            .ok_or_else(|| FetchError::NoAudioStream(candidate.video.url.clone()))?;

        let filename = audio_filename(&candidate.title);
        let audio_path = dir.join(&filename);

        if is_target_format(&stream.extension) {
            let bytes_downloaded = download_stream(client, stream, &audio_path).await?;
            return Ok(FetchedAudio {
                path: audio_path,
                filename,
                bytes_downloaded,
            });
        }

        let download_path = dir.join(download_filename(&candidate.title, &stream.extension));
        let bytes_downloaded = download_stream(client, stream, &download_path).await?;

        tracing::debug!(input = %download_path.display(), output = %audio_path.display(), "Transcoding");
        let transcoded = self.transcoder.transcode(&download_path, &audio_path).await;
        remove_quietly(&download_path).await;

        if let Err(e) = transcoded {
            remove_quietly(&audio_path).await;
            return Err(e);
        }

        Ok(FetchedAudio {
            path: audio_path,
            filename,
            bytes_downloaded,
        })
    }
}

/// Stream a remote file to disk via a `.partial` file that is renamed on completion
pub(crate) async fn download_stream<C: HttpClient>(
    client: &C,
    stream: &AudioStream,
    output_path: &Path,
) -> Result<u64, FetchError> {
    let partial_path = partial_path(output_path);
    let result = write_stream(client, stream, &partial_path).await;

    match result {
        Ok(bytes) => {
            tokio::fs::rename(&partial_path, output_path)
                .await
                .map_err(|e| FetchError::FileWriteFailed {
                    path: output_path.to_path_buf(),
                    source: e,
                })?;
            Ok(bytes)
        }
        Err(e) => {
            remove_quietly(&partial_path).await;
            Err(e)
        }
    }
}

async fn write_stream<C: HttpClient>(
    client: &C,
    stream: &AudioStream,
    path: &Path,
) -> Result<u64, FetchError> {
    let url = stream.url.as_str();

    let response = client
        .get_stream(url, &stream.headers)
        .await
        .map_err(|e| FetchError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let mut file = File::create(path)
        .await
        .map_err(|e| FetchError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;
    let mut body = response.body;

    while let Some(chunk_result) = body.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::FileWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| FetchError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
    }
}
