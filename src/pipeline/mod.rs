// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ConversionConfig;
use crate::error::{ConversionError, PublishError, ResolveError};
use crate::filter::ItemFilter;
use crate::http::HttpClient;
use crate::media::{MediaFetcher, storage_key};
use crate::model::{
    ConversionResult, Episode, ItemOutcome, ItemReport, ItemStage, Job, JobOutcome, Source,
    SourceInput, VideoRef,
};
use crate::publisher::{EpisodeDraft, PodcastPublisher};
use crate::source::{SourceResolver, VideoLister, YouTubeResolver};
use crate::status::{JobStatus, SharedStatusSink, StatusKind};
use crate::storage::{ObjectStore, file_digest};

/// Job-level states, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Resolving,
    Enumerating,
    ProcessingItems,
    Finalizing,
    Done,
    Aborted,
    Cancelled,
}

/// Everything a conversion needs, wired once and reused across jobs
pub struct Pipeline<C> {
    client: C,
    config: ConversionConfig,
    fetcher: MediaFetcher,
    store: Arc<dyn ObjectStore>,
    resolver: Arc<dyn SourceResolver>,
    lister: VideoLister,
    publisher: PodcastPublisher<C>,
}

impl<C: HttpClient + Clone + 'static> Pipeline<C> {
    pub fn new(
        client: C,
        config: ConversionConfig,
        fetcher: MediaFetcher,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let credentials = &config.credentials;

        let resolver: Arc<dyn SourceResolver> = Arc::new(YouTubeResolver::new(
            client.clone(),
            &config.youtube_api_base,
            &credentials.youtube_api_key,
        ));
        let lister = VideoLister::new(
            &config.youtube_api_base,
            &credentials.youtube_api_key,
            config.page_size,
        );
        let publisher = PodcastPublisher::new(
            client.clone(),
            &config.host_api_base,
            credentials.host.clone(),
            config.publish_retry.clone(),
            config.poll.clone(),
        );

        Self {
            client,
            config,
            fetcher,
            store,
            resolver,
            lister,
            publisher,
        }
    }

    /// Replace the built-in URL resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Run one job to completion.
    ///
    /// Never fails: job-fatal errors become an `Aborted` result with no
    /// episodes plus a single `Fatal` status event.
    pub async fn run(
        &self,
        job: &Job,
        status: &JobStatus,
        cancel: &CancellationToken,
    ) -> ConversionResult {
        let state = |state: JobState| tracing::info!(job_id = %job.id, ?state, "Job state");

        state(JobState::Resolving);
        if let Err(e) = self.config.validate() {
            state(JobState::Aborted);
            return abort(status, e.into());
        }

        let source = match self.resolve(&job.source, status).await {
            Ok(source) => source,
            Err(e) => {
                state(JobState::Aborted);
                return abort(status, e);
            }
        };

        let job_dir = self.config.work_dir.join(&source.id);
        if let Err(e) = tokio::fs::create_dir_all(&job_dir).await {
            state(JobState::Aborted);
            return abort(
                status,
                ConversionError::WorkDir {
                    path: job_dir,
                    source: e,
                },
            );
        }

        if cancel.is_cancelled() {
            state(JobState::Cancelled);
            return cancelled(status, Vec::new(), Vec::new());
        }

        state(JobState::Enumerating);
        status.progress(format!("Fetching videos from {} {}", source.kind, source.id));
        let videos = match self
            .lister
            .list_videos(&self.client, &source, self.config.limit)
            .await
        {
            Ok(videos) => videos,
            Err(e) => {
                state(JobState::Aborted);
                return abort(status, e.into());
            }
        };
        status.progress(format!("Found {} videos", videos.len()));

        state(JobState::ProcessingItems);
        let filter = ItemFilter::new(&job.criteria);
        let total = videos.len();
        let mut episodes = Vec::new();
        let mut items = Vec::with_capacity(total);

        for (index, video) in videos.into_iter().enumerate() {
            if cancel.is_cancelled() {
                state(JobState::Cancelled);
                return cancelled(status, episodes, items);
            }

            status.progress(format!("[{}/{}] Processing {}", index + 1, total, video.url));
            let context = ItemContext {
                source: &source,
                filter: &filter,
                dir: &job_dir,
                status,
                cancel,
            };
            let (report, episode) = self.process_item(video, &context).await;

            episodes.extend(episode);
            items.push(report);
        }

        state(JobState::Finalizing);
        let result = ConversionResult {
            job_id: job.id,
            outcome: JobOutcome::Done,
            episodes,
            items,
        };
        status.emit(
            StatusKind::Completed,
            format!(
                "Uploaded {} episodes ({} skipped, {} failed)",
                result.episodes.len(),
                result.skipped_count(),
                result.failed_count()
            ),
        );

        state(JobState::Done);
        result
    }

    async fn resolve(&self, input: &SourceInput, status: &JobStatus) -> Result<Source, ConversionError> {
        let source = match input {
            SourceInput::Resolved(source) => source.clone(),
            SourceInput::Url(url) => {
                status.progress(format!("Resolving {url}"));
                self.resolver.resolve(url).await?
            }
        };

        // The id names the work directory and the storage prefix
        if !source.has_valid_id() {
            return Err(ResolveError::InvalidId(source.id).into());
        }
        Ok(source)
    }

    /// Filter, fetch, upload and publish one video; never fails the job
    async fn process_item(
        &self,
        video: VideoRef,
        context: &ItemContext<'_>,
    ) -> (ItemReport, Option<Episode>) {
        let status = context.status;

        let candidate = match self.fetcher.inspect(&video).await {
            Ok(candidate) => candidate,
            Err(e) => return item_failed(status, video, None, ItemStage::Inspecting, &e),
        };
        let title = candidate.title.clone();

        if let Err(rejection) = context.filter.evaluate(candidate.duration, &title) {
            status.emit(
                StatusKind::ItemSkipped,
                format!("Skipping \"{title}\": {rejection}"),
            );
            let report = ItemReport {
                video,
                title: Some(title),
                outcome: ItemOutcome::Skipped(rejection),
            };
            return (report, None);
        }

        status.progress(format!("Downloading \"{title}\""));
        let audio = match self.fetcher.fetch(&self.client, &candidate, context.dir).await {
            Ok(audio) => audio,
            Err(e) => return item_failed(status, video, Some(title), ItemStage::Fetching, &e),
        };

        let bucket = &self.config.credentials.bucket;
        let prefix = format!("{}/{}", self.config.storage_key_prefix, context.source.id);
        let key = storage_key(&prefix, &audio.filename);

        status.progress(format!("Uploading \"{title}\""));
        let uploaded = match file_digest(&audio.path).await {
            Ok(digest) => self
                .store
                .put(&audio.path, &digest, bucket, &key)
                .await
                .map(|url| (url, digest)),
            Err(e) => Err(e),
        };
        let (audio_url, digest) = match uploaded {
            Ok(uploaded) => uploaded,
            Err(e) => {
                remove_local(&audio.path).await;
                return item_failed(status, video, Some(title), ItemStage::Uploading, &e);
            }
        };

        status.progress(format!("Publishing \"{title}\""));
        let draft = EpisodeDraft {
            title: title.clone(),
            description: video.description.clone(),
            audio_url: audio_url.clone(),
        };
        let host_episode_id = match self.publisher.create_episode(&draft).await {
            Ok(id) => id,
            Err(e) => {
                remove_local(&audio.path).await;
                return item_failed(status, video, Some(title), ItemStage::Publishing, &e);
            }
        };

        let episode = Episode {
            title: title.clone(),
            description: video.description.clone(),
            audio_url,
            host_episode_id,
            content_hash: Some(format!("sha256:{digest}")),
        };
        let published = |ready: bool| ItemReport {
            video: video.clone(),
            title: Some(title.clone()),
            outcome: ItemOutcome::Published {
                host_episode_id,
                ready,
            },
        };

        status.progress(format!(
            "Created episode {host_episode_id} for \"{title}\", waiting for processing"
        ));
        let ready = match self
            .publisher
            .wait_until_processed(host_episode_id, context.cancel)
            .await
        {
            Ok(_) => true,
            // Job-level stop: keep the local file around
            Err(PublishError::Cancelled) => return (published(false), Some(episode)),
            Err(e) => {
                status.progress(format!("Episode \"{title}\" not confirmed as processed: {e}"));
                false
            }
        };

        if ready && self.config.publish_when_ready {
            match self.publisher.publish_episode(host_episode_id).await {
                Ok(()) => status.progress(format!("Episode \"{title}\" is live")),
                Err(e) => tracing::warn!(host_episode_id, error = %e, "Publishing episode failed"),
            }
        }

        if ready
            && self.config.delete_uploaded_audio
            && let Err(e) = self.store.delete(bucket, &key).await
        {
            tracing::warn!(%bucket, %key, error = %e, "Storage cleanup failed");
        }

        remove_local(&audio.path).await;
        status.emit(StatusKind::ItemDone, format!("Published \"{title}\""));

        (published(ready), Some(episode))
    }
}

/// Per-job values shared by every item
struct ItemContext<'a> {
    source: &'a Source,
    filter: &'a ItemFilter,
    dir: &'a Path,
    status: &'a JobStatus,
    cancel: &'a CancellationToken,
}

fn item_failed(
    status: &JobStatus,
    video: VideoRef,
    title: Option<String>,
    stage: ItemStage,
    error: &dyn std::error::Error,
) -> (ItemReport, Option<Episode>) {
    status.emit(
        StatusKind::ItemFailed,
        format!("Failed to {stage} {}: {error}", video.url),
    );
    let report = ItemReport {
        video,
        title,
        outcome: ItemOutcome::Failed {
            stage,
            error: error.to_string(),
        },
    };
    (report, None)
}

fn abort(status: &JobStatus, error: ConversionError) -> ConversionResult {
    status.emit(StatusKind::Fatal, format!("Failed to create podcast: {error}"));
    ConversionResult::aborted(status.job_id(), error.to_string())
}

fn cancelled(status: &JobStatus, episodes: Vec<Episode>, items: Vec<ItemReport>) -> ConversionResult {
    status.emit(
        StatusKind::Cancelled,
        format!("Cancelled after {} items, {} episodes created", items.len(), episodes.len()),
    );
    ConversionResult {
        job_id: status.job_id(),
        outcome: JobOutcome::Cancelled,
        episodes,
        items,
    }
}

async fn remove_local(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to delete local audio");
    }
}

/// Job entry point.
///
/// The caller owns the [`Job`], so it can subscribe to the job's status
/// topic before anything is emitted.
pub async fn run_conversion<C: HttpClient + Clone + 'static>(
    pipeline: &Pipeline<C>,
    job: &Job,
    sink: SharedStatusSink,
    cancel: &CancellationToken,
) -> ConversionResult {
    let status = JobStatus::new(job.id, sink);
    pipeline.run(job, &status, cancel).await
}

#[cfg(test)]
mod tests;
