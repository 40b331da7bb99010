//! Client for the podcast host's episode API.
//!
//! Wire contract:
//! - `POST /api/{podcast_id}/episodes` with `{title, description, audio_url}`
//!   answers `201` and `{"id": ...}`; `403` is an edge block and is retried.
//! - `GET /api/{podcast_id}/episodes/{id}` answers `{"status": ...}`, where
//!   `"processing"` means the audio is not ready yet.
//! - `PATCH /api/{podcast_id}/episodes/{id}/publish` makes an episode live.
//!
//! Every request carries `Authorization: Token token={api_key}`.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::{HostCredentials, PollConfig, RetryConfig};
use crate::error::PublishError;
use crate::http::{HttpClient, HttpReply, HttpRequest, Method};

/// Status code the host's edge answers with when it rate-limits uploads
pub const TRANSIENT_STATUS: u16 = 403;

const CREATED_STATUS: u16 = 201;

const PROCESSING: &str = "processing";

/// Episode fields sent to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeDraft {
    pub title: String,
    /// Plain text; converted with [`html_description`] before sending
    pub description: String,
    pub audio_url: String,
}

/// Escape a plain-text description and turn its newlines into `<br>`
pub fn html_description(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    html_escape::encode_text(&normalized).replace('\n', "<br>")
}

#[derive(Debug, Deserialize)]
struct CreatedEpisode {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct EpisodeState {
    status: Option<String>,
}

/// Final state reported by [`PodcastPublisher::wait_until_processed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEpisode {
    pub status: String,
    pub checks: u32,
}

pub struct PodcastPublisher<C> {
    client: C,
    api_base: String,
    credentials: HostCredentials,
    retry: RetryConfig,
    poll: PollConfig,
}

impl<C: HttpClient> PodcastPublisher<C> {
    pub fn new(
        client: C,
        api_base: impl Into<String>,
        credentials: HostCredentials,
        retry: RetryConfig,
        poll: PollConfig,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            credentials,
            retry,
            poll,
        }
    }

    fn episodes_url(&self) -> String {
        format!(
            "{}/api/{}/episodes",
            self.api_base.trim_end_matches('/'),
            self.credentials.podcast_id
        )
    }

    fn episode_url(&self, episode_id: u64) -> String {
        format!("{}/{episode_id}", self.episodes_url())
    }

    fn authorized(&self, method: Method, url: &str) -> HttpRequest {
        HttpRequest::new(method, url).header(
            "Authorization",
            format!("Token token={}", self.credentials.api_key),
        )
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpReply, PublishError> {
        let url = request.url.clone();
        self.client
            .send(request)
            .await
            .map_err(|e| PublishError::HttpFailed { url, source: e })
    }

    /// Cheap existence check of the public audio URL
    pub async fn audio_reachable(&self, audio_url: &str) -> bool {
        match self.client.head(audio_url).await {
            Ok(status) => (200..400).contains(&status),
            Err(e) => {
                tracing::debug!(%audio_url, error = %e, "Audio probe failed");
                false
            }
        }
    }

    /// Register an episode and return the host's id for it.
    ///
    /// The audio URL is probed first; an unreachable URL fails without
    /// contacting the host. A `403` answer is retried until
    /// `retry.max_attempts` requests have been made.
    pub async fn create_episode(&self, draft: &EpisodeDraft) -> Result<u64, PublishError> {
        if !self.audio_reachable(&draft.audio_url).await {
            return Err(PublishError::AudioUnreachable(draft.audio_url.clone()));
        }

        let body = serde_json::json!({
            "title": draft.title,
            "description": html_description(&draft.description),
            "audio_url": draft.audio_url,
        });
        let url = self.episodes_url();
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let request = self.authorized(Method::POST, &url).json(&body);
            let reply = self.send(request).await?;

            match reply.status {
                CREATED_STATUS => {
                    let created: CreatedEpisode = serde_json::from_slice(&reply.body)?;
                    if attempt > 1 {
                        tracing::info!(attempts = attempt, "Episode created after retry");
                    }
                    return Ok(created.id);
                }
                TRANSIENT_STATUS if attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        title = %draft.title,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis(),
                        "Podcast host answered 403, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                TRANSIENT_STATUS => {
                    return Err(PublishError::RetriesExhausted {
                        status: TRANSIENT_STATUS,
                        attempts: attempt,
                    });
                }
                status => {
                    return Err(PublishError::Rejected {
                        status,
                        body: reply.text(),
                    });
                }
            }
        }

        Err(PublishError::RetriesExhausted {
            status: TRANSIENT_STATUS,
            attempts: max_attempts,
        })
    }

    /// Current processing status of an episode
    pub async fn episode_status(&self, episode_id: u64) -> Result<String, PublishError> {
        let reply = self
            .send(self.authorized(Method::GET, &self.episode_url(episode_id)))
            .await?;

        if !reply.is_success() {
            return Err(PublishError::Rejected {
                status: reply.status,
                body: reply.text(),
            });
        }

        let state: EpisodeState = serde_json::from_slice(&reply.body)?;
        Ok(state.status.unwrap_or_default())
    }

    /// Check the status every `poll.interval` until it is no longer `"processing"`.
    ///
    /// Failed status checks count as still processing. Gives up after
    /// `poll.max_attempts` checks, and returns early when `cancel` fires.
    pub async fn wait_until_processed(
        &self,
        episode_id: u64,
        cancel: &CancellationToken,
    ) -> Result<ProcessedEpisode, PublishError> {
        let mut checks = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(PublishError::Cancelled);
            }

            checks += 1;
            match self.episode_status(episode_id).await {
                Ok(status) if status != PROCESSING => {
                    tracing::debug!(episode_id, %status, checks, "Episode processed");
                    return Ok(ProcessedEpisode { status, checks });
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(episode_id, error = %e, checks, "Status check failed");
                }
            }

            if let Some(max) = self.poll.max_attempts
                && checks >= max
            {
                return Err(PublishError::PollTimedOut {
                    episode_id,
                    attempts: checks,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(PublishError::Cancelled),
                _ = tokio::time::sleep(self.poll.interval) => {}
            }
        }
    }

    /// Make a processed episode live
    pub async fn publish_episode(&self, episode_id: u64) -> Result<(), PublishError> {
        let url = format!("{}/publish", self.episode_url(episode_id));
        let reply = self.send(self.authorized(Method::PATCH, &url)).await?;

        if reply.is_success() {
            Ok(())
        } else {
            Err(PublishError::Rejected {
                status: reply.status,
                body: reply.text(),
            })
        }
    }
}
