use super::*;
use crate::config::{Credentials, HostCredentials, PollConfig, RetryConfig};
use crate::error::{FetchError, StorageError};
use crate::filter::Rejection;
use crate::http::{ByteStream, HttpReply, HttpRequest, HttpResponse, Method};
use crate::media::{AudioStream, MediaInfo, MediaProbe, Transcoder};
use crate::model::ItemCriteria;
use crate::status::{StatusEvent, StatusHub, StatusSink};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use sha2::Digest;
use tempfile::{TempDir, tempdir};

const BUCKET: &str = "media.example.com";

#[derive(Default)]
struct FakeState {
    /// Listing pages in order; `None` answers with a server error
    pages: Vec<Option<String>>,
    /// Statuses for successive create calls; 201 once exhausted
    create_statuses: VecDeque<u16>,
    next_episode_id: u64,
    episode_status: String,
    requests: Vec<HttpRequest>,
}

/// In-memory stand-in for every remote API the pipeline talks to
#[derive(Clone, Default)]
struct FakeHttp {
    state: Arc<Mutex<FakeState>>,
}

impl FakeHttp {
    fn with_pages(pages: Vec<Option<String>>) -> Self {
        let http = Self::default();
        {
            let mut state = http.state.lock().unwrap();
            state.pages = pages;
            state.next_episode_id = 100;
            state.episode_status = "published".to_string();
        }
        http
    }

    fn script_creates(&self, statuses: &[u16]) {
        self.state.lock().unwrap().create_statuses = statuses.iter().copied().collect();
    }

    fn set_episode_status(&self, status: &str) {
        self.state.lock().unwrap().episode_status = status.to_string();
    }

    fn requests(&self, method: Method) -> Vec<HttpRequest> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    fn listing_reply(state: &FakeState, url: &str) -> HttpReply {
        let parsed = url::Url::parse(url).unwrap();
        let page = parsed
            .query_pairs()
            .find(|(key, _)| key == "pageToken")
            .map(|(_, token)| token.trim_start_matches("page-").parse::<usize>().unwrap())
            .unwrap_or(0);

        match state.pages.get(page).cloned().flatten() {
            Some(body) => reply(200, body),
            None => reply(500, "backend error".to_string()),
        }
    }
}

fn reply(status: u16, body: String) -> HttpReply {
    HttpReply {
        status,
        body: Bytes::from(body),
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, reqwest::Error> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        let url = request.url.as_str();
        let method = &request.method;
        let reply = if *method == Method::HEAD {
            reply(200, String::new())
        } else if *method == Method::POST {
            let status = state.create_statuses.pop_front().unwrap_or(201);
            if status == 201 {
                let id = state.next_episode_id;
                state.next_episode_id += 1;
                reply(201, format!(r#"{{"id":{id}}}"#))
            } else {
                reply(status, "blocked".to_string())
            }
        } else if *method == Method::PATCH {
            reply(200, "{}".to_string())
        } else if url.contains("/episodes/") {
            reply(200, format!(r#"{{"status":"{}"}}"#, state.episode_status))
        } else {
            Self::listing_reply(&state, url)
        };
        Ok(reply)
    }

    async fn get_stream(
        &self,
        url: &str,
        _headers: &[(String, String)],
    ) -> Result<HttpResponse, reqwest::Error> {
        let data = Bytes::from(format!("audio from {url}"));
        let len = data.len() as u64;
        let body: ByteStream = Box::pin(futures::stream::once(async move { Ok(data) }));
        Ok(HttpResponse {
            status: 200,
            content_length: Some(len),
            body,
        })
    }
}

/// Metadata per watch URL; unknown URLs fail like a tool error
#[derive(Default)]
struct FakeProbe {
    videos: HashMap<String, MediaInfo>,
    probed: Mutex<Vec<String>>,
    cancel_on_probe: Option<CancellationToken>,
}

impl FakeProbe {
    fn video(mut self, id: &str, title: &str, duration: u64) -> Self {
        let info = MediaInfo {
            title: title.to_string(),
            duration: Some(Duration::from_secs(duration)),
            stream: Some(AudioStream {
                url: format!("https://cdn.example.com/{id}.mp3"),
                extension: "mp3".to_string(),
                audio_only: true,
                bitrate: Some(128.0),
                headers: Vec::new(),
            }),
        };
        self.videos.insert(watch(id), info);
        self
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, video_url: &str) -> Result<MediaInfo, FetchError> {
        self.probed.lock().unwrap().push(video_url.to_string());
        if let Some(cancel) = &self.cancel_on_probe {
            cancel.cancel();
        }
        self.videos
            .get(video_url)
            .cloned()
            .ok_or_else(|| FetchError::Tool {
                tool: "yt-dlp".to_string(),
                message: "Video unavailable".to_string(),
            })
    }
}

struct CopyTranscoder;

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), FetchError> {
        std::fs::copy(input, output).unwrap();
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    digests: Mutex<HashMap<String, String>>,
    deleted: Mutex<Vec<String>>,
    failing_keys: HashSet<String>,
    failing_deletes: bool,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        local_path: &Path,
        sha256: &str,
        bucket: &str,
        key: &str,
    ) -> Result<String, StorageError> {
        if self.failing_keys.contains(key) {
            return Err(StorageError::HttpStatus {
                url: key.to_string(),
                status: 500,
            });
        }
        let data = std::fs::read(local_path).unwrap();
        self.objects.lock().unwrap().insert(key.to_string(), data);
        self.digests
            .lock()
            .unwrap()
            .insert(key.to_string(), sha256.to_string());
        Ok(crate::storage::public_url(bucket, key))
    }

    async fn delete(&self, _bucket: &str, key: &str) -> Result<(), StorageError> {
        self.deleted.lock().unwrap().push(key.to_string());
        if self.failing_deletes {
            return Err(StorageError::HttpStatus {
                url: key.to_string(),
                status: 503,
            });
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingSink {
    fn kinds(&self) -> Vec<StatusKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    fn count(&self, kind: StatusKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

impl StatusSink for RecordingSink {
    fn publish(&self, event: StatusEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn watch(id: &str) -> String {
    crate::source::watch_url(id)
}

fn search_page(ids: &[&str], next: Option<&str>) -> Option<String> {
    let items: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": { "kind": "youtube#video", "videoId": id },
                "snippet": { "description": format!("About {id}\nSecond line") }
            })
        })
        .collect();
    Some(serde_json::json!({ "nextPageToken": next, "items": items }).to_string())
}

fn playlist_page(ids: &[&str]) -> Option<String> {
    let items: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": format!("item-{id}"),
                "snippet": {
                    "description": format!("About {id}"),
                    "resourceId": { "kind": "youtube#video", "videoId": id }
                }
            })
        })
        .collect();
    Some(serde_json::json!({ "items": items }).to_string())
}

fn config(work_dir: &Path) -> ConversionConfig {
    ConversionConfig {
        credentials: Credentials {
            youtube_api_key: "yt-key".to_string(),
            bucket: BUCKET.to_string(),
            host: HostCredentials {
                api_key: "host-key".to_string(),
                podcast_id: "42".to_string(),
            },
        },
        work_dir: work_dir.to_path_buf(),
        youtube_api_base: "https://yt.test/youtube/v3".to_string(),
        host_api_base: "https://host.test".to_string(),
        publish_retry: RetryConfig {
            max_attempts: 3,
            delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        },
        poll: PollConfig {
            interval: Duration::ZERO,
            max_attempts: Some(3),
        },
        ..ConversionConfig::default()
    }
}

struct Harness {
    dir: TempDir,
    http: FakeHttp,
    probe: Arc<FakeProbe>,
    store: Arc<MemoryStore>,
    sink: Arc<RecordingSink>,
    pipeline: Pipeline<FakeHttp>,
}

impl Harness {
    fn new(http: FakeHttp, probe: FakeProbe) -> Self {
        Self::build(http, probe, MemoryStore::default(), |_| {})
    }

    fn build(
        http: FakeHttp,
        probe: FakeProbe,
        store: MemoryStore,
        adjust: impl FnOnce(&mut ConversionConfig),
    ) -> Self {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        adjust(&mut config);

        let probe = Arc::new(probe);
        let store = Arc::new(store);
        let fetcher = MediaFetcher::new(probe.clone(), Arc::new(CopyTranscoder));
        let pipeline = Pipeline::new(http.clone(), config, fetcher, store.clone());

        Self {
            dir,
            http,
            probe,
            store,
            sink: Arc::new(RecordingSink::default()),
            pipeline,
        }
    }

    async fn run(&self, source: Source, criteria: ItemCriteria) -> ConversionResult {
        self.run_with(source, criteria, &CancellationToken::new()).await
    }

    async fn run_with(
        &self,
        source: Source,
        criteria: ItemCriteria,
        cancel: &CancellationToken,
    ) -> ConversionResult {
        let job = Job::new(SourceInput::Resolved(source), criteria);
        run_conversion(&self.pipeline, &job, self.sink.clone(), cancel).await
    }

    fn local_files(&self, source: &Source) -> usize {
        std::fs::read_dir(self.dir.path().join(&source.id))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

#[tokio::test]
async fn channel_with_short_video_keeps_only_the_long_one() {
    let http = FakeHttp::with_pages(vec![search_page(&["short", "long"], None)]);
    let probe = FakeProbe::default()
        .video("short", "Quick Teaser", 30)
        .video("long", "Full Episode", 600);
    let harness = Harness::new(http, probe);
    let source = Source::channel("UCabcdefghijklmnopqrstuv");

    let result = harness
        .run(
            source.clone(),
            ItemCriteria {
                min_duration_seconds: Some(60),
                ..ItemCriteria::default()
            },
        )
        .await;

    assert_eq!(result.outcome, JobOutcome::Done);
    assert_eq!(result.episodes.len(), 1);
    let episode = &result.episodes[0];
    assert_eq!(episode.title, "Full Episode");
    assert_eq!(episode.host_episode_id, 100);
    assert_eq!(
        episode.audio_url,
        "https://media.example.com/podcast/UCabcdefghijklmnopqrstuv/Full_Episode.mp3"
    );
    // The digest sent with the upload is the one recorded on the episode
    let key = "podcast/UCabcdefghijklmnopqrstuv/Full_Episode.mp3";
    let digest = harness.store.digests.lock().unwrap()[key].clone();
    let stored = harness.store.objects.lock().unwrap()[key].clone();
    assert_eq!(digest, format!("{:x}", sha2::Sha256::digest(&stored)));
    assert_eq!(episode.content_hash, Some(format!("sha256:{digest}")));

    assert_eq!(
        result.items[0].outcome,
        ItemOutcome::Skipped(Rejection::TooShort {
            duration: Duration::from_secs(30),
            min: 60
        })
    );
    assert_eq!(harness.sink.count(StatusKind::ItemSkipped), 1);
    assert_eq!(harness.sink.count(StatusKind::Completed), 1);

    // Rejected items are never downloaded
    assert_eq!(harness.store.objects.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn playlist_title_filter_selects_matching_videos() {
    let http = FakeHttp::with_pages(vec![playlist_page(&["recap", "bonus"])]);
    let probe = FakeProbe::default()
        .video("recap", "Weekly Recap", 900)
        .video("bonus", "Bonus Clip", 900);
    let harness = Harness::new(http, probe);

    let result = harness
        .run(
            Source::playlist("PLrecapsandmore"),
            ItemCriteria {
                title_filter: Some("recap".to_string()),
                ..ItemCriteria::default()
            },
        )
        .await;

    let titles: Vec<&str> = result.episodes.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, ["Weekly Recap"]);
    assert!(matches!(
        result.items[1].outcome,
        ItemOutcome::Skipped(Rejection::TitleMismatch { .. })
    ));

    let creates = harness.http.requests(Method::POST);
    assert_eq!(creates.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(creates[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(body["title"], "Weekly Recap");
    assert_eq!(body["description"], "About recap");
}

#[tokio::test]
async fn repeated_host_blocks_fail_the_item_and_the_job_continues() {
    let http = FakeHttp::with_pages(vec![search_page(&["first", "second"], None)]);
    http.script_creates(&[403, 403, 403]);
    let probe = FakeProbe::default()
        .video("first", "First", 600)
        .video("second", "Second", 600);
    let harness = Harness::new(http, probe);
    let source = Source::channel("UCabcdefghijklmnopqrstuv");

    let result = harness.run(source.clone(), ItemCriteria::default()).await;

    assert_eq!(result.outcome, JobOutcome::Done);
    assert_eq!(harness.http.requests(Method::POST).len(), 4);
    assert!(matches!(
        result.items[0].outcome,
        ItemOutcome::Failed {
            stage: ItemStage::Publishing,
            ..
        }
    ));
    assert_eq!(result.episodes.len(), 1);
    assert_eq!(result.episodes[0].title, "Second");
    assert_eq!(result.failed_count(), 1);
    assert_eq!(harness.sink.count(StatusKind::ItemFailed), 1);
    assert_eq!(harness.local_files(&source), 0);
}

#[tokio::test]
async fn enumeration_failure_aborts_before_any_item() {
    let http = FakeHttp::with_pages(vec![
        search_page(&["a", "b"], Some("page-1")),
        None,
        search_page(&["c"], None),
    ]);
    let probe = FakeProbe::default()
        .video("a", "A", 600)
        .video("b", "B", 600)
        .video("c", "C", 600);
    let harness = Harness::new(http, probe);

    let result = harness
        .run(Source::channel("UCabcdefghijklmnopqrstuv"), ItemCriteria::default())
        .await;

    assert!(matches!(result.outcome, JobOutcome::Aborted { .. }));
    assert!(result.episodes.is_empty());
    assert!(result.items.is_empty());
    assert_eq!(harness.sink.count(StatusKind::Fatal), 1);
    assert_eq!(harness.sink.count(StatusKind::Completed), 0);
    assert!(harness.probe.probed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn episodes_follow_enumeration_order_across_pages() {
    let http = FakeHttp::with_pages(vec![
        search_page(&["v1", "v2"], Some("page-1")),
        search_page(&["v3"], None),
    ]);
    let probe = FakeProbe::default()
        .video("v1", "Newest", 600)
        .video("v2", "Middle", 600)
        .video("v3", "Oldest", 600);
    let harness = Harness::new(http, probe);

    let result = harness
        .run(Source::channel("UCabcdefghijklmnopqrstuv"), ItemCriteria::default())
        .await;

    let titles: Vec<&str> = result.episodes.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, ["Newest", "Middle", "Oldest"]);
    let ids: Vec<u64> = result.episodes.iter().map(|e| e.host_episode_id).collect();
    assert_eq!(ids, [100, 101, 102]);
}

#[tokio::test]
async fn item_failures_are_contained() {
    let http = FakeHttp::with_pages(vec![search_page(&["gone", "broken", "fine"], None)]);
    let probe = FakeProbe::default()
        .video("broken", "Broken Upload", 600)
        .video("fine", "Fine", 600);
    let store = MemoryStore {
        failing_keys: HashSet::from([
            "podcast/UCabcdefghijklmnopqrstuv/Broken_Upload.mp3".to_string()
        ]),
        ..MemoryStore::default()
    };
    let harness = Harness::build(http, probe, store, |_| {});
    let source = Source::channel("UCabcdefghijklmnopqrstuv");

    let result = harness.run(source.clone(), ItemCriteria::default()).await;

    let stages: Vec<Option<ItemStage>> = result
        .items
        .iter()
        .map(|item| match item.outcome {
            ItemOutcome::Failed { stage, .. } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        [Some(ItemStage::Inspecting), Some(ItemStage::Uploading), None]
    );
    assert_eq!(result.episodes.len(), 1);
    assert_eq!(result.items[0].title, None);
    assert_eq!(harness.local_files(&source), 0);
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let http = FakeHttp::with_pages(vec![search_page(&["a"], None)]);
    let harness = Harness::build(http, FakeProbe::default(), MemoryStore::default(), |config| {
        config.credentials.host.api_key.clear();
    });

    let result = harness
        .run(Source::channel("UCabcdefghijklmnopqrstuv"), ItemCriteria::default())
        .await;

    match result.outcome {
        JobOutcome::Aborted { reason } => assert!(reason.contains("host.api_key")),
        other => panic!("Expected abort, got {other:?}"),
    }
    assert_eq!(harness.http.request_count(), 0);
    assert_eq!(harness.sink.kinds(), [StatusKind::Fatal]);
}

#[tokio::test]
async fn cancelled_before_start_does_nothing() {
    let http = FakeHttp::with_pages(vec![search_page(&["a"], None)]);
    let harness = Harness::new(http, FakeProbe::default().video("a", "A", 600));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = harness
        .run_with(
            Source::channel("UCabcdefghijklmnopqrstuv"),
            ItemCriteria::default(),
            &cancel,
        )
        .await;

    assert_eq!(result.outcome, JobOutcome::Cancelled);
    assert!(result.items.is_empty());
    assert_eq!(harness.http.request_count(), 0);
    assert_eq!(harness.sink.count(StatusKind::Cancelled), 1);
}

#[tokio::test]
async fn cancellation_mid_job_keeps_created_episodes() {
    let http = FakeHttp::with_pages(vec![search_page(&["a", "b"], None)]);
    let cancel = CancellationToken::new();
    let probe = FakeProbe {
        cancel_on_probe: Some(cancel.clone()),
        ..FakeProbe::default().video("a", "A", 600).video("b", "B", 600)
    };
    let harness = Harness::new(http, probe);

    let result = harness
        .run_with(
            Source::channel("UCabcdefghijklmnopqrstuv"),
            ItemCriteria::default(),
            &cancel,
        )
        .await;

    assert_eq!(result.outcome, JobOutcome::Cancelled);
    assert_eq!(result.episodes.len(), 1);
    assert_eq!(
        result.items[0].outcome,
        ItemOutcome::Published {
            host_episode_id: 100,
            ready: false
        }
    );
    assert_eq!(harness.probe.probed.lock().unwrap().as_slice(), [watch("a")]);
}

#[tokio::test]
async fn unconfirmed_processing_still_records_the_episode() {
    let http = FakeHttp::with_pages(vec![search_page(&["a"], None)]);
    http.set_episode_status("processing");
    let harness = Harness::new(http, FakeProbe::default().video("a", "A", 600));
    let source = Source::channel("UCabcdefghijklmnopqrstuv");

    let result = harness.run(source.clone(), ItemCriteria::default()).await;

    assert_eq!(result.episodes.len(), 1);
    assert_eq!(
        result.items[0].outcome,
        ItemOutcome::Published {
            host_episode_id: 100,
            ready: false
        }
    );
    // One GET per allowed status check
    let checks = harness
        .http
        .requests(Method::GET)
        .into_iter()
        .filter(|r| r.url.contains("/episodes/100"))
        .count();
    assert_eq!(checks, 3);
    assert_eq!(harness.local_files(&source), 0);
}

#[tokio::test]
async fn processed_episodes_can_be_published_and_audio_removed() {
    let http = FakeHttp::with_pages(vec![search_page(&["a"], None)]);
    let harness = Harness::build(
        http,
        FakeProbe::default().video("a", "A", 600),
        MemoryStore::default(),
        |config| {
            config.publish_when_ready = true;
            config.delete_uploaded_audio = true;
        },
    );

    let result = harness
        .run(Source::channel("UCabcdefghijklmnopqrstuv"), ItemCriteria::default())
        .await;

    assert_eq!(result.episodes.len(), 1);
    let patches = harness.http.requests(Method::PATCH);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].url, "https://host.test/api/42/episodes/100/publish");
    assert_eq!(
        harness.store.deleted.lock().unwrap().as_slice(),
        ["podcast/UCabcdefghijklmnopqrstuv/A.mp3".to_string()]
    );
}

#[tokio::test]
async fn url_input_is_resolved_before_listing() {
    let http = FakeHttp::with_pages(vec![playlist_page(&["a"])]);
    let harness = Harness::new(http, FakeProbe::default().video("a", "A", 600));
    let job = Job::new(
        SourceInput::Url("https://www.youtube.com/playlist?list=PLrecapsandmore".to_string()),
        ItemCriteria::default(),
    );
    let status = JobStatus::new(job.id, harness.sink.clone());

    let result = harness
        .pipeline
        .run(&job, &status, &CancellationToken::new())
        .await;

    assert_eq!(result.job_id, job.id);
    assert_eq!(result.episodes.len(), 1);
    let listing = &harness.http.requests(Method::GET)[0];
    assert!(listing.url.contains("/playlistItems?"));
    assert!(listing.url.contains("playlistId=PLrecapsandmore"));
}

#[tokio::test]
async fn events_carry_the_job_id() {
    let http = FakeHttp::with_pages(vec![search_page(&["a"], None)]);
    let harness = Harness::new(http, FakeProbe::default().video("a", "A", 600));
    let job = Job::new(
        SourceInput::Resolved(Source::channel("UCabcdefghijklmnopqrstuv")),
        ItemCriteria::default(),
    );
    let status = JobStatus::new(job.id, harness.sink.clone());

    harness
        .pipeline
        .run(&job, &status, &CancellationToken::new())
        .await;

    let events = harness.sink.events.lock().unwrap();
    assert!(events.iter().all(|e| e.job_id == job.id));
    assert_eq!(events.last().map(|e| e.kind), Some(StatusKind::Completed));
}

#[tokio::test]
async fn failed_storage_cleanup_keeps_the_episode() {
    let http = FakeHttp::with_pages(vec![search_page(&["a"], None)]);
    let store = MemoryStore {
        failing_deletes: true,
        ..MemoryStore::default()
    };
    let harness = Harness::build(
        http,
        FakeProbe::default().video("a", "A", 600),
        store,
        |config| config.delete_uploaded_audio = true,
    );
    let source = Source::channel("UCabcdefghijklmnopqrstuv");

    let result = harness.run(source.clone(), ItemCriteria::default()).await;

    assert_eq!(result.outcome, JobOutcome::Done);
    assert_eq!(
        result.items[0].outcome,
        ItemOutcome::Published {
            host_episode_id: 100,
            ready: true
        }
    );
    assert_eq!(result.episodes.len(), 1);
    assert_eq!(result.failed_count(), 0);
    assert_eq!(harness.store.deleted.lock().unwrap().len(), 1);
    assert_eq!(harness.sink.count(StatusKind::ItemDone), 1);
    assert_eq!(harness.local_files(&source), 0);
}

#[tokio::test]
async fn resolved_source_with_path_characters_is_rejected() {
    let http = FakeHttp::with_pages(vec![playlist_page(&["a"])]);
    let harness = Harness::build(
        http,
        FakeProbe::default().video("a", "A", 600),
        MemoryStore::default(),
        |config| config.work_dir = config.work_dir.join("work"),
    );

    let result = harness
        .run(Source::playlist("../escaped"), ItemCriteria::default())
        .await;

    match result.outcome {
        JobOutcome::Aborted { reason } => assert!(reason.contains("../escaped")),
        other => panic!("Expected abort, got {other:?}"),
    }
    assert_eq!(harness.sink.kinds(), [StatusKind::Fatal]);
    assert_eq!(harness.http.request_count(), 0);
    assert!(!harness.dir.path().join("escaped").exists());
    assert!(harness.store.objects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn encoded_traversal_in_playlist_url_is_rejected() {
    let http = FakeHttp::with_pages(vec![playlist_page(&["a"])]);
    let harness = Harness::build(
        http,
        FakeProbe::default().video("a", "A", 600),
        MemoryStore::default(),
        |config| config.work_dir = config.work_dir.join("work"),
    );
    let job = Job::new(
        SourceInput::Url("https://www.youtube.com/playlist?list=..%2Fescaped".to_string()),
        ItemCriteria::default(),
    );

    let result = run_conversion(
        &harness.pipeline,
        &job,
        harness.sink.clone(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result.outcome, JobOutcome::Aborted { .. }));
    assert_eq!(harness.sink.count(StatusKind::Fatal), 1);
    assert_eq!(harness.http.request_count(), 0);
    assert!(!harness.dir.path().join("escaped").exists());
}

#[tokio::test]
async fn subscribers_of_the_job_topic_see_the_whole_run() {
    let http = FakeHttp::with_pages(vec![search_page(&["a"], None)]);
    let harness = Harness::new(http, FakeProbe::default().video("a", "A", 600));
    let job = Job::new(
        SourceInput::Resolved(Source::channel("UCabcdefghijklmnopqrstuv")),
        ItemCriteria::default(),
    );
    let hub = Arc::new(StatusHub::new(256));
    let mut events = hub.subscribe(job.id);

    let cancel = CancellationToken::new();
    let result = run_conversion(&harness.pipeline, &job, hub.clone(), &cancel).await;
    hub.close(job.id);

    let mut kinds = Vec::new();
    while let Ok(event) = events.recv().await {
        assert_eq!(event.job_id, job.id);
        kinds.push(event.kind);
    }
    assert_eq!(result.job_id, job.id);
    assert!(kinds.contains(&StatusKind::ItemDone));
    assert_eq!(kinds.last(), Some(&StatusKind::Completed));
}
