use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use tubecast::{
    ConversionConfig, ConversionResult, Credentials, FfmpegTranscoder, HostCredentials,
    HttpObjectStore, ItemCriteria, ItemOutcome, Job, JobOutcome, MediaFetcher, NoopSink, Pipeline,
    PollConfig, ReqwestClient, SharedStatusSink, SourceInput, StatusEvent, StatusHub, StatusKind,
    YtDlpProbe, run_conversion,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static SKIPPED: Emoji<'_, '_> = Emoji("⏭️  ", "[-] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static STOP: Emoji<'_, '_> = Emoji("🛑 ", "[x] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Turn a YouTube channel or playlist into podcast episodes
#[derive(Parser, Debug)]
#[command(name = "tubecast")]
#[command(about = "Turn a YouTube channel or playlist into podcast episodes")]
#[command(version)]
struct Args {
    /// Channel or playlist URL, channel id, playlist id or @handle
    source: String,

    /// Skip videos shorter than this many seconds
    #[arg(long, value_name = "SECONDS")]
    min_duration: Option<u64>,

    /// Skip videos longer than this many seconds
    #[arg(long, value_name = "SECONDS")]
    max_duration: Option<u64>,

    /// Only convert videos whose title contains this text (case-insensitive)
    #[arg(short, long)]
    title_filter: Option<String>,

    /// Maximum number of videos to process
    #[arg(short, long)]
    limit: Option<usize>,

    /// YouTube Data API key
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    youtube_api_key: Option<String>,

    /// Bucket the audio is stored in; also the host of the public audio URLs
    #[arg(long, env = "TUBECAST_BUCKET")]
    bucket: Option<String>,

    /// Object storage endpoint accepting PUT {endpoint}/{bucket}/{key}
    #[arg(long, env = "TUBECAST_STORAGE_ENDPOINT")]
    storage_endpoint: Option<String>,

    /// Bearer token for the object storage endpoint
    #[arg(long, env = "TUBECAST_STORAGE_TOKEN", hide_env_values = true)]
    storage_token: Option<String>,

    /// Podcast host API key
    #[arg(long, env = "BUZZSPROUT_API_KEY", hide_env_values = true)]
    host_api_key: Option<String>,

    /// Podcast id on the host
    #[arg(long, env = "BUZZSPROUT_PODCAST_ID")]
    podcast_id: Option<String>,

    /// Directory for temporary downloads
    #[arg(long, env = "TUBECAST_WORK_DIR", default_value = "downloaded")]
    work_dir: PathBuf,

    /// Prefix for storage keys
    #[arg(long, default_value = "podcast")]
    key_prefix: String,

    /// Seconds between episode status checks
    #[arg(long, default_value = "10")]
    poll_interval: u64,

    /// Make episodes live once the host has processed them
    #[arg(long)]
    publish: bool,

    /// Remove stored audio once the host has processed it
    #[arg(long)]
    delete_uploaded: bool,

    /// Path to the yt-dlp executable
    #[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    /// Path to the ffmpeg executable
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Log library activity to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn conversion_config(&self) -> ConversionConfig {
        let value = |v: &Option<String>| v.clone().unwrap_or_default();

        ConversionConfig {
            credentials: Credentials {
                youtube_api_key: value(&self.youtube_api_key),
                bucket: value(&self.bucket),
                host: HostCredentials {
                    api_key: value(&self.host_api_key),
                    podcast_id: value(&self.podcast_id),
                },
            },
            work_dir: self.work_dir.clone(),
            storage_key_prefix: self.key_prefix.clone(),
            limit: self.limit,
            poll: PollConfig {
                interval: Duration::from_secs(self.poll_interval),
                ..PollConfig::default()
            },
            publish_when_ready: self.publish,
            delete_uploaded_audio: self.delete_uploaded,
            ..ConversionConfig::default()
        }
    }

    fn criteria(&self) -> ItemCriteria {
        ItemCriteria {
            min_duration_seconds: self.min_duration,
            max_duration_seconds: self.max_duration,
            title_filter: self.title_filter.clone(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "tubecast=debug"
    } else {
        "tubecast=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Render status events until the job's topic closes
async fn render_events(mut events: broadcast::Receiver<StatusEvent>, spinner: ProgressBar) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                spinner.println(format!("  {}", format!("({missed} messages dropped)").dimmed()));
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let message = event.message;
        match event.kind {
            StatusKind::Progress => spinner.set_message(format!("{SEARCH}{message}")),
            StatusKind::ItemDone => spinner.println(format!("  {SUCCESS}{}", message.green())),
            StatusKind::ItemSkipped => {
                spinner.println(format!("  {SKIPPED}{}", message.dimmed()))
            }
            StatusKind::ItemFailed => spinner.println(format!("  {FAILURE}{}", message.red())),
            StatusKind::Fatal => spinner.println(format!("{FAILURE}{}", message.red().bold())),
            StatusKind::Cancelled => spinner.println(format!("{STOP}{}", message.yellow())),
            StatusKind::Completed => {
                spinner.println(format!("\n{PARTY}{}", message.bold().green()))
            }
        }
    }

    spinner.finish_and_clear();
}

fn print_summary(result: &ConversionResult) {
    let failed: Vec<_> = result
        .items
        .iter()
        .filter_map(|item| match &item.outcome {
            ItemOutcome::Failed { stage, error } => Some((item, stage, error)),
            _ => None,
        })
        .collect();

    if !failed.is_empty() {
        println!("\n{}", "Failed videos:".red().bold());
        for (item, stage, error) in failed {
            let name = item.title.as_deref().unwrap_or(&item.video.url);
            println!(
                "  {}{} - {} {}",
                CROSS,
                name.yellow(),
                format!("[{stage}]").dimmed(),
                error.dimmed()
            );
        }
    }

    if !result.episodes.is_empty() {
        println!("\n{}", "Episodes:".bold());
        for episode in &result.episodes {
            println!(
                "  {} {}",
                format!("#{}", episode.host_episode_id).cyan(),
                episode.title
            );
        }
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "tubecast".bold().magenta(),
            "- YouTube to Podcast".dimmed()
        );
    }

    let config = args.conversion_config();
    config.validate().context("Invalid configuration")?;

    let storage_endpoint = args
        .storage_endpoint
        .clone()
        .context("No storage endpoint given (--storage-endpoint or TUBECAST_STORAGE_ENDPOINT)")?;

    let client = ReqwestClient::new();
    let mut store = HttpObjectStore::new(client.clone(), storage_endpoint);
    if let Some(token) = &args.storage_token {
        store = store.with_auth_token(token);
    }
    let fetcher = MediaFetcher::new(
        Arc::new(YtDlpProbe::new(&args.yt_dlp)),
        Arc::new(FfmpegTranscoder::new(&args.ffmpeg)),
    );
    let pipeline = Pipeline::new(client, config, fetcher, Arc::new(store));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the current step");
                cancel.cancel();
            }
        }
    });

    let job = Job::new(SourceInput::Url(args.source.clone()), args.criteria());
    let hub = StatusHub::shared();

    let mut renderer = None;
    let sink: SharedStatusSink = if args.quiet {
        NoopSink::shared()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {wide_msg}")
                .context("Invalid progress template")?,
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        let events = hub.subscribe(job.id);
        renderer = Some(tokio::spawn(render_events(events, spinner)));
        hub.clone()
    };

    let result = run_conversion(&pipeline, &job, sink, &cancel).await;

    hub.close(job.id);
    if let Some(renderer) = renderer {
        renderer.await.context("Status renderer panicked")?;
    }

    if !args.quiet {
        print_summary(&result);
    }

    match &result.outcome {
        JobOutcome::Aborted { reason } => anyhow::bail!("Failed to create podcast: {reason}"),
        JobOutcome::Cancelled => std::process::exit(130),
        JobOutcome::Done if result.failed_count() > 0 && result.episodes.is_empty() => {
            std::process::exit(1)
        }
        JobOutcome::Done => Ok(()),
    }
}
