use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::FetchError;

use super::tool::run_tool;

/// A directly downloadable stream
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    pub url: String,
    /// Container extension, e.g. `m4a` or `webm`
    pub extension: String,
    /// False when the stream also carries video
    pub audio_only: bool,
    /// Bitrate in kbit/s, if known
    pub bitrate: Option<f64>,
    /// Headers the platform requires for the download
    pub headers: Vec<(String, String)>,
}

/// Platform metadata for a video
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub title: String,
    /// Exact running time; kept fractional so bound checks are not skewed
    pub duration: Option<Duration>,
    pub stream: Option<AudioStream>,
}

/// Source of title, duration and stream selection for a video
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, video_url: &str) -> Result<MediaInfo, FetchError>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    title: String,
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<ProbeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProbeFormat {
    url: Option<String>,
    #[serde(default)]
    ext: String,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
    tbr: Option<f64>,
    protocol: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

impl ProbeFormat {
    fn has_audio(&self) -> bool {
        self.acodec.as_deref().is_some_and(|c| c != "none")
    }

    fn has_video(&self) -> bool {
        self.vcodec.as_deref().is_some_and(|c| c != "none")
    }

    /// Manifest-based protocols can't be fetched as a single stream
    fn is_direct(&self) -> bool {
        self.url.is_some()
            && self
                .protocol
                .as_deref()
                .is_none_or(|p| p == "http" || p == "https")
    }

    fn bitrate(&self) -> Option<f64> {
        self.abr.or(self.tbr)
    }

    fn into_stream(self, audio_only: bool) -> Option<AudioStream> {
        let bitrate = self.bitrate();
        Some(AudioStream {
            url: self.url?,
            extension: self.ext,
            audio_only,
            bitrate,
            headers: self.http_headers.into_iter().collect(),
        })
    }
}

/// Pick the best audio-only stream, falling back to the best progressive one
pub(crate) fn select_stream(formats: &[ProbeFormat]) -> Option<AudioStream> {
    let best = |audio_only: bool| {
        formats
            .iter()
            .filter(|f| f.is_direct() && f.has_audio() && f.has_video() != audio_only)
            .max_by(|a, b| {
                a.bitrate()
                    .unwrap_or(0.0)
                    .total_cmp(&b.bitrate().unwrap_or(0.0))
            })
            .cloned()
    };

    best(true)
        .and_then(|f| f.into_stream(true))
        .or_else(|| best(false).and_then(|f| f.into_stream(false)))
}

/// Probe backed by `yt-dlp --dump-single-json`
#[derive(Debug, Clone)]
pub struct YtDlpProbe {
    program: PathBuf,
    timeout: Duration,
}

impl YtDlpProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for YtDlpProbe {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

/// Turn `yt-dlp` JSON into [`MediaInfo`]
pub(crate) fn parse_probe_output(video_url: &str, json: &[u8]) -> Result<MediaInfo, FetchError> {
    let output: ProbeOutput = serde_json::from_slice(json).map_err(|e| FetchError::Metadata {
        url: video_url.to_string(),
        source: e,
    })?;

    Ok(MediaInfo {
        title: output.title,
        duration: output
            .duration
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
        stream: select_stream(&output.formats),
    })
}

#[async_trait]
impl MediaProbe for YtDlpProbe {
    async fn probe(&self, video_url: &str) -> Result<MediaInfo, FetchError> {
        let args: Vec<OsString> = [
            "--dump-single-json",
            "--no-playlist",
            "--skip-download",
            "--no-warnings",
            video_url,
        ]
        .iter()
        .map(OsString::from)
        .collect();

        let output = run_tool(&self.program, &args, self.timeout).await?;
        parse_probe_output(video_url, &output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(ext: &str, acodec: &str, vcodec: &str, abr: Option<f64>, tbr: Option<f64>) -> serde_json::Value {
        serde_json::json!({
            "url": format!("https://cdn.example.com/{ext}-{acodec}-{vcodec}"),
            "ext": ext,
            "acodec": acodec,
            "vcodec": vcodec,
            "abr": abr,
            "tbr": tbr,
            "protocol": "https",
        })
    }

    fn probe_json(formats: Vec<serde_json::Value>) -> Vec<u8> {
        serde_json::json!({
            "title": "Weekly Recap",
            "duration": 600.4,
            "formats": formats,
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn best_audio_only_stream_wins() {
        let json = probe_json(vec![
            format("m4a", "mp4a.40.2", "none", Some(128.0), None),
            format("webm", "opus", "none", Some(160.0), None),
            format("mp4", "mp4a.40.2", "avc1", None, Some(900.0)),
        ]);

        let info = parse_probe_output("https://v", &json).unwrap();

        assert_eq!(info.title, "Weekly Recap");
        let duration = info.duration.unwrap();
        assert!(duration > Duration::from_secs(600));
        assert!((duration.as_secs_f64() - 600.4).abs() < 1e-6);
        let stream = info.stream.unwrap();
        assert!(stream.audio_only);
        assert_eq!(stream.extension, "webm");
    }

    #[test]
    fn progressive_stream_is_the_fallback() {
        let json = probe_json(vec![
            format("mp4", "none", "avc1", None, Some(2000.0)),
            format("mp4", "mp4a.40.2", "avc1", None, Some(900.0)),
        ]);

        let stream = parse_probe_output("https://v", &json).unwrap().stream.unwrap();

        assert!(!stream.audio_only);
        assert_eq!(stream.extension, "mp4");
    }

    #[test]
    fn manifest_streams_are_ignored() {
        let mut hls = format("m4a", "mp4a.40.2", "none", Some(256.0), None);
        hls["protocol"] = "m3u8_native".into();

        let info = parse_probe_output("https://v", &probe_json(vec![hls])).unwrap();
        assert!(info.stream.is_none());
    }

    #[test]
    fn fractional_duration_is_not_rounded_up() {
        let json = br#"{"title":"Teaser","duration":59.6,"formats":[]}"#;
        let info = parse_probe_output("https://v", json).unwrap();
        assert!(info.duration.unwrap() < Duration::from_secs(60));
    }

    #[test]
    fn negative_duration_is_unknown() {
        let json = br#"{"title":"Odd","duration":-1.0,"formats":[]}"#;
        let info = parse_probe_output("https://v", json).unwrap();
        assert_eq!(info.duration, None);
    }

    #[test]
    fn missing_duration_is_unknown() {
        let json = br#"{"title":"Live","duration":null,"formats":[]}"#;
        let info = parse_probe_output("https://v", json).unwrap();
        assert_eq!(info.duration, None);
        assert!(info.stream.is_none());
    }

    #[test]
    fn malformed_json_is_a_metadata_error() {
        assert!(matches!(
            parse_probe_output("https://v", b"not json"),
            Err(FetchError::Metadata { .. })
        ));
    }
}
