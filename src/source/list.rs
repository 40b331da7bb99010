// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;
use url::Url;

use crate::error::EnumerationError;
use crate::http::HttpClient;
use crate::model::{Source, SourceKind, VideoRef};

const VIDEO_KIND: &str = "youtube#video";

/// Build the watch URL for a video id
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    id: Option<ItemId>,
    snippet: Option<Snippet>,
}

/// Search results carry a resource id, playlist items an opaque string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemId {
    Resource(ResourceId),
    Opaque(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    kind: String,
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    description: String,
    /// Present on playlist items
    resource_id: Option<ResourceId>,
}

impl ListItem {
    fn into_video_ref(self) -> Option<VideoRef> {
        let description = self
            .snippet
            .as_ref()
            .map(|s| s.description.clone())
            .unwrap_or_default();

        let id = match self.id {
            Some(ItemId::Resource(id)) => id,
            Some(ItemId::Opaque(_)) | None => self.snippet?.resource_id?,
        };

        if id.kind != VIDEO_KIND {
            return None;
        }

        id.video_id.map(|video_id| VideoRef {
            url: watch_url(&video_id),
            description,
        })
    }
}

/// Paginates the video listing API for a channel or playlist
#[derive(Debug, Clone)]
pub struct VideoLister {
    api_base: String,
    api_key: String,
    page_size: u32,
}

impl VideoLister {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, page_size: u32) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            page_size,
        }
    }

    /// Start a fresh pagination; calling this again restarts from the first page
    pub fn pages<'a, C: HttpClient>(&'a self, client: &'a C, source: &'a Source) -> VideoPages<'a, C> {
        VideoPages {
            client,
            lister: self,
            source,
            next_token: None,
            page: 0,
            finished: false,
        }
    }

    /// Collect every video in listing order, stopping early once `limit` is reached
    pub async fn list_videos<C: HttpClient>(
        &self,
        client: &C,
        source: &Source,
        limit: Option<usize>,
    ) -> Result<Vec<VideoRef>, EnumerationError> {
        let mut videos = Vec::new();
        let mut pages = self.pages(client, source);

        while let Some(page) = pages.next_page().await? {
            videos.extend(page);
            if let Some(limit) = limit
                && videos.len() >= limit
            {
                videos.truncate(limit);
                break;
            }
        }

        tracing::debug!(source = %source.id, count = videos.len(), "Enumeration finished");
        Ok(videos)
    }

    fn page_url(&self, source: &Source, token: Option<&str>) -> Result<Url, EnumerationError> {
        let page_size = self.page_size.to_string();
        let base = self.api_base.trim_end_matches('/');

        let mut params = vec![
            ("part", "snippet"),
            ("maxResults", page_size.as_str()),
            ("key", self.api_key.as_str()),
        ];

        let endpoint = match source.kind {
            SourceKind::Channel => {
                params.extend([
                    ("channelId", source.id.as_str()),
                    ("order", "date"),
                    ("type", "video"),
                ]);
                format!("{base}/search")
            }
            SourceKind::Playlist => {
                params.push(("playlistId", source.id.as_str()));
                format!("{base}/playlistItems")
            }
        };

        if let Some(token) = token {
            params.push(("pageToken", token));
        }

        Ok(Url::parse_with_params(&endpoint, &params)?)
    }
}

/// A restartable, lazily fetched sequence of listing pages
pub struct VideoPages<'a, C> {
    client: &'a C,
    lister: &'a VideoLister,
    source: &'a Source,
    next_token: Option<String>,
    page: usize,
    finished: bool,
}

impl<C: HttpClient> VideoPages<'_, C> {
    /// Fetch the next page; `Ok(None)` once there is no continuation token
    pub async fn next_page(&mut self) -> Result<Option<Vec<VideoRef>>, EnumerationError> {
        if self.finished {
            return Ok(None);
        }

        self.page += 1;
        let page = self.page;
        let url = self.lister.page_url(self.source, self.next_token.as_deref())?;

        let reply = self
            .client
            .get_bytes(url.as_str())
            .await
            .map_err(|e| EnumerationError::FetchFailed {
                url: redact_key(&url),
                page,
                source: e,
            })?;

        if !reply.is_success() {
            return Err(EnumerationError::HttpStatus {
                url: redact_key(&url),
                page,
                status: reply.status,
            });
        }

        let listing: ListPage = serde_json::from_slice(&reply.body)
            .map_err(|e| EnumerationError::Malformed { page, source: e })?;

        self.next_token = listing.next_page_token.filter(|token| !token.is_empty());
        self.finished = self.next_token.is_none();

        let videos: Vec<VideoRef> = listing
            .items
            .into_iter()
            .filter_map(ListItem::into_video_ref)
            .collect();

        tracing::debug!(page, videos = videos.len(), more = !self.finished, "Fetched listing page");
        Ok(Some(videos))
    }
}

/// Strip the API key from a URL before it ends up in an error message
fn redact_key(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "key")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}
