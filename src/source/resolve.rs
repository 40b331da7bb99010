use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::ResolveError;
use crate::http::HttpClient;
use crate::model::Source;

const PLAYLIST_PREFIXES: [&str; 6] = ["PL", "UU", "OL", "LL", "FL", "RD"];

/// Turns arbitrary user input into a canonical channel or playlist id
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, input: &str) -> Result<Source, ResolveError>;
}

/// What a piece of user input refers to, before any lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Known(Source),
    /// `@name` style channel handle
    Handle(String),
    /// Legacy `/user/{name}` URL
    Username(String),
}

/// Classify user input without touching the network
pub fn parse_source(input: &str) -> Result<Reference, ResolveError> {
    let input = input.trim();
    let unrecognised = || ResolveError::Unrecognised(input.to_string());

    if let Some(reference) = classify_id(input) {
        return Ok(reference);
    }

    let url = Url::parse(input)
        .or_else(|_| Url::parse(&format!("https://{input}")))
        .map_err(|_| unrecognised())?;

    if let Some((_, list)) = url.query_pairs().find(|(key, _)| key == "list")
        && !list.is_empty()
    {
        return known(Source::playlist(list.into_owned())).ok_or_else(unrecognised);
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["channel", id, ..] => known(Source::channel(*id)).ok_or_else(unrecognised),
        ["user", name, ..] => Ok(Reference::Username((*name).to_string())),
        ["c", name, ..] => Ok(Reference::Handle(format!("@{name}"))),
        [first, ..] if first.starts_with('@') => Ok(Reference::Handle((*first).to_string())),
        _ => Err(unrecognised()),
    }
}

fn classify_id(input: &str) -> Option<Reference> {
    if input.contains('/') || input.contains('.') {
        return None;
    }
    if input.starts_with('@') && input.len() > 1 {
        return Some(Reference::Handle(input.to_string()));
    }
    if input.starts_with("UC") && input.len() == 24 {
        return known(Source::channel(input));
    }
    if PLAYLIST_PREFIXES.iter().any(|prefix| input.starts_with(prefix)) && input.len() > 12 {
        return known(Source::playlist(input));
    }
    None
}

fn known(source: Source) -> Option<Reference> {
    source.has_valid_id().then_some(Reference::Known(source))
}

#[derive(Debug, Deserialize)]
struct ChannelLookup {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
}

/// Resolver backed by the platform's channel lookup API for handles
pub struct YouTubeResolver<C> {
    client: C,
    api_base: String,
    api_key: String,
}

impl<C: HttpClient> YouTubeResolver<C> {
    pub fn new(client: C, api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }

    async fn lookup_channel(&self, param: &str, value: &str) -> Result<Source, ResolveError> {
        let endpoint = format!("{}/channels", self.api_base.trim_end_matches('/'));
        let url = Url::parse_with_params(
            &endpoint,
            [("part", "id"), (param, value), ("key", self.api_key.as_str())],
        )
        .map_err(|_| ResolveError::Unrecognised(value.to_string()))?;

        let display_url = format!("{endpoint}?{param}={value}");
        let reply = self
            .client
            .get_bytes(url.as_str())
            .await
            .map_err(|e| ResolveError::HttpFailed {
                url: display_url.clone(),
                source: e,
            })?;

        if !reply.is_success() {
            return Err(ResolveError::HttpStatus {
                url: display_url,
                status: reply.status,
            });
        }

        let lookup: ChannelLookup = serde_json::from_slice(&reply.body)?;
        lookup
            .items
            .into_iter()
            .next()
            .map(|item| Source::channel(item.id))
            .ok_or_else(|| ResolveError::UnknownHandle(value.to_string()))
    }
}

#[async_trait]
impl<C: HttpClient> SourceResolver for YouTubeResolver<C> {
    async fn resolve(&self, input: &str) -> Result<Source, ResolveError> {
        match parse_source(input)? {
            Reference::Known(source) => Ok(source),
            Reference::Handle(handle) => self.lookup_channel("forHandle", &handle).await,
            Reference::Username(name) => self.lookup_channel("forUsername", &name).await,
        }
    }
}
