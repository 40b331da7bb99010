mod list;
mod resolve;

pub use list::{VideoLister, VideoPages, watch_url};
pub use resolve::{Reference, SourceResolver, YouTubeResolver, parse_source};
