/// Extension of the only audio container episodes are published in
pub const TARGET_EXTENSION: &str = "mp3";

/// Replacement for every character that is not ASCII alphanumeric
pub const PLACEHOLDER: char = '_';

/// Maximum length for the title portion of a filename
const MAX_TITLE_LENGTH: usize = 150;

/// Stem used when a title sanitizes to nothing
const EMPTY_TITLE_STEM: &str = "untitled";

/// Sanitize a title for use as a filename stem.
///
/// Pure function of the title: two videos whose titles sanitize to the same
/// stem share a filename.
pub fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .take(MAX_TITLE_LENGTH)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { PLACEHOLDER })
        .collect();

    if sanitized.is_empty() {
        EMPTY_TITLE_STEM.to_string()
    } else {
        sanitized
    }
}

/// Final audio filename for a title
pub fn audio_filename(title: &str) -> String {
    format!("{}.{}", sanitize_title(title), TARGET_EXTENSION)
}

/// Filename for a downloaded stream before transcoding
pub fn download_filename(title: &str, extension: &str) -> String {
    let extension: String = extension
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase();
    let extension = if extension.is_empty() { "bin".to_string() } else { extension };
    format!("{}.{}", sanitize_title(title), extension)
}

/// Object key for an audio file under the configured prefix
pub fn storage_key(prefix: &str, filename: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        filename.to_string()
    } else {
        format!("{prefix}/{filename}")
    }
}

/// Whether a container extension is already the publish format
pub fn is_target_format(extension: &str) -> bool {
    extension.eq_ignore_ascii_case(TARGET_EXTENSION)
}
