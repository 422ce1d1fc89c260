//! Remote sources for the native engine.
//!
//! The response body is read front to back; symphonia sees it as a
//! non-seekable stream. Item headers and user agent go out with the request.

use symphonia::core::io::{MediaSourceStream, ReadOnlySource};

use super::EngineError;
use crate::models::AudioItem;

/// True for `http://` and `https://` URIs.
pub fn is_remote(uri: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Open `item`'s URI as a decoder input.
pub fn open(item: &AudioItem) -> Result<MediaSourceStream, EngineError> {
    let options = item.options();
    let mut request = ureq::get(item.uri());
    for (name, value) in &options.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(agent) = &options.user_agent {
        request = request.header("User-Agent", agent.as_str());
    }
    let response = request
        .call()
        .map_err(|e| EngineError::Backend(format!("GET {}: {}", item.uri(), e)))?;
    let reader = response.into_body().into_reader();
    Ok(MediaSourceStream::new(
        Box::new(ReadOnlySource::new(reader)),
        Default::default(),
    ))
}

/// Extension of the last path segment, ignoring query and fragment.
pub fn extension_hint(uri: &str) -> Option<String> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_ignores_query_and_fragment() {
        assert_eq!(
            extension_hint("https://cdn.example.com/a/track.MP3?sig=1#t=3"),
            Some("mp3".into())
        );
    }

    #[test]
    fn hint_needs_a_dot_in_last_segment() {
        assert_eq!(extension_hint("https://example.com/v1.2/stream"), None);
        assert_eq!(extension_hint("https://example.com/.hidden"), None);
    }

    #[test]
    fn remote_scheme_check() {
        assert!(is_remote("https://example.com/a.mp3"));
        assert!(is_remote("HTTP://example.com/a.mp3"));
        assert!(!is_remote("/home/me/a.mp3"));
        assert!(!is_remote("file:///a.mp3"));
    }
}
