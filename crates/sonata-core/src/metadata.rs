//! Build [`AudioItem`]s from local files.
//!
//! Tags are read with lofty. Files lofty cannot parse still produce an item,
//! titled after the file stem.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lofty::prelude::*;
use lofty::probe::Probe;

use crate::error::{PlayerError, PlayerResult};
use crate::models::AudioItem;

/// Extensions the native engine can decode.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "m4a", "aac", "ogg", "oga", "wav", "alac",
];

/// True if `path` ends in a known audio extension.
pub fn is_audio_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Probe `path` and describe it as an item.
pub fn probe_file(path: impl AsRef<Path>) -> PlayerResult<AudioItem> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PlayerError::InvalidArgument(format!(
            "no such file: {}",
            path.display()
        )));
    }

    let fallback_title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string();
    let builder = AudioItem::builder(path.to_string_lossy());

    let tagged = match Probe::open(path).and_then(|p| p.read()) {
        Ok(t) => t,
        Err(e) => {
            log::debug!("sonata: no readable tags in {}: {}", path.display(), e);
            return builder.title(fallback_title).build();
        }
    };

    let duration_ms = tagged.properties().duration().as_millis() as u64;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());

    let mut builder = builder.title(
        tag.and_then(|t| t.title().map(|s| s.to_string()))
            .unwrap_or(fallback_title),
    );
    if duration_ms > 0 {
        builder = builder.duration_ms(duration_ms);
    }
    if let Some(tag) = tag {
        if let Some(artist) = tag.artist() {
            builder = builder.artist(artist.to_string());
        }
        if let Some(album) = tag.album() {
            builder = builder.album_title(album.to_string());
        }
        if let Some(pic) = tag.pictures().first() {
            let mime = pic.mime_type().map(|m| m.as_str()).unwrap_or("image/jpeg");
            builder = builder.artwork(data_uri(mime, pic.data()));
        }
    }
    builder.build()
}

/// Encode `bytes` as a `data:` URI.
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_invalid_argument() {
        let err = probe_file("/definitely/not/here.mp3").unwrap_err();
        assert!(matches!(err, PlayerError::InvalidArgument(_)));
    }

    #[test]
    fn directory_is_invalid_argument() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            probe_file(dir.path()),
            Err(PlayerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn untagged_file_falls_back_to_stem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Night Drive.mp3");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not really audio").unwrap();

        let item = probe_file(&path).unwrap();
        assert_eq!(item.title(), Some("Night Drive"));
        assert_eq!(item.artist(), None);
        assert_eq!(item.uri(), path.to_string_lossy());
    }

    #[test]
    fn data_uri_shape() {
        assert_eq!(data_uri("image/png", &[1, 2, 3]), "data:image/png;base64,AQID");
    }

    #[test]
    fn audio_extension_check() {
        assert!(is_audio_path(Path::new("/music/a.FLAC")));
        assert!(is_audio_path(Path::new("b.mp3")));
        assert!(!is_audio_path(Path::new("cover.jpg")));
        assert!(!is_audio_path(Path::new("README")));
    }
}
