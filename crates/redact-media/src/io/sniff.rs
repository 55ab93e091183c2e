//! Input media kind detection.

use redact_models::MediaKind;
use std::path::Path;

use crate::error::{MediaError, MediaResult};

/// Extensions handled as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

/// Extensions handled as video.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "webm", "mpg", "mpeg", "ts"];

/// Bytes of the input needed for content sniffing.
pub const SNIFF_LEN: usize = 64;

/// Decide whether an input is an image or a video.
///
/// The extension of `name_hint` wins when it is a known one; otherwise the
/// leading bytes are inspected.
pub fn sniff_media_kind(name_hint: Option<&Path>, head: &[u8]) -> MediaResult<MediaKind> {
    if let Some(kind) = name_hint.and_then(kind_from_extension) {
        return Ok(kind);
    }
    if let Some(kind) = kind_from_content(head) {
        return Ok(kind);
    }
    let name = name_hint
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<bytes>".to_string());
    Err(MediaError::UnsupportedFormat(format!(
        "{name}: neither a known image nor a known video format"
    )))
}

fn kind_from_extension(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

fn kind_from_content(head: &[u8]) -> Option<MediaKind> {
    if image::guess_format(head).is_ok() {
        return Some(MediaKind::Image);
    }
    // ISO-BMFF (mp4, mov, m4v)
    if head.len() >= 8 && &head[4..8] == b"ftyp" {
        return Some(MediaKind::Video);
    }
    // EBML (mkv, webm)
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(MediaKind::Video);
    }
    if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"AVI " {
        return Some(MediaKind::Video);
    }
    // MPEG transport stream sync bytes
    if head.len() > 188 && head[0] == 0x47 && head[188] == 0x47 {
        return Some(MediaKind::Video);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_wins() {
        assert_eq!(
            sniff_media_kind(Some(Path::new("a/B.JPG")), &[]).unwrap(),
            MediaKind::Image
        );
        assert_eq!(
            sniff_media_kind(Some(Path::new("clip.mov")), &[]).unwrap(),
            MediaKind::Video
        );
    }

    #[test]
    fn test_content_sniffing() {
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert_eq!(sniff_media_kind(None, png).unwrap(), MediaKind::Image);

        let mp4 = b"\0\0\0\x20ftypisom\0\0\x02\0";
        assert_eq!(
            sniff_media_kind(Some(Path::new("upload.bin")), mp4).unwrap(),
            MediaKind::Video
        );

        let mkv = [0x1A, 0x45, 0xDF, 0xA3, 0x01];
        assert_eq!(sniff_media_kind(None, &mkv).unwrap(), MediaKind::Video);
    }

    #[test]
    fn test_unknown_rejected() {
        let err = sniff_media_kind(Some(Path::new("notes.txt")), b"hello world").unwrap_err();
        assert!(err.is_input_error());
    }
}
