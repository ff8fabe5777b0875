use std::fs;
use std::io;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use uuid::Uuid;

pub const RECIPE_IMAGES: &str = "recipes";
pub const AVATARS: &str = "avatars";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("expected a data URL of the form data:image/<ext>;base64,<payload>")]
    Malformed,

    #[error("payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to store file: {0}")]
    Io(#[from] io::Error),
}

/// A decoded `data:image/<ext>;base64,...` payload.
#[derive(Debug, PartialEq, Eq)]
pub struct DataImage {
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl DataImage {
    pub fn parse(data_url: &str) -> Result<Self, MediaError> {
        let (header, payload) = data_url
            .split_once(";base64,")
            .ok_or(MediaError::Malformed)?;
        let extension = header
            .strip_prefix("data:image/")
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .ok_or(MediaError::Malformed)?
            .to_ascii_lowercase();
        let bytes = STANDARD.decode(payload.trim())?;
        if bytes.is_empty() {
            return Err(MediaError::Malformed);
        }
        Ok(Self { extension, bytes })
    }
}

/// Writes the image under `media_root/<folder>/` with a random name and
/// returns the path relative to `media_root`.
pub fn store(media_root: &Path, folder: &str, image: &DataImage) -> Result<String, MediaError> {
    let dir = media_root.join(folder);
    fs::create_dir_all(&dir)?;
    let file_name = format!("{}.{}", Uuid::new_v4().simple(), image.extension);
    fs::write(dir.join(&file_name), &image.bytes)?;
    Ok(format!("{folder}/{file_name}"))
}

/// Best-effort removal of a previously stored file.
pub fn remove(media_root: &Path, relative: &str) {
    if relative.split('/').any(|part| part == "..") {
        log::warn!("refusing to remove media path outside the media root: {relative}");
        return;
    }
    if let Err(err) = fs::remove_file(media_root.join(relative)) {
        log::warn!("could not remove media file {relative}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn parses_data_urls() {
        let image = DataImage::parse(PIXEL).unwrap();
        assert_eq!(image.extension, "png");
        assert!(image.bytes.starts_with(b"\x89PNG"));
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(DataImage::parse("hello"), Err(MediaError::Malformed)));
        assert!(matches!(
            DataImage::parse("data:text/plain;base64,aGk="),
            Err(MediaError::Malformed)
        ));
        assert!(matches!(
            DataImage::parse("data:image/../x;base64,aGk="),
            Err(MediaError::Malformed)
        ));
        assert!(matches!(
            DataImage::parse("data:image/png;base64,!!!"),
            Err(MediaError::Decode(_))
        ));
    }

    #[test]
    fn stores_and_removes_files() {
        let root = tempfile::tempdir().unwrap();
        let image = DataImage::parse(PIXEL).unwrap();
        let relative = store(root.path(), AVATARS, &image).unwrap();
        assert!(relative.starts_with("avatars/") && relative.ends_with(".png"));
        let on_disk = root.path().join(&relative);
        assert_eq!(fs::read(&on_disk).unwrap(), image.bytes);

        remove(root.path(), &relative);
        assert!(!on_disk.exists());
    }
}
