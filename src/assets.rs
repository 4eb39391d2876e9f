use std::fs;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use base64::{Engine as _, engine::general_purpose};
use log::debug;
use tempfile::TempDir;

use crate::error::AssetError;

/// An image copied into the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// File name inside [`AssetStore::dir`].
    pub name: String,
    pub width_px: u32,
    pub height_px: u32,
}

/// Per-conversion scratch space for images the layout pass reads.
///
/// The directory is created on first use and removed when the store drops.
#[derive(Debug)]
pub struct AssetStore {
    asset_root: Option<PathBuf>,
    scratch: Option<TempDir>,
    count: usize,
}

impl AssetStore {
    /// `asset_root` is the base for relative image paths; without one,
    /// relative paths resolve against the working directory.
    pub fn new(asset_root: Option<PathBuf>) -> Self {
        Self {
            asset_root,
            scratch: None,
            count: 0,
        }
    }

    /// Resolve an `<img src>` value. Remote URLs are never fetched, and file
    /// paths must be relative without `..` segments.
    pub fn resolve(&mut self, src: &str) -> Result<StoredImage, AssetError> {
        let src = src.trim();
        if let Some(data) = src.strip_prefix("data:") {
            let bytes = decode_data_uri(data)?;
            return self.store(&bytes);
        }
        if src.starts_with("http://") || src.starts_with("https://") || src.starts_with("//") {
            return Err(AssetError::Remote(src.to_string()));
        }

        let path = Path::new(src);
        let contained = !src.starts_with("file:")
            && path
                .components()
                .all(|part| matches!(part, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(AssetError::OutsideRoot(src.to_string()));
        }
        let path = match &self.asset_root {
            Some(root) => root.join(path),
            None => path.to_path_buf(),
        };
        if !path.is_file() {
            return Err(AssetError::Missing(path.display().to_string()));
        }
        let bytes = fs::read(&path)?;
        self.store(&bytes)
    }

    /// Validate image bytes and write them into the scratch directory.
    pub fn store(&mut self, bytes: &[u8]) -> Result<StoredImage, AssetError> {
        let format = image::guess_format(bytes)?;
        let (width_px, height_px) = image::ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()?;

        let extension = format.extensions_str().first().copied().unwrap_or("img");
        self.count += 1;
        let name = format!("asset-{}.{extension}", self.count);

        let dir = self.ensure_dir()?;
        fs::write(dir.join(&name), bytes)?;
        debug!("stored {name} ({width_px}x{height_px} px)");

        Ok(StoredImage {
            name,
            width_px,
            height_px,
        })
    }

    /// The scratch directory, if any image has been stored.
    pub fn dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    fn ensure_dir(&mut self) -> Result<PathBuf, AssetError> {
        if let Some(dir) = &self.scratch {
            return Ok(dir.path().to_path_buf());
        }
        let dir = tempfile::Builder::new().prefix("letterpress-").tempdir()?;
        debug!("created asset directory {}", dir.path().display());
        let path = dir.path().to_path_buf();
        self.scratch = Some(dir);
        Ok(path)
    }
}

/// Decode the part of a data URI after `data:`. Only base64 payloads are
/// accepted.
fn decode_data_uri(data: &str) -> Result<Vec<u8>, AssetError> {
    let (header, payload) = data.split_once(',').ok_or(AssetError::MalformedDataUri)?;
    if !header.ends_with(";base64") {
        return Err(AssetError::MalformedDataUri);
    }
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(general_purpose::STANDARD.decode(payload)?)
}
