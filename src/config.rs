use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose};
use log::debug;
use serde::Deserialize;

use crate::error::RenderError;
use crate::style::{StyleId, StyleOverride, StyleSheet};

static DEFAULT_CONFIG: &str = include_str!("default_config.toml");

/// Largest logo accepted, in bytes.
pub const MAX_LOGO_BYTES: usize = 5 * 1024 * 1024;

/// Settings as read from TOML: the compiled-in defaults overlaid by an
/// optional user file.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub letterhead: Letterhead,
    pub document: DocumentSettings,
    pub styles: HashMap<StyleId, StyleOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Letterhead {
    pub company: String,
    pub address: String,
    pub phone: String,
    pub email: Option<String>,
}

impl Default for Letterhead {
    fn default() -> Self {
        Self {
            company: "Davinci Corporation".to_string(),
            address: "123 Business St, Suite 100".to_string(),
            phone: "(555) 123-4567".to_string(),
            email: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub disclaimer: String,
    /// Logo file, relative to the settings file.
    pub logo: Option<PathBuf>,
    pub title_page: bool,
    pub signature_page: bool,
    pub signing_anchors: bool,
    /// Base directory for relative image paths in the markdown.
    pub asset_root: Option<PathBuf>,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            disclaimer: "This document is confidential and proprietary.".to_string(),
            logo: None,
            title_page: false,
            signature_page: false,
            signing_anchors: true,
            asset_root: None,
        }
    }
}

impl Settings {
    /// The settings compiled into the binary.
    pub fn compiled_default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_default()
    }

    /// Load a settings file on top of the compiled defaults. Relative paths
    /// in the file resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let config_error = |message: String| RenderError::Config {
            path: path.display().to_string(),
            message,
        };

        let content = fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let user = toml::from_str::<toml::Table>(&content)
            .map_err(|e| config_error(e.to_string()))?;
        let mut merged = toml::from_str::<toml::Table>(DEFAULT_CONFIG).unwrap_or_default();
        merge_tables(&mut merged, user);

        let mut settings: Settings = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| config_error(e.to_string()))?;

        let base = path.parent().unwrap_or(Path::new("."));
        if let Some(logo) = settings.document.logo.take() {
            settings.document.logo = Some(base.join(logo));
        }
        if let Some(root) = settings.document.asset_root.take() {
            settings.document.asset_root = Some(base.join(root));
        }
        debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Build the per-conversion configuration, reading the logo if one is
    /// configured.
    pub fn document_config(&self) -> Result<DocumentConfig, RenderError> {
        let mut styles = StyleSheet::default();
        for (id, over) in &self.styles {
            styles.apply(*id, over).map_err(|message| RenderError::Config {
                path: "[styles]".to_string(),
                message,
            })?;
        }

        let config = DocumentConfig {
            letterhead: self.letterhead.clone(),
            disclaimer: self.document.disclaimer.clone(),
            logo: None,
            include_title_page: self.document.title_page,
            include_signature_page: self.document.signature_page,
            signing_anchors: self.document.signing_anchors,
            styles,
            asset_root: self.document.asset_root.clone(),
        };

        match &self.document.logo {
            Some(path) => {
                let bytes = fs::read(path).map_err(|e| RenderError::Config {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                config.with_logo_bytes(bytes)
            }
            None => Ok(config),
        }
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// A validated logo image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoImage {
    pub bytes: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}

impl LogoImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, RenderError> {
        if bytes.len() > MAX_LOGO_BYTES {
            return Err(RenderError::LogoTooLarge {
                size: bytes.len(),
                limit: MAX_LOGO_BYTES,
            });
        }
        let (width_px, height_px) = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| RenderError::InvalidLogo(e.to_string()))?
            .into_dimensions()
            .map_err(|e| RenderError::InvalidLogo(e.to_string()))?;
        Ok(Self {
            bytes,
            width_px,
            height_px,
        })
    }
}

/// Everything one conversion needs. Immutable once built.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub letterhead: Letterhead,
    pub disclaimer: String,
    pub logo: Option<LogoImage>,
    pub include_title_page: bool,
    pub include_signature_page: bool,
    /// Put e-signature anchor tokens on the signature page.
    pub signing_anchors: bool,
    pub styles: StyleSheet,
    pub asset_root: Option<PathBuf>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        let settings = Settings::compiled_default();
        Self {
            letterhead: settings.letterhead,
            disclaimer: settings.document.disclaimer,
            logo: None,
            include_title_page: settings.document.title_page,
            include_signature_page: settings.document.signature_page,
            signing_anchors: settings.document.signing_anchors,
            styles: StyleSheet::default(),
            asset_root: None,
        }
    }
}

impl DocumentConfig {
    /// Attach a logo. Rejects files over [`MAX_LOGO_BYTES`] and anything the
    /// image decoder cannot read.
    pub fn with_logo_bytes(mut self, bytes: Vec<u8>) -> Result<Self, RenderError> {
        self.logo = Some(LogoImage::from_bytes(bytes)?);
        Ok(self)
    }

    /// Attach a base64 logo, with or without a `data:` URI prefix.
    pub fn with_logo_base64(self, encoded: &str) -> Result<Self, RenderError> {
        let payload = match encoded.trim().strip_prefix("data:") {
            Some(uri) => uri.split_once(',').map_or(uri, |(_, data)| data),
            None => encoded.trim(),
        };
        let bytes = general_purpose::STANDARD.decode(payload)?;
        self.with_logo_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn compiled_default_matches_builtin_values() {
        let settings = Settings::compiled_default();
        assert_eq!(settings.letterhead.company, "Davinci Corporation");
        assert_eq!(settings.letterhead.phone, "(555) 123-4567");
        assert_eq!(
            settings.document.disclaimer,
            "This document is confidential and proprietary."
        );
        assert!(settings.document.signing_anchors);
        assert!(!settings.document.title_page);
    }

    #[test]
    fn user_file_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("letterpress.toml");
        fs::write(
            &path,
            "[letterhead]\ncompany = \"Acme\"\n\n[document]\ntitle_page = true\n\n[styles.h1]\nfont_size = 24\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.letterhead.company, "Acme");
        assert_eq!(settings.letterhead.address, "123 Business St, Suite 100");
        assert!(settings.document.title_page);

        let config = settings.document_config().unwrap();
        assert_eq!(config.styles.get(StyleId::Heading1).font_size, 24.0);
        assert!(config.include_title_page);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[letterhead\ncompany = ").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn unknown_style_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("styles.toml");
        fs::write(&path, "[styles.sidebar]\nfont_size = 9\n").unwrap();
        assert_eq!(Settings::load(&path).unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn oversized_logo_is_rejected() {
        let err = DocumentConfig::default()
            .with_logo_bytes(vec![0; MAX_LOGO_BYTES + 1])
            .unwrap_err();
        assert!(matches!(err, RenderError::LogoTooLarge { .. }));
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn non_image_logo_is_rejected() {
        let err = DocumentConfig::default()
            .with_logo_bytes(b"<svg>nope</svg>".to_vec())
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidLogo(_)));
    }

    #[test]
    fn base64_logo() {
        let png = crate::assets::tests::tiny_png();
        let encoded = general_purpose::STANDARD.encode(&png);

        let config = DocumentConfig::default()
            .with_logo_base64(&encoded)
            .unwrap();
        assert_eq!(config.logo.as_ref().map(|l| l.width_px), Some(2));

        let config = DocumentConfig::default()
            .with_logo_base64(&format!("data:image/png;base64,{encoded}"))
            .unwrap();
        assert!(config.logo.is_some());

        let err = DocumentConfig::default()
            .with_logo_base64("not base64 !!")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
    }
}
