use std::io;

use thiserror::Error;

/// Coarse classification of a [`RenderError`], for callers that map failures
/// onto transport-level status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is unusable; nothing was laid out.
    Input,
    /// Settings could not be loaded.
    Config,
    /// Filesystem failure outside the drawing backend.
    Io,
    /// The layout or drawing backend could not produce a document.
    Backend,
}

/// The single error a conversion can surface.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("markdown input is empty")]
    EmptyInput,

    #[error("logo image is {size} bytes, the limit is {limit} bytes")]
    LogoTooLarge { size: usize, limit: usize },

    #[error("logo is not a readable image: {0}")]
    InvalidLogo(String),

    #[error("logo is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("invalid settings in {path}: {message}")]
    Config { path: String, message: String },

    #[error("typst compilation failed: {0}")]
    Compile(String),

    #[error("PDF generation failed: {0}")]
    Export(String),

    #[error("laid-out PDF could not be processed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::EmptyInput
            | RenderError::LogoTooLarge { .. }
            | RenderError::InvalidLogo(_)
            | RenderError::InvalidBase64(_) => ErrorKind::Input,
            RenderError::Config { .. } => ErrorKind::Config,
            RenderError::Io(_) => ErrorKind::Io,
            RenderError::Compile(_) | RenderError::Export(_) | RenderError::Pdf(_) => {
                ErrorKind::Backend
            }
        }
    }
}

/// Failure to resolve an image referenced from the document body.
///
/// Never surfaced to callers: the block builder logs it and renders the alt
/// text instead.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("remote images are not fetched: {0}")]
    Remote(String),

    #[error("image file not found: {0}")]
    Missing(String),

    #[error("image path leaves the asset directory: {0}")]
    OutsideRoot(String),

    #[error("malformed data URI")]
    MalformedDataUri,

    #[error("data URI payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unsupported or corrupt image: {0}")]
    Decode(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
