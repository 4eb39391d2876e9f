mod assets;
mod block;
mod config;
mod decorate;
mod error;
mod html;
mod layout;
mod markdown;
mod matter;
mod metadata;
mod metrics;
mod parser;
mod runs;
mod style;
mod table;
mod typst;

pub use assets::{AssetStore, StoredImage};
pub use block::{
    Block, Cell, ImageSource, ListMarker, SignatureField, SignatureParty, SignatureRole, TextRun,
    anchor_token, strip_markup,
};
pub use config::{DocumentConfig, Letterhead, LogoImage, MAX_LOGO_BYTES, Settings};
pub use error::{AssetError, ErrorKind, RenderError};
pub use layout::{LaidOut, PageSnapshot, Paginator};
pub use style::{Align, ParagraphStyle, StyleId, StyleOverride, StyleSheet};

use log::debug;

/// Parse markdown text into a vector of blocks. Images are resolved into a
/// scratch store that is dropped on return.
pub fn parse(markdown: &str) -> Vec<Block> {
    let mut assets = AssetStore::new(None);
    parse_with_assets(markdown, &mut assets)
}

/// Parse markdown, keeping resolved images in `assets`.
pub fn parse_with_assets(markdown: &str, assets: &mut AssetStore) -> Vec<Block> {
    let html = markdown::to_html(markdown);
    parser::parse(&html, assets)
}

/// Convert markdown to the HTML the block parser reads.
pub fn markdown_to_html(markdown: &str) -> String {
    markdown::to_html(markdown)
}

/// Convert markdown to the Typst markup of the content pages, title and
/// signature pages included.
pub fn markdown_to_typst(markdown: &str, config: &DocumentConfig) -> Result<String, RenderError> {
    reject_empty(markdown)?;
    let mut assets = AssetStore::new(config.asset_root.clone());
    let body = parse_with_assets(markdown, &mut assets);
    let title = matter::document_title(&body);
    let blocks = matter::compose(body, config, &mut assets);
    Ok(typst::blocks_to_typst(&blocks, &config.styles, Some(&title)))
}

/// Convert markdown to letterhead PDF bytes.
pub fn render(markdown: &str, config: &DocumentConfig) -> Result<Vec<u8>, RenderError> {
    reject_empty(markdown)?;
    let mut assets = AssetStore::new(config.asset_root.clone());
    let body = parse_with_assets(markdown, &mut assets);
    debug!("parsed {} blocks", body.len());

    let title = matter::document_title(&body);
    let blocks = matter::compose(body, config, &mut assets);

    let laid_out = Paginator::new(blocks, &config.styles, Some(title), assets.dir()).lay_out()?;
    laid_out.decorate(config)
}

fn reject_empty(markdown: &str) -> Result<(), RenderError> {
    if markdown.trim().is_empty() {
        return Err(RenderError::EmptyInput);
    }
    Ok(())
}
