use chrono::{Local, NaiveDate};
use log::{debug, warn};

use crate::assets::AssetStore;
use crate::block::{Block, ImageSource, SignatureParty, SignatureRole, TextRun, strip_markup};
use crate::config::DocumentConfig;
use crate::style::StyleId;

pub const DEFAULT_TITLE: &str = "Untitled Document";
pub const SIGNATURE_HEADING: &str = "Acceptance and Signatures";
pub const SIGNATURE_PREAMBLE: &str = "By signing below, the parties acknowledge that they have read, \
understand and agree to the terms set out in this document.";

const TITLE_TOP_SPACE: f64 = 144.0;
const TITLE_LOGO_GAP: f64 = 36.0;
const TITLE_LOGO_MAX_WIDTH: f64 = 216.0;
const TITLE_LOGO_MAX_HEIGHT: f64 = 108.0;

/// Wrap the body blocks with the title and signature pages the
/// configuration asks for.
pub fn compose(body: Vec<Block>, config: &DocumentConfig, assets: &mut AssetStore) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(body.len() + 12);
    if config.include_title_page {
        let date = Local::now().date_naive();
        blocks.extend(title_page(&document_title(&body), date, config, assets));
    }
    blocks.extend(body);
    if config.include_signature_page {
        blocks.extend(signature_page(config));
    }
    debug!(
        "composed {} blocks (title page: {}, signature page: {})",
        blocks.len(),
        config.include_title_page,
        config.include_signature_page
    );
    blocks
}

/// Text of the first level-1 heading.
pub fn document_title(blocks: &[Block]) -> String {
    blocks
        .iter()
        .find_map(|block| match block {
            Block::Heading { level: 1, runs } => {
                let text = strip_markup(runs).trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            _ => None,
        })
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

pub fn title_page(
    title: &str,
    date: NaiveDate,
    config: &DocumentConfig,
    assets: &mut AssetStore,
) -> Vec<Block> {
    let mut blocks = vec![Block::Spacer {
        height: TITLE_TOP_SPACE,
    }];

    if let Some(logo) = &config.logo {
        match assets.store(&logo.bytes) {
            Ok(stored) => {
                let (w, h) = fit(
                    f64::from(stored.width_px.max(1)),
                    f64::from(stored.height_px.max(1)),
                    TITLE_LOGO_MAX_WIDTH,
                    TITLE_LOGO_MAX_HEIGHT,
                );
                blocks.push(Block::Image {
                    source: ImageSource::Embedded(stored.name),
                    width: Some(w),
                    height: Some(h),
                    alt_text: config.letterhead.company.clone(),
                    centered: true,
                });
                blocks.push(Block::Spacer {
                    height: TITLE_LOGO_GAP,
                });
            }
            Err(e) => warn!("title page logo skipped: {e}"),
        }
    }

    blocks.push(Block::Paragraph {
        runs: vec![TextRun::plain(title)],
        style: StyleId::Title,
    });
    blocks.push(Block::Paragraph {
        runs: vec![TextRun::plain(config.letterhead.company.as_str())],
        style: StyleId::TitleDetail,
    });
    blocks.push(Block::Paragraph {
        runs: vec![TextRun::plain(date.format("%B %-d, %Y").to_string())],
        style: StyleId::TitleDetail,
    });
    blocks.push(Block::PageBreak);
    blocks
}

pub fn signature_page(config: &DocumentConfig) -> Vec<Block> {
    vec![
        Block::PageBreak,
        Block::Heading {
            level: 1,
            runs: vec![TextRun::plain(SIGNATURE_HEADING)],
        },
        Block::paragraph(vec![TextRun::plain(SIGNATURE_PREAMBLE)]),
        Block::Spacer { height: 24.0 },
        Block::SignatureGrid {
            parties: [
                SignatureParty {
                    heading: config.letterhead.company.clone(),
                    role: SignatureRole::Company,
                },
                SignatureParty {
                    heading: "Client".to_string(),
                    role: SignatureRole::Client,
                },
            ],
            anchors: config.signing_anchors,
        },
    ]
}

/// Scale `(w, h)` into a box, keeping the aspect ratio.
pub(crate) fn fit(w: f64, h: f64, max_w: f64, max_h: f64) -> (f64, f64) {
    let scale = (max_w / w).min(max_h / h);
    (w * scale, h * scale)
}
