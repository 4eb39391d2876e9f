use crate::block::{Block, TextRun, strip_markup};
use crate::style::StyleId;

/// Vertical gap between two consecutive metadata paragraphs, in points.
pub const METADATA_GAP: f64 = 2.0;
/// Gap before the first regular block that follows metadata, in points.
pub const METADATA_EXIT_GAP: f64 = 12.0;

const KEYWORDS: [&str; 4] = ["investment", "timeline", "deliverable", "from:"];

/// Bold label lines such as `**Investment:** $50,000`.
pub fn is_metadata(runs: &[TextRun]) -> bool {
    if !runs.iter().any(|run| run.bold) {
        return false;
    }
    let text = strip_markup(runs).to_lowercase();
    KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// Appends blocks to the output, restyling metadata paragraphs and
/// inserting the spacing that sets them apart.
#[derive(Debug, Default)]
pub struct MetadataSpacing {
    last_was_metadata: bool,
}

impl MetadataSpacing {
    pub fn push(&mut self, block: Block, blocks: &mut Vec<Block>) {
        let block = match block {
            Block::Paragraph {
                runs,
                style: StyleId::Body,
            } if is_metadata(&runs) => Block::Paragraph {
                runs,
                style: StyleId::Metadata,
            },
            other => other,
        };

        let metadata = matches!(
            block,
            Block::Paragraph {
                style: StyleId::Metadata,
                ..
            }
        );
        if self.last_was_metadata {
            let height = if metadata {
                METADATA_GAP
            } else {
                METADATA_EXIT_GAP
            };
            blocks.push(Block::Spacer { height });
        }
        self.last_was_metadata = metadata;
        blocks.push(block);
    }
}
