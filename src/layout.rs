use std::path::{Path, PathBuf};

use log::{debug, warn};
use lopdf::{Document, Object, ObjectId};
use typst_as_lib::TypstEngine;
use typst_as_lib::typst_kit_options::TypstKitFontOptions;
use typst_library::layout::PagedDocument;
use typst_pdf::PdfOptions;

use crate::block::{Block, ImageSource, TextRun};
use crate::error::RenderError;
use crate::parser::image_placeholder;
use crate::style::StyleSheet;
use crate::typst;

/// US Letter, in points.
pub const PAGE_WIDTH: f64 = 612.0;
pub const PAGE_HEIGHT: f64 = 792.0;

pub const MARGIN_TOP: f64 = 108.0;
pub const MARGIN_BOTTOM: f64 = 90.0;
pub const MARGIN_SIDE: f64 = 54.0;

pub const CONTENT_WIDTH: f64 = PAGE_WIDTH - 2.0 * MARGIN_SIDE;
pub const CONTENT_HEIGHT: f64 = PAGE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

/// A laid-out page awaiting decoration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSnapshot {
    /// Zero-based position in the document.
    pub index: usize,
    pub page_id: ObjectId,
    /// `[x0, y0, x1, y1]` in points.
    pub media_box: [f64; 4],
}

impl PageSnapshot {
    pub fn width(&self) -> f64 {
        self.media_box[2] - self.media_box[0]
    }

    pub fn height(&self) -> f64 {
        self.media_box[3] - self.media_box[1]
    }
}

/// Block sequence that has not been laid out yet.
pub struct Paginator<'a> {
    blocks: Vec<Block>,
    styles: &'a StyleSheet,
    title: Option<String>,
    asset_dir: Option<PathBuf>,
}

/// Every page exists; only decoration remains.
#[derive(Debug)]
pub struct LaidOut {
    pub(crate) document: Document,
    pub(crate) pages: Vec<PageSnapshot>,
}

impl<'a> Paginator<'a> {
    pub fn new(
        blocks: Vec<Block>,
        styles: &'a StyleSheet,
        title: Option<String>,
        asset_dir: Option<&Path>,
    ) -> Self {
        Self {
            blocks,
            styles,
            title,
            asset_dir: asset_dir.map(Path::to_path_buf),
        }
    }

    /// The Typst source this paginator compiles.
    pub fn source(&self) -> String {
        typst::blocks_to_typst(&self.blocks, self.styles, self.title.as_deref())
    }

    /// Lay out all blocks. Blocks that fail to compile are replaced by
    /// their plain text and the document is compiled once more.
    pub fn lay_out(mut self) -> Result<LaidOut, RenderError> {
        let doc = match self.compile(self.source()) {
            Ok(doc) => doc,
            Err(RenderError::Compile(cause)) => {
                warn!("layout failed, isolating failing blocks: {cause}");
                self.degrade_failing_blocks();
                self.compile(self.source())?
            }
            Err(e) => return Err(e),
        };

        let pdf = typst_pdf::pdf(&doc, &PdfOptions::default())
            .map_err(|e| RenderError::Export(format!("{:?}", e)))?;
        let document = Document::load_mem(&pdf)?;
        let laid_out = LaidOut::from_document(document);
        debug!("laid out {} pages", laid_out.page_count());
        Ok(laid_out)
    }

    fn compile(&self, source: String) -> Result<PagedDocument, RenderError> {
        let font_options = TypstKitFontOptions::new()
            .include_embedded_fonts(true)
            .include_system_fonts(false);

        let mut builder = TypstEngine::builder()
            .main_file(source)
            .search_fonts_with(font_options);
        if let Some(dir) = &self.asset_dir {
            builder = builder.with_file_system_resolver(dir.clone());
        }
        let engine = builder.build();

        engine
            .compile()
            .output
            .map_err(|e| RenderError::Compile(format!("{:?}", e)))
    }

    fn degrade_failing_blocks(&mut self) {
        let blocks = std::mem::take(&mut self.blocks);
        let mut kept = Vec::with_capacity(blocks.len());
        for (index, block) in blocks.into_iter().enumerate() {
            if matches!(block, Block::PageBreak | Block::Spacer { .. } | Block::Rule) {
                kept.push(block);
                continue;
            }
            let mut source = typst::preamble(self.styles, None);
            typst::emit_block(&block, self.styles, &mut source);
            if self.compile(source).is_ok() {
                kept.push(block);
                continue;
            }

            warn!("block {index} cannot be laid out, rendering it as plain text");
            match degrade(&block) {
                Some(replacement) => kept.push(replacement),
                None => debug!("block {index} has no text and was dropped"),
            }
        }
        self.blocks = kept;
    }
}

fn degrade(block: &Block) -> Option<Block> {
    if let Block::Image {
        source: ImageSource::Embedded(_),
        alt_text,
        ..
    } = block
    {
        return Some(image_placeholder(alt_text));
    }
    let text = block.plain_text();
    if text.trim().is_empty() {
        return None;
    }
    Some(Block::paragraph(vec![TextRun::plain(text)]))
}

impl LaidOut {
    /// Capture one snapshot per page, in page order.
    pub fn from_document(document: Document) -> Self {
        let pages = document
            .get_pages()
            .into_values()
            .enumerate()
            .map(|(index, page_id)| PageSnapshot {
                index,
                page_id,
                media_box: media_box(&document, page_id),
            })
            .collect();
        Self { document, pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[PageSnapshot] {
        &self.pages
    }
}

/// The page's `MediaBox`, following inheritance up the page tree. Falls back
/// to US Letter.
fn media_box(document: &Document, page_id: ObjectId) -> [f64; 4] {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        let Ok(dict) = document.get_dictionary(id) else {
            break;
        };
        if let Ok(Object::Array(values)) = dict
            .get(b"MediaBox")
            .and_then(|obj| document.dereference(obj).map(|(_, obj)| obj))
            && values.len() == 4
        {
            let mut rect = [0.0; 4];
            let mut valid = true;
            for (slot, value) in rect.iter_mut().zip(values) {
                match value.as_float() {
                    Ok(v) => *slot = f64::from(v),
                    Err(_) => valid = false,
                }
            }
            if valid {
                return rect;
            }
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
        if depth > 32 {
            break;
        }
    }
    [0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Stream, dictionary};
    use typst_library::layout::{Frame, FrameItem};

    use crate::assets::AssetStore;
    use crate::config::DocumentConfig;

    /// A bare document with `pages` US Letter pages, each showing one line of
    /// text in a font named `F1`.
    pub(crate) fn dummy_document(pages: usize) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for n in 0..pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("body {n}"))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn snapshots_follow_page_order() {
        let laid_out = LaidOut::from_document(dummy_document(3));
        assert_eq!(laid_out.page_count(), 3);
        let indices: Vec<usize> = laid_out.pages().iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn media_box_is_inherited() {
        let laid_out = LaidOut::from_document(dummy_document(1));
        let page = laid_out.pages()[0];
        assert_eq!(page.media_box, [0.0, 0.0, 612.0, 792.0]);
        assert_eq!(page.width(), PAGE_WIDTH);
        assert_eq!(page.height(), PAGE_HEIGHT);
    }

    #[test]
    fn content_area() {
        assert_eq!(CONTENT_WIDTH, 504.0);
        assert_eq!(CONTENT_HEIGHT, 594.0);
    }

    fn frame_text(frame: &Frame, out: &mut String) {
        for (_, item) in frame.items() {
            match item {
                FrameItem::Group(group) => frame_text(&group.frame, out),
                FrameItem::Text(text) => out.push_str(&text.text),
                _ => {}
            }
        }
    }

    #[test]
    fn signature_anchors_are_laid_out_as_text() {
        let config = DocumentConfig {
            include_signature_page: true,
            ..DocumentConfig::default()
        };
        let mut assets = AssetStore::new(None);
        let body = vec![Block::paragraph(vec![TextRun::plain("Terms.")])];
        let blocks = crate::matter::compose(body, &config, &mut assets);

        let paginator = Paginator::new(blocks, &config.styles, None, None);
        let document = paginator.compile(paginator.source()).unwrap();
        assert_eq!(document.pages.len(), 2);

        let mut text = String::new();
        frame_text(&document.pages[1].frame, &mut text);
        for token in [
            "/ds_davinci_name/",
            "/ds_davinci_signature/",
            "/ds_recipient_title/",
            "/ds_recipient_date/",
        ] {
            assert!(text.contains(token), "{token} missing from laid-out text");
        }

        let mut first = String::new();
        frame_text(&document.pages[0].frame, &mut first);
        assert!(!first.contains("/ds_"));
    }

    #[test]
    fn degraded_blocks_keep_their_text() {
        let table = Block::Table {
            rows: vec![vec![crate::block::Cell::Text("x".into())]],
        };
        assert_eq!(
            degrade(&table),
            Some(Block::paragraph(vec![TextRun::plain("x")]))
        );
        assert_eq!(
            degrade(&Block::Paragraph {
                runs: vec![],
                style: crate::style::StyleId::Body
            }),
            None
        );
    }
}
