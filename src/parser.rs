use log::{debug, warn};

use crate::assets::{AssetStore, StoredImage};
use crate::block::{Block, ImageSource, ListMarker, TextRun, strip_markup};
use crate::html::{self, HtmlEvent, Tag};
use crate::layout::{CONTENT_HEIGHT, CONTENT_WIDTH};
use crate::metadata::MetadataSpacing;
use crate::runs::{Markup, RunAccumulator};
use crate::style::StyleId;
use crate::table::TableAssembler;

const PAGE_BREAK_MARKER: &str = "---pagebreak---";
/// CSS pixels to points.
const PX_TO_PT: f64 = 0.75;

/// Parse an HTML document into layout blocks, in document order.
pub fn parse(html: &str, assets: &mut AssetStore) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut state = ParseState::default();

    for event in html::tokenize(html) {
        process_event(event, &mut state, assets, &mut blocks);
    }
    finish(&mut state, &mut blocks);

    debug!("parsed {} blocks", blocks.len());
    blocks
}

#[derive(Default)]
struct ParseState {
    // Inline content of the block being read
    runs: RunAccumulator,
    // What the pending runs become when flushed
    context: Context,

    // One entry per open <ul>/<ol>
    lists: Vec<ListContainer>,

    table: TableAssembler,

    // Preformatted text is kept verbatim
    in_pre: bool,
    pre_text: String,

    blockquote_depth: usize,

    metadata: MetadataSpacing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Context {
    #[default]
    Paragraph,
    Heading(u8),
    ListItem,
}

struct ListContainer {
    ordered: bool,
    counter: u32,
    item_open: bool,
    // Whether the open item already emitted its marker
    item_marked: bool,
}

impl ParseState {
    /// Context for text that is not inside a heading.
    fn base_context(&self) -> Context {
        match self.lists.last() {
            Some(list) if list.item_open => Context::ListItem,
            _ => Context::Paragraph,
        }
    }

    fn emit(&mut self, block: Block, blocks: &mut Vec<Block>) {
        self.metadata.push(block, blocks);
    }

    /// Turn pending inline text into a block according to the context.
    fn flush(&mut self, blocks: &mut Vec<Block>) {
        if self.runs.is_blank() {
            self.runs.flush();
            return;
        }
        let runs = self.runs.flush();
        let block = match self.context {
            Context::Heading(level) => Block::Heading { level, runs },
            Context::ListItem => self.list_item(runs),
            Context::Paragraph => self.paragraph(runs),
        };
        self.emit(block, blocks);
    }

    fn list_item(&mut self, runs: Vec<TextRun>) -> Block {
        let depth = self.lists.len().max(1);
        let marker = match self.lists.last_mut() {
            Some(list) if list.item_marked => ListMarker::Continuation,
            Some(list) => {
                list.item_marked = true;
                if list.ordered {
                    ListMarker::Ordered(list.counter)
                } else {
                    ListMarker::Bullet
                }
            }
            None => ListMarker::Bullet,
        };
        Block::ListItem {
            runs,
            depth,
            marker,
        }
    }

    fn paragraph(&self, runs: Vec<TextRun>) -> Block {
        if strip_markup(&runs).trim() == PAGE_BREAK_MARKER {
            return Block::PageBreak;
        }
        let style = if self.blockquote_depth > 0 {
            StyleId::Blockquote
        } else {
            StyleId::Body
        };
        Block::Paragraph { runs, style }
    }
}

fn process_event(
    event: HtmlEvent,
    state: &mut ParseState,
    assets: &mut AssetStore,
    blocks: &mut Vec<Block>,
) {
    match event {
        HtmlEvent::Start { tag, attrs } => match tag {
            // Headings
            Tag::H(level) => {
                state.flush(blocks);
                state.context = Context::Heading(level.clamp(1, 3));
            }

            // Paragraphs; inside a cell the text belongs to the cell
            Tag::P => {
                if !state.table.in_cell() {
                    state.flush(blocks);
                    state.context = state.base_context();
                }
            }

            // Lists
            Tag::Ul | Tag::Ol => {
                state.flush(blocks);
                state.lists.push(ListContainer {
                    ordered: tag == Tag::Ol,
                    counter: 0,
                    item_open: false,
                    item_marked: false,
                });
            }
            Tag::Li => {
                state.flush(blocks);
                if let Some(list) = state.lists.last_mut() {
                    if list.ordered {
                        list.counter += 1;
                    }
                    list.item_open = true;
                    list.item_marked = false;
                }
                state.context = Context::ListItem;
            }

            // Inline markup
            Tag::Strong => state.runs.open(Markup::Bold),
            Tag::Em => state.runs.open(Markup::Italic),
            Tag::Code => {
                if !state.in_pre {
                    state.runs.open(Markup::Code);
                }
            }
            Tag::A => {
                let href = HtmlEvent::attr(&attrs, "href").unwrap_or_default();
                state.runs.open(Markup::Link(href.to_string()));
            }
            Tag::Br => {
                if state.in_pre {
                    state.pre_text.push('\n');
                } else {
                    state.runs.line_break();
                }
            }

            Tag::Hr => {
                state.flush(blocks);
                state.emit(Block::Rule, blocks);
            }

            // Tables
            Tag::Table => {
                state.flush(blocks);
                state.table.start_table();
            }
            Tag::Tr => state.table.start_row(),
            Tag::Th | Tag::Td => {
                state.runs.flush();
                state.table.start_cell();
            }
            Tag::Thead | Tag::Tbody => {}

            Tag::Blockquote => {
                state.flush(blocks);
                state.blockquote_depth += 1;
            }

            Tag::Pre => {
                state.flush(blocks);
                state.in_pre = true;
                state.pre_text.clear();
            }

            Tag::Img if state.table.in_cell() => {
                // Cells hold text only
                let alt_text = HtmlEvent::attr(&attrs, "alt").unwrap_or_default();
                if !state.runs.is_blank() {
                    state.runs.append_text(" ");
                }
                state.runs.append_text(&placeholder_text(alt_text).replace('&', "&amp;"));
            }
            Tag::Img => {
                let centered = state.runs.is_blank() && state.base_context() == Context::Paragraph;
                state.flush(blocks);
                let block = image_block(&attrs, centered, assets);
                state.emit(block, blocks);
            }

            // Unknown tags are structurally ignored; their text is still read
            Tag::Other(_) => {}
        },

        HtmlEvent::End(tag) => match tag {
            Tag::H(_) => {
                state.flush(blocks);
                state.context = state.base_context();
            }
            Tag::P => {
                if !state.table.in_cell() {
                    state.flush(blocks);
                    state.context = state.base_context();
                }
            }
            Tag::Li => {
                state.flush(blocks);
                if let Some(list) = state.lists.last_mut() {
                    list.item_open = false;
                }
                state.context = state.base_context();
            }
            Tag::Ul | Tag::Ol => {
                state.flush(blocks);
                state.lists.pop();
                state.context = state.base_context();
            }

            Tag::Strong => state.runs.close(&Markup::Bold),
            Tag::Em => state.runs.close(&Markup::Italic),
            Tag::Code => {
                if !state.in_pre {
                    state.runs.close(&Markup::Code);
                }
            }
            Tag::A => state.runs.close(&Markup::Link(String::new())),

            Tag::Th | Tag::Td => {
                if state.table.in_cell() {
                    let runs = state.runs.flush();
                    state.table.end_cell(runs);
                }
            }
            Tag::Tr => state.table.end_row(),
            Tag::Table => {
                state.runs.flush();
                if let Some(table) = state.table.end_table() {
                    state.emit(table, blocks);
                }
            }

            Tag::Blockquote => {
                state.flush(blocks);
                state.blockquote_depth = state.blockquote_depth.saturating_sub(1);
            }

            Tag::Pre => end_pre(state, blocks),

            Tag::Br | Tag::Hr | Tag::Img | Tag::Thead | Tag::Tbody | Tag::Other(_) => {}
        },

        HtmlEvent::Data(text) => {
            if state.in_pre {
                state.pre_text.push_str(&text);
            } else if state.table.in_table() && !state.table.in_cell() {
                // Whitespace between table structure tags
            } else {
                state.runs.append_text(&text);
            }
        }
    }
}

fn end_pre(state: &mut ParseState, blocks: &mut Vec<Block>) {
    if !state.in_pre {
        return;
    }
    state.in_pre = false;
    let raw_text = html::decode_entities(&state.pre_text).into_owned();
    state.pre_text.clear();
    state.emit(Block::CodeBlock { raw_text }, blocks);
}

/// Close whatever the document left open.
fn finish(state: &mut ParseState, blocks: &mut Vec<Block>) {
    end_pre(state, blocks);
    if state.table.in_table() {
        if state.table.in_cell() {
            let runs = state.runs.flush();
            state.table.end_cell(runs);
        }
        if let Some(table) = state.table.end_table() {
            state.emit(table, blocks);
        }
    }
    state.flush(blocks);
}

fn image_block(attrs: &[(String, String)], centered: bool, assets: &mut AssetStore) -> Block {
    let alt_text = HtmlEvent::attr(attrs, "alt").unwrap_or_default().to_string();
    let src = HtmlEvent::attr(attrs, "src").unwrap_or_default();

    match assets.resolve(src) {
        Ok(stored) => {
            let (width, height) = image_size(&stored, attrs);
            Block::Image {
                source: ImageSource::Embedded(stored.name),
                width: Some(width),
                height: Some(height),
                alt_text,
                centered,
            }
        }
        Err(e) => {
            warn!("image {src:?} replaced by its alt text: {e}");
            image_placeholder(&alt_text)
        }
    }
}

pub(crate) fn image_placeholder(alt_text: &str) -> Block {
    Block::Paragraph {
        runs: vec![TextRun::plain(placeholder_text(alt_text))],
        style: StyleId::Placeholder,
    }
}

fn placeholder_text(alt_text: &str) -> String {
    if alt_text.trim().is_empty() {
        "[Image]".to_string()
    } else {
        format!("[Image: {}]", alt_text.trim())
    }
}

/// Size in points: explicit attributes win, missing ones keep the aspect
/// ratio, and the result is scaled down to fit the content area.
fn image_size(stored: &StoredImage, attrs: &[(String, String)]) -> (f64, f64) {
    let natural_w = f64::from(stored.width_px.max(1)) * PX_TO_PT;
    let natural_h = f64::from(stored.height_px.max(1)) * PX_TO_PT;
    let attr_w = length_attr(attrs, "width");
    let attr_h = length_attr(attrs, "height");

    let (w, h) = match (attr_w, attr_h) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w * natural_h / natural_w),
        (None, Some(h)) => (h * natural_w / natural_h, h),
        (None, None) => (natural_w, natural_h),
    };
    let scale = (CONTENT_WIDTH / w).min(CONTENT_HEIGHT / h).min(1.0);
    (w * scale, h * scale)
}

fn length_attr(attrs: &[(String, String)], name: &str) -> Option<f64> {
    let value = HtmlEvent::attr(attrs, name)?.trim();
    let value = value.strip_suffix("px").unwrap_or(value);
    value
        .parse::<f64>()
        .ok()
        .filter(|v| *v > 0.0)
        .map(|v| v * PX_TO_PT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Cell;

    fn parse_html(html: &str) -> Vec<Block> {
        let mut assets = AssetStore::new(None);
        parse(html, &mut assets)
    }

    fn item(text: &str, depth: usize, marker: ListMarker) -> Block {
        Block::ListItem {
            runs: vec![TextRun::plain(text)],
            depth,
            marker,
        }
    }

    #[test]
    fn heading_and_paragraph() {
        assert_eq!(
            parse_html("<h1>Title</h1>\n<p>Some text.</p>\n"),
            vec![
                Block::Heading {
                    level: 1,
                    runs: vec![TextRun::plain("Title")]
                },
                Block::paragraph(vec![TextRun::plain("Some text.")]),
            ]
        );
    }

    #[test]
    fn deep_headings_are_clamped() {
        match &parse_html("<h5>Deep</h5>")[0] {
            Block::Heading { level, .. } => assert_eq!(*level, 3),
            other => panic!("expected heading, got {other:?}"),
        }
    }

    #[test]
    fn bullet_list() {
        assert_eq!(
            parse_html("<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n"),
            vec![
                item("a", 1, ListMarker::Bullet),
                item("b", 1, ListMarker::Bullet)
            ]
        );
    }

    #[test]
    fn ordered_counters_reset_per_container() {
        let blocks = parse_html(
            "<ol><li>one</li><li>two<ol><li>inner</li></ol></li><li>three</li></ol><ol><li>again</li></ol>",
        );
        assert_eq!(
            blocks,
            vec![
                item("one", 1, ListMarker::Ordered(1)),
                item("two", 1, ListMarker::Ordered(2)),
                item("inner", 2, ListMarker::Ordered(1)),
                item("three", 1, ListMarker::Ordered(3)),
                item("again", 1, ListMarker::Ordered(1)),
            ]
        );
    }

    #[test]
    fn loose_list_item_paragraphs() {
        let blocks = parse_html("<ul>\n<li>\n<p>first</p>\n<p>second</p>\n</li>\n</ul>\n");
        assert_eq!(
            blocks,
            vec![
                item("first", 1, ListMarker::Bullet),
                item("second", 1, ListMarker::Continuation)
            ]
        );
    }

    #[test]
    fn text_after_nested_list_continues_item() {
        let blocks = parse_html("<ul><li>a<ul><li>b</li></ul>tail</li></ul>");
        assert_eq!(
            blocks,
            vec![
                item("a", 1, ListMarker::Bullet),
                item("b", 2, ListMarker::Bullet),
                item("tail", 1, ListMarker::Continuation),
            ]
        );
    }

    #[test]
    fn unterminated_strong_does_not_leak() {
        let blocks = parse_html("<p><strong>bold</p><p>plain</p>");
        assert_eq!(
            blocks,
            vec![
                Block::paragraph(vec![TextRun::bold("bold")]),
                Block::paragraph(vec![TextRun::plain("plain")]),
            ]
        );
    }

    #[test]
    fn table_cells() {
        let html = "<table>\n<thead>\n<tr>\n<th>A</th>\n<th>B</th>\n</tr>\n</thead>\n<tbody>\n<tr>\n<td>1</td>\n<td><strong>2</strong></td>\n</tr>\n</tbody>\n</table>\n";
        assert_eq!(
            parse_html(html),
            vec![Block::Table {
                rows: vec![
                    vec![Cell::Text("A".into()), Cell::Text("B".into())],
                    vec![
                        Cell::Text("1".into()),
                        Cell::Styled(vec![TextRun::bold("2")])
                    ],
                ]
            }]
        );
    }

    #[test]
    fn images_in_cells_stay_in_the_table() {
        let html = "<table>\n<thead>\n<tr>\n<th>A</th>\n<th>B</th>\n</tr>\n</thead>\n<tbody>\n<tr>\n<td>see <img src=\"https://e.test/x.png\" alt=\"x &amp; y\" /></td>\n<td><img src=\"missing.png\" /></td>\n</tr>\n</tbody>\n</table>\n";
        assert_eq!(
            parse_html(html),
            vec![Block::Table {
                rows: vec![
                    vec![Cell::Text("A".into()), Cell::Text("B".into())],
                    vec![
                        Cell::Text("see [Image: x & y]".into()),
                        Cell::Text("[Image]".into())
                    ],
                ]
            }]
        );
    }

    #[test]
    fn leading_rule_keeps_following_content() {
        let mut assets = AssetStore::new(None);
        let html = crate::markdown::to_html("---\n\nIntro paragraph\n\n---\n\nBody\n");
        assert_eq!(
            parse(&html, &mut assets),
            vec![
                Block::Rule,
                Block::paragraph(vec![TextRun::plain("Intro paragraph")]),
                Block::Rule,
                Block::paragraph(vec![TextRun::plain("Body")]),
            ]
        );
    }

    #[test]
    fn pre_keeps_whitespace_and_decodes_once() {
        let blocks = parse_html("<pre><code>fn main() {\n    a &lt; b\n}\n</code></pre>\n");
        assert_eq!(
            blocks,
            vec![Block::CodeBlock {
                raw_text: "fn main() {\n    a < b\n}\n".to_string()
            }]
        );
    }

    #[test]
    fn page_break_marker() {
        let blocks = parse_html("<p>a</p><p>---pagebreak---</p><p>b</p>");
        assert_eq!(blocks[1], Block::PageBreak);
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn blockquote_paragraphs() {
        let blocks = parse_html("<blockquote>\n<p>quoted</p>\n</blockquote>\n<p>after</p>");
        assert_eq!(
            blocks,
            vec![
                Block::Paragraph {
                    runs: vec![TextRun::plain("quoted")],
                    style: StyleId::Blockquote
                },
                Block::paragraph(vec![TextRun::plain("after")]),
            ]
        );
    }

    #[test]
    fn unknown_tags_keep_text() {
        let blocks = parse_html("<div><span>inside</span></div>");
        assert_eq!(blocks, vec![Block::paragraph(vec![TextRun::plain("inside")])]);
    }

    #[test]
    fn remote_image_becomes_placeholder() {
        let blocks = parse_html(r#"<p><img src="https://example.com/a.png" alt="Chart" /></p>"#);
        assert_eq!(
            blocks,
            vec![Block::Paragraph {
                runs: vec![TextRun::plain("[Image: Chart]")],
                style: StyleId::Placeholder
            }]
        );
    }

    #[test]
    fn data_uri_image_is_embedded() {
        use base64::{Engine as _, engine::general_purpose};

        let src = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(crate::assets::tests::tiny_png())
        );
        let mut assets = AssetStore::new(None);
        let blocks = parse(&format!(r#"<p><img src="{src}" alt="dot" /></p>"#), &mut assets);
        match &blocks[..] {
            [
                Block::Image {
                    source: ImageSource::Embedded(name),
                    width: Some(w),
                    height: Some(h),
                    centered: true,
                    ..
                },
            ] => {
                assert_eq!(name, "asset-1.png");
                assert_eq!((*w, *h), (1.5, 0.75));
            }
            other => panic!("unexpected blocks {other:?}"),
        }
    }

    #[test]
    fn metadata_lines_get_spacing() {
        let blocks = parse_html(
            "<p><strong>Investment:</strong> $1</p><p><strong>Timeline:</strong> 2 weeks</p><h2>Overview</h2>",
        );
        assert_eq!(blocks.len(), 5);
        assert!(matches!(
            blocks[0],
            Block::Paragraph {
                style: StyleId::Metadata,
                ..
            }
        ));
        assert!(matches!(blocks[1], Block::Spacer { .. }));
        assert!(matches!(blocks[3], Block::Spacer { .. }));
        assert!(matches!(blocks[4], Block::Heading { .. }));
    }

    #[test]
    fn links_carry_their_target() {
        let blocks = parse_html(r#"<p>see <a href="https://x.test">docs</a></p>"#);
        match &blocks[0] {
            Block::Paragraph { runs, .. } => {
                assert_eq!(runs[1].link.as_deref(), Some("https://x.test"));
                assert_eq!(runs[1].text, "docs");
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_yields_no_blocks() {
        assert!(parse_html("").is_empty());
    }
}
