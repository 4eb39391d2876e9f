use std::fmt::Write as _;

use crate::block::{
    Block, Cell, ImageSource, SignatureField, SignatureParty, TextRun, anchor_token,
};
use crate::layout::{MARGIN_BOTTOM, MARGIN_SIDE, MARGIN_TOP};
use crate::style::{Align, ParagraphStyle, StyleId, StyleSheet};

/// Width of the marker column in front of list items, in points.
const MARKER_COLUMN: f64 = 18.0;
/// Tables with more rows than this may break across pages.
const UNBREAKABLE_TABLE_ROWS: usize = 15;
/// Code blocks with more lines than this may break across pages.
const UNBREAKABLE_CODE_LINES: usize = 30;

/// Helpers shared by every generated document.
const HELPERS: &str = r#"#let lp-styled(size: 11pt, fill: black, leading: 4pt, above: 0pt, below: 0pt, justify: false, weight: "regular", style: "normal", indent: 0pt, halign: left, body) = block(above: above, below: below, inset: (left: indent))[
  #set text(size: size, fill: fill, weight: weight, style: style)
  #set par(justify: justify, leading: leading)
  #align(halign, body)
]
#let lp-item(size: 11pt, fill: black, leading: 4pt, above: 0pt, below: 0pt, justify: false, weight: "regular", style: "normal", indent: 0pt, marker: [], body) = block(above: above, below: below, inset: (left: indent))[
  #set text(size: size, fill: fill, weight: weight, style: style)
  #set par(justify: justify, leading: leading)
  #grid(columns: (18pt, 1fr), marker, body)
]
#let lp-field(label, anchor, height) = block(above: height, below: 0pt, width: 100%)[
  #if anchor != none { text(size: 1pt, fill: white, anchor) }
  #line(length: 100%, stroke: 0.5pt)
  #v(2pt)
  #text(size: 9pt, label)
]
"#;

/// Page setup, default text settings and helper definitions.
pub fn preamble(styles: &StyleSheet, title: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(title) = title {
        out.push_str("#set document(title: ");
        push_string_literal(title, &mut out);
        out.push_str(")\n");
    }
    let _ = writeln!(
        out,
        "#set page(paper: \"us-letter\", margin: (top: {}, bottom: {}, left: {}, right: {}))",
        pt(MARGIN_TOP),
        pt(MARGIN_BOTTOM),
        pt(MARGIN_SIDE),
        pt(MARGIN_SIDE)
    );

    let body = styles.get(StyleId::Body);
    let _ = writeln!(
        out,
        "#set text(size: {}, fill: rgb(\"{}\"))",
        pt(body.font_size),
        body.color
    );
    let _ = writeln!(
        out,
        "#set par(justify: {}, leading: {}, spacing: {}, linebreaks: \"optimized\")",
        body.align == Align::Justify,
        pt(body.line_gap()),
        pt(body.space_before.max(body.space_after))
    );

    for level in 1..=3u8 {
        let style = styles.get(StyleId::heading(level));
        let _ = writeln!(
            out,
            "#show heading.where(level: {level}): set text(size: {}, fill: rgb(\"{}\"), weight: \"{}\", style: \"{}\")",
            pt(style.font_size),
            style.color,
            weight(style),
            font_style(style)
        );
        let _ = writeln!(
            out,
            "#show heading.where(level: {level}): set block(above: {}, below: {})",
            pt(style.space_before),
            pt(style.space_after)
        );
    }

    out.push_str(HELPERS);
    out.push('\n');
    out
}

/// Convert blocks to Typst markup
pub fn blocks_to_typst(blocks: &[Block], styles: &StyleSheet, title: Option<&str>) -> String {
    let mut out = preamble(styles, title);
    emit_body(blocks, styles, &mut out);
    out
}

/// Markup for the blocks alone, without the preamble.
pub fn emit_body(blocks: &[Block], styles: &StyleSheet, out: &mut String) {
    let mut i = 0;
    while i < blocks.len() {
        let block = &blocks[i];

        match block {
            Block::Heading { .. } => {
                // Keep heading with following content using a block that prevents breaks
                out.push_str("#block(breakable: false)[\n");
                emit_block(block, styles, out);

                // Include the next block if it exists (to keep heading with first content)
                if let Some(next) = blocks.get(i + 1)
                    && keeps_with_heading(next)
                {
                    i += 1;
                    emit_block(next, styles, out);
                }
                out.push_str("]\n\n");
            }
            _ => {
                emit_block(block, styles, out);
            }
        }

        i += 1;
    }
}

fn keeps_with_heading(next: &Block) -> bool {
    match next {
        Block::PageBreak | Block::Spacer { .. } | Block::Heading { .. } => false,
        Block::Table { rows } => rows.len() <= UNBREAKABLE_TABLE_ROWS,
        Block::CodeBlock { raw_text } => raw_text.lines().count() <= UNBREAKABLE_CODE_LINES,
        _ => true,
    }
}

pub fn emit_block(block: &Block, styles: &StyleSheet, out: &mut String) {
    match block {
        Block::Heading { level, runs } => {
            let _ = write!(out, "#heading(level: {level})[");
            runs_to_typst(runs, out);
            out.push_str("]\n\n");
        }
        Block::Paragraph {
            runs,
            style: StyleId::Body,
        } => {
            runs_to_typst(runs, out);
            out.push_str("\n\n");
        }
        Block::Paragraph { runs, style } => {
            let style = styles.get(*style);
            let _ = write!(
                out,
                "#lp-styled({}, indent: {}, halign: {})[",
                style_args(style),
                pt(style.left_indent),
                halign(style.align)
            );
            runs_to_typst(runs, out);
            out.push_str("]\n\n");
        }
        Block::ListItem {
            runs,
            depth,
            marker,
        } => {
            let style = styles.get(StyleId::ListItem);
            let indent = (style.left_indent * *depth as f64 - MARKER_COLUMN).max(0.0);
            let _ = write!(
                out,
                "#lp-item({}, indent: {}, marker: [",
                style_args(style),
                pt(indent)
            );
            escape_text(&marker.label(), out);
            out.push_str("])[");
            runs_to_typst(runs, out);
            out.push_str("]\n\n");
        }
        Block::Table { rows } => table_to_typst(rows, styles.get(StyleId::TableCell), out),
        Block::CodeBlock { raw_text } => code_to_typst(raw_text, styles.get(StyleId::Code), out),
        Block::Rule => {
            out.push_str("#line(length: 100%)\n\n");
        }
        Block::Image {
            source: ImageSource::Embedded(name),
            width,
            height,
            alt_text,
            centered,
        } => {
            out.push_str("#block(above: 6pt, below: 6pt)[#align(");
            out.push_str(if *centered { "center" } else { "left" });
            out.push_str(", image(");
            push_string_literal(&format!("/{name}"), out);
            if let Some(width) = width {
                let _ = write!(out, ", width: {}", pt(*width));
            }
            if let Some(height) = height {
                let _ = write!(out, ", height: {}", pt(*height));
            }
            if !alt_text.is_empty() {
                out.push_str(", alt: ");
                push_string_literal(alt_text, out);
            }
            out.push_str("))]\n\n");
        }
        Block::Spacer { height } => {
            let _ = write!(out, "#v({})\n\n", pt(*height));
        }
        Block::PageBreak => {
            out.push_str("#pagebreak(weak: true)\n\n");
        }
        Block::SignatureGrid { parties, anchors } => signature_to_typst(parties, *anchors, out),
    }
}

fn style_args(style: &ParagraphStyle) -> String {
    format!(
        "size: {}, fill: rgb(\"{}\"), leading: {}, above: {}, below: {}, justify: {}, weight: \"{}\", style: \"{}\"",
        pt(style.font_size),
        style.color,
        pt(style.line_gap()),
        pt(style.space_before),
        pt(style.space_after),
        style.align == Align::Justify,
        weight(style),
        font_style(style)
    )
}

fn weight(style: &ParagraphStyle) -> &'static str {
    if style.bold { "bold" } else { "regular" }
}

fn font_style(style: &ParagraphStyle) -> &'static str {
    if style.italic { "italic" } else { "normal" }
}

fn halign(align: Align) -> &'static str {
    match align {
        Align::Left | Align::Justify => "left",
        Align::Center => "center",
        Align::Right => "right",
    }
}

fn pt(value: f64) -> String {
    format!("{}pt", (value * 100.0).round() / 100.0)
}

pub fn runs_to_typst(runs: &[TextRun], out: &mut String) {
    for run in runs {
        run_to_typst(run, out);
    }
}

fn run_to_typst(run: &TextRun, out: &mut String) {
    let mut closers = 0;
    if let Some(url) = run.link.as_deref().filter(|url| !url.is_empty()) {
        out.push_str("#link(");
        push_string_literal(url, out);
        out.push_str(")[");
        closers += 1;
    }
    if run.bold {
        out.push_str("#strong[");
        closers += 1;
    }
    if run.italic {
        out.push_str("#emph[");
        closers += 1;
    }

    if run.code {
        // Line breaks inside inline code become plain spaces
        out.push_str("#raw(");
        push_string_literal(&run.text.replace('\n', " "), out);
        out.push(')');
    } else {
        escape_text(&run.text, out);
    }

    for _ in 0..closers {
        out.push(']');
    }
}

/// Escape markup characters so text is taken literally.
pub fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '\\' | '#' | '*' | '_' | '`' | '$' | '<' | '>' | '@' | '[' | ']' | '~' | '/' | '='
            | '-' | '+' | '.' | '(' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str(" \\\n"),
            _ => out.push(ch),
        }
    }
}

/// Write `value` as a Typst string literal.
fn push_string_literal(value: &str, out: &mut String) {
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

fn table_to_typst(rows: &[Vec<Cell>], style: &ParagraphStyle, out: &mut String) {
    let Some(header) = rows.first() else {
        return;
    };
    let col_count = header.len();
    if col_count == 0 {
        return;
    }

    let breakable = rows.len() > UNBREAKABLE_TABLE_ROWS;
    let _ = writeln!(
        out,
        "#block(breakable: {breakable}, above: 8pt, below: 8pt)["
    );
    let _ = writeln!(
        out,
        "#set text(size: {}, fill: rgb(\"{}\"))",
        pt(style.font_size),
        style.color
    );
    let _ = writeln!(
        out,
        "#set par(justify: false, leading: {})",
        pt(style.line_gap())
    );
    out.push_str("#table(\n");
    let _ = writeln!(out, "  columns: {},", col_count);
    out.push_str("  inset: 5pt,\n");
    out.push_str("  stroke: 0.5pt + rgb(\"#BBBBBB\"),\n");

    // Header cells (bold)
    out.push_str("  table.header(");
    for (index, cell) in header.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        out.push_str("[#strong[");
        cell_to_typst(cell, out);
        out.push_str("]]");
    }
    out.push_str("),\n");

    // Data rows
    for row in &rows[1..] {
        for cell in row {
            out.push_str("  [");
            cell_to_typst(cell, out);
            out.push_str("],\n");
        }
    }

    out.push_str(")\n]\n\n");
}

fn cell_to_typst(cell: &Cell, out: &mut String) {
    match cell {
        Cell::Text(text) => escape_text(text, out),
        Cell::Styled(runs) => runs_to_typst(runs, out),
    }
}

fn code_to_typst(raw_text: &str, style: &ParagraphStyle, out: &mut String) {
    let text = raw_text.strip_suffix('\n').unwrap_or(raw_text);
    let breakable = text.lines().count() > UNBREAKABLE_CODE_LINES;
    let _ = write!(
        out,
        "#block(breakable: {breakable}, width: 100%, fill: rgb(\"#F5F5F5\"), inset: 8pt, radius: 2pt, above: {}, below: {})[",
        pt(style.space_before),
        pt(style.space_after)
    );
    let _ = write!(
        out,
        "#set text(size: {}, fill: rgb(\"{}\")); #set par(justify: false, leading: {}); #raw(block: true, ",
        pt(style.font_size),
        style.color,
        pt(style.line_gap())
    );
    push_string_literal(text, out);
    out.push_str(")]\n\n");
}

fn signature_to_typst(parties: &[SignatureParty; 2], anchors: bool, out: &mut String) {
    out.push_str("#block(breakable: false, above: 12pt)[\n");
    out.push_str("#grid(columns: (1fr, 1fr), column-gutter: 36pt,\n");
    for party in parties {
        out.push_str("  [\n");
        out.push_str("    #text(size: 12pt, weight: \"bold\")[");
        escape_text(&party.heading, out);
        out.push_str("]\n");
        for field in SignatureField::ALL {
            let height = if field == SignatureField::Signature {
                "40pt"
            } else {
                "24pt"
            };
            out.push_str("    #lp-field(");
            push_string_literal(field.label(), out);
            out.push_str(", ");
            if anchors {
                push_string_literal(&anchor_token(party.role, field), out);
            } else {
                out.push_str("none");
            }
            let _ = writeln!(out, ", {height})");
        }
        out.push_str("  ],\n");
    }
    out.push_str(")\n]\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ListMarker, SignatureRole};

    fn body(blocks: &[Block]) -> String {
        let mut out = String::new();
        emit_body(blocks, &StyleSheet::default(), &mut out);
        out
    }

    fn para(text: &str) -> Block {
        Block::paragraph(vec![TextRun::plain(text)])
    }

    #[test]
    fn heading() {
        let blocks = vec![Block::Heading {
            level: 1,
            runs: vec![TextRun::plain("Hello")],
        }];
        assert_eq!(
            body(&blocks),
            "#block(breakable: false)[\n#heading(level: 1)[Hello]\n\n]\n\n"
        );
    }

    #[test]
    fn heading_with_following_content() {
        // Heading should be grouped with following paragraph
        let blocks = vec![
            Block::Heading {
                level: 2,
                runs: vec![TextRun::plain("Title")],
            },
            para("Some text"),
        ];
        assert_eq!(
            body(&blocks),
            "#block(breakable: false)[\n#heading(level: 2)[Title]\n\nSome text\n\n]\n\n"
        );
    }

    #[test]
    fn heading_is_not_grouped_with_page_break() {
        let blocks = vec![
            Block::Heading {
                level: 1,
                runs: vec![TextRun::plain("End")],
            },
            Block::PageBreak,
        ];
        assert!(body(&blocks).ends_with("]\n\n#pagebreak(weak: true)\n\n"));
    }

    #[test]
    fn paragraph() {
        assert_eq!(body(&[para("Hello world")]), "Hello world\n\n");
    }

    #[test]
    fn bold_and_italic() {
        let runs = vec![
            TextRun::bold("bold"),
            TextRun::plain(" and "),
            TextRun {
                text: "both".into(),
                bold: true,
                italic: true,
                ..TextRun::default()
            },
        ];
        assert_eq!(
            body(&[Block::paragraph(runs)]),
            "#strong[bold] and #strong[#emph[both]]\n\n"
        );
    }

    #[test]
    fn inline_code_and_links() {
        let runs = vec![
            TextRun {
                text: "let \"x\"".into(),
                code: true,
                ..TextRun::default()
            },
            TextRun {
                text: "docs".into(),
                link: Some("https://x.test".into()),
                ..TextRun::default()
            },
        ];
        assert_eq!(
            body(&[Block::paragraph(runs)]),
            "#raw(\"let \\\"x\\\"\")#link(\"https://x.test\")[docs]\n\n"
        );
    }

    #[test]
    fn hard_break() {
        assert_eq!(body(&[para("line one\nline two")]), "line one \\\nline two\n\n");
    }

    #[test]
    fn escapes_special_chars() {
        assert_eq!(body(&[para("a * b")]), "a \\* b\n\n");
        assert_eq!(body(&[para("a # b")]), "a \\# b\n\n");
        assert_eq!(body(&[para("a_b")]), "a\\_b\n\n");
        assert_eq!(body(&[para("1. x -- y")]), "1\\. x \\-\\- y\n\n");
    }

    #[test]
    fn list_markers() {
        let blocks = vec![
            Block::ListItem {
                runs: vec![TextRun::plain("one")],
                depth: 1,
                marker: ListMarker::Ordered(1),
            },
            Block::ListItem {
                runs: vec![TextRun::plain("inner")],
                depth: 2,
                marker: ListMarker::Bullet,
            },
        ];
        let out = body(&blocks);
        assert!(out.contains("indent: 6pt, marker: [1\\.])[one]"));
        assert!(out.contains("indent: 30pt, marker: [•])[inner]"));
    }

    #[test]
    fn table() {
        let rows = vec![
            vec![Cell::Text("A".into()), Cell::Text("B".into())],
            vec![Cell::Text("1".into()), Cell::Text("2".into())],
        ];
        let out = body(&[Block::Table { rows }]);
        assert!(out.starts_with("#block(breakable: false, above: 8pt, below: 8pt)[\n"));
        assert!(out.contains("  columns: 2,\n"));
        assert!(out.contains("  table.header([#strong[A]], [#strong[B]]),\n  [1],\n  [2],\n)\n]\n\n"));
    }

    #[test]
    fn code_block() {
        let out = body(&[Block::CodeBlock {
            raw_text: "let x = 1;\n".into(),
        }]);
        assert!(out.contains("#raw(block: true, \"let x = 1;\")]\n\n"));
    }

    #[test]
    fn horizontal_rule_spacer_and_page_break() {
        assert_eq!(
            body(&[Block::Rule, Block::Spacer { height: 12.0 }, Block::PageBreak]),
            "#line(length: 100%)\n\n#v(12pt)\n\n#pagebreak(weak: true)\n\n"
        );
    }

    #[test]
    fn styled_paragraph() {
        let out = body(&[Block::Paragraph {
            runs: vec![TextRun::plain("Proposal")],
            style: StyleId::Title,
        }]);
        assert!(out.starts_with("#lp-styled(size: 28pt, fill: rgb(\"#0B98CE\"),"));
        assert!(out.ends_with("weight: \"bold\", style: \"normal\", indent: 0pt, halign: center)[Proposal]\n\n"));
    }

    #[test]
    fn image() {
        let out = body(&[Block::Image {
            source: ImageSource::Embedded("asset-1.png".into()),
            width: Some(72.0),
            height: Some(36.0),
            alt_text: "Logo".into(),
            centered: true,
        }]);
        assert_eq!(
            out,
            "#block(above: 6pt, below: 6pt)[#align(center, image(\"/asset-1.png\", width: 72pt, height: 36pt, alt: \"Logo\"))]\n\n"
        );
    }

    #[test]
    fn signature_grid_anchors() {
        let parties = [
            SignatureParty {
                heading: "Acme".into(),
                role: SignatureRole::Company,
            },
            SignatureParty {
                heading: "Client".into(),
                role: SignatureRole::Client,
            },
        ];
        let out = body(&[Block::SignatureGrid {
            parties: parties.clone(),
            anchors: true,
        }]);
        for token in [
            "/ds_davinci_name/",
            "/ds_davinci_title/",
            "/ds_davinci_signature/",
            "/ds_davinci_date/",
            "/ds_recipient_name/",
            "/ds_recipient_signature/",
        ] {
            assert!(out.contains(&format!("\"{token}\"")), "missing {token}");
        }

        let out = body(&[Block::SignatureGrid {
            parties,
            anchors: false,
        }]);
        assert!(!out.contains("/ds_"));
        assert!(out.contains("#lp-field(\"Name\", none, 24pt)"));
    }

    #[test]
    fn preamble_sets_page_and_headings() {
        let out = preamble(&StyleSheet::default(), Some("Proposal"));
        assert!(out.starts_with("#set document(title: \"Proposal\")\n"));
        assert!(out.contains(
            "#set page(paper: \"us-letter\", margin: (top: 108pt, bottom: 90pt, left: 54pt, right: 54pt))"
        ));
        assert!(out.contains("#set par(justify: true, leading: 4pt, spacing: 6pt, linebreaks: \"optimized\")"));
        assert!(out.contains(
            "#show heading.where(level: 1): set text(size: 18pt, fill: rgb(\"#0B98CE\"), weight: \"bold\", style: \"normal\")"
        ));
    }
}
