use crate::style::StyleId;

/// A contiguous piece of text with uniform inline formatting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub link: Option<String>,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
            ..Self::default()
        }
    }

    /// True when the run carries no formatting at all.
    pub fn is_unformatted(&self) -> bool {
        !self.bold && !self.italic && !self.code && self.link.is_none()
    }

    pub(crate) fn same_format(&self, other: &TextRun) -> bool {
        self.bold == other.bold
            && self.italic == other.italic
            && self.code == other.code
            && self.link == other.link
    }
}

/// Concatenate the text of a run list, dropping all formatting.
pub fn strip_markup(runs: &[TextRun]) -> String {
    runs.iter().map(|run| run.text.as_str()).collect()
}

/// Marker drawn in front of a list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMarker {
    Bullet,
    Ordered(u32),
    /// A later paragraph of an item that already has a marker.
    Continuation,
}

impl ListMarker {
    pub fn label(&self) -> String {
        match self {
            ListMarker::Bullet => "\u{2022}".to_string(),
            ListMarker::Ordered(n) => format!("{n}."),
            ListMarker::Continuation => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Styled(Vec<TextRun>),
}

impl Cell {
    pub fn plain_text(&self) -> String {
        match self {
            Cell::Text(text) => text.clone(),
            Cell::Styled(runs) => strip_markup(runs),
        }
    }
}

/// Where an image's bytes live once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Name of a file inside the conversion's scratch asset directory.
    Embedded(String),
}

/// Role of a party on the signature page; part of the anchor token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureRole {
    Company,
    Client,
}

impl SignatureRole {
    pub fn anchor_name(&self) -> &'static str {
        match self {
            SignatureRole::Company => "davinci",
            SignatureRole::Client => "recipient",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureField {
    Name,
    Title,
    Signature,
    Date,
}

impl SignatureField {
    pub const ALL: [SignatureField; 4] = [
        SignatureField::Name,
        SignatureField::Title,
        SignatureField::Signature,
        SignatureField::Date,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SignatureField::Name => "Name",
            SignatureField::Title => "Title",
            SignatureField::Signature => "Signature",
            SignatureField::Date => "Date",
        }
    }

    fn anchor_name(&self) -> &'static str {
        match self {
            SignatureField::Name => "name",
            SignatureField::Title => "title",
            SignatureField::Signature => "signature",
            SignatureField::Date => "date",
        }
    }
}

/// Literal token an e-signature service searches for to place its fields.
pub fn anchor_token(role: SignatureRole, field: SignatureField) -> String {
    format!("/ds_{}_{}/", role.anchor_name(), field.anchor_name())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParty {
    pub heading: String,
    pub role: SignatureRole,
}

/// Block-level layout elements, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading {
        level: u8,
        runs: Vec<TextRun>,
    },
    Paragraph {
        runs: Vec<TextRun>,
        style: StyleId,
    },
    ListItem {
        runs: Vec<TextRun>,
        depth: usize,
        marker: ListMarker,
    },
    Table {
        rows: Vec<Vec<Cell>>,
    },
    CodeBlock {
        raw_text: String,
    },
    Rule,
    Image {
        source: ImageSource,
        width: Option<f64>,
        height: Option<f64>,
        alt_text: String,
        centered: bool,
    },
    /// Fixed vertical space in points.
    Spacer {
        height: f64,
    },
    PageBreak,
    SignatureGrid {
        parties: [SignatureParty; 2],
        anchors: bool,
    },
}

impl Block {
    pub fn paragraph(runs: Vec<TextRun>) -> Self {
        Block::Paragraph {
            runs,
            style: StyleId::Body,
        }
    }

    /// Plain text of the block, used when a block has to be degraded.
    pub fn plain_text(&self) -> String {
        match self {
            Block::Heading { runs, .. }
            | Block::Paragraph { runs, .. }
            | Block::ListItem { runs, .. } => strip_markup(runs),
            Block::Table { rows } => rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(Cell::plain_text)
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Block::CodeBlock { raw_text } => raw_text.clone(),
            Block::Image { alt_text, .. } => alt_text.clone(),
            Block::SignatureGrid { parties, .. } => parties
                .iter()
                .map(|party| party.heading.clone())
                .collect::<Vec<_>>()
                .join(" "),
            Block::Rule | Block::Spacer { .. } | Block::PageBreak => String::new(),
        }
    }
}
