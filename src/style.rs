use std::collections::HashMap;

use serde::Deserialize;

/// Closed set of paragraph styles a block can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleId {
    Body,
    Metadata,
    Blockquote,
    Title,
    TitleDetail,
    Placeholder,
    #[serde(rename = "h1")]
    Heading1,
    #[serde(rename = "h2")]
    Heading2,
    #[serde(rename = "h3")]
    Heading3,
    ListItem,
    Code,
    TableCell,
}

impl StyleId {
    pub fn heading(level: u8) -> Self {
        match level {
            1 => StyleId::Heading1,
            2 => StyleId::Heading2,
            _ => StyleId::Heading3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
    Justify,
}

/// Typographic parameters for one style. Sizes and distances are in points.
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphStyle {
    pub font_size: f64,
    pub leading: f64,
    /// `#RRGGBB`
    pub color: String,
    pub space_before: f64,
    pub space_after: f64,
    pub align: Align,
    pub left_indent: f64,
    pub bold: bool,
    pub italic: bool,
}

impl ParagraphStyle {
    fn body() -> Self {
        Self {
            font_size: 11.0,
            leading: 15.0,
            color: "#494949".to_string(),
            space_before: 2.0,
            space_after: 6.0,
            align: Align::Justify,
            left_indent: 0.0,
            bold: false,
            italic: false,
        }
    }

    fn heading(font_size: f64, color: &str, space_before: f64, space_after: f64) -> Self {
        Self {
            font_size,
            leading: font_size * 1.25,
            color: color.to_string(),
            space_before,
            space_after,
            align: Align::Left,
            bold: true,
            ..Self::body()
        }
    }

    /// Gap between lines of the same paragraph.
    pub fn line_gap(&self) -> f64 {
        (self.leading - self.font_size).max(0.0)
    }

    fn apply(&mut self, over: &StyleOverride) {
        if let Some(v) = over.font_size {
            self.font_size = v;
        }
        if let Some(v) = over.leading {
            self.leading = v;
        }
        if let Some(v) = &over.color {
            self.color = v.clone();
        }
        if let Some(v) = over.space_before {
            self.space_before = v;
        }
        if let Some(v) = over.space_after {
            self.space_after = v;
        }
        if let Some(v) = over.align {
            self.align = v;
        }
        if let Some(v) = over.left_indent {
            self.left_indent = v;
        }
        if let Some(v) = over.bold {
            self.bold = v;
        }
        if let Some(v) = over.italic {
            self.italic = v;
        }
    }
}

/// Partial style from a settings file; unset fields keep the built-in value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleOverride {
    pub font_size: Option<f64>,
    pub leading: Option<f64>,
    pub color: Option<String>,
    pub space_before: Option<f64>,
    pub space_after: Option<f64>,
    pub align: Option<Align>,
    pub left_indent: Option<f64>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
}

/// Lookup table from [`StyleId`] to [`ParagraphStyle`].
///
/// A missing entry resolves to the body style, so user sheets may be partial.
#[derive(Debug, Clone)]
pub struct StyleSheet {
    body: ParagraphStyle,
    styles: HashMap<StyleId, ParagraphStyle>,
}

impl Default for StyleSheet {
    fn default() -> Self {
        let body = ParagraphStyle::body();
        let mut styles = HashMap::new();

        styles.insert(
            StyleId::Metadata,
            ParagraphStyle {
                leading: 13.0,
                space_before: 0.0,
                space_after: 4.0,
                align: Align::Left,
                ..body.clone()
            },
        );
        styles.insert(
            StyleId::Blockquote,
            ParagraphStyle {
                color: "#666666".to_string(),
                left_indent: 18.0,
                italic: true,
                ..body.clone()
            },
        );
        styles.insert(
            StyleId::Title,
            ParagraphStyle {
                font_size: 28.0,
                leading: 34.0,
                color: "#0B98CE".to_string(),
                space_before: 0.0,
                space_after: 24.0,
                align: Align::Center,
                bold: true,
                ..body.clone()
            },
        );
        styles.insert(
            StyleId::TitleDetail,
            ParagraphStyle {
                font_size: 14.0,
                leading: 18.0,
                space_before: 0.0,
                space_after: 8.0,
                align: Align::Center,
                ..body.clone()
            },
        );
        styles.insert(
            StyleId::Placeholder,
            ParagraphStyle {
                font_size: 10.0,
                leading: 13.0,
                color: "#888888".to_string(),
                align: Align::Center,
                italic: true,
                ..body.clone()
            },
        );
        styles.insert(
            StyleId::Heading1,
            ParagraphStyle::heading(18.0, "#0B98CE", 16.0, 14.0),
        );
        styles.insert(
            StyleId::Heading2,
            ParagraphStyle::heading(14.0, "#316EA8", 14.0, 10.0),
        );
        styles.insert(
            StyleId::Heading3,
            ParagraphStyle::heading(12.0, "#494949", 12.0, 8.0),
        );
        styles.insert(
            StyleId::ListItem,
            ParagraphStyle {
                space_before: 0.0,
                space_after: 3.0,
                align: Align::Left,
                left_indent: 24.0,
                ..body.clone()
            },
        );
        styles.insert(
            StyleId::Code,
            ParagraphStyle {
                font_size: 9.5,
                leading: 12.0,
                color: "#333333".to_string(),
                space_before: 6.0,
                space_after: 6.0,
                align: Align::Left,
                ..body.clone()
            },
        );
        styles.insert(
            StyleId::TableCell,
            ParagraphStyle {
                font_size: 10.0,
                leading: 13.0,
                align: Align::Left,
                ..body.clone()
            },
        );

        Self { body, styles }
    }
}

impl StyleSheet {
    /// A sheet holding only the body style; every lookup falls back to it.
    pub fn body_only() -> Self {
        Self {
            body: ParagraphStyle::body(),
            styles: HashMap::new(),
        }
    }

    pub fn get(&self, id: StyleId) -> &ParagraphStyle {
        if id == StyleId::Body {
            return &self.body;
        }
        self.styles.get(&id).unwrap_or(&self.body)
    }

    /// Apply a settings-file override on top of the current value of `id`.
    pub fn apply(&mut self, id: StyleId, over: &StyleOverride) -> Result<(), String> {
        if let Some(color) = &over.color
            && !is_hex_color(color)
        {
            return Err(format!("style {id:?}: color {color:?} is not #RRGGBB"));
        }
        if id == StyleId::Body {
            self.body.apply(over);
        } else {
            let mut style = self.get(id).clone();
            style.apply(over);
            self.styles.insert(id, style);
        }
        Ok(())
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}
