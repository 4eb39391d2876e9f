use std::borrow::Cow;

/// Advance widths (1/1000 em) for ASCII 32..=126, from the Adobe core AFMs.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    278, 278, 584, 584, 584, 556, 1015,
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    278, 278, 278, 469, 556, 333,
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
}

impl StandardFont {
    /// PostScript name for the font dictionary's `BaseFont`.
    pub fn base_name(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
        }
    }

    pub fn char_width(&self, ch: char) -> u16 {
        let bold = *self == StandardFont::HelveticaBold;
        let code = ch as u32;
        if (32..=126).contains(&code) {
            let index = (code - 32) as usize;
            return if bold {
                HELVETICA_BOLD_WIDTHS[index]
            } else {
                HELVETICA_WIDTHS[index]
            };
        }
        match ch {
            '\u{2014}' | '\u{2026}' => 1000,
            '\u{2022}' => 350,
            '\u{2018}' | '\u{2019}' => {
                if bold {
                    278
                } else {
                    222
                }
            }
            '\u{201C}' | '\u{201D}' => {
                if bold {
                    500
                } else {
                    333
                }
            }
            _ => 556,
        }
    }

    /// Width of `text` in points at `size`.
    pub fn text_width(&self, text: &str, size: f64) -> f64 {
        let units: u32 = text.chars().map(|ch| u32::from(self.char_width(ch))).sum();
        f64::from(units) * size / 1000.0
    }

    /// Cut `text` so it fits `max_width`, ending it with `...` when cut.
    pub fn truncate_to_width<'a>(&self, text: &'a str, size: f64, max_width: f64) -> Cow<'a, str> {
        if self.text_width(text, size) <= max_width {
            return Cow::Borrowed(text);
        }
        let budget = max_width - self.text_width(ELLIPSIS, size);
        let mut used = 0.0;
        let mut end = 0;
        for (index, ch) in text.char_indices() {
            let width = f64::from(self.char_width(ch)) * size / 1000.0;
            if used + width > budget {
                break;
            }
            used += width;
            end = index + ch.len_utf8();
        }
        Cow::Owned(format!("{}{ELLIPSIS}", text[..end].trim_end()))
    }
}

/// Encode text for a simple font using `WinAnsiEncoding`. Characters
/// outside the encoding become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(ch: char) -> u8 {
    let code = ch as u32;
    if (0x20..=0x7E).contains(&code) || (0xA0..=0xFF).contains(&code) {
        return code as u8;
    }
    match ch {
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => b'?',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_widths() {
        assert_eq!(StandardFont::Helvetica.char_width(' '), 278);
        assert_eq!(StandardFont::Helvetica.char_width('W'), 944);
        assert_eq!(StandardFont::Helvetica.char_width('~'), 584);
        assert_eq!(StandardFont::HelveticaBold.char_width('a'), 556);
        assert_eq!(StandardFont::HelveticaBold.char_width('b'), 611);
    }

    #[test]
    fn text_width_scales_with_size() {
        // "Page" = 667 + 556 + 556 + 556
        let width = StandardFont::Helvetica.text_width("Page", 10.0);
        assert!((width - 23.35).abs() < 1e-9);
    }

    #[test]
    fn short_text_is_not_truncated() {
        let text = StandardFont::Helvetica.truncate_to_width("short", 8.0, 500.0);
        assert!(matches!(text, Cow::Borrowed("short")));
    }

    #[test]
    fn long_text_is_truncated_with_ellipsis() {
        let long = "confidential ".repeat(40);
        let cut = StandardFont::Helvetica.truncate_to_width(&long, 8.0, 100.0);
        assert!(cut.ends_with("..."));
        assert!(StandardFont::Helvetica.text_width(&cut, 8.0) <= 100.0);
    }

    #[test]
    fn win_ansi_mapping() {
        assert_eq!(encode_win_ansi("Ab 1"), b"Ab 1".to_vec());
        assert_eq!(encode_win_ansi("é"), vec![0xE9]);
        assert_eq!(encode_win_ansi("\u{2014}\u{2022}\u{20AC}"), vec![0x97, 0x95, 0x80]);
        assert_eq!(encode_win_ansi("\u{4E2D}"), vec![b'?']);
    }
}
