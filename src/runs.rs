use crate::block::TextRun;
use crate::html::decode_entities;

/// Inline markup kinds tracked by the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    Bold,
    Italic,
    Code,
    Link(String),
}

/// Builds the formatted run list of the block currently being read.
///
/// Markup state is a set of flags, not a stack: opening a kind that is
/// already open does nothing, and closing one that is not open does nothing.
#[derive(Debug, Default)]
pub struct RunAccumulator {
    runs: Vec<TextRun>,
    bold: bool,
    italic: bool,
    code: bool,
    link: Option<String>,
}

impl RunAccumulator {
    pub fn open(&mut self, markup: Markup) {
        match markup {
            Markup::Bold => self.bold = true,
            Markup::Italic => self.italic = true,
            Markup::Code => self.code = true,
            Markup::Link(target) => {
                if self.link.is_none() {
                    self.link = Some(target);
                }
            }
        }
    }

    pub fn close(&mut self, markup: &Markup) {
        match markup {
            Markup::Bold => self.bold = false,
            Markup::Italic => self.italic = false,
            Markup::Code => self.code = false,
            Markup::Link(_) => self.link = None,
        }
    }

    /// Append character data: references are decoded and whitespace runs
    /// collapse to one space. Leading whitespace of a block is dropped.
    pub fn append_text(&mut self, raw: &str) {
        let decoded = decode_entities(raw);
        let mut collapsed = String::with_capacity(decoded.len());
        let mut after_space = self.ends_with_space();
        for ch in decoded.chars() {
            if ch.is_ascii_whitespace() {
                if !after_space {
                    collapsed.push(' ');
                    after_space = true;
                }
            } else {
                collapsed.push(ch);
                after_space = false;
            }
        }
        self.push(&collapsed);
    }

    pub fn line_break(&mut self) {
        if let Some(last) = self.runs.last_mut() {
            let trimmed = last.text.trim_end_matches(' ').len();
            last.text.truncate(trimmed);
        }
        self.push("\n");
    }

    /// True when no visible text has been appended since the last flush.
    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|run| run.text.trim().is_empty())
    }

    /// Take the accumulated runs and reset all markup.
    ///
    /// Surrounding whitespace is trimmed, empty runs are dropped and
    /// neighbours with identical formatting are merged.
    pub fn flush(&mut self) -> Vec<TextRun> {
        let runs = std::mem::take(&mut self.runs);
        self.bold = false;
        self.italic = false;
        self.code = false;
        self.link = None;

        let mut merged: Vec<TextRun> = Vec::with_capacity(runs.len());
        for run in runs {
            if run.text.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.same_format(&run) => last.text.push_str(&run.text),
                _ => merged.push(run),
            }
        }

        while let Some(first) = merged.first_mut() {
            let trimmed = first.text.trim_start().to_string();
            if trimmed.is_empty() {
                merged.remove(0);
            } else {
                first.text = trimmed;
                break;
            }
        }
        while let Some(last) = merged.last_mut() {
            let trimmed = last.text.trim_end().len();
            if trimmed == 0 {
                merged.pop();
            } else {
                last.text.truncate(trimmed);
                break;
            }
        }
        merged
    }

    fn ends_with_space(&self) -> bool {
        match self.runs.iter().rev().find_map(|run| run.text.chars().last()) {
            Some(ch) => ch == ' ' || ch == '\n',
            None => true,
        }
    }

    fn push(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let run = TextRun {
            text: String::new(),
            bold: self.bold,
            italic: self.italic,
            code: self.code,
            link: self.link.clone(),
        };
        match self.runs.last_mut() {
            Some(last) if last.same_format(&run) => last.text.push_str(text),
            _ => self.runs.push(TextRun {
                text: text.to_string(),
                ..run
            }),
        }
    }
}
