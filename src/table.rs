use log::warn;

use crate::block::{Block, Cell, TextRun};

/// Collects rows and cells of the table currently being read.
#[derive(Debug, Default)]
pub struct TableAssembler {
    rows: Vec<Vec<Cell>>,
    current_row: Vec<Cell>,
    in_table: bool,
    in_cell: bool,
}

impl TableAssembler {
    pub fn start_table(&mut self) {
        self.rows.clear();
        self.current_row.clear();
        self.in_table = true;
        self.in_cell = false;
    }

    pub fn start_row(&mut self) {
        self.current_row.clear();
    }

    pub fn start_cell(&mut self) {
        self.in_cell = true;
    }

    pub fn end_cell(&mut self, runs: Vec<TextRun>) {
        self.in_cell = false;
        let cell = if runs.iter().all(TextRun::is_unformatted) {
            Cell::Text(runs.into_iter().map(|run| run.text).collect())
        } else {
            Cell::Styled(runs)
        };
        self.current_row.push(cell);
    }

    pub fn end_row(&mut self) {
        let row = std::mem::take(&mut self.current_row);
        if !row.is_empty() {
            self.rows.push(row);
        }
    }

    /// Finish the table. Rows whose width differs from the first row are
    /// dropped; a table without rows yields nothing.
    pub fn end_table(&mut self) -> Option<Block> {
        if !self.current_row.is_empty() {
            self.end_row();
        }
        self.in_table = false;
        self.in_cell = false;

        let mut rows = std::mem::take(&mut self.rows).into_iter();
        let first = rows.next()?;
        let columns = first.len();
        let mut kept = vec![first];
        for (index, row) in rows.enumerate() {
            if row.len() == columns {
                kept.push(row);
            } else {
                warn!(
                    "dropping table row {}: {} cells, expected {columns}",
                    index + 2,
                    row.len()
                );
            }
        }
        Some(Block::Table { rows: kept })
    }

    pub fn in_table(&self) -> bool {
        self.in_table
    }

    pub fn in_cell(&self) -> bool {
        self.in_cell
    }
}
