use crate::domain::model::EnrichedRow;
use std::fmt;

pub const DEFAULT_PREVIEW_ROWS: usize = 500;

/// On-screen preview of the enriched rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
}

impl TableView {
    pub fn is_truncated(&self) -> bool {
        self.rows.len() < self.total_rows
    }
}

/// Builds the preview grid. `None` means the results view should be hidden.
pub fn render(rows: &[EnrichedRow], header: &[&str], limit: usize) -> Option<TableView> {
    if rows.is_empty() {
        return None;
    }

    let grid = rows
        .iter()
        .take(limit)
        .map(|row| row.values(header).map(str::to_string).collect())
        .collect();

    Some(TableView {
        header: header.iter().map(|h| h.to_string()).collect(),
        rows: grid,
        total_rows: rows.len(),
    })
}

impl fmt::Display for TableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut widths: Vec<usize> = self.header.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell_text(cell).chars().count());
            }
        }

        let write_line = |f: &mut fmt::Formatter<'_>, cells: &[String]| -> fmt::Result {
            let line: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell_text(cell), width = *width))
                .collect();
            writeln!(f, "{}", line.join(" | ").trim_end())
        };

        write_line(f, &self.header)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("-+-"))?;
        for row in &self.rows {
            write_line(f, row)?;
        }

        if self.is_truncated() {
            write!(f, "(showing {} of {} rows)", self.rows.len(), self.total_rows)?;
        } else {
            write!(f, "({} rows)", self.total_rows)?;
        }
        Ok(())
    }
}

// 儲存格內的換行會破壞表格排版
fn cell_text(cell: &str) -> String {
    cell.replace(['\r', '\n'], " ")
}
