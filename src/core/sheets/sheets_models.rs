use crate::core::parsing::Record;

/// The values of `record` lined up with `header`. Keys the header does not
/// name are dropped; columns the record lacks come out empty.
pub fn row_from_record(header: &[String], record: &Record) -> Vec<String> {
    header.iter().map(|column| record.cell(column)).collect()
}

/// Full content of one table: the header row and every row under it, each
/// cut or padded to the header width. Cells stay positional so repeated or
/// blank header names survive a copy.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableSnapshot {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableSnapshot {
    /// Builds a snapshot from raw rows where the first row is the header.
    /// Short rows are padded with empty cells, cells past the header dropped.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let header = rows.remove(0);
        let width = header.len();
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { header, rows }
    }
}
