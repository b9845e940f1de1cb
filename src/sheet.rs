// src/sheet.rs
//! Roster workbook access. Thin wrapper over calamine that exposes the only
//! two operations the pipeline needs: row count and text-cell reads.

use calamine::{Data, Range, Reader, Xlsx};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to open workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),
    #[error("workbook has no worksheet at index {0}")]
    MissingSheet(usize),
    #[error("cell at row {row}, column {col} is not text")]
    CellType { row: usize, col: usize },
}

pub struct RosterSheet {
    range: Range<Data>,
}

impl RosterSheet {
    /// Open the first worksheet of an xlsx workbook held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SheetError> {
        let mut workbook = Xlsx::new(Cursor::new(bytes))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(SheetError::MissingSheet(0))??;
        Ok(Self { range })
    }

    /// Number of rows in the sheet, header rows included.
    pub fn row_count(&self) -> usize {
        self.range.height()
    }

    /// Text content of a cell. Empty and out-of-range cells read as "";
    /// numeric or otherwise non-string cells are a structural roster error.
    pub fn cell_text(&self, row: usize, col: usize) -> Result<String, SheetError> {
        match self.range.get_value((row as u32, col as u32)) {
            None | Some(Data::Empty) => Ok(String::new()),
            Some(Data::String(s)) => Ok(s.clone()),
            Some(_) => Err(SheetError::CellType { row, col }),
        }
    }
}
