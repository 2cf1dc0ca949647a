//! # Spreadsheet Boundary
//!
//! Everything that touches a workbook lives here: the read boundary
//! (`read_all_rows`), the structured row write used by spreadsheet APIs and
//! the cell-range write used on local workbook files. Occurrence logic only
//! sees [`SheetTable`] values coming in and [`CellValue`] lists going out.
use crate::error::UsinaSheetError;
use std::fmt::Display;
use thiserror::Error;

pub(crate) mod cell;
pub mod memory;
pub mod reference;
pub mod session;
pub mod table;
pub mod xlsx;

pub use table::SheetRow;
pub use table::SheetTable;

/// Errors raised at the spreadsheet boundary.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    /// Requested sheet does not exist in the workbook
    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),

    /// Required workbook part is missing
    #[error("Workbook part '{0}' not found")]
    PartNotFound(String),

    /// The workbook file has no worksheets
    #[error("Workbook '{0}' has no worksheets")]
    EmptyWorkbook(String),

    /// Another session owns the workbook
    #[error("Workbook '{0}' is locked by another session")]
    WorkbookLocked(String),

    /// Store cannot perform the requested kind of write
    #[error("Store does not support {0} writes")]
    UnsupportedWrite(WriteMode),

    /// Row numbers are 1-based and must lie below the header
    #[error("Invalid row number {0}")]
    InvalidRowNumber(usize),
}

/// How a store accepts writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Whole rows at a 1-based position (spreadsheet API path)
    Structured,
    /// Individual cells addressed by column letter (local workbook path)
    CellRange,
}

impl Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Structured => write!(f, "structured row"),
            WriteMode::CellRange => write!(f, "cell range"),
        }
    }
}

/// Literal value handed to a write boundary. Timestamps are already text.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
}

impl CellValue {
    /// Builds a text value, mapping blank strings to [`CellValue::Empty`].
    pub fn text(value: impl Into<String>) -> CellValue {
        let value = value.into();
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl Display for CellValue {
    /// Renders the value the way the read boundary returns it.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(value) => write!(f, "{}", value),
            CellValue::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            CellValue::Number(value) => write!(f, "{}", value),
        }
    }
}

/// A spreadsheet collaborator: one read boundary and one of the two write boundaries.
pub trait SheetStore {
    /// Reads a worksheet as header plus rows. The header is the first row.
    fn read_all_rows(&mut self, sheet_name: &str) -> Result<SheetTable, UsinaSheetError>;

    /// Which write boundary the store offers.
    fn write_mode(&self) -> WriteMode;

    /// Writes a full row at a 1-based position, preserving user-entered typing.
    fn update_row(&mut self, sheet_name: &str, row_number: usize, values: &[CellValue]) -> Result<(), UsinaSheetError> {
        let _ = (sheet_name, row_number, values);
        Err(SpreadsheetError::UnsupportedWrite(WriteMode::Structured))?
    }

    /// Writes one cell addressed by column letters and 1-based row number.
    fn set_cell(&mut self, sheet_name: &str, column: &str, row_number: usize, value: &CellValue) -> Result<(), UsinaSheetError> {
        let _ = (sheet_name, column, row_number, value);
        Err(SpreadsheetError::UnsupportedWrite(WriteMode::CellRange))?
    }

    /// Makes pending writes durable. Stores that write through do nothing.
    fn commit(&mut self) -> Result<(), UsinaSheetError> {
        Ok(())
    }

    /// Drops pending writes after a failed operation.
    fn discard(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_rendering() {
        assert_eq!(CellValue::Number(3.0).to_string(), "3");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
        assert_eq!(CellValue::text("").to_string(), "");
        assert!(CellValue::text("").is_empty());
        assert_eq!(CellValue::text("abc"), CellValue::Text("abc".to_owned()));
    }

    struct ReadOnly;

    impl SheetStore for ReadOnly {
        fn read_all_rows(&mut self, sheet_name: &str) -> Result<SheetTable, UsinaSheetError> {
            Err(SpreadsheetError::SheetNotFound(sheet_name.to_owned()))?
        }

        fn write_mode(&self) -> WriteMode {
            WriteMode::Structured
        }
    }

    #[test]
    fn test_default_writes_are_rejected() {
        let mut store = ReadOnly;
        let error = store.set_cell("X", "A", 2, &CellValue::Empty).unwrap_err();
        assert_eq!(error.to_string(), "Store does not support cell range writes");
        assert!(store.update_row("X", 2, &[]).is_err());
        assert!(store.commit().is_ok());
    }
}
