//! In-memory spreadsheet: worksheets held as text grids.
//!
//! Behaves like a spreadsheet API collaborator (structured row writes) and is
//! what the ledger tests run against. A store built with
//! [`MemorySpreadsheet::with_write_mode`] can also accept cell-range writes.

use crate::error::UsinaSheetError;
use crate::spreadsheet::reference::parse_column;
use crate::spreadsheet::table::SheetTable;
use crate::spreadsheet::CellValue;
use crate::spreadsheet::SheetStore;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::WriteMode;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct MemorySpreadsheet {
    /// Worksheet grids, row 0 is worksheet row 1
    sheets: BTreeMap<String, Vec<Vec<String>>>,
    write_mode: WriteMode,
    /// Number of write calls that reached the store
    writes: usize,
}

impl Default for MemorySpreadsheet {
    fn default() -> Self {
        MemorySpreadsheet { sheets: BTreeMap::new(), write_mode: WriteMode::Structured, writes: 0 }
    }
}

impl MemorySpreadsheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// Adds or replaces a worksheet; the first line is the header.
    pub fn insert_sheet<S: AsRef<str>>(&mut self, name: &str, lines: &[Vec<S>]) {
        let grid = lines
            .iter()
            .map(|line| line.iter().map(|value| value.as_ref().to_owned()).collect())
            .collect();
        self.sheets.insert(name.to_owned(), grid);
    }

    /// Raw text of one cell (1-based row, 0-based column).
    pub fn cell(&self, sheet_name: &str, row_number: usize, col: usize) -> Option<&str> {
        self.sheets
            .get(sheet_name)?
            .get(row_number.checked_sub(1)?)?
            .get(col)
            .map(String::as_str)
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    fn grid_mut(&mut self, sheet_name: &str) -> Result<&mut Vec<Vec<String>>, UsinaSheetError> {
        self.sheets
            .get_mut(sheet_name)
            .ok_or_else(|| SpreadsheetError::SheetNotFound(sheet_name.to_owned()).into())
    }
}

impl SheetStore for MemorySpreadsheet {
    fn read_all_rows(&mut self, sheet_name: &str) -> Result<SheetTable, UsinaSheetError> {
        let grid = self
            .sheets
            .get(sheet_name)
            .ok_or_else(|| SpreadsheetError::SheetNotFound(sheet_name.to_owned()))?;
        let mut lines = grid.clone();
        while lines.last().map(|line| line.iter().all(|value| value.trim().is_empty())).unwrap_or(false) {
            lines.pop();
        }
        Ok(SheetTable::from_grid(sheet_name, 1, lines))
    }

    fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    fn update_row(&mut self, sheet_name: &str, row_number: usize, values: &[CellValue]) -> Result<(), UsinaSheetError> {
        if self.write_mode != WriteMode::Structured {
            Err(SpreadsheetError::UnsupportedWrite(WriteMode::Structured))?
        }
        if row_number < 2 {
            Err(SpreadsheetError::InvalidRowNumber(row_number))?
        }
        let grid = self.grid_mut(sheet_name)?;
        if grid.len() < row_number {
            grid.resize(row_number, Vec::new());
        }
        let line = &mut grid[row_number - 1];
        if line.len() < values.len() {
            line.resize(values.len(), String::new());
        }
        for (col, value) in values.iter().enumerate() {
            line[col] = value.to_string();
        }
        self.writes += 1;
        log::debug!("memory store: row {} of '{}' updated", row_number, sheet_name);
        Ok(())
    }

    fn set_cell(&mut self, sheet_name: &str, column: &str, row_number: usize, value: &CellValue) -> Result<(), UsinaSheetError> {
        if self.write_mode != WriteMode::CellRange {
            Err(SpreadsheetError::UnsupportedWrite(WriteMode::CellRange))?
        }
        if row_number < 1 {
            Err(SpreadsheetError::InvalidRowNumber(row_number))?
        }
        let col = parse_column(column)?;
        let grid = self.grid_mut(sheet_name)?;
        if grid.len() < row_number {
            grid.resize(row_number, Vec::new());
        }
        let line = &mut grid[row_number - 1];
        if line.len() <= col {
            line.resize(col + 1, String::new());
        }
        line[col] = value.to_string();
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemorySpreadsheet {
        let mut store = MemorySpreadsheet::new();
        store.insert_sheet("S", &[vec!["A", "B"], vec!["1", "2"]]);
        store
    }

    #[test]
    fn test_update_row_extends_grid() {
        let mut store = store();
        store.update_row("S", 4, &[CellValue::text("x"), CellValue::Number(3.0)]).unwrap();
        let table = store.read_all_rows("S").unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[2].cells, vec!["x", "3"]);
        assert!(table.rows[1].is_blank());
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn test_header_row_cannot_be_overwritten() {
        let mut store = store();
        assert!(store.update_row("S", 1, &[CellValue::Empty]).is_err());
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn test_cell_writes_need_cell_mode() {
        let mut store = store();
        assert!(store.set_cell("S", "B", 2, &CellValue::Empty).is_err());
        let mut store = store.with_write_mode(WriteMode::CellRange);
        store.set_cell("S", "C", 2, &CellValue::text("z")).unwrap();
        assert_eq!(store.cell("S", 2, 2), Some("z"));
        assert!(store.update_row("S", 2, &[]).is_err());
    }

    #[test]
    fn test_missing_sheet() {
        let mut store = store();
        let error = store.read_all_rows("NOPE").unwrap_err();
        assert_eq!(error.to_string(), "Sheet 'NOPE' not found");
    }
}
