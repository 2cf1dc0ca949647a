//! Header-driven view of one worksheet, the shape every reader hands back.

/// Removes no-break spaces and surrounding whitespace from a header cell.
pub fn clean_header(header: &str) -> String {
    header.replace('\u{a0}', "").trim().to_owned()
}

/// One data row together with its 1-based position in the worksheet.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetRow {
    /// 1-based worksheet row number
    pub number: usize,
    /// Cell texts aligned with the table header (missing trailing cells are empty)
    pub cells: Vec<String>,
}

impl SheetRow {
    /// Returns the text at a 0-based column, empty when out of range.
    pub fn get(&self, col: usize) -> &str {
        self.cells.get(col).map(String::as_str).unwrap_or("")
    }

    /// True when every cell of the row is blank.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.trim().is_empty())
    }
}

/// A worksheet read through the read boundary: cleaned header plus the dense
/// run of rows below it (blank rows included, so positions stay faithful).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SheetTable {
    pub name: String,
    pub header: Vec<String>,
    /// 1-based row number of the header
    pub header_row: usize,
    pub rows: Vec<SheetRow>,
}

impl SheetTable {
    /// Builds a table from a grid whose first line is the header.
    /// `header_row` is the 1-based worksheet row holding that first line.
    pub fn from_grid(name: &str, header_row: usize, grid: Vec<Vec<String>>) -> SheetTable {
        let mut lines = grid.into_iter();
        let header: Vec<String> = lines
            .next()
            .map(|line| line.iter().map(|value| clean_header(value)).collect())
            .unwrap_or_default();
        let width = header.len();
        let rows = lines
            .enumerate()
            .map(|(offset, mut cells)| {
                if cells.len() < width {
                    cells.resize(width, String::new());
                }
                SheetRow { number: header_row + 1 + offset, cells }
            })
            .collect();
        SheetTable { name: name.to_owned(), header, header_row, rows }
    }

    /// Finds a column by header text, ignoring case and stray whitespace.
    pub fn column(&self, name: &str) -> Option<usize> {
        let wanted = clean_header(name).to_uppercase();
        self.header.iter().position(|header| header.to_uppercase() == wanted)
    }

    /// Returns the values of a named column for every row.
    pub fn column_values(&self, name: &str) -> Vec<&str> {
        match self.column(name) {
            Some(col) => self.rows.iter().map(|row| row.get(col)).collect(),
            None => Vec::new(),
        }
    }

    /// Ordered sequence of (field name -> text) mappings, one per row.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &str)>> + '_ {
        self.rows.iter().map(move |row| {
            self.header
                .iter()
                .enumerate()
                .map(|(col, header)| (header.as_str(), row.get(col)))
                .collect()
        })
    }

    /// The 1-based number of the last used row (the header row for an empty table).
    pub fn last_row_number(&self) -> usize {
        self.rows
            .iter()
            .rev()
            .find(|row| !row.is_blank())
            .map(|row| row.number)
            .unwrap_or(self.header_row)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(SheetRow::is_blank)
    }
}
