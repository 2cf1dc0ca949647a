use crate::error::UsinaSheetError;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors related to Excel-style cell references.
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Invalid cell reference '{0}'")]
    FormatError(String),

    #[error("Invalid column letters '{0}'")]
    ColumnError(String),
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([A-Z]+)(\d+)$").expect("Hardcode regex pattern"))
}

/// Converts column letters ("A", "AB") to a 0-based column index.
pub fn col_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for character in letters.chars() {
        if !character.is_ascii_uppercase() {
            return None;
        }
        index = index * 26 + (character as usize - 'A' as usize + 1);
    }
    Some(index - 1)
}

/// Converts a 1-based row number text to a 0-based row index.
pub fn row_to_index(digits: &str) -> Option<usize> {
    digits.parse::<usize>().ok().filter(|row| *row > 0).map(|row| row - 1)
}

/// Converts a 0-based column index to column letters.
pub fn index_to_col(col: usize) -> String {
    let mut column = col + 1;
    let mut letters = String::new();
    while column > 0 {
        column -= 1;
        letters.insert(0, char::from(b'A' + (column % 26) as u8));
        column /= 26;
    }
    letters
}

/// Converts 0-based (row, col) to an A1 reference.
pub fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", index_to_col(col), row + 1)
}

/// Parses an A1 reference into 0-based (row, col).
pub fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let value = reference.trim().replace('$', "").to_ascii_uppercase();
    let captures = reference_pattern().captures(&value)?;
    let col = captures.get(1).map(|matcher| matcher.as_str()).and_then(col_to_index)?;
    let row = captures.get(2).map(|matcher| matcher.as_str()).and_then(row_to_index)?;
    Some((row, col))
}

/// Strict variant of [`reference_to_index`] used on user supplied input.
pub fn parse_reference(reference: &str) -> Result<(usize, usize), UsinaSheetError> {
    reference_to_index(reference).ok_or_else(|| ReferenceError::FormatError(reference.to_owned()).into())
}

/// Validates column letters and returns the 0-based index.
pub fn parse_column(letters: &str) -> Result<usize, UsinaSheetError> {
    col_to_index(&letters.trim().to_ascii_uppercase())
        .ok_or_else(|| ReferenceError::ColumnError(letters.to_owned()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_round_trip_boundaries() {
        assert_eq!(col_to_index("A"), Some(0));
        assert_eq!(col_to_index("Z"), Some(25));
        assert_eq!(col_to_index("AA"), Some(26));
        assert_eq!(col_to_index("XFD"), Some(16_383));
        assert_eq!(index_to_col(0), "A");
        assert_eq!(index_to_col(25), "Z");
        assert_eq!(index_to_col(26), "AA");
        assert_eq!(index_to_col(16_383), "XFD");
    }

    #[test]
    fn test_reference_parsing() {
        assert_eq!(reference_to_index("A1"), Some((0, 0)));
        assert_eq!(reference_to_index("$c$12"), Some((11, 2)));
        assert_eq!(reference_to_index("A0"), None);
        assert_eq!(reference_to_index("12"), None);
        assert_eq!(index_to_reference(4, 16), "Q5");
        assert!(parse_reference("not a cell").is_err());
        assert!(parse_column("a1").is_err());
        assert_eq!(parse_column(" q ").unwrap(), 16);
    }
}
