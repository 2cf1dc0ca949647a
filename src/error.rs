use thiserror::Error;

/// Main error type for the occurrence ledger.
/// Aggregates errors from the standard library, dependencies and every internal module.
#[derive(Error, Debug)]
pub enum UsinaSheetError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseDateTimeError(#[from] chrono::ParseError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    TomlError(#[from] toml::de::Error),

    // Helper module errors
    #[error("{0}")]
    PartError(#[from] crate::helpers::xml::PartError),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    ReferenceError(#[from] crate::spreadsheet::reference::ReferenceError),

    // Domain module errors
    #[error("{0}")]
    OccurrenceError(#[from] crate::occurrence::OccurrenceError),

    #[error("{0}")]
    SchemaError(#[from] crate::schema::SchemaError),

    #[error("{0}")]
    MergeError(#[from] crate::merge::MergeError),

    #[error("{0}")]
    DraftError(#[from] crate::draft::DraftError),

    #[error("{0}")]
    FilterError(#[from] crate::filter::FilterError),

    #[error("{0}")]
    LedgerError(#[from] crate::ledger::LedgerError),

    #[error("{0}")]
    ReferenceDataError(#[from] crate::reference_data::ReferenceDataError),

    #[error("{0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

impl UsinaSheetError {
    /// Returns true when the error means the selected occurrence no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            UsinaSheetError::LedgerError(crate::ledger::LedgerError::OccurrenceNotFound(_))
        )
    }
}

pub trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, UsinaSheetError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| UsinaSheetError::WithContextError(format!("{}: {}", message, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_prefix_wraps_message() {
        let result: Result<(), UsinaSheetError> =
            Err(crate::spreadsheet::SpreadsheetError::SheetNotFound("DADOS".to_owned()).into());
        let error = result.with_prefix("load options").unwrap_err();
        assert_eq!(error.to_string(), "load options: Sheet 'DADOS' not found");
    }

    #[test]
    fn test_with_prefix_keeps_ok() {
        let result: Result<u8, UsinaSheetError> = Ok(7);
        assert_eq!(result.with_prefix("ignored").unwrap(), 7);
    }
}
