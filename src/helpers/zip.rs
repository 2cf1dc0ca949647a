//! ZIP archive helper utilities for Office Open XML workbooks
//! Provides convenient methods for accessing files within ZIP archives

use crate::error::UsinaSheetError;
use crate::helpers::xml::PartReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

/// Helper trait for ZIP archive operations
pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Resolves the stored entry name (case-insensitive, path separator agnostic)
    fn entry_name(&self, name: &str) -> Option<String>;

    /// Gets a file from the ZIP archive by name
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, UsinaSheetError>;

    /// Creates an XML reader for a file within the ZIP archive
    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<PartReader<BufReader<ZipFile<'_, RS>>>>, UsinaSheetError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn entry_name(&self, name: &str) -> Option<String> {
        let pattern = name.replace('\\', "/");
        self.file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(file_name))
            .map(|file_name| file_name.to_owned())
    }

    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, UsinaSheetError> {
        let path = self.entry_name(name);
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<PartReader<BufReader<ZipFile<'_, RS>>>>, UsinaSheetError> {
        let reader = self
            .file(name)?
            .map(|file| PartReader::new(name, BufReader::new(file)));
        Ok(reader)
    }
}
