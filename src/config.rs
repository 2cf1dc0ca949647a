//! TOML configuration.
//!
//! ```toml
//! workbook = "ocorrencias.xlsx"
//! header_row = 1
//! cache_ttl_secs = 60
//!
//! [sheets]
//! shutdowns = "DESLIGAMENTOS"
//! equipment = "EQUIPAMENTOS"
//! options = "DADOS"
//! assets = "Usinas_Detalhado"
//! ```

use crate::error::UsinaSheetError;
use crate::occurrence::Category;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("header_row must be at least 1")]
    InvalidHeaderRow,

    #[error("No workbook configured; set `workbook` or pass --workbook")]
    MissingWorkbook,
}

/// Sheet names inside the workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SheetNames {
    pub shutdowns: String,
    pub equipment: String,
    /// Valid option lists and client/abbreviation per UG
    pub options: String,
    /// Detailed plant assets
    pub assets: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        SheetNames {
            shutdowns: Category::Shutdowns.label().to_owned(),
            equipment: Category::Equipment.label().to_owned(),
            options: "DADOS".to_owned(),
            assets: "Usinas_Detalhado".to_owned(),
        }
    }
}

impl SheetNames {
    pub fn for_category(&self, category: Category) -> &str {
        match category {
            Category::Shutdowns => &self.shutdowns,
            Category::Equipment => &self.equipment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Local workbook used by the cell-range write path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workbook: Option<PathBuf>,
    pub sheets: SheetNames,
    /// 1-based row holding the column headers
    pub header_row: usize,
    pub cache_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config { workbook: None, sheets: SheetNames::default(), header_row: 1, cache_ttl_secs: 60 }
    }
}

impl Config {
    /// Reads and validates a TOML file. Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, UsinaSheetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Config::parse(&text)?;
        log::debug!("loaded configuration from '{}'", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Config, UsinaSheetError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.header_row < 1 {
            return Err(ConfigError::InvalidHeaderRow);
        }
        Ok(())
    }

    pub fn workbook(&self) -> Result<&Path, ConfigError> {
        self.workbook.as_deref().ok_or(ConfigError::MissingWorkbook)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sheets.for_category(Category::Equipment), "EQUIPAMENTOS");
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.workbook(), Err(ConfigError::MissingWorkbook));
    }

    #[test]
    fn test_partial_file() {
        let config = Config::parse("workbook = \"dados.xlsx\"\nheader_row = 2\n[sheets]\noptions = \"OPCOES\"\n").unwrap();
        assert_eq!(config.workbook(), Ok(Path::new("dados.xlsx")));
        assert_eq!(config.header_row, 2);
        assert_eq!(config.sheets.options, "OPCOES");
        assert_eq!(config.sheets.shutdowns, "DESLIGAMENTOS");
    }

    #[test]
    fn test_invalid_files() {
        let error = Config::parse("header_row = 0").unwrap_err();
        assert_eq!(error.to_string(), "header_row must be at least 1");
        assert!(matches!(Config::parse("colour = 1"), Err(UsinaSheetError::TomlError(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("usina_sheet_config_{}.toml", std::process::id()));
        std::fs::write(&path, "cache_ttl_secs = 5\n").unwrap();
        let config = Config::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.cache_ttl(), Duration::from_secs(5));
        assert!(Config::load(&path).is_err());
    }
}
