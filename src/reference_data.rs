//! Reference sheets: DADOS (valid options, client and abbreviation per UG)
//! and the detailed asset sheet (inverters, trackers and strings per plant).

use crate::spreadsheet::SheetTable;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ReferenceDataError {
    #[error("Column '{column}' not found in sheet '{sheet}'")]
    MissingColumn { sheet: String, column: String },

    #[error("UG '{0}' not found in reference data")]
    UnknownUg(String),

    #[error("Could not determine the UG for asset '{0}'")]
    UnknownAsset(String),
}

const CLIENT: &str = "CLIENTE";
const UG: &str = "UG";
const ABBREVIATION: &str = "SIGLA";
const OCCURRENCE_TYPE: &str = "TIPO DE OCORRÊNCIA";
const OCCURRENCE: &str = "OCORRÊNCIA";
const ASSET: &str = "ATIVO";
const OPERATOR: &str = "OPERADOR";
const PLANT: &str = "Usina";

/// Asset kinds whose names come from the detailed asset sheet, with the column holding them.
const DETAILED_ASSET_COLUMNS: [(&str, &str); 3] = [
    ("INVERSOR", "Inversor Conectado"),
    ("TRACKER", "Tracker Conectado"),
    ("STRING", "Nome String"),
];

/// Sorted distinct values offered for each input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionLists {
    pub clients: Vec<String>,
    pub occurrence_types: Vec<String>,
    pub occurrences: Vec<String>,
    pub assets: Vec<String>,
    pub operators: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ReferenceData {
    options: SheetTable,
    assets: Option<SheetTable>,
}

impl ReferenceData {
    /// Wraps the DADOS table and, when present, the detailed asset table.
    pub fn new(options: SheetTable, assets: Option<SheetTable>) -> Result<ReferenceData, ReferenceDataError> {
        for column in [CLIENT, UG, ABBREVIATION, OCCURRENCE_TYPE, OCCURRENCE, ASSET, OPERATOR] {
            require_column(&options, column)?;
        }
        if let Some(assets) = &assets {
            require_column(assets, PLANT)?;
        }
        Ok(ReferenceData { options, assets })
    }

    pub fn option_lists(&self) -> OptionLists {
        OptionLists {
            clients: distinct(self.options.column_values(CLIENT)),
            occurrence_types: distinct(self.options.column_values(OCCURRENCE_TYPE)),
            occurrences: distinct(self.options.column_values(OCCURRENCE)),
            assets: distinct(self.options.column_values(ASSET)),
            operators: distinct(self.options.column_values(OPERATOR)),
        }
    }

    /// UGs registered for a client.
    pub fn ugs_for_client(&self, client: &str) -> Vec<String> {
        let (Some(client_col), Some(ug_col)) = (self.options.column(CLIENT), self.options.column(UG)) else {
            return Vec::new();
        };
        distinct(
            self.options
                .rows
                .iter()
                .filter(|row| row.get(client_col).trim() == client.trim())
                .map(|row| row.get(ug_col))
                .collect(),
        )
    }

    /// Client and abbreviation of the first DADOS row for a UG.
    pub fn client_and_abbreviation(&self, ug: &str) -> Result<(String, String), ReferenceDataError> {
        let columns = (self.options.column(UG), self.options.column(CLIENT), self.options.column(ABBREVIATION));
        let (Some(ug_col), Some(client_col), Some(abbreviation_col)) = columns else {
            return Err(ReferenceDataError::UnknownUg(ug.to_owned()));
        };
        self.options
            .rows
            .iter()
            .find(|row| !ug.trim().is_empty() && row.get(ug_col).trim() == ug.trim())
            .map(|row| (row.get(client_col).trim().to_owned(), row.get(abbreviation_col).trim().to_owned()))
            .ok_or_else(|| ReferenceDataError::UnknownUg(ug.to_owned()))
    }

    /// True for asset kinds listed by name in the detailed asset sheet.
    pub fn is_detailed_kind(asset_kind: &str) -> bool {
        detailed_column(asset_kind).is_some()
    }

    /// Names of detailed assets of one kind installed at the given plants.
    pub fn detailed_asset_names(&self, asset_kind: &str, ugs: &[String]) -> Vec<String> {
        let Some(column) = detailed_column(asset_kind) else {
            return Vec::new();
        };
        let Some((assets, plant_col)) = self.assets_with_plant() else {
            return Vec::new();
        };
        let Some(name_col) = assets.column(column) else {
            return Vec::new();
        };
        distinct(
            assets
                .rows
                .iter()
                .filter(|row| contains(ugs, row.get(plant_col)))
                .map(|row| row.get(name_col))
                .collect(),
        )
    }

    /// Plant (UG) of a detailed asset, searched among the given plants.
    pub fn plant_for_asset(&self, asset_name: &str, ugs: &[String]) -> Result<String, ReferenceDataError> {
        let unknown = || ReferenceDataError::UnknownAsset(asset_name.to_owned());
        let (assets, plant_col) = self.assets_with_plant().ok_or_else(unknown)?;
        let rows: Vec<_> = assets.rows.iter().filter(|row| contains(ugs, row.get(plant_col))).collect();
        DETAILED_ASSET_COLUMNS
            .iter()
            .filter_map(|(_, column)| assets.column(column))
            .find_map(|name_col| rows.iter().find(|row| row.get(name_col).trim() == asset_name.trim()))
            .map(|row| row.get(plant_col).trim().to_owned())
            .ok_or_else(unknown)
    }

    fn assets_with_plant(&self) -> Option<(&SheetTable, usize)> {
        let assets = self.assets.as_ref()?;
        Some((assets, assets.column(PLANT)?))
    }
}

fn detailed_column(asset_kind: &str) -> Option<&'static str> {
    let kind = asset_kind.trim().to_uppercase();
    DETAILED_ASSET_COLUMNS
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, column)| *column)
}

fn require_column(table: &SheetTable, column: &str) -> Result<(), ReferenceDataError> {
    match table.column(column) {
        Some(_) => Ok(()),
        None => Err(ReferenceDataError::MissingColumn { sheet: table.name.to_owned(), column: column.to_owned() }),
    }
}

fn contains(values: &[String], value: &str) -> bool {
    values.iter().any(|candidate| candidate.trim() == value.trim())
}

/// Sorted distinct non-empty values, trimmed.
fn distinct(values: Vec<&str>) -> Vec<String> {
    values
        .into_iter()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub(crate) fn options_grid() -> Vec<Vec<&'static str>> {
        vec![
            vec!["CLIENTE", "UG", "SIGLA", "TIPO DE OCORRÊNCIA", "OCORRÊNCIA", "ATIVO", "OPERADOR"],
            vec!["ACME ", "UG01", "AC1", "ELÉTRICA", "FALHA", "INVERSOR", "Ana"],
            vec!["ACME", "UG02", "AC2", "MECÂNICA", "QUEIMA", "TRACKER", "Bruno"],
            vec!["SOLAR SA", "UG03", "SS3", "ELÉTRICA", "FALHA", "TRAFO", ""],
            vec!["", "", "", "", "DESARME", "STRING", "Ana"],
        ]
    }

    pub(crate) fn assets_grid() -> Vec<Vec<&'static str>> {
        vec![
            vec!["Usina", "Inversor Conectado", "Tracker Conectado", "Nome String"],
            vec!["UG01", "INV-01", "TRK-01", "STR-01"],
            vec!["UG01", "INV-02", "TRK-01", "STR-02"],
            vec!["UG02", "INV-03", "TRK-02", ""],
        ]
    }
}
