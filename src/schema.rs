//! # Sheet Schema
//!
//! Each category sheet has a fixed column layout. The layout is checked
//! against the header when a sheet is loaded, and a header that does not line
//! up stops the load with [`SchemaError::SchemaMismatch`] instead of shifting
//! values into the wrong fields. Columns after the last known one are ignored.
//!
//! | Col | DESLIGAMENTOS | EQUIPAMENTOS |
//! |-----|---------------|--------------|
//! | A | IDENTIFICADOR | IDENTIFICADOR |
//! | B | CLIENTE | CLIENTE |
//! | C | UG | UG |
//! | D | SIGLA | SIGLA |
//! | E | TIPO DE OCORRÊNCIA | TIPO DE OCORRÊNCIA |
//! | F | ATIVO | ATIVO |
//! | G | NOME ATIVO | NOME ATIVO |
//! | H | OCORRÊNCIA | OCORRÊNCIA |
//! | I | OPERADOR | QUANTIDADE |
//! | J | DESLIGAMENTO | OPERADOR |
//! | K | CLIENTE AVISADO | DESLIGAMENTO |
//! | L | ATENDIMENTO LOOP | CLIENTE AVISADO |
//! | M | ATENDIMENTO TERCEIROS | ATENDIMENTO LOOP |
//! | N | NORMALIZAÇÃO | ATENDIMENTO TERCEIROS |
//! | O | DESCRIÇÃO | NORMALIZAÇÃO |
//! | P | PROTOCOLO | DESCRIÇÃO |
//! | Q | OS | PROTOCOLO |
//! | R | | OS |

use crate::occurrence::Category;
use crate::occurrence::Field;
use crate::occurrence::Occurrence;
use crate::spreadsheet::reference::index_to_col;
use crate::spreadsheet::SheetRow;
use crate::spreadsheet::SheetTable;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    /// A header cell does not name the field expected at that position
    #[error("Schema mismatch in sheet '{sheet}': column {column} should be '{expected}' but is '{found}'")]
    SchemaMismatch {
        sheet: String,
        column: String,
        expected: String,
        found: String,
    },

    #[error("Field '{field}' is not part of the {category} layout")]
    FieldNotInLayout { category: Category, field: Field },
}

const SHUTDOWN_FIELDS: [Field; 17] = [
    Field::Identifier,
    Field::Client,
    Field::Ug,
    Field::Abbreviation,
    Field::OccurrenceType,
    Field::Asset,
    Field::AssetName,
    Field::Occurrence,
    Field::Operator,
    Field::Shutdown,
    Field::ClientNotified,
    Field::LocalTeamResponse,
    Field::ThirdPartyResponse,
    Field::Normalization,
    Field::Description,
    Field::Protocol,
    Field::ServiceOrder,
];

const EQUIPMENT_FIELDS: [Field; 18] = [
    Field::Identifier,
    Field::Client,
    Field::Ug,
    Field::Abbreviation,
    Field::OccurrenceType,
    Field::Asset,
    Field::AssetName,
    Field::Occurrence,
    Field::Quantity,
    Field::Operator,
    Field::Shutdown,
    Field::ClientNotified,
    Field::LocalTeamResponse,
    Field::ThirdPartyResponse,
    Field::Normalization,
    Field::Description,
    Field::Protocol,
    Field::ServiceOrder,
];

/// Fields an edit may change. Client and abbreviation come from reference
/// data, the identifier and shutdown time anchor the record.
const EDITABLE_FIELDS: [Field; 13] = [
    Field::Ug,
    Field::AssetName,
    Field::OccurrenceType,
    Field::Occurrence,
    Field::Quantity,
    Field::Operator,
    Field::Description,
    Field::ServiceOrder,
    Field::Protocol,
    Field::Normalization,
    Field::LocalTeamResponse,
    Field::ThirdPartyResponse,
    Field::ClientNotified,
];

/// Ordered field layout of one category sheet.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetSchema {
    category: Category,
    fields: &'static [Field],
}

impl SheetSchema {
    pub fn for_category(category: Category) -> SheetSchema {
        let fields: &'static [Field] = match category {
            Category::Shutdowns => &SHUTDOWN_FIELDS,
            Category::Equipment => &EQUIPMENT_FIELDS,
        };
        SheetSchema { category, fields }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Fields in column order.
    pub fn fields(&self) -> &[Field] {
        self.fields
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    /// 0-based column of a field.
    pub fn column_index(&self, field: Field) -> Option<usize> {
        self.fields.iter().position(|candidate| *candidate == field)
    }

    /// Column letters of a field, as used by cell-range writes.
    pub fn column_letter(&self, field: Field) -> Result<String, SchemaError> {
        self.column_index(field)
            .map(index_to_col)
            .ok_or(SchemaError::FieldNotInLayout { category: self.category, field })
    }

    pub fn is_editable(&self, field: Field) -> bool {
        self.contains(field) && EDITABLE_FIELDS.contains(&field)
    }

    /// Editable fields of this layout, in column order.
    pub fn editable_fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields.iter().copied().filter(move |field| self.is_editable(*field))
    }

    /// Checks the header position by position against the layout.
    pub fn validate(&self, table: &SheetTable) -> Result<(), SchemaError> {
        for (index, field) in self.fields.iter().enumerate() {
            let found = table.header.get(index).map(String::as_str).unwrap_or("");
            if !field.matches_header(found) {
                return Err(SchemaError::SchemaMismatch {
                    sheet: table.name.to_owned(),
                    column: index_to_col(index),
                    expected: field.header().to_owned(),
                    found: found.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Maps one data row onto an occurrence.
    pub fn occurrence_from_row(&self, row: &SheetRow) -> Occurrence {
        let mut occurrence = Occurrence::new(self.category);
        occurrence.row_number = row.number;
        for (index, field) in self.fields.iter().enumerate() {
            occurrence.set_text(*field, row.get(index));
        }
        occurrence
    }

    /// Validates the header and turns every non-blank row into an occurrence.
    pub fn load(&self, table: &SheetTable) -> Result<Vec<Occurrence>, SchemaError> {
        self.validate(table)?;
        let occurrences: Vec<Occurrence> = table
            .rows
            .iter()
            .filter(|row| !row.is_blank())
            .map(|row| self.occurrence_from_row(row))
            .collect();
        for occurrence in &occurrences {
            for field in Field::TIMESTAMPS {
                let text = occurrence.text(field);
                if !text.trim().is_empty() && occurrence.timestamp(field).is_none() {
                    log::warn!(
                        "{} row {}: {} '{}' is not a timestamp, treated as empty",
                        self.category,
                        occurrence.row_number,
                        field.header(),
                        text
                    );
                }
            }
        }
        log::debug!("loaded {} occurrence(s) from '{}'", occurrences.len(), table.name);
        Ok(occurrences)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Header line of a category sheet as the canonical headers.
    pub(crate) fn header(category: Category) -> Vec<String> {
        SheetSchema::for_category(category)
            .fields()
            .iter()
            .map(|field| field.header().to_owned())
            .collect()
    }

    /// A data line laid out for a category, from (field, text) pairs.
    pub(crate) fn line(category: Category, values: &[(Field, &str)]) -> Vec<String> {
        let schema = SheetSchema::for_category(category);
        let mut line = vec![String::new(); schema.fields().len()];
        for (field, text) in values {
            if let Some(index) = schema.column_index(*field) {
                line[index] = text.to_string();
            }
        }
        line
    }
}
