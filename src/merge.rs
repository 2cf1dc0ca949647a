//! # Edit Sessions and Field-Level Merge
//!
//! An [`EditSession`] carries everything one edit round-trip needs: the
//! selected identifier, the values the operator changed and the stage the
//! edit has reached. It is built fresh for every request and handed to the
//! ledger explicitly.
//!
//! [`merge`] applies the session to the occurrence found in the store. Only
//! editable fields change. Timestamps are edited as a date half and a time
//! half, and a field whose halves are not both present is cleared.

use crate::identifier::Identifier;
use crate::occurrence::format_timestamp;
use crate::occurrence::Field;
use crate::occurrence::Occurrence;
use crate::schema::SheetSchema;
use crate::spreadsheet::CellValue;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use std::collections::BTreeMap;
use std::fmt::Display;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MergeError {
    #[error("Field '{0}' cannot be edited in {1}")]
    NotEditable(Field, String),

    #[error("Field '{0}' is a timestamp and is edited as a date and a time")]
    TimestampField(Field),

    #[error("Field '{0}' is not a timestamp")]
    NotATimestamp(Field),
}

/// Where an edit session stands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EditStage {
    /// An identifier was picked; nothing has been read yet
    Selected,
    /// The category sheet was freshly read
    Loaded,
    /// The identifier resolved to a row
    Matched,
    /// The merged row reached the store
    Written,
    /// The identifier matched nothing; no write happened
    NotFound,
}

impl Display for EditStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EditStage::Selected => "selected",
            EditStage::Loaded => "loaded",
            EditStage::Matched => "matched",
            EditStage::Written => "written",
            EditStage::NotFound => "not found",
        };
        write!(f, "{}", name)
    }
}

/// The two halves of an edited timestamp.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DateTimeEdit {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl DateTimeEdit {
    /// Both halves or nothing.
    pub fn combine(&self) -> Option<NaiveDateTime> {
        Some(self.date?.and_time(self.time?))
    }
}

#[derive(Clone, Debug)]
pub struct EditSession {
    identifier: Identifier,
    texts: BTreeMap<Field, String>,
    timestamps: BTreeMap<Field, DateTimeEdit>,
    stage: EditStage,
    trail: Vec<EditStage>,
}

impl EditSession {
    pub fn new(identifier: Identifier) -> EditSession {
        EditSession {
            identifier,
            texts: BTreeMap::new(),
            timestamps: BTreeMap::new(),
            stage: EditStage::Selected,
            trail: vec![EditStage::Selected],
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn stage(&self) -> EditStage {
        self.stage
    }

    /// Every stage the session went through, oldest first.
    pub fn trail(&self) -> &[EditStage] {
        &self.trail
    }

    pub fn set_text(&mut self, field: Field, value: impl Into<String>) -> Result<(), MergeError> {
        if field.is_timestamp() {
            return Err(MergeError::TimestampField(field));
        }
        self.texts.insert(field, value.into());
        Ok(())
    }

    pub fn set_date(&mut self, field: Field, date: Option<NaiveDate>) -> Result<(), MergeError> {
        self.timestamp_mut(field)?.date = date;
        Ok(())
    }

    pub fn set_time(&mut self, field: Field, time: Option<NaiveTime>) -> Result<(), MergeError> {
        self.timestamp_mut(field)?.time = time;
        Ok(())
    }

    /// Sets both halves from an existing value (or clears both).
    pub fn set_timestamp(&mut self, field: Field, timestamp: Option<NaiveDateTime>) -> Result<(), MergeError> {
        let edit = self.timestamp_mut(field)?;
        edit.date = timestamp.map(|timestamp| timestamp.date());
        edit.time = timestamp.map(|timestamp| timestamp.time());
        Ok(())
    }

    fn timestamp_mut(&mut self, field: Field) -> Result<&mut DateTimeEdit, MergeError> {
        if !field.is_timestamp() {
            return Err(MergeError::NotATimestamp(field));
        }
        Ok(self.timestamps.entry(field).or_default())
    }

    /// Fields the operator touched, in column order.
    pub fn edited_fields(&self) -> Vec<Field> {
        let mut fields: Vec<Field> = self.texts.keys().chain(self.timestamps.keys()).copied().collect();
        fields.sort();
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.timestamps.is_empty()
    }

    pub(crate) fn advance(&mut self, stage: EditStage) {
        log::debug!("edit '{}': {} -> {}", self.identifier, self.stage, stage);
        self.stage = stage;
        self.trail.push(stage);
    }

    /// Back to `Selected` after a failure; the edit has to be submitted again.
    pub(crate) fn reset(&mut self) {
        self.advance(EditStage::Selected);
    }
}

/// Applies an edit session to the occurrence found in the store.
pub fn merge(schema: &SheetSchema, original: &Occurrence, session: &EditSession) -> Result<Occurrence, MergeError> {
    if let Some(field) = session.edited_fields().into_iter().find(|field| !schema.is_editable(*field)) {
        return Err(MergeError::NotEditable(field, schema.category().to_string()));
    }
    let mut merged = original.clone();
    for (field, value) in &session.texts {
        merged.set_text(*field, value.to_owned());
    }
    for (field, edit) in &session.timestamps {
        let text = edit.combine().map(|timestamp| format_timestamp(&timestamp)).unwrap_or_default();
        merged.set_text(*field, text);
    }
    Ok(merged)
}

/// Store representation of one field. Parsed timestamps are normalised to
/// `YYYY-MM-DD HH:MM:SS`; text that does not parse is written back untouched.
pub fn cell_value(occurrence: &Occurrence, field: Field) -> CellValue {
    let text = occurrence.text(field);
    if field.is_timestamp() {
        return match occurrence.timestamp(field) {
            Some(timestamp) => CellValue::Text(format_timestamp(&timestamp)),
            None => CellValue::text(text),
        };
    }
    if field == Field::Quantity {
        if let Some(quantity) = occurrence.quantity() {
            return CellValue::Number(quantity);
        }
    }
    CellValue::text(text)
}

/// The full row in layout order, for structured writes.
pub fn row_values(schema: &SheetSchema, occurrence: &Occurrence) -> Vec<CellValue> {
    schema.fields().iter().map(|field| cell_value(occurrence, *field)).collect()
}

/// Editable fields only, for cell-range writes.
pub fn editable_values(schema: &SheetSchema, occurrence: &Occurrence) -> Vec<(Field, CellValue)> {
    schema
        .editable_fields()
        .map(|field| (field, cell_value(occurrence, field)))
        .collect()
}
