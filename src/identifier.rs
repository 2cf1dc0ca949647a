//! # Composite Identifier
//!
//! Occurrences have no stored key. They are found again through
//! `upper(UG)|upper(Asset)|upper(Occurrence)|Shutdown`, recomputed from the
//! current field values every time a collection is searched. Positions are
//! never reused between the moment an occurrence is picked and the moment it
//! is written back.
//!
//! Two occurrences sharing all four parts cannot be told apart. Resolution
//! picks the first one in sheet order and logs a warning; [`duplicates`]
//! lists the affected identifiers so callers can surface them.

use crate::occurrence::format_timestamp;
use crate::occurrence::Field;
use crate::occurrence::Occurrence;
use crate::schema::SheetSchema;
use crate::spreadsheet::SheetTable;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Suffix used when the shutdown timestamp is absent or cannot be parsed.
pub const MISSING_TIMESTAMP: &str = "NaT";

const SEPARATOR: char = '|';

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn derive(ug: &str, asset: &str, occurrence: &str, shutdown: Option<&NaiveDateTime>) -> Identifier {
        let shutdown = shutdown
            .map(format_timestamp)
            .unwrap_or_else(|| MISSING_TIMESTAMP.to_owned());
        Identifier(format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            ug.to_uppercase(),
            asset.to_uppercase(),
            occurrence.to_uppercase(),
            shutdown
        ))
    }

    /// Identifier of an occurrence from its current field values.
    pub fn of(occurrence: &Occurrence) -> Identifier {
        Identifier::derive(
            occurrence.text(Field::Ug),
            occurrence.text(Field::Asset),
            occurrence.text(Field::Occurrence),
            occurrence.shutdown().as_ref(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the shutdown part is the missing-timestamp sentinel.
    pub fn has_missing_timestamp(&self) -> bool {
        self.0.rsplit(SEPARATOR).next() == Some(MISSING_TIMESTAMP)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identifier {
    /// Takes a previously captured identifier as is.
    fn from(value: &str) -> Self {
        Identifier(value.to_owned())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Identifier(value)
    }
}

/// Finds the occurrence an identifier points at. First match wins.
pub fn resolve<'a>(occurrences: &'a [Occurrence], identifier: &Identifier) -> Option<&'a Occurrence> {
    let mut matches = occurrences
        .iter()
        .filter(|occurrence| Identifier::of(occurrence) == *identifier);
    let first = matches.next()?;
    let others = matches.count();
    if others > 0 {
        log::warn!(
            "identifier '{}' matches {} occurrences, using row {}",
            identifier,
            others + 1,
            first.row_number
        );
    }
    Some(first)
}

/// Finds the 1-based sheet row of an identifier by scanning the rows below
/// the header in order. The scan ends at the first fully empty row.
pub fn locate_row_number(table: &SheetTable, schema: &SheetSchema, identifier: &Identifier) -> Option<usize> {
    table
        .rows
        .iter()
        .take_while(|row| !row.is_blank())
        .find(|row| Identifier::of(&schema.occurrence_from_row(row)) == *identifier)
        .map(|row| row.number)
}

/// Identifiers shared by more than one occurrence, with their counts.
pub fn duplicates(occurrences: &[Occurrence]) -> Vec<(Identifier, usize)> {
    let mut counts = BTreeMap::<Identifier, usize>::new();
    for occurrence in occurrences {
        *counts.entry(Identifier::of(occurrence)).or_default() += 1;
    }
    counts.into_iter().filter(|(_, count)| *count > 1).collect()
}
