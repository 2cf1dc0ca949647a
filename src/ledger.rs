//! # Occurrence Ledger
//!
//! Read-modify-write operations over a [`SheetStore`]. Reads for listing go
//! through short-lived caches; every write starts from a fresh read, resolves
//! its target by composite identifier and invalidates the caches once the
//! store accepted it.
//!
//! Structured stores receive whole rows at the resolved position. Cell-range
//! stores receive the editable cells one by one at the row found by scanning
//! the sheet below its header, followed by a single commit. A failed write
//! discards whatever the store staged, so nothing partial reaches it.

use crate::cache::TtlCache;
use crate::config::Config;
use crate::config::SheetNames;
use crate::draft::NewOccurrence;
use crate::error::ResultMessage;
use crate::error::UsinaSheetError;
use crate::identifier::duplicates;
use crate::identifier::locate_row_number;
use crate::identifier::resolve;
use crate::identifier::Identifier;
use crate::merge::cell_value;
use crate::merge::editable_values;
use crate::merge::merge;
use crate::merge::row_values;
use crate::merge::EditSession;
use crate::merge::EditStage;
use crate::occurrence::Category;
use crate::occurrence::Field;
use crate::occurrence::Occurrence;
use crate::reference_data::ReferenceData;
use crate::schema::SheetSchema;
use crate::spreadsheet::SheetStore;
use crate::spreadsheet::SheetTable;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::WriteMode;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum LedgerError {
    /// The identifier matched no row of the freshly read sheets
    #[error("No occurrence matches '{0}'")]
    OccurrenceNotFound(Identifier),

    #[error("Select an occurrence before editing")]
    NoSelection,
}

pub struct Ledger<S: SheetStore> {
    store: S,
    sheets: SheetNames,
    occurrences: TtlCache<Vec<Occurrence>>,
    reference: TtlCache<ReferenceData>,
}

impl<S: SheetStore> Ledger<S> {
    pub fn new(store: S, config: &Config) -> Ledger<S> {
        Ledger {
            store,
            sheets: config.sheets.clone(),
            occurrences: TtlCache::new(config.cache_ttl()),
            reference: TtlCache::new(config.cache_ttl()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Occurrences of every category, shutdowns first, each in sheet order.
    pub fn occurrences(&mut self) -> Result<&[Occurrence], UsinaSheetError> {
        let occurrences = self
            .occurrences
            .get_or_try_load(|| read_occurrences(&mut self.store, &self.sheets))?;
        Ok(occurrences)
    }

    /// Drops the cached reads; the next call goes to the store.
    pub fn reload(&mut self) {
        self.occurrences.invalidate();
        self.reference.invalidate();
    }

    /// Looks an identifier up in the cached collection.
    pub fn find(&mut self, identifier: &Identifier) -> Result<Occurrence, UsinaSheetError> {
        let occurrences = self.occurrences()?;
        match resolve(occurrences, identifier) {
            Some(occurrence) => Ok(occurrence.clone()),
            None => Err(LedgerError::OccurrenceNotFound(identifier.clone()).into()),
        }
    }

    /// Identifiers that more than one occurrence shares.
    pub fn collisions(&mut self) -> Result<Vec<(Identifier, usize)>, UsinaSheetError> {
        Ok(duplicates(self.occurrences()?))
    }

    pub fn reference_data(&mut self) -> Result<&ReferenceData, UsinaSheetError> {
        let reference = self
            .reference
            .get_or_try_load(|| read_reference_data(&mut self.store, &self.sheets).with_prefix("load options"))?;
        Ok(reference)
    }

    /// Runs one edit session against the store.
    ///
    /// The session advances `Selected -> Loaded -> Matched -> Written`, or
    /// stops at `NotFound` without writing. Any failure sends it back to
    /// `Selected` and the edit has to be submitted again.
    pub fn commit_edit(&mut self, session: &mut EditSession) -> Result<Occurrence, UsinaSheetError> {
        if session.identifier().as_str().trim().is_empty() {
            Err(LedgerError::NoSelection)?
        }
        match self.write_edit(session) {
            Ok(written) => {
                session.advance(EditStage::Written);
                self.reload();
                log::info!(
                    "{} row {}: updated {} field(s) of '{}'",
                    written.category,
                    written.row_number,
                    session.edited_fields().len(),
                    session.identifier()
                );
                Ok(written)
            }
            Err(error) => {
                self.store.discard();
                session.reset();
                Err(error)
            }
        }
    }

    fn write_edit(&mut self, session: &mut EditSession) -> Result<Occurrence, UsinaSheetError> {
        let mut tables = Vec::new();
        let mut occurrences = Vec::new();
        for category in Category::ALL {
            let (table, loaded) = read_category(&mut self.store, &self.sheets, category)?;
            tables.push((category, table));
            occurrences.extend(loaded);
        }
        session.advance(EditStage::Loaded);

        let identifier = session.identifier().clone();
        let target = resolve(&occurrences, &identifier).and_then(|original| {
            let schema = SheetSchema::for_category(original.category);
            let row_number = match self.store.write_mode() {
                WriteMode::Structured => Some(original.row_number),
                WriteMode::CellRange => tables
                    .iter()
                    .find(|(category, _)| *category == original.category)
                    .and_then(|(_, table)| locate_row_number(table, &schema, &identifier)),
            };
            row_number.map(|row_number| (original, schema, row_number))
        });
        let Some((original, schema, row_number)) = target else {
            session.advance(EditStage::NotFound);
            return Err(LedgerError::OccurrenceNotFound(identifier).into());
        };
        session.advance(EditStage::Matched);

        let mut merged = merge(&schema, original, session)?;
        merged.row_number = row_number;
        let sheet_name = self.sheets.for_category(merged.category).to_owned();
        match self.store.write_mode() {
            WriteMode::Structured => {
                self.store.update_row(&sheet_name, row_number, &row_values(&schema, &merged))?;
            }
            WriteMode::CellRange => {
                for (field, value) in editable_values(&schema, &merged) {
                    self.store.set_cell(&sheet_name, &schema.column_letter(field)?, row_number, &value)?;
                }
            }
        }
        self.store.commit()?;
        Ok(merged)
    }

    /// Writes every item of a draft as a new row of its category sheet.
    /// Nothing is written when the draft does not resolve completely.
    pub fn append(&mut self, draft: &NewOccurrence) -> Result<Vec<Occurrence>, UsinaSheetError> {
        let mut occurrences = draft.build(self.reference_data()?)?;
        match self.write_new_rows(draft.category, &mut occurrences) {
            Ok(()) => {
                self.reload();
                log::info!("{}: added {} occurrence(s)", draft.category, occurrences.len());
                Ok(occurrences)
            }
            Err(error) => {
                self.store.discard();
                Err(error)
            }
        }
    }

    fn write_new_rows(&mut self, category: Category, occurrences: &mut [Occurrence]) -> Result<(), UsinaSheetError> {
        let schema = SheetSchema::for_category(category);
        let sheet_name = self.sheets.for_category(category).to_owned();
        let table = self.store.read_all_rows(&sheet_name)?;
        schema.validate(&table)?;

        let rows = free_rows(&table, &schema, occurrences.len());
        for (occurrence, row_number) in occurrences.iter_mut().zip(rows) {
            occurrence.row_number = row_number;
            match self.store.write_mode() {
                WriteMode::Structured => {
                    if let Some(existing) = table.rows.iter().find(|row| row.number == row_number) {
                        let existing = schema.occurrence_from_row(existing);
                        occurrence.set_text(Field::Identifier, existing.text(Field::Identifier));
                    }
                    self.store.update_row(&sheet_name, row_number, &row_values(&schema, occurrence))?;
                }
                WriteMode::CellRange => {
                    for field in schema.fields().iter().filter(|field| **field != Field::Identifier) {
                        let column = schema.column_letter(*field)?;
                        self.store.set_cell(&sheet_name, &column, row_number, &cell_value(occurrence, *field))?;
                    }
                }
            }
        }
        self.store.commit()
    }
}

/// Reads and loads one category sheet.
fn read_category<S: SheetStore>(
    store: &mut S,
    sheets: &SheetNames,
    category: Category,
) -> Result<(SheetTable, Vec<Occurrence>), UsinaSheetError> {
    let table = store.read_all_rows(sheets.for_category(category))?;
    let occurrences = SheetSchema::for_category(category).load(&table)?;
    Ok((table, occurrences))
}

fn read_occurrences<S: SheetStore>(store: &mut S, sheets: &SheetNames) -> Result<Vec<Occurrence>, UsinaSheetError> {
    let mut occurrences = Vec::new();
    for category in Category::ALL {
        let (_, loaded) = read_category(store, sheets, category)?;
        occurrences.extend(loaded);
    }
    for (identifier, count) in duplicates(&occurrences) {
        log::warn!("identifier '{}' is shared by {} occurrences", identifier, count);
    }
    Ok(occurrences)
}

fn read_reference_data<S: SheetStore>(store: &mut S, sheets: &SheetNames) -> Result<ReferenceData, UsinaSheetError> {
    let options = store.read_all_rows(&sheets.options)?;
    let assets = match store.read_all_rows(&sheets.assets) {
        Ok(table) => Some(table),
        Err(UsinaSheetError::SpreadsheetError(SpreadsheetError::SheetNotFound(name))) => {
            log::warn!("sheet '{}' not found, detailed assets unavailable", name);
            None
        }
        Err(error) => return Err(error),
    };
    Ok(ReferenceData::new(options, assets)?)
}

/// Rows for new occurrences: rows with an empty UG cell in sheet order,
/// then the rows after the last one read.
fn free_rows(table: &SheetTable, schema: &SheetSchema, count: usize) -> Vec<usize> {
    let ug = schema.column_index(Field::Ug);
    let mut rows: Vec<usize> = table
        .rows
        .iter()
        .filter(|row| ug.is_some_and(|col| row.get(col).trim().is_empty()))
        .map(|row| row.number)
        .take(count)
        .collect();
    let mut next = table.rows.last().map(|row| row.number).unwrap_or(table.header_row) + 1;
    while rows.len() < count {
        rows.push(next);
        next += 1;
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::DateTimeEdit;
    use crate::occurrence::parse_timestamp;
    use crate::reference_data::fixtures::assets_grid;
    use crate::reference_data::fixtures::options_grid;
    use crate::schema::fixtures::header;
    use crate::schema::fixtures::line;
    use crate::spreadsheet::memory::MemorySpreadsheet;
    use crate::spreadsheet::session::WorkbookSession;
    use crate::spreadsheet::xlsx::fixtures::write_workbook;
    use chrono::NaiveDate;
    use chrono::NaiveTime;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const FAILURE: &str = "UG01|INVERSOR|FALHA|2025-03-01 10:00:00";

    fn shutdown_lines() -> Vec<Vec<String>> {
        let category = Category::Shutdowns;
        vec![
            header(category),
            line(
                category,
                &[
                    (Field::Client, "ACME"),
                    (Field::Ug, "UG01"),
                    (Field::Abbreviation, "AC1"),
                    (Field::Asset, "inversor"),
                    (Field::AssetName, "INV-01"),
                    (Field::Occurrence, "falha"),
                    (Field::Shutdown, "2025-03-01 10:00:00"),
                    (Field::Normalization, "2025-03-01 15:00:00"),
                    (Field::ServiceOrder, "OS-1"),
                ],
            ),
            line(
                category,
                &[
                    (Field::Client, "ACME"),
                    (Field::Ug, "UG02"),
                    (Field::Asset, "TRAFO"),
                    (Field::Occurrence, "DESARME"),
                    (Field::Shutdown, "2025-03-02 08:30:00"),
                ],
            ),
        ]
    }

    fn equipment_lines() -> Vec<Vec<String>> {
        let category = Category::Equipment;
        vec![
            header(category),
            line(
                category,
                &[
                    (Field::Ug, "UG03"),
                    (Field::Asset, "STRING"),
                    (Field::Occurrence, "QUEIMA"),
                    (Field::Quantity, "3"),
                    (Field::Shutdown, "2025-02-10 09:00:00"),
                ],
            ),
        ]
    }

    fn memory_store(write_mode: WriteMode) -> MemorySpreadsheet {
        let mut store = MemorySpreadsheet::new().with_write_mode(write_mode);
        store.insert_sheet("DESLIGAMENTOS", &shutdown_lines());
        store.insert_sheet("EQUIPAMENTOS", &equipment_lines());
        store.insert_sheet("DADOS", &options_grid());
        store.insert_sheet("Usinas_Detalhado", &assets_grid());
        store
    }

    fn ledger(write_mode: WriteMode) -> Ledger<MemorySpreadsheet> {
        Ledger::new(memory_store(write_mode), &Config::default())
    }

    fn column(category: Category, field: Field) -> usize {
        SheetSchema::for_category(category).column_index(field).unwrap()
    }

    #[test]
    fn test_occurrences_span_both_categories() {
        let mut ledger = ledger(WriteMode::Structured);
        let occurrences = ledger.occurrences().unwrap();
        assert_eq!(occurrences.len(), 3);
        assert_eq!(occurrences[0].category, Category::Shutdowns);
        assert_eq!(occurrences[0].row_number, 2);
        assert_eq!(occurrences[2].category, Category::Equipment);
        assert_eq!(Identifier::of(&occurrences[0]).as_str(), FAILURE);

        let found = ledger.find(&Identifier::from("UG03|STRING|QUEIMA|2025-02-10 09:00:00")).unwrap();
        assert_eq!(found.quantity(), Some(3.0));
        let error = ledger.find(&Identifier::from("UG09|X|Y|NaT")).unwrap_err();
        assert!(error.is_not_found());
        assert!(ledger.collisions().unwrap().is_empty());
    }

    #[test]
    fn test_reads_are_cached_until_a_write() {
        let mut ledger = ledger(WriteMode::Structured);
        assert_eq!(ledger.occurrences().unwrap().len(), 3);
        let extra = line(Category::Shutdowns, &[(Field::Ug, "UG05"), (Field::Occurrence, "NOVA")]);
        let mut lines = shutdown_lines();
        lines.push(extra);
        ledger.store_mut().insert_sheet("DESLIGAMENTOS", &lines);
        assert_eq!(ledger.occurrences().unwrap().len(), 3);
        ledger.reload();
        assert_eq!(ledger.occurrences().unwrap().len(), 4);
    }

    #[test]
    fn test_structured_edit_round_trip() {
        let mut ledger = ledger(WriteMode::Structured);
        let mut session = EditSession::new(Identifier::from(FAILURE));
        session.set_text(Field::Description, "Troca de fusível").unwrap();
        session.set_text(Field::Operator, "ANA").unwrap();
        session.set_date(Field::ClientNotified, NaiveDate::from_ymd_opt(2025, 3, 1)).unwrap();
        session.set_time(Field::ClientNotified, NaiveTime::from_hms_opt(10, 30, 0)).unwrap();
        let written = ledger.commit_edit(&mut session).unwrap();
        assert_eq!(
            session.trail(),
            &[EditStage::Selected, EditStage::Loaded, EditStage::Matched, EditStage::Written]
        );
        assert_eq!(written.row_number, 2);
        assert_eq!(ledger.store().writes(), 1);

        let reread = ledger.find(&Identifier::from(FAILURE)).unwrap();
        let schema = SheetSchema::for_category(Category::Shutdowns);
        for field in schema.editable_fields() {
            assert_eq!(reread.text(field), written.text(field), "{}", field);
        }
        assert_eq!(reread.text(Field::Description), "Troca de fusível");
        assert_eq!(reread.text(Field::Operator), "ANA");
        assert_eq!(reread.text(Field::ClientNotified), "2025-03-01 10:30:00");
        assert_eq!(reread.text(Field::Normalization), "2025-03-01 15:00:00");
        assert_eq!(reread.text(Field::Client), "ACME");
        assert_eq!(reread.text(Field::Abbreviation), "AC1");
        assert_eq!(reread.text(Field::ServiceOrder), "OS-1");
    }

    #[test]
    fn test_edit_finds_row_after_unrelated_inserts() {
        let mut ledger = ledger(WriteMode::Structured);
        let mut session = EditSession::new(Identifier::from(FAILURE));
        session.set_text(Field::Protocol, "P-77").unwrap();

        let mut lines = shutdown_lines();
        let newcomer = line(Category::Shutdowns, &[(Field::Ug, "UG07"), (Field::Occurrence, "OUTRA")]);
        lines.insert(1, newcomer.clone());
        lines.insert(1, newcomer);
        ledger.store_mut().insert_sheet("DESLIGAMENTOS", &lines);

        let written = ledger.commit_edit(&mut session).unwrap();
        assert_eq!(written.row_number, 4);
        let store = ledger.store();
        assert_eq!(store.cell("DESLIGAMENTOS", 4, column(Category::Shutdowns, Field::Protocol)), Some("P-77"));
        assert_eq!(store.cell("DESLIGAMENTOS", 2, column(Category::Shutdowns, Field::Protocol)), Some(""));
    }

    #[test]
    fn test_unknown_identifier_writes_nothing() {
        for write_mode in [WriteMode::Structured, WriteMode::CellRange] {
            let mut ledger = ledger(write_mode);
            let mut session = EditSession::new(Identifier::from("UG01|INVERSOR|FALHA|2025-03-01 10:00:01"));
            session.set_text(Field::Operator, "ANA").unwrap();
            let error = ledger.commit_edit(&mut session).unwrap_err();
            assert!(error.is_not_found());
            assert_eq!(
                session.trail(),
                &[EditStage::Selected, EditStage::Loaded, EditStage::NotFound, EditStage::Selected]
            );
            assert_eq!(ledger.store().writes(), 0);
        }
    }

    #[test]
    fn test_blank_selection_is_rejected() {
        let mut ledger = ledger(WriteMode::Structured);
        let mut session = EditSession::new(Identifier::from(" "));
        let error = ledger.commit_edit(&mut session).unwrap_err();
        assert!(matches!(error, UsinaSheetError::LedgerError(LedgerError::NoSelection)));
        assert_eq!(session.trail(), &[EditStage::Selected]);
    }

    #[test]
    fn test_date_only_normalization_clears_the_field() {
        let mut ledger = ledger(WriteMode::Structured);
        let mut session = EditSession::new(Identifier::from(FAILURE));
        session.set_date(Field::Normalization, NaiveDate::from_ymd_opt(2025, 3, 4)).unwrap();
        ledger.commit_edit(&mut session).unwrap();
        let col = column(Category::Shutdowns, Field::Normalization);
        assert_eq!(ledger.store().cell("DESLIGAMENTOS", 2, col), Some(""));
        assert!(ledger.find(&Identifier::from(FAILURE)).unwrap().is_open());
    }

    #[test]
    fn test_edit_of_protected_field_fails_and_resets() {
        let mut ledger = ledger(WriteMode::Structured);
        let mut session = EditSession::new(Identifier::from(FAILURE));
        session.set_text(Field::Client, "OTHER").unwrap();
        let error = ledger.commit_edit(&mut session).unwrap_err();
        assert!(matches!(error, UsinaSheetError::MergeError(_)));
        assert_eq!(session.stage(), EditStage::Selected);
        assert_eq!(ledger.store().writes(), 0);
    }

    #[test]
    fn test_cell_range_edit_writes_editable_cells_only() {
        let mut ledger = ledger(WriteMode::CellRange);
        let mut session = EditSession::new(Identifier::from("UG03|STRING|QUEIMA|2025-02-10 09:00:00"));
        session.set_text(Field::Quantity, "5").unwrap();
        session.set_date(Field::Normalization, NaiveDate::from_ymd_opt(2025, 2, 11)).unwrap();
        session.set_time(Field::Normalization, NaiveTime::from_hms_opt(7, 15, 0)).unwrap();
        let written = ledger.commit_edit(&mut session).unwrap();
        assert_eq!(written.row_number, 2);

        let schema = SheetSchema::for_category(Category::Equipment);
        assert_eq!(ledger.store().writes(), schema.editable_fields().count());
        let store = ledger.store();
        assert_eq!(store.cell("EQUIPAMENTOS", 2, column(Category::Equipment, Field::Quantity)), Some("5"));
        assert_eq!(
            store.cell("EQUIPAMENTOS", 2, column(Category::Equipment, Field::Normalization)),
            Some("2025-02-11 07:15:00")
        );
        let reread = ledger.find(&Identifier::from("UG03|STRING|QUEIMA|2025-02-10 09:00:00")).unwrap();
        assert_eq!(reread.timestamp(Field::Normalization), parse_timestamp("2025-02-11 07:15:00"));
    }

    #[test]
    fn test_cell_range_scan_stops_at_blank_row() {
        let mut store = memory_store(WriteMode::CellRange);
        let mut lines = shutdown_lines();
        lines.insert(1, vec![String::new(); lines[0].len()]);
        store.insert_sheet("DESLIGAMENTOS", &lines);
        let mut ledger = Ledger::new(store, &Config::default());
        let mut session = EditSession::new(Identifier::from(FAILURE));
        session.set_text(Field::Operator, "ANA").unwrap();
        assert!(ledger.commit_edit(&mut session).unwrap_err().is_not_found());
        assert_eq!(ledger.store().writes(), 0);
    }

    #[test]
    fn test_append_fills_empty_rows_then_grows() {
        let mut store = memory_store(WriteMode::Structured);
        let mut lines = equipment_lines();
        lines.insert(1, line(Category::Equipment, &[(Field::Identifier, "=A2")]));
        store.insert_sheet("EQUIPAMENTOS", &lines);
        let mut ledger = Ledger::new(store, &Config::default());

        let mut draft = NewOccurrence::new(Category::Equipment);
        draft.items = vec!["UG01".to_owned(), "UG02".to_owned()];
        draft.asset = "TRAFO".to_owned();
        draft.occurrence = "DESARME".to_owned();
        draft.quantity = 2;
        draft.timestamps.insert(
            Field::Shutdown,
            DateTimeEdit { date: NaiveDate::from_ymd_opt(2025, 4, 1), time: NaiveTime::from_hms_opt(6, 0, 0) },
        );
        let added = ledger.append(&draft).unwrap();
        assert_eq!(added.iter().map(|occurrence| occurrence.row_number).collect::<Vec<_>>(), vec![2, 4]);

        let store = ledger.store();
        assert_eq!(store.cell("EQUIPAMENTOS", 2, column(Category::Equipment, Field::Identifier)), Some("=A2"));
        assert_eq!(store.cell("EQUIPAMENTOS", 2, column(Category::Equipment, Field::Abbreviation)), Some("AC1"));
        assert_eq!(store.cell("EQUIPAMENTOS", 3, column(Category::Equipment, Field::Ug)), Some("UG03"));
        assert_eq!(store.cell("EQUIPAMENTOS", 4, column(Category::Equipment, Field::Quantity)), Some("2"));

        let found = ledger.find(&Identifier::from("UG02|TRAFO|DESARME|2025-04-01 06:00:00")).unwrap();
        assert_eq!(found.text(Field::Client), "ACME");
        assert_eq!(found.row_number, 4);
    }

    #[test]
    fn test_append_with_unknown_ug_writes_nothing() {
        let mut ledger = ledger(WriteMode::CellRange);
        let mut draft = NewOccurrence::new(Category::Shutdowns);
        draft.items = vec!["UG01".to_owned(), "UG42".to_owned()];
        assert!(ledger.append(&draft).is_err());
        assert_eq!(ledger.store().writes(), 0);
    }

    #[test]
    fn test_missing_asset_sheet_is_tolerated() {
        let mut store = MemorySpreadsheet::new();
        store.insert_sheet("DADOS", &options_grid());
        let mut ledger = Ledger::new(store, &Config::default());
        let reference = ledger.reference_data().unwrap();
        assert!(reference.detailed_asset_names("INVERSOR", &["UG01".to_owned()]).is_empty());

        let mut ledger = Ledger::new(MemorySpreadsheet::new(), &Config::default());
        let error = ledger.reference_data().err().unwrap();
        assert_eq!(error.to_string(), "load options: Sheet 'DADOS' not found");
    }

    fn sheet_xml(lines: &[Vec<String>]) -> String {
        let mut xml = String::new();
        for (row, line) in lines.iter().enumerate() {
            xml.push_str(&format!(r#"<row r="{}">"#, row + 1));
            for (col, value) in line.iter().enumerate().filter(|(_, value)| !value.is_empty()) {
                xml.push_str(&format!(
                    r#"<c r="{}{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    crate::spreadsheet::reference::index_to_col(col),
                    row + 1,
                    value
                ));
            }
            xml.push_str("</row>");
        }
        xml
    }

    #[test]
    fn test_workbook_session_edit_and_append() {
        let shutdowns = sheet_xml(&shutdown_lines());
        let equipment = sheet_xml(&equipment_lines());
        let to_lines = |grid: Vec<Vec<&str>>| -> Vec<Vec<String>> {
            grid.into_iter().map(|line| line.into_iter().map(str::to_owned).collect()).collect()
        };
        let options = sheet_xml(&to_lines(options_grid()));
        let path = write_workbook(
            "ledger.xlsx",
            &[("DESLIGAMENTOS", shutdowns.as_str()), ("EQUIPAMENTOS", equipment.as_str()), ("DADOS", options.as_str())],
            &[],
        );

        {
            let session = WorkbookSession::open(&path, 1).unwrap();
            let mut ledger = Ledger::new(session, &Config::default());
            let mut edit = EditSession::new(Identifier::from(FAILURE));
            edit.set_text(Field::Operator, "ANA").unwrap();
            edit.set_time(Field::Normalization, None).unwrap();
            ledger.commit_edit(&mut edit).unwrap();
            assert_eq!(ledger.store().pending_cells(), 0);

            let mut draft = NewOccurrence::new(Category::Shutdowns);
            draft.items = vec!["UG03".to_owned()];
            draft.asset = "TRAFO".to_owned();
            draft.occurrence = "TRAVADO".to_owned();
            let added = ledger.append(&draft).unwrap();
            assert_eq!(added[0].row_number, 4);
        }

        let session = WorkbookSession::open(&path, 1).unwrap();
        let mut ledger = Ledger::new(session, &Config::default());
        let edited = ledger.find(&Identifier::from(FAILURE)).unwrap();
        assert_eq!(edited.text(Field::Operator), "ANA");
        assert_eq!(edited.text(Field::Normalization), "");
        assert_eq!(edited.text(Field::Client), "ACME");
        let added = ledger.find(&Identifier::from("UG03|TRAFO|TRAVADO|NaT")).unwrap();
        assert_eq!(added.text(Field::Abbreviation), "SS3");
        assert_eq!(ledger.occurrences().unwrap().len(), 4);
    }

    /// Appends an entry whose local header is broken. The workbook still opens
    /// and reads, but copying the archive fails once it reaches that entry.
    fn append_broken_entry(path: &Path) {
        let file = OpenOptions::new().read(true).write(true).open(path).unwrap();
        let mut zip = ZipWriter::new_append(file).unwrap();
        zip.start_file("docProps/app.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<Properties/>").unwrap();
        zip.finish().unwrap();

        let name = b"docProps/app.xml";
        let mut bytes = std::fs::read(path).unwrap();
        let at = bytes.windows(name.len()).position(|window| window == name).unwrap();
        bytes[at - 30..at - 26].copy_from_slice(b"XXXX");
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_failed_workbook_commit_leaves_file_untouched() {
        let shutdowns = sheet_xml(&shutdown_lines());
        let equipment = sheet_xml(&equipment_lines());
        let path = write_workbook(
            "ledger_failed.xlsx",
            &[("DESLIGAMENTOS", shutdowns.as_str()), ("EQUIPAMENTOS", equipment.as_str())],
            &[],
        );
        append_broken_entry(&path);
        let before = std::fs::read(&path).unwrap();
        let temp_path = path.with_file_name("~ledger_failed.xlsx.tmp");
        let lock_path = path.with_file_name("~$ledger_failed.xlsx");

        {
            let session = WorkbookSession::open(&path, 1).unwrap();
            assert!(lock_path.exists());
            let mut ledger = Ledger::new(session, &Config::default());
            let mut edit = EditSession::new(Identifier::from(FAILURE));
            edit.set_text(Field::Operator, "ANA").unwrap();
            assert!(ledger.commit_edit(&mut edit).is_err());

            assert_eq!(edit.stage(), EditStage::Selected);
            assert_eq!(ledger.store().pending_cells(), 0);
            assert!(!temp_path.exists());
            assert_eq!(std::fs::read(&path).unwrap(), before);
            assert_eq!(ledger.find(&Identifier::from(FAILURE)).unwrap().text(Field::Operator), "");
        }

        assert!(!lock_path.exists());
        assert!(!temp_path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
