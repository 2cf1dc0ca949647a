//! New occurrences as entered by an operator, before they reach a sheet.
//!
//! A draft names one or more items. For plain assets the items are UGs; for
//! inverters, trackers and strings they are asset names from the detailed
//! asset sheet, and the UG is the plant the asset belongs to. Every item
//! becomes one row.

use crate::error::UsinaSheetError;
use crate::merge::DateTimeEdit;
use crate::occurrence::format_timestamp;
use crate::occurrence::Category;
use crate::occurrence::Field;
use crate::occurrence::Occurrence;
use crate::reference_data::ReferenceData;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use thiserror::Error;

/// Value of an option list entry meaning "nothing chosen".
pub const PLACEHOLDER: &str = "-";

#[derive(Error, Debug, PartialEq)]
pub enum DraftError {
    #[error("Select one or more UGs or asset names")]
    NoItems,
}

#[derive(Clone, Debug)]
pub struct NewOccurrence {
    pub category: Category,
    /// UGs, or detailed asset names when `asset` is a detailed kind
    pub items: Vec<String>,
    /// Plants searched for detailed asset names
    pub plants: Vec<String>,
    pub occurrence_type: String,
    pub asset: String,
    pub occurrence: String,
    pub operator: String,
    pub description: String,
    pub protocol: String,
    pub service_order: String,
    /// Only written for equipment occurrences
    pub quantity: u32,
    /// Date and time shared by every item
    pub timestamps: BTreeMap<Field, DateTimeEdit>,
    /// Per-item halves that take precedence over the shared ones
    pub item_timestamps: BTreeMap<String, BTreeMap<Field, DateTimeEdit>>,
}

impl NewOccurrence {
    pub fn new(category: Category) -> NewOccurrence {
        NewOccurrence {
            category,
            items: Vec::new(),
            plants: Vec::new(),
            occurrence_type: String::new(),
            asset: String::new(),
            occurrence: String::new(),
            operator: String::new(),
            description: String::new(),
            protocol: String::new(),
            service_order: String::new(),
            quantity: 1,
            timestamps: BTreeMap::new(),
            item_timestamps: BTreeMap::new(),
        }
    }

    /// Combined timestamp of one event for one item; both halves or nothing.
    pub fn timestamp_for(&self, item: &str, field: Field) -> Option<NaiveDateTime> {
        let shared = self.timestamps.get(&field).copied().unwrap_or_default();
        let specific = self
            .item_timestamps
            .get(item)
            .and_then(|fields| fields.get(&field))
            .copied()
            .unwrap_or_default();
        DateTimeEdit { date: specific.date.or(shared.date), time: specific.time.or(shared.time) }.combine()
    }

    /// Resolves every item to a complete occurrence. Fails without partial
    /// results when any item has no UG or no reference entry.
    pub fn build(&self, reference: &ReferenceData) -> Result<Vec<Occurrence>, UsinaSheetError> {
        if self.items.is_empty() {
            Err(DraftError::NoItems)?
        }
        let detailed = ReferenceData::is_detailed_kind(&self.asset);
        self.items
            .iter()
            .map(|item| -> Result<Occurrence, UsinaSheetError> {
                let ug = if detailed {
                    reference.plant_for_asset(item, &self.plants)?
                } else {
                    item.to_owned()
                };
                let (client, abbreviation) = reference.client_and_abbreviation(&ug)?;
                let mut occurrence = Occurrence::new(self.category)
                    .with(Field::Client, client)
                    .with(Field::Ug, ug)
                    .with(Field::Abbreviation, abbreviation)
                    .with(Field::OccurrenceType, clean(&self.occurrence_type))
                    .with(Field::Asset, clean(&self.asset))
                    .with(Field::AssetName, clean(item))
                    .with(Field::Occurrence, clean(&self.occurrence))
                    .with(Field::Operator, clean(&self.operator))
                    .with(Field::Description, clean(&self.description))
                    .with(Field::Protocol, clean(&self.protocol))
                    .with(Field::ServiceOrder, clean(&self.service_order));
                if self.category.has_quantity() {
                    occurrence.set_text(Field::Quantity, self.quantity.to_string());
                }
                for field in Field::TIMESTAMPS {
                    let text = self
                        .timestamp_for(item, field)
                        .map(|timestamp| format_timestamp(&timestamp))
                        .unwrap_or_default();
                    occurrence.set_text(field, text);
                }
                Ok(occurrence)
            })
            .collect()
    }
}

fn clean(value: &str) -> String {
    if value.trim() == PLACEHOLDER {
        String::new()
    } else {
        value.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference_data::fixtures::assets_grid;
    use crate::reference_data::fixtures::options_grid;
    use crate::reference_data::ReferenceDataError;
    use crate::spreadsheet::SheetTable;
    use chrono::NaiveDate;
    use chrono::NaiveTime;

    fn reference() -> ReferenceData {
        let table = |name: &str, grid: Vec<Vec<&str>>| {
            SheetTable::from_grid(name, 1, grid.into_iter().map(|line| line.into_iter().map(str::to_owned).collect()).collect())
        };
        ReferenceData::new(table("DADOS", options_grid()), Some(table("Usinas_Detalhado", assets_grid()))).unwrap()
    }

    fn shutdown_at(hour: u32) -> DateTimeEdit {
        DateTimeEdit {
            date: NaiveDate::from_ymd_opt(2025, 3, 1),
            time: NaiveTime::from_hms_opt(hour, 0, 0),
        }
    }

    #[test]
    fn test_plain_assets_use_items_as_ugs() {
        let mut draft = NewOccurrence::new(Category::Equipment);
        draft.items = vec!["UG01".to_owned(), "UG03".to_owned()];
        draft.asset = "TRAFO".to_owned();
        draft.operator = PLACEHOLDER.to_owned();
        draft.quantity = 2;
        draft.timestamps.insert(Field::Shutdown, shutdown_at(10));
        draft.timestamps.insert(Field::Normalization, DateTimeEdit { date: NaiveDate::from_ymd_opt(2025, 3, 2), time: None });
        let rows = draft.build(&reference()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text(Field::Client), "SOLAR SA");
        assert_eq!(rows[1].text(Field::Abbreviation), "SS3");
        assert_eq!(rows[1].text(Field::AssetName), "UG03");
        assert_eq!(rows[0].text(Field::Operator), "");
        assert_eq!(rows[0].text(Field::Quantity), "2");
        assert_eq!(rows[0].text(Field::Shutdown), "2025-03-01 10:00:00");
        assert_eq!(rows[0].text(Field::Normalization), "");
    }

    #[test]
    fn test_detailed_assets_resolve_their_plant() {
        let mut draft = NewOccurrence::new(Category::Shutdowns);
        draft.asset = "INVERSOR".to_owned();
        draft.plants = vec!["UG01".to_owned(), "UG02".to_owned()];
        draft.items = vec!["INV-02".to_owned(), "INV-03".to_owned()];
        draft.timestamps.insert(Field::Shutdown, shutdown_at(10));
        draft.item_timestamps.insert(
            "INV-03".to_owned(),
            BTreeMap::from([(Field::Shutdown, DateTimeEdit { date: None, time: NaiveTime::from_hms_opt(11, 30, 0) })]),
        );
        let rows = draft.build(&reference()).unwrap();
        assert_eq!(rows[0].text(Field::Ug), "UG01");
        assert_eq!(rows[1].text(Field::Ug), "UG02");
        assert_eq!(rows[1].text(Field::AssetName), "INV-03");
        assert_eq!(rows[1].text(Field::Shutdown), "2025-03-01 11:30:00");
        assert_eq!(rows[0].text(Field::Quantity), "");
    }

    #[test]
    fn test_unresolvable_items_fail_the_whole_draft() {
        let mut draft = NewOccurrence::new(Category::Shutdowns);
        assert!(matches!(draft.build(&reference()), Err(UsinaSheetError::DraftError(DraftError::NoItems))));
        draft.items = vec!["UG01".to_owned(), "UG99".to_owned()];
        let error = draft.build(&reference()).unwrap_err();
        assert!(matches!(
            error,
            UsinaSheetError::ReferenceDataError(ReferenceDataError::UnknownUg(ref ug)) if ug == "UG99"
        ));
        draft.asset = "STRING".to_owned();
        draft.plants = vec!["UG01".to_owned()];
        draft.items = vec!["STR-09".to_owned()];
        assert!(draft.build(&reference()).is_err());
    }
}
