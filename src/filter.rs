//! Facet filters, the open-occurrence KPI, sorting and the labels used when
//! picking an occurrence to edit.

use crate::identifier::Identifier;
use crate::occurrence::Category;
use crate::occurrence::Field;
use crate::occurrence::Occurrence;
use chrono::Datelike;
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    #[error("Unknown sort key '{0}' (expected shutdown, elapsed, ug or asset)")]
    UnknownSortKey(String),
}

/// Month names in calendar order.
pub const MONTHS: [&str; 12] = [
    "Janeiro", "Fevereiro", "Março", "Abril", "Maio", "Junho",
    "Julho", "Agosto", "Setembro", "Outubro", "Novembro", "Dezembro",
];

/// Month name for a 1-based month number.
pub fn month_name(month: u32) -> &'static str {
    MONTHS.get(month.saturating_sub(1) as usize).copied().unwrap_or("")
}

/// Values derived from the shutdown timestamp.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShutdownParts {
    pub month: &'static str,
    /// 0 when the shutdown is unknown
    pub year: i32,
    /// 0 when the shutdown is unknown
    pub day: u32,
}

impl ShutdownParts {
    pub fn of(occurrence: &Occurrence) -> ShutdownParts {
        match occurrence.shutdown() {
            Some(shutdown) => ShutdownParts {
                month: month_name(shutdown.month()),
                year: shutdown.year(),
                day: shutdown.day(),
            },
            None => ShutdownParts::default(),
        }
    }
}

/// Facet selections. An empty selection does not constrain its facet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub years: Vec<i32>,
    pub months: Vec<String>,
    pub days: Vec<u32>,
    pub categories: Vec<Category>,
    pub clients: Vec<String>,
    pub ugs: Vec<String>,
    pub occurrence_types: Vec<String>,
    pub assets: Vec<String>,
    pub occurrences: Vec<String>,
}

impl Filter {
    pub fn matches(&self, occurrence: &Occurrence) -> bool {
        let parts = ShutdownParts::of(occurrence);
        allows(&self.years, &parts.year)
            && (self.months.is_empty() || self.months.iter().any(|month| month.eq_ignore_ascii_case(parts.month)))
            && allows(&self.days, &parts.day)
            && allows(&self.categories, &occurrence.category)
            && allows_text(&self.clients, occurrence.text(Field::Client))
            && allows_text(&self.ugs, occurrence.text(Field::Ug))
            && allows_text(&self.occurrence_types, occurrence.text(Field::OccurrenceType))
            && allows_text(&self.assets, occurrence.text(Field::Asset))
            && allows_text(&self.occurrences, occurrence.text(Field::Occurrence))
    }

    pub fn apply<'a>(&self, occurrences: &'a [Occurrence]) -> Vec<&'a Occurrence> {
        occurrences.iter().filter(|occurrence| self.matches(occurrence)).collect()
    }
}

fn allows<T: PartialEq>(selection: &[T], value: &T) -> bool {
    selection.is_empty() || selection.contains(value)
}

fn allows_text(selection: &[String], value: &str) -> bool {
    selection.is_empty() || selection.iter().any(|selected| selected == value)
}

/// Values available for each facet in a collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Facets {
    pub years: Vec<i32>,
    /// Chronological order
    pub months: Vec<&'static str>,
    pub days: Vec<u32>,
    pub categories: Vec<Category>,
    pub clients: Vec<String>,
    pub ugs: Vec<String>,
    pub occurrence_types: Vec<String>,
    pub assets: Vec<String>,
    pub occurrences: Vec<String>,
}

impl Facets {
    pub fn collect(occurrences: &[Occurrence]) -> Facets {
        let parts: Vec<ShutdownParts> = occurrences.iter().map(ShutdownParts::of).collect();
        let texts = |field: Field| -> Vec<String> {
            occurrences
                .iter()
                .map(|occurrence| occurrence.text(field))
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        Facets {
            years: parts.iter().map(|part| part.year).filter(|year| *year != 0).collect::<BTreeSet<_>>().into_iter().collect(),
            months: MONTHS.iter().copied().filter(|month| parts.iter().any(|part| part.month == *month)).collect(),
            days: parts.iter().map(|part| part.day).filter(|day| *day != 0).collect::<BTreeSet<_>>().into_iter().collect(),
            categories: occurrences.iter().map(|occurrence| occurrence.category).collect::<BTreeSet<_>>().into_iter().collect(),
            clients: texts(Field::Client),
            ugs: texts(Field::Ug),
            occurrence_types: texts(Field::OccurrenceType),
            assets: texts(Field::Asset),
            occurrences: texts(Field::Occurrence),
        }
    }
}

/// Open occurrence counts for the whole collection and for a filter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpenCounts {
    pub total: usize,
    pub filtered: usize,
}

pub fn open_counts(occurrences: &[Occurrence], filter: &Filter) -> OpenCounts {
    OpenCounts {
        total: occurrences.iter().filter(|occurrence| occurrence.is_open()).count(),
        filtered: occurrences
            .iter()
            .filter(|occurrence| occurrence.is_open() && filter.matches(occurrence))
            .count(),
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Shutdown,
    Elapsed,
    Ug,
    Asset,
}

impl FromStr for SortKey {
    type Err = FilterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "shutdown" | "desligamento" => Ok(SortKey::Shutdown),
            "elapsed" | "tempo" => Ok(SortKey::Elapsed),
            "ug" => Ok(SortKey::Ug),
            "asset" | "ativo" => Ok(SortKey::Asset),
            _ => Err(FilterError::UnknownSortKey(value.to_owned())),
        }
    }
}

/// Seconds since shutdown, `None` when the shutdown is unknown.
pub fn elapsed_seconds(occurrence: &Occurrence, now: NaiveDateTime) -> Option<i64> {
    occurrence.shutdown().map(|shutdown| (now - shutdown).num_seconds())
}

/// `{d}d {h}h {m}m`. Shutdowns in the future count as zero.
pub fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}d {}h {}m", seconds / 86_400, (seconds % 86_400) / 3_600, (seconds % 3_600) / 60)
}

/// Sorts in place. Occurrences without a value for the key go last either way.
pub fn sort_occurrences(occurrences: &mut [&Occurrence], key: SortKey, descending: bool, now: NaiveDateTime) {
    occurrences.sort_by(|left, right| match key {
        SortKey::Shutdown => compare_missing_last(left.shutdown(), right.shutdown(), descending),
        SortKey::Elapsed => compare_missing_last(elapsed_seconds(left, now), elapsed_seconds(right, now), descending),
        SortKey::Ug => directed(left.text(Field::Ug).cmp(right.text(Field::Ug)), descending),
        SortKey::Asset => directed(left.text(Field::Asset).cmp(right.text(Field::Asset)), descending),
    });
}

fn compare_missing_last<T: Ord>(left: Option<T>, right: Option<T>, descending: bool) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => directed(left.cmp(&right), descending),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

/// `UG | Asset | Asset Name | Occurrence | DD/MM/YYYY HH:MM`
pub fn display_label(occurrence: &Occurrence) -> String {
    let shutdown = occurrence
        .shutdown()
        .map(|shutdown| shutdown.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_default();
    format!(
        "{} | {} | {} | {} | {}",
        occurrence.text(Field::Ug),
        occurrence.text(Field::Asset),
        occurrence.text(Field::AssetName),
        occurrence.text(Field::Occurrence),
        shutdown
    )
}

/// Maps a display label back to the identifier of the first occurrence carrying it.
pub fn identifier_for_label(occurrences: &[&Occurrence], label: &str) -> Option<Identifier> {
    occurrences
        .iter()
        .find(|occurrence| display_label(occurrence) == label)
        .map(|occurrence| Identifier::of(occurrence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::parse_timestamp;

    fn record(category: Category, client: &str, ug: &str, asset: &str, shutdown: &str, normalization: &str) -> Occurrence {
        Occurrence::new(category)
            .with(Field::Client, client)
            .with(Field::Ug, ug)
            .with(Field::Asset, asset)
            .with(Field::AssetName, ug)
            .with(Field::Occurrence, "FALHA")
            .with(Field::Shutdown, shutdown)
            .with(Field::Normalization, normalization)
    }

    fn records() -> Vec<Occurrence> {
        vec![
            record(Category::Shutdowns, "ACME", "UG01", "INVERSOR", "2025-03-01 10:00:00", ""),
            record(Category::Shutdowns, "ACME", "UG02", "TRAFO", "2025-02-10 08:30:00", "2025-02-11 09:00:00"),
            record(Category::Equipment, "SOLAR", "UG03", "TRACKER", "2024-12-24 18:45:00", ""),
            record(Category::Equipment, "SOLAR", "UG04", "INVERSOR", "", ""),
        ]
    }

    fn now() -> NaiveDateTime {
        parse_timestamp("2025-03-02 12:30:00").unwrap()
    }

    #[test]
    fn test_shutdown_parts() {
        let parts = ShutdownParts::of(&records()[0]);
        assert_eq!(parts.month, "Março");
        assert_eq!((parts.year, parts.day), (2025, 1));
        assert_eq!(ShutdownParts::of(&records()[3]).year, 0);
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let records = records();
        assert_eq!(Filter::default().apply(&records).len(), 4);
    }

    #[test]
    fn test_facets_combine() {
        let records = records();
        let filter = Filter { years: vec![2025], clients: vec!["ACME".to_owned()], ..Filter::default() };
        assert_eq!(filter.apply(&records).len(), 2);
        let filter = Filter { months: vec!["março".to_owned()], categories: vec![Category::Shutdowns], ..Filter::default() };
        assert_eq!(filter.apply(&records).len(), 1);
        let filter = Filter { days: vec![24], ..Filter::default() };
        assert_eq!(filter.apply(&records)[0].text(Field::Ug), "UG03");
    }

    #[test]
    fn test_open_counts() {
        let records = records();
        let filter = Filter { categories: vec![Category::Equipment], ..Filter::default() };
        assert_eq!(open_counts(&records, &filter), OpenCounts { total: 3, filtered: 2 });
    }

    #[test]
    fn test_facet_values() {
        let facets = Facets::collect(&records());
        assert_eq!(facets.years, vec![2024, 2025]);
        assert_eq!(facets.months, vec!["Fevereiro", "Março", "Dezembro"]);
        assert_eq!(facets.days, vec![1, 10, 24]);
        assert_eq!(facets.categories, vec![Category::Shutdowns, Category::Equipment]);
        assert_eq!(facets.assets, vec!["INVERSOR", "TRACKER", "TRAFO"]);
    }

    #[test]
    fn test_sorting_keeps_unknown_shutdowns_last() {
        let records = records();
        let mut sorted: Vec<&Occurrence> = records.iter().collect();
        sort_occurrences(&mut sorted, SortKey::Shutdown, true, now());
        let ugs: Vec<&str> = sorted.iter().map(|record| record.text(Field::Ug)).collect();
        assert_eq!(ugs, vec!["UG01", "UG02", "UG03", "UG04"]);
        sort_occurrences(&mut sorted, SortKey::Elapsed, true, now());
        let ugs: Vec<&str> = sorted.iter().map(|record| record.text(Field::Ug)).collect();
        assert_eq!(ugs, vec!["UG03", "UG02", "UG01", "UG04"]);
        sort_occurrences(&mut sorted, SortKey::Asset, false, now());
        assert_eq!(sorted[3].text(Field::Asset), "TRAFO");
        assert_eq!("tempo".parse::<SortKey>(), Ok(SortKey::Elapsed));
        assert!("nome".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_elapsed_format() {
        assert_eq!(elapsed_seconds(&records()[0], now()).map(format_elapsed), Some("1d 2h 30m".to_owned()));
        assert_eq!(format_elapsed(59), "0d 0h 0m");
        assert_eq!(format_elapsed(-10), "0d 0h 0m");
        assert_eq!(elapsed_seconds(&records()[3], now()), None);
    }

    #[test]
    fn test_labels_map_back_to_identifiers() {
        let records = records();
        let refs: Vec<&Occurrence> = records.iter().collect();
        let label = display_label(&records[0]);
        assert_eq!(label, "UG01 | INVERSOR | UG01 | FALHA | 01/03/2025 10:00");
        assert_eq!(identifier_for_label(&refs, &label), Some(Identifier::of(&records[0])));
        assert_eq!(identifier_for_label(&refs, "nada"), None);
    }
}
