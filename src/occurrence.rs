//! # Occurrence Records
//!
//! An [`Occurrence`] is one shutdown or equipment event read from a category
//! sheet. Values are kept as the text the store returned; timestamps are
//! parsed on demand so that a value that cannot be parsed is never lost.

use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::Timelike;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while interpreting user supplied names and values.
#[derive(Error, Debug, PartialEq)]
pub enum OccurrenceError {
    #[error("Unknown category '{0}'")]
    UnknownCategory(String),

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// The sheet an occurrence lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Shutdowns,
    Equipment,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Shutdowns, Category::Equipment];

    /// Label stored by the dashboard and used as the default sheet name.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Shutdowns => "DESLIGAMENTOS",
            Category::Equipment => "EQUIPAMENTOS",
        }
    }

    pub fn has_quantity(&self) -> bool {
        matches!(self, Category::Equipment)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Category {
    type Err = OccurrenceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "DESLIGAMENTOS" | "SHUTDOWNS" => Ok(Category::Shutdowns),
            "EQUIPAMENTOS" | "EQUIPMENT" => Ok(Category::Equipment),
            _ => Err(OccurrenceError::UnknownCategory(value.to_owned())),
        }
    }
}

/// Every column an occurrence sheet can carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Identifier,
    Client,
    Ug,
    Abbreviation,
    OccurrenceType,
    Asset,
    AssetName,
    Occurrence,
    Quantity,
    Operator,
    Shutdown,
    ClientNotified,
    LocalTeamResponse,
    ThirdPartyResponse,
    Normalization,
    Description,
    Protocol,
    ServiceOrder,
}

impl Field {
    pub const ALL: [Field; 18] = [
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

    /// The event timestamps, in the order the dashboard shows them.
    pub const TIMESTAMPS: [Field; 5] = [
        Field::Shutdown,
        Field::ClientNotified,
        Field::LocalTeamResponse,
        Field::ThirdPartyResponse,
        Field::Normalization,
    ];

    /// Canonical sheet header.
    pub fn header(&self) -> &'static str {
        match self {
            Field::Identifier => "IDENTIFICADOR",
            Field::Client => "CLIENTE",
            Field::Ug => "UG",
            Field::Abbreviation => "SIGLA",
            Field::OccurrenceType => "TIPO DE OCORRÊNCIA",
            Field::Asset => "ATIVO",
            Field::AssetName => "NOME ATIVO",
            Field::Occurrence => "OCORRÊNCIA",
            Field::Quantity => "QUANTIDADE",
            Field::Operator => "OPERADOR",
            Field::Shutdown => "DESLIGAMENTO",
            Field::ClientNotified => "CLIENTE AVISADO",
            Field::LocalTeamResponse => "ATENDIMENTO LOOP",
            Field::ThirdPartyResponse => "ATENDIMENTO TERCEIROS",
            Field::Normalization => "NORMALIZAÇÃO",
            Field::Description => "DESCRIÇÃO",
            Field::Protocol => "PROTOCOLO",
            Field::ServiceOrder => "OS",
        }
    }

    /// Dashboard label.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Identifier => "Identificador",
            Field::Client => "Cliente",
            Field::Ug => "UG",
            Field::Abbreviation => "Sigla",
            Field::OccurrenceType => "Tipo de ocorrência",
            Field::Asset => "Ativo",
            Field::AssetName => "Nome Ativo",
            Field::Occurrence => "Ocorrência",
            Field::Quantity => "Quantidade",
            Field::Operator => "Operador",
            Field::Shutdown => "Desligamento",
            Field::ClientNotified => "Cliente Avisado",
            Field::LocalTeamResponse => "Atendimento Loop",
            Field::ThirdPartyResponse => "Atendimento Terceiros",
            Field::Normalization => "Normalização",
            Field::Description => "Descrição",
            Field::Protocol => "Protocolo",
            Field::ServiceOrder => "OS",
        }
    }

    /// Short name used on the command line.
    pub fn key(&self) -> &'static str {
        match self {
            Field::Identifier => "identifier",
            Field::Client => "client",
            Field::Ug => "ug",
            Field::Abbreviation => "abbreviation",
            Field::OccurrenceType => "type",
            Field::Asset => "asset",
            Field::AssetName => "asset-name",
            Field::Occurrence => "occurrence",
            Field::Quantity => "quantity",
            Field::Operator => "operator",
            Field::Shutdown => "shutdown",
            Field::ClientNotified => "client-notified",
            Field::LocalTeamResponse => "local-team",
            Field::ThirdPartyResponse => "third-party",
            Field::Normalization => "normalization",
            Field::Description => "description",
            Field::Protocol => "protocol",
            Field::ServiceOrder => "service-order",
        }
    }

    /// Header texts accepted for this field, compared case-insensitively.
    pub fn aliases(&self) -> [String; 3] {
        [self.header().to_owned(), fold_accents(self.header()), self.label().to_owned()]
    }

    /// True when a (cleaned) header text names this field.
    pub fn matches_header(&self, header: &str) -> bool {
        let header = header.trim().to_uppercase();
        self.aliases().iter().any(|alias| alias.to_uppercase() == header)
    }

    pub fn is_timestamp(&self) -> bool {
        Field::TIMESTAMPS.contains(self)
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Field {
    type Err = OccurrenceError;

    /// Accepts the command line key or any header alias.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Field::ALL
            .into_iter()
            .find(|field| field.key().eq_ignore_ascii_case(wanted) || field.matches_header(wanted))
            .ok_or_else(|| OccurrenceError::UnknownField(value.to_owned()))
    }
}

/// Replaces the accented capitals used in the sheet headers.
fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|character| match character {
            'À' | 'Á' | 'Â' | 'Ã' => 'A',
            'É' | 'Ê' => 'E',
            'Í' => 'I',
            'Ó' | 'Ô' | 'Õ' => 'O',
            'Ú' | 'Ü' => 'U',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

/// One occurrence row as read from its category sheet.
#[derive(Clone, Debug, PartialEq)]
pub struct Occurrence {
    pub category: Category,
    /// 1-based sheet row at load time; informational only
    pub row_number: usize,
    values: BTreeMap<Field, String>,
}

impl Occurrence {
    pub fn new(category: Category) -> Occurrence {
        Occurrence { category, row_number: 0, values: BTreeMap::new() }
    }

    /// Raw text of a field, empty when the sheet has no such column.
    pub fn text(&self, field: Field) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn set_text(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Occurrence {
        self.set_text(field, value);
        self
    }

    /// Parsed timestamp; absent and unparseable values are both `None`.
    pub fn timestamp(&self, field: Field) -> Option<NaiveDateTime> {
        parse_timestamp(self.text(field))
    }

    pub fn shutdown(&self) -> Option<NaiveDateTime> {
        self.timestamp(Field::Shutdown)
    }

    /// An occurrence stays open until its normalization is recorded.
    pub fn is_open(&self) -> bool {
        self.timestamp(Field::Normalization).is_none()
    }

    pub fn quantity(&self) -> Option<f64> {
        self.text(Field::Quantity).trim().replace(',', ".").parse().ok()
    }

    pub fn is_blank(&self) -> bool {
        self.values.values().all(|value| value.trim().is_empty())
    }
}

/// Formats accepted for timestamps, tried in order. Day-first text is never assumed.
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parses a timestamp leniently. Blank or unrecognised text yields `None`.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            ["%Y-%m-%d", "%m/%d/%Y"]
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Store text form of a timestamp, `YYYY-MM-DD HH:MM:SS`. Sub-second parts
/// are kept as microseconds.
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    let micros = timestamp.nanosecond() / 1_000;
    if micros == 0 {
        timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        format!("{}.{:06}", timestamp.format("%Y-%m-%d %H:%M:%S"), micros)
    }
}

/// Parses a date typed by an operator (`YYYY-MM-DD` or `DD/MM/YYYY`).
pub fn parse_date(text: &str) -> Result<NaiveDate, OccurrenceError> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%d/%m/%Y"))
        .map_err(|_| OccurrenceError::InvalidTimestamp(text.to_owned()))
}

/// Parses a time of day typed by an operator (`HH:MM` or `HH:MM:SS`).
pub fn parse_time(text: &str) -> Result<NaiveTime, OccurrenceError> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .map_err(|_| OccurrenceError::InvalidTimestamp(text.to_owned()))
}
