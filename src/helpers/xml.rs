//! Event reading for the XML parts of a workbook archive: the workbook
//! manifest, its relationships, worksheets, shared strings and styles.
//! A reader knows which part it streams so a malformed archive names the
//! entry that broke.

use crate::error::UsinaSheetError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PartError {
    #[error("Part '{part}' is malformed near byte {position}: {source}")]
    Malformed {
        part: String,
        position: u64,
        source: quick_xml::Error,
    },

    #[error("Unknown entity '&{0};' in cell text")]
    UnknownEntity(String),

    #[error("Attribute {name}=\"{value}\" has an unexpected value")]
    InvalidAttribute { name: String, value: String },
}

/// Streams the events of one archive part. Empty elements are expanded so
/// `<c r="A1"/>` reads as a start and an end like any other cell.
pub(crate) struct PartReader<R: BufRead> {
    part: String,
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> PartReader<R> {
    pub(crate) fn new(part: &str, source: R) -> PartReader<R> {
        let mut reader = Reader::from_reader(source);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        PartReader {
            part: part.to_owned(),
            reader,
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Next event of the part, `None` at the end.
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, UsinaSheetError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(source) => Err(PartError::Malformed {
                part: self.part.clone(),
                position: self.reader.error_position(),
                source,
            }
            .into()),
        }
    }
}

/// Attribute lookup on a start tag (`r="B7"`, `s="3"`, `t="s"`).
pub(crate) trait ElementAttributes<'a> {
    /// Unescaped value of `name`, `None` when the tag does not carry it.
    fn attribute(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, UsinaSheetError>;

    /// Value of `name` parsed as `T`. A value that does not parse is an error,
    /// not a missing attribute.
    fn parse_attribute<T: FromStr>(&self, name: &str) -> Result<Option<T>, UsinaSheetError>;
}

impl<'a> ElementAttributes<'a> for BytesStart<'a> {
    fn attribute(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, UsinaSheetError> {
        match self.try_get_attribute(name)? {
            Some(attribute) => Ok(Some(attribute.unescape_value()?)),
            None => Ok(None),
        }
    }

    fn parse_attribute<T: FromStr>(&self, name: &str) -> Result<Option<T>, UsinaSheetError> {
        let attribute = match self.try_get_attribute(name)? {
            Some(attribute) => attribute,
            None => return Ok(None),
        };
        let value = attribute.unescape_value()?;
        let parsed = value.parse::<T>().map_err(|_| PartError::InvalidAttribute {
            name: name.to_owned(),
            value: value.to_string(),
        })?;
        Ok(Some(parsed))
    }
}

/// Appends the character behind an entity or character reference
/// (`&amp;`, `&#231;`, `&#x00E3;`) to cell text.
pub(crate) fn push_reference(text: &mut String, reference: &BytesRef) -> Result<(), UsinaSheetError> {
    let raw = reference.xml_content()?;
    if let Some(number) = raw.strip_prefix('#') {
        let code = match number.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16)?,
            None => number.parse::<u32>()?,
        };
        // Code points outside Unicode are dropped rather than failing the read
        if let Some(character) = char::from_u32(code) {
            text.push(character);
        }
        return Ok(());
    }
    match resolve_xml_entity(&raw) {
        Some(entity) => text.push_str(entity),
        None => return Err(PartError::UnknownEntity(raw.to_string()).into()),
    }
    Ok(())
}

/// Loops over the events of a [`PartReader`] until the end of the part.
/// Unmatched events are skipped; an arm may `break` early.
#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}
