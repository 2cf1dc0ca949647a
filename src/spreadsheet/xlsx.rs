use crate::error::UsinaSheetError;
use crate::helpers::xml::push_reference;
use crate::helpers::xml::ElementAttributes;
use crate::helpers::xml::PartReader;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::table::SheetTable;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use zip::ZipArchive;

// XML tag names for parsing Excel XLSX format
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts"); // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");   // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");  // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");         // Individual cell format index
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");   // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");       // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                  // Text content within strings
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr"); // Workbook properties
const TAG_SHEET: QName = QName(b"sheet");             // Worksheet definition
const TAG_ROW: QName = QName(b"row");                 // Row in worksheet
const TAG_CELL: QName = QName(b"c");                  // Cell in worksheet
const TAG_INLINE_STRING: QName = QName(b"is");        // Inline string value
const TAG_VALUE: QName = QName(b"v");                 // Cell value content
const TAG_RELATIONSHIP: &[u8] = b"Relationship";

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELATIONSHIPS_PART: &str = "xl/_rels/workbook.xml.rels";
pub(crate) const STYLES_PART: &str = "xl/styles.xml";
pub(crate) const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Read-only view of an XLSX workbook on disk.
pub struct XlsxWorkbook {
    /// ZIP archive containing the XLSX file contents
    zip: ZipArchive<BufReader<File>>,
    /// Parsed number formats for cell type detection
    number_formats: Vec<CellType>,
    /// Shared string table
    shared_strings: Vec<String>,
    /// List of worksheets with (name, zip_path) pairs
    sheets: Vec<(String, String)>,
}

impl XlsxWorkbook {
    /// Opens an XLSX workbook and parses its structure, styles and shared strings.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<XlsxWorkbook, UsinaSheetError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut zip = ZipArchive::new(BufReader::new(file))?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::EmptyWorkbook(path.display().to_string()))?
        }
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        log::debug!(
            "opened workbook '{}' with {} sheet(s), {} shared string(s)",
            path.display(),
            sheets.len(),
            shared_strings.len()
        );
        Ok(XlsxWorkbook { zip, number_formats, shared_strings, sheets })
    }

    /// Names of all worksheets in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Zip path of the worksheet part backing a sheet name.
    pub(crate) fn sheet_part(&self, sheet_name: &str) -> Result<String, UsinaSheetError> {
        self.sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, part)| part.to_owned())
            .ok_or_else(|| SpreadsheetError::SheetNotFound(sheet_name.to_owned()).into())
    }

    /// Reads every non-empty cell of a worksheet with its value rendered as text.
    pub(crate) fn read_cells(&mut self, sheet_name: &str) -> Result<Vec<Cell>, UsinaSheetError> {
        let part = self.sheet_part(sheet_name)?;
        let mut reader = self
            .zip
            .xml_reader(&part)?
            .ok_or_else(|| SpreadsheetError::PartNotFound(part.to_owned()))?;
        let cells = read_sheet_cells(&mut reader, &self.number_formats)?;
        Ok(cells
            .into_iter()
            .map(|mut cell| {
                if cell.kind == CellType::SharedString {
                    let index = cell.value.parse::<usize>().ok();
                    cell.value = match index.and_then(|index| self.shared_strings.get(index)) {
                        Some(text) => text.to_owned(),
                        None => {
                            log::warn!("{}!{}: unknown shared string '{}'", sheet_name, cell.reference(), cell.value);
                            String::new()
                        }
                    };
                    cell.kind = CellType::Text;
                }
                cell
            })
            .collect())
    }

    /// Reads a worksheet through the read boundary: row `header_row` (1-based)
    /// is the header, every row below it up to the last used row follows.
    pub fn read_table(&mut self, sheet_name: &str, header_row: usize) -> Result<SheetTable, UsinaSheetError> {
        let cells = self.read_cells(sheet_name)?;
        Ok(cells_to_table(sheet_name, header_row, &cells))
    }
}

/// Lays cells out as a dense grid starting at the header row.
pub(crate) fn cells_to_table(sheet_name: &str, header_row: usize, cells: &[Cell]) -> SheetTable {
    let header_index = header_row.saturating_sub(1);
    let mut positions = BTreeMap::<(usize, usize), String>::new();
    let mut width = 0usize;
    let mut last_row = header_index;
    for cell in cells.iter().filter(|cell| cell.row >= header_index) {
        let text = cell.to_text();
        if cell.row == header_index {
            width = width.max(cell.col + 1);
        }
        if !text.trim().is_empty() {
            last_row = last_row.max(cell.row);
        }
        positions.insert((cell.row, cell.col), text);
    }
    let grid = (header_index..=last_row)
        .map(|row| {
            (0..width)
                .map(|col| positions.get(&(row, col)).cloned().unwrap_or_default())
                .collect()
        })
        .collect();
    SheetTable::from_grid(sheet_name, header_row, grid)
}

/// Streams the cells of one worksheet part.
fn read_sheet_cells<R: BufRead>(
    reader: &mut PartReader<R>,
    number_formats: &[CellType],
) -> Result<Vec<Cell>, UsinaSheetError> {
    let mut cells = Vec::<Cell>::new();
    let mut row_count = 0usize;
    let mut col_count = 0usize;
    let mut row = 0usize;
    let mut col = 0usize;
    let mut kind = CellType::default();
    let mut value = String::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_ROW => {
            if let Some(number) = event.parse_attribute::<usize>("r")? {
                row_count = number.saturating_sub(1);
            }
            col_count = 0;
        }
        Event::End(event) if event.name() == TAG_ROW => {
            row_count += 1;
        }
        Event::Start(event) if event.name() == TAG_CELL => {
            (row, col) = event.attribute("r")?
                .and_then(|reference| reference_to_index(&reference))
                .unwrap_or((row_count, col_count));
            col_count = col + 1;
            value.clear();
            kind = event.attribute("t")?.map(|t| {
                match t.as_ref() {
                    "inlineStr" | "str" => CellType::Text,
                    "s" => CellType::SharedString,
                    "d" => CellType::IsoDateTime,
                    "b" => CellType::Boolean,
                    "e" => CellType::Error,
                    _ => CellType::Number,
                }
            }).unwrap_or(CellType::Number);
            if let Some(format_id) = event.attribute("s")? {
                if kind == CellType::Number && !format_id.is_empty() {
                    let index = format_id.parse::<usize>()?;
                    kind = number_formats.get(index).copied().unwrap_or(CellType::Number);
                }
            }
        }
        Event::Start(event) if event.name() == TAG_INLINE_STRING => {
            value = read_string_value(reader, TAG_INLINE_STRING, false)?;
        }
        Event::Start(event) if event.name() == TAG_VALUE => {
            value = read_string_value(reader, TAG_VALUE, true)?;
        }
        Event::End(event) if event.name() == TAG_CELL => {
            if !value.is_empty() {
                cells.push(Cell { row, col, kind, value: std::mem::take(&mut value) });
            }
        }
    });
    Ok(cells)
}

/// Loads the shared string table; a workbook without one has no shared strings.
fn load_shared_strings<R: Read + Seek>(zip: &mut ZipArchive<R>) -> Result<Vec<String>, UsinaSheetError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader(SHARED_STRINGS_PART)? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            shared_strings.push(string);
        }
    });
    Ok(shared_strings)
}

/// Loads worksheet relationships: relationship id -> worksheet zip path.
pub(crate) fn load_relationships<R: Read + Seek>(zip: &mut ZipArchive<R>, path: &str) -> Result<HashMap<String, String>, UsinaSheetError> {
    let mut reader = zip.xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::PartNotFound(path.to_string()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.attribute("Id")?;
            let kind = event.attribute("Type")?;
            let target = event.attribute("Target")?;
            // Only process worksheet relationships
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Loads worksheet names with their part paths, and the date system flag.
pub(crate) fn load_workbook<R: Read + Seek>(zip: &mut ZipArchive<R>) -> Result<(Vec<(String, String)>, bool), UsinaSheetError> {
    let relationships = load_relationships(zip, WORKBOOK_RELATIONSHIPS_PART)?;
    let mut reader = zip.xml_reader(WORKBOOK_PART)?
        .ok_or_else(|| SpreadsheetError::PartNotFound(WORKBOOK_PART.to_string()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.unescape_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.unescape_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(id.as_ref()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.attribute("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads cell styles and maps each style index to the kind of number it formats.
fn load_number_formats<R: Read + Seek>(zip: &mut ZipArchive<R>, is_1904: bool) -> Result<Vec<CellType>, UsinaSheetError> {
    let mut reader = match zip.xml_reader(STYLES_PART)? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.attribute("numFmtId")?;
            let format = event.attribute("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let style = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.to_string(), style);
            }
        }
        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = false,
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            let id = event.attribute("numFmtId")?.unwrap_or(Cow::Borrowed("0"));
            format_indexes.push(id.to_string());
        }
    });

    Ok(format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect())
}

/// Normalizes a relationship target to a path inside the zip archive.
pub(crate) fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(stripped) = path.strip_prefix('/') {
        stripped.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Reads string content up to `end_tag`, skipping phonetic annotations.
fn read_string_value<R: BufRead>(
    reader: &mut PartReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, UsinaSheetError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => push_reference(&mut text, &event)?,
    });
    Ok(text)
}


#[cfg(test)]
mod tests {
    use super::fixtures::write_workbook;
    use super::*;

    #[test]
    fn test_read_table_renders_strings_numbers_and_dates() {
        let path = write_workbook(
            "read_table.xlsx",
            &[(
                "DESLIGAMENTOS",
                concat!(
                    r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>DESLIGAMENTO&#160;</t></is></c><c r="C1" t="s"><v>1</v></c></row>"#,
                    r#"<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2" s="1"><v>45717.416666666664</v></c><c r="C2"><v>3</v></c></row>"#,
                    r#"<row r="4"><c r="A4" t="str"><v>UG02</v></c></row>"#,
                ),
            )],
            &["UG", "QUANTIDADE", "UG01"],
        );
        let mut workbook = XlsxWorkbook::open(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["DESLIGAMENTOS"]);
        let table = workbook.read_table("DESLIGAMENTOS", 1).unwrap();
        assert_eq!(table.header, vec!["UG", "DESLIGAMENTO", "QUANTIDADE"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0].cells, vec!["UG01", "2025-03-01 10:00:00", "3"]);
        assert!(table.rows[1].is_blank());
        assert_eq!(table.rows[2].number, 4);
        assert_eq!(table.rows[2].get(0), "UG02");
    }

    #[test]
    fn test_missing_sheet_is_reported() {
        let path = write_workbook("missing_sheet.xlsx", &[("DADOS", "")], &[]);
        let mut workbook = XlsxWorkbook::open(&path).unwrap();
        let error = workbook.read_table("EQUIPAMENTOS", 1).unwrap_err();
        assert_eq!(error.to_string(), "Sheet 'EQUIPAMENTOS' not found");
    }

    #[test]
    fn test_header_offset() {
        let path = write_workbook(
            "header_offset.xlsx",
            &[("S", r#"<row r="1"><c r="A1" t="inlineStr"><is><t>title</t></is></c></row><row r="3"><c r="A3" t="inlineStr"><is><t>UG</t></is></c></row><row r="4"><c r="A4" t="inlineStr"><is><t>UG09</t></is></c></row>"#)],
            &[],
        );
        let mut workbook = XlsxWorkbook::open(&path).unwrap();
        let table = workbook.read_table("S", 3).unwrap();
        assert_eq!(table.header, vec!["UG"]);
        assert_eq!(table.rows[0].number, 4);
        assert_eq!(table.rows[0].get(0), "UG09");
    }

    #[test]
    fn test_zip_path_normalization() {
        assert_eq!(to_zip_path(Cow::Borrowed("/xl/worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path(Cow::Borrowed("worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path(Cow::Borrowed("xl/worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
    }
}
