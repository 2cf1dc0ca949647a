//! # Local Workbook Session
//!
//! Scoped access to an `.xlsx` file on disk. Opening a session drops an owner
//! file (`~$<name>`) next to the workbook, the same convention office suites
//! use, and a second session on the same file is refused until the first one
//! is dropped. Cell writes are staged in memory; [`SheetStore::commit`] writes
//! a patched copy of the archive to a temporary file and renames it over the
//! original.

use crate::error::UsinaSheetError;
use crate::helpers::xml::ElementAttributes;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::parse_column;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::table::SheetTable;
use crate::spreadsheet::xlsx::cells_to_table;
use crate::spreadsheet::xlsx::XlsxWorkbook;
use crate::spreadsheet::CellValue;
use crate::spreadsheet::SheetStore;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::WriteMode;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use quick_xml::Writer;
use std::collections::BTreeMap;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufReader;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;

const TAG_SHEET_DATA: QName = QName(b"sheetData");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");

/// Staged values of one worksheet: 0-based row -> 0-based column -> value.
type SheetPatches = BTreeMap<usize, BTreeMap<usize, CellValue>>;

/// Owner file guarding a workbook. Removed when dropped.
#[derive(Debug)]
struct OwnerLock {
    path: PathBuf,
}

impl OwnerLock {
    fn acquire(workbook: &Path) -> Result<OwnerLock, UsinaSheetError> {
        let path = sibling(workbook, "~$", "");
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                Err(SpreadsheetError::WorkbookLocked(workbook.display().to_string()))?
            }
            Err(error) => Err(error)?,
        };
        writeln!(file, "{}", std::process::id())?;
        log::debug!("acquired owner file '{}'", path.display());
        Ok(OwnerLock { path })
    }
}

impl Drop for OwnerLock {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            log::warn!("could not remove owner file '{}': {}", self.path.display(), error);
        }
    }
}

/// A workbook opened for editing through cell-range writes.
pub struct WorkbookSession {
    path: PathBuf,
    temp_path: PathBuf,
    header_row: usize,
    workbook: XlsxWorkbook,
    // Set when the handle no longer matches the file on disk
    stale: bool,
    pending: BTreeMap<String, SheetPatches>,
    // Declared last so the workbook handle closes before the owner file goes away
    _lock: OwnerLock,
}

impl WorkbookSession {
    /// Acquires the workbook. Fails with `WorkbookLocked` while another session holds it.
    pub fn open<P: AsRef<Path>>(path: P, header_row: usize) -> Result<WorkbookSession, UsinaSheetError> {
        let path = path.as_ref().to_path_buf();
        let lock = OwnerLock::acquire(&path)?;
        let workbook = XlsxWorkbook::open(&path)?;
        Ok(WorkbookSession {
            temp_path: sibling(&path, "~", ".tmp"),
            path,
            header_row,
            workbook,
            stale: false,
            pending: BTreeMap::new(),
            _lock: lock,
        })
    }

    /// Worksheet names in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }

    /// Number of cells staged and not yet committed.
    pub fn pending_cells(&self) -> usize {
        self.pending.values().flat_map(|rows| rows.values()).map(BTreeMap::len).sum()
    }

    /// Reopens the workbook handle. Reads retry this until it succeeds.
    fn refresh(&mut self) -> Result<(), UsinaSheetError> {
        self.stale = true;
        self.workbook = XlsxWorkbook::open(&self.path)?;
        self.stale = false;
        Ok(())
    }

    fn remove_temp_file(&self) {
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => log::debug!("removed '{}'", self.temp_path.display()),
            Err(error) if error.kind() == ErrorKind::NotFound => (),
            Err(error) => log::warn!("could not remove '{}': {}", self.temp_path.display(), error),
        }
    }

    /// Copies the archive, patching every worksheet with staged cells.
    fn write_patched_copy(&mut self) -> Result<(), UsinaSheetError> {
        let mut patches_by_part = BTreeMap::<String, SheetPatches>::new();
        for (sheet_name, patches) in &self.pending {
            let part = self.workbook.sheet_part(sheet_name)?;
            patches_by_part.insert(part.to_lowercase(), patches.clone());
        }

        let mut source = ZipArchive::new(BufReader::new(File::open(&self.path)?))?;
        let mut target = ZipWriter::new(File::create(&self.temp_path)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for index in 0..source.len() {
            let name = source.by_index_raw(index)?.name().to_owned();
            match patches_by_part.get(&name.to_lowercase()) {
                Some(patches) => {
                    let mut xml = Vec::new();
                    source.by_index(index)?.read_to_end(&mut xml)?;
                    let patched = patch_sheet_xml(&xml, patches)?;
                    target.start_file(name.as_str(), options)?;
                    target.write_all(&patched)?;
                    log::debug!("patched part '{}'", name);
                }
                None => target.raw_copy_file(source.by_index_raw(index)?)?,
            }
        }
        target.finish()?;
        Ok(())
    }
}

impl SheetStore for WorkbookSession {
    /// Reads a worksheet with staged cells applied on top of the stored ones.
    fn read_all_rows(&mut self, sheet_name: &str) -> Result<SheetTable, UsinaSheetError> {
        if self.stale {
            self.refresh()?;
        }
        let mut cells = self.workbook.read_cells(sheet_name)?;
        if let Some(patches) = self.pending.get(sheet_name) {
            for (row, columns) in patches {
                for (col, value) in columns {
                    cells.retain(|cell| cell.row != *row || cell.col != *col);
                    if !value.is_empty() {
                        cells.push(Cell { row: *row, col: *col, kind: CellType::Text, value: value.to_string() });
                    }
                }
            }
        }
        Ok(cells_to_table(sheet_name, self.header_row, &cells))
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::CellRange
    }

    fn set_cell(&mut self, sheet_name: &str, column: &str, row_number: usize, value: &CellValue) -> Result<(), UsinaSheetError> {
        if row_number < 1 {
            Err(SpreadsheetError::InvalidRowNumber(row_number))?
        }
        let col = parse_column(column)?;
        // Fail early on unknown sheets rather than at commit
        self.workbook.sheet_part(sheet_name)?;
        log::trace!("staged {}!{}{} = {:?}", sheet_name, column, row_number, value);
        self.pending
            .entry(sheet_name.to_owned())
            .or_default()
            .entry(row_number - 1)
            .or_default()
            .insert(col, value.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), UsinaSheetError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let staged = self.pending_cells();
        let written = self.write_patched_copy().and_then(|()| {
            std::fs::rename(&self.temp_path, &self.path)?;
            Ok(())
        });
        if let Err(error) = written {
            self.remove_temp_file();
            return Err(error);
        }
        // The cells are on disk from here on, a failed reopen only leaves the handle stale
        self.pending.clear();
        log::info!("committed {} cell(s) to '{}'", staged, self.path.display());
        if let Err(error) = self.refresh() {
            log::warn!("could not reopen '{}' after commit, retrying on next read: {}", self.path.display(), error);
        }
        Ok(())
    }

    fn discard(&mut self) {
        if !self.pending.is_empty() {
            log::debug!("discarding {} staged cell(s)", self.pending_cells());
            self.pending.clear();
        }
    }
}

impl Drop for WorkbookSession {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            log::warn!("discarding {} uncommitted cell(s) for '{}'", self.pending_cells(), self.path.display());
        }
        self.remove_temp_file();
    }
}

/// Builds `<dir>/<prefix><file name><suffix>`.
fn sibling(path: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{prefix}{file_name}{suffix}"))
}

/// Rewrites a worksheet part with staged cells. Existing cells keep their
/// style index, rows and cells that do not exist yet are inserted in order.
fn patch_sheet_xml(xml: &[u8], patches: &SheetPatches) -> Result<Vec<u8>, UsinaSheetError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 1024));
    let mut pending_rows = patches.clone();
    let mut open_row: Option<(usize, BTreeMap<usize, CellValue>)> = None;
    let mut skipping_cell = false;
    let mut next_row = 0usize;
    let mut next_col = 0usize;
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let event = reader.read_event_into(&mut buffer)?;
        if skipping_cell {
            if matches!(&event, Event::End(end) if end.name() == TAG_CELL) {
                skipping_cell = false;
            }
            continue;
        }
        match &event {
            Event::Eof => break,
            Event::Empty(start) if start.name() == TAG_SHEET_DATA => {
                writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                write_rows_before(&mut writer, &mut pending_rows, usize::MAX)?;
                writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
            }
            Event::End(end) if end.name() == TAG_SHEET_DATA => {
                write_rows_before(&mut writer, &mut pending_rows, usize::MAX)?;
                writer.write_event(event.borrow())?;
            }
            Event::Start(start) | Event::Empty(start) if start.name() == TAG_ROW => {
                let row = start
                    .parse_attribute::<usize>("r")?
                    .map(|number| number.saturating_sub(1))
                    .unwrap_or(next_row);
                next_row = row + 1;
                next_col = 0;
                write_rows_before(&mut writer, &mut pending_rows, row)?;
                match pending_rows.remove(&row) {
                    Some(mut cells) => {
                        let mut patched = BytesStart::new("row");
                        for attribute in start.attributes() {
                            let attribute = attribute?;
                            // Spans are a layout hint that inserted cells may invalidate
                            if attribute.key.as_ref() != b"spans" {
                                patched.push_attribute(attribute);
                            }
                        }
                        writer.write_event(Event::Start(patched))?;
                        if matches!(event, Event::Empty(_)) {
                            write_cells_before(&mut writer, row, &mut cells, usize::MAX)?;
                            writer.write_event(Event::End(BytesEnd::new("row")))?;
                        } else {
                            open_row = Some((row, cells));
                        }
                    }
                    None => writer.write_event(event.borrow())?,
                }
            }
            Event::End(end) if end.name() == TAG_ROW => {
                if let Some((row, mut cells)) = open_row.take() {
                    write_cells_before(&mut writer, row, &mut cells, usize::MAX)?;
                }
                writer.write_event(event.borrow())?;
            }
            Event::Start(start) | Event::Empty(start) if start.name() == TAG_CELL && open_row.is_some() => {
                let (row, cells) = match open_row.as_mut() {
                    Some((row, cells)) => (*row, cells),
                    None => continue,
                };
                let col = start
                    .attribute("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .map(|(_, col)| col)
                    .unwrap_or(next_col);
                next_col = col + 1;
                write_cells_before(&mut writer, row, cells, col)?;
                match cells.remove(&col) {
                    Some(value) => {
                        let style = start.attribute("s")?.map(|style| style.into_owned());
                        write_cell(&mut writer, row, col, &value, style.as_deref())?;
                        skipping_cell = matches!(event, Event::Start(_));
                    }
                    None => writer.write_event(event.borrow())?,
                }
            }
            _ => writer.write_event(event.borrow())?,
        }
    }
    Ok(writer.into_inner())
}

/// Writes staged rows whose index is below `limit`, in ascending order.
fn write_rows_before(writer: &mut Writer<Vec<u8>>, rows: &mut SheetPatches, limit: usize) -> Result<(), UsinaSheetError> {
    while let Some(entry) = rows.first_entry() {
        if *entry.key() >= limit {
            break;
        }
        let (row, mut cells) = entry.remove_entry();
        let mut start = BytesStart::new("row");
        start.push_attribute(("r", (row + 1).to_string().as_str()));
        writer.write_event(Event::Start(start))?;
        write_cells_before(writer, row, &mut cells, usize::MAX)?;
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

/// Writes staged cells of one row whose column is below `limit`.
fn write_cells_before(
    writer: &mut Writer<Vec<u8>>,
    row: usize,
    cells: &mut BTreeMap<usize, CellValue>,
    limit: usize,
) -> Result<(), UsinaSheetError> {
    while let Some(entry) = cells.first_entry() {
        if *entry.key() >= limit {
            break;
        }
        let (col, value) = entry.remove_entry();
        write_cell(writer, row, col, &value, None)?;
    }
    Ok(())
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    row: usize,
    col: usize,
    value: &CellValue,
    style: Option<&str>,
) -> Result<(), UsinaSheetError> {
    let reference = index_to_reference(row, col);
    let mut start = BytesStart::new("c");
    start.push_attribute(("r", reference.as_str()));
    if let Some(style) = style {
        start.push_attribute(("s", style));
    }
    match value {
        CellValue::Empty => {
            // A blank cell only needs to stay when it carries formatting
            if style.is_some() {
                writer.write_event(Event::Empty(start))?;
            }
        }
        CellValue::Number(_) => {
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Start(BytesStart::new("v")))?;
            writer.write_event(Event::Text(BytesText::new(&value.to_string())))?;
            writer.write_event(Event::End(BytesEnd::new("v")))?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
        CellValue::Text(text) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            let mut t = BytesStart::new("t");
            t.push_attribute(("xml:space", "preserve"));
            writer.write_event(Event::Start(t))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
        }
    }
    Ok(())
}
