//! # Usina Sheet
//!
//! Occurrence ledger for solar generating units (UGs), kept in a shared
//! spreadsheet. Shutdowns and equipment failures live on one sheet per
//! category; a reference sheet holds the valid options and the client and
//! abbreviation of every UG.
//!
//! ## Features
//!
//! - **Composite identifiers**: occurrences have no stored key and are found
//!   again through `UG|ASSET|OCCURRENCE|Shutdown`, recomputed on every read
//! - **Field-level edits**: only editable fields are written back; protected
//!   fields pass through from the stored row
//! - **Two write boundaries**: whole-row writes for spreadsheet APIs and
//!   cell-range writes for local `.xlsx` files
//! - **Local workbook sessions**: an owner file guards the workbook while it
//!   is open and staged cells are committed in one archive rewrite
//! - **Listing helpers**: facet filters, open-shutdown counts, sorting and
//!   elapsed-time formatting
//!
//! ## Example
//!
//! ```no_run
//! use usina_sheet::{Config, EditSession, Field, Identifier, Ledger, WorkbookSession};
//!
//! # fn main() -> Result<(), usina_sheet::UsinaSheetError> {
//! let config = Config::load("usina.toml")?;
//! let session = WorkbookSession::open(config.workbook()?, config.header_row)?;
//! let mut ledger = Ledger::new(session, &config);
//!
//! let mut edit = EditSession::new(Identifier::from("UG01|INVERSOR|FALHA|2025-03-01 10:00:00"));
//! edit.set_text(Field::Description, "Fusível substituído")?;
//! ledger.commit_edit(&mut edit)?;
//! # Ok(())
//! # }
//! ```

mod helpers;

pub mod cache;
pub mod config;
pub mod draft;
pub mod error;
pub mod filter;
pub mod identifier;
pub mod ledger;
pub mod merge;
pub mod occurrence;
pub mod reference_data;
pub mod schema;
pub mod spreadsheet;

pub use config::Config;
pub use draft::NewOccurrence;
pub use error::UsinaSheetError;
pub use identifier::Identifier;
pub use ledger::Ledger;
pub use merge::EditSession;
pub use merge::EditStage;
pub use occurrence::Category;
pub use occurrence::Field;
pub use occurrence::Occurrence;
pub use spreadsheet::memory::MemorySpreadsheet;
pub use spreadsheet::session::WorkbookSession;
pub use spreadsheet::CellValue;
pub use spreadsheet::SheetStore;
pub use spreadsheet::SheetTable;
pub use spreadsheet::WriteMode;
