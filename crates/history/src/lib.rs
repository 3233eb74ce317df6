//! rollcall_history
//! Durable side of the presence pipeline: the SQLite ledger and report export.

pub mod error;
pub mod ledger;
pub mod models;
pub mod report;

pub use error::{LedgerError, ReportError};
pub use ledger::Ledger;
pub use models::{AttendanceRow, AttendanceStatus, HistoryFilter, HistoryRecord, NOT_FOUND};
pub use report::ReportWriter;
