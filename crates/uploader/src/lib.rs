//! Upload run: orchestrator, completion ledger and local cleanup.
//!
//! A run is `Orchestrator::run` followed by `Cleanup::run` over the
//! returned [`Ledger`]. Local files are only ever removed for items whose
//! record is a success.

mod cleanup;
mod error;
mod ledger;
mod orchestrator;
mod types;

pub use cleanup::{Cleanup, CleanupReport, FileRemover, FsRemover};
pub use error::{DeletionError, DuplicateRecord, ItemError, RunError};
pub use ledger::{CompletionRecord, Ledger, Outcome};
pub use orchestrator::Orchestrator;
pub use types::{DEFAULT_DAILY_CAP, DEFAULT_WORKERS, RunEvent, RunSummary, UploadSettings};

/// Counts for a finished run.
pub fn summarize(ledger: &Ledger, report: &CleanupReport) -> RunSummary {
    RunSummary {
        selected: ledger.len(),
        succeeded: ledger.succeeded(),
        failed: ledger.failed(),
        deleted: report.deleted.len(),
        delete_failures: report.failures.len(),
    }
}
