use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Date;

/// One row of the cause-list results table.
///
/// `serial` is the only key that survives a page reload: the portal re-renders
/// the table on every navigation, so later lookups find the row again by text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRow {
    pub serial: String,
    pub columns: Vec<String>,
    pub court_name: String,
    pub next_hearing_date: Option<Date>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDetail {
    pub cnr_number: Option<String>,
    pub case_type: Option<String>,
    pub court_and_judge: Option<String>,
    pub filing_number: Option<String>,
    pub registration_number: Option<String>,
}

impl CaseDetail {
    pub fn is_empty(&self) -> bool {
        self == &CaseDetail::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureOutcome {
    Completed,
    FailedNoAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedCase {
    pub row: ListingRow,
    pub detail: CaseDetail,
    pub document_saved: bool,
    pub document_path: Option<PathBuf>,
    pub attachment_paths: Vec<PathBuf>,
    pub outcome: CaptureOutcome,
}

impl CapturedCase {
    pub fn failed_no_action(row: ListingRow) -> Self {
        Self {
            row,
            detail: CaseDetail::default(),
            document_saved: false,
            document_path: None,
            attachment_paths: Vec::new(),
            outcome: CaptureOutcome::FailedNoAction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Snapshot,
    Attachment,
}

/// Raw bytes handed to the storage sink alongside a captured case.
#[derive(Debug, Clone)]
pub struct Document {
    pub file_name: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}
