use crate::workflow::{BatchOutcome, CaseRecord, HaltReason};
use serde::{Deserialize, Serialize};
use time::Date;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started: String,
    pub finished: String,
    pub today: Date,
    pub pages_scanned: u32,
    pub rows_seen: usize,
    pub rows_in_scope: usize,
    pub completed: usize,
    pub failed_no_action: usize,
    pub cases: Vec<CaseRecord>,
    pub unattempted: Vec<String>,
    pub halted: Option<HaltReason>,
}

impl RunReport {
    pub fn new(
        started: String,
        finished: String,
        today: Date,
        pages_scanned: u32,
        rows_seen: usize,
        rows_in_scope: usize,
        batch: BatchOutcome,
    ) -> Self {
        let completed = batch.completed();
        Self {
            started,
            finished,
            today,
            pages_scanned,
            rows_seen,
            rows_in_scope,
            completed,
            failed_no_action: batch.cases.len() - completed,
            cases: batch.cases,
            unattempted: batch.unattempted,
            halted: batch.halted,
        }
    }
}
