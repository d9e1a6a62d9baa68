//! Shared helpers for pipeline integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use leadimport_core::field::{FieldKey, NormalizedData};
use leadimport_core::importer::{
    AssignmentConfig, CommitRequest, CommitRow, DbDuplicateInfo, DuplicateConfig,
};
use leadimport_core::parser::FileType;
use leadimport_core::progress::ImportProgress;
use leadimport_core::types::RowNumber;
use leadimport_core::validation::evaluator::validate_mapped;

pub fn fields(pairs: &[(FieldKey, &str)]) -> NormalizedData {
    pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
}

/// A row as the client would send it, with raw cells mirroring the fields.
pub fn commit_row(n: RowNumber, pairs: &[(FieldKey, &str)]) -> CommitRow {
    let mapped: BTreeMap<FieldKey, String> = pairs.iter().map(|(f, v)| (*f, v.to_string())).collect();
    CommitRow {
        validation: validate_mapped(n, &mapped),
        raw_data: pairs
            .iter()
            .map(|(f, v)| (f.label().to_string(), v.to_string()))
            .collect(),
    }
}

pub fn request(rows: Vec<CommitRow>) -> CommitRequest {
    CommitRequest {
        file_name: "leads.csv".into(),
        file_type: FileType::Csv,
        total_rows: rows.len(),
        validated_rows: rows,
        mappings: Vec::new(),
        assignment_config: AssignmentConfig::None,
        duplicate_config: DuplicateConfig::default(),
        row_actions: Vec::new(),
        db_duplicate_info: Vec::new(),
        edited_rows: BTreeMap::new(),
        default_status: None,
        default_source: None,
    }
}

/// `count` valid rows with distinct emails `user{n}@example.com`.
pub fn numbered_rows(count: i32) -> Vec<CommitRow> {
    (1..=count)
        .map(|n| commit_row(n, &[(FieldKey::Email, &format!("user{n}@example.com"))]))
        .collect()
}

pub fn db_duplicate(row_number: RowNumber, email: &str, lead_id: uuid::Uuid) -> DbDuplicateInfo {
    DbDuplicateInfo {
        row_number,
        matched_field: FieldKey::Email,
        matched_value: email.to_string(),
        existing_lead_id: lead_id.to_string(),
    }
}

/// Progress sink that keeps every report.
#[derive(Default)]
pub struct RecordingProgress {
    pub reports: Mutex<Vec<ImportProgress>>,
}

impl RecordingProgress {
    pub fn snapshots(&self) -> Vec<ImportProgress> {
        self.reports.lock().unwrap().clone()
    }
}

impl leadimport_pipeline::progress::ProgressSink for RecordingProgress {
    fn report(&self, progress: &ImportProgress) {
        self.reports.lock().unwrap().push(progress.clone());
    }
}
