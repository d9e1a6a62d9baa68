//! Building the import preview from parsed rows.

use leadimport_core::duplicate_detection::{detect_file_duplicates, DbDuplicateCheck};
use leadimport_core::importer::DuplicateConfig;
use leadimport_core::lead_store::LeadStore;
use leadimport_core::mapping::ColumnMapping;
use leadimport_core::parser::ParsedRow;
use leadimport_core::validation::evaluator::validate_rows;
use leadimport_core::validation::import_preview::ImportPreview;

use crate::duplicate_check::{check_db_duplicates_or_degrade, db_check_candidates};

/// Validate `rows` under `mappings`, then detect file and database
/// duplicates.
///
/// The database check covers valid first occurrences only and degrades to a
/// warning when the store fails. It is skipped when `config.check_database`
/// is off.
pub async fn build_preview(
    store: &dyn LeadStore,
    rows: &[ParsedRow],
    mappings: &[ColumnMapping],
    config: &DuplicateConfig,
    lookup_batch_size: usize,
) -> ImportPreview {
    let validated = validate_rows(rows, mappings);
    let file_duplicates = detect_file_duplicates(&validated, &config.check_fields);
    let db_duplicates = if config.check_database {
        let candidates = db_check_candidates(&validated, &file_duplicates);
        check_db_duplicates_or_degrade(store, &candidates, &config.check_fields, lookup_batch_size).await
    } else {
        DbDuplicateCheck::default()
    };

    let preview = ImportPreview::new(validated, file_duplicates, db_duplicates);
    tracing::info!(
        total = preview.summary.total,
        valid = preview.summary.valid,
        invalid = preview.summary.invalid,
        file_duplicates = preview.summary.file_duplicates,
        db_duplicates = preview.summary.db_duplicates,
        "Import preview ready",
    );
    preview
}
