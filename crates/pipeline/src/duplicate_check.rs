//! Database duplicate detection against the lead store.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use leadimport_core::duplicate_detection::{
    compute_changed_fields, DbDuplicateCheck, DbDuplicateRow, FileDuplicateResult, MAX_LOOKUP_BATCH,
};
use leadimport_core::field::FieldKey;
use leadimport_core::lead::ExistingLeadSnapshot;
use leadimport_core::lead_store::{LeadStore, StoreError};
use leadimport_core::normalize::match_key;
use leadimport_core::types::RowNumber;
use leadimport_core::validation::rules::RowValidationResult;

/// Warning shown when the lookup failed and duplicates could not be checked.
pub const DUPLICATE_CHECK_UNAVAILABLE: &str =
    "Could not check for existing leads. Rows will be imported without database duplicate detection.";

/// Rows worth checking: valid and not a later occurrence of a file duplicate.
pub fn db_check_candidates<'a>(
    rows: &'a [RowValidationResult],
    file_duplicates: &FileDuplicateResult,
) -> Vec<&'a RowValidationResult> {
    rows.iter()
        .filter(|r| r.is_valid && file_duplicates.original_of(r.row_number).is_none())
        .collect()
}

/// Find rows that share a value with an existing lead.
///
/// Fields are checked in priority order; a row matched by one field is not
/// looked up again for later fields. Distinct values are sent to the store in
/// batches of at most `batch_size` (capped at [`MAX_LOOKUP_BATCH`]). When
/// several leads share a value the oldest wins.
pub async fn detect_db_duplicates(
    store: &dyn LeadStore,
    rows: &[&RowValidationResult],
    check_fields: &[FieldKey],
    batch_size: usize,
) -> Result<DbDuplicateCheck, StoreError> {
    let batch_size = batch_size.clamp(1, MAX_LOOKUP_BATCH);
    let mut matched: BTreeMap<RowNumber, DbDuplicateRow> = BTreeMap::new();
    let mut seen_fields = BTreeSet::new();

    for &field in check_fields {
        if !seen_fields.insert(field) {
            continue;
        }

        let pending: Vec<(&RowValidationResult, &str)> = rows
            .iter()
            .filter(|r| !matched.contains_key(&r.row_number))
            .filter_map(|r| r.value(field).filter(|v| !v.trim().is_empty()).map(|v| (*r, v)))
            .collect();
        if pending.is_empty() {
            continue;
        }

        let values: Vec<String> = pending
            .iter()
            .map(|(_, v)| match_key(v))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut existing: HashMap<String, ExistingLeadSnapshot> = HashMap::new();
        for chunk in values.chunks(batch_size) {
            let found = store.find_leads_by_field(field, chunk).await?;
            for lead in found {
                if let Some(value) = lead.value(field) {
                    existing.entry(match_key(value)).or_insert(lead);
                }
            }
        }

        for (row, value) in pending {
            if let Some(lead) = existing.get(&match_key(value)) {
                matched.insert(
                    row.row_number,
                    DbDuplicateRow {
                        row_number: row.row_number,
                        matched_field: field,
                        matched_value: value.to_string(),
                        existing_lead: lead.clone(),
                        changed_fields: compute_changed_fields(&row.normalized_data, &lead.fields),
                        row_action: None,
                    },
                );
            }
        }
    }

    tracing::debug!(
        checked_rows = rows.len(),
        duplicates = matched.len(),
        "Database duplicate check finished",
    );

    Ok(DbDuplicateCheck {
        duplicates: matched.into_values().collect(),
        checked_rows: rows.len(),
        warning: None,
    })
}

/// Like [`detect_db_duplicates`], but a store failure yields zero duplicates
/// and a warning instead of an error.
pub async fn check_db_duplicates_or_degrade(
    store: &dyn LeadStore,
    rows: &[&RowValidationResult],
    check_fields: &[FieldKey],
    batch_size: usize,
) -> DbDuplicateCheck {
    match detect_db_duplicates(store, rows, check_fields, batch_size).await {
        Ok(check) => check,
        Err(e) => {
            tracing::warn!(error = %e, rows = rows.len(), "Duplicate check unavailable, continuing without it");
            DbDuplicateCheck::unavailable(rows.len(), DUPLICATE_CHECK_UNAVAILABLE)
        }
    }
}
