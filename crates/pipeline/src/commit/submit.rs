//! Turning a commit request into a persisted job with staged rows.

use leadimport_core::import_status::RowStatus;
use leadimport_core::importer::{build_commit_plan, CommitPlan, CommitRequest};
use leadimport_core::lead_store::{ImportJob, LeadStore, NewImportJob, NewImportRow};

use crate::error::ImportError;

/// A created job and the plan the worker needs to commit it.
#[derive(Debug, Clone)]
pub struct SubmittedImport {
    pub job: ImportJob,
    pub plan: CommitPlan,
}

/// Plan the request, create the job and stage every row.
///
/// Rows that need work are staged as `valid` with their resolved action and
/// matched lead, so a later run needs nothing but the job id. Invalid rows
/// and skipped file duplicates are staged already settled. If staging fails
/// the job is marked failed.
pub async fn submit_import(store: &dyn LeadStore, request: CommitRequest) -> Result<SubmittedImport, ImportError> {
    let plan = build_commit_plan(request)?;

    let job = store
        .create_job(&NewImportJob {
            file_name: plan.file_name.clone(),
            file_type: plan.file_type.as_str().to_string(),
            total_rows: plan.total_rows as i64,
            valid_rows: plan.count_with_status(RowStatus::Valid) as i64,
            mappings: plan.mappings.clone(),
            assignment_config: plan.assignment.clone(),
            duplicate_config: plan.duplicate_config.clone(),
            default_status: plan.default_status.clone(),
            default_source: plan.default_source.clone(),
        })
        .await?;

    let rows: Vec<NewImportRow> = plan
        .rows
        .iter()
        .map(|r| NewImportRow {
            row_number: r.row_number,
            raw_data: r.raw_data.clone(),
            normalized_data: r.normalized_data.clone(),
            status: r.status,
            message: r.message.clone(),
            action: r.action,
            existing_lead_id: r.existing_lead_id,
        })
        .collect();

    if let Err(e) = store.insert_import_rows(job.id, &rows).await {
        tracing::error!(job_id = job.id, error = %e, "Failed to stage import rows");
        if let Err(fail_err) = store.fail_job(job.id, &format!("Failed to stage rows: {e}")).await {
            tracing::error!(job_id = job.id, error = %fail_err, "Failed to mark import job failed");
        }
        return Err(e.into());
    }

    tracing::info!(
        job_id = job.id,
        file_name = %job.file_name,
        staged_rows = rows.len(),
        valid_rows = job.valid_rows,
        dropped_entries = plan.dropped_entries,
        "Import job created",
    );

    Ok(SubmittedImport { job, plan })
}
