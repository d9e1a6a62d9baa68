//! Handlers for bulk lead imports.
//!
//! Provides file parsing with suggested column mappings, the preview (row
//! validation plus duplicate detection), the standalone database duplicate
//! check, import commit and resume, job listing and detail, progress
//! polling, cancellation and the CSV report download.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use leadimport_core::duplicate_detection::{detect_file_duplicates, DbDuplicateCheck, DEFAULT_CHECK_FIELDS};
use leadimport_core::error::CoreError;
use leadimport_core::field::FieldKey;
use leadimport_core::import_status::{JobStatus, RowStatus};
use leadimport_core::importer::{CommitRequest, DuplicateConfig, ImportResultsSummary};
use leadimport_core::lead_store::{ImportJob, ImportRow, LeadStore};
use leadimport_core::mapping::{auto_map_columns, ColumnMapping};
use leadimport_core::parser::{parse_upload, ParsedFile, ParsedRow};
use leadimport_core::progress::{ImportPhase, ImportProgress, ProgressCounters};
use leadimport_core::report::{build_report, report_file_name};
use leadimport_core::types::DbId;
use leadimport_core::validation::import_preview::ImportPreview;
use leadimport_core::validation::rules::RowValidationResult;
use leadimport_pipeline::commit::submit_import;
use leadimport_pipeline::duplicate_check::{check_db_duplicates_or_degrade, db_check_candidates};
use leadimport_pipeline::preview::build_preview;
use leadimport_pipeline::ImportError;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Default page size for list endpoints.
const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page a client may request.
const MAX_PAGE_SIZE: i64 = 500;

/// Rows read per query while assembling a report.
const REPORT_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    fn resolve(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

async fn find_job_or_404(store: &dyn LeadStore, job_id: DbId) -> AppResult<ImportJob> {
    store.find_job(job_id).await?.ok_or(AppError::Core(CoreError::NotFound {
        entity: "ImportJob",
        id: job_id,
    }))
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ParseParams {
    pub file_name: String,
    pub has_header: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ParseResult {
    pub file: ParsedFile,
    pub total_rows: usize,
    /// One suggestion per header; low-confidence columns are left unmapped.
    pub mappings: Vec<ColumnMapping>,
}

/// POST /api/v1/imports/parse?file_name=leads.csv&has_header=true
///
/// Parse the raw file in the request body and suggest column mappings from
/// the headers and sample values.
pub async fn parse_file(
    State(state): State<AppState>,
    Query(params): Query<ParseParams>,
    body: Bytes,
) -> AppResult<Json<DataResponse<ParseResult>>> {
    let settings = &state.config.import;
    let options = settings.parse_options(params.has_header.unwrap_or(true));
    let file = parse_upload(&params.file_name, &body, &options).map_err(ImportError::from)?;

    let mappings = auto_map_columns(&file.headers, &file.rows, settings.auto_map_threshold);

    tracing::info!(
        file_name = %file.file_name,
        rows = file.total_rows(),
        columns = file.headers.len(),
        "Import file parsed",
    );

    Ok(Json(DataResponse {
        data: ParseResult {
            total_rows: file.total_rows(),
            file,
            mappings,
        },
    }))
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub rows: Vec<ParsedRow>,
    pub mappings: Vec<ColumnMapping>,
    #[serde(default)]
    pub duplicate_config: DuplicateConfig,
}

/// POST /api/v1/imports/preview
///
/// Validate parsed rows under the confirmed mappings and detect file and
/// database duplicates. A failing database lookup leaves a `warning`.
pub async fn preview_rows(
    State(state): State<AppState>,
    Json(input): Json<PreviewRequest>,
) -> AppResult<Json<DataResponse<ImportPreview>>> {
    if input.rows.len() > state.config.import.max_rows {
        return Err(AppError::BadRequest(format!(
            "Preview has {} rows (maximum {})",
            input.rows.len(),
            state.config.import.max_rows
        )));
    }

    let preview = build_preview(
        state.store.as_ref(),
        &input.rows,
        &input.mappings,
        &input.duplicate_config,
        state.config.import.lookup_batch_size,
    )
    .await;

    Ok(Json(DataResponse { data: preview }))
}

// ---------------------------------------------------------------------------
// Duplicate check
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DuplicateCheckRequest {
    pub rows: Vec<RowValidationResult>,
    /// Fields in priority order; the defaults apply when missing or empty.
    #[serde(default)]
    pub check_fields: Vec<FieldKey>,
}

/// POST /api/v1/imports/duplicates
///
/// Look up existing leads sharing a value with the valid, first-occurrence
/// rows. A failing lookup answers 200 with no duplicates and a `warning`.
pub async fn check_duplicates(
    State(state): State<AppState>,
    Json(input): Json<DuplicateCheckRequest>,
) -> AppResult<Json<DataResponse<DbDuplicateCheck>>> {
    let check_fields = if input.check_fields.is_empty() {
        DEFAULT_CHECK_FIELDS.to_vec()
    } else {
        input.check_fields
    };

    let file_duplicates = detect_file_duplicates(&input.rows, &check_fields);
    let candidates = db_check_candidates(&input.rows, &file_duplicates);
    let check = check_db_duplicates_or_degrade(
        state.store.as_ref(),
        &candidates,
        &check_fields,
        state.config.import.lookup_batch_size,
    )
    .await;

    Ok(Json(DataResponse { data: check }))
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_job_id: Option<DbId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ImportResultsSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/v1/imports/commit
///
/// Stage the rows as a new job and start the commit worker. Answers 200
/// with `results` when the worker finishes within the configured wait, or
/// 202 with only `import_job_id` while it keeps running. A worker that
/// stops on an error or a cancel answers `success: false` with the counts
/// reached so far.
pub async fn commit_import(
    State(state): State<AppState>,
    Json(request): Json<CommitRequest>,
) -> AppResult<(StatusCode, Json<CommitResponse>)> {
    let submitted = submit_import(state.store.as_ref(), request).await?;
    let job_id = submitted.job.id;

    let handle = state.imports.spawn_commit(
        state.store.clone(),
        job_id,
        submitted.plan.rows.len() as i64,
        state.config.import.commit_options(),
    );

    wait_for_worker(&state, job_id, handle).await
}

/// POST /api/v1/imports/{id}/commit
///
/// Resume a job whose commit was cancelled, stopped by a shutdown, or left
/// behind by a worker that died (once its lease is stale). Rows already
/// settled are kept; the remaining `valid` rows are committed with the
/// decisions staged at submit time. Answers like `POST /imports/commit`.
pub async fn resume_import(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<(StatusCode, Json<CommitResponse>)> {
    let job = find_job_or_404(state.store.as_ref(), job_id).await?;

    if state.imports.is_running(job_id) {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Import job {job_id} is already being committed"
        ))));
    }
    if !job.status.is_committable() {
        return Err(ImportError::JobNotReady {
            id: job_id,
            status: job.status.as_str().to_string(),
        }
        .into());
    }

    tracing::info!(job_id, status = job.status.as_str(), "Resuming import commit");
    let handle = state.imports.spawn_commit(
        state.store.clone(),
        job_id,
        job.total_rows,
        state.config.import.commit_options(),
    );

    wait_for_worker(&state, job_id, handle).await
}

/// Wait up to the configured time for a commit worker and shape its answer.
async fn wait_for_worker(
    state: &AppState,
    job_id: DbId,
    handle: JoinHandle<Result<ImportResultsSummary, ImportError>>,
) -> AppResult<(StatusCode, Json<CommitResponse>)> {
    let wait = Duration::from_secs(state.config.import.commit_wait_secs);
    let (status, body) = match tokio::time::timeout(wait, handle).await {
        Ok(Ok(Ok(results))) => (
            StatusCode::OK,
            CommitResponse {
                success: true,
                import_job_id: Some(job_id),
                results: Some(results),
                error: None,
            },
        ),
        Ok(Ok(Err(e))) => {
            let results = match state.store.find_job(job_id).await {
                Ok(job) => job.map(|j| j.summary()),
                Err(find_err) => {
                    tracing::warn!(job_id, error = %find_err, "Failed to read counts of a stopped import");
                    None
                }
            };
            (
                StatusCode::OK,
                CommitResponse {
                    success: false,
                    import_job_id: Some(job_id),
                    results,
                    error: Some(e.to_string()),
                },
            )
        }
        Ok(Err(join_err)) => {
            return Err(AppError::InternalError(format!(
                "Commit worker for import job {job_id} panicked: {join_err}"
            )));
        }
        Err(_) => {
            tracing::info!(job_id, wait_secs = wait.as_secs(), "Commit still running, answering early");
            (
                StatusCode::ACCEPTED,
                CommitResponse {
                    success: true,
                    import_job_id: Some(job_id),
                    results: None,
                    error: None,
                },
            )
        }
    };

    Ok((status, Json(body)))
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/v1/imports
///
/// Newest first. Supports `limit` and `offset`.
pub async fn list_imports(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> AppResult<impl IntoResponse> {
    let (limit, offset) = params.resolve();
    let jobs = state.store.list_jobs(limit, offset).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/imports/{id}
pub async fn get_import(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job_or_404(state.store.as_ref(), job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

#[derive(Debug, Deserialize)]
pub struct RowListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/v1/imports/{id}/rows
///
/// Staged rows ascending by row number, optionally filtered by `status`.
pub async fn list_rows(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Query(params): Query<RowListParams>,
) -> AppResult<Json<DataResponse<Vec<ImportRow>>>> {
    let status = params.status.as_deref().map(RowStatus::from_str_db).transpose()?;
    let (limit, offset) = PageParams {
        limit: params.limit,
        offset: params.offset,
    }
    .resolve();

    find_job_or_404(state.store.as_ref(), job_id).await?;
    let rows = state.store.list_rows(job_id, status, limit, offset).await?;
    Ok(Json(DataResponse { data: rows }))
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    #[serde(flatten)]
    pub progress: ImportProgress,
    pub percent: u8,
    /// Whether a worker in this process is committing the job.
    pub running: bool,
}

/// GET /api/v1/imports/{id}/progress
///
/// Live worker progress when the job runs here, otherwise the counters
/// persisted on the job.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<ProgressResponse>>> {
    let (progress, running) = match state.imports.progress(job_id) {
        Some(live) => (live, true),
        None => {
            let job = find_job_or_404(state.store.as_ref(), job_id).await?;
            (progress_from_job(&job), false)
        }
    };

    Ok(Json(DataResponse {
        data: ProgressResponse {
            percent: progress.percent(),
            progress,
            running,
        },
    }))
}

fn progress_from_job(job: &ImportJob) -> ImportProgress {
    let phase = match job.status {
        JobStatus::Ready | JobStatus::Queued => ImportPhase::Preparing,
        JobStatus::Importing => ImportPhase::Importing,
        JobStatus::Completed => ImportPhase::Completed,
        JobStatus::Failed => ImportPhase::Failed,
        JobStatus::Cancelled => ImportPhase::Cancelled,
    };

    ImportProgress {
        job_id: job.id,
        phase,
        processed_rows: job.processed_rows,
        total_rows: job.total_rows,
        current_batch: 0,
        total_batches: 0,
        counters: ProgressCounters {
            imported: job.imported_count,
            updated: job.updated_count,
            skipped: job.skipped_count,
            errors: job.error_count,
        },
    }
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CancelResult {
    pub job_id: DbId,
    /// `true` when a running worker was signalled and will stop after its
    /// current batch; `false` when the job was cancelled before starting.
    pub signalled_worker: bool,
}

/// POST /api/v1/imports/{id}/cancel
///
/// Signal the worker committing the job (202), or cancel a job that never
/// started (200). Returns 409 for finished jobs and for jobs committed by
/// another process.
pub async fn cancel_import(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if state.imports.cancel(job_id) {
        tracing::info!(job_id, "Import cancellation requested");
        return Ok((
            StatusCode::ACCEPTED,
            Json(DataResponse {
                data: CancelResult {
                    job_id,
                    signalled_worker: true,
                },
            }),
        ));
    }

    let job = find_job_or_404(state.store.as_ref(), job_id).await?;
    match job.status {
        JobStatus::Ready | JobStatus::Queued => {
            let counts = state.store.count_rows_by_status(job_id).await?;
            state.store.cancel_job(job_id, &counts).await?;
            tracing::info!(job_id, "Import cancelled before commit started");
            Ok((
                StatusCode::OK,
                Json(DataResponse {
                    data: CancelResult {
                        job_id,
                        signalled_worker: false,
                    },
                }),
            ))
        }
        JobStatus::Importing => Err(AppError::Core(CoreError::Conflict(format!(
            "Import job {job_id} is being committed by another process"
        )))),
        status => Err(AppError::Core(CoreError::Conflict(format!(
            "Import job {job_id} is already {} and cannot be cancelled",
            status.as_str()
        )))),
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// GET /api/v1/imports/{id}/report
///
/// CSV of every settled row, ascending by row number.
pub async fn download_report(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_job_or_404(state.store.as_ref(), job_id).await?;

    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let page = state.store.list_rows(job_id, None, REPORT_PAGE_SIZE, offset).await?;
        let fetched = page.len() as i64;
        rows.extend(page);
        if fetched < REPORT_PAGE_SIZE {
            break;
        }
        offset += fetched;
    }

    let csv = build_report(&rows)?;
    let disposition = format!("attachment; filename=\"{}\"", report_file_name(job_id));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
