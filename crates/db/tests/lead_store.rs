//! Integration tests for the PostgreSQL lead store.
//!
//! Exercises the store against a real database:
//! - Case-insensitive duplicate lookup
//! - Lead insert order and update snapshots
//! - Job lease compare-and-set
//! - Row staging, paging and batched outcomes

use std::collections::BTreeMap;

use leadimport_core::audit::LeadHistoryEntry;
use leadimport_core::field::{FieldKey, NormalizedData};
use leadimport_core::import_status::{JobStatus, RowStatus};
use leadimport_core::importer::{AssignmentConfig, DuplicateConfig, RowAction};
use leadimport_core::lead::{LeadUpdate, NewLead};
use leadimport_core::lead_store::{LeadStore, NewImportJob, NewImportRow, RowOutcome, StoreError};
use leadimport_db::repositories::{LeadHistoryRepo, UserRepo};
use leadimport_db::PgLeadStore;
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fields(pairs: &[(FieldKey, &str)]) -> NormalizedData {
    pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
}

fn new_job(valid_rows: i64) -> NewImportJob {
    NewImportJob {
        file_name: "leads.csv".into(),
        file_type: "csv".into(),
        total_rows: valid_rows,
        valid_rows,
        mappings: Vec::new(),
        assignment_config: AssignmentConfig::None,
        duplicate_config: DuplicateConfig::default(),
        default_status: "new".into(),
        default_source: "import".into(),
    }
}

fn staged_row(n: i32, email: &str) -> NewImportRow {
    NewImportRow {
        row_number: n,
        raw_data: BTreeMap::from([("Email".to_string(), email.to_string())]),
        normalized_data: fields(&[(FieldKey::Email, email)]),
        status: RowStatus::Valid,
        message: None,
        action: Some(RowAction::Create),
        existing_lead_id: None,
    }
}

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_lookup_ignores_case(pool: PgPool) {
    let store = PgLeadStore::new(pool);
    let job = store.create_job(&new_job(1)).await.unwrap();
    let ids = store
        .insert_leads(&[NewLead {
            fields: fields(&[(FieldKey::Email, "Jean@Test.com"), (FieldKey::FirstName, "Jean")]),
            status: "new".into(),
            assigned_to: None,
            import_job_id: job.id,
        }])
        .await
        .unwrap();

    let found = store
        .find_leads_by_field(FieldKey::Email, &["jean@test.com".to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ids[0]);
    assert_eq!(found[0].value(FieldKey::FirstName), Some("Jean"));

    let none = store.find_leads_by_field(FieldKey::Phone, &[]).await.unwrap();
    assert!(none.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_insert_returns_ids_in_order(pool: PgPool) {
    let store = PgLeadStore::new(pool);
    let job = store.create_job(&new_job(3)).await.unwrap();
    let leads: Vec<NewLead> = ["a@x.com", "b@x.com", "c@x.com"]
        .iter()
        .map(|e| NewLead {
            fields: fields(&[(FieldKey::Email, e)]),
            status: "new".into(),
            assigned_to: None,
            import_job_id: job.id,
        })
        .collect();

    let ids = store.insert_leads(&leads).await.unwrap();
    assert_eq!(ids.len(), 3);

    for (id, email) in ids.iter().zip(["a@x.com", "b@x.com", "c@x.com"]) {
        let found = store
            .find_leads_by_field(FieldKey::Email, &[email.to_string()])
            .await
            .unwrap();
        assert_eq!(found[0].id, *id);
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_update_returns_previous_values(pool: PgPool) {
    let store = PgLeadStore::new(pool.clone());
    let job = store.create_job(&new_job(1)).await.unwrap();
    let ids = store
        .insert_leads(&[NewLead {
            fields: fields(&[(FieldKey::Email, "a@x.com"), (FieldKey::Company, "Old Co")]),
            status: "qualified".into(),
            assigned_to: None,
            import_job_id: job.id,
        }])
        .await
        .unwrap();

    let update = LeadUpdate {
        fields: fields(&[(FieldKey::Company, "New Co"), (FieldKey::City, "Lyon")]),
        import_job_id: job.id,
    };
    let before = store.update_lead(ids[0], &update).await.unwrap();
    assert_eq!(before.value(FieldKey::Company), Some("Old Co"));
    assert_eq!(before.value(FieldKey::City), None);

    let after = store
        .find_leads_by_field(FieldKey::Email, &["a@x.com".to_string()])
        .await
        .unwrap();
    assert_eq!(after[0].value(FieldKey::Company), Some("New Co"));
    assert_eq!(after[0].value(FieldKey::City), Some("Lyon"));

    let status: (String,) = sqlx::query_as("SELECT status FROM leads WHERE id = $1")
        .bind(ids[0])
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status.0, "qualified", "updates never touch status");

    let missing = store.update_lead(Uuid::new_v4(), &update).await;
    assert!(matches!(missing, Err(StoreError::NotFound { .. })));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_history_and_assignable_users(pool: PgPool) {
    let store = PgLeadStore::new(pool.clone());
    let job = store.create_job(&new_job(1)).await.unwrap();
    let data = fields(&[(FieldKey::Email, "a@x.com")]);
    let ids = store
        .insert_leads(&[NewLead {
            fields: data.clone(),
            status: "new".into(),
            assigned_to: None,
            import_job_id: job.id,
        }])
        .await
        .unwrap();

    store
        .insert_history(&[LeadHistoryEntry::created(ids[0], job.id, &data)])
        .await
        .unwrap();
    let history = LeadHistoryRepo::list_for_lead(&pool, ids[0]).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, "lead_created");
    assert_eq!(history[0].import_job_id, Some(job.id));

    UserRepo::create(&pool, "Bob Martin", "bob@x.com").await.unwrap();
    UserRepo::create(&pool, "Alice Roy", "alice@x.com").await.unwrap();
    sqlx::query("UPDATE users SET is_active = FALSE WHERE email = 'bob@x.com'")
        .execute(&pool)
        .await
        .unwrap();

    let users = store.list_assignable_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].display_name, "Alice Roy");
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_lease_is_exclusive(pool: PgPool) {
    let store = PgLeadStore::new(pool);
    let job = store.create_job(&new_job(1)).await.unwrap();
    assert_eq!(job.status, JobStatus::Ready);

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    assert!(store.acquire_job_lease(job.id, first, 300).await.unwrap());
    assert!(!store.acquire_job_lease(job.id, second, 300).await.unwrap());
    assert!(store.acquire_job_lease(job.id, first, 300).await.unwrap(), "re-entrant");

    let importing = store.find_job(job.id).await.unwrap().unwrap();
    assert_eq!(importing.status, JobStatus::Importing);
    assert!(importing.started_at.is_some());

    store.release_job_lease(job.id, first).await.unwrap();
    assert!(store.acquire_job_lease(job.id, second, 300).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_stale_lease_is_taken_over(pool: PgPool) {
    let store = PgLeadStore::new(pool.clone());
    let job = store.create_job(&new_job(1)).await.unwrap();
    assert!(store.acquire_job_lease(job.id, Uuid::new_v4(), 300).await.unwrap());

    sqlx::query("UPDATE import_jobs SET lease_acquired_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();

    assert!(store.acquire_job_lease(job.id, Uuid::new_v4(), 300).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_terminal_jobs_cannot_be_leased(pool: PgPool) {
    let store = PgLeadStore::new(pool);
    let job = store.create_job(&new_job(0)).await.unwrap();
    store.complete_job(job.id, &Default::default()).await.unwrap();

    assert!(!store.acquire_job_lease(job.id, Uuid::new_v4(), 300).await.unwrap());
    assert!(!store.acquire_job_lease(9_999_999, Uuid::new_v4(), 300).await.unwrap());

    let missing = store.fail_job(9_999_999, "boom").await;
    assert!(matches!(missing, Err(StoreError::NotFound { .. })));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_list_jobs_newest_first(pool: PgPool) {
    let store = PgLeadStore::new(pool);
    let a = store.create_job(&new_job(1)).await.unwrap();
    let b = store.create_job(&new_job(2)).await.unwrap();

    let jobs = store.list_jobs(10, 0).await.unwrap();
    assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![b.id, a.id]);
    assert_eq!(jobs[1].duplicate_config, DuplicateConfig::default());
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_rows_page_and_settle(pool: PgPool) {
    let store = PgLeadStore::new(pool);
    let job = store.create_job(&new_job(3)).await.unwrap();
    let staged = store
        .insert_import_rows(
            job.id,
            &[staged_row(1, "a@x.com"), staged_row(2, "b@x.com"), staged_row(3, "c@x.com")],
        )
        .await
        .unwrap();
    assert_eq!(staged, 3);

    let page = store.fetch_rows_by_status(job.id, RowStatus::Valid, 0, 2).await.unwrap();
    assert_eq!(page.iter().map(|r| r.row_number).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(page[0].normalized_data.get(&FieldKey::Email).map(String::as_str), Some("a@x.com"));

    let rest = store.fetch_rows_by_status(job.id, RowStatus::Valid, 2, 2).await.unwrap();
    assert_eq!(rest.len(), 1);

    store
        .update_row_outcomes(&[
            RowOutcome {
                row_id: page[0].id,
                status: RowStatus::Skipped,
                lead_id: None,
                message: Some("Skipped by user".into()),
                action: None,
                existing_lead_id: None,
            },
            RowOutcome {
                row_id: page[1].id,
                status: RowStatus::Error,
                lead_id: None,
                message: Some("Insert failed".into()),
                action: None,
                existing_lead_id: None,
            },
        ])
        .await
        .unwrap();

    let counts = store.count_rows_by_status(job.id).await.unwrap();
    assert_eq!(counts.valid, 1);
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.error, 1);
    assert_eq!(counts.processed(), 2);

    let errors = store.list_rows(job.id, Some(RowStatus::Error), 10, 0).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message.as_deref(), Some("Insert failed"));

    let all = store.list_rows(job.id, None, 10, 0).await.unwrap();
    assert_eq!(all.len(), 3);
}
