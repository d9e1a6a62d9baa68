//! Integration tests for the wizard session: async transitions, the busy
//! guard and graceful degradation of the duplicate check.

use std::sync::Arc;

use assert_matches::assert_matches;
use leadimport_core::field::FieldKey;
use leadimport_core::import_wizard::{WizardAction, WizardStep};
use leadimport_core::importer::UnifiedRowAction;
use leadimport_core::lead_store::LeadStore;
use leadimport_core::progress::ImportPhase;
use leadimport_pipeline::duplicate_check::DUPLICATE_CHECK_UNAVAILABLE;
use leadimport_pipeline::memory_store::MemoryLeadStore;
use leadimport_pipeline::wizard_session::{ImportWizard, WizardSettings};
use leadimport_pipeline::ImportError;
use tokio_util::sync::CancellationToken;

const SCENARIO_CSV: &str = "Email,First Name,Company\n\
jean@test.com,Jean,\n\
,Marie,Acme\n\
Jean@Test.COM,,\n";

fn wizard(store: Arc<MemoryLeadStore>) -> ImportWizard {
    ImportWizard::new(store, WizardSettings::default())
}

#[tokio::test]
async fn full_flow_imports_scenario() {
    let store = Arc::new(MemoryLeadStore::new());
    let wizard = wizard(store.clone());

    wizard.load_file("leads.csv", SCENARIO_CSV.as_bytes()).unwrap();
    let state = wizard.state();
    assert_eq!(state.step, WizardStep::Upload);
    assert_eq!(state.parsed_file.as_ref().unwrap().total_rows(), 3);

    assert!(wizard.advance_to_preview().await.unwrap());
    let state = wizard.state();
    assert_eq!(state.step, WizardStep::Preview);
    let summary = state.preview.as_ref().unwrap().summary;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.valid, 1);
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.file_duplicates, 1);
    assert_eq!(state.decision(2), Some(UnifiedRowAction::Skip));
    assert_eq!(state.decision(3), Some(UnifiedRowAction::Skip));

    assert!(wizard.start_import(CancellationToken::new()).await.unwrap());
    let state = wizard.state();
    assert_eq!(state.step, WizardStep::Import);
    assert!(!state.is_processing);
    let results = state.results.unwrap();
    assert_eq!(results.imported_count, 1);
    assert_eq!(results.skipped_count, 2);
    assert_eq!(results.error_count, 0);
    assert_eq!(state.progress.unwrap().phase, ImportPhase::Completed);

    let job = store.find_job(state.job_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(job.imported_count, 1);
}

#[tokio::test]
async fn existing_lead_is_flagged_in_preview() {
    let store = Arc::new(MemoryLeadStore::new());
    store.seed_lead(
        [(FieldKey::Email, "jean@test.com".to_string())]
            .into_iter()
            .collect(),
    );
    let wizard = wizard(store);

    wizard.load_file("leads.csv", SCENARIO_CSV.as_bytes()).unwrap();
    wizard.advance_to_preview().await.unwrap();

    let state = wizard.state();
    let preview = state.preview.as_ref().unwrap();
    assert_eq!(preview.summary.db_duplicates, 1);
    assert_eq!(preview.summary.valid, 0);
    assert_eq!(state.decision(1), Some(UnifiedRowAction::Skip));
    assert!(state.duplicate_warning.is_none());

    // Nothing left to import until the user changes a decision.
    assert_matches!(wizard.start_import(CancellationToken::new()).await, Err(ImportError::Core(_)));
    wizard
        .dispatch(WizardAction::SetRowDecision {
            row_number: 1,
            action: UnifiedRowAction::Update,
        })
        .unwrap();
    assert!(wizard.start_import(CancellationToken::new()).await.unwrap());
    assert_eq!(wizard.state().results.unwrap().updated_count, 1);
}

#[tokio::test]
async fn failed_lookup_still_reaches_preview_with_warning() {
    let store = Arc::new(MemoryLeadStore::new());
    store.fail_lookups(true);
    let wizard = wizard(store);

    wizard.load_file("leads.csv", SCENARIO_CSV.as_bytes()).unwrap();
    assert!(wizard.advance_to_preview().await.unwrap());

    let state = wizard.state();
    assert_eq!(state.step, WizardStep::Preview);
    assert_eq!(state.duplicate_warning.as_deref(), Some(DUPLICATE_CHECK_UNAVAILABLE));
    assert_eq!(state.preview.unwrap().summary.db_duplicates, 0);
}

#[tokio::test]
async fn busy_wizard_ignores_second_transition() {
    let store = Arc::new(MemoryLeadStore::new());
    let wizard = wizard(store.clone());
    wizard.load_file("leads.csv", SCENARIO_CSV.as_bytes()).unwrap();

    wizard.dispatch(WizardAction::BeginPreview).unwrap();
    assert!(wizard.state().is_processing);

    assert!(!wizard.advance_to_preview().await.unwrap());
    assert!(!wizard.start_import(CancellationToken::new()).await.unwrap());
    assert!(store.lookup_sizes().is_empty());
    assert_eq!(wizard.state().step, WizardStep::Upload);
}

#[tokio::test]
async fn unsupported_file_is_rejected() {
    let wizard = wizard(Arc::new(MemoryLeadStore::new()));
    let result = wizard.load_file("leads.pdf", b"%PDF-1.4");
    assert_matches!(result, Err(ImportError::Parse(_)));
    assert!(wizard.state().parsed_file.is_none());
}

#[tokio::test]
async fn cancelled_import_leaves_error_and_allows_retry_state() {
    let store = Arc::new(MemoryLeadStore::new());
    let wizard = wizard(store);
    wizard.load_file("leads.csv", SCENARIO_CSV.as_bytes()).unwrap();
    wizard.advance_to_preview().await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = wizard.start_import(cancel).await;
    assert_matches!(result, Err(ImportError::Cancelled(_)));

    let state = wizard.state();
    assert!(!state.is_processing);
    assert!(state.error.unwrap().contains("cancelled"));
    assert!(state.results.is_none());
}
