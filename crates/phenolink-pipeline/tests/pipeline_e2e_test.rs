//! End-to-end pipeline tests against the in-memory mock repository.

use std::path::PathBuf;
use std::sync::Arc;

use phenolink_core::{OntologyConcept, RunConfig, RunSummary};
use phenolink_ingest::ExpectedSchema;
use phenolink_ontology::OntologyIndex;
use phenolink_pipeline::{FileCheckpointStore, Pipeline, PipelineBuilder, PipelineEvent};
use phenolink_resolve::{derive_resource_id, ResourceSchema};
use phenolink_submit::MockRepository;

fn concept(id: &str, label: &str, synonyms: &[&str]) -> OntologyConcept {
    OntologyConcept {
        id: id.to_string(),
        label: label.to_string(),
        synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        parents: Vec::new(),
    }
}

fn sample_index() -> Arc<OntologyIndex> {
    Arc::new(
        OntologyIndex::from_concepts(vec![
            concept("HP:0001250", "Seizure", &["Epileptic seizure"]),
            concept("HP:0002315", "Headache", &["Cephalgia"]),
            concept("HP:0001945", "Fever", &["Pyrexia"]),
        ])
        .unwrap(),
    )
}

struct Setup {
    pipeline: Pipeline,
    repo: MockRepository,
    source: PathBuf,
    _dir: tempfile::TempDir,
}

fn setup(csv: &str, repo: MockRepository, config: RunConfig) -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("records.csv");
    std::fs::write(&source, csv).unwrap();

    let pipeline = PipelineBuilder::new(
        sample_index(),
        ExpectedSchema::new(["patient_id", "phenotype"]),
        ResourceSchema::new("patient_id", vec!["phenotype".to_string()])
            .with_source_tag("records"),
        Arc::new(repo.clone()),
        Arc::new(FileCheckpointStore::new(dir.path().join("checkpoint.json"))),
    )
    .with_config(config)
    .build();

    Setup {
        pipeline,
        repo,
        source,
        _dir: dir,
    }
}

fn fast_config() -> RunConfig {
    RunConfig::default()
        .with_batch_size(2)
        .with_max_retry_attempts(3)
        .with_backoff(1, 5)
        .with_mandatory_fields(["phenotype"])
}

async fn run(setup: &Setup) -> RunSummary {
    setup.pipeline.run(&setup.source).await.unwrap()
}

const THREE_ROWS: &str = "\
patient_id,phenotype
P001,Seizure
P002,Epileptic seizure
P003,no such finding anywhere
";

#[tokio::test]
async fn three_row_scenario() {
    // Row 1 matches a label, row 2 matches a synonym exactly, row 3 matches
    // nothing and the field is mandatory.
    let s = setup(THREE_ROWS, MockRepository::new(), fast_config());
    let summary = run(&s).await;

    assert_eq!(summary.counts.accepted, 2);
    assert_eq!(summary.counts.dropped, 1);
    assert_eq!(summary.counts.rejected, 0);
    assert_eq!(summary.counts.abandoned, 0);
    assert_eq!(summary.counts.skipped_rows, 0);
    assert_eq!(summary.final_offset, 3);
    assert_eq!(s.repo.stored_count(), 2);
}

#[tokio::test]
async fn unresolved_optional_field_falls_back_to_text() {
    let config = RunConfig::default()
        .with_batch_size(2)
        .with_max_retry_attempts(3)
        .with_backoff(1, 5);
    let s = setup(THREE_ROWS, MockRepository::new(), config);
    let summary = run(&s).await;

    // Without the mandatory constraint row 3 is submitted with free text.
    assert_eq!(summary.counts.accepted, 3);
    assert_eq!(summary.counts.dropped, 0);

    let id = derive_resource_id("P003", 3, "records");
    let stored = s.repo.stored(&id).unwrap();
    assert_eq!(
        stored.codes["phenotype"].text.as_deref(),
        Some("no such finding anywhere")
    );
}

#[tokio::test]
async fn invalid_rows_are_skipped_and_counted() {
    let csv = "\
patient_id,phenotype
P001,Seizure
,Headache
P003,Fever
";
    let s = setup(csv, MockRepository::new(), fast_config());
    let summary = run(&s).await;

    assert_eq!(summary.counts.accepted, 2);
    assert_eq!(summary.counts.skipped_rows, 1);
    assert_eq!(summary.final_offset, 3);
}

#[tokio::test]
async fn abandoned_resources_are_counted() {
    let s = setup(
        THREE_ROWS,
        MockRepository::new().with_default_status(503),
        fast_config(),
    );
    let summary = run(&s).await;

    assert_eq!(summary.counts.accepted, 0);
    assert_eq!(summary.counts.abandoned, 2);
    assert_eq!(summary.counts.dropped, 1);
    // Attempt ceiling: 2 resources, 3 attempts each.
    let id = derive_resource_id("P001", 1, "records");
    assert_eq!(s.repo.upsert_count(&id), 3);
}

#[tokio::test]
async fn rejected_resources_are_not_retried() {
    let id = derive_resource_id("P001", 1, "records");
    let s = setup(
        THREE_ROWS,
        MockRepository::new().with_script(id.clone(), [422]),
        fast_config(),
    );
    let summary = run(&s).await;

    assert_eq!(summary.counts.accepted, 1);
    assert_eq!(summary.counts.rejected, 1);
    assert_eq!(s.repo.upsert_count(&id), 1);
}

#[tokio::test]
async fn rerun_upserts_instead_of_duplicating() {
    let repo = MockRepository::new();
    let config = fast_config();

    let s1 = setup(THREE_ROWS, repo.clone(), config.clone());
    run(&s1).await;
    let s2 = setup(THREE_ROWS, repo.clone(), config);
    run(&s2).await;

    // Same rows, same client-assigned ids: the second run updates in place.
    assert_eq!(repo.stored_count(), 2);
    let id = derive_resource_id("P001", 1, "records");
    assert_eq!(repo.upsert_count(&id), 2);
}

const SIX_ROWS: &str = "\
patient_id,phenotype
P001,Seizure
P002,Headache
P003,Fever
P004,Pyrexia
P005,Cephalgia
P006,Seizure
";

#[tokio::test]
async fn checkpoint_advances_per_batch() {
    let s = setup(SIX_ROWS, MockRepository::new(), fast_config());
    let mut events = s.pipeline.events();
    let summary = run(&s).await;

    assert_eq!(summary.counts.accepted, 6);

    let mut checkpoints = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::BatchCheckpointed { row_offset, .. } = event {
            checkpoints.push(row_offset);
        }
    }
    // Batch size 2 over 6 rows: offsets strictly advance to the end.
    assert_eq!(checkpoints, vec![2, 4, 6]);
}

#[tokio::test]
async fn resumed_run_processes_remaining_rows_only() {
    let repo = MockRepository::new();
    let config = fast_config();

    // Uninterrupted reference run.
    let full = setup(SIX_ROWS, MockRepository::new(), config.clone());
    let uninterrupted = run(&full).await;

    // Interrupted run: the store already holds the checkpoint written after
    // the second batch (row 4, 4 accepted).
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("records.csv");
    std::fs::write(&source, SIX_ROWS).unwrap();
    let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));
    {
        use phenolink_core::{CheckpointStore, PipelineCheckpoint, RunCounts};
        let counts = RunCounts {
            accepted: 4,
            ..Default::default()
        };
        store.save(&PipelineCheckpoint::new(4, counts)).await.unwrap();
    }

    let pipeline = PipelineBuilder::new(
        sample_index(),
        ExpectedSchema::new(["patient_id", "phenotype"]),
        ResourceSchema::new("patient_id", vec!["phenotype".to_string()])
            .with_source_tag("records"),
        Arc::new(repo.clone()),
        Arc::new(store),
    )
    .with_config(config)
    .build();

    let summary = pipeline.run(&source).await.unwrap();

    // Only rows 5 and 6 were reprocessed.
    assert_eq!(summary.resumed_from, 4);
    assert_eq!(repo.upsert_count(&derive_resource_id("P001", 1, "records")), 0);
    assert_eq!(repo.upsert_count(&derive_resource_id("P005", 5, "records")), 1);

    // Final counts match the uninterrupted run.
    assert_eq!(summary.counts, uninterrupted.counts);
    assert_eq!(summary.final_offset, uninterrupted.final_offset);
}

#[tokio::test]
async fn cancellation_before_start_processes_nothing() {
    let s = setup(SIX_ROWS, MockRepository::new(), fast_config());
    s.pipeline.cancel_handle().cancel();

    let summary = run(&s).await;
    assert_eq!(summary.counts.total(), 0);
    assert_eq!(s.repo.stored_count(), 0);
}

#[tokio::test]
async fn run_events_bracket_the_run() {
    let s = setup(THREE_ROWS, MockRepository::new(), fast_config());
    let mut events = s.pipeline.events();
    run(&s).await;

    let mut saw_start = false;
    let mut saw_finish = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::RunStarted { resumed_from, .. } => {
                saw_start = true;
                assert_eq!(resumed_from, 0);
            }
            PipelineEvent::RunFinished { .. } => saw_finish = true,
            _ => {}
        }
    }
    assert!(saw_start);
    assert!(saw_finish);
}

#[tokio::test]
async fn unreadable_source_is_fatal() {
    let s = setup(THREE_ROWS, MockRepository::new(), fast_config());
    let missing = s._dir.path().join("missing.csv");
    let result = s.pipeline.run(&missing).await;
    assert!(result.is_err());
}
