//! phenolink - clinical record term-resolution and submission pipeline.
//!
//! Reads tabular clinical records, resolves term fields against one or more
//! ontology releases, assembles FHIR-style resources, and submits them to an
//! identity-protected repository with checkpointed, resumable progress.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use phenolink_core::RunConfig;
use phenolink_ingest::ExpectedSchema;
use phenolink_ontology::{OntologyIndex, OntologySource};
use phenolink_pipeline::{FileCheckpointStore, PipelineBuilder, PipelineEvent};
use phenolink_resolve::ResourceSchema;
use phenolink_submit::{FhirConfig, FhirRepository, OAuthConfig, OAuthTokenProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; real environment wins.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let ontology_paths = required_env("PHENOLINK_ONTOLOGY")?;
    let input = PathBuf::from(required_env("PHENOLINK_INPUT")?);
    let checkpoint_path =
        std::env::var("PHENOLINK_CHECKPOINT").unwrap_or_else(|_| "phenolink-checkpoint.json".to_string());

    let subject_field =
        std::env::var("PHENOLINK_SUBJECT_FIELD").unwrap_or_else(|_| "patient_id".to_string());
    let term_fields: Vec<String> = std::env::var("PHENOLINK_TERM_FIELDS")
        .unwrap_or_else(|_| "phenotype".to_string())
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let config = RunConfig::from_env();

    // Ontology index: built once, shared read-only by all workers.
    let sources = ontology_paths
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(OntologySource::from_path)
        .collect::<Result<Vec<_>, _>>()
        .context("invalid PHENOLINK_ONTOLOGY")?;
    let index = Arc::new(OntologyIndex::build(&sources).context("ontology index build failed")?);

    // Every subject and mandatory term field must be present at ingestion.
    let mut required: Vec<String> = vec![subject_field.clone()];
    required.extend(config.mandatory_fields.iter().cloned());
    let expected = ExpectedSchema::new(required);

    let mut schema = ResourceSchema::new(subject_field, term_fields);
    if let Ok(system) = std::env::var("PHENOLINK_CODE_SYSTEM") {
        schema = schema.with_system(system);
    }
    if let Some(stem) = input.file_stem().and_then(|s| s.to_str()) {
        schema = schema.with_source_tag(stem);
    }

    let tokens = Arc::new(
        OAuthTokenProvider::new(OAuthConfig::from_env().context("identity provider config")?)
            .context("token provider")?,
    );
    let repository = Arc::new(
        FhirRepository::new(
            FhirConfig::from_env().context("remote repository config")?,
            tokens,
        )
        .context("repository client")?,
    );

    let pipeline = PipelineBuilder::new(
        index,
        expected,
        schema,
        repository,
        Arc::new(FileCheckpointStore::new(&checkpoint_path)),
    )
    .with_config(config)
    .build();

    // Progress reporting off the event bus.
    let mut events = pipeline.events();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                PipelineEvent::RowSkipped { row, reason } => {
                    warn!(row, %reason, "Row skipped");
                }
                PipelineEvent::ResourceDropped { row, reason } => {
                    warn!(row, %reason, "Resource dropped");
                }
                PipelineEvent::BatchCheckpointed { batch, row_offset } => {
                    info!(batch, row_offset, "Checkpoint advanced");
                }
                _ => {}
            }
        }
    });

    // Ctrl-C drains in-flight work and checkpoints before exit.
    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, draining pipeline");
            cancel.cancel();
        }
    });

    let summary = pipeline.run(Path::new(&input)).await?;
    reporter.abort();

    info!(
        accepted = summary.counts.accepted,
        rejected = summary.counts.rejected,
        abandoned = summary.counts.abandoned,
        dropped = summary.counts.dropped,
        skipped_rows = summary.counts.skipped_rows,
        final_offset = summary.final_offset,
        "Run complete"
    );

    if summary.counts.abandoned > 0 {
        std::process::exit(2);
    }
    Ok(())
}

fn required_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{} must be set", name))
}
