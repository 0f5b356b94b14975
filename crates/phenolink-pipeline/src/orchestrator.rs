//! Three-stage bounded-queue pipeline.
//!
//! Ingestion produces rows into a bounded queue; the resolve/build stage
//! consumes them and produces submission-ready items into a second bounded
//! queue; the submission stage drives each batch to terminal outcomes and
//! advances the checkpoint. A full queue blocks its producer, so no stage
//! outruns the rest.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use phenolink_core::defaults;
use phenolink_core::{
    CanonicalResource, CheckpointStore, Error, PipelineCheckpoint, RawRecord, ResourceRepository,
    Result, RunConfig, RunCounts, RunSummary, SubmissionOutcome, SubmissionStatus,
};
use phenolink_ingest::{ExpectedSchema, RecordStream};
use phenolink_ontology::OntologyIndex;
use phenolink_resolve::{Resolver, ResourceBuilder, ResourceSchema};
use phenolink_submit::{RetryPolicy, SubmissionClient};

/// Event emitted by a running pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A run began, possibly resuming from a checkpoint.
    RunStarted { run_id: Uuid, resumed_from: u64 },
    /// A row failed validation and was skipped.
    RowSkipped { row: u64, reason: String },
    /// A resource was dropped before submission.
    ResourceDropped { row: u64, reason: String },
    /// A resource reached a terminal submission status.
    ResourceFinished {
        resource_id: String,
        status: SubmissionStatus,
        attempts: u32,
    },
    /// A batch reached terminal state and the checkpoint advanced.
    BatchCheckpointed { batch: u64, row_offset: u64 },
    /// The run finished.
    RunFinished { run_id: Uuid },
}

/// Requests cooperative shutdown of a running pipeline.
///
/// Cancelling stops ingestion; queued and in-flight items drain to terminal
/// state and the final batch is checkpointed before `run` returns.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Item flowing from ingestion to the resolve/build stage.
enum RawItem {
    Record(RawRecord),
    SkippedRow { row: u64, reason: String },
}

/// Item flowing from resolve/build to submission.
enum BuiltItem {
    Resource(Box<CanonicalResource>),
    SkippedRow { row: u64, reason: String },
    Dropped { row: u64, reason: String },
}

impl BuiltItem {
    fn row(&self) -> u64 {
        match self {
            Self::Resource(r) => r.source_row,
            Self::SkippedRow { row, .. } | Self::Dropped { row, .. } => *row,
        }
    }
}

/// The assembled pipeline, ready to run.
pub struct Pipeline {
    index: Arc<OntologyIndex>,
    expected: ExpectedSchema,
    schema: ResourceSchema,
    repository: Arc<dyn ResourceRepository>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: RunConfig,
    event_tx: broadcast::Sender<PipelineEvent>,
    cancel: Arc<AtomicBool>,
}

/// Builder wiring the pipeline's collaborators together.
pub struct PipelineBuilder {
    index: Arc<OntologyIndex>,
    expected: ExpectedSchema,
    schema: ResourceSchema,
    repository: Arc<dyn ResourceRepository>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: RunConfig,
}

impl PipelineBuilder {
    pub fn new(
        index: Arc<OntologyIndex>,
        expected: ExpectedSchema,
        schema: ResourceSchema,
        repository: Arc<dyn ResourceRepository>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            index,
            expected,
            schema,
            repository,
            checkpoints,
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Pipeline {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        // The builder's mandatory set is authoritative for the run.
        let mut schema = self.schema;
        schema.mandatory_fields = self.config.mandatory_fields.clone();
        Pipeline {
            index: self.index,
            expected: self.expected,
            schema,
            repository: self.repository,
            checkpoints: self.checkpoints,
            config: self.config,
            event_tx,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Pipeline {
    /// Get a receiver for pipeline events.
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    /// Handle for cooperative cancellation.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: self.cancel.clone(),
        }
    }

    /// Run the pipeline over one tabular source to completion.
    ///
    /// Returns the run summary; row- and resource-scoped failures are
    /// counted, not raised. Only unreadable sources, checkpoint failures,
    /// and unrecoverable authentication errors surface as `Err`.
    #[instrument(skip(self, source), fields(source = %source.display()))]
    pub async fn run(&self, source: &Path) -> Result<RunSummary> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        let resume = self.checkpoints.load().await?;
        let (resumed_from, initial_counts) = match resume {
            Some(cp) => (cp.row_offset, cp.counts),
            None => (0, RunCounts::default()),
        };

        info!(
            %run_id,
            resumed_from,
            batch_size = self.config.batch_size,
            "Pipeline run starting"
        );
        let _ = self.event_tx.send(PipelineEvent::RunStarted {
            run_id,
            resumed_from,
        });

        // Opening the stream validates readability; failure here is fatal.
        let stream = RecordStream::open_at(source, self.expected.clone(), resumed_from)?;

        let (raw_tx, raw_rx) = mpsc::channel::<RawItem>(self.config.queue_capacity);
        let (built_tx, built_rx) = mpsc::channel::<BuiltItem>(self.config.queue_capacity);

        let ingest = self.spawn_ingest(stream, raw_tx);
        let resolve = self.spawn_resolve(raw_rx, built_tx);
        let result = self
            .submit_loop(built_rx, resumed_from, initial_counts)
            .await;

        // Stages wind down once their channels close; a fatal submit error
        // drops the receivers, which unblocks them too.
        let _ = ingest.await;
        let _ = resolve.await;

        let (counts, final_offset) = result?;
        let summary = RunSummary {
            run_id,
            counts,
            resumed_from,
            final_offset,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            %run_id,
            accepted = counts.accepted,
            rejected = counts.rejected,
            abandoned = counts.abandoned,
            dropped = counts.dropped,
            skipped_rows = counts.skipped_rows,
            duration_ms = summary.duration_ms,
            "Pipeline run finished"
        );
        let _ = self.event_tx.send(PipelineEvent::RunFinished { run_id });

        Ok(summary)
    }

    /// Stage 1: single producer streaming rows off the source.
    fn spawn_ingest(
        &self,
        stream: RecordStream<std::fs::File>,
        raw_tx: mpsc::Sender<RawItem>,
    ) -> tokio::task::JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::task::spawn_blocking(move || {
            for item in stream {
                if cancel.load(Ordering::SeqCst) {
                    debug!("Ingestion cancelled");
                    break;
                }
                let raw_item = match item {
                    Ok(record) => RawItem::Record(record),
                    Err(Error::RowValidation { row, message }) => {
                        warn!(row, reason = %message, "Skipping invalid row");
                        RawItem::SkippedRow {
                            row,
                            reason: message,
                        }
                    }
                    Err(e) => {
                        // The stream only yields row-scoped errors after a
                        // successful open; anything else ends ingestion.
                        error!(error = %e, "Ingestion stream failed");
                        break;
                    }
                };
                // A full queue blocks here: backpressure, not growth.
                if raw_tx.blocking_send(raw_item).is_err() {
                    break;
                }
            }
        })
    }

    /// Stage 2: resolve and build, a batch at a time, preserving row order.
    fn spawn_resolve(
        &self,
        mut raw_rx: mpsc::Receiver<RawItem>,
        built_tx: mpsc::Sender<BuiltItem>,
    ) -> tokio::task::JoinHandle<()> {
        let resolver = Arc::new(Resolver::new(
            self.index.clone(),
            self.config.similarity_threshold,
        ));
        let builder = Arc::new(ResourceBuilder::new(self.schema.clone()));
        let term_fields: Arc<Vec<String>> = Arc::new(self.schema.term_fields.clone());
        let batch_size = self.config.batch_size;
        let workers = self.config.resolver_workers.max(1);

        tokio::spawn(async move {
            loop {
                let batch = recv_batch(&mut raw_rx, batch_size).await;
                if batch.is_empty() {
                    break;
                }

                let mut results: Vec<BuiltItem> = Vec::with_capacity(batch.len());
                let mut tasks: JoinSet<BuiltItem> = JoinSet::new();

                for item in batch {
                    match item {
                        RawItem::SkippedRow { row, reason } => {
                            results.push(BuiltItem::SkippedRow { row, reason });
                        }
                        RawItem::Record(record) => {
                            if tasks.len() >= workers {
                                if let Some(Ok(built)) = tasks.join_next().await {
                                    results.push(built);
                                }
                            }
                            let resolver = resolver.clone();
                            let builder = builder.clone();
                            let fields = term_fields.clone();
                            tasks.spawn(async move {
                                let resolved = resolver.resolve(&record, &fields);
                                match builder.build(&record, &resolved) {
                                    Ok(resource) => BuiltItem::Resource(Box::new(resource)),
                                    Err(e) => BuiltItem::Dropped {
                                        row: record.row(),
                                        reason: e.to_string(),
                                    },
                                }
                            });
                        }
                    }
                }
                while let Some(joined) = tasks.join_next().await {
                    if let Ok(built) = joined {
                        results.push(built);
                    }
                }

                // Workers may finish out of order; row order is restored
                // before anything moves downstream.
                results.sort_by_key(BuiltItem::row);
                for built in results {
                    if built_tx.send(built).await.is_err() {
                        return;
                    }
                }
            }
        })
    }

    /// Stage 3: submit batches to terminal state, then checkpoint.
    async fn submit_loop(
        &self,
        mut built_rx: mpsc::Receiver<BuiltItem>,
        resumed_from: u64,
        initial_counts: RunCounts,
    ) -> Result<(RunCounts, u64)> {
        let submitter = Arc::new(SubmissionClient::new(
            self.repository.clone(),
            RetryPolicy {
                max_attempts: self.config.max_retry_attempts,
                base_ms: self.config.backoff_base_ms,
                max_ms: self.config.backoff_max_ms,
            },
        ));
        let workers = self.config.submit_workers.max(1);

        let mut counts = initial_counts;
        let mut offset = resumed_from;
        let mut batch_no: u64 = 0;

        loop {
            let batch = recv_batch(&mut built_rx, self.config.batch_size).await;
            if batch.is_empty() {
                break;
            }
            batch_no += 1;

            let mut batch_counts = RunCounts::default();
            let mut high_row = offset;
            let mut submissions: JoinSet<Result<SubmissionOutcome>> = JoinSet::new();

            for item in batch {
                high_row = high_row.max(item.row());
                match item {
                    BuiltItem::SkippedRow { row, reason } => {
                        batch_counts.skipped_rows += 1;
                        let _ = self
                            .event_tx
                            .send(PipelineEvent::RowSkipped { row, reason });
                    }
                    BuiltItem::Dropped { row, reason } => {
                        warn!(row, reason = %reason, "Resource dropped");
                        batch_counts.dropped += 1;
                        let _ = self
                            .event_tx
                            .send(PipelineEvent::ResourceDropped { row, reason });
                    }
                    BuiltItem::Resource(resource) => {
                        if submissions.len() >= workers {
                            if let Some(joined) = submissions.join_next().await {
                                self.record_submission(joined, &mut batch_counts)?;
                            }
                        }
                        let submitter = submitter.clone();
                        submissions.spawn(async move { submitter.submit(&resource).await });
                    }
                }
            }
            // The batch checkpoint must not advance until every resource in
            // it is terminal.
            while let Some(joined) = submissions.join_next().await {
                self.record_submission(joined, &mut batch_counts)?;
            }

            counts.merge(&batch_counts);
            offset = high_row;
            self.checkpoints
                .save(&PipelineCheckpoint::new(offset, counts))
                .await?;
            debug!(batch = batch_no, row_offset = offset, "Batch checkpointed");
            let _ = self.event_tx.send(PipelineEvent::BatchCheckpointed {
                batch: batch_no,
                row_offset: offset,
            });
        }

        Ok((counts, offset))
    }

    /// Fold one finished submission into the batch tally.
    fn record_submission(
        &self,
        joined: std::result::Result<Result<SubmissionOutcome>, tokio::task::JoinError>,
        batch_counts: &mut RunCounts,
    ) -> Result<()> {
        let outcome = match joined {
            Ok(result) => result?,
            Err(e) => {
                return Err(Error::Internal(format!("submission task panicked: {}", e)));
            }
        };

        match outcome.status {
            SubmissionStatus::Accepted => batch_counts.accepted += 1,
            SubmissionStatus::Rejected => batch_counts.rejected += 1,
            SubmissionStatus::Abandoned => batch_counts.abandoned += 1,
            SubmissionStatus::PendingRetry => {
                // The submission client only returns terminal outcomes.
                return Err(Error::Internal(
                    "non-terminal submission outcome".to_string(),
                ));
            }
        }

        let _ = self.event_tx.send(PipelineEvent::ResourceFinished {
            resource_id: outcome.resource_id,
            status: outcome.status,
            attempts: outcome.attempts,
        });
        Ok(())
    }
}

/// Receive up to `max` items, blocking until the batch fills or the channel
/// closes.
async fn recv_batch<T>(rx: &mut mpsc::Receiver<T>, max: usize) -> Vec<T> {
    let mut batch = Vec::new();
    while batch.len() < max {
        match rx.recv().await {
            Some(item) => batch.push(item),
            None => break,
        }
    }
    batch
}
