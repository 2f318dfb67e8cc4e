//! # Enrichment Orchestrator
//!
//! Drives the account-enrichment pipeline over a list of Address Pairs.
//!
//! ## Overview
//!
//! The input is cut into fixed-size batches that are processed strictly one
//! after another:
//!
//! 1. **Running**: a balance lookup and a staking lookup are dispatched for
//!    every address of the batch, all concurrently
//! 2. **Draining**: the orchestrator waits for every lookup of the batch; each
//!    lookup resolves by contract, so draining always completes
//! 3. The batch's records are appended to the [`ResultSink`] in input order
//!    and progress is logged
//! 4. **Paused**: if batches remain, the orchestrator sleeps for the pacing
//!    interval before starting the next one
//!
//! Lookup failures never abort a run. The only fatal conditions are an
//! unreadable input (before any batch starts) and a sink write failure, which
//! reports the index of the batch that could not be persisted.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use xchain_overlap::batch_orchestrator::enrich_file;
//! use xchain_overlap::settings::Settings;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = Settings::new()?;
//! let summary = enrich_file(&settings, Path::new("output.csv"), Path::new("hub.csv"), false).await?;
//! println!("{} records written", summary.processed);
//! # Ok(())
//! # }
//! ```

use crate::address_source::{load_address_pairs, InputError};
use crate::endpoint_pool::{EndpointPool, PoolError};
use crate::lcd_client::{FetchError, LcdHttpClient};
use crate::metrics;
use crate::remote_fetcher::{Fetched, RemoteFetcher};
use crate::result_sink::{CsvResultSink, ResultSink, SinkError};
use crate::settings::{Batch, Settings};
use crate::types::{AddressPair, EnrichmentRecord, StakingStatus};
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, Instrument};

/// Lifecycle of a run. Batch indices are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running(usize),
    Draining(usize),
    Paused(usize),
    Done,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Address Pairs in the input
    pub total: usize,
    /// Records in the sink at the end of the run, including resumed ones
    pub processed: usize,
    /// Batches written by this run
    pub batches: usize,
    /// Index of the first batch this run processed (non-zero when resumed)
    pub first_batch: usize,
    pub defaulted_balances: usize,
    pub defaulted_staking: usize,
}

/// Batches Address Pairs through a [`RemoteFetcher`] into a [`ResultSink`].
pub struct EnrichmentOrchestrator<S: ResultSink> {
    fetcher: RemoteFetcher,
    sink: S,
    batch_size: usize,
    pause: Duration,
    state: PipelineState,
}

impl<S: ResultSink> EnrichmentOrchestrator<S> {
    pub fn new(fetcher: RemoteFetcher, sink: S, batch: &Batch) -> Result<Self, PipelineError> {
        if batch.size == 0 {
            return Err(PipelineError::InvalidBatchSize);
        }
        Ok(Self {
            fetcher,
            sink,
            batch_size: batch.size,
            pause: batch.pause(),
            state: PipelineState::Idle,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Resets the sink and enriches every pair from the first batch on.
    pub async fn run(&mut self, pairs: &[AddressPair]) -> Result<RunSummary, PipelineError> {
        self.sink.reset().map_err(PipelineError::SinkOpen)?;
        info!("Processing {} addresses...", pairs.len());
        self.process(pairs, 0, 0).await
    }

    /// Continues an interrupted run from the sink's last committed batch.
    ///
    /// Falls back to a fresh [`run`](Self::run) when the sink has nothing to
    /// resume from.
    pub async fn resume(&mut self, pairs: &[AddressPair]) -> Result<RunSummary, PipelineError> {
        let checkpoint = match self.sink.resume_point().map_err(PipelineError::SinkOpen)? {
            Some(checkpoint) => checkpoint,
            None => {
                info!("No checkpoint found, starting a fresh run");
                return self.run(pairs).await;
            }
        };

        if checkpoint.records_committed > pairs.len() {
            return Err(PipelineError::CheckpointMismatch {
                committed: checkpoint.records_committed,
                total: pairs.len(),
            });
        }

        info!(
            "Resuming at batch {}: {} of {} addresses already written",
            checkpoint.batches_committed,
            checkpoint.records_committed,
            pairs.len()
        );
        self.process(
            pairs,
            checkpoint.records_committed,
            checkpoint.batches_committed,
        )
        .await
    }

    async fn process(
        &mut self,
        pairs: &[AddressPair],
        first_record: usize,
        first_batch: usize,
    ) -> Result<RunSummary, PipelineError> {
        let total = pairs.len();
        let remaining = &pairs[first_record..];
        let batch_count = (remaining.len() + self.batch_size - 1) / self.batch_size;

        let mut summary = RunSummary {
            total,
            processed: first_record,
            first_batch,
            ..Default::default()
        };

        for (offset, batch) in remaining.chunks(self.batch_size).enumerate() {
            let batch_index = first_batch + offset;

            transition(&mut self.state, PipelineState::Running(batch_index));
            let lookups: Vec<_> = batch
                .iter()
                .map(|pair| enrich_pair(&self.fetcher, pair))
                .collect();

            transition(&mut self.state, PipelineState::Draining(batch_index));
            let span = info_span!("batch", index = batch_index, size = batch.len());
            let outcomes = join_all(lookups).instrument(span).await;

            let mut records = Vec::with_capacity(outcomes.len());
            for (record, balance_defaulted, staking_defaulted) in outcomes {
                summary.defaulted_balances += balance_defaulted as usize;
                summary.defaulted_staking += staking_defaulted as usize;
                records.push(record);
            }

            self.sink
                .append_batch(&records)
                .map_err(|source| PipelineError::Sink {
                    batch_index,
                    source,
                })?;

            summary.processed += records.len();
            summary.batches += 1;
            metrics::record_batch_committed(summary.processed);
            info!(
                "Processed {} of {} addresses - batch {} written",
                summary.processed, total, batch_index
            );

            if offset + 1 < batch_count {
                transition(&mut self.state, PipelineState::Paused(batch_index));
                debug!("Waiting {:?} before processing next batch...", self.pause);
                tokio::time::sleep(self.pause).await;
            }
        }

        transition(&mut self.state, PipelineState::Done);
        info!(
            "✅ Completed processing {} addresses ({} balances and {} staking lookups defaulted)",
            summary.processed, summary.defaulted_balances, summary.defaulted_staking
        );
        Ok(summary)
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    debug!("Pipeline {:?} -> {:?}", state, next);
    *state = next;
}

/// Balance and staking lookups for one pair, issued together.
/// Returns the record plus whether each value was defaulted.
async fn enrich_pair(fetcher: &RemoteFetcher, pair: &AddressPair) -> (EnrichmentRecord, bool, bool) {
    let address = pair.counterpart_address.as_str();
    let (balance, staking): (Fetched<String>, Fetched<StakingStatus>) = futures::join!(
        fetcher.fetch_balance(address),
        fetcher.fetch_staking_status(address)
    );
    let balance_defaulted = balance.is_defaulted();
    let staking_defaulted = staking.is_defaulted();
    (
        EnrichmentRecord::new(pair, balance.value, staking.value),
        balance_defaulted,
        staking_defaulted,
    )
}

/// Loads `input`, enriches it against the configured endpoints and writes `output`.
///
/// With `resume`, a previous interrupted run into `output` is continued
/// instead of overwritten.
pub async fn enrich_file(
    settings: &Settings,
    input: &Path,
    output: &Path,
    resume: bool,
) -> Result<RunSummary, PipelineError> {
    let pairs = load_address_pairs(input, &settings.columns)?;

    let pool = Arc::new(EndpointPool::new(settings.endpoints.urls.clone())?);
    let client = LcdHttpClient::new(settings.fetch.request_timeout()).map_err(PipelineError::Client)?;
    let fetcher = RemoteFetcher::new(Arc::new(client), pool, &settings.fetch);
    let sink = CsvResultSink::new(output, &settings.columns);

    let mut orchestrator = EnrichmentOrchestrator::new(fetcher, sink, &settings.batch)?;
    if resume {
        orchestrator.resume(&pairs).await
    } else {
        orchestrator.run(&pairs).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("cannot build HTTP client: {0}")]
    Client(#[source] FetchError),
    #[error("cannot open result sink: {0}")]
    SinkOpen(#[source] SinkError),
    #[error("failed to write batch {batch_index}: {source}")]
    Sink {
        batch_index: usize,
        #[source]
        source: SinkError,
    },
    #[error("checkpoint covers {committed} records but the input has only {total}")]
    CheckpointMismatch { committed: usize, total: usize },
}

impl PipelineError {
    /// Batch to resume from, when the run died writing one.
    pub fn failed_batch(&self) -> Option<usize> {
        match self {
            PipelineError::Sink { batch_index, .. } => Some(*batch_index),
            _ => None,
        }
    }
}
