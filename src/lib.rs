//! # xchain-overlap
//!
//! Measures how much of one Cosmos chain's account population is also present
//! on another chain. Source-chain addresses are re-encoded under the
//! counterpart chain's bech32 prefix, then each counterpart address is
//! enriched with its balance and staking status through a pool of public LCD
//! endpoints.
//!
//! ## Overview
//!
//! - **Conversion**: `stars1…` addresses become `cosmos1…` addresses
//! - **Enrichment**: paced, batched balance and delegation lookups that never
//!   abort on a remote failure
//! - **Persistence**: per-batch CSV appends that an interrupted run can resume
//! - **Reporting**: dust-filtered overlap statistics over the enriched file
//!
//! ## Architecture
//!
//! ### Fetch Layer
//! [`EndpointPool`] hands out endpoints round-robin; [`RemoteFetcher`] turns
//! every lookup outcome (timeout, redirect, bad body) into a defined value.
//!
//! ### Pipeline Layer
//! [`EnrichmentOrchestrator`] cuts the input into batches, runs each batch
//! concurrently, appends it to a [`ResultSink`] and pauses before the next.

// Core Types
/// Address pairs and enrichment records
pub mod types;

// Input & Conversion
/// CSV readers and writers for address lists
pub mod address_source;
/// Bech32 prefix conversion
pub mod address_conversion;

// Fetch Layer
/// Round-robin LCD endpoint pool
pub mod endpoint_pool;
/// LCD REST client and response types
pub mod lcd_client;
/// Lookups that always resolve to a value
pub mod remote_fetcher;

// Pipeline
/// Batch orchestration
pub mod batch_orchestrator;
/// Durable per-batch output
pub mod result_sink;

// Reporting
/// Dust-filtered overlap statistics
pub mod overlap_stats;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use batch_orchestrator::{enrich_file, EnrichmentOrchestrator, PipelineError, RunSummary};
pub use endpoint_pool::EndpointPool;
pub use lcd_client::{AccountDataSource, LcdHttpClient};
pub use overlap_stats::OverlapReport;
pub use remote_fetcher::RemoteFetcher;
pub use result_sink::{CsvResultSink, ResultSink};
pub use settings::Settings;
pub use types::{AddressPair, EnrichmentRecord, StakingStatus};
