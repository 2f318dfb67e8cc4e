//! # Result Sink
//!
//! Durable, append-only storage for enrichment records.
//!
//! ## Overview
//!
//! A sink is reset once at the start of a run and then receives one
//! `append_batch` call per drained batch. Appends are atomic at batch
//! granularity: after a crash the sink holds every batch that was committed
//! and nothing of the batch that was being written.
//!
//! `CsvResultSink` keeps that guarantee with a small JSON checkpoint stored
//! next to the CSV file. The checkpoint records the byte length of the file at
//! the last committed batch boundary; a torn write past that boundary is cut
//! off before the next append or when a run is resumed.

use crate::settings::Columns;
use crate::types::EnrichmentRecord;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Last batch boundary durably written to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkCheckpoint {
    pub batches_committed: usize,
    pub records_committed: usize,
    pub committed_bytes: u64,
    pub updated_at: DateTime<Utc>,
}

impl SinkCheckpoint {
    fn empty(committed_bytes: u64) -> Self {
        Self {
            batches_committed: 0,
            records_committed: 0,
            committed_bytes,
            updated_at: Utc::now(),
        }
    }
}

/// Append-capable record store with a single writer.
pub trait ResultSink {
    /// Discards any previously persisted output.
    fn reset(&mut self) -> Result<(), SinkError>;

    /// Durably appends `records` after every earlier batch, all or nothing.
    fn append_batch(&mut self, records: &[EnrichmentRecord]) -> Result<(), SinkError>;

    /// Restores the sink to its last committed batch boundary and reports it.
    /// `None` means there is nothing to resume from.
    fn resume_point(&mut self) -> Result<Option<SinkCheckpoint>, SinkError>;
}

/// CSV file sink: `<source>,<counterpart>,Balance,IsStaking`.
#[derive(Debug)]
pub struct CsvResultSink {
    path: PathBuf,
    checkpoint_path: PathBuf,
    headers: [String; 4],
    state: Option<SinkCheckpoint>,
}

impl CsvResultSink {
    pub fn new(path: impl Into<PathBuf>, columns: &Columns) -> Self {
        let path = path.into();
        let checkpoint_path = checkpoint_path_for(&path);
        Self {
            path,
            checkpoint_path,
            headers: [
                columns.source.clone(),
                columns.counterpart.clone(),
                "Balance".to_string(),
                "IsStaking".to_string(),
            ],
            state: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn encode(&self, records: &[EnrichmentRecord], with_header: bool) -> Result<Vec<u8>, SinkError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if with_header {
            writer.write_record(&self.headers)?;
        }
        for record in records {
            writer.write_record([
                record.source_address.as_str(),
                record.counterpart_address.as_str(),
                record.balance.as_str(),
                record.is_staking.as_str(),
            ])?;
        }
        writer
            .into_inner()
            .map_err(|e| self.io_error(e.into_error()))
    }

    fn write_checkpoint(&self, checkpoint: &SinkCheckpoint) -> Result<(), SinkError> {
        let bytes = serde_json::to_vec_pretty(checkpoint).map_err(|e| SinkError::Checkpoint {
            path: self.checkpoint_path.clone(),
            reason: e.to_string(),
        })?;

        // Write-then-rename so a reader never observes a half-written checkpoint
        let tmp_path = self.checkpoint_path.with_extension("json.tmp");
        let checkpoint_io = |source: std::io::Error| SinkError::Io {
            path: self.checkpoint_path.clone(),
            source,
        };
        let mut tmp = File::create(&tmp_path).map_err(checkpoint_io)?;
        tmp.write_all(&bytes).map_err(checkpoint_io)?;
        tmp.sync_all().map_err(checkpoint_io)?;
        fs::rename(&tmp_path, &self.checkpoint_path).map_err(checkpoint_io)?;
        Ok(())
    }

    fn read_checkpoint(&self) -> Result<Option<SinkCheckpoint>, SinkError> {
        let bytes = match fs::read(&self.checkpoint_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SinkError::Io {
                    path: self.checkpoint_path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SinkError::Checkpoint {
                path: self.checkpoint_path.clone(),
                reason: e.to_string(),
            })
    }

    /// Opens the data file for appending, cutting it back to the committed length.
    fn open_at_boundary(&self, committed_bytes: u64) -> Result<File, SinkError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let actual = file.metadata().map_err(|e| self.io_error(e))?.len();

        if actual < committed_bytes {
            return Err(SinkError::Truncated {
                path: self.path.clone(),
                expected: committed_bytes,
                actual,
            });
        }
        if actual > committed_bytes {
            warn!(
                "🗑️ [Sink] Discarding {} bytes of a partially written batch in {}",
                actual - committed_bytes,
                self.path.display()
            );
            file.set_len(committed_bytes).map_err(|e| self.io_error(e))?;
        }
        Ok(file)
    }
}

impl ResultSink for CsvResultSink {
    fn reset(&mut self) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let header = self.encode(&[], true)?;
        let mut file = File::create(&self.path).map_err(|e| self.io_error(e))?;
        file.write_all(&header).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;

        let checkpoint = SinkCheckpoint::empty(header.len() as u64);
        self.write_checkpoint(&checkpoint)?;
        self.state = Some(checkpoint);

        info!("[Sink] Reset {}", self.path.display());
        Ok(())
    }

    fn append_batch(&mut self, records: &[EnrichmentRecord]) -> Result<(), SinkError> {
        let state = match &self.state {
            Some(state) => state.clone(),
            None => return Err(SinkError::NotInitialized(self.path.clone())),
        };

        let payload = self.encode(records, false)?;
        let mut file = self.open_at_boundary(state.committed_bytes)?;
        file.write_all(&payload).map_err(|e| self.io_error(e))?;
        file.sync_data().map_err(|e| self.io_error(e))?;

        let checkpoint = SinkCheckpoint {
            batches_committed: state.batches_committed + 1,
            records_committed: state.records_committed + records.len(),
            committed_bytes: state.committed_bytes + payload.len() as u64,
            updated_at: Utc::now(),
        };
        self.write_checkpoint(&checkpoint)?;
        self.state = Some(checkpoint);
        Ok(())
    }

    fn resume_point(&mut self) -> Result<Option<SinkCheckpoint>, SinkError> {
        let checkpoint = match self.read_checkpoint()? {
            Some(checkpoint) => checkpoint,
            None => return Ok(None),
        };
        if !self.path.exists() {
            warn!(
                "[Sink] Checkpoint {} has no output file, nothing to resume",
                self.checkpoint_path.display()
            );
            return Ok(None);
        }

        // Validates the length and drops any torn tail
        self.open_at_boundary(checkpoint.committed_bytes)?;

        info!(
            "[Sink] Resuming {} after {} batches ({} records)",
            self.path.display(),
            checkpoint.batches_committed,
            checkpoint.records_committed
        );
        self.state = Some(checkpoint.clone());
        Ok(Some(checkpoint))
    }
}

fn checkpoint_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".checkpoint.json");
    path.with_file_name(name)
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("checkpoint {path} is unusable: {reason}")]
    Checkpoint { path: PathBuf, reason: String },
    #[error("{path} is shorter ({actual} bytes) than its checkpoint ({expected} bytes)")]
    Truncated {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("sink {0} was appended to before reset or resume")]
    NotInitialized(PathBuf),
}
