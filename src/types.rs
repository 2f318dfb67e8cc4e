// src/types.rs
// Record types shared by the enrichment pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// A source-chain address and the counterpart-chain address derived from it.
///
/// Identity is the source address; pairs are never mutated after derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressPair {
    pub source_address: String,
    pub counterpart_address: String,
}

impl AddressPair {
    pub fn new(source_address: impl Into<String>, counterpart_address: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            counterpart_address: counterpart_address.into(),
        }
    }
}

/// Whether the counterpart address has at least one active delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakingStatus {
    Yes,
    No,
}

impl StakingStatus {
    pub fn from_delegation_count(count: usize) -> Self {
        if count > 0 {
            StakingStatus::Yes
        } else {
            StakingStatus::No
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StakingStatus::Yes => "Yes",
            StakingStatus::No => "No",
        }
    }

    pub fn is_staking(&self) -> bool {
        matches!(self, StakingStatus::Yes)
    }
}

impl fmt::Display for StakingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One output row: the address pair plus the fetched balance and staking status.
///
/// `balance` is kept as the normalized decimal string that gets persisted, so
/// a record written and read back compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub source_address: String,
    pub counterpart_address: String,
    pub balance: String,
    pub is_staking: StakingStatus,
}

impl EnrichmentRecord {
    pub fn new(pair: &AddressPair, balance: String, is_staking: StakingStatus) -> Self {
        Self {
            source_address: pair.source_address.clone(),
            counterpart_address: pair.counterpart_address.clone(),
            balance,
            is_staking,
        }
    }
}
