// src/address_conversion.rs
// Bech32 prefix re-encoding between chains that share key derivation

use crate::types::AddressPair;
use log::{info, warn};

/// Re-encodes a bech32 address under another human-readable prefix, e.g.
/// `stars1…` to `cosmos1…`. The payload and checksum variant are preserved.
pub fn convert_prefix(address: &str, from_prefix: &str, to_prefix: &str) -> Result<String, ConversionError> {
    let (hrp, data, variant) = bech32::decode(address.trim())?;
    if hrp != from_prefix {
        return Err(ConversionError::UnexpectedPrefix {
            expected: from_prefix.to_string(),
            found: hrp,
        });
    }
    Ok(bech32::encode(to_prefix, data, variant)?)
}

/// Converts every address, skipping (and logging) the ones that fail.
pub fn derive_pairs(addresses: &[String], from_prefix: &str, to_prefix: &str) -> Vec<AddressPair> {
    let mut pairs = Vec::with_capacity(addresses.len());
    for address in addresses {
        match convert_prefix(address, from_prefix, to_prefix) {
            Ok(counterpart) => pairs.push(AddressPair::new(address.trim(), counterpart)),
            Err(e) => warn!("Error converting address {}: {}", address, e),
        }
    }
    info!(
        "Converted {} of {} addresses from '{}' to '{}'",
        pairs.len(),
        addresses.len(),
        from_prefix,
        to_prefix
    );
    pairs
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("invalid bech32: {0}")]
    Bech32(#[from] bech32::Error),
    #[error("invalid prefix: expected {expected} but got {found}")]
    UnexpectedPrefix { expected: String, found: String },
}
