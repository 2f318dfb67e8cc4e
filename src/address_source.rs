// src/address_source.rs
// CSV input and output for address lists

use crate::settings::Columns;
use crate::types::{AddressPair, EnrichmentRecord, StakingStatus};
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Reads every Address Pair from a CSV file with a header row.
///
/// The whole file is loaded before any processing begins; a missing file, a
/// missing column or a malformed row is fatal.
pub fn load_address_pairs(path: &Path, columns: &Columns) -> Result<Vec<AddressPair>, InputError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();

    let source_idx = column_index(&headers, &columns.source, path)?;
    let counterpart_idx = column_index(&headers, &columns.counterpart, path)?;

    let mut pairs = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| csv_error(path, e))?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let source = field(&row, source_idx, line, path)?;
        let counterpart = field(&row, counterpart_idx, line, path)?;
        pairs.push(AddressPair::new(source, counterpart));
    }

    info!("Loaded {} address pairs from {}", pairs.len(), path.display());
    Ok(pairs)
}

/// Reads the first column of every data row, e.g. a wallet export whose
/// first column holds source-chain addresses.
pub fn load_first_column(path: &Path) -> Result<Vec<String>, InputError> {
    let mut reader = open_reader(path)?;
    let mut values = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| csv_error(path, e))?;
        if let Some(value) = row.get(0).map(str::trim).filter(|v| !v.is_empty()) {
            values.push(value.to_string());
        }
    }
    Ok(values)
}

/// Reads an enriched CSV back by position:
/// source, counterpart, balance, staking (`Yes` means staking).
pub fn load_enrichment_records(path: &Path) -> Result<Vec<EnrichmentRecord>, InputError> {
    let mut reader = open_reader(path)?;
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| csv_error(path, e))?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let pair = AddressPair::new(field(&row, 0, line, path)?, field(&row, 1, line, path)?);
        let balance = row.get(2).unwrap_or("0").to_string();
        let is_staking = match row.get(3) {
            Some("Yes") => StakingStatus::Yes,
            _ => StakingStatus::No,
        };
        records.push(EnrichmentRecord::new(&pair, balance, is_staking));
    }
    Ok(records)
}

/// Writes Address Pairs with the configured header names.
pub fn write_address_pairs(
    path: &Path,
    pairs: &[AddressPair],
    columns: &Columns,
) -> Result<(), InputError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record([columns.source.as_str(), columns.counterpart.as_str()])
        .map_err(|e| csv_error(path, e))?;
    for pair in pairs {
        writer
            .write_record([pair.source_address.as_str(), pair.counterpart_address.as_str()])
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>, InputError> {
    let file = File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize, InputError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| InputError::MissingColumn {
            path: path.to_path_buf(),
            column: name.to_string(),
        })
}

fn field(row: &csv::StringRecord, idx: usize, line: u64, path: &Path) -> Result<String, InputError> {
    match row.get(idx) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(InputError::EmptyField {
            path: path.to_path_buf(),
            line,
        }),
    }
}

fn csv_error(path: &Path, source: csv::Error) -> InputError {
    InputError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },
    #[error("{path} line {line}: empty address field")]
    EmptyField { path: PathBuf, line: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_pairs_by_header_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        fs::write(
            &path,
            "CosmosAddress,StargazeAddress\ncosmos1a,stars1a\ncosmos1b , stars1b\n",
        )
        .unwrap();

        let pairs = load_address_pairs(&path, &Columns::default()).unwrap();
        assert_eq!(
            pairs,
            vec![
                AddressPair::new("stars1a", "cosmos1a"),
                AddressPair::new("stars1b", "cosmos1b"),
            ]
        );
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = load_address_pairs(Path::new("/nonexistent/output.csv"), &Columns::default())
            .unwrap_err();
        assert!(matches!(err, InputError::Io { .. }));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        fs::write(&path, "StargazeAddress\nstars1a\n").unwrap();

        let err = load_address_pairs(&path, &Columns::default()).unwrap_err();
        assert!(matches!(err, InputError::MissingColumn { ref column, .. } if column == "CosmosAddress"));
    }

    #[test]
    fn test_empty_field_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.csv");
        fs::write(&path, "StargazeAddress,CosmosAddress\nstars1a,\n").unwrap();

        let err = load_address_pairs(&path, &Columns::default()).unwrap_err();
        assert!(matches!(err, InputError::EmptyField { line: 2, .. }));
    }

    #[test]
    fn test_write_then_load_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.csv");
        let pairs = vec![AddressPair::new("stars1a", "cosmos1a")];
        write_address_pairs(&path, &pairs, &Columns::default()).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "StargazeAddress,CosmosAddress\nstars1a,cosmos1a\n"
        );
        assert_eq!(load_address_pairs(&path, &Columns::default()).unwrap(), pairs);
    }

    #[test]
    fn test_load_enrichment_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.csv");
        fs::write(
            &path,
            "StargazeAddress,CosmosAddress,Balance,IsStaking\nstars1a,cosmos1a,5,No\nstars1b,cosmos1b,0,Yes\n",
        )
        .unwrap();

        let records = load_enrichment_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].balance, "5");
        assert_eq!(records[0].is_staking, StakingStatus::No);
        assert_eq!(records[1].source_address, "stars1b");
        assert_eq!(records[1].is_staking, StakingStatus::Yes);
    }

    #[test]
    fn test_load_first_column_skips_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallets.csv");
        fs::write(&path, "address,tokens\nstars1a,3\n,1\nstars1b,7\n").unwrap();

        assert_eq!(load_first_column(&path).unwrap(), vec!["stars1a", "stars1b"]);
    }
}
