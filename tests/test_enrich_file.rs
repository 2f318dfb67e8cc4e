//! Integration tests for file-to-file enrichment
//!
//! Runs `enrich_file` against a local LCD stand-in and checks the CSV written
//! to disk, including reruns and resuming after an interrupted batch.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use xchain_overlap::address_source::load_enrichment_records;
use xchain_overlap::batch_orchestrator::{enrich_file, PipelineError};
use xchain_overlap::result_sink::{CsvResultSink, ResultSink};
use xchain_overlap::settings::Settings;

/// Every address holds 3 ATOM; addresses ending in an even digit stake.
async fn spawn_lcd() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                loop {
                    let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    read += n;
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&buf[..read]).into_owned();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let body = if path.contains("/balances/") {
                    r#"{"balances":[{"denom":"uatom","amount":"3000000"}]}"#.to_string()
                } else {
                    let even = path
                        .chars()
                        .last()
                        .and_then(|c| c.to_digit(10))
                        .map_or(false, |d| d % 2 == 0);
                    let delegations = if even { r#"[{"delegation":{}}]"# } else { "[]" };
                    format!(r#"{{"delegation_responses":{}}}"#, delegations)
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

fn write_input(path: &Path, count: usize) {
    let mut contents = String::from("StargazeAddress,CosmosAddress\n");
    for i in 0..count {
        contents.push_str(&format!("stars1addr{},cosmos1addr{}\n", i, i));
    }
    fs::write(path, contents).unwrap();
}

async fn settings(batch_size: usize) -> Settings {
    let mut settings = Settings::default();
    settings.endpoints.urls = vec![spawn_lcd().await];
    settings.batch.size = batch_size;
    settings.batch.pause_ms = 10;
    settings.fetch.request_timeout_ms = 2_000;
    settings
}

#[tokio::test]
async fn test_enrich_file_writes_every_pair_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("output.csv");
    let output = dir.path().join("hub.csv");
    write_input(&input, 5);

    let summary = enrich_file(&settings(2).await, &input, &output, false).await.unwrap();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.processed, 5);
    assert_eq!(summary.batches, 3);

    let written = fs::read_to_string(&output).unwrap();
    let expected = "StargazeAddress,CosmosAddress,Balance,IsStaking\n\
                    stars1addr0,cosmos1addr0,3,Yes\n\
                    stars1addr1,cosmos1addr1,3,No\n\
                    stars1addr2,cosmos1addr2,3,Yes\n\
                    stars1addr3,cosmos1addr3,3,No\n\
                    stars1addr4,cosmos1addr4,3,Yes\n";
    assert_eq!(written, expected);
}

#[tokio::test]
async fn test_rerun_overwrites_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("output.csv");
    let output = dir.path().join("hub.csv");
    write_input(&input, 3);
    let settings = settings(9).await;

    enrich_file(&settings, &input, &output, false).await.unwrap();
    let first = fs::read_to_string(&output).unwrap();
    enrich_file(&settings, &input, &output, false).await.unwrap();

    assert_eq!(fs::read_to_string(&output).unwrap(), first);
    assert_eq!(load_enrichment_records(&output).unwrap().len(), 3);
}

#[tokio::test]
async fn test_resume_after_torn_batch_matches_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("output.csv");
    let full = dir.path().join("full.csv");
    let partial = dir.path().join("partial.csv");
    write_input(&input, 7);
    let settings = settings(3).await;

    enrich_file(&settings, &input, &full, false).await.unwrap();
    let records = load_enrichment_records(&full).unwrap();

    // an interrupted run: one committed batch, then a half-written one
    let mut sink = CsvResultSink::new(&partial, &settings.columns);
    sink.reset().unwrap();
    sink.append_batch(&records[..3]).unwrap();
    let mut file = OpenOptions::new().append(true).open(&partial).unwrap();
    file.write_all(b"stars1addr3,cosmos1ad").unwrap();
    drop(file);

    // a different batch size is fine, committed records are skipped
    let mut resumed_settings = settings.clone();
    resumed_settings.batch.size = 2;
    let summary = enrich_file(&resumed_settings, &input, &partial, true).await.unwrap();

    assert_eq!(summary.first_batch, 1);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.processed, 7);
    assert_eq!(
        fs::read_to_string(&partial).unwrap(),
        fs::read_to_string(&full).unwrap()
    );
}

#[tokio::test]
async fn test_resume_without_checkpoint_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("output.csv");
    let output = dir.path().join("hub.csv");
    write_input(&input, 4);

    let summary = enrich_file(&settings(9).await, &input, &output, true).await.unwrap();
    assert_eq!(summary.first_batch, 0);
    assert_eq!(load_enrichment_records(&output).unwrap().len(), 4);
}

#[tokio::test]
async fn test_missing_input_fails_before_any_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("hub.csv");

    let err = enrich_file(&settings(9).await, &dir.path().join("missing.csv"), &output, false)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Input(_)));
    assert!(!output.exists());
}
