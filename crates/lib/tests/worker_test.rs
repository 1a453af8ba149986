//! # External Worker Tests
//!
//! Runs real child processes through `/bin/sh` to check the JSON-over-stdio
//! contract, the timeout kill and cancellation.
#![cfg(unix)]

mod common;

use anyhow::Result;
use common::setup_tracing;
use leadsync::providers::worker::run_json_worker;
use leadsync::{
    AttributeExtractor, LeadContext, Transcriber, WorkerError, WorkerExtractor, WorkerSpec,
    WorkerTranscriber,
};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn shell(script: &str, timeout: Duration) -> WorkerSpec {
    // `sh -c SCRIPT NAME ARGS...` exposes the appended arguments as $1, $2...
    WorkerSpec::new(
        "/bin/sh",
        vec!["-c".to_string(), script.to_string(), "worker".to_string()],
        timeout,
    )
}

#[tokio::test]
async fn test_transcriber_reads_final_json_line() -> Result<()> {
    setup_tracing();
    // --- Arrange ---
    let mut audio = tempfile::NamedTempFile::new()?;
    audio.write_all(b"RIFF")?;
    let spec = shell(
        r#"echo "loading model for $1"; echo '{"success": true, "transcript": "  hello there  "}'"#,
        Duration::from_secs(10),
    );
    let transcriber = WorkerTranscriber::new(spec);

    // --- Act ---
    let transcript = transcriber
        .transcribe(audio.path(), &CancellationToken::new())
        .await?;

    // --- Assert ---
    assert_eq!(transcript, "hello there");
    Ok(())
}

#[tokio::test]
async fn test_transcriber_reports_worker_failure() -> Result<()> {
    setup_tracing();
    let spec = shell(
        r#"echo '{"success": false, "error": "unsupported codec"}'"#,
        Duration::from_secs(10),
    );
    let result = WorkerTranscriber::new(spec)
        .transcribe(Path::new("/tmp/missing.mp3"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(WorkerError::Rejected(reason)) if reason == "unsupported codec"));
    Ok(())
}

#[tokio::test]
async fn test_non_zero_exit_carries_stderr() -> Result<()> {
    setup_tracing();
    // --- Arrange ---
    let spec = shell("echo 'model not found' >&2; exit 3", Duration::from_secs(10));

    // --- Act ---
    let result = run_json_worker(&spec, &[], None, &CancellationToken::new()).await;

    // --- Assert ---
    match result {
        Err(WorkerError::ExitStatus { code, stderr }) => {
            assert_eq!(code, Some(3));
            assert_eq!(stderr, "model not found");
        }
        other => panic!("expected an exit status error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_garbage_output_is_malformed() -> Result<()> {
    setup_tracing();
    let spec = shell("echo 'this is not json'", Duration::from_secs(10));
    let result = run_json_worker(&spec, &[], None, &CancellationToken::new()).await;
    assert!(matches!(result, Err(WorkerError::MalformedOutput(_))));
    Ok(())
}

#[tokio::test]
async fn test_missing_program_fails_to_spawn() -> Result<()> {
    setup_tracing();
    let spec = WorkerSpec::new("/nonexistent/transcriber", vec![], Duration::from_secs(1));
    let result = run_json_worker(&spec, &[], None, &CancellationToken::new()).await;
    assert!(matches!(result, Err(WorkerError::Spawn { .. })));
    Ok(())
}

#[tokio::test]
async fn test_hung_worker_is_killed_at_its_deadline() -> Result<()> {
    setup_tracing();
    // --- Arrange ---
    let spec = shell("sleep 30", Duration::from_millis(300));
    let started = Instant::now();

    // --- Act ---
    let result = run_json_worker(&spec, &[], None, &CancellationToken::new()).await;

    // --- Assert ---
    assert!(matches!(result, Err(WorkerError::Timeout { .. })));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "timeout took {:?}",
        started.elapsed()
    );
    Ok(())
}

#[tokio::test]
async fn test_cancellation_stops_a_running_worker() -> Result<()> {
    setup_tracing();
    // --- Arrange ---
    let spec = shell("sleep 30", Duration::from_secs(60));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });
    let started = Instant::now();

    // --- Act ---
    let result = run_json_worker(&spec, &[], None, &cancel).await;

    // --- Assert ---
    assert!(matches!(result, Err(WorkerError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn test_extractor_sends_transcript_and_lead_on_stdin() -> Result<()> {
    setup_tracing();
    // --- Arrange ---
    // The worker echoes its request back inside the `data` envelope.
    let spec = shell(
        r#"req=$(cat); printf '{"success": true, "data": {"echo": %s, "fleet_size": 7, "mc_number": null}}\n' "$req""#,
        Duration::from_secs(10),
    );
    let extractor = WorkerExtractor::new(spec);
    let lead = LeadContext {
        lead_id: "501".to_string(),
        phone: "5551230001".to_string(),
        full_name: "Dana Reyes".to_string(),
        city: "Tulsa".to_string(),
        vendor_code: "V-9".to_string(),
    };

    // --- Act ---
    let attributes = extractor
        .extract("we run 7 trucks", &lead, &CancellationToken::new())
        .await?;

    // --- Assert ---
    assert_eq!(attributes.get("fleet_size"), Some(&json!(7)));
    assert!(!attributes.contains_key("mc_number"));
    assert_eq!(
        attributes.get("echo"),
        Some(&json!({
            "transcript": "we run 7 trucks",
            "lead_info": {
                "lead_id": "501",
                "phone": "5551230001",
                "full_name": "Dana Reyes",
                "city": "Tulsa",
                "vendor_code": "V-9"
            }
        }))
    );
    Ok(())
}
