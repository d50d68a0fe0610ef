//! Integration tests for the CLI binary.

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

use evbank_core::bank::BankReader;
use evbank_core::column::ColumnData;

mod common;

use common::write_chunk;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("evbank"))
}

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn cli_consolidates_in_natural_order_and_prints_summary() -> TestResult {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("chunks");
    let output = tmp.path().join("events.evb");

    write_chunk(&input.join("chunk_1.parquet"), &[0, 1], &[10, 20])?;
    write_chunk(&input.join("chunk_2.parquet"), &[0, 1], &[30, 40])?;
    write_chunk(&input.join("chunk_10.parquet"), &[0], &[50])?;

    cli()
        .args([
            "consolidate",
            "--input-dir",
            input.to_string_lossy().as_ref(),
            "--output-file",
            output.to_string_lossy().as_ref(),
        ])
        .assert()
        .success()
        .stdout(contains("Found 3 chunk files"))
        .stdout(contains("[1/3] loading"))
        .stdout(contains("chunk_1.parquet"))
        .stdout(contains("Finished consolidation: 3 chunks."))
        .stdout(contains("Stored fields: [t, x]"));

    let mut reader = BankReader::open(&output)?;
    assert_eq!(
        reader.read_column("x")?,
        ColumnData::I32(vec![10, 20, 30, 40, 50])
    );
    // chunk_10 sorted after chunk_2, so its time values land last.
    assert_eq!(reader.read_column("t")?, ColumnData::I64(vec![0, 1, 0, 1, 0]));
    Ok(())
}

#[test]
fn cli_normalize_time_stitches_the_timeline() -> TestResult {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("chunks");
    let output = tmp.path().join("events.evb");

    write_chunk(&input.join("w_1.parquet"), &[0, 1, 2], &[1, 2, 3])?;
    write_chunk(&input.join("w_2.parquet"), &[0, 1, 2], &[4, 5, 6])?;

    cli()
        .args([
            "consolidate",
            "--input-dir",
            input.to_string_lossy().as_ref(),
            "--output-file",
            output.to_string_lossy().as_ref(),
            "--normalize-time",
        ])
        .assert()
        .success();

    let mut reader = BankReader::open(&output)?;
    assert_eq!(
        reader.read_column("t")?,
        ColumnData::I64(vec![0, 1, 2, 3, 4, 5])
    );
    Ok(())
}

#[test]
fn cli_warns_before_overwriting_existing_output() -> TestResult {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("chunks");
    let output = tmp.path().join("events.evb");

    write_chunk(&input.join("chunk_1.parquet"), &[0], &[1])?;
    std::fs::write(&output, b"previous run")?;

    cli()
        .args([
            "consolidate",
            "--input-dir",
            input.to_string_lossy().as_ref(),
            "--output-file",
            output.to_string_lossy().as_ref(),
        ])
        .assert()
        .success()
        .stdout(contains("already exists and will be overwritten"));

    // The bank replaced the stale file entirely.
    let mut reader = BankReader::open(&output)?;
    assert_eq!(reader.read_column("x")?, ColumnData::I32(vec![1]));
    Ok(())
}

#[test]
fn cli_empty_input_reports_cleanly_and_writes_nothing() -> TestResult {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("chunks");
    std::fs::create_dir_all(&input)?;
    let output = tmp.path().join("events.evb");

    cli()
        .args([
            "consolidate",
            "--input-dir",
            input.to_string_lossy().as_ref(),
            "--output-file",
            output.to_string_lossy().as_ref(),
        ])
        .assert()
        .success()
        .stdout(contains("No chunk files found"));

    assert!(!output.exists());
    Ok(())
}

#[test]
fn cli_corrupt_chunk_fails_the_run() -> TestResult {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("chunks");
    let output = tmp.path().join("events.evb");

    write_chunk(&input.join("chunk_1.parquet"), &[0], &[1])?;
    std::fs::write(input.join("chunk_2.parquet"), b"PAR1PAR1garbage")?;

    cli()
        .args([
            "consolidate",
            "--input-dir",
            input.to_string_lossy().as_ref(),
            "--output-file",
            output.to_string_lossy().as_ref(),
        ])
        .assert()
        .failure()
        .stderr(contains("Consolidation"));
    Ok(())
}

#[test]
fn cli_info_lists_fields_and_head_values() -> TestResult {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("chunks");
    let output = tmp.path().join("events.evb");

    write_chunk(&input.join("w_1.parquet"), &[0, 1, 2], &[7, 8, 9])?;
    write_chunk(&input.join("w_2.parquet"), &[0, 1], &[10, 11])?;

    cli()
        .args([
            "consolidate",
            "--input-dir",
            input.to_string_lossy().as_ref(),
            "--output-file",
            output.to_string_lossy().as_ref(),
            "--normalize-time",
        ])
        .assert()
        .success();

    cli()
        .args(["info", "--file", output.to_string_lossy().as_ref()])
        .assert()
        .success()
        .stdout(contains("t: i64 (5 rows)"))
        .stdout(contains("x: i32 (5 rows)"));

    cli()
        .args([
            "info",
            "--file",
            output.to_string_lossy().as_ref(),
            "--head",
            "4",
        ])
        .assert()
        .success()
        .stdout(contains("t head: [0, 1, 2, 3]"))
        .stdout(contains("x head: [7, 8, 9, 10]"));
    Ok(())
}

#[test]
fn cli_info_on_missing_file_fails() -> TestResult {
    let tmp = TempDir::new()?;
    let missing = tmp.path().join("nope.evb");

    cli()
        .args(["info", "--file", missing.to_string_lossy().as_ref()])
        .assert()
        .failure()
        .stderr(contains("Failed to open bank"));
    Ok(())
}
