//! Generate a few synthetic event chunks, consolidate them into a bank, and
//! read the stitched timeline back using the core API.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int32Array, Int64Array, UInt16Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;

use evbank_core::bank::BankReader;
use evbank_core::chunk::ChunkSource;
use evbank_core::consolidate::{ConsolidateOptions, Consolidator};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Resolve paths relative to the workspace root.
    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");
    let demo_root = workspace_root.join("target/consolidate_demo");
    let chunk_dir = demo_root.join("chunks");
    let bank_path = demo_root.join("events.evb");

    // Start clean so the example is repeatable.
    if demo_root.exists() {
        std::fs::remove_dir_all(&demo_root)?;
    }
    std::fs::create_dir_all(&chunk_dir)?;

    // 1) Write three chunks whose local clocks all restart at zero.
    let schema = Arc::new(Schema::new(vec![
        Field::new("t", DataType::Int64, false),
        Field::new("x", DataType::UInt16, false),
        Field::new("y", DataType::UInt16, false),
        Field::new("p", DataType::Int32, false),
    ]));
    for i in 1..=3u16 {
        let arrays: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(vec![0, 1, 2])),
            Arc::new(UInt16Array::from(vec![i, i + 1, i + 2])),
            Arc::new(UInt16Array::from(vec![10 * i, 10 * i, 10 * i])),
            Arc::new(Int32Array::from(vec![1, -1, 1])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), arrays)?;
        let file = File::create(chunk_dir.join(format!("window_{i}.parquet")))?;
        let mut writer = ArrowWriter::try_new(file, schema.clone(), None)?;
        writer.write(&batch)?;
        writer.close()?;
    }

    // 2) Consolidate with time normalization.
    let options = ConsolidateOptions {
        normalize_time: true,
        ..ConsolidateOptions::default()
    };
    let summary = Consolidator::new(options).run(
        &ChunkSource::new(&chunk_dir),
        &bank_path,
        |p| println!("[{}/{}] loading {}", p.index, p.total, p.path.display()),
    )?;
    println!(
        "Consolidated {} chunks; fields: {:?}",
        summary.chunks,
        summary.field_names()
    );

    // 3) Read the stitched timeline back.
    let mut reader = BankReader::open(&bank_path)?;
    println!("t = {:?}", reader.read_column("t")?);
    println!("x[2..5] = {:?}", reader.read_rows("x", 2, 3)?);
    Ok(())
}
