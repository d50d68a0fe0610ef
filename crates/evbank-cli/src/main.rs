//! CLI tool for consolidating per-window event archives into a column bank.

mod error;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use snafu::ResultExt;

use evbank_core::bank::{BankReader, DEFAULT_COMPRESSION_LEVEL};
use evbank_core::chunk::ChunkSource;
use evbank_core::consolidate::{ConsolidateError, ConsolidateOptions, Consolidator, Summary};

use crate::error::{CliResult, ConsolidateSnafu, OpenBankSnafu, ReadBankSnafu};

#[derive(Debug, Subcommand)]
enum Command {
    /// Consolidate a directory of Parquet chunk files into one column bank
    Consolidate {
        /// Directory containing the chunk files
        #[arg(long = "input-dir")]
        input_dir: PathBuf,

        /// Destination bank file path
        #[arg(long = "output-file")]
        output_file: PathBuf,

        /// Rewrite the time column into one continuous timeline
        #[arg(long = "normalize-time", default_value_t = false)]
        normalize_time: bool,

        /// zstd level for stored blocks
        #[arg(long = "compression-level", default_value_t = DEFAULT_COMPRESSION_LEVEL)]
        compression_level: i32,
    },

    /// Inspect an existing column bank
    Info {
        /// Bank file to inspect
        #[arg(long)]
        file: PathBuf,

        /// Also print the first N values of every column
        #[arg(long)]
        head: Option<u64>,
    },
}

#[derive(Debug, Parser)]
#[command(name = "evbank", about = "Consolidate per-window event archives into a column bank")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn cmd_consolidate(
    input_dir: &Path,
    output_file: &Path,
    normalize_time: bool,
    compression_level: i32,
) -> CliResult<()> {
    if output_file.exists() {
        println!(
            "Warning: {} already exists and will be overwritten.",
            output_file.display()
        );
    }

    let source = ChunkSource::new(input_dir);
    let consolidator = Consolidator::new(ConsolidateOptions {
        normalize_time,
        compression_level,
    });

    let result = consolidator.run(&source, output_file, |p| {
        if p.index == 1 {
            println!("Found {} chunk files. Consolidating...", p.total);
        }
        println!("[{}/{}] loading {}", p.index, p.total, p.path.display());
    });

    let summary = match result {
        Ok(summary) => summary,
        Err(ConsolidateError::EmptyInput { .. }) => {
            // Clean no-op, not a failure: report and exit successfully.
            println!("No chunk files found in {}.", input_dir.display());
            return Ok(());
        }
        Err(e) => {
            return Err(e).context(ConsolidateSnafu {
                input_dir: input_dir.display().to_string(),
                output: output_file.display().to_string(),
            });
        }
    };

    print_summary(output_file, &summary);
    Ok(())
}

fn print_summary(output_file: &Path, summary: &Summary) {
    println!("Finished consolidation: {} chunks.", summary.chunks);
    println!("Output bank: {}", output_file.display());
    println!("Stored fields: [{}]", summary.field_names().join(", "));
}

fn cmd_info(file: &Path, head: Option<u64>) -> CliResult<()> {
    let mut reader = BankReader::open(file).context(OpenBankSnafu {
        path: file.display().to_string(),
    })?;

    println!("Bank: {}", file.display());
    println!("Created: {}", reader.index().created_at);
    println!("Fields:");
    for field in &reader.index().fields {
        println!("  {}: {} ({} rows)", field.name, field.dtype, field.rows);
    }

    if let Some(head) = head {
        let fields: Vec<(String, u64)> = reader
            .index()
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.rows))
            .collect();
        for (name, rows) in fields {
            let take = head.min(rows);
            let column = reader.read_rows(&name, 0, take).context(ReadBankSnafu {
                path: file.display().to_string(),
                field: name.clone(),
            })?;
            println!("  {} head: [{}]", name, column.values_to_strings().join(", "));
        }
    }
    Ok(())
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Consolidate {
            input_dir,
            output_file,
            normalize_time,
            compression_level,
        } => cmd_consolidate(&input_dir, &output_file, normalize_time, compression_level),

        Command::Info { file, head } => cmd_info(&file, head),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
