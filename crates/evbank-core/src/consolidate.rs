//! The streaming consolidation engine.
//!
//! Drives the per-chunk loop: chunks are processed strictly in the
//! [`ChunkSource`](crate::chunk::ChunkSource)'s natural order, each one
//! loaded, optionally time-rebased, and appended to the bank before the
//! next is touched. Per-field output columns are established lazily on
//! first encounter, so the schema is discovered at runtime rather than
//! declared up front.
//!
//! Each chunk's append depends on the cumulative state left by the
//! previous one (the running time offset and per-field row counts), so the
//! loop is intentionally single-threaded and sequential.

use std::path::{Path, PathBuf};

use log::warn;
use snafu::prelude::*;

use crate::bank::{BankError, BankIndex, BankWriter, DEFAULT_COMPRESSION_LEVEL};
use crate::chunk::{Chunk, ChunkError, ChunkSource};
use crate::column::{ColumnError, DType, Watermark};

/// Result alias for consolidation runs.
pub type ConsolidateResult<T> = Result<T, ConsolidateError>;

/// Errors raised by a consolidation run.
#[derive(Debug, Snafu)]
pub enum ConsolidateError {
    /// The input directory holds no chunk files.
    ///
    /// Reported instead of producing a valid-looking empty bank; callers
    /// treat this as a clean no-op rather than a failure.
    #[snafu(display("No chunk files found in {dir}"))]
    EmptyInput {
        /// The directory that was scanned.
        dir: String,
    },

    /// Enumerating or loading a chunk failed; fatal for the whole run.
    #[snafu(display("{source}"))]
    Source {
        /// The underlying chunk error.
        source: ChunkError,
    },

    /// Writing to the bank failed (including schema drift); fatal.
    #[snafu(display("{source}"))]
    Bank {
        /// The underlying bank error.
        source: BankError,
    },

    /// The designated time field could not be rebased.
    #[snafu(display("Cannot normalize time field '{}' in chunk {}: {}", field, path.display(), source))]
    TimeRebase {
        /// The offending field.
        field: String,
        /// Chunk in which the rebase failed.
        path: PathBuf,
        /// The underlying column error.
        source: ColumnError,
    },
}

/// Options for one consolidation run.
#[derive(Debug, Clone)]
pub struct ConsolidateOptions {
    /// Rewrite the time column into one continuous timeline across chunk
    /// boundaries.
    pub normalize_time: bool,
    /// zstd level for stored blocks.
    pub compression_level: i32,
}

impl Default for ConsolidateOptions {
    fn default() -> Self {
        ConsolidateOptions {
            normalize_time: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// Progress of one chunk, reported just before it is loaded.
#[derive(Debug, Clone, Copy)]
pub struct ChunkProgress<'a> {
    /// 1-based index of the chunk being processed.
    pub index: usize,
    /// Total number of chunks in this run.
    pub total: usize,
    /// Path of the chunk file.
    pub path: &'a Path,
}

/// Per-field outcome of a run.
#[derive(Debug, Clone)]
pub struct FieldSummary {
    /// Field name.
    pub name: String,
    /// Element type pinned by the field's first appearance.
    pub dtype: DType,
    /// Final row count.
    pub rows: u64,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct Summary {
    /// Number of chunks processed.
    pub chunks: usize,
    /// Observed fields in first-seen order.
    pub fields: Vec<FieldSummary>,
}

impl Summary {
    /// Names of the observed fields, in first-seen order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// One consolidation run.
///
/// The time-offset watermark lives here, as run-local state, so concurrent
/// runs over different directories cannot interfere with each other.
#[derive(Debug)]
pub struct Consolidator {
    options: ConsolidateOptions,
    time_offset: Watermark,
}

impl Consolidator {
    /// A fresh run with the given options.
    pub fn new(options: ConsolidateOptions) -> Self {
        Consolidator {
            options,
            time_offset: Watermark::ZERO,
        }
    }

    /// Consolidate every chunk of `source` into a new bank at `output`.
    ///
    /// `progress` observes each chunk just before it is loaded. With zero
    /// matching chunk files this returns [`ConsolidateError::EmptyInput`]
    /// without creating the output file. The output file is created
    /// unconditionally otherwise; the warn-before-overwrite courtesy is the
    /// caller's job, since only it knows whether a collision is expected.
    pub fn run(
        mut self,
        source: &ChunkSource,
        output: &Path,
        mut progress: impl FnMut(ChunkProgress<'_>),
    ) -> ConsolidateResult<Summary> {
        let handles = source.list_chunks().context(SourceSnafu)?;
        if handles.is_empty() {
            return EmptyInputSnafu {
                dir: source.dir().display().to_string(),
            }
            .fail();
        }

        let mut writer =
            BankWriter::create(output, self.options.compression_level).context(BankSnafu)?;

        let total = handles.len();
        for (i, handle) in handles.iter().enumerate() {
            progress(ChunkProgress {
                index: i + 1,
                total,
                path: handle.path(),
            });
            let chunk = source.load(handle).context(SourceSnafu)?;
            self.process_chunk(chunk, &mut writer)?;
        }

        let index = writer.finish().context(BankSnafu)?;
        Ok(summarize(total, &index))
    }

    fn process_chunk(&mut self, chunk: Chunk, writer: &mut BankWriter) -> ConsolidateResult<()> {
        // A field established by an earlier chunk but absent here is simply
        // skipped: no padding, no error. Column lengths desynchronize from
        // this point on; flag it, since the gap is invisible downstream.
        for name in writer.field_names() {
            if chunk.get(name).is_none() {
                warn!(
                    "field '{}' missing from chunk {}; column lengths now differ",
                    name,
                    chunk.path().display()
                );
            }
        }

        let chunk_path = chunk.path().to_path_buf();
        for (name, mut column) in chunk.into_columns() {
            if self.options.normalize_time && is_time_field(&name) {
                let rebased = column
                    .rebase(self.time_offset)
                    .context(TimeRebaseSnafu {
                        field: name.clone(),
                        path: chunk_path.clone(),
                    })?;
                if let Some(watermark) = rebased {
                    self.time_offset = watermark;
                }
            }
            writer.append(&name, &column).context(BankSnafu)?;
        }
        Ok(())
    }
}

/// Whether a field participates in time normalization.
///
/// Detection is by naming convention only: a single leading `t`/`T`. A
/// numeric non-time field that happens to start with `t` will be rewritten
/// too; that hazard is inherited from the source data's conventions and
/// deliberately not second-guessed here.
fn is_time_field(name: &str) -> bool {
    name.as_bytes()
        .first()
        .is_some_and(|b| b.eq_ignore_ascii_case(&b't'))
}

fn summarize(chunks: usize, index: &BankIndex) -> Summary {
    Summary {
        chunks,
        fields: index
            .fields
            .iter()
            .map(|f| FieldSummary {
                name: f.name.clone(),
                dtype: f.dtype,
                rows: f.rows,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_field_detection_is_single_letter_prefix() {
        assert!(is_time_field("t"));
        assert!(is_time_field("ts"));
        assert!(is_time_field("T_stamp"));
        // The documented hazard: any leading 't' matches.
        assert!(is_time_field("trigger"));
        assert!(!is_time_field("x"));
        assert!(!is_time_field("stamp_t"));
        assert!(!is_time_field(""));
    }
}
