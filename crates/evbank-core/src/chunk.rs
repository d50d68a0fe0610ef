//! Chunk enumeration and loading.
//!
//! A chunk is one Parquet archive file holding one time window's worth of
//! keyed 1-D arrays. [`ChunkSource::list_chunks`] enumerates the archive
//! files of a directory in natural (numeric-substring-aware) filename
//! order, so `chunk_2` sorts before `chunk_10`; [`ChunkSource::load`] reads
//! exactly one chunk into memory, decoupled from its neighbors, which keeps
//! peak memory at O(one chunk) rather than O(all chunks).

use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::DataType;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use snafu::prelude::*;
use snafu::Backtrace;

use crate::column::{ColumnData, DType};

/// Result alias for chunk operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Errors raised while enumerating or loading chunks.
///
/// Per-chunk I/O and decode failures are fatal for a consolidation run;
/// there is no partial-skip-and-continue mode.
#[derive(Debug, Snafu)]
pub enum ChunkError {
    /// The chunk directory could not be read.
    #[snafu(display("Failed to list chunk directory {dir}: {source}"))]
    ListDir {
        /// Directory being enumerated.
        dir: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// A chunk file could not be read from disk.
    #[snafu(display("Failed to read chunk {path}: {source}"))]
    ReadChunk {
        /// Path of the offending chunk.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// The file is too small to be a Parquet archive.
    #[snafu(display("Chunk {path} is too short to be a Parquet file"))]
    TooShort {
        /// Path of the offending chunk.
        path: String,
    },

    /// The Parquet container itself failed to parse.
    #[snafu(display("Failed to decode Parquet chunk {path}: {source}"))]
    ParquetDecode {
        /// Path of the offending chunk.
        path: String,
        /// Parquet-level decode error.
        source: parquet::errors::ParquetError,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// A record batch failed to decode while streaming the chunk.
    #[snafu(display("Failed to read record batch from chunk {path}: {source}"))]
    BatchDecode {
        /// Path of the offending chunk.
        path: String,
        /// Arrow-level decode error.
        source: arrow::error::ArrowError,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// A column's element type has no columnar counterpart in the bank.
    #[snafu(display(
        "Chunk {path} field '{field}' has unsupported element type {datatype}"
    ))]
    UnsupportedColumnType {
        /// Path of the offending chunk.
        path: String,
        /// Field whose type is unsupported.
        field: String,
        /// The Arrow type that was encountered.
        datatype: String,
    },

    /// A column carries nulls; event records are dense.
    #[snafu(display("Chunk {path} field '{field}' contains null values"))]
    NullValues {
        /// Path of the offending chunk.
        path: String,
        /// Field carrying nulls.
        field: String,
    },

    /// A batch column did not match the element type announced by the schema.
    #[snafu(display("Chunk {path} field '{field}' does not match its schema type"))]
    ColumnDecode {
        /// Path of the offending chunk.
        path: String,
        /// Field that failed to downcast.
        field: String,
    },
}

/// Lazy handle to one chunk file: a path, no loaded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHandle {
    path: PathBuf,
}

impl ChunkHandle {
    /// Path of the chunk file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_name(&self) -> &str {
        // Paths come from read_dir over UTF-8 chunk names; fall back to an
        // empty key rather than refusing to sort.
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// One fully loaded chunk: an ordered mapping from field name to column.
///
/// Column order matches the archive's own column order. All columns of one
/// chunk share the same length; the archive format enforces this, so it is
/// not re-checked here.
#[derive(Debug)]
pub struct Chunk {
    path: PathBuf,
    columns: Vec<(String, ColumnData)>,
}

impl Chunk {
    /// Path of the archive this chunk was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The columns, in archive order.
    pub fn columns(&self) -> &[(String, ColumnData)] {
        &self.columns
    }

    /// Look up one column by field name.
    pub fn get(&self, name: &str) -> Option<&ColumnData> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Consume the chunk, yielding owned columns in archive order.
    pub fn into_columns(self) -> Vec<(String, ColumnData)> {
        self.columns
    }
}

/// Enumerates and loads the chunk files of one input directory.
#[derive(Debug, Clone)]
pub struct ChunkSource {
    dir: PathBuf,
}

impl ChunkSource {
    /// File extension of chunk archives.
    pub const CHUNK_EXTENSION: &'static str = "parquet";

    /// Source over `*.parquet` files in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ChunkSource { dir: dir.into() }
    }

    /// The directory this source enumerates.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List chunk files in natural filename order.
    ///
    /// Returns lazy handles, not loaded content. An empty directory yields
    /// an empty list; the consolidator is responsible for turning that into
    /// a reported empty-input condition rather than a degenerate store.
    pub fn list_chunks(&self) -> ChunkResult<Vec<ChunkHandle>> {
        let entries = std::fs::read_dir(&self.dir).context(ListDirSnafu {
            dir: self.dir.display().to_string(),
        })?;

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.context(ListDirSnafu {
                dir: self.dir.display().to_string(),
            })?;
            let path = entry.path();
            let is_chunk = path
                .extension()
                .is_some_and(|ext| ext == Self::CHUNK_EXTENSION);
            if is_chunk && path.is_file() {
                handles.push(ChunkHandle { path });
            }
        }

        handles.sort_by(|a, b| natural_cmp(a.file_name(), b.file_name()));
        Ok(handles)
    }

    /// Load one chunk fully into memory.
    pub fn load(&self, handle: &ChunkHandle) -> ChunkResult<Chunk> {
        let path_str = handle.path().display().to_string();

        let bytes = std::fs::read(handle.path()).context(ReadChunkSnafu {
            path: path_str.clone(),
        })?;
        ensure!(
            bytes.len() >= 8,
            TooShortSnafu {
                path: path_str.clone()
            }
        );
        let data = Bytes::from(bytes);

        let builder = ParquetRecordBatchReaderBuilder::try_new(data).context(ParquetDecodeSnafu {
            path: path_str.clone(),
        })?;
        let schema = builder.schema().clone();
        let reader = builder.build().context(ParquetDecodeSnafu {
            path: path_str.clone(),
        })?;

        let mut columns: Vec<(String, ColumnData)> = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let dtype = dtype_for(field.data_type()).context(UnsupportedColumnTypeSnafu {
                path: path_str.clone(),
                field: field.name().clone(),
                datatype: field.data_type().to_string(),
            })?;
            columns.push((field.name().clone(), ColumnData::empty(dtype)));
        }

        for batch in reader {
            let batch = batch.context(BatchDecodeSnafu {
                path: path_str.clone(),
            })?;
            for (idx, (name, column)) in columns.iter_mut().enumerate() {
                let array = batch.column(idx);
                ensure!(
                    array.null_count() == 0,
                    NullValuesSnafu {
                        path: path_str.clone(),
                        field: name.clone(),
                    }
                );
                extend_column(column, array, &path_str, name)?;
            }
        }

        Ok(Chunk {
            path: handle.path().to_path_buf(),
            columns,
        })
    }
}

fn dtype_for(datatype: &DataType) -> Option<DType> {
    match datatype {
        DataType::Int8 => Some(DType::I8),
        DataType::Int16 => Some(DType::I16),
        DataType::Int32 => Some(DType::I32),
        DataType::Int64 => Some(DType::I64),
        DataType::UInt8 => Some(DType::U8),
        DataType::UInt16 => Some(DType::U16),
        DataType::UInt32 => Some(DType::U32),
        DataType::UInt64 => Some(DType::U64),
        DataType::Float32 => Some(DType::F32),
        DataType::Float64 => Some(DType::F64),
        DataType::Boolean => Some(DType::Bool),
        _ => None,
    }
}

fn extend_column(
    column: &mut ColumnData,
    array: &ArrayRef,
    path: &str,
    field: &str,
) -> ChunkResult<()> {
    macro_rules! extend_primitive {
        ($values:expr, $array_ty:ty) => {{
            let typed = array
                .as_any()
                .downcast_ref::<$array_ty>()
                .context(ColumnDecodeSnafu { path, field })?;
            $values.extend_from_slice(typed.values());
        }};
    }
    match column {
        ColumnData::I8(values) => extend_primitive!(values, Int8Array),
        ColumnData::I16(values) => extend_primitive!(values, Int16Array),
        ColumnData::I32(values) => extend_primitive!(values, Int32Array),
        ColumnData::I64(values) => extend_primitive!(values, Int64Array),
        ColumnData::U8(values) => extend_primitive!(values, UInt8Array),
        ColumnData::U16(values) => extend_primitive!(values, UInt16Array),
        ColumnData::U32(values) => extend_primitive!(values, UInt32Array),
        ColumnData::U64(values) => extend_primitive!(values, UInt64Array),
        ColumnData::F32(values) => extend_primitive!(values, Float32Array),
        ColumnData::F64(values) => extend_primitive!(values, Float64Array),
        ColumnData::Bool(values) => {
            let typed = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .context(ColumnDecodeSnafu { path, field })?;
            values.extend((0..typed.len()).map(|i| typed.value(i)));
        }
    }
    Ok(())
}

/// Compare two filenames treating embedded digit runs as numbers, so
/// `chunk_2` orders before `chunk_10`.
///
/// Non-digit runs compare bytewise; equal numeric values fall back to the
/// shorter (less zero-padded) run first, keeping the order total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ia = a.char_indices().peekable();
    let mut ib = b.char_indices().peekable();

    loop {
        match (ia.peek().copied(), ib.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((pos_a, ca)), Some((pos_b, cb))) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let run_a = take_digit_run(a, pos_a, &mut ia);
                    let run_b = take_digit_run(b, pos_b, &mut ib);

                    let trimmed_a = run_a.trim_start_matches('0');
                    let trimmed_b = run_b.trim_start_matches('0');
                    let ord = trimmed_a
                        .len()
                        .cmp(&trimmed_b.len())
                        .then_with(|| trimmed_a.cmp(trimmed_b))
                        .then_with(|| run_a.len().cmp(&run_b.len()));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                } else {
                    let ord = ca.cmp(&cb);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    ia.next();
                    ib.next();
                }
            }
        }
    }
}

fn take_digit_run<'a>(
    s: &'a str,
    start: usize,
    iter: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> &'a str {
    let mut end = start;
    while let Some((pos, c)) = iter.peek().copied() {
        if c.is_ascii_digit() {
            end = pos + c.len_utf8();
            iter.next();
        } else {
            break;
        }
    }
    &s[start..end]
}
