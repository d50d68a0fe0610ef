//! The on-disk column bank: one growable, compressed column per field.
//!
//! Layout of a bank file:
//!
//! ```text
//! "EVB1"                       head magic
//! <block> <block> ...          appended in chunk-processing order
//! <index json>                 per-field dtype, rows, block locations
//! <index_len: u64 LE>
//! "EVB1"                       tail magic
//! ```
//!
//! Each block is one chunk's array for one field, encoded little-endian and
//! zstd-compressed. Growing a column means appending one more block;
//! previously written bytes are never rewritten, so an interrupted run
//! leaves a readable prefix of blocks with no index (a partial bank, by
//! design — callers needing atomicity write to a temporary path and rename
//! on success).
//!
//! The index is JSON so banks stay debuggable with basic tools, mirroring
//! the head/tail-magic-plus-footer shape of the Parquet files this crate
//! ingests.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use snafu::Backtrace;

use crate::column::{ColumnData, ColumnError, DType};

/// Magic bytes at both ends of a bank file.
pub const BANK_MAGIC: [u8; 4] = *b"EVB1";

/// Current bank format version, recorded in the index.
pub const FORMAT_VERSION: u32 = 1;

/// Default zstd level for stored blocks. A tunable, not a correctness knob.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Result alias for bank operations.
pub type BankResult<T> = Result<T, BankError>;

/// Errors raised by the bank writer and reader.
#[derive(Debug, Snafu)]
pub enum BankError {
    /// The bank file could not be created.
    #[snafu(display("Failed to create bank file {path}: {source}"))]
    Create {
        /// Destination path.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// The bank file could not be opened for reading.
    #[snafu(display("Failed to open bank file {path}: {source}"))]
    Open {
        /// Path being opened.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// A read, write, or seek on the bank file failed.
    #[snafu(display("I/O error on bank file {path}: {source}"))]
    Io {
        /// Path of the bank file.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// Block compression failed.
    #[snafu(display("Failed to compress block for bank {path}: {source}"))]
    Compress {
        /// Path of the bank file.
        path: String,
        /// Underlying zstd error.
        source: io::Error,
    },

    /// Block decompression failed.
    #[snafu(display("Failed to decompress block from bank {path}: {source}"))]
    Decompress {
        /// Path of the bank file.
        path: String,
        /// Underlying zstd error.
        source: io::Error,
    },

    /// A later chunk changed a field's element type.
    #[snafu(display(
        "Field '{field}' changed element type from {expected} to {found} between chunks"
    ))]
    SchemaDrift {
        /// The drifting field.
        field: String,
        /// Element type pinned by the field's first appearance.
        expected: DType,
        /// Element type found in the current chunk.
        found: DType,
    },

    /// The file is too small to hold a bank header and footer.
    #[snafu(display("Bank file {path} is too short"))]
    TooShort {
        /// Path of the bank file.
        path: String,
    },

    /// Head or tail magic does not match; not a bank file, or a partial one.
    #[snafu(display("Bank file {path} has invalid magic (corrupt or unfinished)"))]
    BadMagic {
        /// Path of the bank file.
        path: String,
    },

    /// The index or a block location does not add up.
    #[snafu(display("Bank file {path} is corrupt: {detail}"))]
    Corrupt {
        /// Path of the bank file.
        path: String,
        /// What did not add up.
        detail: String,
    },

    /// The index failed to serialize while finishing the bank.
    #[snafu(display("Failed to encode index of bank {path}: {source}"))]
    IndexEncode {
        /// Path of the bank file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The JSON index failed to parse.
    #[snafu(display("Failed to decode index of bank {path}: {source}"))]
    IndexDecode {
        /// Path of the bank file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// A requested field is not present in the bank.
    #[snafu(display("Bank {path} has no field named '{field}'"))]
    UnknownField {
        /// Path of the bank file.
        path: String,
        /// The missing field.
        field: String,
    },

    /// A row range extends past the end of a column.
    #[snafu(display(
        "Row range {start}..{} is out of bounds for field '{field}' ({rows} rows)",
        start + count
    ))]
    RangeOutOfBounds {
        /// The requested field.
        field: String,
        /// First requested row.
        start: u64,
        /// Number of requested rows.
        count: u64,
        /// Rows actually stored.
        rows: u64,
    },
}

/// Location of one stored block within the bank file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEntry {
    /// Byte offset of the compressed block.
    pub offset: u64,
    /// Compressed length in bytes.
    pub compressed_len: u64,
    /// Uncompressed length in bytes.
    pub uncompressed_len: u64,
    /// Number of rows in the block.
    pub rows: u64,
}

/// One field's column: element type, total rows, and its blocks in append
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldEntry {
    /// Field name.
    pub name: String,
    /// Element type, pinned at the field's first appearance.
    pub dtype: DType,
    /// Total rows across all blocks.
    pub rows: u64,
    /// Blocks in append order.
    pub blocks: Vec<BlockEntry>,
}

/// The JSON footer of a bank file.
///
/// Fields appear in first-seen order, which equals the order the
/// consolidation run discovered them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankIndex {
    /// Bank format version.
    pub format_version: u32,
    /// When the bank was finished.
    pub created_at: DateTime<Utc>,
    /// Per-field column descriptors.
    pub fields: Vec<FieldEntry>,
}

/// Incremental writer for a bank file.
///
/// Columns are established lazily: the first [`BankWriter::append`] for a
/// field pins its element type and starts its block list; later appends
/// grow the column by one block. Dropping the writer without calling
/// [`BankWriter::finish`] leaves a partial bank with no index.
pub struct BankWriter {
    path: PathBuf,
    file: BufWriter<File>,
    offset: u64,
    fields: Vec<FieldEntry>,
    by_name: HashMap<String, usize>,
    level: i32,
}

impl BankWriter {
    /// Create (or truncate) the bank file at `path` and write the head
    /// magic. Overwrite policy is the caller's concern; creation here is
    /// unconditionally destructive.
    pub fn create(path: &Path, level: i32) -> BankResult<Self> {
        let path_str = path.display().to_string();
        let file = File::create(path).context(CreateSnafu {
            path: path_str.clone(),
        })?;
        let mut file = BufWriter::new(file);
        file.write_all(&BANK_MAGIC)
            .context(IoSnafu { path: path_str })?;

        Ok(BankWriter {
            path: path.to_path_buf(),
            file,
            offset: BANK_MAGIC.len() as u64,
            fields: Vec::new(),
            by_name: HashMap::new(),
            level,
        })
    }

    /// Whether a field has already been established.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Names of the established fields, in first-seen order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Append one chunk's array for `name` as a new block.
    ///
    /// The first append for a field creates its column with the array's
    /// element type; later appends must match it exactly or the call fails
    /// with [`BankError::SchemaDrift`]. A zero-length array still
    /// establishes the column.
    pub fn append(&mut self, name: &str, column: &ColumnData) -> BankResult<()> {
        let idx = match self.by_name.get(name) {
            Some(&idx) => {
                let expected = self.fields[idx].dtype;
                ensure!(
                    expected == column.dtype(),
                    SchemaDriftSnafu {
                        field: name,
                        expected,
                        found: column.dtype(),
                    }
                );
                idx
            }
            None => {
                let idx = self.fields.len();
                self.fields.push(FieldEntry {
                    name: name.to_string(),
                    dtype: column.dtype(),
                    rows: 0,
                    blocks: Vec::new(),
                });
                self.by_name.insert(name.to_string(), idx);
                idx
            }
        };

        let raw = column.to_le_bytes();
        let compressed =
            zstd::encode_all(Cursor::new(raw.as_slice()), self.level).context(CompressSnafu {
                path: self.path.display().to_string(),
            })?;
        self.file.write_all(&compressed).context(IoSnafu {
            path: self.path.display().to_string(),
        })?;

        let entry = &mut self.fields[idx];
        entry.blocks.push(BlockEntry {
            offset: self.offset,
            compressed_len: compressed.len() as u64,
            uncompressed_len: raw.len() as u64,
            rows: column.len() as u64,
        });
        entry.rows += column.len() as u64;
        self.offset += compressed.len() as u64;
        Ok(())
    }

    /// Write the index and tail magic, sync the file, and return the final
    /// index.
    pub fn finish(mut self) -> BankResult<BankIndex> {
        let path_str = self.path.display().to_string();

        let index = BankIndex {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            fields: self.fields,
        };
        let encoded = serde_json::to_vec(&index).context(IndexEncodeSnafu {
            path: path_str.clone(),
        })?;

        self.file.write_all(&encoded).context(IoSnafu {
            path: path_str.clone(),
        })?;
        self.file
            .write_all(&(encoded.len() as u64).to_le_bytes())
            .context(IoSnafu {
                path: path_str.clone(),
            })?;
        self.file.write_all(&BANK_MAGIC).context(IoSnafu {
            path: path_str.clone(),
        })?;
        self.file.flush().context(IoSnafu {
            path: path_str.clone(),
        })?;
        self.file
            .get_ref()
            .sync_all()
            .context(IoSnafu { path: path_str })?;
        Ok(index)
    }
}

/// Random-access reader over a finished bank file.
#[derive(Debug)]
pub struct BankReader {
    path: PathBuf,
    file: File,
    index: BankIndex,
}

impl BankReader {
    /// Open a bank file, validating head/tail magic and parsing the index.
    pub fn open(path: &Path) -> BankResult<Self> {
        let path_str = path.display().to_string();
        let mut file = File::open(path).context(OpenSnafu {
            path: path_str.clone(),
        })?;
        let len = file
            .metadata()
            .context(IoSnafu {
                path: path_str.clone(),
            })?
            .len();
        // head magic + index_len + tail magic is the smallest valid tail.
        ensure!(
            len >= (BANK_MAGIC.len() * 2 + 8) as u64,
            TooShortSnafu {
                path: path_str.clone()
            }
        );

        let mut head = [0u8; 4];
        let mut tail = [0u8; 4];
        read_exact_at(&mut file, SeekFrom::Start(0), &mut head, &path_str)?;
        read_exact_at(&mut file, SeekFrom::End(-4), &mut tail, &path_str)?;
        ensure!(
            head == BANK_MAGIC && tail == BANK_MAGIC,
            BadMagicSnafu {
                path: path_str.clone()
            }
        );

        let mut len_buf = [0u8; 8];
        read_exact_at(&mut file, SeekFrom::End(-12), &mut len_buf, &path_str)?;
        let index_len = u64::from_le_bytes(len_buf);
        ensure!(
            index_len <= len - (BANK_MAGIC.len() * 2 + 8) as u64,
            CorruptSnafu {
                path: path_str.clone(),
                detail: format!("index length {index_len} exceeds file size {len}"),
            }
        );

        let index_start = len - 12 - index_len;
        let mut buf = vec![0u8; index_len as usize];
        read_exact_at(&mut file, SeekFrom::Start(index_start), &mut buf, &path_str)?;
        let index: BankIndex =
            serde_json::from_slice(&buf).context(IndexDecodeSnafu { path: path_str })?;

        Ok(BankReader {
            path: path.to_path_buf(),
            file,
            index,
        })
    }

    /// The parsed index.
    pub fn index(&self) -> &BankIndex {
        &self.index
    }

    /// Field names in first-seen order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.index.fields.iter().map(|f| f.name.as_str())
    }

    /// Descriptor for one field, if present.
    pub fn field(&self, name: &str) -> Option<&FieldEntry> {
        self.index.fields.iter().find(|f| f.name == name)
    }

    /// Read one field's entire column.
    pub fn read_column(&mut self, name: &str) -> BankResult<ColumnData> {
        let field = self.lookup(name)?;
        let dtype = field.dtype;
        let blocks = field.blocks.clone();

        let mut raw = Vec::new();
        for block in &blocks {
            raw.extend_from_slice(&self.read_block(block)?);
        }
        decode_column(dtype, &raw, &self.path)
    }

    /// Read `count` rows of `name` starting at row `start`.
    ///
    /// Only the blocks covering the range are decompressed.
    pub fn read_rows(&mut self, name: &str, start: u64, count: u64) -> BankResult<ColumnData> {
        let field = self.lookup(name)?;
        let dtype = field.dtype;
        let rows = field.rows;
        ensure!(
            start.checked_add(count).is_some_and(|end| end <= rows),
            RangeOutOfBoundsSnafu {
                field: name,
                start,
                count,
                rows,
            }
        );
        let blocks = field.blocks.clone();

        let width = dtype.byte_width() as u64;
        let end = start + count;
        let mut raw = Vec::with_capacity((count * width) as usize);
        let mut block_start = 0u64;
        for block in &blocks {
            let block_end = block_start + block.rows;
            if block_end > start && block_start < end {
                let bytes = self.read_block(block)?;
                let lo = start.saturating_sub(block_start);
                let hi = end.min(block_end) - block_start;
                raw.extend_from_slice(&bytes[(lo * width) as usize..(hi * width) as usize]);
            }
            block_start = block_end;
            if block_start >= end {
                break;
            }
        }
        decode_column(dtype, &raw, &self.path)
    }

    fn lookup(&self, name: &str) -> BankResult<&FieldEntry> {
        self.index
            .fields
            .iter()
            .find(|f| f.name == name)
            .context(UnknownFieldSnafu {
                path: self.path.display().to_string(),
                field: name,
            })
    }

    fn read_block(&mut self, block: &BlockEntry) -> BankResult<Vec<u8>> {
        let path_str = self.path.display().to_string();
        let mut compressed = vec![0u8; block.compressed_len as usize];
        read_exact_at(
            &mut self.file,
            SeekFrom::Start(block.offset),
            &mut compressed,
            &path_str,
        )?;
        let raw = zstd::decode_all(Cursor::new(compressed.as_slice())).context(DecompressSnafu {
            path: path_str.clone(),
        })?;
        ensure!(
            raw.len() as u64 == block.uncompressed_len,
            CorruptSnafu {
                path: path_str,
                detail: format!(
                    "block at offset {} decompressed to {} bytes, expected {}",
                    block.offset,
                    raw.len(),
                    block.uncompressed_len
                ),
            }
        );
        Ok(raw)
    }
}

fn read_exact_at(file: &mut File, pos: SeekFrom, buf: &mut [u8], path: &str) -> BankResult<()> {
    file.seek(pos).context(IoSnafu { path })?;
    file.read_exact(buf).context(IoSnafu { path })?;
    Ok(())
}

fn decode_column(dtype: DType, raw: &[u8], path: &Path) -> BankResult<ColumnData> {
    ColumnData::from_le_bytes(dtype, raw).map_err(|e: ColumnError| BankError::Corrupt {
        path: path.display().to_string(),
        detail: e.to_string(),
    })
}
