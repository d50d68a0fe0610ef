//! Core engine for the `evbank` column-bank format.
//!
//! This crate provides the pieces needed to consolidate a directory of
//! per-time-window event archives (Parquet files holding keyed 1-D arrays)
//! into a single long-lived, randomly-accessible columnar store:
//!
//! - Typed column values and the time-rebase watermark (`column` module).
//! - Chunk enumeration in natural filename order and lazy per-chunk
//!   loading, so memory stays bounded by one chunk (`chunk` module).
//! - The on-disk "column bank" container: one growable, zstd-compressed
//!   column per field behind a JSON index and head/tail magic
//!   (`bank` module).
//! - The streaming consolidator that drives the per-chunk loop, pins each
//!   field's element type on first sight, and optionally stitches the time
//!   column into one continuous timeline (`consolidate` module).
//!
//! Higher-level tools (for example, a CLI) are expected to depend on this
//! crate rather than re-implementing the storage and consolidation logic.
#![deny(missing_docs)]
pub mod bank;
pub mod chunk;
pub mod column;
pub mod consolidate;

#[cfg(test)]
pub(crate) mod test_util;

pub use bank::{BankReader, BankWriter};
pub use chunk::{Chunk, ChunkHandle, ChunkSource};
pub use column::{ColumnData, DType};
pub use consolidate::{ConsolidateOptions, Consolidator, Summary};
