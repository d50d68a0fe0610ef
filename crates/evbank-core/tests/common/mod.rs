//! Shared fixtures for integration tests: writing Parquet chunk files.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use evbank_core::column::{ColumnData, DType};

fn arrow_type(dtype: DType) -> DataType {
    match dtype {
        DType::I8 => DataType::Int8,
        DType::I16 => DataType::Int16,
        DType::I32 => DataType::Int32,
        DType::I64 => DataType::Int64,
        DType::U8 => DataType::UInt8,
        DType::U16 => DataType::UInt16,
        DType::U32 => DataType::UInt32,
        DType::U64 => DataType::UInt64,
        DType::F32 => DataType::Float32,
        DType::F64 => DataType::Float64,
        DType::Bool => DataType::Boolean,
    }
}

fn array_for(column: &ColumnData) -> ArrayRef {
    match column {
        ColumnData::I8(v) => Arc::new(Int8Array::from(v.clone())),
        ColumnData::I16(v) => Arc::new(Int16Array::from(v.clone())),
        ColumnData::I32(v) => Arc::new(Int32Array::from(v.clone())),
        ColumnData::I64(v) => Arc::new(Int64Array::from(v.clone())),
        ColumnData::U8(v) => Arc::new(UInt8Array::from(v.clone())),
        ColumnData::U16(v) => Arc::new(UInt16Array::from(v.clone())),
        ColumnData::U32(v) => Arc::new(UInt32Array::from(v.clone())),
        ColumnData::U64(v) => Arc::new(UInt64Array::from(v.clone())),
        ColumnData::F32(v) => Arc::new(Float32Array::from(v.clone())),
        ColumnData::F64(v) => Arc::new(Float64Array::from(v.clone())),
        ColumnData::Bool(v) => Arc::new(BooleanArray::from(v.clone())),
    }
}

/// Write one Parquet chunk fixture holding the given columns, in order.
pub fn write_chunk(
    path: &Path,
    columns: Vec<(&str, ColumnData)>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, column)| Field::new(*name, arrow_type(column.dtype()), false))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let arrays: Vec<ArrayRef> = columns.iter().map(|(_, column)| array_for(column)).collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
