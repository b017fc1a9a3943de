use std::sync::Arc;

use arrow::{
    array::{
        Array, ArrayRef, AsArray, BooleanArray, Float64Array, StringArray,
        TimestampMicrosecondArray,
    },
    compute::cast,
    datatypes::{DataType, Field, Float64Type, Schema, TimeUnit, TimestampMicrosecondType},
    error::ArrowError,
    record_batch::RecordBatch,
};
use bytes::Bytes;
use chrono::DateTime;
use log::debug;
use parquet::{
    arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder},
    errors::ParquetError,
};

use crate::{
    data::{Cell, Column, Dataset},
    error::{EngineError, EngineResult},
    format::{FormatAdapter, FormatTag, Physical, ReadOptions, physical_cells},
    io_utils,
    schema::ColumnType,
};

/// Parquet files via Arrow record batches. Flat schemas only.
pub struct ColumnarAdapter;

impl FormatAdapter for ColumnarAdapter {
    fn tag(&self) -> FormatTag {
        FormatTag::Columnar
    }

    fn read(&self, bytes: &[u8], options: &ReadOptions) -> EngineResult<Dataset> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(bytes))
            .map_err(parquet_error)?;
        let schema = builder.schema().clone();
        let nested = schema
            .fields()
            .iter()
            .filter(|field| field.data_type().is_nested())
            .map(|field| field.name().clone())
            .collect::<Vec<_>>();
        if !nested.is_empty() {
            return Err(EngineError::shape(
                "nested columnar fields cannot be represented as a flat table",
                nested,
            ));
        }
        let reader = builder.build().map_err(parquet_error)?;

        let mut cells = vec![Vec::new(); schema.fields().len()];
        let mut total_rows = 0usize;
        for batch in reader {
            options.cancel.check()?;
            let batch = batch.map_err(arrow_error)?;
            total_rows += batch.num_rows();
            io_utils::ensure_row_ceiling(total_rows, options.max_rows)?;
            for (idx, array) in batch.columns().iter().enumerate() {
                append_cells(schema.field(idx), array, &mut cells[idx])?;
            }
        }
        debug!(
            "Read {total_rows} row(s) across {} columnar field(s)",
            schema.fields().len()
        );

        let columns = schema
            .fields()
            .iter()
            .zip(cells)
            .map(|(field, cells)| {
                let column = Column::new(field.name().clone(), cells);
                match native_type(field.data_type()) {
                    Some(native) => column.with_native_type(native),
                    None => column,
                }
            })
            .collect();
        Dataset::new(columns)
    }

    fn write(&self, dataset: &Dataset) -> EngineResult<Vec<u8>> {
        let mut fields = Vec::with_capacity(dataset.columns().len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(dataset.columns().len());
        for column in dataset.columns() {
            let (physical, cells) = physical_cells(column);
            let (data_type, array): (DataType, ArrayRef) = match physical {
                Physical::Number => (
                    DataType::Float64,
                    Arc::new(cells.iter().map(Cell::as_number).collect::<Float64Array>()),
                ),
                Physical::Boolean => (
                    DataType::Boolean,
                    Arc::new(cells.iter().map(Cell::as_boolean).collect::<BooleanArray>()),
                ),
                Physical::Date => (
                    DataType::Timestamp(TimeUnit::Microsecond, None),
                    Arc::new(
                        cells
                            .iter()
                            .map(|cell| {
                                cell.as_datetime()
                                    .map(|dt| dt.and_utc().timestamp_micros())
                            })
                            .collect::<TimestampMicrosecondArray>(),
                    ),
                ),
                Physical::Text => (
                    DataType::Utf8,
                    Arc::new(
                        cells
                            .iter()
                            .map(|cell| (!cell.is_absent()).then(|| cell.as_display()))
                            .collect::<StringArray>(),
                    ),
                ),
            };
            fields.push(Field::new(column.name(), data_type, true));
            arrays.push(array);
        }

        let schema = Arc::new(Schema::new(fields));
        let mut buffer = Vec::new();
        let mut writer =
            ArrowWriter::try_new(&mut buffer, schema.clone(), None).map_err(parquet_error)?;
        if dataset.row_count() > 0 {
            let batch = RecordBatch::try_new(schema, arrays).map_err(arrow_error)?;
            writer.write(&batch).map_err(parquet_error)?;
        }
        writer.close().map_err(parquet_error)?;
        Ok(buffer)
    }

    fn represents(&self, _column_type: ColumnType) -> bool {
        true
    }
}

fn native_type(data_type: &DataType) -> Option<ColumnType> {
    match data_type {
        DataType::Boolean => Some(ColumnType::Boolean),
        dt if dt.is_integer() => Some(ColumnType::NumericDiscrete),
        dt if dt.is_numeric() => Some(ColumnType::NumericContinuous),
        dt if dt.is_temporal() => Some(ColumnType::Temporal),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Some(ColumnType::FreeText),
        _ => None,
    }
}

fn append_cells(field: &Field, array: &ArrayRef, out: &mut Vec<Cell>) -> EngineResult<()> {
    match array.data_type() {
        DataType::Null => out.extend((0..array.len()).map(|_| Cell::Absent)),
        DataType::Boolean => {
            let values = array.as_boolean();
            out.extend((0..values.len()).map(|i| {
                if values.is_null(i) {
                    Cell::Absent
                } else {
                    Cell::Boolean(values.value(i))
                }
            }));
        }
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let casted = cast(array, &DataType::Utf8).map_err(arrow_error)?;
            let values = casted.as_string::<i32>();
            out.extend((0..values.len()).map(|i| {
                if values.is_null(i) {
                    Cell::Absent
                } else {
                    Cell::text(values.value(i))
                }
            }));
        }
        dt if dt.is_numeric() => {
            let casted = cast(array, &DataType::Float64).map_err(arrow_error)?;
            let values = casted.as_primitive::<Float64Type>();
            out.extend((0..values.len()).map(|i| {
                if values.is_null(i) {
                    Cell::Absent
                } else {
                    Cell::number(values.value(i))
                }
            }));
        }
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
            let casted = cast(array, &DataType::Timestamp(TimeUnit::Microsecond, None))
                .map_err(arrow_error)?;
            let values = casted.as_primitive::<TimestampMicrosecondType>();
            out.extend((0..values.len()).map(|i| {
                if values.is_null(i) {
                    return Cell::Absent;
                }
                DateTime::from_timestamp_micros(values.value(i))
                    .map(|dt| Cell::Date(dt.naive_utc()))
                    .unwrap_or(Cell::Absent)
            }));
        }
        other => {
            return Err(EngineError::shape(
                format!("columnar type {other} has no tabular cell mapping"),
                vec![field.name().clone()],
            ));
        }
    }
    Ok(())
}

fn parquet_error(err: ParquetError) -> EngineError {
    EngineError::format(FormatTag::Columnar, err.to_string())
}

fn arrow_error(err: ArrowError) -> EngineError {
    EngineError::format(FormatTag::Columnar, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_temporal;

    #[test]
    fn parquet_round_trips_typed_columns() {
        let when = parse_temporal("2024-02-29 08:15:00").unwrap();
        let dataset = Dataset::new(vec![
            Column::new("region", vec![Cell::text("EU"), Cell::text("US")]),
            Column::new("sales", vec![Cell::Number(10.5), Cell::Absent]),
            Column::new("paid", vec![Cell::Boolean(false), Cell::Boolean(true)]),
            Column::new("at", vec![Cell::Date(when), Cell::Absent]),
        ])
        .unwrap();
        let bytes = ColumnarAdapter.write(&dataset).expect("write parquet");
        assert_eq!(FormatTag::sniff(&bytes), FormatTag::Columnar);

        let back = ColumnarAdapter
            .read(&bytes, &ReadOptions::default())
            .expect("read parquet");
        assert_eq!(back, dataset);
        assert_eq!(
            back.column("sales").unwrap().native_type(),
            Some(ColumnType::NumericContinuous)
        );
    }

    #[test]
    fn zero_row_dataset_keeps_schema() {
        let dataset = Dataset::new(vec![Column::new("empty", Vec::new())]).unwrap();
        let bytes = ColumnarAdapter.write(&dataset).expect("write parquet");
        let back = ColumnarAdapter
            .read(&bytes, &ReadOptions::default())
            .expect("read parquet");
        assert_eq!(back.column_names(), vec!["empty"]);
        assert_eq!(back.row_count(), 0);
    }

    #[test]
    fn corrupt_bytes_are_format_errors() {
        let err = ColumnarAdapter
            .read(b"PAR1garbage", &ReadOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), "FormatError");
    }
}
