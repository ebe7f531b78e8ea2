//! CSV loading: arrow_csv infers the schema, the decoded Arrow columns are
//! converted to cell values.

use crate::config::CsvOptions;
use anyhow::{Context, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, Int64Type};
use arrow_array::{Array, ArrayRef, RecordBatch};
use arrow_csv::reader::Format;
use arrow_schema::{DataType, Field, Schema};
use diagnostics::*;
use oplog::{Frame, Row, Value};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Load a CSV file as a frame with row ids 0..n
pub fn load_csv<P: AsRef<Path>>(path: P, options: &CsvOptions) -> Result<Frame> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;
    let frame = parse_csv(&bytes, options)
        .with_context(|| format!("Failed to parse CSV file: {}", path.display()))?;
    let shown = path.display().to_string();
    info!("loaded {rows} rows and {columns} columns from {path}",
          rows: frame.row_count(), columns: frame.column_count(), path: shown.as_str());
    Ok(frame)
}

/// Parse CSV bytes. Inferred types other than integer, float, boolean and
/// text are read as text.
pub fn parse_csv(bytes: &[u8], options: &CsvOptions) -> Result<Frame> {
    let delimiter = options.delimiter as u8;
    let format = Format::default()
        .with_delimiter(delimiter)
        .with_header(options.has_header);
    let (inferred, _) = format
        .infer_schema(Cursor::new(bytes), Some(options.schema_infer_max_records))
        .context("Failed to infer CSV schema")?;
    let schema = Arc::new(plain_schema(&inferred));

    let reader = arrow_csv::ReaderBuilder::new(Arc::clone(&schema))
        .with_delimiter(delimiter)
        .with_header(options.has_header)
        .build(Cursor::new(bytes))
        .context("Failed to build CSV reader")?;

    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let mut frame = Frame::new(columns);
    for batch in reader {
        let batch = batch.context("Failed to decode CSV records")?;
        append_batch(&mut frame, &batch)?;
    }
    Ok(frame)
}

fn plain_schema(inferred: &Schema) -> Schema {
    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|field| {
            let data_type = match field.data_type() {
                DataType::Int64 | DataType::Float64 | DataType::Boolean | DataType::Null => {
                    field.data_type().clone()
                }
                _ => DataType::Utf8,
            };
            Field::new(field.name(), data_type, true)
        })
        .collect();
    Schema::new(fields)
}

fn append_batch(frame: &mut Frame, batch: &RecordBatch) -> Result<()> {
    let first_id = frame.row_count() as u64;
    for i in 0..batch.num_rows() {
        let values = batch
            .columns()
            .iter()
            .map(|column| cell(column, i))
            .collect::<Result<Vec<Value>>>()?;
        frame.push(Row::new(first_id + i as u64, values))?;
    }
    Ok(())
}

fn cell(column: &ArrayRef, i: usize) -> Result<Value> {
    if column.is_null(i) {
        return Ok(Value::Null);
    }
    let value = match column.data_type() {
        DataType::Int64 => Value::from(column.as_primitive::<Int64Type>().value(i)),
        DataType::Float64 => serde_json::Number::from_f64(column.as_primitive::<Float64Type>().value(i))
            .map_or(Value::Null, Value::Number),
        DataType::Boolean => Value::Bool(column.as_boolean().value(i)),
        DataType::Utf8 => Value::String(column.as_string::<i32>().value(i).to_string()),
        DataType::Null => Value::Null,
        other => anyhow::bail!("unsupported column type {other}"),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_typed_columns() -> Result<()> {
        let csv = "name,age,score,active,joined\nalice,31,1.5,true,2024-01-02\nbob,,2.25,false,2023-11-30\n";
        let frame = parse_csv(csv.as_bytes(), &CsvOptions::default())?;
        assert_eq!(frame.columns, vec!["name", "age", "score", "active", "joined"]);
        assert_eq!(frame.row_count(), 2);
        assert_eq!(
            frame.rows[0].values,
            vec![json!("alice"), json!(31), json!(1.5), json!(true), json!("2024-01-02")]
        );
        assert_eq!(frame.rows[1].values[1], Value::Null);
        assert_eq!(frame.rows[1].id, 1);
        Ok(())
    }

    #[test]
    fn test_custom_delimiter() -> Result<()> {
        let options = CsvOptions {
            delimiter: ';',
            ..CsvOptions::default()
        };
        let frame = parse_csv(b"a;b\n1;x\n", &options)?;
        assert_eq!(frame.rows[0].values, vec![json!(1), json!("x")]);
        Ok(())
    }
}
