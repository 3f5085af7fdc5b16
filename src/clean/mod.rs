//! Cleaning primitives over Arrow record batches.
//!
//! Each loader composes a handful of these before casting to its target
//! schema. Everything is a pure function from batch to batch; row order is
//! preserved throughout.

use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{Array, ArrayRef, BooleanArray, Float64Builder, StringArray, StringBuilder},
    compute::{and, cast, filter_record_batch, is_not_null},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
    util::display::array_value_to_string,
};
use std::collections::HashSet;
use std::sync::Arc;

fn column_index(batch: &RecordBatch, name: &str) -> Result<usize> {
    batch
        .schema()
        .index_of(name)
        .with_context(|| format!("no column named {name:?}"))
}

/// Project away the named columns. Names the batch does not carry are
/// ignored, the source file may simply lack them.
pub fn drop_columns(batch: &RecordBatch, names: &[&str]) -> Result<RecordBatch> {
    let keep: Vec<usize> = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !names.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect();
    batch
        .project(&keep)
        .context("projecting away dropped columns")
}

/// Rename columns per the `(from, to)` pairs; columns not mentioned keep
/// their names, pairs whose `from` is absent are ignored.
pub fn rename_columns(batch: &RecordBatch, renames: &[(&str, &str)]) -> Result<RecordBatch> {
    let fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| match renames.iter().find(|(from, _)| f.name() == from) {
            Some((_, to)) => f.as_ref().clone().with_name(*to),
            None => f.as_ref().clone(),
        })
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), batch.columns().to_vec())
        .context("renaming columns")
}

/// Keep only rows where every named column is non-null.
pub fn filter_not_null(batch: &RecordBatch, names: &[&str]) -> Result<RecordBatch> {
    let mut mask: Option<BooleanArray> = None;
    for name in names {
        let idx = column_index(batch, name)?;
        let not_null = is_not_null(batch.column(idx))?;
        mask = Some(match mask {
            Some(m) => and(&m, &not_null)?,
            None => not_null,
        });
    }
    match mask {
        Some(m) => filter_record_batch(batch, &m).context("dropping rows with null keys"),
        None => Ok(batch.clone()),
    }
}

/// Keep only rows with no null in any column.
pub fn drop_any_null(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    filter_not_null(batch, &names)
}

/// Remove exact-duplicate rows; the first occurrence wins and row order is
/// otherwise unchanged.
pub fn dedup_rows(batch: &RecordBatch) -> Result<RecordBatch> {
    let mut seen: HashSet<String> = HashSet::with_capacity(batch.num_rows());
    let mut keep: Vec<bool> = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        // Row key: rendered cell values joined on a separator no cell can
        // contain, with an explicit marker so null != "".
        let mut key = String::new();
        for col in batch.columns() {
            if col.is_null(row) {
                key.push('\u{0}');
            } else {
                key.push_str(&array_value_to_string(col, row)?);
            }
            key.push('\u{1}');
        }
        keep.push(seen.insert(key));
    }
    filter_record_batch(batch, &BooleanArray::from(keep)).context("dropping duplicate rows")
}

/// Turn empty strings into nulls across every Utf8 column. The CSV layer
/// reads all columns as text, where an empty field means missing.
pub fn empty_to_null(batch: &RecordBatch) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for col in batch.columns() {
        match col.as_any().downcast_ref::<StringArray>() {
            Some(sarr) => {
                let mut b = StringBuilder::new();
                for v in sarr.iter() {
                    b.append_option(v.filter(|s| !s.is_empty()));
                }
                columns.push(Arc::new(b.finish()) as ArrayRef);
            }
            None => columns.push(col.clone()),
        }
    }
    RecordBatch::try_new(batch.schema(), columns).context("normalizing empty strings")
}

/// Replace nulls in a Utf8 column with a literal.
pub fn fill_null_str(batch: &RecordBatch, name: &str, value: &str) -> Result<RecordBatch> {
    let idx = column_index(batch, name)?;
    let col = batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("column {name:?} is not Utf8"))?;
    let mut b = StringBuilder::new();
    for v in col.iter() {
        b.append_value(v.unwrap_or(value));
    }
    let mut columns = batch.columns().to_vec();
    columns[idx] = Arc::new(b.finish()) as ArrayRef;
    RecordBatch::try_new(batch.schema(), columns)
        .with_context(|| format!("filling nulls in {name:?}"))
}

/// Cast column-by-column to an explicit target schema. Columns are matched
/// by name, so the target also fixes the output column order. The batch
/// must carry exactly the target's column set.
pub fn cast_to_schema(batch: &RecordBatch, target: &SchemaRef) -> Result<RecordBatch> {
    if batch.num_columns() != target.fields().len() {
        bail!(
            "schema mismatch: batch has {} columns, target wants {}",
            batch.num_columns(),
            target.fields().len()
        );
    }
    let mut out: Vec<ArrayRef> = Vec::with_capacity(target.fields().len());
    for field in target.fields() {
        let idx = column_index(batch, field.name())?;
        let col = batch.column(idx);
        let arr = if col.data_type() == field.data_type() {
            col.clone()
        } else {
            match (col.data_type(), field.data_type()) {
                (DataType::Utf8, DataType::Float64) => parse_f64(col, field.name())?,
                (from, to) => cast(col, to)
                    .with_context(|| format!("casting {:?} from {from} to {to}", field.name()))?,
            }
        };
        out.push(arr);
    }
    RecordBatch::try_new(target.clone(), out).context("applying target schema")
}

/// Strict string-to-double parse: whitespace-trimmed, empty string counts
/// as null, anything unparseable is an error naming the column.
fn parse_f64(col: &ArrayRef, name: &str) -> Result<ArrayRef> {
    let sarr = col
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("column {name:?} is not Utf8"))?;
    let mut b = Float64Builder::with_capacity(sarr.len());
    for opt in sarr.iter() {
        match opt.map(str::trim).filter(|s| !s.is_empty()) {
            None => b.append_null(),
            Some(s) => {
                let v: f64 = s
                    .parse()
                    .with_context(|| format!("column {name:?}: cannot cast {s:?} to double"))?;
                b.append_value(v);
            }
        }
    }
    Ok(Arc::new(b.finish()) as ArrayRef)
}
