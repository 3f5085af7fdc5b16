//! City demographics loader: semicolon-delimited survey extract,
//! partitioned by state code.

use anyhow::Result;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{preview, read_csv};
use crate::clean;
use crate::config::Config;
use crate::session::Session;
use crate::sink;

const DATASET: &str = "us_demo";
const PARTITION_COL: &str = "stateCode";
const ROWS_PER_FILE: usize = 100_000;

/// Source headers mapped to the short names the published dataset uses.
const RENAMES: &[(&str, &str)] = &[
    ("Median Age", "medAge"),
    ("Male Population", "malePop"),
    ("Female Population", "femPop"),
    ("Total Population", "totPop"),
    ("Number of Veterans", "numVets"),
    ("Foreign-born", "foreignBorn"),
    ("Average Household Size", "avgHouseh"),
    ("State Code", "stateCode"),
];

/// Published demographics schema. Only the male population is numeric;
/// the remaining counts ship as text.
pub fn demographics_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("City", DataType::Utf8, true),
        Field::new("State", DataType::Utf8, true),
        Field::new("medAge", DataType::Utf8, true),
        Field::new("malePop", DataType::Float64, true),
        Field::new("femPop", DataType::Utf8, true),
        Field::new("totPop", DataType::Utf8, true),
        Field::new("numVets", DataType::Utf8, true),
        Field::new("foreignBorn", DataType::Utf8, true),
        Field::new("avgHouseh", DataType::Utf8, true),
        Field::new("stateCode", DataType::Utf8, true),
        Field::new("Race", DataType::Utf8, true),
        Field::new("Count", DataType::Utf8, true),
    ]))
}

fn clean_demographics(batch: &RecordBatch) -> Result<RecordBatch> {
    let batch = clean::rename_columns(batch, RENAMES)?;
    let batch = clean::filter_not_null(&batch, &[PARTITION_COL])?;
    let batch = clean::dedup_rows(&batch)?;
    // missing household size means no data, reported as zero downstream
    let batch = clean::fill_null_str(&batch, "avgHouseh", "0.0")?;
    clean::cast_to_schema(&batch, &demographics_schema())
}

#[instrument(level = "info", skip_all)]
pub async fn process_demographics(session: &Session, config: &Config) -> Result<()> {
    let raw = read_csv(&config.demographics_path, b';')?;
    let batch = clean_demographics(&raw)?;
    preview(DATASET, "cleaned", &batch);
    let summary =
        sink::write_partitioned(session, &batch, DATASET, PARTITION_COL, ROWS_PER_FILE).await?;
    info!(
        rows = summary.rows,
        partitions = summary.partitions,
        objects = summary.objects,
        "demographics written"
    );
    preview(DATASET, "written", &batch);
    Ok(())
}
