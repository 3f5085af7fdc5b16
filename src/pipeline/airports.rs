//! Airport-code loader: comma-delimited airport listing, partitioned by
//! ISO region.

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

const DATASET: &str = "airplane_code";
const PARTITION_COL: &str = "iso_region";
const ROWS_PER_FILE: usize = 500_000;

/// Published airport schema: elevation as a double, everything else text.
pub fn airport_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("ident", DataType::Utf8, true),
        Field::new("type", DataType::Utf8, true),
        Field::new("name", DataType::Utf8, true),
        Field::new("elevation_ft", DataType::Float64, true),
        Field::new("continent", DataType::Utf8, true),
        Field::new("iso_country", DataType::Utf8, true),
        Field::new("iso_region", DataType::Utf8, true),
        Field::new("municipality", DataType::Utf8, true),
        Field::new("gps_code", DataType::Utf8, true),
        Field::new("local_code", DataType::Utf8, true),
        Field::new("coordinates", DataType::Utf8, true),
    ]))
}

/// Rows need an identifier and coordinates to be usable; the IATA code
/// column is mostly empty and gets discarded before the complete-row
/// filter so it cannot sink otherwise good rows.
fn clean_airports(batch: &RecordBatch) -> Result<RecordBatch> {
    let batch = clean::filter_not_null(batch, &["ident", "coordinates"])?;
    let batch = clean::dedup_rows(&batch)?;
    let batch = clean::drop_columns(&batch, &["iata_code"])?;
    let batch = clean::drop_any_null(&batch)?;
    clean::cast_to_schema(&batch, &airport_schema())
}

#[instrument(level = "info", skip_all)]
pub async fn process_airports(session: &Session, config: &Config) -> Result<()> {
    let raw = read_csv(&config.airports_path, b',')?;
    let batch = clean_airports(&raw)?;
    preview(DATASET, "cleaned", &batch);
    let summary =
        sink::write_partitioned(session, &batch, DATASET, PARTITION_COL, ROWS_PER_FILE).await?;
    info!(
        rows = summary.rows,
        partitions = summary.partitions,
        objects = summary.objects,
        "airports written"
    );
    preview(DATASET, "written", &batch);
    Ok(())
}
