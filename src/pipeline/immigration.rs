//! Immigration loader: SAS7BDAT arrival records, partitioned by arrival year.

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use tracing::{info, instrument};

use super::preview;
use crate::clean;
use crate::config::Config;
use crate::sas::SasReader;
use crate::session::Session;
use crate::sink;

/// Columns that are almost entirely empty in the source extracts.
const SPARSE_COLUMNS: &[&str] = &["occup", "entdepu", "insnum"];

const DATASET: &str = "immigration";
const PARTITION_COL: &str = "i94yr";
const ROWS_PER_FILE: usize = 500_000;

fn clean_immigration(batch: &RecordBatch) -> Result<RecordBatch> {
    let batch = clean::drop_columns(batch, SPARSE_COLUMNS)?;
    clean::dedup_rows(&batch)
}

#[instrument(level = "info", skip_all)]
pub async fn process_immigration(session: &Session, config: &Config) -> Result<()> {
    let reader = SasReader::open(&config.immigration_path)?;
    let raw = reader.read_all().context("decoding immigration records")?;
    let batch = clean_immigration(&raw)?;
    preview(DATASET, "cleaned", &batch);
    let summary =
        sink::write_partitioned(session, &batch, DATASET, PARTITION_COL, ROWS_PER_FILE).await?;
    info!(
        rows = summary.rows,
        partitions = summary.partitions,
        objects = summary.objects,
        "immigration written"
    );
    preview(DATASET, "written", &batch);
    Ok(())
}
