//! The three dataset loaders and the run loop that drives them.
//!
//! Each loader reads one raw input, runs it through the cleaning steps in
//! [`crate::clean`], and hands the result to [`crate::sink`] for partitioned
//! parquet output. They share one object-store session so a single run lands
//! everything under the same output root.

mod airports;
mod demographics;
mod immigration;

pub use airports::process_airports;
pub use demographics::process_demographics;
pub use immigration::process_immigration;

use anyhow::{bail, Context, Result};
use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clean;
use crate::config::Config;
use crate::session;

/// Process every dataset against the configured output root.
pub async fn run(config: &Config) -> Result<()> {
    let session = session::create_session(config)?;
    process_immigration(&session, config).await?;
    process_airports(&session, config).await?;
    process_demographics(&session, config).await?;
    info!("all datasets written");
    Ok(())
}

/// Read a delimited file with every column as nullable text. Empty fields
/// become nulls; typing happens later through each loader's schema cast.
pub(crate) fn read_csv(path: &Path, delimiter: u8) -> Result<RecordBatch> {
    let mut header = String::new();
    BufReader::new(
        File::open(path).with_context(|| format!("opening {}", path.display()))?,
    )
    .read_line(&mut header)
    .with_context(|| format!("reading header of {}", path.display()))?;

    let names = split_header(&header, delimiter);
    if names.is_empty() {
        bail!("{} has no header row", path.display());
    }
    let fields: Vec<Field> = names
        .iter()
        .map(|n| Field::new(n, DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_delimiter(delimiter)
        .build(file)
        .context("building CSV reader")?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading {}", path.display()))?;
    let batch = concat_batches(&schema, &batches)?;
    clean::empty_to_null(&batch)
}

fn split_header(line: &str, delimiter: u8) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Vec::new();
    }
    line.split(delimiter as char)
        .map(|raw| raw.trim().trim_matches('"').to_string())
        .collect()
}

/// Log the row count and print the first few rows of a batch, the same
/// sanity check a notebook `show()` would give.
pub(crate) fn preview(dataset: &str, stage: &str, batch: &RecordBatch) {
    info!(dataset, stage, rows = batch.num_rows(), "dataset checkpoint");
    let head = batch.slice(0, batch.num_rows().min(5));
    match pretty_format_batches(&[head]) {
        Ok(table) => println!("{table}"),
        Err(err) => warn!(%err, "could not render preview"),
    }
}
