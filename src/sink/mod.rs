//! Partitioned Parquet writes to the session's object store.
//!
//! Output layout is Hive-style, one directory per distinct partition-key
//! value: `<root>/<dataset>/<column>=<value>/part-NNNNN.parquet`. Every
//! write starts by clearing the dataset prefix, so reruns against the
//! same destination replace rather than append.

use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef, Float64Array, UInt32Array},
    compute::take_record_batch,
    record_batch::RecordBatch,
    util::display::array_value_to_string,
};
use bytes::Bytes;
use futures::StreamExt;
use object_store::path::Path as StorePath;
use parquet::arrow::ArrowWriter;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::session::Session;

/// Directory name for rows whose partition key is null, Hive convention.
const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

#[derive(Debug)]
pub struct WriteSummary {
    pub rows: usize,
    pub partitions: usize,
    pub objects: usize,
}

/// Write `batch` under `<output root>/<dataset>/`, partitioned by the
/// distinct values of `partition_col`. Partitions larger than
/// `rows_per_file` rows are split across successive part files.
#[instrument(level = "info", skip(session, batch), fields(rows = batch.num_rows()))]
pub async fn write_partitioned(
    session: &Session,
    batch: &RecordBatch,
    dataset: &str,
    partition_col: &str,
    rows_per_file: usize,
) -> Result<WriteSummary> {
    let prefix = session.dataset_prefix(dataset);
    clear_prefix(session, &prefix)
        .await
        .with_context(|| format!("clearing existing output under {prefix}"))?;

    let idx = batch
        .schema()
        .index_of(partition_col)
        .with_context(|| format!("partition column {partition_col:?}"))?;
    let col = batch.column(idx);

    // Group row indices by rendered key value, first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<u32>> = HashMap::new();
    for row in 0..batch.num_rows() {
        let key = render_key(col, row)?;
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row as u32);
    }

    let mut objects = 0usize;
    for key in &order {
        let indices = &groups[key];
        for (file_idx, chunk) in indices.chunks(rows_per_file.max(1)).enumerate() {
            let part = take_record_batch(batch, &UInt32Array::from(chunk.to_vec()))
                .context("slicing partition rows")?;
            let encoded = encode_parquet(session, &part)?;
            let path = prefix
                .child(format!("{partition_col}={key}"))
                .child(format!("part-{file_idx:05}.parquet"));
            debug!(%path, rows = part.num_rows(), bytes = encoded.len(), "writing object");
            session
                .store
                .put(&path, encoded.into())
                .await
                .with_context(|| format!("writing {path}"))?;
            objects += 1;
        }
    }

    let summary = WriteSummary {
        rows: batch.num_rows(),
        partitions: order.len(),
        objects,
    };
    info!(
        dataset,
        partitions = summary.partitions,
        objects = summary.objects,
        "partitioned write complete"
    );
    Ok(summary)
}

/// Overwrite semantics: delete everything currently under the prefix.
async fn clear_prefix(session: &Session, prefix: &StorePath) -> Result<()> {
    let mut stream = session.store.list(Some(prefix));
    let mut removed = 0usize;
    while let Some(meta) = stream.next().await {
        let meta = meta?;
        session.store.delete(&meta.location).await?;
        removed += 1;
    }
    if removed > 0 {
        debug!(%prefix, removed, "cleared previous output");
    }
    Ok(())
}

fn encode_parquet(session: &Session, batch: &RecordBatch) -> Result<Bytes> {
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(
        &mut buf,
        batch.schema(),
        Some(session.writer_props.clone()),
    )
    .context("creating parquet writer")?;
    writer.write(batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;
    Ok(Bytes::from(buf))
}

/// Render one partition-key cell as a directory-name component. Whole
/// doubles keep their `.0` suffix (`i94yr=2016.0`), matching how the year
/// values print everywhere else in the pipeline.
fn render_key(col: &ArrayRef, row: usize) -> Result<String> {
    if col.is_null(row) {
        return Ok(NULL_PARTITION.to_string());
    }
    let raw = if let Some(floats) = col.as_any().downcast_ref::<Float64Array>() {
        let v = floats.value(row);
        if v.fract() == 0.0 && v.is_finite() {
            format!("{v:.1}")
        } else {
            format!("{v}")
        }
    } else {
        array_value_to_string(col.as_ref(), row)?
    };
    // Partition values become path segments; keep them store-safe.
    Ok(raw.replace('/', "%2F"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::create_session;
    use arrow::array::{ArrayRef, Float64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn sample_batch() -> RecordBatch {
        let region: ArrayRef = Arc::new(StringArray::from(vec![
            Some("US-PA"),
            Some("US-CA"),
            Some("US-PA"),
            None,
        ]));
        let value: ArrayRef = Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0, 4.0]));
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("iso_region", arrow::datatypes::DataType::Utf8, true),
                Field::new("value", arrow::datatypes::DataType::Float64, true),
            ])),
            vec![region, value],
        )
        .unwrap()
    }

    fn local_session(dir: &std::path::Path) -> crate::session::Session {
        let mut cfg = Config::without_credentials();
        cfg.output_root = dir.to_str().unwrap().to_string();
        create_session(&cfg).unwrap()
    }

    async fn list_keys(session: &crate::session::Session) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut stream = session.store.list(None);
        while let Some(meta) = stream.next().await {
            out.insert(meta.unwrap().location.to_string());
        }
        out
    }

    #[tokio::test]
    async fn partitions_match_distinct_key_values() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let session = local_session(tmp.path());
        let summary =
            write_partitioned(&session, &sample_batch(), "airplane_code", "iso_region", 1000)
                .await?;
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.partitions, 3);
        assert_eq!(summary.objects, 3);

        let keys = list_keys(&session).await;
        assert!(keys.contains("airplane_code/iso_region=US-PA/part-00000.parquet"));
        assert!(keys.contains("airplane_code/iso_region=US-CA/part-00000.parquet"));
        assert!(keys
            .contains("airplane_code/iso_region=__HIVE_DEFAULT_PARTITION__/part-00000.parquet"));
        Ok(())
    }

    #[tokio::test]
    async fn rows_per_file_splits_large_partitions() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let session = local_session(tmp.path());
        let summary =
            write_partitioned(&session, &sample_batch(), "airplane_code", "iso_region", 1)
                .await?;
        // US-PA has two rows, so it gets part-00000 and part-00001.
        assert_eq!(summary.objects, 4);
        let keys = list_keys(&session).await;
        assert!(keys.contains("airplane_code/iso_region=US-PA/part-00001.parquet"));
        Ok(())
    }

    #[tokio::test]
    async fn rerun_overwrites_previous_output() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let session = local_session(tmp.path());
        // First write with tiny files, second with one file per partition;
        // the leftover part-00001 objects must be gone afterwards.
        write_partitioned(&session, &sample_batch(), "airplane_code", "iso_region", 1).await?;
        write_partitioned(&session, &sample_batch(), "airplane_code", "iso_region", 1000)
            .await?;
        let keys = list_keys(&session).await;
        assert_eq!(keys.len(), 3);
        assert!(!keys.contains("airplane_code/iso_region=US-PA/part-00001.parquet"));
        Ok(())
    }

    #[tokio::test]
    async fn float_partition_keys_render_with_decimal() -> Result<()> {
        let year: ArrayRef = Arc::new(Float64Array::from(vec![2016.0, 2016.0]));
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new(
                "i94yr",
                arrow::datatypes::DataType::Float64,
                true,
            )])),
            vec![year],
        )?;
        let tmp = tempfile::tempdir()?;
        let session = local_session(tmp.path());
        write_partitioned(&session, &batch, "immigration", "i94yr", 1000).await?;
        let keys = list_keys(&session).await;
        assert!(keys.contains("immigration/i94yr=2016.0/part-00000.parquet"));
        Ok(())
    }
}
