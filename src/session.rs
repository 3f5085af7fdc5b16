//! Shared execution session: one object store handle, one output prefix,
//! one set of Parquet writer properties used by all three loaders.

use anyhow::{anyhow, bail, Context, Result};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use object_store::ObjectStore;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

#[derive(Debug)]
pub struct Session {
    pub store: Arc<dyn ObjectStore>,
    /// Key prefix within the store that all datasets are written under.
    /// Empty for bucket-root or local-directory output.
    output_prefix: String,
    pub writer_props: WriterProperties,
}

impl Session {
    /// Store path for one dataset's directory under the output root.
    pub fn dataset_prefix(&self, dataset: &str) -> StorePath {
        if self.output_prefix.is_empty() {
            StorePath::from(dataset)
        } else {
            StorePath::from(format!("{}/{dataset}", self.output_prefix))
        }
    }
}

/// Build the session for the configured output root. `s3a://` and `s3://`
/// URIs get an S3 store signed with the configured credentials; anything
/// else is treated as a local directory (created if absent).
pub fn create_session(config: &Config) -> Result<Session> {
    let root = config.output_root.as_str();
    let (store, output_prefix): (Arc<dyn ObjectStore>, String) =
        if let Some(rest) = root.strip_prefix("s3a://").or_else(|| root.strip_prefix("s3://")) {
            let creds = config
                .credentials
                .as_ref()
                .ok_or_else(|| anyhow!("S3 output {root:?} requires AWS credentials"))?;
            let (bucket, key) = match rest.split_once('/') {
                Some((b, k)) => (b, k.trim_matches('/')),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                bail!("output root {root:?} has no bucket name");
            }
            let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
            let store = AmazonS3Builder::new()
                .with_bucket_name(bucket)
                .with_region(region)
                .with_access_key_id(&creds.access_key_id)
                .with_secret_access_key(&creds.secret_access_key)
                .build()
                .with_context(|| format!("building S3 store for bucket {bucket:?}"))?;
            info!(bucket, prefix = key, "using S3 output");
            (Arc::new(store), key.to_string())
        } else {
            let dir = root.strip_prefix("file://").unwrap_or(root);
            fs::create_dir_all(dir)
                .with_context(|| format!("creating output directory {dir:?}"))?;
            let store = LocalFileSystem::new_with_prefix(dir)
                .with_context(|| format!("opening local store at {dir:?}"))?;
            info!(dir, "using local filesystem output");
            (Arc::new(store), String::new())
        };

    Ok(Session {
        store,
        output_prefix,
        writer_props: WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build(),
    })
}
