use anyhow::{anyhow, Context, Result};
use ini::Ini;
use std::env;
use std::path::{Path, PathBuf};

/// Credentials file the original deployment shipped next to the binary.
pub const DEFAULT_CREDENTIALS_FILE: &str = "dl.cfg";

const DEFAULT_IMMIGRATION_PATH: &str =
    "../../data/18-83510-I94-Data-2016/i94_apr16_sub.sas7bdat";
const DEFAULT_AIRPORTS_PATH: &str = "/home/workspace/airport-codes_csv.csv";
const DEFAULT_DEMOGRAPHICS_PATH: &str = "/home/workspace/us-cities-demographics.csv";
const DEFAULT_OUTPUT_ROOT: &str = "s3a://capemrproj/";

/// Static AWS credentials read from the `[AWS]` section of the INI file.
/// Passed explicitly to the store builder, never exported into the
/// process environment.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Everything the pipeline needs to know at startup: where the three
/// source files live, where output goes, and how to sign S3 requests.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Option<AwsCredentials>,
    pub immigration_path: PathBuf,
    pub airports_path: PathBuf,
    pub demographics_path: PathBuf,
    pub output_root: String,
}

impl Config {
    /// Load configuration from the credentials file named by
    /// `I94LAKE_CREDENTIALS` (default `dl.cfg`), with `I94LAKE_*` env
    /// overrides for every path.
    pub fn load() -> Result<Self> {
        let cfg_path = env_or("I94LAKE_CREDENTIALS", DEFAULT_CREDENTIALS_FILE);
        Self::from_credentials_file(Path::new(&cfg_path))
    }

    /// Build a config from an explicit INI file. Missing file, section, or
    /// key is fatal; there are no credential defaults.
    pub fn from_credentials_file(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file(path)
            .with_context(|| format!("reading credentials file {}", path.display()))?;
        let aws = ini
            .section(Some("AWS"))
            .ok_or_else(|| anyhow!("missing [AWS] section in {}", path.display()))?;
        let access_key_id = aws
            .get("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| anyhow!("missing AWS_ACCESS_KEY_ID in {}", path.display()))?
            .to_string();
        let secret_access_key = aws
            .get("AWS_SECRET_ACCESS_KEY")
            .ok_or_else(|| anyhow!("missing AWS_SECRET_ACCESS_KEY in {}", path.display()))?
            .to_string();

        Ok(Self {
            credentials: Some(AwsCredentials {
                access_key_id,
                secret_access_key,
            }),
            ..Self::without_credentials()
        })
    }

    /// Paths only, no AWS credentials. Enough for local-filesystem output;
    /// building an S3 session from this fails.
    pub fn without_credentials() -> Self {
        Self {
            credentials: None,
            immigration_path: env_or("I94LAKE_IMMIGRATION", DEFAULT_IMMIGRATION_PATH).into(),
            airports_path: env_or("I94LAKE_AIRPORTS", DEFAULT_AIRPORTS_PATH).into(),
            demographics_path: env_or("I94LAKE_DEMOGRAPHICS", DEFAULT_DEMOGRAPHICS_PATH).into(),
            output_root: env_or("I94LAKE_OUTPUT_ROOT", DEFAULT_OUTPUT_ROOT),
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}
