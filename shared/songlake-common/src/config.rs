//! Configuration for the songlake ETL
//!
//! The job reads a key-value file (`dl.cfg` by default) and lets process
//! environment variables override individual entries. Both dotenv syntax and
//! INI files with an `[AWS]` section are accepted. The
//! resulting [`LakeConfig`] is passed explicitly into every stage.
//!
//! ## Storage roots
//!
//! `INPUT_PATH` and `OUTPUT_PATH` may be S3 URLs (`s3://bucket/prefix`,
//! with `s3a://`/`s3n://` accepted as aliases) or local directories, which
//! lets the same job run against a laptop copy of the dataset.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

use crate::error::LakeError;
use crate::types::{SongplayIdMode, UserLevelPolicy};

pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_REGION: &str = "AWS_REGION";
pub const AWS_ENDPOINT: &str = "AWS_ENDPOINT";
pub const AWS_ALLOW_HTTP: &str = "AWS_ALLOW_HTTP";
pub const INPUT_PATH: &str = "INPUT_PATH";
pub const OUTPUT_PATH: &str = "OUTPUT_PATH";
pub const SONG_DATA_PREFIX: &str = "SONG_DATA_PREFIX";
pub const LOG_DATA_PREFIX: &str = "LOG_DATA_PREFIX";
pub const PARQUET_COMPRESSION: &str = "PARQUET_COMPRESSION";
pub const DURATION_TOLERANCE_SECS: &str = "DURATION_TOLERANCE_SECS";
pub const SONGPLAY_ID_MODE: &str = "SONGPLAY_ID_MODE";
pub const USER_LEVEL_POLICY: &str = "USER_LEVEL_POLICY";
pub const TARGET_PARTITIONS: &str = "TARGET_PARTITIONS";

/// Every key the configuration understands
pub const CONFIG_KEYS: &[&str] = &[
    AWS_ACCESS_KEY_ID,
    AWS_SECRET_ACCESS_KEY,
    AWS_REGION,
    AWS_ENDPOINT,
    AWS_ALLOW_HTTP,
    INPUT_PATH,
    OUTPUT_PATH,
    SONG_DATA_PREFIX,
    LOG_DATA_PREFIX,
    PARQUET_COMPRESSION,
    DURATION_TOLERANCE_SECS,
    SONGPLAY_ID_MODE,
    USER_LEVEL_POLICY,
    TARGET_PARTITIONS,
];

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "dl.cfg";

/// Where a storage root lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageLocation {
    /// S3 bucket plus key prefix (no leading or trailing slash)
    S3 { bucket: String, prefix: String },
    /// Local filesystem directory
    Local { path: String },
}

impl StorageLocation {
    /// Parse and normalize a storage root
    pub fn parse(root: &str) -> Result<Self, LakeError> {
        let root = root.trim();
        if root.is_empty() {
            return Err(LakeError::ConfigError("Storage root cannot be empty".to_string()));
        }

        if !root.contains("://") {
            return Ok(StorageLocation::Local {
                path: root.trim_end_matches('/').to_string(),
            });
        }

        let url = Url::parse(root)
            .map_err(|e| LakeError::ConfigError(format!("Invalid storage URL {}: {}", root, e)))?;

        match url.scheme() {
            "s3" | "s3a" | "s3n" => {
                let bucket = url
                    .host_str()
                    .filter(|host| !host.is_empty())
                    .ok_or_else(|| {
                        LakeError::ConfigError(format!("Storage URL {} has no bucket", root))
                    })?
                    .to_string();
                let prefix = url.path().trim_matches('/').to_string();
                Ok(StorageLocation::S3 { bucket, prefix })
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| {
                        LakeError::ConfigError(format!("Invalid file URL: {}", root))
                    })?
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string();
                Ok(StorageLocation::Local { path })
            }
            other => Err(LakeError::ConfigError(format!(
                "Unsupported storage scheme '{}' in {}",
                other, root
            ))),
        }
    }

    /// Root rendered in the form the dataframe engine expects
    pub fn root(&self) -> String {
        match self {
            StorageLocation::S3 { bucket, prefix } if prefix.is_empty() => {
                format!("s3://{}", bucket)
            }
            StorageLocation::S3 { bucket, prefix } => format!("s3://{}/{}", bucket, prefix),
            StorageLocation::Local { path } => path.clone(),
        }
    }

    /// Directory URL of a child of this root (always ends with `/`)
    pub fn child_dir(&self, child: &str) -> String {
        let child = child.trim_matches('/');
        let root = self.root();
        if root.is_empty() {
            format!("{}/", child)
        } else {
            format!("{}/{}/", root, child)
        }
    }

    /// Bucket URL (`s3://bucket`) for S3 roots
    pub fn bucket_url(&self) -> Option<String> {
        match self {
            StorageLocation::S3 { bucket, .. } => Some(format!("s3://{}", bucket)),
            StorageLocation::Local { .. } => None,
        }
    }
}

/// Songlake ETL configuration
#[derive(Clone)]
pub struct LakeConfig {
    // Credentials
    /// S3 access key ID
    pub aws_access_key_id: String,
    /// S3 secret access key
    pub aws_secret_access_key: String,
    /// S3 region
    pub aws_region: String,
    /// Custom S3-compatible endpoint (e.g. MinIO)
    pub aws_endpoint: Option<String>,
    /// Allow plain HTTP endpoints
    pub aws_allow_http: bool,

    // Storage roots
    /// Root holding `song_data/` and `log_data/`
    pub input: StorageLocation,
    /// Root receiving one directory per output table
    pub output: StorageLocation,
    /// Song catalog directory under the input root
    pub song_data_prefix: String,
    /// Event log directory under the input root
    pub log_data_prefix: String,

    // Processing
    /// Parquet compression codec
    pub parquet_compression: String,
    /// Max |length - duration| for a catalog match, in seconds
    pub duration_tolerance_secs: f64,
    pub songplay_id_mode: SongplayIdMode,
    pub user_level_policy: UserLevelPolicy,
    /// Engine parallelism; engine default when unset
    pub target_partitions: Option<usize>,
}

impl fmt::Debug for LakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LakeConfig")
            .field("aws_access_key_id", &"***MASKED***")
            .field("aws_secret_access_key", &"***MASKED***")
            .field("aws_region", &self.aws_region)
            .field("aws_endpoint", &self.aws_endpoint)
            .field("aws_allow_http", &self.aws_allow_http)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("song_data_prefix", &self.song_data_prefix)
            .field("log_data_prefix", &self.log_data_prefix)
            .field("parquet_compression", &self.parquet_compression)
            .field("duration_tolerance_secs", &self.duration_tolerance_secs)
            .field("songplay_id_mode", &self.songplay_id_mode)
            .field("user_level_policy", &self.user_level_policy)
            .field("target_partitions", &self.target_partitions)
            .finish()
    }
}

fn required(props: &HashMap<String, String>, key: &str) -> Result<String, LakeError> {
    props
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| LakeError::ConfigError(format!("{} is required", key)))
}

fn optional<'a>(props: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    props
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn parse_optional<T>(props: &HashMap<String, String>, key: &str) -> Result<Option<T>, LakeError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    optional(props, key)
        .map(|value| {
            value.parse::<T>().map_err(|e| {
                LakeError::ConfigError(format!("Invalid value '{}' for {}: {}", value, key, e))
            })
        })
        .transpose()
}

impl LakeConfig {
    /// Load configuration from a key-value map
    ///
    /// Required: AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, INPUT_PATH, OUTPUT_PATH.
    /// Optional: AWS_REGION, AWS_ENDPOINT, AWS_ALLOW_HTTP, SONG_DATA_PREFIX,
    /// LOG_DATA_PREFIX, PARQUET_COMPRESSION, DURATION_TOLERANCE_SECS,
    /// SONGPLAY_ID_MODE, USER_LEVEL_POLICY, TARGET_PARTITIONS.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, LakeError> {
        let aws_access_key_id = required(props, AWS_ACCESS_KEY_ID)?;
        let aws_secret_access_key = required(props, AWS_SECRET_ACCESS_KEY)?;
        let input = StorageLocation::parse(&required(props, INPUT_PATH)?)?;
        let output = StorageLocation::parse(&required(props, OUTPUT_PATH)?)?;

        let defaults = Self::default();
        let config = Self {
            aws_access_key_id,
            aws_secret_access_key,
            aws_region: optional(props, AWS_REGION)
                .map(str::to_string)
                .unwrap_or(defaults.aws_region),
            aws_endpoint: optional(props, AWS_ENDPOINT).map(str::to_string),
            aws_allow_http: parse_optional(props, AWS_ALLOW_HTTP)?.unwrap_or(false),
            input,
            output,
            song_data_prefix: optional(props, SONG_DATA_PREFIX)
                .map(|prefix| prefix.trim_matches('/').to_string())
                .unwrap_or(defaults.song_data_prefix),
            log_data_prefix: optional(props, LOG_DATA_PREFIX)
                .map(|prefix| prefix.trim_matches('/').to_string())
                .unwrap_or(defaults.log_data_prefix),
            parquet_compression: optional(props, PARQUET_COMPRESSION)
                .map(str::to_string)
                .unwrap_or(defaults.parquet_compression),
            duration_tolerance_secs: parse_optional(props, DURATION_TOLERANCE_SECS)?
                .unwrap_or(defaults.duration_tolerance_secs),
            songplay_id_mode: parse_optional(props, SONGPLAY_ID_MODE)?.unwrap_or_default(),
            user_level_policy: parse_optional(props, USER_LEVEL_POLICY)?.unwrap_or_default(),
            target_partitions: parse_optional(props, TARGET_PARTITIONS)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a key-value file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LakeError> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());

        let contents = std::fs::read_to_string(path).map_err(|e| {
            LakeError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let flattened = flatten_sections(&contents);
        let entries = dotenvy::from_read_iter(flattened.as_bytes());

        let mut props = HashMap::new();
        for entry in entries {
            let (key, value) = entry.map_err(|e| {
                LakeError::ConfigError(format!(
                    "Malformed entry in config file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            props.insert(key, value);
        }

        for (key, value) in env_overrides() {
            debug!("Config key {} overridden from environment", key);
            props.insert(key, value);
        }

        Self::from_properties(&props)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, LakeError> {
        Self::from_properties(&env_overrides().into_iter().collect())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), LakeError> {
        if !self.duration_tolerance_secs.is_finite() || self.duration_tolerance_secs <= 0.0 {
            return Err(LakeError::ConfigError(format!(
                "{} must be a positive number, got {}",
                DURATION_TOLERANCE_SECS, self.duration_tolerance_secs
            )));
        }

        if self.target_partitions == Some(0) {
            return Err(LakeError::ConfigError(format!(
                "{} must be at least 1",
                TARGET_PARTITIONS
            )));
        }

        if let Some(endpoint) = &self.aws_endpoint {
            Url::parse(endpoint).map_err(|e| {
                LakeError::ConfigError(format!("Invalid S3 endpoint URL {}: {}", endpoint, e))
            })?;
        }

        if self.song_data_prefix.is_empty() || self.log_data_prefix.is_empty() {
            return Err(LakeError::ConfigError(
                "Input data prefixes cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Use different storage roots (local mode, tests)
    pub fn with_paths(mut self, input: &str, output: &str) -> Result<Self, LakeError> {
        self.input = StorageLocation::parse(input)?;
        self.output = StorageLocation::parse(output)?;
        Ok(self)
    }

    pub fn with_songplay_id_mode(mut self, mode: SongplayIdMode) -> Self {
        self.songplay_id_mode = mode;
        self
    }

    pub fn with_user_level_policy(mut self, policy: UserLevelPolicy) -> Self {
        self.user_level_policy = policy;
        self
    }

    /// Normalized input root
    pub fn input_root(&self) -> String {
        self.input.root()
    }

    /// Normalized output root
    pub fn output_root(&self) -> String {
        self.output.root()
    }

    /// Directory holding the song catalog JSON files
    pub fn song_data_url(&self) -> String {
        self.input.child_dir(&self.song_data_prefix)
    }

    /// Directory holding the event log JSON files
    pub fn log_data_url(&self) -> String {
        self.input.child_dir(&self.log_data_prefix)
    }

    /// Directory an output table is written to
    pub fn table_url(&self, table: &str) -> String {
        self.output.child_dir(table)
    }

    /// Distinct storage locations the job touches, input first
    pub fn storage_locations(&self) -> Vec<&StorageLocation> {
        let mut locations = vec![&self.input];
        if self.output != self.input {
            locations.push(&self.output);
        }
        locations
    }
}

/// Rewrite INI-style content (`[AWS]` headers, `;` comments, `KEY = value`)
/// into plain `KEY=value` lines; keys from every section are merged.
fn flatten_sections(contents: &str) -> String {
    contents
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.starts_with(';') || (trimmed.starts_with('[') && trimmed.ends_with(']')) {
                return None;
            }
            match trimmed.split_once('=') {
                Some((key, value)) if !trimmed.starts_with('#') => {
                    Some(format!("{}={}", key.trim(), value.trim()))
                }
                _ => Some(line.to_string()),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn env_overrides() -> Vec<(String, String)> {
    CONFIG_KEYS
        .iter()
        .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
        .collect()
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            aws_access_key_id: "local".to_string(),
            aws_secret_access_key: "local".to_string(),
            aws_region: "us-west-2".to_string(),
            aws_endpoint: None,
            aws_allow_http: false,
            input: StorageLocation::Local {
                path: "data".to_string(),
            },
            output: StorageLocation::Local {
                path: "output".to_string(),
            },
            song_data_prefix: "song_data".to_string(),
            log_data_prefix: "log_data".to_string(),
            parquet_compression: "snappy".to_string(),
            duration_tolerance_secs: 2.0,
            songplay_id_mode: SongplayIdMode::Replace,
            user_level_policy: UserLevelPolicy::Latest,
            target_partitions: None,
        }
    }
}
