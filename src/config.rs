//! Client configuration.
//!
//! Settings are read from a JSON file (`./config.json` by default) so state
//! directories and service coordinates can be shared with the upstream
//! harvesting tools that use the same layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ClientError;
use crate::service::RetryPolicy;

fn default_host() -> String {
    "localhost".to_string()
}

fn default_data_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_batch_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    8
}

fn default_sleep_time() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    5
}

fn default_mongo_port() -> u16 {
    27017
}

/// Recognized configuration options.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Host of the software mention recognition service.
    #[serde(default = "default_host")]
    pub software_mention_host: String,

    /// Port of the service; omitted means the plain HTTP port.
    #[serde(default)]
    pub software_mention_port: Option<u16>,

    /// Directory holding the processing state store and, for collection
    /// runs, the harvested documents.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Number of candidates accumulated before a batch is dispatched.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Worker pool size for one batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Base overload backoff in seconds.
    #[serde(default = "default_sleep_time")]
    pub sleep_time: u64,

    /// Hard per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Maximum number of retries after an overload response.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Bucket name used by the upstream harvester's object storage layout.
    /// Recognized for config-file compatibility; this client never talks to
    /// object storage itself.
    #[serde(default)]
    pub bucket_name: Option<String>,

    /// MongoDB instance receiving annotation results, when set.
    #[serde(default)]
    pub mongo_host: Option<String>,

    #[serde(default = "default_mongo_port")]
    pub mongo_port: u16,

    #[serde(default)]
    pub mongo_db: Option<String>,
}

/// Coordinates of the result database, derived from [`Config::mongo`].
#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

impl Config {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ClientError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|err| {
            ClientError::Config(format!("invalid config {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.batch_size == 0 {
            return Err(ClientError::Config(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ClientError::Config(
                "concurrency must be greater than zero".to_string(),
            ));
        }
        if self.mongo_host.is_some() && self.mongo_db.is_none() {
            return Err(ClientError::Config(
                "mongo_host is set but mongo_db is missing".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL of the annotation service.
    pub fn base_url(&self) -> String {
        match self.software_mention_port {
            Some(port) => format!("http://{}:{port}", self.software_mention_host),
            None => format!("http://{}", self.software_mention_host),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(self.sleep_time),
            max_retries: self.max_retries,
        }
    }

    /// Result database coordinates, when a mongo instance is configured.
    pub fn mongo(&self) -> Option<MongoConfig> {
        let host = self.mongo_host.as_deref().filter(|h| !h.is_empty())?;
        let database = self.mongo_db.clone()?;
        Some(MongoConfig {
            uri: format!("mongodb://{host}:{}", self.mongo_port),
            database,
        })
    }
}
