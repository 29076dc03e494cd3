use crate::errors::{SaveableError, SaveableResult};
use anyhow::{Context, Result};
use clap::Args;
use std::{collections::HashMap, env, fmt};

pub const DEFAULT_ENDPOINT: &str = "s3.amazonaws.com";

/// Centralized CLI configuration.
/// Combines environment variables and command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub storage_dir: String,
    pub database_url: String,
    pub table: String,
    pub max_connections: u32,
}

/// Command-line overrides shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Directory where objects are stored (overrides SAVEABLE_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides SAVEABLE_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Records table name (overrides SAVEABLE_TABLE)
    #[arg(long, global = true)]
    pub table: Option<String>,
}

impl AppConfig {
    /// Merge CLI args over environment variables over defaults.
    pub fn from_env_and_args(args: &GlobalArgs) -> Result<Self> {
        Self::from_lookup(args, |name| env::var(name).ok())
    }

    pub fn from_lookup(args: &GlobalArgs, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_storage = lookup("SAVEABLE_STORAGE_DIR").unwrap_or_else(|| "./data/objects".into());
        let env_db = lookup("SAVEABLE_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/saveable.db".into());
        let env_table = lookup("SAVEABLE_TABLE").unwrap_or_else(|| "uploads".into());
        let max_connections = match lookup("SAVEABLE_MAX_CONNECTIONS") {
            Some(value) => value
                .parse::<u32>()
                .with_context(|| format!("parsing SAVEABLE_MAX_CONNECTIONS value `{}`", value))?,
            None => 5,
        };

        Ok(Self {
            storage_dir: args.storage_dir.clone().unwrap_or(env_storage),
            database_url: args.database_url.clone().unwrap_or(env_db),
            table: args.table.clone().unwrap_or(env_table),
            max_connections,
        })
    }
}

/// Lookup of application settings by logical key name.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads `app_<key>` settings from the environment, upper-cased:
/// `s3_bucket` comes from `APP_S3_BUCKET`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("APP_{}", key.to_ascii_uppercase())).ok()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MapConfigSource(pub HashMap<String, String>);

impl MapConfigSource {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Logical key names looked up for the store credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKeys {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub endpoint: String,
}

impl Default for ConfigKeys {
    fn default() -> Self {
        Self {
            access_key: "s3_access_key".into(),
            secret_key: "s3_secret_key".into(),
            bucket: "s3_bucket".into(),
            endpoint: "s3_endpoint".into(),
        }
    }
}

/// Resolved store settings, built once and handed to the store client and
/// the binder.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Host used when building public URLs.
    pub endpoint: String,
}

impl StoreSettings {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
            endpoint: DEFAULT_ENDPOINT.into(),
        }
    }

    /// Look up access key, secret key and bucket; each must be present and
    /// non-empty. The endpoint is optional.
    pub fn resolve(source: &dyn ConfigSource, keys: &ConfigKeys) -> SaveableResult<Self> {
        let required = |setting: &str, key: &str| {
            source
                .get(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| SaveableError::missing_config(setting, key))
        };

        Ok(Self {
            access_key: required("access_key", &keys.access_key)?,
            secret_key: required("secret_key", &keys.secret_key)?,
            bucket: required("bucket", &keys.bucket)?,
            endpoint: source
                .get(&keys.endpoint)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.into()),
        })
    }
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
