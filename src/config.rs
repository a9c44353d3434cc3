//! Configuration manager for the user service and its gateway.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

const POSTGRES_HOST_ENV: &str = "POSTGRES_HOST";
const POSTGRES_PORT_ENV: &str = "POSTGRES_PORT";
const POSTGRES_USER_ENV: &str = "POSTGRES_USER";
const POSTGRES_PASSWORD_ENV: &str = "POSTGRES_PASSWORD";
const POSTGRES_DB_ENV: &str = "POSTGRES_DB";
const SERVICE_PORT_ENV: &str = "USER_SERVICE_PORT";
const DEFAULT_POSTGRES_ADDRESS: &str = "localhost:5432";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Backend RPC server.
    #[serde(default)]
    pub rpc: Rpc,
    /// Edge HTTP gateway.
    #[serde(default)]
    pub gateway: Gateway,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
}

/// RPC server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rpc {
    /// Listening socket, `host:port`.
    pub address: String,
    /// Per-call timeout in seconds.
    pub timeout: u64,
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:50051".into(),
            timeout: 10,
        }
    }
}

impl Rpc {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gateway {
    /// Listening socket, `host:port`.
    pub address: String,
    /// Endpoint of the RPC server.
    pub upstream: String,
    /// Timeout in seconds for a round-trip to the upstream.
    pub timeout: u64,
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".into(),
            upstream: "http://localhost:50051/".into(),
            timeout: 5,
        }
    }
}

impl Gateway {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Configuration path taken from [`CONFIG_PATH_ENV`], if set.
    pub fn from_env(self) -> Self {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => self.path(PathBuf::from(path)),
            None => self,
        }
    }

    /// Normalizes an endpoint by ensuring it starts with a scheme (`http` by
    /// default) and ends with a slash.
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("http://{url}")
            };

        let mut parsed_url = Url::parse(&url_with_scheme)?;
        if !parsed_url.path().ends_with('/') {
            let path = format!("{}/", parsed_url.path());
            parsed_url.set_path(&path);
        }
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let config = match File::open(file_path) {
            Ok(file) => match serde_yaml::from_reader(file) {
                Ok(config) => self.finalize(config)?,
                Err(err) => self.error(err),
            },
            Err(err) => self.error(err),
        };

        Ok(Arc::new(config.apply_env(|key| std::env::var(key).ok())))
    }

    /// Overlay `POSTGRES_*` and `USER_SERVICE_PORT` variables on the document.
    ///
    /// Any PostgreSQL variable creates the `postgres` entry when the file has
    /// none, starting from `localhost:5432`.
    pub fn apply_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let host = var(POSTGRES_HOST_ENV);
        let port = var(POSTGRES_PORT_ENV);
        let username = var(POSTGRES_USER_ENV);
        let password = var(POSTGRES_PASSWORD_ENV);
        let database = var(POSTGRES_DB_ENV);

        let any_postgres = host.is_some()
            || port.is_some()
            || username.is_some()
            || password.is_some()
            || database.is_some();
        if any_postgres {
            let postgres = self.postgres.get_or_insert_with(|| Postgres {
                address: DEFAULT_POSTGRES_ADDRESS.into(),
                ..Default::default()
            });

            if host.is_some() || port.is_some() {
                let (current_host, current_port) = split_address(&postgres.address);
                let host = host.as_deref().unwrap_or(current_host);
                postgres.address = match port.as_deref().or(current_port) {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_owned(),
                };
            }
            if username.is_some() {
                postgres.username = username;
            }
            if password.is_some() {
                postgres.password = password;
            }
            if database.is_some() {
                postgres.database = database;
            }
        }

        if let Some(port) = var(SERVICE_PORT_ENV) {
            let (host, _) = split_address(&self.rpc.address);
            self.rpc.address = format!("{host}:{port}");
        }

        self
    }

    /// Parse a configuration from a YAML document.
    pub fn from_yaml(self, yaml: &str) -> Result<Arc<Self>, ConfigError> {
        let config: Configuration = serde_yaml::from_str(yaml)?;
        Ok(Arc::new(self.finalize(config)?))
    }

    fn finalize(
        &self,
        mut config: Configuration,
    ) -> Result<Self, url::ParseError> {
        // set app version.
        config.version = VERSION.to_owned();
        config.path = self.path.clone();

        // normalize URLs.
        config.gateway.upstream = self.normalize_url(&config.gateway.upstream)?;

        Ok(config)
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}

/// Split `host[:port]`.
fn split_address(address: &str) -> (&str, Option<&str>) {
    match address.rsplit_once(':') {
        Some((host, port))
            if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            (host, Some(port))
        },
        _ => (address, None),
    }
}

/// Errors raised while parsing a configuration document.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("URL is invalid: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to deserialize configuration: {0}")]
    Deserialize(#[from] serde_yaml::Error),
}
