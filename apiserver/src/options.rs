// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Runtime options of the API server.
//!
//! Options are layered: built-in defaults, then the YAML configuration file, then environment
//! variables prefixed with `APISERVER_`, and finally command-line flags (see the `cli` module).

use crate::middlewares::OPTIONAL_MIDDLEWARES;
use crate::server::{SecureServing, ServerConfig};
use derivative::Derivative;
#[cfg(feature = "postgres")]
use iii_iv_core::db::postgres::{DEFAULT_MAX_RETRIES, PostgresOptions};
#[cfg(feature = "sqlite")]
use iii_iv_core::db::sqlite::SqliteOptions;
use iii_iv_core::env::{get_optional_var, parse_duration};
use log::LevelFilter;
use serde::{Deserialize, Deserializer};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of all environment variables that override options.
pub const ENV_PREFIX: &str = "APISERVER";

/// Name of the configuration file looked up when none is given explicitly.
pub const DEFAULT_CONFIG_NAME: &str = "apiserver.yaml";

/// Errors raised while loading options.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OptionsError {
    /// The configuration file could not be read or parsed.
    #[error("Cannot load configuration file {0}: {1}")]
    Config(String, String),

    /// An environment variable could not be parsed.
    #[error("{0}")]
    Env(String),
}

/// Deserializes a duration given as a number of seconds or as a string with a unit suffix.
fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    /// Raw forms a duration can take in the configuration file.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        /// Plain number of seconds.
        Seconds(u64),

        /// Number followed by an optional unit.
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

/// Overrides `target` with the environment variable `APISERVER_<suffix>`, if present.
fn env_override<T>(target: &mut T, suffix: &str) -> Result<(), OptionsError>
where
    T: TryFrom<iii_iv_core::env::Value, Error = String>,
{
    if let Some(value) = get_optional_var::<T>(ENV_PREFIX, suffix).map_err(OptionsError::Env)? {
        *target = value;
    }
    Ok(())
}

/// Options of the generic server.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerOptions {
    /// Run mode: `debug`, `test` or `release`.
    pub mode: String,

    /// Whether to expose `/healthz` and ping it on startup.
    pub healthz: bool,

    /// Optional middlewares to install.
    pub middlewares: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { mode: "release".to_owned(), healthz: true, middlewares: vec![] }
    }
}

/// Options of the plain HTTP listener.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct InsecureOptions {
    /// Address to listen on, in `host:port` form.
    pub bind_address: String,
}

impl Default for InsecureOptions {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1:8080".to_owned() }
    }
}

/// Certificate files of the TLS listener.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct TlsOptions {
    /// Path to the PEM-encoded certificate chain.
    pub cert_file: String,

    /// Path to the PEM-encoded private key.
    pub private_key_file: String,
}

/// Options of the TLS listener.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SecureOptions {
    /// Address to listen on, without the port.
    pub bind_address: String,

    /// Port to listen on.  Zero disables the listener.
    pub bind_port: u16,

    /// Certificate files.  The listener is disabled unless both are set.
    pub tls: TlsOptions,
}

impl Default for SecureOptions {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_owned(), bind_port: 8443, tls: TlsOptions::default() }
    }
}

/// Options of the database connection.
#[derive(Clone, Deserialize, Derivative)]
#[derivative(Debug, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct DatabaseOptions {
    /// Database backend: `postgres` or `sqlite`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Host of the PostgreSQL server.
    pub host: String,

    /// Port of the PostgreSQL server.
    pub port: u16,

    /// Username to connect with.
    pub username: String,

    /// Password to connect with.
    #[derivative(Debug = "ignore")]
    pub password: String,

    /// Database name, or the connection string for SQLite.
    pub database: String,

    /// Maximum number of idle connections.  Must not exceed `max_open_connections`.
    ///
    /// The connection pools only cap open connections, so this is validated but otherwise unused.
    pub max_idle_connections: u32,

    /// Maximum number of open connections.
    pub max_open_connections: u32,

    /// Maximum lifetime of a connection before it is recycled.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_connection_life_time: Duration,

    /// Level at which to log statements: `silent`, `error`, `warn` or `info`.
    pub log_level: String,

    /// Whether to create the schema on startup.
    pub auto_migrate: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            kind: "postgres".to_owned(),
            host: "127.0.0.1".to_owned(),
            port: 5432,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            max_idle_connections: 100,
            max_open_connections: 100,
            max_connection_life_time: Duration::from_secs(120),
            log_level: "silent".to_owned(),
            auto_migrate: false,
        }
    }
}

impl DatabaseOptions {
    /// Maps the configured statement log level to a `log` filter.
    pub fn log_statements(&self) -> LevelFilter {
        match self.log_level.as_str() {
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            _ => LevelFilter::Off,
        }
    }

    /// Builds the connection options for a PostgreSQL database.
    #[cfg(feature = "postgres")]
    pub fn postgres_options(&self) -> PostgresOptions {
        PostgresOptions {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            min_connections: None,
            max_connections: Some(self.max_open_connections),
            max_lifetime: Some(self.max_connection_life_time),
            log_statements: self.log_statements(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Builds the connection options for an SQLite database.
    ///
    /// The `database` option holds the connection string.
    #[cfg(feature = "sqlite")]
    pub fn sqlite_options(&self) -> SqliteOptions {
        SqliteOptions {
            conn_str: self.database.clone(),
            min_connections: None,
            max_connections: Some(self.max_open_connections),
            max_lifetime: Some(self.max_connection_life_time),
            log_statements: self.log_statements(),
        }
    }
}

/// Optional features of the service.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct FeatureOptions {
    /// Whether to expose the CPU profiling endpoint.
    pub profiling: bool,

    /// Whether to record request metrics and expose `/metrics`.
    pub metrics: bool,

    /// Whether to record mutating requests as operation logs.
    pub operation_logging: bool,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self { profiling: false, metrics: true, operation_logging: false }
    }
}

/// Options of the logging subsystem.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct LogOptions {
    /// Minimum level to log.
    pub level: String,

    /// Output format: `console` or `json`.
    pub format: String,

    /// Whether to disable colors in the console format.
    pub disable_color: bool,

    /// Destinations: `stdout`, `stderr` or file paths.
    pub output_paths: Vec<String>,

    /// Whether to rotate file outputs.
    pub enable_rotate: bool,

    /// Maximum size of a log file before it is rotated, in megabytes.
    pub rotate_max_size: u64,

    /// Maximum age of rotated files, in days.  Zero keeps them forever.
    pub rotate_max_age: u64,

    /// Maximum number of rotated files to keep.  Zero keeps all of them.
    pub rotate_max_backups: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "console".to_owned(),
            disable_color: false,
            output_paths: vec!["stdout".to_owned()],
            enable_rotate: false,
            rotate_max_size: 100,
            rotate_max_age: 28,
            rotate_max_backups: 0,
        }
    }
}

/// All options of the API server.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Options {
    /// Generic server options.
    pub server: ServerOptions,

    /// Plain HTTP listener options.
    pub insecure: InsecureOptions,

    /// TLS listener options.
    pub secure: SecureOptions,

    /// Database options.
    pub database: DatabaseOptions,

    /// Feature toggles.
    pub feature: FeatureOptions,

    /// Logging options.
    pub log: LogOptions,
}

/// Looks for the default configuration file in the current directory and in `$HOME/.apiserver`.
pub fn find_config_file() -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from(".").join(DEFAULT_CONFIG_NAME)];
    if let Some(home) = env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(".apiserver").join(DEFAULT_CONFIG_NAME));
    }
    candidates.into_iter().find(|path| path.is_file())
}

impl Options {
    /// Loads the options from the defaults, the configuration file, if any, and the environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, OptionsError> {
        let mut opts = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        opts.apply_env()?;
        Ok(opts)
    }

    /// Reads the options from the YAML file at `path` on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self, OptionsError> {
        let config_error = |e: config::ConfigError| {
            OptionsError::Config(path.display().to_string(), e.to_string())
        };

        config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml).required(true))
            .build()
            .map_err(config_error)?
            .try_deserialize::<Options>()
            .map_err(config_error)
    }

    /// Overrides the options with any `APISERVER_*` environment variables that are set.
    pub fn apply_env(&mut self) -> Result<(), OptionsError> {
        env_override(&mut self.server.mode, "SERVER_MODE")?;
        env_override(&mut self.server.healthz, "SERVER_HEALTHZ")?;
        env_override(&mut self.server.middlewares, "SERVER_MIDDLEWARES")?;

        env_override(&mut self.insecure.bind_address, "INSECURE_BIND_ADDRESS")?;

        env_override(&mut self.secure.bind_address, "SECURE_BIND_ADDRESS")?;
        env_override(&mut self.secure.bind_port, "SECURE_BIND_PORT")?;
        env_override(&mut self.secure.tls.cert_file, "SECURE_TLS_CERT_FILE")?;
        env_override(&mut self.secure.tls.private_key_file, "SECURE_TLS_PRIVATE_KEY_FILE")?;

        env_override(&mut self.database.kind, "DATABASE_TYPE")?;
        env_override(&mut self.database.host, "DATABASE_HOST")?;
        env_override(&mut self.database.port, "DATABASE_PORT")?;
        env_override(&mut self.database.username, "DATABASE_USERNAME")?;
        env_override(&mut self.database.password, "DATABASE_PASSWORD")?;
        env_override(&mut self.database.database, "DATABASE_DATABASE")?;
        env_override(&mut self.database.max_idle_connections, "DATABASE_MAX_IDLE_CONNECTIONS")?;
        env_override(&mut self.database.max_open_connections, "DATABASE_MAX_OPEN_CONNECTIONS")?;
        env_override(
            &mut self.database.max_connection_life_time,
            "DATABASE_MAX_CONNECTION_LIFE_TIME",
        )?;
        env_override(&mut self.database.log_level, "DATABASE_LOG_LEVEL")?;
        env_override(&mut self.database.auto_migrate, "DATABASE_AUTO_MIGRATE")?;

        env_override(&mut self.feature.profiling, "FEATURE_PROFILING")?;
        env_override(&mut self.feature.metrics, "FEATURE_METRICS")?;
        env_override(&mut self.feature.operation_logging, "FEATURE_OPERATION_LOGGING")?;

        env_override(&mut self.log.level, "LOG_LEVEL")?;
        env_override(&mut self.log.format, "LOG_FORMAT")?;
        env_override(&mut self.log.disable_color, "LOG_DISABLE_COLOR")?;
        env_override(&mut self.log.output_paths, "LOG_OUTPUT_PATHS")?;
        env_override(&mut self.log.enable_rotate, "LOG_ENABLE_ROTATE")?;
        env_override(&mut self.log.rotate_max_size, "LOG_ROTATE_MAX_SIZE")?;
        env_override(&mut self.log.rotate_max_age, "LOG_ROTATE_MAX_AGE")?;
        env_override(&mut self.log.rotate_max_backups, "LOG_ROTATE_MAX_BACKUPS")?;

        Ok(())
    }

    /// Validates the options and returns all the problems found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];

        if !["debug", "test", "release"].contains(&self.server.mode.as_str()) {
            errors.push(format!(
                "server.mode: Unsupported value \"{}\": must be one of debug, test, release",
                self.server.mode
            ));
        }
        for name in &self.server.middlewares {
            if !OPTIONAL_MIDDLEWARES.contains(&name.as_str()) {
                errors.push(format!(
                    "server.middlewares: Unsupported value \"{}\": must be one of {}",
                    name,
                    OPTIONAL_MIDDLEWARES.join(", ")
                ));
            }
        }

        if self.secure.tls.cert_file.is_empty() != self.secure.tls.private_key_file.is_empty() {
            errors.push(
                "secure.tls: cert-file and private-key-file must be set together".to_owned(),
            );
        }

        if !["postgres", "sqlite"].contains(&self.database.kind.as_str()) {
            errors.push(format!(
                "database.type: Unsupported value \"{}\": must be one of postgres, sqlite",
                self.database.kind
            ));
        }
        if !["silent", "error", "warn", "info"].contains(&self.database.log_level.as_str()) {
            errors.push(format!(
                "database.log-level: Unsupported value \"{}\": must be one of silent, error, warn, \
                info",
                self.database.log_level
            ));
        }
        if self.database.max_idle_connections > self.database.max_open_connections {
            errors.push(format!(
                "database.max-idle-connections: Invalid value: {}: must not exceed \
                max-open-connections ({})",
                self.database.max_idle_connections, self.database.max_open_connections
            ));
        }

        if crate::logging::parse_level(&self.log.level).is_none() {
            errors.push(format!(
                "log.level: Unsupported value \"{}\": must be one of debug, info, warn, error, \
                dpanic, panic, fatal",
                self.log.level
            ));
        }
        if !["console", "json"].contains(&self.log.format.as_str()) {
            errors.push(format!(
                "log.format: Unsupported value \"{}\": must be one of console, json",
                self.log.format
            ));
        }
        for path in &self.log.output_paths {
            if path == "stdout" || path == "stderr" {
                continue;
            }
            let parent = match Path::new(path).parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            if !parent.is_dir() {
                errors.push(format!(
                    "log.output-paths: Invalid value \"{}\": directory {} does not exist",
                    path,
                    parent.display()
                ));
            }
        }

        errors
    }

    /// Builds the configuration of the generic server.
    pub fn server_config(&self) -> ServerConfig {
        let tls = &self.secure.tls;
        let secure = if self.secure.bind_port == 0 || tls.cert_file.is_empty() {
            None
        } else {
            Some(SecureServing {
                address: join_host_port(&self.secure.bind_address, self.secure.bind_port),
                cert_file: PathBuf::from(&tls.cert_file),
                key_file: PathBuf::from(&tls.private_key_file),
            })
        };

        ServerConfig {
            debug: self.server.mode == "debug",
            healthz: self.server.healthz,
            middlewares: self.server.middlewares.clone(),
            enable_metrics: self.feature.metrics,
            enable_profiling: self.feature.profiling,
            insecure_address: self.insecure.bind_address.clone(),
            secure,
        }
    }
}

/// Formats `host` and `port` as a listening address, bracketing IPv6 literals.
fn join_host_port(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{}:{}", host, port),
    }
}
