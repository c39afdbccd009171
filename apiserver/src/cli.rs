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

//! Command-line interface of the API server.
//!
//! Every option key has a flag with the same dotted name, such as `--server.mode`, and flags take
//! precedence over the configuration file and the environment.

use crate::options::Options;
use clap::{Parser, ValueEnum};
use iii_iv_core::env::parse_duration;
use std::path::PathBuf;
use std::time::Duration;

/// Ways of printing the version information.
#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum VersionFlag {
    /// Print the version table.
    True,

    /// Do not print the version.
    False,

    /// Print the version information as JSON.
    Raw,
}

/// Command-line flags of the API server.
#[derive(Debug, Parser)]
#[command(name = "apiserver", about = "User management API server", disable_version_flag = true)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print version information and quit.
    #[arg(short = 'V', long, num_args = 0..=1, default_missing_value = "true", value_enum)]
    pub version: Option<VersionFlag>,

    /// Run mode: debug, test or release.
    #[arg(long = "server.mode")]
    server_mode: Option<String>,

    /// Expose /healthz and ping it on startup.
    #[arg(long = "server.healthz", num_args = 0..=1, default_missing_value = "true")]
    server_healthz: Option<bool>,

    /// Comma-separated list of optional middlewares.
    #[arg(long = "server.middlewares", value_delimiter = ',')]
    server_middlewares: Option<Vec<String>>,

    /// Address of the plain HTTP listener.
    #[arg(long = "insecure.bind-address")]
    insecure_bind_address: Option<String>,

    /// Address of the TLS listener.
    #[arg(long = "secure.bind-address")]
    secure_bind_address: Option<String>,

    /// Port of the TLS listener; 0 disables it.
    #[arg(long = "secure.bind-port")]
    secure_bind_port: Option<u16>,

    /// PEM-encoded certificate chain for TLS.
    #[arg(long = "secure.tls.cert-file")]
    secure_tls_cert_file: Option<String>,

    /// PEM-encoded private key for TLS.
    #[arg(long = "secure.tls.private-key-file")]
    secure_tls_private_key_file: Option<String>,

    /// Database backend: postgres or sqlite.
    #[arg(long = "database.type")]
    database_type: Option<String>,

    /// Database host.
    #[arg(long = "database.host")]
    database_host: Option<String>,

    /// Database port.
    #[arg(long = "database.port")]
    database_port: Option<u16>,

    /// Database username.
    #[arg(long = "database.username")]
    database_username: Option<String>,

    /// Database password.
    #[arg(long = "database.password")]
    database_password: Option<String>,

    /// Database name, or the connection string for SQLite.
    #[arg(long = "database.database")]
    database_database: Option<String>,

    /// Maximum number of idle connections.
    #[arg(long = "database.max-idle-connections")]
    database_max_idle_connections: Option<u32>,

    /// Maximum number of open connections.
    #[arg(long = "database.max-open-connections")]
    database_max_open_connections: Option<u32>,

    /// Maximum lifetime of a connection, such as 120s.
    #[arg(long = "database.max-connection-life-time", value_parser = parse_duration)]
    database_max_connection_life_time: Option<Duration>,

    /// Statement log level: silent, error, warn or info.
    #[arg(long = "database.log-level")]
    database_log_level: Option<String>,

    /// Create the schema on startup.
    #[arg(long = "database.auto-migrate", num_args = 0..=1, default_missing_value = "true")]
    database_auto_migrate: Option<bool>,

    /// Expose the CPU profiling endpoint.
    #[arg(long = "feature.profiling", num_args = 0..=1, default_missing_value = "true")]
    feature_profiling: Option<bool>,

    /// Record request metrics and expose /metrics.
    #[arg(long = "feature.metrics", num_args = 0..=1, default_missing_value = "true")]
    feature_metrics: Option<bool>,

    /// Record mutating requests as operation logs.
    #[arg(long = "feature.operation-logging", num_args = 0..=1, default_missing_value = "true")]
    feature_operation_logging: Option<bool>,

    /// Minimum log level.
    #[arg(long = "log.level")]
    log_level: Option<String>,

    /// Log format: console or json.
    #[arg(long = "log.format")]
    log_format: Option<String>,

    /// Disable colors in console logs.
    #[arg(long = "log.disable-color", num_args = 0..=1, default_missing_value = "true")]
    log_disable_color: Option<bool>,

    /// Comma-separated list of log outputs: stdout, stderr or file paths.
    #[arg(long = "log.output-paths", value_delimiter = ',')]
    log_output_paths: Option<Vec<String>>,

    /// Rotate log files.
    #[arg(long = "log.enable-rotate", num_args = 0..=1, default_missing_value = "true")]
    log_enable_rotate: Option<bool>,

    /// Size in megabytes after which a log file is rotated.
    #[arg(long = "log.rotate-max-size")]
    log_rotate_max_size: Option<u64>,

    /// Days to keep rotated log files.
    #[arg(long = "log.rotate-max-age")]
    log_rotate_max_age: Option<u64>,

    /// Number of rotated log files to keep.
    #[arg(long = "log.rotate-max-backups")]
    log_rotate_max_backups: Option<usize>,
}

/// Replaces `target` with `value` if the flag was given.
fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl Cli {
    /// Overrides `opts` with the flags given on the command line.
    pub fn apply(self, opts: &mut Options) {
        set(&mut opts.server.mode, self.server_mode);
        set(&mut opts.server.healthz, self.server_healthz);
        set(&mut opts.server.middlewares, self.server_middlewares);

        set(&mut opts.insecure.bind_address, self.insecure_bind_address);

        set(&mut opts.secure.bind_address, self.secure_bind_address);
        set(&mut opts.secure.bind_port, self.secure_bind_port);
        set(&mut opts.secure.tls.cert_file, self.secure_tls_cert_file);
        set(&mut opts.secure.tls.private_key_file, self.secure_tls_private_key_file);

        set(&mut opts.database.kind, self.database_type);
        set(&mut opts.database.host, self.database_host);
        set(&mut opts.database.port, self.database_port);
        set(&mut opts.database.username, self.database_username);
        set(&mut opts.database.password, self.database_password);
        set(&mut opts.database.database, self.database_database);
        set(&mut opts.database.max_idle_connections, self.database_max_idle_connections);
        set(&mut opts.database.max_open_connections, self.database_max_open_connections);
        set(&mut opts.database.max_connection_life_time, self.database_max_connection_life_time);
        set(&mut opts.database.log_level, self.database_log_level);
        set(&mut opts.database.auto_migrate, self.database_auto_migrate);

        set(&mut opts.feature.profiling, self.feature_profiling);
        set(&mut opts.feature.metrics, self.feature_metrics);
        set(&mut opts.feature.operation_logging, self.feature_operation_logging);

        set(&mut opts.log.level, self.log_level);
        set(&mut opts.log.format, self.log_format);
        set(&mut opts.log.disable_color, self.log_disable_color);
        set(&mut opts.log.output_paths, self.log_output_paths);
        set(&mut opts.log.enable_rotate, self.log_enable_rotate);
        set(&mut opts.log.rotate_max_size, self.log_rotate_max_size);
        set(&mut opts.log.rotate_max_age, self.log_rotate_max_age);
        set(&mut opts.log.rotate_max_backups, self.log_rotate_max_backups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parses `args` as if they were given after the program name.
    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["apiserver"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_no_flags_keeps_options() {
        let cli = parse(&[]);
        assert_eq!(None, cli.config);
        assert_eq!(None, cli.version);

        let mut opts = Options::default();
        cli.apply(&mut opts);
        assert_eq!(Options::default(), opts);
    }

    #[test]
    fn test_config_flag() {
        assert_eq!(Some(PathBuf::from("a.yaml")), parse(&["-c", "a.yaml"]).config);
        assert_eq!(Some(PathBuf::from("b.yaml")), parse(&["--config", "b.yaml"]).config);
    }

    #[test]
    fn test_version_flag() {
        assert_eq!(Some(VersionFlag::True), parse(&["-V"]).version);
        assert_eq!(Some(VersionFlag::True), parse(&["--version"]).version);
        assert_eq!(Some(VersionFlag::Raw), parse(&["--version=raw"]).version);
        assert_eq!(Some(VersionFlag::False), parse(&["--version=false"]).version);
        assert!(Cli::try_parse_from(["apiserver", "--version=other"]).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let cli = parse(&[
            "--server.mode",
            "debug",
            "--server.middlewares",
            "cors,nocache",
            "--secure.bind-port=0",
            "--database.type",
            "sqlite",
            "--database.max-connection-life-time",
            "2m",
            "--database.auto-migrate",
            "--feature.metrics=false",
            "--log.output-paths",
            "stdout,/tmp/app.log",
        ]);

        let mut opts = Options::default();
        cli.apply(&mut opts);

        assert_eq!("debug", opts.server.mode);
        assert_eq!(vec!["cors".to_owned(), "nocache".to_owned()], opts.server.middlewares);
        assert_eq!(0, opts.secure.bind_port);
        assert_eq!("sqlite", opts.database.kind);
        assert_eq!(Duration::from_secs(120), opts.database.max_connection_life_time);
        assert!(opts.database.auto_migrate);
        assert!(!opts.feature.metrics);
        assert_eq!(
            vec!["stdout".to_owned(), "/tmp/app.log".to_owned()],
            opts.log.output_paths
        );
        assert_eq!("127.0.0.1:8080", opts.insecure.bind_address);
    }

    #[test]
    fn test_bad_values() {
        assert!(Cli::try_parse_from(["apiserver", "--database.port", "http"]).is_err());
        assert!(
            Cli::try_parse_from(["apiserver", "--database.max-connection-life-time", "3d"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["apiserver", "--unknown"]).is_err());
    }
}
