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

//! Logging initialization.
//!
//! Logs go through the `log` facade and are emitted by `env_logger` in either its default console
//! layout or as one JSON object per line.  Outputs can be the standard streams or files, and files
//! can be rotated by size.

use crate::options::LogOptions;
use env_logger::{Builder, Env, Target, WriteStyle};
use log::{LevelFilter, Record};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

/// Number of bytes in a megabyte, the unit of the rotation size.
const MEGABYTE: u64 = 1024 * 1024;

/// Logging errors.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A log file could not be opened.
    #[error("Cannot open log file {0}: {1}")]
    Open(String, io::Error),

    /// The global logger could not be installed.
    #[error("Cannot initialize logging: {0}")]
    Init(String),
}

/// Maps a level name to a level filter.
///
/// `dpanic`, `panic` and `fatal` are accepted for compatibility and map to `error`.
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level {
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" => Some(LevelFilter::Warn),
        "error" | "dpanic" | "panic" | "fatal" => Some(LevelFilter::Error),
        _ => None,
    }
}

/// Renders `record` as a JSON object stamped with `ts`.
fn json_record(ts: OffsetDateTime, record: &Record<'_>) -> serde_json::Value {
    serde_json::json!({
        "ts": ts.format(&Rfc3339).unwrap_or_default(),
        "level": record.level().as_str().to_lowercase(),
        "target": record.target(),
        "msg": record.args().to_string(),
    })
}

/// A file that is renamed to a timestamped backup once it grows beyond a size limit.
pub struct RotatingFile {
    /// Path to the active log file.
    path: PathBuf,

    /// Size in bytes after which the file is rotated.
    max_size: u64,

    /// Maximum age of backups.  `None` keeps them forever.
    max_age: Option<Duration>,

    /// Maximum number of backups to keep.  Zero keeps all of them.
    max_backups: usize,

    /// Handle to the active log file.
    file: File,

    /// Current size of the active log file.
    size: u64,
}

/// Opens `path` for appending, creating it if necessary.
fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl RotatingFile {
    /// Opens the log file at `path` with the given rotation limits.
    pub fn open(
        path: PathBuf,
        max_size: u64,
        max_age: Option<Duration>,
        max_backups: usize,
    ) -> io::Result<Self> {
        let file = open_append(&path)?;
        let size = file.metadata()?.len();
        Ok(Self { path, max_size, max_age, max_backups, file, size })
    }

    /// Computes the path of a new backup of the active file.
    fn backup_path(&self) -> PathBuf {
        let ts = OffsetDateTime::now_utc()
            .format(format_description!(
                "[year][month][day]T[hour][minute][second].[subsecond digits:9]"
            ))
            .unwrap_or_default();
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}", ts));
        self.path.with_file_name(name)
    }

    /// Returns the existing backups of the active file, oldest first.
    fn backups(&self) -> io::Result<Vec<PathBuf>> {
        let Some(name) = self.path.file_name().and_then(|n| n.to_str()) else {
            return Ok(vec![]);
        };
        let prefix = format!("{}.", name);
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut backups = vec![];
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_name().to_str().is_some_and(|n| n.starts_with(&prefix)) {
                backups.push(entry.path());
            }
        }
        // Timestamps sort lexicographically.
        backups.sort();
        Ok(backups)
    }

    /// Deletes the backups that exceed the count or age limits.
    fn prune(&self) -> io::Result<()> {
        let mut backups = self.backups()?;

        if let Some(max_age) = self.max_age {
            let now = SystemTime::now();
            let mut kept = Vec::with_capacity(backups.len());
            for backup in backups {
                let modified = fs::metadata(&backup)?.modified()?;
                if now.duration_since(modified).unwrap_or_default() > max_age {
                    fs::remove_file(&backup)?;
                } else {
                    kept.push(backup);
                }
            }
            backups = kept;
        }

        if self.max_backups > 0 && backups.len() > self.max_backups {
            let excess = backups.len() - self.max_backups;
            for backup in &backups[..excess] {
                fs::remove_file(backup)?;
            }
        }

        Ok(())
    }

    /// Moves the active file to a backup and starts a new one.
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(&self.path, self.backup_path())?;
        self.file = open_append(&self.path)?;
        self.size = 0;
        self.prune()
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.size > 0 && self.size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Fans out every write to a collection of outputs.
struct Outputs(Vec<Box<dyn Write + Send>>);

impl Write for Outputs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for output in &mut self.0 {
            output.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for output in &mut self.0 {
            output.flush()?;
        }
        Ok(())
    }
}

/// Opens the output named `path`, which can be `stdout`, `stderr` or a file.
fn open_output(opts: &LogOptions, path: &str) -> Result<Box<dyn Write + Send>, LoggingError> {
    match path {
        "stdout" => Ok(Box::new(io::stdout())),
        "stderr" => Ok(Box::new(io::stderr())),
        path => {
            let open_error = |e| LoggingError::Open(path.to_owned(), e);
            if opts.enable_rotate {
                let max_age = match opts.rotate_max_age {
                    0 => None,
                    days => Some(Duration::from_secs(days * 24 * 60 * 60)),
                };
                let file = RotatingFile::open(
                    PathBuf::from(path),
                    opts.rotate_max_size.saturating_mul(MEGABYTE),
                    max_age,
                    opts.rotate_max_backups,
                )
                .map_err(open_error)?;
                Ok(Box::new(file))
            } else {
                Ok(Box::new(open_append(Path::new(path)).map_err(open_error)?))
            }
        }
    }
}

/// Computes the target for the configured outputs.
fn target(opts: &LogOptions) -> Result<Target, LoggingError> {
    match opts.output_paths.as_slice() {
        [] => Ok(Target::Stdout),
        [only] if only == "stdout" => Ok(Target::Stdout),
        [only] if only == "stderr" => Ok(Target::Stderr),
        paths => {
            let mut outputs = Vec::with_capacity(paths.len());
            for path in paths {
                outputs.push(open_output(opts, path)?);
            }
            Ok(Target::Pipe(Box::new(Outputs(outputs))))
        }
    }
}

/// Creates a logger builder for `opts`.
///
/// `RUST_LOG`, if set, refines the configured level.
pub fn builder(opts: &LogOptions) -> Result<Builder, LoggingError> {
    let mut builder = Builder::new();
    builder.filter_level(parse_level(&opts.level).unwrap_or(LevelFilter::Info));
    builder.parse_env(Env::default());

    builder.write_style(if opts.disable_color { WriteStyle::Never } else { WriteStyle::Auto });
    if opts.format == "json" {
        builder.format(|buf, record| {
            writeln!(buf, "{}", json_record(OffsetDateTime::now_utc(), record))
        });
    }

    builder.target(target(opts)?);
    Ok(builder)
}

/// Initializes the global logger from `opts`.
pub fn init(opts: &LogOptions) -> Result<(), LoggingError> {
    builder(opts)?.try_init().map_err(|e| LoggingError::Init(e.to_string()))
}
