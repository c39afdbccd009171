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

//! Entry point to the API server.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use clap::Parser;
use iii_iv_apiserver::cli::{Cli, VersionFlag};
use iii_iv_apiserver::options::{self, Options};
use iii_iv_apiserver::version::Info;
use iii_iv_apiserver::{logging, serve};
use log::{error, info, warn};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.version {
        Some(VersionFlag::True) => {
            println!("{}", Info::get());
            return ExitCode::SUCCESS;
        }
        Some(VersionFlag::Raw) => {
            match serde_json::to_string_pretty(&Info::get()) {
                Ok(raw) => println!("{}", raw),
                Err(e) => {
                    eprintln!("apiserver: {}", e);
                    return ExitCode::FAILURE;
                }
            }
            return ExitCode::SUCCESS;
        }
        Some(VersionFlag::False) | None => (),
    }

    let config_file = cli.config.clone().or_else(options::find_config_file);
    let mut opts = match Options::load(config_file.as_deref()) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("apiserver: {}", e);
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut opts);

    let errors = opts.validate();
    if !errors.is_empty() {
        for e in errors {
            eprintln!("apiserver: {}", e);
        }
        return ExitCode::FAILURE;
    }

    if let Err(e) = logging::init(&opts.log) {
        eprintln!("apiserver: {}", e);
        return ExitCode::FAILURE;
    }
    match config_file {
        Some(path) => info!("Using configuration file {}", path.display()),
        None => warn!(
            "Configuration file {} not found; using defaults",
            options::DEFAULT_CONFIG_NAME
        ),
    }

    match serve(opts).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
