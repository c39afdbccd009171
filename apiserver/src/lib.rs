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

//! REST service to manage users, with an optional audit trail of mutating requests.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use crate::driver::Driver;
use crate::options::{DatabaseOptions, Options};
use crate::server::GenericServer;
use futures::FutureExt;
use iii_iv_core::clocks::SystemClock;
use iii_iv_core::db::Db;
use iii_iv_core::shutdown::{GracefulShutdown, PosixSignalManager, ShutdownError, ShutdownFn};
use log::{error, info};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub mod cli;
pub(crate) mod db;
pub(crate) mod driver;
pub mod logging;
mod middlewares;
pub(crate) mod model;
pub mod options;
mod rest;
pub mod server;
pub mod version;

/// Opens the database described by `opts`.
async fn connect_db(opts: &DatabaseOptions) -> Result<Arc<dyn Db + Send + Sync>, Box<dyn Error>> {
    match opts.kind.as_str() {
        #[cfg(feature = "postgres")]
        "postgres" => {
            let db = iii_iv_core::db::postgres::PostgresDb::connect(opts.postgres_options())?;
            Ok(Arc::new(db))
        }

        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let db = iii_iv_core::db::sqlite::connect_with(opts.sqlite_options()).await?;
            Ok(Arc::new(db))
        }

        kind => Err(format!("Unsupported database type {}", kind).into()),
    }
}

/// Instantiates all resources described by `opts` and serves the application until a shutdown
/// request arrives.
///
/// While it'd be nice to push this responsibility to `main`, doing so would force us to expose many
/// crate-internal types to the public, which in turn would make dead code detection harder.
pub async fn serve(opts: Options) -> Result<(), Box<dyn Error>> {
    let shutdown = GracefulShutdown::new();
    shutdown.add_manager(Arc::new(PosixSignalManager::default()));
    shutdown.set_error_handler(Arc::new(|e: ShutdownError| error!("{}", e)));

    let db = connect_db(&opts.database).await?;
    if opts.database.auto_migrate {
        info!("Initializing database schema");
        db::init_schema(&mut db.ex().await?, opts.feature.operation_logging).await?;
    }

    let driver = Driver::new(db.clone(), Arc::new(SystemClock::default()));
    let app = rest::app(driver, opts.feature.operation_logging);
    let server = GenericServer::new(opts.server_config(), app);

    shutdown.add_callback(Arc::new(ShutdownFn({
        let server = server.clone();
        let db = db.clone();
        move |manager: String| {
            let server = server.clone();
            let db = db.clone();
            async move {
                info!("Stopping http servers on request from {}", manager);
                server.close().await;
                db.close().await;
                Ok(())
            }
            .boxed()
        }
    })));
    shutdown.start()?;

    server.run().await?;

    // Stopping the listeners is the first step of the shutdown, so let it complete.
    while shutdown.is_shutting_down() && !shutdown.is_finished() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}
