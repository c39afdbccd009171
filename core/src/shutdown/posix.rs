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

//! Shutdown manager triggered by POSIX signals.

use crate::shutdown::{ShutdownError, ShutdownHandle, ShutdownManager, ShutdownResult};
use async_trait::async_trait;
use futures::future;
use log::info;
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};

/// Name of the POSIX signal manager as passed to the shutdown callbacks.
pub const NAME: &str = "PosixSignalManager";

/// A shutdown manager that starts the shutdown when the process receives one of a set of signals.
///
/// Once the shutdown completes, the manager terminates the process with a success exit code.
pub struct PosixSignalManager {
    /// Signals that trigger the shutdown.
    signals: Vec<SignalKind>,

    /// Whether to exit the process once the shutdown finishes.
    exit_on_finish: bool,
}

impl Default for PosixSignalManager {
    fn default() -> Self {
        Self::new(vec![])
    }
}

impl PosixSignalManager {
    /// Creates a manager that listens for `signals`, or for `SIGINT` and `SIGTERM` if empty.
    pub fn new(signals: Vec<SignalKind>) -> Self {
        let signals = if signals.is_empty() {
            vec![SignalKind::interrupt(), SignalKind::terminate()]
        } else {
            signals
        };
        Self { signals, exit_on_finish: true }
    }

    /// Makes the manager return from the finish hook instead of exiting the process.
    pub fn without_exit(mut self) -> Self {
        self.exit_on_finish = false;
        self
    }

    /// Returns the signals this manager listens for.
    pub fn signals(&self) -> &[SignalKind] {
        &self.signals
    }
}

#[async_trait]
impl ShutdownManager for PosixSignalManager {
    fn name(&self) -> &str {
        NAME
    }

    fn start(self: Arc<Self>, handle: Arc<dyn ShutdownHandle>) -> ShutdownResult<()> {
        let mut listeners = Vec::with_capacity(self.signals.len());
        for kind in &self.signals {
            let listener = signal(*kind).map_err(|e| ShutdownError::Manager {
                manager: NAME.to_owned(),
                message: format!("Cannot listen for signal {}: {}", kind.as_raw_value(), e),
            })?;
            listeners.push(listener);
        }

        tokio::spawn(async move {
            {
                let received = listeners.iter_mut().map(|listener| Box::pin(listener.recv()));
                let _ = future::select_all(received).await;
            }
            info!("Received termination signal");
            handle.start_shutdown(self).await;
        });
        Ok(())
    }

    async fn shutdown_start(&self) -> ShutdownResult<()> {
        Ok(())
    }

    async fn shutdown_finish(&self) -> ShutdownResult<()> {
        if self.exit_on_finish {
            process::exit(0);
        }
        Ok(())
    }
}
