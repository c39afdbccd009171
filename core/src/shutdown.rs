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

//! Coordination of the graceful termination of a service.
//!
//! A `GracefulShutdown` holds a set of managers, which are the sources that can trigger the
//! shutdown (such as the reception of a POSIX signal), and a set of callbacks, which are the
//! cleanup actions to run once the shutdown starts (such as closing the database pool).
//!
//! When a manager triggers the shutdown, all callbacks run concurrently, each in its own task, and
//! the shutdown only finishes once all of them have returned.  A failing or panicking callback
//! does not prevent the others from running: its problem is handed to the error handler instead.

use async_trait::async_trait;
use futures::future::{self, BoxFuture};
use log::{debug, info, warn};
use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(unix)]
mod posix;
#[cfg(unix)]
pub use posix::PosixSignalManager;

/// Errors raised while starting or running a shutdown.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ShutdownError {
    /// A shutdown callback returned an error.
    #[error("Shutdown callback failed: {0}")]
    Callback(String),

    /// A shutdown callback panicked.
    #[error("Shutdown callback panicked: {0}")]
    CallbackPanic(String),

    /// A shutdown manager failed to start or to run one of its hooks.
    #[error("Shutdown manager {manager} failed: {message}")]
    Manager {
        /// Name of the manager that failed.
        manager: String,

        /// Description of the failure.
        message: String,
    },
}

/// Result type for this module.
pub type ShutdownResult<T> = Result<T, ShutdownError>;

/// Interface given to managers so that they can trigger the shutdown.
#[async_trait]
pub trait ShutdownHandle: Send + Sync {
    /// Runs the shutdown sequence on behalf of `manager`.
    async fn start_shutdown(&self, manager: Arc<dyn ShutdownManager>);

    /// Forwards `err` to the error handler.
    fn report_error(&self, err: ShutdownError);

    /// Registers an additional callback to run during shutdown.
    fn add_callback(&self, callback: Arc<dyn ShutdownCallback>);
}

/// A source of shutdown requests.
#[async_trait]
pub trait ShutdownManager: Send + Sync {
    /// Returns the name of the manager, which is passed to the callbacks.
    fn name(&self) -> &str;

    /// Starts listening for shutdown requests, which are delivered via `handle`.
    ///
    /// This must not block: any waiting must happen in a background task.
    fn start(self: Arc<Self>, handle: Arc<dyn ShutdownHandle>) -> ShutdownResult<()>;

    /// Hook invoked right before the shutdown callbacks run.
    async fn shutdown_start(&self) -> ShutdownResult<()>;

    /// Hook invoked after all shutdown callbacks have returned.
    async fn shutdown_finish(&self) -> ShutdownResult<()>;
}

/// A cleanup action to run when the service shuts down.
#[async_trait]
pub trait ShutdownCallback: Send + Sync {
    /// Runs the cleanup action for a shutdown triggered by the manager named `manager`.
    async fn on_shutdown(&self, manager: &str) -> ShutdownResult<()>;
}

/// Adapter to use a closure as a `ShutdownCallback`.
pub struct ShutdownFn<F>(pub F);

#[async_trait]
impl<F> ShutdownCallback for ShutdownFn<F>
where
    F: Fn(String) -> BoxFuture<'static, ShutdownResult<()>> + Send + Sync,
{
    async fn on_shutdown(&self, manager: &str) -> ShutdownResult<()> {
        (self.0)(manager.to_owned()).await
    }
}

/// Receiver of the errors that happen during a shutdown.
pub trait ErrorHandler: Send + Sync {
    /// Handles `err`.
    fn on_error(&self, err: ShutdownError);
}

impl<F> ErrorHandler for F
where
    F: Fn(ShutdownError) + Send + Sync,
{
    fn on_error(&self, err: ShutdownError) {
        self(err)
    }
}

/// The shutdown has not been started yet.
const IDLE: u8 = 0;

/// The managers have been started and are waiting for a shutdown request.
const STARTED: u8 = 1;

/// A manager requested the shutdown and the callbacks are running.
const SHUTTING_DOWN: u8 = 2;

/// All callbacks and the finish hook have run.
const FINISHED: u8 = 3;

/// Acquires `mutex` even if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Extracts a printable message from the payload of a panic.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Shared state of a `GracefulShutdown`.
#[derive(Default)]
struct Inner {
    /// Current state of the shutdown sequence.
    state: AtomicU8,

    /// Registered shutdown sources.
    managers: Mutex<Vec<Arc<dyn ShutdownManager>>>,

    /// Registered cleanup actions.
    callbacks: Mutex<Vec<Arc<dyn ShutdownCallback>>>,

    /// Receiver of errors, if any.
    error_handler: Mutex<Option<Arc<dyn ErrorHandler>>>,
}

/// Coordinator of shutdown managers and callbacks.
///
/// This is a cheap handle to shared state and can be freely cloned.
#[derive(Clone, Default)]
pub struct GracefulShutdown(Arc<Inner>);

impl GracefulShutdown {
    /// Creates a new coordinator without managers nor callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source of shutdown requests.
    pub fn add_manager(&self, manager: Arc<dyn ShutdownManager>) {
        lock(&self.0.managers).push(manager);
    }

    /// Registers a cleanup action.
    pub fn add_callback(&self, callback: Arc<dyn ShutdownCallback>) {
        lock(&self.0.callbacks).push(callback);
    }

    /// Sets the receiver of the errors that happen during the shutdown.
    pub fn set_error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        *lock(&self.0.error_handler) = Some(handler);
    }

    /// Starts all managers in registration order.
    ///
    /// The first manager that fails to start aborts the process and its error is returned.
    pub fn start(&self) -> ShutdownResult<()> {
        let _ = self.0.state.compare_exchange(IDLE, STARTED, Ordering::SeqCst, Ordering::SeqCst);

        let managers = lock(&self.0.managers).clone();
        for manager in managers {
            debug!("Starting shutdown manager {}", manager.name());
            manager.start(Arc::new(self.clone()))?;
        }
        Ok(())
    }

    /// Runs the shutdown sequence on behalf of `manager`.
    ///
    /// Only the first request has any effect.  Later requests, while the shutdown is in progress
    /// or after it finished, are ignored.
    pub async fn start_shutdown(&self, manager: Arc<dyn ShutdownManager>) {
        let name = manager.name().to_owned();
        let transition = self.0.state.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
            if state < SHUTTING_DOWN { Some(SHUTTING_DOWN) } else { None }
        });
        if transition.is_err() {
            warn!("Ignoring shutdown request from {}: shutdown already in progress", name);
            return;
        }

        info!("Shutdown requested by {}", name);
        if let Err(e) = manager.shutdown_start().await {
            self.report_error(e);
        }

        let callbacks = lock(&self.0.callbacks).clone();
        let tasks = callbacks.into_iter().map(|callback| {
            let name = name.clone();
            tokio::spawn(async move { callback.on_shutdown(&name).await })
        });
        for result in future::join_all(tasks).await {
            match result {
                Ok(Ok(())) => (),
                Ok(Err(e)) => self.report_error(e),
                Err(e) if e.is_panic() => {
                    self.report_error(ShutdownError::CallbackPanic(panic_message(e.into_panic())))
                }
                Err(e) => self.report_error(ShutdownError::Callback(e.to_string())),
            }
        }

        if let Err(e) = manager.shutdown_finish().await {
            self.report_error(e);
        }
        self.0.state.store(FINISHED, Ordering::SeqCst);
        info!("Shutdown complete");
    }

    /// Forwards `err` to the error handler, if any.
    pub fn report_error(&self, err: ShutdownError) {
        let handler = lock(&self.0.error_handler).clone();
        match handler {
            Some(handler) => handler.on_error(err),
            None => debug!("Ignoring shutdown error: {}", err),
        }
    }

    /// Returns true once a shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.0.state.load(Ordering::SeqCst) >= SHUTTING_DOWN
    }

    /// Returns true once the shutdown sequence has completed.
    pub fn is_finished(&self) -> bool {
        self.0.state.load(Ordering::SeqCst) == FINISHED
    }
}

#[async_trait]
impl ShutdownHandle for GracefulShutdown {
    async fn start_shutdown(&self, manager: Arc<dyn ShutdownManager>) {
        GracefulShutdown::start_shutdown(self, manager).await
    }

    fn report_error(&self, err: ShutdownError) {
        GracefulShutdown::report_error(self, err)
    }

    fn add_callback(&self, callback: Arc<dyn ShutdownCallback>) {
        GracefulShutdown::add_callback(self, callback)
    }
}

/// Test utilities for shutdown coordination.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;

    /// An error handler that records every error it gets.
    #[derive(Default)]
    pub struct RecordingErrorHandler(Mutex<Vec<ShutdownError>>);

    impl RecordingErrorHandler {
        /// Returns a copy of the errors recorded so far.
        pub fn errors(&self) -> Vec<String> {
            lock(&self.0).iter().map(ShutdownError::to_string).collect()
        }
    }

    impl ErrorHandler for RecordingErrorHandler {
        fn on_error(&self, err: ShutdownError) {
            lock(&self.0).push(err);
        }
    }

    /// A callback that records the names of the managers that invoked it.
    #[derive(Default)]
    pub struct RecordingCallback(Mutex<Vec<String>>);

    impl RecordingCallback {
        /// Returns the names of the managers that invoked this callback.
        pub fn calls(&self) -> Vec<String> {
            lock(&self.0).clone()
        }
    }

    #[async_trait]
    impl ShutdownCallback for RecordingCallback {
        async fn on_shutdown(&self, manager: &str) -> ShutdownResult<()> {
            lock(&self.0).push(manager.to_owned());
            Ok(())
        }
    }
}
