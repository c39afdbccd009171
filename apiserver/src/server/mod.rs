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

//! Generic HTTP server that hosts the service's router.
//!
//! The server adds the operational endpoints and the default middlewares around the service's
//! routes and serves them over plain HTTP and, optionally, over TLS.

use crate::middlewares::{self, ServedOverTls};
use crate::version;
use axum::extract::Extension;
use axum::routing::get;
use axum::{Json, Router};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use iii_iv_core::rest::{Envelope, RestError, ok};
use log::{info, warn};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

mod profiling;

/// Maximum time to wait for the server to answer its first health check.
const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between health checks while waiting for the server to come up.
const PING_INTERVAL: Duration = Duration::from_secs(1);

/// Grace period given to in-flight requests when closing the server.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Delay between checks for open connections while closing the server.
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Indicates that a listening address could not be resolved.
    #[error("Cannot resolve address {0}: {1}")]
    Address(String, String),

    /// Indicates that the server did not answer health checks in time.
    #[error("Cannot ping http server within {0:?}")]
    PingTimeout(Duration),

    /// Indicates that a listener failed while serving.
    #[error("{0} server failed: {1}")]
    Serve(&'static str, String),

    /// Indicates that the TLS certificate or key could not be loaded.
    #[error("Cannot load TLS configuration: {0}")]
    Tls(String),
}

/// Result type for this module.
pub type ServerResult<T> = Result<T, ServerError>;

/// TLS listener configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct SecureServing {
    /// Address to listen on, in `host:port` form.
    pub address: String,

    /// Path to the PEM-encoded certificate chain.
    pub cert_file: PathBuf,

    /// Path to the PEM-encoded private key.
    pub key_file: PathBuf,
}

/// Configuration of the generic server.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Whether to expose panic details in responses.
    pub debug: bool,

    /// Whether to expose `/healthz` and ping it on startup.
    pub healthz: bool,

    /// Names of the optional middlewares to install.
    pub middlewares: Vec<String>,

    /// Whether to record request metrics and expose `/metrics`.
    pub enable_metrics: bool,

    /// Whether to expose the CPU profiling endpoint.
    pub enable_profiling: bool,

    /// Address of the plain HTTP listener, in `host:port` form.
    pub insecure_address: String,

    /// Configuration of the TLS listener, if enabled.
    pub secure: Option<SecureServing>,
}

/// Returns the Prometheus handle of the process, installing the recorder on first use.
fn prometheus_handle() -> PrometheusHandle {
    /// Handle to the recorder installed by the first caller.
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                warn!("Cannot install the Prometheus recorder: {}", e);
            }
            handle
        })
        .clone()
}

/// Body of the health check response.
#[derive(Serialize)]
struct Health {
    /// Always `ok`.
    status: &'static str,
}

/// GET handler for the health check.
async fn healthz() -> Json<Envelope<Health>> {
    ok(Health { status: "ok" })
}

/// GET handler for the version information.
async fn version() -> Json<Envelope<version::Info>> {
    ok(version::Info::get())
}

/// Fallback handler for any route that does not exist.
async fn page_not_found() -> RestError {
    RestError::PageNotFound
}

/// Resolves `address` into the first socket address it maps to.
async fn resolve(address: &str) -> ServerResult<SocketAddr> {
    let mut addrs = tokio::net::lookup_host(address)
        .await
        .map_err(|e| ServerError::Address(address.to_owned(), e.to_string()))?;
    addrs
        .next()
        .ok_or_else(|| ServerError::Address(address.to_owned(), "no addresses found".to_owned()))
}

/// Computes the address to ping for a server listening on `addr`.
fn ping_address(mut addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        IpAddr::V6(ip) if ip.is_unspecified() => addr.set_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)),
        _ => (),
    }
    addr
}

/// The generic HTTP server.
#[derive(Clone)]
pub struct GenericServer {
    /// Configuration of the server.
    config: ServerConfig,

    /// Fully-assembled router, including operational endpoints and middlewares.
    router: Router,

    /// Handle to control the plain HTTP listener.
    insecure_handle: Handle,

    /// Handle to control the TLS listener.
    secure_handle: Handle,
}

impl GenericServer {
    /// Creates a new server that serves `app` according to `config`.
    pub fn new(config: ServerConfig, app: Router) -> Self {
        let mut router = Router::new();
        if config.healthz {
            router = router.route("/healthz", get(healthz));
        }
        router = router.route("/version", get(version));
        if config.enable_metrics {
            let handle = prometheus_handle();
            router = router.route("/metrics", get(move || async move { handle.render() }));
        }
        if config.enable_profiling {
            router = router.route("/debug/pprof/profile", get(profiling::profile));
        }
        let router = router.merge(app).fallback(page_not_found);

        let router = middlewares::install_optional(router, &config.middlewares);
        let router = middlewares::install_defaults(router, config.debug, config.enable_metrics);

        Self { config, router, insecure_handle: Handle::new(), secure_handle: Handle::new() }
    }

    /// Gets a copy of the fully-assembled router.
    #[cfg(test)]
    pub(crate) fn router(&self) -> Router {
        self.router.clone()
    }

    /// Waits for the plain HTTP listener to be bound and returns its address.
    ///
    /// Returns `None` if the listener failed to start.
    pub async fn insecure_address(&self) -> Option<SocketAddr> {
        self.insecure_handle.listening().await
    }

    /// Runs the plain HTTP listener until it is closed.
    async fn serve_insecure(&self) -> ServerResult<()> {
        let addr = resolve(&self.config.insecure_address).await?;
        info!("Listening on http address {}", addr);

        axum_server::bind(addr)
            .handle(self.insecure_handle.clone())
            .serve(self.router.clone().into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| ServerError::Serve("http", e.to_string()))?;

        info!("http server on {} stopped", addr);
        Ok(())
    }

    /// Runs the TLS listener, if configured, until it is closed.
    async fn serve_secure(&self) -> ServerResult<()> {
        let Some(secure) = &self.config.secure else {
            return Ok(());
        };

        let tls = RustlsConfig::from_pem_file(&secure.cert_file, &secure.key_file)
            .await
            .map_err(|e| ServerError::Tls(e.to_string()))?;
        let addr = resolve(&secure.address).await?;
        info!("Listening on https address {}", addr);

        let router = self.router.clone().layer(Extension(ServedOverTls));
        axum_server::bind_rustls(addr, tls)
            .handle(self.secure_handle.clone())
            .serve(router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| ServerError::Serve("https", e.to_string()))?;

        info!("https server on {} stopped", addr);
        Ok(())
    }

    /// Pings the plain HTTP listener until it answers its health check.
    async fn ping(&self) -> ServerResult<()> {
        if !self.config.healthz {
            return Ok(());
        }

        let wait = async {
            let Some(addr) = self.insecure_handle.listening().await else {
                // The listener failed to bind and its own future reports why.
                return;
            };
            let url = format!("http://{}/healthz", ping_address(addr));
            let client = reqwest::Client::new();
            loop {
                match client.get(&url).timeout(PING_INTERVAL).send().await {
                    Ok(response) if response.status() == reqwest::StatusCode::OK => {
                        info!("The router has been deployed successfully");
                        return;
                    }
                    _ => {
                        info!("Waiting for the router, retry in 1 second");
                        tokio::time::sleep(PING_INTERVAL).await;
                    }
                }
            }
        };
        tokio::time::timeout(PING_TIMEOUT, wait).await.map_err(|_| ServerError::PingTimeout(PING_TIMEOUT))
    }

    /// Runs the server until it is closed.
    ///
    /// Returns the first error raised by any of the listeners or by the startup health check.
    pub async fn run(&self) -> ServerResult<()> {
        info!("Application pid is {}", std::process::id());
        tokio::try_join!(self.serve_insecure(), self.serve_secure(), self.ping())?;
        Ok(())
    }

    /// Counts the connections open across all listeners.
    fn open_connections(&self) -> usize {
        self.insecure_handle.connection_count() + self.secure_handle.connection_count()
    }

    /// Stops all listeners and waits for their in-flight requests to complete.
    ///
    /// Connections still open after the grace period are dropped.
    pub async fn close(&self) {
        self.secure_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        self.insecure_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));

        let drain = async {
            while self.open_connections() > 0 {
                tokio::time::sleep(DRAIN_INTERVAL).await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("Dropping connections still open after {:?}", SHUTDOWN_GRACE);
        }
    }
}
