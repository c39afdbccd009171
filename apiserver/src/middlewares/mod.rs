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

//! HTTP middlewares installed around the service's routes.
//!
//! The default middlewares are always installed by the server, outermost first: panic recovery,
//! access logging, request identifiers and, if enabled, metrics.  Other middlewares are
//! installed on demand by name.

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderMap, Uri};
use log::{info, warn};
use std::net::SocketAddr;

mod dump;
mod headers;
mod http_metrics;
mod logger;
pub(crate) mod operation_log;
mod recovery;
pub(crate) mod request_id;

/// Names of the middlewares that can be installed on demand.
pub const OPTIONAL_MIDDLEWARES: &[&str] = &["cors", "dump", "nocache", "options", "secure"];

/// Largest request or response body that a middleware reads into memory.
pub(crate) const MAX_BUFFERED_BODY: usize = 2 * 1024 * 1024;

/// Request extension that marks requests received by the TLS listener.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ServedOverTls;

/// Gets the value of the `name` header as a string, or an empty string if it is missing or is
/// not valid text.
pub(crate) fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned()
}

/// Determines the address of the client that issued `req`.
///
/// Proxy headers take precedence over the address of the peer.
pub(crate) fn client_ip(req: &Request) -> String {
    let forwarded = header_string(req.headers(), "x-forwarded-for");
    if let Some(ip) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
        return ip.to_owned();
    }

    let real_ip = header_string(req.headers(), "x-real-ip");
    if !real_ip.trim().is_empty() {
        return real_ip.trim().to_owned();
    }

    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip().to_string(),
        None => String::new(),
    }
}

/// Reads all of `body` into memory, failing if it exceeds `MAX_BUFFERED_BODY`.
pub(crate) async fn buffer_body(body: Body) -> Result<Bytes, axum::Error> {
    axum::body::to_bytes(body, MAX_BUFFERED_BODY).await
}

/// Creates a body out of fully-read `bytes`.
pub(crate) fn body_from(bytes: &Bytes) -> Body {
    if bytes.is_empty() { Body::empty() } else { Body::from(bytes.clone()) }
}

/// Returns the path of `uri` including its query string, if any.
pub(crate) fn request_path(uri: &Uri) -> String {
    match uri.path_and_query() {
        Some(path_and_query) => path_and_query.as_str().to_owned(),
        None => uri.path().to_owned(),
    }
}

/// Wraps `router` with the middlewares that every server carries.
///
/// `debug` exposes panic details in responses and `metrics` enables request metrics.
pub(crate) fn install_defaults(router: Router, debug: bool, metrics: bool) -> Router {
    info!("Installing default middlewares: recovery, logger, requestid");

    let router = if metrics {
        router.layer(axum::middleware::from_fn(http_metrics::track))
    } else {
        router
    };
    router
        .layer(axum::middleware::from_fn(request_id::inject))
        .layer(axum::middleware::from_fn(logger::log_access))
        .layer(recovery::layer(debug))
}

/// Wraps `router` with the optional middlewares in `names`, the first one being the outermost.
///
/// Unknown names are skipped with a warning.
pub(crate) fn install_optional(mut router: Router, names: &[String]) -> Router {
    for name in names.iter().rev() {
        router = match name.as_str() {
            "cors" => router.layer(headers::cors()),
            "dump" => router.layer(axum::middleware::from_fn(dump::dump)),
            "nocache" => router.layer(axum::middleware::from_fn(headers::nocache)),
            "options" => router.layer(axum::middleware::from_fn(headers::options)),
            "secure" => headers::install_secure(router),
            _ => {
                warn!("Cannot find middleware {}", name);
                continue;
            }
        };
        info!("Installed custom middleware {}", name);
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_client_ip_forwarded_for() {
        let req = Request::builder()
            .header("X-Forwarded-For", " 10.0.0.1 , 10.0.0.2")
            .header("X-Real-Ip", "10.0.0.3")
            .body(Body::empty())
            .unwrap();
        assert_eq!("10.0.0.1", client_ip(&req));
    }

    #[test]
    fn test_client_ip_real_ip() {
        let req = Request::builder().header("X-Real-Ip", "10.0.0.3").body(Body::empty()).unwrap();
        assert_eq!("10.0.0.3", client_ip(&req));
    }

    #[test]
    fn test_client_ip_peer() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!("", client_ip(&req));

        req.extensions_mut().insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 5], 1234))));
        assert_eq!("192.168.1.5", client_ip(&req));
    }

    #[test]
    fn test_request_path() {
        assert_eq!("/v1/users", request_path(&Uri::from_static("/v1/users")));
        assert_eq!("/v1/users?name=a", request_path(&Uri::from_static("/v1/users?name=a")));
        assert_eq!("/x", request_path(&Uri::from_static("http://localhost/x")));
    }
}
