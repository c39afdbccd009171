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

//! Middleware to log the headers and bodies of requests and responses.
//!
//! Whole bodies are read into memory, so this is only meant for debugging.

use crate::middlewares::{body_from, buffer_body};
use axum::body::Bytes;
use axum::extract::Request;
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use iii_iv_core::rest::RestError;
use log::info;
use std::collections::BTreeMap;

/// Formats `headers` as a JSON object that maps names to their values, leaving cookies out.
fn format_headers(headers: &HeaderMap) -> String {
    let mut values: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        if *name == header::COOKIE || *name == header::SET_COOKIE {
            continue;
        }
        values
            .entry(name.as_str())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    serde_json::to_string_pretty(&values).unwrap_or_default()
}

/// Formats `body` as text, pretty-printing it if it holds JSON.
fn format_body(body: &Bytes) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(json) => serde_json::to_string_pretty(&json).unwrap_or_default(),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

/// Renders the dump of a single exchange.  Empty bodies are omitted.
fn render(
    req_headers: &HeaderMap,
    req_body: &Bytes,
    res_headers: &HeaderMap,
    res_body: &Bytes,
) -> String {
    let mut out = format!("Request-Header:\n{}\n", format_headers(req_headers));
    if !req_body.is_empty() {
        out.push_str(&format!("Request-Body:\n{}\n", format_body(req_body)));
    }
    out.push_str(&format!("Response-Header:\n{}", format_headers(res_headers)));
    if !res_body.is_empty() {
        out.push_str(&format!("\nResponse-Body:\n{}", format_body(res_body)));
    }
    out
}

/// Serves `req` and logs the headers and bodies of the request and its response.
pub(crate) async fn dump(req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let req_body = match buffer_body(body).await {
        Ok(bytes) => bytes,
        Err(e) => return RestError::Bind(format!("Cannot read request body: {}", e)).into_response(),
    };
    let req_headers = parts.headers.clone();

    let response = next.run(Request::from_parts(parts, body_from(&req_body))).await;

    let (parts, body) = response.into_parts();
    let res_body = match buffer_body(body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return RestError::InternalError(format!("Cannot read response body: {}", e))
                .into_response();
        }
    };

    info!(target: "dump", "{}", render(&req_headers, &req_body, &parts.headers, &res_body));
    Response::from_parts(parts, body_from(&res_body))
}
