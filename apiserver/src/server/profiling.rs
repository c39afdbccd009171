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

//! CPU profiling endpoint.

use axum::http::header;
use axum::response::{IntoResponse, Response};
use iii_iv_core::rest::{QueryParams, RestError, RestResult};
use serde::Deserialize;
use std::time::Duration;

/// Duration of a profile when the client does not request one.
const DEFAULT_SECONDS: u64 = 30;

/// Query parameters of the profiling endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ProfileQuery {
    /// Number of seconds to sample for.
    seconds: Option<u64>,
}

/// Samples the whole process for `duration` and renders the result as an SVG flamegraph.
fn sample(duration: Duration) -> Result<Vec<u8>, String> {
    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(100)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()
        .map_err(|e| format!("Cannot start profiler: {}", e))?;

    std::thread::sleep(duration);

    let report = guard.report().build().map_err(|e| format!("Cannot build report: {}", e))?;
    let mut svg = vec![];
    report.flamegraph(&mut svg).map_err(|e| format!("Cannot render flamegraph: {}", e))?;
    Ok(svg)
}

/// GET handler for the CPU profile.
pub(crate) async fn profile(QueryParams(query): QueryParams<ProfileQuery>) -> RestResult<Response> {
    let seconds = query.seconds.unwrap_or(DEFAULT_SECONDS);
    if seconds == 0 {
        return Err(RestError::Bind("seconds must be positive".to_owned()));
    }

    let svg = tokio::task::spawn_blocking(move || sample(Duration::from_secs(seconds)))
        .await
        .map_err(|e| RestError::InternalError(format!("Profiler task failed: {}", e)))?
        .map_err(RestError::InternalError)?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}
