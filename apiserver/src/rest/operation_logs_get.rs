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

//! API to list operation logs.

use crate::driver::Driver;
use crate::model::OperationLogList;
use crate::rest::ListQuery;
use axum::Json;
use axum::extract::State;
use iii_iv_core::rest::{EmptyBody, Envelope, QueryParams, RestResult, ok};

/// GET handler for this API.
///
/// The `field_selector` query parameter can filter logs by `req_method`, `req_path` and
/// `http_status`.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    QueryParams(query): QueryParams<ListQuery>,
    _: EmptyBody,
) -> RestResult<Json<Envelope<OperationLogList>>> {
    let opts = query.into_options()?;
    let logs = driver.list_operation_logs(opts).await?;
    Ok(ok(logs))
}
