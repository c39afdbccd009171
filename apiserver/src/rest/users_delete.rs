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

//! API to delete a collection of users.

use crate::driver::Driver;
use axum::Json;
use axum::extract::{RawQuery, State};
use iii_iv_core::rest::{EmptyBody, Envelope, RestResult, ok_empty};

/// Extracts the values of all the `name` parameters in the raw `query`.
fn names_from_query(query: Option<&str>) -> Vec<String> {
    match query {
        Some(query) => url::form_urlencoded::parse(query.as_bytes())
            .filter(|(key, _)| key == "name")
            .map(|(_, value)| value.into_owned())
            .collect(),
        None => vec![],
    }
}

/// DELETE handler for this API.
///
/// The users to delete are given as repeated `name` query parameters.
pub(crate) async fn handler(
    State(driver): State<Driver>,
    RawQuery(query): RawQuery,
    _: EmptyBody,
) -> RestResult<Json<Envelope<()>>> {
    let names = names_from_query(query.as_deref());
    driver.delete_users(names).await?;
    Ok(ok_empty())
}
