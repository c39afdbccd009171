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

//! The `OperationLog` data type.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Details of a mutating request captured while it was being served.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    /// Name of the authenticated user that issued the request, or empty if anonymous.
    pub username: String,

    /// Value of the `User-Agent` header.
    pub user_agent: String,

    /// Address of the client that issued the request.
    #[serde(rename = "clientIP")]
    pub client_ip: String,

    /// HTTP method of the request.
    pub req_method: String,

    /// Path of the request, including the query string if any.
    pub req_path: String,

    /// Raw body of the request.
    pub req_body: String,

    /// Value of the `Referer` header.
    pub req_referer: String,

    /// Time at which the request was received.
    #[serde(with = "time::serde::rfc3339")]
    pub req_time: OffsetDateTime,

    /// Time it took to serve the request, in seconds.
    pub req_latency: f64,

    /// HTTP status of the response.
    pub http_status: u16,

    /// Raw body of the response.
    pub res_data: String,
}

/// An audit entry for a mutating request, as persisted.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLog {
    /// Unique numeric identifier assigned by the database.
    id: i64,

    /// Time at which the entry was stored.
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,

    /// Captured details of the request.
    #[serde(flatten)]
    record: OperationRecord,
}

impl OperationLog {
    /// Creates a new persisted entry.
    pub fn new(id: i64, created_at: OffsetDateTime, record: OperationRecord) -> Self {
        Self { id, created_at, record }
    }
}
