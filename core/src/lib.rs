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

//! Building blocks shared by the services in this workspace.
//!
//! A service is split in layers, each in a module of its own, and each layer only talks to the
//! one right below it:
//!
//! 1.  `model`: domain types plus their validation.  Field errors are collected with the
//!     helpers in `model::validation` so that clients see all of their mistakes at once, and
//!     collection filters are expressed as `model::Selector`s.
//!
//! 1.  `db`: free functions that take an `Executor` and run the queries for the resource on
//!     every supported backend.  Query builders that assemble SQL at runtime pick their
//!     parameter syntax through `db::Placeholder`.
//!
//! 1.  `driver`: a service-specific `Driver` type that owns the database and the clock and runs
//!     each operation within one transaction.
//!
//! 1.  `rest`: an `axum::Router` with one handler per API.  Handlers bind their input with the
//!     extractors in `rest`, call the driver, and answer with an `rest::Envelope`.
//!
//! 1.  `main`: gathers the options, builds all of the above and hands the router to a server.
//!
//! Every layer has its own error and result types, such as `DbError` and `DbResult`, with `From`
//! conversions between them, so `?` carries failures from the database all the way up to the
//! response codes of the envelope.
//!
//! The `shutdown` module sits outside of the layers: it turns termination requests, such as
//! POSIX signals, into an orderly run of the cleanup callbacks that the service registered.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

pub mod clocks;
pub mod db;
pub mod driver;
pub mod env;
pub mod model;
pub mod rest;
pub mod shutdown;
