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

//! Errors raised by the business logic layer.
//!
//! Services keep their own `Driver` type holding an `Arc<dyn Db + Send + Sync>`, a `Clock` and
//! whatever else their operations need.  Driver operations consume `self` and run within a single
//! transaction, so calling two of them in a row requires an explicit clone.  Their errors are
//! expressed with the types in this module, which the REST layer maps to response codes.

use crate::db::DbError;
use crate::model::ModelError;

/// Business logic errors.  Messages are meant to be shown to API clients as is.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// An entity with the same identifier already exists.
    #[error("{0}")]
    AlreadyExists(String),

    /// The storage layer failed for reasons the client cannot fix.
    #[error("{0}")]
    BackendError(String),

    /// The client supplied data that does not pass validation.
    #[error("{0}")]
    InvalidInput(String),

    /// The requested entity does not exist.
    #[error("{0}")]
    NotFound(String),
}

impl DriverError {
    /// Converts a database error that happened while operating on the entity of type `kind`
    /// identified by `id`, describing the entity in the not-found and already-exists cases.
    pub fn for_entity(e: DbError, kind: &str, id: &str) -> Self {
        match e {
            DbError::AlreadyExists => {
                DriverError::AlreadyExists(format!("{} {} already exists", kind, id))
            }
            DbError::NotFound => DriverError::NotFound(format!("{} {} not found", kind, id)),
            e => e.into(),
        }
    }

    /// Aggregates a list of field validation `errors` into a single input error.
    pub fn invalid_fields(errors: Vec<String>) -> Self {
        DriverError::InvalidInput(errors.join("; "))
    }
}

impl From<DbError> for DriverError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::AlreadyExists => DriverError::AlreadyExists(e.to_string()),
            DbError::NotFound => DriverError::NotFound(e.to_string()),
            DbError::BackendError(_) | DbError::DataIntegrityError(_) | DbError::Unavailable => {
                DriverError::BackendError(e.to_string())
            }
        }
    }
}

impl From<ModelError> for DriverError {
    fn from(e: ModelError) -> Self {
        DriverError::InvalidInput(e.to_string())
    }
}

/// Result type for this module.
pub type DriverResult<T> = Result<T, DriverError>;
