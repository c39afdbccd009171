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

//! Field validation helpers.
//!
//! Validation in this crate does not stop at the first problem.  Callers feed every field of an
//! object into a `FieldErrors` accumulator and then report all the collected errors at once so
//! that clients can fix all of their input in a single round trip.

use std::fmt;

/// Maximum length of a qualified name.
pub const MAX_QUALIFIED_NAME_LENGTH: usize = 63;

/// Minimum length of an acceptable password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum length of an acceptable password.
pub const MAX_PASSWORD_LENGTH: usize = 16;

/// Accumulator of validation errors for the fields of an object.
#[derive(Debug, Default, PartialEq)]
pub struct FieldErrors(Vec<String>);

impl FieldErrors {
    /// Records an arbitrary `detail` error for `field`.
    pub fn push<D: fmt::Display>(&mut self, field: &str, detail: D) {
        self.0.push(format!("{}: {}", field, detail));
    }

    /// Records that `field` holds an invalid `value` because of `detail`.
    pub fn invalid<D: fmt::Display>(&mut self, field: &str, value: &str, detail: D) {
        self.0.push(format!("{}: Invalid value: \"{}\": {}", field, value, detail));
    }

    /// Checks that `value` is not empty and records an error for `field` otherwise.
    ///
    /// Returns true if the value is present so that callers can skip further validation of
    /// missing fields.
    pub fn required(&mut self, field: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.push(field, "Required value");
            false
        } else {
            true
        }
    }

    /// Checks that the length of `value`, in characters, is within `min` and `max`.
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min {
            self.invalid(field, value, format!("must have at least {} characters", min));
        } else if len > max {
            self.push(field, format!("Too long: must have at most {} characters", max));
        }
    }

    /// Returns true if no errors have been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the accumulator and returns the recorded errors, if any.
    pub fn into_result(self) -> Result<(), Vec<String>> {
        if self.0.is_empty() { Ok(()) } else { Err(self.0) }
    }
}

/// Checks if `s` is a valid qualified name and returns the list of problems found.
///
/// A qualified name has at most 63 characters, consists of alphanumeric characters, `-`, `_`
/// and `.`, and starts and ends with an alphanumeric character.
pub fn qualified_name_errors(s: &str) -> Vec<&'static str> {
    let mut errors = vec![];
    if s.is_empty() {
        errors.push("name part must be non-empty");
        return errors;
    }
    if s.len() > MAX_QUALIFIED_NAME_LENGTH {
        errors.push("name part must be no more than 63 characters");
    }

    let valid_chars = s.chars().all(|ch| ch.is_ascii_alphanumeric() || "-_.".contains(ch));
    let valid_ends = s.starts_with(|ch: char| ch.is_ascii_alphanumeric())
        && s.ends_with(|ch: char| ch.is_ascii_alphanumeric());
    if !valid_chars || !valid_ends {
        errors.push(
            "name part must consist of alphanumeric characters, '-', '_' or '.', and must start \
            and end with an alphanumeric character",
        );
    }

    errors
}

/// Checks if `s` looks like a valid email address.
///
/// This only performs a structural check: a non-empty local part, a single `@`, and a domain
/// made of non-empty dot-separated labels with at least two labels.
pub fn is_email_address(s: &str) -> bool {
    if s.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return false;
    }

    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let labels = domain.split('.').collect::<Vec<&str>>();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|ch| ch.is_alphanumeric() || ch == '-')
        })
}

/// Verifies that a password is sufficiently complex and returns the reason why it is not.
pub fn password_weakness(s: &str) -> Option<&'static str> {
    let len = s.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len) {
        return Some("must have between 8 and 16 characters");
    }

    let mut alphabetic = false;
    let mut numeric = false;
    let mut special = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            alphabetic = true;
        } else if ch.is_numeric() {
            numeric = true;
        } else if ch.is_ascii_punctuation() {
            special = true;
        }
    }
    if !alphabetic || !numeric || !special {
        return Some("must contain letters, numbers and special characters");
    }

    None
}
