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

//! The `Selector` data type to filter collections by field values.

use std::fmt;
use std::str::FromStr;

/// Errors that can occur while parsing a selector.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// A clause does not contain any of the recognized operators.
    #[error("Invalid selector '{0}': no operator found")]
    MissingOperator(String),

    /// A clause has an operator but nothing on its left side.
    #[error("Invalid selector '{0}': field name cannot be empty")]
    EmptyField(String),

    /// A clause has an operator but nothing on its right side.
    #[error("Invalid selector '{0}': value cannot be empty")]
    EmptyValue(String),
}

/// Comparison operators supported in a selector clause.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    /// Exact match, written as `==`.
    Equals,

    /// Substring match, written as `=`.
    Contains,

    /// Exact mismatch, written as `!=`.
    NotEquals,
}

impl Operator {
    /// Returns the textual representation of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "==",
            Operator::Contains => "=",
            Operator::NotEquals => "!=",
        }
    }

    /// Recognizes the operator at the beginning of `s`, if any, preferring the longest match.
    fn at_start_of(s: &str) -> Option<Self> {
        if s.starts_with("!=") {
            Some(Operator::NotEquals)
        } else if s.starts_with("==") {
            Some(Operator::Equals)
        } else if s.starts_with('=') {
            Some(Operator::Contains)
        } else {
            None
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `field OP value` clause of a selector.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Requirement {
    /// Name of the field to compare.
    field: String,

    /// Comparison to apply.
    operator: Operator,

    /// Value to compare the field against.
    value: String,
}

impl Requirement {
    /// Creates a new requirement.
    pub fn new<F: Into<String>, V: Into<String>>(field: F, operator: Operator, value: V) -> Self {
        Self { field: field.into(), operator, value: value.into() }
    }

    /// Parses a single `clause`, splitting it at the first operator found.
    fn parse(clause: &str) -> Result<Self, ParseError> {
        let (pos, operator) = clause
            .char_indices()
            .find_map(|(i, _)| Operator::at_start_of(&clause[i..]).map(|op| (i, op)))
            .ok_or_else(|| ParseError::MissingOperator(clause.to_owned()))?;

        let field = clause[..pos].trim();
        let value = clause[pos + operator.as_str().len()..].trim();
        if field.is_empty() {
            return Err(ParseError::EmptyField(clause.to_owned()));
        }
        if value.is_empty() {
            return Err(ParseError::EmptyValue(clause.to_owned()));
        }

        Ok(Self::new(field, operator, value))
    }

    /// Returns the name of the field to compare.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the comparison to apply.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Returns the value to compare the field against.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.field, self.operator, self.value)
    }
}

/// A conjunction of requirements parsed from a string like `name==foo,email=example.com`.
///
/// Requirements keep the order in which they were given so that anything built from them, such
/// as a query, is deterministic.  An empty selector matches everything.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Selector(Vec<Requirement>);

impl Selector {
    /// Parses a selector from its textual representation.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let mut requirements = vec![];
        for clause in s.split(',') {
            if clause.trim().is_empty() {
                continue;
            }
            requirements.push(Requirement::parse(clause)?);
        }
        Ok(Self(requirements))
    }

    /// Returns true if the selector has no requirements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the requirements of this selector in their original order.
    pub fn requirements(&self) -> &[Requirement] {
        &self.0
    }
}

impl From<Vec<Requirement>> for Selector {
    fn from(requirements: Vec<Requirement>) -> Self {
        Self(requirements)
    }
}

impl FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", requirement)?;
        }
        Ok(())
    }
}
