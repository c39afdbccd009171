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

//! Translation of field selectors into parameterized SQL `WHERE` clauses.

use iii_iv_core::db::Placeholder;
use iii_iv_core::model::{Operator, Selector};

/// How the values of a column are compared against the textual values of a selector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ColumnKind {
    /// The column holds text and is compared directly.
    Text,

    /// The column holds numbers and is converted to text before comparing.
    Integer,
}

/// A selector field that a resource allows filtering on.
#[derive(Debug)]
pub(crate) struct Field {
    /// Name of the field as written in selectors.
    pub(crate) name: &'static str,

    /// Name of the database column backing the field.
    pub(crate) column: &'static str,

    /// Type of the database column backing the field.
    pub(crate) kind: ColumnKind,
}

/// Fields that users can be filtered on.
pub(crate) const USER_FIELDS: &[Field] = &[
    Field { name: "name", column: "name", kind: ColumnKind::Text },
    Field { name: "email", column: "email", kind: ColumnKind::Text },
];

/// Fields that operation logs can be filtered on.
pub(crate) const OPERATION_LOG_FIELDS: &[Field] = &[
    Field { name: "req_method", column: "req_method", kind: ColumnKind::Text },
    Field { name: "req_path", column: "req_path", kind: ColumnKind::Text },
    Field { name: "http_status", column: "http_status", kind: ColumnKind::Integer },
];

/// A `WHERE` clause along with the values to bind to its placeholders, in order.
#[derive(Debug, PartialEq)]
pub(crate) struct Filter {
    /// The SQL condition, without the `WHERE` keyword.
    pub(crate) clause: String,

    /// Values for the placeholders in `clause`.
    pub(crate) values: Vec<String>,
}

/// Escapes the wildcards of a `LIKE` pattern using `\` as the escape character.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Builds the filter that implements `selector` for a resource that allows filtering on `fields`.
///
/// Requirements on fields not in `fields` are dropped.  Placeholders are numbered starting at 1
/// using the `placeholder` style of the target database.
pub(crate) fn build_filter(selector: &Selector, fields: &[Field], placeholder: Placeholder) -> Filter {
    let mut conditions = vec![];
    let mut values = vec![];
    for requirement in selector.requirements() {
        let Some(field) = fields.iter().find(|f| f.name == requirement.field()) else {
            continue;
        };

        let column = match field.kind {
            ColumnKind::Text => field.column.to_owned(),
            ColumnKind::Integer => format!("CAST({} AS TEXT)", field.column),
        };
        let param = placeholder.at(values.len() + 1);
        match requirement.operator() {
            Operator::Equals => {
                conditions.push(format!("{} = {}", column, param));
                values.push(requirement.value().to_owned());
            }
            Operator::Contains => {
                conditions.push(format!("{} LIKE {} ESCAPE '\\'", column, param));
                values.push(format!("%{}%", escape_like(requirement.value())));
            }
            Operator::NotEquals => {
                conditions.push(format!("{} <> {}", column, param));
                values.push(requirement.value().to_owned());
            }
        }
    }

    if conditions.is_empty() {
        Filter { clause: "1 = 1".to_owned(), values }
    } else {
        Filter { clause: conditions.join(" AND "), values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selector() {
        let filter = build_filter(&Selector::default(), USER_FIELDS, Placeholder::Anonymous);
        assert_eq!(Filter { clause: "1 = 1".to_owned(), values: vec![] }, filter);
    }

    #[test]
    fn test_all_operators() {
        let selector = Selector::parse("name==admin,email=foxmail,name!=root").unwrap();
        let filter = build_filter(&selector, USER_FIELDS, Placeholder::Anonymous);
        assert_eq!(
            Filter {
                clause: "name = ? AND email LIKE ? ESCAPE '\\' AND name <> ?".to_owned(),
                values: vec!["admin".to_owned(), "%foxmail%".to_owned(), "root".to_owned()],
            },
            filter
        );
    }

    #[test]
    fn test_numbered_placeholders() {
        let selector = Selector::parse("req_method==PUT,req_path=/v1").unwrap();
        let filter = build_filter(&selector, OPERATION_LOG_FIELDS, Placeholder::Numbered);
        assert_eq!("req_method = $1 AND req_path LIKE $2 ESCAPE '\\'", filter.clause);
    }

    #[test]
    fn test_unknown_fields_are_dropped() {
        let selector = Selector::parse("password==x,name==a,nickname=b").unwrap();
        let filter = build_filter(&selector, USER_FIELDS, Placeholder::Numbered);
        assert_eq!(
            Filter { clause: "name = $1".to_owned(), values: vec!["a".to_owned()] },
            filter
        );

        let selector = Selector::parse("password==x").unwrap();
        let filter = build_filter(&selector, USER_FIELDS, Placeholder::Numbered);
        assert_eq!("1 = 1", filter.clause);
        assert!(filter.values.is_empty());
    }

    #[test]
    fn test_integer_columns_compare_as_text() {
        let selector = Selector::parse("http_status!=200").unwrap();
        let filter = build_filter(&selector, OPERATION_LOG_FIELDS, Placeholder::Anonymous);
        assert_eq!("CAST(http_status AS TEXT) <> ?", filter.clause);
        assert_eq!(vec!["200".to_owned()], filter.values);
    }

    #[test]
    fn test_like_wildcards_are_escaped() {
        let selector = Selector::parse(r"email=a_b%c\d").unwrap();
        let filter = build_filter(&selector, USER_FIELDS, Placeholder::Anonymous);
        assert_eq!(vec![r"%a\_b\%c\\d%".to_owned()], filter.values);
    }
}
