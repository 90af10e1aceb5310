//! Request matching logic.
//!
//! Compares request bodies against a route's required key set and decides
//! whether the simulated-error trigger is present in the query string.

use crate::config::ValidationPolicy;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Whether two key collections contain the same keys, ignoring order and
/// duplicates.
pub fn is_structurally_equal<'a, E, A>(expected: E, actual: A) -> bool
where
    E: IntoIterator<Item = &'a str>,
    A: IntoIterator<Item = &'a str>,
{
    let expected: BTreeSet<&str> = expected.into_iter().collect();
    let actual: BTreeSet<&str> = actual.into_iter().collect();
    expected == actual
}

/// Body shape mismatch, reported to the client as 422.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub message: &'static str,
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unexpected: Vec<String>,
}

/// Validate a request body against the expected keys.
///
/// `body` is `None` when the request carried no body or a non-object JSON
/// value; both count as a body without keys.
pub fn validate_body(
    policy: ValidationPolicy,
    expected: &Map<String, Value>,
    body: Option<&Map<String, Value>>,
) -> Result<(), ValidationFailure> {
    let empty = Map::new();
    let body = body.unwrap_or(&empty);

    let missing: Vec<String> = expected
        .keys()
        .filter(|key| !body.contains_key(key.as_str()))
        .cloned()
        .collect();

    let unexpected: Vec<String> = match policy {
        ValidationPolicy::Subset => Vec::new(),
        ValidationPolicy::Exact => {
            if is_structurally_equal(
                expected.keys().map(String::as_str),
                body.keys().map(String::as_str),
            ) {
                return Ok(());
            }
            body.keys()
                .filter(|key| !expected.contains_key(key.as_str()))
                .cloned()
                .collect()
        }
    };

    if missing.is_empty() && unexpected.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure {
            message: "Validation error",
            missing,
            unexpected,
        })
    }
}

/// Whether the query string asks for the simulated error.
///
/// The parameter must be present and not set to `false` or `0`.
pub fn is_error_triggered(query: &HashMap<String, String>, param: &str) -> bool {
    match query.get(param) {
        Some(value) => {
            let value = value.trim();
            !(value.eq_ignore_ascii_case("false") || value == "0")
        }
        None => false,
    }
}
