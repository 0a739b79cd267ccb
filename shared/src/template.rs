//! Report template placeholders.
//!
//! Templates reference `@date1`, `@date2` and `@search`. Placeholders are
//! plain text: case-sensitive and replaced everywhere they occur.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::params::ExtractedParameters;
use crate::Error;

pub const DATE1: &str = "@date1";
pub const DATE2: &str = "@date2";
pub const SEARCH: &str = "@search";

/// How parameter values travel to the connector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterMode {
    /// Template sent untouched; values sent separately for the connector to bind.
    #[default]
    Bound,
    /// Values spliced into the SQL text as quoted literals.
    Inline,
}

impl FromStr for ParameterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bound" => Ok(ParameterMode::Bound),
            "inline" => Ok(ParameterMode::Inline),
            _ => Err(Error::Config(format!("Unknown parameter mode: {}", s))),
        }
    }
}

/// Quote a value as a T-SQL string literal, doubling single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn date_value(params: &ExtractedParameters, second: bool) -> Option<String> {
    let date = if second { params.date2 } else { params.date1 };
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Substitute parameters into the template as quoted literals.
///
/// Missing values become the empty literal `''`. Only single quotes are
/// escaped, so this must never see templates or terms from untrusted users
/// when a connector supports [`ParameterMode::Bound`].
pub fn render_sql(template: &str, params: &ExtractedParameters) -> String {
    let literal = |value: Option<String>| quote_literal(value.as_deref().unwrap_or(""));

    template
        .replace(DATE1, &literal(date_value(params, false)))
        .replace(DATE2, &literal(date_value(params, true)))
        .replace(SEARCH, &literal(params.search.clone()))
}

/// Parameter values keyed by name (without the `@`), for binding.
pub fn bound_parameters(params: &ExtractedParameters) -> BTreeMap<&'static str, Option<String>> {
    BTreeMap::from([
        ("date1", date_value(params, false)),
        ("date2", date_value(params, true)),
        ("search", params.search.clone()),
    ])
}
