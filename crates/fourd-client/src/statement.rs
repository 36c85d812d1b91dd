//! Statement placeholder substitution.
//!
//! Placeholders are `$name` (or `$0`, `$1`, ... for positional parameters)
//! and are replaced by literal values before the statement text is sent.
//! A placeholder with no supplied value fails before anything reaches the
//! wire. The substituted output is plain text; the protocol engine never
//! sees placeholders.

// Regex pattern is a compile-time constant.
#![allow(clippy::expect_used)]

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\w+").expect("placeholder pattern"));

/// One statement parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// SQL NULL.
    Null,
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
    /// Boolean literal.
    Bool(bool),
    /// String literal; quoted on substitution, embedded quotes doubled.
    Str(String),
}

impl Param {
    fn render(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Str(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Parameters for one statement.
#[derive(Debug, Clone, Default)]
pub enum Params {
    /// No parameters; the statement must contain no placeholders.
    #[default]
    None,
    /// Positional parameters bound to `$0`, `$1`, ...
    Positional(Vec<Param>),
    /// Named parameters bound to `$name`.
    Named(HashMap<String, Param>),
}

impl Params {
    /// Positional parameters from anything convertible.
    #[must_use]
    pub fn positional<P: Into<Param>, I: IntoIterator<Item = P>>(values: I) -> Self {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Named parameters from `(name, value)` pairs.
    #[must_use]
    pub fn named<K: Into<String>, P: Into<Param>, I: IntoIterator<Item = (K, P)>>(
        pairs: I,
    ) -> Self {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn lookup(&self, key: &str) -> Option<&Param> {
        match self {
            Self::None => None,
            Self::Positional(values) => key.parse::<usize>().ok().and_then(|i| values.get(i)),
            Self::Named(map) => map.get(key),
        }
    }
}

/// Substitute placeholders in `sql`, producing the final statement text.
pub fn prepare(sql: &str, params: &Params) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;

    for found in PLACEHOLDER.find_iter(sql) {
        let key = &sql[found.start() + 1..found.end()];
        let param = params
            .lookup(key)
            .ok_or_else(|| Error::UndefinedParameter {
                name: key.to_string(),
            })?;
        out.push_str(&sql[last..found.start()]);
        out.push_str(&param.render());
        last = found.end();
    }
    out.push_str(&sql[last..]);

    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_substitution() {
        let sql = "SELECT * FROM Artikel WHERE Omschrijving LIKE $0 AND Id > $1";
        let out = prepare(sql, &Params::positional([Param::from("Noppies%"), 5.into()])).unwrap();
        assert_eq!(
            out,
            "SELECT * FROM Artikel WHERE Omschrijving LIKE 'Noppies%' AND Id > 5"
        );
    }

    #[test]
    fn test_named_substitution() {
        let out = prepare(
            "UPDATE T SET active = $flag WHERE name = $who",
            &Params::named([("flag", Param::from(true)), ("who", "O'Brien".into())]),
        )
        .unwrap();
        assert_eq!(out, "UPDATE T SET active = TRUE WHERE name = 'O''Brien'");
    }

    #[test]
    fn test_undefined_parameter_fails_before_send() {
        let err = prepare("SELECT $missing", &Params::None).unwrap_err();
        assert!(matches!(err, Error::UndefinedParameter { name } if name == "missing"));
    }

    #[test]
    fn test_null_and_float_rendering() {
        let out = prepare(
            "INSERT INTO T VALUES ($0, $1)",
            &Params::positional([Param::Null, Param::Float(2.5)]),
        )
        .unwrap();
        assert_eq!(out, "INSERT INTO T VALUES (NULL, 2.5)");
    }

    #[test]
    fn test_no_placeholders_passthrough() {
        let out = prepare("SELECT 1", &Params::None).unwrap();
        assert_eq!(out, "SELECT 1");
    }
}
