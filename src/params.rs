//! Task parameters with canonical ordering
//!
//! A task's identity is `(family, parameters)`. Parameters are a mapping of
//! primitive JSON values (or nested structures of them); two mappings are
//! equal iff they are structurally equal after canonical key ordering.
//! `BTreeMap` gives us that ordering for free, both here and in nested
//! objects (the default `serde_json::Map` is itself a BTreeMap).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BuildError;

/// Ordered parameter mapping for one task instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Deterministic string encoding used for task identity.
    ///
    /// Keys are emitted in canonical (sorted) order at every nesting level,
    /// so structurally equal mappings always encode identically.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────
    // Typed accessors (the explicit parameter schema for factories)
    // ─────────────────────────────────────────────────────────────

    pub fn str(&self, name: &str) -> Result<&str, BuildError> {
        match self.require(name)? {
            Value::String(s) => Ok(s),
            other => Err(Self::type_error(name, "string", other)),
        }
    }

    pub fn i64(&self, name: &str) -> Result<i64, BuildError> {
        match self.require(name)? {
            Value::Number(n) if n.is_i64() => Ok(n.as_i64().unwrap_or_default()),
            other => Err(Self::type_error(name, "integer", other)),
        }
    }

    pub fn f64(&self, name: &str) -> Result<f64, BuildError> {
        let value = self.require(name)?;
        match value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| Self::type_error(name, "number", value)),
            other => Err(Self::type_error(name, "number", other)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, BuildError> {
        match self.require(name)? {
            Value::Bool(b) => Ok(*b),
            other => Err(Self::type_error(name, "bool", other)),
        }
    }

    /// Defaulted string accessor (for optional parameters)
    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.get(name) {
            Some(Value::String(s)) => s,
            _ => default,
        }
    }

    /// Defaulted integer accessor
    pub fn i64_or(&self, name: &str, default: i64) -> i64 {
        match self.get(name) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            _ => default,
        }
    }

    fn require(&self, name: &str) -> Result<&Value, BuildError> {
        self.get(name).ok_or_else(|| BuildError::MissingParam {
            name: name.to_string(),
        })
    }

    fn type_error(name: &str, expected: &'static str, got: &Value) -> BuildError {
        BuildError::ParamType {
            name: name.to_string(),
            expected,
            got: got.to_string(),
        }
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_is_insertion_order_independent() {
        let a = Params::new().with("b", 2).with("a", 1);
        let b = Params::new().with("a", 1).with("b", 2);
        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn nested_values_compare_structurally() {
        let a = Params::new().with("cfg", json!({"y": 2, "x": 1}));
        let b = Params::new().with("cfg", json!({"x": 1, "y": 2}));
        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn different_values_differ() {
        let a = Params::new().with("param", 1);
        let b = Params::new().with("param", 2);
        assert_ne!(a.canonical(), b.canonical());
    }

    #[test]
    fn typed_accessors() {
        let p = Params::new()
            .with("sample", "s1")
            .with("threads", 4)
            .with("keep", true);

        assert_eq!(p.str("sample").unwrap(), "s1");
        assert_eq!(p.i64("threads").unwrap(), 4);
        assert!(p.bool("keep").unwrap());
        assert_eq!(p.i64_or("max_mem", 10), 10);
        assert_eq!(p.str_or("temp_folder", "/scratch"), "/scratch");
    }

    #[test]
    fn missing_and_mistyped_params() {
        let p = Params::new().with("threads", "four");

        assert!(matches!(
            p.i64("missing"),
            Err(BuildError::MissingParam { .. })
        ));
        assert!(matches!(
            p.i64("threads"),
            Err(BuildError::ParamType { .. })
        ));
    }

    #[test]
    fn display_format() {
        let p = Params::new().with("param", 1).with("name", "x");
        assert_eq!(p.to_string(), r#"name="x", param=1"#);
    }
}
