//! Runtime stylesheet parameters: the caller-facing `Parameters` set and the
//! validated `BoundParameters` handed to the executor.
//!
//! Values are XPath expressions, evaluated against the document root when the
//! transformation starts. Use [`Parameters::literal`] to pass plain text.

use crate::error::XsltError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// An ordered set of `(name, expression)` pairs supplied for one transformation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    pairs: Vec<(String, String)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter whose value is an XPath expression, e.g. `"'text'"` or `"42"`.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((name.into(), value.into()));
        self
    }

    /// Adds a parameter whose value is the given text, quoted as an XPath literal.
    pub fn literal(mut self, name: impl Into<String>, value: &str) -> Self {
        self.pairs.push((name.into(), quote_literal(value)));
        self
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Builds a parameter set from a JSON object (`{"name": "value"}`) or an array of
    /// two-element arrays (`[["name", "value"]]`). Object entries come out in key order.
    pub fn from_json(value: &Value) -> Result<Self, XsltError> {
        let mut params = Parameters::new();
        match value {
            Value::Object(map) => {
                for (name, value) in map {
                    let value = value.as_str().ok_or_else(|| {
                        XsltError::Type(format!("parameter '{}' must have a string value, found {}", name, value))
                    })?;
                    params = params.param(name.as_str(), value);
                }
            }
            Value::Array(items) => {
                for item in items {
                    let Value::Array(pair) = item else {
                        return Err(XsltError::Type(format!(
                            "expecting an array of [name, value] arrays, found {}",
                            item
                        )));
                    };
                    let [name, value] = pair.as_slice() else {
                        return Err(XsltError::Usage(format!(
                            "a parameter pair must have exactly 2 elements, found {}",
                            pair.len()
                        )));
                    };
                    let (Some(name), Some(value)) = (name.as_str(), value.as_str()) else {
                        return Err(XsltError::Type(format!(
                            "parameter names and values must be strings, found {}",
                            item
                        )));
                    };
                    params = params.param(name, value);
                }
            }
            _ => {
                return Err(XsltError::Type("expecting a hash or an array of arrays".to_string()));
            }
        }
        Ok(params)
    }

    /// Validates the set and converts it for the executor. Names must be unique.
    pub fn bind(&self) -> Result<BoundParameters, XsltError> {
        let mut seen = HashSet::new();
        for (name, _) in &self.pairs {
            if !seen.insert(name.as_str()) {
                return Err(XsltError::Usage(format!("duplicate parameter '{}'", name)));
            }
        }
        Ok(BoundParameters {
            pairs: self.pairs.clone(),
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for Parameters {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

/// Entries come out in the map's iteration order.
impl<K: Into<String>, V: Into<String>> From<HashMap<K, V>> for Parameters {
    fn from(map: HashMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> From<BTreeMap<K, V>> for Parameters {
    fn from(map: BTreeMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

/// Parameters after validation, in the order they were supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundParameters {
    pairs: Vec<(String, String)>,
}

impl BoundParameters {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl From<Vec<(String, String)>> for BoundParameters {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

/// Quotes text as an XPath string literal. XPath 1.0 has no escape syntax, so text
/// containing both quote characters becomes a `concat()` call.
pub fn quote_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value.split('\'').map(|part| format!("'{}'", part)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(params: &Parameters) -> Vec<(&str, &str)> {
        params.iter().collect()
    }

    #[test]
    fn test_builder_and_conversions() {
        let params = Parameters::new().param("a", "1 + 1").literal("b", "text");
        assert_eq!(pairs(&params), vec![("a", "1 + 1"), ("b", "'text'")]);

        let from_vec: Parameters = vec![("x", "'y'")].into();
        assert_eq!(pairs(&from_vec), vec![("x", "'y'")]);

        let mut tree = BTreeMap::new();
        tree.insert("z", "2");
        tree.insert("m", "1");
        let from_tree = Parameters::from(tree);
        assert_eq!(pairs(&from_tree), vec![("m", "1"), ("z", "2")]);

        let mut hash = HashMap::new();
        hash.insert("only".to_string(), "'one'".to_string());
        assert_eq!(Parameters::from(hash).len(), 1);
    }

    #[test]
    fn test_from_json_shapes_agree() {
        let from_object = Parameters::from_json(&json!({"name": "'v'", "count": "3"})).unwrap();
        let from_pairs = Parameters::from_json(&json!([["count", "3"], ["name", "'v'"]])).unwrap();
        assert_eq!(from_object, from_pairs);
        assert!(Parameters::from_json(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_from_json_errors() {
        assert!(matches!(
            Parameters::from_json(&json!("nope")),
            Err(XsltError::Type(msg)) if msg == "expecting a hash or an array of arrays"
        ));
        assert!(matches!(Parameters::from_json(&json!({"a": 1})), Err(XsltError::Type(_))));
        assert!(matches!(Parameters::from_json(&json!(["a"])), Err(XsltError::Type(_))));
        assert!(matches!(Parameters::from_json(&json!([[1, "v"]])), Err(XsltError::Type(_))));
        assert!(matches!(
            Parameters::from_json(&json!([["a", "b", "c"]])),
            Err(XsltError::Usage(_))
        ));
    }

    #[test]
    fn test_bind_rejects_duplicates() {
        let params = Parameters::new().param("a", "1").param("a", "2");
        assert!(matches!(params.bind(), Err(XsltError::Usage(_))));

        let bound = Parameters::new().param("a", "1").param("b", "2").bind().unwrap();
        assert_eq!(bound.iter().collect::<Vec<_>>(), vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "\"it's\"");
        assert_eq!(quote_literal(r#"it's "x""#), r#"concat('it', "'", 's "x"')"#);
    }
}
