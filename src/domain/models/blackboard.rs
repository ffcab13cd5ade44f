//! Blackboard: the shared, path-addressed result store for one run.
//!
//! Paths are `/`-separated. Writing a path creates any missing
//! intermediate maps; a scalar sitting where a map is needed is replaced.
//! The whole store serializes as a single JSON document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blackboard {
    root: Value,
}

impl Default for Blackboard {
    fn default() -> Self {
        Self::new()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Walk to `path`, creating maps along the way. Missing leaves start `Null`.
fn slot_mut<'a>(mut node: &'a mut Value, path: &str) -> &'a mut Value {
    for seg in segments(path) {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map.entry(seg.to_string()).or_insert(Value::Null),
            _ => unreachable!("node was made an object above"),
        };
    }
    node
}

impl Blackboard {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Store `value` at `path`, overwriting whatever was there.
    pub fn put(&mut self, path: &str, value: impl Into<Value>) {
        *slot_mut(&mut self.root, path) = value.into();
    }

    /// Store any serializable value at `path`.
    pub fn put_serialized<T: Serialize>(
        &mut self,
        path: &str,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.put(path, value);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        segments(path).try_fold(&self.root, |node, seg| node.get(seg))
    }

    /// The value at `path`, or `default` when absent.
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).cloned().unwrap_or(default)
    }

    /// Deserialize the value at `path`; `None` when absent or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.get(path)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Append to the list at `path`, creating it if needed. A scalar already
    /// at `path` becomes the first element. Duplicates are kept.
    pub fn append_to(&mut self, path: &str, value: impl Into<Value>) {
        let slot = slot_mut(&mut self.root, path);
        match slot {
            Value::Array(items) => items.push(value.into()),
            Value::Null => *slot = Value::Array(vec![value.into()]),
            other => {
                let existing = other.take();
                *other = Value::Array(vec![existing, value.into()]);
            }
        }
    }

    /// Append every value in turn, as by [`Blackboard::append_to`].
    pub fn extend<I, V>(&mut self, path: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for value in values {
            self.append_to(path, value);
        }
    }

    /// Strings in the list at `path`, skipping non-string entries.
    pub fn get_strings(&self, path: &str) -> Vec<String> {
        match self.get(path) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// The full contents as a JSON value.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_creates_intermediate_maps() {
        let mut bb = Blackboard::new();
        bb.put("services/Quast/results/n50", 12345);
        assert_eq!(bb.get("services/Quast/results/n50"), Some(&json!(12345)));
        assert!(bb.get("services/Quast/results").unwrap().is_object());
        assert!(bb.get("services/FastQC").is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let mut bb = Blackboard::new();
        bb.put("a/b", "first");
        bb.put("a/b", "second");
        assert_eq!(bb.get_str("a/b"), Some("second"));
    }

    #[test]
    fn test_put_replaces_scalar_with_map() {
        let mut bb = Blackboard::new();
        bb.put("a", 1);
        bb.put("a/b", 2);
        assert_eq!(bb.as_value(), &json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_get_or_default() {
        let bb = Blackboard::new();
        assert_eq!(bb.get_or("missing/path", json!("none")), json!("none"));
    }

    #[test]
    fn test_append_to_creates_and_keeps_duplicates() {
        let mut bb = Blackboard::new();
        bb.append_to("qaap/warnings", "w");
        bb.append_to("qaap/warnings", "w");
        assert_eq!(bb.get("qaap/warnings"), Some(&json!(["w", "w"])));
    }

    #[test]
    fn test_append_to_wraps_scalar() {
        let mut bb = Blackboard::new();
        bb.put("x", "one");
        bb.append_to("x", "two");
        assert_eq!(bb.get_strings("x"), vec!["one", "two"]);
    }

    #[test]
    fn test_extend_and_get_as() {
        let mut bb = Blackboard::new();
        bb.extend("paths", ["r1.fq", "r2.fq"]);
        let paths: Vec<String> = bb.get_as("paths").unwrap();
        assert_eq!(paths, vec!["r1.fq", "r2.fq"]);
        assert!(bb.get_as::<u32>("paths").is_none());
    }

    #[test]
    fn test_serializes_as_plain_document() {
        let mut bb = Blackboard::new();
        bb.put("qaap/summary/sample_id", "S1");
        let text = serde_json::to_string(&bb).unwrap();
        assert_eq!(text, r#"{"qaap":{"summary":{"sample_id":"S1"}}}"#);
    }
}
