//! Path Tracer & Formatter
//!
//! A path names a location relative to the root of a wrapped graph. Keys that
//! look like identifiers are joined with dots, everything else goes in
//! brackets:
//!
//! ```text
//! root ─ a ─ b ─ 0 ─ c      =>   a.b[0].c
//! ```
//!
//! Bracketed segments are not quoted, so keys containing `.`, `[` or `]` do
//! not split back into the same segments.

use crate::heap::PropertyKey;
use serde::Serialize;
use std::fmt;

/// A path as delivered to callbacks: text or segments, per `path_as_array`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Path {
    Text(String),
    Segments(Vec<String>),
}

impl Path {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Path::Text(text) => Some(text),
            Path::Segments(_) => None,
        }
    }

    /// The raw segment names.
    pub fn segments(&self) -> Vec<String> {
        match self {
            Path::Text(text) => split_path(text),
            Path::Segments(segments) => segments.clone(),
        }
    }

    pub fn into_segments(self) -> Self {
        match self {
            Path::Text(text) => Path::Segments(split_path(&text)),
            segments => segments,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Text(text) => f.write_str(text),
            Path::Segments(segments) => f.write_str(&join_path(segments)),
        }
    }
}

/// Location of an operation: the containing object and the key within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TracedPath {
    pub object: Path,
    pub value: Path,
}

impl TracedPath {
    pub fn into_segments(self) -> Self {
        Self {
            object: self.object.into_segments(),
            value: self.value.into_segments(),
        }
    }
}

/// Build the path of `key` under the object reached through `lineage`
/// (parent keys from the root down). Without a key both parts are the
/// object's own path.
pub fn trace(lineage: &[PropertyKey], key: Option<&PropertyKey>) -> TracedPath {
    let mut path = String::new();
    for segment in lineage {
        push_segment(&mut path, segment);
    }
    let object = path.clone();
    if let Some(key) = key {
        push_segment(&mut path, key);
    }
    TracedPath {
        object: Path::Text(object),
        value: Path::Text(path),
    }
}

fn push_segment(path: &mut String, key: &PropertyKey) {
    if key.is_identifier() {
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(key.as_str());
    } else {
        path.push('[');
        path.push_str(key.as_str());
        path.push(']');
    }
}

/// Render segment names in path notation.
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut path = String::new();
    for segment in segments {
        push_segment(&mut path, &PropertyKey::from(segment.as_ref()));
    }
    path
}

/// Split a path into its raw segment names, dropping empty segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split(['.', '[', ']'])
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a path string, or every string member of a mapping of paths.
///
/// Non-string members of a mapping are left as they are. Any other input
/// yields `None`.
pub fn format_path(input: &serde_json::Value) -> Option<serde_json::Value> {
    fn segments(path: &str) -> serde_json::Value {
        split_path(path)
            .into_iter()
            .map(serde_json::Value::String)
            .collect()
    }

    match input {
        serde_json::Value::String(path) => Some(segments(path)),
        serde_json::Value::Object(members) => Some(serde_json::Value::Object(
            members
                .iter()
                .map(|(name, member)| {
                    let member = match member {
                        serde_json::Value::String(path) => segments(path),
                        other => other.clone(),
                    };
                    (name.clone(), member)
                })
                .collect(),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn keys(names: &[&str]) -> Vec<PropertyKey> {
        names.iter().map(|n| PropertyKey::from(*n)).collect()
    }

    #[test]
    fn dot_for_identifiers_brackets_for_the_rest() {
        let traced = trace(&keys(&["a"]), Some(&PropertyKey::from("0")));
        assert_eq!(traced.object, Path::Text("a".into()));
        assert_eq!(traced.value, Path::Text("a[0]".into()));

        let traced = trace(&keys(&["a", "b", "0"]), Some(&PropertyKey::from("c")));
        assert_eq!(traced.object, Path::Text("a.b[0]".into()));
        assert_eq!(traced.value, Path::Text("a.b[0].c".into()));
    }

    #[test]
    fn root_paths() {
        let traced = trace(&[], Some(&PropertyKey::from("x")));
        assert_eq!(traced.object, Path::Text(String::new()));
        assert_eq!(traced.value, Path::Text("x".into()));

        let traced = trace(&[], Some(&PropertyKey::from("my-key")));
        assert_eq!(traced.value, Path::Text("[my-key]".into()));

        let traced = trace(&[], None);
        assert_eq!(traced.value, Path::Text(String::new()));
    }

    #[test]
    fn split_discards_empty_segments() {
        assert_eq!(split_path("a.b[0].c"), vec!["a", "b", "0", "c"]);
        assert_eq!(split_path("[0][1]"), vec!["0", "1"]);
        assert_eq!(split_path(""), Vec::<String>::new());
        assert_eq!(split_path("a..b"), vec!["a", "b"]);
    }

    #[test]
    fn traced_path_into_segments() {
        let traced = trace(&keys(&["list", "3"]), Some(&PropertyKey::from("name"))).into_segments();
        assert_eq!(traced.object, Path::Segments(vec!["list".into(), "3".into()]));
        assert_eq!(
            traced.value,
            Path::Segments(vec!["list".into(), "3".into(), "name".into()])
        );
        assert_eq!(traced.value.to_string(), "list[3].name");
    }

    #[test]
    fn format_path_inputs() {
        assert_eq!(format_path(&json!("a[1].b")), Some(json!(["a", "1", "b"])));
        assert_eq!(
            format_path(&json!({"object": "a[1]", "value": "a[1].b", "depth": 2})),
            Some(json!({"object": ["a", "1"], "value": ["a", "1", "b"], "depth": 2}))
        );
        assert_eq!(format_path(&json!(42)), None);
        assert_eq!(format_path(&json!(null)), None);
    }

    proptest! {
        #[test]
        fn identifier_segments_round_trip(
            segments in proptest::collection::vec("[a-zA-Z_][a-zA-Z0-9_]{0,8}|[0-9]{1,4}", 0..8)
        ) {
            let joined = join_path(&segments);
            prop_assert_eq!(split_path(&joined), segments);
        }

        #[test]
        fn value_path_extends_object_path(
            lineage in proptest::collection::vec("[a-z]{1,5}|[0-9]{1,3}", 0..6),
            key in "[a-z]{1,5}|[0-9]{1,3}",
        ) {
            let lineage: Vec<PropertyKey> = lineage.into_iter().map(PropertyKey::from).collect();
            let traced = trace(&lineage, Some(&PropertyKey::from(key.as_str())));
            let object = traced.object.as_text().unwrap().to_string();
            let value = traced.value.as_text().unwrap().to_string();
            prop_assert!(value.starts_with(&object));
            prop_assert_eq!(split_path(&value).last().cloned(), Some(key));
        }
    }
}
