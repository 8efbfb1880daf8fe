//! # Placeholder Substitution
//!
//! Replaces `${PROJECT_NAME}` with the target namespace name in every string
//! of a manifest copy.

use crate::constants::{MAX_MANIFEST_DEPTH, PROJECT_NAME_PLACEHOLDER};
use serde_json::Value;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstitutionError {
    #[error("document is nested deeper than {max_depth} levels at {path}")]
    TooDeep { path: String, max_depth: usize },
}

#[derive(Debug, Clone)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// Replace the placeholder with `namespace` everywhere in `document`
pub fn substitute_project_name(
    document: &mut Value,
    namespace: &str,
) -> Result<(), SubstitutionError> {
    substitute_token(document, PROJECT_NAME_PLACEHOLDER, namespace)
}

/// Replace every occurrence of `token` inside string values, at any depth
///
/// Map keys and non-string scalars are left unchanged.
pub fn substitute_token(
    document: &mut Value,
    token: &str,
    replacement: &str,
) -> Result<(), SubstitutionError> {
    let mut path = Vec::new();
    walk(document, token, replacement, &mut path)
}

fn walk(
    value: &mut Value,
    token: &str,
    replacement: &str,
    path: &mut Vec<PathSegment>,
) -> Result<(), SubstitutionError> {
    match value {
        Value::String(s) => {
            if s.contains(token) {
                *s = s.replace(token, replacement);
            }
            Ok(())
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        Value::Array(items) => {
            check_depth(path)?;
            for (index, item) in items.iter_mut().enumerate() {
                path.push(PathSegment::Index(index));
                walk(item, token, replacement, path)?;
                path.pop();
            }
            Ok(())
        }
        Value::Object(map) => {
            check_depth(path)?;
            for (key, item) in map.iter_mut() {
                path.push(PathSegment::Key(key.clone()));
                walk(item, token, replacement, path)?;
                path.pop();
            }
            Ok(())
        }
    }
}

fn check_depth(path: &[PathSegment]) -> Result<(), SubstitutionError> {
    if path.len() >= MAX_MANIFEST_DEPTH {
        return Err(SubstitutionError::TooDeep {
            path: render_path(path),
            max_depth: MAX_MANIFEST_DEPTH,
        });
    }
    Ok(())
}

fn render_path(path: &[PathSegment]) -> String {
    let mut rendered = String::from("$");
    for segment in path {
        // Writing into a String cannot fail
        let _ = match segment {
            PathSegment::Key(key) => write!(rendered, ".{key}"),
            PathSegment::Index(index) => write!(rendered, "[{index}]"),
        };
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replaces_inside_strings() {
        let mut doc = json!({
            "metadata": {"name": "info", "labels": {"project": "${PROJECT_NAME}"}},
            "data": {"url": "https://${PROJECT_NAME}.example.com/${PROJECT_NAME}"}
        });
        substitute_project_name(&mut doc, "team-a").unwrap();
        assert_eq!(doc["metadata"]["labels"]["project"], "team-a");
        assert_eq!(doc["data"]["url"], "https://team-a.example.com/team-a");
    }

    #[test]
    fn test_keys_and_scalars_unchanged() {
        let mut doc = json!({
            "${PROJECT_NAME}": "${PROJECT_NAME}",
            "replicas": 3,
            "enabled": true,
            "empty": null
        });
        substitute_project_name(&mut doc, "ns").unwrap();
        assert_eq!(
            doc,
            json!({"${PROJECT_NAME}": "ns", "replicas": 3, "enabled": true, "empty": null})
        );
    }

    #[test]
    fn test_too_deep_reports_path() {
        let mut doc = json!("${PROJECT_NAME}");
        for _ in 0..=MAX_MANIFEST_DEPTH {
            doc = json!({ "a": [doc] });
        }
        let err = substitute_project_name(&mut doc, "ns").unwrap_err();
        let SubstitutionError::TooDeep { path, max_depth } = err;
        assert_eq!(max_depth, MAX_MANIFEST_DEPTH);
        assert!(path.starts_with("$.a[0].a[0]"), "unexpected path {path}");
    }

    #[test]
    fn test_depth_at_limit_is_accepted() {
        let mut doc = json!("${PROJECT_NAME}");
        for _ in 0..MAX_MANIFEST_DEPTH {
            doc = json!([doc]);
        }
        assert!(substitute_project_name(&mut doc, "ns").is_ok());
    }
}
