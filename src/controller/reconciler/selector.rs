//! # Label Predicate
//!
//! Compiled form of a Kubernetes `LabelSelector` evaluated against
//! namespace labels.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::{Selector, SelectorExt};
use std::collections::BTreeMap;

/// All requirements of a label selector, ANDed
///
/// A selector without `matchLabels` and `matchExpressions` matches every
/// namespace.
#[derive(Debug, Clone)]
pub struct LabelPredicate {
    selector: Selector,
}

impl LabelPredicate {
    /// Compile a selector, rejecting unknown operators and malformed values
    pub fn compile(selector: &LabelSelector) -> Result<Self, String> {
        for key in selector.match_labels.iter().flatten().map(|(key, _)| key) {
            validate_key(key)?;
        }

        for expression in selector.match_expressions.iter().flatten() {
            validate_key(&expression.key)?;
            let key = &expression.key;
            let has_values = expression.values.as_ref().is_some_and(|v| !v.is_empty());
            match expression.operator.as_str() {
                "In" | "NotIn" if !has_values => {
                    return Err(format!(
                        "values must be non-empty for operator {} on key {key:?}",
                        expression.operator
                    ));
                }
                "Exists" | "DoesNotExist" if has_values => {
                    return Err(format!(
                        "values must be empty for operator {} on key {key:?}",
                        expression.operator
                    ));
                }
                _ => {}
            }
        }

        // Operator names are checked by the conversion
        let selector = Selector::try_from(selector.clone()).map_err(|e| e.to_string())?;
        Ok(Self { selector })
    }

    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.selector.matches(labels)
    }
}

fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("label key must not be empty".to_string());
    }
    Ok(())
}
