//! # Spec Validation
//!
//! Rejects structurally invalid policies before any side effect and compiles
//! the namespace selection rules for the run.

use crate::controller::reconciler::namespaces::NamespaceResolver;
use crate::controller::reconciler::patterns::PatternSet;
use crate::controller::reconciler::selector::LabelPredicate;
use crate::crd::SyncPolicySpec;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("either .spec.namespaceSelector.matchNames or .spec.namespaceSelector.labelSelector is required")]
    MissingNamespaceSelector,
    #[error("either spec.deleteItems or .spec.syncItems is required")]
    NoItems,
    #[error(".spec.namespaceSelector.matchNames pattern invalid: {0}")]
    InvalidMatchNames(String),
    #[error(".spec.namespaceSelector.ignoreNames pattern invalid: {0}")]
    InvalidIgnoreNames(String),
    #[error(".spec.namespaceSelector.labelSelector is invalid: {0}")]
    InvalidLabelSelector(String),
}

/// Validate a spec and compile its namespace selector
///
/// Checks run in order and stop at the first failure: selector presence,
/// item presence, `matchNames` patterns, `ignoreNames` patterns, label selector.
pub fn validate_spec(spec: &SyncPolicySpec) -> Result<NamespaceResolver, ValidationError> {
    let selector = match &spec.namespace_selector {
        Some(selector) if !selector.is_empty() => selector,
        _ => return Err(ValidationError::MissingNamespaceSelector),
    };

    if spec.sync_items.is_empty() && spec.delete_items.is_empty() {
        return Err(ValidationError::NoItems);
    }

    let match_names = PatternSet::compile(&selector.match_names)
        .map_err(|e| ValidationError::InvalidMatchNames(e.to_string()))?;
    let ignore_names = PatternSet::compile(&selector.ignore_names)
        .map_err(|e| ValidationError::InvalidIgnoreNames(e.to_string()))?;
    let labels = selector
        .label_selector
        .as_ref()
        .map(LabelPredicate::compile)
        .transpose()
        .map_err(ValidationError::InvalidLabelSelector)?;

    Ok(NamespaceResolver::new(match_names, ignore_names, labels))
}
