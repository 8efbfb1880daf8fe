//! # Namespace Resolution
//!
//! Combines the label predicate with the `matchNames` and `ignoreNames`
//! pattern lists into the set of namespaces a policy targets.

use crate::controller::reconciler::patterns::PatternSet;
use crate::controller::reconciler::selector::LabelPredicate;
use crate::controller::store::{NamespaceInfo, ObjectStore, StoreError};
use std::collections::BTreeMap;
use tracing::debug;

/// Compiled namespace selection rules of one policy
#[derive(Debug, Clone, Default)]
pub struct NamespaceResolver {
    pub(crate) match_names: PatternSet,
    pub(crate) ignore_names: PatternSet,
    pub(crate) labels: Option<LabelPredicate>,
}

impl NamespaceResolver {
    pub fn new(
        match_names: PatternSet,
        ignore_names: PatternSet,
        labels: Option<LabelPredicate>,
    ) -> Self {
        Self {
            match_names,
            ignore_names,
            labels,
        }
    }

    /// Decide whether a namespace is targeted
    ///
    /// `ignoreNames` wins over everything, then the label predicate, then `matchNames`.
    #[must_use]
    pub fn is_selected(&self, namespace: &NamespaceInfo) -> bool {
        if self.ignore_names.matches(&namespace.name) {
            return false;
        }
        if self
            .labels
            .as_ref()
            .is_some_and(|predicate| predicate.matches(&namespace.labels))
        {
            return true;
        }
        self.match_names.matches(&namespace.name)
    }

    /// Filter candidates down to the selected namespaces
    ///
    /// Duplicate names are collapsed and the result is ordered by name. The
    /// lifecycle phase is not considered here.
    pub fn resolve(
        &self,
        candidates: impl IntoIterator<Item = NamespaceInfo>,
    ) -> Vec<NamespaceInfo> {
        candidates
            .into_iter()
            .filter(|namespace| self.is_selected(namespace))
            .map(|namespace| (namespace.name.clone(), namespace))
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .collect()
    }
}

/// Fetch the candidates and return the selected, active namespaces
///
/// With a `scope`, the scoped namespace is the only candidate and a missing
/// namespace yields an empty set. Inactive namespaces are skipped silently.
pub async fn target_namespaces(
    store: &dyn ObjectStore,
    resolver: &NamespaceResolver,
    scope: Option<&str>,
) -> Result<Vec<NamespaceInfo>, StoreError> {
    let candidates = match scope {
        Some(name) => store.get_namespace(name).await?.into_iter().collect(),
        None => store.list_namespaces().await?,
    };

    let (active, inactive): (Vec<_>, Vec<_>) = resolver
        .resolve(candidates)
        .into_iter()
        .partition(NamespaceInfo::is_active);

    for namespace in &inactive {
        debug!(
            namespace = %namespace.name,
            phase = namespace.phase.as_deref().unwrap_or("Unknown"),
            "Skipping namespace that is not active"
        );
    }
    Ok(active)
}
