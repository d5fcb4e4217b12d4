use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::namespace::Namespace;

/// Chooses member namespaces for a pool. Every populated criterion must
/// match; an empty selector matches every namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub match_names: Vec<String>,
}

impl NamespaceSelector {
    pub fn matches(&self, ns: &Namespace) -> bool {
        if !self.match_names.is_empty() && !self.match_names.iter().any(|n| n == &ns.name) {
            return false;
        }
        self.match_labels
            .iter()
            .all(|(key, value)| ns.labels.get(key) == Some(value))
    }
}

/// Sorted, de-duplicated names of active namespaces matched by any selector.
pub fn select_namespaces(selectors: &[NamespaceSelector], namespaces: &[Namespace]) -> Vec<String> {
    let mut names: Vec<String> = namespaces
        .iter()
        .filter(|ns| ns.is_active())
        .filter(|ns| selectors.iter().any(|s| s.matches(ns)))
        .map(|ns| ns.name.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespacePhase;

    fn make_ns(name: &str, tenant: &str) -> Namespace {
        let mut ns = Namespace::new(name);
        ns.labels.insert("tenant".to_string(), tenant.to_string());
        ns
    }

    #[test]
    fn test_label_selector() {
        let selector = NamespaceSelector {
            match_labels: BTreeMap::from([("tenant".to_string(), "solar".to_string())]),
            ..Default::default()
        };
        assert!(selector.matches(&make_ns("solar-dev", "solar")));
        assert!(!selector.matches(&make_ns("wind-dev", "wind")));
    }

    #[test]
    fn test_select_skips_terminating_and_sorts() {
        let mut gone = make_ns("solar-old", "solar");
        gone.phase = NamespacePhase::Terminating;
        let namespaces = vec![make_ns("solar-prod", "solar"), gone, make_ns("solar-dev", "solar")];
        let selectors = vec![
            NamespaceSelector {
                match_labels: BTreeMap::from([("tenant".to_string(), "solar".to_string())]),
                ..Default::default()
            },
            NamespaceSelector {
                match_names: vec!["solar-dev".to_string()],
                ..Default::default()
            },
        ];

        assert_eq!(
            select_namespaces(&selectors, &namespaces),
            vec!["solar-dev".to_string(), "solar-prod".to_string()]
        );
        assert!(select_namespaces(&[], &namespaces).is_empty());
    }
}
