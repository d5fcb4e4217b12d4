use std::collections::BTreeMap;

use crate::quantity::{Quantity, QuantityError};

/// Resource name → amount (`requests.cpu: 500m`, `pods: 10`).
///
/// Ordered so that status output and violation messages are deterministic.
pub type ResourceList = BTreeMap<String, Quantity>;

/// Build a ResourceList from `(name, quantity)` string pairs.
pub fn parse_resource_list(pairs: &[(&str, &str)]) -> Result<ResourceList, QuantityError> {
    pairs
        .iter()
        .map(|(name, value)| Ok((name.to_string(), value.parse()?)))
        .collect()
}

/// Render a list as `name=amount` pairs joined by `", "`.
pub fn format_resource_list(list: &ResourceList) -> String {
    list.iter()
        .map(|(name, qty)| format!("{}={}", name, qty))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let list = parse_resource_list(&[("requests.memory", "1Gi"), ("requests.cpu", "2")]).unwrap();
        assert_eq!(
            format_resource_list(&list),
            "requests.cpu=2, requests.memory=1Gi"
        );
        assert!(parse_resource_list(&[("pods", "ten")]).is_err());
    }
}
