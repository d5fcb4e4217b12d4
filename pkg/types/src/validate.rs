use anyhow::{Result, bail};

use crate::resources::ResourceList;

/// Validate a Kubernetes-style object name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Validate a resource name such as `requests.cpu`, `pods` or
/// `requests.nvidia.com/gpu`: an optional `prefix/` followed by
/// dot-separated lowercase segments.
pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("resource name must not be empty");
    }
    if name.len() > 253 {
        bail!("resource name '{}' exceeds 253 characters", name);
    }
    let (prefix, base) = match name.rsplit_once('/') {
        Some((p, b)) => (Some(p), b),
        None => (None, name),
    };
    if let Some(prefix) = prefix {
        check_dotted(name, prefix)?;
    }
    check_dotted(name, base)
}

fn check_dotted(full: &str, part: &str) -> Result<()> {
    if part.is_empty() || part.split('.').any(|seg| {
        seg.is_empty()
            || seg.starts_with('-')
            || seg.ends_with('-')
            || !seg
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }) {
        bail!(
            "resource name '{}' must be dot-separated segments of [a-z0-9-]",
            full
        );
    }
    Ok(())
}

/// Validate every name in a list and reject negative amounts.
pub fn validate_resource_list(field: &str, list: &ResourceList) -> Result<()> {
    for (name, qty) in list {
        validate_resource_name(name)?;
        if qty.is_negative() {
            bail!("{}[{}] must not be negative (got {})", field, name, qty);
        }
    }
    Ok(())
}
