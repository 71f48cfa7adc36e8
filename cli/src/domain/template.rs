//! Placeholder substitution for embedded artifact templates.
//!
//! Templates use `{{ key }}` placeholders. Substitution is a single pass over
//! the source with values from a sorted map, so the same inputs always give
//! byte-identical output.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex::{Captures, Regex};

use crate::domain::error::DeployError;

/// Matches `{{ key }}` with optional inner whitespace.
pub static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern; cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"\{\{\s*([a-z][a-z0-9_]*)\s*\}\}").expect("valid regex")
});

/// Substitute every placeholder in `source`.
///
/// # Errors
///
/// Returns `DeployError::Configuration` naming every key the template uses
/// that `values` does not provide.
pub fn render_template(
    name: &str,
    source: &str,
    values: &BTreeMap<String, String>,
) -> Result<String> {
    let missing: Vec<&str> = PLACEHOLDER_RE
        .captures_iter(source)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|key| !values.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        let mut keys = missing;
        keys.sort_unstable();
        keys.dedup();
        return Err(DeployError::config(
            format!("template {name} references undefined value(s): {}", keys.join(", ")),
            "check the configuration keys this service needs",
        )
        .into());
    }

    let rendered = PLACEHOLDER_RE.replace_all(source, |c: &Captures<'_>| {
        values.get(&c[1]).cloned().unwrap_or_default()
    });
    Ok(rendered.into_owned())
}

/// Every placeholder key used by `source`, sorted and deduplicated.
#[must_use]
pub fn placeholders(source: &str) -> Vec<String> {
    let mut keys: Vec<String> = PLACEHOLDER_RE
        .captures_iter(source)
        .map(|c| c[1].to_string())
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys
}
