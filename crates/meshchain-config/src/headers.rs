//! HTTP header modification directives carried by routes and splits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Headers to add, set, or remove on a request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeaderModifiers {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

impl HttpHeaderModifiers {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.set.is_empty() && self.remove.is_empty()
    }

    /// Merge `overrides` on top of `base`.
    ///
    /// Keys in `overrides` win for `add` and `set`; removals from both are
    /// kept, overrides first, without duplicates.
    pub fn merge(base: Option<&Self>, overrides: Option<&Self>) -> Option<Self> {
        match (base, overrides) {
            (None, None) => None,
            (Some(base), None) => Some(base.clone()),
            (None, Some(overrides)) => Some(overrides.clone()),
            (Some(base), Some(overrides)) => {
                let mut merged = overrides.clone();
                for (k, v) in &base.add {
                    merged.add.entry(k.clone()).or_insert_with(|| v.clone());
                }
                for (k, v) in &base.set {
                    merged.set.entry(k.clone()).or_insert_with(|| v.clone());
                }
                for name in &base.remove {
                    if !merged.remove.contains(name) {
                        merged.remove.push(name.clone());
                    }
                }
                Some(merged)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modifiers(add: &[(&str, &str)], remove: &[&str]) -> HttpHeaderModifiers {
        HttpHeaderModifiers {
            add: add
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            set: BTreeMap::new(),
            remove: remove.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn overrides_win_per_key() {
        let base = modifiers(&[("x-a", "base"), ("x-b", "base")], &["x-drop"]);
        let over = modifiers(&[("x-a", "child")], &["x-other", "x-drop"]);

        let merged = HttpHeaderModifiers::merge(Some(&base), Some(&over)).unwrap();
        assert_eq!(merged.add["x-a"], "child");
        assert_eq!(merged.add["x-b"], "base");
        assert_eq!(merged.remove, vec!["x-other", "x-drop"]);
    }

    #[test]
    fn merge_of_nothing_is_nothing() {
        assert!(HttpHeaderModifiers::merge(None, None).is_none());
    }

    #[test]
    fn base_only_passes_through() {
        let base = modifiers(&[("x-a", "1")], &[]);
        assert_eq!(HttpHeaderModifiers::merge(Some(&base), None), Some(base));
    }
}
