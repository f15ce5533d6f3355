//! Constant store and `${name}` placeholder substitution.
//!
//! The store keeps constants in insertion order. Redefining a constant
//! overwrites its value but keeps its original position, so substitution
//! order only depends on when a name was first defined.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How placeholders are expanded in a string field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubstitutionMode {
    /// Replace one constant at a time, in insertion order, over the whole
    /// string. Text inserted for an earlier constant is scanned again for
    /// later constants.
    #[default]
    Chained,
    /// Single left-to-right scan. Inserted values are never rescanned.
    SinglePass,
}

/// Insertion-ordered mapping from constant name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantStore {
    values: IndexMap<String, String>,
}

impl ConstantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or overwrite a constant. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate constants in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True if `text` still contains a placeholder for a defined constant.
    pub fn has_defined_placeholder(&self, text: &str) -> bool {
        self.values.keys().any(|key| text.contains(&placeholder(key)))
    }

    /// Expand `${name}` placeholders in `text` using the current values.
    ///
    /// Placeholders for undefined names are left untouched.
    pub fn substitute(&self, text: &str, mode: SubstitutionMode) -> String {
        match mode {
            SubstitutionMode::Chained => self.substitute_chained(text),
            SubstitutionMode::SinglePass => self.substitute_single_pass(text),
        }
    }

    fn substitute_chained(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (key, value) in &self.values {
            let needle = placeholder(key);
            if result.contains(&needle) {
                result = result.replace(&needle, value);
            }
        }
        result
    }

    fn substitute_single_pass(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];

            let resolved = after_open
                .find('}')
                .and_then(|end| self.get(&after_open[..end]).map(|value| (end, value)));

            match resolved {
                Some((end, value)) => {
                    result.push_str(value);
                    rest = &after_open[end + 1..];
                }
                None => {
                    // Keep the `$` and rescan from the brace so nested
                    // placeholders such as `${a${b}}` still resolve `${b}`.
                    result.push('$');
                    rest = &rest[start + 1..];
                }
            }
        }

        result.push_str(rest);
        result
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConstantStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = ConstantStore::new();
        for (key, value) in iter {
            store.insert(key, value);
        }
        store
    }
}

fn placeholder(key: &str) -> String {
    format!("${{{key}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_replaces_every_occurrence() {
        let store: ConstantStore = [("NAME", "app")].into_iter().collect();
        assert_eq!(
            store.substitute("src/${NAME}/${NAME}.txt", SubstitutionMode::Chained),
            "src/app/app.txt"
        );
        assert_eq!(
            store.substitute("src/${NAME}/${NAME}.txt", SubstitutionMode::SinglePass),
            "src/app/app.txt"
        );
    }

    #[test]
    fn test_unresolved_placeholder_left_verbatim() {
        let store: ConstantStore = [("A", "1")].into_iter().collect();
        for mode in [SubstitutionMode::Chained, SubstitutionMode::SinglePass] {
            assert_eq!(store.substitute("${A}-${B}", mode), "1-${B}");
            assert_eq!(store.substitute("${unterminated", mode), "${unterminated");
        }
    }

    #[test]
    fn test_chained_mode_rescans_inserted_values() {
        // FIRST was inserted before SECOND, so its replacement is scanned again.
        let store: ConstantStore = [("FIRST", "${SECOND}/bin"), ("SECOND", "/opt")]
            .into_iter()
            .collect();
        assert_eq!(
            store.substitute("${FIRST}", SubstitutionMode::Chained),
            "/opt/bin"
        );
        assert_eq!(
            store.substitute("${FIRST}", SubstitutionMode::SinglePass),
            "${SECOND}/bin"
        );
    }

    #[test]
    fn test_chained_mode_is_order_sensitive() {
        // SECOND's value references FIRST, but FIRST was already processed.
        let store: ConstantStore = [("FIRST", "/opt"), ("SECOND", "${FIRST}/bin")]
            .into_iter()
            .collect();
        assert_eq!(
            store.substitute("${SECOND}", SubstitutionMode::Chained),
            "${FIRST}/bin"
        );
    }

    #[test]
    fn test_single_pass_resolves_inner_placeholder() {
        let store: ConstantStore = [("b", "x")].into_iter().collect();
        assert_eq!(
            store.substitute("${a${b}}", SubstitutionMode::SinglePass),
            "${ax}"
        );
    }

    #[test]
    fn test_overwrite_keeps_insertion_position() {
        let mut store = ConstantStore::new();
        store.insert("A", "1");
        store.insert("B", "2");
        assert_eq!(store.insert("A", "3"), Some("1".to_string()));

        let keys: Vec<&str> = store.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(store.get("A"), Some("3"));
    }

    #[test]
    fn test_has_defined_placeholder() {
        let store: ConstantStore = [("A", "1")].into_iter().collect();
        assert!(store.has_defined_placeholder("x${A}"));
        assert!(!store.has_defined_placeholder("x${B}"));
    }
}
