//! Name table for cross-unit reference resolution

use std::collections::HashMap;

use crate::model::ComponentType;

/// Maps display names to canonical ids, per component type.
///
/// Filled while units are merged; queried only after every unit has been
/// seen, so forward references across sibling units resolve.
#[derive(Debug, Default, Clone)]
pub struct NameIndex {
    names: HashMap<(ComponentType, String), String>,
}

impl NameIndex {
    pub fn new() -> Self {
        NameIndex {
            names: HashMap::new(),
        }
    }

    /// Register a name. The first id registered for a (type, name) pair is
    /// kept; returns the id that now owns the name.
    pub fn insert(&mut self, component_type: ComponentType, name: &str, canonical_id: &str) -> &str {
        self.names
            .entry((component_type, normalize_name(name)))
            .or_insert_with(|| canonical_id.to_string())
            .as_str()
    }

    /// Look up a name, restricted to `component_type` when given. Without a
    /// type hint the first match in `ComponentType::ALL` order wins.
    pub fn resolve(&self, name: &str, component_type: Option<ComponentType>) -> Option<&str> {
        let key = normalize_name(name);
        match component_type {
            Some(t) => self.names.get(&(t, key)).map(String::as_str),
            None => ComponentType::ALL
                .into_iter()
                .find_map(|t| self.names.get(&(t, key.clone())))
                .map(String::as_str),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Trim and strip one pair of surrounding brackets: `[Sales]` and `Sales` match.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}
