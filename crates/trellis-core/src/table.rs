//! Component table keyed by canonical id

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::model::{ClassificationNote, ComplexityLevel, Component, ComponentType, FeatureValue};

/// Longest scalar kept in an index entry's feature summary.
const SUMMARY_VALUE_LIMIT: usize = 80;

/// Result of merging one discovered record into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Merged,
    /// The id is already taken by a component of another type; nothing changed.
    Conflict { existing: ComponentType },
}

/// Lookup entry: where a component lives and what it looks like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub canonical_id: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub unit_index: usize,
    pub unit_path: String,
    pub feature_summary: BTreeMap<String, String>,
}

/// Every component of a run, exactly one entry per canonical id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentTable {
    components: BTreeMap<String, Component>,
}

impl ComponentTable {
    pub fn new() -> Self {
        ComponentTable {
            components: BTreeMap::new(),
        }
    }

    pub fn from_components(components: impl IntoIterator<Item = Component>) -> Self {
        let mut table = ComponentTable::new();
        for component in components {
            table.merge(component);
        }
        table
    }

    /// Merge a discovered record.
    ///
    /// The first writer wins for display name, native type, attributes and
    /// scalar features. List features are unioned in first-seen order.
    pub fn merge(&mut self, incoming: Component) -> MergeOutcome {
        let existing = match self.components.entry(incoming.canonical_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(incoming);
                return MergeOutcome::Inserted;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        if existing.component_type != incoming.component_type {
            return MergeOutcome::Conflict {
                existing: existing.component_type,
            };
        }

        for (key, value) in incoming.raw_attributes {
            existing.raw_attributes.entry(key).or_insert(value);
        }
        for (key, value) in incoming.features {
            match existing.features.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(mut slot) => merge_feature(slot.get_mut(), value),
            }
        }
        for unit in incoming.seen_in_units {
            if !existing.seen_in_units.contains(&unit) {
                existing.seen_in_units.push(unit);
            }
        }
        MergeOutcome::Merged
    }

    pub fn get(&self, id: &str) -> Option<&Component> {
        self.components.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Component> {
        self.components.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components in canonical-id order.
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn of_type(&self, component_type: ComponentType) -> impl Iterator<Item = &Component> {
        self.components
            .values()
            .filter(move |c| c.component_type == component_type)
    }

    /// Record a component's intrinsic level.
    pub fn set_own_complexity(
        &mut self,
        id: &str,
        level: ComplexityLevel,
        note: Option<ClassificationNote>,
    ) -> CoreResult<()> {
        self.components
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownComponent(id.to_string()))?
            .set_own_complexity(level, note)
    }

    /// Ids that still lack an intrinsic level.
    pub fn unclassified(&self) -> impl Iterator<Item = &str> {
        self.components
            .values()
            .filter(|c| c.own_complexity.is_none())
            .map(|c| c.canonical_id.as_str())
    }

    /// Canonical id → physical location and feature summary.
    pub fn index_entries(&self) -> BTreeMap<String, IndexEntry> {
        self.components
            .values()
            .map(|c| {
                let entry = IndexEntry {
                    canonical_id: c.canonical_id.clone(),
                    component_type: c.component_type,
                    unit_index: c.unit_ref.unit_index,
                    unit_path: c.unit_ref.unit_path.clone(),
                    feature_summary: c
                        .features
                        .iter()
                        .map(|(key, value)| (key.clone(), summarize(value)))
                        .collect(),
                };
                (c.canonical_id.clone(), entry)
            })
            .collect()
    }

    pub fn into_components(self) -> Vec<Component> {
        self.components.into_values().collect()
    }
}

fn merge_feature(existing: &mut FeatureValue, incoming: FeatureValue) {
    if let (FeatureValue::List(current), FeatureValue::List(more)) = (existing, incoming) {
        for item in more {
            if !current.contains(&item) {
                current.push(item);
            }
        }
    }
}

fn summarize(value: &FeatureValue) -> String {
    match value {
        FeatureValue::Scalar(s) if s.chars().count() > SUMMARY_VALUE_LIMIT => {
            let head: String = s.chars().take(SUMMARY_VALUE_LIMIT).collect();
            format!("{}…", head)
        }
        FeatureValue::Scalar(s) => s.clone(),
        FeatureValue::List(items) => format!("{} item(s)", items.len()),
    }
}
