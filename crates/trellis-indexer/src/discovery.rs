//! Identity & index builder
//!
//! Units are parsed in parallel; their results are merged by a single writer
//! in unit order, so the table is the same on every run. Name references are
//! collected while merging and resolved only after the last unit (two passes
//! over the component arena), which lets a dashboard in one unit refer to a
//! worksheet defined in a later one.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use trellis_core::{
    Component, ComponentTable, ComponentType, DependencyEdge, DependencyGraph, IndexEntry, MergeOutcome,
    NameIndex, RelationKind, Unit, UnitRef, WarningKind, Warnings, normalize_name,
};

use crate::parser::{ParseFailure, RawComponent, RefKey, UnitDiscovery, UnitParser};
use crate::schema::PlatformSchema;

/// Prefix of the synthetic target id of an unresolved name reference.
pub const UNRESOLVED_PREFIX: &str = "unresolved:";

/// Everything discovery produced for one document.
#[derive(Debug, Default)]
pub struct Discovery {
    pub table: ComponentTable,
    pub graph: DependencyGraph,
    pub warnings: Warnings,
    /// Units that were handed to the parser (failures included).
    pub units_processed: usize,
    /// Whether the run token fired before every unit was parsed.
    pub cancelled: bool,
}

impl Discovery {
    /// Canonical id → physical location and feature summary.
    pub fn index(&self) -> BTreeMap<String, IndexEntry> {
        self.table.index_entries()
    }
}

/// A reference that has to wait for every unit.
struct PendingRef {
    from_id: String,
    to: RefKey,
    kind: RelationKind,
    target_type: ComponentType,
    soft: bool,
}

/// Discover components and dependencies in `units`.
pub fn discover(
    units: &[Unit],
    schema: &PlatformSchema,
    parser: &dyn UnitParser,
    cancel: &CancellationToken,
) -> Discovery {
    tracing::info!(
        units = units.len(),
        platform = %schema.platform,
        parser = parser.name(),
        "Discovering components"
    );

    let parsed: Vec<Option<(UnitDiscovery, Option<ParseFailure>)>> = units
        .par_iter()
        .map(|unit| {
            if cancel.is_cancelled() {
                return None;
            }
            Some(parser.parse(unit, schema))
        })
        .collect();

    let mut builder = Builder::new(schema);
    let mut skipped = 0;
    for (unit, result) in units.iter().zip(parsed) {
        let Some((discovery, failure)) = result else {
            skipped += 1;
            continue;
        };
        builder.units_processed += 1;
        match failure {
            Some(failure) => builder.warnings.record(
                WarningKind::DiscoveryFailure,
                failure.unit_path,
                format!("unit {} skipped: {}", failure.unit_index, failure.message),
            ),
            None => builder.merge_unit(unit, discovery),
        }
    }

    if skipped > 0 {
        builder.warnings.record(
            WarningKind::Cancelled,
            "discovery",
            format!("{} of {} units were not parsed", skipped, units.len()),
        );
    }

    let mut discovery = builder.finish();
    discovery.cancelled = skipped > 0;
    discovery
}

struct Builder<'s> {
    schema: &'s PlatformSchema,
    table: ComponentTable,
    graph: DependencyGraph,
    names: NameIndex,
    pending: Vec<PendingRef>,
    warnings: Warnings,
    units_processed: usize,
}

impl<'s> Builder<'s> {
    fn new(schema: &'s PlatformSchema) -> Self {
        Builder {
            schema,
            table: ComponentTable::new(),
            graph: DependencyGraph::new(),
            names: NameIndex::new(),
            pending: Vec::new(),
            warnings: Warnings::new(),
            units_processed: 0,
        }
    }

    /// Pass 1 for one unit: merge its components and bind what can be bound now.
    fn merge_unit(&mut self, unit: &Unit, discovery: UnitDiscovery) {
        let unit_path = unit.path.to_string();
        let mut local_ids: Vec<Option<String>> = Vec::with_capacity(discovery.components.len());

        for raw in discovery.components {
            let id = self.merge_component(unit, &unit_path, raw);
            local_ids.push(id);
        }

        for relation in discovery.relations {
            let Some(Some(from_id)) = local_ids.get(relation.from) else {
                continue;
            };
            match relation.to {
                RefKey::Local(target) => {
                    if let Some(Some(to_id)) = local_ids.get(target) {
                        self.graph
                            .add_edge(DependencyEdge::new(from_id.as_str(), to_id.as_str(), relation.kind));
                    }
                }
                RefKey::Id(id) if !relation.soft => {
                    self.graph
                        .add_edge(DependencyEdge::new(from_id.as_str(), id, relation.kind));
                }
                to => self.pending.push(PendingRef {
                    from_id: from_id.clone(),
                    to,
                    kind: relation.kind,
                    target_type: relation.target_type,
                    soft: relation.soft,
                }),
            }
        }
    }

    /// Normalize one raw component and merge it; returns its canonical id
    /// when it made it into the table.
    fn merge_component(&mut self, unit: &Unit, unit_path: &str, raw: RawComponent) -> Option<String> {
        let Some(component_type) = raw
            .component_type
            .or_else(|| self.schema.normalize(&raw.native_type))
        else {
            self.warnings.record(
                WarningKind::DiscoveryFailure,
                unit_path,
                format!("native kind '{}' has no canonical type", raw.native_type),
            );
            return None;
        };

        let Some(canonical_id) = self.canonical_id(&raw, component_type) else {
            self.warnings.record(
                WarningKind::MissingIdentity,
                unit_path,
                format!(
                    "{} '{}' carries none of the identity attributes",
                    raw.native_type,
                    raw.display_name.as_deref().unwrap_or("?")
                ),
            );
            return None;
        };

        let display_name = raw.display_name.unwrap_or_else(|| canonical_id.clone());
        let mut component = Component::new(
            canonical_id.as_str(),
            display_name.as_str(),
            component_type,
            raw.native_type,
            UnitRef {
                unit_index: unit.index,
                unit_path: unit_path.to_string(),
            },
        );
        component.raw_attributes = raw.attributes;
        component.features = raw.features;

        match self.table.merge(component) {
            MergeOutcome::Inserted | MergeOutcome::Merged => {
                let owner = self.names.insert(component_type, &display_name, &canonical_id).to_string();
                if owner != canonical_id {
                    self.warnings.record(
                        WarningKind::AmbiguousName,
                        display_name.as_str(),
                        format!(
                            "{} name is shared by {} and {}; references resolve to {}",
                            component_type, owner, canonical_id, owner
                        ),
                    );
                }
                self.graph.add_node(&canonical_id);
                Some(canonical_id)
            }
            MergeOutcome::Conflict { existing } => {
                self.warnings.record(
                    WarningKind::IdentityConflict,
                    canonical_id,
                    format!(
                        "discovered as {} in {} but already recorded as {}",
                        component_type, unit_path, existing
                    ),
                );
                None
            }
        }
    }

    /// Schema precedence when the kind is known, otherwise the first usable candidate.
    fn canonical_id(&self, raw: &RawComponent, component_type: ComponentType) -> Option<String> {
        let kind = self
            .schema
            .kinds_for(&raw.native_type)
            .find(|k| self.schema.type_of(k) == Some(component_type));
        match kind {
            Some(kind) => self.schema.canonical_id(kind, &raw.identity),
            None => raw
                .identity
                .iter()
                .map(|(_, value)| value.trim())
                .find(|value| !value.is_empty())
                .map(str::to_string),
        }
    }

    /// Pass 2: resolve deferred references against the complete tables.
    fn finish(mut self) -> Discovery {
        let pending = std::mem::take(&mut self.pending);
        let mut dropped = 0;
        for reference in pending {
            match reference.to {
                RefKey::Name(name) => match self.names.resolve(&name, Some(reference.target_type)) {
                    Some(id) => {
                        let edge = DependencyEdge::new(reference.from_id.as_str(), id, reference.kind)
                            .with_reference(name.as_str());
                        self.graph.add_edge(edge);
                    }
                    None if reference.soft => dropped += 1,
                    None => {
                        let target = format!("{}{}", UNRESOLVED_PREFIX, normalize_name(&name));
                        let edge = DependencyEdge::dangling(
                            reference.from_id.as_str(),
                            target,
                            reference.kind,
                            name.as_str(),
                        );
                        if self.graph.add_edge(edge) {
                            self.warnings.record(
                                WarningKind::UnresolvedReference,
                                name.as_str(),
                                format!(
                                    "{} references no discovered {} by this name ({})",
                                    reference.from_id, reference.target_type, reference.kind
                                ),
                            );
                        }
                    }
                },
                RefKey::Id(id) => {
                    let id = id.trim();
                    let matches_type = self
                        .table
                        .get(id)
                        .is_some_and(|c| c.component_type == reference.target_type);
                    if matches_type {
                        self.graph
                            .add_edge(DependencyEdge::new(reference.from_id.as_str(), id, reference.kind));
                    } else {
                        dropped += 1;
                    }
                }
                RefKey::Local(_) => {}
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "Soft references without a matching component dropped");
        }

        let table = &self.table;
        for edge in self.graph.mark_dangling(|id| table.contains(id)) {
            self.warnings.record(
                WarningKind::UnresolvedReference,
                edge.to_id.as_str(),
                format!("{} references id '{}' that was never discovered", edge.from_id, edge.to_id),
            );
        }

        tracing::info!(
            components = self.table.len(),
            edges = self.graph.edge_count(),
            dangling = self.graph.dangling_edges().count(),
            warnings = self.warnings.len(),
            "Discovery complete"
        );

        Discovery {
            table: self.table,
            graph: self.graph,
            warnings: self.warnings,
            units_processed: self.units_processed,
            cancelled: false,
        }
    }
}
