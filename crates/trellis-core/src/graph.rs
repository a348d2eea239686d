//! Dependency graph over canonical ids using petgraph::StableDiGraph

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{EdgeRef, NodeIndexable};

use crate::model::{DependencyEdge, RelationKind, Resolution};

/// Directed "uses/contains" graph. Nodes are canonical ids; an id may be
/// referenced by an edge without being present in the component table.
pub struct DependencyGraph {
    inner: StableDiGraph<String, DependencyEdge>,
    index: HashMap<String, NodeIndex>,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
        }
    }

    pub fn from_edges(edges: impl IntoIterator<Item = DependencyEdge>) -> Self {
        let mut graph = DependencyGraph::new();
        for edge in edges {
            graph.add_edge(edge);
        }
        graph
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.inner.add_node(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    /// Register a component so it takes part in traversal even without edges.
    pub fn add_node(&mut self, id: &str) {
        self.ensure_node(id);
    }

    /// Add an edge. Self-loops and exact duplicates (same endpoints and kind)
    /// are ignored; returns whether the edge was inserted.
    pub fn add_edge(&mut self, edge: DependencyEdge) -> bool {
        if edge.from_id == edge.to_id {
            return false;
        }
        if self.has_edge_between(&edge.from_id, &edge.to_id, edge.relation_kind) {
            return false;
        }
        let source = self.ensure_node(&edge.from_id);
        let target = self.ensure_node(&edge.to_id);
        self.inner.add_edge(source, target, edge);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
            .map(String::as_str)
    }

    pub fn all_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.inner
            .edge_indices()
            .filter_map(move |idx| self.inner.edge_weight(idx))
    }

    /// Outgoing edges of `id`, sorted by target id.
    pub fn edges_from(&self, id: &str) -> Vec<&DependencyEdge> {
        self.edges_directed(id, Direction::Outgoing)
    }

    /// Incoming edges of `id`, sorted by source id.
    pub fn edges_to(&self, id: &str) -> Vec<&DependencyEdge> {
        self.edges_directed(id, Direction::Incoming)
    }

    fn edges_directed(&self, id: &str, direction: Direction) -> Vec<&DependencyEdge> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&DependencyEdge> = self
            .inner
            .edges_directed(idx, direction)
            .filter_map(|edge_ref| self.inner.edge_weight(edge_ref.id()))
            .collect();
        edges.sort_by(|a, b| {
            (&a.from_id, &a.to_id, a.relation_kind).cmp(&(&b.from_id, &b.to_id, b.relation_kind))
        });
        edges
    }

    /// Direct dependency ids of `id`, deduplicated and sorted.
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        let ids: BTreeSet<&str> = self
            .edges_from(id)
            .into_iter()
            .map(|e| e.to_id.as_str())
            .collect();
        ids.into_iter().collect()
    }

    pub fn has_edge_between(&self, from: &str, to: &str, kind: RelationKind) -> bool {
        let (Some(&source), Some(&target)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        self.inner
            .edges_directed(source, Direction::Outgoing)
            .any(|e| e.target() == target && e.weight().relation_kind == kind)
    }

    pub fn dangling_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.all_edges().filter(|e| e.is_dangling())
    }

    /// Flag every edge whose target is not known as dangling. Returns the
    /// edges that changed state.
    pub fn mark_dangling(&mut self, is_known: impl Fn(&str) -> bool) -> Vec<DependencyEdge> {
        let mut changed = Vec::new();
        let edge_ids: Vec<_> = self.inner.edge_indices().collect();
        for idx in edge_ids {
            if let Some(edge) = self.inner.edge_weight_mut(idx) {
                if edge.resolution == Resolution::Resolved && !is_known(&edge.to_id) {
                    edge.resolution = Resolution::Dangling;
                    if edge.reference.is_none() {
                        edge.reference = Some(edge.to_id.clone());
                    }
                    changed.push(edge.clone());
                }
            }
        }
        changed
    }

    /// Strongly connected components in reverse topological order: every
    /// component appears after all components it depends on.
    pub fn strongly_connected(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.inner)
            .into_iter()
            .map(|scc| {
                let mut members: Vec<String> = scc
                    .into_iter()
                    .filter_map(|idx| self.inner.node_weight(idx).cloned())
                    .collect();
                members.sort();
                members
            })
            .collect()
    }

    /// Partition of node ids into weakly connected groups, each sorted,
    /// groups ordered by their smallest id.
    pub fn weakly_connected_groups(&self) -> Vec<Vec<String>> {
        let mut sets = UnionFind::<usize>::new(self.inner.node_bound());
        for idx in self.inner.edge_indices() {
            if let Some((source, target)) = self.inner.edge_endpoints(idx) {
                sets.union(source.index(), target.index());
            }
        }

        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for idx in self.inner.node_indices() {
            if let Some(id) = self.inner.node_weight(idx) {
                groups.entry(sets.find(idx.index())).or_default().push(id.clone());
            }
        }

        let mut groups: Vec<Vec<String>> = groups
            .into_values()
            .map(|mut group| {
                group.sort();
                group
            })
            .collect();
        groups.sort();
        groups
    }

    /// Every id reachable from `id`, excluding `id` unless it sits on a cycle.
    pub fn descendants(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut to_visit: Vec<&str> = self.dependencies(id);

        while let Some(current) = to_visit.pop() {
            if seen.insert(current.to_string()) {
                to_visit.extend(self.dependencies(current));
            }
        }

        seen
    }

    /// All edges, sorted, for serialization.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self.all_edges().cloned().collect();
        edges.sort_by(|a, b| {
            (&a.from_id, &a.to_id, a.relation_kind).cmp(&(&b.from_id, &b.to_id, b.relation_kind))
        });
        edges
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
