//! Complexity propagation over the dependency graph
//!
//! `effective(c) = max(own(c), effective(d) for every dependency d of c)`.
//! Strongly connected components are found first (Tarjan: depth-first with an
//! on-stack marker), so every member of a cycle receives the same level: the
//! join of the cycle's own levels and everything the cycle depends on. Each
//! component is resolved once, after all of its successors, so the result is
//! independent of traversal order. Weakly connected groups share no edges and
//! are propagated in parallel.

use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::graph::DependencyGraph;
use crate::model::{AggregateResult, ComplexityLevel, Component};
use crate::table::ComponentTable;

/// Aggregation output for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    /// One result per component, in canonical-id order.
    pub results: Vec<AggregateResult>,
    /// Cycles found in the graph, each sorted, listed in id order.
    pub cycles: Vec<Vec<String>>,
}

impl AggregateReport {
    pub fn get(&self, id: &str) -> Option<&AggregateResult> {
        self.results
            .binary_search_by(|r| r.component_id.as_str().cmp(id))
            .ok()
            .map(|i| &self.results[i])
    }

    pub fn effective(&self, id: &str) -> Option<ComplexityLevel> {
        self.get(id).map(|r| r.effective_complexity)
    }

    /// Results for container components only.
    pub fn containers(&self) -> impl Iterator<Item = &AggregateResult> {
        self.results
            .iter()
            .filter(|r| r.component_type.is_container())
    }
}

/// What every member of one strongly connected component shares.
struct Summary {
    level: ComplexityLevel,
    contributors: BTreeSet<String>,
    unresolved: BTreeSet<String>,
}

/// Compute effective complexity for every component in `table`.
///
/// Every component must already carry an intrinsic level. Edges pointing at
/// ids missing from the table contribute `low` and are reported through
/// `unresolved_ids`.
pub fn aggregate(table: &ComponentTable, graph: &DependencyGraph) -> CoreResult<AggregateReport> {
    if let Some(id) = table.unclassified().next() {
        return Err(CoreError::Unclassified(id.to_string()));
    }

    let mut sccs = graph.strongly_connected();
    // Components the graph never saw have no dependencies.
    for id in table.ids() {
        if !graph.contains(id) {
            sccs.push(vec![id.to_string()]);
        }
    }

    let cycles: Vec<Vec<String>> = {
        let mut cycles: Vec<Vec<String>> = sccs.iter().filter(|scc| scc.len() > 1).cloned().collect();
        cycles.sort();
        cycles
    };
    for cycle in &cycles {
        tracing::debug!(members = cycle.len(), "Cycle detected: {}", cycle.join(" -> "));
    }

    // Bucket SCCs by weakly connected group, keeping reverse topological order.
    let mut group_of: HashMap<&str, usize> = HashMap::new();
    let groups = graph.weakly_connected_groups();
    for (g, group) in groups.iter().enumerate() {
        for id in group {
            group_of.insert(id.as_str(), g);
        }
    }
    let mut buckets: Vec<Vec<&Vec<String>>> = vec![Vec::new(); groups.len()];
    for scc in &sccs {
        match scc.first().and_then(|id| group_of.get(id.as_str())) {
            Some(&g) => buckets[g].push(scc),
            None => buckets.push(vec![scc]),
        }
    }

    let mut results: Vec<AggregateResult> = buckets
        .par_iter()
        .flat_map_iter(|bucket| propagate(bucket, table, graph))
        .collect();
    results.sort_by(|a, b| a.component_id.cmp(&b.component_id));

    tracing::debug!(
        components = results.len(),
        cycles = cycles.len(),
        "Complexity aggregation complete"
    );

    Ok(AggregateReport { results, cycles })
}

/// Resolve one weakly connected group. `sccs` must be in reverse topological order.
fn propagate(sccs: &[&Vec<String>], table: &ComponentTable, graph: &DependencyGraph) -> Vec<AggregateResult> {
    let mut scc_of: HashMap<&str, usize> = HashMap::new();
    let mut summaries: Vec<Summary> = Vec::with_capacity(sccs.len());
    let mut results = Vec::new();

    for (s, members) in sccs.iter().enumerate() {
        for id in members.iter() {
            scc_of.insert(id.as_str(), s);
        }

        let components: Vec<&Component> = members.iter().filter_map(|id| table.get(id)).collect();
        if components.is_empty() {
            // A dangling target: never discovered, contributes nothing.
            summaries.push(Summary {
                level: ComplexityLevel::Low,
                contributors: BTreeSet::new(),
                unresolved: members.iter().cloned().collect(),
            });
            continue;
        }

        let own_join = components
            .iter()
            .filter_map(|c| c.own_complexity)
            .fold(ComplexityLevel::Low, ComplexityLevel::join);

        let successors: BTreeSet<usize> = members
            .iter()
            .flat_map(|id| graph.dependencies(id))
            .filter_map(|dep| scc_of.get(dep).copied())
            .filter(|&t| t != s)
            .collect();

        let level = successors
            .iter()
            .map(|&t| summaries[t].level)
            .fold(own_join, ComplexityLevel::join);

        let mut contributors: BTreeSet<String> = components
            .iter()
            .filter(|c| c.own_complexity == Some(level))
            .map(|c| c.canonical_id.clone())
            .collect();
        let mut unresolved = BTreeSet::new();
        for &t in &successors {
            let successor = &summaries[t];
            if successor.level == level {
                contributors.extend(successor.contributors.iter().cloned());
            }
            unresolved.extend(successor.unresolved.iter().cloned());
        }

        let in_cycle = members.len() > 1;
        for component in &components {
            let own = component.own_complexity.unwrap_or(ComplexityLevel::Low);
            let decisive_id = contributors
                .iter()
                .find(|id| **id != component.canonical_id)
                .cloned()
                .unwrap_or_else(|| component.canonical_id.clone());
            results.push(AggregateResult {
                component_id: component.canonical_id.clone(),
                component_type: component.component_type,
                own_complexity: own,
                effective_complexity: level,
                contributing_ids: contributors.clone(),
                unresolved_ids: unresolved.clone(),
                decisive_id,
                in_cycle,
            });
        }

        summaries.push(Summary {
            level,
            contributors,
            unresolved,
        });
    }

    results
}
