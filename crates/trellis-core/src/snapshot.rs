//! Read-only, serializable result of one run

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::aggregation::AggregateReport;
use crate::error::CoreResult;
use crate::graph::DependencyGraph;
use crate::model::{AggregateResult, Component, DependencyEdge, Unit};
use crate::table::ComponentTable;
use crate::warnings::Warning;

/// Bumped whenever a field is renamed or removed.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Everything a report layer needs, with stable field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub format_version: u32,
    pub platform: String,
    pub schema_version: String,
    pub catalog_version: String,
    pub generated_at: String,
    pub document_hash: String,
    /// False when the run was cancelled and results are partial.
    pub complete: bool,
    pub units: Vec<Unit>,
    pub components: Vec<Component>,
    pub edges: Vec<DependencyEdge>,
    pub aggregates: Vec<AggregateResult>,
    pub cycles: Vec<Vec<String>>,
    pub warnings: Vec<Warning>,
}

impl AnalysisSnapshot {
    /// Assemble a snapshot from the pieces of a run.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        platform: &str,
        schema_version: &str,
        catalog_version: &str,
        document_hash: String,
        units: Vec<Unit>,
        table: ComponentTable,
        graph: &DependencyGraph,
        report: Option<AggregateReport>,
        warnings: Vec<Warning>,
    ) -> Self {
        let complete = report.is_some();
        let report = report.unwrap_or_default();
        AnalysisSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            platform: platform.to_string(),
            schema_version: schema_version.to_string(),
            catalog_version: catalog_version.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            document_hash,
            complete,
            units,
            components: table.into_components(),
            edges: graph.edges(),
            aggregates: report.results,
            cycles: report.cycles,
            warnings,
        }
    }

    /// Rebuild the component table.
    pub fn table(&self) -> ComponentTable {
        ComponentTable::from_components(self.components.iter().cloned())
    }

    /// Rebuild the dependency graph.
    pub fn graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::from_edges(self.edges.iter().cloned());
        for component in &self.components {
            graph.add_node(&component.canonical_id);
        }
        graph
    }

    pub fn aggregate(&self, id: &str) -> Option<&AggregateResult> {
        self.aggregates.iter().find(|r| r.component_id == id)
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.canonical_id == id)
    }

    pub fn dangling_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter().filter(|e| e.is_dangling())
    }

    pub fn to_json_pretty(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Hex SHA-256 of a byte string.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
