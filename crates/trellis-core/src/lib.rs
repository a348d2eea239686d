//! Component model, dependency graph and complexity aggregation

pub mod model;
pub mod error;
pub mod warnings;
pub mod table;
pub mod graph;
pub mod symbols;
pub mod aggregation;
pub mod snapshot;
pub mod cache;


pub use model::{
    AggregateResult, ClassificationNote, ComplexityLevel, Component, ComponentType, DependencyEdge,
    FeatureValue, NamespaceDecl, PathSegment, RelationKind, Resolution, Unit, UnitPath, UnitRef,
    UnitStatus,
};
pub use error::{CoreError, CoreResult};
pub use warnings::{Warning, WarningKind, Warnings};
pub use table::{ComponentTable, IndexEntry, MergeOutcome};
pub use graph::DependencyGraph;
pub use symbols::{NameIndex, normalize_name};
pub use aggregation::{AggregateReport, aggregate};
pub use snapshot::{AnalysisSnapshot, SNAPSHOT_FORMAT_VERSION, content_hash};
pub use cache::{CACHE_DIR, cache_dir, cache_key, clear_cache, load_snapshot, save_snapshot, snapshot_path};
