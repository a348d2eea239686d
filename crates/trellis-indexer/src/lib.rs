//! Document splitting, schema-driven parsing and component discovery

pub mod error;
pub mod xml;
pub mod splitter;
pub mod schema;
pub mod parser;
pub mod discovery;

#[cfg(test)]
mod tests;

pub use error::{SchemaError, SplitError};
pub use splitter::{DEFAULT_MAX_DEPTH, DEFAULT_SIZE_BUDGET, SplitConfig, SplitOutcome, split};
pub use schema::{FeatureExtract, FeatureSpec, KindSpec, PlatformSchema, RefBy, RelationSpec, Selector};
pub use parser::{ParseFailure, RawComponent, RawRelation, RefKey, SchemaParser, UnitDiscovery, UnitParser};
pub use discovery::{Discovery, UNRESOLVED_PREFIX, discover};
