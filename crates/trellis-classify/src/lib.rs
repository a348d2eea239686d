//! Intrinsic complexity classification of individual components
//!
//! Classifiers see one component at a time and answer with a level backed by
//! a rule from a versioned catalog. The runner fans calls out under a
//! concurrency bound with timeouts, retries, caching and cancellation.

pub mod bridge;
pub mod cache;
pub mod error;
pub mod providers;
pub mod rules;
pub mod scheduler;


pub use bridge::{Classification, ClassificationRequest, Classifier};
pub use cache::{CacheStats, ClassificationCache};
pub use error::CatalogError;
pub use providers::{RemoteClassifier, RulesClassifier, create_classifier};
pub use rules::{Condition, Rule, RuleCatalog};
pub use scheduler::{
    ClassificationOutcome, ClassificationRunner, ClassifiedComponent, ClassifyLimits, FALLBACK_LEVEL,
};
