//! Classification contract between the aggregator and whatever answers it

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use trellis_core::{ComplexityLevel, Component, ComponentType, FeatureValue};

use crate::rules::RuleCatalog;

/// The facts a classifier may look at: one component, never its neighbours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub component_id: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub native_type: String,
    pub attributes: BTreeMap<String, String>,
    pub features: BTreeMap<String, FeatureValue>,
}

impl ClassificationRequest {
    pub fn from_component(component: &Component) -> Self {
        ClassificationRequest {
            component_id: component.canonical_id.clone(),
            component_type: component.component_type,
            native_type: component.native_type.clone(),
            attributes: component.raw_attributes.clone(),
            features: component.features.clone(),
        }
    }

    /// Values of a feature, or of an attribute when no feature has that name.
    pub fn values(&self, field: &str) -> Vec<&str> {
        match self.features.get(field) {
            Some(feature) => feature.values(),
            None => self.attributes.get(field).map(String::as_str).into_iter().collect(),
        }
    }

    /// Numeric reading of a feature or attribute.
    pub fn count(&self, field: &str) -> Option<f64> {
        match self.features.get(field) {
            Some(feature) => feature.as_count(),
            None => self.attributes.get(field).and_then(|v| v.trim().parse().ok()),
        }
    }

    /// SHA-256 over the classifier inputs and the catalog identity. The id is
    /// left out: identical facts under the same catalog get the same answer.
    pub fn content_hash(&self, catalog: &RuleCatalog) -> String {
        let facts = serde_json::json!({
            "type": self.component_type,
            "native_type": self.native_type,
            "attributes": self.attributes,
            "features": self.features,
            "platform": catalog.platform,
            "catalog_version": catalog.version,
        });
        format!("{:x}", Sha256::digest(facts.to_string().as_bytes()))
    }
}

/// A classifier's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub level: ComplexityLevel,
    pub reasoning: String,
    /// Catalog rule the answer rests on; `None` when the catalog default applied.
    pub matched_rule: Option<String>,
}

/// Assigns an intrinsic complexity level to one component.
///
/// Implementations must only cite rules present in the catalog and should be
/// deterministic enough for their answers to be cached by content hash.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, request: &ClassificationRequest, catalog: &RuleCatalog) -> Result<Classification>;

    /// Provider name, recorded with every answer.
    fn name(&self) -> &str;
}
