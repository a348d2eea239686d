//! Classifier implementations

pub mod remote;
pub mod rules;

use anyhow::{Result, bail};

use crate::bridge::Classifier;

pub use remote::RemoteClassifier;
pub use rules::RulesClassifier;

/// Create a classifier by name.
pub fn create_classifier(
    provider: &str,
    endpoint: Option<String>,
    api_key: Option<String>,
) -> Result<Box<dyn Classifier>> {
    match provider.to_lowercase().as_str() {
        "rules" | "local" => Ok(Box::new(RulesClassifier::new())),
        "remote" | "http" => match endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => Ok(Box::new(RemoteClassifier::new(endpoint, api_key))),
            _ => bail!("The remote classifier needs an endpoint URL"),
        },
        _ => bail!("Unknown classifier: {}", provider),
    }
}
