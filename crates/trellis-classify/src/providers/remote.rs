//! HTTP classifier: posts one component and its type's rules, reads back a level

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use trellis_core::ComplexityLevel;

use crate::bridge::{Classification, ClassificationRequest, Classifier};
use crate::rules::{Rule, RuleCatalog};

pub struct RemoteClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RemoteClassifier {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.or_else(|| std::env::var("TRELLIS_API_KEY").ok()).filter(|k| !k.is_empty()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Serialize)]
struct RemoteRequest<'a> {
    component: &'a ClassificationRequest,
    platform: &'a str,
    catalog_version: &'a str,
    default_level: ComplexityLevel,
    rules: &'a [Rule],
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    level: ComplexityLevel,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    matched_rule: Option<String>,
}

#[async_trait::async_trait]
impl Classifier for RemoteClassifier {
    async fn classify(&self, request: &ClassificationRequest, catalog: &RuleCatalog) -> Result<Classification> {
        let body = RemoteRequest {
            component: request,
            platform: &catalog.platform,
            catalog_version: &catalog.version,
            default_level: catalog.default_level,
            rules: catalog.rules_for(request.component_type),
        };

        let mut call = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            call = call.header("Authorization", format!("Bearer {}", key));
        }
        let response = call
            .send()
            .await
            .with_context(|| format!("Failed to reach classifier at {}", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("Classifier returned {}: {}", status, error_text);
        }

        let answer: RemoteResponse = response
            .json()
            .await
            .context("Failed to decode classifier response")?;

        match &answer.matched_rule {
            Some(name) => {
                let Some(rule) = catalog.rule(request.component_type, name) else {
                    bail!(
                        "classifier cited rule '{}' which catalog {} does not define for {}",
                        name,
                        catalog.identity(),
                        request.component_type
                    );
                };
                if rule.level != answer.level {
                    bail!(
                        "classifier answered {} but rule '{}' assigns {}",
                        answer.level,
                        name,
                        rule.level
                    );
                }
            }
            None if answer.level != catalog.default_level => {
                bail!(
                    "classifier answered {} without citing a rule (catalog default is {})",
                    answer.level,
                    catalog.default_level
                );
            }
            None => {}
        }

        Ok(Classification {
            level: answer.level,
            reasoning: answer.reasoning,
            matched_rule: answer.matched_rule,
        })
    }

    fn name(&self) -> &str {
        "remote"
    }
}
