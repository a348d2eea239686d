use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;

use crate::bridge::{Classification, ClassificationRequest, Classifier};
use crate::rules::{Condition, Rule, RuleCatalog};

/// Local classifier that evaluates the catalog directly.
///
/// The most severe matching rule wins; among rules of equal level the first in
/// catalog order is cited.
#[derive(Default)]
pub struct RulesClassifier {
    patterns: DashMap<String, Regex>,
}

impl RulesClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn regex(&self, pattern: &str) -> Result<Regex> {
        if let Some(regex) = self.patterns.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern).with_context(|| format!("invalid rule pattern '{}'", pattern))?;
        self.patterns.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    /// Short explanation when the condition holds.
    fn check(&self, condition: &Condition, request: &ClassificationRequest) -> Result<Option<String>> {
        let field = condition.field();
        let held = match condition {
            Condition::Matches { pattern, .. } => {
                let regex = self.regex(pattern)?;
                request
                    .values(field)
                    .into_iter()
                    .any(|v| regex.is_match(v))
                    .then(|| format!("{} matches /{}/", field, pattern))
            }
            Condition::OneOf { values, .. } => request
                .values(field)
                .into_iter()
                .find(|v| values.iter().any(|wanted| wanted.eq_ignore_ascii_case(v)))
                .map(|v| format!("{} includes {}", field, v)),
            Condition::AtLeast { count, .. } => request
                .count(field)
                .filter(|n| n >= count)
                .map(|n| format!("{} is {} (>= {})", field, n, count)),
            Condition::Present { .. } => (!request.values(field).is_empty()).then(|| format!("{} is present", field)),
        };
        Ok(held)
    }

    fn evaluate(&self, rule: &Rule, request: &ClassificationRequest) -> Result<Option<Vec<String>>> {
        let mut reasons = Vec::with_capacity(rule.when.len());
        for condition in &rule.when {
            match self.check(condition, request)? {
                Some(reason) => reasons.push(reason),
                None => return Ok(None),
            }
        }
        Ok(Some(reasons))
    }
}

#[async_trait]
impl Classifier for RulesClassifier {
    async fn classify(&self, request: &ClassificationRequest, catalog: &RuleCatalog) -> Result<Classification> {
        let mut best: Option<(&Rule, Vec<String>)> = None;
        for rule in catalog.rules_for(request.component_type) {
            if best.as_ref().is_some_and(|(b, _)| b.level >= rule.level) {
                continue;
            }
            if let Some(reasons) = self.evaluate(rule, request)? {
                best = Some((rule, reasons));
            }
        }

        let classification = match best {
            Some((rule, reasons)) => Classification {
                level: rule.level,
                reasoning: format!("rule '{}': {}", rule.name, reasons.join("; ")),
                matched_rule: Some(rule.name.clone()),
            },
            None => Classification {
                level: catalog.default_level,
                reasoning: format!(
                    "no {} rule in catalog {} matched",
                    request.component_type,
                    catalog.identity()
                ),
                matched_rule: None,
            },
        };
        tracing::trace!(
            component = %request.component_id,
            level = %classification.level,
            "Classified by rules"
        );
        Ok(classification)
    }

    fn name(&self) -> &str {
        "rules"
    }
}
