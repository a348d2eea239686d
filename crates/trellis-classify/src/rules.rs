//! Versioned rule catalog
//!
//! Every answer a classifier gives must rest on a rule listed here (or on the
//! catalog default). Catalogs are data, loaded the same way platform schemas
//! are: YAML, TOML or JSON.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use trellis_core::{ComplexityLevel, ComponentType};

use crate::error::CatalogError;

const TABLEAU_RULES: &str = include_str!("../rules/tableau.yaml");

fn default_level() -> ComplexityLevel {
    ComplexityLevel::Low
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCatalog {
    pub platform: String,
    pub version: String,
    /// Level given when no rule of the component's type matches.
    #[serde(default = "default_level")]
    pub default_level: ComplexityLevel,
    #[serde(default)]
    pub rules: BTreeMap<ComponentType, Vec<Rule>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub level: ComplexityLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// All conditions must hold.
    pub when: Vec<Condition>,
}

/// A test over one feature (or attribute) of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum Condition {
    /// Some value matches the regex.
    Matches { field: String, pattern: String },
    /// Some value equals one of `values`, ignoring ASCII case.
    OneOf { field: String, values: Vec<String> },
    /// The numeric reading is at least `count`; lists count their items.
    AtLeast { field: String, count: f64 },
    Present { field: String },
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Condition::Matches { field, .. }
            | Condition::OneOf { field, .. }
            | Condition::AtLeast { field, .. }
            | Condition::Present { field } => field,
        }
    }
}

impl RuleCatalog {
    /// The catalog shipped for Tableau workbooks.
    pub fn tableau() -> Result<Self, CatalogError> {
        Self::from_yaml_str(TABLEAU_RULES)
    }

    pub fn builtin(platform: &str) -> Option<Result<Self, CatalogError>> {
        match platform.to_ascii_lowercase().as_str() {
            "tableau" => Some(Self::tableau()),
            _ => None,
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: RuleCatalog = serde_yaml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: RuleCatalog = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: RuleCatalog = serde_json::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        let catalog = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("toml") => Self::from_toml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            other => return Err(CatalogError::UnsupportedFormat(other.unwrap_or("").to_string())),
        };
        tracing::debug!(
            platform = %catalog.platform,
            version = %catalog.version,
            rules = catalog.rule_count(),
            "Loaded rule catalog from {}",
            path.display()
        );
        Ok(catalog)
    }

    /// Rules for one component type, in catalog order.
    pub fn rules_for(&self, component_type: ComponentType) -> &[Rule] {
        self.rules.get(&component_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rule(&self, component_type: ComponentType, name: &str) -> Option<&Rule> {
        self.rules_for(component_type).iter().find(|r| r.name == name)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// `platform@version`, the identity classification answers are cached under.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.platform, self.version)
    }

    /// Every `matches` pattern in the catalog, compiled.
    pub fn compile_patterns(&self) -> Result<BTreeMap<String, Regex>, CatalogError> {
        let mut compiled = BTreeMap::new();
        for rule in self.rules.values().flatten() {
            for condition in &rule.when {
                let Condition::Matches { pattern, .. } = condition else {
                    continue;
                };
                if compiled.contains_key(pattern) {
                    continue;
                }
                let regex = Regex::new(pattern).map_err(|source| CatalogError::InvalidPattern {
                    rule: rule.name.clone(),
                    pattern: pattern.clone(),
                    source,
                })?;
                compiled.insert(pattern.clone(), regex);
            }
        }
        Ok(compiled)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        for rules in self.rules.values() {
            for (i, rule) in rules.iter().enumerate() {
                if rule.when.is_empty() {
                    return Err(CatalogError::EmptyRule(rule.name.clone()));
                }
                if rules[..i].iter().any(|earlier| earlier.name == rule.name) {
                    return Err(CatalogError::DuplicateRule(rule.name.clone()));
                }
            }
        }
        self.compile_patterns()?;
        Ok(())
    }
}
