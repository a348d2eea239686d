//! Declarative per-platform discovery schema
//!
//! A schema lists the native element kinds worth turning into components and,
//! for each kind, where its identity, name, fields, features and relations
//! live. It is data: loaded from YAML, TOML or JSON and never branched on by
//! platform in code.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use trellis_core::{ComponentType, RelationKind};

use crate::error::SchemaError;

const TABLEAU_SCHEMA: &str = include_str!("../schemas/tableau.yaml");

/// Path to one or more elements, optionally ending in an attribute.
///
/// `zone@name` matches the `name` attribute of every `zone` below the
/// component; `view/datasources/datasource@name` anchors only the first step
/// anywhere below, later steps are direct children; `@caption` is an attribute
/// of the component element itself; a selector without `@` reads text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector {
    pub path: Vec<String>,
    pub attr: Option<String>,
}

impl FromStr for Selector {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (path, attr) = match s.split_once('@') {
            Some((path, attr)) => (path, Some(attr)),
            None => (s, None),
        };
        let path: Vec<String> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').map(str::to_string).collect()
        };
        let bad_step = path.iter().any(|step| step.is_empty() || step.contains(char::is_whitespace));
        let bad_attr = attr.is_some_and(|a| a.is_empty() || a.contains(['/', '@']));
        if bad_step || bad_attr || (path.is_empty() && attr.is_none()) {
            return Err(SchemaError::InvalidSelector(s.to_string()));
        }
        Ok(Selector {
            path,
            attr: attr.map(str::to_string),
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("/"))?;
        if let Some(attr) = &self.attr {
            write!(f, "@{}", attr)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Selector {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}

/// How a feature value is read from the component element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureExtract {
    /// First matching value, as a scalar.
    Value,
    /// Every distinct matching value, as a list.
    Values,
    /// Number of matches, as a scalar.
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub extract: FeatureExtract,
    pub selector: Selector,
}

/// Where a relation's target comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefBy {
    /// Display name, resolved after every unit has been read.
    Name,
    /// Canonical id, used as is.
    Id,
    /// Nearest enclosing component of the target type in the same unit.
    Enclosing,
    /// Components nested directly inside this one.
    Contained,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSpec {
    pub kind: RelationKind,
    pub target_type: ComponentType,
    pub by: RefBy,
    /// Required for `name` and `id` relations.
    #[serde(default)]
    pub selector: Option<Selector>,
    /// Regex applied to every selected value; capture group 1 (or the whole
    /// match) of every match is one reference.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Candidate references that are dropped instead of left dangling when
    /// nothing matches, e.g. bracketed tokens in a formula that may be plain
    /// columns.
    #[serde(default)]
    pub soft: bool,
}

/// One native element kind and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSpec {
    /// Element name in the source document.
    pub native: String,
    /// Canonical type; when absent the schema's aliases decide.
    #[serde(default, rename = "type")]
    pub component_type: Option<ComponentType>,
    /// Only elements where this selector matches something are this kind.
    #[serde(default)]
    pub when: Option<Selector>,
    /// Elements nested under any of these element names are references, not definitions.
    #[serde(default)]
    pub skip_within: Vec<String>,
    /// Identity precedence: the first selector with a non-blank value wins.
    pub identity: Vec<Selector>,
    /// Display name precedence; the identity value is the fallback.
    #[serde(default)]
    pub name: Vec<Selector>,
    /// Attributes copied to `raw_attributes`; empty keeps all of them.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub features: Vec<FeatureSpec>,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
}

/// Versioned discovery rules for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSchema {
    pub platform: String,
    pub version: String,
    pub kinds: Vec<KindSpec>,
    /// Native kind → canonical type, for kinds without an explicit `type`
    /// and for normalizing kind names coming from other tools.
    #[serde(default)]
    pub aliases: BTreeMap<String, ComponentType>,
}

impl PlatformSchema {
    /// Built-in Tableau workbook schema.
    pub fn tableau() -> Result<Self, SchemaError> {
        Self::from_yaml_str(TABLEAU_SCHEMA)
    }

    /// Built-in schema for `platform`, if one ships with the crate.
    pub fn builtin(platform: &str) -> Option<Result<Self, SchemaError>> {
        match platform.to_ascii_lowercase().as_str() {
            "tableau" => Some(Self::tableau()),
            _ => None,
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, SchemaError> {
        let schema: PlatformSchema = serde_yaml::from_str(content)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        let schema: PlatformSchema = toml::from_str(content)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_json_str(content: &str) -> Result<Self, SchemaError> {
        let schema: PlatformSchema = serde_json::from_str(content)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Load a schema file; the format follows the extension.
    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        let schema = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("toml") => Self::from_toml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            other => return Err(SchemaError::UnsupportedFormat(other.unwrap_or("").to_string())),
        };
        tracing::debug!(
            platform = %schema.platform,
            version = %schema.version,
            kinds = schema.kinds.len(),
            "Loaded platform schema from {}",
            path.display()
        );
        Ok(schema)
    }

    /// Canonical type of a native kind name.
    pub fn normalize(&self, native: &str) -> Option<ComponentType> {
        self.kinds
            .iter()
            .find(|k| k.native == native)
            .and_then(|k| k.component_type)
            .or_else(|| self.aliases.get(native).copied())
            .or_else(|| {
                let lowered = native.to_ascii_lowercase();
                self.aliases.get(&lowered).copied()
            })
    }

    /// Canonical type of a kind, through its own `type` or the aliases.
    pub fn type_of(&self, kind: &KindSpec) -> Option<ComponentType> {
        kind.component_type.or_else(|| self.normalize(&kind.native))
    }

    pub fn kinds_for(&self, native: &str) -> impl Iterator<Item = &KindSpec> {
        self.kinds.iter().filter(move |k| k.native == native)
    }

    /// Pick the canonical id from `(selector, value)` candidates following
    /// the identity precedence of `kind`.
    pub fn canonical_id(&self, kind: &KindSpec, candidates: &[(Selector, String)]) -> Option<String> {
        kind.identity.iter().find_map(|selector| {
            candidates
                .iter()
                .find(|(s, value)| s == selector && !value.trim().is_empty())
                .map(|(_, value)| value.trim().to_string())
        })
    }

    /// Every regex pattern used by a relation, compiled.
    pub fn compile_patterns(&self) -> Result<BTreeMap<String, Regex>, SchemaError> {
        let mut compiled = BTreeMap::new();
        for pattern in self
            .kinds
            .iter()
            .flat_map(|k| &k.relations)
            .filter_map(|r| r.pattern.as_ref())
        {
            if compiled.contains_key(pattern) {
                continue;
            }
            let regex = Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            compiled.insert(pattern.clone(), regex);
        }
        Ok(compiled)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for kind in &self.kinds {
            if self.type_of(kind).is_none() {
                return Err(SchemaError::UnmappedKind(kind.native.clone()));
            }
            if kind.identity.is_empty() {
                return Err(SchemaError::InvalidKind {
                    kind: kind.native.clone(),
                    message: "identity precedence list is empty".to_string(),
                });
            }
            for relation in &kind.relations {
                let needs_selector = matches!(relation.by, RefBy::Name | RefBy::Id);
                if needs_selector && relation.selector.is_none() {
                    return Err(SchemaError::InvalidKind {
                        kind: kind.native.clone(),
                        message: format!("{} relation needs a selector", relation.kind),
                    });
                }
            }
        }
        self.compile_patterns()?;
        Ok(())
    }
}
