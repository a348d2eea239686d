//! Unit parser contract and the schema-driven implementation

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, anyhow};
use regex::Regex;
use roxmltree::{Node, NodeId};
use trellis_core::{ComponentType, FeatureValue, RelationKind, Unit};

use crate::error::SchemaError;
use crate::schema::{FeatureExtract, KindSpec, PlatformSchema, RefBy, RelationSpec, Selector};
use crate::xml;

/// Target of a relation as the unit itself expresses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefKey {
    /// Another component of the same unit, by position in `UnitDiscovery::components`.
    Local(usize),
    /// A canonical id.
    Id(String),
    /// A display name, resolved once every unit has been read.
    Name(String),
}

/// A component as found in one unit, before identity normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawComponent {
    pub native_type: String,
    /// Set when the parser already knows the canonical type; otherwise the
    /// schema normalizes `native_type`.
    pub component_type: Option<ComponentType>,
    /// Identity candidates, keyed by the selector that produced them.
    pub identity: Vec<(Selector, String)>,
    pub display_name: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub features: BTreeMap<String, FeatureValue>,
}

/// A candidate relation local to one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRelation {
    /// Source, by position in `UnitDiscovery::components`.
    pub from: usize,
    pub to: RefKey,
    pub kind: RelationKind,
    pub target_type: ComponentType,
    /// Dropped instead of left dangling when it does not resolve.
    pub soft: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitDiscovery {
    pub components: Vec<RawComponent>,
    pub relations: Vec<RawRelation>,
}

/// Why a unit contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub unit_index: usize,
    pub unit_path: String,
    pub message: String,
}

/// Turns one unit into raw components and relations.
///
/// Implementations may be rule-based, model-backed or anything else; the
/// builder only relies on this contract.
pub trait UnitParser: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, unit: &Unit, schema: &PlatformSchema) -> anyhow::Result<UnitDiscovery>;

    /// Like `extract`, but never fails: an error becomes an empty discovery
    /// plus a failure descriptor.
    fn parse(&self, unit: &Unit, schema: &PlatformSchema) -> (UnitDiscovery, Option<ParseFailure>) {
        match self.extract(unit, schema) {
            Ok(discovery) => (discovery, None),
            Err(e) => (
                UnitDiscovery::default(),
                Some(ParseFailure {
                    unit_index: unit.index,
                    unit_path: unit.path.to_string(),
                    message: format!("{:#}", e),
                }),
            ),
        }
    }
}

/// Rule-based parser driven entirely by a `PlatformSchema`.
pub struct SchemaParser {
    patterns: BTreeMap<String, Regex>,
}

impl SchemaParser {
    pub fn new(schema: &PlatformSchema) -> Result<Self, SchemaError> {
        Ok(SchemaParser {
            patterns: schema.compile_patterns()?,
        })
    }

    fn pattern(&self, pattern: &str) -> anyhow::Result<Regex> {
        match self.patterns.get(pattern) {
            Some(regex) => Ok(regex.clone()),
            None => Regex::new(pattern).with_context(|| format!("invalid relation pattern '{}'", pattern)),
        }
    }
}

/// An element recognized as a component.
struct Found<'a, 'input, 's> {
    node: Node<'a, 'input>,
    kind: &'s KindSpec,
    component_type: ComponentType,
    /// Nearest enclosing component, by position.
    parent: Option<usize>,
}

impl UnitParser for SchemaParser {
    fn name(&self) -> &str {
        "schema"
    }

    fn extract(&self, unit: &Unit, schema: &PlatformSchema) -> anyhow::Result<UnitDiscovery> {
        let text = unit
            .text()
            .ok_or_else(|| anyhow!("unit payload is not valid UTF-8"))?;
        let wrapped;
        let source = if xml::is_full_document(text) {
            text
        } else {
            wrapped = xml::wrap_fragment(text, &unit.namespaces).0;
            wrapped.as_str()
        };
        let doc = xml::parse(source).with_context(|| format!("unit {} is not well-formed", unit.path))?;

        let mut found: Vec<Found<'_, '_, '_>> = Vec::new();
        let mut position: HashMap<NodeId, usize> = HashMap::new();
        for node in doc.root_element().descendants().filter(|n| n.is_element()) {
            let Some(kind) = match_kind(node, schema) else {
                continue;
            };
            let Some(component_type) = schema.type_of(kind) else {
                continue;
            };
            let parent = node
                .ancestors()
                .skip(1)
                .find_map(|ancestor| position.get(&ancestor.id()).copied());
            position.insert(node.id(), found.len());
            found.push(Found {
                node,
                kind,
                component_type,
                parent,
            });
        }

        let mut discovery = UnitDiscovery::default();
        for (i, item) in found.iter().enumerate() {
            discovery.components.push(read_component(item));
            for relation in &item.kind.relations {
                for to in self.read_relation(i, item, relation, &found, &position)? {
                    discovery.relations.push(RawRelation {
                        from: i,
                        to,
                        kind: relation.kind,
                        target_type: relation.target_type,
                        soft: relation.soft,
                    });
                }
            }
        }

        tracing::trace!(
            unit = %unit.path,
            components = discovery.components.len(),
            relations = discovery.relations.len(),
            "Unit parsed"
        );
        Ok(discovery)
    }
}

impl SchemaParser {
    fn read_relation(
        &self,
        index: usize,
        item: &Found<'_, '_, '_>,
        relation: &RelationSpec,
        found: &[Found<'_, '_, '_>],
        position: &HashMap<NodeId, usize>,
    ) -> anyhow::Result<Vec<RefKey>> {
        let refs = match relation.by {
            RefBy::Enclosing => item
                .node
                .ancestors()
                .skip(1)
                .filter_map(|ancestor| position.get(&ancestor.id()).copied())
                .find(|&p| found[p].component_type == relation.target_type)
                .map(RefKey::Local)
                .into_iter()
                .collect(),
            RefBy::Contained => found
                .iter()
                .enumerate()
                .filter(|(_, other)| other.parent == Some(index) && other.component_type == relation.target_type)
                .map(|(p, _)| RefKey::Local(p))
                .collect(),
            RefBy::Name | RefBy::Id => {
                let Some(selector) = &relation.selector else {
                    return Ok(Vec::new());
                };
                let mut tokens = select_values(item.node, selector);
                if let Some(pattern) = &relation.pattern {
                    let regex = self.pattern(pattern)?;
                    tokens = tokens
                        .iter()
                        .flat_map(|value| {
                            regex
                                .captures_iter(value)
                                .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
                                .map(|m| m.as_str().to_string())
                                .collect::<Vec<_>>()
                        })
                        .collect();
                }
                let mut refs: Vec<RefKey> = Vec::new();
                for token in tokens {
                    let token = token.trim();
                    if token.is_empty() {
                        continue;
                    }
                    let key = match relation.by {
                        RefBy::Name => RefKey::Name(token.to_string()),
                        _ => RefKey::Id(token.to_string()),
                    };
                    if !refs.contains(&key) {
                        refs.push(key);
                    }
                }
                refs
            }
        };
        Ok(refs)
    }
}

/// First kind whose element name, `when` condition and `skip_within` rule all fit.
fn match_kind<'s>(node: Node<'_, '_>, schema: &'s PlatformSchema) -> Option<&'s KindSpec> {
    let tag = xml::get_tag_name(node);
    schema.kinds_for(tag).find(|kind| {
        let condition_holds = kind
            .when
            .as_ref()
            .is_none_or(|when| !select_values(node, when).is_empty());
        let nested_in_reference = node.ancestors().skip(1).any(|ancestor| {
            ancestor.is_element() && kind.skip_within.iter().any(|s| s == xml::get_tag_name(ancestor))
        });
        condition_holds && !nested_in_reference
    })
}

fn read_component(item: &Found<'_, '_, '_>) -> RawComponent {
    let node = item.node;
    let kind = item.kind;

    let identity = kind
        .identity
        .iter()
        .filter_map(|selector| first_value(node, selector).map(|value| (selector.clone(), value)))
        .collect();
    let display_name = kind.name.iter().find_map(|selector| first_value(node, selector));
    let attributes = node
        .attributes()
        .filter(|attr| kind.fields.is_empty() || kind.fields.iter().any(|f| f == attr.name()))
        .map(|attr| (attr.name().to_string(), attr.value().to_string()))
        .collect();

    let mut features = BTreeMap::new();
    for spec in &kind.features {
        let value = match spec.extract {
            FeatureExtract::Value => first_value(node, &spec.selector).map(FeatureValue::Scalar),
            FeatureExtract::Values => {
                let mut values: Vec<String> = Vec::new();
                for value in select_values(node, &spec.selector) {
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
                (!values.is_empty()).then_some(FeatureValue::List(values))
            }
            FeatureExtract::Count => {
                let count = match spec.selector.attr {
                    Some(_) => select_values(node, &spec.selector).len(),
                    None => select_nodes(node, &spec.selector).len(),
                };
                Some(FeatureValue::Scalar(count.to_string()))
            }
        };
        if let Some(value) = value {
            features.insert(spec.name.clone(), value);
        }
    }

    RawComponent {
        native_type: kind.native.clone(),
        component_type: Some(item.component_type),
        identity,
        display_name,
        attributes,
        features,
    }
}

/// Elements addressed by a selector's path, relative to `node`.
fn select_nodes<'a, 'input>(node: Node<'a, 'input>, selector: &Selector) -> Vec<Node<'a, 'input>> {
    let Some((first, rest)) = selector.path.split_first() else {
        return vec![node];
    };
    let mut current: Vec<Node<'a, 'input>> = node
        .descendants()
        .skip(1)
        .filter(|n| n.is_element() && xml::get_tag_name(*n) == first.as_str())
        .collect();
    for step in rest {
        current = current
            .iter()
            .flat_map(|n| xml::element_children(*n).filter(move |c| xml::get_tag_name(*c) == step.as_str()))
            .collect();
    }
    current
}

/// Non-blank values addressed by a selector, in document order.
fn select_values(node: Node<'_, '_>, selector: &Selector) -> Vec<String> {
    select_nodes(node, selector)
        .into_iter()
        .filter_map(|n| match &selector.attr {
            Some(attr) => n.attribute(attr.as_str()).map(str::to_string),
            None => xml::get_text(n),
        })
        .filter(|value| !value.trim().is_empty())
        .collect()
}

fn first_value(node: Node<'_, '_>, selector: &Selector) -> Option<String> {
    select_values(node, selector).into_iter().next()
}
