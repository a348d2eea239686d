//! Core data structures for units, components and dependencies

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── Units ───────────────────────────────────────────────────

/// One element step on the way from the document root to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub name: String,
    /// 1-based position among the parent's element children.
    pub index: Option<usize>,
}

impl PathSegment {
    pub fn new(name: impl Into<String>, index: Option<usize>) -> Self {
        PathSegment {
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]", self.name, index),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for PathSegment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(open) = s.find('[') else {
            if s.is_empty() {
                return Err(CoreError::InvalidPath(s.to_string()));
            }
            return Ok(PathSegment::new(s, None));
        };
        let name = &s[..open];
        let index = s[open + 1..]
            .strip_suffix(']')
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| CoreError::InvalidPath(s.to_string()))?;
        if name.is_empty() {
            return Err(CoreError::InvalidPath(s.to_string()));
        }
        Ok(PathSegment::new(name, Some(index)))
    }
}

/// Slash-separated provenance of a unit, e.g. `workbook/worksheets[3]/worksheet[2]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitPath(Vec<PathSegment>);

impl UnitPath {
    pub fn root(name: impl Into<String>) -> Self {
        UnitPath(vec![PathSegment::new(name, None)])
    }

    /// Path of the `index`-th (1-based) element child called `name`.
    pub fn child(&self, name: impl Into<String>, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::new(name, Some(index)));
        UnitPath(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn leaf(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for UnitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for UnitPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(UnitPath::default());
        }
        s.split('/')
            .map(PathSegment::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(UnitPath)
    }
}

impl TryFrom<String> for UnitPath {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UnitPath> for String {
    fn from(path: UnitPath) -> Self {
        path.to_string()
    }
}

/// How a unit relates to the configured byte budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Within budget.
    Ok,
    /// Over budget, but an atomic element with nothing left to split.
    Oversized,
    /// Over budget when the recursion ceiling was reached.
    DepthLimited,
    /// Could not be parsed; carries the original bytes untouched.
    UnsplitMalformed,
}

/// An XML namespace declaration in scope for a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceDecl {
    /// `None` for the default namespace.
    pub prefix: Option<String>,
    pub uri: String,
}

/// A self-contained fragment of the original document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Position in the splitter output.
    pub index: usize,
    pub path: UnitPath,
    /// `{parent_element_name}_{child_index}`.
    pub label: String,
    /// Byte range of the payload within the original document.
    pub span: Range<usize>,
    pub size_bytes: usize,
    pub status: UnitStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<NamespaceDecl>,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

impl Unit {
    /// Payload as UTF-8, if it is valid.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn within_budget(&self) -> bool {
        self.status == UnitStatus::Ok
    }
}

// ── Components ──────────────────────────────────────────────

/// Canonical component types used by graph logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Container,
    Visualization,
    Datasource,
    Calculation,
    Filter,
    Parameter,
}

impl ComponentType {
    pub const ALL: [ComponentType; 6] = [
        ComponentType::Container,
        ComponentType::Visualization,
        ComponentType::Datasource,
        ComponentType::Calculation,
        ComponentType::Filter,
        ComponentType::Parameter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Container => "container",
            ComponentType::Visualization => "visualization",
            ComponentType::Datasource => "datasource",
            ComponentType::Calculation => "calculation",
            ComponentType::Filter => "filter",
            ComponentType::Parameter => "parameter",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, ComponentType::Container)
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ComponentType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| CoreError::UnknownComponentType(s.to_string()))
    }
}

/// Migration complexity. Totally ordered; the join is `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ComplexityLevel {
    pub const ALL: [ComplexityLevel; 4] = [
        ComplexityLevel::Low,
        ComplexityLevel::Medium,
        ComplexityLevel::High,
        ComplexityLevel::Critical,
    ];

    pub fn join(self, other: ComplexityLevel) -> ComplexityLevel {
        self.max(other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Low => "low",
            ComplexityLevel::Medium => "medium",
            ComplexityLevel::High => "high",
            ComplexityLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplexityLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ComplexityLevel::ALL
            .into_iter()
            .find(|l| l.as_str() == wanted)
            .ok_or_else(|| CoreError::UnknownLevel(s.to_string()))
    }
}

/// A feature value: a single scalar or a list of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Scalar(String),
    List(Vec<String>),
}

impl FeatureValue {
    /// All scalar values carried by this feature.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FeatureValue::Scalar(value) => vec![value.as_str()],
            FeatureValue::List(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Numeric reading: a list counts its items, a scalar is parsed.
    pub fn as_count(&self) -> Option<f64> {
        match self {
            FeatureValue::Scalar(value) => value.trim().parse().ok(),
            FeatureValue::List(values) => Some(values.len() as f64),
        }
    }
}

/// Where a component was first discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRef {
    pub unit_index: usize,
    pub unit_path: String,
}

/// Why a component received its intrinsic level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationNote {
    pub reasoning: String,
    pub matched_rule: Option<String>,
    /// Which classifier answered, or `default` when a fallback level was used.
    pub source: String,
}

/// A normalized, uniquely identified business object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub canonical_id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    /// Platform-native kind, kept for display.
    pub native_type: String,
    pub unit_ref: UnitRef,
    /// Every unit that contributed to this record, in merge order.
    pub seen_in_units: Vec<usize>,
    pub raw_attributes: BTreeMap<String, String>,
    pub features: BTreeMap<String, FeatureValue>,
    pub own_complexity: Option<ComplexityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationNote>,
}

impl Component {
    pub fn new(
        canonical_id: impl Into<String>,
        display_name: impl Into<String>,
        component_type: ComponentType,
        native_type: impl Into<String>,
        unit_ref: UnitRef,
    ) -> Self {
        let unit_index = unit_ref.unit_index;
        Component {
            canonical_id: canonical_id.into(),
            display_name: display_name.into(),
            component_type,
            native_type: native_type.into(),
            unit_ref,
            seen_in_units: vec![unit_index],
            raw_attributes: BTreeMap::new(),
            features: BTreeMap::new(),
            own_complexity: None,
            classification: None,
        }
    }

    /// Record the intrinsic level. A component is classified exactly once.
    pub fn set_own_complexity(
        &mut self,
        level: ComplexityLevel,
        note: Option<ClassificationNote>,
    ) -> Result<(), CoreError> {
        if self.own_complexity.is_some() {
            return Err(CoreError::AlreadyClassified(self.canonical_id.clone()));
        }
        self.own_complexity = Some(level);
        self.classification = note;
        Ok(())
    }
}

// ── Dependencies ────────────────────────────────────────────

/// What kind of "uses/contains" relation an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Container → member (dashboard zone → worksheet).
    Contains,
    UsesDatasource,
    UsesCalculation,
    UsesField,
    Filters,
    ParameterizedBy,
    /// Anything the schema does not name more precisely.
    References,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Contains => "contains",
            RelationKind::UsesDatasource => "uses_datasource",
            RelationKind::UsesCalculation => "uses_calculation",
            RelationKind::UsesField => "uses_field",
            RelationKind::Filters => "filters",
            RelationKind::ParameterizedBy => "parameterized_by",
            RelationKind::References => "references",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the target of an edge was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Resolved,
    Dangling,
}

/// Directed dependency between two components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from_id: String,
    pub to_id: String,
    pub relation_kind: RelationKind,
    pub resolution: Resolution,
    /// The name or id the source document used to express this relation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl DependencyEdge {
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>, relation_kind: RelationKind) -> Self {
        DependencyEdge {
            from_id: from_id.into(),
            to_id: to_id.into(),
            relation_kind,
            resolution: Resolution::Resolved,
            reference: None,
        }
    }

    pub fn dangling(
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        relation_kind: RelationKind,
        reference: impl Into<String>,
    ) -> Self {
        DependencyEdge {
            from_id: from_id.into(),
            to_id: to_id.into(),
            relation_kind,
            resolution: Resolution::Dangling,
            reference: Some(reference.into()),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn is_dangling(&self) -> bool {
        self.resolution == Resolution::Dangling
    }
}

// ── Aggregation output ──────────────────────────────────────

/// Effective complexity of one component over its dependency closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub component_id: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub own_complexity: ComplexityLevel,
    pub effective_complexity: ComplexityLevel,
    /// Ids in the closure (self included) whose own level equals the effective level.
    pub contributing_ids: BTreeSet<String>,
    /// Dangling ids reachable from this component.
    pub unresolved_ids: BTreeSet<String>,
    /// The descendant that produced the maximum, or the component itself.
    pub decisive_id: String,
    pub in_cycle: bool,
}
