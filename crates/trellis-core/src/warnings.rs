//! Recoverable problems accumulated over a run

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every degraded-but-recovered situation a run can hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A fragment could not be parsed and was passed through unsplit.
    SplitFailure,
    /// The recursion ceiling was hit while the fragment was still over budget.
    DepthExceeded,
    /// An atomic element is larger than the budget.
    OversizedUnit,
    /// A unit produced no components because its parser failed.
    DiscoveryFailure,
    /// A discovered component had none of the configured identity attributes.
    MissingIdentity,
    /// Two records claimed the same canonical id with different types.
    IdentityConflict,
    /// Two components of one type share a display name; references by that
    /// name resolve to the first.
    AmbiguousName,
    /// A relation target was never discovered.
    UnresolvedReference,
    ClassificationTimeout,
    ClassificationError,
    /// The run was cancelled before finishing.
    Cancelled,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::SplitFailure => "split_failure",
            WarningKind::DepthExceeded => "depth_exceeded",
            WarningKind::OversizedUnit => "oversized_unit",
            WarningKind::DiscoveryFailure => "discovery_failure",
            WarningKind::MissingIdentity => "missing_identity",
            WarningKind::IdentityConflict => "identity_conflict",
            WarningKind::AmbiguousName => "ambiguous_name",
            WarningKind::UnresolvedReference => "unresolved_reference",
            WarningKind::ClassificationTimeout => "classification_timeout",
            WarningKind::ClassificationError => "classification_error",
            WarningKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    /// Unit path, component id or reference the warning is about.
    pub subject: String,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Warning {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.message)
    }
}

/// Append-only warning log. Pushing also emits a `tracing` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Warnings(Vec<Warning>);

impl Warnings {
    pub fn new() -> Self {
        Warnings(Vec::new())
    }

    pub fn push(&mut self, warning: Warning) {
        tracing::warn!(kind = %warning.kind, subject = %warning.subject, "{}", warning.message);
        self.0.push(warning);
    }

    pub fn record(&mut self, kind: WarningKind, subject: impl Into<String>, message: impl Into<String>) {
        self.push(Warning::new(kind, subject, message));
    }

    /// Append warnings that were already logged where they were raised.
    pub fn extend(&mut self, other: Warnings) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.0.iter()
    }

    pub fn of_kind(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.0.iter().filter(move |w| w.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<Warning> {
        self.0
    }
}

impl From<Vec<Warning>> for Warnings {
    fn from(warnings: Vec<Warning>) -> Self {
        Warnings(warnings)
    }
}
