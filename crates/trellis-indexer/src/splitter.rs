//! Size-bounded recursive splitter
//!
//! The root element's children are the first candidates. A candidate within
//! the byte budget becomes a unit; a larger one is re-parsed on its own and
//! split into its element children, one level at a time, until everything
//! fits, the candidate has nothing left to split, or the depth ceiling is
//! reached. Fragments that cannot be parsed on their own are passed through
//! untouched. Only an empty input is an error.

use std::ops::Range;

use rayon::prelude::*;
use trellis_core::{NamespaceDecl, Unit, UnitPath, UnitStatus, Warning, WarningKind, Warnings};

use crate::error::SplitError;
use crate::xml;

pub const DEFAULT_SIZE_BUDGET: usize = 500_000;
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Name used for the unit path when the document root cannot be read.
const DOCUMENT_PATH: &str = "document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitConfig {
    /// Largest payload, in bytes, emitted with status `ok`.
    pub size_budget: usize,
    /// Recursion ceiling; the root's children sit at depth 1.
    pub max_depth: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig {
            size_budget: DEFAULT_SIZE_BUDGET,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SplitOutcome {
    pub units: Vec<Unit>,
    pub warnings: Warnings,
}

/// A fragment of the document that is still being considered.
struct Candidate<'a> {
    text: &'a str,
    /// Absolute byte offset of `text` in the document.
    start: usize,
    path: UnitPath,
    label: String,
    namespaces: Vec<NamespaceDecl>,
    depth: usize,
}

impl Candidate<'_> {
    fn emit(self, status: UnitStatus, warning: Option<Warning>) -> Emitted {
        Emitted {
            span: self.start..self.start + self.text.len(),
            path: self.path,
            label: self.label,
            status,
            namespaces: self.namespaces,
            warning,
        }
    }
}

/// A unit before it is numbered.
struct Emitted {
    path: UnitPath,
    label: String,
    span: Range<usize>,
    status: UnitStatus,
    namespaces: Vec<NamespaceDecl>,
    warning: Option<Warning>,
}

/// Split `document` into an ordered list of units.
pub fn split(document: &[u8], config: &SplitConfig) -> Result<SplitOutcome, SplitError> {
    if document.iter().all(u8::is_ascii_whitespace) {
        return Err(SplitError::EmptyDocument);
    }

    let emitted = match std::str::from_utf8(document) {
        Ok(text) => split_document(text, config),
        Err(e) => vec![unreadable_document(document.len(), format!("document is not valid UTF-8: {}", e))],
    };

    let mut warnings = Warnings::new();
    let units: Vec<Unit> = emitted
        .into_iter()
        .enumerate()
        .map(|(index, emitted)| {
            if let Some(warning) = emitted.warning {
                warnings.push(warning);
            }
            Unit {
                index,
                size_bytes: emitted.span.len(),
                payload: document[emitted.span.clone()].to_vec(),
                path: emitted.path,
                label: emitted.label,
                span: emitted.span,
                status: emitted.status,
                namespaces: emitted.namespaces,
            }
        })
        .collect();

    tracing::debug!(
        units = units.len(),
        warnings = warnings.len(),
        budget = config.size_budget,
        "Document split"
    );

    Ok(SplitOutcome { units, warnings })
}

fn split_document(text: &str, config: &SplitConfig) -> Vec<Emitted> {
    let doc = match xml::parse(text) {
        Ok(doc) => doc,
        Err(e) => return vec![unreadable_document(text.len(), e.to_string())],
    };

    let root = doc.root_element();
    let root_name = xml::get_tag_name(root);
    let root_path = UnitPath::root(root_name);

    if config.max_depth == 0 || !xml::has_content_children(root) {
        if xml::is_empty_element(root) {
            return Vec::new();
        }
        let span = root.range();
        let candidate = Candidate {
            text: &text[span.clone()],
            start: span.start,
            path: root_path,
            label: format!("{}_1", DOCUMENT_PATH),
            namespaces: xml::in_scope_namespaces(root),
            depth: 0,
        };
        return vec![emit_whole_root(candidate, config)];
    }

    let candidates: Vec<Candidate<'_>> = xml::element_children(root)
        .enumerate()
        .filter(|(_, child)| !xml::is_empty_element(*child))
        .map(|(i, child)| {
            let span = child.range();
            Candidate {
                text: &text[span.clone()],
                start: span.start,
                path: root_path.child(xml::get_tag_name(child), i + 1),
                label: format!("{}_{}", root_name, i + 1),
                namespaces: xml::in_scope_namespaces(child),
                depth: 1,
            }
        })
        .collect();

    candidates
        .into_par_iter()
        .flat_map_iter(|candidate| split_candidate(candidate, config))
        .collect()
}

fn split_candidate(candidate: Candidate<'_>, config: &SplitConfig) -> Vec<Emitted> {
    let size = candidate.text.len();
    if size <= config.size_budget {
        return vec![candidate.emit(UnitStatus::Ok, None)];
    }

    if candidate.depth >= config.max_depth {
        let warning = Warning::new(
            WarningKind::DepthExceeded,
            candidate.path.to_string(),
            format!(
                "{} bytes exceed the {} byte budget at depth {}",
                size, config.size_budget, candidate.depth
            ),
        );
        return vec![candidate.emit(UnitStatus::DepthLimited, Some(warning))];
    }

    let (wrapped, offset) = xml::wrap_fragment(candidate.text, &candidate.namespaces);
    let doc = match xml::parse(&wrapped) {
        Ok(doc) => doc,
        Err(e) => {
            let warning = Warning::new(
                WarningKind::SplitFailure,
                candidate.path.to_string(),
                format!("fragment passed through unsplit: {}", e),
            );
            return vec![candidate.emit(UnitStatus::UnsplitMalformed, Some(warning))];
        }
    };
    let Some(element) = xml::element_children(doc.root_element()).next() else {
        let warning = Warning::new(
            WarningKind::SplitFailure,
            candidate.path.to_string(),
            "fragment does not contain an element",
        );
        return vec![candidate.emit(UnitStatus::UnsplitMalformed, Some(warning))];
    };

    if !xml::has_content_children(element) {
        let warning = Warning::new(
            WarningKind::OversizedUnit,
            candidate.path.to_string(),
            format!(
                "atomic element of {} bytes exceeds the {} byte budget",
                size, config.size_budget
            ),
        );
        return vec![candidate.emit(UnitStatus::Oversized, Some(warning))];
    }

    let parent_name = xml::get_tag_name(element);
    let mut emitted = Vec::new();
    for (i, child) in xml::element_children(element).enumerate() {
        if xml::is_empty_element(child) {
            continue;
        }
        let range = child.range();
        let local = (range.start - offset)..(range.end - offset);
        let next = Candidate {
            text: &candidate.text[local.clone()],
            start: candidate.start + local.start,
            path: candidate.path.child(xml::get_tag_name(child), i + 1),
            label: format!("{}_{}", parent_name, i + 1),
            namespaces: xml::in_scope_namespaces(child),
            depth: candidate.depth + 1,
        };
        emitted.extend(split_candidate(next, config));
    }
    emitted
}

/// The root element emitted as a single unit.
fn emit_whole_root(candidate: Candidate<'_>, config: &SplitConfig) -> Emitted {
    let size = candidate.text.len();
    if size <= config.size_budget {
        return candidate.emit(UnitStatus::Ok, None);
    }
    if config.max_depth == 0 {
        let warning = Warning::new(
            WarningKind::DepthExceeded,
            candidate.path.to_string(),
            format!("splitting disabled; {} bytes exceed the {} byte budget", size, config.size_budget),
        );
        return candidate.emit(UnitStatus::DepthLimited, Some(warning));
    }
    let warning = Warning::new(
        WarningKind::OversizedUnit,
        candidate.path.to_string(),
        format!("root element of {} bytes has no children to split", size),
    );
    candidate.emit(UnitStatus::Oversized, Some(warning))
}

fn unreadable_document(len: usize, reason: String) -> Emitted {
    Emitted {
        path: UnitPath::root(DOCUMENT_PATH),
        label: format!("{}_1", DOCUMENT_PATH),
        span: 0..len,
        status: UnitStatus::UnsplitMalformed,
        namespaces: Vec::new(),
        warning: Some(Warning::new(
            WarningKind::SplitFailure,
            DOCUMENT_PATH,
            format!("document passed through unsplit: {}", reason),
        )),
    }
}
