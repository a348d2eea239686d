//! XML helpers shared by the splitter and the unit parser

use roxmltree::{Document, Node, ParsingOptions};
use trellis_core::NamespaceDecl;

/// Synthetic element used to re-establish namespace scope around a fragment.
pub const WRAPPER_TAG: &str = "trellis-fragment";

/// Parsing options used everywhere: BI exports routinely carry a DOCTYPE.
pub fn parsing_options<'input>() -> ParsingOptions<'input> {
    ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    }
}

pub fn parse(text: &str) -> Result<Document<'_>, roxmltree::Error> {
    Document::parse_with_options(text, parsing_options())
}

/// Tag name without namespace prefix.
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

pub fn element_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

pub fn has_element_children(node: Node<'_, '_>) -> bool {
    element_children(node).next().is_some()
}

/// True when at least one element child carries content of its own.
pub fn has_content_children(node: Node<'_, '_>) -> bool {
    element_children(node).any(|child| !is_empty_element(child))
}

/// An element with no attributes, no element children and only whitespace text.
pub fn is_empty_element(node: Node<'_, '_>) -> bool {
    node.attributes().next().is_none()
        && !has_element_children(node)
        && node
            .children()
            .filter(|child| child.is_text())
            .all(|child| child.text().is_none_or(|t| t.trim().is_empty()))
}

/// Text content of a node, trimmed; `None` when blank.
pub fn get_text(node: Node<'_, '_>) -> Option<String> {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Namespace declarations in scope at `node`, excluding the implicit `xml` prefix.
pub fn in_scope_namespaces(node: Node<'_, '_>) -> Vec<NamespaceDecl> {
    let mut decls: Vec<NamespaceDecl> = Vec::new();
    for ns in node.namespaces() {
        let prefix = ns.name().map(str::to_string);
        if prefix.as_deref() == Some("xml") {
            continue;
        }
        if decls.iter().any(|d| d.prefix == prefix) {
            continue;
        }
        decls.push(NamespaceDecl {
            prefix,
            uri: ns.uri().to_string(),
        });
    }
    decls
}

/// Wrap a fragment in a synthetic element that re-declares `namespaces`.
/// Returns the wrapped text and the byte length of the opening tag, so
/// offsets inside the wrapper can be mapped back onto the fragment.
pub fn wrap_fragment(fragment: &str, namespaces: &[NamespaceDecl]) -> (String, usize) {
    let mut open = format!("<{}", WRAPPER_TAG);
    for decl in namespaces {
        match &decl.prefix {
            Some(prefix) => open.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape_attr(&decl.uri))),
            None => open.push_str(&format!(" xmlns=\"{}\"", escape_attr(&decl.uri))),
        }
    }
    open.push('>');

    let prefix_len = open.len();
    let mut wrapped = String::with_capacity(prefix_len + fragment.len() + WRAPPER_TAG.len() + 3);
    wrapped.push_str(&open);
    wrapped.push_str(fragment);
    wrapped.push_str(&format!("</{}>", WRAPPER_TAG));
    (wrapped, prefix_len)
}

/// Whether `text` is a whole document rather than an element fragment.
pub fn is_full_document(text: &str) -> bool {
    let head = text.trim_start_matches('\u{feff}').trim_start();
    head.starts_with("<?xml") || head.starts_with("<!DOCTYPE")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
