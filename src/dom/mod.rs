//! Host DOM abstraction
//!
//! The annotation engine never touches a concrete DOM. It works against the
//! [`Dom`] trait, which exposes exactly the reads and writes it needs, and
//! consumes change notifications through [`MutationSource`].
//!
//! Two implementations exist:
//! - [`MemoryDom`]: an arena DOM with a mutation journal (native, tests)
//! - `web::WebDom`: `web_sys::Node` handles over the live page (wasm32)

use std::fmt;

use thiserror::Error;

pub mod markup;
pub mod memory;

pub use memory::{MemoryDom, NodeId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomError {
    #[error("Node is detached from the document: {0}")]
    Detached(String),

    #[error("Node is not an element: {0}")]
    NotAnElement(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Markup parse error: {0}")]
    Parse(String),

    #[error("DOM operation rejected: {0}")]
    Js(String),
}

/// Coarse node classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Fragment,
    Element,
    Text,
    Other,
}

/// A simple selector: optional tag name followed by classes.
///
/// Covers the shapes the site table needs (`span.a-price`, `.a-offscreen`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub tag: Option<String>,
    pub classes: Vec<String>,
}

impl Selector {
    /// Parse `tag.class1.class2`, `.class` or `tag`
    pub fn parse(raw: &str) -> Result<Self, DomError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomError::InvalidSelector("empty selector".to_string()));
        }

        let mut parts = raw.split('.');
        let tag = match parts.next() {
            Some("") | None => None,
            Some(tag) => {
                if !is_ident(tag) {
                    return Err(DomError::InvalidSelector(raw.to_string()));
                }
                Some(tag.to_ascii_lowercase())
            }
        };

        let mut classes = Vec::new();
        for class in parts {
            if !is_ident(class) {
                return Err(DomError::InvalidSelector(raw.to_string()));
            }
            classes.push(class.to_string());
        }

        Ok(Self { tag, classes })
    }

    /// CSS text usable with `querySelectorAll`
    pub fn to_css(&self) -> String {
        let mut css = self.tag.clone().unwrap_or_default();
        for class in &self.classes {
            css.push('.');
            css.push_str(class);
        }
        css
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A DOM change notification, shaped after `MutationRecord`
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRecord<N> {
    /// Children of `target` were added and/or removed
    ChildList {
        target: N,
        added: Vec<N>,
        removed: Vec<N>,
    },
    /// The text of a character-data node changed in place
    CharacterData { target: N },
}

/// Read/write access to a host document
pub trait Dom {
    type Node: Clone + PartialEq + fmt::Debug;

    fn body(&self) -> Option<Self::Node>;
    fn head(&self) -> Option<Self::Node>;

    fn kind(&self, node: &Self::Node) -> NodeKind;

    /// Lowercase tag name for elements
    fn tag_name(&self, node: &Self::Node) -> Option<String>;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;
    fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;
    fn previous_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Concatenated text of the node and its descendants
    fn text_content(&self, node: &Self::Node) -> String;

    fn has_class(&self, node: &Self::Node, class: &str) -> bool;
    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
    fn element_by_id(&self, id: &str) -> Option<Self::Node>;

    /// Descendants of `scope` matching `selector`, in document order.
    /// `scope` itself is never included.
    fn query_all(&self, scope: &Self::Node, selector: &Selector)
        -> Result<Vec<Self::Node>, DomError>;

    fn matches(&self, node: &Self::Node, selector: &Selector) -> bool;

    fn create_element(&mut self, tag: &str) -> Result<Self::Node, DomError>;
    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), DomError>;

    /// Insert `node` as the immediate next sibling of `reference`
    fn insert_after(&mut self, reference: &Self::Node, node: &Self::Node) -> Result<(), DomError>;

    fn remove(&mut self, node: &Self::Node) -> Result<(), DomError>;

    /// Replace the text of a text node, or the children of an element with
    /// a single text node
    fn set_text(&mut self, node: &Self::Node, text: &str) -> Result<(), DomError>;

    fn add_class(&mut self, node: &Self::Node, class: &str) -> Result<(), DomError>;
    fn remove_class(&mut self, node: &Self::Node, class: &str) -> Result<(), DomError>;
    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str)
        -> Result<(), DomError>;

    /// Ancestors of `node`, nearest first
    fn ancestors(&self, node: &Self::Node) -> Vec<Self::Node> {
        let mut out = Vec::new();
        let mut current = self.parent(node);
        while let Some(parent) = current {
            current = self.parent(&parent);
            out.push(parent);
        }
        out
    }

    /// Whether `node` is attached to the document
    fn is_connected(&self, node: &Self::Node) -> bool {
        self.kind(node) == NodeKind::Document
            || self
                .ancestors(node)
                .last()
                .is_some_and(|root| self.kind(root) == NodeKind::Document)
    }

    /// Nearest inclusive ancestor matching `selector`
    fn closest(&self, node: &Self::Node, selector: &Selector) -> Option<Self::Node> {
        if self.kind(node) == NodeKind::Element && self.matches(node, selector) {
            return Some(node.clone());
        }
        self.ancestors(node)
            .into_iter()
            .find(|a| self.kind(a) == NodeKind::Element && self.matches(a, selector))
    }
}

/// Source of DOM change notifications, shaped after `MutationObserver`.
///
/// Observation covers child lists, character data and the whole subtree of
/// the observed root. Attribute changes are never reported.
pub trait MutationSource<N> {
    fn observe(&mut self, root: &N);
    fn disconnect(&mut self);
    fn is_observing(&self) -> bool;

    /// Drain records queued but not yet delivered
    fn take_records(&mut self) -> Vec<MutationRecord<N>>;
}

/// A document that also reports its own mutations
pub trait ObservedDom: Dom + MutationSource<<Self as Dom>::Node> {}

impl<T> ObservedDom for T where T: Dom + MutationSource<<T as Dom>::Node> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_and_class() {
        let sel = Selector::parse("span.a-price").unwrap();
        assert_eq!(sel.tag.as_deref(), Some("span"));
        assert_eq!(sel.classes, vec!["a-price".to_string()]);
        assert_eq!(sel.to_css(), "span.a-price");
    }

    #[test]
    fn test_parse_class_only() {
        let sel = Selector::parse(".a-price-whole").unwrap();
        assert_eq!(sel.tag, None);
        assert_eq!(sel.classes, vec!["a-price-whole".to_string()]);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(Selector::parse(""), Err(DomError::InvalidSelector(_))));
        assert!(matches!(Selector::parse("span."), Err(DomError::InvalidSelector(_))));
        assert!(matches!(Selector::parse("div > p"), Err(DomError::InvalidSelector(_))));
    }
}
