//! [`Dom`] over the live page

use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, MutationObserver, Node};

use crate::dom::{Dom, DomError, NodeKind, Selector};

pub(crate) fn js_error(value: JsValue) -> DomError {
    DomError::Js(
        value
            .as_string()
            .unwrap_or_else(|| format!("{:?}", value)),
    )
}

fn element(node: &Node) -> Result<&Element, DomError> {
    node.dyn_ref::<Element>()
        .ok_or_else(|| DomError::NotAnElement(node.node_name()))
}

/// The page document plus the observer watching it
pub struct WebDom {
    pub(crate) document: Document,
    pub(crate) observer: MutationObserver,
    pub(crate) observing: bool,
}

impl WebDom {
    pub fn new(document: Document, observer: MutationObserver) -> Self {
        Self {
            document,
            observer,
            observing: false,
        }
    }
}

impl Dom for WebDom {
    type Node = Node;

    fn body(&self) -> Option<Node> {
        self.document.body().map(Node::from)
    }

    fn head(&self) -> Option<Node> {
        self.document.head().map(Node::from)
    }

    fn kind(&self, node: &Node) -> NodeKind {
        match node.node_type() {
            Node::ELEMENT_NODE => NodeKind::Element,
            Node::TEXT_NODE => NodeKind::Text,
            Node::DOCUMENT_NODE => NodeKind::Document,
            Node::DOCUMENT_FRAGMENT_NODE => NodeKind::Fragment,
            _ => NodeKind::Other,
        }
    }

    fn tag_name(&self, node: &Node) -> Option<String> {
        node.dyn_ref::<Element>()
            .map(|e| e.tag_name().to_ascii_lowercase())
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        node.parent_node()
    }

    fn children(&self, node: &Node) -> Vec<Node> {
        let list = node.child_nodes();
        (0..list.length()).filter_map(|i| list.item(i)).collect()
    }

    fn next_sibling(&self, node: &Node) -> Option<Node> {
        node.next_sibling()
    }

    fn previous_sibling(&self, node: &Node) -> Option<Node> {
        node.previous_sibling()
    }

    fn text_content(&self, node: &Node) -> String {
        node.text_content().unwrap_or_default()
    }

    fn has_class(&self, node: &Node, class: &str) -> bool {
        node.dyn_ref::<Element>()
            .is_some_and(|e| e.class_list().contains(class))
    }

    fn attribute(&self, node: &Node, name: &str) -> Option<String> {
        node.dyn_ref::<Element>()?.get_attribute(name)
    }

    fn element_by_id(&self, id: &str) -> Option<Node> {
        self.document.get_element_by_id(id).map(Node::from)
    }

    fn query_all(&self, scope: &Node, selector: &Selector) -> Result<Vec<Node>, DomError> {
        let css = selector.to_css();
        let list = if let Some(e) = scope.dyn_ref::<Element>() {
            e.query_selector_all(&css)
        } else if let Some(d) = scope.dyn_ref::<Document>() {
            d.query_selector_all(&css)
        } else if let Some(f) = scope.dyn_ref::<web_sys::DocumentFragment>() {
            f.query_selector_all(&css)
        } else {
            return Ok(Vec::new());
        }
        .map_err(|_| DomError::InvalidSelector(css))?;

        Ok((0..list.length()).filter_map(|i| list.item(i)).collect())
    }

    fn matches(&self, node: &Node, selector: &Selector) -> bool {
        node.dyn_ref::<Element>()
            .is_some_and(|e| e.matches(&selector.to_css()).unwrap_or(false))
    }

    fn create_element(&mut self, tag: &str) -> Result<Node, DomError> {
        self.document
            .create_element(tag)
            .map(Node::from)
            .map_err(js_error)
    }

    fn append_child(&mut self, parent: &Node, child: &Node) -> Result<(), DomError> {
        parent.append_child(child).map(|_| ()).map_err(js_error)
    }

    fn insert_after(&mut self, reference: &Node, node: &Node) -> Result<(), DomError> {
        let parent = reference
            .parent_node()
            .ok_or_else(|| DomError::Detached(reference.node_name()))?;
        parent
            .insert_before(node, reference.next_sibling().as_ref())
            .map(|_| ())
            .map_err(js_error)
    }

    fn remove(&mut self, node: &Node) -> Result<(), DomError> {
        if let Some(parent) = node.parent_node() {
            parent.remove_child(node).map_err(js_error)?;
        }
        Ok(())
    }

    fn set_text(&mut self, node: &Node, text: &str) -> Result<(), DomError> {
        if node.node_type() == Node::DOCUMENT_NODE {
            return Err(DomError::NotAnElement(node.node_name()));
        }
        node.set_text_content(Some(text));
        Ok(())
    }

    fn add_class(&mut self, node: &Node, class: &str) -> Result<(), DomError> {
        element(node)?.class_list().add_1(class).map_err(js_error)
    }

    fn remove_class(&mut self, node: &Node, class: &str) -> Result<(), DomError> {
        element(node)?.class_list().remove_1(class).map_err(js_error)
    }

    fn set_attribute(&mut self, node: &Node, name: &str, value: &str) -> Result<(), DomError> {
        element(node)?.set_attribute(name, value).map_err(js_error)
    }

    fn is_connected(&self, node: &Node) -> bool {
        node.is_connected()
    }
}
