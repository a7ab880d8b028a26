//! In-memory arena DOM
//!
//! A small document tree with `MutationObserver`-like journalling. Nodes are
//! never freed; removed nodes simply become detached, the same way a live DOM
//! keeps removed nodes alive while something still references them.

use std::mem;

use super::{Dom, DomError, MutationRecord, MutationSource, NodeKind, Selector};

/// Handle to a node inside a [`MemoryDom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Fragment,
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed document with a head and a body
#[derive(Debug, Clone)]
pub struct MemoryDom {
    nodes: Vec<Slot>,
    document: NodeId,
    head: NodeId,
    body: NodeId,
    /// Observed root, `None` while disconnected
    observed: Option<NodeId>,
    journal: Vec<MutationRecord<NodeId>>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// Create an empty `<html><head/><body/></html>` document
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            document: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            observed: None,
            journal: Vec::new(),
        };
        dom.document = dom.alloc(NodeData::Document);
        let html = dom.create_element_node("html");
        dom.head = dom.create_element_node("head");
        dom.body = dom.create_element_node("body");
        dom.link(dom.document, html, None);
        dom.link(html, dom.head, None);
        dom.link(html, dom.body, None);
        dom
    }

    pub fn body_id(&self) -> NodeId {
        self.body
    }

    pub fn head_id(&self) -> NodeId {
        self.head
    }

    pub fn create_element_node(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Comment(text.to_string()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.alloc(NodeData::Fragment)
    }

    /// Replace every child of `parent` with `children`, reported as a single
    /// child-list record the way `replaceChildren` is.
    pub fn replace_children(&mut self, parent: NodeId, children: &[NodeId]) {
        let removed = mem::take(&mut self.nodes[parent.0].children);
        for child in &removed {
            self.nodes[child.0].parent = None;
        }
        let mut added = Vec::new();
        for &child in children {
            self.detach(child);
            added.extend(self.link_expanding(parent, child, None));
        }
        self.record_child_list(parent, added, removed);
    }

    /// Every text node under `root` whose text contains `needle`
    pub fn find_text(&self, root: NodeId, needle: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|n| matches!(&self.nodes[n.0].data, NodeData::Text(t) if t.contains(needle)))
            .collect()
    }

    pub(crate) fn comment_text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Comment(text) => Some(text),
            _ => None,
        }
    }

    pub(crate) fn attributes(&self, node: NodeId) -> &[(String, String)] {
        match &self.nodes[node.0].data {
            NodeData::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Descendants of `root` in document order, excluding `root`
    pub(crate) fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[root.0].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.nodes[node.0].children.iter().rev().copied());
        }
        out
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Slot {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Attach `child` under `parent` at `index` (append when `None`)
    fn link(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        match index {
            Some(i) if i <= children.len() => children.insert(i, child),
            _ => children.push(child),
        }
    }

    /// Like [`link`](Self::link), but a fragment contributes its children
    /// instead of itself. Returns the nodes that ended up in the tree.
    fn link_expanding(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) -> Vec<NodeId> {
        if !matches!(self.nodes[child.0].data, NodeData::Fragment) {
            self.link(parent, child, index);
            return vec![child];
        }
        let moved = mem::take(&mut self.nodes[child.0].children);
        for (offset, &node) in moved.iter().enumerate() {
            self.link(parent, node, index.map(|i| i + offset));
        }
        moved
    }

    /// Remove `node` from its parent, journalling the removal
    fn detach(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes[node.0].parent.take()?;
        self.nodes[parent.0].children.retain(|&c| c != node);
        self.record_child_list(parent, Vec::new(), vec![node]);
        Some(parent)
    }

    fn is_observed(&self, target: NodeId) -> bool {
        match self.observed {
            Some(root) => target == root || self.ancestors(&target).contains(&root),
            None => false,
        }
    }

    fn record_child_list(&mut self, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        if (added.is_empty() && removed.is_empty()) || !self.is_observed(target) {
            return;
        }
        self.journal.push(MutationRecord::ChildList {
            target,
            added,
            removed,
        });
    }

    fn element_mut(&mut self, node: NodeId) -> Result<&mut Vec<(String, String)>, DomError> {
        match &mut self.nodes[node.0].data {
            NodeData::Element { attributes, .. } => Ok(attributes),
            _ => Err(DomError::NotAnElement(format!("{:?}", node))),
        }
    }

    fn class_list(&self, node: NodeId) -> Vec<String> {
        self.attribute(&node, "class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl Dom for MemoryDom {
    type Node = NodeId;

    fn body(&self) -> Option<NodeId> {
        Some(self.body)
    }

    fn head(&self) -> Option<NodeId> {
        Some(self.head)
    }

    fn kind(&self, node: &NodeId) -> NodeKind {
        match self.nodes[node.0].data {
            NodeData::Document => NodeKind::Document,
            NodeData::Fragment => NodeKind::Fragment,
            NodeData::Element { .. } => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Comment(_) => NodeKind::Other,
        }
    }

    fn tag_name(&self, node: &NodeId) -> Option<String> {
        match &self.nodes[node.0].data {
            NodeData::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.nodes[node.0].children.clone()
    }

    fn next_sibling(&self, node: &NodeId) -> Option<NodeId> {
        let parent = self.nodes[node.0].parent?;
        let siblings = &self.nodes[parent.0].children;
        let index = siblings.iter().position(|c| c == node)?;
        siblings.get(index + 1).copied()
    }

    fn previous_sibling(&self, node: &NodeId) -> Option<NodeId> {
        let parent = self.nodes[node.0].parent?;
        let siblings = &self.nodes[parent.0].children;
        let index = siblings.iter().position(|c| c == node)?;
        index.checked_sub(1).map(|i| siblings[i])
    }

    fn text_content(&self, node: &NodeId) -> String {
        match &self.nodes[node.0].data {
            NodeData::Text(text) => text.clone(),
            NodeData::Comment(_) => String::new(),
            _ => self
                .descendants(*node)
                .into_iter()
                .filter_map(|n| match &self.nodes[n.0].data {
                    NodeData::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    fn has_class(&self, node: &NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.attributes(*node)
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.document)
            .into_iter()
            .find(|n| self.attribute(n, "id").as_deref() == Some(id))
    }

    fn query_all(&self, scope: &NodeId, selector: &Selector) -> Result<Vec<NodeId>, DomError> {
        Ok(self
            .descendants(*scope)
            .into_iter()
            .filter(|n| self.matches(n, selector))
            .collect())
    }

    fn matches(&self, node: &NodeId, selector: &Selector) -> bool {
        let tag = match &self.nodes[node.0].data {
            NodeData::Element { tag, .. } => tag,
            _ => return false,
        };
        if selector.tag.as_ref().is_some_and(|t| t != tag) {
            return false;
        }
        selector.classes.iter().all(|c| self.has_class(node, c))
    }

    fn create_element(&mut self, tag: &str) -> Result<NodeId, DomError> {
        Ok(self.create_element_node(tag))
    }

    fn append_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), DomError> {
        if matches!(self.nodes[parent.0].data, NodeData::Text(_) | NodeData::Comment(_)) {
            return Err(DomError::Js(format!("{:?} cannot have children", parent)));
        }
        self.detach(*child);
        let added = self.link_expanding(*parent, *child, None);
        self.record_child_list(*parent, added, Vec::new());
        Ok(())
    }

    fn insert_after(&mut self, reference: &NodeId, node: &NodeId) -> Result<(), DomError> {
        if self.nodes[reference.0].parent.is_none() {
            return Err(DomError::Detached(format!("{:?}", reference)));
        }
        self.detach(*node);
        let parent = self.nodes[reference.0]
            .parent
            .ok_or_else(|| DomError::Detached(format!("{:?}", reference)))?;
        let index = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| c == reference)
            .map(|i| i + 1);
        let added = self.link_expanding(parent, *node, index);
        self.record_child_list(parent, added, Vec::new());
        Ok(())
    }

    fn remove(&mut self, node: &NodeId) -> Result<(), DomError> {
        self.detach(*node);
        Ok(())
    }

    fn set_text(&mut self, node: &NodeId, text: &str) -> Result<(), DomError> {
        match self.kind(node) {
            NodeKind::Text | NodeKind::Other => {
                if let NodeData::Text(current) | NodeData::Comment(current) =
                    &mut self.nodes[node.0].data
                {
                    *current = text.to_string();
                }
                if self.is_observed(*node) {
                    self.journal.push(MutationRecord::CharacterData { target: *node });
                }
                Ok(())
            }
            NodeKind::Element | NodeKind::Fragment => {
                let text_node = self.create_text(text);
                self.replace_children(*node, &[text_node]);
                Ok(())
            }
            NodeKind::Document => Err(DomError::NotAnElement("document".to_string())),
        }
    }

    fn add_class(&mut self, node: &NodeId, class: &str) -> Result<(), DomError> {
        let mut classes = self.class_list(*node);
        if classes.iter().any(|c| c == class) {
            return Ok(());
        }
        classes.push(class.to_string());
        self.set_attribute(node, "class", &classes.join(" "))
    }

    fn remove_class(&mut self, node: &NodeId, class: &str) -> Result<(), DomError> {
        let classes: Vec<String> = self
            .class_list(*node)
            .into_iter()
            .filter(|c| c != class)
            .collect();
        self.set_attribute(node, "class", &classes.join(" "))
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let attributes = self.element_mut(*node)?;
        match attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }
}

impl MutationSource<NodeId> for MemoryDom {
    fn observe(&mut self, root: &NodeId) {
        self.observed = Some(*root);
    }

    fn disconnect(&mut self) {
        self.observed = None;
        self.journal.clear();
    }

    fn is_observing(&self) -> bool {
        self.observed.is_some()
    }

    fn take_records(&mut self) -> Vec<MutationRecord<NodeId>> {
        mem::take(&mut self.journal)
    }
}
