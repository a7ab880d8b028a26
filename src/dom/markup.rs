//! Markup import/export for [`MemoryDom`]
//!
//! Fixtures are written as well-formed XHTML body content and parsed with
//! roxmltree. Serialisation escapes text and attribute values with
//! html-escape so snapshots read like the page they describe.

use super::memory::{MemoryDom, NodeId};
use super::{Dom, DomError, NodeKind};

impl MemoryDom {
    /// Build a document whose `<body>` holds `body` (XHTML fragment)
    pub fn from_markup(body: &str) -> Result<Self, DomError> {
        let wrapped = format!("<body>{}</body>", body);
        let doc = roxmltree::Document::parse(&wrapped)
            .map_err(|e| DomError::Parse(e.to_string()))?;

        let mut dom = MemoryDom::new();
        let target = dom.body_id();
        for child in doc.root_element().children() {
            dom.import(child, target)?;
        }
        Ok(dom)
    }

    fn import(&mut self, node: roxmltree::Node<'_, '_>, parent: NodeId) -> Result<(), DomError> {
        let id = if node.is_element() {
            let el = self.create_element_node(node.tag_name().name());
            for attr in node.attributes() {
                self.set_attribute(&el, attr.name(), attr.value())?;
            }
            for child in node.children() {
                self.import(child, el)?;
            }
            el
        } else if node.is_text() {
            self.create_text(node.text().unwrap_or_default())
        } else if node.is_comment() {
            self.create_comment(node.text().unwrap_or_default())
        } else {
            return Ok(());
        };
        self.append_child(&parent, &id)
    }

    /// Serialise `node` and its subtree
    pub fn to_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out);
        out
    }

    /// Serialise the children of `node`
    pub fn inner_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(&node) {
            self.write_markup(child, &mut out);
        }
        out
    }

    fn write_markup(&self, node: NodeId, out: &mut String) {
        match self.kind(&node) {
            NodeKind::Text => {
                out.push_str(&html_escape::encode_text(&self.text_content(&node)));
            }
            NodeKind::Element => {
                let tag = self.tag_name(&node).unwrap_or_default();
                out.push('<');
                out.push_str(&tag);
                for (name, value) in self.attributes(node) {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                out.push('>');
                for child in self.children(&node) {
                    self.write_markup(child, out);
                }
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
            }
            NodeKind::Other => {
                if let Some(text) = self.comment_text(node) {
                    out.push_str("<!--");
                    out.push_str(text);
                    out.push_str("-->");
                }
            }
            NodeKind::Document | NodeKind::Fragment => {
                for child in self.children(&node) {
                    self.write_markup(child, out);
                }
            }
        }
    }
}
