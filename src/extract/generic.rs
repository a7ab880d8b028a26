//! Generic text extraction
//!
//! Every non-blank text node outside non-renderable containers and outside
//! the engine's own annotations is a candidate host.

use crate::annotate::store::AnnotationStore;
use crate::dom::{Dom, DomError, NodeKind};

use super::{find_first_price, PriceExtractor, PriceOccurrence};

/// Elements whose text never renders as page content
pub const NON_RENDERABLE_TAGS: &[&str] = &["script", "style", "noscript", "template", "textarea", "title"];

#[derive(Debug, Clone)]
pub struct GenericTextExtractor {
    skip_tags: Vec<String>,
}

impl Default for GenericTextExtractor {
    fn default() -> Self {
        Self {
            skip_tags: NON_RENDERABLE_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl GenericTextExtractor {
    /// Whether the subtree rooted at `node` must not be scanned
    fn is_excluded<D: Dom>(&self, dom: &D, node: &D::Node, store: &AnnotationStore) -> bool {
        if dom.kind(node) != NodeKind::Element {
            return false;
        }
        if store.is_annotation(dom, node) {
            return true;
        }
        dom.tag_name(node)
            .is_some_and(|tag| self.skip_tags.iter().any(|t| *t == tag))
    }

    /// Whether `node` sits inside an excluded container
    fn has_excluded_ancestor<D: Dom>(&self, dom: &D, node: &D::Node, store: &AnnotationStore) -> bool {
        dom.ancestors(node)
            .iter()
            .any(|a| self.is_excluded(dom, a, store))
    }
}

impl PriceExtractor for GenericTextExtractor {
    fn targets<D: Dom>(
        &self,
        dom: &D,
        scope: &D::Node,
        store: &AnnotationStore,
    ) -> Result<Vec<D::Node>, DomError> {
        if self.has_excluded_ancestor(dom, scope, store) {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let mut stack = vec![scope.clone()];
        while let Some(node) = stack.pop() {
            match dom.kind(&node) {
                NodeKind::Text => {
                    if !dom.text_content(&node).trim().is_empty() {
                        out.push(node);
                    }
                }
                NodeKind::Element | NodeKind::Fragment | NodeKind::Document => {
                    if self.is_excluded(dom, &node, store) {
                        continue;
                    }
                    stack.extend(dom.children(&node).into_iter().rev());
                }
                NodeKind::Other => {}
            }
        }
        Ok(out)
    }

    fn extract<D: Dom>(&self, dom: &D, host: &D::Node) -> Option<PriceOccurrence<D::Node>> {
        if dom.kind(host) != NodeKind::Text {
            return None;
        }
        find_first_price(&dom.text_content(host)).map(|m| m.into_occurrence(host.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;

    fn texts(dom: &MemoryDom, nodes: &[crate::dom::NodeId]) -> Vec<String> {
        nodes.iter().map(|n| dom.text_content(n)).collect()
    }

    #[test]
    fn test_targets_in_document_order() {
        let dom = MemoryDom::from_markup("<p>$1</p><div><span>$2</span> $3</div>").unwrap();
        let store = AnnotationStore::default();
        let targets = GenericTextExtractor::default()
            .targets(&dom, &dom.body_id(), &store)
            .unwrap();
        assert_eq!(texts(&dom, &targets), vec!["$1", "$2", " $3"]);
    }

    #[test]
    fn test_skips_non_renderable() {
        let dom = MemoryDom::from_markup(
            "<script>var p = '$5';</script><style>.x{width:5px}</style><p>$6</p>",
        )
        .unwrap();
        let store = AnnotationStore::default();
        let targets = GenericTextExtractor::default()
            .targets(&dom, &dom.body_id(), &store)
            .unwrap();
        assert_eq!(texts(&dom, &targets), vec!["$6"]);
    }

    #[test]
    fn test_skips_annotations_and_their_descendants() {
        let dom = MemoryDom::from_markup(
            r#"<p>$6<span class="lifeprice-hours"> 36 mins of your life</span></p>"#,
        )
        .unwrap();
        let store = AnnotationStore::default();
        let extractor = GenericTextExtractor::default();
        let targets = extractor.targets(&dom, &dom.body_id(), &store).unwrap();
        assert_eq!(texts(&dom, &targets), vec!["$6"]);

        let inner = dom.find_text(dom.body_id(), "36 mins")[0];
        assert!(extractor.targets(&dom, &inner, &store).unwrap().is_empty());
    }

    #[test]
    fn test_scope_inside_script_is_empty() {
        let dom = MemoryDom::from_markup("<script>let a = '$5';</script>").unwrap();
        let text = dom.find_text(dom.body_id(), "$5")[0];
        let targets = GenericTextExtractor::default()
            .targets(&dom, &text, &AnnotationStore::default())
            .unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn test_extract_from_text_node() {
        let dom = MemoryDom::from_markup("<p>Price: $20.00 today</p>").unwrap();
        let text = dom.find_text(dom.body_id(), "Price")[0];
        let occurrence = GenericTextExtractor::default().extract(&dom, &text).unwrap();
        assert_eq!(occurrence.source, text);
        assert_eq!(occurrence.value, 20.0);
    }
}
