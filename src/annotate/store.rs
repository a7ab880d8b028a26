//! Annotation bookkeeping on the live DOM
//!
//! The DOM itself is the store: a host is marked by the class
//! [`MARKER_CLASS`] (element hosts) or by the adjacency of its annotation
//! (text hosts, which cannot carry attributes), and the annotation is the
//! host's immediate next sibling carrying [`ANNOTATION_CLASS`]. Marks
//! survive any reordering the page does to its own nodes.
//!
//! Every write here adds or removes both halves of a host/annotation pair in
//! one synchronous step, so `is_marked(host) == annotation_of(host).is_some()`
//! holds between calls.

use crate::dom::{Dom, DomError, NodeKind, Selector};

/// Class of the engine-owned annotation element
pub const ANNOTATION_CLASS: &str = "lifeprice-hours";

/// Class set on element hosts that own an annotation
pub const MARKER_CLASS: &str = "lifeprice-processed";

const ANNOTATION_TAG: &str = "span";

/// Processing state of a candidate host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// No mark and no annotation
    Unprocessed,
    /// Marked, with its annotation in place
    Annotated,
    /// Only one half of the pair survived a page re-render
    Desynced,
}

#[derive(Debug, Clone)]
pub struct AnnotationStore {
    annotation: Selector,
    marker: Selector,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self {
            annotation: Selector {
                tag: Some(ANNOTATION_TAG.to_string()),
                classes: vec![ANNOTATION_CLASS.to_string()],
            },
            marker: Selector {
                tag: None,
                classes: vec![MARKER_CLASS.to_string()],
            },
        }
    }
}

impl AnnotationStore {
    /// Whether `node` is an annotation element
    pub fn is_annotation<D: Dom>(&self, dom: &D, node: &D::Node) -> bool {
        dom.kind(node) == NodeKind::Element && dom.matches(node, &self.annotation)
    }

    /// Whether `node` is an annotation or lives inside one
    pub fn is_within_annotation<D: Dom>(&self, dom: &D, node: &D::Node) -> bool {
        self.is_annotation(dom, node)
            || dom.ancestors(node).iter().any(|a| self.is_annotation(dom, a))
    }

    /// The annotation owned by `host`, if any
    pub fn annotation_of<D: Dom>(&self, dom: &D, host: &D::Node) -> Option<D::Node> {
        dom.next_sibling(host)
            .filter(|sibling| self.is_annotation(dom, sibling))
    }

    /// Whether `host` carries a processing mark
    pub fn is_marked<D: Dom>(&self, dom: &D, host: &D::Node) -> bool {
        match dom.kind(host) {
            NodeKind::Element => dom.matches(host, &self.marker),
            NodeKind::Text => self.annotation_of(dom, host).is_some(),
            _ => false,
        }
    }

    pub fn state<D: Dom>(&self, dom: &D, host: &D::Node) -> HostState {
        match (self.is_marked(dom, host), self.annotation_of(dom, host).is_some()) {
            (true, true) => HostState::Annotated,
            (false, false) => HostState::Unprocessed,
            _ => HostState::Desynced,
        }
    }

    /// Attach a new annotation with `text` after `host` and mark the host.
    ///
    /// If marking fails after insertion, the inserted annotation is removed
    /// again before the error is returned.
    pub fn mark<D: Dom>(&self, dom: &mut D, host: &D::Node, text: &str) -> Result<D::Node, DomError> {
        let annotation = dom.create_element(ANNOTATION_TAG)?;
        dom.add_class(&annotation, ANNOTATION_CLASS)?;
        dom.set_text(&annotation, text)?;
        dom.insert_after(host, &annotation)?;

        if dom.kind(host) == NodeKind::Element {
            if let Err(e) = dom.add_class(host, MARKER_CLASS) {
                dom.remove(&annotation)?;
                return Err(e);
            }
        }
        Ok(annotation)
    }

    /// Rewrite the text of `host`'s annotation in place.
    ///
    /// Returns whether anything changed.
    pub fn update<D: Dom>(&self, dom: &mut D, host: &D::Node, text: &str) -> Result<bool, DomError> {
        let annotation = self
            .annotation_of(dom, host)
            .ok_or_else(|| DomError::Detached(format!("no annotation after {:?}", host)))?;
        if dom.text_content(&annotation) == text {
            return Ok(false);
        }
        dom.set_text(&annotation, text)?;
        Ok(true)
    }

    /// Remove `host`'s annotation and mark, whichever are present
    pub fn unmark<D: Dom>(&self, dom: &mut D, host: &D::Node) -> Result<(), DomError> {
        if let Some(annotation) = self.annotation_of(dom, host) {
            dom.remove(&annotation)?;
        }
        if dom.kind(host) == NodeKind::Element && dom.matches(host, &self.marker) {
            dom.remove_class(host, MARKER_CLASS)?;
        }
        Ok(())
    }

    /// Remove every annotation and every mark under `root`.
    ///
    /// Returns the number of annotations removed.
    pub fn clear_all<D: Dom>(&self, dom: &mut D, root: &D::Node) -> usize {
        let mut removed = 0;
        match dom.query_all(root, &self.annotation) {
            Ok(annotations) => {
                for annotation in annotations {
                    match dom.remove(&annotation) {
                        Ok(()) => removed += 1,
                        Err(e) => tracing::error!("Failed to remove annotation: {}", e),
                    }
                }
            }
            Err(e) => tracing::error!("Failed to collect annotations: {}", e),
        }
        match dom.query_all(root, &self.marker) {
            Ok(hosts) => {
                for host in hosts {
                    if let Err(e) = dom.remove_class(&host, MARKER_CLASS) {
                        tracing::error!("Failed to clear mark: {}", e);
                    }
                }
            }
            Err(e) => tracing::error!("Failed to collect marked hosts: {}", e),
        }
        removed
    }

    /// Repair pairs broken by the page among the children of `parent`.
    ///
    /// Annotations without a possible host before them are removed: the
    /// previous sibling must be a text node or a marked element. Whether a
    /// text node still holds a price is for the caller to check. Marked
    /// element hosts that lost their annotation are unmarked and returned so
    /// the caller can evaluate them again. Also returns the number of
    /// annotations removed.
    pub fn reconcile<D: Dom>(&self, dom: &mut D, parent: &D::Node) -> (usize, Vec<D::Node>) {
        let mut removed = 0;
        let mut stale = Vec::new();
        for child in dom.children(parent) {
            if dom.parent(&child).as_ref() != Some(parent) {
                continue;
            }
            if self.is_annotation(dom, &child) {
                let owned = dom.previous_sibling(&child).is_some_and(|host| {
                    !self.is_annotation(dom, &host)
                        && match dom.kind(&host) {
                            NodeKind::Text => true,
                            NodeKind::Element => dom.matches(&host, &self.marker),
                            _ => false,
                        }
                });
                if !owned {
                    match dom.remove(&child) {
                        Ok(()) => removed += 1,
                        Err(e) => tracing::error!("Failed to remove orphaned annotation: {}", e),
                    }
                }
            } else if dom.kind(&child) == NodeKind::Element
                && dom.matches(&child, &self.marker)
                && self.annotation_of(dom, &child).is_none()
            {
                match self.unmark(dom, &child) {
                    Ok(()) => stale.push(child),
                    Err(e) => tracing::error!("Failed to clear stale mark: {}", e),
                }
            }
        }
        (removed, stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;

    fn holds_invariant(dom: &MemoryDom, store: &AnnotationStore) -> bool {
        let body = dom.body_id();
        let mut nodes = vec![body];
        nodes.extend(dom.query_all(&body, &Selector::parse("span").unwrap()).unwrap());
        nodes.extend(dom.find_text(body, ""));
        nodes
            .iter()
            .filter(|n| !store.is_annotation(dom, n))
            .all(|n| store.is_marked(dom, n) == store.annotation_of(dom, n).is_some())
    }

    #[test]
    fn test_mark_element_host() {
        let mut dom = MemoryDom::from_markup(r#"<div><span id="h">$5</span></div>"#).unwrap();
        let store = AnnotationStore::default();
        let host = dom.element_by_id("h").unwrap();

        assert_eq!(store.state(&dom, &host), HostState::Unprocessed);
        let annotation = store.mark(&mut dom, &host, " 30 mins").unwrap();

        assert_eq!(dom.next_sibling(&host), Some(annotation));
        assert!(store.is_marked(&dom, &host));
        assert_eq!(store.state(&dom, &host), HostState::Annotated);
        assert_eq!(dom.text_content(&annotation), " 30 mins");
        assert!(holds_invariant(&dom, &store));
    }

    #[test]
    fn test_mark_text_host() {
        let mut dom = MemoryDom::from_markup("<p>$5 each</p>").unwrap();
        let store = AnnotationStore::default();
        let text = dom.find_text(dom.body_id(), "$5")[0];

        assert!(!store.is_marked(&dom, &text));
        store.mark(&mut dom, &text, " 30 mins").unwrap();
        assert!(store.is_marked(&dom, &text));
        assert_eq!(
            dom.inner_markup(dom.body_id()),
            r#"<p>$5 each<span class="lifeprice-hours"> 30 mins</span></p>"#
        );
    }

    #[test]
    fn test_mark_detached_host_fails_cleanly() {
        let mut dom = MemoryDom::new();
        let store = AnnotationStore::default();
        let loose = dom.create_element_node("span");

        assert!(matches!(store.mark(&mut dom, &loose, "x"), Err(DomError::Detached(_))));
        assert!(!store.is_marked(&dom, &loose));
    }

    #[test]
    fn test_update_in_place() {
        let mut dom = MemoryDom::from_markup("<p>$5</p>").unwrap();
        let store = AnnotationStore::default();
        let text = dom.find_text(dom.body_id(), "$5")[0];
        let annotation = store.mark(&mut dom, &text, " a").unwrap();

        assert!(!store.update(&mut dom, &text, " a").unwrap());
        assert!(store.update(&mut dom, &text, " b").unwrap());
        assert_eq!(store.annotation_of(&dom, &text), Some(annotation));
        assert_eq!(dom.text_content(&annotation), " b");
    }

    #[test]
    fn test_unmark_removes_both_halves() {
        let mut dom = MemoryDom::from_markup(r#"<div><span id="h">$5</span></div>"#).unwrap();
        let store = AnnotationStore::default();
        let host = dom.element_by_id("h").unwrap();
        store.mark(&mut dom, &host, " x").unwrap();
        store.unmark(&mut dom, &host).unwrap();

        assert_eq!(store.state(&dom, &host), HostState::Unprocessed);
        assert_eq!(dom.next_sibling(&host), None);
        assert!(holds_invariant(&dom, &store));
    }

    #[test]
    fn test_clear_all() {
        let mut dom = MemoryDom::from_markup(
            r#"<p>$1</p><div><span id="h">$5</span></div><p>$2</p>"#,
        )
        .unwrap();
        let store = AnnotationStore::default();
        let host = dom.element_by_id("h").unwrap();
        store.mark(&mut dom, &host, " x").unwrap();
        for text in dom.find_text(dom.body_id(), "$") {
            if dom.parent(&text) != Some(host) {
                store.mark(&mut dom, &text, " y").unwrap();
            }
        }

        let body = dom.body_id();
        assert_eq!(store.clear_all(&mut dom, &body), 3);
        assert_eq!(
            dom.inner_markup(body),
            r#"<p>$1</p><div><span id="h" class="">$5</span></div><p>$2</p>"#
        );
    }

    #[test]
    fn test_desynced_states() {
        let mut dom = MemoryDom::from_markup(
            r#"<div id="d"><span id="a" class="lifeprice-processed">$5</span><span id="b">$6</span><span class="lifeprice-hours"> x</span></div>"#,
        )
        .unwrap();
        let store = AnnotationStore::default();
        let a = dom.element_by_id("a").unwrap();
        let b = dom.element_by_id("b").unwrap();

        assert_eq!(store.state(&dom, &a), HostState::Desynced);
        assert_eq!(store.state(&dom, &b), HostState::Desynced);
    }

    #[test]
    fn test_reconcile() {
        let mut dom = MemoryDom::from_markup(
            r#"<div id="d"><span class="lifeprice-hours"> orphan</span><span id="a" class="lifeprice-processed">$5</span><span id="b">$6</span><span class="lifeprice-hours"> unowned</span>$7<span class="lifeprice-hours"> owned</span></div>"#,
        )
        .unwrap();
        let store = AnnotationStore::default();
        let d = dom.element_by_id("d").unwrap();
        let a = dom.element_by_id("a").unwrap();

        let (removed, stale) = store.reconcile(&mut dom, &d);
        assert_eq!(removed, 2);
        assert_eq!(stale, vec![a]);
        assert!(!store.is_marked(&dom, &a));
        assert_eq!(
            dom.inner_markup(d),
            r#"<span id="a" class="">$5</span><span id="b">$6</span>$7<span class="lifeprice-hours"> owned</span>"#
        );
        assert!(holds_invariant(&dom, &store));
    }
}
