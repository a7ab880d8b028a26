//! Annotation engine
//!
//! Orchestrates extraction, formatting and the DOM write for every target
//! in a scope. A host gets at most one annotation; hosts without a valid
//! price are left untouched and stay eligible for later passes.

use tracing::{debug, error};

use crate::config::EngineConfig;
use crate::dom::{Dom, NodeKind};
use crate::extract::{ExtractionStrategy, PriceExtractor};
use crate::format::format_time_cost;

pub mod store;
pub mod style;

pub use store::{AnnotationStore, HostState, ANNOTATION_CLASS, MARKER_CLASS};
pub use style::{install_stylesheet, STYLE_ELEMENT_ID};

/// Outcome counts of an engine pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotateReport {
    /// New annotations inserted
    pub annotated: usize,
    /// Existing annotations rewritten in place
    pub updated: usize,
    /// Annotations removed
    pub removed: usize,
    /// Targets or scopes that failed and were skipped
    pub failed: usize,
}

impl AnnotateReport {
    pub fn merge(&mut self, other: AnnotateReport) {
        self.annotated += other.annotated;
        self.updated += other.updated;
        self.removed += other.removed;
        self.failed += other.failed;
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Full annotation text for a price, or `None` when nothing should render
pub fn annotation_text(config: &EngineConfig, price: f64) -> Option<String> {
    let wage = config.hourly_wage()?;
    let cost = format_time_cost(price, wage);
    if cost.is_empty() {
        return None;
    }
    if config.show_unit_label() {
        Some(format!(" {} {}", cost, config.suffix_text()))
    } else {
        Some(format!(" {}", cost))
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationEngine {
    strategy: ExtractionStrategy,
    store: AnnotationStore,
}

impl AnnotationEngine {
    pub fn new(strategy: ExtractionStrategy) -> Self {
        Self {
            strategy,
            store: AnnotationStore::default(),
        }
    }

    pub fn strategy(&self) -> &ExtractionStrategy {
        &self.strategy
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// Annotate every unannotated price within `scope`
    pub fn annotate<D: Dom>(&self, dom: &mut D, scope: &D::Node, config: &EngineConfig) -> AnnotateReport {
        let mut report = AnnotateReport::default();
        if !config.is_active() {
            return report;
        }

        let targets = match self.strategy.targets(dom, scope, &self.store) {
            Ok(targets) => targets,
            Err(e) => {
                error!("Failed to collect price targets in {:?}: {}", scope, e);
                report.failed += 1;
                return report;
            }
        };

        for host in targets {
            self.annotate_host(dom, &host, config, &mut report);
        }
        report
    }

    /// Annotate one target, walking the host state machine.
    ///
    /// An annotated host is skipped. A half-present pair (a mark without its
    /// annotation, or an annotation after an unmarked widget container) is
    /// not skipped even though an annotation may follow the host: both halves
    /// are stripped and the host is evaluated from scratch, so a pair the
    /// page tore apart cannot keep a stale value.
    fn annotate_host<D: Dom>(
        &self,
        dom: &mut D,
        host: &D::Node,
        config: &EngineConfig,
        report: &mut AnnotateReport,
    ) {
        match self.store.state(dom, host) {
            HostState::Annotated => return,
            HostState::Desynced => {
                debug!("Clearing half-present annotation on {:?}", host);
                if self.store.annotation_of(dom, host).is_some() {
                    report.removed += 1;
                }
                if let Err(e) = self.store.unmark(dom, host) {
                    error!("Failed to reset {:?}: {}", host, e);
                    report.failed += 1;
                    return;
                }
            }
            HostState::Unprocessed => {}
        }

        let Some(occurrence) = self.strategy.extract(dom, host) else {
            return;
        };
        let Some(text) = annotation_text(config, occurrence.value) else {
            return;
        };

        match self.store.mark(dom, host, &text) {
            Ok(_) => {
                debug!(price = occurrence.value, raw = %occurrence.raw_text, "Annotated price");
                report.annotated += 1;
            }
            Err(e) => {
                error!("Failed to insert annotation after {:?}: {}", host, e);
                report.failed += 1;
            }
        }
    }

    /// Bring `host` up to date after its content changed.
    ///
    /// Text hosts are recomputed and their annotation rewritten in place, or
    /// removed when the text no longer holds a price. Widget containers are
    /// fully re-annotated.
    pub fn refresh<D: Dom>(&self, dom: &mut D, host: &D::Node, config: &EngineConfig) -> AnnotateReport {
        match self.strategy {
            ExtractionStrategy::Generic(_) => self.refresh_text(dom, host, config),
            ExtractionStrategy::StructuredWidget(_) => self.reannotate(dom, host, config),
        }
    }

    fn refresh_text<D: Dom>(&self, dom: &mut D, host: &D::Node, config: &EngineConfig) -> AnnotateReport {
        let mut report = AnnotateReport::default();
        if !config.is_active() {
            return report;
        }
        if !self.store.is_marked(dom, host) {
            return self.annotate(dom, host, config);
        }

        let text = self
            .strategy
            .extract(dom, host)
            .and_then(|occurrence| annotation_text(config, occurrence.value));

        let result = match text {
            Some(text) => self.store.update(dom, host, &text).map(|changed| {
                if changed {
                    report.updated += 1;
                }
            }),
            None => self.store.unmark(dom, host).map(|()| report.removed += 1),
        };
        if let Err(e) = result {
            error!("Failed to refresh annotation of {:?}: {}", host, e);
            report.failed += 1;
        }
        report
    }

    /// Drop the annotation of a widget container and evaluate it again
    pub fn reannotate<D: Dom>(&self, dom: &mut D, container: &D::Node, config: &EngineConfig) -> AnnotateReport {
        let mut report = AnnotateReport::default();
        if !config.is_active() {
            return report;
        }
        if self.store.annotation_of(dom, container).is_some() {
            report.removed += 1;
        }
        if let Err(e) = self.store.unmark(dom, container) {
            error!("Failed to clear annotation of {:?}: {}", container, e);
            report.failed += 1;
            return report;
        }
        report.merge(self.annotate(dom, container, config));
        report
    }

    /// Repair annotation pairs among the children of `parent` and evaluate
    /// hosts that lost their annotation.
    ///
    /// With the generic strategy every text child is evaluated again: a text
    /// node that slid up in front of an annotation only keeps it while it
    /// still holds a price, and a text host split from its annotation gets a
    /// fresh one.
    pub fn reconcile<D: Dom>(&self, dom: &mut D, parent: &D::Node, config: &EngineConfig) -> AnnotateReport {
        let (removed, stale) = self.store.reconcile(dom, parent);
        let mut report = AnnotateReport {
            removed,
            ..AnnotateReport::default()
        };
        if !config.is_active() {
            return report;
        }
        for host in stale {
            report.merge(self.annotate(dom, &host, config));
        }
        if let ExtractionStrategy::Generic(_) = self.strategy {
            for child in dom.children(parent) {
                if dom.kind(&child) == NodeKind::Text && dom.parent(&child).as_ref() == Some(parent) {
                    report.merge(self.refresh_text(dom, &child, config));
                }
            }
        }
        report
    }

    /// Remove every annotation and mark under `root`
    pub fn clear<D: Dom>(&self, dom: &mut D, root: &D::Node) -> AnnotateReport {
        AnnotateReport {
            removed: self.store.clear_all(dom, root),
            ..AnnotateReport::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, NodeId, Selector};
    use pretty_assertions::assert_eq;

    fn generic() -> AnnotationEngine {
        AnnotationEngine::new(ExtractionStrategy::generic())
    }

    fn annotations(dom: &MemoryDom) -> Vec<NodeId> {
        dom.query_all(&dom.body_id(), &Selector::parse("span.lifeprice-hours").unwrap())
            .unwrap()
    }

    #[test]
    fn test_annotation_text() {
        let config = EngineConfig::with_wage(10.0);
        assert_eq!(annotation_text(&config, 20.0).as_deref(), Some(" 2.0 hrs of your life"));
        assert_eq!(annotation_text(&config, 0.0), None);
        assert_eq!(annotation_text(&EngineConfig::default(), 20.0), None);
    }

    #[test]
    fn test_annotation_text_without_label() {
        let config = EngineConfig::from_settings(&crate::config::StoredSettings {
            hourly_wage: Some(10.0),
            show_unit_label: false,
            ..Default::default()
        });
        assert_eq!(annotation_text(&config, 5.0).as_deref(), Some(" 30 mins"));
    }

    #[test]
    fn test_annotate_generic() {
        let mut dom = MemoryDom::from_markup("<p>Price: $20.00 today</p><p>free</p>").unwrap();
        let body = dom.body_id();
        let report = generic().annotate(&mut dom, &body, &EngineConfig::with_wage(10.0));

        assert_eq!(report.annotated, 1);
        assert_eq!(
            dom.inner_markup(body),
            r#"<p>Price: $20.00 today<span class="lifeprice-hours"> 2.0 hrs of your life</span></p><p>free</p>"#
        );
    }

    #[test]
    fn test_annotate_twice_is_idempotent() {
        let mut dom = MemoryDom::from_markup("<p>$5</p><div>$7 and $8<b>£9</b></div>").unwrap();
        let body = dom.body_id();
        let engine = generic();
        let config = EngineConfig::with_wage(10.0);

        let first = engine.annotate(&mut dom, &body, &config);
        let snapshot = dom.inner_markup(body);
        let second = engine.annotate(&mut dom, &body, &config);

        assert_eq!(first.annotated, 3);
        assert!(second.is_empty());
        assert_eq!(dom.inner_markup(body), snapshot);
        assert_eq!(annotations(&dom).len(), 3);
    }

    #[test]
    fn test_inactive_config_does_nothing() {
        let mut dom = MemoryDom::from_markup("<p>$5</p>").unwrap();
        let body = dom.body_id();
        let report = generic().annotate(&mut dom, &body, &EngineConfig::default());
        assert!(report.is_empty());
        assert!(annotations(&dom).is_empty());
    }

    #[test]
    fn test_detached_host_fails_without_aborting_batch() {
        let mut dom = MemoryDom::from_markup("<p>$5</p>").unwrap();
        let body = dom.body_id();
        let engine = generic();
        let config = EngineConfig::with_wage(10.0);

        // Never attached to the document
        let loose = dom.create_text("$9");
        let report = engine.annotate(&mut dom, &loose, &config);
        assert_eq!(report.failed, 1);

        let report = engine.annotate(&mut dom, &body, &config);
        assert_eq!(report.annotated, 1);
    }

    #[test]
    fn test_refresh_text_updates_in_place() {
        let mut dom = MemoryDom::from_markup("<p>$20</p>").unwrap();
        let body = dom.body_id();
        let engine = generic();
        let config = EngineConfig::with_wage(10.0);
        engine.annotate(&mut dom, &body, &config);

        let text = dom.find_text(body, "$20")[0];
        let annotation = engine.store().annotation_of(&dom, &text).unwrap();
        dom.set_text(&text, "$30").unwrap();
        let report = engine.refresh(&mut dom, &text, &config);

        assert_eq!(report.updated, 1);
        assert_eq!(engine.store().annotation_of(&dom, &text), Some(annotation));
        assert_eq!(dom.text_content(&annotation), " 3.0 hrs of your life");
    }

    #[test]
    fn test_refresh_text_removes_when_price_gone() {
        let mut dom = MemoryDom::from_markup("<p>$20</p>").unwrap();
        let body = dom.body_id();
        let engine = generic();
        let config = EngineConfig::with_wage(10.0);
        engine.annotate(&mut dom, &body, &config);

        let text = dom.find_text(body, "$20")[0];
        dom.set_text(&text, "sold out").unwrap();
        let report = engine.refresh(&mut dom, &text, &config);

        assert_eq!(report.removed, 1);
        assert!(!engine.store().is_marked(&dom, &text));
        assert_eq!(dom.inner_markup(body), "<p>sold out</p>");

        // Eligible again once a price comes back
        dom.set_text(&text, "$10").unwrap();
        assert_eq!(engine.refresh(&mut dom, &text, &config).annotated, 1);
    }

    #[test]
    fn test_desynced_host_is_reset_and_reannotated() {
        let mut dom = MemoryDom::from_markup(
            r#"<span class="a-price lifeprice-processed" id="w"><span class="a-offscreen">$20.00</span></span>"#,
        )
        .unwrap();
        let body = dom.body_id();
        let engine = AnnotationEngine::new(ExtractionStrategy::for_hostname("www.amazon.com"));
        let report = engine.annotate(&mut dom, &body, &EngineConfig::with_wage(10.0));

        assert_eq!(report.annotated, 1);
        let host = dom.element_by_id("w").unwrap();
        assert_eq!(engine.store().state(&dom, &host), HostState::Annotated);
    }
}
