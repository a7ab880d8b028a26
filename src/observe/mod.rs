//! Mutation coordination
//!
//! Runs the initial full-document scan, then keeps annotations in step with
//! the page by re-entering the [`AnnotationEngine`] on the scope of every
//! reported change. Configuration changes reset everything: existing
//! annotations reflect a stale wage, so they are erased before a fresh scan.
//!
//! The engine's own writes are never fed back into it. Records arriving while
//! a batch is being handled are dropped, and once a batch completes the
//! records its writes produced are drained and discarded.

use std::rc::Rc;

use tracing::{debug, error, info, trace, warn};

use crate::annotate::{style, AnnotateReport, AnnotationEngine};
use crate::config::EngineConfig;
use crate::dom::{Dom, MutationRecord, NodeKind, ObservedDom};
use crate::extract::ExtractionStrategy;

pub mod gate;

pub use gate::{BatchGate, GateGuard};

pub struct MutationCoordinator {
    engine: AnnotationEngine,
    config: Rc<EngineConfig>,
    gate: BatchGate,
}

impl MutationCoordinator {
    pub fn new(strategy: ExtractionStrategy, config: Rc<EngineConfig>) -> Self {
        Self {
            engine: AnnotationEngine::new(strategy),
            config,
            gate: BatchGate::default(),
        }
    }

    pub fn engine(&self) -> &AnnotationEngine {
        &self.engine
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Rc<EngineConfig> {
        Rc::clone(&self.config)
    }

    pub fn gate(&self) -> &BatchGate {
        &self.gate
    }

    /// Install the stylesheet, scan the whole body, then start observing.
    ///
    /// Does nothing while the configuration is inactive.
    pub fn start<H: ObservedDom>(&mut self, dom: &mut H) -> AnnotateReport {
        if !self.config.is_active() {
            warn!("Hourly wage not set or invalid; price annotation is dormant");
            return AnnotateReport::default();
        }
        let Some(body) = dom.body() else {
            warn!("Document has no body; nothing to annotate");
            return AnnotateReport::default();
        };

        if let Err(e) = style::install_stylesheet(dom, self.config.palette()) {
            error!("Failed to install annotation stylesheet: {}", e);
        }

        let report = self.engine.annotate(dom, &body, &self.config);
        dom.observe(&body);
        info!(
            annotated = report.annotated,
            failed = report.failed,
            "Initial price scan complete"
        );
        report
    }

    pub fn stop<H: ObservedDom>(&mut self, dom: &mut H) {
        dom.disconnect();
        debug!("Stopped observing page mutations");
    }

    /// Handle one batch of change notifications
    pub fn handle_batch<H: ObservedDom>(
        &mut self,
        dom: &mut H,
        records: Vec<MutationRecord<H::Node>>,
    ) -> AnnotateReport {
        let Some(_guard) = self.gate.try_enter() else {
            debug!("Dropping {} records delivered while busy", records.len());
            return AnnotateReport::default();
        };

        let mut report = AnnotateReport::default();
        let config = Rc::clone(&self.config);
        if !config.is_active() {
            return report;
        }

        let mut seen = Vec::new();
        for record in records {
            match record {
                MutationRecord::ChildList { target, added, .. } => {
                    for node in &added {
                        self.on_added(dom, node, &config, &mut seen, &mut report);
                    }
                    // Insertions can split a pair as well as removals
                    if dom.is_connected(&target)
                        && !self.engine.store().is_within_annotation(dom, &target)
                    {
                        report.merge(self.engine.reconcile(dom, &target, &config));
                    }
                }
                MutationRecord::CharacterData { target } => {
                    self.on_text_changed(dom, &target, &config, &mut seen, &mut report);
                }
            }
        }

        let own = dom.take_records();
        if !own.is_empty() {
            trace!("Discarded {} records caused by annotation writes", own.len());
        }
        if !report.is_empty() {
            debug!(?report, "Processed mutation batch");
        }
        report
    }

    /// Swap in a new configuration snapshot.
    ///
    /// Observation stops, every annotation and mark is erased, and when the
    /// new configuration is active the page is scanned again and observation
    /// resumes.
    pub fn apply_config<H: ObservedDom>(
        &mut self,
        dom: &mut H,
        config: Rc<EngineConfig>,
    ) -> AnnotateReport {
        self.stop(dom);

        let mut report = AnnotateReport::default();
        if let Some(body) = dom.body() {
            report.merge(self.engine.clear(dom, &body));
        }
        self.config = config;

        if !self.config.is_active() {
            warn!(
                removed = report.removed,
                "Hourly wage removed or invalid; annotations cleared"
            );
            return report;
        }
        report.merge(self.start(dom));
        report
    }

    fn on_added<H: Dom>(
        &self,
        dom: &mut H,
        node: &H::Node,
        config: &EngineConfig,
        seen: &mut Vec<H::Node>,
        report: &mut AnnotateReport,
    ) {
        let store = self.engine.store();
        if !dom.is_connected(node) || store.is_within_annotation(dom, node) {
            return;
        }

        let strategy = self.engine.strategy();
        if let Some(container) = strategy.container_of(dom, node) {
            if container != *node {
                // New content inside a widget: the widget re-rendered
                self.revisit_container(dom, container, config, seen, report);
                return;
            }
        }

        if !strategy.is_widget() && dom.kind(node) == NodeKind::Text && store.is_marked(dom, node) {
            // A text host replaced in place, in front of its old annotation
            report.merge(self.engine.refresh(dom, node, config));
        } else {
            report.merge(self.engine.annotate(dom, node, config));
        }
    }

    fn on_text_changed<H: Dom>(
        &self,
        dom: &mut H,
        node: &H::Node,
        config: &EngineConfig,
        seen: &mut Vec<H::Node>,
        report: &mut AnnotateReport,
    ) {
        if !dom.is_connected(node) || self.engine.store().is_within_annotation(dom, node) {
            return;
        }

        if self.engine.strategy().is_widget() {
            if let Some(container) = self.engine.strategy().container_of(dom, node) {
                self.revisit_container(dom, container, config, seen, report);
            }
        } else {
            report.merge(self.engine.refresh(dom, node, config));
        }
    }

    /// Re-annotate a widget container, at most once per batch
    fn revisit_container<H: Dom>(
        &self,
        dom: &mut H,
        container: H::Node,
        config: &EngineConfig,
        seen: &mut Vec<H::Node>,
        report: &mut AnnotateReport,
    ) {
        if seen.contains(&container) {
            return;
        }
        report.merge(self.engine.reannotate(dom, &container, config));
        seen.push(container);
    }
}
