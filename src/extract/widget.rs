//! Structured price widget extraction
//!
//! Some storefronts render a price as a container assembling a whole part
//! and a fractional part, with an offscreen copy of the full price for
//! screen readers. The container is the annotation host.

use crate::annotate::store::AnnotationStore;
use crate::dom::{Dom, DomError, NodeKind, Selector};

use super::{find_first_price, parse_amount, Currency, PriceExtractor, PriceOccurrence};

/// Selectors describing one site's price widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteProfile {
    /// Matched as a substring of the page hostname
    pub token: &'static str,
    pub container: &'static str,
    pub whole: &'static str,
    pub fraction: &'static str,
    pub symbol: &'static str,
    /// Element carrying the full price as plain text
    pub fallback: &'static str,
}

/// Sites with a dedicated widget extractor
pub const KNOWN_SITES: &[SiteProfile] = &[SiteProfile {
    token: "amazon.",
    container: "span.a-price",
    whole: ".a-price-whole",
    fraction: ".a-price-fraction",
    symbol: ".a-price-symbol",
    fallback: ".a-offscreen",
}];

#[derive(Debug, Clone)]
pub struct StructuredWidgetExtractor {
    container: Selector,
    whole: Selector,
    fraction: Selector,
    symbol: Selector,
    fallback: Selector,
}

impl StructuredWidgetExtractor {
    pub fn new(profile: &SiteProfile) -> Result<Self, DomError> {
        Ok(Self {
            container: Selector::parse(profile.container)?,
            whole: Selector::parse(profile.whole)?,
            fraction: Selector::parse(profile.fraction)?,
            symbol: Selector::parse(profile.symbol)?,
            fallback: Selector::parse(profile.fallback)?,
        })
    }

    pub fn container_selector(&self) -> &Selector {
        &self.container
    }

    /// Nearest widget container enclosing or equal to `node`
    pub fn container_of<D: Dom>(&self, dom: &D, node: &D::Node) -> Option<D::Node> {
        dom.closest(node, &self.container)
    }

    fn first<D: Dom>(&self, dom: &D, scope: &D::Node, selector: &Selector) -> Option<D::Node> {
        dom.query_all(scope, selector).ok()?.into_iter().next()
    }
}

impl PriceExtractor for StructuredWidgetExtractor {
    fn targets<D: Dom>(
        &self,
        dom: &D,
        scope: &D::Node,
        store: &AnnotationStore,
    ) -> Result<Vec<D::Node>, DomError> {
        match dom.kind(scope) {
            NodeKind::Text | NodeKind::Other => {
                return Ok(self.container_of(dom, scope).into_iter().collect());
            }
            NodeKind::Element if store.is_annotation(dom, scope) => return Ok(Vec::new()),
            _ => {}
        }

        let mut out = Vec::new();
        if let Some(container) = self.container_of(dom, scope) {
            out.push(container);
        }
        for container in dom.query_all(scope, &self.container)? {
            if !out.contains(&container) {
                out.push(container);
            }
        }
        Ok(out)
    }

    fn extract<D: Dom>(&self, dom: &D, host: &D::Node) -> Option<PriceOccurrence<D::Node>> {
        let whole = self.first(dom, host, &self.whole);
        let fraction = self.first(dom, host, &self.fraction);

        let (value, raw_text) = match (whole, fraction) {
            (Some(whole), Some(fraction)) => {
                let whole_text = dom.text_content(&whole);
                let fraction_text = dom.text_content(&fraction);
                tracing::debug!(
                    whole = whole_text.trim(),
                    fraction = fraction_text.trim(),
                    "Found widget price parts"
                );
                let value = assemble_price(&whole_text, &fraction_text)?;
                (value, dom.text_content(host).trim().to_string())
            }
            _ => {
                let fallback = self.first(dom, host, &self.fallback)?;
                let found = find_first_price(&dom.text_content(&fallback))?;
                return Some(found.into_occurrence(host.clone()));
            }
        };

        let currency = self
            .first(dom, host, &self.symbol)
            .and_then(|s| Currency::from_symbol(&dom.text_content(&s)));

        Some(PriceOccurrence {
            source: host.clone(),
            raw_text,
            value,
            currency,
        })
    }
}

/// Join the whole and fractional parts of a widget price.
///
/// Only digits of each part are kept. A two-digit fraction is cents; a
/// three-digit fraction is a thousands group the widget split off at the
/// grouping separator (`1` + `999` is 1999). An empty fraction means a whole
/// amount.
fn assemble_price(whole: &str, fraction: &str) -> Option<f64> {
    let whole: String = whole.chars().filter(char::is_ascii_digit).collect();
    let fraction: String = fraction.chars().filter(char::is_ascii_digit).collect();
    if whole.is_empty() {
        return None;
    }
    let amount = match fraction.len() {
        0 => whole,
        2 => format!("{}.{}", whole, fraction),
        3 => format!("{}{}.00", whole, fraction),
        _ => return None,
    };
    parse_amount(&amount)
}
