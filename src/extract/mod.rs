//! Price extraction
//!
//! Turns a location in the DOM into an optional numeric price. Two
//! strategies exist and one is picked per page from its hostname:
//! - [`GenericTextExtractor`]: scans text nodes anywhere in the page
//! - [`StructuredWidgetExtractor`]: reads a site's composite price widget

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::annotate::store::AnnotationStore;
use crate::dom::{Dom, DomError};

pub mod generic;
pub mod widget;

pub use generic::GenericTextExtractor;
pub use widget::{SiteProfile, StructuredWidgetExtractor, KNOWN_SITES};

/// Optional currency symbol followed by a plain or comma-grouped amount.
///
/// The grouped form needs at least one `,ddd` group, otherwise leftmost-first
/// alternation would stop `1999.00` at `199`. Digits are ASCII only; other
/// scripts' digits are not amounts.
static PRICE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([$£€])?\s*([0-9]{1,3}(?:,[0-9]{3})+(?:\.[0-9]{2})?|[0-9]+(?:\.[0-9]{2})?)")
        .expect("price pattern is valid")
});

/// Currency symbols recognised in front of an amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Dollar,
    Pound,
    Euro,
}

impl Currency {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "$" => Some(Self::Dollar),
            "£" => Some(Self::Pound),
            "€" => Some(Self::Euro),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Self::Dollar => '$',
            Self::Pound => '£',
            Self::Euro => '€',
        }
    }
}

/// A price found in the page. Lives for one annotation pass only.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceOccurrence<N> {
    /// The host the annotation will be attached after
    pub source: N,
    /// Matched text, e.g. `$1,299.00`
    pub raw_text: String,
    pub value: f64,
    pub currency: Option<Currency>,
}

/// First price-shaped match in a piece of text
#[derive(Debug, Clone, PartialEq)]
pub struct PriceMatch {
    pub raw_text: String,
    pub value: f64,
    pub currency: Option<Currency>,
}

impl PriceMatch {
    pub fn into_occurrence<N>(self, source: N) -> PriceOccurrence<N> {
        PriceOccurrence {
            source,
            raw_text: self.raw_text,
            value: self.value,
            currency: self.currency,
        }
    }
}

/// Find the first price in `text`.
///
/// Only the first match counts: if it does not parse to a positive number
/// the text yields no price at all.
pub fn find_first_price(text: &str) -> Option<PriceMatch> {
    let normalized: String = text.nfkc().collect();
    let caps = PRICE_PATTERN.captures(&normalized)?;
    let amount = caps.get(2)?.as_str();
    let value = parse_amount(amount)?;
    Some(PriceMatch {
        raw_text: caps.get(0)?.as_str().trim().to_string(),
        value,
        currency: caps.get(1).and_then(|m| Currency::from_symbol(m.as_str())),
    })
}

/// Parse an amount after dropping grouping separators
pub(crate) fn parse_amount(amount: &str) -> Option<f64> {
    let cleaned: String = amount.chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Common interface of the extraction strategies
pub trait PriceExtractor {
    /// Candidate hosts within `scope`, in document order
    fn targets<D: Dom>(
        &self,
        dom: &D,
        scope: &D::Node,
        store: &AnnotationStore,
    ) -> Result<Vec<D::Node>, DomError>;

    /// Price carried by a host, if any
    fn extract<D: Dom>(&self, dom: &D, host: &D::Node) -> Option<PriceOccurrence<D::Node>>;
}

/// Extraction strategy, chosen once per page
#[derive(Debug, Clone)]
pub enum ExtractionStrategy {
    Generic(GenericTextExtractor),
    StructuredWidget(StructuredWidgetExtractor),
}

impl ExtractionStrategy {
    /// Pick the strategy for a page from its hostname
    pub fn for_hostname(hostname: &str) -> Self {
        let hostname = hostname.to_ascii_lowercase();
        let Some(profile) = KNOWN_SITES.iter().find(|p| hostname.contains(p.token)) else {
            return Self::generic();
        };
        match StructuredWidgetExtractor::new(profile) {
            Ok(extractor) => {
                tracing::info!("Using {} price widget extractor", profile.token);
                Self::StructuredWidget(extractor)
            }
            Err(e) => {
                tracing::error!("Site profile {} is unusable: {}", profile.token, e);
                Self::generic()
            }
        }
    }

    pub fn generic() -> Self {
        Self::Generic(GenericTextExtractor::default())
    }

    pub fn is_widget(&self) -> bool {
        matches!(self, Self::StructuredWidget(_))
    }

    /// The widget container enclosing `node`, for widget strategies
    pub fn container_of<D: Dom>(&self, dom: &D, node: &D::Node) -> Option<D::Node> {
        match self {
            Self::Generic(_) => None,
            Self::StructuredWidget(w) => w.container_of(dom, node),
        }
    }
}

impl PriceExtractor for ExtractionStrategy {
    fn targets<D: Dom>(
        &self,
        dom: &D,
        scope: &D::Node,
        store: &AnnotationStore,
    ) -> Result<Vec<D::Node>, DomError> {
        match self {
            Self::Generic(g) => g.targets(dom, scope, store),
            Self::StructuredWidget(w) => w.targets(dom, scope, store),
        }
    }

    fn extract<D: Dom>(&self, dom: &D, host: &D::Node) -> Option<PriceOccurrence<D::Node>> {
        match self {
            Self::Generic(g) => g.extract(dom, host),
            Self::StructuredWidget(w) => w.extract(dom, host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_price_with_symbol() {
        let m = find_first_price("Price: $20.00 today").unwrap();
        assert_eq!(m.value, 20.0);
        assert_eq!(m.raw_text, "$20.00");
        assert_eq!(m.currency, Some(Currency::Dollar));
    }

    #[test]
    fn test_grouped_amount() {
        let m = find_first_price("now £1,299.99!").unwrap();
        assert_eq!(m.value, 1299.99);
        assert_eq!(m.currency, Some(Currency::Pound));
    }

    #[test]
    fn test_ungrouped_amount_not_truncated() {
        assert_eq!(find_first_price("€1999.00").unwrap().value, 1999.0);
    }

    #[test]
    fn test_space_after_symbol() {
        let m = find_first_price("€ 15").unwrap();
        assert_eq!(m.value, 15.0);
        assert_eq!(m.currency, Some(Currency::Euro));
    }

    #[test]
    fn test_non_breaking_space_after_symbol() {
        let m = find_first_price("$\u{a0}42.50").unwrap();
        assert_eq!(m.value, 42.5);
        assert_eq!(m.currency, Some(Currency::Dollar));
    }

    #[test]
    fn test_bare_number_matches() {
        let m = find_first_price("only 7 left").unwrap();
        assert_eq!(m.value, 7.0);
        assert_eq!(m.currency, None);
    }

    #[test]
    fn test_first_match_only() {
        // A zero first match is not rescued by a later valid one
        assert!(find_first_price("$0 down, then $30").is_none());
        assert_eq!(find_first_price("$5 or $30").unwrap().value, 5.0);
    }

    #[test]
    fn test_only_ascii_digits_are_amounts() {
        let m = find_first_price("٣ items, $5").unwrap();
        assert_eq!(m.value, 5.0);
        assert_eq!(m.raw_text, "$5");
        // Fullwidth digits fold to ASCII under NFKC
        assert_eq!(find_first_price("$\u{FF11}\u{FF12}").unwrap().value, 12.0);
    }

    #[test]
    fn test_no_price() {
        assert!(find_first_price("no numbers here").is_none());
        assert!(find_first_price("").is_none());
    }

    #[test]
    fn test_strategy_selection() {
        assert!(ExtractionStrategy::for_hostname("www.amazon.com").is_widget());
        assert!(ExtractionStrategy::for_hostname("smile.Amazon.co.uk").is_widget());
        assert!(!ExtractionStrategy::for_hostname("example.org").is_widget());
    }
}
