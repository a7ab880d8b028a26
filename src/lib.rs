//! LifePrice price annotator
//!
//! A content script that finds prices on web pages and annotates each one
//! with the working time it costs at the user's hourly wage:
//! - Price extraction from plain text and from structured price widgets
//! - Time-cost formatting in hours, minutes or seconds
//! - Idempotent annotation with live updates as the page mutates
//!
//! The engine runs against the [`dom::Dom`] abstraction, so it is tested
//! natively on [`dom::MemoryDom`] and runs in the browser on `web::WebDom`.

pub mod annotate;
pub mod config;
pub mod dom;
pub mod extract;
pub mod format;
pub mod logging;
pub mod observe;

#[cfg(target_arch = "wasm32")]
pub mod web;

// Re-export common types
pub use annotate::{AnnotateReport, AnnotationEngine, AnnotationStore};
pub use config::{ConfigBridge, EngineConfig, MemoryBridge, StoredSettings};
pub use dom::{Dom, DomError, MemoryDom, MutationRecord, MutationSource};
pub use extract::{ExtractionStrategy, PriceExtractor, PriceOccurrence};
pub use format::{format_time_cost, TimeCost, TimeUnit};
pub use observe::MutationCoordinator;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Initialize the WASM module and start the content script
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn init() {
    // Set up better panic messages in debug mode
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    logging::init(logging::DEFAULT_DIRECTIVE);

    wasm_bindgen_futures::spawn_local(async {
        if let Err(e) = web::run().await {
            tracing::error!("LifePrice failed to start: {:#}", e);
        }
    });
}
