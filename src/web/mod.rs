//! Content-script runtime for the browser
//!
//! Wires the engine to the live page: picks the extraction strategy from the
//! hostname, reads settings from `chrome.storage`, waits for the page to
//! settle, runs the initial scan and then reacts to page mutations and
//! settings changes.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use js_sys::{Array, Promise};
use tracing::{debug, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{MutationObserver, Window};

use crate::config::{load_settings, EngineConfig, StoredSettings};
use crate::extract::ExtractionStrategy;
use crate::observe::MutationCoordinator;

pub mod dom;
pub mod observer;
pub mod storage;

pub use dom::WebDom;
pub use observer::convert_records;
pub use storage::ChromeStorage;

/// Delay between page load and the initial scan
pub const SETTLE_DELAY_MS: i32 = 500;

struct Runtime {
    dom: WebDom,
    coordinator: MutationCoordinator,
    settings: StoredSettings,
}

impl Runtime {
    fn on_mutations(&mut self, records: &Array) {
        let records = convert_records(records);
        if records.is_empty() {
            return;
        }
        self.coordinator.handle_batch(&mut self.dom, records);
    }

    fn on_storage_change(&mut self, changes: JsValue, area: JsValue) {
        let Some(area) = area.as_string() else {
            return;
        };
        let changes = match storage::decode_changes(changes) {
            Ok(changes) => changes,
            Err(e) => {
                warn!("Ignoring storage change: {:#}", e);
                return;
            }
        };
        let Some(settings) = self.settings.apply_changes(&area, &changes) else {
            return;
        };

        info!("Settings changed; refreshing annotations");
        let config = Rc::new(EngineConfig::from_settings(&settings));
        self.settings = settings;
        let report = self.coordinator.apply_config(&mut self.dom, config);
        debug!(?report, "Applied new settings");
    }
}

type Shared = Rc<RefCell<Runtime>>;

/// Run `f` on the runtime unless a callback further up the stack holds it
fn with_runtime(shared: &Shared, what: &str, f: impl FnOnce(&mut Runtime)) {
    match shared.try_borrow_mut() {
        Ok(mut runtime) => f(&mut runtime),
        Err(_) => debug!("Runtime busy; dropping {}", what),
    }
}

async fn sleep(window: &Window, ms: i32) -> Result<()> {
    let mut scheduled = Ok(0);
    let promise = Promise::new(&mut |resolve, _reject| {
        scheduled = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms);
    });
    scheduled.map_err(|e| anyhow!("setTimeout failed: {:?}", e))?;
    JsFuture::from(promise)
        .await
        .map_err(|e| anyhow!("settle timer rejected: {:?}", e))?;
    Ok(())
}

/// Start the content script on the current page
pub async fn run() -> Result<()> {
    let window = web_sys::window().context("No window")?;
    let document = window.document().context("No document")?;
    let hostname = window
        .location()
        .hostname()
        .map_err(|e| anyhow!("Failed to read hostname: {:?}", e))?;
    let strategy = ExtractionStrategy::for_hostname(&hostname);

    let storage = ChromeStorage::sync()?;
    let settings = load_settings(&storage)
        .await
        .context("Failed to read settings")?;
    let config = Rc::new(EngineConfig::from_settings(&settings));

    let slot: Rc<RefCell<Option<Shared>>> = Rc::new(RefCell::new(None));

    let pending = Rc::clone(&slot);
    let on_mutation = Closure::<dyn FnMut(Array, MutationObserver)>::new(
        move |records: Array, _observer: MutationObserver| {
            let Some(shared) = pending.borrow().clone() else {
                return;
            };
            with_runtime(&shared, "mutation batch", |runtime| runtime.on_mutations(&records));
        },
    );
    let observer = MutationObserver::new(on_mutation.as_ref().unchecked_ref())
        .map_err(|e| anyhow!("Failed to create MutationObserver: {:?}", e))?;
    // Lives as long as the page
    on_mutation.forget();

    let shared: Shared = Rc::new(RefCell::new(Runtime {
        dom: WebDom::new(document, observer),
        coordinator: MutationCoordinator::new(strategy, Rc::clone(&config)),
        settings,
    }));
    *slot.borrow_mut() = Some(Rc::clone(&shared));

    let listener_state = Rc::clone(&shared);
    let on_changed: storage::ChangeListener = Closure::new(move |changes: JsValue, area: JsValue| {
        with_runtime(&listener_state, "settings change", |runtime| {
            runtime.on_storage_change(changes, area)
        });
    });
    storage.on_changed(&on_changed)?;
    on_changed.forget();

    if config.is_active() {
        sleep(&window, SETTLE_DELAY_MS).await?;
    }
    with_runtime(&shared, "initial scan", |runtime| {
        let Runtime { dom, coordinator, .. } = runtime;
        coordinator.start(dom);
    });
    Ok(())
}
