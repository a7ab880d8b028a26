//! `chrome.storage` access

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use js_sys::{Array, Function, Promise, Reflect};
use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::config::{ConfigBridge, ConfigError, StorageChange, SYNC_AREA};

/// Listener shape of `chrome.storage.onChanged`
pub type ChangeListener = Closure<dyn FnMut(JsValue, JsValue)>;

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn property(target: &JsValue, name: &str) -> Result<JsValue> {
    let value = Reflect::get(target, &JsValue::from_str(name))
        .map_err(|e| anyhow!("reading {}: {}", name, describe(&e)))?;
    if value.is_undefined() || value.is_null() {
        return Err(anyhow!("{} is not available", name));
    }
    Ok(value)
}

/// The synchronized storage area of the extension API
pub struct ChromeStorage {
    storage: JsValue,
    area: JsValue,
}

impl ChromeStorage {
    pub fn sync() -> Result<Self> {
        let chrome = property(&js_sys::global(), "chrome").context("Extension API missing")?;
        let storage = property(&chrome, "storage").context("Storage permission missing")?;
        let area = property(&storage, SYNC_AREA)?;
        Ok(Self { storage, area })
    }

    /// Register `listener` for `onChanged(changes, areaName)`
    pub fn on_changed(&self, listener: &ChangeListener) -> Result<()> {
        let event = property(&self.storage, "onChanged")?;
        let add: Function = property(&event, "addListener")?
            .dyn_into()
            .map_err(|_| anyhow!("onChanged.addListener is not a function"))?;
        add.call1(&event, listener.as_ref().unchecked_ref())
            .map_err(|e| anyhow!("addListener failed: {}", describe(&e)))?;
        Ok(())
    }
}

/// Decode the `changes` argument of an `onChanged` event
pub fn decode_changes(changes: JsValue) -> Result<HashMap<String, StorageChange>> {
    serde_wasm_bindgen::from_value(changes)
        .map_err(|e| anyhow!("malformed storage change: {}", e))
}

#[async_trait(?Send)]
impl ConfigBridge for ChromeStorage {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, ConfigError> {
        let bridge = |e: JsValue| ConfigError::Bridge(describe(&e));

        let get: Function = Reflect::get(&self.area, &JsValue::from_str("get"))
            .and_then(|f| f.dyn_into())
            .map_err(bridge)?;
        let keys: Array = keys.iter().map(|k| JsValue::from_str(k)).collect();
        let promise: Promise = get.call1(&self.area, &keys).and_then(|p| p.dyn_into()).map_err(bridge)?;
        let values = JsFuture::from(promise).await.map_err(bridge)?;

        serde_wasm_bindgen::from_value(values).map_err(|e| ConfigError::Bridge(e.to_string()))
    }
}
