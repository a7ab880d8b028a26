//! Configuration bridge
//!
//! Settings live in the browser's synchronized key-value storage, written by
//! the extension popup. This module turns raw storage values into an
//! immutable [`EngineConfig`] snapshot and folds change notifications into
//! new snapshots. Storage values are untrusted: every key is read leniently
//! and falls back to its documented default.

use std::cell::RefCell;
use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Storage keys read by the content script
pub const STORAGE_KEYS: &[&str] = &[
    "hourlyWage",
    "showUnitLabel",
    "suffixText",
    "textColor",
    "bgColor",
    "borderColor",
];

/// The only storage area whose changes are acted on
pub const SYNC_AREA: &str = "sync";

pub const DEFAULT_SUFFIX: &str = "of your life";
pub const DEFAULT_TEXT_COLOR: &str = "white";
pub const DEFAULT_BG_COLOR: &str = "black";
pub const DEFAULT_BORDER_COLOR: &str = "white";

static CSS_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(#[0-9a-fA-F]{3,8}|[a-zA-Z]{3,20}|(rgb|rgba|hsl|hsla)\([0-9.,%\s]+\))$")
        .expect("colour pattern is valid")
});

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Storage bridge failed: {0}")]
    Bridge(String),

    #[error("Settings serialisation failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw settings as kept in synchronized storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_wage: Option<f64>,
    pub show_unit_label: bool,
    pub suffix_text: String,
    pub text_color: String,
    pub bg_color: String,
    pub border_color: String,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            hourly_wage: None,
            show_unit_label: true,
            suffix_text: DEFAULT_SUFFIX.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            bg_color: DEFAULT_BG_COLOR.to_string(),
            border_color: DEFAULT_BORDER_COLOR.to_string(),
        }
    }
}

impl StoredSettings {
    /// Read settings from a storage `get` result
    pub fn from_values(values: &Map<String, Value>) -> Self {
        let mut settings = Self::default();
        for key in STORAGE_KEYS {
            settings.apply_value(key, values.get(*key));
        }
        settings
    }

    /// Storage representation of these settings
    pub fn to_values(&self) -> Result<Map<String, Value>, ConfigError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(ConfigError::Bridge(format!("unexpected settings shape: {}", other))),
        }
    }

    /// Fold a storage change notification into a new settings value.
    ///
    /// Returns `None` when the notification is for another storage area or
    /// touches none of [`STORAGE_KEYS`].
    pub fn apply_changes(
        &self,
        area: &str,
        changes: &HashMap<String, StorageChange>,
    ) -> Option<Self> {
        if area != SYNC_AREA {
            return None;
        }
        let mut next = self.clone();
        let mut touched = false;
        for key in STORAGE_KEYS {
            if let Some(change) = changes.get(*key) {
                next.apply_value(key, change.new_value.as_ref());
                touched = true;
            }
        }
        touched.then_some(next)
    }

    /// Set one key; a missing or ill-typed value restores the default
    fn apply_value(&mut self, key: &str, value: Option<&Value>) {
        let defaults = Self::default();
        match key {
            "hourlyWage" => self.hourly_wage = value.and_then(lenient_wage),
            "showUnitLabel" => {
                self.show_unit_label = value
                    .and_then(Value::as_bool)
                    .unwrap_or(defaults.show_unit_label)
            }
            "suffixText" => {
                self.suffix_text = value
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or(defaults.suffix_text)
            }
            "textColor" => self.text_color = color_or(value, defaults.text_color),
            "bgColor" => self.bg_color = color_or(value, defaults.bg_color),
            "borderColor" => self.border_color = color_or(value, defaults.border_color),
            _ => {}
        }
    }
}

/// A wage is a positive finite number, stored as a number or numeric string
fn lenient_wage(value: &Value) -> Option<f64> {
    let wage = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (wage.is_finite() && wage > 0.0).then_some(wage)
}

fn color_or(value: Option<&Value>, default: String) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| is_valid_color(c))
        .map(str::to_string)
        .unwrap_or(default)
}

/// Whether `color` is a plain CSS colour value safe to interpolate
pub fn is_valid_color(color: &str) -> bool {
    CSS_COLOR.is_match(color)
}

/// One entry of a storage change notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
}

/// Annotation colours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Palette {
    pub text: String,
    pub background: String,
    pub border: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT_COLOR.to_string(),
            background: DEFAULT_BG_COLOR.to_string(),
            border: DEFAULT_BORDER_COLOR.to_string(),
        }
    }
}

/// Immutable configuration snapshot consumed by the engine.
///
/// Replaced wholesale on every relevant storage change, never patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    hourly_wage: Option<f64>,
    show_unit_label: bool,
    suffix_text: String,
    palette: Palette,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&StoredSettings::default())
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &StoredSettings) -> Self {
        Self {
            hourly_wage: settings.hourly_wage.filter(|w| w.is_finite() && *w > 0.0),
            show_unit_label: settings.show_unit_label,
            suffix_text: settings.suffix_text.clone(),
            palette: Palette {
                text: settings.text_color.clone(),
                background: settings.bg_color.clone(),
                border: settings.border_color.clone(),
            },
        }
    }

    /// Default display options with the given wage
    pub fn with_wage(wage: f64) -> Self {
        Self::from_settings(&StoredSettings {
            hourly_wage: Some(wage),
            ..StoredSettings::default()
        })
    }

    /// Whether annotations should be produced at all
    pub fn is_active(&self) -> bool {
        self.hourly_wage.is_some()
    }

    pub fn hourly_wage(&self) -> Option<f64> {
        self.hourly_wage
    }

    pub fn show_unit_label(&self) -> bool {
        self.show_unit_label
    }

    pub fn suffix_text(&self) -> &str {
        &self.suffix_text
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}

/// Asynchronous access to the settings storage
#[async_trait(?Send)]
pub trait ConfigBridge {
    /// Read `keys`; absent keys are simply missing from the result
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, ConfigError>;
}

/// Read the current settings through `bridge`
pub async fn load_settings<B: ConfigBridge + ?Sized>(bridge: &B) -> Result<StoredSettings, ConfigError> {
    let values = bridge.get(STORAGE_KEYS).await?;
    Ok(StoredSettings::from_values(&values))
}

/// In-process storage, the stand-in for the browser storage area
#[derive(Debug, Default)]
pub struct MemoryBridge {
    values: RefCell<Map<String, Value>>,
}

impl MemoryBridge {
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values: RefCell::new(values),
        }
    }

    pub fn from_settings(settings: &StoredSettings) -> Result<Self, ConfigError> {
        Ok(Self::new(settings.to_values()?))
    }

    /// Write a key and return the change notification it produces
    pub fn set(&self, key: &str, value: Value) -> HashMap<String, StorageChange> {
        let old_value = self.values.borrow_mut().insert(key.to_string(), value.clone());
        HashMap::from([(
            key.to_string(),
            StorageChange {
                old_value,
                new_value: Some(value),
            },
        )])
    }

    /// Remove a key and return the change notification it produces
    pub fn remove(&self, key: &str) -> HashMap<String, StorageChange> {
        let old_value = self.values.borrow_mut().remove(key);
        HashMap::from([(
            key.to_string(),
            StorageChange {
                old_value,
                new_value: None,
            },
        )])
    }
}

#[async_trait(?Send)]
impl ConfigBridge for MemoryBridge {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, ConfigError> {
        let values = self.values.borrow();
        Ok(keys
            .iter()
            .filter_map(|k| values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }
}
