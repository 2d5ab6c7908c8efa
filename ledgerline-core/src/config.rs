//! Configuration management
//!
//! Settings live in a settings.json next to the ledger database:
//! ```json
//! {
//!   "app": { "maxHistory": 20, ... }
//! }
//! ```
//! Fields the core does not manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::services::DEFAULT_MAX_HISTORY;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default)]
    max_history: Option<usize>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Ledgerline configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    /// Undo stack capacity; oldest snapshots are evicted beyond this
    pub max_history: usize,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            _raw_settings: SettingsFile::default(),
        }
    }
}

impl Config {
    /// Load config from the ledger directory
    ///
    /// The history depth can be overridden via the LEDGERLINE_MAX_HISTORY
    /// environment variable (for CI/testing).
    pub fn load(ledger_dir: &Path) -> Result<Self> {
        let settings_path = ledger_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        let max_history = std::env::var("LEDGERLINE_MAX_HISTORY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .or(raw.app.max_history)
            .unwrap_or(DEFAULT_MAX_HISTORY)
            .max(1);

        Ok(Self {
            max_history,
            _raw_settings: raw,
        })
    }

    /// Save config to the ledger directory
    /// Preserves other settings that the core doesn't manage
    pub fn save(&self, ledger_dir: &Path) -> Result<()> {
        let settings_path = ledger_dir.join("settings.json");

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        settings.app.max_history = Some(self.max_history);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}
