// Engine settings
// Loaded from ~/.config/planbook/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Deployment-level engine settings.
///
/// Every field has a default, and unknown keys in the file are ignored,
/// so old installs keep working when settings are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Debounce window between an upstream edit and the option reload.
    pub debounce_ms: u64,

    /// Delay before the single copy retry re-checks lagging option lists.
    pub copy_retry_delay_ms: u64,

    /// How long displayed diagnostic text is preserved over fresh results.
    pub message_grace_ms: u64,

    /// The one field a recalculation always overwrites, regardless of
    /// provenance. Deployment-specific; payroll by default.
    pub primary_recalc_field: String,

    /// Template rows keep this field and everything below it frozen.
    pub template_suppression_root: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            copy_retry_delay_ms: 500,
            message_grace_ms: 1500,
            primary_recalc_field: "payroll_amount".to_string(),
            template_suppression_root: "cost_center".to_string(),
        }
    }
}

impl EngineSettings {
    /// Load settings, falling back to defaults on any problem.
    /// A missing or malformed file never blocks startup.
    pub fn load() -> Self {
        let Some(path) = settings_path() else {
            return Self::default();
        };
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to the config directory.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = settings_path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no config directory available",
            ));
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    /// Parse settings from a JSON string (for embedded/test configs).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Path of the settings file: `~/.config/planbook/settings.json`.
pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("planbook").join("settings.json"))
}
