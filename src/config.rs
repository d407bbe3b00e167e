use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Feature switches consulted on every filter pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub strip_tracking: bool,
    pub warn_external: bool,
    pub block_executables: bool,
    pub log_history: bool,
    pub notify: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            strip_tracking: true,
            warn_external: true,
            block_executables: true,
            log_history: true,
            notify: true,
        }
    }
}

/// Partial settings change; unset fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub strip_tracking: Option<bool>,
    pub warn_external: Option<bool>,
    pub block_executables: Option<bool>,
    pub log_history: Option<bool>,
    pub notify: Option<bool>,
}

impl FilterSettings {
    pub fn merge(&mut self, update: &SettingsUpdate) {
        if let Some(value) = update.strip_tracking {
            self.strip_tracking = value;
        }
        if let Some(value) = update.warn_external {
            self.warn_external = value;
        }
        if let Some(value) = update.block_executables {
            self.block_executables = value;
        }
        if let Some(value) = update.log_history {
            self.log_history = value;
        }
        if let Some(value) = update.notify {
            self.notify = value;
        }
    }

    /// Every feature switched off.
    pub fn disabled() -> Self {
        FilterSettings {
            strip_tracking: false,
            warn_external: false,
            block_executables: false,
            log_history: false,
            notify: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub settings: FilterSettings,
    pub history_capacity: usize,
    /// Substrings of an image `src` that mark it as a tracking pixel.
    pub tracking_keywords: Vec<String>,
    /// Attachment name suffixes treated as executables.
    pub blocked_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settings: FilterSettings::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            tracking_keywords: ["tracker", "pixel", "analytics", "beacon", "monitor"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocked_extensions: [".exe", ".msi", ".bat", ".cmd", ".scr", ".pif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.history_capacity == 0 {
            anyhow::bail!("history_capacity must be at least 1");
        }
        if self.tracking_keywords.iter().any(|k| k.trim().is_empty()) {
            anyhow::bail!("tracking_keywords must not contain empty entries");
        }
        if self.blocked_extensions.iter().any(|e| e.trim().is_empty()) {
            anyhow::bail!("blocked_extensions must not contain empty entries");
        }
        Ok(())
    }
}
