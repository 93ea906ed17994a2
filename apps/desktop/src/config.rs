use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "bgremove.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub service_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub simulated_delay_ms: u64,
    pub export_dir: PathBuf,
    pub prefetch_samples: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_url: None,
            api_key: None,
            request_timeout_secs: 60,
            simulated_delay_ms: 2000,
            export_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            prefetch_samples: true,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }

    fn apply_file(&mut self, raw: &str) -> Result<(), toml::de::Error> {
        let file_cfg: FileSettings = toml::from_str(raw)?;
        if let Some(v) = file_cfg.service_url {
            self.service_url = non_empty(v);
        }
        if let Some(v) = file_cfg.api_key {
            self.api_key = non_empty(v);
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        if let Some(v) = file_cfg.simulated_delay_ms {
            self.simulated_delay_ms = v;
        }
        if let Some(v) = file_cfg.export_dir {
            self.export_dir = v;
        }
        if let Some(v) = file_cfg.prefetch_samples {
            self.prefetch_samples = v;
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("BGREMOVE_SERVICE_URL") {
            self.service_url = non_empty(v);
        }
        if let Some(v) = lookup("APP__SERVICE_URL") {
            self.service_url = non_empty(v);
        }

        if let Some(v) = lookup("APP__API_KEY") {
            self.api_key = non_empty(v);
        }

        if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.request_timeout_secs = parsed;
            }
        }

        if let Some(v) = lookup("APP__SIMULATED_DELAY_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.simulated_delay_ms = parsed;
            }
        }

        if let Some(v) = lookup("APP__EXPORT_DIR") {
            self.export_dir = PathBuf::from(v);
        }

        if let Some(v) = lookup("APP__PREFETCH_SAMPLES") {
            if let Ok(parsed) = v.parse::<bool>() {
                self.prefetch_samples = parsed;
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    service_url: Option<String>,
    api_key: Option<String>,
    request_timeout_secs: Option<u64>,
    simulated_delay_ms: Option<u64>,
    export_dir: Option<PathBuf>,
    prefetch_samples: Option<bool>,
}

/// Defaults, then the config file, then the environment.
pub fn load_settings() -> Settings {
    let path = std::env::var("BGREMOVE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
    load_settings_from(&path, |key| std::env::var(key).ok())
}

pub fn load_settings_from(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            if let Err(err) = settings.apply_file(&raw) {
                warn!(path = %path.display(), "ignoring malformed config file: {err}");
            }
        }
        Err(err) => debug!(path = %path.display(), "no config file loaded: {err}"),
    }

    settings.apply_env(lookup);
    settings
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
