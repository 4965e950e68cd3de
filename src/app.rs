use directories::BaseDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::connection::ReconnectPolicy;
use crate::error::{ChatError, Result};
use crate::utils::{normalize_url, ws_url_from_base};

const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppState {
    pub base_url: String,
    pub ws_url: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub history_page_size: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            ws_url: None,
            token: None,
            user_id: None,
            history_page_size: DEFAULT_PAGE_SIZE,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    // TOML is the config format; an old state.json is picked up once and rewritten as TOML.
    pub fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("partychat.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        let proj = directories::ProjectDirs::from("com", "example", "PartyChat")?;
        Some(proj.config_dir().join("state.json"))
    }

    pub fn load() -> Self {
        if let Some(state) = Self::toml_path().and_then(|p| Self::load_from(&p).ok()) {
            return state;
        }

        if let Some(legacy) = Self::legacy_json_path() {
            if let Ok(bytes) = fs::read(&legacy) {
                if let Ok(state) = serde_json::from_slice::<AppState>(&bytes) {
                    if let Err(e) = state.save() {
                        warn!("could not migrate {}: {}", legacy.display(), e);
                    }
                    return state;
                }
            }
        }

        Self::new()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| ChatError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::toml_path().ok_or_else(|| ChatError::Config("no config dir".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))?;
        fs::write(path, toml)?;
        Ok(())
    }

    pub fn base_url(&self) -> Result<String> {
        if self.base_url.trim().is_empty() {
            return Err(ChatError::Config("base_url is not set".into()));
        }
        Ok(normalize_url(&self.base_url))
    }

    /// The push endpoint: `ws_url` when set, else derived from `base_url`.
    pub fn ws_url(&self) -> Result<String> {
        match &self.ws_url {
            Some(url) if !url.trim().is_empty() => Ok(url.trim().to_string()),
            _ => ws_url_from_base(&self.base_url()?),
        }
    }
}
