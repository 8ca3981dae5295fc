use std::{collections::HashMap, fs};

use anyhow::{bail, Context, Result};
use url::Url;

/// Deployment configuration for the hosted data service. Defaults are
/// overridden by `pairchat.toml`, which is overridden by the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_url: String,
    pub backend_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8443".into(),
            backend_api_key: None,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("pairchat.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("backend_url") {
                settings.backend_url = v.clone();
            }
            if let Some(v) = file_cfg.get("backend_api_key") {
                settings.backend_api_key = Some(v.clone());
            }
        }
    }

    if let Ok(v) = std::env::var("BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Ok(v) = std::env::var("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Ok(v) = std::env::var("BACKEND_API_KEY") {
        settings.backend_api_key = Some(v);
    }
    if let Ok(v) = std::env::var("APP__BACKEND_API_KEY") {
        settings.backend_api_key = Some(v);
    }

    settings
}

pub fn validate_backend_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw).with_context(|| format!("invalid backend url '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("backend url must use http or https, got '{}'", url.scheme());
    }
    Ok(())
}
