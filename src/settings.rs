//! Session settings fetched from the backend
//!
//! The backend exposes a small settings document over HTTP; the client
//! reads it once at startup to pick the speech recognition language and
//! the display theme. Any failure falls back to defaults so the session
//! can still start.

use serde::{Deserialize, Serialize};

/// Settings document served at `/api/settings`. Unknown fields are
/// ignored; missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// BCP-47 language tag for speech recognition
    pub language: String,
    /// Display theme name
    pub theme: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            language: "ru".to_string(),
            theme: "light".to_string(),
        }
    }
}

/// Fetch settings from the backend, defaulting on any failure.
pub async fn fetch_settings(client: &reqwest::Client, base_url: &str) -> RemoteSettings {
    let url = format!("{}/api/settings", base_url.trim_end_matches('/'));

    let response = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            log::warn!("Settings fetch failed ({}), using defaults", e);
            return RemoteSettings::default();
        }
    };

    if !response.status().is_success() {
        log::warn!(
            "Settings endpoint returned {}, using defaults",
            response.status()
        );
        return RemoteSettings::default();
    }

    match response.json::<RemoteSettings>().await {
        Ok(settings) => {
            log::info!(
                "Settings loaded: language={}, theme={}",
                settings.language,
                settings.theme
            );
            settings
        }
        Err(e) => {
            log::warn!("Settings parse failed ({}), using defaults", e);
            RemoteSettings::default()
        }
    }
}
