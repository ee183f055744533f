//! Display configuration: per-kind visibility, font size, background alpha.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::error::ConfigError;
use crate::models::KindTag;

/// Read-only display settings consumed by the compositor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DisplayConfig {
    #[serde(alias = "show_danmaku")]
    pub show_chat: bool,
    pub show_gift: bool,
    pub show_enter: bool,
    pub show_follow: bool,
    /// Captain purchases and VIP entrances.
    pub show_guard: bool,
    pub show_sc: bool,
    #[validate(range(min = 8, max = 48))]
    pub font_size: u32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub bg_alpha: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_chat: true,
            show_gift: true,
            show_enter: true,
            show_follow: true,
            show_guard: true,
            show_sc: true,
            font_size: 14,
            bg_alpha: 0.85,
        }
    }
}

impl DisplayConfig {
    /// Whether messages of `tag` are displayed. Warnings always are.
    pub fn shows(&self, tag: KindTag) -> bool {
        match tag {
            KindTag::Chat => self.show_chat,
            KindTag::Gift => self.show_gift,
            KindTag::Enter => self.show_enter,
            KindTag::Follow => self.show_follow,
            KindTag::Captain | KindTag::VipEnter => self.show_guard,
            KindTag::SuperChat => self.show_sc,
            KindTag::Warning => true,
        }
    }

    /// Apply a flat key/value update.
    ///
    /// Unknown keys are ignored and missing keys keep their values. The
    /// update is all-or-nothing: a mistyped or out-of-range value leaves
    /// the configuration untouched.
    pub fn apply(&mut self, updates: &Map<String, Value>) -> Result<(), ConfigError> {
        let mut next = self.clone();
        for (key, value) in updates {
            match key.as_str() {
                "show_chat" | "show_danmaku" => next.show_chat = as_bool(key, value)?,
                "show_gift" => next.show_gift = as_bool(key, value)?,
                "show_enter" => next.show_enter = as_bool(key, value)?,
                "show_follow" => next.show_follow = as_bool(key, value)?,
                "show_guard" => next.show_guard = as_bool(key, value)?,
                "show_sc" => next.show_sc = as_bool(key, value)?,
                "font_size" => {
                    let size = value
                        .as_f64()
                        .filter(|v| *v >= 0.0)
                        .ok_or_else(|| invalid(key, value))?;
                    next.font_size = size.round() as u32;
                }
                "bg_alpha" => {
                    let alpha = value.as_f64().ok_or_else(|| invalid(key, value))?;
                    next.bg_alpha = alpha as f32;
                }
                other => debug!(key = %other, "ignoring unrecognized display option"),
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Load from a saved JSON file, falling back to defaults.
    ///
    /// Files that nest per-mode settings (`{"attach_mode": "hmd", "hmd": {...}}`)
    /// are flattened first; top-level keys win over the nested ones.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using default display configuration");
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Missing(format!("{}: {}", path.display(), e)))?;
        let saved: Map<String, Value> = serde_json::from_str(&raw)?;
        let mut config = Self::default();
        config.apply(&flatten_saved(saved))?;
        Ok(config)
    }
}

fn flatten_saved(saved: Map<String, Value>) -> Map<String, Value> {
    let nested = saved
        .get("attach_mode")
        .and_then(Value::as_str)
        .and_then(|mode| saved.get(mode))
        .and_then(Value::as_object)
        .cloned();
    let mut flat = nested.unwrap_or_default();
    for (key, value) in saved {
        if !value.is_object() {
            flat.insert(key, value);
        }
    }
    flat
}

fn as_bool(key: &str, value: &Value) -> Result<bool, ConfigError> {
    value.as_bool().ok_or_else(|| invalid(key, value))
}

fn invalid(key: &str, value: &Value) -> ConfigError {
    ConfigError::Invalid(format!("{} = {}", key, value))
}

/// Re-load `path` into `target` whenever its modification time changes.
/// Ends when every receiver is gone.
pub fn spawn_reload(
    path: PathBuf,
    every: Duration,
    target: watch::Sender<DisplayConfig>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        let mut seen = modified(&path);
        loop {
            interval.tick().await;
            if target.is_closed() {
                break;
            }
            let current = modified(&path);
            if current == seen {
                continue;
            }
            seen = current;
            let loaded = DisplayConfig::load(&path);
            info!(path = %path.display(), font_size = loaded.font_size, "display settings reloaded");
            target.send_replace(loaded);
        }
    })
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn visibility_mapping() {
        let config = DisplayConfig {
            show_guard: false,
            show_chat: false,
            ..DisplayConfig::default()
        };
        assert!(!config.shows(KindTag::Captain));
        assert!(!config.shows(KindTag::VipEnter));
        assert!(!config.shows(KindTag::Chat));
        assert!(config.shows(KindTag::Gift));
        let nothing = DisplayConfig {
            show_chat: false,
            show_gift: false,
            show_enter: false,
            show_follow: false,
            show_guard: false,
            show_sc: false,
            ..DisplayConfig::default()
        };
        assert!(nothing.shows(KindTag::Warning));
    }

    #[test]
    fn apply_ignores_unknown_and_keeps_missing() {
        let mut config = DisplayConfig::default();
        config
            .apply(&map(json!({ "show_gift": false, "yaw": 15, "font_size": 18 })))
            .unwrap();
        assert!(!config.show_gift);
        assert!(config.show_enter);
        assert_eq!(config.font_size, 18);
        assert_eq!(config.bg_alpha, 0.85);
    }

    #[test]
    fn apply_accepts_legacy_chat_key() {
        let mut config = DisplayConfig::default();
        config.apply(&map(json!({ "show_danmaku": false }))).unwrap();
        assert!(!config.show_chat);
    }

    #[test]
    fn apply_rejects_out_of_range_atomically() {
        let mut config = DisplayConfig::default();
        let err = config.apply(&map(json!({ "show_sc": false, "bg_alpha": 1.5 })));
        assert!(matches!(err, Err(ConfigError::Validation(_))));
        assert!(config.show_sc);
        assert_eq!(config.bg_alpha, 0.85);

        let err = config.apply(&map(json!({ "show_sc": "no" })));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
        assert!(config.show_sc);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = DisplayConfig::load(Path::new("/definitely/not/here.json"));
        assert_eq!(config, DisplayConfig::default());
    }

    #[test]
    fn load_flattens_mode_settings() {
        let path = std::env::temp_dir().join(format!("display-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            json!({
                "attach_mode": "hand",
                "hmd": { "font_size": 14, "bg_alpha": 0.85 },
                "hand": { "font_size": 12, "bg_alpha": 0.9, "pitch": -30 },
                "show_enter": false
            })
            .to_string(),
        )
        .unwrap();
        let config = DisplayConfig::load(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(config.font_size, 12);
        assert_eq!(config.bg_alpha, 0.9);
        assert!(!config.show_enter);
    }

    #[tokio::test]
    async fn reload_picks_up_a_new_file() {
        let path = std::env::temp_dir().join(format!("display-{}.json", uuid::Uuid::new_v4()));
        let (tx, mut rx) = watch::channel(DisplayConfig::default());
        let task = spawn_reload(path.clone(), Duration::from_millis(10), tx);

        let staged = path.with_extension("tmp");
        std::fs::write(&staged, r#"{"font_size": 20, "show_gift": false}"#).unwrap();
        std::fs::rename(&staged, &path).unwrap();
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("reload within timeout")
            .unwrap();
        let display = rx.borrow_and_update().clone();
        assert_eq!(display.font_size, 20);
        assert!(!display.show_gift);

        drop(rx);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("reload task ends once unobserved")
            .unwrap();
        std::fs::remove_file(&path).ok();
    }
}
