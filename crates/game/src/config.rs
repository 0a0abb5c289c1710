//! Game configuration (window, assets, tuning). Loaded from config.ron at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent game settings. Loaded from `config.ron` in the current directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Window width in logical pixels.
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    /// Window height in logical pixels.
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    /// Enable vsync (recommended to avoid tearing).
    #[serde(default = "default_true")]
    pub vsync: bool,

    /// OBJ model for the player ship. A cube is used when unset or unreadable.
    #[serde(default)]
    pub player_model: Option<PathBuf>,
    #[serde(default)]
    pub player_texture: Option<PathBuf>,
    /// OBJ model shared by every enemy.
    #[serde(default)]
    pub enemy_model: Option<PathBuf>,
    #[serde(default)]
    pub enemy_texture: Option<PathBuf>,

    /// Player strafe speed in units per second.
    #[serde(default = "default_player_speed")]
    pub player_speed: f32,
    /// Seconds between player shots.
    #[serde(default = "default_fire_cooldown")]
    pub fire_cooldown: f32,
    #[serde(default = "default_bullet_speed")]
    pub bullet_speed: f32,
    /// Seconds between enemies breaking formation to chase the player.
    #[serde(default = "default_targeting_interval")]
    pub targeting_interval: f32,
    /// Seconds between shots from a chasing enemy.
    #[serde(default = "default_enemy_attack_interval")]
    pub enemy_attack_interval: f32,
    #[serde(default = "default_enemy_bullet_speed")]
    pub enemy_bullet_speed: f32,
    /// Upper bound on a single simulation step, in seconds.
    #[serde(default = "default_max_frame_step")]
    pub max_frame_step: f32,
}

fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    720
}
fn default_true() -> bool {
    true
}
fn default_player_speed() -> f32 {
    5.0
}
fn default_fire_cooldown() -> f32 {
    1.0
}
fn default_bullet_speed() -> f32 {
    10.0
}
fn default_targeting_interval() -> f32 {
    3.0
}
fn default_enemy_attack_interval() -> f32 {
    2.0
}
fn default_enemy_bullet_speed() -> f32 {
    6.0
}
fn default_max_frame_step() -> f32 {
    engine_core::DEFAULT_MAX_STEP
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            vsync: default_true(),
            player_model: None,
            player_texture: None,
            enemy_model: None,
            enemy_texture: None,
            player_speed: default_player_speed(),
            fire_cooldown: default_fire_cooldown(),
            bullet_speed: default_bullet_speed(),
            targeting_interval: default_targeting_interval(),
            enemy_attack_interval: default_enemy_attack_interval(),
            enemy_bullet_speed: default_enemy_bullet_speed(),
            max_frame_step: default_max_frame_step(),
        }
    }
}

impl GameConfig {
    /// Load config from `config.ron`. If the file is missing or invalid, returns default config.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if let Ok(data) = std::fs::read_to_string(path) {
            match ron::from_str(&data) {
                Ok(c) => return c,
                Err(e) => log::warn!("Invalid config at {:?}: {}, using defaults", path, e),
            }
        }
        Self::default()
    }
}

fn config_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("config.ron")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config: GameConfig = ron::from_str("(vsync: false, bullet_speed: 12.5)").unwrap();
        assert!(!config.vsync);
        assert!((config.bullet_speed - 12.5).abs() < 1e-6);
        assert_eq!(config.window_width, 1280);
        assert!((config.fire_cooldown - 1.0).abs() < 1e-6);
        assert!(config.player_model.is_none());
    }

    #[test]
    fn asset_paths_are_optional() {
        let config: GameConfig = ron::from_str(r#"(enemy_model: Some("models/enemy.obj"))"#).unwrap();
        assert_eq!(config.enemy_model, Some(PathBuf::from("models/enemy.obj")));
        assert!(config.enemy_texture.is_none());
    }

    #[test]
    fn missing_or_invalid_file_yields_defaults() {
        let dir = std::env::temp_dir().join(format!("invaders-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        assert_eq!(GameConfig::load_from(&dir.join("absent.ron")), GameConfig::default());

        let bad = dir.join("bad.ron");
        std::fs::write(&bad, "(window_width: \"wide\")").unwrap();
        assert_eq!(GameConfig::load_from(&bad), GameConfig::default());

        std::fs::remove_dir_all(&dir).ok();
    }
}
