use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::CameraFacing;
use crate::room::ConnectConfig;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Join defaults applied to every connect request built from the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default = "default_true")]
    pub audio_enabled_on_join: bool,
    #[serde(default)]
    pub video_enabled_on_join: bool,
    #[serde(default)]
    pub camera_type: CameraFacing,
    #[serde(default = "default_true")]
    pub enable_remote_audio: bool,
    #[serde(default)]
    pub enable_network_quality_reporting: bool,
    #[serde(default)]
    pub dominant_speaker_enabled: bool,
    #[serde(default)]
    pub maintain_video_in_background: bool,
    #[serde(default)]
    pub enable_h264: bool,
    #[serde(default)]
    pub enable_data_track: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audio_enabled_on_join: true,
            video_enabled_on_join: false,
            camera_type: CameraFacing::Front,
            enable_remote_audio: true,
            enable_network_quality_reporting: false,
            dominant_speaker_enabled: false,
            maintain_video_in_background: false,
            enable_h264: false,
            enable_data_track: false,
        }
    }
}

impl Settings {
    pub fn connect_config(&self, room_name: &str, access_token: &str) -> ConnectConfig {
        ConnectConfig {
            room_name: room_name.to_string(),
            access_token: access_token.to_string(),
            enable_audio: self.audio_enabled_on_join,
            enable_video: self.video_enabled_on_join,
            enable_remote_audio: self.enable_remote_audio,
            enable_network_quality_reporting: self.enable_network_quality_reporting,
            dominant_speaker_enabled: self.dominant_speaker_enabled,
            maintain_video_in_background: self.maintain_video_in_background,
            camera_type: self.camera_type,
            enable_h264: self.enable_h264,
            enable_data_track: self.enable_data_track,
        }
    }
}

pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let file_path = data_dir.as_ref().join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> Settings {
        self.settings.lock().unwrap().clone()
    }

    /// Apply `change` and persist the result.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<(), SettingsError> {
        let snapshot = {
            let mut settings = self.settings.lock().unwrap();
            change(&mut settings);
            settings.clone()
        };
        self.save(&snapshot)
    }

    pub fn set_camera_type(&self, facing: CameraFacing) -> Result<(), SettingsError> {
        self.update(|s| s.camera_type = facing)
    }

    pub fn set_audio_enabled_on_join(&self, enabled: bool) -> Result<(), SettingsError> {
        self.update(|s| s.audio_enabled_on_join = enabled)
    }

    pub fn set_video_enabled_on_join(&self, enabled: bool) -> Result<(), SettingsError> {
        self.update(|s| s.video_enabled_on_join = enabled)
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.file_path, json)?;
        Ok(())
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable settings at {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}
