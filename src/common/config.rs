use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{AuthError, Result};
use crate::common::paths;

/// The ceremony timeout is fixed at 60 s and has no section here; unknown
/// sections such as a stale `[ceremony]` table are rejected.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub relying_party: RelyingPartyConfig,
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub face: FaceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelyingPartyConfig {
    /// Display name only. The RP id is left to the environment default.
    #[serde(default = "default_rp_name")]
    pub name: String,
}

impl Default for RelyingPartyConfig {
    fn default() -> Self {
        Self { name: default_rp_name() }
    }
}

fn default_rp_name() -> String { "Biometric Auth App".to_string() }

/// Placeholder identity handed to the ceremony. Not backed by any account store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserConfig {
    #[serde(default = "default_user_handle_len")]
    pub handle_len: usize,
    #[serde(default = "default_user_name")]
    pub name: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            handle_len: default_user_handle_len(),
            name: default_user_name(),
            display_name: default_display_name(),
        }
    }
}

fn default_user_handle_len() -> usize { 16 }
fn default_user_name() -> String { "user@example.com".to_string() }
fn default_display_name() -> String { "User".to_string() }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_base_location")]
    pub base_location: PathBuf,
    #[serde(default = "default_detector_file")]
    pub detector_file: String,
    #[serde(default = "default_landmark_file")]
    pub landmark_file: String,
    #[serde(default = "default_recognizer_file")]
    pub recognizer_file: String,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_location: default_base_location(),
            detector_file: default_detector_file(),
            landmark_file: default_landmark_file(),
            recognizer_file: default_recognizer_file(),
            optimization_level: default_optimization_level(),
        }
    }
}

fn default_base_location() -> PathBuf { PathBuf::from(paths::DEFAULT_MODELS_LOCATION) }
fn default_detector_file() -> String { "tiny_face_detector.onnx".to_string() }
fn default_landmark_file() -> String { "face_landmark_68.onnx".to_string() }
fn default_recognizer_file() -> String { "face_recognition.onnx".to_string() }
fn default_optimization_level() -> u32 { 3 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    /// 999 means auto-detect.
    #[serde(default)]
    pub device_index: u32,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Frames discarded after stream-on while the sensor and IR emitter settle.
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: None,
            height: None,
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
        }
    }
}

fn default_warmup_frames() -> u32 { 3 }
fn default_warmup_delay() -> u64 { 50 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FaceConfig {
    /// Hold the face action until all three model bundles are ready.
    #[serde(default = "default_true")]
    pub require_models: bool,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self { require_models: true }
    }
}

fn default_true() -> bool { true }

impl Config {
    /// Load from the first config file found in the search path, or fall
    /// back to built-in defaults when none exists.
    pub fn load(dev_mode: bool) -> Result<Self> {
        for candidate in paths::config_search_path(dev_mode) {
            if candidate.exists() {
                return Self::load_from_path(&candidate);
            }
        }
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AuthError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.relying_party.name.trim().is_empty() {
            return Err(AuthError::Config("Relying party name must not be empty".into()));
        }

        if self.user.handle_len == 0 || self.user.handle_len > 64 {
            return Err(AuthError::Config(format!(
                "User handle length must be between 1 and 64 bytes, got {}",
                self.user.handle_len
            )));
        }

        for (label, file) in [
            ("detector", &self.models.detector_file),
            ("landmark", &self.models.landmark_file),
            ("recognizer", &self.models.recognizer_file),
        ] {
            if file.trim().is_empty() {
                return Err(AuthError::Config(format!("Model file for {} must not be empty", label)));
            }
        }

        if self.models.optimization_level > 3 {
            return Err(AuthError::Config(format!(
                "Optimization level must be between 0 and 3, got {}",
                self.models.optimization_level
            )));
        }

        for (label, dim) in [("width", self.camera.width), ("height", self.camera.height)] {
            if let Some(value) = dim {
                if value == 0 || value > 4096 {
                    return Err(AuthError::Config(format!(
                        "Camera {} must be between 1 and 4096, got {}", label, value
                    )));
                }
            }
        }

        if self.camera.warmup_frames > 30 {
            return Err(AuthError::Config(format!(
                "Camera warmup must be at most 30 frames, got {}", self.camera.warmup_frames
            )));
        }

        Ok(())
    }
}
