use std::path::PathBuf;
use std::fs;
use crate::common::error::Result;
use crate::common::paths;

/// Development mode: local data tree under `./dev_data` and a software
/// authenticator in place of the (absent) platform one.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        let base_dir = paths::dev_data_dir();

        if enabled {
            fs::create_dir_all(base_dir.join("config"))?;
            fs::create_dir_all(base_dir.join("models"))?;
            fs::create_dir_all(base_dir.join("logs"))?;

            tracing::info!("Development mode enabled - data lives in {}", base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn disabled() -> Self {
        Self { enabled: false, base_dir: paths::dev_data_dir() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn models_dir(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.base_dir.join("models"))
    }

    /// Secret for the software authenticator. Stable per dev tree so that
    /// credential ids are reproducible across runs.
    pub fn authenticator_secret(&self) -> Vec<u8> {
        format!("bioauth-dev:{}", self.base_dir.display()).into_bytes()
    }
}
