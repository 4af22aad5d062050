use async_trait::async_trait;
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::{ModelAssetService, ModelBundle};
use crate::common::config::ModelConfig;
use crate::common::error::{AuthError, Result};

/// Loads the bundles as ONNX Runtime sessions and keeps them for inference.
pub struct OnnxModelService {
    config: ModelConfig,
    environment: Arc<Environment>,
    sessions: Mutex<HashMap<ModelBundle, Arc<Session>>>,
}

impl OnnxModelService {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("bioauth_face")
                .build()
                .map_err(|e| AuthError::ModelLoadFailure {
                    bundle: "environment".into(),
                    reason: e.to_string(),
                })?,
        );

        Ok(Self { config, environment, sessions: Mutex::new(HashMap::new()) })
    }

    pub fn session(&self, bundle: ModelBundle) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&bundle)
            .cloned()
    }

    fn resolve(&self, bundle: ModelBundle, base: &Path) -> PathBuf {
        base.join(bundle.file_name(&self.config))
    }
}

fn optimization_level(level: u32) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

fn build_session(environment: &Arc<Environment>, path: &Path, level: u32) -> Result<Session> {
    let session = SessionBuilder::new(environment)?
        .with_optimization_level(optimization_level(level))?
        .with_model_from_file(path)?;
    Ok(session)
}

#[async_trait]
impl ModelAssetService for OnnxModelService {
    async fn load_from_location(&self, bundle: ModelBundle, base: &Path) -> Result<()> {
        let path = self.resolve(bundle, base);
        if !path.exists() {
            return Err(AuthError::ModelLoadFailure {
                bundle: bundle.to_string(),
                reason: format!("model not found at {}", path.display()),
            });
        }

        tracing::debug!("Loading {} from {}", bundle, path.display());
        let environment = self.environment.clone();
        let level = self.config.optimization_level;
        let session = tokio::task::spawn_blocking(move || build_session(&environment, &path, level))
            .await
            .map_err(|e| AuthError::ModelLoadFailure { bundle: bundle.to_string(), reason: e.to_string() })?
            .map_err(|e| AuthError::ModelLoadFailure { bundle: bundle.to_string(), reason: e.to_string() })?;

        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bundle, Arc::new(session));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimization_levels_clamp() {
        assert!(matches!(optimization_level(0), GraphOptimizationLevel::Disable));
        assert!(matches!(optimization_level(9), GraphOptimizationLevel::Level3));
    }

    #[test]
    fn resolves_under_base() {
        let config = ModelConfig::default();
        let base = PathBuf::from("/models");
        let path = base.join(ModelBundle::Detector.file_name(&config));
        assert_eq!(path, PathBuf::from("/models/tiny_face_detector.onnx"));
    }
}
