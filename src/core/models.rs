use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::assets::{ModelAssetService, ModelBundle};
use crate::common::cancel::CancelToken;
use crate::common::error::{AuthError, Result};
use crate::core::status::{AuthStatus, FailureReason, Flow, StatusChannel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ModelReadiness {
    Pending,
    Ready,
    Failed(String),
}

/// Which bundles have finished loading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelBundleSet {
    loaded: HashSet<ModelBundle>,
}

impl ModelBundleSet {
    pub fn insert(&mut self, bundle: ModelBundle) {
        self.loaded.insert(bundle);
    }

    pub fn contains(&self, bundle: ModelBundle) -> bool {
        self.loaded.contains(&bundle)
    }

    pub fn is_complete(&self) -> bool {
        ModelBundle::ALL.iter().all(|b| self.loaded.contains(b))
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

pub struct ModelLoader {
    service: Arc<dyn ModelAssetService>,
    base: PathBuf,
    started: AtomicBool,
    readiness: watch::Sender<ModelReadiness>,
}

impl ModelLoader {
    pub fn new(service: Arc<dyn ModelAssetService>, base: PathBuf) -> Self {
        let (readiness, _) = watch::channel(ModelReadiness::Pending);
        Self { service, base, started: AtomicBool::new(false), readiness }
    }

    pub fn readiness(&self) -> ModelReadiness {
        self.readiness.borrow().clone()
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Loads all three bundles concurrently. Only the first call does the
    /// work; later calls wait for that load to settle.
    pub async fn load(&self, status: &StatusChannel, cancel: &CancelToken) -> ModelReadiness {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.wait_until_settled(cancel).await;
        }

        tracing::info!("Loading face models from {}", self.base.display());
        let result = tokio::select! {
            result = self.load_all() => result,
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
        };

        let readiness = match result {
            Ok(set) => {
                tracing::info!("Face models ready ({} bundles)", set.len());
                ModelReadiness::Ready
            }
            Err(err) => {
                tracing::error!("Face model load failed: {}", err);
                let message = err.user_message();
                status.publish(Flow::Face, AuthStatus::Failed(FailureReason::ModelLoad(message.clone())));
                ModelReadiness::Failed(message)
            }
        };

        self.readiness.send_replace(readiness.clone());
        readiness
    }

    async fn load_all(&self) -> Result<ModelBundleSet> {
        let base = self.base.as_path();
        let (detector, landmark, recognizer) = tokio::join!(
            self.service.load_from_location(ModelBundle::Detector, base),
            self.service.load_from_location(ModelBundle::Landmark, base),
            self.service.load_from_location(ModelBundle::Recognizer, base),
        );

        let mut set = ModelBundleSet::default();
        for (bundle, result) in [
            (ModelBundle::Detector, detector),
            (ModelBundle::Landmark, landmark),
            (ModelBundle::Recognizer, recognizer),
        ] {
            result?;
            tracing::debug!("Model bundle {} ready", bundle);
            set.insert(bundle);
        }
        Ok(set)
    }

    /// Waits for the in-progress load and returns the settled value as the
    /// first caller published it.
    pub async fn wait_until_settled(&self, cancel: &CancelToken) -> ModelReadiness {
        let mut receiver = self.readiness.subscribe();
        tokio::select! {
            settled = receiver.wait_for(|r| *r != ModelReadiness::Pending) => match settled {
                Ok(settled) => settled.clone(),
                Err(e) => ModelReadiness::Failed(e.to_string()),
            },
            _ = cancel.cancelled() => ModelReadiness::Failed(AuthError::Cancelled.user_message()),
        }
    }
}
