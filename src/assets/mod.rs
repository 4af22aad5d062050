//! Face model bundles and the service that fetches them.

pub mod onnx;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use crate::common::config::ModelConfig;
use crate::common::error::Result;

pub use onnx::OnnxModelService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBundle {
    Detector,
    Landmark,
    Recognizer,
}

impl ModelBundle {
    pub const ALL: [ModelBundle; 3] = [ModelBundle::Detector, ModelBundle::Landmark, ModelBundle::Recognizer];

    pub fn name(&self) -> &'static str {
        match self {
            ModelBundle::Detector => "tiny_face_detector",
            ModelBundle::Landmark => "face_landmark_68",
            ModelBundle::Recognizer => "face_recognition",
        }
    }

    pub fn file_name<'a>(&self, config: &'a ModelConfig) -> &'a str {
        match self {
            ModelBundle::Detector => &config.detector_file,
            ModelBundle::Landmark => &config.landmark_file,
            ModelBundle::Recognizer => &config.recognizer_file,
        }
    }
}

impl fmt::Display for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[async_trait]
pub trait ModelAssetService: Send + Sync {
    /// Fetch and initialise one bundle from `base`. Resolves once the bundle
    /// is ready for inference.
    async fn load_from_location(&self, bundle: ModelBundle, base: &Path) -> Result<()>;
}
