// Core modules
pub mod assets;
pub mod camera;
pub mod common;
pub mod core;
pub mod platform;

// Re-export commonly used types
pub use common::{AuthError, CancelToken, Config, DevMode, Result};
pub use crate::core::{
    AuthOrchestrator, AuthStatus, CameraOutcome, CeremonyOutcome, FailureReason, Flow,
    ModelReadiness, StatusBoard, StatusChannel,
};
pub use camera::{CameraAccess, DisplaySink, MediaStream, PreviewSink, V4l2Camera};
pub use platform::{CapabilityQuery, CredentialApi, SoftwareAuthenticator, UnavailableAuthenticator};
pub use assets::{ModelAssetService, ModelBundle, OnnxModelService};
