pub mod camera_session;
pub mod capability;
pub mod ceremony;
pub mod challenge;
pub mod models;
pub mod orchestrator;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use camera_session::{CameraOutcome, CameraSession};
pub use capability::CapabilityProbe;
pub use ceremony::{CeremonyOutcome, CeremonyReport, CeremonyState, CredentialCeremony};
pub use challenge::{Challenge, OsRandom, SecureRandom, CHALLENGE_LEN};
pub use models::{ModelBundleSet, ModelLoader, ModelReadiness};
pub use orchestrator::{AuthOrchestrator, AuthOrchestratorBuilder, MountReport};
pub use status::{AuthStatus, FailureReason, Flow, StatusBoard, StatusChannel, StatusUpdate};
