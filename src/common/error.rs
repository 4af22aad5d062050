use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Public-key credentials are not supported on this platform")]
    UnsupportedPlatform,

    #[error("{0}")]
    CeremonyCancelledOrTimedOut(String),

    #[error("{0}")]
    CeremonyRejected(String),

    #[error("Camera permission denied: {0}")]
    CameraPermissionDenied(String),

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Failed to load model '{bundle}': {reason}")]
    ModelLoadFailure { bundle: String, reason: String },

    #[error("A {0} flow is already in progress")]
    Busy(&'static str),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl AuthError {
    /// Human-readable text for the status line. Mirrors what a browser puts
    /// in `error.message`: no prefix, just the reason.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::CeremonyCancelledOrTimedOut(msg)
            | AuthError::CeremonyRejected(msg)
            | AuthError::CameraPermissionDenied(msg)
            | AuthError::CameraUnavailable(msg) => msg.clone(),
            AuthError::ModelLoadFailure { bundle, reason } => format!("{}: {}", bundle, reason),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
