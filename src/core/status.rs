//! The status signal read by the presentation layer.
//!
//! Each flow owns a slot on the [`StatusBoard`]; `latest` additionally holds
//! whichever write happened last across both flows. `latest` is
//! last-write-wins with no queue and no history: if the fingerprint and face
//! flows race, it shows the later terminal write and the other flow's
//! outcome is only visible through its own slot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    Credential,
    Face,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Credential => write!(f, "credential"),
            Flow::Face => write!(f, "face"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Ceremony triggered on a host without the capability.
    Unsupported,
    /// Ceremony finished without a credential.
    NoCredential,
    CeremonyError(String),
    Camera(String),
    ModelLoad(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Idle,
    /// Set by the startup probe.
    Unsupported,
    Starting,
    Success,
    Failed(FailureReason),
}

impl AuthStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, AuthStatus::Failed(_))
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStatus::Idle => write!(f, "Waiting for authentication..."),
            AuthStatus::Unsupported => write!(f, "WebAuthn not supported on this device"),
            AuthStatus::Starting => write!(f, "Starting face recognition..."),
            AuthStatus::Success => write!(f, "Fingerprint authentication successful!"),
            AuthStatus::Failed(reason) => match reason {
                FailureReason::Unsupported => write!(f, "WebAuthn is not supported on this device."),
                FailureReason::NoCredential => write!(f, "Authentication failed."),
                FailureReason::CeremonyError(msg) => write!(f, "Authentication error: {}", msg),
                FailureReason::Camera(msg) => write!(f, "Camera error: {}", msg),
                FailureReason::ModelLoad(msg) => write!(f, "Face model load error: {}", msg),
            },
        }
    }
}

impl Serialize for AuthStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One write to the board, tagged with the flow that made it.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub flow: Option<Flow>,
    pub status: AuthStatus,
    pub seq: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusBoard {
    pub latest: StatusUpdate,
    pub credential: AuthStatus,
    pub face: AuthStatus,
}

impl StatusBoard {
    fn new() -> Self {
        Self {
            latest: StatusUpdate { flow: None, status: AuthStatus::Idle, seq: 0, at: Utc::now() },
            credential: AuthStatus::Idle,
            face: AuthStatus::Idle,
        }
    }

    pub fn flow(&self, flow: Flow) -> &AuthStatus {
        match flow {
            Flow::Credential => &self.credential,
            Flow::Face => &self.face,
        }
    }
}

/// Owned by the orchestrator; everyone else gets read-only receivers.
#[derive(Debug)]
pub struct StatusChannel {
    sender: watch::Sender<StatusBoard>,
}

impl StatusChannel {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(StatusBoard::new());
        Self { sender }
    }

    pub(crate) fn publish(&self, flow: Flow, status: AuthStatus) {
        self.sender.send_modify(|board| {
            let seq = board.latest.seq + 1;
            tracing::debug!(%flow, seq, status = %status, "status update");
            match flow {
                Flow::Credential => board.credential = status.clone(),
                Flow::Face => board.face = status.clone(),
            }
            board.latest = StatusUpdate { flow: Some(flow), status, seq, at: Utc::now() };
        });
    }

    /// The single-field view: whatever was written last.
    pub fn current(&self) -> AuthStatus {
        self.sender.borrow().latest.status.clone()
    }

    pub fn message(&self) -> String {
        self.current().to_string()
    }

    pub fn flow_status(&self, flow: Flow) -> AuthStatus {
        self.sender.borrow().flow(flow).clone()
    }

    pub fn snapshot(&self) -> StatusBoard {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusBoard> {
        self.sender.subscribe()
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}
