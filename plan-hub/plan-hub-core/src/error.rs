//! Error taxonomy shared by every component of the lifecycle engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict { id: String, expected: u64, actual: u64 },

    #[error("document exists: {0}")]
    DocumentExists(String),

    #[error("invalid trash state: {0}")]
    TrashState(String),

    #[error("cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("failed dependency: {0}")]
    FailedDependency(String),

    #[error("dangling reference: {0}")]
    DanglingReference(String),

    #[error("malformed id: {0}")]
    MalformedId(String),

    #[error("invalid access control: {0}")]
    InvalidAccessControl(String),

    #[error("move failed at node {node_id}: {reason}")]
    MoveFailed { node_id: String, reason: String },

    #[error("cascade failed at node {node_id}: {reason}")]
    CascadeFailed { node_id: String, reason: String },

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl HubError {
    /// Stable category code exposed to callers.
    pub fn category(&self) -> &'static str {
        match self {
            HubError::NotFound(_) => "not_found",
            HubError::Forbidden(_) => "forbidden",
            HubError::Unauthorized(_) => "unauthorized",
            HubError::BadRequest(_) => "bad_request",
            HubError::InvalidInput(_) | HubError::InvalidPatch(_) => "invalid_input",
            HubError::VersionConflict { .. } => "version_conflict",
            HubError::DocumentExists(_) => "document_exists",
            HubError::TrashState(_) => "trash_state",
            HubError::CyclicDependency(_) => "cyclic_dependency",
            HubError::InvalidDependency(_) => "invalid_dependency",
            HubError::FailedDependency(_) => "failed_dependency",
            HubError::DanglingReference(_) => "dangling_reference",
            HubError::MalformedId(_) => "malformed_id",
            HubError::InvalidAccessControl(_) => "invalid_access_control",
            HubError::MoveFailed { .. } => "move_failed",
            HubError::CascadeFailed { .. } => "cascade_failed",
            HubError::Persistence(_) => "persistence",
        }
    }

    /// Whether the message may be shown to an end user verbatim.
    pub fn is_internal(&self) -> bool {
        matches!(self, HubError::Persistence(_))
    }

    /// Text safe to embed in another error; internal faults collapse to their category.
    pub fn public_reason(&self) -> String {
        if self.is_internal() {
            self.category().to_string()
        } else {
            self.to_string()
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        HubError::NotFound(what.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        HubError::Forbidden(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        HubError::InvalidInput(what.into())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::InvalidInput(err.to_string())
    }
}
