//! Error kinds surfaced by the admin client.
//!
//! `ErrorCode`/`ApiError` model errors reported by the remote cluster,
//! including whether a retry can succeed. `AdminError` is the client-side
//! terminal error delivered through completion handles.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::NodeId;

/// Error codes reported by the cluster in admin responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCode {
    None,
    Unknown,
    /// The receiving node is not the current controller; retry after the
    /// next metadata refresh.
    NotController,
    /// The node is still loading state and cannot serve the request yet.
    Loading,
    /// The request was throttled; retry after backoff.
    Throttled,
    InvalidRequest,
    TopicAlreadyExists,
    UnknownTopic,
    SecurityDisabled,
    PolicyViolation,
    AuthorizationFailed,
}

impl ErrorCode {
    /// Whether a request failing with this code may succeed on retry.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ErrorCode::NotController | ErrorCode::Loading | ErrorCode::Throttled
        )
    }

    /// Default human-readable message for the code.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::None => "the operation completed successfully",
            ErrorCode::Unknown => "the server experienced an unexpected error",
            ErrorCode::NotController => "this node is not the controller",
            ErrorCode::Loading => "the node is loading state and cannot serve requests yet",
            ErrorCode::Throttled => "the request was throttled",
            ErrorCode::InvalidRequest => "the request was malformed or invalid",
            ErrorCode::TopicAlreadyExists => "a topic with this name already exists",
            ErrorCode::UnknownTopic => "this topic does not exist",
            ErrorCode::SecurityDisabled => "security features are disabled on this cluster",
            ErrorCode::PolicyViolation => "the request violates a cluster policy",
            ErrorCode::AuthorizationFailed => "the principal is not authorized",
        }
    }
}

/// A remote error code paired with an optional message.
///
/// The message is only carried when it adds information over the code's
/// default message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        // Drop messages that merely repeat the default.
        let message = if message.is_empty() || message == code.default_message() {
            None
        } else {
            Some(message)
        };
        Self { code, message }
    }

    /// Success marker: `ErrorCode::None`.
    pub const fn ok() -> Self {
        Self {
            code: ErrorCode::None,
            message: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::None
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    pub fn is_retriable(&self) -> bool {
        self.code.is_retriable()
    }

    /// The carried message, or the code's default when none was carried.
    pub fn message_with_fallback(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.code.default_message())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message_with_fallback())
    }
}

impl std::error::Error for ApiError {}

/// Terminal outcome delivered through a completion handle when a call fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminError {
    /// The call targeted a specific node that is not in the cluster view.
    NodeNotFound(String),
    /// The connection to the node dropped while the call was outstanding.
    Disconnected(NodeId),
    /// The call's deadline elapsed before it completed.
    Timeout {
        elapsed: Duration,
        permitted: Duration,
    },
    /// The call kept failing retriably until the attempt budget ran out.
    RetriesExhausted {
        attempts: u32,
        last: Box<AdminError>,
    },
    /// The cluster reported an error for the request.
    Remote(ApiError),
    /// The request or response payload could not be encoded or decoded.
    Codec(String),
    /// The client was closed while the call was outstanding.
    ClientClosed,
}

impl AdminError {
    /// Whether the dispatcher may re-attempt the call after this error.
    pub fn is_retriable(&self) -> bool {
        match self {
            AdminError::Disconnected(_) => true,
            AdminError::Remote(api) => api.is_retriable(),
            AdminError::NodeNotFound(_)
            | AdminError::Timeout { .. }
            | AdminError::RetriesExhausted { .. }
            | AdminError::Codec(_)
            | AdminError::ClientClosed => false,
        }
    }

    /// Short kind name used in logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            AdminError::NodeNotFound(_) => "NodeNotFound",
            AdminError::Disconnected(_) => "Disconnected",
            AdminError::Timeout { .. } => "Timeout",
            AdminError::RetriesExhausted { .. } => "RetriesExhausted",
            AdminError::Remote(_) => "Remote",
            AdminError::Codec(_) => "Codec",
            AdminError::ClientClosed => "ClientClosed",
        }
    }
}

impl std::fmt::Display for AdminError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminError::NodeNotFound(msg) => write!(f, "node not found: {msg}"),
            AdminError::Disconnected(node) => write!(f, "disconnected from node {node}"),
            AdminError::Timeout { elapsed, permitted } => write!(
                f,
                "timed out after {}ms (permitted {}ms)",
                elapsed.as_millis(),
                permitted.as_millis()
            ),
            AdminError::RetriesExhausted { attempts, last } => {
                write!(f, "retries exhausted after {attempts} attempts; last error: {last}")
            }
            AdminError::Remote(api) => write!(f, "{api}"),
            AdminError::Codec(msg) => write!(f, "codec failure: {msg}"),
            AdminError::ClientClosed => write!(f, "admin client was closed"),
        }
    }
}

impl std::error::Error for AdminError {}

/// One-line rendering used in log statements and summaries.
pub fn pretty_error(err: Option<&AdminError>) -> String {
    match err {
        None => "no error".to_string(),
        Some(err) => format!("{}: {err}", err.kind()),
    }
}
