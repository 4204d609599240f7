use thiserror::Error;

use crate::route::NodeId;

/// Routing failures. Always fatal: they indicate an upstream defect, not a
/// condition worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("'next' state field not set")]
    Unset,

    #[error("Unknown route target: {0}")]
    UnknownTarget(String),

    #[error("Router produced no dispatch targets")]
    EmptyDispatch,

    #[error("Fan-out branches diverged: {}", .0.join(", "))]
    Divergent(Vec<String>),
}

#[derive(Debug, Error)]
pub enum CanvasError {
    // Routing errors
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    // Node errors
    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: NodeId, message: String },

    #[error("Node timeout after {timeout_secs}s: {node}")]
    NodeTimeout { node: NodeId, timeout_secs: u64 },

    #[error("Node not registered: {0}")]
    NodeNotFound(NodeId),

    /// Raised by node bodies when generation fails.
    #[error("Generation failed: {0}")]
    Generation(String),

    // Traversal errors
    #[error("Traversal exceeded max steps ({0})")]
    StepLimit(usize),

    #[error("Traversal cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CanvasError {
    /// Whether this error came from the router rather than a node.
    pub fn is_routing(&self) -> bool {
        matches!(self, CanvasError::Routing(_))
    }

    /// The node this error is attributed to, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            CanvasError::NodeExecution { node, .. }
            | CanvasError::NodeTimeout { node, .. }
            | CanvasError::NodeNotFound(node) => Some(*node),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CanvasError>;
