use futures::future::BoxFuture;

use crate::error::Result;
use crate::state::{SessionState, StateUpdate};

/// A unit of work in the canvas graph.
///
/// Receives a snapshot of the session state and returns the fields it wants
/// changed. Nodes own no executor bookkeeping; the only way to influence the
/// traversal is through the returned [`StateUpdate`].
pub trait GraphNode: Send + Sync + 'static {
    /// Run the node against a snapshot of the state.
    fn apply(&self, state: SessionState) -> BoxFuture<'_, Result<StateUpdate>>;

    /// Label used in logs and node results. Defaults to the type name.
    fn label(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
