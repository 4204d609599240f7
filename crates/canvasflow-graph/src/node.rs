use std::future::Future;

use futures::future::BoxFuture;

use canvasflow_core::error::Result;
use canvasflow_core::state::{SessionInputs, SessionState, StateUpdate};
use canvasflow_core::traits::GraphNode;

/// Node that changes nothing.
///
/// Default body for the router node when the routing field is set upstream,
/// and the stand-in for every node in dry runs.
#[derive(Debug, Clone, Default)]
pub struct PassThroughNode;

impl GraphNode for PassThroughNode {
    fn apply(&self, _state: SessionState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async { Ok(StateUpdate::new()) })
    }

    fn label(&self) -> &str {
        "pass_through"
    }
}

/// Terminal node: ignores its input and restores the ephemeral baseline.
#[derive(Debug, Clone, Default)]
pub struct ResetNode {
    baseline: SessionInputs,
}

impl ResetNode {
    pub fn new(baseline: SessionInputs) -> Self {
        Self { baseline }
    }

    pub fn baseline(&self) -> &SessionInputs {
        &self.baseline
    }
}

impl GraphNode for ResetNode {
    fn apply(&self, _state: SessionState) -> BoxFuture<'_, Result<StateUpdate>> {
        let update = StateUpdate::reset(self.baseline.clone());
        Box::pin(async move { Ok(update) })
    }

    fn label(&self) -> &str {
        "clean_state"
    }
}

/// Adapts an async closure into a [`GraphNode`].
pub struct FnNode<F> {
    label: String,
    f: F,
}

impl<F> FnNode<F> {
    pub fn new<Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(SessionState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StateUpdate>> + Send + 'static,
    {
        Self {
            label: label.into(),
            f,
        }
    }
}

impl<F, Fut> GraphNode for FnNode<F>
where
    F: Fn(SessionState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate>> + Send + 'static,
{
    fn apply(&self, state: SessionState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin((self.f)(state))
    }

    fn label(&self) -> &str {
        &self.label
    }
}
