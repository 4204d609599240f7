//! Mock nodes and fixtures shared by canvasflow tests.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use canvasflow_core::error::{CanvasError, Result};
use canvasflow_core::route::{NodeId, RouteTarget};
use canvasflow_core::state::{SessionState, StateUpdate};
use canvasflow_core::traits::GraphNode;
use canvasflow_core::types::{Artifact, ArtifactContent, ChatMessage};

/// Shared log of node visits and the state each node saw.
#[derive(Clone, Default)]
pub struct Recorder {
    visits: Arc<Mutex<Vec<(NodeId, SessionState)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node that records into this recorder and returns an empty update.
    pub fn node(&self, id: NodeId) -> RecordingNode {
        RecordingNode {
            id,
            visits: self.visits.clone(),
            update: StateUpdate::new(),
        }
    }

    /// Visited node ids, in order.
    pub fn visits(&self) -> Vec<NodeId> {
        self.visits
            .lock()
            .expect("recorder lock")
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    /// The state `id` received on its first visit.
    pub fn seen_by(&self, id: NodeId) -> Option<SessionState> {
        self.visits
            .lock()
            .expect("recorder lock")
            .iter()
            .find(|(visited, _)| *visited == id)
            .map(|(_, state)| state.clone())
    }

    pub fn visited(&self, id: NodeId) -> bool {
        self.visits().contains(&id)
    }
}

/// Records each visit, then returns a fixed update.
pub struct RecordingNode {
    id: NodeId,
    visits: Arc<Mutex<Vec<(NodeId, SessionState)>>>,
    update: StateUpdate,
}

impl RecordingNode {
    pub fn with_update(mut self, update: StateUpdate) -> Self {
        self.update = update;
        self
    }
}

impl GraphNode for RecordingNode {
    fn apply(&self, state: SessionState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            self.visits
                .lock()
                .map_err(|e| CanvasError::Generation(e.to_string()))?
                .push((self.id, state));
            Ok(self.update.clone())
        })
    }

    fn label(&self) -> &str {
        self.id.as_str()
    }
}

/// Always fails with a generation error.
pub struct FailingNode {
    message: String,
}

impl FailingNode {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl GraphNode for FailingNode {
    fn apply(&self, _state: SessionState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move { Err(CanvasError::Generation(self.message.clone())) })
    }
}

/// Sleeps before returning its update; used for timeout and concurrency tests.
pub struct SlowNode {
    delay: Duration,
    update: StateUpdate,
}

impl SlowNode {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            update: StateUpdate::new(),
        }
    }

    pub fn with_update(mut self, update: StateUpdate) -> Self {
        self.update = update;
        self
    }
}

impl GraphNode for SlowNode {
    fn apply(&self, _state: SessionState) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(self.update.clone())
        })
    }
}

/// Echoes the last message's text back into history, tagged with the node id.
///
/// Makes every visit observable in the final state.
pub struct EchoNode {
    id: NodeId,
}

impl EchoNode {
    pub fn new(id: NodeId) -> Self {
        Self { id }
    }
}

impl GraphNode for EchoNode {
    fn apply(&self, state: SessionState) -> BoxFuture<'_, Result<StateUpdate>> {
        let last = state
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let reply = ChatMessage::assistant(format!("{}:{}", self.id, last));
        Box::pin(async move { Ok(StateUpdate::new().message(reply)) })
    }
}

/// State routed to `next` with one user message per entry in `messages`.
pub fn state_with(next: Option<RouteTarget>, messages: &[&str]) -> SessionState {
    let mut state = SessionState {
        next,
        ..SessionState::default()
    };
    state
        .messages
        .extend(messages.iter().map(|m| ChatMessage::user(*m)));
    state
}

/// Single-version markdown artifact.
pub fn text_artifact(body: &str) -> Artifact {
    Artifact::new(ArtifactContent::Text {
        index: 1,
        title: "Untitled".into(),
        full_markdown: body.into(),
    })
}

/// Write `content` to a temp TOML file and return its handle.
pub fn temp_config(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    tmp.write_all(content.as_bytes()).expect("write temp config");
    tmp
}
