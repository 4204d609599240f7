use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use canvasflow_core::config::AppConfig;
use canvasflow_core::error::{CanvasError, Result, RoutingError};
use canvasflow_core::event::EventBus;
use canvasflow_core::route::NodeId;
use canvasflow_core::state::{GenerationSettings, SessionRequest, SessionState, StateUpdate};
use canvasflow_core::types::{GraphEvent, SessionId};

use super::edge::{EdgeTable, Successor};
use super::registry::NodeRegistry;
use super::router::{Dispatch, Router};

/// Result of executing a single node.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Which node was executed.
    pub node_id: NodeId,
    /// Label of the body that ran.
    pub label: String,
    /// 1-based position in the traversal.
    pub step: usize,
    /// Whether the node's update changed anything.
    pub changed: bool,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of one traversal from START to END.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub session_id: SessionId,
    /// Final session state, ephemeral fields reset.
    pub state: SessionState,
    /// Nodes visited, in order.
    pub path: Vec<NodeId>,
    /// Per-node results in execution order.
    pub node_results: Vec<NodeResult>,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn visited(&self, node: NodeId) -> bool {
        self.path.contains(&node)
    }
}

/// Per-traversal bookkeeping. Never shared between traversals.
struct Trace<'a> {
    session_id: &'a SessionId,
    cancel: &'a CancellationToken,
    path: Vec<NodeId>,
    node_results: Vec<NodeResult>,
}

/// Walks the canvas topology for one session at a time.
///
/// The executor is immutable once built, so one instance (behind an `Arc`)
/// can drive any number of concurrent traversals; each traversal owns its
/// own [`SessionState`].
pub struct GraphExecutor {
    registry: Arc<NodeRegistry>,
    router: Router,
    run_name: String,
    node_timeout_secs: u64,
    max_steps: usize,
    default_settings: GenerationSettings,
    event_bus: Option<Arc<EventBus>>,
    cancel: CancellationToken,
}

impl GraphExecutor {
    /// Create an executor over a complete registry.
    pub fn new(registry: NodeRegistry) -> Result<Self> {
        registry.validate()?;
        let defaults = AppConfig::default();
        Ok(Self {
            registry: Arc::new(registry),
            router: Router,
            run_name: defaults.graph.run_name,
            node_timeout_secs: defaults.graph.node_timeout_secs,
            max_steps: defaults.graph.max_steps,
            default_settings: defaults.generation,
            event_bus: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Create an executor using the `[graph]` and `[generation]` sections.
    pub fn from_config(registry: NodeRegistry, config: &AppConfig) -> Result<Self> {
        let mut executor = Self::new(registry)?;
        executor.run_name = config.graph.run_name.clone();
        executor.node_timeout_secs = config.graph.node_timeout_secs;
        executor.max_steps = config.graph.max_steps;
        executor.default_settings = config.generation.clone();
        Ok(executor)
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_node_timeout(mut self, secs: u64) -> Self {
        self.node_timeout_secs = secs;
        self
    }

    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Token that cancels every traversal started by this executor.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Run a traversal. The state's routing field must already be set.
    pub async fn run(&self, initial: SessionState) -> Result<ExecutionResult> {
        self.run_session(SessionId::new(), initial).await
    }

    /// Validate an external request, then run it.
    pub async fn run_request(&self, request: SessionRequest) -> Result<ExecutionResult> {
        let state = request.into_state(&self.default_settings)?;
        self.run(state).await
    }

    /// Run a traversal under an explicit session id.
    pub async fn run_session(
        &self,
        session_id: SessionId,
        initial: SessionState,
    ) -> Result<ExecutionResult> {
        let cancel = self.cancel.child_token();
        self.run_with_cancel(session_id, initial, &cancel).await
    }

    /// Run a traversal that also stops when `cancel` fires.
    ///
    /// Cancellation is observed between nodes; a running node is never
    /// interrupted.
    pub async fn run_with_cancel(
        &self,
        session_id: SessionId,
        initial: SessionState,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let start = Instant::now();
        info!(run = %self.run_name, session = %session_id, next = ?initial.next, "Traversal started");
        self.publish(GraphEvent::TraversalStarted {
            session_id: session_id.clone(),
            run_name: self.run_name.clone(),
        });

        let mut trace = Trace {
            session_id: &session_id,
            cancel,
            path: Vec::new(),
            node_results: Vec::new(),
        };

        match self.traverse(initial, &mut trace).await {
            Ok(state) => {
                let total_elapsed_ms = start.elapsed().as_millis() as u64;
                info!(
                    run = %self.run_name,
                    session = %session_id,
                    steps = trace.path.len(),
                    total_elapsed_ms,
                    "Traversal complete"
                );
                self.publish(GraphEvent::TraversalCompleted {
                    session_id: session_id.clone(),
                    path: trace.path.clone(),
                    total_elapsed_ms,
                });
                Ok(ExecutionResult {
                    session_id: session_id.clone(),
                    state,
                    path: trace.path,
                    node_results: trace.node_results,
                    total_elapsed_ms,
                })
            }
            Err(e) => {
                error!(run = %self.run_name, session = %session_id, error = %e, "Traversal failed");
                self.publish(GraphEvent::TraversalFailed {
                    session_id: session_id.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn traverse(&self, mut state: SessionState, trace: &mut Trace<'_>) -> Result<SessionState> {
        // START always leads to the router node.
        let mut next = Successor::Node(EdgeTable::ENTRY);

        loop {
            match next {
                Successor::End => return Ok(state),
                Successor::Node(node) => {
                    let update = self.step(node, state.clone(), trace).await?;
                    state.merge(update);
                    next = EdgeTable::successor(node);
                }
                Successor::Route => {
                    let dispatches = self.router.route(&state)?;
                    next = self.fan_out(dispatches, &mut state, trace).await?;
                }
            }
        }
    }

    /// Run every dispatch's sub-path in order and return the point where they
    /// converge. Convergence is checked against the edge table before any
    /// branch runs; each branch stops at the first node the router cannot
    /// target.
    async fn fan_out(
        &self,
        dispatches: Vec<Dispatch>,
        state: &mut SessionState,
        trace: &mut Trace<'_>,
    ) -> Result<Successor> {
        let first = match dispatches.first() {
            Some(dispatch) => EdgeTable::join(dispatch.target),
            None => return Err(RoutingError::EmptyDispatch.into()),
        };
        let joins: Vec<Successor> = dispatches
            .iter()
            .map(|d| EdgeTable::join(d.target))
            .collect();
        if joins.iter().any(|j| *j != first) {
            let names = joins.iter().map(describe).collect();
            return Err(RoutingError::Divergent(names).into());
        }
        self.publish(GraphEvent::Routed {
            targets: dispatches.iter().map(|d| d.target).collect(),
        });

        for dispatch in dispatches {
            let mut branch = dispatch.payload;
            let mut node = dispatch.target.node();
            loop {
                let update = self.step(node, branch.clone(), trace).await?;
                branch.merge(update.clone());
                state.merge(update);
                match EdgeTable::successor(node) {
                    Successor::Node(n) if n.is_route_target() => node = n,
                    _ => break,
                }
            }
        }

        debug!(join = %describe(&first), "Fan-out converged");
        Ok(first)
    }

    /// Invoke one node. The caller merges the returned update.
    async fn step(
        &self,
        node: NodeId,
        input: SessionState,
        trace: &mut Trace<'_>,
    ) -> Result<StateUpdate> {
        if trace.cancel.is_cancelled() {
            warn!(session = %trace.session_id, node = %node, "Traversal cancelled before node");
            return Err(CanvasError::Cancelled);
        }
        if trace.path.len() >= self.max_steps {
            return Err(CanvasError::StepLimit(self.max_steps));
        }

        let label = self
            .registry
            .get(node)
            .map(|body| body.label().to_string())
            .unwrap_or_default();
        let step = trace.path.len() + 1;
        trace.path.push(node);
        debug!(session = %trace.session_id, node = %node, label = %label, step, "Executing graph node");
        self.publish(GraphEvent::NodeStarted { node, step });

        let node_start = Instant::now();
        let update = match self
            .registry
            .execute(node, input, self.node_timeout_secs)
            .await
        {
            Ok(update) => update,
            Err(e) => {
                error!(session = %trace.session_id, node = %node, label = %label, error = %e, "Graph node failed");
                self.publish(GraphEvent::NodeFailed {
                    node,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };
        let elapsed_ms = node_start.elapsed().as_millis() as u64;

        trace.node_results.push(NodeResult {
            node_id: node,
            label,
            step,
            changed: !update.is_empty(),
            elapsed_ms,
        });
        self.publish(GraphEvent::NodeCompleted {
            node,
            step,
            elapsed_ms,
        });
        Ok(update)
    }

    fn publish(&self, event: GraphEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

fn describe(successor: &Successor) -> String {
    match successor {
        Successor::Node(id) => id.to_string(),
        Successor::Route => "router".to_string(),
        Successor::End => "__end__".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use canvasflow_core::route::RouteTarget;
    use canvasflow_core::state::SessionInputs;
    use canvasflow_core::types::{ChatMessage, Language};
    use canvasflow_test_utils::{state_with, text_artifact, EchoNode, FailingNode, Recorder, SlowNode};

    fn recorded(recorder: &Recorder, baseline: SessionInputs) -> NodeRegistry {
        let mut registry = NodeRegistry::new(baseline);
        for id in NodeId::ALL {
            if id != EdgeTable::RESET {
                registry.register(id, recorder.node(id)).unwrap();
            }
        }
        registry
    }

    #[test]
    fn test_incomplete_registry_rejected() {
        let registry = NodeRegistry::new(SessionInputs::default());
        assert!(matches!(
            GraphExecutor::new(registry),
            Err(CanvasError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_artifact_path() {
        let recorder = Recorder::new();
        let executor = GraphExecutor::new(recorded(&recorder, SessionInputs::default())).unwrap();

        let result = executor
            .run(state_with(Some(RouteTarget::GenerateArtifact), &["m1"]))
            .await
            .unwrap();

        assert_eq!(
            result.path,
            vec![
                NodeId::GeneratePath,
                NodeId::GenerateArtifact,
                NodeId::GenerateFollowup,
                NodeId::Reflect,
                NodeId::CleanState,
            ]
        );
        assert_eq!(result.node_results.len(), 5);
        assert_eq!(result.node_results[4].step, 5);
        assert_eq!(result.node_results[1].label, "generateArtifact");
        assert_eq!(result.node_results[4].label, "clean_state");
        assert!(result.state.is_baseline(&SessionInputs::default()));
        assert_eq!(result.state.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_respond_to_query_skips_reflect() {
        let recorder = Recorder::new();
        let executor = GraphExecutor::new(recorded(&recorder, SessionInputs::default())).unwrap();

        let result = executor
            .run(state_with(Some(RouteTarget::RespondToQuery), &["m1"]))
            .await
            .unwrap();

        assert_eq!(
            result.path,
            vec![NodeId::GeneratePath, NodeId::RespondToQuery, NodeId::CleanState]
        );
        assert!(!recorder.visited(NodeId::Reflect));
        assert!(!recorder.visited(NodeId::GenerateFollowup));
    }

    #[tokio::test]
    async fn test_unset_routing_invokes_only_router() {
        let recorder = Recorder::new();
        let executor = GraphExecutor::new(recorded(&recorder, SessionInputs::default())).unwrap();

        let err = executor.run(state_with(None, &["m1"])).await.unwrap_err();

        assert!(matches!(err, CanvasError::Routing(RoutingError::Unset)));
        assert_eq!(recorder.visits(), vec![NodeId::GeneratePath]);
    }

    #[tokio::test]
    async fn test_unknown_request_target_rejected_before_dispatch() {
        let recorder = Recorder::new();
        let executor = GraphExecutor::new(recorded(&recorder, SessionInputs::default())).unwrap();

        let request = SessionRequest {
            next: Some("doesNotExist".into()),
            ..Default::default()
        };
        let err = executor.run_request(request).await.unwrap_err();

        match err {
            CanvasError::Routing(RoutingError::UnknownTarget(name)) => {
                assert_eq!(name, "doesNotExist")
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(recorder.visits().is_empty());
    }

    #[tokio::test]
    async fn test_router_node_may_set_next() {
        let recorder = Recorder::new();
        let mut registry = recorded(&recorder, SessionInputs::default());
        registry
            .register(
                NodeId::GeneratePath,
                recorder
                    .node(NodeId::GeneratePath)
                    .with_update(StateUpdate::new().route(RouteTarget::RewriteArtifact)),
            )
            .unwrap();
        let executor = GraphExecutor::new(registry).unwrap();

        let result = executor.run(state_with(None, &["m1"])).await.unwrap();
        assert!(result.visited(NodeId::RewriteArtifact));
        assert!(result.state.next.is_none());
    }

    #[tokio::test]
    async fn test_node_failure_halts_without_merge() {
        let recorder = Recorder::new();
        let mut registry = recorded(&recorder, SessionInputs::default());
        registry
            .register(NodeId::GenerateFollowup, FailingNode::new("no followup"))
            .unwrap();
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let executor = GraphExecutor::new(registry)
            .unwrap()
            .with_event_bus(bus.clone());

        let err = executor
            .run(state_with(Some(RouteTarget::UpdateArtifact), &["m1"]))
            .await
            .unwrap_err();

        assert_eq!(err.node(), Some(NodeId::GenerateFollowup));
        assert!(!recorder.visited(NodeId::Reflect));

        // The reset node never starts on a failed traversal.
        let mut started = Vec::new();
        let mut failed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                GraphEvent::NodeStarted { node, .. } => started.push(node),
                GraphEvent::TraversalFailed { .. } => failed = true,
                GraphEvent::TraversalCompleted { .. } => panic!("failed traversal completed"),
                _ => {}
            }
        }
        assert_eq!(
            started,
            vec![NodeId::GeneratePath, NodeId::UpdateArtifact, NodeId::GenerateFollowup]
        );
        assert!(!started.contains(&NodeId::CleanState));
        assert!(failed);
    }

    #[tokio::test]
    async fn test_node_outputs_merge_in_order() {
        let mut registry = NodeRegistry::new(SessionInputs::default());
        for id in NodeId::ALL {
            if id != EdgeTable::RESET {
                registry.register(id, EchoNode::new(id)).unwrap();
            }
        }
        let executor = GraphExecutor::new(registry).unwrap();

        let result = executor
            .run(state_with(Some(RouteTarget::CustomAction), &["m1"]))
            .await
            .unwrap();

        let contents: Vec<_> = result.state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "m1",
                "generatePath:m1",
                "customAction:generatePath:m1",
                "generateFollowup:customAction:generatePath:m1",
                "reflect:generateFollowup:customAction:generatePath:m1",
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_restores_configured_baseline() {
        let recorder = Recorder::new();
        let baseline = SessionInputs {
            language: Some(Language::Hindi),
            ..Default::default()
        };
        let mut registry = recorded(&recorder, baseline.clone());
        registry
            .register(
                NodeId::GenerateArtifact,
                recorder
                    .node(NodeId::GenerateArtifact)
                    .with_update(StateUpdate::new().artifact(text_artifact("draft"))),
            )
            .unwrap();
        let executor = GraphExecutor::new(registry).unwrap();

        let mut initial = state_with(Some(RouteTarget::GenerateArtifact), &["m1"]);
        initial.inputs.web_search_enabled = Some(true);
        initial.inputs.custom_quick_action_id = Some("qa".into());

        let result = executor.run(initial).await.unwrap();
        assert!(result.state.is_baseline(&baseline));
        assert_eq!(result.state.artifact, Some(text_artifact("draft")));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_node() {
        let recorder = Recorder::new();
        let executor = GraphExecutor::new(recorded(&recorder, SessionInputs::default())).unwrap();
        executor.cancel_token().cancel();

        let err = executor
            .run(state_with(Some(RouteTarget::GenerateArtifact), &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, CanvasError::Cancelled));
        assert!(recorder.visits().is_empty());
    }

    #[tokio::test]
    async fn test_step_limit() {
        let recorder = Recorder::new();
        let executor = GraphExecutor::new(recorded(&recorder, SessionInputs::default()))
            .unwrap()
            .with_max_steps(2);

        let err = executor
            .run(state_with(Some(RouteTarget::GenerateArtifact), &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, CanvasError::StepLimit(2)));
        assert_eq!(recorder.visits().len(), 2);
    }

    #[tokio::test]
    async fn test_node_timeout() {
        let recorder = Recorder::new();
        let mut registry = recorded(&recorder, SessionInputs::default());
        registry
            .register(NodeId::Reflect, SlowNode::new(Duration::from_secs(30)))
            .unwrap();
        let executor = GraphExecutor::new(registry).unwrap().with_node_timeout(1);

        let err = executor
            .run(state_with(Some(RouteTarget::RewriteArtifactTheme), &[]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CanvasError::NodeTimeout {
                node: NodeId::Reflect,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_events_published() {
        let recorder = Recorder::new();
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let executor = GraphExecutor::new(recorded(&recorder, SessionInputs::default()))
            .unwrap()
            .with_event_bus(bus.clone());

        executor
            .run(state_with(Some(RouteTarget::RespondToQuery), &[]))
            .await
            .unwrap();

        let mut started = Vec::new();
        let mut completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                GraphEvent::NodeStarted { node, .. } => started.push(node),
                GraphEvent::Routed { targets } => {
                    assert_eq!(targets, vec![RouteTarget::RespondToQuery])
                }
                GraphEvent::TraversalCompleted { path, .. } => {
                    assert_eq!(path.len(), 3);
                    completed = true;
                }
                _ => {}
            }
        }
        assert_eq!(
            started,
            vec![NodeId::GeneratePath, NodeId::RespondToQuery, NodeId::CleanState]
        );
        assert!(completed);
    }

    #[tokio::test]
    async fn test_fan_out_converges() {
        let recorder = Recorder::new();
        let executor = GraphExecutor::new(recorded(&recorder, SessionInputs::default())).unwrap();

        let base = state_with(None, &["m1"]);
        let dispatches = vec![
            Dispatch {
                target: RouteTarget::UpdateArtifact,
                payload: base.clone(),
            },
            Dispatch {
                target: RouteTarget::RewriteArtifact,
                payload: base.clone(),
            },
        ];
        let session = SessionId::new();
        let cancel = CancellationToken::new();
        let mut trace = Trace {
            session_id: &session,
            cancel: &cancel,
            path: Vec::new(),
            node_results: Vec::new(),
        };
        let mut state = base;

        let join = executor
            .fan_out(dispatches, &mut state, &mut trace)
            .await
            .unwrap();
        assert_eq!(join, Successor::Node(NodeId::GenerateFollowup));
        assert_eq!(trace.path, vec![NodeId::UpdateArtifact, NodeId::RewriteArtifact]);
    }

    #[tokio::test]
    async fn test_fan_out_divergence_rejected() {
        let recorder = Recorder::new();
        let executor = GraphExecutor::new(recorded(&recorder, SessionInputs::default())).unwrap();

        let base = state_with(None, &[]);
        let dispatches = vec![
            Dispatch {
                target: RouteTarget::GenerateArtifact,
                payload: base.clone(),
            },
            Dispatch {
                target: RouteTarget::RespondToQuery,
                payload: base.clone(),
            },
        ];
        let session = SessionId::new();
        let cancel = CancellationToken::new();
        let mut trace = Trace {
            session_id: &session,
            cancel: &cancel,
            path: Vec::new(),
            node_results: Vec::new(),
        };
        let mut state = base;

        let err = executor
            .fan_out(dispatches, &mut state, &mut trace)
            .await
            .unwrap_err();
        match err {
            CanvasError::Routing(RoutingError::Divergent(joins)) => {
                assert_eq!(joins, vec!["generateFollowup", "cleanState"])
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // Rejected before either branch ran.
        assert!(recorder.visits().is_empty());
        assert!(trace.path.is_empty());
        assert_eq!(state, state_with(None, &[]));
    }

    #[tokio::test]
    async fn test_empty_fan_out_rejected() {
        let recorder = Recorder::new();
        let executor = GraphExecutor::new(recorded(&recorder, SessionInputs::default())).unwrap();
        let session = SessionId::new();
        let cancel = CancellationToken::new();
        let mut trace = Trace {
            session_id: &session,
            cancel: &cancel,
            path: Vec::new(),
            node_results: Vec::new(),
        };
        let mut state = SessionState::default();

        let err = executor
            .fan_out(Vec::new(), &mut state, &mut trace)
            .await
            .unwrap_err();
        assert!(matches!(err, CanvasError::Routing(RoutingError::EmptyDispatch)));
    }

    #[tokio::test]
    async fn test_node_sees_merged_state() {
        let recorder = Recorder::new();
        let mut registry = recorded(&recorder, SessionInputs::default());
        registry
            .register(
                NodeId::UpdateHighlightedText,
                recorder.node(NodeId::UpdateHighlightedText).with_update(
                    StateUpdate::new().message(ChatMessage::assistant("patched")),
                ),
            )
            .unwrap();
        let executor = GraphExecutor::new(registry).unwrap();

        executor
            .run(state_with(Some(RouteTarget::UpdateHighlightedText), &["m1"]))
            .await
            .unwrap();

        let seen = recorder.seen_by(NodeId::GenerateFollowup).unwrap();
        assert_eq!(seen.messages.len(), 2);
        assert_eq!(seen.messages[1].content, "patched");
        assert_eq!(seen.next, Some(RouteTarget::UpdateHighlightedText));
    }
}
