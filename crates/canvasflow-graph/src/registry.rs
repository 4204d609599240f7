use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use canvasflow_core::error::{CanvasError, Result};
use canvasflow_core::route::NodeId;
use canvasflow_core::state::{SessionInputs, SessionState, StateUpdate};
use canvasflow_core::traits::GraphNode;

use crate::edge::EdgeTable;
use crate::node::{PassThroughNode, ResetNode};

/// Registry of node bodies, keyed by [`NodeId`].
///
/// The reset node is always the built-in [`ResetNode`]. The router node
/// starts out as a [`PassThroughNode`] and may be replaced.
pub struct NodeRegistry {
    nodes: HashMap<NodeId, Arc<dyn GraphNode>>,
    baseline: SessionInputs,
}

impl NodeRegistry {
    pub fn new(baseline: SessionInputs) -> Self {
        let mut nodes: HashMap<NodeId, Arc<dyn GraphNode>> = HashMap::new();
        nodes.insert(EdgeTable::ROUTER, Arc::new(PassThroughNode));
        nodes.insert(EdgeTable::RESET, Arc::new(ResetNode::new(baseline.clone())));
        Self { nodes, baseline }
    }

    /// Registry where every node is a [`PassThroughNode`]; used for dry runs.
    pub fn pass_through(baseline: SessionInputs) -> Self {
        let mut registry = Self::new(baseline);
        for id in NodeId::ALL {
            if id != EdgeTable::RESET {
                registry.nodes.insert(id, Arc::new(PassThroughNode));
            }
        }
        registry
    }

    /// Register a node body. The reset node cannot be replaced.
    pub fn register(&mut self, id: NodeId, node: impl GraphNode) -> Result<()> {
        self.register_arc(id, Arc::new(node))
    }

    pub fn register_arc(&mut self, id: NodeId, node: Arc<dyn GraphNode>) -> Result<()> {
        if id == EdgeTable::RESET {
            return Err(CanvasError::Config(format!(
                "'{}' is built in and cannot be replaced",
                id
            )));
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Builder-style [`NodeRegistry::register`].
    pub fn with(mut self, id: NodeId, node: impl GraphNode) -> Result<Self> {
        self.register(id, node)?;
        Ok(self)
    }

    /// Get a node by id.
    pub fn get(&self, id: NodeId) -> Option<Arc<dyn GraphNode>> {
        self.nodes.get(&id).cloned()
    }

    /// Registered ids, in declaration order.
    pub fn list(&self) -> Vec<NodeId> {
        NodeId::ALL
            .into_iter()
            .filter(|id| self.nodes.contains_key(id))
            .collect()
    }

    /// Ids that still need a body.
    pub fn missing(&self) -> Vec<NodeId> {
        NodeId::ALL
            .into_iter()
            .filter(|id| !self.nodes.contains_key(id))
            .collect()
    }

    /// Fail unless every node in the topology has a body.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing();
        if missing.is_empty() {
            return Ok(());
        }
        let names = missing
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Err(CanvasError::Config(format!("Nodes not registered: {}", names)))
    }

    /// The ephemeral baseline the reset node restores.
    pub fn baseline(&self) -> &SessionInputs {
        &self.baseline
    }

    /// Execute a node by id, attributing any failure to it.
    ///
    /// `timeout_secs == 0` disables the timeout.
    pub async fn execute(
        &self,
        id: NodeId,
        state: SessionState,
        timeout_secs: u64,
    ) -> Result<StateUpdate> {
        let node = self.get(id).ok_or(CanvasError::NodeNotFound(id))?;

        let result = if timeout_secs == 0 {
            node.apply(state).await
        } else {
            let timeout = Duration::from_secs(timeout_secs);
            match tokio::time::timeout(timeout, node.apply(state)).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(CanvasError::NodeTimeout {
                        node: id,
                        timeout_secs,
                    })
                }
            }
        };

        result.map_err(|e| match e {
            CanvasError::Cancelled => CanvasError::Cancelled,
            e @ CanvasError::NodeExecution { .. } => e,
            other => CanvasError::NodeExecution {
                node: id,
                message: other.to_string(),
            },
        })
    }
}
