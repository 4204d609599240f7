use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use canvasflow_core::route::{NodeId, RouteTarget};

/// A vertex of the topology: a node or one of the two sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Start,
    Node(NodeId),
    End,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => f.write_str("__start__"),
            Endpoint::Node(id) => write!(f, "{}", id),
            Endpoint::End => f.write_str("__end__"),
        }
    }
}

/// Where the traversal goes after a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Successor {
    /// Exactly one static successor.
    Node(NodeId),
    /// Successors chosen at run time by the router.
    Route,
    End,
}

/// An edge connecting two endpoints in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source endpoint.
    pub from: Endpoint,
    /// Target endpoint.
    pub to: Endpoint,
    /// How the edge is taken.
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Always traverse this edge.
    #[default]
    Always,
    /// Traverse when the router's `next` field names the target.
    Routed,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: Endpoint, to: Endpoint) -> Self {
        Self {
            from,
            to,
            condition: EdgeCondition::Always,
        }
    }

    /// Create a router edge.
    pub fn routed(from: NodeId, to: RouteTarget) -> Self {
        Self {
            from: Endpoint::Node(from),
            to: Endpoint::Node(to.node()),
            condition: EdgeCondition::Routed,
        }
    }
}

/// The fixed canvas topology.
///
/// Reflection only follows nodes that produce or modify an artifact;
/// `respondToQuery` goes straight to `cleanState`.
pub struct EdgeTable;

impl EdgeTable {
    /// The node START leads to.
    pub const ENTRY: NodeId = NodeId::GeneratePath;

    /// The single router node.
    pub const ROUTER: NodeId = NodeId::GeneratePath;

    /// The reset node, last before END on every path.
    pub const RESET: NodeId = NodeId::CleanState;

    pub fn successor(node: NodeId) -> Successor {
        match node {
            NodeId::GeneratePath => Successor::Route,
            NodeId::GenerateArtifact
            | NodeId::UpdateArtifact
            | NodeId::UpdateHighlightedText
            | NodeId::RewriteArtifact
            | NodeId::RewriteArtifactTheme
            | NodeId::RewriteCodeArtifactTheme
            | NodeId::CustomAction => Successor::Node(NodeId::GenerateFollowup),
            NodeId::RespondToQuery => Successor::Node(NodeId::CleanState),
            NodeId::GenerateFollowup => Successor::Node(NodeId::Reflect),
            NodeId::Reflect => Successor::Node(NodeId::CleanState),
            NodeId::CleanState => Successor::End,
        }
    }

    /// Every edge in the topology, router edges included.
    pub fn edges() -> Vec<Edge> {
        let mut edges = vec![Edge::always(Endpoint::Start, Endpoint::Node(Self::ENTRY))];
        for node in NodeId::ALL {
            match Self::successor(node) {
                Successor::Node(to) => {
                    edges.push(Edge::always(Endpoint::Node(node), Endpoint::Node(to)))
                }
                Successor::End => edges.push(Edge::always(Endpoint::Node(node), Endpoint::End)),
                Successor::Route => {
                    edges.extend(RouteTarget::ALL.into_iter().map(|t| Edge::routed(node, t)))
                }
            }
        }
        edges
    }

    /// Static path a traversal routed to `target` takes, sentinels excluded.
    pub fn plan(target: RouteTarget) -> Vec<NodeId> {
        let mut path = vec![Self::ENTRY];
        let mut current = target.node();
        loop {
            path.push(current);
            match Self::successor(current) {
                Successor::Node(next) => current = next,
                Successor::End | Successor::Route => break,
            }
        }
        path
    }

    /// First successor of `target` that the router cannot dispatch to.
    ///
    /// Fan-out branches started at different targets must share this point.
    pub fn join(target: RouteTarget) -> Successor {
        let mut current = target.node();
        loop {
            match Self::successor(current) {
                Successor::Node(next) if next.is_route_target() => current = next,
                other => return other,
            }
        }
    }

    /// Nodes reachable from START.
    pub fn reachable() -> BTreeSet<NodeId> {
        RouteTarget::ALL
            .into_iter()
            .flat_map(Self::plan)
            .collect()
    }

    /// One edge per line, `from -> to`, router edges marked.
    pub fn render_text() -> String {
        Self::edges()
            .iter()
            .map(|e| match e.condition {
                EdgeCondition::Always => format!("{} -> {}", e.from, e.to),
                EdgeCondition::Routed => format!("{} -> {} [routed]", e.from, e.to),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Graphviz rendering of the topology.
    pub fn render_dot(run_name: &str) -> String {
        let mut out = format!("digraph \"{}\" {{\n", run_name);
        for edge in Self::edges() {
            let style = match edge.condition {
                EdgeCondition::Always => "",
                EdgeCondition::Routed => " [style=dashed]",
            };
            out.push_str(&format!("  \"{}\" -> \"{}\"{};\n", edge.from, edge.to, style));
        }
        out.push('}');
        out
    }
}
