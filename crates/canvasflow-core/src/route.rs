use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// Identifier of every node in the canvas graph.
///
/// `GeneratePath` is the router and `CleanState` is the reset node; the rest
/// are opaque generation units.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeId {
    GeneratePath,
    RespondToQuery,
    RewriteArtifact,
    RewriteArtifactTheme,
    RewriteCodeArtifactTheme,
    UpdateArtifact,
    UpdateHighlightedText,
    GenerateArtifact,
    CustomAction,
    GenerateFollowup,
    Reflect,
    CleanState,
}

impl NodeId {
    pub const ALL: [NodeId; 12] = [
        NodeId::GeneratePath,
        NodeId::RespondToQuery,
        NodeId::RewriteArtifact,
        NodeId::RewriteArtifactTheme,
        NodeId::RewriteCodeArtifactTheme,
        NodeId::UpdateArtifact,
        NodeId::UpdateHighlightedText,
        NodeId::GenerateArtifact,
        NodeId::CustomAction,
        NodeId::GenerateFollowup,
        NodeId::Reflect,
        NodeId::CleanState,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::GeneratePath => "generatePath",
            NodeId::RespondToQuery => "respondToQuery",
            NodeId::RewriteArtifact => "rewriteArtifact",
            NodeId::RewriteArtifactTheme => "rewriteArtifactTheme",
            NodeId::RewriteCodeArtifactTheme => "rewriteCodeArtifactTheme",
            NodeId::UpdateArtifact => "updateArtifact",
            NodeId::UpdateHighlightedText => "updateHighlightedText",
            NodeId::GenerateArtifact => "generateArtifact",
            NodeId::CustomAction => "customAction",
            NodeId::GenerateFollowup => "generateFollowup",
            NodeId::Reflect => "reflect",
            NodeId::CleanState => "cleanState",
        }
    }

    /// Whether the router may dispatch directly to this node.
    pub fn is_route_target(&self) -> bool {
        RouteTarget::try_from(*self).is_ok()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown node: {}", s))
    }
}

/// The closed set of nodes the router may dispatch to.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteTarget {
    UpdateArtifact,
    RewriteArtifactTheme,
    RewriteCodeArtifactTheme,
    RespondToQuery,
    GenerateArtifact,
    RewriteArtifact,
    CustomAction,
    UpdateHighlightedText,
}

impl RouteTarget {
    pub const ALL: [RouteTarget; 8] = [
        RouteTarget::UpdateArtifact,
        RouteTarget::RewriteArtifactTheme,
        RouteTarget::RewriteCodeArtifactTheme,
        RouteTarget::RespondToQuery,
        RouteTarget::GenerateArtifact,
        RouteTarget::RewriteArtifact,
        RouteTarget::CustomAction,
        RouteTarget::UpdateHighlightedText,
    ];

    pub fn node(&self) -> NodeId {
        match self {
            RouteTarget::UpdateArtifact => NodeId::UpdateArtifact,
            RouteTarget::RewriteArtifactTheme => NodeId::RewriteArtifactTheme,
            RouteTarget::RewriteCodeArtifactTheme => NodeId::RewriteCodeArtifactTheme,
            RouteTarget::RespondToQuery => NodeId::RespondToQuery,
            RouteTarget::GenerateArtifact => NodeId::GenerateArtifact,
            RouteTarget::RewriteArtifact => NodeId::RewriteArtifact,
            RouteTarget::CustomAction => NodeId::CustomAction,
            RouteTarget::UpdateHighlightedText => NodeId::UpdateHighlightedText,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.node().as_str()
    }
}

impl From<RouteTarget> for NodeId {
    fn from(target: RouteTarget) -> Self {
        target.node()
    }
}

impl TryFrom<NodeId> for RouteTarget {
    type Error = RoutingError;

    fn try_from(node: NodeId) -> Result<Self, Self::Error> {
        RouteTarget::ALL
            .into_iter()
            .find(|t| t.node() == node)
            .ok_or_else(|| RoutingError::UnknownTarget(node.as_str().to_string()))
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteTarget {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RouteTarget::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RoutingError::UnknownTarget(s.to_string()))
    }
}
