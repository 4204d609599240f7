use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::route::{NodeId, RouteTarget};

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// One version of the generated artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactContent {
    Text {
        index: usize,
        title: String,
        full_markdown: String,
    },
    Code {
        index: usize,
        title: String,
        language: ProgrammingLanguage,
        code: String,
    },
}

impl ArtifactContent {
    pub fn index(&self) -> usize {
        match self {
            ArtifactContent::Text { index, .. } | ArtifactContent::Code { index, .. } => *index,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ArtifactContent::Text { title, .. } | ArtifactContent::Code { title, .. } => title,
        }
    }
}

/// The generated artifact with its version history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub current_index: usize,
    pub contents: Vec<ArtifactContent>,
}

impl Artifact {
    /// Start a new artifact from its first version.
    pub fn new(first: ArtifactContent) -> Self {
        Self {
            current_index: first.index(),
            contents: vec![first],
        }
    }

    /// The version selected by `current_index`.
    pub fn current(&self) -> Option<&ArtifactContent> {
        self.contents.iter().find(|c| c.index() == self.current_index)
    }

    /// Append a new version and make it current.
    pub fn push_version(&mut self, content: ArtifactContent) {
        self.current_index = content.index();
        self.contents.push(content);
    }

    /// Next free version index.
    pub fn next_index(&self) -> usize {
        self.contents.iter().map(|c| c.index()).max().map_or(1, |i| i + 1)
    }
}

/// The span of the artifact the user selected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HighlightedText {
    Code {
        start_char_index: usize,
        end_char_index: usize,
    },
    Text {
        full_markdown: String,
        markdown_block: String,
        selected_text: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Mandarin,
    Spanish,
    French,
    Hindi,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactLength {
    Shortest,
    Short,
    Long,
    Longest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadingLevel {
    Pirate,
    Child,
    Teenager,
    College,
    Phd,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgrammingLanguage {
    Typescript,
    Javascript,
    Cpp,
    Java,
    Php,
    Python,
    Html,
    Sql,
    Rust,
    Other,
}

/// Graph event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// Traversal started.
    TraversalStarted { session_id: SessionId, run_name: String },
    /// Router picked its dispatch targets.
    Routed { targets: Vec<RouteTarget> },
    /// Node invocation started.
    NodeStarted { node: NodeId, step: usize },
    /// Node output merged into the session state.
    NodeCompleted { node: NodeId, step: usize, elapsed_ms: u64 },
    /// Node failed; traversal halts.
    NodeFailed { node: NodeId, error: String },
    /// Traversal reached END.
    TraversalCompleted {
        session_id: SessionId,
        path: Vec<NodeId>,
        total_elapsed_ms: u64,
    },
    /// Traversal aborted.
    TraversalFailed { session_id: SessionId, error: String },
}
