//! Session state threaded through one traversal, and its merge rules.
//!
//! Nodes never mutate [`SessionState`] directly. They return a
//! [`StateUpdate`] which the executor folds in with [`SessionState::merge`],
//! one policy per field:
//!
//! | field         | policy                                   |
//! |---------------|------------------------------------------|
//! | `messages`    | appended in order                        |
//! | `artifact`    | replaced when the update carries one     |
//! | `next`        | replaced when the update carries one     |
//! | `highlighted` | replaced when the update carries one     |
//! | `reset`       | clears `next`, replaces all of `inputs`  |

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::route::RouteTarget;
use crate::types::{
    Artifact, ArtifactLength, ChatMessage, HighlightedText, Language, ProgrammingLanguage,
    ReadingLevel,
};

/// Caller-supplied generation parameters. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_temperature() -> f32 { 1.0 }
fn default_max_tokens() -> u32 { 1024 }

/// Per-request fields that are wiped back to a baseline when a traversal ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInputs {
    pub highlighted: Option<HighlightedText>,
    pub language: Option<Language>,
    pub artifact_length: Option<ArtifactLength>,
    pub reading_level: Option<ReadingLevel>,
    pub port_language: Option<ProgrammingLanguage>,
    pub regenerate_with_emojis: Option<bool>,
    pub add_comments: Option<bool>,
    pub add_logs: Option<bool>,
    pub fix_bugs: Option<bool>,
    pub custom_quick_action_id: Option<String>,
    pub web_search_enabled: Option<bool>,
}

/// The mutable record shared by every node of one traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Routing field read by the router. Cleared by reset.
    #[serde(default)]
    pub next: Option<RouteTarget>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub settings: GenerationSettings,
    #[serde(default)]
    pub inputs: SessionInputs,
}

impl SessionState {
    /// Fresh state routed to `target`.
    pub fn routed(target: RouteTarget) -> Self {
        Self {
            next: Some(target),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    pub fn with_inputs(mut self, inputs: SessionInputs) -> Self {
        self.inputs = inputs;
        self
    }

    /// Fold a node's output into this state.
    pub fn merge(&mut self, update: StateUpdate) {
        if let Some(baseline) = update.reset {
            self.next = None;
            self.inputs = baseline;
        }
        self.messages.extend(update.messages);
        if let Some(artifact) = update.artifact {
            self.artifact = Some(artifact);
        }
        if let Some(next) = update.next {
            self.next = Some(next);
        }
        if let Some(highlighted) = update.highlighted {
            self.inputs.highlighted = Some(highlighted);
        }
    }

    /// Whether every ephemeral field matches `baseline`.
    pub fn is_baseline(&self, baseline: &SessionInputs) -> bool {
        self.next.is_none() && self.inputs == *baseline
    }
}

/// Partial output of a node. Fields left empty do not touch the state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<ChatMessage>,
    pub artifact: Option<Artifact>,
    pub next: Option<RouteTarget>,
    pub highlighted: Option<HighlightedText>,
    pub reset: Option<SessionInputs>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite every ephemeral field with `baseline`.
    pub fn reset(baseline: SessionInputs) -> Self {
        Self {
            reset: Some(baseline),
            ..Self::default()
        }
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    pub fn route(mut self, target: RouteTarget) -> Self {
        self.next = Some(target);
        self
    }

    pub fn highlighted(mut self, highlighted: HighlightedText) -> Self {
        self.highlighted = Some(highlighted);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Wire form of an incoming request. `next` stays a string until
/// [`SessionRequest::into_state`] validates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRequest {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub settings: Option<GenerationSettings>,
    #[serde(flatten)]
    pub inputs: SessionInputs,
}

impl SessionRequest {
    /// Convert into a [`SessionState`], rejecting unknown route targets.
    ///
    /// An absent or empty `next` is left unset; the router reports it.
    pub fn into_state(self, default_settings: &GenerationSettings) -> Result<SessionState, RoutingError> {
        let next = match self.next.as_deref() {
            None | Some("") => None,
            Some(name) => Some(name.parse::<RouteTarget>()?),
        };
        Ok(SessionState {
            next,
            messages: self.messages,
            artifact: self.artifact,
            settings: self.settings.unwrap_or_else(|| default_settings.clone()),
            inputs: self.inputs,
        })
    }
}
