//! Command dispatch: discrete UI controls → outbound channel pushes.
//!
//! Controls are named by id (`spawn-soldier-button`). Each id is bound to a
//! [`UiAction`], and each action turns into exactly one push. Nothing local
//! changes as a result; the effect shows up in a later snapshot.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::channel::{ChannelClient, ChannelError};

/// Event name the server uses for unit spawning.
pub const SPAWN_UNIT_EVENT: &str = "spawn_unit";

/// Anything that can push an event to the server.
pub trait CommandSink {
    /// Sends `event` with `payload`, fire-and-forget.
    fn push(&self, event: &str, payload: Value) -> Result<(), ChannelError>;
}

impl CommandSink for ChannelClient {
    fn push(&self, event: &str, payload: Value) -> Result<(), ChannelError> {
        ChannelClient::push(self, event, payload)
    }
}

/// A user intent.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    /// Ask the server to spawn a unit of `unit_type`.
    SpawnUnit {
        /// Unit type name, e.g. `soldier`.
        unit_type: String,
    },
    /// Any other command, pushed as-is.
    Command {
        /// Event name.
        name: String,
        /// Event payload.
        payload: Value,
    },
}

impl UiAction {
    /// Shorthand for [`UiAction::SpawnUnit`].
    pub fn spawn(unit_type: &str) -> Self {
        Self::SpawnUnit {
            unit_type: unit_type.to_string(),
        }
    }

    /// The `(event, payload)` pair this action is pushed as.
    pub fn to_push(&self) -> (&str, Value) {
        match self {
            Self::SpawnUnit { unit_type } => (SPAWN_UNIT_EVENT, json!({ "unit_type": unit_type })),
            Self::Command { name, payload } => (name.as_str(), payload.clone()),
        }
    }
}

/// Errors produced by [`CommandDispatcher`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No action is bound to the control.
    #[error("no action bound to control {0}")]
    Unbound(String),

    /// The push could not be sent.
    #[error("push failed: {0}")]
    Channel(#[from] ChannelError),
}

/// Maps control ids to actions and actions to pushes.
#[derive(Debug, Clone, Default)]
pub struct CommandDispatcher {
    bindings: BTreeMap<String, UiAction>,
}

impl CommandDispatcher {
    /// Creates a dispatcher with no bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `spawn-<kind>-button` for soldier, archer and cavalry.
    pub fn with_default_bindings() -> Self {
        let mut dispatcher = Self::new();
        for kind in ["soldier", "archer", "cavalry"] {
            dispatcher.bind(&format!("spawn-{kind}-button"), UiAction::spawn(kind));
        }
        dispatcher
    }

    /// Binds `control` to `action`, replacing any previous binding.
    pub fn bind(&mut self, control: &str, action: UiAction) -> &mut Self {
        self.bindings.insert(control.to_string(), action);
        self
    }

    /// Removes a binding.
    pub fn unbind(&mut self, control: &str) -> Option<UiAction> {
        self.bindings.remove(control)
    }

    /// Action bound to `control`.
    pub fn action(&self, control: &str) -> Option<&UiAction> {
        self.bindings.get(control)
    }

    /// Bound control ids, sorted.
    pub fn controls(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Activates `control`: looks up its action and pushes it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unbound`] for an unknown control, or
    /// [`DispatchError::Channel`] if the push fails.
    pub fn dispatch(&self, control: &str, sink: &impl CommandSink) -> Result<(), DispatchError> {
        let action = self
            .bindings
            .get(control)
            .ok_or_else(|| DispatchError::Unbound(control.to_string()))?;
        tracing::debug!(control, ?action, "control activated");
        Self::send(action, sink)
    }

    /// Pushes `action` directly, without a control binding.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Channel`] if the push fails.
    pub fn send(action: &UiAction, sink: &impl CommandSink) -> Result<(), DispatchError> {
        let (event, payload) = action.to_push();
        sink.push(event, payload)?;
        Ok(())
    }
}
