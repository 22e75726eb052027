//! Channel wire frames.
//!
//! Every WebSocket text message is a JSON array
//! `[join_ref, ref, topic, event, payload]`. `join_ref` ties a message to one
//! join of a topic; `ref` correlates a request with its `phx_reply`. Both are
//! strings chosen by the client and echoed back by the server, and either may
//! be `null` for server pushes. Use [`encode_frame`] and [`decode_frame`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic reserved for socket-level traffic such as heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

// ---------------------------------------------------------------------------
// Control events
// ---------------------------------------------------------------------------

/// Client asks to join a topic.
pub const PHX_JOIN: &str = "phx_join";
/// Server answers a request carrying a `ref`.
pub const PHX_REPLY: &str = "phx_reply";
/// Client leaves a topic.
pub const PHX_LEAVE: &str = "phx_leave";
/// Server closed the channel.
pub const PHX_CLOSE: &str = "phx_close";
/// The channel crashed on the server.
pub const PHX_ERROR: &str = "phx_error";
/// Keepalive sent on [`PHOENIX_TOPIC`].
pub const HEARTBEAT: &str = "heartbeat";

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One decoded channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Join this message belongs to.
    pub join_ref: Option<String>,
    /// Request/reply correlation id.
    pub msg_ref: Option<String>,
    /// Channel topic, e.g. `game:lobby`.
    pub topic: String,
    /// Event name, e.g. `state_update`.
    pub event: String,
    /// Event payload.
    pub payload: Value,
}

impl Frame {
    /// `phx_join` for `topic`. The join ref doubles as the request ref.
    pub fn join(topic: &str, join_ref: &str, params: Value) -> Self {
        Self {
            join_ref: Some(join_ref.to_string()),
            msg_ref: Some(join_ref.to_string()),
            topic: topic.to_string(),
            event: PHX_JOIN.to_string(),
            payload: params,
        }
    }

    /// `phx_leave` for a joined topic.
    pub fn leave(topic: &str, join_ref: &str, msg_ref: &str) -> Self {
        Self {
            join_ref: Some(join_ref.to_string()),
            msg_ref: Some(msg_ref.to_string()),
            topic: topic.to_string(),
            event: PHX_LEAVE.to_string(),
            payload: Value::Object(Default::default()),
        }
    }

    /// A client event pushed to a joined topic.
    pub fn push(topic: &str, join_ref: &str, msg_ref: &str, event: &str, payload: Value) -> Self {
        Self {
            join_ref: Some(join_ref.to_string()),
            msg_ref: Some(msg_ref.to_string()),
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
        }
    }

    /// Socket-level keepalive.
    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            join_ref: None,
            msg_ref: Some(msg_ref.to_string()),
            topic: PHOENIX_TOPIC.to_string(),
            event: HEARTBEAT.to_string(),
            payload: Value::Object(Default::default()),
        }
    }

    /// Decodes the payload of a `phx_reply`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::NotAReply`] for any other event, or
    /// [`MessageError::Json`] if the payload has the wrong shape.
    pub fn reply(&self) -> Result<Reply, MessageError> {
        if self.event != PHX_REPLY {
            return Err(MessageError::NotAReply(self.event.clone()));
        }
        Ok(Reply::deserialize(&self.payload)?)
    }
}

/// Positional wire form of a [`Frame`].
#[derive(Serialize, Deserialize)]
struct WireFrame(Option<String>, Option<String>, String, String, Value);

/// Encodes a frame as a JSON text message.
///
/// # Errors
///
/// Returns [`MessageError::Json`] if the payload cannot be serialized.
pub fn encode_frame(frame: &Frame) -> Result<String, MessageError> {
    let wire = WireFrame(
        frame.join_ref.clone(),
        frame.msg_ref.clone(),
        frame.topic.clone(),
        frame.event.clone(),
        frame.payload.clone(),
    );
    Ok(serde_json::to_string(&wire)?)
}

/// Decodes a JSON text message into a frame.
///
/// # Errors
///
/// Returns [`MessageError::Json`] if the text is not a five-element array of
/// the expected types.
pub fn decode_frame(text: &str) -> Result<Frame, MessageError> {
    let WireFrame(join_ref, msg_ref, topic, event, payload) = serde_json::from_str(text)?;
    Ok(Frame {
        join_ref,
        msg_ref,
        topic,
        event,
        payload,
    })
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Outcome reported in a `phx_reply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Request accepted.
    Ok,
    /// Request rejected.
    Error,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

/// Payload of a `phx_reply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Outcome.
    pub status: ReplyStatus,
    /// Handler-defined response body.
    #[serde(default)]
    pub response: Value,
}

impl Reply {
    /// Returns `true` for an `ok` reply.
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}

/// Errors produced while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// JSON (de)serialization failed.
    #[error("frame json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected a `phx_reply`.
    #[error("expected phx_reply, got {0}")]
    NotAReply(String),
}
