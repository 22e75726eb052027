//! Channel networking: WebSocket connection management, channel wire frames,
//! reconnection backoff, and UI command dispatch.

pub mod channel;
pub mod dispatch;
pub mod messages;
pub mod reconnection;

pub use channel::{
    ChannelClient, ChannelConfig, ChannelError, ConnectionState, ConnectionStateWatch,
    MIN_HEARTBEAT_INTERVAL, Session,
};
pub use dispatch::{CommandDispatcher, CommandSink, DispatchError, SPAWN_UNIT_EVENT, UiAction};
pub use messages::{Frame, MessageError, Reply, ReplyStatus, decode_frame, encode_frame};
pub use reconnection::{ReconnectConfig, ReconnectError, ReconnectState, reconnect_loop};
