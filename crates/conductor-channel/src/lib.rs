//! Operator messaging: the forwarder and its channel backends.
//!
//! A [`Messenger`] implementation handles one messaging backend. The
//! [`forwarder`] drives every backend on a dedicated thread: it delivers
//! authorization prompts to the configured targets, polls for inbound
//! operator replies, matches them to outstanding requests, runs the
//! per-request timeout timers, and emits [`Authorization`] decisions over a
//! single stream back to the orchestrator.
//!
//! [`Authorization`]: conductor_types::Authorization
//! [`Messenger`]: messenger::Messenger

pub mod decision;
pub mod format;
pub mod forwarder;
pub mod messenger;

pub use decision::{match_decision, PendingForward};
pub use forwarder::{spawn_forwarder, ForwarderHandle};
pub use messenger::{ChannelError, InboundMessage, LogMessenger, Messenger, WebhookMessenger};
