//! Worker process interception.
//!
//! Spawns the wrapped coding agent with piped standard streams so every
//! byte of its output can be mirrored to the host terminal and buffered for
//! analysis, and so answers can be injected into its stdin as if typed by
//! the operator.

pub mod buffer;
pub mod child;
pub mod interceptor;

pub use buffer::FlushBuffer;
pub use child::{ChildProcess, ReadStatus, StdinHandle};
pub use interceptor::{InterceptEvent, Interceptor, SessionStats};
