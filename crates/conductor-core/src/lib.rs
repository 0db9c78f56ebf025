//! The Conductor orchestration core.
//!
//! Joins the interceptor, analyzer, forwarder, executor, and injector into
//! the closed authorization loop: worker output is analyzed, detected
//! requests are auto-decided or forwarded to the operator, approvals are
//! executed through the browser plane, and every branch ends with exactly
//! one stdin injection and one history record. The gateway RPC facade
//! exposes the same pending store to external UIs over a Unix socket, and
//! every step is appended to the audit log.

pub mod audit;
pub mod conductor;
pub mod engine;
pub mod gateway;
pub mod inject;
pub mod pending;
pub mod rules;

pub use audit::{AuditLog, AuditReader};
pub use conductor::Conductor;
pub use engine::{Engine, GatewayEvent};
pub use gateway::{spawn_gateway, GatewayCommand, GatewayHandle, RpcRequestParams};
pub use inject::StdinSink;
pub use pending::{PendingEntry, PendingSet, RequestOrigin};
pub use rules::{AutoDecision, AutoRules};
