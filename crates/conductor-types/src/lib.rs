//! Core types shared across all Conductor crates.
//!
//! Defines access requests, authorizations, browser actions, injections,
//! history entries, configuration, and error types used by the interceptor,
//! analyzer, forwarder, executor, orchestrator, and CLI.

pub mod action;
pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod request;

pub use action::{ActionResult, BrowserAction};
pub use auth::{Authorization, Decision};
pub use config::{
    AnalyzerConfig, AnalyzerProvider, AuthConfig, AuthTarget, BrowserConfig, ConductorConfig,
    CONFIG_FILENAME,
};
pub use error::ConductorError;
pub use history::{HistoryEntry, Injection};
pub use request::{AccessRequest, RequestDraft, RequestKind};
