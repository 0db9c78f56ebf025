//! The browser plane boundary.
//!
//! The Conductor does not drive a browser itself; an external automation
//! engine implements [`BrowserPlane`] and is handed in at startup. The
//! plane is profile-scoped: `status`/`start` manage the profile's
//! availability, `dispatch` performs one action in it.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use conductor_types::BrowserAction;

/// Errors that can occur during browser operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The plane has no automation engine behind it.
    #[error("no browser plane configured")]
    Unavailable,

    /// The browser profile could not be started.
    #[error("failed to start browser profile '{profile}': {reason}")]
    StartFailed { profile: String, reason: String },

    /// An action did not complete within the per-action timeout.
    #[error("action '{action}' timed out after {duration:?}")]
    Timeout { action: String, duration: Duration },

    /// Navigation failed (DNS, TLS, HTTP-level).
    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },

    /// The requested element was not found.
    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    /// A protocol-level error from the automation engine.
    #[error("browser protocol error: {detail}")]
    Protocol { detail: String },
}

/// Whether the plane's browser profile is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneStatus {
    pub running: bool,
}

/// What one dispatched action produced.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Extracted text, confirmation string, or other payload.
    pub data: Option<String>,
    /// Path a screenshot was written to.
    pub screenshot_path: Option<PathBuf>,
}

/// The browser automation boundary.
#[async_trait]
pub trait BrowserPlane: Send {
    /// Query whether the profile is available.
    async fn status(&self) -> Result<PlaneStatus, BrowserError>;

    /// Start the profile. Idempotent when already running.
    async fn start(&self, profile: &str, headless: bool) -> Result<(), BrowserError>;

    /// Perform one action.
    async fn dispatch(&self, action: &BrowserAction) -> Result<StepOutput, BrowserError>;
}

/// The stub plane used when no automation engine was supplied.
///
/// Reports itself as running so executions proceed, then fails every
/// dispatch; the failures surface as per-step errors in the injection
/// rather than aborting the loop.
#[derive(Default)]
pub struct NullPlane;

#[async_trait]
impl BrowserPlane for NullPlane {
    async fn status(&self) -> Result<PlaneStatus, BrowserError> {
        Ok(PlaneStatus { running: true })
    }

    async fn start(&self, _profile: &str, _headless: bool) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn dispatch(&self, _action: &BrowserAction) -> Result<StepOutput, BrowserError> {
        Err(BrowserError::Unavailable)
    }
}
