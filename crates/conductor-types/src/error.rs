//! Error types shared across all Conductor crates.

use uuid::Uuid;

/// Errors that can occur across the Conductor runtime.
///
/// Each variant corresponds to a different failure class: startup
/// configuration, child process lifecycle, stdin injection, delivery to
/// operator targets, authorization timeout, browser step execution, or
/// gateway request lookup.
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// Configuration loading or validation failure at startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The wrapped worker process could not be spawned. Fatal.
    #[error("failed to spawn wrapped command: {0}")]
    ChildSpawnFailed(String),

    /// The worker's stdin was closed or not writable during an injection.
    #[error("worker stdin not writable: {0}")]
    StdinUnwritable(String),

    /// A message could not be delivered to an operator target.
    #[error("forward delivery failed: {0}")]
    ForwardDeliveryFailed(String),

    /// An authorization wait expired without an operator decision.
    #[error("authorization timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A browser action failed during execution.
    #[error("browser step failed: {0}")]
    BrowserStepFailed(String),

    /// A gateway resolve named a request id that is not pending.
    #[error("unknown request id: {0}")]
    UnknownRequestId(Uuid),

    /// Interceptor I/O failure (pipe reads, poll, signals).
    #[error("interceptor error: {0}")]
    Intercept(String),

    /// Audit sink open or append failure.
    #[error("audit log error: {0}")]
    Audit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            ConductorError::ConfigInvalid("missing field".into()).to_string(),
            "invalid configuration: missing field"
        );
        assert_eq!(
            ConductorError::ChildSpawnFailed("no such file".into()).to_string(),
            "failed to spawn wrapped command: no such file"
        );
        assert_eq!(
            ConductorError::StdinUnwritable("broken pipe".into()).to_string(),
            "worker stdin not writable: broken pipe"
        );
        assert_eq!(
            ConductorError::Timeout { timeout_ms: 120_000 }.to_string(),
            "authorization timed out after 120000ms"
        );
    }

    #[test]
    fn unknown_request_id_carries_id() {
        let id = Uuid::new_v4();
        let err = ConductorError::UnknownRequestId(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
