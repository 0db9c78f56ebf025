//! Action-list composition and sequenced execution.
//!
//! Composition is pure: the request's suggested actions (or a synthesized
//! navigate + extract pair), reduced by operator instructions, with a
//! trailing screenshot appended under the capture policy. Execution runs
//! the list in order against the plane with a per-action timeout; a failed
//! navigate short-circuits the remainder, any other failure is recorded and
//! execution continues.

use std::time::Duration;

use tracing::{debug, warn};

use conductor_types::{AccessRequest, ActionResult, Authorization, BrowserAction, BrowserConfig};

use crate::plane::{BrowserError, BrowserPlane};

/// Build the ordered action list for an approved request.
pub fn compose_actions(
    request: &AccessRequest,
    authorization: &Authorization,
    capture_screenshots: bool,
) -> Vec<BrowserAction> {
    let mut actions = if !request.suggested_actions.is_empty() {
        request.suggested_actions.clone()
    } else if let Some(url) = &request.url {
        vec![
            BrowserAction::Navigate { url: url.clone() },
            BrowserAction::ExtractText { selector: None },
        ]
    } else {
        Vec::new()
    };

    if let Some(instructions) = &authorization.instructions {
        let lower = instructions.to_lowercase();
        if lower.contains("only screenshot") || lower.contains("just screenshot") {
            actions = reduced(request, BrowserAction::Screenshot { selector: None });
        } else if lower.contains("only fetch") || lower.contains("just fetch") {
            actions = reduced(request, BrowserAction::ExtractText { selector: None });
        }
    }

    if capture_screenshots
        && !actions.is_empty()
        && !actions
            .iter()
            .any(|a| matches!(a, BrowserAction::Screenshot { .. }))
    {
        actions.push(BrowserAction::Screenshot { selector: None });
    }

    actions
}

/// `[navigate(url)?, <action>]`: the shape both instruction reductions
/// collapse to.
fn reduced(request: &AccessRequest, action: BrowserAction) -> Vec<BrowserAction> {
    let mut actions = Vec::with_capacity(2);
    if let Some(url) = &request.url {
        actions.push(BrowserAction::Navigate { url: url.clone() });
    }
    actions.push(action);
    actions
}

/// Run an action list in order against the plane.
///
/// Before the first action the profile is checked and started if needed;
/// start failures are tolerated (each action then reports its own error).
/// Results are returned for every attempted step; steps skipped after a
/// failed navigate produce none.
pub async fn run_actions(
    plane: &dyn BrowserPlane,
    config: &BrowserConfig,
    actions: &[BrowserAction],
) -> Vec<ActionResult> {
    ensure_profile(plane, config).await;

    let timeout = Duration::from_millis(config.action_timeout_ms);
    let mut results = Vec::with_capacity(actions.len());

    for action in actions {
        let result = run_one(plane, action, timeout).await;
        let failed_navigate =
            !result.success && matches!(action, BrowserAction::Navigate { .. });
        results.push(result);
        if failed_navigate {
            debug!("navigate failed, skipping remaining actions");
            break;
        }
    }

    results
}

async fn run_one(
    plane: &dyn BrowserPlane,
    action: &BrowserAction,
    timeout: Duration,
) -> ActionResult {
    let outcome = tokio::time::timeout(timeout, plane.dispatch(action)).await;
    match outcome {
        Ok(Ok(output)) => {
            let mut result = ActionResult::ok(action.clone());
            result.data = output.data;
            result.screenshot_path = output.screenshot_path;
            result
        }
        Ok(Err(e)) => ActionResult::failed(action.clone(), e.to_string()),
        Err(_) => ActionResult::failed(
            action.clone(),
            BrowserError::Timeout {
                action: action.tag().into(),
                duration: timeout,
            }
            .to_string(),
        ),
    }
}

/// Make sure the browser profile is up before executing. Best-effort: a
/// transient start failure is logged and execution proceeds, letting the
/// individual actions surface the real error.
async fn ensure_profile(plane: &dyn BrowserPlane, config: &BrowserConfig) {
    let running = match plane.status().await {
        Ok(status) => status.running,
        Err(e) => {
            warn!("browser status query failed: {e}");
            false
        }
    };
    if !running {
        if let Err(e) = plane.start(&config.profile, config.headless).await {
            warn!(profile = %config.profile, "browser start failed: {e}");
        }
    }
}
