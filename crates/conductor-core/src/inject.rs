//! Result injection: payload formatting and the three-write envelope.
//!
//! Whatever happened to a request (execution, denial, or timeout), the
//! worker receives exactly one payload, delivered as three stdin writes: a
//! blank line, the payload, a blank line. The blank lines make the payload
//! read as a fresh operator message regardless of what the worker had on
//! its input line.

use conductor_types::{AccessRequest, ActionResult, BrowserAction, ConductorError};

/// Where injected bytes go. Production wires this to the interceptor's
/// stdin entry point; tests substitute a recorder to compare exact bytes.
pub trait StdinSink {
    fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), ConductorError>;
}

impl StdinSink for conductor_intercept::Interceptor {
    fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), ConductorError> {
        self.inject(bytes)
    }
}

/// Deliver one payload through the three-write envelope.
pub fn deliver(sink: &mut dyn StdinSink, payload: &str) -> Result<(), ConductorError> {
    sink.write_chunk(b"\n")?;
    sink.write_chunk(format!("{payload}\n").as_bytes())?;
    sink.write_chunk(b"\n")
}

/// The payload for a denial.
pub fn denial_payload(request: &AccessRequest, reason: &str) -> String {
    format!(
        "[Aether] Request denied: {} — {reason}. Proceeding without external access.",
        request.summary
    )
}

/// The payload for an authorization that expired.
pub fn timeout_payload(request: &AccessRequest) -> String {
    format!(
        "[Aether] Authorization timed out for: {}. Proceeding without external access.",
        request.summary
    )
}

/// The payload for an executed request.
///
/// Header, then a tag-appropriate line per successful action; when every
/// action failed, the failures are listed instead. Partially failed runs
/// get a trailing failures section.
pub fn result_payload(request: &AccessRequest, results: &[ActionResult]) -> String {
    let mut payload = format!("[Aether] External access result for: {}", request.summary);

    if results.is_empty() {
        payload.push_str("\nNo actions were executed.");
        return payload;
    }

    let (succeeded, failed): (Vec<&ActionResult>, Vec<&ActionResult>) =
        results.iter().partition(|r| r.success);

    if succeeded.is_empty() {
        payload.push_str("\nAll actions failed:");
        for result in &failed {
            payload.push_str(&format!(
                "\n  - {}: {}",
                result.action.tag(),
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
        return payload;
    }

    for result in &succeeded {
        payload.push('\n');
        payload.push_str(&success_line(result));
    }

    if !failed.is_empty() {
        payload.push_str("\nFailed actions:");
        for result in &failed {
            payload.push_str(&format!(
                "\n  - {}: {}",
                result.action.tag(),
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    payload
}

fn success_line(result: &ActionResult) -> String {
    match &result.action {
        BrowserAction::Navigate { url } => format!("Navigated to {url}"),
        BrowserAction::Screenshot { .. } => match &result.screenshot_path {
            Some(path) => format!("Screenshot saved: {}", path.display()),
            None => "Screenshot captured".into(),
        },
        BrowserAction::ExtractText { .. } => match &result.data {
            Some(data) => format!("Extracted text:\n{data}"),
            None => "Extracted text: (empty)".into(),
        },
        BrowserAction::Click { selector } => format!("Clicked {selector}"),
        BrowserAction::Type { selector, .. } => format!("Typed into {selector}"),
        BrowserAction::Wait { ms } => format!("Waited {ms}ms"),
        BrowserAction::Scrape { url, .. } => match &result.data {
            Some(data) => format!("Scraped {url}:\n{data}"),
            None => format!("Scraped {url}"),
        },
    }
}
