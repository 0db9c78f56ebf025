//! Operator message formatting.
//!
//! The authorization prompt and result notification follow fixed templates;
//! operators (and any tooling they point at the channel) parse these, so
//! the layout is bit-exact and covered by tests.

use conductor_types::{AccessRequest, Injection};

/// Longest payload preview included in a result notification.
const PREVIEW_CHARS: usize = 200;

/// Format the authorization prompt sent to every configured target.
pub fn authorization_request(request: &AccessRequest, timeout_ms: u64) -> String {
    let mut msg = format!(
        "AETHER CONDUCTOR — Authorization Request [{}]\n\
         \n\
         Claude needs external access:\n\
         \x20 Kind: {}\n\
         \x20 Summary: {}\n",
        request.short_id(),
        request.kind,
        request.summary,
    );
    if let Some(url) = &request.url {
        msg.push_str(&format!("  URL: {url}\n"));
    }
    if let Some(service) = &request.service {
        msg.push_str(&format!("  Service: {service}\n"));
    }
    if let Some(data) = &request.data_needed {
        msg.push_str(&format!("  Data needed: {data}\n"));
    }
    msg.push_str(&format!(
        "\n\
         Reply \"YES\" to approve, \"NO\" to deny.\n\
         Reply \"YES <instructions>\" to approve with extra guidance.\n\
         Expires in {}s.",
        timeout_ms / 1000,
    ));
    msg
}

/// Format the informational outcome message sent after an injection.
pub fn result_notification(request: &AccessRequest, injection: &Injection) -> String {
    let verdict = if injection.success { "SUCCESS" } else { "FAILED" };
    format!(
        "AETHER CONDUCTOR — Result [{}] {verdict}\n\
         Request: {}\n\
         {}",
        request.short_id(),
        request.summary,
        preview(&injection.payload),
    )
}

/// The first [`PREVIEW_CHARS`] characters of a payload, with an ellipsis
/// when truncated.
fn preview(payload: &str) -> String {
    let mut chars = payload.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
