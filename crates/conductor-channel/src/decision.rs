//! Inbound operator reply matching.
//!
//! Operators answer prompts in free text. A reply resolves a request when
//! it quotes the request's short id, or when exactly one request is
//! outstanding and the reply is a recognizable yes/no. The default reading
//! of an ambiguous reply is deny.

use std::time::Instant;

use uuid::Uuid;

use conductor_types::Authorization;

/// Timer bookkeeping for one forwarded request.
///
/// This is not a second pending store: the orchestrator's pending map stays
/// authoritative, and entries here exist only so the forwarder can match
/// inbound text and fire timeouts.
#[derive(Debug, Clone)]
pub struct PendingForward {
    pub id: Uuid,
    /// Lowercased first 8 characters of the id.
    pub short_id: String,
    pub deadline: Instant,
}

impl PendingForward {
    pub fn new(id: Uuid, deadline: Instant) -> Self {
        Self {
            id,
            short_id: id.to_string().chars().take(8).collect(),
            deadline,
        }
    }
}

/// Match one inbound operator message against the outstanding forwards.
///
/// Returns the authorization to emit, or `None` when the message resolves
/// nothing. At most one request is resolved per message: the first whose
/// short id appears in the text, or the sole outstanding request when the
/// text is a plain approval or denial.
pub fn match_decision(
    text: &str,
    channel: &str,
    from: &str,
    pending: &[PendingForward],
) -> Option<Authorization> {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    let is_approval = matches!(lower.as_str(), "yes" | "approve" | "go" | "y")
        || lower.starts_with("yes ")
        || lower.starts_with("approve ");
    let is_denial =
        matches!(lower.as_str(), "no" | "deny" | "n") || lower.starts_with("no ");

    let matched = pending.iter().find(|p| lower.contains(&p.short_id));
    let target = match matched {
        Some(p) => p,
        None if pending.len() == 1 && (is_approval || is_denial) => &pending[0],
        None => return None,
    };

    let resolved_by = format!("{channel}:{from}");

    if let Some(instructions) = strip_approval_prefix(trimmed) {
        return Some(Authorization::approve_with_instructions(
            target.id,
            instructions,
            resolved_by,
        ));
    }
    if is_approval || (matched.is_some() && !is_denial) {
        return Some(Authorization::approve(target.id, resolved_by));
    }
    Some(Authorization::deny(target.id, resolved_by))
}

/// If the message starts with `yes ` or `approve `, return the remainder.
fn strip_approval_prefix(text: &str) -> Option<&str> {
    let lower = text.to_lowercase();
    for prefix in ["yes ", "approve "] {
        if lower.starts_with(prefix) {
            return Some(text[prefix.len()..].trim());
        }
    }
    None
}
