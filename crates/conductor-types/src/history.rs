//! Injection and history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionResult;
use crate::auth::Authorization;
use crate::request::AccessRequest;

/// One formatted message written into the worker's stdin.
///
/// Every request produces exactly one of these, whether it was executed,
/// denied, or timed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Injection {
    pub request_id: Uuid,
    /// Whether the request ended in a successful execution.
    pub success: bool,
    /// The payload text written between the blank-line envelope writes.
    pub payload: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_results: Vec<ActionResult>,
    pub injected_at: DateTime<Utc>,
}

impl Injection {
    pub fn new(
        request_id: Uuid,
        success: bool,
        payload: impl Into<String>,
        action_results: Vec<ActionResult>,
    ) -> Self {
        Self {
            request_id,
            success,
            payload: payload.into(),
            action_results,
            injected_at: Utc::now(),
        }
    }
}

/// The completed record of one request's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub request: AccessRequest,
    /// Absent only on the auto-deny fast path, which resolves before any
    /// authorization object exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Authorization>,
    pub injection: Injection,
    pub completed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        request: AccessRequest,
        authorization: Option<Authorization>,
        injection: Injection,
    ) -> Self {
        Self {
            request,
            authorization,
            injection,
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestDraft, RequestKind};

    fn request() -> AccessRequest {
        AccessRequest::from_draft(
            RequestDraft {
                kind: RequestKind::Verification,
                summary: "Verify deployment".into(),
                raw_output: "check that the deploy is live".into(),
                url: None,
                service: None,
                data_needed: None,
                suggested_actions: vec![],
            },
            60_000,
        )
    }

    #[test]
    fn completed_at_follows_contained_timestamps() {
        let req = request();
        let auth = Authorization::approve(req.id, "tg:alice");
        let injection = Injection::new(req.id, true, "[Aether] done", vec![]);
        let entry = HistoryEntry::new(req.clone(), Some(auth), injection);

        assert!(entry.completed_at >= entry.request.created_at);
        assert!(entry.completed_at >= entry.injection.injected_at);
        assert!(entry.completed_at >= entry.authorization.as_ref().unwrap().resolved_at);
    }

    #[test]
    fn auto_deny_entry_has_no_authorization() {
        let req = request();
        let injection = Injection::new(req.id, false, "[Aether] denied", vec![]);
        let entry = HistoryEntry::new(req, None, injection);
        assert!(entry.authorization.is_none());

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("\"authorization\""));
    }

    #[test]
    fn history_json_roundtrip() {
        let req = request();
        let auth = Authorization::deny(req.id, "tg:bob");
        let injection = Injection::new(req.id, false, "[Aether] denied", vec![]);
        let entry = HistoryEntry::new(req, Some(auth), injection);
        let json = serde_json::to_string(&entry).unwrap();
        let back: HistoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
