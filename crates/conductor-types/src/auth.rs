//! Authorization decisions made on access requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The operator's (or a rule's, or the timer's) verdict on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Approve,
    Deny,
    /// Approved with extra guidance for the executor.
    ApproveWithInstructions,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Deny => "deny",
            Decision::ApproveWithInstructions => "approve-with-instructions",
        }
    }

    /// Whether this decision permits execution.
    pub fn is_approval(&self) -> bool {
        matches!(self, Decision::Approve | Decision::ApproveWithInstructions)
    }

    /// Parse a wire name back into a decision.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Decision::Approve),
            "deny" => Some(Decision::Deny),
            "approve-with-instructions" => Some(Decision::ApproveWithInstructions),
            _ => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolution for one access request.
///
/// `decision` is `ApproveWithInstructions` exactly when `instructions` is a
/// non-empty string; the constructors maintain that pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub request_id: Uuid,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Who resolved it: `"<channel>:<from>"`, `"rpc:conn-<n>"`, `"timeout"`,
    /// `"auto-approve"`, or `"auto-deny"`.
    pub resolved_by: String,
    pub resolved_at: DateTime<Utc>,
}

impl Authorization {
    /// A plain approval.
    pub fn approve(request_id: Uuid, resolved_by: impl Into<String>) -> Self {
        Self {
            request_id,
            decision: Decision::Approve,
            instructions: None,
            resolved_by: resolved_by.into(),
            resolved_at: Utc::now(),
        }
    }

    /// A denial.
    pub fn deny(request_id: Uuid, resolved_by: impl Into<String>) -> Self {
        Self {
            request_id,
            decision: Decision::Deny,
            instructions: None,
            resolved_by: resolved_by.into(),
            resolved_at: Utc::now(),
        }
    }

    /// An approval with extra guidance. Falls back to a plain approval when
    /// the instruction text trims to nothing.
    pub fn approve_with_instructions(
        request_id: Uuid,
        instructions: impl Into<String>,
        resolved_by: impl Into<String>,
    ) -> Self {
        let instructions = instructions.into();
        let trimmed = instructions.trim();
        if trimmed.is_empty() {
            return Self::approve(request_id, resolved_by);
        }
        Self {
            request_id,
            decision: Decision::ApproveWithInstructions,
            instructions: Some(trimmed.to_string()),
            resolved_by: resolved_by.into(),
            resolved_at: Utc::now(),
        }
    }

    /// The timeout denial emitted when no decision arrived in time.
    pub fn timeout(request_id: Uuid) -> Self {
        Self::deny(request_id, "timeout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_wire_names() {
        assert_eq!(Decision::Approve.as_str(), "approve");
        assert_eq!(
            Decision::ApproveWithInstructions.as_str(),
            "approve-with-instructions"
        );
        assert_eq!(Decision::parse("deny"), Some(Decision::Deny));
        assert_eq!(Decision::parse("maybe"), None);
    }

    #[test]
    fn approvals_permit_execution() {
        assert!(Decision::Approve.is_approval());
        assert!(Decision::ApproveWithInstructions.is_approval());
        assert!(!Decision::Deny.is_approval());
    }

    #[test]
    fn instructions_imply_decision_variant() {
        let id = Uuid::new_v4();
        let auth = Authorization::approve_with_instructions(id, "only screenshot", "tg:alice");
        assert_eq!(auth.decision, Decision::ApproveWithInstructions);
        assert_eq!(auth.instructions.as_deref(), Some("only screenshot"));
    }

    #[test]
    fn empty_instructions_downgrade_to_plain_approve() {
        let id = Uuid::new_v4();
        let auth = Authorization::approve_with_instructions(id, "   ", "tg:alice");
        assert_eq!(auth.decision, Decision::Approve);
        assert!(auth.instructions.is_none());
    }

    #[test]
    fn timeout_is_a_denial() {
        let id = Uuid::new_v4();
        let auth = Authorization::timeout(id);
        assert_eq!(auth.decision, Decision::Deny);
        assert_eq!(auth.resolved_by, "timeout");
    }

    #[test]
    fn authorization_json_roundtrip() {
        let auth = Authorization::approve(Uuid::new_v4(), "rpc:conn-1");
        let json = serde_json::to_string(&auth).unwrap();
        let back: Authorization = serde_json::from_str(&json).unwrap();
        assert_eq!(back, auth);
    }
}
