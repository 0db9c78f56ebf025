//! Access request types produced by the analyzer and tracked by the
//! orchestrator.
//!
//! A [`RequestDraft`] is what a detector extracts from worker output; the
//! orchestrator promotes it to an [`AccessRequest`] by assigning an id and
//! the created/expires timestamps.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::BrowserAction;
use crate::error::ConductorError;

/// The category of external access the worker is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    /// Visit a URL and report what is there.
    UrlVisit,
    /// Retrieve a credential (API key, token, connection string).
    CredentialFetch,
    /// Check an API endpoint or status page.
    ApiCheck,
    /// Operate a service dashboard or console.
    ServiceAction,
    /// Download a file.
    FileDownload,
    /// Verify a deployment is live.
    Verification,
    /// Recognized as an external-access request without a clearer category.
    Unknown,
}

impl RequestKind {
    /// Parse a kebab-case wire name.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "url-visit" => RequestKind::UrlVisit,
            "credential-fetch" => RequestKind::CredentialFetch,
            "api-check" => RequestKind::ApiCheck,
            "service-action" => RequestKind::ServiceAction,
            "file-download" => RequestKind::FileDownload,
            "verification" => RequestKind::Verification,
            "unknown" => RequestKind::Unknown,
            _ => return None,
        })
    }

    /// The kebab-case wire name, as used in operator messages and audit
    /// records.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::UrlVisit => "url-visit",
            RequestKind::CredentialFetch => "credential-fetch",
            RequestKind::ApiCheck => "api-check",
            RequestKind::ServiceAction => "service-action",
            RequestKind::FileDownload => "file-download",
            RequestKind::Verification => "verification",
            RequestKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a detector extracted from a fragment of worker output, before the
/// orchestrator has assigned identity and lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDraft {
    pub kind: RequestKind,
    /// Short human-readable statement of what the worker wants.
    pub summary: String,
    /// The raw output fragment the request was detected in.
    pub raw_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_needed: Option<String>,
    /// Actions the detector suggests the executor run, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<BrowserAction>,
}

/// A tracked external-access request awaiting resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    /// Unique per-process request id.
    pub id: Uuid,
    pub kind: RequestKind,
    pub summary: String,
    pub raw_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_needed: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<BrowserAction>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Opaque key identifying the originating worker session, when the
    /// embedding caller tracks more than one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl AccessRequest {
    /// Promote a draft to a tracked request with a fresh id and a lifetime
    /// of `timeout_ms` from now.
    pub fn from_draft(draft: RequestDraft, timeout_ms: u64) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: draft.kind,
            summary: draft.summary,
            raw_output: draft.raw_output,
            url: draft.url,
            service: draft.service,
            data_needed: draft.data_needed,
            suggested_actions: draft.suggested_actions,
            created_at,
            expires_at: created_at + Duration::milliseconds(timeout_ms as i64),
            session: None,
        }
    }

    /// The first 8 characters of the id, used in operator-facing messages
    /// and inbound reply matching.
    pub fn short_id(&self) -> String {
        self.id.to_string().chars().take(8).collect()
    }

    /// Check the structural invariants: the expiry must be after creation,
    /// and `url`, when present, must be syntactically a URL.
    pub fn validate(&self) -> Result<(), ConductorError> {
        if self.expires_at <= self.created_at {
            return Err(ConductorError::ConfigInvalid(format!(
                "request {} expires at or before creation",
                self.id
            )));
        }
        if let Some(url) = &self.url {
            url::Url::parse(url).map_err(|e| {
                ConductorError::ConfigInvalid(format!("request {} has a malformed url: {e}", self.id))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> RequestDraft {
        RequestDraft {
            kind: RequestKind::UrlVisit,
            summary: "Visit https://example.com".into(),
            raw_output: "go to https://example.com".into(),
            url: Some("https://example.com".into()),
            service: None,
            data_needed: None,
            suggested_actions: vec![BrowserAction::Navigate {
                url: "https://example.com".into(),
            }],
        }
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(RequestKind::UrlVisit.as_str(), "url-visit");
        assert_eq!(RequestKind::CredentialFetch.as_str(), "credential-fetch");
        assert_eq!(RequestKind::Unknown.as_str(), "unknown");
        let json = serde_json::to_string(&RequestKind::ServiceAction).unwrap();
        assert_eq!(json, "\"service-action\"");
    }

    #[test]
    fn from_draft_sets_lifetime() {
        let req = AccessRequest::from_draft(draft(), 120_000);
        assert!(req.expires_at > req.created_at);
        assert_eq!(
            (req.expires_at - req.created_at).num_milliseconds(),
            120_000
        );
        req.validate().expect("fresh request should validate");
    }

    #[test]
    fn short_id_is_first_eight_chars() {
        let req = AccessRequest::from_draft(draft(), 1000);
        let short = req.short_id();
        assert_eq!(short.len(), 8);
        assert!(req.id.to_string().starts_with(&short));
    }

    #[test]
    fn ids_are_unique() {
        let a = AccessRequest::from_draft(draft(), 1000);
        let b = AccessRequest::from_draft(draft(), 1000);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn validate_rejects_malformed_url() {
        let mut req = AccessRequest::from_draft(draft(), 1000);
        req.url = Some("not a url".into());
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_json_roundtrip() {
        let req = AccessRequest::from_draft(draft(), 5000);
        let json = serde_json::to_string(&req).unwrap();
        let back: AccessRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }
}
