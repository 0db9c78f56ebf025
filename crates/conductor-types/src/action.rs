//! Browser action and per-step result types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One step the browser plane can perform on the worker's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BrowserAction {
    /// Navigate the page to a URL.
    Navigate { url: String },
    /// Capture a screenshot of the page, or of a single element.
    Screenshot {
        #[serde(skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
    /// Extract visible text from the page, or from a single element.
    ExtractText {
        #[serde(skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
    /// Click the element matching a selector.
    Click { selector: String },
    /// Type text into the element matching a selector.
    Type { selector: String, text: String },
    /// Pause between steps.
    Wait { ms: u64 },
    /// Navigate to a URL and extract text for each selector.
    Scrape { url: String, selectors: Vec<String> },
}

impl BrowserAction {
    /// The kebab-case tag name, used in injection payloads and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            BrowserAction::Navigate { .. } => "navigate",
            BrowserAction::Screenshot { .. } => "screenshot",
            BrowserAction::ExtractText { .. } => "extract-text",
            BrowserAction::Click { .. } => "click",
            BrowserAction::Type { .. } => "type",
            BrowserAction::Wait { .. } => "wait",
            BrowserAction::Scrape { .. } => "scrape",
        }
    }
}

/// The outcome of dispatching one [`BrowserAction`].
///
/// `success` is false exactly when `error` is set; the constructors below
/// maintain that pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action: BrowserAction,
    pub success: bool,
    /// Extracted text or other payload the action produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Where a captured screenshot was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    /// A successful result with no payload.
    pub fn ok(action: BrowserAction) -> Self {
        Self {
            action,
            success: true,
            data: None,
            screenshot_path: None,
            error: None,
        }
    }

    /// A successful result carrying extracted data.
    pub fn ok_with_data(action: BrowserAction, data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::ok(action)
        }
    }

    /// A successful result carrying a screenshot path.
    pub fn ok_with_screenshot(action: BrowserAction, path: PathBuf) -> Self {
        Self {
            screenshot_path: Some(path),
            ..Self::ok(action)
        }
    }

    /// A failed result with the error message.
    pub fn failed(action: BrowserAction, error: impl Into<String>) -> Self {
        Self {
            action,
            success: false,
            data: None,
            screenshot_path: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_tags() {
        assert_eq!(
            BrowserAction::Navigate { url: "https://x.test".into() }.tag(),
            "navigate"
        );
        assert_eq!(BrowserAction::ExtractText { selector: None }.tag(), "extract-text");
        assert_eq!(BrowserAction::Wait { ms: 250 }.tag(), "wait");
    }

    #[test]
    fn action_json_roundtrip() {
        let actions = vec![
            BrowserAction::Navigate { url: "https://x.test".into() },
            BrowserAction::Screenshot { selector: Some("#main".into()) },
            BrowserAction::ExtractText { selector: None },
            BrowserAction::Click { selector: ".submit".into() },
            BrowserAction::Type { selector: "#q".into(), text: "hello".into() },
            BrowserAction::Wait { ms: 100 },
            BrowserAction::Scrape {
                url: "https://x.test".into(),
                selectors: vec!["h1".into(), ".price".into()],
            },
        ];
        for action in actions {
            let json = serde_json::to_string(&action).unwrap();
            let back: BrowserAction = serde_json::from_str(&json).unwrap();
            assert_eq!(back, action);
        }
    }

    #[test]
    fn tagged_serialization_shape() {
        let json = serde_json::to_string(&BrowserAction::Navigate {
            url: "https://x.test".into(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"navigate\""));
    }

    #[test]
    fn success_iff_no_error() {
        let ok = ActionResult::ok_with_data(
            BrowserAction::ExtractText { selector: None },
            "page text",
        );
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ActionResult::failed(
            BrowserAction::Navigate { url: "https://x.test".into() },
            "net::ERR_NAME_NOT_RESOLVED",
        );
        assert!(!failed.success);
        assert!(failed.error.is_some());
    }
}
