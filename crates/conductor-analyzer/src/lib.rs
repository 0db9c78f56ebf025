//! External-access request detection.
//!
//! An [`Analyzer`] classifies a fragment of worker terminal output and emits
//! at most one structured [`RequestDraft`] with a confidence score. Two
//! backends are provided: [`RuleAnalyzer`](rules::RuleAnalyzer), a
//! deterministic regex classifier that is always available, and
//! [`LlmAnalyzer`](llm::LlmAnalyzer), a remote-LLM classifier that falls
//! back to the rules on any failure.
//!
//! The confidence threshold is applied by the orchestrator, not here.

pub mod ansi;
pub mod llm;
pub mod rules;

use conductor_types::{AnalyzerConfig, AnalyzerProvider, RequestDraft};

/// The outcome of analyzing one text fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub detected: bool,
    /// Confidence in [0, 1]. Zero when nothing was detected.
    pub confidence: f64,
    pub request: Option<RequestDraft>,
}

impl Analysis {
    /// The "nothing here" outcome.
    pub fn none() -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            request: None,
        }
    }

    pub fn detected(confidence: f64, request: RequestDraft) -> Self {
        Self {
            detected: true,
            confidence,
            request: Some(request),
        }
    }
}

/// A stateless classifier over worker output fragments.
///
/// Implementations may perform network I/O but hold no session state;
/// calling `analyze` twice with the same input is always safe.
pub trait Analyzer: Send {
    /// Human-readable backend name (for logs and the status surface).
    fn name(&self) -> &str;

    /// Classify a text fragment.
    fn analyze(&self, text: &str) -> Analysis;
}

/// Construct the analyzer backend selected by the configuration.
///
/// `regex`, `local`, and any unrecognized provider select the rule backend;
/// the remote backends embed their own rule fallback.
pub fn build_analyzer(config: &AnalyzerConfig) -> Box<dyn Analyzer> {
    match config.provider {
        AnalyzerProvider::Regex | AnalyzerProvider::Local => {
            Box::new(rules::RuleAnalyzer::new(&config.patterns))
        }
        AnalyzerProvider::Gemini | AnalyzerProvider::Openai => {
            Box::new(llm::LlmAnalyzer::new(config))
        }
    }
}
