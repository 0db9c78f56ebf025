//! Remote-LLM request detection.
//!
//! Sends the cleaned fragment plus a fixed system prompt to a hosted model
//! (Gemini or OpenAI) that must answer with a single strict JSON object.
//! Every failure mode (missing key, HTTP error, malformed JSON) falls
//! through to the rule backend for the same input; remote errors never reach
//! the orchestrator.
//!
//! The rule analyzer is constructed once and held inside this type, which
//! keeps the fallback chain acyclic.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use conductor_types::{AnalyzerConfig, AnalyzerProvider, BrowserAction, RequestDraft, RequestKind};

use crate::rules::{suggested_actions, RuleAnalyzer};
use crate::{ansi, Analysis, Analyzer};

/// Inputs with fewer visible characters than this are never requests.
const MIN_VISIBLE_CHARS: usize = 20;

const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You watch terminal output from an autonomous coding agent. \
Decide whether the fragment contains a request for external network access \
(visiting a URL, fetching a credential, checking an API, operating a service \
dashboard, downloading a file, or verifying a deployment). Respond with ONE \
JSON object and nothing else, with keys: detected (bool), confidence (0..1), \
kind (one of url-visit, credential-fetch, api-check, service-action, \
file-download, verification, unknown), summary (short string), url (string or \
null), service (string or null), dataNeeded (string or null), \
suggestedActions (array drawn from navigate, screenshot, extract-text). \
Build logs, test output, and ordinary narration are not requests.";

/// The strict schema the model must answer with.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmVerdict {
    detected: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    data_needed: Option<String>,
    #[serde(default)]
    suggested_actions: Vec<String>,
}

/// Remote-LLM detector with embedded rule fallback.
pub struct LlmAnalyzer {
    provider: AnalyzerProvider,
    api_key: Option<String>,
    model: String,
    fallback: RuleAnalyzer,
}

impl LlmAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let (env_key, default_model) = match config.provider {
            AnalyzerProvider::Openai => ("OPENAI_API_KEY", OPENAI_DEFAULT_MODEL),
            _ => ("GEMINI_API_KEY", GEMINI_DEFAULT_MODEL),
        };
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(env_key).ok().filter(|k| !k.is_empty()));

        Self {
            provider: config.provider,
            api_key,
            model: config.model.clone().unwrap_or_else(|| default_model.into()),
            fallback: RuleAnalyzer::new(&config.patterns),
        }
    }

    fn call_remote(&self, clean: &str) -> Result<String, String> {
        let key = self.api_key.as_deref().ok_or("no API key configured")?;

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;

        match self.provider {
            AnalyzerProvider::Openai => self.call_openai(&client, key, clean),
            _ => self.call_gemini(&client, key, clean),
        }
    }

    fn call_gemini(
        &self,
        client: &reqwest::blocking::Client,
        key: &str,
        clean: &str,
    ) -> Result<String, String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={key}",
            self.model
        );
        let body = serde_json::json!({
            "contents": [{
                "parts": [{ "text": format!("{SYSTEM_PROMPT}\n\nFragment:\n{clean}") }]
            }],
            "generationConfig": { "responseMimeType": "application/json" },
        });

        let resp = client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| format!("gemini request failed: {e}"))?;

        let status = resp.status();
        let text = resp.text().map_err(|e| format!("failed to read response: {e}"))?;
        if !status.is_success() {
            return Err(format!("gemini API error {status}: {text}"));
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| format!("JSON parse error: {e}"))?;
        parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| format!("unexpected gemini response shape: {text}"))
    }

    fn call_openai(
        &self,
        client: &reqwest::blocking::Client,
        key: &str,
        clean: &str,
    ) -> Result<String, String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 512,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": clean },
            ],
        });

        let resp = client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {key}"))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| format!("openai request failed: {e}"))?;

        let status = resp.status();
        let text = resp.text().map_err(|e| format!("failed to read response: {e}"))?;
        if !status.is_success() {
            return Err(format!("openai API error {status}: {text}"));
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| format!("JSON parse error: {e}"))?;
        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| format!("unexpected openai response shape: {text}"))
    }
}

impl Analyzer for LlmAnalyzer {
    fn name(&self) -> &str {
        match self.provider {
            AnalyzerProvider::Openai => "openai",
            _ => "gemini",
        }
    }

    fn analyze(&self, text: &str) -> Analysis {
        let clean = ansi::strip_controls_str(text);
        if visible_chars(&clean) < MIN_VISIBLE_CHARS {
            return Analysis::none();
        }

        match self.call_remote(&clean) {
            Ok(reply) => match parse_verdict(&reply, text) {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(backend = self.name(), "unusable LLM verdict, using rules: {e}");
                    self.fallback.analyze(text)
                }
            },
            Err(e) => {
                debug!(backend = self.name(), "remote analyzer failed, using rules: {e}");
                self.fallback.analyze(text)
            }
        }
    }
}

/// Count characters that would be visible to an operator.
fn visible_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Parse the model's JSON reply into an [`Analysis`].
///
/// Tolerates a markdown code fence around the object. `raw` is the original
/// (unstripped) fragment, preserved on the draft.
fn parse_verdict(reply: &str, raw: &str) -> Result<Analysis, String> {
    let body = strip_code_fence(reply.trim());
    let verdict: LlmVerdict =
        serde_json::from_str(body).map_err(|e| format!("verdict JSON invalid: {e}"))?;

    if !verdict.detected {
        return Ok(Analysis::none());
    }

    let kind = verdict
        .kind
        .as_deref()
        .and_then(RequestKind::parse)
        .unwrap_or(RequestKind::Unknown);
    let url = verdict.url.filter(|u| !u.is_empty());

    let mut actions: Vec<BrowserAction> = Vec::new();
    for name in &verdict.suggested_actions {
        match (name.as_str(), &url) {
            ("navigate", Some(url)) => actions.push(BrowserAction::Navigate { url: url.clone() }),
            ("navigate", None) => {}
            ("screenshot", _) => actions.push(BrowserAction::Screenshot { selector: None }),
            ("extract-text" | "extract_text", _) => {
                actions.push(BrowserAction::ExtractText { selector: None })
            }
            _ => {}
        }
    }
    if actions.is_empty() {
        actions = suggested_actions(kind, url.as_deref());
    }

    let summary = verdict
        .summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| crate::rules::summarize(kind, url.as_deref(), verdict.service.as_deref()));

    Ok(Analysis::detected(
        verdict.confidence.clamp(0.0, 1.0),
        RequestDraft {
            kind,
            summary,
            raw_output: raw.to_string(),
            url,
            service: verdict.service.filter(|s| !s.is_empty()),
            data_needed: verdict.data_needed.filter(|d| !d.is_empty()),
            suggested_actions: actions,
        },
    ))
}

/// Remove a surrounding ```-fence if the model wrapped its JSON in one.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip an optional language tag on the fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => return text,
    };
    rest.rsplit_once("```").map(|(body, _)| body.trim()).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer_without_key() -> LlmAnalyzer {
        let mut config = AnalyzerConfig::default();
        config.api_key = Some(String::new()); // force the configured path
        let mut analyzer = LlmAnalyzer::new(&config);
        analyzer.api_key = None;
        analyzer
    }

    #[test]
    fn short_input_is_never_a_request() {
        let analyzer = analyzer_without_key();
        assert!(!analyzer.analyze("ok, done").detected);
        // ANSI framing does not count toward visibility.
        assert!(!analyzer.analyze("\x1b[1m\x1b[32mok\x1b[0m").detected);
    }

    #[test]
    fn missing_key_falls_back_to_rules() {
        let analyzer = analyzer_without_key();
        let analysis =
            analyzer.analyze("Please go to https://railway.app/dashboard to get the DB URL.");
        assert!(analysis.detected);
        let draft = analysis.request.unwrap();
        assert_eq!(draft.kind, RequestKind::UrlVisit);
        assert_eq!(draft.url.as_deref(), Some("https://railway.app/dashboard"));
    }

    #[test]
    fn parse_verdict_full_object() {
        let reply = r#"{
            "detected": true,
            "confidence": 0.93,
            "kind": "credential-fetch",
            "summary": "Fetch the Vercel API key",
            "url": "https://vercel.com/account/tokens",
            "service": "Vercel",
            "dataNeeded": "API_KEY",
            "suggestedActions": ["navigate", "extract-text"]
        }"#;
        let analysis = parse_verdict(reply, "raw fragment").unwrap();
        assert!(analysis.detected);
        assert!((analysis.confidence - 0.93).abs() < 1e-9);
        let draft = analysis.request.unwrap();
        assert_eq!(draft.kind, RequestKind::CredentialFetch);
        assert_eq!(draft.data_needed.as_deref(), Some("API_KEY"));
        assert_eq!(draft.raw_output, "raw fragment");
        assert_eq!(
            draft.suggested_actions,
            vec![
                BrowserAction::Navigate { url: "https://vercel.com/account/tokens".into() },
                BrowserAction::ExtractText { selector: None },
            ]
        );
    }

    #[test]
    fn parse_verdict_not_detected() {
        let analysis = parse_verdict(r#"{"detected": false}"#, "raw").unwrap();
        assert!(!analysis.detected);
        assert!(analysis.request.is_none());
    }

    #[test]
    fn parse_verdict_tolerates_code_fence() {
        let reply = "```json\n{\"detected\": true, \"confidence\": 0.8, \"kind\": \"url-visit\", \"url\": \"https://x.test\"}\n```";
        let analysis = parse_verdict(reply, "raw").unwrap();
        let draft = analysis.request.unwrap();
        assert_eq!(draft.kind, RequestKind::UrlVisit);
        // Summary synthesized from the kind and URL when absent.
        assert_eq!(draft.summary, "Visit https://x.test");
    }

    #[test]
    fn parse_verdict_rejects_non_json() {
        assert!(parse_verdict("I think this is a request.", "raw").is_err());
    }

    #[test]
    fn unknown_kind_and_actions_degrade_gracefully() {
        let reply = r#"{
            "detected": true,
            "confidence": 1.4,
            "kind": "teleport",
            "suggestedActions": ["dance"]
        }"#;
        let analysis = parse_verdict(reply, "raw").unwrap();
        assert_eq!(analysis.confidence, 1.0);
        let draft = analysis.request.unwrap();
        assert_eq!(draft.kind, RequestKind::Unknown);
        // Unmappable actions replaced by the kind's synthesized list.
        assert_eq!(
            draft.suggested_actions,
            vec![BrowserAction::Screenshot { selector: None }]
        );
    }

    #[test]
    fn confidence_clamped_low() {
        let reply = r#"{"detected": true, "confidence": -0.5, "kind": "unknown"}"#;
        let analysis = parse_verdict(reply, "raw").unwrap();
        assert_eq!(analysis.confidence, 0.0);
    }
}
