//! Rule-based request detection.
//!
//! An ordered table of (regex, kind) pairs, one per canonical request kind,
//! evaluated first-match-wins over control-stripped text. Matches extract a
//! URL, a known service name, and the data the worker said it needs, then
//! synthesize a suggested browser-action list. Every rule match reports the
//! same fixed confidence; the orchestrator applies the threshold.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use conductor_types::{BrowserAction, RequestDraft, RequestKind};

use crate::{ansi, Analysis, Analyzer};

/// Confidence reported for every rule match.
pub const RULE_CONFIDENCE: f64 = 0.8;

/// Services recognized during extraction, in canonical capitalization.
pub const KNOWN_SERVICES: &[&str] = &[
    "Railway",
    "Vercel",
    "Netlify",
    "Supabase",
    "Firebase",
    "AWS",
    "GCP",
    "Azure",
    "Heroku",
    "Render",
    "Fly",
    "GitHub",
    "GitLab",
    "Bitbucket",
    "Cloudflare",
    "DigitalOcean",
    "MongoDB",
    "Redis",
    "PostgreSQL",
    "MySQL",
    "Stripe",
    "Twilio",
    "SendGrid",
    "Auth0",
    "Okta",
];

/// Environment-variable names that identify the data a worker is after.
const KNOWN_ENV_VARS: &[&str] = &[
    "API_KEY",
    "SECRET_KEY",
    "DATABASE_URL",
    "DB_URL",
    "ACCESS_TOKEN",
    "AUTH_TOKEN",
    "CLIENT_ID",
    "CLIENT_SECRET",
    "CONNECTION_STRING",
    "PRIVATE_KEY",
];

/// The canonical ordered rule table: one pattern per kind, first match wins.
const RULE_TABLE: &[(&str, RequestKind)] = &[
    (
        r"\b(?:go to|visit|navigate to|open|browse to|check)\s+https?://",
        RequestKind::UrlVisit,
    ),
    (
        r"\b(?:need|get|fetch|retrieve|grab|looking for)\b.{0,60}?\b(?:api[ _-]?key|credentials?|secrets?|tokens?|passwords?|connection string)",
        RequestKind::CredentialFetch,
    ),
    (
        r"\b(?:check|verify|test|call|hit)\b.{0,60}?\b(?:api\b|endpoint|status page|health check)",
        RequestKind::ApiCheck,
    ),
    (
        r"\b(?:verify|confirm|make sure|check)\b.{0,80}?\b(?:deploy(?:ment|ed)?\b|is live|is up|in production)",
        RequestKind::Verification,
    ),
    (
        r"\b(?:download|pull down|fetch)\b.{0,60}?\b(?:file|archive|zip|tarball|binary|installer|release)",
        RequestKind::FileDownload,
    ),
    (
        r"\b(?:open|log ?in to|sign ?in to|go to|configure|set up)\b.{0,60}?\b(?:dashboard|console|portal|settings page|admin panel)",
        RequestKind::ServiceAction,
    ),
    (
        r"\b(?:need|require)s?\b.{0,40}?\b(?:external|web|browser|internet)\s+access\b",
        RequestKind::Unknown,
    ),
];

/// Deterministic regex-based detector. Always available; also serves as the
/// fallback for every remote backend.
pub struct RuleAnalyzer {
    rules: Vec<(Regex, RequestKind)>,
    url: Regex,
    service: Regex,
    env_var: Regex,
    noun_phrase: Regex,
}

impl RuleAnalyzer {
    /// Build the detector. `extra_patterns` come from configuration and are
    /// all mapped to the `unknown` kind, evaluated after the built-in table.
    /// Invalid extra patterns are skipped with a log line.
    pub fn new(extra_patterns: &[String]) -> Self {
        let mut rules: Vec<(Regex, RequestKind)> = RULE_TABLE
            .iter()
            .map(|(pattern, kind)| (case_insensitive(pattern), *kind))
            .collect();
        for pattern in extra_patterns {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => rules.push((re, RequestKind::Unknown)),
                Err(e) => debug!(pattern, "skipping invalid analyzer pattern: {e}"),
            }
        }

        let service_alternation = KNOWN_SERVICES
            .iter()
            .map(|s| regex::escape(&s.to_lowercase()))
            .collect::<Vec<_>>()
            .join("|");
        let env_alternation = KNOWN_ENV_VARS.join("|");

        Self {
            rules,
            url: Regex::new(r#"https?://[^\s<>"'\)\]]+"#).expect("url pattern"),
            service: case_insensitive(&format!(r"\b(?:{service_alternation})\b")),
            env_var: Regex::new(&format!(r"\b(?:{env_alternation})\b")).expect("env-var pattern"),
            noun_phrase: case_insensitive(
                r"\b(?:need|looking for|want)\b\s+(?:the\s+|an?\s+)?([A-Za-z0-9_-]+(?:\s+[A-Za-z0-9_-]+){0,4})",
            ),
        }
    }

    /// First URL in the text, trimmed of trailing punctuation.
    pub fn extract_url(&self, text: &str) -> Option<String> {
        self.url.find(text).map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?'])
                .to_string()
        })
    }

    /// First known service named in the text, in canonical capitalization.
    pub fn extract_service(&self, text: &str) -> Option<String> {
        let found = self.service.find(text)?.as_str().to_lowercase();
        KNOWN_SERVICES
            .iter()
            .find(|s| s.to_lowercase() == found)
            .map(|s| s.to_string())
    }

    /// What the worker said it needs: a well-known env-var name if present,
    /// otherwise the noun phrase after need/looking for/want.
    pub fn extract_data_needed(&self, text: &str) -> Option<String> {
        if let Some(m) = self.env_var.find(text) {
            return Some(m.as_str().to_string());
        }
        self.noun_phrase
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    }
}

/// Suggested action list for a kind, given the extracted URL. The list
/// starts with `navigate` exactly when a URL was extracted.
pub fn suggested_actions(kind: RequestKind, url: Option<&str>) -> Vec<BrowserAction> {
    let mut actions = Vec::new();
    if let Some(url) = url {
        actions.push(BrowserAction::Navigate { url: url.to_string() });
    }
    match kind {
        RequestKind::UrlVisit | RequestKind::Verification => {
            actions.push(BrowserAction::Screenshot { selector: None });
            actions.push(BrowserAction::ExtractText { selector: None });
        }
        RequestKind::CredentialFetch | RequestKind::ApiCheck => {
            actions.push(BrowserAction::ExtractText { selector: None });
        }
        RequestKind::FileDownload => {}
        RequestKind::ServiceAction | RequestKind::Unknown => {
            actions.push(BrowserAction::Screenshot { selector: None });
        }
    }
    actions
}

/// Short human-readable summary for a detected request.
pub fn summarize(kind: RequestKind, url: Option<&str>, service: Option<&str>) -> String {
    match kind {
        RequestKind::UrlVisit => match url {
            Some(url) => format!("Visit {url}"),
            None => "Visit a URL".into(),
        },
        RequestKind::CredentialFetch => match service {
            Some(service) => format!("Fetch credentials from {service}"),
            None => "Fetch credentials".into(),
        },
        RequestKind::ApiCheck => match service {
            Some(service) => format!("Check API for {service}"),
            None => "Check an API endpoint".into(),
        },
        RequestKind::ServiceAction => match service {
            Some(service) => format!("Perform an action on {service}"),
            None => "Perform a service action".into(),
        },
        RequestKind::FileDownload => "Download a file".into(),
        RequestKind::Verification => match url {
            Some(url) => format!("Verify deployment at {url}"),
            None => "Verify deployment".into(),
        },
        RequestKind::Unknown => "External access request".into(),
    }
}

impl Analyzer for RuleAnalyzer {
    fn name(&self) -> &str {
        "rules"
    }

    fn analyze(&self, text: &str) -> Analysis {
        let clean = ansi::strip_controls_str(text);

        let kind = match self.rules.iter().find(|(re, _)| re.is_match(&clean)) {
            Some((_, kind)) => *kind,
            None => return Analysis::none(),
        };

        let url = self.extract_url(&clean);
        let service = self.extract_service(&clean);
        let data_needed = self.extract_data_needed(&clean);
        let summary = summarize(kind, url.as_deref(), service.as_deref());
        let actions = suggested_actions(kind, url.as_deref());

        debug!(%kind, ?url, ?service, "rule match");

        Analysis::detected(
            RULE_CONFIDENCE,
            RequestDraft {
                kind,
                summary,
                raw_output: text.to_string(),
                url,
                service,
                data_needed,
                suggested_actions: actions,
            },
        )
    }
}

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("built-in pattern must compile")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> RuleAnalyzer {
        RuleAnalyzer::new(&[])
    }

    #[test]
    fn detects_url_visit() {
        let analysis =
            analyzer().analyze("Please go to https://railway.app/dashboard to get the DB URL.");
        assert!(analysis.detected);
        assert!(analysis.confidence >= 0.7);
        let draft = analysis.request.unwrap();
        assert_eq!(draft.kind, RequestKind::UrlVisit);
        assert_eq!(draft.url.as_deref(), Some("https://railway.app/dashboard"));
        assert_eq!(draft.summary, "Visit https://railway.app/dashboard");
        assert_eq!(
            draft.suggested_actions,
            vec![
                BrowserAction::Navigate { url: "https://railway.app/dashboard".into() },
                BrowserAction::Screenshot { selector: None },
                BrowserAction::ExtractText { selector: None },
            ]
        );
    }

    #[test]
    fn detects_credential_fetch_with_service() {
        let analysis = analyzer().analyze("I need the API_KEY from Vercel to continue.");
        let draft = analysis.request.expect("should detect");
        assert_eq!(draft.kind, RequestKind::CredentialFetch);
        assert_eq!(draft.service.as_deref(), Some("Vercel"));
        assert_eq!(draft.data_needed.as_deref(), Some("API_KEY"));
        assert_eq!(draft.summary, "Fetch credentials from Vercel");
        assert_eq!(
            draft.suggested_actions,
            vec![BrowserAction::ExtractText { selector: None }]
        );
    }

    #[test]
    fn detects_service_action() {
        let analysis =
            analyzer().analyze("Please open the Railway dashboard and find the database URL.");
        let draft = analysis.request.expect("should detect");
        assert_eq!(draft.kind, RequestKind::ServiceAction);
        assert_eq!(draft.service.as_deref(), Some("Railway"));
        assert_eq!(draft.summary, "Perform an action on Railway");
    }

    #[test]
    fn build_output_is_not_a_request() {
        let analysis = analyzer()
            .analyze("Compiling TypeScript...\nBuild succeeded in 2.3s\n42 modules compiled.");
        assert!(!analysis.detected);
        assert_eq!(analysis.confidence, 0.0);
    }

    #[test]
    fn detects_bare_visit() {
        let analysis = analyzer().analyze("Visit https://evil.example/steal");
        let draft = analysis.request.expect("should detect");
        assert_eq!(draft.kind, RequestKind::UrlVisit);
        assert_eq!(draft.url.as_deref(), Some("https://evil.example/steal"));
    }

    #[test]
    fn detects_verification() {
        let analysis =
            analyzer().analyze("Let me verify the deployment is live at https://app.fly.dev");
        let draft = analysis.request.expect("should detect");
        assert_eq!(draft.kind, RequestKind::Verification);
        assert_eq!(draft.service.as_deref(), Some("Fly"));
    }

    #[test]
    fn detects_file_download() {
        let analysis = analyzer().analyze("I should download the release tarball first.");
        let draft = analysis.request.expect("should detect");
        assert_eq!(draft.kind, RequestKind::FileDownload);
        // No URL extracted, so no navigate and nothing else for this kind.
        assert!(draft.suggested_actions.is_empty());
    }

    #[test]
    fn url_first_iff_extracted() {
        for kind in [
            RequestKind::UrlVisit,
            RequestKind::CredentialFetch,
            RequestKind::ApiCheck,
            RequestKind::ServiceAction,
            RequestKind::FileDownload,
            RequestKind::Verification,
            RequestKind::Unknown,
        ] {
            let with_url = suggested_actions(kind, Some("https://x.test"));
            assert!(
                matches!(with_url.first(), Some(BrowserAction::Navigate { url }) if url == "https://x.test"),
                "{kind}: expected leading navigate"
            );
            let without = suggested_actions(kind, None);
            assert!(
                !matches!(without.first(), Some(BrowserAction::Navigate { .. })),
                "{kind}: unexpected navigate without url"
            );
        }
    }

    #[test]
    fn url_trimmed_of_trailing_punctuation() {
        let a = analyzer();
        assert_eq!(
            a.extract_url("see https://example.com/path."),
            Some("https://example.com/path".into())
        );
        assert_eq!(
            a.extract_url("(hosted at https://example.com/x), right"),
            Some("https://example.com/x".into())
        );
    }

    #[test]
    fn service_matching_respects_word_boundaries() {
        let a = analyzer();
        assert_eq!(a.extract_service("deployed on fly.io"), Some("Fly".into()));
        assert_eq!(a.extract_service("that went by briefly"), None);
        assert_eq!(a.extract_service("check AWS us-east-1"), Some("AWS".into()));
    }

    #[test]
    fn noun_phrase_extraction() {
        let a = analyzer();
        assert_eq!(
            a.extract_data_needed("I'm looking for the deploy hook secret value"),
            Some("deploy hook secret value".into())
        );
    }

    #[test]
    fn control_sequences_stripped_before_matching() {
        let analysis =
            analyzer().analyze("\x1b[1mPlease go to \x1b[4mhttps://railway.app\x1b[0m now");
        let draft = analysis.request.expect("should detect through ANSI codes");
        assert_eq!(draft.url.as_deref(), Some("https://railway.app"));
    }

    #[test]
    fn extra_patterns_map_to_unknown() {
        let analyzer = RuleAnalyzer::new(&[r"\bphone home\b".to_string()]);
        let analysis = analyzer.analyze("the script wants to phone home tonight");
        let draft = analysis.request.expect("extra pattern should detect");
        assert_eq!(draft.kind, RequestKind::Unknown);
        assert_eq!(draft.summary, "External access request");
    }

    #[test]
    fn invalid_extra_pattern_is_skipped() {
        let analyzer = RuleAnalyzer::new(&["((unclosed".to_string()]);
        assert!(!analyzer.analyze("plain text").detected);
    }

    #[test]
    fn first_match_wins_over_later_rules() {
        // Contains both a navigation verb + URL (rule 1) and credential
        // vocabulary (rule 2); rule order must pick url-visit.
        let analysis = analyzer()
            .analyze("Please go to https://railway.app/dashboard to get the API_KEY we need.");
        assert_eq!(analysis.request.unwrap().kind, RequestKind::UrlVisit);
    }
}
