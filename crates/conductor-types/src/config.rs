//! Configuration types for the Conductor.
//!
//! [`ConductorConfig`] is the flat record loaded from `conductor.toml`,
//! controlling the wrapped worker command, buffer flush policy, analyzer
//! backend, authorization targets and timeout, browser execution, and the
//! audit sink.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConductorError;

/// Default configuration filename.
pub const CONFIG_FILENAME: &str = "conductor.toml";

/// Which detection backend the analyzer uses.
///
/// Anything other than `Regex` falls back to the rule-based detector on
/// failure; unrecognized values deserialize to `Regex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerProvider {
    #[default]
    Gemini,
    Openai,
    Regex,
    Local,
}

impl<'de> Deserialize<'de> for AnalyzerProvider {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "gemini" => AnalyzerProvider::Gemini,
            "openai" => AnalyzerProvider::Openai,
            "local" => AnalyzerProvider::Local,
            // Unknown providers select the always-available rule backend.
            _ => AnalyzerProvider::Regex,
        })
    }
}

/// Analyzer backend selection and gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub provider: AnalyzerProvider,
    /// Remote API key; falls back to the provider's environment variable.
    pub api_key: Option<String>,
    /// Remote model name; falls back to the provider default.
    pub model: Option<String>,
    /// Minimum confidence before the orchestrator acts on a detection.
    pub confidence_threshold: f64,
    /// Extra detection regexes, all mapped to the `unknown` kind.
    pub patterns: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            provider: AnalyzerProvider::default(),
            api_key: None,
            model: None,
            confidence_threshold: 0.7,
            patterns: Vec::new(),
        }
    }
}

/// One operator delivery endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthTarget {
    /// Messaging backend name (e.g. `"log"`, `"webhook"`).
    pub channel: String,
    /// Backend-specific recipient address.
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Authorization delivery, timeout, and auto-rule settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub targets: Vec<AuthTarget>,
    pub timeout_ms: u64,
    /// URL globs resolved as approve without asking the operator.
    pub auto_approve_patterns: Vec<String>,
    /// URL globs resolved as deny without asking the operator. Evaluated
    /// before the approve patterns.
    pub auto_deny_patterns: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            timeout_ms: 120_000,
            auto_approve_patterns: Vec::new(),
            auto_deny_patterns: Vec::new(),
        }
    }
}

/// Browser plane settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub profile: String,
    pub headless: bool,
    pub action_timeout_ms: u64,
    /// Append a trailing screenshot to executions that have none.
    pub capture_screenshots: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            profile: "openclaw".into(),
            headless: true,
            action_timeout_ms: 30_000,
            capture_screenshots: true,
        }
    }
}

/// Top-level configuration for a Conductor instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Enable the authorization loop.
    pub enabled: bool,
    /// Worker process to wrap.
    pub wrapped_command: String,
    pub wrapped_args: Vec<String>,
    /// Periodic flush interval for the analysis buffer.
    pub buffer_flush_interval_ms: u64,
    /// Forced flush threshold in bytes.
    pub max_buffer_size: usize,
    pub analyzer: AnalyzerConfig,
    pub auth: AuthConfig,
    pub browser: BrowserConfig,
    /// Enable the append-only audit sink.
    pub audit_log: bool,
    pub audit_log_path: PathBuf,
    /// Unix socket path for the gateway RPC facade.
    pub gateway_socket: PathBuf,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            wrapped_command: "claude".into(),
            wrapped_args: Vec::new(),
            buffer_flush_interval_ms: 2000,
            max_buffer_size: 8192,
            analyzer: AnalyzerConfig::default(),
            auth: AuthConfig::default(),
            browser: BrowserConfig::default(),
            audit_log: true,
            audit_log_path: PathBuf::from("~/.openclaw/conductor-audit.jsonl"),
            gateway_socket: PathBuf::from("~/.openclaw/conductor.sock"),
        }
    }
}

impl ConductorConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConductorError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConductorError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConductorError> {
        toml::to_string_pretty(self).map_err(|e| ConductorError::ConfigInvalid(e.to_string()))
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConductorError> {
        if self.wrapped_command.trim().is_empty() {
            return Err(ConductorError::ConfigInvalid(
                "wrapped_command must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analyzer.confidence_threshold) {
            return Err(ConductorError::ConfigInvalid(format!(
                "confidence_threshold {} outside [0, 1]",
                self.analyzer.confidence_threshold
            )));
        }
        if self.max_buffer_size == 0 {
            return Err(ConductorError::ConfigInvalid(
                "max_buffer_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The audit path with a leading `~` expanded against `$HOME`.
    pub fn audit_path(&self) -> PathBuf {
        expand_home(&self.audit_log_path)
    }

    /// The gateway socket path with a leading `~` expanded against `$HOME`.
    pub fn gateway_socket_path(&self) -> PathBuf {
        expand_home(&self.gateway_socket)
    }
}

/// Expand a leading `~/` against the `HOME` environment variable. Paths
/// without the prefix (and environments without `HOME`) pass through.
pub fn expand_home(path: &std::path::Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = s.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
