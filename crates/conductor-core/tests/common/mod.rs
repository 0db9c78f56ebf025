//! Shared helpers for conductor-core integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use conductor_analyzer::rules::RuleAnalyzer;
use conductor_browser::{
    spawn_executor, BrowserError, BrowserPlane, ExecutionOutcome, PlaneStatus, StepOutput,
};
use conductor_channel::{spawn_forwarder, ChannelError, InboundMessage, Messenger};
use conductor_core::{AuditLog, Engine, GatewayEvent, StdinSink};
use conductor_types::{
    AnalyzerProvider, AuthTarget, Authorization, BrowserAction, ConductorConfig, ConductorError,
};

/// Records each stdin write separately so envelope structure and exact
/// bytes are observable.
pub struct RecordingSink {
    pub writes: Vec<Vec<u8>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            fail: false,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.writes.concat()).into_owned()
    }
}

impl StdinSink for RecordingSink {
    fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), ConductorError> {
        if self.fail {
            return Err(ConductorError::StdinUnwritable("closed".into()));
        }
        self.writes.push(bytes.to_vec());
        Ok(())
    }
}

/// Messenger that records outbound sends and replays scripted replies.
pub struct ScriptedMessenger {
    pub sent: Arc<Mutex<Vec<String>>>,
    pub replies: Arc<Mutex<Vec<InboundMessage>>>,
}

#[async_trait]
impl Messenger for ScriptedMessenger {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, _target: &AuthTarget, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn poll_inbound(&mut self) -> Result<Vec<InboundMessage>, ChannelError> {
        Ok(self.replies.lock().unwrap().drain(..).collect())
    }
}

/// Plane where navigate/extract/screenshot all succeed with canned output.
pub struct HappyPlane;

#[async_trait]
impl BrowserPlane for HappyPlane {
    async fn status(&self) -> Result<PlaneStatus, BrowserError> {
        Ok(PlaneStatus { running: true })
    }

    async fn start(&self, _profile: &str, _headless: bool) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn dispatch(&self, action: &BrowserAction) -> Result<StepOutput, BrowserError> {
        Ok(match action {
            BrowserAction::ExtractText { .. } => StepOutput {
                data: Some("DATABASE_URL=postgres://internal/app".into()),
                screenshot_path: None,
            },
            BrowserAction::Screenshot { .. } => StepOutput {
                data: None,
                screenshot_path: Some("/tmp/conductor-shot.png".into()),
            },
            _ => StepOutput::default(),
        })
    }
}

/// Everything a test needs to drive the engine by hand.
pub struct Harness {
    pub engine: Engine,
    pub sink: RecordingSink,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub replies: Arc<Mutex<Vec<InboundMessage>>>,
    pub decisions: Receiver<Authorization>,
    pub outcomes: Receiver<ExecutionOutcome>,
    pub events: tokio::sync::broadcast::Receiver<GatewayEvent>,
}

/// Base configuration for engine tests: rule analyzer, one scripted target.
pub fn test_config() -> ConductorConfig {
    let mut config = ConductorConfig::default();
    config.enabled = true;
    config.analyzer.provider = AnalyzerProvider::Regex;
    config.auth.targets = vec![AuthTarget {
        channel: "scripted".into(),
        to: "operator".into(),
        account_id: None,
        thread_id: None,
    }];
    config.audit_log = false;
    config
}

/// Build an engine wired to a scripted messenger, a happy browser plane,
/// and channels the test holds both ends of.
pub fn harness(config: ConductorConfig) -> Harness {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let replies = Arc::new(Mutex::new(Vec::new()));
    let messenger = ScriptedMessenger {
        sent: sent.clone(),
        replies: replies.clone(),
    };

    let (decision_tx, decision_rx): (Sender<Authorization>, Receiver<Authorization>) =
        std::sync::mpsc::channel();
    let forwarder = spawn_forwarder(
        vec![Box::new(messenger)],
        config.auth.targets.clone(),
        decision_tx,
    );

    let (outcome_tx, outcome_rx) = std::sync::mpsc::channel();
    let executor = spawn_executor(Box::new(HappyPlane), config.browser.clone(), outcome_tx);

    let (events_tx, events_rx) = tokio::sync::broadcast::channel(64);
    let analyzer = Box::new(RuleAnalyzer::new(&config.analyzer.patterns));
    let engine = Engine::new(
        config,
        analyzer,
        forwarder,
        executor,
        AuditLog::disabled(),
        events_tx,
    );

    Harness {
        engine,
        sink: RecordingSink::new(),
        sent,
        replies,
        decisions: decision_rx,
        outcomes: outcome_rx,
        events: events_rx,
    }
}

/// Wait until the scripted messenger has sent at least `n` messages.
pub fn wait_for_sends(sent: &Arc<Mutex<Vec<String>>>, n: usize) -> Vec<String> {
    for _ in 0..100 {
        let sends = sent.lock().unwrap();
        if sends.len() >= n {
            return sends.clone();
        }
        drop(sends);
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    panic!("expected {n} operator sends, got {:?}", sent.lock().unwrap());
}
