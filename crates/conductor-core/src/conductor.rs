//! The Conductor run loop.
//!
//! Owns the interceptor and drives everything from one thread: pump the
//! worker's terminal, hand flushes to the engine, and drain the decision,
//! execution-outcome, and gateway command channels between pumps. The
//! forwarder, executor, and gateway each run on their own thread and
//! communicate only through those channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use nix::sys::signal::{self, SigHandler, Signal};
use tokio::sync::broadcast;
use tracing::{info, warn};

use conductor_analyzer::build_analyzer;
use conductor_browser::{spawn_executor, BrowserPlane};
use conductor_channel::{spawn_forwarder, LogMessenger, Messenger, WebhookMessenger};
use conductor_intercept::{InterceptEvent, Interceptor};
use conductor_types::{ConductorConfig, ConductorError};

use crate::audit::AuditLog;
use crate::engine::Engine;
use crate::gateway::{spawn_gateway, GatewayCommand};

/// Poll timeout for one pump of the worker's streams.
const PUMP_TIMEOUT_MS: i32 = 100;

/// Conventional exit code for a SIGINT-terminated session.
const SIGINT_EXIT_CODE: i32 = 130;

static SIGINT_SEEN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    SIGINT_SEEN.store(true, Ordering::SeqCst);
}

/// The assembled authorization loop.
pub struct Conductor;

impl Conductor {
    /// Run the loop to completion and return the exit code the conductor
    /// process should exit with (the worker's, or 130 after Ctrl-C).
    ///
    /// `plane` is the browser automation engine; `messengers` are the
    /// messaging backends the forwarder routes targets onto.
    pub fn run(
        config: ConductorConfig,
        plane: Box<dyn BrowserPlane>,
        messengers: Vec<Box<dyn Messenger>>,
    ) -> Result<i32, ConductorError> {
        config.validate()?;

        let mut interceptor = Interceptor::start(&config)?;

        let analyzer = build_analyzer(&config.analyzer);
        info!(analyzer = analyzer.name(), "analyzer selected");

        let (decision_tx, decision_rx) = mpsc::channel();
        let forwarder = spawn_forwarder(messengers, config.auth.targets.clone(), decision_tx);

        let (outcome_tx, outcome_rx) = mpsc::channel();
        let executor = spawn_executor(plane, config.browser.clone(), outcome_tx);

        let (events_tx, _) = broadcast::channel(64);
        let (gateway_tx, gateway_rx) = mpsc::channel();
        let gateway = spawn_gateway(&config.gateway_socket_path(), gateway_tx, events_tx.clone())?;

        let audit = if config.audit_log {
            AuditLog::open(config.audit_path())?
        } else {
            AuditLog::disabled()
        };

        let mut engine = Engine::new(config, analyzer, forwarder, executor, audit, events_tx);
        engine.record_started(interceptor.pid());
        install_sigint_handler();

        let mut exit_code = 0;
        loop {
            if SIGINT_SEEN.load(Ordering::SeqCst) {
                info!("interrupt received, stopping worker");
                exit_code = SIGINT_EXIT_CODE;
                break;
            }

            for event in interceptor.pump(PUMP_TIMEOUT_MS)? {
                match event {
                    InterceptEvent::Output(_) => {}
                    InterceptEvent::Flush(text) => engine.on_flush(&text, &mut interceptor),
                    InterceptEvent::Exit { code, signal } => {
                        exit_code = signal.map(|s| 128 + s).unwrap_or(code);
                    }
                }
            }

            while let Ok(auth) = decision_rx.try_recv() {
                engine.on_decision(auth, &mut interceptor);
            }
            while let Ok(outcome) = outcome_rx.try_recv() {
                engine.on_execution_done(outcome.request_id, outcome.results, &mut interceptor);
            }
            while let Ok(command) = gateway_rx.try_recv() {
                handle_gateway(&mut engine, command, &mut interceptor);
            }

            if interceptor.exited() {
                break;
            }
        }

        if let Err(e) = interceptor.stop() {
            warn!("worker stop failed: {e}");
        }
        gateway.stop();
        engine.shutdown();

        Ok(exit_code)
    }
}

/// Execute one gateway command against the engine and answer its oneshot.
fn handle_gateway(engine: &mut Engine, command: GatewayCommand, interceptor: &mut Interceptor) {
    match command {
        GatewayCommand::Request {
            params,
            client,
            ack,
            decision,
        } => {
            let result = engine.rpc_request(params, &client, decision);
            let _ = ack.send(result);
        }
        GatewayCommand::Resolve {
            id,
            decision,
            instructions,
            client,
            reply,
        } => {
            let result = engine.rpc_resolve(id, &decision, instructions, &client, interceptor);
            let _ = reply.send(result);
        }
        GatewayCommand::Status { reply } => {
            let mut status = engine.status();
            if let Some(fields) = status.as_object_mut() {
                let stats = interceptor.stats();
                fields.insert(
                    "session".into(),
                    serde_json::json!({
                        "pid": interceptor.pid(),
                        "flushes": stats.flushes,
                        "bytesPassed": stats.bytes_passed,
                        "injections": stats.injections,
                    }),
                );
            }
            let _ = reply.send(status);
        }
        GatewayCommand::History { limit, reply } => {
            let _ = reply.send(engine.history_tail(limit));
        }
    }
}

/// Route SIGINT through a flag the run loop checks, so Ctrl-C takes the
/// same stop path as worker exit.
fn install_sigint_handler() {
    // SAFETY: the handler only stores to an atomic, which is
    // async-signal-safe.
    unsafe {
        if let Err(e) = signal::signal(Signal::SIGINT, SigHandler::Handler(on_sigint)) {
            warn!("failed to install SIGINT handler: {e}");
        }
    }
}

/// Build the messenger set the configured targets need: the log backend is
/// always present, the webhook backend joins when any target routes to it.
pub fn default_messengers(config: &ConductorConfig) -> Vec<Box<dyn Messenger>> {
    let mut messengers: Vec<Box<dyn Messenger>> = vec![Box::new(LogMessenger)];
    if config.auth.targets.iter().any(|t| t.channel == "webhook") {
        messengers.push(Box::new(WebhookMessenger::new(None)));
    }
    messengers
}
