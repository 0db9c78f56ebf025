//! The orchestrator state machine.
//!
//! Single-writer over the pending store and history: every path that
//! resolves a request (operator reply, RPC resolve, timeout, auto-rule)
//! funnels through [`Engine::on_decision`]-shaped methods on the same
//! thread, and removal from the pending store is the at-most-once gate.
//! Per request, the sequence is linear: pending-insert, resolve, execute,
//! inject, history append, audit append.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use conductor_analyzer::Analyzer;
use conductor_browser::ExecutorHandle;
use conductor_channel::ForwarderHandle;
use conductor_types::{
    AccessRequest, ActionResult, Authorization, ConductorConfig, Decision, HistoryEntry,
    Injection, RequestDraft, RequestKind,
};

use crate::audit::AuditLog;
use crate::gateway::RpcRequestParams;
use crate::inject::{self, StdinSink};
use crate::pending::{PendingEntry, PendingSet, RequestOrigin};
use crate::rules::{AutoDecision, AutoRules};

/// Default number of entries returned by `conductor.history`.
const HISTORY_DEFAULT_LIMIT: usize = 50;

/// Payload of a `conductor.requested` push.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedEvent {
    pub id: Uuid,
    pub kind: RequestKind,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_needed: Option<String>,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

/// Payload of a `conductor.resolved` push.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEvent {
    pub id: Uuid,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    pub ts: i64,
}

/// Events broadcast to gateway subscribers.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Requested(RequestedEvent),
    Resolved(ResolvedEvent),
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GatewayEvent::Requested(_) => "conductor.requested",
            GatewayEvent::Resolved(_) => "conductor.resolved",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            GatewayEvent::Requested(e) => serde_json::to_value(e).unwrap_or_default(),
            GatewayEvent::Resolved(e) => serde_json::to_value(e).unwrap_or_default(),
        }
    }

    fn requested(request: &AccessRequest) -> Self {
        GatewayEvent::Requested(RequestedEvent {
            id: request.id,
            kind: request.kind,
            summary: request.summary.clone(),
            url: request.url.clone(),
            service: request.service.clone(),
            data_needed: request.data_needed.clone(),
            created_at_ms: request.created_at.timestamp_millis(),
            expires_at_ms: request.expires_at.timestamp_millis(),
        })
    }

    fn resolved(auth: &Authorization) -> Self {
        GatewayEvent::Resolved(ResolvedEvent {
            id: auth.request_id,
            decision: auth.decision,
            instructions: auth.instructions.clone(),
            resolved_by: Some(auth.resolved_by.clone()),
            ts: auth.resolved_at.timestamp_millis(),
        })
    }
}

/// The orchestrator core: pending store, history, auto-rules, audit, and
/// the handles to the forwarder and executor threads.
pub struct Engine {
    config: ConductorConfig,
    analyzer: Box<dyn Analyzer>,
    auto_rules: AutoRules,
    pending: PendingSet,
    /// Approved requests whose browser execution is in flight.
    executing: HashMap<Uuid, (AccessRequest, Authorization)>,
    history: Vec<HistoryEntry>,
    audit: AuditLog,
    forwarder: ForwarderHandle,
    executor: ExecutorHandle,
    events: broadcast::Sender<GatewayEvent>,
}

impl Engine {
    pub fn new(
        config: ConductorConfig,
        analyzer: Box<dyn Analyzer>,
        forwarder: ForwarderHandle,
        executor: ExecutorHandle,
        audit: AuditLog,
        events: broadcast::Sender<GatewayEvent>,
    ) -> Self {
        let auto_rules = AutoRules::new(
            &config.auth.auto_approve_patterns,
            &config.auth.auto_deny_patterns,
        );
        Self {
            config,
            analyzer,
            auto_rules,
            pending: PendingSet::new(),
            executing: HashMap::new(),
            history: Vec::new(),
            audit,
            forwarder,
            executor,
            events,
        }
    }

    /// Record the startup audit event.
    pub fn record_started(&mut self, pid: u32) {
        self.audit.record(
            "started",
            serde_json::json!({
                "command": self.config.wrapped_command,
                "pid": pid,
            }),
        );
    }

    /// Handle one analysis-buffer flush from the interceptor.
    pub fn on_flush(&mut self, text: &str, sink: &mut dyn StdinSink) {
        let analysis = self.analyzer.analyze(text);
        if !analysis.detected {
            return;
        }
        if analysis.confidence < self.config.analyzer.confidence_threshold {
            debug!(
                confidence = analysis.confidence,
                threshold = self.config.analyzer.confidence_threshold,
                "detection below threshold, dropped"
            );
            return;
        }
        let Some(draft) = analysis.request else {
            return;
        };

        let mut request = AccessRequest::from_draft(draft, self.config.auth.timeout_ms);
        sanitize_url(&mut request);

        info!(
            id = %request.id,
            kind = %request.kind,
            summary = %request.summary,
            confidence = analysis.confidence,
            "external access request detected"
        );
        self.audit.record(
            "request-detected",
            serde_json::json!({
                "id": request.id,
                "kind": request.kind,
                "summary": request.summary,
                "url": request.url,
                "confidence": analysis.confidence,
            }),
        );

        if let Some(url) = request.url.clone() {
            match self.auto_rules.evaluate(&url) {
                Some(AutoDecision::Deny) => {
                    self.auto_deny(request, sink);
                    return;
                }
                Some(AutoDecision::Approve) => {
                    self.auto_approve(request);
                    return;
                }
                None => {}
            }
        }

        self.emit(GatewayEvent::requested(&request));
        self.pending.insert(PendingEntry {
            request: request.clone(),
            origin: RequestOrigin::Worker,
            waker: None,
        });
        self.forwarder
            .request_authorization(request, self.config.auth.timeout_ms);
    }

    /// Handle a decision from the forwarder stream (operator reply or
    /// timeout), or any other resolution funneled through the same gate.
    pub fn on_decision(&mut self, auth: Authorization, sink: &mut dyn StdinSink) {
        let Some(entry) = self.pending.remove(auth.request_id) else {
            debug!(id = %auth.request_id, "decision for unknown or already-resolved request ignored");
            return;
        };
        self.forwarder.cancel(auth.request_id);

        info!(
            id = %auth.request_id,
            decision = %auth.decision,
            resolved_by = %auth.resolved_by,
            "authorization resolved"
        );
        self.audit.record(
            "authorization-received",
            serde_json::json!({
                "id": auth.request_id,
                "decision": auth.decision,
                "resolvedBy": auth.resolved_by,
            }),
        );
        self.emit(GatewayEvent::resolved(&auth));

        if let Some(waker) = entry.waker {
            let _ = waker.send(auth.clone());
        }

        // RPC-originated requests have no worker waiting on stdin; waking
        // the caller is the whole resolution.
        if entry.origin == RequestOrigin::Rpc {
            return;
        }

        if auth.decision.is_approval() {
            self.executing
                .insert(entry.request.id, (entry.request.clone(), auth.clone()));
            self.executor.execute(entry.request, auth);
        } else if auth.resolved_by == "timeout" {
            let payload = inject::timeout_payload(&entry.request);
            self.finish(entry.request, Some(auth), payload, false, Vec::new(), sink);
        } else {
            let payload = inject::denial_payload(&entry.request, "operator denied");
            self.finish(entry.request, Some(auth), payload, false, Vec::new(), sink);
        }
    }

    /// Handle a finished browser execution.
    pub fn on_execution_done(
        &mut self,
        request_id: Uuid,
        results: Vec<ActionResult>,
        sink: &mut dyn StdinSink,
    ) {
        let Some((request, auth)) = self.executing.remove(&request_id) else {
            debug!(id = %request_id, "execution outcome for unknown request ignored");
            return;
        };
        let payload = inject::result_payload(&request, &results);
        let success = results.iter().any(|r| r.success);
        let injection = self.finish(request.clone(), Some(auth), payload, success, results, sink);
        self.forwarder.notify_result(&request, &injection);
    }

    /// Create a request on behalf of an RPC caller. The caller's decision
    /// waker is stored in the pending entry and fired on resolution.
    pub fn rpc_request(
        &mut self,
        params: RpcRequestParams,
        client: &str,
        waker: oneshot::Sender<Authorization>,
    ) -> Result<Uuid, String> {
        if params.summary.is_none() && params.url.is_none() {
            return Err("at least one of summary or url is required".into());
        }
        if let Some(url) = &params.url {
            url::Url::parse(url).map_err(|e| format!("malformed url: {e}"))?;
        }

        let kind = params
            .kind
            .as_deref()
            .and_then(RequestKind::parse)
            .unwrap_or(RequestKind::Unknown);
        let summary = params.summary.clone().unwrap_or_else(|| {
            conductor_analyzer::rules::summarize(
                kind,
                params.url.as_deref(),
                params.service.as_deref(),
            )
        });
        let timeout_ms = params.timeout_ms.unwrap_or(self.config.auth.timeout_ms);

        let request = AccessRequest::from_draft(
            RequestDraft {
                kind,
                summary,
                raw_output: format!("(requested via {client})"),
                url: params.url,
                service: params.service,
                data_needed: params.data_needed,
                suggested_actions: Vec::new(),
            },
            timeout_ms,
        );

        info!(id = %request.id, %client, "gateway request created");
        self.audit.record(
            "request-detected",
            serde_json::json!({
                "id": request.id,
                "kind": request.kind,
                "summary": request.summary,
                "url": request.url,
                "source": client,
            }),
        );

        self.emit(GatewayEvent::requested(&request));
        let id = request.id;
        self.pending.insert(PendingEntry {
            request: request.clone(),
            origin: RequestOrigin::Rpc,
            waker: Some(waker),
        });
        self.forwarder.request_authorization(request, timeout_ms);
        Ok(id)
    }

    /// Resolve a pending request on behalf of an RPC caller.
    pub fn rpc_resolve(
        &mut self,
        id: Uuid,
        decision: &str,
        instructions: Option<String>,
        client: &str,
        sink: &mut dyn StdinSink,
    ) -> Result<Authorization, String> {
        let decision =
            Decision::parse(decision).ok_or_else(|| format!("invalid decision: {decision}"))?;
        if !self.pending.contains(id) {
            return Err(format!("unknown request id: {id}"));
        }

        let auth = match decision {
            Decision::Approve => Authorization::approve(id, client),
            Decision::Deny => Authorization::deny(id, client),
            Decision::ApproveWithInstructions => Authorization::approve_with_instructions(
                id,
                instructions.unwrap_or_default(),
                client,
            ),
        };
        self.on_decision(auth.clone(), sink);
        Ok(auth)
    }

    /// The `conductor.status` snapshot.
    pub fn status(&self) -> serde_json::Value {
        let pending: Vec<serde_json::Value> = self
            .pending
            .list()
            .into_iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "kind": r.kind,
                    "summary": r.summary,
                    "url": r.url,
                    "createdAtMs": r.created_at.timestamp_millis(),
                    "expiresAtMs": r.expires_at.timestamp_millis(),
                })
            })
            .collect();
        serde_json::json!({
            "pending": pending,
            "pendingCount": self.pending.count(),
            "historyCount": self.history.len(),
        })
    }

    /// The last `limit` history entries (default 50), oldest first.
    pub fn history_tail(&self, limit: Option<usize>) -> serde_json::Value {
        let limit = limit.unwrap_or(HISTORY_DEFAULT_LIMIT);
        let start = self.history.len().saturating_sub(limit);
        serde_json::to_value(&self.history[start..]).unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.count()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Shut down: drop pending state, stop the worker threads, close the
    /// audit sink. In-flight executions finish on the executor thread; their
    /// late outcomes have nowhere to go and are discarded with it.
    pub fn shutdown(mut self) {
        self.pending.clear();
        self.audit.close();
        self.forwarder.stop();
        self.executor.stop();
    }

    fn auto_deny(&mut self, request: AccessRequest, sink: &mut dyn StdinSink) {
        info!(id = %request.id, url = ?request.url, "auto-denied by policy");
        self.audit.record(
            "auto-denied",
            serde_json::json!({ "id": request.id, "url": request.url }),
        );
        let auth = Authorization::deny(request.id, "auto-deny");
        let payload = inject::denial_payload(&request, "denied by policy");
        self.finish(request, Some(auth), payload, false, Vec::new(), sink);
    }

    fn auto_approve(&mut self, request: AccessRequest) {
        info!(id = %request.id, url = ?request.url, "auto-approved by policy");
        self.audit.record(
            "auto-approved",
            serde_json::json!({ "id": request.id, "url": request.url }),
        );
        let auth = Authorization::approve(request.id, "auto-approve");
        self.emit(GatewayEvent::requested(&request));
        self.emit(GatewayEvent::resolved(&auth));
        self.executing
            .insert(request.id, (request.clone(), auth.clone()));
        self.executor.execute(request, auth);
    }

    /// Inject the payload, append history, and audit: the single exit
    /// point every resolved worker request passes through exactly once.
    fn finish(
        &mut self,
        request: AccessRequest,
        authorization: Option<Authorization>,
        payload: String,
        success: bool,
        results: Vec<ActionResult>,
        sink: &mut dyn StdinSink,
    ) -> Injection {
        let delivered = inject::deliver(sink, &payload);
        let success = success && delivered.is_ok();
        if let Err(e) = delivered {
            warn!(id = %request.id, "injection failed: {e}");
        }

        let injection = Injection::new(request.id, success, payload, results);
        self.audit.record(
            "injection",
            serde_json::json!({ "id": request.id, "success": injection.success }),
        );
        self.history
            .push(HistoryEntry::new(request, authorization, injection.clone()));
        injection
    }

    fn emit(&self, event: GatewayEvent) {
        // No subscribers is fine; send only fails then.
        let _ = self.events.send(event);
    }
}

/// Drop a URL (and the navigates pointing at it) that the detector emitted
/// but that does not parse; the invariant is that `url`, when present, is
/// syntactically a URL.
fn sanitize_url(request: &mut AccessRequest) {
    let Some(url) = &request.url else { return };
    if url::Url::parse(url).is_ok() {
        return;
    }
    warn!(id = %request.id, url = %url, "dropping malformed url from detection");
    request.url = None;
    request
        .suggested_actions
        .retain(|a| !matches!(a, conductor_types::BrowserAction::Navigate { .. }));
}
