//! The gateway RPC facade.
//!
//! Newline-delimited JSON over a Unix domain socket. Clients send
//! `{"id", "method", "params"}` lines and receive `{"id", "ok", "data"}`
//! (or `{"id", "ok": false, "error"}`) responses; `conductor.requested` and
//! `conductor.resolved` pushes arrive as `{"event", "payload"}` lines on
//! every connection. Commands are executed by the orchestrator loop; each
//! carries a oneshot the loop answers on.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use conductor_types::Authorization;

use crate::engine::GatewayEvent;

/// Longest accepted request line; longer lines end the connection.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Parameters of `conductor.request`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcRequestParams {
    pub kind: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub service: Option<String>,
    pub data_needed: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Parameters of `conductor.resolve`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcResolveParams {
    id: Uuid,
    decision: String,
    #[serde(default)]
    instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: serde_json::Value,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// Commands submitted to the orchestrator loop. Every variant carries the
/// oneshot(s) the loop replies on.
pub enum GatewayCommand {
    Request {
        params: RpcRequestParams,
        client: String,
        /// Immediate validation outcome: the created request id, or an error.
        ack: oneshot::Sender<Result<Uuid, String>>,
        /// Fired with the final decision when the request resolves.
        decision: oneshot::Sender<Authorization>,
    },
    Resolve {
        id: Uuid,
        decision: String,
        instructions: Option<String>,
        client: String,
        reply: oneshot::Sender<Result<Authorization, String>>,
    },
    Status {
        reply: oneshot::Sender<serde_json::Value>,
    },
    History {
        limit: Option<usize>,
        reply: oneshot::Sender<serde_json::Value>,
    },
}

/// Handle to the gateway server thread.
pub struct GatewayHandle {
    shutdown: watch::Sender<bool>,
    thread: Option<std::thread::JoinHandle<()>>,
    socket_path: PathBuf,
}

impl GatewayHandle {
    /// Stop accepting connections and remove the socket file.
    pub fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Start the gateway server on a dedicated thread.
pub fn spawn_gateway(
    socket_path: &Path,
    command_tx: Sender<GatewayCommand>,
    events: broadcast::Sender<GatewayEvent>,
) -> Result<GatewayHandle, conductor_types::ConductorError> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            conductor_types::ConductorError::ConfigInvalid(format!(
                "failed to create socket dir: {e}"
            ))
        })?;
    }
    // Remove a stale socket from a previous run; NotFound is fine.
    match std::fs::remove_file(socket_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(conductor_types::ConductorError::ConfigInvalid(format!(
                "failed to remove stale socket: {e}"
            )))
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let path = socket_path.to_path_buf();
    let thread_path = path.clone();
    let thread = std::thread::Builder::new()
        .name("conductor-gateway".into())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("failed to create gateway runtime: {e}");
                    return;
                }
            };
            rt.block_on(serve(thread_path, command_tx, events, shutdown_rx));
        })
        .map_err(|e| conductor_types::ConductorError::ConfigInvalid(e.to_string()))?;

    Ok(GatewayHandle {
        shutdown: shutdown_tx,
        thread: Some(thread),
        socket_path: path,
    })
}

async fn serve(
    socket_path: PathBuf,
    command_tx: Sender<GatewayCommand>,
    events: broadcast::Sender<GatewayEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            warn!(path = %socket_path.display(), "gateway bind failed: {e}");
            return;
        }
    };
    info!(path = %socket_path.display(), "gateway listening");

    let conn_counter = Arc::new(AtomicU64::new(0));
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let n = conn_counter.fetch_add(1, Ordering::SeqCst) + 1;
                        let client = format!("rpc:conn-{n}");
                        let tx = command_tx.clone();
                        let event_rx = events.subscribe();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, client, tx, event_rx).await {
                                debug!("gateway connection ended: {e}");
                            }
                        });
                    }
                    Err(e) => warn!("gateway accept error: {e}"),
                }
            }
            _ = shutdown.wait_for(|&v| v) => {
                info!("gateway shutting down");
                break;
            }
        }
    }
    let _ = std::fs::remove_file(&socket_path);
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    client: String,
    command_tx: Sender<GatewayCommand>,
    mut event_rx: broadcast::Receiver<GatewayEvent>,
) -> Result<(), String> {
    let (reader, writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let writer = Arc::new(tokio::sync::Mutex::new(writer));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.map_err(|e| e.to_string())? else {
                    return Ok(()); // client disconnected
                };
                if line.len() > MAX_LINE_LENGTH {
                    return Err("oversized request line".into());
                }
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let request: RpcRequest = match serde_json::from_str(line) {
                    Ok(req) => req,
                    Err(e) => {
                        write_line(
                            &writer,
                            &serde_json::json!({
                                "id": null,
                                "ok": false,
                                "error": format!("invalid JSON: {e}"),
                            }),
                        )
                        .await?;
                        continue;
                    }
                };

                // `conductor.request` blocks on the decision; answer it on a
                // task so pushes and further commands keep flowing.
                let response_writer = writer.clone();
                let tx = command_tx.clone();
                let client = client.clone();
                tokio::spawn(async move {
                    let response = dispatch(request, &client, &tx).await;
                    let _ = write_line(&response_writer, &response).await;
                });
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        write_line(
                            &writer,
                            &serde_json::json!({
                                "event": event.name(),
                                "payload": event.payload(),
                            }),
                        )
                        .await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "gateway subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

async fn dispatch(
    request: RpcRequest,
    client: &str,
    command_tx: &Sender<GatewayCommand>,
) -> serde_json::Value {
    let id = request.id.clone();
    match run_method(&request, client, command_tx).await {
        Ok(data) => serde_json::json!({ "id": id, "ok": true, "data": data }),
        Err(error) => serde_json::json!({ "id": id, "ok": false, "error": error }),
    }
}

async fn run_method(
    request: &RpcRequest,
    client: &str,
    command_tx: &Sender<GatewayCommand>,
) -> Result<serde_json::Value, String> {
    match request.method.as_str() {
        "conductor.request" => {
            let params: RpcRequestParams = serde_json::from_value(request.params.clone())
                .map_err(|e| format!("invalid params: {e}"))?;
            let (ack_tx, ack_rx) = oneshot::channel();
            let (decision_tx, decision_rx) = oneshot::channel();
            command_tx
                .send(GatewayCommand::Request {
                    params,
                    client: client.to_string(),
                    ack: ack_tx,
                    decision: decision_tx,
                })
                .map_err(|_| "conductor is shutting down".to_string())?;

            let request_id = ack_rx
                .await
                .map_err(|_| "conductor is shutting down".to_string())??;
            // The forwarder's timer guarantees the decision arrives; a
            // dropped waker means the conductor exited first.
            let auth = decision_rx
                .await
                .map_err(|_| "conductor exited before resolution".to_string())?;
            Ok(authorization_json(request_id, &auth))
        }
        "conductor.resolve" => {
            let params: RpcResolveParams = serde_json::from_value(request.params.clone())
                .map_err(|e| format!("invalid params: {e}"))?;
            let (reply_tx, reply_rx) = oneshot::channel();
            command_tx
                .send(GatewayCommand::Resolve {
                    id: params.id,
                    decision: params.decision,
                    instructions: params.instructions,
                    client: client.to_string(),
                    reply: reply_tx,
                })
                .map_err(|_| "conductor is shutting down".to_string())?;
            let auth = reply_rx
                .await
                .map_err(|_| "conductor is shutting down".to_string())??;
            Ok(authorization_json(auth.request_id, &auth))
        }
        "conductor.status" => {
            let (reply_tx, reply_rx) = oneshot::channel();
            command_tx
                .send(GatewayCommand::Status { reply: reply_tx })
                .map_err(|_| "conductor is shutting down".to_string())?;
            reply_rx
                .await
                .map_err(|_| "conductor is shutting down".to_string())
        }
        "conductor.history" => {
            let limit = request
                .params
                .get("limit")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize);
            let (reply_tx, reply_rx) = oneshot::channel();
            command_tx
                .send(GatewayCommand::History {
                    limit,
                    reply: reply_tx,
                })
                .map_err(|_| "conductor is shutting down".to_string())?;
            reply_rx
                .await
                .map_err(|_| "conductor is shutting down".to_string())
        }
        other => Err(format!("unknown method: {other}")),
    }
}

fn authorization_json(request_id: Uuid, auth: &Authorization) -> serde_json::Value {
    serde_json::json!({
        "id": request_id,
        "decision": auth.decision,
        "instructions": auth.instructions,
        "resolvedBy": auth.resolved_by,
        "ts": auth.resolved_at.timestamp_millis(),
    })
}

async fn write_line(
    writer: &Arc<tokio::sync::Mutex<tokio::net::unix::OwnedWriteHalf>>,
    value: &serde_json::Value,
) -> Result<(), String> {
    let mut line = serde_json::to_string(value).map_err(|e| e.to_string())?;
    line.push('\n');
    let mut writer = writer.lock().await;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| e.to_string())?;
    writer.flush().await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_params_accept_camel_case() {
        let params: RpcRequestParams = serde_json::from_value(serde_json::json!({
            "summary": "open portal",
            "url": "https://x.test",
            "dataNeeded": "DATABASE_URL",
            "timeoutMs": 500,
        }))
        .unwrap();
        assert_eq!(params.summary.as_deref(), Some("open portal"));
        assert_eq!(params.data_needed.as_deref(), Some("DATABASE_URL"));
        assert_eq!(params.timeout_ms, Some(500));
    }

    #[test]
    fn resolve_params_require_id_and_decision() {
        let ok: Result<RpcResolveParams, _> = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "decision": "approve",
        }));
        assert!(ok.is_ok());

        let missing: Result<RpcResolveParams, _> =
            serde_json::from_value(serde_json::json!({ "decision": "approve" }));
        assert!(missing.is_err());
    }
}
