//! The forwarder thread.
//!
//! Bridges the sync orchestrator loop with the async messenger backends.
//! Runs a single-threaded tokio runtime on a dedicated thread: outbound
//! work arrives over a std mpsc channel, operator decisions (and timeout
//! denials) leave over another. Delivery is best-effort per target; a
//! failed send is logged and never aborts the request.

use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use conductor_types::{AccessRequest, AuthTarget, Authorization, Injection};

use crate::decision::{match_decision, PendingForward};
use crate::format;
use crate::messenger::Messenger;

/// How long the loop sleeps between inbound polls.
const POLL_PACE: Duration = Duration::from_millis(200);

/// Outbound work accepted by the forwarder thread.
enum ForwardInput {
    /// Deliver an authorization prompt and start the request's timer.
    Authorize {
        request: AccessRequest,
        timeout_ms: u64,
    },
    /// Best-effort outcome notification after an injection.
    Notify {
        request: AccessRequest,
        injection: Injection,
    },
    /// The request was resolved elsewhere; drop its timer.
    Cancel { id: Uuid },
    /// Cancel all timers and exit the thread.
    Stop,
}

/// Handle held by the orchestrator; all methods are fire-and-forget.
pub struct ForwarderHandle {
    tx: Sender<ForwardInput>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ForwarderHandle {
    /// Deliver the authorization prompt for `request` to every target and
    /// register its timeout timer.
    pub fn request_authorization(&self, request: AccessRequest, timeout_ms: u64) {
        let _ = self.tx.send(ForwardInput::Authorize {
            request,
            timeout_ms,
        });
    }

    /// Send the outcome summary for a completed request.
    pub fn notify_result(&self, request: &AccessRequest, injection: &Injection) {
        let _ = self.tx.send(ForwardInput::Notify {
            request: request.clone(),
            injection: injection.clone(),
        });
    }

    /// Tell the forwarder a request id was resolved through another path.
    pub fn cancel(&self, id: Uuid) {
        let _ = self.tx.send(ForwardInput::Cancel { id });
    }

    /// Stop the thread, cancelling all timers and clearing state.
    pub fn stop(mut self) {
        let _ = self.tx.send(ForwardInput::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ForwarderHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(ForwardInput::Stop);
    }
}

/// Spawn the forwarder thread.
///
/// `decision_tx` receives every resolution the messaging plane produces:
/// operator replies matched to a pending request, and timeout denials with
/// `resolved_by = "timeout"`.
pub fn spawn_forwarder(
    messengers: Vec<Box<dyn Messenger>>,
    targets: Vec<AuthTarget>,
    decision_tx: Sender<Authorization>,
) -> ForwarderHandle {
    let (tx, rx) = std::sync::mpsc::channel();
    let thread = std::thread::Builder::new()
        .name("conductor-forwarder".into())
        .spawn(move || run(messengers, targets, rx, decision_tx))
        .expect("failed to spawn forwarder thread");

    ForwarderHandle {
        tx,
        thread: Some(thread),
    }
}

/// The thread body: a current-thread runtime driving the async backends.
fn run(
    mut messengers: Vec<Box<dyn Messenger>>,
    targets: Vec<AuthTarget>,
    input_rx: Receiver<ForwardInput>,
    decision_tx: Sender<Authorization>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            warn!("failed to create forwarder runtime: {e}");
            return;
        }
    };

    rt.block_on(async move {
        let mut pending: Vec<PendingForward> = Vec::new();

        loop {
            // Drain outbound work.
            loop {
                match input_rx.try_recv() {
                    Ok(ForwardInput::Authorize {
                        request,
                        timeout_ms,
                    }) => {
                        pending.push(PendingForward::new(
                            request.id,
                            Instant::now() + Duration::from_millis(timeout_ms),
                        ));
                        let text = format::authorization_request(&request, timeout_ms);
                        broadcast(&messengers, &targets, &text).await;
                        info!(id = %request.id, targets = targets.len(), "authorization prompt forwarded");
                    }
                    Ok(ForwardInput::Notify { request, injection }) => {
                        let text = format::result_notification(&request, &injection);
                        broadcast(&messengers, &targets, &text).await;
                    }
                    Ok(ForwardInput::Cancel { id }) => {
                        pending.retain(|p| p.id != id);
                    }
                    Ok(ForwardInput::Stop) | Err(TryRecvError::Disconnected) => {
                        pending.clear();
                        debug!("forwarder stopped");
                        return;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }

            // Collect and match operator replies.
            for messenger in &mut messengers {
                let inbound = match messenger.poll_inbound().await {
                    Ok(messages) => messages,
                    Err(e) => {
                        warn!(channel = messenger.name(), "inbound poll failed: {e}");
                        continue;
                    }
                };
                for message in inbound {
                    if let Some(auth) =
                        match_decision(&message.text, &message.channel, &message.from, &pending)
                    {
                        pending.retain(|p| p.id != auth.request_id);
                        let _ = decision_tx.send(auth);
                    }
                }
            }

            // Fire expired timers as timeout denials.
            let now = Instant::now();
            let mut expired = Vec::new();
            pending.retain(|p| {
                if p.deadline <= now {
                    expired.push(p.id);
                    false
                } else {
                    true
                }
            });
            for id in expired {
                info!(%id, "authorization timed out");
                let _ = decision_tx.send(Authorization::timeout(id));
            }

            tokio::time::sleep(POLL_PACE).await;
        }
    });
}

/// Best-effort parallel delivery to every target whose channel has a
/// messenger. Failures are logged and swallowed.
async fn broadcast(messengers: &[Box<dyn Messenger>], targets: &[AuthTarget], text: &str) {
    let sends = targets.iter().filter_map(|target| {
        let messenger = messengers.iter().find(|m| m.name() == target.channel);
        if messenger.is_none() {
            warn!(channel = %target.channel, to = %target.to, "no messenger for target channel");
        }
        messenger.map(|m| async move {
            if let Err(e) = m.send(target, text).await {
                warn!(channel = %target.channel, to = %target.to, "delivery failed: {e}");
            }
        })
    });
    futures_util::future::join_all(sends).await;
}
