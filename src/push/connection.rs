//! Push connection manager.
//!
//! Owns the lifecycle of one logical push connection: connect, detect loss,
//! reconnect with backoff, and hand every notification event to the
//! registered handlers in delivery order. It never touches notification
//! state itself and does not de-duplicate across reconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::heartbeat::Heartbeat;
use super::messages::{decode_frame, ClientMessage, PushFrame};
use super::reconnect_policy::ReconnectPolicy;
use super::transport::{PushStream, PushTransport, TransportError};
use crate::metrics;
use crate::notifications::PushEvent;
use crate::session::{Credentials, SessionExpirySignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&PushEvent) + Send + Sync>;
pub type ConnectedHandler = Arc<dyn Fn() + Send + Sync>;

/// State shared between the manager and its run task.
struct Shared {
    state: watch::Sender<ConnectionState>,
    /// Stamp of the latest connection attempt. Bumped by every attempt and
    /// by `stop()`; an attempt whose stamp is no longer current is stale.
    attempt: AtomicU64,
    event_handlers: Mutex<Vec<EventHandler>>,
    connected_handlers: Mutex<Vec<ConnectedHandler>>,
}

impl Shared {
    fn next_attempt(&self) -> u64 {
        self.attempt.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.attempt.load(Ordering::SeqCst) == attempt
    }

    fn set_state(&self, attempt: u64, state: ConnectionState) -> bool {
        if !self.is_current(attempt) {
            debug!(
                "Attempt {} is stale, not moving to {}",
                attempt,
                state.as_str()
            );
            return false;
        }
        self.state.send_replace(state);
        metrics::set_push_connected(state == ConnectionState::Connected);
        true
    }

    fn dispatch(&self, event: &PushEvent) {
        let handlers = self.event_handlers.lock().unwrap().clone();
        for handler in handlers.iter() {
            handler(event);
        }
    }

    fn notify_connected(&self) {
        let handlers = self.connected_handlers.lock().unwrap().clone();
        for handler in handlers.iter() {
            handler();
        }
    }
}

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// What woke the pump loop.
enum Wake {
    Frame(Option<Result<String, TransportError>>),
    Ping,
}

enum PumpExit {
    Cancelled,
    Lost,
    AuthRejected,
}

pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    policy: ReconnectPolicy,
    heartbeat: Heartbeat,
    signal: SessionExpirySignal,
    shared: Arc<Shared>,
    run: Mutex<Option<RunHandle>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        policy: ReconnectPolicy,
        signal: SessionExpirySignal,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            policy,
            heartbeat: Heartbeat::default(),
            signal,
            shared: Arc::new(Shared {
                state,
                attempt: AtomicU64::new(0),
                event_handlers: Mutex::new(Vec::new()),
                connected_handlers: Mutex::new(Vec::new()),
            }),
            run: Mutex::new(None),
        }
    }

    /// Replace the default ping interval and idle timeout.
    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Current value of the attempt counter.
    pub fn attempt(&self) -> u64 {
        self.shared.attempt.load(Ordering::SeqCst)
    }

    /// Register a handler invoked once per notification event, in delivery order.
    pub fn on_event(&self, handler: impl Fn(&PushEvent) + Send + Sync + 'static) {
        self.shared
            .event_handlers
            .lock()
            .unwrap()
            .push(Arc::new(handler));
    }

    /// Register a handler invoked every time a connection is established.
    pub fn on_connected(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.shared
            .connected_handlers
            .lock()
            .unwrap()
            .push(Arc::new(handler));
    }

    /// Open the push connection for `credentials`.
    ///
    /// Never fails: connection errors move the manager to `Reconnecting` and
    /// are retried in the background. Any previous connection is torn down
    /// first.
    pub async fn start(&self, credentials: Credentials) {
        self.stop().await;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            self.shared.clone(),
            self.transport.clone(),
            self.policy.clone(),
            self.heartbeat.clone(),
            self.signal.clone(),
            credentials,
            cancel.clone(),
        ));

        *self.run.lock().unwrap() = Some(RunHandle { cancel, task });
    }

    /// Tear down the connection and cancel any pending reconnect.
    ///
    /// Once this returns the transport is released and no earlier attempt
    /// can change the connection state.
    pub async fn stop(&self) {
        let run = self.run.lock().unwrap().take();
        self.shared.attempt.fetch_add(1, Ordering::SeqCst);

        if let Some(run) = run {
            run.cancel.cancel();
            if let Err(e) = run.task.await {
                if !e.is_cancelled() {
                    warn!("Push connection task ended abnormally: {}", e);
                }
            }
            info!("Push connection stopped");
        }

        self.shared.state.send_replace(ConnectionState::Disconnected);
        metrics::set_push_connected(false);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.attempt.fetch_add(1, Ordering::SeqCst);
        if let Some(run) = self.run.get_mut().ok().and_then(|r| r.take()) {
            run.cancel.cancel();
            run.task.abort();
        }
    }
}

async fn run(
    shared: Arc<Shared>,
    transport: Arc<dyn PushTransport>,
    policy: ReconnectPolicy,
    heartbeat: Heartbeat,
    signal: SessionExpirySignal,
    credentials: Credentials,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;
    let mut reconnecting = false;

    loop {
        let attempt = shared.next_attempt();
        let state = if reconnecting {
            metrics::record_reconnect_attempt();
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        if !shared.set_state(attempt, state) {
            return;
        }

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = transport.connect(&credentials) => result,
        };

        match connected {
            Ok(mut stream) => {
                if !shared.is_current(attempt) {
                    debug!("Discarding connection from stale attempt {}", attempt);
                    stream.close().await;
                    return;
                }

                info!("Push connection established (attempt {})", attempt);
                failures = 0;
                shared.set_state(attempt, ConnectionState::Connected);
                shared.notify_connected();

                let exit = pump(&shared, attempt, &heartbeat, &mut stream, &cancel).await;
                stream.close().await;

                match exit {
                    PumpExit::Cancelled => return,
                    PumpExit::AuthRejected => {
                        warn!("Push connection rejected the session");
                        signal.report_unauthorized(credentials.generation, transport.endpoint());
                        shared.set_state(attempt, ConnectionState::Disconnected);
                        return;
                    }
                    PumpExit::Lost => {}
                }
            }
            Err(e) if e.is_auth() => {
                warn!("Push connection rejected the credential");
                signal.report_unauthorized(credentials.generation, transport.endpoint());
                shared.set_state(attempt, ConnectionState::Disconnected);
                return;
            }
            Err(e) => {
                debug!("Push connection attempt {} failed: {}", attempt, e);
            }
        }

        reconnecting = true;
        if !shared.set_state(attempt, ConnectionState::Reconnecting) {
            return;
        }

        let delay = policy.delay(failures);
        failures = failures.saturating_add(1);
        debug!("Reconnecting in {:?} (failure {})", delay, failures);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Read frames until the connection ends or the run is cancelled.
///
/// Pings the server every `ping_interval`. Any frame counts as traffic;
/// none for `idle_timeout` means the connection is gone.
async fn pump(
    shared: &Shared,
    attempt: u64,
    heartbeat: &Heartbeat,
    stream: &mut Box<dyn PushStream>,
    cancel: &CancellationToken,
) -> PumpExit {
    let mut ping = tokio::time::interval_at(
        Instant::now() + heartbeat.ping_interval,
        heartbeat.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let idle = tokio::time::sleep(heartbeat.idle_timeout);
    tokio::pin!(idle);

    loop {
        let wake = tokio::select! {
            _ = cancel.cancelled() => return PumpExit::Cancelled,
            _ = &mut idle => {
                warn!("No push traffic for {:?}, dropping connection", heartbeat.idle_timeout);
                return PumpExit::Lost;
            }
            _ = ping.tick() => Wake::Ping,
            frame = stream.next_frame() => Wake::Frame(frame),
        };

        let frame = match wake {
            Wake::Ping => {
                // A stuck write must not outlive the idle window
                let ping = stream.send_text(ClientMessage::ping().to_frame());
                match tokio::time::timeout_at(idle.deadline(), ping).await {
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => warn!("Push heartbeat failed: {}", e),
                    Err(_) => warn!("Push heartbeat stuck, dropping connection"),
                }
                return PumpExit::Lost;
            }
            Wake::Frame(frame) => frame,
        };
        idle.as_mut().reset(Instant::now() + heartbeat.idle_timeout);

        let text = match frame {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                warn!("Push connection lost: {}", e);
                return PumpExit::Lost;
            }
            None => {
                info!("Push connection closed by server");
                return PumpExit::Lost;
            }
        };

        if !shared.is_current(attempt) {
            return PumpExit::Cancelled;
        }

        match decode_frame(&text) {
            Ok(PushFrame::Notification(event)) => {
                debug!("Push event {} ({})", event.id, event.notification_type.as_str());
                shared.dispatch(&event);
            }
            Ok(PushFrame::Error(error)) if error.is_auth() => return PumpExit::AuthRejected,
            Ok(PushFrame::Error(error)) => {
                warn!("Push server error {}: {}", error.code, error.message);
            }
            Ok(PushFrame::Connected(connected)) => {
                debug!("Push server version {:?}", connected.server_version);
            }
            Ok(PushFrame::Pong) => debug!("Push heartbeat answered"),
            Ok(PushFrame::Ignored(msg_type)) => {
                debug!("Ignoring push message of type {}", msg_type);
                metrics::record_push_dropped("unhandled_type");
            }
            Err(e) => {
                warn!("Dropping malformed push frame: {}", e);
                metrics::record_push_dropped("malformed");
            }
        }
    }
}
