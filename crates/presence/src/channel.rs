//! The session-scoped presence channel.
//!
//! [`PresenceChannel`] is constructed once at application startup and
//! shared as `Arc<PresenceChannel>` with every consumer that needs
//! connection state, block-status lookups, or the outbound `call_ended`
//! signal. [`connect`](PresenceChannel::connect) spawns one driver task
//! (connect -> process -> reconnect loop); [`teardown`](PresenceChannel::teardown)
//! cancels it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use carelink_core::protocol::{encode, CallEnded, ClientMessage, ForceLeave};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::block_status::BlockStatusMap;
use crate::config::{ConfigError, PresenceConfig};
use crate::driver::run_connection_loop;
use crate::events::ChannelEvent;
use crate::state::{ConnectionSnapshot, ConnectionState};
use crate::transport::{default_connectors, Connector, TransportKind};

/// Broadcast channel capacity for channel events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long teardown waits for the driver task to exit.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer callback run for every `force_leave` signal.
pub type ForceLeaveHandler = Arc<dyn Fn(&ForceLeave) + Send + Sync>;

/// State shared between the channel handle and its driver task.
pub(crate) struct Shared {
    pub(crate) config: PresenceConfig,
    pub(crate) connectors: Vec<Arc<dyn Connector>>,
    pub(crate) block_status: BlockStatusMap,
    pub(crate) force_leave: Option<ForceLeaveHandler>,
    state_tx: watch::Sender<ConnectionSnapshot>,
    event_tx: broadcast::Sender<ChannelEvent>,
}

impl Shared {
    /// Publish to subscribers. Having none is not an error.
    pub(crate) fn publish(&self, event: ChannelEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn mark_connecting(&self) {
        self.state_tx.send_replace(ConnectionSnapshot {
            state: ConnectionState::Connecting,
            ..ConnectionSnapshot::closed()
        });
    }

    pub(crate) fn mark_open(&self, sid: &str, transport: TransportKind) {
        self.state_tx.send_replace(ConnectionSnapshot {
            state: ConnectionState::Open,
            sid: Some(sid.to_string()),
            transport: Some(transport),
            attempts: 0,
        });
    }

    pub(crate) fn mark_reconnecting(&self, attempts: u32) {
        self.state_tx.send_replace(ConnectionSnapshot {
            state: ConnectionState::Reconnecting,
            attempts,
            ..ConnectionSnapshot::closed()
        });
    }

    pub(crate) fn mark_closed(&self) {
        self.state_tx.send_modify(|snapshot| {
            snapshot.state = ConnectionState::Closed;
            snapshot.sid = None;
            snapshot.transport = None;
        });
    }
}

/// A running driver task and the handles needed to talk to it.
struct Driver {
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<String>,
    handle: JoinHandle<()>,
}

/// Client-side presence channel.
pub struct PresenceChannel {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
    /// Serializes connect/teardown so two drivers never overlap.
    lifecycle: tokio::sync::Mutex<()>,
}

/// Builder for [`PresenceChannel`].
pub struct PresenceChannelBuilder {
    config: PresenceConfig,
    connectors: Vec<Arc<dyn Connector>>,
    force_leave: Option<ForceLeaveHandler>,
}

impl PresenceChannelBuilder {
    /// Add a connector. When any are added they replace the transports
    /// derived from the configuration, tried in the order added.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connectors.push(Arc::new(connector));
        self
    }

    /// Register the callback run when the hub signals `force_leave`.
    pub fn on_force_leave<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ForceLeave) + Send + Sync + 'static,
    {
        self.force_leave = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<PresenceChannel, ConfigError> {
        let connectors = if self.connectors.is_empty() {
            default_connectors(&self.config)?
        } else {
            self.connectors
        };

        let (state_tx, _) = watch::channel(ConnectionSnapshot::closed());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(PresenceChannel {
            shared: Arc::new(Shared {
                config: self.config,
                connectors,
                block_status: BlockStatusMap::new(),
                force_leave: self.force_leave,
                state_tx,
                event_tx,
            }),
            driver: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }
}

impl PresenceChannel {
    pub fn builder(config: PresenceConfig) -> PresenceChannelBuilder {
        PresenceChannelBuilder {
            config,
            connectors: Vec::new(),
            force_leave: None,
        }
    }

    /// Channel over the configured transports with no force-leave callback.
    pub fn new(config: PresenceConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// Start (or restart) the connection.
    ///
    /// Any existing driver is cancelled and awaited first, so there is
    /// never more than one connection or set of listeners. Returns once the
    /// new driver is spawned; watch [`watch_state`](Self::watch_state) or
    /// [`subscribe`](Self::subscribe) to learn when the session opens.
    pub async fn connect(&self) {
        let _guard = self.lifecycle.lock().await;
        if self.stop_driver().await {
            tracing::info!("Replacing existing presence connection");
        }

        self.shared.mark_connecting();

        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_connection_loop(
            Arc::clone(&self.shared),
            outbound_rx,
            cancel.clone(),
        ));

        *self.driver_slot() = Some(Driver {
            cancel,
            outbound: outbound_tx,
            handle,
        });
    }

    /// Close the connection and cancel any pending reconnect timer.
    ///
    /// No events are processed once this starts. Safe to call when not
    /// connected.
    pub async fn teardown(&self) {
        let _guard = self.lifecycle.lock().await;
        if self.stop_driver().await {
            tracing::info!("Presence channel torn down");
        }
        self.shared.mark_closed();
    }

    /// Whether a session is open right now.
    pub fn is_connected(&self) -> bool {
        self.shared.state_tx.borrow().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().state
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.shared.state_tx.borrow().clone()
    }

    /// Receiver notified on every connection state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to lifecycle and domain events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Whether an administrator blocked `user_id`. Users the hub never
    /// mentioned are not blocked.
    pub fn is_blocked(&self, user_id: &str) -> bool {
        self.shared.block_status.is_blocked(user_id)
    }

    pub fn block_status(&self) -> &BlockStatusMap {
        &self.shared.block_status
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.shared.config
    }

    /// Tell the hub this client ended a call.
    ///
    /// Best-effort and non-blocking: the frame is queued for the driver
    /// and no acknowledgement is awaited. Invalid payloads and calls made
    /// while no session is open are dropped with a warning.
    pub fn emit_call_ended(&self, payload: CallEnded) {
        if let Err(e) = payload.validate() {
            tracing::warn!(error = %e, "Dropping invalid call_ended payload");
            return;
        }
        if !self.is_connected() {
            tracing::warn!(
                appointment_id = %payload.appointment_id,
                "Presence channel not connected, call_ended dropped",
            );
            return;
        }

        let appointment_id = payload.appointment_id.clone();
        let frame = match encode(&ClientMessage::CallEnded(payload)) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode call_ended");
                return;
            }
        };

        let queued = self
            .driver_slot()
            .as_ref()
            .is_some_and(|driver| driver.outbound.send(frame).is_ok());
        if queued {
            tracing::debug!(appointment_id = %appointment_id, "call_ended queued");
        } else {
            tracing::warn!(appointment_id = %appointment_id, "Presence driver gone, call_ended dropped");
        }
    }

    // ---- private helpers ----

    fn driver_slot(&self) -> MutexGuard<'_, Option<Driver>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel and await the current driver. Returns whether one existed.
    async fn stop_driver(&self) -> bool {
        let current = self.driver_slot().take();
        let Some(driver) = current else {
            return false;
        };

        driver.cancel.cancel();
        drop(driver.outbound);

        let abort = driver.handle.abort_handle();
        if tokio::time::timeout(TEARDOWN_TIMEOUT, driver.handle)
            .await
            .is_err()
        {
            tracing::warn!("Presence driver did not stop in time, aborting");
            abort.abort();
        }
        true
    }
}

impl Drop for PresenceChannel {
    fn drop(&mut self) {
        if let Some(driver) = self.driver_slot().take() {
            driver.cancel.cancel();
        }
    }
}
