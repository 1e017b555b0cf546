//! Pub/sub client with auto-reconnect, heartbeat and subscription replay.
//!
//! A background driver task owns the connection, the subscription
//! registry, the pending-request table and every timer. Callers talk to it
//! over a command channel, so all state mutation happens on one task and
//! no lock is ever held across I/O.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::Instrument;
use uuid::Uuid;

use wsbus_core::{
    ClientConfig, ClientError, Connector, Message, ReconnectPolicy, ReconnectState, Result,
    TransportEvent, TransportHandle,
};

use crate::heartbeat::{Beat, HeartbeatMonitor};
use crate::pending::{PendingRequests, Waiter};
use crate::router::Router;
use crate::state::{ClientEvent, ConnectionState};
use crate::subscriptions::{
    channel_callback, Callback, SubscriptionId, SubscriptionInfo, SubscriptionRegistry,
};
use crate::transport::WsConnector;

/// Command sent from callers to the driver task.
enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Send {
        message: Message,
        reply: oneshot::Sender<Result<()>>,
    },
    Request {
        message: Message,
        reply: Waiter,
    },
    CancelRequest {
        id: String,
    },
    Subscribe {
        id: SubscriptionId,
        topic: String,
        callback: Callback,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Subscriptions {
        reply: oneshot::Sender<Vec<SubscriptionInfo>>,
    },
    Close {
        reply: Option<oneshot::Sender<()>>,
    },
}

/// Builder for [`PubSubClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    span: Option<tracing::Span>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connector: Arc::new(WsConnector),
            span: None,
        }
    }

    /// Use a different transport (e.g. the in-memory connector in tests).
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Span every log line of this client is recorded under. Defaults to
    /// an `info` span named `wsbus` carrying the URL.
    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Spawn the driver task. Must be called inside a Tokio runtime.
    pub fn build(self) -> PubSubClient {
        let Self {
            config,
            connector,
            span,
        } = self;
        let span = span.unwrap_or_else(|| tracing::info_span!("wsbus", url = %config.url));
        let request_timeout = config.request_timeout();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = broadcast::channel(config.event_capacity.max(1));

        let driver = Driver {
            url: config.url.clone(),
            protocols: config.protocols.clone(),
            connector,
            policy: ReconnectPolicy::new(config.reconnect()),
            reconnect: ReconnectState::default(),
            state_tx,
            events: events_tx,
            registry: SubscriptionRegistry::new(),
            pending: PendingRequests::default(),
            heartbeat: HeartbeatMonitor::new(config.ping_interval(), config.reconnect_on_missed_pong),
            transport: None,
            opening: None,
            retry_at: None,
            connect_waiters: vec![],
        };
        tokio::spawn(driver.run(cmd_rx).instrument(span));

        PubSubClient {
            url: config.url,
            request_timeout,
            cmd_tx,
            state_rx,
            events_rx,
        }
    }
}

/// Resilient publish/subscribe client.
///
/// Subscriptions survive reconnects: after every successful (re)connect
/// each one is re-announced once, in registration order, before any
/// later command is processed.
pub struct PubSubClient {
    url: String,
    request_timeout: Option<Duration>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    events_rx: broadcast::Receiver<ClientEvent>,
}

impl PubSubClient {
    /// Client over WebSocket with the given config. Does not connect.
    pub fn new(config: ClientConfig) -> Self {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current connection state.
    pub fn status(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A receiver for client events emitted from now on.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events_rx.resubscribe()
    }

    /// Connect, retrying with backoff. Resolves once connected, or with
    /// `MaxReconnectsExceeded` / `Closed`. A no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect { reply })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Send a message. Fails with `NotConnected` unless connected; the
    /// caller decides whether to queue or retry.
    pub async fn send(&self, message: Message) -> Result<()> {
        if self.status() != ConnectionState::Connected {
            return Err(self.not_connected());
        }
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send { message, reply })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Send a correlated request and wait for its `response` or `error`.
    pub async fn request(&self, data: Value) -> Result<Value> {
        if self.status() != ConnectionState::Connected {
            return Err(self.not_connected());
        }
        let id = Uuid::new_v4().to_string();
        let (reply, rx) = oneshot::channel();
        self.command(Command::Request {
            message: Message::request(id.clone(), data),
            reply,
        })?;

        let Some(timeout) = self.request_timeout else {
            return rx.await.map_err(|_| ClientError::Closed)?;
        };
        match time::timeout(timeout, rx).await {
            Ok(result) => result.map_err(|_| ClientError::Closed)?,
            Err(_) => {
                let _ = self.cmd_tx.send(Command::CancelRequest { id });
                Err(ClientError::Timeout {
                    ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Subscribe `callback` to `topic`. The callback runs on the driver
    /// task and must not block.
    pub fn subscribe<F>(&self, topic: impl Into<String>, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.subscribe_with(topic.into(), Arc::new(callback))
    }

    /// Subscribe to `topic`, receiving payloads on a channel.
    pub fn subscribe_channel(
        &self,
        topic: impl Into<String>,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<Value>)> {
        let (callback, rx) = channel_callback();
        let id = self.subscribe_with(topic.into(), callback)?;
        Ok((id, rx))
    }

    /// Stop delivery for `id`. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        let _ = self.cmd_tx.send(Command::Unsubscribe { id: id.clone() });
    }

    /// Registered subscriptions in registration order.
    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let (reply, rx) = oneshot::channel();
        if self.command(Command::Subscriptions { reply }).is_err() {
            return vec![];
        }
        rx.await.unwrap_or_default()
    }

    /// Close the client. Cancels timers, fails outstanding requests with
    /// `Closed` and never reconnects. Idempotent.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.command(Command::Close { reply: Some(reply) }).is_ok() {
            let _ = rx.await;
        }
    }

    fn subscribe_with(&self, topic: String, callback: Callback) -> Result<SubscriptionId> {
        let id = SubscriptionId::generate();
        self.command(Command::Subscribe {
            id: id.clone(),
            topic,
            callback,
        })?;
        Ok(id)
    }

    fn not_connected(&self) -> ClientError {
        match self.status() {
            ConnectionState::Closed => ClientError::Closed,
            _ => ClientError::NotConnected,
        }
    }

    fn command(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| ClientError::Closed)
    }
}

impl Drop for PubSubClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Close { reply: None });
    }
}

/// A transport open in flight.
type OpenFuture = Pin<Box<dyn Future<Output = Result<TransportHandle>> + Send>>;

/// The connection state machine. Runs as a single task.
struct Driver {
    url: String,
    protocols: Vec<String>,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    reconnect: ReconnectState,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
    registry: SubscriptionRegistry,
    pending: PendingRequests,
    heartbeat: HeartbeatMonitor,
    transport: Option<TransportHandle>,
    opening: Option<OpenFuture>,
    retry_at: Option<Instant>,
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl Driver {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                // Commands first: a cancel or close queued before a frame
                // arrived is applied before that frame is routed.
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        None => {
                            self.shutdown();
                            return;
                        }
                        Some(Command::Close { reply }) => {
                            self.shutdown();
                            if let Some(reply) = reply {
                                let _ = reply.send(());
                            }
                            return;
                        }
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                opened = poll_open(&mut self.opening) => {
                    self.opening = None;
                    self.on_open_result(opened);
                }
                event = recv_transport(&mut self.transport) => self.handle_transport(event),
                _ = sleep_until(self.heartbeat.deadline()) => self.on_heartbeat_tick(),
                _ = sleep_until(self.retry_at) => {
                    self.retry_at = None;
                    self.open();
                }
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        if self.state() == next {
            return;
        }
        tracing::debug!(from = %self.state(), to = %next, "state transition");
        self.state_tx.send_replace(next);
        self.emit(ClientEvent::StateChanged(next));
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { reply } => match self.state() {
                ConnectionState::Connected => {
                    let _ = reply.send(Ok(()));
                }
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    self.connect_waiters.push(reply);
                }
                ConnectionState::Disconnected | ConnectionState::Failed => {
                    self.reconnect.reset();
                    self.connect_waiters.push(reply);
                    self.open();
                }
                ConnectionState::Closed => {
                    let _ = reply.send(Err(ClientError::Closed));
                }
            },
            Command::Send { message, reply } => {
                let result = if self.state() == ConnectionState::Connected {
                    self.write(&message)
                } else {
                    Err(ClientError::NotConnected)
                };
                let _ = reply.send(result);
            }
            Command::Request { message, reply } => {
                if self.state() != ConnectionState::Connected {
                    let _ = reply.send(Err(ClientError::NotConnected));
                    return;
                }
                match self.write(&message) {
                    Ok(()) => self.pending.insert(message.id, reply),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::CancelRequest { id } => {
                if self.pending.cancel(&id) {
                    tracing::debug!(request = %id, "request abandoned by caller");
                }
            }
            Command::Subscribe {
                id,
                topic,
                callback,
            } => {
                tracing::info!(subscription = %id, topic = %topic, "subscribe");
                let msg = self.registry.insert(id, topic, callback);
                if self.state() == ConnectionState::Connected {
                    let _ = self.write(&msg);
                }
            }
            Command::Unsubscribe { id } => {
                let Some(msg) = self.registry.remove(id.as_str()) else {
                    return;
                };
                tracing::info!(subscription = %id, "unsubscribe");
                if self.state() == ConnectionState::Connected {
                    let _ = self.write(&msg);
                }
            }
            Command::Subscriptions { reply } => {
                let _ = reply.send(self.registry.snapshot());
            }
            // Handled by `run`.
            Command::Close { .. } => {}
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(text) => {
                let reply = Router {
                    registry: &self.registry,
                    pending: &mut self.pending,
                    heartbeat: &mut self.heartbeat,
                    events: &self.events,
                }
                .route(&text);
                if let Some(reply) = reply {
                    let _ = self.write(&reply);
                }
            }
            TransportEvent::Closed(reason) => {
                tracing::warn!(url = %self.url, reason = %reason, "connection lost");
                self.on_connection_lost(ClientError::UnexpectedClose(reason));
            }
        }
    }

    fn on_heartbeat_tick(&mut self) {
        match self.heartbeat.on_tick(Instant::now()) {
            Beat::Probe(ping) => {
                let _ = self.write(&ping);
            }
            Beat::Missed => {
                self.on_connection_lost(ClientError::UnexpectedClose(
                    "heartbeat acknowledgment missed".into(),
                ));
            }
        }
    }

    /// Start a transport open. The run loop polls it alongside commands, so
    /// a `close()` issued meanwhile drops it.
    fn open(&mut self) {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.url, attempt = self.reconnect.attempt(), "connecting");

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let protocols = self.protocols.clone();
        self.opening = Some(Box::pin(async move { connector.open(&url, &protocols).await }));
    }

    fn on_open_result(&mut self, opened: Result<TransportHandle>) {
        match opened {
            Ok(handle) => self.on_open(handle),
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "transport open failed");
                // Any open failure counts toward the reconnect budget.
                let cause = if e.is_retryable() {
                    e
                } else {
                    ClientError::TransportOpen(e.to_string())
                };
                self.on_connection_lost(cause);
            }
        }
    }

    fn on_open(&mut self, handle: TransportHandle) {
        self.reconnect.reset();
        self.transport = Some(handle);
        self.heartbeat.start(Instant::now());

        let replay = self.registry.replay();
        tracing::info!(url = %self.url, subscriptions = replay.len(), "connected");
        for msg in &replay {
            if self.write(msg).is_err() {
                // The close event that follows drives the reconnect.
                break;
            }
        }

        self.set_state(ConnectionState::Connected);
        self.emit(ClientEvent::Connected);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    /// Open failure or involuntary close: tear down, then retry or give up.
    fn on_connection_lost(&mut self, cause: ClientError) {
        debug_assert!(cause.is_retryable(), "non-retryable cause {cause:?}");
        let was_connected = self.state() == ConnectionState::Connected;
        self.teardown_transport();
        if was_connected {
            self.emit(ClientEvent::Disconnected {
                reason: cause.to_string(),
            });
        }

        self.set_state(ConnectionState::Reconnecting);
        match self.reconnect.on_failure(&self.policy) {
            Some(delay) => {
                tracing::info!(
                    attempt = self.reconnect.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                self.retry_at = Some(Instant::now() + delay);
            }
            None => {
                let attempts = self.policy.config.max_attempts;
                tracing::error!(url = %self.url, attempts, error = %cause, "reconnect attempts exhausted");
                self.retry_at = None;
                self.set_state(ConnectionState::Failed);
                self.emit(ClientEvent::MaxReconnectsExceeded { attempts });
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(ClientError::MaxReconnectsExceeded { attempts }));
                }
            }
        }
    }

    fn teardown_transport(&mut self) {
        self.heartbeat.stop();
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        let failed = self.pending.fail_all(&ClientError::Closed);
        if failed > 0 {
            tracing::warn!(failed, "pending requests failed by connection teardown");
        }
    }

    fn shutdown(&mut self) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        let was_connected = self.state() == ConnectionState::Connected;
        self.retry_at = None;
        if self.opening.take().is_some() {
            tracing::debug!(url = %self.url, "transport open abandoned");
        }
        self.teardown_transport();
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(ClientError::Closed));
        }
        self.registry.clear();
        if was_connected {
            self.emit(ClientEvent::Disconnected {
                reason: "closed by client".into(),
            });
        }
        self.set_state(ConnectionState::Closed);
        tracing::info!(url = %self.url, "client closed");
    }

    fn write(&self, msg: &Message) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(ClientError::NotConnected)?;
        transport.send(msg.encode()?)
    }
}

async fn poll_open(opening: &mut Option<OpenFuture>) -> Result<TransportHandle> {
    match opening {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn recv_transport(transport: &mut Option<TransportHandle>) -> TransportEvent {
    match transport {
        Some(t) => t.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
