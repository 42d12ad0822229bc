//! Price Stream Client - Resilient Live BTC Price Connection
//!
//! Owns one transport at a time to the backend's price stream, fans each
//! snapshot out to subscribers, and reconnects with exponential backoff
//! after unexpected closes.
//!
//! Lifecycle:
//! `Disconnected -> Connecting -> Connected -> Disconnected (retry) -> ...`
//! ending in `Error` once the attempt budget is spent.
//!
//! Each transport session runs in its own task. A generation counter
//! tags every session; events from a superseded generation are ignored,
//! which is what keeps a deliberate close from ever scheduling a retry.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::subscribers::{PriceCallback, SubscriberRegistry, Subscription};
use crate::domain::{BackoffPolicy, ConnectionStatus, PriceSnapshot, StreamEndpoint};
use crate::error::{StreamError, StreamResult};
use crate::ports::transport::NORMAL_CLOSURE;
use crate::ports::{TokenSource, TransportConnector, TransportEvent};

/// How long `disconnect()` waits for a session to close its transport.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Tunables for the stream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Reconnect policy.
    pub backoff: BackoffPolicy,
    /// Window for `get_bitcoin_price()`.
    pub price_timeout: Duration,
    /// Capacity of the snapshot/error broadcast channels.
    pub channel_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            price_timeout: Duration::from_secs(10),
            channel_capacity: 64,
        }
    }
}

/// A live transport session owned by the client.
struct Session {
    /// Dropping or firing this tells the session to close deliberately.
    close_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Mutable connection state. Never held across an `.await`.
struct ClientState {
    status: ConnectionStatus,
    generation: u64,
    retry_count: u32,
    retry_delay: Duration,
    /// Token the current (or last) session was opened with.
    token: Option<String>,
    session: Option<Session>,
    retry_timer: Option<JoinHandle<()>>,
    latest: Option<PriceSnapshot>,
}

/// Who is asking for a connection attempt.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// `connect()` or a consumer that needs a connection.
    Caller,
    /// The backoff timer armed by the given generation.
    Retry(u64),
}

/// Outcome of `Shared::begin`.
enum Begin {
    Started,
    AlreadyConnected,
    Skipped,
}

struct Shared {
    connector: Arc<dyn TransportConnector>,
    tokens: Arc<dyn TokenSource>,
    endpoint: StreamEndpoint,
    settings: StreamSettings,
    state: Mutex<ClientState>,
    subscribers: Arc<SubscriberRegistry>,
    status_tx: watch::Sender<ConnectionStatus>,
    /// Running count of reconnects scheduled by the backoff path.
    reconnects_tx: watch::Sender<u64>,
    snapshot_tx: broadcast::Sender<PriceSnapshot>,
    error_tx: broadcast::Sender<StreamError>,
}

/// Live BTC price stream client.
///
/// Constructed explicitly and owned by the application; dropping it
/// tears the connection down without triggering a reconnect.
pub struct PriceStreamClient {
    shared: Arc<Shared>,
}

impl PriceStreamClient {
    /// Create a disconnected client.
    pub fn new(
        connector: Arc<dyn TransportConnector>,
        tokens: Arc<dyn TokenSource>,
        endpoint: StreamEndpoint,
        settings: StreamSettings,
    ) -> Self {
        let capacity = settings.channel_capacity.max(1);
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (reconnects_tx, _) = watch::channel(0);
        let (snapshot_tx, _) = broadcast::channel(capacity);
        let (error_tx, _) = broadcast::channel(capacity);

        Self {
            shared: Arc::new(Shared {
                connector,
                tokens,
                endpoint,
                settings,
                state: Mutex::new(ClientState {
                    status: ConnectionStatus::Disconnected,
                    generation: 0,
                    retry_count: 0,
                    retry_delay: settings.backoff.initial_delay,
                    token: None,
                    session: None,
                    retry_timer: None,
                    latest: None,
                }),
                subscribers: SubscriberRegistry::new(),
                status_tx,
                reconnects_tx,
                snapshot_tx,
                error_tx,
            }),
        }
    }

    /// Open the price stream.
    ///
    /// Resolves once the transport is open. If the first attempt fails the
    /// error is returned and the backoff path keeps retrying in the
    /// background. Already connected is a no-op.
    ///
    /// # Errors
    /// - `MissingToken` if the session has no auth token (never retried)
    /// - `AlreadyConnecting` if another attempt is in flight
    /// - `Transport`/`Closed` if the first attempt fails
    /// - `Cancelled` if `disconnect()` wins the race
    #[instrument(skip(self))]
    pub async fn connect(&self) -> StreamResult<()> {
        let (opened_tx, opened_rx) = oneshot::channel();
        match self.shared.begin(Trigger::Caller, Some(opened_tx))? {
            Begin::AlreadyConnected | Begin::Skipped => Ok(()),
            Begin::Started => opened_rx.await.unwrap_or(Err(StreamError::Cancelled)),
        }
    }

    /// Close the stream deliberately.
    ///
    /// Resets the retry budget, cancels any pending reconnect and removes
    /// every subscriber. No reconnect follows.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let session = self.shared.teardown();
        self.shared.subscribers.clear();
        close_session(session).await;
        info!("Price stream disconnected");
    }

    /// Register a price callback.
    ///
    /// Called synchronously, in registration order, for every snapshot.
    /// Drop or `unsubscribe()` the returned handle to remove it.
    pub fn on_price_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Decimal) + Send + Sync + 'static,
    {
        let callback: PriceCallback = Arc::new(callback);
        self.shared.subscribers.register(callback)
    }

    /// Price of the next snapshot received after this call.
    ///
    /// Opens the stream if needed. Concurrent callers all resolve with
    /// the same upcoming snapshot.
    ///
    /// # Errors
    /// `Timeout` if nothing arrives within the configured window, or the
    /// connection error if the stream cannot be opened.
    #[instrument(skip(self))]
    pub async fn get_bitcoin_price(&self) -> StreamResult<Decimal> {
        let mut rx = self.shared.snapshot_tx.subscribe();
        let window = self.shared.settings.price_timeout;

        let wait = async {
            self.ensure_connected().await?;
            loop {
                match rx.recv().await {
                    Ok(snapshot) => return Ok(snapshot.price),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Price request lagged behind the stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(StreamError::Cancelled);
                    }
                }
            }
        };

        match tokio::time::timeout(window, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = window.as_millis() as u64, "No price update received in time");
                Err(StreamError::Timeout(window))
            }
        }
    }

    /// Re-read the auth token and reconnect with it if a connection is
    /// open or opening.
    ///
    /// The reconnect is deliberate: the retry budget is reset and no
    /// backoff delay applies. Subscribers are kept.
    ///
    /// # Errors
    /// `MissingToken` if the token was cleared (the old connection is
    /// closed anyway), or the error of the new connection attempt.
    #[instrument(skip(self))]
    pub async fn update_auth_token(&self) -> StreamResult<()> {
        let token = self.shared.current_token();

        {
            let mut state = self.shared.state();
            let active = matches!(
                state.status,
                ConnectionStatus::Connected | ConnectionStatus::Connecting
            );
            if !active {
                state.token = token.clone();
                debug!(has_token = token.is_some(), "Auth token refreshed while idle");
                return Ok(());
            }
            if state.token == token {
                debug!("Auth token unchanged, keeping connection");
                return Ok(());
            }
        }

        info!("Auth token changed, reopening price stream");
        let session = self.shared.teardown();
        close_session(session).await;

        if token.is_none() {
            warn!("Auth token cleared, price stream stays closed");
            return Err(StreamError::MissingToken);
        }

        match self.connect().await {
            Err(StreamError::AlreadyConnecting) => Ok(()),
            other => other,
        }
    }

    /// Current connection status.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.shared.state().status
    }

    /// Watch status transitions.
    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Watch the number of reconnects scheduled since construction.
    pub fn reconnects_scheduled(&self) -> watch::Receiver<u64> {
        self.shared.reconnects_tx.subscribe()
    }

    /// Every parsed snapshot, delivered after the subscriber callbacks.
    pub fn snapshots(&self) -> broadcast::Receiver<PriceSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Errors reported to observers (parse, transport, exhaustion).
    pub fn errors(&self) -> broadcast::Receiver<StreamError> {
        self.shared.error_tx.subscribe()
    }

    /// Most recent snapshot, if any arrived since construction.
    pub fn latest_snapshot(&self) -> Option<PriceSnapshot> {
        self.shared.state().latest.clone()
    }

    /// Retries scheduled since the last successful open, and the delay
    /// the next one would use.
    pub fn retry_state(&self) -> (u32, Duration) {
        let state = self.shared.state();
        (state.retry_count, state.retry_delay)
    }

    /// Number of registered price callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    async fn ensure_connected(&self) -> StreamResult<()> {
        match self.connect().await {
            Ok(()) | Err(StreamError::AlreadyConnecting) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for PriceStreamClient {
    fn drop(&mut self) {
        // Dropping the close sender is the close signal.
        drop(self.shared.teardown());
        self.shared.subscribers.clear();
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_status(&self, state: &mut ClientState, status: ConnectionStatus) {
        if state.status != status {
            debug!(from = %state.status, to = %status, "Price stream status change");
        }
        state.status = status;
        self.status_tx.send_replace(status);
    }

    fn current_token(&self) -> Option<String> {
        self.tokens
            .auth_token()
            .filter(|token| !token.trim().is_empty())
    }

    /// Start a connection attempt if the state allows it.
    fn begin(
        self: &Arc<Self>,
        trigger: Trigger,
        opened: Option<oneshot::Sender<StreamResult<()>>>,
    ) -> StreamResult<Begin> {
        let mut state = self.state();

        match (trigger, state.status) {
            (_, ConnectionStatus::Connecting) => {
                return match trigger {
                    Trigger::Caller => Err(StreamError::AlreadyConnecting),
                    Trigger::Retry(_) => Ok(Begin::Skipped),
                };
            }
            (Trigger::Caller, ConnectionStatus::Connected) => return Ok(Begin::AlreadyConnected),
            (Trigger::Retry(_), ConnectionStatus::Connected | ConnectionStatus::Error) => {
                return Ok(Begin::Skipped);
            }
            (Trigger::Retry(armed_by), ConnectionStatus::Disconnected) => {
                if armed_by != state.generation {
                    return Ok(Begin::Skipped);
                }
                // This runs inside the timer task; let the handle go.
                state.retry_timer = None;
            }
            (Trigger::Caller, ConnectionStatus::Error) => {
                info!("Restarting price stream after exhausted retries");
                state.retry_count = 0;
                state.retry_delay = self.settings.backoff.initial_delay;
            }
            (Trigger::Caller, ConnectionStatus::Disconnected) => {
                if let Some(timer) = state.retry_timer.take() {
                    debug!("Pending reconnect superseded by explicit connect");
                    timer.abort();
                }
            }
        }

        let Some(token) = self.current_token() else {
            warn!("Cannot open price stream without an auth token");
            if let Trigger::Retry(_) = trigger {
                self.set_status(&mut state, ConnectionStatus::Error);
                let _ = self.error_tx.send(StreamError::MissingToken);
            }
            return Err(StreamError::MissingToken);
        };

        let url = self.endpoint.with_token(&token);
        state.token = Some(token);
        state.generation += 1;
        let generation = state.generation;
        self.set_status(&mut state, ConnectionStatus::Connecting);

        info!(
            generation,
            attempt = state.retry_count + 1,
            endpoint = %self.endpoint.base(),
            "Opening price stream"
        );

        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(Arc::clone(self).run_session(generation, url, close_rx, opened));
        state.session = Some(Session { close_tx, task });

        Ok(Begin::Started)
    }

    /// Deliberate teardown: invalidate the current generation, cancel the
    /// retry timer, reset the budget. Returns the session to close.
    fn teardown(&self) -> Option<Session> {
        let mut state = self.state();
        if let Some(timer) = state.retry_timer.take() {
            timer.abort();
        }
        state.generation += 1;
        state.retry_count = 0;
        state.retry_delay = self.settings.backoff.initial_delay;
        self.set_status(&mut state, ConnectionStatus::Disconnected);
        state.session.take()
    }

    /// One transport session: open, stream, and report how it ended.
    async fn run_session(
        self: Arc<Self>,
        generation: u64,
        url: Url,
        mut close_rx: oneshot::Receiver<()>,
        opened: Option<oneshot::Sender<StreamResult<()>>>,
    ) {
        let opening = tokio::select! {
            biased;
            _ = &mut close_rx => {
                debug!(generation, "Connection attempt abandoned");
                return;
            }
            result = self.connector.open(&url) => result,
        };

        let mut transport = match opening {
            Ok(transport) => transport,
            Err(e) => {
                warn!(generation, error = %e, "Price stream failed to open");
                // Leave `Connecting` before the caller hears about it.
                self.on_unexpected_close(generation, e.clone());
                if let Some(tx) = opened {
                    let _ = tx.send(Err(e));
                }
                return;
            }
        };

        if !self.on_open(generation) {
            transport.close(NORMAL_CLOSURE).await;
            return;
        }
        if let Some(tx) = opened {
            let _ = tx.send(Ok(()));
        }

        loop {
            tokio::select! {
                biased;
                _ = &mut close_rx => {
                    transport.close(NORMAL_CLOSURE).await;
                    debug!(generation, "Price stream closed deliberately");
                    return;
                }
                event = transport.next_event() => match event {
                    TransportEvent::Message(text) => self.on_message(generation, &text),
                    TransportEvent::Closed { code, reason } => {
                        drop(transport);
                        self.on_unexpected_close(generation, StreamError::Closed { code, reason });
                        return;
                    }
                    TransportEvent::Error(e) => {
                        warn!(generation, error = %e, "Price stream transport error");
                        drop(transport);
                        self.on_unexpected_close(generation, StreamError::Transport(e));
                        return;
                    }
                },
            }
        }
    }

    /// Transport opened. Returns false if this session is stale.
    fn on_open(&self, generation: u64) -> bool {
        let mut state = self.state();
        if state.generation != generation {
            return false;
        }
        state.retry_count = 0;
        state.retry_delay = self.settings.backoff.initial_delay;
        self.set_status(&mut state, ConnectionStatus::Connected);
        info!(generation, "Price stream connected");
        true
    }

    fn on_message(&self, generation: u64, text: &str) {
        let snapshot = match PriceSnapshot::parse(text) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(generation, error = %e, "Dropping malformed price message");
                let _ = self.error_tx.send(e);
                return;
            }
        };

        {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.latest = Some(snapshot.clone());
        }

        debug!(
            price = %snapshot.price,
            timestamp_ms = snapshot.timestamp_ms,
            sources = snapshot.sources.len(),
            "Price update"
        );

        self.subscribers.notify(snapshot.price);
        let _ = self.snapshot_tx.send(snapshot);
    }

    /// Transport closed or failed without being asked to.
    fn on_unexpected_close(self: &Arc<Self>, generation: u64, cause: StreamError) {
        let mut state = self.state();
        if state.generation != generation {
            debug!(generation, "Ignoring close of superseded session");
            return;
        }
        state.session = None;
        let _ = self.error_tx.send(cause.clone());

        let backoff = self.settings.backoff;
        if !backoff.allows_retry(state.retry_count) {
            let attempts = state.retry_count + 1;
            self.set_status(&mut state, ConnectionStatus::Error);
            error!(attempts, error = %cause, "Price stream reconnect budget exhausted");
            let _ = self.error_tx.send(StreamError::RetriesExhausted { attempts });
            return;
        }

        let delay = state.retry_delay;
        state.retry_count += 1;
        state.retry_delay = backoff.next_delay(delay);
        self.reconnects_tx.send_modify(|n| *n += 1);
        self.set_status(&mut state, ConnectionStatus::Disconnected);

        warn!(
            retry = state.retry_count,
            delay_ms = delay.as_millis() as u64,
            error = %cause,
            "Price stream disconnected, scheduling reconnect"
        );

        let shared = Arc::clone(self);
        state.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = shared.begin(Trigger::Retry(generation), None) {
                error!(error = %e, "Scheduled reconnect could not start");
            }
        }));
    }
}

/// Signal a session to close and wait (bounded) for it to finish.
async fn close_session(session: Option<Session>) {
    let Some(Session { close_tx, task }) = session else {
        return;
    };
    drop(close_tx);

    let abort = task.abort_handle();
    if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
        warn!("Price stream session did not close in time, aborting");
        abort.abort();
    }
}
