//! Shared test fixtures: a scripted in-memory transport and token sources.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use btc_price_stream::domain::{StreamEndpoint, DEFAULT_STREAM_PATH};
use btc_price_stream::ports::transport::ABNORMAL_CLOSURE;
use btc_price_stream::ports::{Transport, TransportConnector, TransportEvent, TokenSource};
use btc_price_stream::{PriceStreamClient, StreamError, StreamSettings};

pub const TOKEN: &str = "header.payload.signature";

/// What the next `open()` does.
pub enum Outcome {
    /// Handshake fails.
    Fail(String),
    /// Handshake succeeds; events come from the receiver.
    Accept(mpsc::UnboundedReceiver<TransportEvent>),
    /// Handshake never completes.
    Pending,
}

/// Connector that plays back a script of outcomes. Once the script runs
/// out every attempt fails.
#[derive(Default)]
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Outcome>>,
    opens: Mutex<Vec<(Url, Instant)>>,
    closes: Arc<Mutex<Vec<u16>>>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: Outcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Queue a successful open and return the feed for it.
    pub fn accept(&self) -> mpsc::UnboundedSender<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Outcome::Accept(rx));
        tx
    }

    pub fn fail(&self) {
        self.push(Outcome::Fail("connection refused".into()));
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn open_urls(&self) -> Vec<Url> {
        self.opens.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    /// Close codes sent by the client, in order.
    pub fn close_codes(&self) -> Vec<u16> {
        self.closes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>, StreamError> {
        self.opens.lock().unwrap().push((url.clone(), Instant::now()));
        let next = self.script.lock().unwrap().pop_front();

        match next {
            Some(Outcome::Accept(rx)) => Ok(Box::new(ScriptedTransport {
                rx,
                closes: Arc::clone(&self.closes),
            })),
            Some(Outcome::Pending) => std::future::pending().await,
            Some(Outcome::Fail(reason)) => Err(StreamError::Transport(reason)),
            None => Err(StreamError::Transport("script exhausted".into())),
        }
    }
}

/// Transport fed by a test-held sender. Dropping the sender looks like
/// the server vanishing.
struct ScriptedTransport {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    closes: Arc<Mutex<Vec<u16>>>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn next_event(&mut self) -> TransportEvent {
        self.rx.recv().await.unwrap_or(TransportEvent::Closed {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        })
    }

    async fn close(&mut self, code: u16) {
        self.closes.lock().unwrap().push(code);
    }
}

/// Token source whose value tests can swap.
#[derive(Default)]
pub struct SwappableToken(Mutex<Option<String>>);

impl SwappableToken {
    pub fn with(token: &str) -> Arc<Self> {
        let source = Self::default();
        source.set(Some(token));
        Arc::new(source)
    }

    pub fn set(&self, token: Option<&str>) {
        *self.0.lock().unwrap() = token.map(str::to_string);
    }
}

impl TokenSource for SwappableToken {
    fn auth_token(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }
}

pub fn endpoint() -> StreamEndpoint {
    StreamEndpoint::resolve(None, "http://localhost:3000", DEFAULT_STREAM_PATH).unwrap()
}

pub fn client(
    connector: &Arc<ScriptedConnector>,
    tokens: Arc<dyn TokenSource>,
) -> Arc<PriceStreamClient> {
    Arc::new(PriceStreamClient::new(
        Arc::clone(connector) as Arc<dyn TransportConnector>,
        tokens,
        endpoint(),
        StreamSettings::default(),
    ))
}

/// A wire message with the given price.
pub fn price_msg(price: &str) -> TransportEvent {
    TransportEvent::Message(format!(
        r#"{{"price":{price},"timestamp":1700000000000,"sources":{{"binance":{price}}}}}"#
    ))
}
