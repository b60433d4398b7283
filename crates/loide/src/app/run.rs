//! Client side of the solver service protocol.
//!
//! One connection per session. The transport never reconnects on its own: a dropped or refused
//! connection leaves the client disconnected until the next request reopens it. Requests are fire
//! and forget; their outcome arrives later through [`RunClient::pump`] and is published to every
//! subscriber. Responses carry no correlation id, so when several runs overlap the last response
//! to arrive is the one left on screen.

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::app::catalog::Catalog;
use crate::app::form::WireForm;

pub const CONNECTION_ERROR: &str =
    "Unable to connect to the server, maybe you or the server are offline.\nTry it later.";
pub const LANGUAGES_ERROR: &str =
    "Failed to get the languages. Maybe the server or you are offline.\nTry it later.";

/// Channel names used on the wire.
pub mod channel {
    pub const RUN: &str = "run";
    pub const GET_LANGUAGES: &str = "getLanguages";
    pub const OUTPUT: &str = "output";
    pub const PROBLEM: &str = "problem";
    pub const LANGUAGES: &str = "languages";
}

/// A named message travelling over the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// What a transport reports back to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    ConnectFailed(String),
    Frame(Frame),
    Closed(Option<String>),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("connection closed")]
    Closed,
}

/// Duplex connection to the solver service.
///
/// `open` starts connecting without blocking and `send` queues frames until the connection is up.
/// A failed `open` must surface as [`TransportEvent::ConnectFailed`] on a later `poll`. After
/// `close`, events from the previous connection are discarded.
pub trait Transport {
    fn open(&mut self);
    fn send(&mut self, frame: Frame) -> Result<(), TransportError>;
    fn poll(&mut self) -> Option<TransportEvent>;
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) {
        (**self).open()
    }

    fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        (**self).poll()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Payload of the `output` channel. An empty `error` means the run succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub error: String,
}

/// Payload of the `problem` channel and of connection failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub reason: String,
}

impl Problem {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Demultiplexed responses published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Output(RunOutput),
    Problem(Problem),
    Languages(Catalog),
    ConnectError(Problem),
}

#[derive(Debug)]
pub struct RunClient<T: Transport> {
    transport: T,
    state: ConnectionState,
    subscribers: Vec<Sender<ClientEvent>>,
    pending_runs: usize,
}

impl<T: Transport> RunClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            subscribers: Vec::new(),
            pending_runs: 0,
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&mut self) -> Receiver<ClientEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(sender);
        receiver
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Runs sent whose `output` or `problem` response has not arrived yet.
    pub fn pending_runs(&self) -> usize {
        self.pending_runs
    }

    pub fn request_languages(&mut self) {
        self.emit(Frame::new(channel::GET_LANGUAGES, None));
    }

    /// Send a run request carrying the JSON string of `form`.
    pub fn request_run(&mut self, form: &WireForm) {
        let payload = match serde_json::to_string(form) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode run request");
                return;
            }
        };
        self.pending_runs += 1;
        self.emit(Frame::new(channel::RUN, Some(Value::String(payload))));
    }

    /// Drain transport events, publishing responses. Returns how many events were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.transport.poll() {
            handled += 1;
            match event {
                TransportEvent::Connected => {
                    tracing::info!("connected to solver service");
                    self.state = ConnectionState::Connected;
                }
                TransportEvent::ConnectFailed(reason) => {
                    tracing::warn!(%reason, "connection to solver service failed");
                    self.state = ConnectionState::Disconnected;
                    self.pending_runs = 0;
                    self.publish(ClientEvent::ConnectError(Problem::new(CONNECTION_ERROR)));
                }
                TransportEvent::Closed(reason) => {
                    tracing::info!(reason = reason.as_deref().unwrap_or(""), "connection closed");
                    self.state = ConnectionState::Disconnected;
                }
                TransportEvent::Frame(frame) => {
                    if let Some(event) = self.demultiplex(frame) {
                        self.publish(event);
                    }
                }
            }
        }
        handled
    }

    pub fn disconnect(&mut self) {
        self.transport.close();
        self.state = ConnectionState::Disconnected;
    }

    fn emit(&mut self, frame: Frame) {
        let reused = self.state != ConnectionState::Disconnected;
        if !reused {
            self.reopen();
        }
        tracing::debug!(event = %frame.event, "emitting request");
        let err = match self.transport.send(frame.clone()) {
            Ok(()) => return,
            Err(err) => err,
        };
        if !reused {
            // A refused connection reports itself through `ConnectFailed` on the next pump.
            tracing::debug!(error = %err, "request dropped");
            return;
        }
        // The connection went away before its `Closed` event was pumped.
        tracing::info!(error = %err, "connection lost, reconnecting before send");
        self.transport.close();
        self.reopen();
        if let Err(err) = self.transport.send(frame) {
            tracing::debug!(error = %err, "request dropped");
        }
    }

    fn reopen(&mut self) {
        tracing::debug!("opening connection before send");
        self.state = ConnectionState::Connecting;
        self.transport.open();
    }

    fn demultiplex(&mut self, frame: Frame) -> Option<ClientEvent> {
        let data = frame.data.unwrap_or(Value::Null);
        match frame.event.as_str() {
            channel::OUTPUT => {
                self.pending_runs = self.pending_runs.saturating_sub(1);
                let output = decode_payload::<RunOutput>(data).unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "malformed output payload");
                    RunOutput::default()
                });
                Some(ClientEvent::Output(output))
            }
            channel::PROBLEM => {
                self.pending_runs = self.pending_runs.saturating_sub(1);
                let problem = decode_payload::<Problem>(data).unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "malformed problem payload");
                    Problem::default()
                });
                Some(ClientEvent::Problem(problem))
            }
            channel::LANGUAGES => match decode_catalog(data) {
                Ok(catalog) => {
                    tracing::debug!(languages = catalog.languages().len(), "received catalog");
                    Some(ClientEvent::Languages(catalog))
                }
                Err(err) => {
                    tracing::warn!(error = %err, "malformed languages payload");
                    Some(ClientEvent::Problem(Problem::new(LANGUAGES_ERROR)))
                }
            },
            other => {
                tracing::debug!(event = other, "ignoring unknown event");
                None
            }
        }
    }

    fn publish(&mut self, event: ClientEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

/// Payloads may arrive as objects or as JSON encoded in a string.
fn decode_payload<P: for<'de> Deserialize<'de>>(data: Value) -> serde_json::Result<P> {
    match data {
        Value::String(text) => serde_json::from_str(&text),
        other => serde_json::from_value(other),
    }
}

fn decode_catalog(data: Value) -> serde_json::Result<Catalog> {
    decode_payload(data)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::infra::loopback::LoopbackTransport;

    #[test]
    fn first_request_opens_the_connection() {
        let (transport, server) = LoopbackTransport::pair();
        let mut client = RunClient::new(transport);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.request_languages();
        assert_eq!(client.state(), ConnectionState::Connecting);
        client.pump();
        assert!(client.is_connected());

        let frames = server.received();
        assert_eq!(frames, [Frame::new(channel::GET_LANGUAGES, None)]);
        assert_eq!(server.connections(), 1);
    }

    #[test]
    fn run_payload_is_json_string() {
        let (transport, server) = LoopbackTransport::pair();
        let mut client = RunClient::new(transport);
        let form = WireForm {
            language: "asp".into(),
            program: vec!["a.".into()],
            ..WireForm::default()
        };
        client.request_run(&form);
        assert_eq!(client.pending_runs(), 1);

        let frames = server.received();
        let Some(Value::String(payload)) = &frames[0].data else {
            panic!("run payload must be a string");
        };
        let decoded: WireForm = serde_json::from_str(payload).unwrap();
        assert_eq!(decoded, form);
    }

    #[test]
    fn responses_are_demultiplexed() {
        let (transport, server) = LoopbackTransport::pair();
        let mut client = RunClient::new(transport);
        let events = client.subscribe();
        client.request_run(&WireForm::default());
        client.request_run(&WireForm::default());

        server.push(channel::OUTPUT, Some(json!({"model": "a", "error": ""})));
        server.push(channel::PROBLEM, Some(json!({"reason": "timeout"})));
        server.push("unknown", None);
        client.pump();

        assert_eq!(
            events.try_recv().unwrap(),
            ClientEvent::Output(RunOutput {
                model: "a".into(),
                error: String::new()
            })
        );
        assert_eq!(
            events.try_recv().unwrap(),
            ClientEvent::Problem(Problem::new("timeout"))
        );
        assert!(events.try_recv().is_err());
        assert_eq!(client.pending_runs(), 0);
    }

    #[test]
    fn languages_arrive_as_json_string() {
        let (transport, server) = LoopbackTransport::pair();
        let mut client = RunClient::new(transport);
        let events = client.subscribe();
        client.request_languages();

        let catalog = r#"[{"value":"asp","name":"ASP","solvers":[]}]"#;
        server.push(channel::LANGUAGES, Some(Value::String(catalog.into())));
        server.push(channel::LANGUAGES, Some(Value::String("not json".into())));
        client.pump();

        match events.try_recv().unwrap() {
            ClientEvent::Languages(catalog) => assert_eq!(catalog.languages()[0].value, "asp"),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            events.try_recv().unwrap(),
            ClientEvent::Problem(Problem::new(LANGUAGES_ERROR))
        );
    }

    #[test]
    fn refused_connection_reports_and_retries_on_next_send() {
        let (transport, server) = LoopbackTransport::pair();
        server.refuse_connections(true);
        let mut client = RunClient::new(transport);
        let events = client.subscribe();

        client.request_run(&WireForm::default());
        client.pump();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(
            events.try_recv().unwrap(),
            ClientEvent::ConnectError(Problem::new(CONNECTION_ERROR))
        );
        assert!(server.received().is_empty());

        server.refuse_connections(false);
        client.request_run(&WireForm::default());
        client.pump();
        assert!(client.is_connected());
        assert_eq!(server.connections(), 1);
        assert_eq!(server.received().len(), 1);
    }

    #[test]
    fn dropped_connection_is_not_reopened_until_next_request() {
        let (transport, server) = LoopbackTransport::pair();
        let mut client = RunClient::new(transport);
        client.request_languages();
        client.pump();

        server.drop_connection();
        client.pump();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(server.connections(), 1);

        client.request_languages();
        assert_eq!(server.connections(), 2);
    }

    #[test]
    fn send_on_a_silently_closed_connection_reconnects() {
        let (transport, server) = LoopbackTransport::pair();
        let mut client = RunClient::new(transport);
        client.request_languages();
        client.pump();
        server.received();

        server.hang_up();
        client.request_run(&WireForm::default());
        assert_eq!(server.connections(), 2);
        assert_eq!(server.received().len(), 1);
        assert_eq!(client.pending_runs(), 1);

        client.pump();
        assert!(client.is_connected());
        server.push(channel::OUTPUT, Some(json!({"model": "{a}", "error": ""})));
        client.pump();
        assert_eq!(client.pending_runs(), 0);
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let (transport, server) = LoopbackTransport::pair();
        let mut client = RunClient::new(transport);
        let dropped = client.subscribe();
        drop(dropped);
        let kept = client.subscribe();

        client.request_languages();
        server.push(channel::PROBLEM, Some(json!({"reason": "x"})));
        client.pump();
        assert!(kept.try_recv().is_ok());
        assert_eq!(client.subscribers.len(), 1);
    }
}
