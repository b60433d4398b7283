//! In-process transport backed by channels.
//!
//! The other end is a [`LoopbackServer`] that sees every frame the client sends and can push
//! responses, refuse connections or drop the current one. Used to embed a solver backend in the
//! same process and to drive the client deterministically.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde_json::Value;

use crate::app::run::{Frame, Transport, TransportError, TransportEvent};

#[derive(Debug, Default)]
struct Shared {
    refuse: AtomicBool,
    hung_up: AtomicBool,
    connections: AtomicUsize,
}

#[derive(Debug)]
pub struct LoopbackTransport {
    shared: Arc<Shared>,
    open: bool,
    local: VecDeque<TransportEvent>,
    outbound: Sender<Frame>,
    inbound: Receiver<TransportEvent>,
}

#[derive(Debug, Clone)]
pub struct LoopbackServer {
    shared: Arc<Shared>,
    received: Receiver<Frame>,
    responses: Sender<TransportEvent>,
}

impl LoopbackTransport {
    pub fn pair() -> (Self, LoopbackServer) {
        let shared = Arc::new(Shared::default());
        let (outbound, received) = unbounded();
        let (responses, inbound) = unbounded();
        let transport = Self {
            shared: Arc::clone(&shared),
            open: false,
            local: VecDeque::new(),
            outbound,
            inbound,
        };
        let server = LoopbackServer {
            shared,
            received,
            responses,
        };
        (transport, server)
    }
}

impl Transport for LoopbackTransport {
    fn open(&mut self) {
        if self.shared.refuse.load(Ordering::SeqCst) {
            self.open = false;
            self.local
                .push_back(TransportEvent::ConnectFailed("connection refused".into()));
            return;
        }
        self.shared.connections.fetch_add(1, Ordering::SeqCst);
        self.shared.hung_up.store(false, Ordering::SeqCst);
        self.open = true;
        // Anything pushed while no connection was open is stale.
        while self.inbound.try_recv().is_ok() {}
        self.local.push_back(TransportEvent::Connected);
    }

    fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        if self.shared.hung_up.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.local.pop_front() {
            return Some(event);
        }
        if !self.open {
            return None;
        }
        let event = self.inbound.try_recv().ok()?;
        if matches!(event, TransportEvent::Closed(_)) {
            self.open = false;
        }
        Some(event)
    }

    fn close(&mut self) {
        self.open = false;
        self.local.clear();
    }
}

impl LoopbackServer {
    /// Drain the frames sent by the client so far.
    pub fn received(&self) -> Vec<Frame> {
        self.received.try_iter().collect()
    }

    pub fn push(&self, event: &str, data: Option<Value>) {
        let _ = self
            .responses
            .send(TransportEvent::Frame(Frame::new(event, data)));
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn drop_connection(&self) {
        let _ = self.responses.send(TransportEvent::Closed(None));
    }

    /// Close the connection without the client noticing until it pumps, like a socket whose IO
    /// thread already exited. Sends fail with [`TransportError::Closed`] until the next `open`.
    pub fn hang_up(&self) {
        self.shared.hung_up.store(true, Ordering::SeqCst);
        let _ = self.responses.send(TransportEvent::Closed(None));
    }

    /// Number of connections opened so far.
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }
}
