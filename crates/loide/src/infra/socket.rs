//! WebSocket transport to the solver service.
//!
//! Each connection is served by one IO thread that owns the socket. The thread alternates between
//! flushing queued frames and a short blocking read, and reports everything it sees back through a
//! channel that [`Transport::poll`] drains.

use std::io::ErrorKind;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use thiserror::Error;
use tungstenite::Message;
use tungstenite::stream::MaybeTlsStream;
use url::Url;

use crate::app::run::{Frame, Transport, TransportError, TransportEvent};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("invalid server url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported url scheme '{0}', expected ws or wss")]
    UnsupportedScheme(String),
}

#[derive(Debug)]
pub struct WebSocketTransport {
    url: Url,
    outbound: Option<Sender<Frame>>,
    inbound: Option<Receiver<TransportEvent>>,
}

impl WebSocketTransport {
    pub fn new(url: &str) -> Result<Self, SocketError> {
        let parsed = Url::parse(url).map_err(|source| SocketError::InvalidUrl {
            url: url.to_owned(),
            source,
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(SocketError::UnsupportedScheme(parsed.scheme().to_owned()));
        }
        Ok(Self {
            url: parsed,
            outbound: None,
            inbound: None,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self) {
        if self.outbound.is_some() {
            return;
        }
        let (outbound, queued) = unbounded();
        let (events, inbound) = unbounded();
        let url = self.url.to_string();
        let failed = events.clone();
        let spawned = thread::Builder::new()
            .name("loide-socket".into())
            .spawn(move || serve_connection(&url, &queued, &events));
        if let Err(err) = spawned {
            let _ = failed.send(TransportEvent::ConnectFailed(err.to_string()));
        }
        tracing::debug!(url = %self.url, "connecting");
        self.outbound = Some(outbound);
        self.inbound = Some(inbound);
    }

    fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        let event = self.inbound.as_ref()?.try_recv().ok()?;
        if matches!(
            event,
            TransportEvent::ConnectFailed(_) | TransportEvent::Closed(_)
        ) {
            self.outbound = None;
        }
        Some(event)
    }

    fn close(&mut self) {
        // Dropping the sender tells the IO thread to close the socket.
        self.outbound = None;
        self.inbound = None;
    }
}

fn serve_connection(url: &str, queued: &Receiver<Frame>, events: &Sender<TransportEvent>) {
    let mut socket = match tungstenite::connect(url) {
        Ok((socket, _response)) => socket,
        Err(err) => {
            let _ = events.send(TransportEvent::ConnectFailed(err.to_string()));
            return;
        }
    };
    if let MaybeTlsStream::Plain(stream) = socket.get_mut()
        && let Err(err) = stream.set_read_timeout(Some(POLL_INTERVAL))
    {
        tracing::warn!(error = %err, "failed to set socket read timeout");
    }
    if events.send(TransportEvent::Connected).is_err() {
        return;
    }

    loop {
        loop {
            match queued.try_recv() {
                Ok(frame) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::warn!(error = %err, "dropping unencodable frame");
                            continue;
                        }
                    };
                    if let Err(err) = socket.send(Message::text(text)) {
                        let _ = events.send(TransportEvent::Closed(Some(err.to_string())));
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return;
                }
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str::<Frame>(text.as_str()) {
                Ok(frame) => {
                    if events.send(TransportEvent::Frame(frame)).is_err() {
                        return;
                    }
                }
                Err(err) => tracing::warn!(error = %err, "ignoring malformed frame"),
            },
            Ok(Message::Close(_)) => {
                let _ = events.send(TransportEvent::Closed(None));
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                let _ = events.send(TransportEvent::Closed(None));
                return;
            }
            Err(err) => {
                let _ = events.send(TransportEvent::Closed(Some(err.to_string())));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_websocket_urls_are_accepted() {
        assert!(WebSocketTransport::new("ws://localhost:8084").is_ok());
        assert!(WebSocketTransport::new("wss://loide.example/socket").is_ok());
        assert!(matches!(
            WebSocketTransport::new("http://localhost:8084"),
            Err(SocketError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            WebSocketTransport::new("not a url"),
            Err(SocketError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn send_before_open_fails() {
        let mut transport = WebSocketTransport::new("ws://localhost:8084").unwrap();
        assert!(matches!(
            transport.send(Frame::new("getLanguages", None)),
            Err(TransportError::NotOpen)
        ));
        assert_eq!(transport.poll(), None);
    }
}
