//! Scripted in-memory transport for unit tests

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::protocol::{Header, Packet, Request, Response, CMD_PING, CMD_QUERY};
use super::transport::{Transport, TransportError};

enum Reply {
    Response(Response),
    Bodyless,
    Fail,
}

struct MockState {
    replies: VecDeque<Reply>,
    requests: Vec<Request>,
    calls: usize,
    connected: bool,
}

/// Replays queued replies in order and records every request it sees.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                replies: VecDeque::new(),
                requests: Vec::new(),
                calls: 0,
                connected: true,
            })),
        }
    }

    pub fn push_response(&self, response: Response) {
        self.state.lock().replies.push_back(Reply::Response(response));
    }

    /// A reply frame with no body, which the call layer must reject
    pub fn push_bodyless_reply(&self) {
        self.state.lock().replies.push_back(Reply::Bodyless);
    }

    pub fn push_transport_error(&self) {
        self.state.lock().replies.push_back(Reply::Fail);
    }

    pub fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    /// Number of calls that reached the transport
    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.state.lock().requests.last().cloned()
    }

    pub fn ping_packet(id: u32) -> Packet<Request> {
        Packet {
            header: Header::new(CMD_PING, id),
            body: None,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, packet: Packet<Request>) -> Result<Packet<Response>, TransportError> {
        let mut state = self.state.lock();
        state.calls += 1;
        if !state.connected {
            return Err(TransportError::NotConnected);
        }

        let id = packet.header.id();
        let is_ping = packet.is_ping();
        if let Some(request) = packet.body {
            state.requests.push(request);
        }

        match state.replies.pop_front() {
            Some(Reply::Response(response)) => Ok(Packet {
                header: Header::new(CMD_QUERY, id),
                body: Some(response),
            }),
            Some(Reply::Bodyless) => Ok(Packet {
                header: Header::new(CMD_QUERY, id),
                body: None,
            }),
            Some(Reply::Fail) => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "scripted failure",
            ))),
            None if is_ping => Ok(Packet {
                header: Header::new(CMD_PING, id),
                body: None,
            }),
            None => Err(TransportError::Closed),
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }

    async fn close(&self) {
        self.disconnect();
    }
}
