//! Common test utilities for driver integration tests
//!
//! Provides an in-process proxy that speaks the real wire protocol:
//! - Echoes keep-alive pings (unless told to ignore them)
//! - Answers query packets through a scripted handler
//! - Records every request it receives

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use cdbpool::driver::protocol::{
    Packet, PacketDecoder, PacketEncoder, Request, Response, ResponseBody, TransferResponse,
};

/// Maps a request to its reply; `None` makes the proxy hang up.
pub type Handler = Arc<dyn Fn(&Request) -> Option<Response> + Send + Sync>;

pub struct MockProxy {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Request>>>,
    accept_task: JoinHandle<()>,
}

impl MockProxy {
    pub async fn start(handler: Handler) -> Self {
        Self::start_with(handler, true).await
    }

    pub async fn start_with(handler: Handler, answer_pings: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock proxy");
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve(stream, handler.clone(), recorded.clone(), answer_pings));
            }
        });

        Self {
            addr,
            requests,
            accept_task,
        }
    }

    pub fn dsn(&self, db: &str) -> String {
        format!("tcp({})/{}", self.addr, db)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }
}

impl Drop for MockProxy {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    handler: Handler,
    requests: Arc<Mutex<Vec<Request>>>,
    answer_pings: bool,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = PacketDecoder::new(true);
    let mut encoder = PacketEncoder::new();

    loop {
        let packet: Packet<Request> = match decoder.decode(&mut reader).await {
            Ok(packet) => packet,
            Err(_) => return,
        };

        let id = packet.header.id();
        let Some(request) = packet.body else {
            if answer_pings {
                let mut echo = Packet::<Response>::ping();
                echo.header = packet.header;
                if encoder.write(&mut writer, &echo).await.is_err() {
                    return;
                }
            }
            continue;
        };

        requests.lock().push(request.clone());
        let Some(response) = handler(&request) else {
            return;
        };
        if encoder
            .write(&mut writer, &Packet::query(id, response))
            .await
            .is_err()
        {
            return;
        }
    }
}

pub fn ok_transfer() -> Response {
    Response::ok(ResponseBody::TransferResp(TransferResponse {}))
}

pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
{
    Arc::new(f)
}
