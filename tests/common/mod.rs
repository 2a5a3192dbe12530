//! In-process tracker and storage nodes for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use fdfs::{cmd, Header};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request frame as the node received it
#[derive(Debug, Clone)]
pub struct Request {
    pub header: Header,
    pub body: Vec<u8>,
}

/// A running mock node
pub struct MockNode {
    pub addr: String,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockNode {
    /// Start a node that answers active tests itself and hands every other
    /// frame to `handler`, writing back whatever it returns.
    pub async fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Vec<u8> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, handler, recorded).await;
                });
            }
        });

        Self { addr, requests }
    }

    /// Requests received so far, active tests excluded
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn port(&self) -> u16 {
        self.addr.rsplit(':').next().unwrap().parse().unwrap()
    }
}

async fn serve<F>(
    mut socket: TcpStream,
    handler: Arc<F>,
    recorded: Arc<Mutex<Vec<Request>>>,
) -> std::io::Result<()>
where
    F: Fn(&Request) -> Vec<u8> + Send + Sync + 'static,
{
    loop {
        let mut raw = [0u8; 10];
        socket.read_exact(&mut raw).await?;
        let header = Header::from_bytes(&raw);

        let mut body = vec![0u8; header.payload_len as usize];
        socket.read_exact(&mut body).await?;

        if header.cmd == cmd::ACTIVE_TEST {
            socket.write_all(&response(0, &[])).await?;
            continue;
        }

        let request = Request { header, body };
        let reply = handler(&request);
        recorded.lock().unwrap().push(request);
        socket.write_all(&reply).await?;
    }
}

/// A response frame with the given status and payload
pub fn response(status: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Header {
        payload_len: payload.len() as u64,
        cmd: cmd::RESP,
        status,
    }
    .to_bytes()
    .to_vec();
    out.extend_from_slice(payload);
    out
}

/// Zero-pad or truncate to `width` bytes
pub fn fixed(value: &str, width: usize) -> Vec<u8> {
    let mut out = value.as_bytes().to_vec();
    out.resize(width, 0);
    out
}

/// Tracker that always points at `storage` with the given store path index
pub async fn spawn_tracker(storage: &MockNode, store_path_index: u8) -> MockNode {
    let port = storage.port() as u64;
    MockNode::spawn(move |_| {
        let mut body = fixed("group1", 16);
        body.extend(fixed("127.0.0.1", 15));
        body.extend_from_slice(&port.to_be_bytes());
        body.push(store_path_index);
        response(0, &body)
    })
    .await
}

/// Storage node that answers uploads with `group/remote`
pub async fn spawn_upload_storage(group: &'static str, remote: &'static str) -> MockNode {
    MockNode::spawn(move |_| {
        let mut body = fixed(group, 16);
        body.extend_from_slice(remote.as_bytes());
        response(0, &body)
    })
    .await
}
