//! In-process nodes for unit tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::types::{cmd, Header, HEADER_LEN};

/// Node that answers every payload-free frame with an empty success response.
pub async fn spawn_responder() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    respond_on(listener);
    addr
}

/// Serve empty success responses on an already bound listener.
pub fn respond_on(listener: TcpListener) {
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; HEADER_LEN];
                while socket.read_exact(&mut buf).await.is_ok() {
                    let resp = Header::new(cmd::RESP, 0).to_bytes();
                    if socket.write_all(&resp).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
}

/// Node that answers each request with `status` and no payload, or, when
/// `cut_short` is set, promises a 10-byte body and hangs up after 3 bytes.
pub async fn spawn_storage(status: u8, cut_short: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut raw = [0u8; HEADER_LEN];
                while socket.read_exact(&mut raw).await.is_ok() {
                    let request = Header::from_bytes(&raw);
                    let mut body = vec![0u8; request.payload_len as usize];
                    if socket.read_exact(&mut body).await.is_err() {
                        break;
                    }
                    if cut_short {
                        let _ = socket.write_all(&Header::new(cmd::RESP, 10).to_bytes()).await;
                        let _ = socket.write_all(b"012").await;
                        break;
                    }
                    let resp = Header {
                        payload_len: 0,
                        cmd: cmd::RESP,
                        status,
                    };
                    if socket.write_all(&resp.to_bytes()).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// Node that accepts connections and immediately hangs up.
pub async fn spawn_hangup() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    addr
}
