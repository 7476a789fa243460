//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use wiregate::config::SessionConfig;
use wiregate::{Session, SessionStream};

/// Accept one loopback connection and wrap the server side in a session.
/// Returns the session and the raw peer socket.
pub async fn session_with_peer(config: SessionConfig) -> (Arc<Session>, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = TcpStream::connect(addr).await.unwrap();
    let (server, _) = listener.accept().await.unwrap();
    let session = Session::new(SessionStream::plain(server), config).unwrap();
    (session, peer)
}

/// Drive `peer` as an echo endpoint: everything read is written back.
/// The task exits when the peer closes or errors.
pub fn spawn_echo(peer: TcpStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut rd, mut wr) = peer.into_split();
        let mut buf = [0u8; 4096];
        loop {
            match rd.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if wr.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}
