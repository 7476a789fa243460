//! Session worker loops.
//!
//! # Responsibilities
//! - Receive loop: transport → receive buffer → inbound message queue
//! - Send loop: send buffer → transport
//! - Observe the halt signal and exit cooperatively
//!
//! # Design Decisions
//! - Every transport call is bounded by the configured I/O timeout and
//!   raced against the halt signal, so `stop`'s bounded join converges
//!   without relying on the peer
//! - A receive-side timeout is an idle tick, not an error: the loop
//!   re-checks the idle deadline and the halt flag, then keeps reading
//! - The queue push is the backpressure point: when consumers lag, the
//!   receive loop blocks there instead of buffering without bound

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::net::session::Session;
use crate::observability::metrics;

/// Largest single read the receive loop performs.
const MAX_READ_CHUNK: usize = 4096;

enum ReadOutcome {
    Data(usize),
    Idle,
    Closed,
    Halt,
    Failed(io::Error),
}

/// Read from the transport, stage through the receive buffer, and publish
/// inbound messages to the queue until halt, peer close, error, or idle
/// timeout.
pub(crate) async fn receive_loop(session: Arc<Session>) {
    let mut halt_rx = session.halt_subscribe();
    let mut scratch = vec![0u8; session.config.buffer_capacity.min(MAX_READ_CHUNK)];

    loop {
        if session.is_halted() {
            break;
        }

        let outcome = {
            let mut reader = session.reader.lock().await;
            tokio::select! {
                r = timeout(session.config.io_timeout(), reader.read(&mut scratch)) => match r {
                    Ok(Ok(0)) => ReadOutcome::Closed,
                    Ok(Ok(n)) => ReadOutcome::Data(n),
                    Ok(Err(e)) => ReadOutcome::Failed(e),
                    Err(_) => ReadOutcome::Idle,
                },
                _ = halt_rx.wait_for(|halted| *halted) => ReadOutcome::Halt,
            }
        };

        match outcome {
            ReadOutcome::Data(n) => {
                session.stats.record_received(n);
                session.update_activity();
                metrics::record_bytes_received(n as u64);

                let message = {
                    let mut staged = session
                        .recv_buffer
                        .lock()
                        .expect("recv buffer lock poisoned");
                    // Reads are capped at the staging capacity and the buffer
                    // is drained every pass, so this write always fits.
                    staged
                        .write(&scratch[..n])
                        .expect("receive staging overflow");
                    Bytes::from(staged.drain())
                };

                // Backpressure: waits while consumers lag; fails only once
                // the queue is closed, i.e. the session is halting.
                if session.queue.push(message).await.is_err() {
                    break;
                }
            }
            ReadOutcome::Idle => {
                if session.has_timed_out() {
                    tracing::info!(
                        session_id = %session.id(),
                        peer = %session.peer_addr(),
                        "Receive worker exiting on idle timeout"
                    );
                    session.mark_disconnected();
                    break;
                }
            }
            ReadOutcome::Closed => {
                tracing::debug!(
                    session_id = %session.id(),
                    peer = %session.peer_addr(),
                    "Peer closed; receive worker exiting"
                );
                session.mark_disconnected();
                break;
            }
            ReadOutcome::Failed(e) => {
                tracing::warn!(
                    session_id = %session.id(),
                    peer = %session.peer_addr(),
                    error = %e,
                    "Receive worker transport error"
                );
                session.mark_disconnected();
                break;
            }
            ReadOutcome::Halt => break,
        }
    }

    tracing::debug!(session_id = %session.id(), "Receive worker exited");
}

/// Drain staged outbound bytes to the transport until halt or error.
pub(crate) async fn send_loop(session: Arc<Session>) {
    let mut halt_rx = session.halt_subscribe();

    loop {
        if session.is_halted() {
            break;
        }

        let pending = session
            .send_buffer
            .lock()
            .expect("send buffer lock poisoned")
            .drain();
        if pending.is_empty() {
            let notified = session.outbound_ready.notified();
            tokio::select! {
                _ = notified => {}
                _ = halt_rx.wait_for(|halted| *halted) => {}
            }
            continue;
        }

        let result = {
            let mut writer = session.writer.lock().await;
            tokio::select! {
                r = timeout(session.config.io_timeout(), async {
                    writer.write_all(&pending).await?;
                    writer.flush().await
                }) => match r {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "transport write timed out",
                    )),
                },
                _ = halt_rx.wait_for(|halted| *halted) => Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "session halted mid-write",
                )),
            }
        };

        match result {
            Ok(()) => {
                session.stats.record_sent(pending.len());
                session.update_activity();
                metrics::record_bytes_sent(pending.len() as u64);
                tracing::trace!(
                    session_id = %session.id(),
                    bytes = pending.len(),
                    "Send worker flushed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id(),
                    peer = %session.peer_addr(),
                    error = %e,
                    "Send worker write failed"
                );
                session.mark_disconnected();
                break;
            }
        }
    }

    tracing::debug!(session_id = %session.id(), "Send worker exited");
}
