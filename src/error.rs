//! Session error definitions.

use thiserror::Error;

use crate::buffer::BufferFull;

/// Errors surfaced by the session subsystem.
///
/// Ordinary I/O failure is never fatal to the process: `Transport` and
/// `PeerClosed` degrade the affected session to disconnected and leave every
/// other session untouched. Once a session reports either (or `Halted`), the
/// caller must stop issuing I/O and eventually stop the session; the core
/// never tears itself down.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Construction failed; terminal for this attempt. Everything built so
    /// far has already been released.
    #[error("session init failed: {0}")]
    Init(String),

    /// TLS certificate or key material could not be loaded.
    #[error("TLS setup failed: {0}")]
    Tls(#[source] std::io::Error),

    /// The underlying transport reported an error or timed out.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// The peer closed its end of the stream (zero-length read).
    ///
    /// State-wise identical to `Transport`; kept distinct for diagnostics.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The session is halted; no new I/O is admitted.
    #[error("session halted")]
    Halted,

    /// `send` was called with an empty payload.
    #[error("empty payload")]
    EmptyPayload,

    /// The send buffer cannot stage the payload (all-or-nothing refusal).
    #[error("send buffer full: {0}")]
    BufferFull(#[from] BufferFull),

    /// The registry's session ceiling has been reached.
    #[error("session ceiling reached ({max} active)")]
    AtCapacity {
        /// The configured ceiling.
        max: usize,
    },

    /// Worker tasks did not exit within the stop timeout and were aborted.
    #[error("worker join timed out after {0} seconds; tasks aborted")]
    StopTimeout(u64),
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SessionError::AtCapacity { max: 1000 };
        assert_eq!(err.to_string(), "session ceiling reached (1000 active)");

        let err = SessionError::BufferFull(BufferFull {
            requested: 10,
            available: 3,
        });
        assert!(err.to_string().contains("10 bytes requested"));

        let err = SessionError::StopTimeout(5);
        assert!(err.to_string().contains("5 seconds"));
    }
}
