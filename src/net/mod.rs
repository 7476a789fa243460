//! Network session subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted transport (TCP, optionally TLS)
//!     → stream.rs (one read/write contract over both variants)
//!     → session.rs (lifecycle, state, stats, direct send/receive)
//!     → workers.rs (receive loop → buffers/queue ← send loop)
//!     → registry.rs (ceiling enforcement, idle sweep, teardown ordering)
//!
//! Session States:
//!     Created → Running → Halting → Halted → dropped
//! ```
//!
//! # Design Decisions
//! - The transport variant is fixed at construction; TLS handshakes happen
//!   upstream of this module
//! - Workers are halt-aware at every suspension point, so stop's bounded
//!   join converges
//! - Sessions are evicted through the registry, which stops them first

pub mod registry;
pub mod session;
pub mod stream;
pub mod tls;
pub(crate) mod workers;
