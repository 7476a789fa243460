//! Wiregate session management library.
//!
//! Per-connection session subsystem for a network service: each accepted
//! transport (plain TCP or TLS) gets a [`Session`] owning fixed-capacity
//! staging buffers, a bounded inbound message queue, transfer statistics,
//! and a pair of worker tasks. A [`SessionRegistry`] enforces the session
//! ceiling and evicts idle sessions.
//!
//! # Architecture Overview
//!
//! ```text
//!  accept loop (external)                  callers / consumers
//!        │                                   │           ▲
//!        ▼                                   ▼           │
//!  ┌───────────────┐   register   ┌─────────────────────────────┐
//!  │SessionRegistry│─────────────▶│           Session           │
//!  │ ceiling+sweep │              │  state · stats · activity   │
//!  └───────────────┘              │                             │
//!                                 │  send ──▶ write half ─────▶ │ transport
//!                                 │  enqueue_send ─▶ send buf   │ (plain/TLS)
//!                                 │        send worker ───────▶ │
//!                                 │                             │
//!                                 │  receive ◀── read half ◀─── │
//!                                 │  recv worker ─▶ recv buf    │
//!                                 │        ─▶ bounded queue     │
//!                                 │  next_message ◀─┘           │
//!                                 └─────────────────────────────┘
//! ```

// Core subsystems
pub mod buffer;
pub mod config;
pub mod error;
pub mod net;
pub mod queue;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use buffer::Buffer;
pub use config::GateConfig;
pub use error::{SessionError, SessionResult};
pub use lifecycle::Shutdown;
pub use net::registry::SessionRegistry;
pub use net::session::{Session, SessionId, StatsSnapshot};
pub use net::stream::SessionStream;
pub use queue::BoundedQueue;
