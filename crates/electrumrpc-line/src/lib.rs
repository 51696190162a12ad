//! electrumrpc-line — newline-delimited JSON-RPC transport for Electrum.
//!
//! # Features
//! - Works over any connected `AsyncRead + AsyncWrite` stream
//! - Responses matched by id; stale answers skipped
//! - Server push notifications routed per method
//! - `NotReady` until a stream is attached, and again after it breaks

pub mod client;
pub mod notifications;

pub use client::{LineTransport, LineTransportConfig};
pub use notifications::{Notification, NotificationRouter};
