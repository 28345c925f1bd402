//! # pingmux-server
//!
//! The RPC surface: a WebSocket endpoint speaking JSON-RPC request frames
//! plus push events for result and statistics subscriptions, with optional
//! mutual-TLS on the listener.

pub mod client;
pub mod handlers;
pub mod rpc;
pub mod server;
pub mod tls;

pub use server::{start, ServerError, ServerHandle};
