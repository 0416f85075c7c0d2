//! # electrum-rpc
//!
//! An asynchronous Electrum protocol client: line-delimited JSON-RPC 2.0
//! over TCP, TLS, or WebSocket, with lazy connection, automatic reconnect
//! on the next call, keep-alive pings, and concurrent request multiplexing
//! over one socket.
//!
//! The client is an explicit state machine (`Disconnected`, `Connecting`,
//! `Connected`, `Closed`); every RPC checks state and opens the socket on
//! first use. Responses resolve in arrival order, independent of call
//! order.

pub mod client;
pub mod config;
pub mod error;
pub mod transport;
pub mod wire;

pub use client::{ConnectionState, ElectrumClient};
pub use config::ElectrumConfig;
pub use error::ElectrumError;
pub use transport::Protocol;
pub use wire::{script_hash, BalanceResult, HistoryEntry, UnspentEntry};
