//! Core types and traits for the h2fuzz capture/replay engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the semantic parameters of every frame kind the fuzzer can emit and
//! the [`Connection`] / [`Connector`] seam the replay driver writes
//! through. The protocol connection itself (handshake, wire encoding,
//! flow control) lives outside this workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod connection;
pub mod error;
pub mod frame;

pub use connection::{Connection, ConnectionParams, Connector};
pub use error::ConnectionError;
pub use frame::{PingPayload, PushPromise, Setting, Settings, PING_PAYLOAD_LEN};
