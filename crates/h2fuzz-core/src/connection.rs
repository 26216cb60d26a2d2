//! The connection seam between the fuzzer core and the protocol stack.
//!
//! [`Connection`] exposes one write per frame kind and an observable
//! fault. [`Connector`] constructs fresh connections from
//! [`ConnectionParams`], which is how the replay driver recovers after a
//! fault or a deliberate stream reset.

use std::time::Duration;

use crate::error::ConnectionError;
use crate::frame::{PingPayload, PushPromise, Setting};

/// Target parameters a connection was built from.
///
/// A reconstructed connection reuses these verbatim, so replay after a
/// fault talks to the same peer with the same handshake behaviour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Target `host:port`.
    pub host: String,
    /// Whether to wrap the transport in TLS.
    pub use_tls: bool,
    /// Whether to send the client connection preface.
    pub send_preface: bool,
    /// Whether to send an initial SETTINGS frame after the preface.
    pub send_initial_settings: bool,
    /// Bound on connect and per-frame write duration. `None` = unbounded.
    pub io_timeout: Option<Duration>,
}

impl ConnectionParams {
    /// Parameters for a TLS connection that performs the full handshake.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            use_tls: true,
            send_preface: true,
            send_initial_settings: true,
            io_timeout: None,
        }
    }

    /// Set whether TLS is used.
    pub fn tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Set whether the connection preface is sent.
    pub fn preface(mut self, send_preface: bool) -> Self {
        self.send_preface = send_preface;
        self
    }

    /// Set whether initial SETTINGS are sent.
    pub fn initial_settings(mut self, send_initial_settings: bool) -> Self {
        self.send_initial_settings = send_initial_settings;
        self
    }

    /// Set the I/O bound.
    pub fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }
}

/// A live protocol connection the fuzzer writes frames through.
///
/// Writes pass their arguments through unvalidated. A write may return an
/// error, or the connection may become faulted asynchronously (for
/// example when a reader thread sees the peer close); both are reported
/// through [`fault`](Connection::fault) afterwards.
pub trait Connection {
    /// The parameters this connection was constructed from.
    fn params(&self) -> &ConnectionParams;

    /// The fault that made this connection unusable, if any.
    fn fault(&self) -> Option<&ConnectionError>;

    /// Write an arbitrary frame header and payload.
    fn write_raw_frame(
        &mut self,
        frame_type: u8,
        flags: u8,
        stream_id: u32,
        payload: &[u8],
    ) -> Result<(), ConnectionError>;

    /// Send a PING frame.
    fn send_ping(&mut self, data: PingPayload) -> Result<(), ConnectionError>;

    /// Write a SETTINGS frame with the given parameters in order.
    fn write_settings_frame(&mut self, settings: &[Setting]) -> Result<(), ConnectionError>;

    /// Write a DATA frame.
    fn write_data_frame(
        &mut self,
        stream_id: u32,
        end_stream: bool,
        data: &[u8],
    ) -> Result<(), ConnectionError>;

    /// Write a PUSH_PROMISE frame.
    fn write_push_promise_frame(&mut self, promise: &PushPromise) -> Result<(), ConnectionError>;

    /// Write a CONTINUATION frame.
    fn write_continuation_frame(
        &mut self,
        stream_id: u32,
        end_stream: bool,
        data: &[u8],
    ) -> Result<(), ConnectionError>;

    /// Write a PRIORITY frame.
    fn write_priority_frame(
        &mut self,
        stream_id: u32,
        stream_dep: u32,
        weight: u8,
        exclusive: bool,
    ) -> Result<(), ConnectionError>;

    /// Write a RST_STREAM frame.
    fn write_reset_frame(&mut self, stream_id: u32, error_code: u32)
        -> Result<(), ConnectionError>;

    /// Write a WINDOW_UPDATE frame.
    fn write_window_update_frame(
        &mut self,
        stream_id: u32,
        incr: u32,
    ) -> Result<(), ConnectionError>;
}

/// Builds fresh connections.
///
/// A newly returned connection has no fault. Implemented for any
/// `FnMut(&ConnectionParams) -> Result<C, ConnectionError>`.
pub trait Connector {
    /// The connection type produced.
    type Conn: Connection;

    /// Open a new connection to the target described by `params`.
    fn connect(&mut self, params: &ConnectionParams) -> Result<Self::Conn, ConnectionError>;
}

impl<F, C> Connector for F
where
    F: FnMut(&ConnectionParams) -> Result<C, ConnectionError>,
    C: Connection,
{
    type Conn = C;

    fn connect(&mut self, params: &ConnectionParams) -> Result<C, ConnectionError> {
        self(params)
    }
}
