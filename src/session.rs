use crate::error::Result;
use crate::fifo::Fifo;
use std::net::SocketAddr;

/// Identifier the engine registers under with the session layer, for
/// both IPv4 and IPv6 address families. The service type is app-layer
/// and TX is internal, driven through the custom-TX callback.
pub const TRANSPORT_PROTO_ID: &str = "HTTP";

/// Opaque session-layer handle for transport and app sessions.
pub type SessionHandle = u64;

pub const SESSION_HANDLE_INVALID: SessionHandle = u64::MAX;
pub const APP_INDEX_INVALID: u32 = u32::MAX;

/// Per-endpoint extension block carrying an HTTP-layer timeout override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpEndpointExt {
    pub timeout_secs: u32,
}

/// Per-endpoint extension block selecting TLS on listen. The HTTP layer
/// itself stays TLS-agnostic; only the underlying transport changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoEndpointExt {
    pub ckpair_index: u32,
}

/// Tag-selected endpoint extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointExt {
    Http(HttpEndpointExt),
    Crypto(CryptoEndpointExt),
}

/// A transport endpoint plus its extension blocks. Works over both IPv4
/// and IPv6 addresses.
#[derive(Debug, Clone)]
pub struct TransportEndpoint {
    pub addr: SocketAddr,
    pub ext: Vec<EndpointExt>,
}

impl TransportEndpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ext: Vec::new(),
        }
    }

    pub fn with_ext(mut self, ext: EndpointExt) -> Self {
        self.ext.push(ext);
        self
    }

    pub fn http_ext(&self) -> Option<&HttpEndpointExt> {
        self.ext.iter().find_map(|e| match e {
            EndpointExt::Http(h) => Some(h),
            _ => None,
        })
    }

    pub fn crypto_ext(&self) -> Option<&CryptoEndpointExt> {
        self.ext.iter().find_map(|e| match e {
            EndpointExt::Crypto(c) => Some(c),
            _ => None,
        })
    }
}

/// Arguments for an outbound connect.
#[derive(Debug, Clone)]
pub struct ConnectArgs {
    pub endpoint: TransportEndpoint,
    pub app_wrk_index: u32,
    pub api_context: u32,
    pub app_name: Vec<u8>,
}

/// Arguments for binding a listener.
#[derive(Debug, Clone)]
pub struct ListenArgs {
    pub endpoint: TransportEndpoint,
    pub app_wrk_index: u32,
    pub app_listener_handle: SessionHandle,
    pub app_name: Vec<u8>,
}

/// What the session layer hands back when an app session attaches to a
/// connection (accept or connected).
#[derive(Debug, Clone, Copy)]
pub struct AppAttach {
    pub session_handle: SessionHandle,
    pub session_index: u32,
    pub wrk_index: u32,
}

/// Pacer parameters for one custom-TX pass. `descheduled` is set by the
/// engine when the transport TX FIFO ran out of room and the connection
/// was taken off the pacer; the builtin-tx callback puts it back.
#[derive(Debug, Clone, Copy)]
pub struct SendParams {
    pub max_burst: usize,
    pub descheduled: bool,
}

impl Default for SendParams {
    fn default() -> Self {
        Self {
            max_burst: usize::MAX,
            descheduled: false,
        }
    }
}

/// Which phase of session teardown a cleanup callback reports. The
/// engine frees its record only on the session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPhase {
    Transport,
    Session,
}

/// Everything the engine asks of the surrounding session layer.
///
/// Back-references from connection records to session objects are
/// expressed through these handle-based calls, never as owning links.
pub trait SessionOps {
    /// Session-layer monotonic time, seconds.
    fn now(&self) -> f64;

    /// Initiates an outbound connect; completion arrives later through
    /// the connected callback.
    fn transport_connect(&mut self, endpoint: &TransportEndpoint) -> Result<()>;

    /// Binds a transport listener, optionally upgraded to TLS.
    fn transport_listen(&mut self, endpoint: &TransportEndpoint, tls: bool)
        -> Result<SessionHandle>;

    fn transport_unlisten(&mut self, handle: SessionHandle);

    fn transport_disconnect(&mut self, handle: SessionHandle);

    fn transport_reset(&mut self, handle: SessionHandle);

    /// Takes the connection off the transport pacer until its TX FIFO
    /// drains.
    fn transport_deschedule(&mut self, handle: SessionHandle);

    /// Offers an accepted connection to the app; returns the app session
    /// bound to it.
    fn app_accept(&mut self, listener_handle: SessionHandle, conn_handle: u32)
        -> Result<AppAttach>;

    /// Reports connect completion. `conn_handle` is `None` when the
    /// connect failed.
    fn app_connected(&mut self, api_context: u32, conn_handle: Option<u32>) -> Result<AppAttach>;

    fn app_rx_notify(&mut self, session: SessionHandle);

    fn app_closing_notify(&mut self, session: SessionHandle);

    fn app_reset_notify(&mut self, session: SessionHandle);
}

/// Per-callback view of the four FIFOs of one connection plus the
/// session-layer services. The session layer resolves the FIFOs from its
/// own records and lends them to the engine for the duration of the
/// callback; the engine never stores FIFO references.
pub struct SessionIo<'a> {
    pub ts_rx: &'a mut Fifo,
    pub ts_tx: &'a mut Fifo,
    pub as_rx: &'a mut Fifo,
    pub as_tx: &'a mut Fifo,
    pub ops: &'a mut dyn SessionOps,
}
