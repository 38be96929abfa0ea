use crate::buffer::HttpBuffer;
use crate::fifo::Fifo;
use crate::msg::Method;
use crate::parser::TargetForm;
use crate::pool::Pool;
use crate::session::{SessionHandle, APP_INDEX_INVALID, SESSION_HANDLE_INVALID};
use crate::status::StatusCode;
use crate::timer::{TimerWheel, TIMER_HANDLE_INVALID};
use bstr::{BString, ByteSlice};
use std::fmt;

/// Connection-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Listen,
    Connecting,
    Established,
    TransportClosed,
    AppClosed,
    Closed,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ConnState::Listen => "listen",
            ConnState::Connecting => "connecting",
            ConnState::Established => "established",
            ConnState::TransportClosed => "transport-closed",
            ConnState::AppClosed => "app-closed",
            ConnState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Protocol (state machine) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoState {
    Idle,
    WaitAppMethod,
    WaitClientMethod,
    WaitServerReply,
    WaitAppReply,
    ClientIoMoreData,
    AppIoMoreData,
}

impl fmt::Display for ProtoState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ProtoState::Idle => "idle",
            ProtoState::WaitAppMethod => "wait-app-method",
            ProtoState::WaitClientMethod => "wait-client-method",
            ProtoState::WaitServerReply => "wait-server-reply",
            ProtoState::WaitAppReply => "wait-app-reply",
            ProtoState::ClientIoMoreData => "client-io-more-data",
            ProtoState::AppIoMoreData => "app-io-more-data",
        };
        f.write_str(s)
    }
}

/// Packed connection handle: 8-bit worker id in the top byte, 24-bit
/// pool index below. Timer callbacks carry this and re-validate the slot
/// through the worker pool before touching the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnHandle(u32);

impl ConnHandle {
    pub fn new(thread_index: u32, conn_index: u32) -> Self {
        debug_assert!(thread_index < (1 << 8));
        debug_assert!(conn_index < (1 << 24));
        ConnHandle((thread_index << 24) | (conn_index & 0x00ff_ffff))
    }

    pub fn from_u32(raw: u32) -> Self {
        ConnHandle(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn thread_index(self) -> u32 {
        self.0 >> 24
    }

    pub fn conn_index(self) -> u32 {
        self.0 & 0x00ff_ffff
    }
}

/// One accepted or connected HTTP session.
#[derive(Debug)]
pub struct HttpConn {
    pub thread_index: u32,
    pub conn_index: u32,
    pub ts_handle: SessionHandle,
    pub as_handle: SessionHandle,
    pub app_session_index: u32,
    pub app_wrk_index: u32,
    pub api_context: u32,
    pub is_server: bool,
    pub state: ConnState,
    pub proto_state: ProtoState,

    /// RX scratch, grown on demand, drained after each parsed message.
    pub rx_buf: Vec<u8>,
    /// Cursor into `rx_buf` for multi-chunk body delivery.
    pub rx_buf_offset: usize,

    pub control_data_len: usize,
    pub target_form: TargetForm,
    pub target_path_offset: usize,
    pub target_path_len: usize,
    pub target_query_offset: usize,
    pub target_query_len: usize,
    pub headers_offset: usize,
    pub headers_len: usize,
    pub body_offset: usize,
    pub body_len: u64,
    pub method: Method,
    pub status: StatusCode,

    pub tx_buf: Option<HttpBuffer>,
    /// Body bytes still owed by the transport for the current message.
    pub to_recv: u64,

    pub timer_handle: u32,
    pub pending_timer: bool,
    pub timeout_secs: u32,

    pub app_name: BString,
    /// Host authority for the Host header; clients only.
    pub host: BString,
}

impl HttpConn {
    pub fn new(thread_index: u32) -> Self {
        Self {
            thread_index,
            conn_index: 0,
            ts_handle: SESSION_HANDLE_INVALID,
            as_handle: SESSION_HANDLE_INVALID,
            app_session_index: APP_INDEX_INVALID,
            app_wrk_index: APP_INDEX_INVALID,
            api_context: 0,
            is_server: false,
            state: ConnState::Connecting,
            proto_state: ProtoState::Idle,
            rx_buf: Vec::new(),
            rx_buf_offset: 0,
            control_data_len: 0,
            target_form: TargetForm::default(),
            target_path_offset: 0,
            target_path_len: 0,
            target_query_offset: 0,
            target_query_len: 0,
            headers_offset: 0,
            headers_len: 0,
            body_offset: 0,
            body_len: 0,
            method: Method::Get,
            status: StatusCode::Ok,
            tx_buf: None,
            to_recv: 0,
            timer_handle: TIMER_HANDLE_INVALID,
            pending_timer: false,
            timeout_secs: crate::config::CONN_TIMEOUT_SECS,
            app_name: BString::from(""),
            host: BString::from(""),
        }
    }

    pub fn handle(&self) -> ConnHandle {
        ConnHandle::new(self.thread_index, self.conn_index)
    }

    /// Scratch bytes not yet handed to the application.
    pub fn pending_rx_bytes(&self) -> usize {
        self.rx_buf.len() - self.rx_buf_offset
    }

    /// Drains everything the transport RX FIFO currently holds into the
    /// scratch buffer.
    pub fn read_message(&mut self, ts_rx: &mut Fifo) {
        let avail = ts_rx.max_dequeue();
        if avail == 0 {
            return;
        }
        let old = self.rx_buf.len();
        self.rx_buf.resize(old + avail, 0);
        let got = ts_rx.dequeue(&mut self.rx_buf[old..]);
        self.rx_buf.truncate(old + got);
    }
}

impl fmt::Display for HttpConn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}:{}] {} {} {}",
            self.thread_index,
            self.conn_index,
            if self.is_server { "server" } else { "client" },
            self.state,
            self.proto_state
        )
    }
}

/// One bound endpoint. Its protocol state is fixed at LISTEN.
#[derive(Debug)]
pub struct Listener {
    pub ts_listener: SessionHandle,
    pub app_listener: SessionHandle,
    pub app_wrk_index: u32,
    pub timeout_secs: u32,
    pub app_name: BString,
}

impl Listener {
    pub fn proto_state(&self) -> ConnState {
        ConnState::Listen
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "listener app {} {} timeout {}s",
            self.app_wrk_index,
            self.app_name.as_bstr(),
            self.timeout_secs
        )
    }
}

/// One outstanding outbound connect, held until the transport reports
/// connected or failed.
#[derive(Debug, Clone)]
pub struct HalfOpen {
    pub app_wrk_index: u32,
    pub api_context: u32,
    pub host: BString,
    pub timeout_secs: u32,
    pub app_name: BString,
}

impl fmt::Display for HalfOpen {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "half-open app {} host {} timeout {}s",
            self.app_wrk_index,
            self.host.as_bstr(),
            self.timeout_secs
        )
    }
}

/// Per-worker state: the active connection pool and its timer wheel.
/// Touched only from the owning worker.
#[derive(Debug)]
pub struct HttpWorker {
    pub conns: Pool<HttpConn>,
    pub wheel: TimerWheel,
}

impl HttpWorker {
    pub fn new(now: f64) -> Self {
        Self {
            conns: Pool::new(),
            wheel: TimerWheel::new(now),
        }
    }
}
