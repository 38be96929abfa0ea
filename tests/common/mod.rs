#![allow(dead_code)]

use htx::config::HttpConfig;
use htx::engine::HttpEngine;
use htx::error::Result;
use htx::fifo::Fifo;
use htx::msg::{DataType, HttpMsg, Method, MsgData, HTTP_MSG_SIZE};
use htx::session::{
    AppAttach, ConnectArgs, ListenArgs, SendParams, SessionHandle, SessionIo, SessionOps,
    TransportEndpoint,
};
use htx::status::StatusCode;
use std::net::SocketAddr;

pub const TS_HANDLE: SessionHandle = 77;
pub const LISTENER_TS_HANDLE: SessionHandle = 11;
pub const APP_LISTENER_HANDLE: SessionHandle = 12;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect(SocketAddr),
    Listen(SocketAddr, bool),
    Unlisten(SessionHandle),
    Disconnect(SessionHandle),
    Reset(SessionHandle),
    Deschedule(SessionHandle),
    AppAccept { listener: SessionHandle, conn_handle: u32 },
    AppConnected { api_context: u32, ok: bool },
    RxNotify(SessionHandle),
    ClosingNotify(SessionHandle),
    ResetNotify(SessionHandle),
}

/// Scripted session layer: records every call the engine makes and
/// answers attach requests with predictable handles.
pub struct MockOps {
    pub now: f64,
    pub events: Vec<Event>,
}

impl MockOps {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            events: Vec::new(),
        }
    }

    pub fn has_event(&self, event: &Event) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

impl SessionOps for MockOps {
    fn now(&self) -> f64 {
        self.now
    }

    fn transport_connect(&mut self, endpoint: &TransportEndpoint) -> Result<()> {
        self.events.push(Event::Connect(endpoint.addr));
        Ok(())
    }

    fn transport_listen(
        &mut self,
        endpoint: &TransportEndpoint,
        tls: bool,
    ) -> Result<SessionHandle> {
        self.events.push(Event::Listen(endpoint.addr, tls));
        Ok(LISTENER_TS_HANDLE)
    }

    fn transport_unlisten(&mut self, handle: SessionHandle) {
        self.events.push(Event::Unlisten(handle));
    }

    fn transport_disconnect(&mut self, handle: SessionHandle) {
        self.events.push(Event::Disconnect(handle));
    }

    fn transport_reset(&mut self, handle: SessionHandle) {
        self.events.push(Event::Reset(handle));
    }

    fn transport_deschedule(&mut self, handle: SessionHandle) {
        self.events.push(Event::Deschedule(handle));
    }

    fn app_accept(&mut self, listener_handle: SessionHandle, conn_handle: u32) -> Result<AppAttach> {
        self.events.push(Event::AppAccept {
            listener: listener_handle,
            conn_handle,
        });
        Ok(AppAttach {
            session_handle: 1000 + u64::from(conn_handle),
            session_index: conn_handle,
            wrk_index: 0,
        })
    }

    fn app_connected(&mut self, api_context: u32, conn_handle: Option<u32>) -> Result<AppAttach> {
        self.events.push(Event::AppConnected {
            api_context,
            ok: conn_handle.is_some(),
        });
        Ok(AppAttach {
            session_handle: 2000 + u64::from(conn_handle.unwrap_or(0)),
            session_index: conn_handle.unwrap_or(0),
            wrk_index: 0,
        })
    }

    fn app_rx_notify(&mut self, session: SessionHandle) {
        self.events.push(Event::RxNotify(session));
    }

    fn app_closing_notify(&mut self, session: SessionHandle) {
        self.events.push(Event::ClosingNotify(session));
    }

    fn app_reset_notify(&mut self, session: SessionHandle) {
        self.events.push(Event::ResetNotify(session));
    }
}

/// One connection's worth of engine, mock session layer and FIFOs.
pub struct Harness {
    pub engine: HttpEngine,
    pub ops: MockOps,
    pub ts_rx: Fifo,
    pub ts_tx: Fifo,
    pub as_rx: Fifo,
    pub as_tx: Fifo,
}

pub const FIFO_CAP_DEFAULT: usize = 4096;

pub fn endpoint() -> TransportEndpoint {
    TransportEndpoint::new("10.0.0.1:80".parse().unwrap())
}

impl Harness {
    pub fn new(fifo_cap: usize) -> Self {
        let mut engine = HttpEngine::new(HttpConfig::default());
        let mut ops = MockOps::new();
        engine.enable(1, &mut ops).unwrap();
        Self {
            engine,
            ops,
            ts_rx: Fifo::with_capacity(fifo_cap),
            ts_tx: Fifo::with_capacity(fifo_cap),
            as_rx: Fifo::with_capacity(fifo_cap),
            as_tx: Fifo::with_capacity(fifo_cap),
        }
    }

    /// Brings up a listening server and accepts one connection.
    pub fn server(fifo_cap: usize) -> (Self, u32) {
        let mut h = Self::new(fifo_cap);
        let listener = h
            .engine
            .start_listen(
                ListenArgs {
                    endpoint: endpoint(),
                    app_wrk_index: 0,
                    app_listener_handle: APP_LISTENER_HANDLE,
                    app_name: b"test-server".to_vec(),
                },
                &mut h.ops,
            )
            .unwrap();
        let conn = h
            .engine
            .transport_accept(listener, 0, TS_HANDLE, &mut h.ops)
            .unwrap();
        (h, conn)
    }

    /// Dials out and completes the connect, yielding a client connection.
    pub fn client(fifo_cap: usize) -> (Self, u32) {
        let mut h = Self::new(fifo_cap);
        let ho = h
            .engine
            .connect(
                ConnectArgs {
                    endpoint: endpoint(),
                    app_wrk_index: 0,
                    api_context: 9,
                    app_name: b"test-client".to_vec(),
                },
                &mut h.ops,
            )
            .unwrap();
        let conn = h
            .engine
            .transport_connected(ho, 0, TS_HANDLE, false, &mut h.ops)
            .unwrap()
            .unwrap();
        (h, conn)
    }

    /// Feeds wire bytes to the transport RX FIFO and runs the RX path.
    pub fn wire_rx(&mut self, conn: u32, bytes: &[u8]) {
        assert_eq!(self.ts_rx.enqueue(bytes), bytes.len());
        self.rx(conn);
    }

    pub fn rx(&mut self, conn: u32) {
        let Harness {
            engine,
            ops,
            ts_rx,
            ts_tx,
            as_rx,
            as_tx,
        } = self;
        let mut io = SessionIo {
            ts_rx,
            ts_tx,
            as_rx,
            as_tx,
            ops,
        };
        engine.transport_rx(0, conn, &mut io).unwrap();
    }

    /// Runs the app TX path, returning bytes put on transport TX.
    pub fn tx(&mut self, conn: u32) -> usize {
        let mut sp = SendParams::default();
        self.tx_with(conn, &mut sp)
    }

    pub fn tx_with(&mut self, conn: u32, sp: &mut SendParams) -> usize {
        let Harness {
            engine,
            ops,
            ts_rx,
            ts_tx,
            as_rx,
            as_tx,
        } = self;
        let mut io = SessionIo {
            ts_rx,
            ts_tx,
            as_rx,
            as_tx,
            ops,
        };
        engine.custom_tx(0, conn, &mut io, sp).unwrap()
    }

    pub fn close(&mut self, conn: u32) {
        let Harness {
            engine,
            ops,
            ts_rx,
            ts_tx,
            as_rx,
            as_tx,
        } = self;
        let mut io = SessionIo {
            ts_rx,
            ts_tx,
            as_rx,
            as_tx,
            ops,
        };
        engine.close(0, conn, &mut io).unwrap();
    }

    pub fn disconnect(&mut self, conn: u32) {
        let Harness {
            engine,
            ops,
            ts_rx,
            ts_tx,
            as_rx,
            as_tx,
        } = self;
        let mut io = SessionIo {
            ts_rx,
            ts_tx,
            as_rx,
            as_tx,
            ops,
        };
        engine.transport_disconnect(0, conn, &mut io).unwrap();
    }

    /// Reads and decodes the control message at the head of the app RX
    /// FIFO, plus the inline payload that follows it.
    pub fn read_app_msg(&mut self) -> (HttpMsg, Vec<u8>) {
        let mut hdr = [0u8; HTTP_MSG_SIZE];
        assert_eq!(self.as_rx.dequeue(&mut hdr), HTTP_MSG_SIZE);
        let msg = HttpMsg::from_bytes(&hdr).unwrap();
        let mut payload = vec![0u8; msg.data.len as usize];
        assert_eq!(self.as_rx.dequeue(&mut payload), payload.len());
        (msg, payload)
    }

    /// Drains everything currently on the transport TX FIFO.
    pub fn wire_tx(&mut self) -> Vec<u8> {
        let n = self.ts_tx.max_dequeue();
        let mut out = vec![0u8; n];
        self.ts_tx.dequeue(&mut out);
        out
    }

    /// Queues an inline reply (server role): control message, app header
    /// bytes, then the body.
    pub fn app_reply_inline(&mut self, code: StatusCode, app_headers: &[u8], body: &[u8]) {
        let data = MsgData {
            kind_raw: DataType::Inline as u8,
            len: (app_headers.len() + body.len()) as u64,
            headers_offset: 0,
            headers_len: app_headers.len() as u32,
            body_offset: app_headers.len() as u32,
            body_len: body.len() as u64,
            ..Default::default()
        };
        let msg = HttpMsg::reply(code, data);
        self.as_tx
            .enqueue_atomic(&[&msg.to_bytes()[..], app_headers, body])
            .unwrap();
    }

    /// Queues an inline request (client role): control message, target
    /// path/query, app headers, then the body.
    pub fn app_request_inline(
        &mut self,
        method: Method,
        path: &[u8],
        query: &[u8],
        app_headers: &[u8],
        body: &[u8],
    ) {
        let pre_len = path.len() + query.len() + app_headers.len();
        let data = MsgData {
            kind_raw: DataType::Inline as u8,
            len: (pre_len + body.len()) as u64,
            target_path_offset: 0,
            target_path_len: path.len() as u32,
            target_query_offset: path.len() as u32,
            target_query_len: query.len() as u32,
            headers_offset: (path.len() + query.len()) as u32,
            headers_len: app_headers.len() as u32,
            body_offset: pre_len as u32,
            body_len: body.len() as u64,
        };
        let msg = HttpMsg::request(method, data);
        self.as_tx
            .enqueue_atomic(&[&msg.to_bytes()[..], path, query, app_headers, body])
            .unwrap();
    }
}
