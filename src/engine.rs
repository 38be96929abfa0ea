//! The protocol engine: state-machine driver, shared IO handlers, the
//! transport face exposed to the session layer, and the session
//! callbacks driving per-connection progress.

use crate::buffer::HttpBuffer;
use crate::config::{ConfigKnob, HttpConfig};
use crate::conn::{ConnHandle, ConnState, HalfOpen, HttpConn, HttpWorker, Listener, ProtoState};
use crate::error::{Error, Result, SmResult};
use crate::fifo::Fifo;
use crate::format::DateCache;
use crate::log::{HttpLogCode, Logger};
use crate::msg::{DataType, HttpMsg, MsgData, HTTP_MSG_PTR_SIZE, HTTP_MSG_SIZE};
use crate::pool::Pool;
use crate::session::{
    CleanupPhase, ConnectArgs, ListenArgs, SendParams, SessionHandle, SessionIo, SessionOps,
    SESSION_HANDLE_INVALID,
};
use crate::status::StatusCode;
use crate::timer::TIMER_HANDLE_INVALID;
use crate::{format, request, response};
use bstr::BString;
use std::time::{SystemTime, UNIX_EPOCH};

/// Transport TX free-space floor below which the connection comes off
/// the pacer, bounded by what is actually left to send.
const TX_FIFO_LOW_WATER: usize = 4096;

/// Shared engine context handed to state handlers alongside the
/// connection record.
pub(crate) struct Ctx<'a> {
    pub cfg: &'a HttpConfig,
    pub log: &'a mut Logger,
    pub date: &'a mut DateCache,
    pub time_base: f64,
}

/// Wall-clock seconds derived from the shared time base.
pub(crate) fn unix_now(ctx: &Ctx, ops: &dyn SessionOps) -> i64 {
    (ctx.time_base + ops.now()) as i64
}

/// Emits the canned wire error for a client protocol failure, notifies
/// closing and initiates disconnect. Server role only.
pub(crate) fn send_error_response(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
    code: StatusCode,
) -> SmResult {
    htx_warn!(
        ctx.log,
        HttpLogCode::RequestParseError,
        format!("{}: request rejected with {}", conn, code)
    );
    let now = unix_now(ctx, &*io.ops);
    let wire = format::error_response(code, ctx.date.get(now));
    // best effort: the peer may already be gone
    let _ = io.ts_tx.enqueue_all(&wire);
    if conn.as_handle != SESSION_HANDLE_INVALID {
        io.ops.app_closing_notify(conn.as_handle);
    }
    io.ops.transport_disconnect(conn.ts_handle);
    SmResult::Error
}

/// Server protocol failure seen by a client: no response is possible,
/// reset the connection.
pub(crate) fn protocol_reset(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
    what: &str,
) -> SmResult {
    htx_error!(
        ctx.log,
        HttpLogCode::ResponseParseError,
        format!("{}: {}", conn, what)
    );
    if conn.as_handle != SESSION_HANDLE_INVALID {
        io.ops.app_closing_notify(conn.as_handle);
    }
    io.ops.transport_reset(conn.ts_handle);
    SmResult::Error
}

/// Application protocol violation: drop the app TX FIFO fully and close.
pub(crate) fn app_violation(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
    what: &str,
) -> SmResult {
    htx_error!(
        ctx.log,
        HttpLogCode::AppProtocolViolation,
        format!("{}: {}", conn, what)
    );
    let pending = io.as_tx.max_dequeue();
    io.as_tx.drain(pending);
    if conn.as_handle != SESSION_HANDLE_INVALID {
        io.ops.app_closing_notify(conn.as_handle);
    }
    io.ops.transport_disconnect(conn.ts_handle);
    SmResult::Error
}

/// Resource exhaustion or engine-internal failure: close the connection.
pub(crate) fn internal_error(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
    code: HttpLogCode,
    what: &str,
) -> SmResult {
    htx_error!(ctx.log, code, format!("{}: {}", conn, what));
    if conn.as_handle != SESSION_HANDLE_INVALID {
        io.ops.app_closing_notify(conn.as_handle);
    }
    io.ops.transport_disconnect(conn.ts_handle);
    SmResult::Error
}

/// Where an outbound message's payload lives once its header has been
/// read off the app TX FIFO.
pub(crate) enum TxSource {
    Inline { pre: Vec<u8> },
    Ptr { addr: usize },
}

impl TxSource {
    /// Control bytes (target, query, app headers) at `offset..offset+len`
    /// of the inline run or pointed-to region.
    pub(crate) fn slice(&self, offset: usize, len: usize) -> &[u8] {
        match self {
            TxSource::Inline { pre } => &pre[offset..offset + len],
            // Safety: range-checked against the declared region length in
            // read_app_payload; lifetime is the application's PTR contract.
            TxSource::Ptr { addr } => unsafe {
                std::slice::from_raw_parts((*addr + offset) as *const u8, len)
            },
        }
    }

    pub(crate) fn make_buffer(&self, msg: &HttpMsg) -> HttpBuffer {
        match self {
            TxSource::Inline { .. } => HttpBuffer::inline(msg.data.body_len),
            TxSource::Ptr { addr } => {
                HttpBuffer::pointer(*addr, msg.data.body_offset as usize, msg.data.body_len)
            }
        }
    }
}

/// Pulls the payload carrier that follows a control message: the inline
/// pre-body run, or the machine-word pointer. Validates every declared
/// range before anything is sliced.
pub(crate) fn read_app_payload(msg: &HttpMsg, as_tx: &mut Fifo) -> Result<TxSource> {
    let data = &msg.data;
    let control_bound = match data.kind()? {
        DataType::Inline => u64::from(data.body_offset),
        DataType::Ptr => data.len,
    };
    if u64::from(data.target_path_offset) + u64::from(data.target_path_len) > control_bound
        || u64::from(data.target_query_offset) + u64::from(data.target_query_len) > control_bound
        || u64::from(data.headers_offset) + u64::from(data.headers_len) > control_bound
    {
        return Err(Error::AppViolation);
    }
    match data.kind()? {
        DataType::Inline => {
            // the body is the tail of the inline run
            if data.len != u64::from(data.body_offset) + data.body_len {
                return Err(Error::AppViolation);
            }
            let pre_len = data.body_offset as usize;
            if as_tx.max_dequeue() < pre_len {
                return Err(Error::AppViolation);
            }
            let mut pre = vec![0u8; pre_len];
            as_tx.dequeue(&mut pre);
            Ok(TxSource::Inline { pre })
        }
        DataType::Ptr => {
            if u64::from(data.body_offset) + data.body_len > data.len {
                return Err(Error::AppViolation);
            }
            if as_tx.max_dequeue() < HTTP_MSG_PTR_SIZE {
                return Err(Error::AppViolation);
            }
            let mut word = [0u8; HTTP_MSG_PTR_SIZE];
            as_tx.dequeue(&mut word);
            let addr = u64::from_le_bytes(word) as usize;
            if addr == 0 && data.len > 0 {
                return Err(Error::AppViolation);
            }
            Ok(TxSource::Ptr { addr })
        }
    }
}

/// Enqueues the control message and as much of the parsed wire bytes as
/// fit into the app RX FIFO as one atomic two-segment write, then
/// transitions by how much body is still owed.
pub(crate) fn deliver_msg_to_app(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
) -> SmResult {
    let max_enq = io.as_rx.max_enqueue();
    if max_enq < HTTP_MSG_SIZE + conn.control_data_len {
        return internal_error(
            conn,
            ctx,
            io,
            HttpLogCode::AppRxFifoTooSmall,
            "app rx fifo cannot take control data",
        );
    }

    let body_avail = ((conn.rx_buf.len() - conn.body_offset) as u64).min(conn.body_len) as usize;
    let room = max_enq - HTTP_MSG_SIZE - conn.control_data_len;
    let body_deliver = body_avail.min(room);
    let n_inline = conn.control_data_len + body_deliver;

    let data = MsgData {
        kind_raw: DataType::Inline as u8,
        len: n_inline as u64,
        target_path_offset: conn.target_path_offset as u32,
        target_path_len: conn.target_path_len as u32,
        target_query_offset: conn.target_query_offset as u32,
        target_query_len: conn.target_query_len as u32,
        headers_offset: conn.headers_offset as u32,
        headers_len: conn.headers_len as u32,
        body_offset: conn.body_offset as u32,
        body_len: conn.body_len,
    };
    let msg = if conn.is_server {
        HttpMsg::request(conn.method, data)
    } else {
        HttpMsg::reply(conn.status, data)
    };
    let hdr = msg.to_bytes();
    if io
        .as_rx
        .enqueue_atomic(&[&hdr[..], &conn.rx_buf[..n_inline]])
        .is_err()
    {
        return internal_error(
            conn,
            ctx,
            io,
            HttpLogCode::AppRxFifoTooSmall,
            "app rx fifo rejected control data",
        );
    }
    io.ops.app_rx_notify(conn.as_handle);

    conn.to_recv = conn.body_len - body_deliver as u64;
    if conn.to_recv == 0 {
        if conn.is_server {
            // no pipelining: anything past this message is dropped
            conn.rx_buf.clear();
        } else {
            conn.rx_buf.drain(..n_inline);
        }
        conn.rx_buf_offset = 0;
        conn.proto_state = if conn.is_server {
            ProtoState::WaitAppReply
        } else {
            ProtoState::WaitAppMethod
        };
        SmResult::Stop
    } else {
        conn.rx_buf_offset = n_inline;
        conn.proto_state = ProtoState::ClientIoMoreData;
        SmResult::Continue
    }
}

/// Streams outstanding body bytes transport-side to the application,
/// first from the scratch remainder, then straight off the transport RX
/// FIFO. Applies app-side backpressure by arming a dequeue notification.
pub(crate) fn state_client_io_more_data(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
) -> SmResult {
    let incoming = conn.pending_rx_bytes() as u64 + io.ts_rx.max_dequeue() as u64;
    if incoming > conn.to_recv {
        htx_error!(
            ctx.log,
            HttpLogCode::BodyOverrun,
            format!(
                "{}: {} bytes past the declared content length",
                conn,
                incoming - conn.to_recv
            )
        );
        if conn.as_handle != SESSION_HANDLE_INVALID {
            io.ops.app_closing_notify(conn.as_handle);
        }
        io.ops.transport_disconnect(conn.ts_handle);
        return SmResult::Error;
    }

    let mut space = io.as_rx.max_enqueue();
    let mut delivered = 0usize;

    let pending = conn.pending_rx_bytes();
    if pending > 0 && space > 0 {
        let n = pending.min(space);
        io.as_rx
            .enqueue(&conn.rx_buf[conn.rx_buf_offset..conn.rx_buf_offset + n]);
        conn.rx_buf_offset += n;
        delivered += n;
        space -= n;
        if conn.rx_buf_offset == conn.rx_buf.len() {
            conn.rx_buf.clear();
            conn.rx_buf_offset = 0;
        }
    }

    let mut chunk = [0u8; 4096];
    while space > 0 && io.ts_rx.max_dequeue() > 0 {
        let want = space.min(chunk.len());
        let n = io.ts_rx.dequeue(&mut chunk[..want]);
        if n == 0 {
            break;
        }
        io.as_rx.enqueue(&chunk[..n]);
        delivered += n;
        space -= n;
    }

    conn.to_recv -= delivered as u64;
    if delivered > 0 {
        io.ops.app_rx_notify(conn.as_handle);
    }

    if conn.to_recv == 0 {
        conn.rx_buf.clear();
        conn.rx_buf_offset = 0;
        conn.proto_state = if conn.is_server {
            ProtoState::WaitAppReply
        } else {
            ProtoState::WaitAppMethod
        };
        return SmResult::Stop;
    }
    if space == 0 && (conn.pending_rx_bytes() > 0 || io.ts_rx.max_dequeue() > 0) {
        io.as_rx.request_deq_ntf();
    }
    SmResult::Stop
}

/// Streams the outbound body through the HTTP buffer into the transport
/// TX FIFO in bounded bursts, descheduling when the FIFO is near full.
pub(crate) fn state_app_io_more_data(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
    sp: &mut SendParams,
) -> SmResult {
    if conn.tx_buf.is_none() {
        return internal_error(
            conn,
            ctx,
            io,
            HttpLogCode::TransportTxShortWrite,
            "no tx buffer in app io state",
        );
    }
    let buf = match conn.tx_buf.as_mut() {
        Some(buf) => buf,
        None => return SmResult::Error,
    };

    if !buf.is_drained() {
        let free = io.ts_tx.max_enqueue();
        let floor = (TX_FIFO_LOW_WATER.min(io.ts_tx.capacity() / 4).max(1) as u64)
            .min(buf.remaining()) as usize;
        if free < floor {
            io.ops.transport_deschedule(conn.ts_handle);
            io.ts_tx.request_deq_ntf();
            sp.descheduled = true;
            return SmResult::Stop;
        }
        let max = ctx.cfg.tx_max_burst.min(free).min(sp.max_burst);
        let (seg_a, seg_b) = buf.get_segs(io.as_tx, max);
        let mut written = io.ts_tx.enqueue(seg_a);
        if written == seg_a.len() {
            written += io.ts_tx.enqueue(seg_b);
        }
        if written == 0 {
            // inline body bytes not produced by the app yet
            return SmResult::Stop;
        }
        buf.drain(io.as_tx, written);
        if !buf.is_drained() {
            return SmResult::Continue;
        }
    }

    conn.tx_buf = None;
    conn.proto_state = if conn.is_server {
        ProtoState::WaitClientMethod
    } else {
        ProtoState::WaitServerReply
    };
    SmResult::Stop
}

fn run_state_machine(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
    wheel: &mut crate::timer::TimerWheel,
    sp: &mut SendParams,
) {
    loop {
        let result = match conn.proto_state {
            ProtoState::Idle => SmResult::Stop,
            ProtoState::WaitClientMethod => request::state_wait_client_method(conn, ctx, io),
            ProtoState::WaitAppReply => request::state_wait_app_reply(conn, ctx, io),
            ProtoState::WaitServerReply => response::state_wait_server_reply(conn, ctx, io),
            ProtoState::WaitAppMethod => response::state_wait_app_method(conn, ctx, io),
            ProtoState::ClientIoMoreData => state_client_io_more_data(conn, ctx, io),
            ProtoState::AppIoMoreData => state_app_io_more_data(conn, ctx, io, sp),
        };
        match result {
            SmResult::Continue => {
                if conn.timer_handle != TIMER_HANDLE_INVALID {
                    wheel.update(conn.timer_handle, conn.timeout_secs);
                }
            }
            SmResult::Stop => {
                if conn.timer_handle != TIMER_HANDLE_INVALID {
                    wheel.update(conn.timer_handle, conn.timeout_secs);
                }
                return;
            }
            SmResult::Error => return,
        }
    }
}

/// The embedded HTTP/1.1 protocol engine.
///
/// One instance per process; per-worker state inside is only ever
/// touched from its owning worker, the half-open and listener pools only
/// from the session layer's control path.
pub struct HttpEngine {
    cfg: HttpConfig,
    wrk: Vec<HttpWorker>,
    listeners: Pool<Listener>,
    half_opens: Pool<HalfOpen>,
    log: Logger,
    date: DateCache,
    time_base: f64,
    enabled: bool,
}

impl Default for HttpEngine {
    fn default() -> Self {
        Self::new(HttpConfig::default())
    }
}

impl HttpEngine {
    pub fn new(cfg: HttpConfig) -> Self {
        Self {
            cfg,
            wrk: Vec::new(),
            listeners: Pool::new(),
            half_opens: Pool::new(),
            log: Logger::new(),
            date: DateCache::new(),
            time_base: 0.0,
            enabled: false,
        }
    }

    /// Attaches the engine as a built-in transport app: allocates the
    /// per-worker pools and timer wheels and anchors the time base.
    /// Idempotent after the first success.
    pub fn enable(&mut self, n_workers: usize, ops: &mut dyn SessionOps) -> Result<()> {
        if self.enabled {
            return Ok(());
        }
        let now = ops.now();
        self.time_base = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
            - now;
        self.wrk = (0..n_workers.max(1)).map(|_| HttpWorker::new(now)).collect();
        self.enabled = true;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Applies one configuration knob, logging a warning when the value
    /// had to be clamped.
    pub fn configure(&mut self, knob: ConfigKnob) {
        if let Some(warning) = self.cfg.apply(knob) {
            htx_warn!(self.log, HttpLogCode::ConfigValueClamped, warning);
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.cfg
    }

    pub fn drain_logs(&mut self) -> Vec<crate::log::Log> {
        self.log.drain()
    }

    fn worker(&mut self, thread_index: u32) -> Result<&mut HttpWorker> {
        self.wrk
            .get_mut(thread_index as usize)
            .ok_or(Error::InvalidHandle)
    }

    // ---- transport face (upward) ----

    /// Starts an outbound connect: allocates a half-open record carrying
    /// the prospective identity and asks the transport to dial.
    pub fn connect(&mut self, args: ConnectArgs, ops: &mut dyn SessionOps) -> Result<u32> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        let timeout_secs = args
            .endpoint
            .http_ext()
            .map(|e| e.timeout_secs)
            .unwrap_or(self.cfg.conn_timeout_secs);
        let ho_index = self.half_opens.alloc(HalfOpen {
            app_wrk_index: args.app_wrk_index,
            api_context: args.api_context,
            host: BString::from(args.endpoint.addr.to_string()),
            timeout_secs,
            app_name: BString::from(args.app_name),
        });
        if let Err(e) = ops.transport_connect(&args.endpoint) {
            self.half_opens.free(ho_index);
            htx_warn!(
                self.log,
                HttpLogCode::ConnectFailed,
                format!("connect to {} refused: {}", args.endpoint.addr, e)
            );
            return Err(e);
        }
        Ok(ho_index)
    }

    /// Binds a listener. A CRYPTO endpoint extension upgrades the
    /// underlying transport to TLS; the engine itself stays agnostic.
    pub fn start_listen(&mut self, args: ListenArgs, ops: &mut dyn SessionOps) -> Result<u32> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        let timeout_secs = args
            .endpoint
            .http_ext()
            .map(|e| e.timeout_secs)
            .unwrap_or(self.cfg.conn_timeout_secs);
        let tls = args.endpoint.crypto_ext().is_some();
        let ts_listener = ops.transport_listen(&args.endpoint, tls)?;
        Ok(self.listeners.alloc(Listener {
            ts_listener,
            app_listener: args.app_listener_handle,
            app_wrk_index: args.app_wrk_index,
            timeout_secs,
            app_name: BString::from(args.app_name),
        }))
    }

    pub fn stop_listen(&mut self, listener_index: u32, ops: &mut dyn SessionOps) -> Result<()> {
        let listener = self
            .listeners
            .free(listener_index)
            .ok_or(Error::InvalidHandle)?;
        ops.transport_unlisten(listener.ts_listener);
        Ok(())
    }

    /// Application-initiated close. Disconnects immediately when nothing
    /// is left to send, otherwise waits for the TX drain.
    pub fn close(&mut self, thread_index: u32, conn_index: u32, io: &mut SessionIo) -> Result<()> {
        let conn = self
            .worker(thread_index)?
            .conns
            .get_mut(conn_index)
            .ok_or(Error::InvalidHandle)?;
        conn.state = ConnState::AppClosed;
        if io.as_tx.is_empty() && conn.tx_buf.is_none() {
            io.ops.transport_disconnect(conn.ts_handle);
        }
        Ok(())
    }

    /// TX driver invoked by the session scheduler whenever the app side
    /// produced data. Returns the bytes put on the transport TX FIFO.
    pub fn custom_tx(
        &mut self,
        thread_index: u32,
        conn_index: u32,
        io: &mut SessionIo,
        sp: &mut SendParams,
    ) -> Result<usize> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        let HttpEngine {
            wrk,
            cfg,
            log,
            date,
            time_base,
            ..
        } = self;
        let worker = wrk
            .get_mut(thread_index as usize)
            .ok_or(Error::InvalidHandle)?;
        let HttpWorker { conns, wheel } = worker;
        let conn = conns.get_mut(conn_index).ok_or(Error::InvalidHandle)?;
        let before = io.ts_tx.max_dequeue();
        let mut ctx = Ctx {
            cfg,
            log,
            date,
            time_base: *time_base,
        };
        run_state_machine(conn, &mut ctx, io, wheel, sp);
        if conn.state == ConnState::AppClosed && io.as_tx.is_empty() && conn.tx_buf.is_none() {
            io.ops.transport_disconnect(conn.ts_handle);
        }
        Ok(io.ts_tx.max_dequeue().saturating_sub(before))
    }

    pub fn get_connection(&self, thread_index: u32, conn_index: u32) -> Option<&HttpConn> {
        self.wrk
            .get(thread_index as usize)
            .and_then(|w| w.conns.get(conn_index))
    }

    pub fn get_listener(&self, listener_index: u32) -> Option<&Listener> {
        self.listeners.get(listener_index)
    }

    pub fn get_half_open(&self, ho_index: u32) -> Option<&HalfOpen> {
        self.half_opens.get(ho_index)
    }

    /// Frees a half-open whose transport session was cleaned up before
    /// (or instead of) a connected callback.
    pub fn cleanup_half_open(&mut self, ho_index: u32) {
        self.half_opens.free(ho_index);
    }

    // ---- session callbacks (downward) ----

    /// A transport session was accepted on one of our listeners:
    /// allocates the connection from the listener template, offers it to
    /// the app and starts the inactivity timer.
    pub fn transport_accept(
        &mut self,
        listener_index: u32,
        thread_index: u32,
        ts_handle: SessionHandle,
        ops: &mut dyn SessionOps,
    ) -> Result<u32> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        let listener = self
            .listeners
            .get(listener_index)
            .ok_or(Error::InvalidHandle)?;
        let (timeout_secs, app_name, app_wrk_index, app_listener) = (
            listener.timeout_secs,
            listener.app_name.clone(),
            listener.app_wrk_index,
            listener.app_listener,
        );

        let worker = self.worker(thread_index)?;
        let conn_index = worker.conns.alloc(HttpConn::new(thread_index));
        let handle = ConnHandle::new(thread_index, conn_index);
        {
            let conn = worker.conns.get_mut(conn_index).ok_or(Error::InvalidHandle)?;
            conn.conn_index = conn_index;
            conn.is_server = true;
            conn.ts_handle = ts_handle;
            conn.timeout_secs = timeout_secs;
            conn.app_name = app_name;
            conn.app_wrk_index = app_wrk_index;
            conn.state = ConnState::Established;
            conn.proto_state = ProtoState::WaitClientMethod;
        }

        let attach = match ops.app_accept(app_listener, handle.as_u32()) {
            Ok(attach) => attach,
            Err(e) => {
                self.worker(thread_index)?.conns.free(conn_index);
                return Err(e);
            }
        };

        let worker = self.worker(thread_index)?;
        let timer = worker.wheel.start(handle.as_u32(), timeout_secs);
        let conn = worker.conns.get_mut(conn_index).ok_or(Error::InvalidHandle)?;
        conn.as_handle = attach.session_handle;
        conn.app_session_index = attach.session_index;
        conn.app_wrk_index = attach.wrk_index;
        conn.timer_handle = timer;
        Ok(conn_index)
    }

    /// Connect completion. On success the half-open identity is copied
    /// into a full connection pinned to `thread_index` and the record is
    /// destroyed; on failure the app is notified and the record freed.
    pub fn transport_connected(
        &mut self,
        ho_index: u32,
        thread_index: u32,
        ts_handle: SessionHandle,
        failed: bool,
        ops: &mut dyn SessionOps,
    ) -> Result<Option<u32>> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        let ho = self
            .half_opens
            .get(ho_index)
            .ok_or(Error::InvalidHandle)?
            .clone();
        if failed {
            htx_warn!(
                self.log,
                HttpLogCode::ConnectFailed,
                format!("connect failed for {}", ho)
            );
            let _ = ops.app_connected(ho.api_context, None);
            self.half_opens.free(ho_index);
            return Ok(None);
        }

        let worker = self.worker(thread_index)?;
        let conn_index = worker.conns.alloc(HttpConn::new(thread_index));
        let handle = ConnHandle::new(thread_index, conn_index);
        {
            let conn = worker.conns.get_mut(conn_index).ok_or(Error::InvalidHandle)?;
            conn.conn_index = conn_index;
            conn.is_server = false;
            conn.ts_handle = ts_handle;
            conn.timeout_secs = ho.timeout_secs;
            conn.app_name = ho.app_name.clone();
            conn.app_wrk_index = ho.app_wrk_index;
            conn.api_context = ho.api_context;
            conn.host = ho.host.clone();
            conn.state = ConnState::Established;
            conn.proto_state = ProtoState::WaitAppMethod;
        }

        let attach = match ops.app_connected(ho.api_context, Some(handle.as_u32())) {
            Ok(attach) => attach,
            Err(e) => {
                ops.transport_disconnect(ts_handle);
                self.worker(thread_index)?.conns.free(conn_index);
                self.half_opens.free(ho_index);
                return Err(e);
            }
        };

        let worker = self.worker(thread_index)?;
        let timer = worker.wheel.start(handle.as_u32(), ho.timeout_secs);
        let conn = worker.conns.get_mut(conn_index).ok_or(Error::InvalidHandle)?;
        conn.as_handle = attach.session_handle;
        conn.app_session_index = attach.session_index;
        conn.app_wrk_index = attach.wrk_index;
        conn.timer_handle = timer;

        self.half_opens.free(ho_index);
        Ok(Some(conn_index))
    }

    /// Bytes arrived on the transport RX FIFO (or the app drained its RX
    /// FIFO after a dequeue notification): run the state machine.
    pub fn transport_rx(
        &mut self,
        thread_index: u32,
        conn_index: u32,
        io: &mut SessionIo,
    ) -> Result<()> {
        if !self.enabled {
            return Err(Error::NotEnabled);
        }
        let HttpEngine {
            wrk,
            cfg,
            log,
            date,
            time_base,
            ..
        } = self;
        let worker = wrk
            .get_mut(thread_index as usize)
            .ok_or(Error::InvalidHandle)?;
        let HttpWorker { conns, wheel } = worker;
        let conn = conns.get_mut(conn_index).ok_or(Error::InvalidHandle)?;
        if conn.state == ConnState::Closed {
            return Ok(());
        }
        let had_rx = !io.ts_rx.is_empty() || conn.pending_rx_bytes() > 0;
        let mut ctx = Ctx {
            cfg,
            log,
            date,
            time_base: *time_base,
        };
        let mut sp = SendParams::default();
        run_state_machine(conn, &mut ctx, io, wheel, &mut sp);
        // a disconnect observed with RX still queued defers its closing
        // notification until the remaining bytes are delivered
        if conn.state == ConnState::TransportClosed
            && had_rx
            && io.ts_rx.is_empty()
            && conn.pending_rx_bytes() == 0
            && conn.as_handle != SESSION_HANDLE_INVALID
        {
            io.ops.app_closing_notify(conn.as_handle);
        }
        Ok(())
    }

    /// Builtin-TX callback: the transport TX FIFO drained and the pacer
    /// rescheduled us; resume body streaming.
    pub fn transport_tx(
        &mut self,
        thread_index: u32,
        conn_index: u32,
        io: &mut SessionIo,
    ) -> Result<usize> {
        let mut sp = SendParams::default();
        self.custom_tx(thread_index, conn_index, io, &mut sp)
    }

    /// The transport signalled an orderly disconnect.
    pub fn transport_disconnect(
        &mut self,
        thread_index: u32,
        conn_index: u32,
        io: &mut SessionIo,
    ) -> Result<()> {
        let conn = self
            .worker(thread_index)?
            .conns
            .get_mut(conn_index)
            .ok_or(Error::InvalidHandle)?;
        conn.state = ConnState::TransportClosed;
        if io.ts_rx.is_empty() && conn.pending_rx_bytes() == 0 {
            if conn.as_handle != SESSION_HANDLE_INVALID {
                io.ops.app_closing_notify(conn.as_handle);
            }
        }
        Ok(())
    }

    /// The transport reset the connection.
    pub fn transport_reset(
        &mut self,
        thread_index: u32,
        conn_index: u32,
        ops: &mut dyn SessionOps,
    ) -> Result<()> {
        let conn = self
            .worker(thread_index)?
            .conns
            .get_mut(conn_index)
            .ok_or(Error::InvalidHandle)?;
        conn.state = ConnState::Closed;
        conn.tx_buf = None;
        conn.proto_state = ProtoState::WaitClientMethod;
        if conn.as_handle != SESSION_HANDLE_INVALID {
            ops.app_reset_notify(conn.as_handle);
        }
        Ok(())
    }

    /// Final per-connection cleanup; the single place a connection
    /// record is freed, regardless of how the exchange ended. The
    /// transport-only notification phase is ignored.
    pub fn transport_cleanup(
        &mut self,
        thread_index: u32,
        conn_index: u32,
        phase: CleanupPhase,
    ) -> Result<()> {
        if phase == CleanupPhase::Transport {
            return Ok(());
        }
        let worker = self.worker(thread_index)?;
        let conn = worker.conns.get(conn_index).ok_or(Error::InvalidHandle)?;
        let timer = conn.timer_handle;
        let pending = conn.pending_timer;
        if timer != TIMER_HANDLE_INVALID && !pending {
            worker.wheel.stop(timer);
        }
        worker.conns.free(conn_index);
        Ok(())
    }

    /// Advances this worker's timer wheel and runs the two-phase
    /// expiry: invalidate first (the record may have been freed and its
    /// slot recycled since the wheel fired), then time out whatever is
    /// still pending.
    pub fn handle_timeouts(&mut self, thread_index: u32, ops: &mut dyn SessionOps) -> Result<()> {
        let now = ops.now();
        let worker = self.worker(thread_index)?;
        let expired = worker.wheel.expire(now);

        for &raw in &expired {
            let handle = ConnHandle::from_u32(raw);
            if handle.thread_index() != thread_index {
                continue;
            }
            if let Some(conn) = worker.conns.get_mut(handle.conn_index()) {
                conn.pending_timer = true;
                conn.timer_handle = TIMER_HANDLE_INVALID;
            }
        }

        for raw in expired {
            let handle = ConnHandle::from_u32(raw);
            if handle.thread_index() != thread_index {
                continue;
            }
            let worker = self.worker(thread_index)?;
            let (ts_handle, as_handle) = match worker.conns.get_mut(handle.conn_index()) {
                Some(conn) if conn.pending_timer => {
                    conn.pending_timer = false;
                    (conn.ts_handle, conn.as_handle)
                }
                _ => continue,
            };
            htx_warn!(
                self.log,
                HttpLogCode::Timeout,
                format!("connection [{}:{}] timed out", thread_index, handle.conn_index())
            );
            if as_handle != SESSION_HANDLE_INVALID {
                ops.app_closing_notify(as_handle);
            }
            ops.transport_disconnect(ts_handle);
        }
        Ok(())
    }
}
