//! Client-role state handlers: request emission and response intake.

use crate::conn::{HttpConn, ProtoState};
use crate::engine::{
    app_violation, deliver_msg_to_app, internal_error, protocol_reset, read_app_payload, Ctx,
};
use crate::error::SmResult;
use crate::format;
use crate::log::HttpLogCode;
use crate::msg::{HttpMsg, Method, MsgType, HTTP_MSG_SIZE};
use crate::parser::{self, ParseOutcome};
use crate::session::SessionIo;
use crate::status::StatusCode;

/// Parses one status line and header block from the transport stream and
/// hands the control message plus whatever body bytes arrived to the
/// application. Any malformation resets the connection; no response can
/// be sent from this side.
pub(crate) fn state_wait_server_reply(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
) -> SmResult {
    conn.read_message(io.ts_rx);
    if conn.rx_buf.is_empty() {
        return SmResult::Stop;
    }

    let sl = match parser::status_line(&conn.rx_buf) {
        Ok(ParseOutcome::Done(sl)) => sl,
        Ok(ParseOutcome::Incomplete) => return SmResult::Stop,
        Err(_) => return protocol_reset(conn, ctx, io, "malformed status line"),
    };
    let hb = match parser::find_headers(&conn.rx_buf, sl.control_data_len) {
        ParseOutcome::Done(hb) => hb,
        ParseOutcome::Incomplete => return SmResult::Stop,
    };
    let body_len = match parser::body_len(
        &conn.rx_buf[hb.headers_offset..hb.headers_offset + hb.headers_len],
    ) {
        Ok(len) => len,
        Err(_) => return protocol_reset(conn, ctx, io, "malformed content length"),
    };

    conn.status = StatusCode::from_wire(sl.code);
    conn.target_path_offset = 0;
    conn.target_path_len = 0;
    conn.target_query_offset = 0;
    conn.target_query_len = 0;
    conn.headers_offset = hb.headers_offset;
    conn.headers_len = hb.headers_len;
    conn.control_data_len = hb.control_data_len;
    conn.body_offset = hb.body_offset;
    conn.body_len = body_len;

    deliver_msg_to_app(conn, ctx, io)
}

/// Reads the application's request header off its TX FIFO and emits the
/// formatted request head. GET parks the connection until the reply
/// arrives; POST starts body streaming.
pub(crate) fn state_wait_app_method(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
) -> SmResult {
    if io.as_tx.max_dequeue() < HTTP_MSG_SIZE {
        return SmResult::Stop;
    }
    let mut hdr = [0u8; HTTP_MSG_SIZE];
    io.as_tx.dequeue(&mut hdr);
    let msg = match HttpMsg::from_bytes(&hdr) {
        Ok(msg) => msg,
        Err(_) => return app_violation(conn, ctx, io, "undecodable request header"),
    };
    if msg.kind != MsgType::Request {
        return app_violation(conn, ctx, io, "expected a request message");
    }
    if msg.method == Method::Get && msg.data.body_len > 0 {
        return app_violation(conn, ctx, io, "GET cannot carry a body");
    }
    let source = match read_app_payload(&msg, io.as_tx) {
        Ok(source) => source,
        Err(_) => return app_violation(conn, ctx, io, "request payload out of bounds"),
    };

    let user_agent = if conn.app_name.is_empty() {
        format::CLIENT_NAME_DEFAULT
    } else {
        &conn.app_name[..]
    };
    let target_path = source.slice(
        msg.data.target_path_offset as usize,
        msg.data.target_path_len as usize,
    );
    let target_query = source.slice(
        msg.data.target_query_offset as usize,
        msg.data.target_query_len as usize,
    );
    let app_headers = source.slice(
        msg.data.headers_offset as usize,
        msg.data.headers_len as usize,
    );
    let content_length = match msg.method {
        Method::Post => Some(msg.data.body_len),
        Method::Get => None,
    };
    let head = format::request_head(
        msg.method,
        target_path,
        target_query,
        &conn.host[..],
        user_agent,
        content_length,
        app_headers,
    );
    if io.ts_tx.enqueue_all(&head).is_err() {
        return internal_error(
            conn,
            ctx,
            io,
            HttpLogCode::TransportTxShortWrite,
            "transport tx fifo cannot take request head",
        );
    }

    conn.method = msg.method;
    match msg.method {
        Method::Get => {
            conn.proto_state = ProtoState::WaitServerReply;
            SmResult::Stop
        }
        Method::Post => {
            conn.tx_buf = Some(source.make_buffer(&msg));
            conn.proto_state = ProtoState::AppIoMoreData;
            SmResult::Continue
        }
    }
}
