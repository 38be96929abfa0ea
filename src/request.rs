//! Server-role state handlers: request intake and reply emission.

use crate::conn::{HttpConn, ProtoState};
use crate::engine::{
    app_violation, deliver_msg_to_app, internal_error, read_app_payload, send_error_response,
    unix_now, Ctx,
};
use crate::error::SmResult;
use crate::format;
use crate::log::HttpLogCode;
use crate::msg::{HttpMsg, MsgType, HTTP_MSG_SIZE};
use crate::parser::{self, ParseOutcome};
use crate::session::SessionIo;

/// Parses one request from the transport stream and hands the control
/// message plus whatever body bytes arrived to the application.
pub(crate) fn state_wait_client_method(
    conn: &mut HttpConn,
    ctx: &mut Ctx,
    io: &mut SessionIo,
) -> SmResult {
    conn.read_message(io.ts_rx);
    if conn.rx_buf.is_empty() {
        return SmResult::Stop;
    }

    let rl = match parser::request_line(&conn.rx_buf) {
        Ok(ParseOutcome::Done(rl)) => rl,
        Ok(ParseOutcome::Incomplete) => return SmResult::Stop,
        Err(code) => return send_error_response(conn, ctx, io, code),
    };
    let ti = match parser::target_form(&conn.rx_buf, rl.target_offset, rl.target_len) {
        Ok(ti) => ti,
        Err(code) => return send_error_response(conn, ctx, io, code),
    };
    let hb = match parser::find_headers(&conn.rx_buf, rl.control_data_len) {
        ParseOutcome::Done(hb) => hb,
        ParseOutcome::Incomplete => return SmResult::Stop,
    };
    let body_len = match parser::body_len(
        &conn.rx_buf[hb.headers_offset..hb.headers_offset + hb.headers_len],
    ) {
        Ok(len) => len,
        Err(code) => return send_error_response(conn, ctx, io, code),
    };

    conn.method = rl.method;
    conn.target_form = ti.form;
    conn.target_path_offset = ti.path_offset;
    conn.target_path_len = ti.path_len;
    conn.target_query_offset = ti.query_offset;
    conn.target_query_len = ti.query_len;
    conn.headers_offset = hb.headers_offset;
    conn.headers_len = hb.headers_len;
    conn.control_data_len = hb.control_data_len;
    conn.body_offset = hb.body_offset;
    conn.body_len = body_len;

    deliver_msg_to_app(conn, ctx, io)
}

/// Reads the application's reply header off its TX FIFO, emits the
/// formatted response head, and starts body streaming when there is one.
pub(crate) fn state_wait_app_reply(
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
        Err(_) => return app_violation(conn, ctx, io, "undecodable reply header"),
    };
    if msg.kind != MsgType::Reply {
        return app_violation(conn, ctx, io, "expected a reply message");
    }
    let source = match read_app_payload(&msg, io.as_tx) {
        Ok(source) => source,
        Err(_) => return app_violation(conn, ctx, io, "reply payload out of bounds"),
    };

    conn.status = msg.code;
    conn.body_len = msg.data.body_len;

    let server = if conn.app_name.is_empty() {
        format::SERVER_NAME_DEFAULT
    } else {
        &conn.app_name[..]
    };
    let app_headers = source.slice(
        msg.data.headers_offset as usize,
        msg.data.headers_len as usize,
    );
    let now = unix_now(ctx, io.ops);
    let head = format::response_head(
        msg.code,
        ctx.date.get(now),
        server,
        msg.data.body_len,
        app_headers,
    );
    if io.ts_tx.enqueue_all(&head).is_err() {
        return internal_error(
            conn,
            ctx,
            io,
            HttpLogCode::TransportTxShortWrite,
            "transport tx fifo cannot take response head",
        );
    }

    if msg.data.body_len > 0 {
        conn.tx_buf = Some(source.make_buffer(&msg));
        conn.proto_state = ProtoState::AppIoMoreData;
        SmResult::Continue
    } else {
        conn.proto_state = ProtoState::WaitClientMethod;
        SmResult::Stop
    }
}
