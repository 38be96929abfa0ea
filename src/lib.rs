//! Embedded HTTP/1.1 protocol engine for user-space session stacks.
//!
//! This crate is not a user-facing HTTP library. It is a transport-layer
//! plug-in that sits between a generic session layer, which owns TCP/TLS
//! byte streams and per-connection FIFO queues, and application workers,
//! which consume and produce structured HTTP messages. On one side it
//! reads and writes raw wire bytes; on the other it exchanges fixed-layout
//! control messages (see [`msg`]) through byte FIFOs. Both the server and
//! the client role are supported; pipelining is not.
//!
//! The embedding stack drives the engine through the transport face on
//! [`engine::HttpEngine`] (enable, connect, listen, close, custom tx) and
//! the session callbacks (accept, connected, rx, tx, disconnect, reset,
//! cleanup). All session-layer services the engine needs in return are
//! behind the [`session::SessionOps`] trait.

#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod log;

pub mod buffer;
pub mod config;
pub mod conn;
pub mod engine;
pub mod error;
pub mod fifo;
pub mod format;
pub mod msg;
pub mod parser;
pub mod pool;
pub mod session;
pub mod status;
pub mod timer;

mod request;
mod response;

pub use crate::engine::HttpEngine;
pub use crate::error::{Error, Result};
pub use crate::status::StatusCode;
