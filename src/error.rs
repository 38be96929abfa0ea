use std::fmt;

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Terminal engine errors surfaced to the embedding stack.
///
/// Per-connection protocol failures do not use this type: request parse
/// errors carry an HTTP status code so the server can emit a canned wire
/// error, and response parse errors are opaque (the client resets). This
/// enum covers the API and resource failures the session layer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The engine has not been enabled yet.
    NotEnabled,
    /// A connection, listener or half-open index did not resolve.
    InvalidHandle,
    /// A FIFO could not accept a write that must not be split.
    FifoFull,
    /// The application violated the control-message contract.
    AppViolation,
    /// Wire bytes violated HTTP/1.1 framing on the response path.
    Parse,
    /// The session layer refused an attach or connect.
    SessionRefused,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Error::NotEnabled => "engine not enabled",
            Error::InvalidHandle => "invalid handle",
            Error::FifoFull => "fifo full",
            Error::AppViolation => "application protocol violation",
            Error::Parse => "malformed message",
            Error::SessionRefused => "session layer refused",
        };
        f.write_str(s)
    }
}

impl std::error::Error for Error {}

/// Outcome of one state-machine handler invocation.
///
/// `Continue` re-enters the driver loop, `Stop` parks the connection until
/// the next RX/TX event or timer tick, `Error` aborts without refreshing
/// the inactivity timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmResult {
    Continue,
    Stop,
    Error,
}
