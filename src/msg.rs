use crate::error::{Error, Result};
use crate::status::StatusCode;
use std::convert::TryInto;

/// Serialized size of [`HttpMsg`]. The layout is a wire contract with the
/// application side and must not change: field order and widths below are
/// frozen, all integers little-endian.
///
/// ```text
/// offset  width  field
///      0      1  msg type        (0 request, 1 reply)
///      1      1  method          (0 GET, 1 POST; requests only)
///      2      2  code            (canonical status; replies only)
///      4      1  data type       (0 inline, 1 pointer)
///      5      8  data len
///     13      4  target path offset      (requests only)
///     17      4  target path len
///     21      4  target query offset
///     25      4  target query len
///     29      4  headers offset
///     33      4  headers len
///     37      4  body offset
///     41      8  body len
/// ```
pub const HTTP_MSG_SIZE: usize = 49;

/// Width of the machine-word address that follows a PTR-carried message.
pub const HTTP_MSG_PTR_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Request = 0,
    Reply = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get = 0,
    Post = 1,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// How the payload travels: INLINE means the bytes follow in the same
/// FIFO write; PTR means a single machine-word address follows, pointing
/// to an application-owned contiguous region that must stay alive until
/// the engine drains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Inline = 0,
    Ptr = 1,
}

/// Payload descriptor. All offsets/lengths are relative to the inline
/// payload or to the pointed-to region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MsgData {
    pub kind_raw: u8,
    pub len: u64,
    pub target_path_offset: u32,
    pub target_path_len: u32,
    pub target_query_offset: u32,
    pub target_query_len: u32,
    pub headers_offset: u32,
    pub headers_len: u32,
    pub body_offset: u32,
    pub body_len: u64,
}

impl MsgData {
    /// Validated carrier discriminant. Anything above PTR is an
    /// application protocol violation.
    pub fn kind(&self) -> Result<DataType> {
        match self.kind_raw {
            0 => Ok(DataType::Inline),
            1 => Ok(DataType::Ptr),
            _ => Err(Error::AppViolation),
        }
    }
}

/// The fixed-layout structured header exchanged through the app-side
/// FIFOs in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpMsg {
    pub kind: MsgType,
    pub method: Method,
    pub code: StatusCode,
    pub data: MsgData,
}

impl HttpMsg {
    pub fn request(method: Method, data: MsgData) -> Self {
        Self {
            kind: MsgType::Request,
            method,
            code: StatusCode::Ok,
            data,
        }
    }

    pub fn reply(code: StatusCode, data: MsgData) -> Self {
        Self {
            kind: MsgType::Reply,
            method: Method::Get,
            code,
            data,
        }
    }

    pub fn to_bytes(&self) -> [u8; HTTP_MSG_SIZE] {
        let mut b = [0u8; HTTP_MSG_SIZE];
        b[0] = self.kind as u8;
        b[1] = self.method as u8;
        b[2..4].copy_from_slice(&self.code.as_u16().to_le_bytes());
        b[4] = self.data.kind_raw;
        b[5..13].copy_from_slice(&self.data.len.to_le_bytes());
        b[13..17].copy_from_slice(&self.data.target_path_offset.to_le_bytes());
        b[17..21].copy_from_slice(&self.data.target_path_len.to_le_bytes());
        b[21..25].copy_from_slice(&self.data.target_query_offset.to_le_bytes());
        b[25..29].copy_from_slice(&self.data.target_query_len.to_le_bytes());
        b[29..33].copy_from_slice(&self.data.headers_offset.to_le_bytes());
        b[33..37].copy_from_slice(&self.data.headers_len.to_le_bytes());
        b[37..41].copy_from_slice(&self.data.body_offset.to_le_bytes());
        b[41..49].copy_from_slice(&self.data.body_len.to_le_bytes());
        b
    }

    /// Decodes and validates the discriminants. An out-of-range message
    /// type, method or data carrier is an application protocol violation.
    pub fn from_bytes(b: &[u8; HTTP_MSG_SIZE]) -> Result<Self> {
        let kind = match b[0] {
            0 => MsgType::Request,
            1 => MsgType::Reply,
            _ => return Err(Error::AppViolation),
        };
        let method = match b[1] {
            0 => Method::Get,
            1 => Method::Post,
            _ => return Err(Error::AppViolation),
        };
        let code = StatusCode::from_wire(u16::from_le_bytes([b[2], b[3]]));
        let data = MsgData {
            kind_raw: b[4],
            len: u64::from_le_bytes(b[5..13].try_into().map_err(|_| Error::Parse)?),
            target_path_offset: u32::from_le_bytes(b[13..17].try_into().map_err(|_| Error::Parse)?),
            target_path_len: u32::from_le_bytes(b[17..21].try_into().map_err(|_| Error::Parse)?),
            target_query_offset: u32::from_le_bytes(
                b[21..25].try_into().map_err(|_| Error::Parse)?,
            ),
            target_query_len: u32::from_le_bytes(b[25..29].try_into().map_err(|_| Error::Parse)?),
            headers_offset: u32::from_le_bytes(b[29..33].try_into().map_err(|_| Error::Parse)?),
            headers_len: u32::from_le_bytes(b[33..37].try_into().map_err(|_| Error::Parse)?),
            body_offset: u32::from_le_bytes(b[37..41].try_into().map_err(|_| Error::Parse)?),
            body_len: u64::from_le_bytes(b[41..49].try_into().map_err(|_| Error::Parse)?),
        };
        // carrier discriminant is validated here as well so a bad message
        // is rejected before any payload is touched
        data.kind()?;
        Ok(Self {
            kind,
            method,
            code,
            data,
        })
    }
}
