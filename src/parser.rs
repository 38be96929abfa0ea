use crate::error::Error;
use crate::msg::Method;
use crate::status::StatusCode;
use bstr::ByteSlice;
use nom::{
    bytes::complete::{tag, take_while1, take_while_m_n},
    character::complete::char,
    error::ErrorKind,
    sequence::tuple,
};

/// Outcome of a framing probe over the RX scratch buffer. `Incomplete`
/// means the terminator has not arrived yet; the caller parks the
/// connection and retries on the next RX event with the grown buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    Done(T),
    Incomplete,
}

/// Request-target forms per RFC 9112 §3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetForm {
    Origin,
    Absolute,
    Authority,
    Asterisk,
}

impl Default for TargetForm {
    fn default() -> Self {
        TargetForm::Origin
    }
}

/// Parsed request line. Offsets index the buffer the line was parsed
/// from; nothing is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub target_offset: usize,
    pub target_len: usize,
    /// Bytes through and including the terminating CRLF.
    pub control_data_len: usize,
}

/// Parsed status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub code: u16,
    pub control_data_len: usize,
}

/// Classified request target with the optional query split off.
/// `query_len == 0` means no query component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    pub form: TargetForm,
    pub path_offset: usize,
    pub path_len: usize,
    pub query_offset: usize,
    pub query_len: usize,
}

/// Located header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderBlock {
    pub headers_offset: usize,
    /// Header bytes excluding the blank-line CRLF that terminates the
    /// block.
    pub headers_len: usize,
    /// Total control data: request/status line plus header block plus
    /// the terminating CRLF.
    pub control_data_len: usize,
    pub body_offset: usize,
}

/// Minimum viable status-line: `HTTP/1.x SP DDD`.
const STATUS_LINE_MIN: usize = 12;

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.find(b"\r\n")
}

/// Parses `method SP request-target SP HTTP/1.<d> CRLF` at the start of
/// `buf`. One leading empty line is tolerated (RFC 9112 §2.2). Errors
/// carry the status code of the canned response the server should emit.
pub fn request_line(buf: &[u8]) -> Result<ParseOutcome<RequestLine>, StatusCode> {
    let start = if buf.starts_with(b"\r\n") { 2 } else { 0 };
    let line_end = match find_crlf(&buf[start..]) {
        Some(pos) => start + pos,
        None => return Ok(ParseOutcome::Incomplete),
    };
    let line = &buf[start..line_end];

    let (version, (method_bytes, _, target, _)) = tuple::<_, _, (_, ErrorKind), _>((
        take_while1(|c| c != b' '),
        char(' '),
        take_while1(|c| c != b' '),
        char(' '),
    ))(line)
    .map_err(|_| StatusCode::BadRequest)?;

    let method = match method_bytes {
        b"GET" => Method::Get,
        b"POST" => Method::Post,
        m if m.iter().all(|c| c.is_ascii_uppercase()) => return Err(StatusCode::NotImplemented),
        _ => return Err(StatusCode::BadRequest),
    };

    if version.len() < 6 || &version[..5] != b"HTTP/" || !version[5].is_ascii_digit() {
        return Err(StatusCode::BadRequest);
    }
    if version[5] != b'1' {
        return Err(StatusCode::HttpVersionNotSupported);
    }
    if version.len() != 8 || version[6] != b'.' || !version[7].is_ascii_digit() {
        return Err(StatusCode::BadRequest);
    }

    Ok(ParseOutcome::Done(RequestLine {
        method,
        target_offset: start + method_bytes.len() + 1,
        target_len: target.len(),
        control_data_len: line_end + 2,
    }))
}

/// Parses `HTTP/1.<d> SP+ DDD [ reason-phrase ] CRLF` at the start of
/// `buf`. The reason phrase is ignored. Any malformation is opaque; the
/// client resets the connection.
pub fn status_line(buf: &[u8]) -> Result<ParseOutcome<StatusLine>, Error> {
    let line_end = match find_crlf(buf) {
        Some(pos) => pos,
        None => return Ok(ParseOutcome::Incomplete),
    };
    let line = &buf[..line_end];
    if line.len() < STATUS_LINE_MIN {
        return Err(Error::Parse);
    }

    let (rest, _) = tuple::<_, _, (_, ErrorKind), _>((
        tag("HTTP/1."),
        take_while_m_n(1, 1, |c: u8| c.is_ascii_digit()),
        take_while1(|c| c == b' '),
    ))(line)
    .map_err(|_| Error::Parse)?;

    let (after, digits) =
        take_while_m_n::<_, _, (_, ErrorKind)>(3, 3, |c: u8| c.is_ascii_digit())(rest)
            .map_err(|_| Error::Parse)?;
    match after.first() {
        None | Some(b' ') => {}
        Some(_) => return Err(Error::Parse),
    }

    let code = digits
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
    if !(100..=599).contains(&code) {
        return Err(Error::Parse);
    }

    Ok(ParseOutcome::Done(StatusLine {
        code,
        control_data_len: line_end + 2,
    }))
}

fn split_query(offset: usize, len: usize, target: &[u8]) -> (usize, usize, usize, usize) {
    match target.find_byte(b'?') {
        Some(q) => (offset, q, offset + q + 1, len - q - 1),
        None => (offset, len, 0, 0),
    }
}

/// Classifies the request target found at `target_offset..+target_len`.
///
/// ORIGIN strips the leading slash from the reported path; ORIGIN and
/// ABSOLUTE split off an optional query. AUTHORITY is only considered
/// after ORIGIN and ABSOLUTE fail to match.
pub fn target_form(
    buf: &[u8],
    target_offset: usize,
    target_len: usize,
) -> Result<TargetInfo, StatusCode> {
    let target = &buf[target_offset..target_offset + target_len];

    if target.starts_with(b"/") {
        let (path_offset, path_len, query_offset, query_len) =
            split_query(target_offset + 1, target_len - 1, &target[1..]);
        return Ok(TargetInfo {
            form: TargetForm::Origin,
            path_offset,
            path_len,
            query_offset,
            query_len,
        });
    }
    if target.find(b"://").is_some() {
        let (path_offset, path_len, query_offset, query_len) =
            split_query(target_offset, target_len, target);
        return Ok(TargetInfo {
            form: TargetForm::Absolute,
            path_offset,
            path_len,
            query_offset,
            query_len,
        });
    }
    if target == b"*" {
        return Ok(TargetInfo {
            form: TargetForm::Asterisk,
            path_offset: target_offset,
            path_len: 1,
            query_offset: 0,
            query_len: 0,
        });
    }
    if target
        .windows(2)
        .any(|w| w[0] == b':' && w[1].is_ascii_digit())
    {
        return Ok(TargetInfo {
            form: TargetForm::Authority,
            path_offset: target_offset,
            path_len: target_len,
            query_offset: 0,
            query_len: 0,
        });
    }
    Err(StatusCode::BadRequest)
}

/// Locates the header block terminator starting from `cursor`, the first
/// byte after the request/status line CRLF. Searching from two bytes
/// back covers the empty block, where the line CRLF and the terminator
/// CRLF are adjacent; the terminating CRLF accounting is one code path
/// for both shapes.
pub fn find_headers(buf: &[u8], cursor: usize) -> ParseOutcome<HeaderBlock> {
    match buf[cursor - 2..].find(b"\r\n\r\n") {
        Some(pos) => {
            let terminator = cursor - 2 + pos;
            ParseOutcome::Done(HeaderBlock {
                headers_offset: cursor,
                headers_len: terminator + 2 - cursor,
                control_data_len: terminator + 4,
                body_offset: terminator + 4,
            })
        }
        None => ParseOutcome::Incomplete,
    }
}

/// Extracts the declared body length from the header block.
///
/// The field name comparison is ASCII-case-insensitive per RFC 9110; the
/// first match wins. Absence means no body. A present but empty,
/// non-numeric or overflowing value is a client error.
pub fn body_len(headers: &[u8]) -> Result<u64, StatusCode> {
    const NAME: &[u8] = b"content-length:";
    for line in headers.split_str(b"\r\n") {
        if line.len() < NAME.len() || !line[..NAME.len()].eq_ignore_ascii_case(NAME) {
            continue;
        }
        let value = line[NAME.len()..].trim_with(|c| c == ' ' || c == '\t');
        if value.is_empty() {
            return Err(StatusCode::BadRequest);
        }
        let mut n: u64 = 0;
        for &c in value {
            if !c.is_ascii_digit() {
                return Err(StatusCode::BadRequest);
            }
            n = n
                .checked_mul(10)
                .and_then(|n| n.checked_add(u64::from(c - b'0')))
                .ok_or(StatusCode::BadRequest)?;
        }
        return Ok(n);
    }
    Ok(0)
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::get(b"GET /hello HTTP/1.1\r\n".as_ref(), Method::Get, 4, 6, 21)]
    #[case::post(b"POST /u HTTP/1.1\r\n".as_ref(), Method::Post, 5, 2, 18)]
    #[case::leading_crlf(b"\r\nGET / HTTP/1.1\r\n".as_ref(), Method::Get, 6, 1, 18)]
    #[case::minor_version_digit(b"GET / HTTP/1.0\r\n".as_ref(), Method::Get, 4, 1, 16)]
    fn request_line_ok(
        #[case] input: &[u8],
        #[case] method: Method,
        #[case] target_offset: usize,
        #[case] target_len: usize,
        #[case] control_data_len: usize,
    ) {
        let rl = match request_line(input) {
            Ok(ParseOutcome::Done(rl)) => rl,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(rl.method, method);
        assert_eq!(rl.target_offset, target_offset);
        assert_eq!(rl.target_len, target_len);
        assert_eq!(rl.control_data_len, control_data_len);
    }

    #[rstest]
    #[case::unknown_uppercase(b"FOO / HTTP/1.1\r\n".as_ref(), StatusCode::NotImplemented)]
    #[case::lowercase_method(b"get / HTTP/1.1\r\n".as_ref(), StatusCode::BadRequest)]
    #[case::wrong_major(b"GET / HTTP/2.0\r\n".as_ref(), StatusCode::HttpVersionNotSupported)]
    #[case::non_digit_major(b"GET / HTTP/x.1\r\n".as_ref(), StatusCode::BadRequest)]
    #[case::missing_version(b"GET /\r\n".as_ref(), StatusCode::BadRequest)]
    #[case::bad_version_token(b"GET / HTP/1.1\r\n".as_ref(), StatusCode::BadRequest)]
    #[case::no_minor_digit(b"GET / HTTP/1.\r\n".as_ref(), StatusCode::BadRequest)]
    #[case::trailing_junk(b"GET / HTTP/1.1x\r\n".as_ref(), StatusCode::BadRequest)]
    #[case::double_space(b"GET  / HTTP/1.1\r\n".as_ref(), StatusCode::BadRequest)]
    fn request_line_errors(#[case] input: &[u8], #[case] expected: StatusCode) {
        assert_eq!(request_line(input), Err(expected));
    }

    #[test]
    fn request_line_incomplete() {
        assert_eq!(
            request_line(b"GET / HTTP/1.1"),
            Ok(ParseOutcome::Incomplete)
        );
        assert_eq!(request_line(b"\r\nGET"), Ok(ParseOutcome::Incomplete));
    }

    #[test]
    fn request_line_idempotent() {
        let buf = b"GET /a?b=c HTTP/1.1\r\nHost: x\r\n\r\n";
        assert_eq!(request_line(buf), request_line(buf));
    }

    #[rstest]
    #[case::lowest_accepted(b"HTTP/1.1 100 Continue\r\n".as_ref(), 100)]
    #[case::highest_accepted(b"HTTP/1.1 599 Whatever\r\n".as_ref(), 599)]
    #[case::no_reason(b"HTTP/1.1 204\r\n".as_ref(), 204)]
    #[case::multiple_spaces(b"HTTP/1.1   404 Not Found\r\n".as_ref(), 404)]
    fn status_line_ok(#[case] input: &[u8], #[case] code: u16) {
        match status_line(input) {
            Ok(ParseOutcome::Done(sl)) => {
                assert_eq!(sl.code, code);
                assert_eq!(sl.control_data_len, input.len());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[rstest]
    #[case::below_range(b"HTTP/1.1 099 Too Low\r\n".as_ref())]
    #[case::above_range(b"HTTP/1.1 600 Too High\r\n".as_ref())]
    #[case::two_digits(b"HTTP/1.1 99 Bad\r\n".as_ref())]
    #[case::four_digits(b"HTTP/1.1 2000 Bad\r\n".as_ref())]
    #[case::wrong_major(b"HTTP/2.0 200 OK\r\n".as_ref())]
    #[case::short_line(b"HTTP/1.1 2\r\n".as_ref())]
    #[case::not_http(b"ICY 200 OK here\r\n".as_ref())]
    fn status_line_errors(#[case] input: &[u8]) {
        assert_eq!(status_line(input), Err(Error::Parse));
    }

    #[test]
    fn status_line_incomplete() {
        assert_eq!(
            status_line(b"HTTP/1.1 200 OK"),
            Ok(ParseOutcome::Incomplete)
        );
    }

    #[rstest]
    #[case::origin(b"GET /hello HTTP/1.1\r\n".as_ref(), TargetForm::Origin, 5, 5, 0, 0)]
    #[case::origin_query(b"GET /a?b=c HTTP/1.1\r\n".as_ref(), TargetForm::Origin, 5, 1, 7, 3)]
    #[case::origin_empty_path(b"GET / HTTP/1.1\r\n".as_ref(), TargetForm::Origin, 5, 0, 0, 0)]
    #[case::absolute(
        b"GET http://e.com/i HTTP/1.1\r\n".as_ref(),
        TargetForm::Absolute,
        4,
        14,
        0,
        0
    )]
    #[case::absolute_query(
        b"GET http://e.com/i?q=1 HTTP/1.1\r\n".as_ref(),
        TargetForm::Absolute,
        4,
        14,
        19,
        3
    )]
    #[case::asterisk(b"GET * HTTP/1.1\r\n".as_ref(), TargetForm::Asterisk, 4, 1, 0, 0)]
    #[case::authority(b"GET e.com:80 HTTP/1.1\r\n".as_ref(), TargetForm::Authority, 4, 8, 0, 0)]
    fn target_forms(
        #[case] input: &[u8],
        #[case] form: TargetForm,
        #[case] path_offset: usize,
        #[case] path_len: usize,
        #[case] query_offset: usize,
        #[case] query_len: usize,
    ) {
        let rl = match request_line(input) {
            Ok(ParseOutcome::Done(rl)) => rl,
            other => panic!("unexpected: {:?}", other),
        };
        let ti = target_form(input, rl.target_offset, rl.target_len).unwrap();
        assert_eq!(ti.form, form);
        assert_eq!(ti.path_offset, path_offset);
        assert_eq!(ti.path_len, path_len);
        assert_eq!(ti.query_offset, query_offset);
        assert_eq!(ti.query_len, query_len);
    }

    #[test]
    fn asterisk_only_when_length_one() {
        // "*x" matches neither origin, absolute, asterisk nor authority
        let buf = b"*x";
        assert_eq!(target_form(buf, 0, 2), Err(StatusCode::BadRequest));
    }

    #[test]
    fn authority_needs_digit_after_colon() {
        let buf = b"e.com:x";
        assert_eq!(target_form(buf, 0, 7), Err(StatusCode::BadRequest));
    }

    #[test]
    fn authority_loses_to_absolute() {
        // contains both "://" and ":8": absolute form wins
        let buf = b"http://e.com:8080/";
        let ti = target_form(buf, 0, buf.len()).unwrap();
        assert_eq!(ti.form, TargetForm::Absolute);
    }

    #[test]
    fn headers_present() {
        let buf = b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n";
        let hb = match find_headers(buf, 21) {
            ParseOutcome::Done(hb) => hb,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(hb.headers_offset, 21);
        assert_eq!(hb.headers_len, 9); // "Host: x\r\n"
        assert_eq!(hb.control_data_len, 32);
        assert_eq!(hb.body_offset, 32);
    }

    #[test]
    fn headers_empty_block() {
        let buf = b"GET / HTTP/1.1\r\n\r\nrest";
        let hb = match find_headers(buf, 16) {
            ParseOutcome::Done(hb) => hb,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(hb.headers_len, 0);
        assert_eq!(hb.control_data_len, 18);
        assert_eq!(hb.body_offset, 18);
    }

    #[test]
    fn headers_incomplete() {
        let buf = b"GET / HTTP/1.1\r\nHost: x\r\n";
        assert_eq!(find_headers(buf, 16), ParseOutcome::Incomplete);
    }

    #[rstest]
    #[case::absent(b"Host: x\r\n".as_ref(), Ok(0))]
    #[case::exact(b"Content-Length: 5\r\n".as_ref(), Ok(5))]
    #[case::case_insensitive(b"content-LENGTH: 42\r\n".as_ref(), Ok(42))]
    #[case::tabs_and_spaces(b"Content-Length:\t 17 \t\r\n".as_ref(), Ok(17))]
    #[case::second_line(b"Host: x\r\nContent-Length: 9\r\n".as_ref(), Ok(9))]
    #[case::max_u64(
        b"Content-Length: 18446744073709551615\r\n".as_ref(),
        Ok(u64::MAX)
    )]
    #[case::overflow(
        b"Content-Length: 18446744073709551616\r\n".as_ref(),
        Err(StatusCode::BadRequest)
    )]
    #[case::empty_value(b"Content-Length:\r\n".as_ref(), Err(StatusCode::BadRequest))]
    #[case::non_numeric(b"Content-Length: 5x\r\n".as_ref(), Err(StatusCode::BadRequest))]
    #[case::negative(b"Content-Length: -1\r\n".as_ref(), Err(StatusCode::BadRequest))]
    fn body_lengths(#[case] headers: &[u8], #[case] expected: Result<u64, StatusCode>) {
        assert_eq!(body_len(headers), expected);
    }
}
