/// Canonical status code enumerators reported to applications.
///
/// Registered codes round-trip exactly through the wire mapping;
/// everything else coalesces to its class representative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StatusCode {
    Continue = 100,
    SwitchingProtocols = 101,
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NonAuthoritativeInformation = 203,
    NoContent = 204,
    ResetContent = 205,
    PartialContent = 206,
    MultipleChoices = 300,
    MovedPermanently = 301,
    Found = 302,
    SeeOther = 303,
    NotModified = 304,
    UseProxy = 305,
    TemporaryRedirect = 307,
    PermanentRedirect = 308,
    BadRequest = 400,
    Unauthorized = 401,
    PaymentRequired = 402,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    NotAcceptable = 406,
    ProxyAuthenticationRequired = 407,
    RequestTimeout = 408,
    Conflict = 409,
    Gone = 410,
    LengthRequired = 411,
    PreconditionFailed = 412,
    ContentTooLarge = 413,
    UriTooLong = 414,
    UnsupportedMediaType = 415,
    RangeNotSatisfiable = 416,
    ExpectationFailed = 417,
    MisdirectedRequest = 421,
    UnprocessableContent = 422,
    UpgradeRequired = 426,
    InternalError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
    GatewayTimeout = 504,
    HttpVersionNotSupported = 505,
}

/// Every registered enumerator, used to seed the wire table.
const REGISTERED: &[StatusCode] = &[
    StatusCode::Continue,
    StatusCode::SwitchingProtocols,
    StatusCode::Ok,
    StatusCode::Created,
    StatusCode::Accepted,
    StatusCode::NonAuthoritativeInformation,
    StatusCode::NoContent,
    StatusCode::ResetContent,
    StatusCode::PartialContent,
    StatusCode::MultipleChoices,
    StatusCode::MovedPermanently,
    StatusCode::Found,
    StatusCode::SeeOther,
    StatusCode::NotModified,
    StatusCode::UseProxy,
    StatusCode::TemporaryRedirect,
    StatusCode::PermanentRedirect,
    StatusCode::BadRequest,
    StatusCode::Unauthorized,
    StatusCode::PaymentRequired,
    StatusCode::Forbidden,
    StatusCode::NotFound,
    StatusCode::MethodNotAllowed,
    StatusCode::NotAcceptable,
    StatusCode::ProxyAuthenticationRequired,
    StatusCode::RequestTimeout,
    StatusCode::Conflict,
    StatusCode::Gone,
    StatusCode::LengthRequired,
    StatusCode::PreconditionFailed,
    StatusCode::ContentTooLarge,
    StatusCode::UriTooLong,
    StatusCode::UnsupportedMediaType,
    StatusCode::RangeNotSatisfiable,
    StatusCode::ExpectationFailed,
    StatusCode::MisdirectedRequest,
    StatusCode::UnprocessableContent,
    StatusCode::UpgradeRequired,
    StatusCode::InternalError,
    StatusCode::NotImplemented,
    StatusCode::BadGateway,
    StatusCode::ServiceUnavailable,
    StatusCode::GatewayTimeout,
    StatusCode::HttpVersionNotSupported,
];

lazy_static! {
    /// Maps any u16 wire status 0-599 to its canonical enumerator.
    static ref SC_BY_U16: Vec<StatusCode> = {
        let mut table = Vec::with_capacity(600);
        for code in 0u16..600 {
            table.push(match code {
                100..=199 => StatusCode::Continue,
                200..=299 => StatusCode::Ok,
                300..=399 => StatusCode::MultipleChoices,
                400..=499 => StatusCode::BadRequest,
                _ => StatusCode::InternalError,
            });
        }
        for &sc in REGISTERED {
            table[sc as usize] = sc;
        }
        table
    };
}

impl StatusCode {
    /// Canonicalizes a wire status. Registered codes are fixed points;
    /// unregistered codes map to their class representative.
    pub fn from_wire(code: u16) -> StatusCode {
        SC_BY_U16
            .get(code as usize)
            .copied()
            .unwrap_or(StatusCode::InternalError)
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Reason phrase used on status lines.
    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::SwitchingProtocols => "Switching Protocols",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NonAuthoritativeInformation => "Non-Authoritative Information",
            StatusCode::NoContent => "No Content",
            StatusCode::ResetContent => "Reset Content",
            StatusCode::PartialContent => "Partial Content",
            StatusCode::MultipleChoices => "Multiple Choices",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::SeeOther => "See Other",
            StatusCode::NotModified => "Not Modified",
            StatusCode::UseProxy => "Use Proxy",
            StatusCode::TemporaryRedirect => "Temporary Redirect",
            StatusCode::PermanentRedirect => "Permanent Redirect",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::PaymentRequired => "Payment Required",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::NotAcceptable => "Not Acceptable",
            StatusCode::ProxyAuthenticationRequired => "Proxy Authentication Required",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::Conflict => "Conflict",
            StatusCode::Gone => "Gone",
            StatusCode::LengthRequired => "Length Required",
            StatusCode::PreconditionFailed => "Precondition Failed",
            StatusCode::ContentTooLarge => "Content Too Large",
            StatusCode::UriTooLong => "URI Too Long",
            StatusCode::UnsupportedMediaType => "Unsupported Media Type",
            StatusCode::RangeNotSatisfiable => "Range Not Satisfiable",
            StatusCode::ExpectationFailed => "Expectation Failed",
            StatusCode::MisdirectedRequest => "Misdirected Request",
            StatusCode::UnprocessableContent => "Unprocessable Content",
            StatusCode::UpgradeRequired => "Upgrade Required",
            StatusCode::InternalError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::GatewayTimeout => "Gateway Timeout",
            StatusCode::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::registered_fixed_point(404, StatusCode::NotFound)]
    #[case::registered_5xx(505, StatusCode::HttpVersionNotSupported)]
    #[case::unregistered_1xx(102, StatusCode::Continue)]
    #[case::unregistered_2xx(299, StatusCode::Ok)]
    #[case::unregistered_3xx(306, StatusCode::MultipleChoices)]
    #[case::unregistered_4xx(418, StatusCode::BadRequest)]
    #[case::unregistered_5xx(599, StatusCode::InternalError)]
    #[case::below_classes(42, StatusCode::InternalError)]
    #[case::above_table(999, StatusCode::InternalError)]
    fn wire_mapping(#[case] wire: u16, #[case] expected: StatusCode) {
        assert_eq!(StatusCode::from_wire(wire), expected);
    }

    #[test]
    fn mapping_is_a_function() {
        for wire in 0u16..600 {
            assert_eq!(StatusCode::from_wire(wire), StatusCode::from_wire(wire));
        }
    }

    #[test]
    fn registered_round_trip() {
        for &sc in REGISTERED {
            assert_eq!(StatusCode::from_wire(sc.as_u16()), sc);
        }
    }

    #[test]
    fn display_matches_status_line_form() {
        assert_eq!(StatusCode::Ok.to_string(), "200 OK");
        assert_eq!(
            StatusCode::NotImplemented.to_string(),
            "501 Not Implemented"
        );
    }
}
