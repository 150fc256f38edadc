//! Close status codes, as listed in [RFC 6455 Section 7.4](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4).

/// Status code carried in the first two bytes of a close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000, the purpose for which the connection was established has been fulfilled.
    Normal,
    /// 1001, an endpoint is going away (server shutdown, page navigation).
    Away,
    /// 1002, the endpoint is terminating the connection due to a protocol error.
    Protocol,
    /// 1003, the endpoint received a type of data it cannot accept.
    Unsupported,
    /// 1005, no status code was present. Never sent on the wire.
    Status,
    /// 1006, the connection was closed abnormally. Never sent on the wire.
    Abnormal,
    /// 1007, a message contained data inconsistent with its type, such as non UTF-8 text.
    Invalid,
    /// 1008, a message violated the endpoint's policy.
    Policy,
    /// 1009, a message was too big to process.
    Size,
    /// 1010, the client expected the server to negotiate an extension.
    Extension,
    /// 1011, the server hit an unexpected condition.
    Error,
    /// 1012, the server is restarting.
    Restart,
    /// 1013, the server is overloaded, try again later.
    Again,
    /// 1015, the TLS handshake failed. Never sent on the wire.
    Tls,
    /// 1016..=2999, reserved for future revisions of the protocol.
    Reserved(u16),
    /// 3000..=3999, registered with IANA by libraries and frameworks.
    Iana(u16),
    /// 4000..=4999, private use by applications.
    Library(u16),
    /// Anything else, never valid on the wire.
    Bad(u16),
}

impl CloseCode {
    /// Returns `true` if the code may appear in a close frame received from a peer.
    pub fn is_allowed(self) -> bool {
        !matches!(
            self,
            CloseCode::Status
                | CloseCode::Abnormal
                | CloseCode::Tls
                | CloseCode::Reserved(_)
                | CloseCode::Bad(_)
        )
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::Away,
            1002 => CloseCode::Protocol,
            1003 => CloseCode::Unsupported,
            1005 => CloseCode::Status,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::Invalid,
            1008 => CloseCode::Policy,
            1009 => CloseCode::Size,
            1010 => CloseCode::Extension,
            1011 => CloseCode::Error,
            1012 => CloseCode::Restart,
            1013 => CloseCode::Again,
            1015 => CloseCode::Tls,
            1016..=2999 => CloseCode::Reserved(code),
            3000..=3999 => CloseCode::Iana(code),
            4000..=4999 => CloseCode::Library(code),
            _ => CloseCode::Bad(code),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Status => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::Invalid => 1007,
            CloseCode::Policy => 1008,
            CloseCode::Size => 1009,
            CloseCode::Extension => 1010,
            CloseCode::Error => 1011,
            CloseCode::Restart => 1012,
            CloseCode::Again => 1013,
            CloseCode::Tls => 1015,
            CloseCode::Reserved(code)
            | CloseCode::Iana(code)
            | CloseCode::Library(code)
            | CloseCode::Bad(code) => code,
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_conversion() {
        for code in [1000, 1001, 1002, 1003, 1007, 1008, 1009, 1010, 1011, 3000, 4999] {
            assert_eq!(u16::from(CloseCode::from(code)), code);
        }
        assert_eq!(CloseCode::from(1000), CloseCode::Normal);
        assert_eq!(CloseCode::from(1009), CloseCode::Size);
        assert_eq!(CloseCode::from(3500), CloseCode::Iana(3500));
    }

    #[test]
    fn test_allowed_codes() {
        assert!(CloseCode::Normal.is_allowed());
        assert!(CloseCode::Again.is_allowed());
        assert!(CloseCode::from(3000).is_allowed());
        assert!(CloseCode::from(4321).is_allowed());

        assert!(!CloseCode::from(999).is_allowed());
        assert!(!CloseCode::from(1004).is_allowed());
        assert!(!CloseCode::Status.is_allowed());
        assert!(!CloseCode::Abnormal.is_allowed());
        assert!(!CloseCode::Tls.is_allowed());
        assert!(!CloseCode::from(2000).is_allowed());
        assert!(!CloseCode::from(5000).is_allowed());
    }

    #[test]
    fn test_display() {
        assert_eq!(CloseCode::Normal.to_string(), "1000");
        assert_eq!(CloseCode::Library(4001).to_string(), "4001");
    }
}
