pub mod packet;
pub mod socket;

pub use packet::*;
pub use socket::*;

/// Outcome of decoding one inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// An Echo Reply correlated with this session's stream.
    EchoReply {
        sequence: u16,
        identifier: u16,
        /// TTL from the enclosing IPv4 header; unknown in datagram mode.
        ttl: Option<u8>,
        payload: Vec<u8>,
    },
    /// An ICMP error message quoting one of our Echo Requests.
    Error {
        kind: IcmpErrorKind,
        original_sequence: u16,
    },
    /// Structurally valid but unrelated to this session; dropped silently.
    Noise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpErrorKind {
    Unreachable(u8),
    TimeExceeded(u8),
    Redirect(u8),
}

impl std::fmt::Display for IcmpErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IcmpErrorKind::Unreachable(code) => match code {
                0 => write!(f, "Destination Net Unreachable"),
                1 => write!(f, "Destination Host Unreachable"),
                2 => write!(f, "Destination Protocol Unreachable"),
                3 => write!(f, "Destination Port Unreachable"),
                4 => write!(f, "Fragmentation needed and DF set"),
                5 => write!(f, "Source route failed"),
                code => write!(f, "Destination Unreachable, Bad Code: {}", code),
            },
            IcmpErrorKind::TimeExceeded(code) => match code {
                0 => write!(f, "TTL count exceeded"),
                1 => write!(f, "Fragment Reass time exceeded"),
                code => write!(f, "Time Exceeded, Bad Code: {}", code),
            },
            IcmpErrorKind::Redirect(code) => match code {
                0 => write!(f, "Redirect Net"),
                1 => write!(f, "Redirect Host"),
                2 => write!(f, "Redirect Net for TOS"),
                3 => write!(f, "Redirect Host for TOS"),
                code => write!(f, "Redirect, Bad Code: {}", code),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(
            IcmpErrorKind::Unreachable(1).to_string(),
            "Destination Host Unreachable"
        );
        assert_eq!(IcmpErrorKind::TimeExceeded(0).to_string(), "TTL count exceeded");
        assert_eq!(IcmpErrorKind::Redirect(1).to_string(), "Redirect Host");
        assert_eq!(
            IcmpErrorKind::Unreachable(13).to_string(),
            "Destination Unreachable, Bad Code: 13"
        );
    }
}
