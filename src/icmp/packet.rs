use byteorder::{BigEndian, ByteOrder, NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::icmp::{IcmpErrorKind, InboundMessage, TransportMode};

pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_DEST_UNREACH: u8 = 3;
pub const ICMP_REDIRECT: u8 = 5;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

pub const ICMP_HEADER_LEN: usize = 8;
pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const IPPROTO_ICMP: u8 = 1;

/// Two 32-bit fields: seconds and microseconds of the send time.
pub const TIMESTAMP_LEN: usize = 8;

/// Largest datagram we will ever read off the socket.
pub const MAX_PACKET_LEN: usize = 65535;

/// Build an Echo Request: 8-byte header (type 8, code 0) followed by
/// `payload_size` data bytes. When the payload is large enough its first
/// bytes carry the current time as two 32-bit fields in host byte order;
/// only this process reads them back on the matching reply, so no
/// conversion to network order is wanted. The rest is zero fill.
pub fn encode_echo_request(identifier: u16, sequence: u16, payload_size: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(ICMP_HEADER_LEN + payload_size);
    bytes.write_u8(ICMP_ECHO_REQUEST).unwrap();
    bytes.write_u8(0).unwrap();
    bytes.write_u16::<BigEndian>(0).unwrap(); // checksum placeholder
    bytes.write_u16::<BigEndian>(identifier).unwrap();
    bytes.write_u16::<BigEndian>(sequence).unwrap();

    if payload_size >= TIMESTAMP_LEN {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        bytes.write_u32::<NativeEndian>(now.as_secs() as u32).unwrap();
        bytes.write_u32::<NativeEndian>(now.subsec_micros()).unwrap();
        bytes.resize(ICMP_HEADER_LEN + payload_size, 0);
    } else {
        bytes.resize(ICMP_HEADER_LEN + payload_size, 0);
    }

    let checksum = internet_checksum(&bytes);
    BigEndian::write_u16(&mut bytes[2..4], checksum);
    bytes
}

/// RFC 1071 internet checksum: one's-complement sum of big-endian 16-bit
/// words. An odd trailing byte is the high byte of a final word with a
/// zero low byte.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;

    while i + 1 < data.len() {
        let word = ((data[i] as u16) << 8) | (data[i + 1] as u16);
        sum += word as u32;
        i += 2;
    }

    if i < data.len() {
        sum += (data[i] as u32) << 8;
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

/// Read the send timestamp back out of a reply payload, if it is long
/// enough to carry one.
pub fn read_timestamp(payload: &[u8]) -> Option<(u32, u32)> {
    if payload.len() < TIMESTAMP_LEN {
        return None;
    }
    let secs = NativeEndian::read_u32(&payload[0..4]);
    let micros = NativeEndian::read_u32(&payload[4..8]);
    Some((secs, micros))
}

/// Decode one inbound datagram against this session's correlation keys.
///
/// In raw mode the kernel hands us the IPv4 header too; in datagram mode
/// the buffer starts directly at the ICMP header and the TTL is unknown.
/// The identifier is only required to match in raw mode: on a datagram
/// socket the kernel rewrites it, so the sequence number is the
/// authoritative key there. Anything plausible-but-foreign is `Noise`;
/// a buffer shorter than the ICMP header after valid framing is a hard
/// error (the transport should never deliver that).
pub fn decode(
    buf: &[u8],
    sender: Ipv4Addr,
    destination: Ipv4Addr,
    identifier: u16,
    mode: TransportMode,
) -> anyhow::Result<InboundMessage> {
    let mut ttl = None;
    let icmp = match mode {
        TransportMode::Raw => {
            if buf.len() < IPV4_MIN_HEADER_LEN {
                return Ok(InboundMessage::Noise);
            }
            let version = buf[0] >> 4;
            let header_words = (buf[0] & 0x0F) as usize;
            if version != 4 || !(5..=15).contains(&header_words) {
                return Ok(InboundMessage::Noise);
            }
            let header_len = header_words * 4;
            if buf.len() < header_len {
                return Ok(InboundMessage::Noise);
            }
            ttl = Some(buf[8]);
            &buf[header_len..]
        }
        TransportMode::Datagram => buf,
    };

    if icmp.len() < ICMP_HEADER_LEN {
        return Err(anyhow::anyhow!(
            "truncated ICMP message: {} bytes",
            icmp.len()
        ));
    }

    let mut cursor = Cursor::new(icmp);
    let icmp_type = cursor.read_u8()?;
    let code = cursor.read_u8()?;
    let _checksum = cursor.read_u16::<BigEndian>()?;

    match icmp_type {
        ICMP_ECHO_REPLY => {
            let reply_id = cursor.read_u16::<BigEndian>()?;
            let sequence = cursor.read_u16::<BigEndian>()?;

            if mode == TransportMode::Raw && reply_id != identifier {
                return Ok(InboundMessage::Noise);
            }
            if sender != destination {
                return Ok(InboundMessage::Noise);
            }

            Ok(InboundMessage::EchoReply {
                sequence,
                identifier: reply_id,
                ttl,
                payload: icmp[ICMP_HEADER_LEN..].to_vec(),
            })
        }
        ICMP_DEST_UNREACH | ICMP_TIME_EXCEEDED | ICMP_REDIRECT => {
            let kind = match icmp_type {
                ICMP_DEST_UNREACH => IcmpErrorKind::Unreachable(code),
                ICMP_TIME_EXCEEDED => IcmpErrorKind::TimeExceeded(code),
                _ => IcmpErrorKind::Redirect(code),
            };
            match decode_quoted_request(&icmp[ICMP_HEADER_LEN..], destination, identifier, mode) {
                Some(original_sequence) => Ok(InboundMessage::Error {
                    kind,
                    original_sequence,
                }),
                None => Ok(InboundMessage::Noise),
            }
        }
        _ => Ok(InboundMessage::Noise),
    }
}

/// Error messages quote the original IPv4 header plus the first 8 bytes of
/// the original ICMP message. Returns the original sequence number if the
/// quote belongs to this session.
fn decode_quoted_request(
    quoted: &[u8],
    destination: Ipv4Addr,
    identifier: u16,
    mode: TransportMode,
) -> Option<u16> {
    if quoted.len() < IPV4_MIN_HEADER_LEN {
        return None;
    }
    let header_words = (quoted[0] & 0x0F) as usize;
    if !(5..=15).contains(&header_words) {
        return None;
    }
    let header_len = header_words * 4;
    if quoted.len() < header_len + ICMP_HEADER_LEN {
        return None;
    }

    if quoted[9] != IPPROTO_ICMP {
        return None;
    }
    let original_dest = Ipv4Addr::new(quoted[16], quoted[17], quoted[18], quoted[19]);
    if original_dest != destination {
        return None;
    }

    let original_icmp = &quoted[header_len..];
    let original_id = BigEndian::read_u16(&original_icmp[4..6]);
    if mode == TransportMode::Raw && original_id != identifier {
        return None;
    }

    Some(BigEndian::read_u16(&original_icmp[6..8]))
}
