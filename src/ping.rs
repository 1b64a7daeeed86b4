use std::io::Write;
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use socket2::SockAddr;
use tokio::sync::oneshot;
use tokio::time::sleep;

use crate::icmp::{packet, IcmpSocket, InboundMessage};
use crate::session::Session;
use crate::stats;

/// Upper bound on one readiness wait, so interrupts and early
/// termination are observed promptly.
const POLL_SLICE: Duration = Duration::from_millis(10);

/// Post-send grace period for in-flight replies.
const GRACE_WAIT: Duration = Duration::from_secs(1);

/// Flood mode overrides the configured inter-send interval.
const FLOOD_INTERVAL: f64 = 0.01;

/// The echo loop: timed sends, a polled receive window per send, early
/// exit once the reply target is met, and a final grace drain. Returns
/// normally on interrupt too; the caller prints statistics either way.
pub async fn run(session: &mut Session, socket: &IcmpSocket, shutdown: &mut oneshot::Receiver<()>) {
    let mut buf = vec![MaybeUninit::<u8>::uninit(); packet::MAX_PACKET_LEN];
    let interval = if session.flood {
        Duration::from_secs_f64(FLOOD_INTERVAL)
    } else {
        Duration::from_secs_f64(session.interval)
    };

    'sending: while session.count == 0 || session.num_sent < session.count {
        if shutdown.try_recv().is_ok() {
            return;
        }

        let request = packet::encode_echo_request(
            session.identifier,
            session.next_sequence,
            session.payload_size,
        );
        match socket.send(&request, session.destination) {
            Ok(_) => {
                session.record_sent();
                if session.flood && !session.quiet {
                    print!(".");
                    std::io::stdout().flush().ok();
                }
            }
            Err(e) => {
                // retried with the same sequence after the usual wait
                log::warn!("failed to send echo request: {}", e);
                sleep(interval).await;
                continue;
            }
        }

        let window_start = Instant::now();
        while window_start.elapsed() < interval {
            if shutdown.try_recv().is_ok() {
                return;
            }
            if session.target_met() {
                break 'sending;
            }
            let remaining = interval.saturating_sub(window_start.elapsed());
            match socket.poll_readable(POLL_SLICE.min(remaining)).await {
                Ok(true) => {
                    if !drain(session, socket, &mut buf) {
                        break;
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    log::warn!("poll failed: {}", e);
                    break;
                }
            }
        }
        if session.target_met() {
            break;
        }
    }

    if session.flood && !session.quiet {
        println!();
    }

    // one last chance for replies still in flight
    let grace_start = Instant::now();
    while session.num_recv < session.num_sent && grace_start.elapsed() < GRACE_WAIT {
        if shutdown.try_recv().is_ok() {
            return;
        }
        match socket.poll_readable(POLL_SLICE).await {
            Ok(true) => {
                if !drain(session, socket, &mut buf) {
                    return;
                }
            }
            Ok(false) => {}
            Err(e) => {
                log::warn!("poll failed: {}", e);
                return;
            }
        }
    }
}

/// Drain every queued datagram. Returns false when the window should
/// end early because of a genuine read error.
fn drain(session: &mut Session, socket: &IcmpSocket, buf: &mut [MaybeUninit<u8>]) -> bool {
    loop {
        match socket.receive(buf) {
            Ok(Some((data, sender))) => handle_datagram(session, &data, &sender),
            Ok(None) => return true,
            Err(e) => {
                log::warn!("receive failed: {}", e);
                return false;
            }
        }
    }
}

fn handle_datagram(session: &mut Session, data: &[u8], sender: &SockAddr) {
    let sender_ip = match sender.as_socket() {
        Some(SocketAddr::V4(addr)) => *addr.ip(),
        _ => {
            log::debug!("ignoring datagram with a non-IPv4 sender address");
            return;
        }
    };

    match packet::decode(
        data,
        sender_ip,
        session.destination,
        session.identifier,
        session.mode,
    ) {
        Ok(InboundMessage::EchoReply {
            sequence,
            ttl,
            payload,
            ..
        }) => {
            let report = session.handle_reply(sequence, ttl, &payload);
            if !session.quiet {
                println!("{}", stats::format_reply(&report, &session.display_address));
            }
        }
        Ok(InboundMessage::Error {
            kind,
            original_sequence,
        }) => {
            if session.verbose && !session.quiet {
                println!(
                    "{}",
                    stats::format_error(&sender_ip.to_string(), original_sequence, kind)
                );
            }
            log::debug!("ICMP error from {}: {}", sender_ip, kind);
        }
        Ok(InboundMessage::Noise) => {
            log::debug!("ignoring unrelated datagram from {}", sender_ip);
        }
        Err(e) => {
            log::warn!("discarding malformed datagram from {}: {}", sender_ip, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::PingArgs;
    use crate::icmp::packet::ICMP_HEADER_LEN;
    use crate::icmp::TransportMode;
    use std::net::Ipv4Addr;

    fn scenario_session(count: u64) -> Session {
        let args = PingArgs {
            destination: "192.0.2.1".to_string(),
            count,
            interval: 1.0,
            payload_size: 56,
            verbose: false,
            quiet: true,
            flood: false,
        };
        Session::new(
            0x0bad,
            Ipv4Addr::new(192, 0, 2, 1),
            "192.0.2.1".to_string(),
            TransportMode::Raw,
            &args,
        )
    }

    /// Sends are simulated at the session level: the request payload is
    /// echoed straight back the way a reachable host would.
    fn send_and_reply(session: &mut Session) -> crate::stats::ReplyReport {
        let request = packet::encode_echo_request(
            session.identifier,
            session.next_sequence,
            session.payload_size,
        );
        session.record_sent();
        let sequence = session.next_sequence.wrapping_sub(1);
        session.handle_reply(sequence, Some(64), &request[ICMP_HEADER_LEN..])
    }

    #[test]
    fn test_three_answered_requests() {
        let mut session = scenario_session(3);

        let mut sequences = Vec::new();
        while !session.target_met() {
            let report = send_and_reply(&mut session);
            assert!(!report.duplicate);
            assert!(report.rtt_ms.is_some());
            sequences.push(report.sequence);
        }

        assert_eq!(session.num_sent, 3);
        assert_eq!(session.num_recv, 3);
        assert_eq!(session.num_dup, 0);
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(stats::loss_percent(session.num_sent, session.num_recv), 0);
    }

    #[test]
    fn test_partial_loss() {
        let mut session = scenario_session(3);

        for lost in [false, true, false] {
            let request = packet::encode_echo_request(
                session.identifier,
                session.next_sequence,
                session.payload_size,
            );
            session.record_sent();
            if !lost {
                let sequence = session.next_sequence.wrapping_sub(1);
                session.handle_reply(sequence, Some(64), &request[ICMP_HEADER_LEN..]);
            }
        }

        assert_eq!(session.num_sent, 3);
        assert_eq!(session.num_recv, 2);
        assert_eq!(stats::loss_percent(session.num_sent, session.num_recv), 33);
    }

    #[test]
    fn test_duplicate_does_not_satisfy_target() {
        let mut session = scenario_session(2);

        let request = packet::encode_echo_request(session.identifier, 0, session.payload_size);
        session.record_sent();
        session.handle_reply(0, Some(64), &request[ICMP_HEADER_LEN..]);
        session.handle_reply(0, Some(64), &request[ICMP_HEADER_LEN..]);

        assert_eq!(session.num_recv, 1);
        assert_eq!(session.num_dup, 1);
        assert!(!session.target_met());
    }
}
