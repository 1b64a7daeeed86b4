use std::process;

use crate::icmp::packet::{ICMP_HEADER_LEN, IPV4_MIN_HEADER_LEN, MAX_PACKET_LEN};

/// Largest payload that still fits a single IPv4 datagram.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_LEN - IPV4_MIN_HEADER_LEN - ICMP_HEADER_LEN;

/// Shorter intervals need a raw (privileged) socket.
pub const MIN_UNPRIVILEGED_INTERVAL: f64 = 0.2;

/// Random non-zero identifier for this session's echo stream.
pub fn generate_identifier() -> u16 {
    use rand::Rng;
    rand::thread_rng().gen_range(1..=65535)
}

pub fn exit_with_error(message: &str, code: i32) -> ! {
    eprintln!("rping: {}", message);
    process::exit(code);
}

pub fn validate_ping_params(payload_size: usize, interval: f64) -> anyhow::Result<()> {
    if payload_size > MAX_PAYLOAD_SIZE {
        return Err(anyhow::anyhow!(
            "packet size too large: maximum is {} bytes",
            MAX_PAYLOAD_SIZE
        ));
    }

    if !interval.is_finite() || interval <= 0.0 {
        return Err(anyhow::anyhow!("interval must be a positive number of seconds"));
    }

    Ok(())
}

/// Bridge Ctrl+C into a oneshot the echo loop can poll between waits.
pub fn setup_signal_handler() -> tokio::sync::oneshot::Receiver<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(());
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_nonzero() {
        for _ in 0..100 {
            assert_ne!(generate_identifier(), 0);
        }
    }

    #[test]
    fn test_parameter_validation() {
        assert!(validate_ping_params(56, 1.0).is_ok());
        assert!(validate_ping_params(0, 0.2).is_ok());
        assert!(validate_ping_params(MAX_PAYLOAD_SIZE, 1.0).is_ok());

        assert!(validate_ping_params(MAX_PAYLOAD_SIZE + 1, 1.0).is_err());
        assert!(validate_ping_params(56, 0.0).is_err());
        assert!(validate_ping_params(56, -1.0).is_err());
        assert!(validate_ping_params(56, f64::NAN).is_err());
    }

    #[test]
    fn test_max_payload_size() {
        assert_eq!(MAX_PAYLOAD_SIZE, 65507);
    }
}
