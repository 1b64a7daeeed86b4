use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::ErrorKind;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Which flavor of ICMP socket we got. Raw sockets hand us the IPv4
/// header on receive and honor our identifier; on datagram sockets the
/// kernel strips the header and owns the identifier field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Raw,
    Datagram,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Raw => write!(f, "raw"),
            TransportMode::Datagram => write!(f, "datagram"),
        }
    }
}

pub struct IcmpSocket {
    socket: Socket,
    mode: TransportMode,
}

impl IcmpSocket {
    /// Open an ICMP-capable socket. Tries a privileged raw socket first
    /// and falls back to an unprivileged `SOCK_DGRAM` ICMP socket when
    /// permission is refused. Any other failure is fatal.
    pub fn open() -> anyhow::Result<Self> {
        match Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)) {
            Ok(socket) => {
                socket.set_nonblocking(true)?;
                log::debug!("opened raw ICMP socket");
                Ok(Self {
                    socket,
                    mode: TransportMode::Raw,
                })
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4))
                    .map_err(|e| {
                        anyhow::anyhow!(
                            "lacking privilege for ICMP socket: {}. \
                             Run as root or enable unprivileged ICMP \
                             (sysctl net.ipv4.ping_group_range)",
                            e
                        )
                    })?;
                socket.set_nonblocking(true)?;
                log::debug!("raw socket refused, using unprivileged datagram ICMP socket");
                Ok(Self {
                    socket,
                    mode: TransportMode::Datagram,
                })
            }
            Err(e) => Err(anyhow::anyhow!("failed to create ICMP socket: {}", e)),
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Send one datagram. A short write is an error, not a partial
    /// success.
    pub fn send(&self, bytes: &[u8], destination: Ipv4Addr) -> anyhow::Result<usize> {
        let addr = SockAddr::from(SocketAddr::new(IpAddr::V4(destination), 0));
        let sent = self.socket.send_to(bytes, &addr)?;
        if sent != bytes.len() {
            return Err(anyhow::anyhow!(
                "short send: {} of {} bytes",
                sent,
                bytes.len()
            ));
        }
        Ok(sent)
    }

    /// Bounded readiness check: returns true as soon as a datagram is
    /// queued, false once `timeout` elapses. Interruption is treated as
    /// not-ready, never as a failure.
    pub async fn poll_readable(&self, timeout: Duration) -> anyhow::Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut probe = [MaybeUninit::<u8>::uninit(); 1];
        loop {
            match self.socket.peek_from(&mut probe) {
                Ok(_) => return Ok(true),
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock
                        || e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            sleep(remaining.min(Duration::from_millis(2))).await;
        }
    }

    /// Non-blocking read of at most one datagram. Returns `None` when
    /// the queue is empty; callers drain by looping until then.
    pub fn receive(
        &self,
        buf: &mut [MaybeUninit<u8>],
    ) -> anyhow::Result<Option<(Vec<u8>, SockAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((len, sender)) => {
                let mut data = vec![0u8; len];
                for (dst, src) in data.iter_mut().zip(buf[..len].iter()) {
                    *dst = unsafe { src.assume_init() };
                }
                Ok(Some((data, sender)))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
