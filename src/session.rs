use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cli::PingArgs;
use crate::icmp::packet::{self, ICMP_HEADER_LEN};
use crate::icmp::TransportMode;
use crate::stats::{ReplyReport, RttStats};

/// Receipt state of one sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqState {
    NotSent,
    Sent,
    Received,
}

/// One slot per possible sequence value, so no eviction is ever needed.
/// After the counter wraps past 65535 a slot is reused; `mark_sent`
/// clears any stale `Received` mark so the wrapped sequence's own reply
/// is not mistaken for a duplicate.
pub struct SequenceTracker {
    slots: Vec<SeqState>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self {
            slots: vec![SeqState::NotSent; usize::from(u16::MAX) + 1],
        }
    }

    pub fn mark_sent(&mut self, sequence: u16) {
        self.slots[sequence as usize] = SeqState::Sent;
    }

    /// Returns true if this sequence was already received (a duplicate);
    /// the slot is left unchanged in that case.
    pub fn mark_received(&mut self, sequence: u16) -> bool {
        if self.slots[sequence as usize] == SeqState::Received {
            return true;
        }
        self.slots[sequence as usize] = SeqState::Received;
        false
    }

    pub fn state(&self, sequence: u16) -> SeqState {
        self.slots[sequence as usize]
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// All mutable state of one ping run, constructed once at startup and
/// owned by the echo loop. No ambient globals.
pub struct Session {
    pub identifier: u16,
    pub next_sequence: u16,
    pub hostname: String,
    pub display_address: String,
    pub destination: Ipv4Addr,
    pub mode: TransportMode,
    pub payload_size: usize,

    /// Target reply count; 0 means run until interrupted.
    pub count: u64,
    /// Seconds between sends (before the flood override).
    pub interval: f64,
    pub verbose: bool,
    pub quiet: bool,
    pub flood: bool,

    pub tracker: SequenceTracker,
    pub num_sent: u64,
    pub num_recv: u64,
    pub num_dup: u64,
    pub rtt: RttStats,
}

impl Session {
    pub fn new(
        identifier: u16,
        destination: Ipv4Addr,
        display_address: String,
        mode: TransportMode,
        args: &PingArgs,
    ) -> Self {
        Self {
            identifier,
            next_sequence: 0,
            hostname: args.destination.clone(),
            display_address,
            destination,
            mode,
            payload_size: args.payload_size,
            count: args.count,
            interval: args.interval,
            verbose: args.verbose,
            quiet: args.quiet,
            flood: args.flood,
            tracker: SequenceTracker::new(),
            num_sent: 0,
            num_recv: 0,
            num_dup: 0,
            rtt: RttStats::new(),
        }
    }

    /// Bookkeeping after a successful send. The sequence counter only
    /// advances here, so a failed send retries the same sequence.
    pub fn record_sent(&mut self) {
        self.tracker.mark_sent(self.next_sequence);
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.num_sent += 1;
    }

    /// True once the configured reply target has been met.
    pub fn target_met(&self) -> bool {
        self.count > 0 && self.num_recv >= self.count
    }

    /// Fold one correlated Echo Reply into the session: duplicate
    /// detection, counters, and the RTT accumulator (first-time replies
    /// with a readable timestamp only).
    pub fn handle_reply(&mut self, sequence: u16, ttl: Option<u8>, payload: &[u8]) -> ReplyReport {
        let duplicate = self.tracker.mark_received(sequence);
        let rtt_secs = packet::read_timestamp(payload)
            .and_then(|sent| rtt_seconds(sent, now_epoch()));

        if duplicate {
            self.num_dup += 1;
        } else {
            self.num_recv += 1;
            if let Some(rtt) = rtt_secs {
                self.rtt.record(rtt);
            }
        }

        ReplyReport {
            byte_len: ICMP_HEADER_LEN + payload.len(),
            sequence,
            ttl,
            rtt_ms: rtt_secs.map(|s| s * 1000.0),
            duplicate,
        }
    }
}

fn now_epoch() -> (u32, u32) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs() as u32, now.subsec_micros())
}

/// Whole-second difference plus fractional microseconds, with an
/// explicit borrow when the microsecond part goes negative. A reply
/// that appears to predate its request yields no RTT.
fn rtt_seconds(sent: (u32, u32), received: (u32, u32)) -> Option<f64> {
    let mut secs = received.0 as i64 - sent.0 as i64;
    let mut micros = received.1 as i64 - sent.1 as i64;
    if micros < 0 {
        secs -= 1;
        micros += 1_000_000;
    }
    if secs < 0 {
        return None;
    }
    Some(secs as f64 + micros as f64 / 1e6)
}
