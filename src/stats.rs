use crate::icmp::IcmpErrorKind;

/// Per-reply result event, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyReport {
    pub byte_len: usize,
    pub sequence: u16,
    pub ttl: Option<u8>,
    pub rtt_ms: Option<f64>,
    pub duplicate: bool,
}

/// Round-trip time accumulator. Everything is kept in seconds so the
/// running sums stay small; conversion to milliseconds happens only at
/// display time.
#[derive(Debug, Clone, Default)]
pub struct RttStats {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    sum_sq: f64,
}

impl RttStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one first-time round trip. Duplicates must not be fed
    /// through here.
    pub fn record(&mut self, rtt_secs: f64) {
        if self.count == 0 {
            self.min = rtt_secs;
            self.max = rtt_secs;
        } else {
            self.min = self.min.min(rtt_secs);
            self.max = self.max.max(rtt_secs);
        }
        self.count += 1;
        self.sum += rtt_secs;
        self.sum_sq += rtt_secs * rtt_secs;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min_secs(&self) -> f64 {
        self.min
    }

    pub fn max_secs(&self) -> f64 {
        self.max
    }

    pub fn avg_secs(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    pub fn stddev_secs(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let avg = self.avg_secs();
        // clamp guards floating-point negative-zero artifacts
        let variance = (self.sum_sq / self.count as f64 - avg * avg).max(0.0);
        variance.sqrt()
    }

    pub fn format_summary(&self, hostname: &str, sent: u64, received: u64, duplicates: u64) -> String {
        let mut summary = format!("--- {} ping statistics ---\n", hostname);
        summary.push_str(&format!(
            "{} packets transmitted, {} packets received, ",
            sent, received
        ));
        if duplicates > 0 {
            summary.push_str(&format!("+{} duplicates, ", duplicates));
        }
        summary.push_str(&format!("{}% packet loss", loss_percent(sent, received)));

        if self.count > 0 {
            summary.push_str(&format!(
                "\nround-trip min/avg/max/stddev = {:.3}/{:.3}/{:.3}/{:.3} ms",
                self.min * 1000.0,
                self.avg_secs() * 1000.0,
                self.max * 1000.0,
                self.stddev_secs() * 1000.0
            ));
        }

        summary
    }
}

pub fn loss_percent(sent: u64, received: u64) -> u64 {
    if sent == 0 {
        return 0;
    }
    sent.saturating_sub(received) * 100 / sent
}

pub fn format_header(
    hostname: &str,
    display_address: &str,
    payload_size: usize,
    verbose: bool,
    identifier: u16,
) -> String {
    let mut header = format!("PING {} ({}): {} data bytes", hostname, display_address, payload_size);
    if verbose {
        header.push_str(&format!(", id 0x{:04x} = {}", identifier, identifier));
    }
    header
}

pub fn format_reply(report: &ReplyReport, source_display: &str) -> String {
    let mut line = format!(
        "{} bytes from {}: icmp_seq={}",
        report.byte_len, source_display, report.sequence
    );
    if let Some(ttl) = report.ttl {
        line.push_str(&format!(" ttl={}", ttl));
    }
    if let Some(rtt_ms) = report.rtt_ms {
        line.push_str(&format!(" time={:.3} ms", rtt_ms));
    }
    if report.duplicate {
        line.push_str(" (DUP!)");
    }
    line
}

pub fn format_error(source_display: &str, original_sequence: u16, kind: IcmpErrorKind) -> String {
    format!(
        "From {}: icmp_seq={} {}",
        source_display, original_sequence, kind
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_accuracy() {
        let mut stats = RttStats::new();
        stats.record(0.010);
        stats.record(0.020);
        stats.record(0.030);

        assert_eq!(stats.count(), 3);
        assert!((stats.min_secs() * 1000.0 - 10.0).abs() < 1e-9);
        assert!((stats.max_secs() * 1000.0 - 30.0).abs() < 1e-9);
        assert!((stats.avg_secs() * 1000.0 - 20.0).abs() < 1e-9);
        // sqrt((100 + 400 + 900) / 3 - 400) ms
        assert!((stats.stddev_secs() * 1000.0 - 8.16496580927726).abs() < 1e-6);
    }

    #[test]
    fn test_stddev_zero_for_identical_samples() {
        let mut stats = RttStats::new();
        stats.record(0.015);
        stats.record(0.015);
        assert_eq!(stats.stddev_secs(), 0.0);
    }

    #[test]
    fn test_loss_percent() {
        assert_eq!(loss_percent(0, 0), 0);
        assert_eq!(loss_percent(3, 3), 0);
        assert_eq!(loss_percent(3, 2), 33);
        assert_eq!(loss_percent(4, 0), 100);
        // datagram-mode strays can push received past sent
        assert_eq!(loss_percent(2, 3), 0);
    }

    #[test]
    fn test_reply_formatting() {
        let report = ReplyReport {
            byte_len: 64,
            sequence: 2,
            ttl: Some(57),
            rtt_ms: Some(12.3456),
            duplicate: false,
        };
        assert_eq!(
            format_reply(&report, "8.8.8.8"),
            "64 bytes from 8.8.8.8: icmp_seq=2 ttl=57 time=12.346 ms"
        );
    }

    #[test]
    fn test_reply_formatting_without_ttl_or_time() {
        let report = ReplyReport {
            byte_len: 64,
            sequence: 0,
            ttl: None,
            rtt_ms: None,
            duplicate: true,
        };
        assert_eq!(
            format_reply(&report, "8.8.8.8"),
            "64 bytes from 8.8.8.8: icmp_seq=0 (DUP!)"
        );
    }

    #[test]
    fn test_summary_formatting() {
        let mut stats = RttStats::new();
        stats.record(0.010);
        stats.record(0.030);

        let summary = stats.format_summary("example.com", 3, 2, 0);
        assert!(summary.contains("--- example.com ping statistics ---"));
        assert!(summary.contains("3 packets transmitted, 2 packets received, 33% packet loss"));
        assert!(summary.contains("round-trip min/avg/max/stddev = 10.000/20.000/30.000/10.000 ms"));
    }

    #[test]
    fn test_summary_omits_rtt_without_replies() {
        let stats = RttStats::new();
        let summary = stats.format_summary("example.com", 4, 0, 0);
        assert!(summary.contains("100% packet loss"));
        assert!(!summary.contains("round-trip"));
    }

    #[test]
    fn test_summary_reports_duplicates() {
        let mut stats = RttStats::new();
        stats.record(0.010);
        let summary = stats.format_summary("example.com", 1, 1, 2);
        assert!(summary.contains("+2 duplicates"));
    }

    #[test]
    fn test_header_formatting() {
        assert_eq!(
            format_header("example.com", "93.184.216.34", 56, false, 0x1234),
            "PING example.com (93.184.216.34): 56 data bytes"
        );
        assert_eq!(
            format_header("8.8.8.8", "8.8.8.8", 56, true, 0x1234),
            "PING 8.8.8.8 (8.8.8.8): 56 data bytes, id 0x1234 = 4660"
        );
    }
}
