use clap::{Arg, ArgAction, Command};

#[derive(Debug, Clone)]
pub struct PingArgs {
    pub destination: String,
    /// Replies to collect before stopping; 0 = run until interrupted.
    pub count: u64,
    /// Seconds between sends.
    pub interval: f64,
    /// Data bytes appended after the 8-byte ICMP header.
    pub payload_size: usize,
    pub verbose: bool,
    pub quiet: bool,
    pub flood: bool,
}

impl Default for PingArgs {
    fn default() -> Self {
        Self {
            destination: String::new(),
            count: 0, // inetutils semantics: unbounded
            interval: 1.0,
            payload_size: 56,
            verbose: false,
            quiet: false,
            flood: false,
        }
    }
}

pub fn build_cli() -> Command {
    Command::new("rping")
        .version("0.1.0")
        .about("A minimal IPv4 ICMP echo client")
        .arg(
            Arg::new("destination")
                .help("Destination hostname or IPv4 address")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("count")
                .short('c')
                .help("Stop after receiving this many replies (0 = unbounded)")
                .value_name("count")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .help("Seconds to wait between sending each packet")
                .value_name("seconds")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("size")
                .short('s')
                .help("Number of data bytes to send")
                .value_name("size")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .help("Report received ICMP error messages")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .help("Suppress per-reply output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("flood")
                .short('f')
                .help("Flood ping: one request every 10 ms, a dot per send")
                .action(ArgAction::SetTrue),
        )
}

pub fn parse_args() -> anyhow::Result<PingArgs> {
    let matches = build_cli().get_matches();

    let mut args = PingArgs::default();

    args.destination = matches.get_one::<String>("destination").unwrap().clone();
    args.verbose = matches.get_flag("verbose");
    args.quiet = matches.get_flag("quiet");
    args.flood = matches.get_flag("flood");

    if let Some(count) = matches.get_one::<u64>("count") {
        args.count = *count;
    }

    if let Some(interval) = matches.get_one::<f64>("interval") {
        args.interval = *interval;
    }

    if let Some(size) = matches.get_one::<u32>("size") {
        args.payload_size = *size as usize;
    }

    if args.flood && matches.contains_id("interval") {
        return Err(anyhow::anyhow!("-f and -i are incompatible"));
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = PingArgs::default();
        assert_eq!(args.count, 0);
        assert_eq!(args.payload_size, 56);
        assert!((args.interval - 1.0).abs() < f64::EPSILON);
    }
}
