mod cli;
mod dns;
mod icmp;
mod ping;
mod session;
mod stats;
mod utils;

use icmp::{IcmpSocket, TransportMode};
use session::Session;

#[tokio::main]
async fn main() {
    // Enable debug logging if RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            utils::exit_with_error(&format!("usage error: {}", e), 2);
        }
    };

    if let Err(e) = utils::validate_ping_params(args.payload_size, args.interval) {
        utils::exit_with_error(&e.to_string(), 2);
    }

    let (destination, display_address) = match dns::resolve_ipv4(&args.destination).await {
        Ok(resolved) => resolved,
        Err(e) => {
            log::debug!("resolution of '{}' failed: {}", args.destination, e);
            utils::exit_with_error(
                &format!("{}: Name or service not known", args.destination),
                2,
            );
        }
    };

    let socket = match IcmpSocket::open() {
        Ok(socket) => socket,
        Err(e) => {
            utils::exit_with_error(&e.to_string(), 2);
        }
    };

    if socket.mode() == TransportMode::Datagram {
        log::info!("using unprivileged datagram ICMP socket; kernel owns the identifier");
        if args.flood || args.interval < utils::MIN_UNPRIVILEGED_INTERVAL {
            utils::exit_with_error(
                "intervals below 0.2 s need a raw socket; run with CAP_NET_RAW or as root",
                2,
            );
        }
    }

    let identifier = utils::generate_identifier();
    let mut session = Session::new(
        identifier,
        destination,
        display_address,
        socket.mode(),
        &args,
    );

    println!(
        "{}",
        stats::format_header(
            &session.hostname,
            &session.display_address,
            session.payload_size,
            session.verbose,
            session.identifier,
        )
    );

    let mut shutdown = utils::setup_signal_handler();
    ping::run(&mut session, &socket, &mut shutdown).await;

    println!(
        "{}",
        session.rtt.format_summary(
            &session.hostname,
            session.num_sent,
            session.num_recv,
            session.num_dup,
        )
    );
}
