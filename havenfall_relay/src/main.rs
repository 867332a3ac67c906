// CLI entry point for the Havenfall relay.
//
// Starts a standalone relay that peer engines connect to. The relay orders
// commands and forwards replication traffic — it never simulates the world.
// See `server.rs` for the networking architecture and `session.rs` for the
// session state.
//
// Usage:
//   relay [OPTIONS]
//     --port <PORT>        Listen port (default: 7979)
//     --name <NAME>        Session name (default: havenfall-session)
//     --password <PASS>    Session password (optional)
//     --max-peers <N>      Max peers (default: 16)

use havenfall_relay::server::{RelayConfig, start_relay};
use log::info;

fn main() {
    env_logger::init();
    let config = parse_args();

    let (handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    info!("relay listening on {addr}");
    println!("Relay listening on {addr}");
    println!("Press Ctrl+C to stop.");

    // Park until the process is killed. SIGINT/SIGTERM keep their default
    // disposition and tear the relay threads down with the process; there is
    // nothing to persist on the way out.
    let (_keep_alive, parked) = std::sync::mpsc::channel::<()>();
    let _ = parked.recv();
    handle.stop();
}

/// Parse command-line arguments into a `RelayConfig`. Plain
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> RelayConfig {
    let mut config = RelayConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--name" => {
                i += 1;
                config.session_name = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--name requires a value");
                    std::process::exit(1);
                });
            }
            "--password" => {
                i += 1;
                config.password = args.get(i).cloned().or_else(|| {
                    eprintln!("--password requires a value");
                    std::process::exit(1);
                });
            }
            "--max-peers" => {
                i += 1;
                config.max_peers = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--max-peers requires a valid number");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>        Listen port (default: 7979)");
    println!("  --name <NAME>        Session name (default: havenfall-session)");
    println!("  --password <PASS>    Session password (optional)");
    println!("  --max-peers <N>      Max peers (default: 16)");
    println!("  --help, -h           Show this help");
}
