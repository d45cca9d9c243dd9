/*!
 * report_ip Entry Point
 *
 * `report_ip --server` resolves this host's IPv4 address and publishes it
 * to the store; plain `report_ip` reads the last published address back.
 * Each failure kind exits with its own status code.
 */

use clap::Parser;
use report_ip::{config, local_ipv4, run, Config, Mode, StoreClient};

#[derive(Parser)]
#[command(name = "report_ip", version)]
#[command(about = "Publish or read back this host's local IPv4 address", long_about = None)]
struct Cli {
    /// Run as server: resolve the local address and publish it
    #[arg(long)]
    server: bool,
}

fn main() {
    // Default to info so the outcome is visible; RUST_LOG overrides
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let path = config::default_path();
    let conf = match Config::load(&path) {
        Ok(conf) => conf,
        Err(e) => {
            log::error!("parse conf failed, {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let store = StoreClient::new(&conf.redis);
    if let Err(e) = run(Mode::from_flag(cli.server), &store, &conf.ip_key, local_ipv4) {
        log::error!("{}", e);
        std::process::exit(e.exit_code());
    }
}
