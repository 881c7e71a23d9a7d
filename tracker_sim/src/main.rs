//! Tracker Fleet Simulator CLI
//!
//! `fleet` drives simulated trackers against a collector; `collect` runs the
//! loopback collector so the fleet has something to talk to locally.

use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use tracker_env::{TcpConnector, TokioContext, MAX_DEVICE_INDEX};
use tracker_sim::{
    Collector, ConstantBackoff, ExponentialBackoff, FleetConfig, FleetSummary, PeerBehavior,
    SimulationSupervisor,
};

/// GPS tracker fleet simulator
#[derive(Parser, Debug)]
#[command(name = "tracker-sim")]
#[command(about = "Simulate a fleet of GPS trackers streaming to a collector", long_about = None)]
struct Args {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch the device fleet and run until Ctrl-C
    Fleet(FleetArgs),

    /// Run a loopback collector
    Collect(CollectArgs),
}

#[derive(clap::Args, Debug)]
struct FleetArgs {
    /// Collector address (host:port)
    #[arg(long, default_value = "122.155.175.199:5027")]
    server: String,

    /// Number of simulated devices (1-999, one IMEI ordinal each)
    #[arg(short = 'n', long, default_value = "200",
          value_parser = clap::value_parser!(u32).range(1..=MAX_DEVICE_INDEX as i64))]
    devices: u32,

    /// Seconds between frames of one device
    #[arg(short, long, default_value = "29",
          value_parser = clap::value_parser!(u64).range(1..=86_400))]
    interval: u64,

    /// Delay between device launches in milliseconds
    #[arg(long, default_value = "20")]
    stagger_ms: u64,

    /// Connect and read timeout in milliseconds
    #[arg(long, default_value = "1000")]
    timeout_ms: u64,

    /// Reconnect delay in milliseconds (base delay for exponential)
    #[arg(long, default_value = "2000")]
    retry_ms: u64,

    /// Reconnect delay policy
    #[arg(long, value_enum, default_value = "constant")]
    backoff: BackoffKind,

    /// Upper bound for the exponential policy in milliseconds
    #[arg(long, default_value = "60000")]
    max_backoff_ms: u64,

    /// Trajectory seed (0 = fresh entropy)
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Print the shutdown summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct CollectArgs {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:5027")]
    listen: String,

    /// Peer behavior (accept, reject:N, close_after:N, silent)
    #[arg(short, long, default_value = "accept")]
    behavior: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackoffKind {
    Constant,
    Exponential,
}

impl FleetArgs {
    fn config(&self) -> FleetConfig {
        let config = FleetConfig::default()
            .with_server(self.server.clone())
            .with_device_count(self.devices)
            .with_send_interval(Duration::from_secs(self.interval))
            .with_launch_stagger(Duration::from_millis(self.stagger_ms))
            .with_io_timeout(Duration::from_millis(self.timeout_ms));

        let retry = Duration::from_millis(self.retry_ms);
        match self.backoff {
            BackoffKind::Constant => config.with_backoff(ConstantBackoff(retry)),
            BackoffKind::Exponential => config.with_backoff(ExponentialBackoff::new(
                retry,
                Duration::from_millis(self.max_backoff_ms),
            )),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    match args.command {
        Command::Fleet(fleet) => run_fleet(fleet).await,
        Command::Collect(collect) => run_collector(collect).await,
    }
}

async fn run_fleet(args: FleetArgs) {
    let config = args.config();
    let context = Arc::new(TokioContext::with_seed(args.seed));
    let supervisor = SimulationSupervisor::new(config, context, Arc::new(TcpConnector));

    let fleet = supervisor.launch().await;
    info!(sessions = fleet.session_count(), "Press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }
    let summary = fleet.shutdown().await;
    report(&summary, args.json);
}

fn report(summary: &FleetSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                error!(error = %e, "Failed to serialize summary");
                std::process::exit(1);
            }
        }
        return;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "{} devices | {} streaming | {} frames sent | {} failures",
        summary.devices, summary.streaming, summary.frames_sent, summary.failures
    );
}

async fn run_collector(args: CollectArgs) {
    let behavior: PeerBehavior = args.behavior.parse().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("Available behaviors:");
        for b in PeerBehavior::all().into_iter().filter(|b| *b != PeerBehavior::Refuse) {
            eprintln!("  {:<12} {}", b.name(), b.description());
        }
        std::process::exit(1);
    });

    let collector = match Collector::bind(&args.listen, behavior).await {
        Ok(collector) => collector,
        Err(e) => {
            error!(addr = %args.listen, error = %e, "Failed to bind collector");
            std::process::exit(1);
        }
    };

    if let Err(e) = collector.run().await {
        error!(error = %e, "Collector stopped");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet_args(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["tracker-sim", "fleet"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_fleet_defaults_parse() {
        let Command::Fleet(fleet) = fleet_args(&[]).unwrap().command else {
            panic!("expected fleet subcommand");
        };
        let config = fleet.config();
        assert_eq!(config.device_count, 200);
        assert_eq!(config.send_interval, Duration::from_secs(29));
        assert_eq!(fleet.seed, 0);
    }

    #[test]
    fn test_devices_limited_to_imei_range() {
        assert!(fleet_args(&["--devices", "999"]).is_ok());
        assert!(fleet_args(&["--devices", "1000"]).is_err());
        assert!(fleet_args(&["--devices", "0"]).is_err());
    }

    #[test]
    fn test_interval_rejects_non_numeric() {
        assert!(fleet_args(&["--interval", "NaN"]).is_err());
        assert!(fleet_args(&["--interval", "inf"]).is_err());
        assert!(fleet_args(&["--interval", "0"]).is_err());
        let Command::Fleet(fleet) = fleet_args(&["--interval", "30"]).unwrap().command else {
            panic!("expected fleet subcommand");
        };
        assert_eq!(fleet.config().send_interval, Duration::from_secs(30));
    }
}
