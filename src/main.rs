//! pingmuxd: the probe-job orchestrator daemon.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use pingmux_engine::{JobLauncher, LauncherConfig};
use pingmux_probe::TcpProberFactory;
use pingmux_settings::{load_settings, Settings};
use pingmux_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "pingmuxd", version, about = "Streaming probe-job orchestrator")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Raise the default log level to debug.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => match load_settings(path) {
            Ok(settings) => settings,
            Err(error) => {
                eprintln!("cannot load configuration {}: {error}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Settings::default(),
    };

    if args.print_config {
        println!("{}", settings.to_pretty_json());
        return ExitCode::SUCCESS;
    }

    let _telemetry = match init_telemetry(&TelemetryConfig {
        access_path: settings.log.access.clone(),
        error_path: settings.log.error.clone(),
        debug: args.debug,
    }) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("cannot initialize logging: {error}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pingmuxd starting");

    let source_addr = match settings.probe_source_addr.parse::<Ipv4Addr>() {
        Ok(addr) => addr,
        Err(_) => {
            tracing::warn!(
                addr = %settings.probe_source_addr,
                "invalid probe source address, using the kernel's choice"
            );
            Ipv4Addr::UNSPECIFIED
        }
    };

    let launcher = JobLauncher::new(
        LauncherConfig {
            limits: settings.limits,
            source_addr,
            stream_buffer: settings.stream_buffer,
            submit_queue: settings.submit_queue,
        },
        Arc::new(TcpProberFactory),
    );
    let dispatch = tokio::spawn(Arc::clone(&launcher).run());

    let server = match pingmux_server::start(&settings, Arc::clone(&launcher)).await {
        Ok(handle) => handle,
        Err(error) => {
            tracing::error!(%error, "server startup failed");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %server.local_addr, "pingmuxd ready");

    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("cannot listen for shutdown signal");
    }

    tracing::info!("shutting down");
    server.shutdown();
    let grace = Duration::from_secs(settings.shutdown_grace_s);
    let clean = launcher.shutdown(grace).await;
    dispatch.abort();

    if clean {
        tracing::info!("shutdown complete");
        ExitCode::SUCCESS
    } else {
        tracing::warn!(grace_s = settings.shutdown_grace_s, "jobs outlived the grace period");
        ExitCode::FAILURE
    }
}
