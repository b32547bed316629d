//! `rangebridge` – publishes a 2D rangefinder as a laser scan stream.
//!
//! 1. Loads the config (first argument, `RANGEBRIDGE_CONFIG`, or
//!    `~/.rangebridge/config.toml`; written with defaults on first run).
//! 2. Creates the transport node and, unless `stream_port = 0`, the
//!    WebSocket stream server.
//! 3. Opens the configured subdevice and starts sampling.
//! 4. Runs until **Ctrl-C**, then stops sampling and exits.

mod config;
mod telemetry;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use colored::Colorize;
use rangebridge_hal::DriverRegistry;
use rangebridge_middleware::{EventBus, Node, ScanStreamServer};
use rangebridge_nws::RangefinderNws;
use rangebridge_types::BridgeError;
use tracing::{error, info, warn};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

fn main() -> ExitCode {
    let _telemetry = telemetry::init_tracing("rangebridge");

    print_banner();

    let path = config::resolve_path(std::env::args().nth(1));
    let cfg = match config::load(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save_to(&cfg, &path) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => warn!(error = %e, "could not write default config"),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    match run(cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "rangebridge stopped");
            eprintln!("{}: {e}", "Error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: config::Config) -> Result<(), BridgeError> {
    if cfg.nws.subdevice.is_none() {
        return Err(BridgeError::Config(
            "no subdevice configured; set nws.subdevice or RANGEBRIDGE_SUBDEVICE".to_string(),
        ));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| BridgeError::InvalidState(format!("failed to build tokio runtime: {e}")))?;

    let node = Arc::new(Node::new(cfg.node_name.clone(), Arc::new(EventBus::default())));
    info!(node = node.name(), "transport node created");

    if cfg.stream_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], cfg.stream_port));
        let topics = vec![cfg.nws.topic.clone(), cfg.nws.status_topic()];
        let server = runtime.block_on(ScanStreamServer::bind(Arc::clone(node.bus()), topics, addr))?;
        println!(
            "  Streaming scans on {}",
            format!("ws://{addr}").bold().cyan()
        );
        runtime.spawn(async move {
            if let Err(e) = server.serve().await {
                error!(error = %e, "stream server stopped");
            }
        });
    }

    let mut nws = RangefinderNws::new(node);
    nws.open(cfg.nws.clone(), &DriverRegistry::with_builtin_drivers())?;
    println!(
        "  Publishing {} on {} every {} s\n",
        cfg.nws.frame.bold(),
        cfg.nws.topic.bold(),
        cfg.nws.period
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop the process with a signal");
    }

    let mut last_report = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
        if last_report.elapsed() >= STATS_INTERVAL {
            let stats = nws.stats();
            info!(
                ticks = stats.ticks,
                published = stats.published,
                read_failures = stats.read_failures,
                status = ?stats.last_status,
                "bridge stats"
            );
            last_report = Instant::now();
        }
    }

    nws.close();
    runtime.shutdown_timeout(Duration::from_secs(1));
    println!("{}", "  ✓ Sampling stopped.".green());
    Ok(())
}

fn print_banner() {
    println!();
    println!("  {} {}",
        "rangebridge".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  2D rangefinder → LaserScan bridge");
    println!();
}
