//! lamco-display-manager - Display topology manager
//!
//! Entry point for the command-line tool.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

use lamco_display_manager::config::{Config, DEFAULT_CONFIG_PATH};
use lamco_display_manager::configuration::ApplyRequest;
use lamco_display_manager::manager::{DisplayManager, TopologyService};
use lamco_display_manager::topology::{PowerSaveMode, Topology};
use lamco_display_manager::utils::{format_user_error, log_startup_diagnostics};

/// Command-line arguments for lamco-display-manager
#[derive(Parser, Debug)]
#[command(name = "lamco-display-manager")]
#[command(version, about = "Display topology manager", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "LAMCO_DISPLAY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Backend (auto|xrandr|enumeration|synthetic)
    #[arg(short, long, env = "LAMCO_DISPLAY_BACKEND")]
    pub backend: Option<String>,

    /// X display to open (defaults to $DISPLAY)
    #[arg(short, long)]
    pub display: Option<String>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the current topology
    Show {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: ShowFormat,
    },
    /// Apply a configuration request from a TOML or JSON file
    Apply {
        /// Request file
        file: PathBuf,
    },
    /// Log topology changes until interrupted
    Watch,
    /// Change the overall power state
    PowerSave {
        /// on, standby, suspend or off
        mode: PowerSaveMode,
    },
}

/// Output format of `show`
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ShowFormat {
    /// Human readable
    Text,
    /// Index-keyed resources snapshot
    Json,
}

/// Apply request as stored on disk
#[derive(Debug, Deserialize)]
struct RequestFile {
    /// Serial the request was built against; the current one when absent
    #[serde(default)]
    serial: Option<u64>,
    #[serde(flatten)]
    request: ApplyRequest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration before logging so its log settings apply
    let loaded = Config::load(&args.config);
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default_config(),
    }
    .with_overrides(args.backend.clone(), args.display.clone());

    let _log_guard = init_logging(&args, &config)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-display-manager v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("════════════════════════════════════════════════════════");

    if let Err(e) = &loaded {
        warn!("Failed to load config: {:#}, using defaults", e);
    }
    log_startup_diagnostics(&config);
    tracing::debug!("Config: {:?}", config);

    if let Err(e) = run(args.command, config).await {
        eprintln!("{}", format_user_error(&e));
        return Err(e);
    }

    Ok(())
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Show { format } => {
            let manager = DisplayManager::from_config(&config);
            let topology = manager.current();
            match format {
                ShowFormat::Text => print_topology(&topology),
                ShowFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&topology.resources())?)
                }
            }
        }
        Command::Apply { file } => {
            let RequestFile { serial, request } = load_request(&file)?;

            let manager = DisplayManager::from_config(&config);
            let (handle, thread) =
                TopologyService::spawn(manager, config.service.queue_capacity)?;

            let serial = serial.unwrap_or_else(|| handle.serial());
            let result = handle.apply(serial, request).await;
            handle.shutdown().await;
            let _ = thread.join();

            let outcome = result?;
            for (crtc, error) in &outcome.report.failed_crtcs {
                warn!("{} was not configured: {}", crtc, error);
            }
            for crtc in &outcome.report.restored_crtcs {
                warn!("{} was put back where it was", crtc);
            }
            println!("Applied; topology is now at serial {}", outcome.serial);
            print_topology(&handle.current());
        }
        Command::Watch => {
            let manager = DisplayManager::from_config(&config);
            let (handle, thread) =
                TopologyService::spawn(manager, config.service.queue_capacity)?;
            let mut events = handle.subscribe();

            info!("Watching topology from serial {}", handle.serial());
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(changed) => {
                            info!("Topology changed, serial {}", changed.serial);
                            print_topology(&handle.current());
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("Missed {} change signals", missed);
                            print_topology(&handle.current());
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, stopping");
                        break;
                    }
                }
            }

            handle.shutdown().await;
            let _ = thread.join();
        }
        Command::PowerSave { mode } => {
            let mut manager = DisplayManager::from_config(&config);
            manager.set_power_save_mode(mode)?;
            println!("Power save mode: {}", manager.current().power_save_mode());
        }
    }

    Ok(())
}

fn load_request(path: &Path) -> Result<RequestFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).context("Failed to parse JSON request")
    } else {
        toml::from_str(&content).context("Failed to parse TOML request")
    }
}

fn print_topology(topology: &Topology) {
    let screen = topology.screen_size();
    let max = topology.max_screen_size();
    println!(
        "Serial {}{}  screen {}x{} (max {}x{})  power {}",
        topology.serial(),
        if topology.is_fallback() { " (fallback)" } else { "" },
        screen.width,
        screen.height,
        max.width,
        max.height,
        topology.power_save_mode()
    );

    println!("Logical monitors:");
    for monitor in topology.logical_monitors() {
        println!(
            "  [{}] {}x{}+{}+{} @ {:.2} Hz{}{}",
            monitor.index,
            monitor.rect.width,
            monitor.rect.height,
            monitor.rect.x,
            monitor.rect.y,
            monitor.refresh_rate,
            if monitor.is_primary { " primary" } else { "" },
            if monitor.is_presentation { " presentation" } else { "" }
        );
    }

    println!("Outputs:");
    for output in topology.outputs() {
        let crtc = output
            .crtc
            .map_or_else(|| "off".to_string(), |c| c.to_string());
        println!(
            "  [{}] {} ({} {}) {}{}",
            output.id.0,
            output.name,
            output.vendor,
            output.product,
            crtc,
            if output.is_primary { " primary" } else { "" }
        );
        for mode_id in &output.modes {
            if let Some(mode) = topology.mode(*mode_id) {
                let marker = if output.preferred_mode == Some(*mode_id) { "*" } else { " " };
                println!(
                    "     {}[{}] {}x{} @ {:.2} Hz",
                    marker, mode.id.0, mode.width, mode.height, mode.refresh_rate
                );
            }
        }
    }

    println!("CRTCs:");
    for crtc in topology.crtcs() {
        match crtc.current_mode {
            Some(mode) => println!(
                "  [{}] {}x{}+{}+{} {} {:?}",
                crtc.id.0,
                crtc.rect.width,
                crtc.rect.height,
                crtc.rect.x,
                crtc.rect.y,
                mode,
                crtc.transform
            ),
            None => println!("  [{}] unused", crtc.id.0),
        }
    }
}

fn init_logging(args: &Args, config: &Config) -> Result<Option<WorkerGuard>> {
    let log_level = match args.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // x11rb at warn: debug logs every request
        tracing_subscriber::EnvFilter::new(format!(
            "lamco={level},lamco_display_manager={level},warn",
            level = log_level
        ))
    });

    let stderr_layer = match args.log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        "compact" => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .boxed(),
    };
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![stderr_layer];

    // --log-file wins over the configured log directory
    let (writer, guard) = if let Some(path) = &args.log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        (Some(writer), Some(guard))
    } else if let Some(dir) = &config.logging.log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(dir, "lamco-display-manager.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (Some(writer), Some(guard))
    } else {
        (None, None)
    };

    if let Some(writer) = writer {
        let file_layer = if args.log_format == "json" {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    if let Some(path) = &args.log_file {
        info!("Logging to file: {}", path.display());
    }

    Ok(guard)
}
