//! item-widget-mcp: Streamable-HTTP MCP server for an item list and its widget
//!
//! Serves the `get_items` and `add_item` tools and the widget resource to AI
//! agent hosts over HTTP.

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use item_widget_mcp::app::{build_registry, ItemStore, WidgetAsset};
use item_widget_mcp::config::{self, LogFormat};
use item_widget_mcp::http;
use item_widget_mcp::mcp::server::{ServerContext, ServerInfo};

/// Streamable-HTTP MCP server for an item list and its widget.
///
/// Exposes `get_items` and `add_item` tools plus the HTML widget that renders
/// their results inside the agent host.
#[derive(Parser, Debug)]
#[command(name = "item-widget-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Pre-built widget HTML file (overrides config)
    #[arg(long, value_name = "HTML_FILE")]
    widget: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "info" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO, // Default to info for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(level: Level, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

/// Entry point for the item-widget-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nLoaded from: {}", default_path.display());
                }
            }
            eprintln!("See config/example-config.json for the accepted format");
            return ExitCode::FAILURE;
        }
    };

    // Command-line overrides
    if let Some(host) = args.host {
        cfg.server.host = host.to_string();
    }
    if let Some(port) = args.port {
        cfg.server.port = port;
    }
    if let Some(widget) = args.widget {
        cfg.widget.path = Some(widget);
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level, cfg.logging.format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting item-widget-mcp server"
    );

    // The widget is read once; a restart picks up changes
    let widget = match WidgetAsset::from_path(cfg.widget.path.as_deref()) {
        Ok(widget) => widget,
        Err(e) => {
            error!(error = %e, "Failed to load widget");
            return ExitCode::FAILURE;
        }
    };
    info!(source = ?widget.source(), bytes = widget.html().len(), "Widget loaded");

    let registry = match build_registry(&widget) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Failed to build tool registry");
            return ExitCode::FAILURE;
        }
    };

    let context = Arc::new(ServerContext::new(
        ServerInfo::new(cfg.server.name.clone(), cfg.server.version.clone()),
        registry,
        ItemStore::new(cfg.store.max_items),
    ));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(http::serve(&cfg.server, context)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
