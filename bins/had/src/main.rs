//! had - keeps a routing daemon's view of interfaces and addresses in sync
//! with the kernel.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use kroute::{InterfaceTable, KernelConfig, KernelSync, Notification};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "had", version, about = "Kernel interface synchronizer for routing daemons")]
struct Cli {
    /// YAML configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Netlink receive buffer size in bytes (0 keeps the kernel default).
    #[arg(short = 's', long = "nl-bufsize", value_name = "BYTES")]
    nl_bufsize: Option<u32>,

    /// Don't dump or listen for IPv6 state.
    #[arg(long)]
    no_ipv6: bool,

    /// Only count an interface as up while it has carrier.
    #[arg(long)]
    link_detect: bool,

    /// Seconds to wait for each kernel reply (0 waits forever).
    #[arg(long, value_name = "SECS")]
    command_timeout: Option<u64>,

    /// Print the interface table after startup and exit.
    #[arg(
        long,
        value_enum,
        value_name = "FORMAT",
        num_args = 0..=1,
        default_missing_value = "yaml"
    )]
    dump: Option<DumpFormat>,

    /// Print notifications as JSON lines.
    #[arg(short = 'j', long)]
    json: bool,

    /// Log filter such as "debug" or "kroute=trace" (overrides RUST_LOG).
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum DumpFormat {
    Yaml,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let config = kernel_config(&cli)?;
    tracing::debug!(?config, "effective configuration");

    let (tx, rx) = mpsc::unbounded_channel();
    let mut sync = KernelSync::open(&config, tx).context("opening netlink sockets")?;
    sync.bootstrap().await.context("loading interface snapshot")?;

    if let Some(format) = cli.dump {
        print!("{}", render(sync.table(), format)?);
        return Ok(());
    }

    let printer = tokio::spawn(print_notifications(rx, cli.json));

    tokio::select! {
        result = sync.run() => result.context("event socket failed")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    // Closes the notification channel.
    drop(sync);
    printer.await?;
    Ok(())
}

fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// File settings, then command-line overrides.
fn kernel_config(cli: &Cli) -> anyhow::Result<KernelConfig> {
    let mut config = match &cli.config {
        Some(path) => KernelConfig::load(path)?,
        None => KernelConfig::default(),
    };
    if let Some(size) = cli.nl_bufsize {
        config.recv_buffer_size = size;
    }
    if cli.no_ipv6 {
        config.ipv6 = false;
    }
    if cli.link_detect {
        config.link_detect = true;
    }
    if let Some(secs) = cli.command_timeout {
        config.command_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    Ok(config)
}

fn render(table: &InterfaceTable, format: DumpFormat) -> anyhow::Result<String> {
    Ok(match format {
        DumpFormat::Yaml => serde_yaml::to_string(table)?,
        DumpFormat::Json => serde_json::to_string_pretty(table)? + "\n",
    })
}

async fn print_notifications(rx: UnboundedReceiver<Notification>, json: bool) {
    let mut stream = UnboundedReceiverStream::new(rx);
    while let Some(event) = stream.next().await {
        if !json {
            println!("{}", event);
            continue;
        }
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!(event = event.name(), error = %e, "can't encode notification"),
        }
    }
}
