use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use sigprobe::config::{DEFAULT_CLOSE_TIMEOUT_MS, DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_LINGER_MS};
use sigprobe::{Config, ConsoleReporter, Registry, TestRunner, Timeouts};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8888;

#[derive(Parser, Debug)]
#[command(name = "sigprobe", version)]
#[command(about = "Verify that a WebSocket signalling server accepts streamer, player and SFU clients")]
struct Cli {
    /// TOML registry file with [[connection]] tables
    #[arg(short, long, env = "SIGPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Retarget every endpoint to this host
    #[arg(long)]
    host: Option<String>,

    /// Retarget every endpoint to this port
    #[arg(long)]
    port: Option<u16>,

    /// Time to wait for the opening handshake before giving up
    #[arg(long, default_value_t = DEFAULT_HANDSHAKE_TIMEOUT_MS)]
    handshake_timeout_ms: u64,

    /// Time to keep each connection open before closing it
    #[arg(long, default_value_t = DEFAULT_LINGER_MS)]
    linger_ms: u64,

    /// Time to wait for the server's close frame
    #[arg(long, default_value_t = DEFAULT_CLOSE_TIMEOUT_MS)]
    close_timeout_ms: u64,

    /// Exit with status 1 unless every connection succeeded
    #[arg(long)]
    fail_on_error: bool,
}

impl Cli {
    fn registry(&self) -> Result<Registry> {
        let registry = match &self.config {
            Some(path) => Registry::load(path)
                .with_context(|| format!("loading registry from {}", path.display()))?,
            None => Registry::default(),
        };

        if self.host.is_none() && self.port.is_none() {
            return Ok(registry);
        }
        let host = self.host.as_deref().unwrap_or(DEFAULT_HOST);
        let port = self.port.unwrap_or(DEFAULT_PORT);
        registry
            .with_host(host, port)
            .with_context(|| format!("retargeting registry to {host}:{port}"))
    }

    fn probe_config(&self) -> Config {
        Config::default().with_timeouts(Timeouts::new(
            Duration::from_millis(self.handshake_timeout_ms),
            Duration::from_millis(self.linger_ms),
            Duration::from_millis(self.close_timeout_ms),
        ))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let registry = cli.registry()?;
    let runner = TestRunner::new(cli.probe_config(), Arc::new(ConsoleReporter::stdout()));
    let report = runner.run(&registry).await;

    tracing::info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        timed_out = report.timed_out(),
        "run finished"
    );

    if cli.fail_on_error && !report.all_succeeded() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
