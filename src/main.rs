//! pipeline-dispatch
//!
//! Drives a simulated connection through a list of requests and prints every
//! connection event as a JSON line on stdout. Logs go to stderr.
//!
//! ```text
//! pipeline-dispatch --origin https://api.example.com --pipelining 2 \
//!     -r a.example.com -r a.example.com -r b.example.com
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pipeline_dispatch::config::{load_config, validate_config, ConfigError, DispatchConfig};
use pipeline_dispatch::dispatch::{ConnectionEvent, DispatchError, Request};
use pipeline_dispatch::net::{self, Spawned};
use pipeline_dispatch::observability::logging::init_logging;
use pipeline_dispatch::sim::SimManager;

#[derive(Parser)]
#[command(name = "pipeline-dispatch")]
#[command(about = "Drive a simulated HTTP/1.1 connection through a request queue", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override connection.origin.
    #[arg(long)]
    origin: Option<String>,

    /// Override connection.pipelining.
    #[arg(long)]
    pipelining: Option<usize>,

    /// Servername for each request, in order. `-` sends without a servername.
    #[arg(short, long = "request", value_name = "SERVERNAME")]
    requests: Vec<String>,

    /// Number of requests to send when no --request is given.
    #[arg(short = 'n', long, default_value_t = 3)]
    count: usize,

    /// Positions (0-based) of requests to abort before they are enqueued.
    #[arg(long)]
    abort: Vec<usize>,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DispatchConfig::default(),
    };
    if let Some(origin) = &cli.origin {
        config.connection.origin = origin.clone();
    }
    if let Some(pipelining) = cli.pipelining {
        config.connection.pipelining = pipelining;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability);
    tracing::info!(
        origin = %config.connection.origin,
        pipelining = config.connection.pipelining,
        "Configuration loaded"
    );

    let settings = config.simulation.clone();
    let Spawned {
        handle,
        mut events,
        task,
    } = net::spawn_from_config(&config.connection, |handle| SimManager::new(handle, settings))?;

    let servernames: Vec<Option<String>> = if cli.requests.is_empty() {
        vec![None; cli.count]
    } else {
        cli.requests
            .iter()
            .map(|name| (name != "-").then(|| name.clone()))
            .collect()
    };

    let host = config.connection.origin()?.host().unwrap_or("localhost").to_string();
    for (index, servername) in servernames.iter().enumerate() {
        let payload = format!("GET /{index} HTTP/1.1\r\nhost: {host}\r\n\r\n");
        let mut request = Request::new(payload);
        if let Some(name) = servername {
            request = request.with_servername(name.clone());
        }
        if cli.abort.contains(&index) {
            request.abort_handle().abort();
        }
        handle.enqueue(request).await?;
    }

    let expected = servernames.len();
    let mut finished = 0;
    let run = async {
        while finished < expected {
            let Some(event) = events.recv().await else {
                break;
            };
            if matches!(
                event,
                ConnectionEvent::Completed { .. }
                    | ConnectionEvent::Failed { .. }
                    | ConnectionEvent::Dropped { .. }
            ) {
                finished += 1;
            }
            println!("{}", serde_json::to_string(&event)?);
        }
        Ok::<_, serde_json::Error>(())
    };

    match tokio::time::timeout(Duration::from_secs(cli.timeout_secs), run).await {
        Ok(printed) => {
            printed?;
            handle.close().await?;
        }
        Err(_) => {
            tracing::error!(expected, "Timed out waiting for requests to finish");
            handle.destroy(DispatchError::Destroyed)?;
        }
    }
    while let Some(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
