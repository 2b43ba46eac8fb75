use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use gpustat_hub::{
    actors::{hub::HubHandle, poller::PollerHandle},
    api::{ApiState, spawn_api_server},
    config::{Config, HostConfig, read_config_file},
    executor::SshExecutor,
    render::RenderCache,
    store::AggregateStore,
};
use tracing::{debug, error, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "gpustat-hub", about = "Aggregated live GPU status for a fleet of hosts")]
struct Args {
    /// Hosts to poll. Syntax: [USER@]HOSTNAME[:PORT]
    hosts: Vec<String>,

    /// JSON config file (replaces the positional host list)
    #[arg(short, long)]
    file: Option<String>,

    /// Web application port
    #[arg(long, default_value_t = 48109)]
    port: u16,

    /// Default SSH port
    #[arg(long, default_value_t = 22)]
    ssh_port: u16,

    /// Polling interval in seconds
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Per-call execution timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Capacity of each viewer's outbound queue
    #[arg(long, default_value_t = 8)]
    queue_capacity: usize,

    /// Skip SSH host key verification
    #[arg(long)]
    no_verify_host: bool,

    /// Custom command for specific hosts, format: 'HOST:CMD'
    #[arg(long = "exec")]
    exec: Vec<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("gpustat_hub", LevelFilter::DEBUG),
        ("hub", LevelFilter::DEBUG),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}

/// Build the effective configuration from a config file or the CLI surface.
fn build_config(args: &Args) -> anyhow::Result<Config> {
    if let Some(path) = &args.file {
        return read_config_file(path);
    }

    if args.hosts.is_empty() {
        anyhow::bail!("no hosts given; pass [USER@]HOSTNAME[:PORT] arguments or --file");
    }

    let mut hosts = args
        .hosts
        .iter()
        .map(|netloc| HostConfig::parse(netloc, args.ssh_port))
        .collect::<anyhow::Result<Vec<_>>>()?;

    for entry in &args.exec {
        let Some((host, command)) = entry.split_once(':') else {
            anyhow::bail!("invalid --exec entry {entry:?}, expected 'HOST:CMD'");
        };
        let Some(config) = hosts.iter_mut().find(|h| h.hostname == host) else {
            anyhow::bail!("--exec for unknown host {host:?}");
        };
        config.command = command.trim().to_string();
    }

    Ok(Config {
        hosts,
        interval_secs: args.interval,
        timeout_secs: args.timeout,
        queue_capacity: args.queue_capacity,
        verify_host: !args.no_verify_host,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = build_config(&args)?;
    debug!(
        hosts = config.hosts.len(),
        interval = config.interval_secs,
        "configuration loaded"
    );

    let store = Arc::new(AggregateStore::new(
        config.hosts.iter().map(|h| h.label().to_string()),
    ));
    let cache = Arc::new(RenderCache::new());

    let mut pollers = Vec::new();
    for host in &config.hosts {
        let executor = Arc::new(SshExecutor::new(
            host.clone(),
            config.timeout(),
            config.verify_host,
        ));
        pollers.push(PollerHandle::spawn(
            host.label().to_string(),
            executor,
            store.clone(),
            config.interval(),
        ));
    }

    // Kick off a first poll right away so viewers do not stare at
    // "Loading ..." for a whole interval.
    for poller in &pollers {
        let poller = poller.clone();
        tokio::spawn(async move {
            let _ = poller.poll_now().await;
        });
    }

    let hub = HubHandle::spawn(store.clone(), cache.clone(), config.queue_capacity);

    let bind_addr: SocketAddr = ([0, 0, 0, 0], args.port).into();
    spawn_api_server(bind_addr, ApiState::new(store, cache, hub.clone())).await?;

    tokio::signal::ctrl_c().await?;
    debug!("shutting down");

    for poller in &pollers {
        if let Err(e) = poller.shutdown().await {
            error!("failed to stop poller for {}: {e:#}", poller.host);
        }
    }
    if let Err(e) = hub.shutdown().await {
        error!("failed to stop hub: {e:#}");
    }

    Ok(())
}
