use anyhow::{Context, Result};
use battery_history::history::collector::{
    run_level_watcher, run_periodic_ticks, run_send_requests,
};
use battery_history::history::relay::{
    channel_link, pump_datagrams, pump_link, Receiver, Sender, UdpLink,
};
use battery_history::history::source::{FixedBatterySource, SysfsBatterySource};
use battery_history::history::{
    BatterySource, HistoryContext, KvStore, MonotonicClock, QueryService, RecordingPolicy,
    RelayRole, Role, SqliteKvStore, TriggerBus,
};
use battery_history::rpc::proto::{self, notification::NotificationType};
use battery_history::rpc::RpcNotifier;
use battery_history::Config;
use clap::{Parser, Subcommand};
use prost::Message;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Battery history recorder.
#[derive(Parser, Debug)]
#[command(name = "battery-history", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record battery history until interrupted.
    Run,
    /// Print the persisted history.
    Show {
        /// Print at most this many entries (oldest first).
        #[arg(long)]
        limit: Option<usize>,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Erase the persisted history.
    Clear,
    /// Print the effective configuration.
    Config {
        /// Print the JSON Schema instead.
        #[arg(long)]
        schema: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Show { limit, json } => show(&config, limit, json),
        Command::Clear => clear(&config),
        Command::Config { schema } => {
            if schema {
                println!("{}", Config::json_schema()?);
            } else {
                print!("{}", config.to_toml()?);
            }
            Ok(())
        }
    }
}

fn open_context(config: &Config) -> Result<Arc<HistoryContext>> {
    let store: Arc<dyn KvStore> = Arc::new(SqliteKvStore::open(&config.db_dir())?);
    let ctx = HistoryContext::init(
        config.history.max_entries,
        &config.history.namespace,
        store,
    )
    .context("initializing battery history")?;
    Ok(Arc::new(ctx))
}

fn battery_source(config: &Config) -> Arc<dyn BatterySource> {
    match config.telemetry.fixed_level {
        Some(level) => Arc::new(FixedBatterySource::new(level)),
        None => Arc::new(SysfsBatterySource::new(config.sysfs_path())),
    }
}

async fn run(config: Config) -> Result<()> {
    let ctx = open_context(&config)?;
    tracing::info!("battery history storage: {}", ctx.load_status());
    let source = battery_source(&config);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut aggregator: Option<Arc<Receiver>> = None;

    let relay: Arc<dyn RelayRole> = match config.relay.role {
        Role::Reporting => match config.peer_addr()? {
            Some(peer) => {
                let link = UdpLink::connect(peer)
                    .await
                    .with_context(|| format!("opening relay link to {peer}"))?;
                Arc::new(Sender::new(Arc::new(link)))
            }
            None => {
                // No peer: the aggregating side runs in-process and its
                // notifications go to the log.
                let (link, frames) = channel_link();
                let notifier = spawn_notification_log(&mut tasks);
                let receiver = Arc::new(Receiver::new(Arc::new(notifier)));
                aggregator = Some(receiver.clone());
                tasks.push(tokio::spawn(async move {
                    pump_link(receiver, frames).await;
                }));
                Arc::new(Sender::new(Arc::new(link)))
            }
        },
        Role::Aggregating => {
            let listen = config.listen_addr()?;
            let socket = UdpSocket::bind(listen)
                .await
                .with_context(|| format!("binding relay link on {listen}"))?;
            tracing::info!("relay link listening on {listen}");
            let notifier = spawn_notification_log(&mut tasks);
            let receiver = Arc::new(Receiver::new(Arc::new(notifier)));
            aggregator = Some(receiver.clone());
            tasks.push(tokio::spawn(pump_datagrams(receiver.clone(), socket)));
            receiver
        }
    };

    let policy = Arc::new(RecordingPolicy::new(
        ctx.clone(),
        source.clone(),
        Arc::new(MonotonicClock::new()),
        relay,
        config.history.change_threshold,
    ));
    let bus = Arc::new(TriggerBus::new());
    bus.register(policy.clone());

    if config.relay.role == Role::Reporting {
        let (requests, pending) = mpsc::unbounded_channel();
        tasks.push(tokio::spawn(async move {
            run_send_requests(policy, pending).await;
        }));
        tasks.push(spawn_send_request_signal(requests)?);
    }

    tasks.push(tokio::spawn(run_periodic_ticks(
        bus.clone(),
        config.save_interval(),
    )));
    tasks.push(tokio::spawn(run_level_watcher(
        source,
        bus,
        config.poll_interval(),
    )));

    tracing::info!(
        "battery history service initialized (role: {:?}, interval: {} min, max entries: {})",
        config.relay.role,
        config.history.save_interval_minutes,
        config.history.max_entries
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutting down battery history service");

    for task in &tasks {
        task.abort();
    }
    if let Some(receiver) = aggregator {
        tracing::info!(
            "forwarded {} relayed battery history entries",
            receiver.forwarded()
        );
    }
    ctx.teardown()
        .context("saving battery history on shutdown")?;
    Ok(())
}

/// Notification sink whose output is decoded and logged by a spawned task.
fn spawn_notification_log(tasks: &mut Vec<JoinHandle<()>>) -> RpcNotifier {
    let (notifier, notifications) = RpcNotifier::channel();
    tasks.push(tokio::spawn(log_notifications(notifications)));
    notifier
}

/// SIGUSR1 asks the reporting device to re-send its whole history.
#[cfg(unix)]
fn spawn_send_request_signal(requests: mpsc::UnboundedSender<()>) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 =
        signal(SignalKind::user_defined1()).context("installing SIGUSR1 handler")?;
    Ok(tokio::spawn(async move {
        while usr1.recv().await.is_some() {
            tracing::info!("battery history send requested");
            if requests.send(()).is_err() {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_send_request_signal(requests: mpsc::UnboundedSender<()>) -> Result<JoinHandle<()>> {
    // No request source here; keep the channel open so the server stays idle.
    Ok(tokio::spawn(async move {
        requests.closed().await;
    }))
}

async fn log_notifications(mut notifications: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(bytes) = notifications.recv().await {
        match proto::Notification::decode(bytes.as_slice()) {
            Ok(proto::Notification {
                notification_type: Some(NotificationType::BatteryHistoryEntry(entry)),
            }) => tracing::info!(
                "battery history notification {}/{}: {}% at {}s{}",
                entry.entry_index,
                entry.total_entries,
                entry.battery_level,
                entry.timestamp,
                if entry.is_last { " (last)" } else { "" }
            ),
            Ok(_) => tracing::warn!("empty battery history notification"),
            Err(e) => tracing::warn!("undecodable battery history notification: {e}"),
        }
    }
}

fn show(config: &Config, limit: Option<usize>, json: bool) -> Result<()> {
    let ctx = open_context(config)?;
    let load_status = ctx.load_status().clone();
    let query = QueryService::new(ctx, battery_source(config));
    let entries = query.get_entries(limit.unwrap_or_else(|| query.capacity()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!(
        "{} of {} entries (capacity {}; storage: {})",
        entries.len(),
        query.get_count(),
        query.capacity(),
        load_status
    );
    for entry in &entries {
        println!("{:>10}s  {:>3}%", entry.timestamp, entry.level);
    }
    Ok(())
}

fn clear(config: &Config) -> Result<()> {
    let ctx = open_context(config)?;
    let query = QueryService::new(ctx, battery_source(config));
    let removed = query.get_count();
    query.clear().context("clearing battery history")?;
    println!("cleared {removed} battery history entries");
    Ok(())
}
