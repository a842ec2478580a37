//! `courier` binary: loads configuration, wires the event pipeline, sinks,
//! registry, and scheduler together, and serves the HTTP gateway.

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    courier_autoreply::{AutoReplyEngine, MemoryRuleStore, RuleStore},
    courier_bridge::{BridgeClient, BridgeConfig},
    courier_config::CourierConfig,
    courier_events::{EventPipeline, EventSink},
    courier_gateway::{
        GatewayService, GatewayState, RealtimePublisher, realtime::DEFAULT_FEED_CAPACITY, router,
    },
    courier_scheduler::{
        MemoryScheduleStore, ScheduleStore, ScheduledSendWorker, SqliteScheduleStore, WorkerConfig,
    },
    courier_session::{FileCredentialStore, SessionRegistry, SupervisorConfig},
    courier_webhook::{
        DispatcherConfig, MemoryDeliveryLog, MemorySubscriptionStore, SubscriptionStore,
        WebhookDispatcher,
    },
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier — multi-tenant messaging gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (TOML or JSON).
    #[arg(long, global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Provider sidecar WebSocket URL (overrides config value).
    #[arg(long, global = true)]
    bridge_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "courier starting");

    match cli.command {
        None | Some(Commands::Gateway) => {
            let mut config = courier_config::load_or_default(cli.config.as_deref())?;
            if let Some(bind) = cli.bind {
                config.gateway.bind = bind;
            }
            if let Some(url) = cli.bridge_url {
                config.bridge.url = url;
            }
            run_gateway(config).await
        },
    }
}

async fn run_gateway(config: CourierConfig) -> anyhow::Result<()> {
    // Sinks that need nothing else come first: the realtime feed and the
    // webhook dispatcher.
    let realtime = RealtimePublisher::new(DEFAULT_FEED_CAPACITY);

    let subscriptions = MemorySubscriptionStore::new();
    for subscription in config.webhook.subscriptions.clone() {
        subscriptions.insert(subscription).await?;
    }
    let webhook = WebhookDispatcher::new(
        DispatcherConfig {
            request_timeout: Duration::from_secs(config.webhook.request_timeout_secs),
            max_attempts: config.webhook.max_attempts,
            base_delay: Duration::from_secs(config.webhook.base_delay_secs),
            ..DispatcherConfig::default()
        },
        subscriptions,
        MemoryDeliveryLog::new(),
    )?;

    let pipeline = EventPipeline::new(vec![
        Arc::clone(&realtime) as Arc<dyn EventSink>,
        webhook as Arc<dyn EventSink>,
    ]);

    let client = Arc::new(BridgeClient::new(BridgeConfig {
        url: config.bridge.url.clone(),
        command_timeout: Duration::from_secs(config.bridge.command_timeout_secs),
        ..BridgeConfig::default()
    }));
    let credentials = Arc::new(FileCredentialStore::new(&config.session.credentials_dir));
    let registry = SessionRegistry::new(client, credentials, Arc::clone(&pipeline), SupervisorConfig {
        base_delay: config.session.base_delay(),
        max_delay: config.session.max_delay(),
        send_timeout: config.session.send_timeout(),
        connect_timeout: config.session.connect_timeout(),
    });

    // The auto-reply engine replies through the registry, so it can only
    // join the pipeline once the registry exists.
    let rules = MemoryRuleStore::new();
    for (tenant, reply) in config.autoreply.clone() {
        rules.set_config(&tenant, reply).await?;
    }
    let engine = AutoReplyEngine::new(Arc::clone(&registry), rules);
    pipeline.add_sink(engine as Arc<dyn EventSink>);

    let store: Arc<dyn ScheduleStore> = match &config.scheduler.database_url {
        Some(url) => Arc::new(SqliteScheduleStore::new(url).await?),
        None => Arc::new(MemoryScheduleStore::new()),
    };
    let scheduler = ScheduledSendWorker::new(
        WorkerConfig {
            tick_interval: Duration::from_secs(config.scheduler.tick_secs),
        },
        store,
        Arc::clone(&registry),
    );
    scheduler.start().await;

    let state = GatewayState::new(
        Arc::clone(&registry),
        Arc::clone(&pipeline),
        Arc::clone(&scheduler),
        realtime,
    );
    let app = router(GatewayService::new(state));

    let listener = tokio::net::TcpListener::bind(&config.gateway.bind).await?;
    info!(bind = %config.gateway.bind, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    registry.shutdown_all().await;
    info!("courier stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}
