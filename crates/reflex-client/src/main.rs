//! Demo binary: a scripted session against a simulated server.
//!
//! Joins, sends some traffic, plays a few predicted actions, then loses the
//! connection and lets recovery bring it back through two refused connects.
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p reflex-client --bin reflex-demo -- --max-attempts 2`
//! to watch recovery give up instead.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use reflex_client::{
    ClientError, EventChannel, LoggingSink, LoopContext, MainEvent, MainLoop, SimulatedTransport,
};
use reflex_config::{CliArgs, Config, default_config_dir};
use reflex_net::{
    Endpoint, EpisodeId, MessageCategory, OutboundMessage, RecoveryEvent, SystemClock,
};
use reflex_prediction::{ActionKind, BlockPos, EntityKind, EntityRef, LocalAction, ServerEvent};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::info;

type DemoContext = LoopContext<SimulatedTransport, SystemClock, LoggingSink>;

/// Connects the simulated server refuses before accepting one.
const REFUSED_CONNECTS: u32 = 2;

/// How long the script waits for recovery to finish.
const RECOVERY_DEADLINE: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("reflex-demo: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<(), ClientError> {
    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .ok_or(ClientError::NoConfigDir)?;

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    reflex_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let endpoint = Endpoint::parse(&config.network.server_address, config.network.server_port)?;
    info!(%endpoint, config_dir = %config_dir.display(), "Starting demo session");

    let channel = EventChannel::new();
    let tx = channel.sender();
    let transport = SimulatedTransport::new(REFUSED_CONNECTS, channel.sender());
    let link = transport.link();
    let sink = LoggingSink::default();

    let mut main_loop = MainLoop::new(config, transport, SystemClock, sink.clone(), channel)?;
    main_loop.context_mut().set_endpoint(endpoint);
    let events = main_loop.context_mut().recovery_events();

    let (ctx, outcome) = tokio::join!(main_loop.run(), play_session(tx, link, events));
    report(&ctx, &sink);
    outcome
}

async fn play_session(
    tx: UnboundedSender<MainEvent>,
    link: Arc<AtomicBool>,
    mut events: UnboundedReceiver<RecoveryEvent>,
) -> Result<(), ClientError> {
    let outcome = script(&tx, &link, &mut events).await;
    post(&tx, MainEvent::Shutdown);
    outcome
}

async fn script(
    tx: &UnboundedSender<MainEvent>,
    link: &AtomicBool,
    events: &mut UnboundedReceiver<RecoveryEvent>,
) -> Result<(), ClientError> {
    // Initial join
    link.store(true, Ordering::SeqCst);
    post(tx, MainEvent::Connected);
    for ms in [35, 42, 38, 51, 40] {
        post(tx, MainEvent::PacketReceived);
        post(tx, MainEvent::RoundTrip(ms));
    }

    // A burst of mixed traffic
    for category in [
        MessageCategory::Chat,
        MessageCategory::Movement,
        MessageCategory::Inventory,
        MessageCategory::Attack,
        MessageCategory::KeepAlive,
    ] {
        post(tx, MainEvent::Submit(OutboundMessage::new(category, vec![0; 16])));
    }

    // Predictions: confirmed, confirmed by explosion, rolled back, unanswered
    let crystal = EntityRef::new(101, EntityKind::EndCrystal);
    post(tx, MainEvent::Action(LocalAction::on_entity(ActionKind::CrystalBreak, crystal)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    post(tx, MainEvent::Server(ServerEvent::EntityDestroyed { entity: crystal }));

    let bed = BlockPos::new(10, 64, -3);
    post(tx, MainEvent::Action(LocalAction::at_block(ActionKind::BedUse, bed)));
    post(tx, MainEvent::Server(ServerEvent::Explosion { origin: bed }));

    let stubborn = EntityRef::new(102, EntityKind::EndCrystal);
    post(tx, MainEvent::Action(LocalAction::on_entity(ActionKind::CrystalBreak, stubborn)));
    post(tx, MainEvent::Server(ServerEvent::EntityStatus { entity: stubborn }));

    let anchor = BlockPos::new(0, 70, 0);
    post(tx, MainEvent::Action(LocalAction::at_block(ActionKind::AnchorUse, anchor)));
    tokio::time::sleep(Duration::from_millis(600)).await;

    // The socket dies
    link.store(false, Ordering::SeqCst);
    post(tx, MainEvent::Disconnected(Some("Connection reset by peer".to_string())));

    let episode = match tokio::time::timeout(RECOVERY_DEADLINE, wait_for_recovery(events)).await {
        Ok(result) => result.map_err(ClientError::NotRecovered)?,
        Err(_) => {
            return Err(ClientError::NotRecovered(
                "timed out waiting for reconnect".to_string(),
            ));
        }
    };
    info!(%episode, "Session recovered");

    post(tx, MainEvent::PacketReceived);
    post(tx, MainEvent::RoundTrip(44));
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

async fn wait_for_recovery(
    events: &mut UnboundedReceiver<RecoveryEvent>,
) -> Result<EpisodeId, String> {
    while let Some(event) = events.recv().await {
        match event {
            RecoveryEvent::Reconnected { episode } => return Ok(episode),
            RecoveryEvent::MaxAttemptsReached { episode } => {
                return Err(format!("{episode} ran out of attempts"));
            }
            RecoveryEvent::NoEndpoint { episode } => {
                return Err(format!("{episode} had no endpoint"));
            }
            RecoveryEvent::NonRecoverable { reason } => return Err(reason),
            RecoveryEvent::Disabled => return Err("recovery is disabled".to_string()),
            RecoveryEvent::Cancelled { .. } => return Err("cancelled".to_string()),
            other => info!(event = ?other, "Recovery progress"),
        }
    }
    Err("recovery event stream closed".to_string())
}

fn post(tx: &UnboundedSender<MainEvent>, event: MainEvent) {
    if let Err(err) = tx.send(event) {
        tracing::debug!(event = ?err.0, "Main loop closed, dropping event");
    }
}

fn report(ctx: &DemoContext, sink: &LoggingSink) {
    info!(state = %ctx.current_state(), "Final recovery state");

    let health = ctx.health_snapshot();
    info!(
        current_ms = ?health.current_ms,
        average_ms = ?health.average_ms,
        jitter_ms = ?health.jitter_ms,
        trend = ?health.trend,
        samples = health.sample_count,
        "Connection health"
    );

    let stats = ctx.dispatch_stats();
    info!(
        queued = stats.queued,
        sent_direct = stats.sent_direct,
        written = stats.written,
        failed = stats.failed,
        flushes = sink.flushes(),
        "Dispatch"
    );

    for (kind, stats) in ctx.telemetry_snapshot() {
        info!(
            %kind,
            predictions = stats.predictions,
            successes = stats.successes,
            rollbacks = stats.rollbacks,
            expired = stats.expired,
            success_pct = stats.success_rate().round(),
            "Prediction telemetry"
        );
    }
}
