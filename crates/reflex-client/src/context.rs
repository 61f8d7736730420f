//! The single owner of all reliability and prediction state.
//!
//! Every host callback lands on a [`ReflexContext`] method. Nothing here is
//! shared across threads; the main loop serializes access.

use std::error::Error;

use reflex_config::Config;
use reflex_net::{
    Clock, ConnectionRecoveryController, DispatchError, DispatchStats, Endpoint, HealthMonitor,
    HealthSnapshot, MessageSink, OutboundMessage, PriorityDispatchQueue, PriorityPolicy,
    RecoveryAttempt, RecoveryEvent, RecoveryState, Scheduler, Submission, TimerToken, Transport,
};
use reflex_prediction::{
    LocalAction, PredictionEngine, PredictionKey, ServerEvent, TelemetrySnapshot,
};
use tokio::sync::{mpsc, watch};

/// Reason fed to the recovery controller when the idle watchdog fires.
pub const READ_TIMEOUT_REASON: &str = "Read timed out";

/// Recovery controller, dispatch queue, prediction engine and health monitor
/// for one client session.
pub struct ReflexContext<T, S, C, K>
where
    K: MessageSink<OutboundMessage>,
{
    config: Config,
    clock: C,
    recovery: ConnectionRecoveryController<T, S, C>,
    dispatch: PriorityDispatchQueue<OutboundMessage, PriorityPolicy, K>,
    prediction: PredictionEngine,
    health: HealthMonitor,
}

impl<T, S, C, K> ReflexContext<T, S, C, K>
where
    T: Transport,
    S: Scheduler,
    C: Clock + Clone,
    K: MessageSink<OutboundMessage>,
{
    /// Wire up all components from `config`.
    pub fn new(config: Config, transport: T, scheduler: S, clock: C, sink: K) -> Self {
        let config = config.normalized();
        let recovery = ConnectionRecoveryController::new(
            config.recovery.clone(),
            transport,
            scheduler,
            clock.clone(),
        );
        let dispatch =
            PriorityDispatchQueue::new(PriorityPolicy::new(config.priority.clone()), sink);
        let prediction = PredictionEngine::with_default_modules(&config.prediction);
        let health = HealthMonitor::new(&config.monitor);

        tracing::info!(
            recovery = config.recovery.enabled,
            priority = config.priority.enabled,
            prediction = ?config.prediction.mode,
            "Reflex context ready"
        );

        Self {
            config,
            clock,
            recovery,
            dispatch,
            prediction,
            health,
        }
    }

    /// Replace the recovery controller's jitter source with a seeded one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.recovery = self.recovery.with_seed(seed);
        self
    }

    // -- Connection lifecycle ------------------------------------------------

    /// Remember the server to reconnect to.
    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        tracing::debug!(%endpoint, "Server endpoint set");
        self.recovery.set_endpoint(endpoint);
    }

    /// The connection is up, either first join or a successful reconnect.
    pub fn report_connected(&mut self) {
        self.recovery.report_connected();
        self.recovery.start_monitoring();
        self.health.mark_connected(self.clock.now());
    }

    /// A connect started by the recovery controller has failed.
    pub fn report_connect_failed(&mut self, reason: &str) {
        self.recovery.report_connect_failed(reason);
    }

    /// The connection dropped. Pending predictions refer to a world we no
    /// longer see, so they are discarded.
    pub fn report_disconnected(&mut self, reason: Option<&str>) {
        self.prediction.clear_all();
        self.recovery.report_recoverable_error(reason);
    }

    /// A connection failure reported as text, e.g. a kick message.
    pub fn report_recoverable_error(&mut self, reason: Option<&str>) {
        self.recovery.report_recoverable_error(reason);
    }

    /// A connection failure reported as an error value.
    pub fn report_exception(&mut self, err: &(dyn Error + 'static)) {
        self.recovery.report_exception(err);
    }

    /// Deliver a fired recovery timer.
    pub fn on_timer(&mut self, token: TimerToken) {
        self.recovery.on_timer(token);
    }

    /// User asked to stop reconnecting.
    pub fn cancel_recovery(&mut self) {
        self.recovery.cancel();
    }

    // -- Health --------------------------------------------------------------

    /// One inbound packet arrived.
    pub fn report_packet_received(&mut self) {
        self.health.report_packet_received(self.clock.now());
    }

    /// One round-trip measurement in milliseconds.
    pub fn report_round_trip_sample(&mut self, ms: i64) {
        self.health.report_round_trip_sample(ms);
    }

    // -- Outbound ------------------------------------------------------------

    /// Queue an outbound message by priority.
    pub fn submit(&self, message: OutboundMessage) -> Submission {
        self.dispatch.submit(message)
    }

    /// The connection can accept writes again.
    pub fn on_writable(&self) -> Result<usize, DispatchError> {
        self.dispatch.on_writable()
    }

    // -- Prediction ----------------------------------------------------------

    /// The local player did something that may destroy an object.
    pub fn on_local_action(&mut self, action: &LocalAction) {
        self.prediction.on_local_action(action, self.clock.now());
    }

    /// The server said something about the world.
    pub fn on_server_event(&mut self, event: &ServerEvent) {
        self.prediction.on_server_event(event);
    }

    // -- Periodic ------------------------------------------------------------

    /// Per-tick housekeeping.
    ///
    /// Expires stale predictions, marks a live connection stable and runs the
    /// read-timeout watchdog. A connection silent for longer than the read
    /// timeout is dropped and handed to recovery.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        self.prediction.tick(now, &self.config.prediction);

        if !self.recovery.transport().is_connected() {
            return;
        }
        self.recovery.report_stable();

        let read_timeout = self.config.recovery.read_timeout();
        if self.health.check_idle(now, read_timeout) {
            tracing::warn!(?read_timeout, "No packets received, dropping connection");
            self.recovery.transport_mut().disconnect();
            self.report_disconnected(Some(READ_TIMEOUT_REASON));
        }
    }

    /// Apply a reloaded config to every component.
    pub fn apply_config(&mut self, config: Config) {
        let config = config.normalized();
        self.recovery.set_config(config.recovery.clone());
        self.dispatch.classifier_mut().update(&config.priority);
        self.health.update_config(&config.monitor);
        // Prediction modules pick up their settings on the next tick.
        self.config = config;
        tracing::info!("Configuration applied");
    }

    // -- Queries -------------------------------------------------------------

    /// Recovery state.
    pub fn current_state(&self) -> RecoveryState {
        self.recovery.current_state()
    }

    /// Reconnect attempt within the current episode.
    pub fn current_attempt(&self) -> u32 {
        self.recovery.current_attempt()
    }

    /// Episode, attempt count and last stable mark together.
    pub fn attempt_info(&self) -> RecoveryAttempt {
        self.recovery.attempt_info()
    }

    /// Receiver that sees every recovery state change.
    pub fn subscribe_state(&self) -> watch::Receiver<RecoveryState> {
        self.recovery.state_watch().subscribe()
    }

    /// Start receiving recovery events for UI or logging.
    pub fn recovery_events(&mut self) -> mpsc::UnboundedReceiver<RecoveryEvent> {
        self.recovery.event_stream()
    }

    /// Whether `key` is believed destroyed.
    pub fn is_predicted_destroyed(&self, key: impl Into<PredictionKey>) -> bool {
        self.prediction.is_predicted_destroyed(key)
    }

    /// Whether host interaction with `key` should be suppressed.
    pub fn should_suppress_interaction(&self, key: impl Into<PredictionKey>) -> bool {
        self.prediction.should_suppress_interaction(key)
    }

    /// Prediction outcome counters per kind.
    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.prediction.telemetry_snapshot()
    }

    /// Operator reset of the prediction counters.
    pub fn reset_telemetry(&mut self) {
        self.prediction.reset_telemetry();
    }

    /// Ping and packet statistics at the current time.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.health.snapshot(self.clock.now())
    }

    /// Dispatch queue counters.
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatch.stats()
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The transport owned by the recovery controller.
    pub fn transport(&self) -> &T {
        self.recovery.transport()
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        self.recovery.transport_mut()
    }
}
