//! Connection recovery state machine.
//!
//! A recoverable failure starts an *episode*: the controller waits a backoff
//! delay (`Recovering`), asks the transport to reconnect (`Reconnecting`),
//! and on failure waits again (`Cooldown`) before the next attempt. The
//! episode ends on success, when the attempt budget is spent, when no
//! endpoint is known, or when the user cancels.
//!
//! All methods run on the single main context. At most one timer is pending
//! at a time; scheduling a new one cancels the previous one, and a fired
//! token that no longer matches the pending timer is dropped.

use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use reflex_config::RecoveryConfig;
use tokio::sync::{mpsc, watch};

use crate::backoff::BackoffPolicy;
use crate::classifier::{ErrorClass, classify, classify_error, describe_error};
use crate::endpoint::Endpoint;
use crate::runtime::{Clock, Scheduler, TimerHandle, TimerToken};
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryState {
    /// Not watching the connection.
    Idle,
    /// Connected and watching for failures.
    Monitoring,
    /// Waiting out the backoff before the first reconnect of an episode.
    Recovering,
    /// A reconnect is in flight.
    Reconnecting,
    /// Waiting out the backoff after a failed reconnect.
    Cooldown,
    /// Recovery is switched off in config.
    Disabled,
    /// The user cancelled recovery.
    StoppedByUser,
}

impl RecoveryState {
    /// Whether an episode is in progress.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Recovering | Self::Reconnecting | Self::Cooldown)
    }
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Monitoring => "monitoring",
            Self::Recovering => "recovering",
            Self::Reconnecting => "reconnecting",
            Self::Cooldown => "cooldown",
            Self::Disabled => "disabled",
            Self::StoppedByUser => "stopped",
        };
        f.write_str(name)
    }
}

/// Observable recovery state backed by a [`watch`] channel.
pub struct RecoveryStateWatch {
    tx: watch::Sender<RecoveryState>,
    rx: watch::Receiver<RecoveryState>,
}

impl Default for RecoveryStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryStateWatch {
    /// Create a watch initialized to [`RecoveryState::Idle`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(RecoveryState::Idle);
        Self { tx, rx }
    }

    fn set(&self, state: RecoveryState) {
        self.tx.send_replace(state);
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<RecoveryState> {
        self.rx.clone()
    }

    /// Current state without blocking.
    pub fn current(&self) -> RecoveryState {
        *self.rx.borrow()
    }
}

/// Identifies one recovery episode. Renders as `AD-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpisodeId(u64);

impl EpisodeId {
    /// Sequence number of the episode, starting at 1.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AD-{}", self.0)
    }
}

/// Snapshot of the retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryAttempt {
    /// Episode in progress, if any.
    pub episode: Option<EpisodeId>,
    /// Attempts used in the current episode.
    pub attempt_count: u32,
    /// Last time the connection was marked stable.
    pub last_stable_at: Option<Instant>,
}

/// Notable steps, published for UI and logging consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryEvent {
    /// Monitoring began.
    MonitoringStarted,
    /// A failure arrived while recovery is switched off.
    Disabled,
    /// The failure is deliberate on the server's part and will not be retried.
    NonRecoverable {
        /// Reason as reported.
        reason: String,
    },
    /// A new episode started.
    Detected {
        /// The new episode.
        episode: EpisodeId,
        /// Reason as reported.
        reason: String,
    },
    /// The first reconnect of an episode is scheduled.
    RecoveryScheduled {
        /// Episode.
        episode: EpisodeId,
        /// Attempt number, 1-based.
        attempt: u32,
        /// Configured attempt budget.
        max_attempts: u32,
        /// Time until the attempt.
        delay: Duration,
    },
    /// A reconnect was started.
    Reconnecting {
        /// Episode.
        episode: EpisodeId,
        /// Attempt number, 1-based.
        attempt: u32,
    },
    /// The connection is back.
    Reconnected {
        /// Episode that ended.
        episode: EpisodeId,
    },
    /// A reconnect failed; another is scheduled.
    ReconnectFailed {
        /// Episode.
        episode: EpisodeId,
        /// Failure text.
        reason: String,
        /// Cooldown before the next attempt.
        next_delay: Duration,
    },
    /// The attempt budget is spent; the controller is idle again.
    MaxAttemptsReached {
        /// Episode that ended.
        episode: EpisodeId,
    },
    /// No endpoint is known, so reconnecting is impossible.
    NoEndpoint {
        /// Episode that ended.
        episode: EpisodeId,
    },
    /// The user cancelled recovery.
    Cancelled {
        /// Episode that was running, if any.
        episode: Option<EpisodeId>,
    },
}

struct PendingTimer {
    token: TimerToken,
    handle: Box<dyn TimerHandle>,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Drives reconnect attempts for one connection.
pub struct ConnectionRecoveryController<T, S, C> {
    config: RecoveryConfig,
    backoff: BackoffPolicy,
    rng: ChaCha8Rng,
    state: RecoveryStateWatch,
    episode: Option<EpisodeId>,
    episodes_started: u64,
    attempt: u32,
    last_stable_at: Option<Instant>,
    endpoint: Option<Endpoint>,
    pending: Option<PendingTimer>,
    generation: u64,
    transport: T,
    scheduler: S,
    clock: C,
    events: Option<mpsc::UnboundedSender<RecoveryEvent>>,
}

impl<T, S, C> ConnectionRecoveryController<T, S, C>
where
    T: Transport,
    S: Scheduler,
    C: Clock,
{
    /// Create an idle controller.
    pub fn new(config: RecoveryConfig, transport: T, scheduler: S, clock: C) -> Self {
        Self {
            backoff: BackoffPolicy::from_config(&config),
            config,
            rng: ChaCha8Rng::from_rng(&mut rand::rng()),
            state: RecoveryStateWatch::new(),
            episode: None,
            episodes_started: 0,
            attempt: 0,
            last_stable_at: None,
            endpoint: None,
            pending: None,
            generation: 0,
            transport,
            scheduler,
            clock,
            events: None,
        }
    }

    /// Use a fixed seed for backoff jitter.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Start publishing [`RecoveryEvent`]s. Replaces any previous stream.
    pub fn event_stream(&mut self) -> mpsc::UnboundedReceiver<RecoveryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    // -- Inputs --------------------------------------------------------------

    /// Begin watching the connection.
    pub fn start_monitoring(&mut self) {
        if !self.config.enabled {
            self.disable();
            return;
        }
        match self.current_state() {
            RecoveryState::Idle | RecoveryState::Disabled | RecoveryState::StoppedByUser => {
                if self.last_stable_at.is_none() {
                    self.last_stable_at = Some(self.clock.now());
                }
                self.transition(RecoveryState::Monitoring);
                self.emit(RecoveryEvent::MonitoringStarted);
            }
            state => tracing::trace!(%state, "start_monitoring ignored"),
        }
    }

    /// Stop watching. Any episode in progress is abandoned silently.
    pub fn stop_monitoring(&mut self) {
        self.cancel_pending();
        self.attempt = 0;
        self.episode = None;
        self.transition(RecoveryState::Idle);
    }

    /// The connection looks healthy. Resets the attempt count once the
    /// stability window has passed since the last mark.
    pub fn report_stable(&mut self) {
        if self.current_state().is_active() {
            return;
        }
        let now = self.clock.now();
        let window = self.config.stable_reset();
        let due = self
            .last_stable_at
            .is_none_or(|last| now.saturating_duration_since(last) > window);
        if due {
            if self.attempt > 0 {
                tracing::debug!(attempt = self.attempt, "Connection stable, resetting attempts");
            }
            self.attempt = 0;
            self.last_stable_at = Some(now);
        }
    }

    /// A connection failure with a free-form reason.
    pub fn report_recoverable_error(&mut self, reason: Option<&str>) {
        let text = reason.unwrap_or_default().to_string();
        match classify(reason) {
            ErrorClass::NonRecoverable => self.reject(text),
            ErrorClass::Recoverable => self.begin_episode(text),
        }
    }

    /// A connection failure carried as an error value.
    pub fn report_exception(&mut self, err: &(dyn Error + 'static)) {
        let text = describe_error(err);
        match classify_error(err) {
            ErrorClass::NonRecoverable => self.reject(text),
            ErrorClass::Recoverable => self.begin_episode(text),
        }
    }

    /// A scheduled timer fired.
    pub fn on_timer(&mut self, token: TimerToken) {
        if self.pending.take_if(|p| p.token == token).is_none() {
            tracing::trace!(generation = token.generation, "Ignoring stale timer");
            return;
        }

        match self.current_state() {
            RecoveryState::Recovering => self.attempt_reconnect(),
            RecoveryState::Reconnecting => {
                let waited = self.config.connect_timeout();
                self.handle_connect_failure(format!("Connect timed out after {waited:?}"));
            }
            RecoveryState::Cooldown => {
                self.attempt += 1;
                if self.attempt > self.config.max_attempts {
                    self.give_up();
                } else {
                    self.attempt_reconnect();
                }
            }
            state => tracing::trace!(%state, "Timer fired outside an episode"),
        }
    }

    /// The transport reports an established connection.
    pub fn report_connected(&mut self) {
        if self.current_state().is_active() {
            self.finish_success();
        } else {
            self.report_stable();
        }
    }

    /// The transport reports that the connect it started has failed.
    pub fn report_connect_failed(&mut self, reason: &str) {
        if self.current_state() == RecoveryState::Reconnecting {
            self.handle_connect_failure(reason.to_string());
        } else {
            tracing::trace!(state = %self.current_state(), "Late connect failure ignored");
        }
    }

    /// User-requested stop. No-op when idle, disabled, or already stopped.
    pub fn cancel(&mut self) {
        if matches!(
            self.current_state(),
            RecoveryState::Idle | RecoveryState::Disabled | RecoveryState::StoppedByUser
        ) {
            return;
        }
        let episode = self.episode.take();
        self.cancel_pending();
        self.attempt = 0;
        self.transition(RecoveryState::StoppedByUser);
        tracing::info!(episode = ?episode.map(|e| e.to_string()), "Recovery cancelled by user");
        self.emit(RecoveryEvent::Cancelled { episode });
    }

    /// Remember where to reconnect to.
    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = Some(endpoint);
    }

    /// Apply a reloaded config. Turning recovery off mid-episode stops it.
    pub fn set_config(&mut self, config: RecoveryConfig) {
        self.backoff = BackoffPolicy::from_config(&config);
        self.config = config;
        if !self.config.enabled && self.current_state().is_active() {
            self.disable();
        }
    }

    // -- Queries -------------------------------------------------------------

    /// Current state.
    pub fn current_state(&self) -> RecoveryState {
        self.state.current()
    }

    /// Attempts used in the current episode.
    pub fn current_attempt(&self) -> u32 {
        self.attempt
    }

    /// Episode in progress, if any.
    pub fn current_episode(&self) -> Option<EpisodeId> {
        self.episode
    }

    /// Retry bookkeeping snapshot.
    pub fn attempt_info(&self) -> RecoveryAttempt {
        RecoveryAttempt {
            episode: self.episode,
            attempt_count: self.attempt,
            last_stable_at: self.last_stable_at,
        }
    }

    /// Observable state cell.
    pub fn state_watch(&self) -> &RecoveryStateWatch {
        &self.state
    }

    /// Last endpoint recorded with [`set_endpoint`](Self::set_endpoint).
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Active config.
    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Whether a follow-up timer is outstanding.
    pub fn has_pending_timer(&self) -> bool {
        self.pending.is_some()
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // -- Internals -----------------------------------------------------------

    fn reject(&mut self, reason: String) {
        tracing::info!(%reason, "Not reconnecting after non-recoverable failure");
        self.emit(RecoveryEvent::NonRecoverable { reason });
    }

    fn disable(&mut self) {
        self.cancel_pending();
        self.episode = None;
        self.transition(RecoveryState::Disabled);
        self.emit(RecoveryEvent::Disabled);
    }

    fn begin_episode(&mut self, reason: String) {
        if self.current_state().is_active() {
            tracing::trace!(%reason, "Recovery already in progress");
            return;
        }
        if !self.config.enabled {
            tracing::debug!(%reason, "Recovery disabled, ignoring failure");
            self.disable();
            return;
        }

        self.episodes_started += 1;
        let episode = EpisodeId(self.episodes_started);
        self.episode = Some(episode);
        self.attempt += 1;
        if self.attempt > self.config.max_attempts {
            self.give_up();
            return;
        }

        tracing::info!(%episode, attempt = self.attempt, %reason, "Connection problem detected");
        self.emit(RecoveryEvent::Detected { episode, reason });
        self.transition(RecoveryState::Recovering);

        let delay = self.next_delay();
        self.schedule(delay);
        self.emit(RecoveryEvent::RecoveryScheduled {
            episode,
            attempt: self.attempt,
            max_attempts: self.config.max_attempts,
            delay,
        });
    }

    fn attempt_reconnect(&mut self) {
        let episode = self.active_episode();
        self.transition(RecoveryState::Reconnecting);
        self.emit(RecoveryEvent::Reconnecting {
            episode,
            attempt: self.attempt,
        });

        if self.transport.is_connected() {
            self.finish_success();
            return;
        }

        let Some(endpoint) = self.endpoint.clone() else {
            tracing::warn!(%episode, "No server endpoint known, cannot reconnect");
            self.episode = None;
            self.transition(RecoveryState::Idle);
            self.emit(RecoveryEvent::NoEndpoint { episode });
            return;
        };

        tracing::info!(
            %episode,
            attempt = self.attempt,
            max = self.config.max_attempts,
            %endpoint,
            "Reconnecting"
        );
        match self.transport.connect(&endpoint) {
            // The answer arrives later; fail the attempt if it never does.
            Ok(()) => self.schedule(self.config.connect_timeout()),
            Err(err) => self.handle_connect_failure(err.to_string()),
        }
    }

    fn handle_connect_failure(&mut self, reason: String) {
        let episode = self.active_episode();
        let next_delay = self.next_delay();
        tracing::warn!(%episode, attempt = self.attempt, %reason, ?next_delay, "Reconnect failed");
        self.transition(RecoveryState::Cooldown);
        self.schedule(next_delay);
        self.emit(RecoveryEvent::ReconnectFailed {
            episode,
            reason,
            next_delay,
        });
    }

    fn finish_success(&mut self) {
        let episode = self.active_episode();
        self.cancel_pending();
        self.attempt = 0;
        self.episode = None;
        self.last_stable_at = Some(self.clock.now());
        self.transition(RecoveryState::Idle);
        tracing::info!(%episode, "Reconnected");
        self.emit(RecoveryEvent::Reconnected { episode });
    }

    fn give_up(&mut self) {
        let episode = self.active_episode();
        tracing::warn!(%episode, max = self.config.max_attempts, "Maximum reconnect attempts reached");
        self.cancel_pending();
        self.attempt = 0;
        self.episode = None;
        self.transition(RecoveryState::Idle);
        self.emit(RecoveryEvent::MaxAttemptsReached { episode });
    }

    fn active_episode(&self) -> EpisodeId {
        self.episode.unwrap_or(EpisodeId(self.episodes_started))
    }

    fn next_delay(&mut self) -> Duration {
        self.backoff.delay(self.attempt, &mut self.rng)
    }

    fn schedule(&mut self, delay: Duration) {
        self.cancel_pending();
        self.generation += 1;
        let token = TimerToken {
            generation: self.generation,
        };
        let handle = self.scheduler.after(delay, token);
        self.pending = Some(PendingTimer { token, handle });
    }

    fn cancel_pending(&mut self) {
        if let Some(mut pending) = self.pending.take() {
            pending.handle.cancel();
        }
    }

    fn transition(&mut self, next: RecoveryState) {
        let prev = self.state.current();
        if prev != next {
            tracing::debug!("{prev} -> {next}");
            self.state.set(next);
        }
    }

    fn emit(&self, event: RecoveryEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ManualClock, ManualScheduler};
    use crate::transport::TransportError;
    use std::io;

    #[derive(Default)]
    struct FakeTransport {
        connected: bool,
        fail_connects: bool,
        attempts: Vec<Endpoint>,
    }

    impl Transport for FakeTransport {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
            self.attempts.push(endpoint.clone());
            if self.fail_connects {
                Err(TransportError::Refused(endpoint.to_string()))
            } else {
                Ok(())
            }
        }
    }

    type Ctl = ConnectionRecoveryController<FakeTransport, ManualScheduler, ManualClock>;

    struct Harness {
        ctl: Ctl,
        scheduler: ManualScheduler,
        clock: ManualClock,
        events: mpsc::UnboundedReceiver<RecoveryEvent>,
    }

    impl Harness {
        fn new(config: RecoveryConfig) -> Self {
            let clock = ManualClock::default();
            let scheduler = ManualScheduler::new(clock.clone());
            let mut ctl = ConnectionRecoveryController::new(
                config,
                FakeTransport::default(),
                scheduler.clone(),
                clock.clone(),
            )
            .with_seed(7);
            ctl.set_endpoint(Endpoint::address("127.0.0.1", 25565));
            let events = ctl.event_stream();
            Self {
                ctl,
                scheduler,
                clock,
                events,
            }
        }

        fn advance(&mut self, by: Duration) {
            self.clock.advance(by);
            for token in self.scheduler.fire_due() {
                self.ctl.on_timer(token);
            }
        }

        fn drain_events(&mut self) -> Vec<RecoveryEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn no_jitter() -> RecoveryConfig {
        RecoveryConfig {
            jitter_pct: 0,
            ..Default::default()
        }
    }

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_error_recovers_then_reconnects() {
        let mut h = Harness::new(no_jitter());
        h.ctl.start_monitoring();
        assert_eq!(h.ctl.current_state(), RecoveryState::Monitoring);

        h.ctl.report_recoverable_error(Some("Read timed out"));
        assert_eq!(h.ctl.current_state(), RecoveryState::Recovering);
        assert_eq!(h.ctl.current_attempt(), 1);
        assert_eq!(h.scheduler.pending_count(), 1);
        assert_eq!(h.ctl.current_episode().map(|e| e.to_string()), Some("AD-1".into()));

        h.advance(SECOND);
        assert_eq!(h.ctl.current_state(), RecoveryState::Reconnecting);
        assert_eq!(h.ctl.transport().attempts.len(), 1);

        h.ctl.transport_mut().connected = true;
        h.ctl.report_connected();
        assert_eq!(h.ctl.current_state(), RecoveryState::Idle);
        assert_eq!(h.ctl.current_attempt(), 0);
        assert_eq!(h.ctl.current_episode(), None);
        assert!(!h.ctl.has_pending_timer());
    }

    #[test]
    fn test_event_sequence_for_successful_episode() {
        let mut h = Harness::new(no_jitter());
        h.ctl.start_monitoring();
        h.ctl.report_recoverable_error(Some("Connection reset"));
        h.advance(SECOND);
        h.ctl.report_connected();

        let episode = EpisodeId(1);
        assert_eq!(
            h.drain_events(),
            vec![
                RecoveryEvent::MonitoringStarted,
                RecoveryEvent::Detected {
                    episode,
                    reason: "Connection reset".into()
                },
                RecoveryEvent::RecoveryScheduled {
                    episode,
                    attempt: 1,
                    max_attempts: 8,
                    delay: SECOND
                },
                RecoveryEvent::Reconnecting {
                    episode,
                    attempt: 1
                },
                RecoveryEvent::Reconnected { episode },
            ]
        );
    }

    #[test]
    fn test_timer_does_not_fire_early() {
        let mut h = Harness::new(no_jitter());
        h.ctl.report_recoverable_error(None);
        h.advance(Duration::from_millis(999));
        assert_eq!(h.ctl.current_state(), RecoveryState::Recovering);
        h.advance(Duration::from_millis(1));
        assert_eq!(h.ctl.current_state(), RecoveryState::Reconnecting);
    }

    #[test]
    fn test_non_recoverable_error_is_not_retried() {
        let mut h = Harness::new(no_jitter());
        h.ctl.start_monitoring();
        h.drain_events();

        h.ctl.report_recoverable_error(Some("You have been kicked: connection reset"));
        assert_eq!(h.ctl.current_state(), RecoveryState::Monitoring);
        assert_eq!(h.ctl.current_attempt(), 0);
        assert!(!h.ctl.has_pending_timer());
        assert!(matches!(
            h.drain_events().as_slice(),
            [RecoveryEvent::NonRecoverable { .. }]
        ));
    }

    #[test]
    fn test_errors_during_episode_are_ignored() {
        let mut h = Harness::new(no_jitter());
        h.ctl.report_recoverable_error(Some("timeout"));
        h.ctl.report_recoverable_error(Some("timeout"));
        assert_eq!(h.ctl.current_attempt(), 1);
        assert_eq!(h.scheduler.pending_count(), 1);

        h.advance(SECOND);
        h.ctl.report_recoverable_error(Some("timeout"));
        assert_eq!(h.ctl.current_state(), RecoveryState::Reconnecting);
        assert_eq!(h.ctl.current_episode(), Some(EpisodeId(1)));
    }

    #[test]
    fn test_disabled_config_parks_in_disabled() {
        let mut h = Harness::new(RecoveryConfig {
            enabled: false,
            ..no_jitter()
        });
        h.ctl.start_monitoring();
        assert_eq!(h.ctl.current_state(), RecoveryState::Disabled);

        h.ctl.report_recoverable_error(Some("timeout"));
        assert_eq!(h.ctl.current_state(), RecoveryState::Disabled);
        assert_eq!(h.ctl.current_attempt(), 0);
        assert!(!h.ctl.has_pending_timer());
    }

    #[test]
    fn test_connect_failure_enters_cooldown_and_retries() {
        let mut h = Harness::new(no_jitter());
        h.ctl.transport_mut().fail_connects = true;
        h.ctl.report_recoverable_error(Some("timeout"));
        h.advance(SECOND);
        assert_eq!(h.ctl.current_state(), RecoveryState::Cooldown);
        assert_eq!(h.scheduler.pending_count(), 1);

        // Cooldown after attempt 1 uses the attempt-1 delay.
        h.advance(SECOND);
        assert_eq!(h.ctl.current_attempt(), 2);
        assert_eq!(h.ctl.current_state(), RecoveryState::Cooldown);
        assert_eq!(h.ctl.transport().attempts.len(), 2);

        // Attempt 2 failed, so the next wait is 1.5 s.
        h.advance(Duration::from_millis(1499));
        assert_eq!(h.ctl.current_attempt(), 2);
        h.advance(Duration::from_millis(1));
        assert_eq!(h.ctl.current_attempt(), 3);
    }

    #[test]
    fn test_async_connect_failure_enters_cooldown() {
        let mut h = Harness::new(no_jitter());
        h.ctl.report_recoverable_error(Some("timeout"));
        h.advance(SECOND);
        assert_eq!(h.ctl.current_state(), RecoveryState::Reconnecting);

        h.ctl.report_connect_failed("Connection refused");
        assert_eq!(h.ctl.current_state(), RecoveryState::Cooldown);
        assert!(h.ctl.has_pending_timer());

        // Only meaningful while a connect is in flight.
        h.ctl.report_connect_failed("late");
        assert_eq!(h.scheduler.pending_count(), 1);
    }

    #[test]
    fn test_unanswered_connect_times_out() {
        let mut h = Harness::new(no_jitter());
        h.ctl.start_monitoring();
        h.ctl.report_recoverable_error(Some("Read timed out"));
        h.advance(SECOND);
        assert_eq!(h.ctl.current_state(), RecoveryState::Reconnecting);
        assert!(h.ctl.has_pending_timer(), "connect deadline armed");

        h.advance(Duration::from_secs(14));
        assert_eq!(h.ctl.current_state(), RecoveryState::Reconnecting);
        h.advance(SECOND);
        assert_eq!(h.ctl.current_state(), RecoveryState::Cooldown);
        assert!(h.drain_events().iter().any(|e| matches!(
            e,
            RecoveryEvent::ReconnectFailed { reason, .. } if reason.contains("timed out")
        )));

        // The cooldown leads to a second attempt instead of hanging.
        h.advance(SECOND);
        assert_eq!(h.ctl.current_attempt(), 2);
        assert_eq!(h.ctl.transport().attempts.len(), 2);
    }

    #[test]
    fn test_silent_transport_exhausts_budget() {
        let mut h = Harness::new(RecoveryConfig {
            max_attempts: 2,
            ..no_jitter()
        });
        h.ctl.report_recoverable_error(Some("timeout"));
        h.advance(Duration::from_secs(3600));
        for _ in 0..10 {
            h.advance(Duration::from_secs(60));
        }
        assert_eq!(h.ctl.current_state(), RecoveryState::Idle);
        assert!(!h.ctl.has_pending_timer());
        assert_eq!(h.ctl.transport().attempts.len(), 2);

        // A fresh failure starts a new episode.
        h.ctl.report_recoverable_error(Some("Read timed out"));
        assert_eq!(h.ctl.current_state(), RecoveryState::Recovering);
        assert_eq!(h.ctl.current_episode(), Some(EpisodeId(2)));
    }

    #[test]
    fn test_max_attempts_returns_to_idle() {
        let mut h = Harness::new(RecoveryConfig {
            max_attempts: 2,
            ..no_jitter()
        });
        h.ctl.transport_mut().fail_connects = true;
        h.ctl.report_recoverable_error(Some("timeout"));

        h.advance(SECOND); // attempt 1 fails
        h.advance(SECOND); // attempt 2 fails
        assert_eq!(h.ctl.current_attempt(), 2);
        h.advance(Duration::from_millis(1500)); // attempt 3 exceeds max

        assert_eq!(h.ctl.current_state(), RecoveryState::Idle);
        assert_eq!(h.ctl.current_attempt(), 0);
        assert!(!h.ctl.has_pending_timer());
        assert_eq!(h.ctl.transport().attempts.len(), 2);
        assert!(
            h.drain_events()
                .contains(&RecoveryEvent::MaxAttemptsReached { episode: EpisodeId(1) })
        );
    }

    #[test]
    fn test_cancel_stops_pending_timer() {
        let mut h = Harness::new(no_jitter());
        h.ctl.report_recoverable_error(Some("timeout"));
        let stale = TimerToken {
            generation: h.ctl.generation,
        };

        h.ctl.cancel();
        assert_eq!(h.ctl.current_state(), RecoveryState::StoppedByUser);
        assert_eq!(h.ctl.current_attempt(), 0);
        assert_eq!(h.ctl.current_episode(), None);
        assert_eq!(h.scheduler.pending_count(), 0);

        h.advance(Duration::from_secs(60));
        h.ctl.on_timer(stale);
        assert_eq!(h.ctl.current_state(), RecoveryState::StoppedByUser);
        assert!(h.ctl.transport().attempts.is_empty());
    }

    #[test]
    fn test_cancel_is_noop_when_idle_or_disabled() {
        let mut h = Harness::new(no_jitter());
        h.ctl.cancel();
        assert_eq!(h.ctl.current_state(), RecoveryState::Idle);

        h.ctl.set_config(RecoveryConfig {
            enabled: false,
            ..no_jitter()
        });
        h.ctl.start_monitoring();
        h.ctl.cancel();
        assert_eq!(h.ctl.current_state(), RecoveryState::Disabled);
    }

    #[test]
    fn test_start_monitoring_after_cancel() {
        let mut h = Harness::new(no_jitter());
        h.ctl.start_monitoring();
        h.ctl.cancel();
        assert_eq!(h.ctl.current_state(), RecoveryState::StoppedByUser);
        h.ctl.start_monitoring();
        assert_eq!(h.ctl.current_state(), RecoveryState::Monitoring);
    }

    #[test]
    fn test_stale_token_is_ignored() {
        let mut h = Harness::new(no_jitter());
        h.ctl.report_recoverable_error(Some("timeout"));
        let first = TimerToken {
            generation: h.ctl.generation,
        };
        h.ctl.stop_monitoring();
        h.ctl.report_recoverable_error(Some("timeout"));

        h.ctl.on_timer(first);
        assert_eq!(h.ctl.current_state(), RecoveryState::Recovering);
        assert_eq!(h.ctl.current_episode(), Some(EpisodeId(2)));
    }

    #[test]
    fn test_already_connected_counts_as_success() {
        let mut h = Harness::new(no_jitter());
        h.ctl.report_recoverable_error(Some("timeout"));
        h.ctl.transport_mut().connected = true;
        h.advance(SECOND);
        assert_eq!(h.ctl.current_state(), RecoveryState::Idle);
        assert!(h.ctl.transport().attempts.is_empty());
    }

    #[test]
    fn test_missing_endpoint_is_surfaced() {
        let clock = ManualClock::default();
        let scheduler = ManualScheduler::new(clock.clone());
        let mut ctl = ConnectionRecoveryController::new(
            no_jitter(),
            FakeTransport::default(),
            scheduler.clone(),
            clock.clone(),
        );
        let mut events = ctl.event_stream();
        ctl.report_recoverable_error(Some("timeout"));
        clock.advance(SECOND);
        for token in scheduler.fire_due() {
            ctl.on_timer(token);
        }

        assert_eq!(ctl.current_state(), RecoveryState::Idle);
        let mut saw_no_endpoint = false;
        while let Ok(event) = events.try_recv() {
            saw_no_endpoint |= matches!(event, RecoveryEvent::NoEndpoint { .. });
        }
        assert!(saw_no_endpoint);
    }

    #[test]
    fn test_stability_window_resets_attempts() {
        let mut h = Harness::new(no_jitter());
        h.ctl.start_monitoring();
        h.ctl.attempt = 3;

        h.clock.advance(Duration::from_secs(10));
        h.ctl.report_stable();
        assert_eq!(h.ctl.current_attempt(), 3, "inside the window");

        h.clock.advance(Duration::from_secs(21));
        h.ctl.report_stable();
        assert_eq!(h.ctl.current_attempt(), 0);
        assert_eq!(h.ctl.attempt_info().last_stable_at, Some(h.clock.now()));
    }

    #[test]
    fn test_episode_ids_increase() {
        let mut h = Harness::new(no_jitter());
        h.ctl.report_recoverable_error(Some("timeout"));
        h.ctl.cancel();
        h.ctl.report_recoverable_error(Some("timeout"));
        assert_eq!(h.ctl.current_episode().map(|e| e.to_string()), Some("AD-2".into()));
    }

    #[test]
    fn test_state_watch_publishes_transitions() {
        let mut h = Harness::new(no_jitter());
        let mut rx = h.ctl.state_watch().subscribe();
        assert_eq!(*rx.borrow_and_update(), RecoveryState::Idle);

        h.ctl.report_recoverable_error(Some("timeout"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), RecoveryState::Recovering);
    }

    #[test]
    fn test_report_exception_uses_error_chain() {
        let mut h = Harness::new(no_jitter());
        let err = io::Error::new(io::ErrorKind::TimedOut, "read");
        h.ctl.report_exception(&err);
        assert_eq!(h.ctl.current_state(), RecoveryState::Recovering);

        let mut h = Harness::new(no_jitter());
        let err = io::Error::other("You are banned from this server");
        h.ctl.report_exception(&err);
        assert_eq!(h.ctl.current_state(), RecoveryState::Idle);
    }

    #[test]
    fn test_disabling_mid_episode_cancels_timer() {
        let mut h = Harness::new(no_jitter());
        h.ctl.report_recoverable_error(Some("timeout"));
        h.ctl.set_config(RecoveryConfig {
            enabled: false,
            ..no_jitter()
        });
        assert_eq!(h.ctl.current_state(), RecoveryState::Disabled);
        assert_eq!(h.scheduler.pending_count(), 0);
    }
}
