//! The async main loop.
//!
//! Host callbacks, fired timers and the periodic tick all arrive as
//! [`MainEvent`]s on one channel and are applied to the [`ReflexContext`]
//! strictly in order, so no component needs its own locking.

use std::ops::ControlFlow;
use std::time::Duration;

use reflex_config::Config;
use reflex_net::{Clock, MessageSink, OutboundMessage, TimerToken, TokioScheduler, Transport};
use reflex_prediction::{LocalAction, ServerEvent};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::context::ReflexContext;
use crate::error::ClientError;

/// One game tick.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Everything the main loop reacts to.
#[derive(Debug)]
pub enum MainEvent {
    /// A recovery timer fired.
    Timer(TimerToken),
    /// The connection is established.
    Connected,
    /// A reconnect attempt failed after it was started.
    ConnectFailed(String),
    /// The connection dropped, with the disconnect reason if any.
    Disconnected(Option<String>),
    /// A failure message that did not (yet) close the connection.
    ConnectionError(String),
    /// An inbound packet arrived.
    PacketReceived,
    /// A round-trip sample in milliseconds.
    RoundTrip(i64),
    /// A local player action.
    Action(LocalAction),
    /// A server world event.
    Server(ServerEvent),
    /// An outbound message to queue.
    Submit(OutboundMessage),
    /// The connection can accept writes again.
    Writable,
    /// A reloaded configuration.
    ReloadConfig(Box<Config>),
    /// User asked to stop reconnecting.
    CancelRecovery,
    /// Run the per-tick housekeeping now.
    Tick,
    /// Stop the loop.
    Shutdown,
}

impl From<TimerToken> for MainEvent {
    fn from(token: TimerToken) -> Self {
        Self::Timer(token)
    }
}

/// The event channel a [`MainLoop`] reads from. Create it first so that
/// transports and host code can hold senders before the loop exists.
pub struct EventChannel {
    tx: mpsc::UnboundedSender<MainEvent>,
    rx: mpsc::UnboundedReceiver<MainEvent>,
}

impl EventChannel {
    /// A fresh unbounded channel.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// A sender for posting events to the loop.
    pub fn sender(&self) -> mpsc::UnboundedSender<MainEvent> {
        self.tx.clone()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Context type driven by the main loop.
pub type LoopContext<T, C, K> = ReflexContext<T, TokioScheduler<MainEvent>, C, K>;

/// Owns the context and applies events to it one at a time.
pub struct MainLoop<T, C, K>
where
    K: MessageSink<OutboundMessage>,
{
    context: LoopContext<T, C, K>,
    rx: mpsc::UnboundedReceiver<MainEvent>,
    tick_interval: Duration,
}

impl<T, C, K> MainLoop<T, C, K>
where
    T: Transport,
    C: Clock + Clone,
    K: MessageSink<OutboundMessage>,
{
    /// Build the loop. Must be called inside a tokio runtime, which hosts
    /// the recovery timers.
    pub fn new(
        config: Config,
        transport: T,
        clock: C,
        sink: K,
        channel: EventChannel,
    ) -> Result<Self, ClientError> {
        let scheduler = TokioScheduler::new(channel.tx)?;
        Ok(Self {
            context: ReflexContext::new(config, transport, scheduler, clock, sink),
            rx: channel.rx,
            tick_interval: DEFAULT_TICK_INTERVAL,
        })
    }

    /// Use a different tick period.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// The context.
    pub fn context(&self) -> &LoopContext<T, C, K> {
        &self.context
    }

    /// The context, mutably, for setup before [`run`](Self::run).
    pub fn context_mut(&mut self) -> &mut LoopContext<T, C, K> {
        &mut self.context
    }

    /// Apply one event. Breaks on [`MainEvent::Shutdown`].
    pub fn apply(&mut self, event: MainEvent) -> ControlFlow<()> {
        let ctx = &mut self.context;
        match event {
            MainEvent::Timer(token) => ctx.on_timer(token),
            MainEvent::Connected => ctx.report_connected(),
            MainEvent::ConnectFailed(reason) => ctx.report_connect_failed(&reason),
            MainEvent::Disconnected(reason) => ctx.report_disconnected(reason.as_deref()),
            MainEvent::ConnectionError(reason) => ctx.report_recoverable_error(Some(&reason)),
            MainEvent::PacketReceived => ctx.report_packet_received(),
            MainEvent::RoundTrip(ms) => ctx.report_round_trip_sample(ms),
            MainEvent::Action(action) => ctx.on_local_action(&action),
            MainEvent::Server(event) => ctx.on_server_event(&event),
            MainEvent::Submit(message) => {
                let category = message.category;
                let submission = ctx.submit(message);
                tracing::trace!(?category, outcome = ?submission.outcome, "Submitted");
            }
            MainEvent::Writable => {
                if let Err(err) = ctx.on_writable() {
                    tracing::warn!(error = %err, "Drain on writable failed");
                }
            }
            MainEvent::ReloadConfig(config) => ctx.apply_config(*config),
            MainEvent::CancelRecovery => ctx.cancel_recovery(),
            MainEvent::Tick => ctx.tick(),
            MainEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Process events and ticks until shutdown, then hand back the context.
    pub async fn run(mut self) -> LoopContext<T, C, K> {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval = ?self.tick_interval, "Main loop started");

        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    if self.apply(event).is_break() {
                        break;
                    }
                }
                _ = ticker.tick() => self.context.tick(),
            }
        }

        tracing::info!("Main loop stopped");
        self.context
    }
}
