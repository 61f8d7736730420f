//! Connection reliability: failure classification, reconnect backoff, the
//! recovery state machine, priority-ordered outbound dispatch, and network
//! health tracking.
//!
//! Everything here is driven from a single main context. Timers never touch
//! state directly: a [`Scheduler`] hands back a [`TimerToken`] that the owner
//! feeds into [`ConnectionRecoveryController::on_timer`], which discards stale
//! tokens.

pub mod backoff;
pub mod classifier;
pub mod dispatch;
pub mod endpoint;
pub mod monitor;
pub mod policy;
pub mod recovery;
pub mod runtime;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use classifier::{ErrorClass, classify, classify_error, describe_error};
pub use dispatch::{
    DeliveryStatus, DispatchError, DispatchStats, MAX_QUEUE_SIZE, MessageSink,
    PriorityClassifier, PriorityDispatchQueue, SinkError, SubmitOutcome, Submission,
};
pub use endpoint::{DEFAULT_SERVER_PORT, Endpoint, EndpointParseError};
pub use monitor::{HealthMonitor, HealthSnapshot, PingTrend};
pub use policy::{Categorized, MessageCategory, OutboundMessage, PriorityPolicy};
pub use recovery::{
    ConnectionRecoveryController, EpisodeId, RecoveryAttempt, RecoveryEvent, RecoveryState,
    RecoveryStateWatch,
};
pub use reflex_config::PriorityTier;
pub use runtime::{
    Clock, ManualClock, ManualScheduler, Scheduler, SystemClock, TimerHandle, TimerToken,
    TokioScheduler,
};
pub use transport::{Transport, TransportError};
