//! Client runtime tying the reliability and prediction layers together.
//!
//! [`ReflexContext`] owns every component and is the only thing host code
//! talks to. [`MainLoop`] drives it from a tokio channel so that host
//! callbacks, recovery timers and ticks are applied one at a time.

pub mod context;
pub mod error;
pub mod main_loop;
pub mod sim;

pub use context::{READ_TIMEOUT_REASON, ReflexContext};
pub use error::ClientError;
pub use main_loop::{DEFAULT_TICK_INTERVAL, EventChannel, LoopContext, MainEvent, MainLoop};
pub use sim::{LoggingSink, SimulatedTransport};
