//! Time and timer abstractions for the single-threaded control context.
//!
//! Timers never call back into controller state. A fired timer delivers its
//! [`TimerToken`] back to the owner (as a main-loop event with
//! [`TokioScheduler`], or from [`ManualScheduler::fire_due`] in tests), and
//! the owner hands it to the controller, which ignores tokens it no longer
//! expects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifies one scheduled timer. Generations only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken {
    /// Monotonic generation assigned by the scheduling controller.
    pub generation: u64,
}

/// Handle used to cancel a scheduled timer. Cancelling twice is harmless.
pub trait TimerHandle: Send {
    /// Prevent the timer from delivering its token.
    fn cancel(&mut self);
}

/// Schedules delayed token delivery.
pub trait Scheduler {
    /// Deliver `token` to the owner once `delay` has elapsed.
    fn after(&mut self, delay: Duration, token: TimerToken) -> Box<dyn TimerHandle>;
}

/// Source of the current monotonic time.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;
}

// ---------------------------------------------------------------------------
// System clock
// ---------------------------------------------------------------------------

/// Wall-clock [`Clock`] backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ---------------------------------------------------------------------------
// Tokio scheduler
// ---------------------------------------------------------------------------

/// Scheduler that sleeps on the tokio runtime and then sends the token,
/// converted into the main loop's event type, over an unbounded channel.
pub struct TokioScheduler<E> {
    tx: mpsc::UnboundedSender<E>,
    runtime: Handle,
}

impl<E> TokioScheduler<E>
where
    E: From<TimerToken> + Send + 'static,
{
    /// Create a scheduler bound to the current tokio runtime.
    pub fn new(tx: mpsc::UnboundedSender<E>) -> Result<Self, TryCurrentError> {
        Ok(Self {
            tx,
            runtime: Handle::try_current()?,
        })
    }
}

impl<E> Scheduler for TokioScheduler<E>
where
    E: From<TimerToken> + Send + 'static,
{
    fn after(&mut self, delay: Duration, token: TimerToken) -> Box<dyn TimerHandle> {
        let tx = self.tx.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(E::from(token)).is_err() {
                tracing::trace!("timer {} fired after the main loop closed", token.generation);
            }
        });
        Box::new(TokioTimerHandle { task })
    }
}

struct TokioTimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle for TokioTimerHandle {
    fn cancel(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// Manual clock and scheduler
// ---------------------------------------------------------------------------

/// A [`Clock`] that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: Instant) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct ManualEntry {
    deadline: Instant,
    token: TimerToken,
    cancelled: Arc<AtomicBool>,
}

/// Deterministic [`Scheduler`] driven by a [`ManualClock`].
///
/// Nothing fires on its own: advance the clock, then call
/// [`fire_due`](Self::fire_due) and feed the returned tokens to the owner.
/// Clones share the same timer list.
#[derive(Clone)]
pub struct ManualScheduler {
    clock: ManualClock,
    entries: Arc<Mutex<Vec<ManualEntry>>>,
}

impl ManualScheduler {
    /// Create a scheduler reading deadlines from `clock`.
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The clock this scheduler reads.
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Remove and return every live timer whose deadline has passed, earliest first.
    pub fn fire_due(&self) -> Vec<TimerToken> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|e| !e.cancelled.load(Ordering::Relaxed));

        let mut due = Vec::new();
        entries.retain(|e| {
            if e.deadline <= now {
                due.push((e.deadline, e.token));
                false
            } else {
                true
            }
        });
        due.sort();
        due.into_iter().map(|(_, token)| token).collect()
    }

    /// Number of timers that are scheduled and not cancelled.
    pub fn pending_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| !e.cancelled.load(Ordering::Relaxed))
            .count()
    }

    /// Earliest deadline among live timers.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| !e.cancelled.load(Ordering::Relaxed))
            .map(|e| e.deadline)
            .min()
    }
}

impl Scheduler for ManualScheduler {
    fn after(&mut self, delay: Duration, token: TimerToken) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ManualEntry {
                deadline: self.clock.now() + delay,
                token,
                cancelled: Arc::clone(&cancelled),
            });
        Box::new(ManualTimerHandle { cancelled })
    }
}

struct ManualTimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for ManualTimerHandle {
    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(generation: u64) -> TimerToken {
        TimerToken { generation }
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let other = clock.clone();
        let start = clock.now();
        other.advance(Duration::from_secs(3));
        assert_eq!(clock.now() - start, Duration::from_secs(3));
    }

    #[test]
    fn test_manual_scheduler_fires_in_deadline_order() {
        let clock = ManualClock::default();
        let mut scheduler = ManualScheduler::new(clock.clone());
        scheduler.after(Duration::from_millis(300), token(1));
        scheduler.after(Duration::from_millis(100), token(2));
        scheduler.after(Duration::from_millis(900), token(3));

        assert!(scheduler.fire_due().is_empty());
        clock.advance(Duration::from_millis(300));
        assert_eq!(scheduler.fire_due(), vec![token(2), token(1)]);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_jump_to_next_deadline() {
        let mut scheduler = ManualScheduler::new(ManualClock::default());
        scheduler.after(Duration::from_secs(15), token(1));
        scheduler.after(Duration::from_secs(40), token(2));

        let deadline = scheduler.next_deadline().unwrap();
        scheduler.clock().set(deadline);
        assert_eq!(scheduler.fire_due(), vec![token(1)]);
        assert!(scheduler.next_deadline() > Some(deadline));
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let clock = ManualClock::default();
        let mut scheduler = ManualScheduler::new(clock.clone());
        let mut handle = scheduler.after(Duration::from_millis(10), token(1));
        handle.cancel();
        handle.cancel();

        clock.advance(Duration::from_secs(1));
        assert!(scheduler.fire_due().is_empty());
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_delivers_token() {
        let (tx, mut rx) = mpsc::unbounded_channel::<TimerToken>();
        let mut scheduler = TokioScheduler::new(tx).unwrap();
        scheduler.after(Duration::from_secs(2), token(7));

        let start = tokio::time::Instant::now();
        assert_eq!(rx.recv().await, Some(token(7)));
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel::<TimerToken>();
        let mut scheduler = TokioScheduler::new(tx).unwrap();
        let mut handle = scheduler.after(Duration::from_secs(1), token(1));
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(result.is_err(), "cancelled timer should not deliver");
    }
}
