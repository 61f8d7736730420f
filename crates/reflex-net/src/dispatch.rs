//! Strict-priority outbound dispatch.
//!
//! Messages are sorted into three bounded FIFO buffers by tier and drained
//! High, then Medium, then Low, with a single flush at the end. A full buffer
//! never drops a message: it is written to the sink immediately instead,
//! trading ordering for delivery.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use reflex_config::PriorityTier;
use tokio::sync::oneshot;

/// Capacity of each tier's buffer.
pub const MAX_QUEUE_SIZE: usize = 50;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Assigns a tier to an outbound message.
pub trait PriorityClassifier<M> {
    /// Tier for `message`.
    fn tier(&self, message: &M) -> PriorityTier;
}

impl<M, F> PriorityClassifier<M> for F
where
    F: Fn(&M) -> PriorityTier,
{
    fn tier(&self, message: &M) -> PriorityTier {
        self(message)
    }
}

/// Failure reported by a [`MessageSink`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The sink refused a write.
    #[error("write failed: {0}")]
    Write(String),
    /// Flushing buffered writes failed.
    #[error("flush failed: {0}")]
    Flush(String),
    /// The underlying connection is gone.
    #[error("sink closed")]
    Closed,
}

/// Where drained messages go, typically the connection's outbound channel.
///
/// Implementations must not call back into the queue that owns them.
pub trait MessageSink<M> {
    /// Hand one message to the connection without flushing.
    fn write(&mut self, message: M) -> Result<(), SinkError>;

    /// Push everything written so far onto the wire.
    fn flush(&mut self) -> Result<(), SinkError>;

    /// Whether the connection can accept writes right now.
    fn is_writable(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Error returned by [`PriorityDispatchQueue::drain`].
///
/// Messages written before the failure stay sent; the rest stay queued.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The sink rejected a queued message, which has been discarded.
    #[error("sink rejected a {tier:?} message")]
    Write {
        /// Tier of the rejected message.
        tier: PriorityTier,
        /// Underlying sink failure.
        #[source]
        source: SinkError,
    },
    /// The final flush failed.
    #[error("flush after drain failed")]
    Flush(#[source] SinkError),
}

/// What `submit` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Appended to its tier's buffer.
    Queued,
    /// The tier was full; written and flushed immediately.
    SentDirect,
}

/// Final fate of a submitted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The sink accepted the message.
    Written,
    /// The sink rejected the message.
    Failed(String),
}

/// Returned by [`PriorityDispatchQueue::submit`].
#[derive(Debug)]
pub struct Submission {
    /// Whether the message was buffered or bypassed the queue.
    pub outcome: SubmitOutcome,
    /// Resolves once the sink accepts or rejects the message.
    pub delivery: oneshot::Receiver<DeliveryStatus>,
}

/// Point-in-time dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages appended to a buffer.
    pub queued: u64,
    /// Messages that bypassed a full buffer.
    pub sent_direct: u64,
    /// Messages accepted by the sink, queued or direct.
    pub written: u64,
    /// Messages the sink rejected.
    pub failed: u64,
}

#[derive(Default)]
struct DispatchCounters {
    queued: AtomicU64,
    sent_direct: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

impl DispatchCounters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            queued: self.queued.load(Ordering::Relaxed),
            sent_direct: self.sent_direct.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct Queued<M> {
    message: M,
    done: oneshot::Sender<DeliveryStatus>,
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn slot(tier: PriorityTier) -> usize {
    match tier {
        PriorityTier::High => 0,
        PriorityTier::Medium => 1,
        PriorityTier::Low => 2,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// PriorityDispatchQueue
// ---------------------------------------------------------------------------

/// Three-tier outbound queue in front of a [`MessageSink`].
pub struct PriorityDispatchQueue<M, C, S> {
    classifier: C,
    buffers: Mutex<[VecDeque<Queued<M>>; 3]>,
    sink: Mutex<S>,
    draining: AtomicBool,
    counters: DispatchCounters,
}

impl<M, C, S> PriorityDispatchQueue<M, C, S>
where
    C: PriorityClassifier<M>,
    S: MessageSink<M>,
{
    /// Create an empty queue.
    pub fn new(classifier: C, sink: S) -> Self {
        Self {
            classifier,
            buffers: Mutex::new(Default::default()),
            sink: Mutex::new(sink),
            draining: AtomicBool::new(false),
            counters: DispatchCounters::default(),
        }
    }

    /// Classify and enqueue `message`, or write it directly if its tier is full.
    ///
    /// Never fails. A queued message triggers a drain when the sink is writable.
    pub fn submit(&self, message: M) -> Submission {
        let tier = self.classifier.tier(&message);
        let (done, delivery) = oneshot::channel();
        let entry = Queued { message, done };

        let overflow = {
            let mut buffers = lock(&self.buffers);
            let buffer = &mut buffers[slot(tier)];
            if buffer.len() < MAX_QUEUE_SIZE {
                buffer.push_back(entry);
                None
            } else {
                Some(entry)
            }
        };

        match overflow {
            Some(entry) => {
                self.send_direct(tier, entry);
                Submission {
                    outcome: SubmitOutcome::SentDirect,
                    delivery,
                }
            }
            None => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                let writable = lock(&self.sink).is_writable();
                if writable && let Err(err) = self.drain() {
                    tracing::warn!(error = %err, "Drain after submit failed");
                }
                Submission {
                    outcome: SubmitOutcome::Queued,
                    delivery,
                }
            }
        }
    }

    /// Write everything queued, highest tier first, then flush once.
    ///
    /// Returns the number of messages written. If another drain is already
    /// running, returns `Ok(0)` without touching the buffers.
    pub fn drain(&self) -> Result<usize, DispatchError> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            tracing::trace!("Drain already in progress");
            return Ok(0);
        }
        let _guard = DrainGuard(&self.draining);

        let mut sink = lock(&self.sink);
        let mut written = 0;
        while let Some((tier, entry)) = self.pop_next() {
            match sink.write(entry.message) {
                Ok(()) => {
                    let _ = entry.done.send(DeliveryStatus::Written);
                    self.counters.written.fetch_add(1, Ordering::Relaxed);
                    written += 1;
                }
                Err(source) => {
                    let _ = entry.done.send(DeliveryStatus::Failed(source.to_string()));
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    return Err(DispatchError::Write { tier, source });
                }
            }
        }
        sink.flush().map_err(DispatchError::Flush)?;
        Ok(written)
    }

    /// The sink reports it can accept writes again.
    pub fn on_writable(&self) -> Result<usize, DispatchError> {
        let writable = lock(&self.sink).is_writable();
        if !writable {
            return Ok(0);
        }
        self.drain()
    }

    /// Messages currently buffered in `tier`.
    pub fn len(&self, tier: PriorityTier) -> usize {
        lock(&self.buffers)[slot(tier)].len()
    }

    /// Whether every tier is empty.
    pub fn is_empty(&self) -> bool {
        lock(&self.buffers).iter().all(VecDeque::is_empty)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Mutable access to the classifier, e.g. to hot-reload a policy.
    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }

    /// Mutable access to the sink.
    pub fn sink_mut(&mut self) -> &mut S {
        self.sink.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop_next(&self) -> Option<(PriorityTier, Queued<M>)> {
        let mut buffers = lock(&self.buffers);
        PriorityTier::ALL
            .into_iter()
            .find_map(|tier| buffers[slot(tier)].pop_front().map(|entry| (tier, entry)))
    }

    fn send_direct(&self, tier: PriorityTier, entry: Queued<M>) {
        self.counters.sent_direct.fetch_add(1, Ordering::Relaxed);
        if tier == PriorityTier::High {
            tracing::warn!(?tier, "Queue full, sending directly");
        } else {
            tracing::debug!(?tier, "Queue full, sending directly");
        }

        let mut sink = lock(&self.sink);
        let result = sink.write(entry.message).and_then(|()| sink.flush());
        match result {
            Ok(()) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
                let _ = entry.done.send(DeliveryStatus::Written);
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(?tier, error = %err, "Direct send failed");
                let _ = entry.done.send(DeliveryStatus::Failed(err.to_string()));
            }
        }
    }
}
