//! Simulated connection pieces for the demo binary and integration runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use reflex_net::{Endpoint, MessageSink, OutboundMessage, SinkError, Transport, TransportError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::main_loop::MainEvent;

/// A transport that refuses its first few connects, then "connects" after a
/// short delay by posting [`MainEvent::Connected`] to the main loop.
pub struct SimulatedTransport {
    refusals_left: u32,
    connect_delay: Duration,
    link: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<MainEvent>,
}

impl SimulatedTransport {
    /// Refuse `refusals` connects before succeeding.
    pub fn new(refusals: u32, events: mpsc::UnboundedSender<MainEvent>) -> Self {
        Self {
            refusals_left: refusals,
            connect_delay: Duration::from_millis(150),
            link: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Time between a successful `connect` call and the connected event.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Shared link flag. Clearing it simulates the socket dying.
    pub fn link(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.link)
    }
}

impl Transport for SimulatedTransport {
    fn is_connected(&self) -> bool {
        self.link.load(Ordering::SeqCst)
    }

    fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        if self.refusals_left > 0 {
            self.refusals_left -= 1;
            return Err(TransportError::Refused(endpoint.to_string()));
        }
        let runtime = Handle::try_current().map_err(|e| TransportError::Other(e.to_string()))?;

        let link = Arc::clone(&self.link);
        let events = self.events.clone();
        let delay = self.connect_delay;
        tracing::debug!(%endpoint, ?delay, "Simulated connect started");
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            link.store(true, Ordering::SeqCst);
            if events.send(MainEvent::Connected).is_err() {
                tracing::trace!("Main loop gone before simulated connect finished");
            }
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        self.link.store(false, Ordering::SeqCst);
    }
}

/// A sink that logs what it would send and counts messages and flushes.
#[derive(Debug, Clone, Default)]
pub struct LoggingSink {
    written: Arc<AtomicUsize>,
    flushes: Arc<AtomicUsize>,
}

impl LoggingSink {
    /// Messages written so far.
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    /// Flushes so far.
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl MessageSink<OutboundMessage> for LoggingSink {
    fn write(&mut self, message: OutboundMessage) -> Result<(), SinkError> {
        tracing::debug!(category = ?message.category, bytes = message.payload.len(), "Sent");
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
