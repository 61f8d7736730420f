//! The seam between the recovery controller and the host's connection code.

use crate::endpoint::Endpoint;

/// Errors a transport may report when starting a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The remote end actively refused the connection.
    #[error("connection refused by {0}")]
    Refused(String),
    /// The endpoint could not be resolved or reached.
    #[error("no route to {0}")]
    Unreachable(String),
    /// Any other failure while starting the connection.
    #[error("connect failed: {0}")]
    Other(String),
}

/// A connection the recovery controller can query and (re)open.
///
/// `connect` only starts the attempt. Hosts whose connect completes later
/// report the outcome through
/// [`ConnectionRecoveryController::report_connected`](crate::ConnectionRecoveryController::report_connected)
/// or
/// [`report_connect_failed`](crate::ConnectionRecoveryController::report_connect_failed).
pub trait Transport {
    /// Whether the underlying connection is currently open.
    fn is_connected(&self) -> bool;

    /// Begin connecting to `endpoint`.
    fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError>;

    /// Drop the current connection, e.g. after a read timeout.
    fn disconnect(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn connect(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        (**self).connect(endpoint)
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }
}
