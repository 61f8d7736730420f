//! Failure classification: decides whether a disconnect reason is worth a
//! reconnect attempt.
//!
//! Non-recoverable patterns (bans, kicks, whitelist rejections, full servers)
//! are tested first and always win, even when a recoverable pattern also
//! matches. Anything unrecognized, including an empty reason, is treated as
//! recoverable.

use std::error::Error;
use std::io;
use std::sync::LazyLock;

use regex::RegexSet;

/// Outcome of classifying a failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient failure; the recovery state machine should run.
    Recoverable,
    /// The server refused us on purpose; never retried.
    NonRecoverable,
}

static NON_RECOVERABLE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)banned",
        r"(?i)baneado",
        r"(?i)kicked",
        r"(?i)expulsado",
        r"(?i)you are not whitelisted",
        r"(?i)no estás en la lista blanca",
        r"(?i)server.*full",
        r"(?i)servidor.*lleno",
    ])
    .expect("static non-recoverable patterns compile")
});

static RECOVERABLE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)timeout",
        r"(?i)timed out",
        r"(?i)tiempo de espera",
        r"(?i)connection lost",
        r"(?i)conexión perdida",
        r"(?i)connection reset",
        r"(?i)conexión reseteada",
        r"(?i)internal exception.*ioexception",
        r"(?i)disconnected",
        r"(?i)channel.*closed",
        r"(?i)canal.*cerrado",
    ])
    .expect("static recoverable patterns compile")
});

/// Classify a free-form disconnect reason.
pub fn classify(message: Option<&str>) -> ErrorClass {
    let Some(message) = message.filter(|m| !m.is_empty()) else {
        return ErrorClass::Recoverable;
    };

    if NON_RECOVERABLE.is_match(message) {
        return ErrorClass::NonRecoverable;
    }
    if RECOVERABLE.is_match(message) {
        return ErrorClass::Recoverable;
    }
    ErrorClass::Recoverable
}

/// Classify an error value.
///
/// Transient I/O kinds anywhere in the source chain are recoverable outright;
/// otherwise the rendered chain is classified as text.
pub fn classify_error(err: &(dyn Error + 'static)) -> ErrorClass {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>()
            && is_transient_io(io_err.kind())
        {
            return ErrorClass::Recoverable;
        }
        current = e.source();
    }
    classify(Some(&describe_error(err)))
}

/// Render an error and its sources as `outer: inner: root`.
pub fn describe_error(err: &(dyn Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        text.push_str(": ");
        text.push_str(&s.to_string());
        source = s.source();
    }
    text
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
