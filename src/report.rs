//! Progress and outcome reporting.
//!
//! The verifier and runner describe what happens as [`ReportEvent`]s and
//! hand them to a [`Reporter`]. [`ConsoleReporter`] renders them as the
//! human-readable console transcript; [`RecordingReporter`] keeps them for
//! inspection.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Something worth telling the operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReportEvent {
    Testing { role: String, endpoint: String },
    Connected { role: String },
    Sent { role: String, payload: String },
    Received { role: String, text: String },
    Closed { role: String },
    Failed { role: String, reason: String },
    TimedOut { role: String },
    /// Emitted once after the last descriptor.
    Completed,
}

impl ReportEvent {
    /// Role the event belongs to; `None` for run-level events.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        match self {
            ReportEvent::Testing { role, .. }
            | ReportEvent::Connected { role }
            | ReportEvent::Sent { role, .. }
            | ReportEvent::Received { role, .. }
            | ReportEvent::Closed { role }
            | ReportEvent::Failed { role, .. }
            | ReportEvent::TimedOut { role } => Some(role),
            ReportEvent::Completed => None,
        }
    }

    /// True for the events that end one descriptor's verification.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportEvent::Closed { .. } | ReportEvent::Failed { .. } | ReportEvent::TimedOut { .. }
        )
    }
}

/// Console rendering. Terminal events end with a blank line.
impl fmt::Display for ReportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportEvent::Testing { role, endpoint } => {
                write!(f, "Testing {role} connection...\nURL: {endpoint}")
            }
            ReportEvent::Connected { role } => write!(f, "✓ {role} connected successfully"),
            ReportEvent::Sent { payload, .. } => write!(f, "  Sent: {payload}"),
            ReportEvent::Received { text, .. } => write!(f, "  Received: {text}"),
            ReportEvent::Closed { role } => writeln!(f, "✓ {role} connection closed"),
            ReportEvent::Failed { role, reason } => {
                writeln!(f, "✗ {role} connection failed: {reason}")
            }
            ReportEvent::TimedOut { role } => writeln!(f, "✗ {role} connection timeout"),
            ReportEvent::Completed => write!(f, "All tests completed!"),
        }
    }
}

/// Sink for report events. Shared between the runner and spawned
/// verification tasks.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &ReportEvent);
}

/// Writes each event as console lines.
pub struct ConsoleReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    #[must_use]
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for ConsoleReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleReporter").finish_non_exhaustive()
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: &ReportEvent) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{event}").and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "failed to write report");
        }
    }
}

/// Keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Console transcript of everything recorded so far.
    #[must_use]
    pub fn transcript(&self) -> String {
        self.events()
            .iter()
            .map(|event| format!("{event}\n"))
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &ReportEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
