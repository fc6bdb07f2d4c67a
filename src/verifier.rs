//! Verification of a single signalling connection.
//!
//! [`Lifecycle`] decides what happens next from the events observed so far
//! and never touches a socket. [`Verifier`] owns the socket and the timers,
//! turns what they produce into [`Event`]s and carries out the returned
//! [`Action`]s until the lifecycle resolves.

use std::collections::VecDeque;
use std::fmt;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::{Instant, Sleep, sleep};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::connection::{Connection, connect};
use crate::error::{Error, Result};
use crate::liveness::LivenessMessage;
use crate::message::{CloseCode, Message};
use crate::registry::ConnectionDescriptor;
use crate::report::{ReportEvent, Reporter};

/// Terminal result of one verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Handshake succeeded and the connection was closed afterwards.
    ConnectedAndClosed,
    /// Transport or protocol failure before a terminal state.
    Failed(String),
    /// No handshake within the handshake timeout.
    TimedOut,
}

impl ConnectionOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, ConnectionOutcome::ConnectedAndClosed)
    }
}

impl fmt::Display for ConnectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionOutcome::ConnectedAndClosed => f.write_str("connected and closed"),
            ConnectionOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            ConnectionOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Something the driver observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Opened,
    Message(Message),
    /// Close frame received or stream ended.
    Closed,
    Error(String),
    HandshakeTimerElapsed,
    LingerTimerElapsed,
    CloseTimerElapsed,
}

/// Something the driver must do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SendLiveness,
    StartLinger,
    /// Send a normal close frame.
    Close,
    StartCloseTimer,
    /// Drop the stream without a close handshake.
    Terminate,
    Report(ReportEvent),
    /// Always the last action of a batch.
    Resolve(ConnectionOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    /// Handshake done, linger running.
    Open,
    /// Close frame sent, waiting for the peer.
    Closing,
}

/// Connection lifecycle as a pure state machine.
///
/// Resolves at most once; every event after resolution yields no actions.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    role: String,
    phase: Phase,
    settled: bool,
}

impl Lifecycle {
    #[must_use]
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            phase: Phase::Connecting,
            settled: false,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.settled {
            return Vec::new();
        }

        let role = self.role.clone();
        match (self.phase, event) {
            (_, Event::Error(reason)) => self.resolve(
                vec![
                    Action::Terminate,
                    Action::Report(ReportEvent::Failed {
                        role,
                        reason: reason.clone(),
                    }),
                ],
                ConnectionOutcome::Failed(reason),
            ),

            (Phase::Connecting, Event::Opened) => {
                self.phase = Phase::Open;
                vec![
                    Action::Report(ReportEvent::Connected { role }),
                    Action::SendLiveness,
                    Action::StartLinger,
                ]
            }
            (Phase::Connecting, Event::HandshakeTimerElapsed) => self.resolve(
                vec![
                    Action::Terminate,
                    Action::Report(ReportEvent::TimedOut { role }),
                ],
                ConnectionOutcome::TimedOut,
            ),
            (Phase::Connecting, Event::Closed) => self.resolve(
                vec![Action::Report(ReportEvent::Failed {
                    role,
                    reason: "connection closed before handshake".into(),
                })],
                ConnectionOutcome::Failed("connection closed before handshake".into()),
            ),

            (Phase::Open | Phase::Closing, Event::Message(Message::Text(text))) => {
                vec![Action::Report(ReportEvent::Received { role, text })]
            }
            (Phase::Open | Phase::Closing, Event::Message(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                vec![Action::Report(ReportEvent::Received { role, text })]
            }
            (Phase::Open, Event::LingerTimerElapsed) => {
                self.phase = Phase::Closing;
                vec![Action::Close, Action::StartCloseTimer]
            }
            (Phase::Open | Phase::Closing, Event::Closed) => self.resolve(
                vec![Action::Report(ReportEvent::Closed { role })],
                ConnectionOutcome::ConnectedAndClosed,
            ),
            (Phase::Closing, Event::CloseTimerElapsed) => self.resolve(
                vec![
                    Action::Terminate,
                    Action::Report(ReportEvent::Closed { role }),
                ],
                ConnectionOutcome::ConnectedAndClosed,
            ),

            _ => Vec::new(),
        }
    }

    fn resolve(&mut self, mut actions: Vec<Action>, outcome: ConnectionOutcome) -> Vec<Action> {
        self.settled = true;
        actions.push(Action::Resolve(outcome));
        actions
    }
}

/// Drives one connection attempt per [`verify`](Self::verify) call.
#[derive(Clone)]
pub struct Verifier {
    config: Config,
    reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Verifier {
    #[must_use]
    pub fn new(config: Config, reporter: Arc<dyn Reporter>) -> Self {
        Self { config, reporter }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Verify one descriptor. Never fails; every error becomes an outcome.
    pub async fn verify(&self, descriptor: &ConnectionDescriptor) -> ConnectionOutcome {
        self.reporter.report(&ReportEvent::Testing {
            role: descriptor.role().to_string(),
            endpoint: descriptor.endpoint().to_string(),
        });
        log_attributes(descriptor);

        let mut session = Session {
            lifecycle: Lifecycle::new(descriptor.role()),
            config: &self.config,
            reporter: self.reporter.as_ref(),
            conn: None,
            linger: None,
            close_timer: None,
            started: Instant::now(),
        };
        let outcome = session.run(descriptor).await;
        debug!(
            role = descriptor.role(),
            endpoint = descriptor.endpoint(),
            elapsed_ms = session.elapsed_ms(),
            outcome = %outcome,
            "verification finished"
        );
        outcome
    }
}

struct Session<'a> {
    lifecycle: Lifecycle,
    config: &'a Config,
    reporter: &'a dyn Reporter,
    conn: Option<Connection<TcpStream>>,
    linger: Option<Pin<Box<Sleep>>>,
    close_timer: Option<Pin<Box<Sleep>>>,
    started: Instant,
}

impl Session<'_> {
    async fn run(&mut self, descriptor: &ConnectionDescriptor) -> ConnectionOutcome {
        let first = match descriptor.parse_endpoint() {
            Ok(endpoint) => {
                let timer = sleep(self.config.timeouts.handshake);
                tokio::select! {
                    res = connect(&endpoint, self.config) => match res {
                        Ok(conn) => {
                            self.conn = Some(conn);
                            Event::Opened
                        }
                        Err(e) => Event::Error(e.to_string()),
                    },
                    () = timer => Event::HandshakeTimerElapsed,
                }
            }
            Err(e) => Event::Error(e.to_string()),
        };

        let mut event = first;
        loop {
            if let Some(outcome) = self.dispatch(event).await {
                return outcome;
            }

            event = tokio::select! {
                res = next_message(self.conn.as_mut()) => match res {
                    Ok(Some(Message::Close(_)) | None) => Event::Closed,
                    Ok(Some(message)) => Event::Message(message),
                    Err(e) => Event::Error(e.to_string()),
                },
                () = elapsed(&mut self.linger) => {
                    self.linger = None;
                    Event::LingerTimerElapsed
                }
                () = elapsed(&mut self.close_timer) => {
                    self.close_timer = None;
                    Event::CloseTimerElapsed
                }
            };
        }
    }

    async fn dispatch(&mut self, event: Event) -> Option<ConnectionOutcome> {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            trace!(
                role = self.lifecycle.role.as_str(),
                state = ?self.lifecycle.phase(),
                elapsed_ms = self.elapsed_ms(),
                ?event,
                "lifecycle event"
            );
            for action in self.lifecycle.handle(event) {
                match action {
                    Action::Report(report) => self.reporter.report(&report),
                    Action::SendLiveness => {
                        if let Err(e) = self.send_liveness().await {
                            queue.push_back(Event::Error(e.to_string()));
                        }
                    }
                    Action::StartLinger => {
                        self.linger = Some(Box::pin(sleep(self.config.timeouts.linger)));
                    }
                    Action::Close => {
                        if let Some(conn) = self.conn.as_mut() {
                            if let Err(e) = conn.close(CloseCode::Normal, "").await {
                                queue.push_back(Event::Error(e.to_string()));
                            }
                        }
                    }
                    Action::StartCloseTimer => {
                        self.close_timer = Some(Box::pin(sleep(self.config.timeouts.close)));
                    }
                    Action::Terminate => {
                        if let Some(conn) = self.conn.take() {
                            conn.terminate();
                        }
                    }
                    Action::Resolve(outcome) => return Some(outcome),
                }
            }
        }
        None
    }

    async fn send_liveness(&mut self) -> Result<()> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::ProtocolViolation("no open connection".into()))?;
        let payload = LivenessMessage::now().to_text()?;
        conn.send(Message::text(payload.clone())).await?;
        self.reporter.report(&ReportEvent::Sent {
            role: self.lifecycle.role.clone(),
            payload,
        });
        Ok(())
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Missing or malformed attributes are logged at warn and do not affect the outcome.
fn log_attributes(descriptor: &ConnectionDescriptor) {
    match descriptor.attributes() {
        Ok(attrs) => debug!(
            role = descriptor.role(),
            kind = %attrs.kind,
            instance_id = ?attrs.instance_id,
            project_id = ?attrs.project_id,
            extra = attrs.attributes.len(),
            "role attributes"
        ),
        Err(e) => warn!(
            role = descriptor.role(),
            endpoint = descriptor.endpoint(),
            error = %e,
            "endpoint path carries no usable role attributes"
        ),
    }
}

async fn next_message(conn: Option<&mut Connection<TcpStream>>) -> Result<Option<Message>> {
    match conn {
        Some(conn) => conn.recv().await,
        None => pending().await,
    }
}

async fn elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
