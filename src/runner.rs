//! Sequential test run over a registry.

use std::sync::Arc;

use tracing::{debug, error};

use crate::config::Config;
use crate::registry::Registry;
use crate::report::{ReportEvent, Reporter};
use crate::verifier::{ConnectionOutcome, Verifier};

/// Outcomes of one run, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    results: Vec<(String, ConnectionOutcome)>,
}

impl RunReport {
    #[must_use]
    pub fn results(&self) -> &[(String, ConnectionOutcome)] {
        &self.results
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, ConnectionOutcome::ConnectedAndClosed))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ConnectionOutcome::Failed(_)))
    }

    #[must_use]
    pub fn timed_out(&self) -> usize {
        self.count(|o| matches!(o, ConnectionOutcome::TimedOut))
    }

    /// True when every descriptor connected and closed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|(_, o)| o.is_success())
    }

    fn count(&self, pred: impl Fn(&ConnectionOutcome) -> bool) -> usize {
        self.results.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Verifies every descriptor of a registry, one at a time.
#[derive(Clone)]
pub struct TestRunner {
    verifier: Verifier,
    reporter: Arc<dyn Reporter>,
}

impl TestRunner {
    #[must_use]
    pub fn new(config: Config, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            verifier: Verifier::new(config, Arc::clone(&reporter)),
            reporter,
        }
    }

    /// Run the registry in order and report completion.
    ///
    /// Each verification runs in its own task and finishes before the next
    /// starts. A task that dies is recorded as a failure for its descriptor.
    pub async fn run(&self, registry: &Registry) -> RunReport {
        let mut report = RunReport::default();

        for descriptor in registry {
            let verifier = self.verifier.clone();
            let task_descriptor = descriptor.clone();
            let handle = tokio::spawn(async move { verifier.verify(&task_descriptor).await });

            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(role = descriptor.role(), error = %e, "verification task died");
                    let reason = format!("unexpected harness error: {e}");
                    self.reporter.report(&ReportEvent::Failed {
                        role: descriptor.role().to_string(),
                        reason: reason.clone(),
                    });
                    ConnectionOutcome::Failed(reason)
                }
            };
            debug!(role = descriptor.role(), outcome = %outcome, "descriptor done");
            report.results.push((descriptor.role().to_string(), outcome));
        }

        self.reporter.report(&ReportEvent::Completed);
        report
    }
}
