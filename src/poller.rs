//! Fixed-interval mailbox poller.
//!
//! Each cycle authenticates against the mailbox, fetches one bounded batch
//! of unread messages, reconciles them one by one, then sleeps. Only a
//! mailbox authentication failure stops the loop; everything else is logged
//! and retried on the next cycle.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::PollConfig;
use crate::error::MailError;
use crate::mail::MailClient;
use crate::reconcile::{Outcome, Reconciler, TicketSession};
use crate::session::SessionToken;

/// Exit code reported when the mailbox session cannot be established.
pub const EXIT_AUTH_FAILED: u8 = 2;

/// State of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollState {
    /// Acquiring a mailbox session.
    Authenticating,
    /// Listing unread messages.
    Fetching,
    /// Running the batch through the reconciler.
    Reconciling,
    /// Sleeping until the next cycle.
    Waiting,
    /// Loop has exited.
    Terminated,
}

impl PollState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: PollState) -> bool {
        use PollState::*;

        matches!(
            (self, target),
            (Authenticating, Fetching) | (Authenticating, Terminated) |
            // A failed fetch or a panic skips straight to the sleep
            (Fetching, Reconciling) | (Fetching, Waiting) |
            (Reconciling, Waiting) |
            (Waiting, Authenticating) | (Waiting, Terminated)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authenticating => "authenticating",
            Self::Fetching => "fetching",
            Self::Reconciling => "reconciling",
            Self::Waiting => "waiting",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Why the poll loop stopped.
#[derive(Debug)]
pub enum PollExit {
    /// Shutdown was requested between cycles.
    Shutdown,
    /// The mailbox rejected authentication; operator action needed.
    AuthFailed(MailError),
}

impl PollExit {
    /// Process exit code for the supervisor.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Shutdown => 0,
            Self::AuthFailed(_) => EXIT_AUTH_FAILED,
        }
    }
}

/// Tally of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub skipped: usize,
    pub created: usize,
    /// Tickets created whose message could not be fully marked.
    pub incomplete: usize,
    pub ticket_failed: usize,
    pub lookup_failed: usize,
    pub auth_failed: usize,
    pub fetch_failed: bool,
    pub panicked: bool,
}

impl CycleReport {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::TicketCreated { completed, .. } => {
                self.created += 1;
                if !completed {
                    self.incomplete += 1;
                }
            }
            Outcome::TicketFailed { .. } => self.ticket_failed += 1,
            Outcome::LookupFailed(_) => self.lookup_failed += 1,
            Outcome::AuthFailed { .. } => self.auth_failed += 1,
        }
    }
}

/// Drives authenticate → fetch → reconcile → wait.
pub struct Poller {
    config: PollConfig,
    mail: Arc<dyn MailClient>,
    reconciler: Reconciler,
    state: watch::Sender<PollState>,
}

impl Poller {
    pub fn new(config: PollConfig, mail: Arc<dyn MailClient>, reconciler: Reconciler) -> Self {
        let (state, _) = watch::channel(PollState::Authenticating);
        Self {
            config,
            mail,
            reconciler,
            state,
        }
    }

    /// Current loop state.
    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: PollState) {
        let prev = self.state.send_replace(next);
        if prev == next {
            return;
        }
        if prev.can_transition_to(next) {
            debug!(from = %prev, to = %next, "Poller state change");
        } else {
            warn!(from = %prev, to = %next, "Unexpected poller state change");
        }
    }

    /// Run until shutdown is signalled or mailbox authentication fails.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> PollExit {
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Mail poller started"
        );

        loop {
            if *shutdown.borrow() {
                info!("Mail poller shutting down");
                self.set_state(PollState::Terminated);
                return PollExit::Shutdown;
            }

            match self.run_cycle().await {
                Ok(report) => info!(
                    fetched = report.fetched,
                    created = report.created,
                    incomplete = report.incomplete,
                    skipped = report.skipped,
                    ticket_failed = report.ticket_failed,
                    lookup_failed = report.lookup_failed,
                    auth_failed = report.auth_failed,
                    fetch_failed = report.fetch_failed,
                    panicked = report.panicked,
                    "Cycle complete; waiting for next poll"
                ),
                Err(e) => {
                    error!(error = %e, "Mailbox authentication failed; stopping poller");
                    return PollExit::AuthFailed(e);
                }
            }

            if self.wait(&mut shutdown).await {
                info!("Mail poller shutting down");
                self.set_state(PollState::Terminated);
                return PollExit::Shutdown;
            }
        }
    }

    /// Run a single cycle and leave the poller in `Waiting`.
    ///
    /// Returns `Err` only for mailbox authentication failure, after moving
    /// to `Terminated`.
    pub async fn run_cycle(&self) -> Result<CycleReport, MailError> {
        self.set_state(PollState::Authenticating);
        let session = match self.mail.authenticate().await {
            Ok(session) => session,
            Err(e) => {
                self.set_state(PollState::Terminated);
                return Err(e);
            }
        };
        debug!("Mailbox session acquired");

        // Tallies live outside the unwind boundary so a panic keeps them.
        let mut report = CycleReport::default();
        if let Err(panic) = AssertUnwindSafe(self.process_batch(&session, &mut report))
            .catch_unwind()
            .await
        {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            error!(reason = %reason, "Poll cycle panicked; will retry next cycle");
            report.panicked = true;
        }

        self.set_state(PollState::Waiting);
        Ok(report)
    }

    async fn process_batch(&self, session: &SessionToken, report: &mut CycleReport) {
        self.set_state(PollState::Fetching);
        let messages = match self.mail.fetch_unread(session, self.config.batch_size).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Failed to fetch unread messages");
                report.fetch_failed = true;
                return;
            }
        };

        report.fetched = messages.len();
        if messages.is_empty() {
            debug!("No unread messages");
        } else {
            info!("Fetched {} unread message(s)", messages.len());
        }

        self.set_state(PollState::Reconciling);
        let mut tickets = TicketSession::new();
        for message in &messages {
            debug!(message_id = %message.id, subject = %message.subject, "Reconciling message");
            let outcome = self
                .reconciler
                .reconcile(message, session, &mut tickets)
                .await;
            debug!(message_id = %message.id, outcome = outcome.label(), "Message reconciled");
            report.record(&outcome);
        }
    }

    /// Sleep for the poll interval. Returns true if shutdown was requested.
    async fn wait(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = tokio::time::sleep(self.config.interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return *shutdown.borrow(),
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => return true,
                    Ok(()) => continue,
                    // Nobody can signal shutdown anymore; just finish the sleep.
                    Err(_) => {
                        (&mut sleep).await;
                        return false;
                    }
                },
            }
        }
    }
}
