//! Reconciliation of a single unread message against the helpdesk.
//!
//! For each message:
//! 1. Skip it if the subject already carries the ticket marker
//! 2. Make sure a helpdesk session exists for this cycle
//! 3. Look the sender up as a customer
//! 4. Open a ticket with the message body as description
//! 5. Rewrite the subject with the marker, then mark the message read
//!
//! Any failure before the ticket exists leaves the message unread and
//! untouched, so the next cycle sees it as eligible again. Once the ticket
//! exists it is never rolled back; failing to mark the message only means
//! it may be ticketed again later.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::TicketDefaults;
use crate::error::TicketingError;
use crate::mail::{MailClient, MailMessage};
use crate::marker::{has_marker, mark_subject};
use crate::session::SessionToken;
use crate::ticketing::{CustomerLookup, TicketRequest, TicketingClient};

/// Why a customer lookup did not produce a customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// The sender is not a registered customer.
    NotRegistered,
    /// The lookup itself failed.
    Error(String),
}

impl fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered => write!(f, "sender is not a registered customer"),
            Self::Error(detail) => write!(f, "customer lookup failed: {detail}"),
        }
    }
}

/// Result of reconciling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Subject already carries the marker; nothing was done.
    Skipped,
    /// A ticket was opened. `completed` is false when the subject rewrite
    /// or the read flag could not be applied.
    TicketCreated { customer_id: String, completed: bool },
    /// The helpdesk refused or failed to open the ticket.
    TicketFailed { reason: String },
    /// The sender could not be resolved to a customer.
    LookupFailed(LookupFailure),
    /// No helpdesk session could be obtained.
    AuthFailed { reason: String },
}

impl Outcome {
    /// Short name for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::TicketCreated { .. } => "ticket_created",
            Self::TicketFailed { .. } => "ticket_failed",
            Self::LookupFailed(_) => "lookup_failed",
            Self::AuthFailed { .. } => "auth_failed",
        }
    }

    /// Whether the message was left untouched for a later cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TicketFailed { .. } | Self::LookupFailed(_) | Self::AuthFailed { .. }
        )
    }
}

/// Helpdesk session shared by all messages of one cycle.
///
/// Empty until the first message needs it. A failed login leaves it empty so
/// the next message tries again; a token, once obtained, is reused as-is.
#[derive(Debug, Default)]
pub struct TicketSession {
    token: Option<SessionToken>,
}

impl TicketSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.token.is_some()
    }

    /// Return the cycle's token, logging in on first use.
    pub async fn get_or_login(
        &mut self,
        client: &dyn TicketingClient,
    ) -> Result<SessionToken, TicketingError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let token = client.login().await?;
        self.token = Some(token.clone());
        Ok(token)
    }
}

/// Decides and executes the action for each unread message.
pub struct Reconciler {
    mail: Arc<dyn MailClient>,
    ticketing: Arc<dyn TicketingClient>,
    defaults: TicketDefaults,
}

impl Reconciler {
    pub fn new(
        mail: Arc<dyn MailClient>,
        ticketing: Arc<dyn TicketingClient>,
        defaults: TicketDefaults,
    ) -> Self {
        Self {
            mail,
            ticketing,
            defaults,
        }
    }

    /// Reconcile one message.
    pub async fn reconcile(
        &self,
        message: &MailMessage,
        mail_session: &SessionToken,
        tickets: &mut TicketSession,
    ) -> Outcome {
        if has_marker(&message.subject) {
            debug!(message_id = %message.id, "Ticket already opened; skipping");
            return Outcome::Skipped;
        }

        // An empty search string must never reach the customer lookup.
        if message.sender.trim().is_empty() {
            warn!(
                message_id = %message.id,
                "Message has no sender address; leaving it for manual handling"
            );
            return Outcome::LookupFailed(LookupFailure::NotRegistered);
        }

        let token = match tickets.get_or_login(self.ticketing.as_ref()).await {
            Ok(token) => token,
            Err(e) => {
                error!(message_id = %message.id, error = %e, "Helpdesk login failed");
                return Outcome::AuthFailed {
                    reason: e.to_string(),
                };
            }
        };

        let customer_id = match self
            .ticketing
            .lookup_customer(&message.sender, &token)
            .await
        {
            CustomerLookup::Found { customer_id } => customer_id,
            CustomerLookup::NotFound => {
                warn!(
                    message_id = %message.id,
                    sender = %message.sender,
                    "Sender is not a registered customer; leaving message for manual handling"
                );
                return Outcome::LookupFailed(LookupFailure::NotRegistered);
            }
            CustomerLookup::Error { detail } => {
                error!(
                    message_id = %message.id,
                    sender = %message.sender,
                    detail = %detail,
                    "Customer lookup failed"
                );
                return Outcome::LookupFailed(LookupFailure::Error(detail));
            }
        };

        let request = TicketRequest::new(
            customer_id.as_str(),
            self.defaults.service_area,
            self.defaults.opened_by,
            chrono::Local::now().naive_local(),
            message.body.as_str(),
        );

        if let Err(e) = self.ticketing.create_ticket(&request, &token).await {
            error!(
                message_id = %message.id,
                customer_id = %customer_id,
                error = %e,
                "Ticket creation failed"
            );
            return Outcome::TicketFailed {
                reason: e.to_string(),
            };
        }

        info!(
            message_id = %message.id,
            customer_id = %customer_id,
            service_area = %self.defaults.service_area,
            "Ticket opened"
        );

        let completed = self.mark_done(message, mail_session).await;
        Outcome::TicketCreated {
            customer_id,
            completed,
        }
    }

    /// Rewrite the subject, then mark read. Both are attempted; neither
    /// failure undoes the ticket.
    async fn mark_done(&self, message: &MailMessage, session: &SessionToken) -> bool {
        let new_subject = mark_subject(&message.subject);

        let subject_ok = match self
            .mail
            .set_subject(session, &message.id, &new_subject)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to rewrite subject");
                false
            }
        };

        let read_ok = match self.mail.mark_read(session, &message.id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to mark message read");
                false
            }
        };

        subject_ok && read_ok
    }
}
