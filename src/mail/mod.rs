//! Mailbox access: the `MailClient` seam and its Graph implementation.

pub mod graph;
pub mod html;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MailError;
use crate::session::SessionToken;

pub use graph::GraphMailClient;

/// An unread message as seen by the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Provider message id.
    pub id: String,
    /// Subject line; empty when the message has none.
    pub subject: String,
    /// Sender email address.
    pub sender: String,
    /// Plain-text body.
    pub body: String,
    pub is_read: bool,
}

/// Operations the poller needs from the mailbox provider.
///
/// Every failure is reported as a `MailError`; nothing panics across this
/// boundary.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Acquire a fresh mailbox session.
    async fn authenticate(&self) -> Result<SessionToken, MailError>;

    /// Fetch at most `max_count` unread messages, newest first.
    async fn fetch_unread(
        &self,
        session: &SessionToken,
        max_count: usize,
    ) -> Result<Vec<MailMessage>, MailError>;

    /// Replace the subject of a message.
    async fn set_subject(
        &self,
        session: &SessionToken,
        id: &str,
        subject: &str,
    ) -> Result<(), MailError>;

    /// Flag a message as read.
    async fn mark_read(&self, session: &SessionToken, id: &str) -> Result<(), MailError>;
}
