//! Helpdesk access: the `TicketingClient` seam and its Atium implementation.

pub mod atium;

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::error::TicketingError;
use crate::session::SessionToken;

pub use atium::AtiumClient;

/// Activity state for tickets opened from mail ("aperto").
pub const OPEN_ACTIVITY_STATE: &str = "AP";

/// Result of looking a sender up in the helpdesk CRM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerLookup {
    Found { customer_id: String },
    /// The CRM answered with no content: the sender is not a customer.
    NotFound,
    /// Any other failure, with a diagnostic for the operator.
    Error { detail: String },
}

/// Service area of a ticket, which selects the helpdesk template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceArea {
    /// ERP ("Mago") support.
    Mago,
    /// Everything else.
    Generic,
}

/// Helpdesk template identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TemplateId(pub u32);

impl ServiceArea {
    /// Parse a configured label.
    ///
    /// Unrecognized labels fall back to `Generic` with a warning.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "mago" => Self::Mago,
            "undistinguished" | "generic" => Self::Generic,
            other => {
                warn!(
                    service_area = other,
                    "Unknown service area; using the generic ticket template"
                );
                Self::Generic
            }
        }
    }

    /// Template used when opening a ticket in this area.
    pub fn template(self) -> TemplateId {
        match self {
            Self::Mago => TemplateId(59),
            Self::Generic => TemplateId(62),
        }
    }
}

impl fmt::Display for ServiceArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mago => "mago",
            Self::Generic => "generic",
        };
        write!(f, "{s}")
    }
}

/// A ticket to open, in the helpdesk wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketRequest {
    #[serde(rename = "activityDate", serialize_with = "serialize_activity_time")]
    pub activity_date: NaiveDateTime,
    #[serde(rename = "activityTime", serialize_with = "serialize_activity_time")]
    pub activity_time: NaiveDateTime,
    #[serde(rename = "activityState")]
    pub activity_state: &'static str,
    pub customer: String,
    #[serde(rename = "IsTicket")]
    pub is_ticket: bool,
    #[serde(rename = "templateId")]
    pub template_id: TemplateId,
    #[serde(rename = "OpenedBy")]
    pub opened_by: u32,
    pub description: String,
}

impl TicketRequest {
    pub fn new(
        customer: impl Into<String>,
        area: ServiceArea,
        opened_by: u32,
        activity_at: NaiveDateTime,
        description: impl Into<String>,
    ) -> Self {
        Self {
            activity_date: activity_at,
            activity_time: activity_at,
            activity_state: OPEN_ACTIVITY_STATE,
            customer: customer.into(),
            is_ticket: true,
            template_id: area.template(),
            opened_by,
            description: description.into(),
        }
    }
}

fn serialize_activity_time<S: Serializer>(
    value: &NaiveDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&value.format("%Y-%m-%d %H:%M:%S"))
}

/// Operations the reconciler needs from the helpdesk.
#[async_trait]
pub trait TicketingClient: Send + Sync {
    /// Open a helpdesk session.
    async fn login(&self) -> Result<SessionToken, TicketingError>;

    /// Find the customer registered under `identifier` (a sender address).
    async fn lookup_customer(&self, identifier: &str, session: &SessionToken) -> CustomerLookup;

    /// Open a ticket.
    async fn create_ticket(
        &self,
        request: &TicketRequest,
        session: &SessionToken,
    ) -> Result<(), TicketingError>;
}
