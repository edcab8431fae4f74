//! In-memory mailbox and helpdesk fakes sharing one call journal.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mail_agent::config::TicketDefaults;
use mail_agent::error::{MailError, TicketingError};
use mail_agent::mail::{MailClient, MailMessage};
use mail_agent::reconcile::Reconciler;
use mail_agent::session::SessionToken;
use mail_agent::ticketing::{CustomerLookup, TicketRequest, TicketingClient};

/// Every collaborator call, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    MailAuth,
    Fetch { max: usize },
    SetSubject { id: String, subject: String },
    MarkRead { id: String },
    Login,
    Lookup { sender: String },
    Create { customer: String, description: String },
}

pub type Journal = Arc<Mutex<Vec<Call>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(journal: &Journal) -> Vec<Call> {
    journal.lock().unwrap().clone()
}

pub fn message(id: &str, subject: &str, sender: &str) -> MailMessage {
    MailMessage {
        id: id.into(),
        subject: subject.into(),
        sender: sender.into(),
        body: format!("body of {id}"),
        is_read: false,
    }
}

pub fn token() -> SessionToken {
    SessionToken::new("mail-token").unwrap()
}

// ── Mailbox ─────────────────────────────────────────────────────────

pub struct FakeMail {
    journal: Journal,
    mailbox: Mutex<Vec<MailMessage>>,
    pub auth_ok: AtomicBool,
    pub fetch_ok: AtomicBool,
    pub set_subject_ok: AtomicBool,
    pub mark_read_ok: AtomicBool,
}

impl FakeMail {
    pub fn new(journal: &Journal, messages: Vec<MailMessage>) -> Arc<Self> {
        Arc::new(Self {
            journal: Arc::clone(journal),
            mailbox: Mutex::new(messages),
            auth_ok: AtomicBool::new(true),
            fetch_ok: AtomicBool::new(true),
            set_subject_ok: AtomicBool::new(true),
            mark_read_ok: AtomicBool::new(true),
        })
    }

    pub fn get(&self, id: &str) -> MailMessage {
        self.mailbox
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .expect("message exists")
    }

    fn record(&self, call: Call) {
        self.journal.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MailClient for FakeMail {
    async fn authenticate(&self) -> Result<SessionToken, MailError> {
        self.record(Call::MailAuth);
        if self.auth_ok.load(Ordering::SeqCst) {
            Ok(token())
        } else {
            Err(MailError::AuthFailed {
                reason: "invalid_client".into(),
            })
        }
    }

    async fn fetch_unread(
        &self,
        _session: &SessionToken,
        max_count: usize,
    ) -> Result<Vec<MailMessage>, MailError> {
        self.record(Call::Fetch { max: max_count });
        if !self.fetch_ok.load(Ordering::SeqCst) {
            return Err(MailError::InvalidResponse {
                reason: "connection reset".into(),
            });
        }
        Ok(self
            .mailbox
            .lock()
            .unwrap()
            .iter()
            .filter(|m| !m.is_read)
            .take(max_count)
            .cloned()
            .collect())
    }

    async fn set_subject(
        &self,
        _session: &SessionToken,
        id: &str,
        subject: &str,
    ) -> Result<(), MailError> {
        self.record(Call::SetSubject {
            id: id.into(),
            subject: subject.into(),
        });
        if !self.set_subject_ok.load(Ordering::SeqCst) {
            return Err(MailError::InvalidResponse {
                reason: "patch failed".into(),
            });
        }
        if let Some(m) = self.mailbox.lock().unwrap().iter_mut().find(|m| m.id == id) {
            m.subject = subject.into();
        }
        Ok(())
    }

    async fn mark_read(&self, _session: &SessionToken, id: &str) -> Result<(), MailError> {
        self.record(Call::MarkRead { id: id.into() });
        if !self.mark_read_ok.load(Ordering::SeqCst) {
            return Err(MailError::InvalidResponse {
                reason: "patch failed".into(),
            });
        }
        if let Some(m) = self.mailbox.lock().unwrap().iter_mut().find(|m| m.id == id) {
            m.is_read = true;
        }
        Ok(())
    }
}

// ── Helpdesk ────────────────────────────────────────────────────────

pub struct FakeTicketing {
    journal: Journal,
    customers: Mutex<HashMap<String, CustomerLookup>>,
    pub login_ok: AtomicBool,
    pub create_ok: AtomicBool,
    pub panic_on_lookup: AtomicBool,
    /// Lookups for this sender panic.
    pub panic_sender: Mutex<Option<String>>,
    created: Mutex<Vec<TicketRequest>>,
}

impl FakeTicketing {
    pub fn new(journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            journal: Arc::clone(journal),
            customers: Mutex::new(HashMap::new()),
            login_ok: AtomicBool::new(true),
            create_ok: AtomicBool::new(true),
            panic_on_lookup: AtomicBool::new(false),
            panic_sender: Mutex::new(None),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Register how a sender lookup answers. Unknown senders are not found.
    pub fn customer(&self, sender: &str, lookup: CustomerLookup) {
        self.customers.lock().unwrap().insert(sender.into(), lookup);
    }

    pub fn created(&self) -> Vec<TicketRequest> {
        self.created.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.journal.lock().unwrap().push(call);
    }
}

#[async_trait]
impl TicketingClient for FakeTicketing {
    async fn login(&self) -> Result<SessionToken, TicketingError> {
        self.record(Call::Login);
        if self.login_ok.load(Ordering::SeqCst) {
            Ok(SessionToken::new("ticket-token").unwrap())
        } else {
            Err(TicketingError::AuthFailed {
                reason: "401 Unauthorized".into(),
            })
        }
    }

    async fn lookup_customer(&self, identifier: &str, _session: &SessionToken) -> CustomerLookup {
        self.record(Call::Lookup {
            sender: identifier.into(),
        });
        if self.panic_on_lookup.load(Ordering::SeqCst)
            || self.panic_sender.lock().unwrap().as_deref() == Some(identifier)
        {
            panic!("lookup exploded");
        }
        self.customers
            .lock()
            .unwrap()
            .get(identifier)
            .cloned()
            .unwrap_or(CustomerLookup::NotFound)
    }

    async fn create_ticket(
        &self,
        request: &TicketRequest,
        _session: &SessionToken,
    ) -> Result<(), TicketingError> {
        self.record(Call::Create {
            customer: request.customer.clone(),
            description: request.description.clone(),
        });
        if !self.create_ok.load(Ordering::SeqCst) {
            return Err(TicketingError::InvalidResponse {
                reason: "500 Internal Server Error".into(),
            });
        }
        self.created.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub fn reconciler(mail: &Arc<FakeMail>, ticketing: &Arc<FakeTicketing>) -> Reconciler {
    Reconciler::new(
        Arc::clone(mail) as Arc<dyn MailClient>,
        Arc::clone(ticketing) as Arc<dyn TicketingClient>,
        TicketDefaults::default(),
    )
}
