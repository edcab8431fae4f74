//! Microsoft Graph mailbox client (client-credentials flow).

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::config::MailConfig;
use crate::error::MailError;
use crate::http::{body_text, build_client, send_with_retry};
use crate::mail::html::html_to_text;
use crate::mail::{MailClient, MailMessage};
use crate::session::SessionToken;

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const MESSAGE_SELECT_FIELDS: &str = "id,subject,from,receivedDateTime,body,isRead";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    subject: Option<String>,
    from: Option<GraphRecipient>,
    body: Option<GraphBody>,
    #[serde(default)]
    is_read: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphEmailAddress>,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody {
    content_type: Option<String>,
    content: Option<String>,
}

impl From<GraphMessage> for MailMessage {
    fn from(msg: GraphMessage) -> Self {
        let sender = msg
            .from
            .and_then(|f| f.email_address)
            .and_then(|e| e.address)
            .unwrap_or_default();
        let body = msg
            .body
            .map(|b| {
                let content = b.content.unwrap_or_default();
                if b
                    .content_type
                    .is_some_and(|t| t.eq_ignore_ascii_case("html"))
                {
                    html_to_text(&content)
                } else {
                    content
                }
            })
            .unwrap_or_default();

        Self {
            id: msg.id,
            subject: msg.subject.unwrap_or_default(),
            sender,
            body,
            is_read: msg.is_read,
        }
    }
}

/// Graph-backed `MailClient` for a single mailbox.
pub struct GraphMailClient {
    config: MailConfig,
    client: reqwest::Client,
}

impl GraphMailClient {
    pub fn new(config: MailConfig) -> Self {
        let client = build_client(config.request_timeout);
        Self { config, client }
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.authority_url, self.config.tenant_id
        )
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/users/{}/messages",
            self.config.api_url, self.config.mailbox
        )
    }

    /// Message ids are base64 and may contain `/`, `+` or `=`.
    fn message_url(&self, id: &str) -> String {
        format!("{}/{}", self.messages_url(), urlencoding::encode(id))
    }

    async fn patch_message(
        &self,
        session: &SessionToken,
        id: &str,
        body: serde_json::Value,
        label: &str,
    ) -> Result<(), MailError> {
        let url = self.message_url(id);
        let response = send_with_retry(label, || {
            self.client
                .patch(&url)
                .bearer_auth(session.expose())
                .json(&body)
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Status {
                status,
                body: body_text(response).await,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MailClient for GraphMailClient {
    async fn authenticate(&self) -> Result<SessionToken, MailError> {
        let response = self
            .client
            .post(self.token_url())
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<TokenResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let reason = parsed
                .and_then(|p| p.error_description)
                .unwrap_or_else(|| crate::http::redact_body(&body));
            return Err(MailError::AuthFailed {
                reason: format!("{status}: {reason}"),
            });
        }

        parsed
            .and_then(|p| p.access_token)
            .and_then(SessionToken::new)
            .ok_or_else(|| MailError::AuthFailed {
                reason: "token response has no access_token".into(),
            })
    }

    async fn fetch_unread(
        &self,
        session: &SessionToken,
        max_count: usize,
    ) -> Result<Vec<MailMessage>, MailError> {
        let url = self.messages_url();
        let top = max_count.to_string();
        let response = send_with_retry("graph list unread", || {
            self.client
                .get(&url)
                .bearer_auth(session.expose())
                .query(&[
                    ("$filter", "isRead eq false"),
                    ("$select", MESSAGE_SELECT_FIELDS),
                    ("$orderby", "receivedDateTime desc"),
                    ("$top", top.as_str()),
                ])
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Status {
                status,
                body: body_text(response).await,
            });
        }

        let page: MessagePage =
            response
                .json()
                .await
                .map_err(|e| MailError::InvalidResponse {
                    reason: format!("message list: {e}"),
                })?;

        debug!(count = page.value.len(), "Fetched unread messages");

        // Graph may ignore $top on some endpoints; never exceed the batch.
        Ok(page
            .value
            .into_iter()
            .take(max_count)
            .map(MailMessage::from)
            .collect())
    }

    async fn set_subject(
        &self,
        session: &SessionToken,
        id: &str,
        subject: &str,
    ) -> Result<(), MailError> {
        self.patch_message(
            session,
            id,
            serde_json::json!({ "subject": subject }),
            "graph set subject",
        )
        .await
    }

    async fn mark_read(&self, session: &SessionToken, id: &str) -> Result<(), MailError> {
        self.patch_message(
            session,
            id,
            serde_json::json!({ "isRead": true }),
            "graph mark read",
        )
        .await
    }
}
