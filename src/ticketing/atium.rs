//! Atium helpdesk client.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::TicketingConfig;
use crate::error::TicketingError;
use crate::http::{body_text, build_client, send_with_retry};
use crate::session::SessionToken;
use crate::ticketing::{CustomerLookup, TicketRequest, TicketingClient};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    #[serde(rename = "CustSupp")]
    cust_supp: Option<serde_json::Value>,
}

/// `TicketingClient` backed by the Atium REST API.
pub struct AtiumClient {
    config: TicketingConfig,
    client: reqwest::Client,
}

impl AtiumClient {
    pub fn new(config: TicketingConfig) -> Self {
        let client = build_client(config.request_timeout);
        Self { config, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.endpoint)
    }
}

/// `CustSupp` comes back as a string or a number depending on the record.
fn customer_id(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl TicketingClient for AtiumClient {
    async fn login(&self) -> Result<SessionToken, TicketingError> {
        let payload = serde_json::json!({
            "username": self.config.username,
            "password": self.config.password.expose_secret(),
            "grant_type": "password",
        });

        let response = self
            .client
            .post(self.url("auth/login"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = body_text(response).await;
            return Err(TicketingError::AuthFailed {
                reason: format!("{status}: {body}"),
            });
        }

        let parsed: LoginResponse =
            response
                .json()
                .await
                .map_err(|e| TicketingError::InvalidResponse {
                    reason: format!("login response: {e}"),
                })?;

        parsed
            .auth_token
            .and_then(SessionToken::new)
            .ok_or_else(|| TicketingError::AuthFailed {
                reason: "login response has no auth_token".into(),
            })
    }

    async fn lookup_customer(&self, identifier: &str, session: &SessionToken) -> CustomerLookup {
        let url = self.url("modules/crm/checkCustomerExistance");
        let payload = serde_json::json!({ "searchString": identifier });

        let response = match send_with_retry("atium customer lookup", || {
            self.client
                .post(&url)
                .bearer_auth(session.expose())
                .json(&payload)
        })
        .await
        {
            Ok(r) => r,
            Err(e) => {
                return CustomerLookup::Error {
                    detail: format!("request failed: {e}"),
                };
            }
        };

        match response.status() {
            StatusCode::NO_CONTENT => CustomerLookup::NotFound,
            StatusCode::OK => match response.json::<CustomerResponse>().await {
                Ok(CustomerResponse {
                    cust_supp: Some(value),
                }) => match customer_id(value) {
                    Some(customer_id) => {
                        debug!(sender = identifier, customer_id = %customer_id, "Customer found");
                        CustomerLookup::Found { customer_id }
                    }
                    None => CustomerLookup::Error {
                        detail: "CustSupp is empty or not an id".into(),
                    },
                },
                Ok(_) => CustomerLookup::Error {
                    detail: "response has no CustSupp".into(),
                },
                Err(e) => CustomerLookup::Error {
                    detail: format!("invalid response: {e}"),
                },
            },
            status => {
                let body = body_text(response).await;
                warn!(sender = identifier, status = %status, "Customer lookup rejected");
                CustomerLookup::Error {
                    detail: format!("{status}: {body}"),
                }
            }
        }
    }

    async fn create_ticket(
        &self,
        request: &TicketRequest,
        session: &SessionToken,
    ) -> Result<(), TicketingError> {
        // No 429 retry: a throttled create may still have been recorded.
        let response = self
            .client
            .post(self.url("modules/rapportino/createTicketFromExternal"))
            .bearer_auth(session.expose())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TicketingError::RemoteRejection {
                status,
                body: body_text(response).await,
            });
        }
        Ok(())
    }
}
