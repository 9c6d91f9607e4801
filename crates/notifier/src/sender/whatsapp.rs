//! WhatsApp sender over an HTTP messaging gateway.
//!
//! Two gateway flavours are supported:
//! - Meta Cloud API: static bearer token, pre-approved template message
//! - Azure Communication Services: bearer token from an OAuth2
//!   client-credentials exchange, plain text notification
//!
//! The token exchange (when configured) runs before every send. If it fails the
//! send is not attempted.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use herald_common::config::{WhatsAppConfig, WhatsAppCredential, WhatsAppVendor};
use herald_common::error::{AppError, AppResult};
use herald_common::types::ChannelKind;

use super::{ChannelSender, SendError};

/// Token endpoint response for the client-credentials grant.
#[derive(Debug, Clone, Deserialize)]
pub struct OauthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

pub struct WhatsAppSender {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WhatsAppSender {
    pub fn new(config: WhatsAppConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Request body for the configured vendor.
    pub fn payload(&self, contact: &str, body: &str) -> Value {
        match &self.config.vendor {
            WhatsAppVendor::Meta {
                template_name,
                language,
            } => json!({
                "messaging_product": "whatsapp",
                "to": contact,
                "type": "template",
                "template": {
                    "name": template_name,
                    "language": { "code": language },
                    "components": [
                        {
                            "type": "body",
                            "parameters": [
                                { "type": "text", "text": body }
                            ]
                        }
                    ]
                }
            }),
            WhatsAppVendor::Acs {
                channel_registration_id,
            } => json!({
                "channelRegistrationId": channel_registration_id,
                "to": [contact],
                "kind": "text",
                "content": body,
            }),
        }
    }

    fn check_arguments(&self, contact: &str, body: &str) -> Result<(), SendError> {
        if contact.is_empty() || body.is_empty() {
            return Err(SendError::InvalidArgument(
                "WhatsApp recipient and body must not be empty".to_string(),
            ));
        }
        if let WhatsAppVendor::Acs {
            channel_registration_id,
        } = &self.config.vendor
            && channel_registration_id.is_empty()
        {
            return Err(SendError::InvalidArgument(
                "ACS channel registration id (sender identity) is not set".to_string(),
            ));
        }
        Ok(())
    }

    async fn bearer_token(&self) -> Result<String, SendError> {
        match &self.config.credential {
            WhatsAppCredential::Token(token) => Ok(token.clone()),
            WhatsAppCredential::ClientCredentials {
                token_url,
                client_id,
                client_secret,
                scope,
            } => {
                let form = [
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", scope.as_str()),
                ];

                let response = self
                    .client
                    .post(token_url)
                    .form(&form)
                    .send()
                    .await
                    .map_err(|e| SendError::AuthFailure(format!("token request failed: {e}")))?;

                let status = response.status();
                if !status.is_success() {
                    let detail = response.text().await.unwrap_or_default();
                    return Err(SendError::AuthFailure(format!(
                        "token endpoint returned {status}: {detail}"
                    )));
                }

                let token: OauthTokenResponse = response.json().await.map_err(|e| {
                    SendError::AuthFailure(format!("invalid token response: {e}"))
                })?;

                tracing::debug!(expires_in = ?token.expires_in, "Obtained messaging access token");
                Ok(token.access_token)
            }
        }
    }
}

#[async_trait]
impl ChannelSender for WhatsAppSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::WhatsApp
    }

    async fn send(
        &self,
        contact: &str,
        _subject: Option<&str>,
        body: &str,
    ) -> Result<(), SendError> {
        if !self.config.is_configured() {
            return Err(SendError::NotConfigured(
                "WhatsApp endpoint or credentials are not set".to_string(),
            ));
        }
        self.check_arguments(contact, body)?;

        let token = self.bearer_token().await?;

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(token)
            .json(&self.payload(contact, body))
            .send()
            .await
            .map_err(|e| SendError::TransportFailure(format!("messaging request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SendError::TransportFailure(format!(
                "messaging gateway returned {status}: {detail}"
            )));
        }

        tracing::info!(to = %contact, status = status.as_u16(), "WhatsApp message sent");
        Ok(())
    }
}
