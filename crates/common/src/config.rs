use std::str::FromStr;

use crate::error::{AppError, AppResult};

const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
const DEFAULT_QUEUE_NAME: &str = "notifications";
const DEFAULT_ACS_SCOPE: &str = "https://communication.azure.com/.default";
const DEFAULT_META_TEMPLATE: &str = "transaction_update";
const DEFAULT_META_LANGUAGE: &str = "en_US";

/// Worker configuration, built once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Redis connection string
    pub redis_url: String,

    /// Name of the Redis list events are pushed onto
    pub queue_name: String,

    /// Upper bound for a single blocking receive (default: 60)
    pub receive_timeout_secs: u64,

    /// Wait after a failed receive before polling again (default: 5000)
    pub receive_backoff_ms: u64,

    /// What to do with a message whose dispatch partially failed
    pub failure_policy: FailurePolicy,

    /// Per-channel transport credentials
    pub channels: ChannelSenderConfig,
}

/// Acknowledgement policy for messages that were processed but had at least one
/// failed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Remove the message and rely on the logged failure.
    #[default]
    Complete,
    /// Put the message back for redelivery of every channel.
    Abandon,
}

impl FromStr for FailurePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "complete" => Ok(FailurePolicy::Complete),
            "abandon" => Ok(FailurePolicy::Abandon),
            other => Err(AppError::Config(format!(
                "FAILURE_POLICY must be 'complete' or 'abandon', got '{other}'"
            ))),
        }
    }
}

/// Credentials for every delivery channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelSenderConfig {
    pub email: EmailConfig,
    pub whatsapp: WhatsAppConfig,
}

/// SMTP authentication mechanism offered to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpAuth {
    #[default]
    Plain,
    /// Two-step `Username:` / `Password:` challenge exchange.
    Login,
}

impl FromStr for SmtpAuth {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(SmtpAuth::Plain),
            "login" => Ok(SmtpAuth::Login),
            other => Err(AppError::Config(format!(
                "SMTP_AUTH must be 'plain' or 'login', got '{other}'"
            ))),
        }
    }
}

/// How the SMTP session is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS (port 587).
    #[default]
    StartTls,
    /// TLS from the first byte (port 465).
    Wrapper,
    /// No encryption. Only meant for local relays.
    None,
}

impl FromStr for SmtpTls {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "starttls" => Ok(SmtpTls::StartTls),
            "tls" | "wrapper" => Ok(SmtpTls::Wrapper),
            "none" => Ok(SmtpTls::None),
            other => Err(AppError::Config(format!(
                "SMTP_TLS must be 'starttls', 'tls' or 'none', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub secret: String,
    /// The `From` address
    pub sender: String,
    pub auth: SmtpAuth,
    pub tls: SmtpTls,
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            username: String::new(),
            secret: String::new(),
            sender: String::new(),
            auth: SmtpAuth::default(),
            tls: SmtpTls::default(),
            timeout_secs: 30,
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
            && self.port.is_some()
            && !self.username.is_empty()
            && !self.secret.is_empty()
            && !self.sender.is_empty()
    }
}

/// How the messaging gateway authenticates requests.
#[derive(Debug, Clone)]
pub enum WhatsAppCredential {
    /// Long-lived bearer token sent as is.
    Token(String),
    /// OAuth2 client-credentials grant exchanged for a bearer token before each send.
    ClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: String,
        scope: String,
    },
}

impl WhatsAppCredential {
    pub fn is_complete(&self) -> bool {
        match self {
            WhatsAppCredential::Token(token) => !token.is_empty(),
            WhatsAppCredential::ClientCredentials {
                token_url,
                client_id,
                client_secret,
                ..
            } => !token_url.is_empty() && !client_id.is_empty() && !client_secret.is_empty(),
        }
    }
}

/// Request body schema expected by the messaging gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhatsAppVendor {
    /// Meta Cloud API pre-approved template message.
    Meta {
        template_name: String,
        language: String,
    },
    /// Azure Communication Services advanced messaging.
    Acs { channel_registration_id: String },
}

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub endpoint: String,
    pub credential: WhatsAppCredential,
    pub vendor: WhatsAppVendor,
    pub timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            credential: WhatsAppCredential::Token(String::new()),
            vendor: WhatsAppVendor::Meta {
                template_name: DEFAULT_META_TEMPLATE.to_string(),
                language: DEFAULT_META_LANGUAGE.to_string(),
            },
            timeout_secs: 30,
        }
    }
}

impl WhatsAppConfig {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && self.credential.is_complete()
    }
}

impl AppConfig {
    /// Load configuration from environment variables (and `.env` when present).
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let text = |key: &str| get(key).unwrap_or_default();
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let email = EmailConfig {
            host: text("SMTP_HOST"),
            port: get("SMTP_PORT")
                .map(|v| {
                    v.parse()
                        .map_err(|_| AppError::Config("SMTP_PORT must be a valid u16".into()))
                })
                .transpose()?,
            username: text("SMTP_USERNAME"),
            secret: text("SMTP_PASSWORD"),
            sender: get("SMTP_SENDER")
                .or_else(|| get("ACS_SENDER_EMAIL"))
                .unwrap_or_default(),
            auth: get("SMTP_AUTH")
                .map(|v| v.parse::<SmtpAuth>())
                .transpose()?
                .unwrap_or_default(),
            tls: get("SMTP_TLS")
                .map(|v| v.parse::<SmtpTls>())
                .transpose()?
                .unwrap_or_default(),
            timeout_secs: parse_or(&get, "SMTP_TIMEOUT_SECS", 30)?,
        };

        let http_timeout_secs = parse_or(&get, "HTTP_TIMEOUT_SECS", 30)?;
        let provider = or("WHATSAPP_PROVIDER", "meta").to_ascii_lowercase();
        let whatsapp = match provider.as_str() {
            "meta" => WhatsAppConfig {
                endpoint: text("META_API_URL"),
                credential: WhatsAppCredential::Token(text("META_API_TOKEN")),
                vendor: WhatsAppVendor::Meta {
                    template_name: or("META_TEMPLATE_NAME", DEFAULT_META_TEMPLATE),
                    language: or("META_TEMPLATE_LANGUAGE", DEFAULT_META_LANGUAGE),
                },
                timeout_secs: http_timeout_secs,
            },
            "acs" => WhatsAppConfig {
                endpoint: text("ACS_ENDPOINT"),
                credential: WhatsAppCredential::ClientCredentials {
                    token_url: text("ACS_TOKEN_URL"),
                    client_id: text("ACS_APP_ID"),
                    client_secret: text("ACS_APP_SECRET"),
                    scope: or("ACS_SCOPE", DEFAULT_ACS_SCOPE),
                },
                vendor: WhatsAppVendor::Acs {
                    channel_registration_id: text("ACS_CHANNEL_REGISTRATION_ID"),
                },
                timeout_secs: http_timeout_secs,
            },
            other => {
                return Err(AppError::Config(format!(
                    "WHATSAPP_PROVIDER must be 'meta' or 'acs', got '{other}'"
                )));
            }
        };

        // A zero timeout makes a blocking receive wait forever.
        let receive_timeout_secs = parse_or(&get, "RECEIVE_TIMEOUT_SECS", 60)?;
        if receive_timeout_secs == 0 {
            return Err(AppError::Config(
                "RECEIVE_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        Ok(Self {
            redis_url: or("REDIS_URL", DEFAULT_REDIS_URL),
            queue_name: or("NOTIFICATION_QUEUE", DEFAULT_QUEUE_NAME),
            receive_timeout_secs,
            receive_backoff_ms: parse_or(&get, "RECEIVE_BACKOFF_MS", 5000)?,
            failure_policy: get("FAILURE_POLICY")
                .map(|v| v.parse::<FailurePolicy>())
                .transpose()?
                .unwrap_or_default(),
            channels: ChannelSenderConfig { email, whatsapp },
        })
    }

    /// Warn about every channel that will reject sends.
    pub fn log_channel_status(&self) {
        if self.channels.email.is_configured() {
            tracing::info!(host = %self.channels.email.host, "SMTP email channel configured");
        } else {
            tracing::warn!("SMTP variables not fully set, email delivery will fail");
        }

        if self.channels.whatsapp.is_configured() {
            tracing::info!(endpoint = %self.channels.whatsapp.endpoint, "WhatsApp channel configured");
        } else {
            tracing::warn!("WhatsApp endpoint or credentials not set, WhatsApp delivery will fail");
        }
    }
}

fn parse_or<G>(get: &G, key: &str, default: u64) -> AppResult<u64>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a valid u64"))),
        None => Ok(default),
    }
}
