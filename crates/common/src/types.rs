use serde::{Deserialize, Serialize};

/// Delivery channel requested by an event.
///
/// Tags are matched case-sensitively against their canonical uppercase form
/// (`EMAIL`, `WHATSAPP`). Anything else is kept verbatim in `Unknown` so it can
/// be logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChannelKind {
    Email,
    WhatsApp,
    Unknown(String),
}

impl ChannelKind {
    pub fn as_str(&self) -> &str {
        match self {
            ChannelKind::Email => "EMAIL",
            ChannelKind::WhatsApp => "WHATSAPP",
            ChannelKind::Unknown(tag) => tag,
        }
    }
}

impl From<String> for ChannelKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "EMAIL" => ChannelKind::Email,
            "WHATSAPP" => ChannelKind::WhatsApp,
            _ => ChannelKind::Unknown(tag),
        }
    }
}

impl From<ChannelKind> for String {
    fn from(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested delivery target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    /// Email address or phone number. Format is left to the transport.
    #[serde(default)]
    pub contact: String,
}

/// Inbound unit of work read off the notification queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationEvent {
    /// Only used for traceability in logs.
    pub user_id: String,
    pub notification_message: String,
    pub channels: Vec<NotificationChannel>,
}

impl NotificationEvent {
    /// Events without a body or without channels are skipped, never partially
    /// dispatched.
    pub fn is_deliverable(&self) -> bool {
        !self.notification_message.is_empty() && !self.channels.is_empty()
    }
}
