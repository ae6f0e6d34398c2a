use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult, DeliveryError};

/// Discord JSON error code: Missing Access.
pub const MISSING_ACCESS: u64 = 50001;
/// Discord JSON error code: Missing Permissions.
pub const MISSING_PERMISSIONS: u64 = 50013;
/// Discord rejects messages carrying more embeds than this.
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

#[derive(Clone)]
pub struct DiscordService {
    client: reqwest::Client,
    bot_token: String,
    api_base: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<EmbedField>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Reply target for a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReference {
    pub message_id: String,
    /// Post normally if the referenced message was deleted.
    pub fail_if_not_exists: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscordMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<DiscordEmbed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReference>,
}

impl DiscordMessage {
    pub fn embeds(embeds: Vec<DiscordEmbed>) -> Self {
        Self {
            content: None,
            embeds: Some(embeds),
            message_reference: None,
        }
    }

    pub fn reply_to(mut self, message_id: &str) -> Self {
        if !message_id.is_empty() {
            self.message_reference = Some(MessageReference {
                message_id: message_id.to_string(),
                fail_if_not_exists: false,
            });
        }
        self
    }
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

/// Delivery seam used by the tracker.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Post a message to a channel, returning the new message id.
    async fn send_message(
        &self,
        channel_id: &str,
        message: DiscordMessage,
    ) -> Result<String, DeliveryError>;
}

impl DiscordService {
    pub fn new(bot_token: String) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(AppError::Request)?;

        Ok(Self {
            client,
            bot_token,
            api_base: "https://discord.com/api/v10".to_string(),
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_base, endpoint)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// Parse retry_after from a Discord rate limit error response
    fn parse_retry_after(error_text: &str) -> Option<f64> {
        serde_json::from_str::<Value>(error_text)
            .ok()?
            .get("retry_after")?
            .as_f64()
    }

    async fn post_message(
        &self,
        url: &str,
        message: &DiscordMessage,
    ) -> Result<reqwest::Response, DeliveryError> {
        self.client
            .post(url)
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/json")
            .json(message)
            .send()
            .await
            .map_err(|e| DeliveryError::Failed(format!("Failed to send message: {}", e)))
    }

    /// Send a message to a channel.
    /// Waits out and retries once on a Discord rate limit (429).
    pub async fn create_message(
        &self,
        channel_id: &str,
        message: &DiscordMessage,
    ) -> Result<String, DeliveryError> {
        let url = self.api_url(&format!("/channels/{}/messages", channel_id));

        let mut response = self.post_message(&url, message).await?;

        if response.status().as_u16() == 429 {
            let error_text = response.text().await.unwrap_or_default();
            let Some(retry_after) = Self::parse_retry_after(&error_text) else {
                return Err(DeliveryError::RateLimited);
            };
            let wait_seconds = retry_after.ceil() as u64 + 1;
            tracing::warn!(
                "Discord rate limit hit, waiting {} seconds before retry",
                wait_seconds
            );
            tokio::time::sleep(std::time::Duration::from_secs(wait_seconds)).await;
            response = self.post_message(&url, message).await?;
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body));
        }

        serde_json::from_str::<CreatedMessage>(&body)
            .map(|m| m.id)
            .map_err(|e| DeliveryError::Failed(format!("Failed to parse message response: {}", e)))
    }
}

#[async_trait]
impl Notifier for DiscordService {
    async fn send_message(
        &self,
        channel_id: &str,
        message: DiscordMessage,
    ) -> Result<String, DeliveryError> {
        self.create_message(channel_id, &message).await
    }
}

/// Map a failed Discord response to its delivery error kind.
pub fn classify_error(status: u16, body: &str) -> DeliveryError {
    let json = serde_json::from_str::<Value>(body).ok();
    let code = json
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_u64);
    let message = json
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(body)
        .to_string();

    match code {
        Some(code @ (MISSING_ACCESS | MISSING_PERMISSIONS)) => {
            DeliveryError::PermissionLost { code, message }
        }
        _ if status == 429 => DeliveryError::RateLimited,
        _ => DeliveryError::Failed(format!("Discord API error ({}): {}", status, message)),
    }
}

impl DiscordEmbed {
    pub fn new() -> Self {
        Self {
            title: None,
            description: None,
            color: None,
            timestamp: None,
            footer: None,
            fields: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> Self {
        let field = EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        };
        match &mut self.fields {
            Some(fields) => fields.push(field),
            None => self.fields = Some(vec![field]),
        }
        self
    }
}

impl Default for DiscordEmbed {
    fn default() -> Self {
        Self::new()
    }
}

// Color constants for embeds
pub mod colors {
    pub const LIVE: u32 = 0xE84057;
    pub const VICTORY: u32 = 0x57F287;
    pub const DEFEAT: u32 = 0xED4245;
    pub const REMAKE: u32 = 0x99AAB5;
}
