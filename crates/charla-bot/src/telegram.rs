//! Telegram Bot API types and the outgoing reply sender.

use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

/// Incoming webhook update. Only the fields the bot reads; everything else
/// in Telegram's payload is ignored.
#[derive(Deserialize, Debug, Clone)]
pub struct Update {
    pub message: Option<IncomingMessage>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct IncomingMessage {
    pub text: Option<String>,
    pub chat: Chat,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Chat {
    pub id: i64,
}

/// Escape the characters Telegram's legacy Markdown parse mode trips over.
pub fn escape_markdown(text: &str) -> String {
    text.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

/// Sends replies through the Telegram Bot API.
///
/// Sending is best-effort: a failure is logged together with the content
/// that could not be delivered, and never propagates.
pub struct TelegramSender {
    client: reqwest::Client,
    send_url: String,
}

impl TelegramSender {
    pub fn new(bot_token: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            send_url: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
        })
    }

    /// Send one message to a chat.
    pub async fn send_reply(&self, chat_id: i64, text: &str) {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": escape_markdown(text),
            "parse_mode": "Markdown",
        });
        let result = self.client.post(&self.send_url).json(&body).send().await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                info!("message sent to {chat_id}");
            }
            Ok(resp) => {
                error!("telegram rejected message for {chat_id}: HTTP {}", resp.status());
                error!("content: {text}");
            }
            Err(e) => {
                error!("failed to send message to {chat_id}: {e}");
                error!("content: {text}");
            }
        }
    }
}
