use async_trait::async_trait;
use teloxide::prelude::*;

use crate::error::{ AppError, Result };
use crate::models::TriggerEvent;
use crate::notify::{ format_trigger_message, Notifier };

/// Pushes alerts to a single Telegram chat.
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
        }
    }

    async fn send(&self, text: String) -> Result<()> {
        self.bot
            .send_message(self.chat_id, text).await
            .map_err(|e| AppError::Notification(format!("Telegram send failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn notify(&self, event: &TriggerEvent) -> Result<()> {
        self.send(format!("{}\n\nRule #{}", format_trigger_message(event), event.rule_id)).await
    }

    async fn warn(&self, message: &str) -> Result<()> {
        self.send(format!("\u{26a0}\u{fe0f} {}", message)).await
    }
}
