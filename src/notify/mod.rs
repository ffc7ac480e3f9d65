use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ AppError, Result };
use crate::models::{ format_price, TriggerEvent };

/// An output channel for triggered rules and operator warnings.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, event: &TriggerEvent) -> Result<()>;

    /// Sinks that only care about triggers can ignore warnings.
    async fn warn(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Human-readable alert text shared by the text-based sinks.
pub fn format_trigger_message(event: &TriggerEvent) -> String {
    let (observed, threshold) = if event.entity_kind.is_address() {
        (
            format!("{} transactions", event.observed_value),
            format!("{} transactions", event.threshold),
        )
    } else {
        (format_price(event.observed_value), format_price(event.threshold))
    };

    format!(
        "{emoji} {name} {verb} {observed}\nCondition: {condition} {threshold}",
        emoji = event.condition.emoji(),
        name = event.entity_name,
        verb = event.condition.describe(),
        observed = observed,
        condition = event.condition,
        threshold = threshold
    )
}

/// Always-on sink that writes alerts to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, event: &TriggerEvent) -> Result<()> {
        tracing::info!(
            entity = %event.entity_id,
            rule_id = event.rule_id,
            sound = event.sound_ref.as_deref().unwrap_or("default"),
            "{}",
            format_trigger_message(event).replace('\n', " | ")
        );
        Ok(())
    }

    async fn warn(&self, message: &str) -> Result<()> {
        tracing::warn!("{}", message);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Trigger(TriggerEvent),
    Warning(String),
}

/// Forwards notifications to an in-process consumer.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: Notification) -> Result<()> {
        self.tx
            .send(notification)
            .map_err(|_| AppError::Notification("Notification receiver dropped".to_string()))
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn notify(&self, event: &TriggerEvent) -> Result<()> {
        self.send(Notification::Trigger(event.clone()))
    }

    async fn warn(&self, message: &str) -> Result<()> {
        self.send(Notification::Warning(message.to_string()))
    }
}

/// Fans each event out to every sink. A failing sink never blocks the others.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks
            .iter()
            .map(|s| s.name())
            .collect()
    }

    pub async fn dispatch(&self, event: &TriggerEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.notify(event).await {
                tracing::error!(sink = sink.name(), rule_id = event.rule_id, error = %e, "Failed to deliver alert");
            }
        }
    }

    pub async fn warn(&self, message: &str) {
        for sink in &self.sinks {
            if let Err(e) = sink.warn(message).await {
                tracing::error!(sink = sink.name(), error = %e, "Failed to deliver warning");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{ Condition, EntityKind };
    use chrono::Utc;

    fn event(kind: EntityKind, observed: f64) -> TriggerEvent {
        TriggerEvent {
            entity_id: "bitcoin".to_string(),
            entity_name: "Bitcoin".to_string(),
            entity_kind: kind,
            rule_id: 7,
            condition: Condition::Above,
            threshold: 100.0,
            observed_value: observed,
            timestamp: Utc::now(),
            sound_ref: None,
            icon: None,
        }
    }

    struct FailingSink;

    #[async_trait]
    impl Notifier for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn notify(&self, _event: &TriggerEvent) -> Result<()> {
            Err(AppError::Notification("down".to_string()))
        }
    }

    #[test]
    fn test_format_trigger_message() {
        assert_eq!(
            format_trigger_message(&event(EntityKind::Coin, 101.5)),
            "\u{1f4c8} Bitcoin rose to $101.50\nCondition: above $100.00"
        );
        assert_eq!(
            format_trigger_message(&event(EntityKind::EvmAddress, 120.0)),
            "\u{1f4c8} Bitcoin rose to 120 transactions\nCondition: above 100 transactions"
        );
    }

    #[tokio::test]
    async fn test_dispatch_reaches_every_sink_once() {
        let (channel, mut rx) = ChannelNotifier::new();
        let dispatcher = NotificationDispatcher::new(
            vec![Arc::new(FailingSink), Arc::new(LogNotifier), Arc::new(channel)]
        );
        assert_eq!(dispatcher.sink_names(), vec!["failing", "log", "channel"]);

        let alert = event(EntityKind::Coin, 150.0);
        dispatcher.dispatch(&alert).await;
        dispatcher.warn("slow down").await;

        assert_eq!(rx.recv().await, Some(Notification::Trigger(alert)));
        assert_eq!(rx.recv().await, Some(Notification::Warning("slow down".to_string())));
        assert!(rx.try_recv().is_err());
    }
}
