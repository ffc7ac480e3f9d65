use std::sync::Arc;

use chrono::Utc;

use crate::error::{ AppError, Result };
use crate::rules::{ NewRule, Rule };
use crate::store::StateStore;

#[derive(Clone)]
pub struct PriceAlertService {
    store: Arc<StateStore>,
}

impl PriceAlertService {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    pub async fn list_rules(&self, entity_id: &str) -> Result<Vec<Rule>> {
        self.store.read(|state| {
            state
                .entity(entity_id)
                .map(|_| state.rules_for(entity_id).to_vec())
                .ok_or_else(|| AppError::EntityNotFound(entity_id.to_string()))
        }).await
    }

    /// Validates and stores a new rule. Invalid requests leave the store untouched.
    pub async fn create_rule(&self, entity_id: &str, request: NewRule) -> Result<Rule> {
        let now_ms = Utc::now().timestamp_millis();
        let rule = self.store.mutate(|state| state.add_rule(entity_id, request, now_ms)).await?;

        tracing::info!(
            entity = %entity_id,
            rule_id = rule.id,
            condition = %rule.condition,
            threshold = rule.threshold,
            repeat_ms = rule.repeat_interval_ms,
            "Rule created"
        );
        Ok(rule)
    }

    pub async fn delete_rule(&self, entity_id: &str, rule_id: i64) -> Result<Rule> {
        let rule = self.store.mutate(|state| state.remove_rule(entity_id, rule_id)).await?;
        tracing::info!(entity = %entity_id, rule_id, "Rule deleted");
        Ok(rule)
    }

    pub async fn pause_rule(&self, entity_id: &str, rule_id: i64) -> Result<Rule> {
        let rule = self.store.mutate(|state| state.pause_rule(entity_id, rule_id)).await?;
        tracing::info!(entity = %entity_id, rule_id, state = rule.state.as_str(), "Rule paused");
        Ok(rule)
    }

    pub async fn resume_rule(&self, entity_id: &str, rule_id: i64) -> Result<Rule> {
        let rule = self.store.mutate(|state| state.resume_rule(entity_id, rule_id)).await?;
        tracing::info!(entity = %entity_id, rule_id, state = rule.state.as_str(), "Rule resumed");
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryKeyValueStore;
    use crate::enums::{ Condition, DataSource };
    use crate::models::TrackedEntity;
    use crate::rules::RuleState;

    async fn service() -> PriceAlertService {
        let store = Arc::new(
            StateStore::load(Arc::new(MemoryKeyValueStore::new()), DataSource::CoinGecko).await
        );
        store
            .mutate(|s| s.add_entity(TrackedEntity::coin("bitcoin", "btc", "Bitcoin", None, 1)?)).await
            .unwrap();
        PriceAlertService::new(store)
    }

    fn repeat_rule(interval_ms: i64) -> NewRule {
        NewRule {
            condition: Condition::Below,
            threshold: 60_000.0,
            repeat: true,
            interval_ms: Some(interval_ms),
            sound_ref: None,
        }
    }

    #[tokio::test]
    async fn test_rule_lifecycle() {
        let service = service().await;
        let rule = service.create_rule("bitcoin", repeat_rule(60_000)).await.unwrap();

        let paused = service.pause_rule("bitcoin", rule.id).await.unwrap();
        assert_eq!(paused.state, RuleState::Paused);
        let paused_again = service.pause_rule("bitcoin", rule.id).await.unwrap();
        assert_eq!(paused_again, paused);

        let resumed = service.resume_rule("bitcoin", rule.id).await.unwrap();
        assert_eq!(resumed.state, RuleState::ArmedRepeat);

        service.delete_rule("bitcoin", rule.id).await.unwrap();
        assert!(service.list_rules("bitcoin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_interval_is_rejected() {
        let service = service().await;
        let err = service.create_rule("bitcoin", repeat_rule(1_000)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(service.list_rules("bitcoin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_entity() {
        let service = service().await;
        assert!(matches!(service.list_rules("dogecoin").await, Err(AppError::EntityNotFound(_))));
        assert!(
            matches!(
                service.create_rule("dogecoin", repeat_rule(60_000)).await,
                Err(AppError::EntityNotFound(_))
            )
        );
    }
}
