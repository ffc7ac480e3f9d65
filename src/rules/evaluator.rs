use chrono::{ DateTime, Utc };

use crate::enums::Condition;
use crate::models::{ TrackedEntity, TriggerEvent };

use super::rule::{ Rule, RuleState };

/// Whether `current` satisfies the condition, given the previous observation.
///
/// `Crosses` needs a previous value, so the first observation of an entity never fires it.
pub fn condition_met(
    condition: Condition,
    threshold: f64,
    previous: Option<f64>,
    current: f64
) -> bool {
    match condition {
        Condition::Above => current >= threshold,
        Condition::Below => current <= threshold,
        Condition::Crosses =>
            match previous {
                Some(prev) => {
                    let crossed_up = prev < threshold && current >= threshold;
                    let crossed_down = prev > threshold && current <= threshold;
                    crossed_up || crossed_down
                }
                None => false,
            }
    }
}

impl Rule {
    /// Runs one evaluation step and applies the resulting transition.
    ///
    /// Returns true when the rule fires.
    pub fn evaluate(&mut self, previous: Option<f64>, current: f64, now_ms: i64) -> bool {
        if !current.is_finite() {
            return false;
        }

        match self.state {
            RuleState::FiredOnce | RuleState::Paused => false,
            RuleState::Armed => {
                if condition_met(self.condition, self.threshold, previous, current) {
                    self.state = RuleState::FiredOnce;
                    self.last_triggered_at = now_ms;
                    true
                } else {
                    false
                }
            }
            RuleState::ArmedRepeat => {
                if !condition_met(self.condition, self.threshold, previous, current) {
                    return false;
                }
                let interval = self.repeat_interval_ms.unwrap_or(0);
                if now_ms - self.last_triggered_at >= interval {
                    self.last_triggered_at = now_ms;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Evaluates every rule of one entity against a fresh observation.
///
/// Each rule transitions at most once per call.
pub fn evaluate_rules(
    entity: &TrackedEntity,
    rules: &mut [Rule],
    previous: Option<f64>,
    current: f64,
    now: DateTime<Utc>
) -> Vec<TriggerEvent> {
    let now_ms = now.timestamp_millis();

    rules
        .iter_mut()
        .filter_map(|rule| {
            if !rule.evaluate(previous, current, now_ms) {
                return None;
            }

            tracing::info!(
                entity = %entity.id,
                rule_id = rule.id,
                condition = %rule.condition,
                threshold = rule.threshold,
                observed = current,
                state = rule.state.as_str(),
                "Rule triggered"
            );

            Some(TriggerEvent {
                entity_id: entity.id.clone(),
                entity_name: entity.display_name.clone(),
                entity_kind: entity.kind,
                rule_id: rule.id,
                condition: rule.condition,
                threshold: rule.threshold,
                observed_value: current,
                timestamp: now,
                sound_ref: rule.sound_ref.clone(),
                icon: entity.icon.as_ref().and_then(|i| i.best()).map(str::to_string),
            })
        })
        .collect()
}
