use std::collections::{ BTreeMap, HashMap };

use chrono::{ DateTime, Utc };
use serde::de::DeserializeOwned;

use crate::enums::DataSource;
use crate::error::{ AppError, PollError, PollResult, Result };
use crate::models::{ NormalizedResult, TrackedEntity, TriggerEvent };
use crate::rules::{ evaluate_rules, NewRule, Rule };

pub const KEY_TRACKED_ENTITIES: &str = "trackedEntities";
pub const KEY_RULES: &str = "rules";
pub const KEY_LAST_VALUES: &str = "lastValues";
pub const KEY_DATA_SOURCE: &str = "dataSource";

pub const PERSISTED_KEYS: [&str; 4] = [
    KEY_TRACKED_ENTITIES,
    KEY_RULES,
    KEY_LAST_VALUES,
    KEY_DATA_SOURCE,
];

/// Everything the monitor knows: tracked entities, their rules and last observed values.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub entities: Vec<TrackedEntity>,
    pub rules: BTreeMap<String, Vec<Rule>>,
    pub last_values: HashMap<String, f64>,
    pub data_source: DataSource,
    /// Latest successful result per entity. Not persisted.
    pub latest: HashMap<String, NormalizedResult>,
    last_rule_id: i64,
}

/// What one poll cycle changed.
#[derive(Debug, Default)]
pub struct AppliedPoll {
    pub events: Vec<TriggerEvent>,
    pub updated: usize,
    pub failures: Vec<(String, PollError)>,
    /// Results dropped because their entity was removed or replaced mid-flight.
    pub discarded: usize,
}

impl DashboardState {
    pub fn new(data_source: DataSource) -> Self {
        Self {
            data_source,
            ..Self::default()
        }
    }

    pub fn entity(&self, id: &str) -> Option<&TrackedEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    fn require_entity(&self, id: &str) -> Result<&TrackedEntity> {
        self.entity(id).ok_or_else(|| AppError::EntityNotFound(id.to_string()))
    }

    pub fn add_entity(&mut self, entity: TrackedEntity) -> Result<()> {
        for existing in &self.entities {
            let same_id = if entity.is_address() {
                existing.id.eq_ignore_ascii_case(&entity.id)
            } else {
                existing.id == entity.id
            };
            if same_id {
                return Err(AppError::Validation(format!("{} is already tracked", entity.short_id())));
            }

            if
                entity.is_address() &&
                existing.is_address() &&
                existing.display_name.eq_ignore_ascii_case(&entity.display_name)
            {
                return Err(
                    AppError::Validation(format!("A wallet named {} already exists", entity.display_name))
                );
            }
        }

        self.entities.push(entity);
        Ok(())
    }

    /// Removes an entity along with its rules and values.
    pub fn remove_entity(&mut self, id: &str) -> Result<TrackedEntity> {
        let position = self.entities
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| AppError::EntityNotFound(id.to_string()))?;

        let removed = self.entities.remove(position);
        self.rules.remove(id);
        self.last_values.remove(id);
        self.latest.remove(id);
        Ok(removed)
    }

    pub fn rules_for(&self, entity_id: &str) -> &[Rule] {
        self.rules.get(entity_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids are creation timestamps in ms, bumped when two rules land in the same ms.
    pub fn add_rule(&mut self, entity_id: &str, request: NewRule, now_ms: i64) -> Result<Rule> {
        self.require_entity(entity_id)?;

        let id = now_ms.max(self.last_rule_id + 1);
        let rule = Rule::new(id, entity_id, request)?;
        self.last_rule_id = id;

        self.rules.entry(entity_id.to_string()).or_default().push(rule.clone());
        Ok(rule)
    }

    pub fn remove_rule(&mut self, entity_id: &str, rule_id: i64) -> Result<Rule> {
        let rules = self.rules.get_mut(entity_id).ok_or(AppError::RuleNotFound(rule_id))?;
        let position = rules
            .iter()
            .position(|r| r.id == rule_id)
            .ok_or(AppError::RuleNotFound(rule_id))?;

        let removed = rules.remove(position);
        if rules.is_empty() {
            self.rules.remove(entity_id);
        }
        Ok(removed)
    }

    fn rule_mut(&mut self, entity_id: &str, rule_id: i64) -> Result<&mut Rule> {
        self.rules
            .get_mut(entity_id)
            .and_then(|rules| rules.iter_mut().find(|r| r.id == rule_id))
            .ok_or(AppError::RuleNotFound(rule_id))
    }

    pub fn pause_rule(&mut self, entity_id: &str, rule_id: i64) -> Result<Rule> {
        let rule = self.rule_mut(entity_id, rule_id)?;
        rule.pause();
        Ok(rule.clone())
    }

    pub fn resume_rule(&mut self, entity_id: &str, rule_id: i64) -> Result<Rule> {
        let rule = self.rule_mut(entity_id, rule_id)?;
        rule.resume();
        Ok(rule.clone())
    }

    /// Returns whether the source actually changed.
    pub fn set_data_source(&mut self, source: DataSource) -> bool {
        let changed = self.data_source != source;
        self.data_source = source;
        changed
    }

    /// Applies one cycle's results: evaluates rules against the stored previous value,
    /// then records the new value.
    ///
    /// `snapshot` is the entity list the poll was started with. Results whose entity has
    /// since been removed or re-added are dropped. Failed fetches leave the last value alone.
    pub fn apply_poll(
        &mut self,
        snapshot: &[TrackedEntity],
        mut results: HashMap<String, PollResult<NormalizedResult>>,
        now: DateTime<Utc>
    ) -> AppliedPoll {
        let mut applied = AppliedPoll::default();

        for polled in snapshot {
            let Some(result) = results.remove(&polled.id) else {
                continue;
            };

            let current = match self.entities.iter().find(|e| e.id == polled.id) {
                Some(entity) if entity.added_at == polled.added_at => entity,
                _ => {
                    applied.discarded += 1;
                    continue;
                }
            };

            match result {
                Ok(result) if result.value.is_finite() => {
                    let previous = self.last_values.get(&current.id).copied();
                    if let Some(rules) = self.rules.get_mut(&current.id) {
                        applied.events.extend(
                            evaluate_rules(current, rules, previous, result.value, now)
                        );
                    }

                    self.last_values.insert(current.id.clone(), result.value);
                    self.latest.insert(current.id.clone(), result);
                    applied.updated += 1;
                }
                Ok(result) => {
                    applied.failures.push((
                        polled.id.clone(),
                        PollError::Parse(format!("non-finite value {}", result.value)),
                    ));
                }
                Err(e) => applied.failures.push((polled.id.clone(), e)),
            }
        }

        applied
    }

    /// Serializes the persisted keys.
    pub fn to_persisted(&self) -> Result<Vec<(&'static str, String)>> {
        Ok(
            vec![
                (KEY_TRACKED_ENTITIES, serde_json::to_string(&self.entities)?),
                (KEY_RULES, serde_json::to_string(&self.rules)?),
                (KEY_LAST_VALUES, serde_json::to_string(&self.last_values)?),
                (KEY_DATA_SOURCE, serde_json::to_string(&self.data_source)?)
            ]
        )
    }

    /// Rebuilds state from persisted documents.
    ///
    /// A missing or unreadable key falls back to its default. Rules that fail validation,
    /// and rules or values that belong to no tracked entity, are dropped.
    pub fn from_persisted(docs: &HashMap<String, String>, default_source: DataSource) -> Self {
        let entities: Vec<TrackedEntity> = decode(docs, KEY_TRACKED_ENTITIES).unwrap_or_default();
        let mut rules: BTreeMap<String, Vec<Rule>> = decode(docs, KEY_RULES).unwrap_or_default();
        let mut last_values: HashMap<String, f64> = decode(docs, KEY_LAST_VALUES).unwrap_or_default();

        let data_source = match docs.get(KEY_DATA_SOURCE) {
            Some(raw) =>
                serde_json
                    ::from_str::<DataSource>(raw)
                    .ok()
                    .or_else(|| raw.trim().parse().ok())
                    .unwrap_or(default_source),
            None => default_source,
        };

        for (entity_id, list) in rules.iter_mut() {
            list.retain(|rule| {
                match rule.validate() {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(entity = %entity_id, rule_id = rule.id, error = %e, "Dropping invalid persisted rule");
                        false
                    }
                }
            });
        }

        let known = |id: &String| entities.iter().any(|e| &e.id == id);
        rules.retain(|id, list| known(id) && !list.is_empty());
        last_values.retain(|id, v| known(id) && v.is_finite());

        let last_rule_id = rules
            .values()
            .flatten()
            .map(|r| r.id)
            .max()
            .unwrap_or(0);

        Self {
            entities,
            rules,
            last_values,
            data_source,
            latest: HashMap::new(),
            last_rule_id,
        }
    }
}

fn decode<T: DeserializeOwned>(docs: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = docs.get(key)?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding unreadable persisted value");
            None
        }
    }
}
