use serde::{ Deserialize, Serialize };

use crate::enums::Condition;
use crate::error::{ AppError, Result };

/// Shortest accepted repeat interval.
pub const MIN_REPEAT_INTERVAL_MS: i64 = 5_000;

/// Lifecycle of a rule.
///
/// `Armed` and `FiredOnce` belong to one-shot rules, `ArmedRepeat` and `Paused` to repeating
/// ones. Pausing a one-shot rule lands it in `FiredOnce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleState {
    Armed,
    ArmedRepeat,
    FiredOnce,
    Paused,
}

impl RuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleState::Armed => "armed",
            RuleState::ArmedRepeat => "armed_repeat",
            RuleState::FiredOnce => "fired_once",
            RuleState::Paused => "paused",
        }
    }
}

/// A user-defined alert condition bound to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RuleRecord", into = "RuleRecord")]
pub struct Rule {
    pub id: i64,
    pub entity_id: String,
    pub condition: Condition,
    pub threshold: f64,
    /// `Some(interval)` for repeating rules.
    pub repeat_interval_ms: Option<i64>,
    /// Epoch ms of the last trigger, 0 if never.
    pub last_triggered_at: i64,
    pub state: RuleState,
    pub sound_ref: Option<String>,
}

impl Rule {
    pub fn new(id: i64, entity_id: impl Into<String>, request: NewRule) -> Result<Self> {
        let repeat_interval_ms = request.validate()?;
        Ok(Self {
            id,
            entity_id: entity_id.into(),
            condition: request.condition,
            threshold: request.threshold,
            repeat_interval_ms,
            last_triggered_at: 0,
            state: if repeat_interval_ms.is_some() {
                RuleState::ArmedRepeat
            } else {
                RuleState::Armed
            },
            sound_ref: request.sound_ref.filter(|s| !s.trim().is_empty()),
        })
    }

    pub fn is_repeat(&self) -> bool {
        self.repeat_interval_ms.is_some()
    }

    /// Applies the authoring constraints to a rule that did not come through `Rule::new`.
    pub fn validate(&self) -> Result<()> {
        let request = NewRule {
            condition: self.condition,
            threshold: self.threshold,
            repeat: self.is_repeat(),
            interval_ms: self.repeat_interval_ms,
            sound_ref: None,
        };
        request.validate().map(|_| ())
    }

    fn armed_state(&self) -> RuleState {
        if self.is_repeat() { RuleState::ArmedRepeat } else { RuleState::Armed }
    }

    /// Repeat rules become inert; one-shot rules are deactivated. Idempotent.
    pub fn pause(&mut self) {
        self.state = match self.state {
            RuleState::ArmedRepeat => RuleState::Paused,
            RuleState::Armed => RuleState::FiredOnce,
            other => other,
        };
    }

    /// Re-arms the rule. `last_triggered_at` is left alone.
    pub fn resume(&mut self) {
        self.state = self.armed_state();
    }
}

/// Rule authoring request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewRule {
    pub condition: Condition,
    pub threshold: f64,
    #[serde(default)]
    pub repeat: bool,
    #[serde(default, alias = "intervalMs")]
    pub interval_ms: Option<i64>,
    #[serde(default, alias = "sound")]
    pub sound_ref: Option<String>,
}

impl NewRule {
    /// Returns the repeat interval to store, or a validation error.
    pub fn validate(&self) -> Result<Option<i64>> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(AppError::Validation("Threshold must be a positive number".to_string()));
        }

        if !self.repeat {
            return Ok(None);
        }

        match self.interval_ms {
            Some(ms) if ms >= MIN_REPEAT_INTERVAL_MS => Ok(Some(ms)),
            _ =>
                Err(
                    AppError::Validation(
                        format!(
                            "Repeat interval must be at least {} seconds",
                            MIN_REPEAT_INTERVAL_MS / 1000
                        )
                    )
                ),
        }
    }
}

/// Flat persisted form of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    pub id: i64,
    pub entity_id: String,
    pub condition: Condition,
    pub threshold: f64,
    pub repeat: bool,
    #[serde(default)]
    pub interval_ms: i64,
    #[serde(default)]
    pub last_triggered_at: i64,
    pub active: bool,
    #[serde(default)]
    pub manually_paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_ref: Option<String>,
    /// Informational; the flags above are authoritative on load.
    #[serde(default, skip_deserializing)]
    pub state: Option<RuleState>,
}

impl From<Rule> for RuleRecord {
    fn from(rule: Rule) -> Self {
        let (active, manually_paused) = match rule.state {
            RuleState::Armed | RuleState::ArmedRepeat => (true, false),
            RuleState::FiredOnce => (false, false),
            RuleState::Paused => (true, true),
        };

        Self {
            id: rule.id,
            entity_id: rule.entity_id,
            condition: rule.condition,
            threshold: rule.threshold,
            repeat: rule.repeat_interval_ms.is_some(),
            interval_ms: rule.repeat_interval_ms.unwrap_or(0),
            last_triggered_at: rule.last_triggered_at,
            active,
            manually_paused,
            sound_ref: rule.sound_ref,
            state: Some(rule.state),
        }
    }
}

impl From<RuleRecord> for Rule {
    fn from(record: RuleRecord) -> Self {
        let state = match (record.repeat, record.active, record.manually_paused) {
            (false, true, _) => RuleState::Armed,
            (false, false, _) => RuleState::FiredOnce,
            (true, _, true) => RuleState::Paused,
            (true, _, false) => RuleState::ArmedRepeat,
        };

        Self {
            id: record.id,
            entity_id: record.entity_id,
            condition: record.condition,
            threshold: record.threshold,
            repeat_interval_ms: if record.repeat {
                Some(record.interval_ms)
            } else {
                None
            },
            last_triggered_at: record.last_triggered_at,
            state,
            sound_ref: record.sound_ref,
        }
    }
}
