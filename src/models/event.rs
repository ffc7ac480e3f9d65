use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

use crate::enums::{ Condition, EntityKind };

/// Emitted when a rule's condition holds and its state permits firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub entity_id: String,
    pub entity_name: String,
    pub entity_kind: EntityKind,
    pub rule_id: i64,
    pub condition: Condition,
    pub threshold: f64,
    pub observed_value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}
