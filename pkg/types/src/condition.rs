use chrono::{DateTime, Utc};
use pkg_constants::conditions::{ASSIGNED_CONDITION, BOUND_CONDITION, READY_CONDITION};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Standard type/status/reason/message condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub observed_generation: u64,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(type_: &str, status: ConditionStatus, reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.into(),
            observed_generation: 0,
            last_transition_time: Utc::now(),
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.observed_generation = generation;
        self
    }

    fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}

/// Condition list keyed by type. This is the authoritative representation;
/// the single legacy condition on claims is derived from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionList(Vec<Condition>);

impl ConditionList {
    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    pub fn is_true(&self, type_: &str) -> bool {
        self.get(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Insert or update the condition of the same type. Returns `false` when
    /// nothing observable changed. The transition time only moves when the
    /// status flips.
    pub fn update(&mut self, condition: Condition) -> bool {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) if existing.same_state(&condition) => false,
            Some(existing) => {
                let transition = if existing.status != condition.status {
                    condition.last_transition_time
                } else {
                    existing.last_transition_time
                };
                *existing = Condition {
                    last_transition_time: transition,
                    ..condition
                };
                true
            }
            None => {
                self.0.push(condition);
                true
            }
        }
    }

    pub fn remove(&mut self, type_: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|c| c.type_ != type_);
        self.0.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The single condition exposed through the deprecated field:
    /// `Bound`, else `Assigned`, else `Ready`.
    pub fn legacy_projection(&self) -> Option<Condition> {
        [BOUND_CONDITION, ASSIGNED_CONDITION, READY_CONDITION]
            .iter()
            .find_map(|t| self.get(t).cloned())
    }
}
