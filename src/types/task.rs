//! Task type and priority class enumerations.

use crate::{Error, ErrorContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of analysis a job requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Sentiment,
    Entities,
    Topics,
    Difficulty,
    /// Every analysis on one input.
    Full,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::Sentiment,
        TaskType::Entities,
        TaskType::Topics,
        TaskType::Difficulty,
        TaskType::Full,
    ];

    /// Task types that `Full` is composed of.
    pub const COMPONENTS: [TaskType; 4] = [
        TaskType::Sentiment,
        TaskType::Entities,
        TaskType::Topics,
        TaskType::Difficulty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Sentiment => "sentiment",
            TaskType::Entities => "entities",
            TaskType::Topics => "topics",
            TaskType::Difficulty => "difficulty",
            TaskType::Full => "full",
        }
    }

    /// Dense index for enum-keyed lookup tables.
    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::validation_with_context(
                    format!("unknown task type '{}'", s),
                    ErrorContext::new()
                        .with_field_path("task_type")
                        .with_details("expected one of: sentiment, entities, topics, difficulty, full"),
                )
            })
    }
}

/// Priority class of a job. Ordered `Low < Normal < High < Urgent`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    /// Sealed as soon as any job is buffered.
    Urgent,
}

impl Priority {
    /// Drain order used by seal sweeps.
    pub const DESCENDING: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, Priority::Urgent)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::DESCENDING
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::validation_with_context(
                    format!("unknown priority '{}'", s),
                    ErrorContext::new()
                        .with_field_path("priority")
                        .with_details("expected one of: low, normal, high, urgent"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_parse() {
        assert_eq!("sentiment".parse::<TaskType>().unwrap(), TaskType::Sentiment);
        assert_eq!(" FULL ".parse::<TaskType>().unwrap(), TaskType::Full);
        let err = "summary".parse::<TaskType>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("unknown task type 'summary'"));
    }

    #[test]
    fn test_priority_parse_and_order() {
        assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("critical".parse::<Priority>().unwrap_err().is_validation());
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&TaskType::Difficulty).unwrap();
        assert_eq!(json, "\"difficulty\"");
        let p: Priority = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(p, Priority::High);
    }

    #[test]
    fn test_index_is_dense() {
        for (i, t) in TaskType::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
    }
}
