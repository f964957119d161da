//! Request and response bodies for the `/api/rik` endpoints

use serde::{Deserialize, Serialize};

use crate::session::Mode;

/// Snapshot of the user's day returned by the status endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStatus {
    pub greeting: String,
    pub name: String,
    pub schedule_completed: u32,
    pub schedule_total: u32,
    pub habits_done: u32,
    pub habits_total: u32,
    pub points: i64,
    pub streak: u32,
    pub routine_learned: bool,
}

/// One chat turn sent to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    /// Conversational flow the message belongs to
    pub context: Mode,
}

/// Backend reply to a chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    /// Opaque hint that the client should follow up with an action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_required: Option<serde_json::Value>,
}

/// Schedule generation request for a single day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub user_id: String,
    /// Day to plan, `YYYY-MM-DD`
    pub date: String,
}

/// Result of schedule generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    #[serde(default)]
    pub count: u32,
}

/// Routine learned from the routine-learning conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedRoutine {
    #[serde(default)]
    pub routine: serde_json::Value,
}

impl LearnedRoutine {
    /// Human-readable rendering of the routine for the conversation log
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.routine {
            serde_json::Value::Null => "I've saved your routine.".to_string(),
            serde_json::Value::String(text) if text.trim().is_empty() => {
                "I've saved your routine.".to_string()
            }
            serde_json::Value::String(text) => format!("I've saved your routine: {text}"),
            serde_json::Value::Array(items) => {
                let steps: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                format!("I've saved your routine: {}", steps.join(", "))
            }
            other => format!("I've saved your routine: {other}"),
        }
    }
}

/// Morning briefing text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorningBriefing {
    #[serde(default)]
    pub briefing: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_context_is_snake_case() {
        let request = ChatRequest {
            user_id: "u1".to_string(),
            message: "Learn my routine".to_string(),
            context: Mode::LearningRoutine,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["context"], "learning_routine");
    }

    #[test]
    fn test_chat_reply_optional_fields() {
        let reply: ChatReply = serde_json::from_str(r#"{"response":"ok"}"#).unwrap();
        assert_eq!(reply.response, "ok");
        assert!(reply.response_type.is_none());
        assert!(reply.action_required.is_none());
    }

    #[test]
    fn test_status_tolerates_missing_fields() {
        let status: SessionStatus =
            serde_json::from_str(r#"{"name":"Sam","streak":4}"#).unwrap();
        assert_eq!(status.name, "Sam");
        assert_eq!(status.streak, 4);
        assert!(!status.routine_learned);
    }

    #[test]
    fn test_routine_description() {
        let routine = LearnedRoutine {
            routine: serde_json::json!(["wake 6:30", "run", "deep work"]),
        };
        assert_eq!(
            routine.describe(),
            "I've saved your routine: wake 6:30, run, deep work"
        );

        let empty = LearnedRoutine {
            routine: serde_json::Value::Null,
        };
        assert_eq!(empty.describe(), "I've saved your routine.");
    }
}
