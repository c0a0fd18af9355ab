//! Prompt construction for activity summaries and chat.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::{format_distance_km, format_duration, format_intensity, Activity};

pub const MAX_QUESTION_CHARS: usize = 2000;

const CHAT_SYSTEM_PROMPT: &str = "You are a friendly training assistant. \
Answer questions about the athlete's recent activities listed below. \
Use metric units and keep answers short. If the data does not answer the \
question, say so.";

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a training assistant. \
Write a short natural-language summary (3 to 5 sentences) of a single \
activity: effort, pacing and anything notable. Use metric units.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Question must not be empty")]
    EmptyQuestion,

    #[error("Question exceeds {0} characters")]
    QuestionTooLong(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One line describing an activity for the model.
pub fn activity_context_line(activity: &Activity) -> String {
    let mut parts = vec![
        activity.start_date.format("%Y-%m-%d").to_string(),
        activity.sport_type.clone(),
        activity.name.clone(),
        format_distance_km(activity.distance_m),
        format_duration(activity.moving_time_s),
    ];
    if let Some(intensity) = format_intensity(activity) {
        parts.push(intensity);
    }
    if activity.total_elevation_gain_m > 0.0 {
        parts.push(format!("+{:.0} m", activity.total_elevation_gain_m));
    }
    if let Some(hr) = activity.average_heartrate {
        parts.push(format!("avg HR {hr:.0}"));
    }
    parts.join(" | ")
}

/// Trims the question and checks it is neither blank nor too long.
pub fn validate_question(question: &str) -> Result<&str, ChatError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ChatError::EmptyQuestion);
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(ChatError::QuestionTooLong(MAX_QUESTION_CHARS));
    }
    Ok(question)
}

/// System prompt with activity context, the tail of the conversation, then
/// the new question.
///
/// System messages in `history` are dropped; only the server writes those.
pub fn build_chat_messages(
    history: &[ChatMessage],
    question: &str,
    activities: &[Activity],
    max_history: usize,
) -> Result<Vec<ChatMessage>, ChatError> {
    let question = validate_question(question)?;

    let context = if activities.is_empty() {
        "No activities have been imported yet.".to_string()
    } else {
        activities
            .iter()
            .map(activity_context_line)
            .collect::<Vec<_>>()
            .join("\n")
    };

    let turns: Vec<&ChatMessage> = history
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .collect();
    let skip = turns.len().saturating_sub(max_history);

    let mut messages = Vec::with_capacity(turns.len() - skip + 2);
    messages.push(ChatMessage::system(format!(
        "{CHAT_SYSTEM_PROMPT}\n\nRecent activities:\n{context}"
    )));
    messages.extend(turns.into_iter().skip(skip).cloned());
    messages.push(ChatMessage::user(question));
    Ok(messages)
}

/// System + user pair asking for a summary of one activity.
pub fn build_analysis_messages(activity: &Activity) -> Vec<ChatMessage> {
    let mut details = activity_context_line(activity);
    if let Some(max_hr) = activity.max_heartrate {
        details.push_str(&format!(" | max HR {max_hr:.0}"));
    }
    if activity.elapsed_time_s > activity.moving_time_s {
        details.push_str(&format!(
            " | elapsed {}",
            format_duration(activity.elapsed_time_s)
        ));
    }
    if let Some(calories) = activity.calories {
        details.push_str(&format!(" | {calories:.0} kcal"));
    }

    vec![
        ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
        ChatMessage::user(format!("Summarize this activity:\n{details}")),
    ]
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;

    fn activity() -> Activity {
        Activity::new(
            Uuid::new_v4(),
            7,
            "Lunch Run",
            "Run",
            Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap(),
        )
        .with_effort(8000.0, 2400, 2500)
        .with_elevation(42.0)
        .with_heartrate(151.0, 174.0)
    }

    #[test]
    fn context_line_has_the_essentials() {
        let line = activity_context_line(&activity());
        assert_eq!(
            line,
            "2024-03-02 | Run | Lunch Run | 8.00 km | 40:00 | 5:00 /km | +42 m | avg HR 151"
        );
    }

    #[test]
    fn blank_question_is_rejected() {
        assert_eq!(
            build_chat_messages(&[], "   ", &[], 10),
            Err(ChatError::EmptyQuestion)
        );
    }

    #[test]
    fn long_question_is_rejected() {
        let q = "a".repeat(MAX_QUESTION_CHARS + 1);
        assert_eq!(
            build_chat_messages(&[], &q, &[], 10),
            Err(ChatError::QuestionTooLong(MAX_QUESTION_CHARS))
        );
    }

    #[test]
    fn history_is_trimmed_to_the_most_recent_turns() {
        let history = vec![
            ChatMessage::system("injected"),
            ChatMessage::user("one"),
            ChatMessage::assistant("two"),
            ChatMessage::user("three"),
            ChatMessage::assistant("four"),
        ];

        let messages = build_chat_messages(&history, "five?", &[activity()], 2).unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("Lunch Run"));
        assert!(!messages.iter().any(|m| m.content == "injected"));
        assert_eq!(messages[1].content, "three");
        assert_eq!(messages[2].content, "four");
        assert_eq!(messages[3], ChatMessage::user("five?"));
    }

    #[test]
    fn zero_history_keeps_only_system_and_question() {
        let history = vec![ChatMessage::user("old")];
        let messages = build_chat_messages(&history, "new", &[], 0).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("No activities"));
    }

    #[test]
    fn analysis_includes_extra_details() {
        let messages = build_analysis_messages(&activity());
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("max HR 174"));
        assert!(messages[1].content.contains("elapsed 41:40"));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
