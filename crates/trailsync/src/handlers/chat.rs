//! Chat about recent activities through the OpenAI-compatible API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use trailsync_auth::CurrentUser;
use trailsync_core::chat::{build_chat_messages, validate_question, ChatMessage};
use trailsync_core::storage::ActivityFilter;

use super::activities::load_activity_page;
use super::{ApiError, AppError};
use crate::integrations::openai::{TokenUsage, DEFAULT_TEMPERATURE};
use crate::state::AppState;

/// Activities included in the prompt context.
const CONTEXT_ACTIVITIES: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    /// Earlier turns, oldest first. The client keeps the conversation.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    /// The context came from demo data because the database read failed.
    pub mock: bool,
}

/// POST /api/chat
#[axum::debug_handler]
pub async fn chat(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    // Rejected questions do not use up the caller's quota.
    validate_question(&body.question)?;
    if let Err(retry_after) = state.chat_limiter.check(&format!("chat:{}", user.id)) {
        tracing::warn!(user_id = %user.id, retry_after, "chat rate limited");
        return Err(ApiError::TooManyRequests(retry_after).into());
    }

    let filter = ActivityFilter {
        limit: CONTEXT_ACTIVITIES,
        ..ActivityFilter::default()
    };
    let (recent, mock) = load_activity_page(&state, user.id, &filter).await?;

    let messages = build_chat_messages(
        &body.history,
        &body.question,
        &recent.items,
        state.config.chat_max_history,
    )?;
    let settings = state.settings.openai_settings().await?;

    let completion = state
        .openai
        .complete(&settings, &messages, DEFAULT_TEMPERATURE)
        .await?;
    tracing::debug!(user_id = %user.id, turns = messages.len(), "answered chat question");

    Ok(Json(ChatResponse {
        answer: completion.content,
        model: completion.model,
        usage: completion.usage,
        mock,
    }))
}
