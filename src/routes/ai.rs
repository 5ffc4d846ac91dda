//! AI routes — assistant endpoints. These never surface LLM failures; the
//! service layer degrades to canned content instead.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::error;

use super::auth::AuthUser;
use crate::services::ai::{
    self, AiInteraction, AssistantInput, AssistantReply, EnhanceInput, EnhancedDescription, Recommendation,
    RecommendationInput,
};
use crate::state::AppState;

/// `POST /api/ai/recommendations`.
pub async fn recommendations(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<RecommendationInput>,
) -> Json<Vec<Recommendation>> {
    Json(ai::recommendations(&state, &auth.user, input).await)
}

/// `POST /api/ai/enhance-description`.
pub async fn enhance_description(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<EnhanceInput>,
) -> Json<EnhancedDescription> {
    Json(ai::enhance_description(&state, &auth.user, input).await)
}

/// `POST /api/ai/chat-assistant`.
pub async fn chat_assistant(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<AssistantInput>,
) -> Json<AssistantReply> {
    Json(ai::chat_assistant(&state, &auth.user, input).await)
}

/// `GET /api/ai/usage-stats` — the caller's recent interactions.
pub async fn usage_stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<AiInteraction>>, StatusCode> {
    let interactions = ai::usage_stats(&state.pool, auth.user.id).await.map_err(|e| {
        error!(error = %e, "ai usage stats query failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(interactions))
}
