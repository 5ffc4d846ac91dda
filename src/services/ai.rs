//! AI service — LLM-backed recommendations, description polish, assistant.
//!
//! DESIGN
//! ======
//! Every operation here degrades instead of failing: any LLM problem
//! (missing client, network error, unparseable reply) yields a canned
//! fallback so the endpoints never surface provider errors. Replies are
//! mined for the first JSON array/object rather than trusting the model to
//! return bare JSON. Interactions are audited best-effort.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::models::User;
use crate::state::AppState;

const MAX_TOKENS: u32 = 800;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RecommendationInput {
    pub query: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub estimated_price_range: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnhanceInput {
    pub description: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedDescription {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantInput {
    pub message: String,
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssistantReply {
    pub reply: String,
}

/// Audit row exposed by the usage-stats endpoint.
#[derive(Debug, Serialize)]
pub struct AiInteraction {
    pub interaction_type: String,
    pub query: String,
    pub response: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

// =============================================================================
// JSON MINING
// =============================================================================

/// Slice out the first top-level JSON array in a model reply.
#[must_use]
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Slice out the first top-level JSON object in a model reply.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

// =============================================================================
// FALLBACKS
// =============================================================================

fn fallback_recommendations() -> Vec<Recommendation> {
    vec![
        Recommendation {
            category: "cleaning".into(),
            title: "Limpeza residencial".into(),
            description: "Limpeza completa da sua casa ou apartamento".into(),
            estimated_price_range: Some("R$ 80 - R$ 200".into()),
        },
        Recommendation {
            category: "electrical".into(),
            title: "Serviços elétricos".into(),
            description: "Instalações e reparos elétricos em geral".into(),
            estimated_price_range: Some("R$ 100 - R$ 300".into()),
        },
        Recommendation {
            category: "plumbing".into(),
            title: "Serviços hidráulicos".into(),
            description: "Reparos de vazamentos e instalações hidráulicas".into(),
            estimated_price_range: Some("R$ 90 - R$ 250".into()),
        },
    ]
}

fn fallback_enhancement(input: &EnhanceInput) -> EnhancedDescription {
    EnhancedDescription {
        title: "Solicitação de serviço".into(),
        description: input.description.clone(),
        category: input.category.clone(),
    }
}

const FALLBACK_ASSISTANT_REPLY: &str =
    "Desculpe, não consegui processar sua mensagem agora. Tente novamente em instantes.";

// =============================================================================
// AUDIT
// =============================================================================

/// Best-effort audit insert; failures are logged and swallowed.
async fn store_interaction(pool: &PgPool, user_id: Uuid, interaction_type: &str, query: &str, response: &str) {
    let result = sqlx::query(
        "INSERT INTO ai_interactions (user_id, interaction_type, query, response, session_id)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(user_id)
    .bind(interaction_type)
    .bind(query)
    .bind(response)
    .bind(Uuid::new_v4().to_string())
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!(%user_id, interaction_type, error = %e, "ai interaction audit failed");
    }
}

/// Last interactions recorded for a user, newest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn usage_stats(pool: &PgPool, user_id: Uuid) -> Result<Vec<AiInteraction>, sqlx::Error> {
    use sqlx::Row;

    let rows = sqlx::query(
        "SELECT interaction_type, query, response, created_at
         FROM ai_interactions WHERE user_id = $1
         ORDER BY created_at DESC LIMIT 50",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| AiInteraction {
            interaction_type: row.get("interaction_type"),
            query: row.get("query"),
            response: row.get("response"),
            created_at: row.get("created_at"),
        })
        .collect())
}

// =============================================================================
// OPERATIONS
// =============================================================================

async fn chat(state: &AppState, system: &str, user_prompt: &str) -> Option<String> {
    let llm = state.llm.as_ref()?;
    match llm.chat(MAX_TOKENS, system, user_prompt).await {
        Ok(reply) => Some(reply),
        Err(e) => {
            warn!(error = %e, "llm call failed, using fallback");
            None
        }
    }
}

/// Suggest services for a free-text need. Falls back to a fixed list.
pub async fn recommendations(state: &AppState, user: &User, input: RecommendationInput) -> Vec<Recommendation> {
    let system = "Você é um assistente de um marketplace de serviços domésticos no Brasil. \
                  Responda apenas com um array JSON de recomendações, cada uma com os campos \
                  category, title, description e estimated_price_range.";
    let location = match (input.latitude, input.longitude) {
        (Some(lat), Some(lng)) => format!(" Localização aproximada: {lat}, {lng}."),
        _ => String::new(),
    };
    let prompt = format!("Necessidade do cliente: {}.{location}", input.query);

    let recommendations = match chat(state, system, &prompt).await {
        Some(reply) => extract_json_array(&reply)
            .and_then(|json| serde_json::from_str::<Vec<Recommendation>>(json).ok())
            .filter(|list| !list.is_empty()),
        None => None,
    };
    let (recommendations, source) = match recommendations {
        Some(list) => (list, "llm"),
        None => (fallback_recommendations(), "fallback"),
    };

    store_interaction(
        &state.pool,
        user.id,
        "recommendations",
        &input.query,
        &json!({ "source": source, "count": recommendations.len() }).to_string(),
    )
    .await;
    recommendations
}

/// Rewrite a rough request description into a title + polished text.
pub async fn enhance_description(state: &AppState, user: &User, input: EnhanceInput) -> EnhancedDescription {
    let system = "Você melhora descrições de solicitações de serviço. Responda apenas com um \
                  objeto JSON com os campos title, description e category.";
    let category = input.category.as_deref().unwrap_or("não informada");
    let prompt = format!("Categoria: {category}. Descrição original: {}", input.description);

    let enhanced = match chat(state, system, &prompt).await {
        Some(reply) => {
            extract_json_object(&reply).and_then(|json| serde_json::from_str::<EnhancedDescription>(json).ok())
        }
        None => None,
    };
    let enhanced = enhanced.unwrap_or_else(|| fallback_enhancement(&input));

    store_interaction(&state.pool, user.id, "enhance_description", &input.description, &enhanced.description).await;
    enhanced
}

/// Conversational helper about the user's services. Falls back to a canned
/// apology.
pub async fn chat_assistant(state: &AppState, user: &User, input: AssistantInput) -> AssistantReply {
    let system = "Você é o assistente do aplicativo, ajudando usuários com suas solicitações \
                  de serviço. Seja breve e responda em português.";
    let prompt = match &input.context {
        Some(context) => format!("Contexto: {context}\n\nMensagem: {}", input.message),
        None => input.message.clone(),
    };

    let reply = chat(state, system, &prompt)
        .await
        .map(|r| r.trim().to_owned())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| FALLBACK_ASSISTANT_REPLY.to_owned());

    store_interaction(&state.pool, user.id, "chat_assistant", &input.message, &reply).await;
    AssistantReply { reply }
}

#[cfg(test)]
#[path = "ai_test.rs"]
mod tests;
