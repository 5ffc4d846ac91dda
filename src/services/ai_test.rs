use super::*;
use crate::llm::{LlmChat, LlmError};
use crate::models::UserRole;
use crate::state::test_helpers::{test_app_state, test_app_state_with_llm};
use std::sync::Arc;

// =============================================================================
// mocks
// =============================================================================

struct FixedReply(&'static str);

#[async_trait::async_trait]
impl LlmChat for FixedReply {
    async fn chat(&self, _max_tokens: u32, _system: &str, _user: &str) -> Result<String, LlmError> {
        Ok(self.0.to_string())
    }
}

struct AlwaysFails;

#[async_trait::async_trait]
impl LlmChat for AlwaysFails {
    async fn chat(&self, _max_tokens: u32, _system: &str, _user: &str) -> Result<String, LlmError> {
        Err(LlmError::ApiRequest("connection refused".to_string()))
    }
}

fn test_user() -> User {
    User {
        id: Uuid::new_v4(),
        email: "test@login.com".into(),
        name: "Test".into(),
        role: UserRole::Client,
        phone: None,
        avatar: None,
        categories: None,
        rating: None,
        is_online: false,
        latitude: None,
        longitude: None,
        created_at: time::OffsetDateTime::UNIX_EPOCH,
        updated_at: time::OffsetDateTime::UNIX_EPOCH,
    }
}

// =============================================================================
// json mining
// =============================================================================

#[test]
fn array_is_extracted_from_fenced_reply() {
    let reply = "Claro! Aqui estão:\n```json\n[{\"a\":1}]\n```\nEspero que ajude.";
    assert_eq!(extract_json_array(reply), Some("[{\"a\":1}]"));
}

#[test]
fn object_is_extracted_from_chatty_reply() {
    let reply = "Segue o resultado: {\"title\":\"x\"} — qualquer dúvida, avise.";
    assert_eq!(extract_json_object(reply), Some("{\"title\":\"x\"}"));
}

#[test]
fn extraction_fails_without_brackets() {
    assert_eq!(extract_json_array("no json here"), None);
    assert_eq!(extract_json_object("no json here"), None);
    // Closing before opening is not a slice.
    assert_eq!(extract_json_array("] oops ["), None);
    assert_eq!(extract_json_object("} oops {"), None);
}

// =============================================================================
// recommendations
// =============================================================================

#[tokio::test]
async fn recommendations_parse_a_well_formed_reply() {
    let reply = r#"Aqui estão as sugestões:
[
  {"category": "cleaning", "title": "Faxina pesada", "description": "Limpeza profunda", "estimated_price_range": "R$ 120 - R$ 250"},
  {"category": "gardening", "title": "Jardinagem", "description": "Poda e manutenção"}
]"#;
    let state = test_app_state_with_llm(Arc::new(FixedReply(reply)));

    let result = recommendations(
        &state,
        &test_user(),
        RecommendationInput { query: "minha casa está suja".into(), latitude: None, longitude: None },
    )
    .await;

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].category, "cleaning");
    assert_eq!(result[0].estimated_price_range.as_deref(), Some("R$ 120 - R$ 250"));
    assert_eq!(result[1].estimated_price_range, None);
}

#[tokio::test]
async fn recommendations_fall_back_when_llm_fails() {
    let state = test_app_state_with_llm(Arc::new(AlwaysFails));
    let result = recommendations(
        &state,
        &test_user(),
        RecommendationInput { query: "ajuda".into(), latitude: None, longitude: None },
    )
    .await;

    assert_eq!(result.len(), 3);
    assert_eq!(result[0].category, "cleaning");
}

#[tokio::test]
async fn recommendations_fall_back_on_unparseable_reply() {
    let state = test_app_state_with_llm(Arc::new(FixedReply("desculpe, não entendi")));
    let result = recommendations(
        &state,
        &test_user(),
        RecommendationInput { query: "ajuda".into(), latitude: Some(-23.55), longitude: Some(-46.63) },
    )
    .await;
    assert_eq!(result.len(), 3);
}

#[tokio::test]
async fn recommendations_fall_back_without_a_client() {
    let state = test_app_state();
    let result = recommendations(
        &state,
        &test_user(),
        RecommendationInput { query: "ajuda".into(), latitude: None, longitude: None },
    )
    .await;
    assert_eq!(result.len(), 3);
}

#[tokio::test]
async fn recommendations_treat_empty_array_as_failure() {
    let state = test_app_state_with_llm(Arc::new(FixedReply("[]")));
    let result = recommendations(
        &state,
        &test_user(),
        RecommendationInput { query: "ajuda".into(), latitude: None, longitude: None },
    )
    .await;
    assert_eq!(result.len(), 3);
}

// =============================================================================
// description enhancement
// =============================================================================

#[tokio::test]
async fn enhancement_parses_a_well_formed_reply() {
    let state = test_app_state_with_llm(Arc::new(FixedReply(
        r#"{"title": "Limpeza pós-obra", "description": "Limpeza completa após reforma", "category": "cleaning"}"#,
    )));
    let result = enhance_description(
        &state,
        &test_user(),
        EnhanceInput { description: "limpar depois da obra".into(), category: Some("cleaning".into()) },
    )
    .await;

    assert_eq!(result.title, "Limpeza pós-obra");
    assert_eq!(result.category.as_deref(), Some("cleaning"));
}

#[tokio::test]
async fn enhancement_falls_back_to_the_original_text() {
    let state = test_app_state_with_llm(Arc::new(AlwaysFails));
    let result = enhance_description(
        &state,
        &test_user(),
        EnhanceInput { description: "consertar a pia".into(), category: None },
    )
    .await;

    assert_eq!(result.description, "consertar a pia");
    assert_eq!(result.category, None);
}

// =============================================================================
// assistant
// =============================================================================

#[tokio::test]
async fn assistant_returns_trimmed_reply() {
    let state = test_app_state_with_llm(Arc::new(FixedReply("  Seu serviço está confirmado.  \n")));
    let result = chat_assistant(
        &state,
        &test_user(),
        AssistantInput { message: "cadê meu prestador?".into(), context: None },
    )
    .await;
    assert_eq!(result.reply, "Seu serviço está confirmado.");
}

#[tokio::test]
async fn assistant_falls_back_on_failure_and_blank_replies() {
    for llm in [Arc::new(AlwaysFails) as Arc<dyn LlmChat>, Arc::new(FixedReply("   "))] {
        let state = test_app_state_with_llm(llm);
        let result = chat_assistant(
            &state,
            &test_user(),
            AssistantInput { message: "oi".into(), context: Some("serviço 123".into()) },
        )
        .await;
        assert!(result.reply.starts_with("Desculpe"));
    }
}
