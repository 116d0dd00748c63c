//! LLM provider boundary
//!
//! The core does not speak HTTP to the model provider itself; it defines
//! the request/response shapes and the [`CompletionClient`] seam a real
//! integration implements, plus the prompt templates the original product
//! ships. Data extraction turns free-form parent input into structured
//! health records; chat answers contextual questions about a child.

use crate::error::Result;
use crate::search::SearchResult;
use crate::types::ChatRole;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EXTRACTION_MODEL: &str = "gpt-4-1106-preview";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

/// One message in a completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMessage {
    pub role: ChatRole,
    pub content: String,
}

impl PromptMessage {
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
}

/// Sampling options for an outbound completion call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,

    /// Ask the provider to return a JSON object (extraction calls)
    #[serde(default)]
    pub json_response: bool,
}

impl CompletionOptions {
    /// Low-temperature options for structured extraction
    pub fn extraction() -> Self {
        Self {
            model: DEFAULT_EXTRACTION_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            json_response: true,
        }
    }

    /// Conversational options for contextual chat
    pub fn chat() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            json_response: false,
        }
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A completed model response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub content: String,
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Outbound seam to the model provider
///
/// Implementations own transport, authentication, and retries. Failures
/// surface as `HealthError::Upstream`.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
    ) -> Result<Completion>;

    /// Provider name for audit details (e.g. "openai")
    fn provider(&self) -> &str;
}

/// Scripted client for tests
///
/// Returns the canned responses in order, then repeats the last one.
pub struct MockCompletionClient {
    responses: std::sync::Mutex<Vec<Completion>>,
}

impl MockCompletionClient {
    pub fn new(responses: Vec<Completion>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
        }
    }

    /// Client that always answers with the given content
    pub fn always(content: impl Into<String>) -> Self {
        Self::new(vec![Completion {
            content: content.into(),
            model: "mock".to_string(),
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        }])
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(
        &self,
        _messages: &[PromptMessage],
        _options: &CompletionOptions,
    ) -> Result<Completion> {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        if responses.len() > 1 {
            Ok(responses.remove(0))
        } else {
            responses
                .first()
                .cloned()
                .ok_or_else(|| crate::error::HealthError::Upstream {
                    provider: "mock".to_string(),
                    reason: "no scripted responses".to_string(),
                })
        }
    }

    fn provider(&self) -> &str {
        "mock"
    }
}

/// System prompt for structured health-data extraction
pub fn extraction_system_prompt() -> String {
    "You are a specialized medical data extractor. Return only valid JSON \
     that conforms exactly to the provided schema."
        .to_string()
}

/// Build the user prompt for extracting health data from free-form input
pub fn build_extraction_prompt(
    input: &str,
    input_type: &str,
    schema: &serde_json::Value,
) -> String {
    format!(
        "Analyze the following {input_type} and extract all relevant health data \
         according to the provided JSON schema.\n\n\
         Required schema:\n{schema}\n\n\
         Input to analyze:\n{input}\n\n\
         Instructions:\n\
         1. Extract only information explicitly present in the input\n\
         2. If there is not enough information for a required field, use reasonable defaults\n\
         3. Assign a confidence level based on the clarity of the information\n\
         4. Include the most precise timestamp possible based on context\n\
         5. Return only valid JSON, with no additional text",
        input_type = input_type,
        schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string()),
        input = input,
    )
}

/// Build the chat system prompt from the child's context and any
/// supplementary search results (cited back to the user)
pub fn build_chat_system_prompt(
    context: &serde_json::Value,
    search_results: &[SearchResult],
) -> String {
    let mut prompt = format!(
        "You are an assistant specializing in child health. Your goal is to help \
         parents with questions about their children's health and development.\n\n\
         Child context:\n{}",
        serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string()),
    );

    if !search_results.is_empty() {
        prompt.push_str("\n\nAdditional information from trusted sources:\n");
        for result in search_results {
            prompt.push_str(&format!("- {}: {}\n", result.source, result.snippet));
        }
    }

    prompt.push_str(
        "\n\nInstructions:\n\
         1. Provide informative answers, but always remember you do not replace professional medical advice\n\
         2. If you detect anything needing immediate medical attention, recommend consulting a pediatrician\n\
         3. Use the child's context to personalize your answers\n\
         4. Cite sources when using information from web searches\n\
         5. Keep a warm and understanding tone",
    );
    prompt
}
