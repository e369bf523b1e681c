//! Summarization adapter: one combined summary per batch.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};

/// System prompt for multi-email summaries.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are processing multiple emails at once. \
Each email starts with 'Sender: [sender]', 'Subject: [subject]', and 'Body: [content]'. \
Provide a comprehensive summary that covers all emails, highlighting: \
1. Key senders and their main points \
2. Common themes across emails \
3. Important action items \
4. Any urgent matters \
Format your response with clear sections and bullet points.";

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 500;
const SUMMARY_TOP_P: f32 = 0.9;

/// Capability interface: batch text in, one summary out.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, combined_text: &str) -> Result<String, LlmError>;

    async fn health_check(&self) -> Result<(), LlmError>;
}

/// Summarizer backed by an [`LlmProvider`].
pub struct LlmSummarizer {
    llm: Arc<dyn LlmProvider>,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, combined_text: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(combined_text),
        ])
        .with_temperature(SUMMARY_TEMPERATURE)
        .with_max_tokens(SUMMARY_MAX_TOKENS)
        .with_top_p(SUMMARY_TOP_P);

        let response = self.llm.complete(request).await?;
        let summary = response.content.trim();

        if summary.is_empty() {
            if response.finish_reason == FinishReason::Length {
                tracing::warn!("Summary truncated before any content was produced");
            }
            return Err(LlmError::EmptyResponse {
                provider: self.llm.model_name().to_string(),
            });
        }

        Ok(summary.to_string())
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        self.llm.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::{CompletionResponse, Role};

    struct ScriptedLlm {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: self.reply.clone(),
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[tokio::test]
    async fn sends_system_prompt_and_batch_text() {
        let llm = ScriptedLlm::new("  - Alice wants the report\n");
        let summarizer = LlmSummarizer::new(llm.clone());

        let summary = summarizer
            .summarize("Sender: alice\nSubject: Report\nBody: due friday")
            .await
            .unwrap();
        assert_eq!(summary, "- Alice wants the report");

        let seen = llm.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, SUMMARY_SYSTEM_PROMPT);
        assert!(request.messages[1].content.contains("due friday"));
        assert_eq!(request.max_tokens, Some(500));
        assert_eq!(request.temperature, Some(0.3));
    }

    #[tokio::test]
    async fn blank_completion_is_an_error() {
        let summarizer = LlmSummarizer::new(ScriptedLlm::new("   "));
        let err = summarizer.summarize("text").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }
}
