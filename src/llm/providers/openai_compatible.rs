use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> PilotResult<LlmResponse> {
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
            "max_tokens": cfg.max_tokens,
        });

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            messages = messages.len(),
            "sending LLM request"
        );
        tracing::debug!(body = %redact_images(&body), "request body (base64 omitted)");

        let mut request = self.client.post(&self.api_base).json(&body);
        // Local endpoints usually run without auth.
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::LlmProvider(format!("{status}: {err_body}")));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulate an SSE response into one reply.
    async fn handle_stream(&self, response: reqwest::Response) -> PilotResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut lines = sse_parser::LineBuffer::default();
        let mut out = LlmResponse::default();

        'stream: while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            for line in lines.push(&bytes) {
                if sse_parser::accumulate_line(&mut out, &line)? {
                    break 'stream;
                }
            }
        }

        tracing::info!(
            provider = %self.id,
            content_len = out.content.len(),
            reasoning_len = out.reasoning.len(),
            "LLM stream complete"
        );
        Ok(out)
    }

    /// Handle a non-streaming JSON response.
    async fn handle_json(&self, response: reqwest::Response) -> PilotResult<LlmResponse> {
        let json: serde_json::Value = response.json().await?;
        let out = extract_reply(&json)?;
        tracing::info!(provider = %self.id, content_len = out.content.len(), "LLM JSON response received");
        Ok(out)
    }
}

/// `choices[0].message.content` of a chat-completions payload.
pub fn extract_reply(json: &serde_json::Value) -> PilotResult<LlmResponse> {
    let message = &json["choices"][0]["message"];
    let content = message["content"].as_str().ok_or_else(|| {
        PilotError::LlmProvider(format!("malformed response: no choices[0].message.content in {json}"))
    })?;
    Ok(LlmResponse {
        content: content.to_string(),
        reasoning: message["reasoning_content"].as_str().unwrap_or_default().to_string(),
    })
}

/// Copy of `body` with every `image_url.url` replaced, for logging.
fn redact_images(body: &serde_json::Value) -> serde_json::Value {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if let Some(url) = part.pointer_mut("/image_url/url") {
                    *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                }
            }
        }
    }
    log_body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ContentPart, ImageUrl, MessageContent};

    #[test]
    fn extracts_content() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "click(1,2)" } }]
        });
        assert_eq!(extract_reply(&json).unwrap().content, "click(1,2)");
    }

    #[test]
    fn missing_content_is_malformed() {
        let json = serde_json::json!({ "error": { "message": "overloaded" } });
        assert!(matches!(extract_reply(&json), Err(PilotError::LlmProvider(_))));
    }

    #[test]
    fn redaction_keeps_text_parts() {
        let msg = ChatMessage {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::ImageUrl { image_url: ImageUrl { url: "data:image/png;base64,AAAA".into() } },
                ContentPart::Text { text: "open the menu".into() },
            ]),
        };
        let body = serde_json::json!({ "messages": [msg] });
        let redacted = redact_images(&body).to_string();
        assert!(!redacted.contains("AAAA"));
        assert!(redacted.contains("<omitted_base64_image>"));
        assert!(redacted.contains("open the menu"));
    }
}
