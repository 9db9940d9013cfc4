//! Minimal OpenAI HTTP client: chat completions (structured and freeform)
//! plus embeddings. Scoped to exactly what C4/C5/C7/C10 need.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::llm::schema::StructuredOutput;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, Serialize)]
struct StructuredRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: reqwest::Client::new(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    fn map_status(&self, status: reqwest::StatusCode, body: String) -> PipelineError {
        if status.is_server_error() || status.as_u16() == 429 {
            PipelineError::TransientExternal {
                service: "openai".to_string(),
                message: format!("{status}: {body}"),
            }
        } else {
            PipelineError::PermanentExternal {
                service: "openai".to_string(),
                message: format!("{status}: {body}"),
            }
        }
    }

    /// Requests structured output conforming to `T`'s schema and deserializes
    /// the result. A schema/parse failure is its own error kind (§7) — it is
    /// not retried, since a malformed response from a fixed prompt will not
    /// usually fix itself.
    pub async fn extract<T: StructuredOutput>(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<T> {
        let schema = T::openai_schema();

        let request = StructuredRequest {
            model: model.to_string(),
            messages: vec![
                WireMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                WireMessage {
                    role: "user",
                    content: user_prompt.to_string(),
                },
            ],
            temperature: Some(0.0),
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "structured_response",
                    strict: true,
                    schema,
                },
            },
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::TransientExternal {
                service: "openai".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_status(status, body));
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| PipelineError::LlmSchemaFailure(format!("invalid response envelope: {e}")))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::LlmSchemaFailure("no choices in response".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| PipelineError::LlmSchemaFailure(format!("schema mismatch: {e}")))
    }

    /// Like [`Self::extract`] but for schemas built at runtime (e.g. one
    /// property per configured topic, whose names aren't known at compile
    /// time).
    pub async fn extract_raw(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        schema: serde_json::Value,
        schema_name: &str,
    ) -> Result<serde_json::Value> {
        let request = StructuredRequest {
            model: model.to_string(),
            messages: vec![
                WireMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                WireMessage {
                    role: "user",
                    content: user_prompt.to_string(),
                },
            ],
            temperature: Some(0.0),
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "structured_response",
                    strict: true,
                    schema,
                },
            },
        };
        let _ = schema_name;

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::TransientExternal {
                service: "openai".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_status(status, body));
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| PipelineError::LlmSchemaFailure(format!("invalid response envelope: {e}")))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::LlmSchemaFailure("no choices in response".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| PipelineError::LlmSchemaFailure(format!("schema mismatch: {e}")))
    }

    /// Transcribes an audio buffer via the Whisper transcriptions endpoint.
    /// Used by the generic (non-YouTube) transcript source.
    pub async fn transcribe_audio(&self, model: &str, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::TransientExternal {
                service: "openai".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_status(status, body));
        }

        #[derive(Debug, Deserialize)]
        struct TranscriptionResponse {
            text: String,
        }

        let parsed: TranscriptionResponse =
            response
                .json()
                .await
                .map_err(|e| PipelineError::TransientExternal {
                    service: "openai".to_string(),
                    message: e.to_string(),
                })?;

        Ok(parsed.text)
    }

    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest { model, input: text };

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::TransientExternal {
                service: "openai".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_status(status, body));
        }

        let embed_response: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| PipelineError::TransientExternal {
                    service: "openai".to_string(),
                    message: e.to_string(),
                })?;

        embed_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| PipelineError::PermanentExternal {
                service: "openai".to_string(),
                message: "no embedding in response".to_string(),
            })
    }
}
