//! OpenAI and Azure OpenAI chat completion provider

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

use super::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, TokenUsage, ToolChoice};
use crate::agents::config::{LlmProviderConfig, LlmProviderType};
use crate::agents::domain::{ChatMessage, Role, ToolCall};
use crate::agents::error::{LlmError, LlmResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// Chat completion provider speaking the OpenAI wire format
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    flavor: LlmProviderType,
    model: String,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
}

impl OpenAiProvider {
    /// Create a provider, reading the API key from the configured environment variable
    pub fn new(config: &LlmProviderConfig) -> LlmResult<Self> {
        let env_var = config.api_key_env.as_deref().unwrap_or(match config.provider {
            LlmProviderType::OpenAI => "OPENAI_API_KEY",
            LlmProviderType::AzureOpenAI => "AZURE_OPENAI_API_KEY",
        });
        let api_key = env::var(env_var).map_err(|_| {
            LlmError::Authentication(format!("Environment variable {} not set", env_var))
        })?;
        Self::with_api_key(config, api_key)
    }

    /// Create a provider with an explicit API key
    pub fn with_api_key(config: &LlmProviderConfig, api_key: impl Into<String>) -> LlmResult<Self> {
        let endpoint = match config.provider {
            LlmProviderType::OpenAI => format!(
                "{}/chat/completions",
                config
                    .base_url
                    .as_deref()
                    .unwrap_or(DEFAULT_BASE_URL)
                    .trim_end_matches('/')
            ),
            LlmProviderType::AzureOpenAI => {
                // https://{resource}.openai.azure.com/openai/deployments/{deployment}/chat/completions
                let base_url = config.base_url.as_deref().ok_or_else(|| {
                    LlmError::InvalidRequest(
                        "Azure OpenAI requires base_url (e.g., https://your-resource.openai.azure.com)"
                            .to_string(),
                    )
                })?;
                format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    base_url.trim_end_matches('/'),
                    config.model,
                    config.api_version.as_deref().unwrap_or(DEFAULT_AZURE_API_VERSION)
                )
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint,
            flavor: config.provider,
            model: config.model.clone(),
            default_temperature: config.temperature,
            default_max_tokens: config.max_tokens,
        })
    }

    /// Full URL requests are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the request body for the chat completions API
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model.as_ref().unwrap_or(&self.model),
            "messages": convert_messages(&request.messages),
        });

        if let Some(temp) = request.temperature.or(self.default_temperature) {
            body["temperature"] = json!(temp);
        }

        if let Some(max_tokens) = request.max_tokens.or(self.default_max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = json!(tools
                .iter()
                .map(|t| {
                    // Function parameters must be an object schema
                    let params = if t.parameters.as_object().map_or(true, |o| o.is_empty()) {
                        json!({ "type": "object", "properties": {}, "required": [] })
                    } else {
                        t.parameters.clone()
                    };
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": params
                        }
                    })
                })
                .collect::<Vec<_>>());

            if let Some(choice) = &request.tool_choice {
                body["tool_choice"] = match choice {
                    ToolChoice::Auto => json!("auto"),
                    ToolChoice::None => json!("none"),
                    ToolChoice::Required => json!("required"),
                };
            }
        }

        if let Some(format) = &request.response_format {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": format.name,
                    "description": format.description,
                    "schema": format.schema,
                    "strict": format.strict
                }
            });
        }

        body
    }

    /// Parse a chat completions response
    fn parse_response(&self, response: OpenAiResponse) -> LlmResult<CompletionResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("No choices in response".to_string()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::Object(Default::default())),
            })
            .collect();

        let content = choice.message.content.unwrap_or_default();
        let message = ChatMessage::assistant_with_tools(content, tool_calls);

        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(CompletionResponse {
            message,
            finish_reason: FinishReason::from_wire(choice.finish_reason.as_deref()),
            usage,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        match self.flavor {
            LlmProviderType::OpenAI => "openai",
            LlmProviderType::AzureOpenAI => "azure",
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        let body = self.build_request_body(&request);

        let builder = self.client.post(&self.endpoint).json(&body);
        let builder = match self.flavor {
            LlmProviderType::OpenAI => builder.bearer_auth(&self.api_key),
            LlmProviderType::AzureOpenAI => builder.header("api-key", &self.api_key),
        };

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let error_text = response.text().await.unwrap_or_default();
            return Err(error_from_status(status.as_u16(), &error_text, retry_after));
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("Failed to parse response: {}", e)))?;

        self.parse_response(parsed)
    }
}

/// Map a non-success HTTP status onto the error taxonomy
fn error_from_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> LlmError {
    // Prompt-side filtering comes back as a 400 with a content_filter code
    if body.contains("content_filter") || body.contains("ResponsibleAIPolicyViolation") {
        return LlmError::ContentFiltered;
    }
    match status {
        401 | 403 => LlmError::Authentication(body.to_string()),
        429 => LlmError::RateLimited {
            retry_after_ms: retry_after_secs.map_or(1000, |s| s.saturating_mul(1000)),
        },
        _ => LlmError::Api {
            status,
            message: body.to_string(),
        },
    }
}

/// Convert internal messages to the wire format
fn convert_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({
                "role": m.role.to_string(),
                "content": m.content,
            });

            if let Some(tool_calls) = &m.tool_calls {
                msg["tool_calls"] = json!(tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string()
                            }
                        })
                    })
                    .collect::<Vec<_>>());
            }

            if m.role == Role::Tool {
                if let Some(tool_call_id) = &m.tool_call_id {
                    msg["tool_call_id"] = json!(tool_call_id);
                }
            }

            msg
        })
        .collect()
}

// Chat completions response types

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::domain::{Decision, SelectionDecision, ToolDefinition};

    fn provider(kind: LlmProviderType, base_url: Option<&str>) -> LlmResult<OpenAiProvider> {
        let config = LlmProviderConfig {
            provider: kind,
            model: "gpt-4o".to_string(),
            base_url: base_url.map(str::to_string),
            ..Default::default()
        };
        OpenAiProvider::with_api_key(&config, "test-key")
    }

    #[test]
    fn test_openai_endpoint() {
        let p = provider(LlmProviderType::OpenAI, None).unwrap();
        assert_eq!(p.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(p.name(), "openai");
    }

    #[test]
    fn test_azure_endpoint_requires_base_url() {
        assert!(matches!(
            provider(LlmProviderType::AzureOpenAI, None),
            Err(LlmError::InvalidRequest(_))
        ));
        let p = provider(LlmProviderType::AzureOpenAI, Some("https://bank.openai.azure.com/")).unwrap();
        assert_eq!(
            p.endpoint(),
            "https://bank.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-08-01-preview"
        );
    }

    #[test]
    fn test_body_carries_json_schema_format() {
        let p = provider(LlmProviderType::OpenAI, None).unwrap();
        let request = CompletionRequest {
            messages: vec![ChatMessage::system("pick"), ChatMessage::user("history")],
            response_format: Some(SelectionDecision::response_schema()),
            ..Default::default()
        };
        let body = p.build_request_body(&request);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "agent_selection");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_body_fills_empty_tool_parameters() {
        let p = provider(LlmProviderType::OpenAI, None).unwrap();
        let request = CompletionRequest {
            tools: Some(vec![ToolDefinition::new("balance", "Get balance", Value::Null)]),
            tool_choice: Some(ToolChoice::Auto),
            ..Default::default()
        };
        let body = p.build_request_body(&request);
        assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_error_from_status() {
        assert!(matches!(
            error_from_status(400, r#"{"error":{"code":"content_filter"}}"#, None),
            LlmError::ContentFiltered
        ));
        assert!(matches!(error_from_status(401, "nope", None), LlmError::Authentication(_)));
        assert!(matches!(
            error_from_status(429, "", Some(2)),
            LlmError::RateLimited { retry_after_ms: 2000 }
        ));
        assert!(matches!(error_from_status(503, "", None), LlmError::Api { status: 503, .. }));
    }
}
