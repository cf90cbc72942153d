// llm.rs
// OpenAI-compatible chat client: wire types, an injectable backend trait,
// the ordered model fallback chain, and the tool-argument shape repair some
// providers require.

use crate::error::LlmError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::warn;

/// Per-call timeout; expiry is a retryable transport error that advances the
/// fallback chain.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_tool_type() -> String {
    "function".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments object, exactly as the provider sent it.
    pub arguments: String,
}

/// A tool schema in the wire format: `{"type":"function","function":{...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: Value,
}

impl ToolSchema {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: "function".into(),
            function: serde_json::json!({
                "name": name,
                "description": description,
                "parameters": parameters,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSchema>>,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}

impl ChatResponse {
    pub fn message(&self) -> Result<&ChatMessage, LlmError> {
        self.choices.first().map(|c| &c.message).ok_or(LlmError::Empty)
    }

    pub fn text(&self) -> Result<String, LlmError> {
        self.message()?
            .content
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::Empty)
    }
}

/// Structured error body some providers return: `{"error":{"message":...}}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

pub type ChatFuture<'a> = Pin<Box<dyn Future<Output = Result<ChatResponse, LlmError>> + Send + 'a>>;

/// Sends one chat-completion request. Boxed futures keep the trait
/// dyn-compatible so tests can script a backend.
pub trait ChatBackend: Send + Sync {
    fn chat(&self, request: ChatRequest) -> ChatFuture<'_>;
}

/// Live backend speaking the OpenAI-compatible HTTP contract with bearer
/// authentication.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn send(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| body.chars().take(300).collect());
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| LlmError::Transport(e.to_string()))
    }
}

impl ChatBackend for HttpBackend {
    fn chat(&self, request: ChatRequest) -> ChatFuture<'_> {
        Box::pin(self.send(request))
    }
}

/// Ordered model configurations: the first is tried first, and a retryable
/// failure advances to the next. Exhaustion is a hard failure.
pub struct FallbackChain {
    models: Vec<String>,
}

impl FallbackChain {
    pub fn new(models: Vec<String>) -> Self {
        Self { models }
    }

    pub fn primary(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or("")
    }

    pub async fn chat(
        &self,
        backend: &dyn ChatBackend,
        mut request: ChatRequest,
    ) -> Result<ChatResponse, LlmError> {
        let mut last_error = None;
        for model in &self.models {
            request.model = model.clone();
            match backend.chat(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => {
                    warn!("model {} failed ({}), advancing fallback chain", model, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(LlmError::ChainExhausted(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "empty chain".into()),
        ))
    }
}

/// Convenience: a single plain-text completion through the chain.
pub async fn complete_text(
    backend: &dyn ChatBackend,
    chain: &FallbackChain,
    prompt: &str,
    max_tokens: usize,
) -> Result<String, LlmError> {
    let request = ChatRequest {
        model: String::new(),
        messages: vec![ChatMessage::user(prompt)],
        tools: None,
        max_tokens,
        temperature: 0.0,
    };
    chain.chat(backend, request).await?.text()
}

/// Some OpenAI-compatible providers serialize JSON-array tool arguments as
/// JSON-encoded strings: `{"ids": "[\"a\", \"b\"]"}` instead of
/// `{"ids": ["a", "b"]}`. Decode any string field that parses as a JSON
/// array of strings; everything else passes through untouched.
pub fn repair_tool_arguments(arguments: &str) -> (String, bool) {
    let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(arguments) else {
        return (arguments.to_string(), false);
    };
    let mut modified = false;
    for value in map.values_mut() {
        let Value::String(s) = value else { continue };
        let trimmed = s.trim();
        if !(trimmed.starts_with('[') && trimmed.ends_with(']')) {
            continue;
        }
        if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(trimmed) {
            let all_strings = parsed
                .as_array()
                .is_some_and(|a| a.iter().all(|v| v.is_string()));
            if all_strings {
                *value = parsed;
                modified = true;
            }
        }
    }
    if modified {
        (
            serde_json::to_string(&Value::Object(map)).unwrap_or_else(|_| arguments.to_string()),
            true,
        )
    } else {
        (arguments.to_string(), false)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Scripted backend: pops pre-recorded results in order. `None` entries
    /// produce a retryable error.
    pub struct ScriptedBackend {
        responses: Mutex<Vec<Result<ChatResponse, LlmError>>>,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        pub fn new(responses: Vec<Result<ChatResponse, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn text_response(text: &str) -> ChatResponse {
            ChatResponse {
                choices: vec![Choice {
                    message: ChatMessage {
                        role: "assistant".into(),
                        content: Some(text.to_string()),
                        tool_calls: None,
                        tool_call_id: None,
                    },
                }],
            }
        }

        pub fn tool_call_response(name: &str, arguments: &str) -> ChatResponse {
            ChatResponse {
                choices: vec![Choice {
                    message: ChatMessage {
                        role: "assistant".into(),
                        content: None,
                        tool_calls: Some(vec![ToolCall {
                            id: format!("call_{}", name),
                            kind: "function".into(),
                            function: FunctionCall {
                                name: name.to_string(),
                                arguments: arguments.to_string(),
                            },
                        }]),
                        tool_call_id: None,
                    },
                }],
            }
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn chat(&self, request: ChatRequest) -> ChatFuture<'_> {
            self.requests.lock().unwrap().push(request);
            let next = {
                let mut responses = self.responses.lock().unwrap();
                if responses.is_empty() {
                    Err(LlmError::Transport("script exhausted".into()))
                } else {
                    responses.remove(0)
                }
            };
            Box::pin(async move { next })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedBackend;
    use super::*;

    #[test]
    fn stringified_arrays_are_decoded() {
        let (repaired, modified) =
            repair_tool_arguments(r#"{"component_ids": "[\"a.f\", \"b.g\"]", "path": "x.md"}"#);
        assert!(modified);
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["component_ids"][0], "a.f");
        assert_eq!(value["path"], "x.md");
    }

    #[test]
    fn genuine_strings_pass_through() {
        let original = r#"{"old_str": "[not json", "view_range": "[1, 2]"}"#;
        let (repaired, modified) = repair_tool_arguments(original);
        // [1, 2] is an array of numbers, not strings; left untouched
        assert!(!modified);
        assert_eq!(repaired, original);
    }

    #[test]
    fn non_object_arguments_pass_through() {
        let (repaired, modified) = repair_tool_arguments("not json at all");
        assert!(!modified);
        assert_eq!(repaired, "not json at all");
    }

    #[tokio::test]
    async fn chain_advances_on_retryable_and_stops_on_fatal() {
        let backend = ScriptedBackend::new(vec![
            Err(LlmError::Status { status: 503, message: "down".into() }),
            Ok(ScriptedBackend::text_response("hello")),
        ]);
        let chain = FallbackChain::new(vec!["primary".into(), "backup".into()]);
        let text = complete_text(&backend, &chain, "hi", 128).await.unwrap();
        assert_eq!(text, "hello");

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].model, "primary");
        assert_eq!(requests[1].model, "backup");
    }

    #[tokio::test]
    async fn fatal_errors_do_not_advance() {
        let backend = ScriptedBackend::new(vec![Err(LlmError::Status {
            status: 401,
            message: "bad key".into(),
        })]);
        let chain = FallbackChain::new(vec!["primary".into(), "backup".into()]);
        let err = complete_text(&backend, &chain, "hi", 128).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 401, .. }));
        assert_eq!(backend.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhaustion_is_a_hard_failure() {
        let backend = ScriptedBackend::new(vec![
            Err(LlmError::Transport("t1".into())),
            Err(LlmError::Transport("t2".into())),
        ]);
        let chain = FallbackChain::new(vec!["a".into(), "b".into()]);
        let err = complete_text(&backend, &chain, "hi", 128).await.unwrap_err();
        assert!(matches!(err, LlmError::ChainExhausted(_)));
    }
}
