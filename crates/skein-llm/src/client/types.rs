//! Request bodies for the completion endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use skein_core::ChatRole;

/// One message of a chat conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: ChatRole,
    /// Message text. Absent on assistant messages that only call a function.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Author name (required for `function` messages).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Function call previously requested by the assistant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl ChatMessage {
    /// A message with the given role and text.
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    /// A `system` message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    /// A `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    /// An `assistant` message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    /// The result of running function `name`.
    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(ChatRole::Function, content)
        }
    }
}

/// A complete function call, as echoed back in conversation history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// JSON argument text.
    pub arguments: String,
}

/// A function the model may call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name.
    pub name: String,
    /// What the function does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the arguments object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Body of a chat completions request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionsRequest {
    /// Model name. Ignored by Azure deployments, required by `OpenAI`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Generation limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling mass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Number of choices to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Presence penalty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// Frequency penalty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    /// End-user identifier for abuse monitoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Functions the model may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDefinition>,
    /// `"auto"`, `"none"`, or `{"name": ...}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,
    /// Always sent as `true` by the client.
    #[serde(default)]
    pub stream: bool,
}

impl ChatCompletionsRequest {
    /// A request for `messages` with every option unset.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

/// Body of a legacy text completions request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionsRequest {
    /// Model name. Ignored by Azure deployments, required by `OpenAI`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompts; each yields `n` choices.
    pub prompt: Vec<String>,
    /// Generation limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling mass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Number of choices per prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// End-user identifier for abuse monitoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Always sent as `true` by the client.
    #[serde(default)]
    pub stream: bool,
}

impl CompletionsRequest {
    /// A request for `prompt` with every option unset.
    pub fn new(prompt: Vec<String>) -> Self {
        Self {
            prompt,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_omits_unset_options() {
        let request = ChatCompletionsRequest::new(vec![ChatMessage::user("hi")]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"messages": [{"role": "user", "content": "hi"}], "stream": false})
        );
    }

    #[test]
    fn function_result_message_shape() {
        let message = ChatMessage::function_result("get_weather", "{\"temp\":3}");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "function");
        assert_eq!(value["name"], "get_weather");
    }

    #[test]
    fn functions_serialize_with_schema() {
        let request = ChatCompletionsRequest {
            functions: vec![FunctionDefinition {
                name: "lookup".into(),
                description: Some("Find a record".into()),
                parameters: Some(json!({"type": "object", "properties": {}})),
            }],
            function_call: Some(json!("auto")),
            ..ChatCompletionsRequest::new(vec![ChatMessage::user("find it")])
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["functions"][0]["name"], "lookup");
        assert_eq!(value["function_call"], "auto");
    }

    #[test]
    fn completions_request_shape() {
        let request = CompletionsRequest {
            n: Some(2),
            ..CompletionsRequest::new(vec!["Once upon".into()])
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["prompt"], json!(["Once upon"]));
        assert_eq!(value["n"], 2);
        assert!(value.get("temperature").is_none());
    }
}
