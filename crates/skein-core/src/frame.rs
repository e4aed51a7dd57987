//! Decoded wire model of a streamed completion.
//!
//! One [`CompletionFrame`] is decoded per `data:` line of the server-sent
//! event stream. A frame carries session metadata (id, creation time, prompt
//! filter results) plus zero or more [`ChoiceDelta`]s, each an incremental
//! fragment of one candidate answer.
//!
//! Vendor enums ([`ChatRole`], [`FinishReason`], [`ContentFilterSeverity`])
//! are open: unknown strings are kept in an `Other` variant instead of
//! failing the whole frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Decode `null` as the type's default (empty string, empty list, ...).
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ─────────────────────────────────────────────────────────────────────────────
// Open string enums
// ─────────────────────────────────────────────────────────────────────────────

/// Author role of a chat message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChatRole {
    /// Instructions that steer the assistant.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Result of a function call.
    Function,
    /// Result of a tool call.
    Tool,
    /// Any role this crate does not know about.
    Other(String),
}

impl ChatRole {
    /// Wire spelling of the role.
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Function => "function",
            Self::Tool => "tool",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ChatRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            "system" => Self::System,
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "function" => Self::Function,
            "tool" => Self::Tool,
            _ => Self::Other(s),
        }
    }
}

impl From<ChatRole> for String {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// Why the model stopped producing a choice.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    /// Natural end of the answer or a stop sequence was hit.
    Stop,
    /// Token limit reached.
    Length,
    /// Output was withheld by the content filter.
    ContentFilter,
    /// The model requested a function call.
    FunctionCall,
    /// The model requested one or more tool calls.
    ToolCalls,
    /// Any reason this crate does not know about.
    Other(String),
}

impl FinishReason {
    /// Wire spelling of the reason.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::FunctionCall => "function_call",
            Self::ToolCalls => "tool_calls",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for FinishReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            "function_call" => Self::FunctionCall,
            "tool_calls" => Self::ToolCalls,
            _ => Self::Other(s),
        }
    }
}

impl From<FinishReason> for String {
    fn from(reason: FinishReason) -> Self {
        match reason {
            FinishReason::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

/// Severity assigned by the content filter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentFilterSeverity {
    /// Nothing of concern detected.
    Safe,
    /// Low severity.
    Low,
    /// Medium severity.
    Medium,
    /// High severity.
    High,
    /// Any level this crate does not know about.
    Other(String),
}

impl From<String> for ContentFilterSeverity {
    fn from(s: String) -> Self {
        match s.as_str() {
            "safe" => Self::Safe,
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Other(s),
        }
    }
}

impl From<ContentFilterSeverity> for String {
    fn from(severity: ContentFilterSeverity) -> Self {
        match severity {
            ContentFilterSeverity::Safe => "safe".into(),
            ContentFilterSeverity::Low => "low".into(),
            ContentFilterSeverity::Medium => "medium".into(),
            ContentFilterSeverity::High => "high".into(),
            ContentFilterSeverity::Other(s) => s,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter results and usage
// ─────────────────────────────────────────────────────────────────────────────

/// Verdict of one content filter category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilterResult {
    /// Detected severity.
    pub severity: ContentFilterSeverity,
    /// Whether the content was withheld.
    #[serde(default)]
    pub filtered: bool,
}

/// Per-category content filter verdicts attached to a prompt or a choice.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilterResults {
    /// Hate speech.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hate: Option<ContentFilterResult>,
    /// Self harm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_harm: Option<ContentFilterResult>,
    /// Sexual content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sexual: Option<ContentFilterResult>,
    /// Violence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violence: Option<ContentFilterResult>,
    /// Filter service error, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// Content filter verdicts for one prompt of the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptFilterResult {
    /// Position of the prompt in the request.
    #[serde(default)]
    pub prompt_index: u32,
    /// Verdicts for that prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_filter_results: Option<ContentFilterResults>,
}

/// Token accounting reported by the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionUsage {
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens generated.
    #[serde(default)]
    pub completion_tokens: u32,
    /// Sum of both.
    #[serde(default)]
    pub total_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Deltas and frames
// ─────────────────────────────────────────────────────────────────────────────

/// Fragment of a function call requested by the model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    /// Function name; normally only present on the first fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fragment of the JSON argument text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Partial chat message carried by one delta.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelta {
    /// Author role; normally only present on the first fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,
    /// Content fragment, concatenated in arrival order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Author name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Function call fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallDelta>,
}

/// One choice's fragment within a frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDelta {
    /// Stable identifier of the choice. Not guaranteed to start at 0.
    #[serde(default)]
    pub index: u32,
    /// Chat message fragment (`delta` while streaming, `message` otherwise).
    #[serde(default, alias = "message", deserialize_with = "null_as_default")]
    pub delta: MessageDelta,
    /// Text fragment of the legacy text-completion endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Present once the choice is complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Content filter verdicts for this fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_filter_results: Option<ContentFilterResults>,
}

impl ChoiceDelta {
    /// Content fragment of this delta, from either the chat or the text shape.
    pub fn content(&self) -> Option<&str> {
        self.delta.content.as_deref().or(self.text.as_deref())
    }

    /// Whether this delta terminates its choice.
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// One decoded unit of the event stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionFrame {
    /// Completion id; usually repeated on every frame.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Creation time (unix seconds on the wire).
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created: Option<DateTime<Utc>>,
    /// Model that produced the frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Choice fragments; may be empty for metadata-only frames.
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChoiceDelta>,
    /// Prompt filter results; accumulate across frames.
    #[serde(
        default,
        alias = "prompt_annotations",
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub prompt_filter_results: Vec<PromptFilterResult>,
    /// Token usage, when the service reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> CompletionFrame {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn decodes_first_frame_with_metadata() {
        let frame = decode(json!({
            "id": "A",
            "created": 100,
            "choices": [{"index": 0, "delta": {"content": "Hel"}}]
        }));
        assert_eq!(frame.id, "A");
        assert_eq!(frame.created.unwrap().timestamp(), 100);
        assert_eq!(frame.choices.len(), 1);
        assert_eq!(frame.choices[0].content(), Some("Hel"));
        assert!(!frame.choices[0].is_final());
    }

    #[test]
    fn decodes_frame_without_metadata() {
        let frame = decode(json!({
            "choices": [{"index": 0, "delta": {"content": "lo"}, "finish_reason": "stop"}]
        }));
        assert!(frame.id.is_empty());
        assert!(frame.created.is_none());
        assert_eq!(frame.choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn null_collections_decode_as_empty() {
        let frame = decode(json!({
            "id": null,
            "choices": null,
            "prompt_filter_results": null
        }));
        assert!(frame.id.is_empty());
        assert!(frame.choices.is_empty());
        assert!(frame.prompt_filter_results.is_empty());
    }

    #[test]
    fn metadata_only_frame_is_valid() {
        let frame = decode(json!({
            "id": "",
            "created": 0,
            "choices": [],
            "prompt_filter_results": [{
                "prompt_index": 0,
                "content_filter_results": {
                    "hate": {"filtered": false, "severity": "safe"},
                    "self_harm": {"filtered": false, "severity": "safe"}
                }
            }]
        }));
        assert!(frame.choices.is_empty());
        let filters = frame.prompt_filter_results[0]
            .content_filter_results
            .as_ref()
            .unwrap();
        assert_eq!(
            filters.hate.as_ref().unwrap().severity,
            ContentFilterSeverity::Safe
        );
        assert!(filters.violence.is_none());
    }

    #[test]
    fn prompt_annotations_alias() {
        let frame = decode(json!({
            "prompt_annotations": [{"prompt_index": 2}]
        }));
        assert_eq!(frame.prompt_filter_results[0].prompt_index, 2);
    }

    #[test]
    fn message_alias_and_role() {
        let frame = decode(json!({
            "choices": [{"index": 3, "message": {"role": "assistant", "content": "hi"}}]
        }));
        let choice = &frame.choices[0];
        assert_eq!(choice.index, 3);
        assert_eq!(choice.delta.role, Some(ChatRole::Assistant));
    }

    #[test]
    fn legacy_text_fragment() {
        let frame = decode(json!({
            "choices": [{"index": 0, "text": "once upon", "finish_reason": null}]
        }));
        assert_eq!(frame.choices[0].content(), Some("once upon"));
        assert!(frame.choices[0].finish_reason.is_none());
    }

    #[test]
    fn function_call_fragment() {
        let frame = decode(json!({
            "choices": [{"index": 0, "delta": {
                "role": "assistant",
                "content": null,
                "function_call": {"name": "get_weather", "arguments": "{\"ci"}
            }}]
        }));
        let call = frame.choices[0].delta.function_call.as_ref().unwrap();
        assert_eq!(call.name.as_deref(), Some("get_weather"));
        assert_eq!(call.arguments.as_deref(), Some("{\"ci"));
        assert!(frame.choices[0].content().is_none());
    }

    #[test]
    fn unknown_enum_values_are_preserved() {
        let frame = decode(json!({
            "choices": [{
                "index": 0,
                "delta": {"role": "critic"},
                "finish_reason": "max_time",
                "content_filter_results": {"hate": {"severity": "extreme", "filtered": true}}
            }]
        }));
        let choice = &frame.choices[0];
        assert_eq!(choice.delta.role, Some(ChatRole::Other("critic".into())));
        assert_eq!(choice.finish_reason, Some(FinishReason::Other("max_time".into())));
        let hate = choice
            .content_filter_results
            .as_ref()
            .and_then(|r| r.hate.as_ref())
            .unwrap();
        assert_eq!(hate.severity, ContentFilterSeverity::Other("extreme".into()));
        assert!(hate.filtered);
    }

    #[test]
    fn usage_and_model() {
        let frame = decode(json!({
            "model": "gpt-4o-mini",
            "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
        }));
        assert_eq!(frame.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(frame.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn enum_wire_spelling_round_trips() {
        let value = serde_json::to_value(FinishReason::ContentFilter).unwrap();
        assert_eq!(value, json!("content_filter"));
        let role = serde_json::to_value(ChatRole::Other("critic".into())).unwrap();
        assert_eq!(role, json!("critic"));
    }

    #[test]
    fn created_serializes_as_unix_seconds() {
        let frame = decode(json!({"id": "x", "created": 1_700_000_000}));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["created"], json!(1_700_000_000));
    }
}
