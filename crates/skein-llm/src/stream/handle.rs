//! Consumer handle for one choice.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use skein_core::{ChatRole, ChoiceDelta, ContentFilterResults, FinishReason, StreamError, StreamResult};
use tokio_util::sync::CancellationToken;

use super::session::{DeltaStream, SessionLifetime};
use super::track::ChoiceTrack;

/// Function call assembled from streamed fragments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssembledFunctionCall {
    /// First name reported by any fragment.
    pub name: Option<String>,
    /// Concatenated argument text.
    pub arguments: String,
}

impl AssembledFunctionCall {
    /// Parse the argument text as JSON.
    pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// Full message of one choice, rebuilt from its deltas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledMessage {
    /// Choice index.
    pub index: u32,
    /// Role of the first delta that carried one.
    pub role: Option<ChatRole>,
    /// Concatenated content fragments.
    pub content: String,
    /// Function call, when any fragment carried one.
    pub function_call: Option<AssembledFunctionCall>,
    /// First reported finish reason.
    pub finish_reason: Option<FinishReason>,
}

impl AssembledMessage {
    fn new(index: u32) -> Self {
        Self {
            index,
            role: None,
            content: String::new(),
            function_call: None,
            finish_reason: None,
        }
    }

    fn absorb(&mut self, delta: &ChoiceDelta) {
        if self.role.is_none() {
            self.role.clone_from(&delta.delta.role);
        }
        if let Some(content) = delta.content() {
            self.content.push_str(content);
        }
        if let Some(call) = &delta.delta.function_call {
            let assembled = self.function_call.get_or_insert_with(AssembledFunctionCall::default);
            if assembled.name.is_none() {
                assembled.name.clone_from(&call.name);
            }
            if let Some(arguments) = &call.arguments {
                assembled.arguments.push_str(arguments);
            }
        }
        if self.finish_reason.is_none() {
            self.finish_reason.clone_from(&delta.finish_reason);
        }
    }
}

/// Handle on one discovered choice of a [`StreamingSession`].
///
/// Cheap to clone. Every call to [`ChoiceHandle::deltas`] starts a fresh
/// replay from the first delta. Holding a handle keeps the session open.
///
/// [`StreamingSession`]: super::StreamingSession
#[derive(Clone)]
pub struct ChoiceHandle {
    track: Arc<ChoiceTrack>,
    lifetime: Arc<SessionLifetime>,
}

impl fmt::Debug for ChoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChoiceHandle")
            .field("index", &self.track.index())
            .field("len", &self.track.len())
            .field("finished", &self.track.is_finished())
            .finish_non_exhaustive()
    }
}

impl ChoiceHandle {
    pub(crate) fn new(track: Arc<ChoiceTrack>, lifetime: Arc<SessionLifetime>) -> Self {
        Self { track, lifetime }
    }

    /// Choice index as reported on the wire.
    pub fn index(&self) -> u32 {
        self.track.index()
    }

    /// Role of the first delta that carried one.
    pub fn role(&self) -> Option<ChatRole> {
        self.track
            .with_deltas(|deltas| deltas.iter().find_map(|d| d.delta.role.clone()))
    }

    /// First reported finish reason, if the model has finished this choice.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.track.finish_reason()
    }

    /// Latest non-null content filter verdicts, including ones reported
    /// after the choice finished.
    pub fn content_filter_results(&self) -> Option<ContentFilterResults> {
        self.track.latest_filter()
    }

    /// Whether no more deltas will be appended.
    pub fn is_finished(&self) -> bool {
        self.track.is_finished()
    }

    /// Error that cut this choice short, once finished.
    pub fn terminal_error(&self) -> Option<StreamError> {
        self.track.terminal_error()
    }

    /// Number of deltas received so far.
    pub fn len(&self) -> usize {
        self.track.len()
    }

    /// Whether no delta has been received yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the deltas received so far.
    pub fn snapshot(&self) -> Vec<ChoiceDelta> {
        self.track.snapshot()
    }

    /// Replay this choice's deltas in arrival order, then wait for more.
    ///
    /// The stream ends cleanly when the choice finished normally. It yields
    /// one `Err` and ends when the session failed or was closed before the
    /// choice finished, or when `cancel` fires. Replays started after the
    /// session was closed still yield every buffered delta first.
    pub fn deltas(&self, cancel: CancellationToken) -> DeltaStream {
        let track = Arc::clone(&self.track);
        let lifetime = Arc::clone(&self.lifetime);
        Box::pin(async_stream::stream! {
            let _lifetime = lifetime;
            let mut pos = 0usize;
            loop {
                match track.read_at(pos, &cancel).await {
                    Ok(Some(delta)) => {
                        pos += 1;
                        yield Ok(delta);
                    }
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        })
    }

    /// Wait for the choice to finish and assemble its message.
    pub async fn collect_message(&self, cancel: &CancellationToken) -> StreamResult<AssembledMessage> {
        let mut message = AssembledMessage::new(self.index());
        let mut pos = 0usize;
        while let Some(delta) = self.track.read_at(pos, cancel).await? {
            message.absorb(&delta);
            pos += 1;
        }
        Ok(message)
    }

    /// Wait for the choice to finish and return its concatenated content.
    pub async fn collect_text(&self, cancel: &CancellationToken) -> StreamResult<String> {
        Ok(self.collect_message(cancel).await?.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{FunctionCallDelta, MessageDelta};

    fn function_delta(name: Option<&str>, arguments: &str) -> ChoiceDelta {
        ChoiceDelta {
            delta: MessageDelta {
                function_call: Some(FunctionCallDelta {
                    name: name.map(str::to_string),
                    arguments: Some(arguments.to_string()),
                }),
                ..MessageDelta::default()
            },
            ..ChoiceDelta::default()
        }
    }

    #[test]
    fn absorb_concatenates_function_arguments() {
        let mut message = AssembledMessage::new(0);
        message.absorb(&ChoiceDelta {
            delta: MessageDelta {
                role: Some(ChatRole::Assistant),
                ..MessageDelta::default()
            },
            ..ChoiceDelta::default()
        });
        message.absorb(&function_delta(Some("get_weather"), "{\"city\":"));
        message.absorb(&function_delta(None, "\"Oslo\"}"));
        message.absorb(&ChoiceDelta {
            finish_reason: Some(FinishReason::FunctionCall),
            ..ChoiceDelta::default()
        });

        assert_eq!(message.role, Some(ChatRole::Assistant));
        assert_eq!(message.finish_reason, Some(FinishReason::FunctionCall));
        let call = message.function_call.unwrap();
        assert_eq!(call.name.as_deref(), Some("get_weather"));
        let args: serde_json::Value = call.parse_arguments().unwrap();
        assert_eq!(args["city"], "Oslo");
    }

    #[test]
    fn absorb_keeps_first_role_and_reads_text_shape() {
        let mut message = AssembledMessage::new(2);
        message.absorb(&ChoiceDelta {
            text: Some("legacy ".into()),
            delta: MessageDelta {
                role: Some(ChatRole::Assistant),
                ..MessageDelta::default()
            },
            ..ChoiceDelta::default()
        });
        message.absorb(&ChoiceDelta {
            text: Some("text".into()),
            delta: MessageDelta {
                role: Some(ChatRole::User),
                ..MessageDelta::default()
            },
            ..ChoiceDelta::default()
        });
        assert_eq!(message.content, "legacy text");
        assert_eq!(message.role, Some(ChatRole::Assistant));
        assert!(message.function_call.is_none());
    }
}
