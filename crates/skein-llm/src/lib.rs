//! # skein-llm
//!
//! Streaming completions from hosted LLM APIs, demultiplexed per choice.
//!
//! - [`sse`]: server-sent-event parser producing a [`FrameStream`]
//! - [`stream`]: [`StreamingSession`], one pump task per response fanning
//!   frames out into replayable per-choice tracks
//! - [`client`]: `reqwest` client for the chat and text completion endpoints
//!   (`OpenAI` and Azure URL schemes)
//!
//! ```ignore
//! let session = client.stream_chat(&request).await?;
//! let mut choices = session.choices(cancel.clone());
//! while let Some(choice) = choices.next().await {
//!     let choice = choice?;
//!     let mut deltas = choice.deltas(cancel.clone());
//!     while let Some(delta) = deltas.next().await {
//!         print!("{}", delta?.content().unwrap_or_default());
//!     }
//! }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod source;
pub mod sse;
pub mod stream;

pub use client::{
    ChatCompletionsClient, ChatCompletionsRequest, ChatMessage, ClientConfig,
    CompletionsRequest, FunctionCall, FunctionDefinition,
};
pub use error::{ProviderError, ProviderResult};
pub use skein_core::ApiFlavor;
pub use source::{FrameStream, SourceItem};
pub use sse::{SseParserOptions, decode_frame, frame_stream};
pub use stream::{
    AssembledFunctionCall, AssembledMessage, ChoiceHandle, ChoiceStream, DeltaStream,
    SessionMetadata, StreamingSession,
};
