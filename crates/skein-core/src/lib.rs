//! # skein-core
//!
//! Foundation types shared by every skein crate:
//! - [`frame`]: the decoded wire model of a streamed completion
//!   (frames, per-choice deltas, filter results, usage)
//! - [`errors`]: [`StreamError`], the cloneable terminal error handed to
//!   every consumer of a failed stream
//! - [`flavor`]: [`ApiFlavor`], the URL and key-header scheme of the service
//! - [`logging`]: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod errors;
pub mod flavor;
pub mod frame;
pub mod logging;

pub use errors::{StreamError, StreamResult};
pub use flavor::ApiFlavor;
pub use frame::{
    ChatRole, ChoiceDelta, CompletionFrame, CompletionUsage, ContentFilterResult,
    ContentFilterResults, ContentFilterSeverity, FinishReason, FunctionCallDelta, MessageDelta,
    PromptFilterResult,
};
