//! Frame source contract consumed by the session pump.

use std::pin::Pin;

use futures::Stream;
use skein_core::{CompletionFrame, StreamError};

/// One item pulled from a frame source.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceItem {
    /// A decoded frame.
    Frame(CompletionFrame),
    /// A payload that could not be decoded. The pump skips these.
    Malformed {
        /// Decoder message, for logging.
        reason: String,
    },
    /// The termination literal. Equivalent to the source ending.
    Done,
}

/// Boxed frame source accepted by [`StreamingSession::open`].
///
/// An `Err` item is terminal: the pump records it and stops reading.
///
/// [`StreamingSession::open`]: crate::stream::StreamingSession::open
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SourceItem, StreamError>> + Send>>;

/// Box an in-memory list of items as a [`FrameStream`].
pub fn from_items<I>(items: I) -> FrameStream
where
    I: IntoIterator<Item = Result<SourceItem, StreamError>>,
    I::IntoIter: Send + 'static,
{
    Box::pin(futures::stream::iter(items))
}
