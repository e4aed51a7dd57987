//! Consumer-facing session over one streamed completion.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use skein_core::{ChoiceDelta, CompletionFrame, StreamError, StreamResult};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use super::handle::{AssembledMessage, ChoiceHandle};
use super::state::{SessionMetadata, SessionShared, pump};
use crate::source::FrameStream;

/// Replay stream of one choice's deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = StreamResult<ChoiceDelta>> + Send>>;

/// Replay stream of discovered choices.
pub type ChoiceStream = Pin<Box<dyn Stream<Item = StreamResult<ChoiceHandle>> + Send>>;

/// Close signal shared by every consumer-facing object of one session.
///
/// Dropping the last holder fires the signal, which stops the pump exactly
/// like [`StreamingSession::close`].
pub(crate) struct SessionLifetime {
    close: CancellationToken,
    _guard: DropGuard,
}

impl SessionLifetime {
    fn new(close: CancellationToken) -> Self {
        Self {
            _guard: close.clone().drop_guard(),
            close,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }
}

/// A streamed completion demultiplexed into per-choice tracks.
///
/// Opening a session spawns a pump task that reads the frame source to the
/// end. Any number of consumers can then enumerate choices, replay each
/// choice's deltas, and read aggregate metadata, concurrently and at any
/// time, including after the stream has ended.
///
/// Clones share the same session.
#[derive(Clone)]
pub struct StreamingSession {
    shared: Arc<SessionShared>,
    lifetime: Arc<SessionLifetime>,
}

impl fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSession")
            .field("choices", &self.shared.track_count())
            .field("finished", &self.shared.is_finished())
            .field("closed", &self.lifetime.is_closed())
            .finish_non_exhaustive()
    }
}

impl StreamingSession {
    /// Start demultiplexing `source` on the current Tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn open(source: FrameStream) -> Self {
        let shared = Arc::new(SessionShared::default());
        let close = CancellationToken::new();
        let _ = tokio::spawn(pump(Arc::clone(&shared), source, close.clone()));
        Self {
            shared,
            lifetime: Arc::new(SessionLifetime::new(close)),
        }
    }

    /// Snapshot of the aggregate metadata observed so far.
    pub fn metadata(&self) -> SessionMetadata {
        self.shared.metadata()
    }

    /// Every frame received so far, in arrival order.
    pub fn frames(&self) -> Vec<Arc<CompletionFrame>> {
        self.shared.frames()
    }

    /// Enumerate choices in discovery order, waiting for new ones until the
    /// stream ends.
    ///
    /// Every call replays from the first discovered choice. After all
    /// choices, the stream yields the session error (if any) and ends.
    pub fn choices(&self, cancel: CancellationToken) -> ChoiceStream {
        let shared = Arc::clone(&self.shared);
        let lifetime = Arc::clone(&self.lifetime);
        Box::pin(async_stream::stream! {
            let mut pos = 0usize;
            loop {
                match shared.track_at(pos, &cancel).await {
                    Ok(Some(track)) => {
                        pos += 1;
                        yield Ok(ChoiceHandle::new(track, Arc::clone(&lifetime)));
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

    /// Handle for an already discovered choice.
    pub fn choice(&self, index: u32) -> Option<ChoiceHandle> {
        self.shared
            .track(index)
            .map(|track| ChoiceHandle::new(track, Arc::clone(&self.lifetime)))
    }

    /// Number of choices discovered so far.
    pub fn choice_count(&self) -> usize {
        self.shared.track_count()
    }

    /// Whether the pump has exited.
    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Error the pump exited with, once finished.
    pub fn error(&self) -> Option<StreamError> {
        self.shared.pump_error()
    }

    /// Wait until the pump has exited; returns its error, if any.
    pub async fn wait_finished(&self, cancel: &CancellationToken) -> StreamResult<()> {
        self.shared.wait_finished(cancel).await
    }

    /// Assemble every choice, in discovery order, once each has finished.
    pub async fn collect_all(&self, cancel: &CancellationToken) -> StreamResult<Vec<AssembledMessage>> {
        let mut choices = self.choices(cancel.clone());
        let mut messages = Vec::new();
        while let Some(handle) = choices.next().await {
            messages.push(handle?.collect_message(cancel).await?);
        }
        Ok(messages)
    }

    /// Stop the stream and release its connection.
    ///
    /// Idempotent. Choices that had not finished end with
    /// [`StreamError::Closed`]. Everything received before the close stays
    /// replayable, and choices that had already finished keep their clean end.
    pub fn close(&self) {
        if !self.lifetime.is_closed() {
            debug!(choices = self.shared.track_count(), "closing stream session");
            self.lifetime.close.cancel();
        }
    }

    /// Whether [`StreamingSession::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.lifetime.is_closed()
    }
}
