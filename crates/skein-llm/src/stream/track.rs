//! Per-choice append-only delta log with replay reads.

use parking_lot::Mutex;
use skein_core::{ChoiceDelta, ContentFilterResults, FinishReason, StreamError, StreamResult};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Accumulated history of one choice index.
///
/// Written only by the session pump. Readers keep their own position and
/// call [`ChoiceTrack::read_at`]; the stored deltas never change once
/// appended, so every reader sees the same sequence.
#[derive(Debug)]
pub(crate) struct ChoiceTrack {
    index: u32,
    state: Mutex<TrackState>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct TrackState {
    deltas: Vec<ChoiceDelta>,
    finished: bool,
    finish_reason: Option<FinishReason>,
    terminal_error: Option<StreamError>,
    latest_filter: Option<ContentFilterResults>,
}

impl ChoiceTrack {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            state: Mutex::new(TrackState::default()),
            notify: Notify::new(),
        }
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    // ── Pump side ───────────────────────────────────────────────────────

    /// Append a delta.
    ///
    /// Deltas arriving after the track finished are kept out of the log, but
    /// their content filter verdicts still replace the latest one.
    pub(crate) fn push(&self, delta: ChoiceDelta) {
        {
            let mut state = self.state.lock();
            if let Some(filter) = &delta.content_filter_results {
                state.latest_filter = Some(filter.clone());
            }
            if state.finished {
                trace!(index = self.index, "dropping delta after finish");
                return;
            }
            if let Some(reason) = &delta.finish_reason {
                state.finished = true;
                state.finish_reason = Some(reason.clone());
            }
            state.deltas.push(delta);
        }
        self.notify.notify_waiters();
    }

    /// Mark the track finished if it is not already, attaching `error`.
    pub(crate) fn finish(&self, error: Option<StreamError>) {
        {
            let mut state = self.state.lock();
            if state.finished {
                return;
            }
            state.finished = true;
            state.terminal_error = error;
        }
        self.notify.notify_waiters();
    }

    // ── Reader side ─────────────────────────────────────────────────────

    /// Read the delta at `pos`, waiting until it exists or the track finishes.
    ///
    /// - `Ok(Some(delta))` when `pos` is buffered (also after finish)
    /// - `Ok(None)` at the end of a cleanly finished track
    /// - `Err(terminal)` at the end of a track cut short by a stream failure
    /// - `Err(StreamError::Cancelled)` once `cancel` fires
    pub(crate) async fn read_at(
        &self,
        pos: usize,
        cancel: &CancellationToken,
    ) -> StreamResult<Option<ChoiceDelta>> {
        loop {
            if cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between check and await is not missed.
            let _ = notified.as_mut().enable();

            {
                let state = self.state.lock();
                if let Some(delta) = state.deltas.get(pos) {
                    return Ok(Some(delta.clone()));
                }
                if state.finished {
                    return match &state.terminal_error {
                        Some(err) => Err(err.clone()),
                        None => Ok(None),
                    };
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(StreamError::Cancelled),
                () = &mut notified => {}
            }
        }
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    pub(crate) fn len(&self) -> usize {
        self.state.lock().deltas.len()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    pub(crate) fn finish_reason(&self) -> Option<FinishReason> {
        self.state.lock().finish_reason.clone()
    }

    pub(crate) fn terminal_error(&self) -> Option<StreamError> {
        self.state.lock().terminal_error.clone()
    }

    pub(crate) fn latest_filter(&self) -> Option<ContentFilterResults> {
        self.state.lock().latest_filter.clone()
    }

    pub(crate) fn snapshot(&self) -> Vec<ChoiceDelta> {
        self.state.lock().deltas.clone()
    }

    /// Apply `f` to the buffered deltas under the lock.
    pub(crate) fn with_deltas<T>(&self, f: impl FnOnce(&[ChoiceDelta]) -> T) -> T {
        f(&self.state.lock().deltas)
    }
}
