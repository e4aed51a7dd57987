//! Session-level shared state and the pump that writes it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use skein_core::{CompletionFrame, CompletionUsage, PromptFilterResult, StreamError, StreamResult};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::track::ChoiceTrack;
use crate::source::{FrameStream, SourceItem};

/// Aggregate metadata of a streamed completion, as observed so far.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionMetadata {
    /// Latest non-empty completion id.
    pub id: String,
    /// Latest reported creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Latest reported model name.
    pub model: Option<String>,
    /// Latest reported token usage.
    pub usage: Option<CompletionUsage>,
    /// Prompt filter results of every frame, ordered by prompt index.
    pub prompt_filter_results: Vec<PromptFilterResult>,
    /// Number of frames received, including metadata-only frames.
    pub frame_count: usize,
}

impl SessionMetadata {
    fn absorb(&mut self, frame: &CompletionFrame) {
        if !frame.id.is_empty() {
            self.id.clone_from(&frame.id);
        }
        if frame.created.is_some() {
            self.created_at = frame.created;
        }
        if frame.model.is_some() {
            self.model.clone_from(&frame.model);
        }
        if frame.usage.is_some() {
            self.usage = frame.usage;
        }
        if !frame.prompt_filter_results.is_empty() {
            self.prompt_filter_results
                .extend(frame.prompt_filter_results.iter().cloned());
            // Stable: results for the same prompt keep arrival order.
            self.prompt_filter_results.sort_by_key(|r| r.prompt_index);
        }
        self.frame_count += 1;
    }
}

#[derive(Debug, Default)]
struct SessionState {
    frames: Vec<Arc<CompletionFrame>>,
    tracks: Vec<Arc<ChoiceTrack>>,
    by_index: HashMap<u32, usize>,
    metadata: SessionMetadata,
    finished: bool,
    pump_error: Option<StreamError>,
}

impl SessionState {
    fn track_for(&mut self, index: u32) -> Arc<ChoiceTrack> {
        if let Some(&pos) = self.by_index.get(&index) {
            return Arc::clone(&self.tracks[pos]);
        }
        debug!(index, discovered = self.tracks.len() + 1, "new choice track");
        let track = Arc::new(ChoiceTrack::new(index));
        let _ = self.by_index.insert(index, self.tracks.len());
        self.tracks.push(Arc::clone(&track));
        track
    }
}

/// State shared between the pump (sole writer) and every reader.
///
/// Lock order is session, then track. Readers never hold both.
#[derive(Debug, Default)]
pub(crate) struct SessionShared {
    state: Mutex<SessionState>,
    notify: Notify,
}

impl SessionShared {
    // ── Pump side ───────────────────────────────────────────────────────

    fn apply(&self, frame: CompletionFrame) {
        let frame = Arc::new(frame);
        {
            let mut state = self.state.lock();
            state.metadata.absorb(&frame);
            state.frames.push(Arc::clone(&frame));
            for delta in &frame.choices {
                state.track_for(delta.index).push(delta.clone());
            }
        }
        self.notify.notify_waiters();
    }

    fn finish(&self, error: Option<StreamError>) {
        {
            let mut state = self.state.lock();
            for track in &state.tracks {
                track.finish(error.clone());
            }
            state.finished = true;
            state.pump_error = error;
        }
        self.notify.notify_waiters();
    }

    // ── Reader side ─────────────────────────────────────────────────────

    /// Read the track discovered at position `pos`, waiting until it exists
    /// or the pump exits. Same result shape as [`ChoiceTrack::read_at`].
    pub(crate) async fn track_at(
        &self,
        pos: usize,
        cancel: &CancellationToken,
    ) -> StreamResult<Option<Arc<ChoiceTrack>>> {
        loop {
            if cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            let _ = notified.as_mut().enable();

            {
                let state = self.state.lock();
                if let Some(track) = state.tracks.get(pos) {
                    return Ok(Some(Arc::clone(track)));
                }
                if state.finished {
                    return match &state.pump_error {
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

    /// Wait for the pump to exit; returns its error, if any.
    pub(crate) async fn wait_finished(&self, cancel: &CancellationToken) -> StreamResult<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            let _ = notified.as_mut().enable();

            {
                let state = self.state.lock();
                if state.finished {
                    return state.pump_error.clone().map_or(Ok(()), Err);
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(StreamError::Cancelled),
                () = &mut notified => {}
            }
        }
    }

    pub(crate) fn metadata(&self) -> SessionMetadata {
        self.state.lock().metadata.clone()
    }

    pub(crate) fn frames(&self) -> Vec<Arc<CompletionFrame>> {
        self.state.lock().frames.clone()
    }

    pub(crate) fn track(&self, index: u32) -> Option<Arc<ChoiceTrack>> {
        let state = self.state.lock();
        let pos = *state.by_index.get(&index)?;
        state.tracks.get(pos).cloned()
    }

    pub(crate) fn track_count(&self) -> usize {
        self.state.lock().tracks.len()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    pub(crate) fn pump_error(&self) -> Option<StreamError> {
        self.state.lock().pump_error.clone()
    }
}

/// Drain `source` into `shared` until it ends, fails, or `close` fires.
///
/// Always finishes every track and the session before returning, so no
/// reader can wait forever on a track that will not progress.
pub(crate) async fn pump(shared: Arc<SessionShared>, mut source: FrameStream, close: CancellationToken) {
    debug!("stream pump started");
    let mut malformed = 0usize;

    let outcome = loop {
        let item = tokio::select! {
            biased;
            () = close.cancelled() => break Err(StreamError::Closed),
            item = source.next() => item,
        };
        match item {
            None | Some(Ok(SourceItem::Done)) => break Ok(()),
            Some(Ok(SourceItem::Malformed { reason })) => {
                malformed += 1;
                debug!(%reason, "skipping malformed frame");
            }
            Some(Ok(SourceItem::Frame(frame))) => shared.apply(frame),
            Some(Err(err)) => {
                warn!(error = %err, kind = err.error_kind(), "stream source failed");
                break Err(err);
            }
        }
    };

    // Release the connection before waking readers.
    drop(source);
    let error = outcome.err();
    shared.finish(error.clone());

    let metadata = shared.metadata();
    debug!(
        frames = metadata.frame_count,
        choices = shared.track_count(),
        malformed,
        error = error.as_ref().map(StreamError::error_kind),
        "stream pump finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::from_items;
    use skein_core::{ChoiceDelta, ContentFilterResults};

    fn frame(json: &str) -> SourceItem {
        SourceItem::Frame(serde_json::from_str(json).unwrap())
    }

    async fn run(items: Vec<Result<SourceItem, StreamError>>) -> Arc<SessionShared> {
        let shared = Arc::new(SessionShared::default());
        pump(Arc::clone(&shared), from_items(items), CancellationToken::new()).await;
        shared
    }

    #[tokio::test]
    async fn metadata_takes_latest_non_empty_values() {
        let shared = run(vec![
            Ok(frame(r#"{"id":"A","created":100,"model":"m1","choices":[]}"#)),
            Ok(frame(r#"{"id":"","choices":[]}"#)),
            Ok(frame(r#"{"id":"B","created":200,"choices":[]}"#)),
        ])
        .await;
        let metadata = shared.metadata();
        assert_eq!(metadata.id, "B");
        assert_eq!(metadata.created_at.unwrap().timestamp(), 200);
        assert_eq!(metadata.model.as_deref(), Some("m1"));
        assert_eq!(metadata.frame_count, 3);
        assert_eq!(shared.frames().len(), 3);
    }

    #[tokio::test]
    async fn prompt_filter_results_accumulate_sorted() {
        let shared = run(vec![
            Ok(frame(r#"{"id":"A","prompt_filter_results":[{"prompt_index":2}],"choices":[]}"#)),
            Ok(frame(r#"{"id":"A","prompt_annotations":[{"prompt_index":0},{"prompt_index":1}]}"#)),
        ])
        .await;
        let indices: Vec<u32> = shared
            .metadata()
            .prompt_filter_results
            .iter()
            .map(|r| r.prompt_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn malformed_items_are_skipped() {
        let shared = run(vec![
            Ok(SourceItem::Malformed { reason: "bad".into() }),
            Ok(frame(r#"{"id":"A","choices":[{"index":0,"delta":{"content":"x"}}]}"#)),
            Ok(SourceItem::Done),
        ])
        .await;
        assert!(shared.is_finished());
        assert_eq!(shared.pump_error(), None);
        assert_eq!(shared.track(0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn items_after_done_are_not_read() {
        let shared = run(vec![
            Ok(SourceItem::Done),
            Ok(frame(r#"{"id":"late","choices":[{"index":0}]}"#)),
        ])
        .await;
        assert_eq!(shared.track_count(), 0);
        assert_eq!(shared.metadata().frame_count, 0);
    }

    #[tokio::test]
    async fn source_error_finishes_open_tracks_with_it() {
        let shared = run(vec![
            Ok(frame(r#"{"choices":[{"index":0,"finish_reason":"stop"},{"index":1}]}"#)),
            Err(StreamError::Transport("reset".into())),
        ])
        .await;
        assert_eq!(shared.pump_error(), Some(StreamError::Transport("reset".into())));
        assert_eq!(shared.track(0).unwrap().terminal_error(), None);
        assert_eq!(
            shared.track(1).unwrap().terminal_error(),
            Some(StreamError::Transport("reset".into()))
        );
    }

    #[tokio::test]
    async fn close_stops_a_pending_source() {
        let shared = Arc::new(SessionShared::default());
        let close = CancellationToken::new();
        let source: FrameStream = Box::pin(
            futures::stream::iter(vec![Ok(frame(r#"{"choices":[{"index":4}]}"#))])
                .chain(futures::stream::pending()),
        );
        let task = tokio::spawn(pump(Arc::clone(&shared), source, close.clone()));
        let cancel = CancellationToken::new();
        assert!(shared.track_at(0, &cancel).await.unwrap().is_some());
        close.cancel();
        task.await.unwrap();
        assert_eq!(shared.pump_error(), Some(StreamError::Closed));
        assert_eq!(shared.track(4).unwrap().terminal_error(), Some(StreamError::Closed));
    }

    #[test]
    fn absorb_ignores_missing_fields() {
        let mut metadata = SessionMetadata::default();
        metadata.absorb(&CompletionFrame {
            id: "A".into(),
            usage: Some(CompletionUsage {
                prompt_tokens: 1,
                completion_tokens: 2,
                total_tokens: 3,
            }),
            ..CompletionFrame::default()
        });
        metadata.absorb(&CompletionFrame {
            choices: vec![ChoiceDelta {
                content_filter_results: Some(ContentFilterResults::default()),
                ..ChoiceDelta::default()
            }],
            ..CompletionFrame::default()
        });
        assert_eq!(metadata.id, "A");
        assert_eq!(metadata.usage.map(|u| u.total_tokens), Some(3));
        assert_eq!(metadata.frame_count, 2);
    }
}
