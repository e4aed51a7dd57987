//! # Stream demultiplexer
//!
//! One pump task per [`StreamingSession`] reads the frame source and is the
//! only writer of session state. Every choice index gets an append-only
//! track the moment it is first seen. Readers (choice enumerations, delta
//! replays, metadata snapshots) take the same locks and are woken by
//! broadcast notifications, so any number of them can follow the stream
//! live or replay it after the fact.
//!
//! When the pump exits, for any reason, every unfinished track is finished
//! with the pump's error so no reader waits forever.

mod handle;
mod session;
mod state;
mod track;

pub use handle::{AssembledFunctionCall, AssembledMessage, ChoiceHandle};
pub use session::{ChoiceStream, DeltaStream, StreamingSession};
pub use state::SessionMetadata;
