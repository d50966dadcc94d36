//! Incremental reader for a streamed turn.
//!
//! Bytes are fed to a [`FrameDecoder`] as they arrive, so events may be split
//! across reads at any offset. Text deltas are accumulated and the whole
//! buffer is published on a `watch` channel after each one; audio clips are
//! handed to the [`AudioPlayer`] on their own tasks and never wait on text
//! rendering.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use chat_proto::{decode_audio_payload, FrameDecoder, StreamEvent};
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::player::{AudioClip, AudioPlayer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The server sent `done`.
    Completed,
    /// An `error` event, a broken connection or a stream that ended without `done`.
    Failed(String),
}

#[derive(Debug)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Every text delta in arrival order. Provisional until the conversation is refetched.
    pub response: String,
    pub audio_clips: usize,
    /// One task per clip; dropping the handles does not stop playback.
    pub playbacks: Vec<JoinHandle<()>>,
}

impl TurnReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == TurnOutcome::Completed
    }

    /// Wait until every clip of the turn has been played (or failed to).
    pub async fn wait_for_playback(&mut self) {
        for handle in self.playbacks.drain(..) {
            let _ = handle.await;
        }
    }
}

/// Read `body` until a terminal event or its end, dispatching events as they complete.
///
/// Bytes after the terminal event are left unread in `body`.
pub async fn consume<S, E>(
    body: &mut S,
    display: &watch::Sender<String>,
    player: Arc<dyn AudioPlayer>,
) -> TurnReport
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut turn = Turn {
        report: TurnReport {
            outcome: TurnOutcome::Failed(String::new()),
            response: String::new(),
            audio_clips: 0,
            playbacks: Vec::new(),
        },
        display,
        player,
    };
    let mut decoder = FrameDecoder::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return turn.finish(TurnOutcome::Failed(format!("connection lost: {e}"))),
        };
        for event in decoder.push(&chunk) {
            if let Some(outcome) = turn.dispatch(event) {
                return turn.finish(outcome);
            }
        }
    }

    let unterminated = decoder.pending();
    if let Some(outcome) = decoder.finish().and_then(|event| turn.dispatch(event)) {
        return turn.finish(outcome);
    }
    if unterminated > 0 {
        debug!("Stream ended with {unterminated} bytes of an unterminated block");
    }
    turn.finish(TurnOutcome::Failed(
        "stream ended before the reply was finished".to_string(),
    ))
}

struct Turn<'a> {
    report: TurnReport,
    display: &'a watch::Sender<String>,
    player: Arc<dyn AudioPlayer>,
}

impl Turn<'_> {
    fn dispatch(&mut self, event: StreamEvent) -> Option<TurnOutcome> {
        match event {
            StreamEvent::Text { delta } => {
                self.report.response.push_str(&delta);
                self.display.send_replace(self.report.response.clone());
                None
            }
            StreamEvent::Audio { payload, encoding } => {
                let index = self.report.audio_clips;
                self.report.audio_clips += 1;
                let player = Arc::clone(&self.player);
                self.report.playbacks.push(tokio::spawn(async move {
                    let bytes = match decode_audio_payload(&payload) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!("Audio clip {index} has an invalid payload: {e}");
                            return;
                        }
                    };
                    let clip = AudioClip {
                        index,
                        bytes,
                        encoding,
                    };
                    if let Err(e) = player.play(clip).await {
                        warn!("Audio clip {index} failed to play: {e:#}");
                    }
                }));
                None
            }
            StreamEvent::Done => Some(TurnOutcome::Completed),
            StreamEvent::Error { message } => Some(TurnOutcome::Failed(message)),
        }
    }

    fn finish(mut self, outcome: TurnOutcome) -> TurnReport {
        self.report.outcome = outcome;
        self.report
    }
}
