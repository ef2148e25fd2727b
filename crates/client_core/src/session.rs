//! Turn orchestration: one prompt in, one streamed answer (or one error) out.

use std::sync::Arc;

use futures::StreamExt;
use shared::{
    domain::{ImageAttachment, ImageId, Turn},
    error::ModelError,
};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::{
    model::{DeltaStream, GenerativeModel},
    transcript::SessionState,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const CANCELLED_TURN_MESSAGE: &str = "Request cancelled";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("a prompt is already being answered; wait for it to finish")]
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { text: String },
    Failed { message: String },
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }
}

/// Every transition of a session, delivered in order to event subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TurnStarted { prompt: String, image_count: usize },
    Delta { fragment: String, text: String },
    TurnCompleted { text: String },
    TurnFailed { message: String },
    AttachmentsChanged { count: usize },
}

pub struct ChatSession {
    model: Arc<dyn GenerativeModel>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            model,
            state,
            events,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Sends `prompt` with `images`. Staged attachments are cleared once the
    /// send is accepted.
    ///
    /// Model failures do not surface as `Err`: they end the turn with an
    /// error entry in the transcript and a [`TurnOutcome::Failed`].
    pub async fn send_prompt(
        &self,
        prompt: &str,
        images: Vec<ImageAttachment>,
    ) -> Result<TurnOutcome, SessionError> {
        self.run_turn(prompt, Some(images)).await
    }

    /// Sends `prompt` with whatever is currently staged.
    pub async fn send_pending(&self, prompt: &str) -> Result<TurnOutcome, SessionError> {
        self.run_turn(prompt, None).await
    }

    /// Clears staged images and the last rejected-send error. The transcript
    /// is left alone.
    pub fn reset(&self) {
        self.state.send_modify(|state| {
            state.pending.clear();
            state.last_error = None;
        });
        self.emit(SessionEvent::AttachmentsChanged { count: 0 });
    }

    pub fn add_image(&self, image: ImageAttachment) -> bool {
        let mut count = 0;
        let added = self.state.send_if_modified(|state| {
            let added = state.pending.add(image);
            count = state.pending.len();
            added
        });
        if added {
            self.emit(SessionEvent::AttachmentsChanged { count });
        }
        added
    }

    pub fn remove_image(&self, id: ImageId) -> bool {
        let mut count = 0;
        let removed = self.state.send_if_modified(|state| {
            let removed = state.pending.remove(id).is_some();
            count = state.pending.len();
            removed
        });
        if removed {
            self.emit(SessionEvent::AttachmentsChanged { count });
        }
        removed
    }

    async fn run_turn(
        &self,
        prompt: &str,
        images: Option<Vec<ImageAttachment>>,
    ) -> Result<TurnOutcome, SessionError> {
        if prompt.trim().is_empty() {
            return Err(self.reject(SessionError::EmptyPrompt));
        }

        let mut sent_images = Vec::new();
        let accepted = self.state.send_if_modified(|state| {
            if state.is_busy {
                return false;
            }
            sent_images = images.unwrap_or_else(|| state.pending.to_vec());
            state.pending.clear();
            state.is_busy = true;
            state.last_error = None;
            state
                .transcript
                .append_turn(Turn::user(prompt, sent_images.clone()));
            true
        });
        if !accepted {
            return Err(self.reject(SessionError::Busy));
        }

        let mut guard = TurnGuard {
            session: self,
            finished: false,
        };

        info!(
            model = self.model.model_name(),
            prompt_chars = prompt.chars().count(),
            image_count = sent_images.len(),
            "turn started"
        );
        self.emit(SessionEvent::TurnStarted {
            prompt: prompt.to_string(),
            image_count: sent_images.len(),
        });
        self.emit(SessionEvent::AttachmentsChanged { count: 0 });

        let result = match self.model.generate_stream(prompt, &sent_images).await {
            Ok(stream) => self.fold_deltas(stream).await,
            Err(err) => Err(err),
        };

        guard.finished = true;
        Ok(match result {
            Ok(text) => self.complete_turn(text),
            Err(err) => self.fail_turn(&err),
        })
    }

    async fn fold_deltas(&self, mut stream: DeltaStream) -> Result<String, ModelError> {
        let mut buffer = String::new();
        while let Some(delta) = stream.next().await {
            let fragment = delta?;
            buffer.push_str(&fragment);
            let in_progress = Turn::assistant(buffer.as_str());
            self.state
                .send_modify(|state| state.transcript.replace_last_if_assistant(in_progress));
            debug!(
                fragment_chars = fragment.chars().count(),
                total_chars = buffer.chars().count(),
                "delta folded"
            );
            self.emit(SessionEvent::Delta {
                fragment,
                text: buffer.clone(),
            });
        }
        Ok(buffer)
    }

    fn complete_turn(&self, text: String) -> TurnOutcome {
        self.state.send_modify(|state| {
            if !state.transcript.last().is_some_and(Turn::is_assistant) {
                state.transcript.append_turn(Turn::assistant(text.as_str()));
            }
            state.is_busy = false;
        });
        info!(response_chars = text.chars().count(), "turn completed");
        self.emit(SessionEvent::TurnCompleted { text: text.clone() });
        TurnOutcome::Completed { text }
    }

    fn fail_turn(&self, err: &ModelError) -> TurnOutcome {
        let message = err.user_message();
        self.end_with_error(&message);
        warn!(code = ?err.code(), error = %message, "turn failed");
        TurnOutcome::Failed { message }
    }

    fn end_with_error(&self, message: &str) {
        self.state.send_modify(|state| {
            state.transcript.discard_in_progress();
            state.transcript.append_turn(Turn::error(message));
            state.is_busy = false;
        });
        self.emit(SessionEvent::TurnFailed {
            message: message.to_string(),
        });
    }

    fn reject(&self, err: SessionError) -> SessionError {
        warn!(error = %err, "send rejected");
        let message = err.to_string();
        self.state
            .send_modify(|state| state.last_error = Some(message));
        err
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; observers are optional.
        let _ = self.events.send(event);
    }
}

/// Ends the turn with an error entry if the send future is dropped before
/// the stream reaches a terminal event, so the session never stays busy.
struct TurnGuard<'a> {
    session: &'a ChatSession,
    finished: bool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("turn dropped before completion");
            self.session.end_with_error(CANCELLED_TURN_MESSAGE);
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
