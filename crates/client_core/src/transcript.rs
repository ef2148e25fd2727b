//! Session-scoped chat state: the ordered turn sequence, staged images, and
//! the busy/error flags observed by the UI.

use shared::domain::{ImageAttachment, ImageId, Role, Turn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Swaps the trailing assistant turn for `turn`, or appends when the
    /// transcript does not end with an assistant turn.
    pub fn replace_last_if_assistant(&mut self, turn: Turn) {
        match self.turns.last_mut() {
            Some(last) if last.is_assistant() => *last = turn,
            _ => self.turns.push(turn),
        }
    }

    /// Drops the trailing assistant turn, if any. Returns the removed turn.
    pub fn discard_in_progress(&mut self) -> Option<Turn> {
        if self.turns.last().is_some_and(Turn::is_assistant) {
            self.turns.pop()
        } else {
            None
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.turns.iter().filter(|turn| turn.role() == role).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAttachments {
    images: Vec<ImageAttachment>,
}

impl PendingAttachments {
    /// Returns false when an image with the same id is already staged.
    pub fn add(&mut self, image: ImageAttachment) -> bool {
        if self.contains(image.id) {
            return false;
        }
        self.images.push(image);
        true
    }

    /// Removing an id that is not staged is a no-op.
    pub fn remove(&mut self, id: ImageId) -> Option<ImageAttachment> {
        let index = self.images.iter().position(|image| image.id == id)?;
        Some(self.images.remove(index))
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.images.iter().any(|image| image.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&ImageAttachment> {
        self.images.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageAttachment> {
        self.images.iter()
    }

    pub fn to_vec(&self) -> Vec<ImageAttachment> {
        self.images.clone()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Snapshot published to observers on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub transcript: Transcript,
    pub pending: PendingAttachments,
    pub is_busy: bool,
    pub last_error: Option<String>,
}

#[cfg(test)]
#[path = "tests/transcript_tests.rs"]
mod tests;
