use crate::{DrawingElement, ElementDraft, ElementId, ParticipantId, Timestamp};

/// Append-only record of a session's drawing operations.
///
/// The only removals are `clear` and `undo_last`.
pub struct ElementLog {
    elements: Vec<DrawingElement>,
    next_seq: u64,
}

impl ElementLog {
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn append(
        &mut self,
        draft: ElementDraft,
        author: ParticipantId,
        now: Timestamp,
    ) -> &DrawingElement {
        let seq = self.next_seq;
        self.next_seq += 1;

        let id = match draft.id {
            Some(id) if !self.contains(&id) => id,
            Some(id) => {
                log::debug!("Element id {:?} already used, assigning a fresh one", id);
                Self::fresh_id()
            }
            None => Self::fresh_id(),
        };

        self.elements.push(DrawingElement {
            id,
            seq,
            shape: draft.shape,
            color: draft.color,
            stroke_width: draft.stroke_width,
            author,
            appended_at: now,
        });
        &self.elements[self.elements.len() - 1]
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Removes the most recently appended element, whoever authored it.
    pub fn undo_last(&mut self) -> Option<DrawingElement> {
        self.elements.pop()
    }

    pub fn snapshot(&self) -> Vec<DrawingElement> {
        self.elements.clone()
    }

    pub fn elements(&self) -> &[DrawingElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn contains(&self, id: &ElementId) -> bool {
        self.elements.iter().any(|e| &e.id == id)
    }

    fn fresh_id() -> ElementId {
        ElementId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ElementLog {
    fn default() -> Self {
        Self::new()
    }
}
