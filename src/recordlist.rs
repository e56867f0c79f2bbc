//! `RecordList` — an ordered run of `RecordId`s.
//!
//! The source keeps these as doubly-linked lists threaded through the
//! Record structs themselves. Per the arena-and-indices design note
//! (SPEC_FULL.md §9) this crate represents the same ordering as a plain
//! `Vec<RecordId>` owned by the Segment/TraceID, which gets the same
//! append/iterate/splice operations without hand-rolled link pointers —
//! the list's *identity* is the Vec, not the Records it names.

use crate::record::RecordId;

#[derive(Clone, Debug, Default)]
pub struct RecordList {
    ids: Vec<RecordId>,
}

impl RecordList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: RecordId) {
        self.ids.push(id);
    }

    pub fn prepend(&mut self, id: RecordId) {
        self.ids.insert(0, id);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.ids.iter().copied()
    }

    #[must_use]
    pub fn first(&self) -> Option<RecordId> {
        self.ids.first().copied()
    }

    #[must_use]
    pub fn last(&self) -> Option<RecordId> {
        self.ids.last().copied()
    }

    /// Moves every id out of `other`, appending them in order, leaving
    /// `other` empty. Used by the Record Writer's regroup pass (§4.6),
    /// which empties every Segment-level list into a single ID-level list.
    pub fn append(&mut self, other: &mut Self) {
        self.ids.append(&mut other.ids);
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<RecordId> {
        self.ids
    }

    #[must_use]
    pub fn from_vec(ids: Vec<RecordId>) -> Self {
        Self { ids }
    }

    pub fn set(&mut self, ids: Vec<RecordId>) {
        self.ids = ids;
    }
}
