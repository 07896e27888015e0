use tsdb_proto::{Sample, Status};

use crate::Cursor;

/// Bitmask of requirements a node declares, validated by the builder before
/// a chain is wired up (spec.md §4.5: "builder validates the chain against
/// these").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirements(u8);

impl Requirements {
    pub const NONE: Requirements = Requirements(0);
    pub const GROUP_BY_REQUIRED: Requirements = Requirements(1 << 0);
    pub const TERMINAL: Requirements = Requirements(1 << 1);

    pub fn contains(self, other: Requirements) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Capability set shared by every operator in the chain. A node owns its
/// downstream (`Box<dyn Node>`), so the chain has top-down ownership with
/// no cycles; the builder assembles it bottom-up and returns the root.
pub trait Node {
    fn start(&mut self) {}

    /// Returns whatever the downstream-most `put` returned, so backpressure
    /// propagates transparently through every intermediate node.
    fn put(&mut self, sample: Sample) -> bool;

    fn complete(&mut self);

    fn set_error(&mut self, status: Status);

    fn requirements(&self) -> Requirements {
        Requirements::NONE
    }
}

/// The terminal node: forwards directly into the caller-supplied cursor.
pub struct Terminal<C> {
    cursor: C,
}

impl<C: Cursor> Terminal<C> {
    pub fn new(cursor: C) -> Self {
        Terminal { cursor }
    }

    pub fn into_cursor(self) -> C {
        self.cursor
    }
}

impl<C: Cursor> Node for Terminal<C> {
    fn put(&mut self, sample: Sample) -> bool {
        self.cursor.put(sample)
    }

    fn complete(&mut self) {
        self.cursor.complete();
    }

    fn set_error(&mut self, status: Status) {
        self.cursor.set_error(status);
    }

    fn requirements(&self) -> Requirements {
        Requirements::TERMINAL
    }
}
