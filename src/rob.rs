//! Reorder buffer: the sole source of truth for in-order retirement and
//! speculative rollback.

use std::collections::VecDeque;

/// Bounded by the same capacity the reference implementation's `Queue`
/// default gives its ROB.
pub const CAPACITY: usize = 32;

/// What kind of instruction a ROB entry represents, controlling how its
/// `dest`/`value` fields are interpreted and what Commit does with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Arithmetic, upper-immediate, jump, or load: `dest` is a register
    /// index, `value` is the result to write back.
    Arith,
    /// Load: same interpretation as `Arith`; kept as a distinct variant for
    /// readability even though Commit treats it identically.
    Load,
    /// Store: `dest` is the effective address (filled in once the LSB
    /// computes it), `value` is the store data.
    Store,
    /// Branch: `dest` is unused, `value` is the actual-taken outcome
    /// (0 or 1).
    Branch,
}

/// One in-flight instruction tracked by the ROB.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub kind: Kind,
    pub ready: bool,
    pub tag: u32,
    pub raw: u32,
    pub dest: u32,
    pub value: u32,
    pub predicted_taken: bool,
    pub pc: u32,
    pub target_pc: u32,
}

impl Entry {
    fn new(kind: Kind, tag: u32, raw: u32, pc: u32) -> Self {
        Self {
            kind,
            ready: false,
            tag,
            raw,
            dest: 0,
            value: 0,
            predicted_taken: false,
            pc,
            target_pc: 0,
        }
    }
}

/// In-order FIFO of speculative instructions. Tags are minted monotonically
/// starting at 1 (0 is reserved to mean "no rename"); the buffer is indexed
/// by `(tag - 1) % CAPACITY`, which is sound exactly as long as issue never
/// lets more than `CAPACITY` tags be live between flushes (see
/// SPEC_FULL.md §9) — enforced here by `is_full`.
#[derive(Debug, Default)]
pub struct Rob {
    buffer: VecDeque<Entry>,
    next_tag: u32,
}

impl Rob {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
            next_tag: 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= CAPACITY
    }

    /// The tag that will be assigned to the next entry pushed.
    pub fn next_tag(&self) -> u32 {
        self.next_tag
    }

    /// Allocate and append a new entry, returning its tag.
    pub fn push(&mut self, kind: Kind, raw: u32, pc: u32) -> u32 {
        debug_assert!(!self.is_full(), "reorder buffer overflow");
        let tag = self.next_tag;
        self.next_tag += 1;
        self.buffer.push_back(Entry::new(kind, tag, raw, pc));
        tag
    }

    pub fn front(&self) -> Option<&Entry> {
        self.buffer.front()
    }

    pub fn pop_front(&mut self) {
        self.buffer.pop_front();
    }

    /// Look up a live entry by its rename tag.
    pub fn get(&self, tag: u32) -> Option<&Entry> {
        self.buffer.iter().find(|e| e.tag == tag)
    }

    pub fn get_mut(&mut self, tag: u32) -> Option<&mut Entry> {
        self.buffer.iter_mut().find(|e| e.tag == tag)
    }

    /// Mark the entry identified by `tag` ready with `value`, as observed
    /// on the CDB.
    pub fn receive(&mut self, tag: u32, value: u32) {
        if let Some(entry) = self.get_mut(tag) {
            entry.ready = true;
            entry.value = value;
        }
    }

    /// Discard every in-flight entry and reset tag numbering, as happens on
    /// a branch misprediction.
    pub fn flush(&mut self) {
        self.buffer.clear();
        self.next_tag = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tags_are_monotonic_starting_at_one() {
        let mut rob = Rob::new();
        let t1 = rob.push(Kind::Arith, 0, 0);
        let t2 = rob.push(Kind::Arith, 0, 4);
        assert_eq!(t1, 1);
        assert_eq!(t2, 2);
    }

    #[test]
    fn retirement_is_fifo() {
        let mut rob = Rob::new();
        rob.push(Kind::Arith, 0xaa, 0);
        rob.push(Kind::Arith, 0xbb, 4);
        assert_eq!(rob.front().unwrap().raw, 0xaa);
        rob.pop_front();
        assert_eq!(rob.front().unwrap().raw, 0xbb);
    }

    #[test]
    fn receive_sets_ready_and_value() {
        let mut rob = Rob::new();
        let tag = rob.push(Kind::Arith, 0, 0);
        rob.receive(tag, 123);
        assert!(rob.get(tag).unwrap().ready);
        assert_eq!(rob.get(tag).unwrap().value, 123);
    }

    #[test]
    fn flush_resets_tag_counter() {
        let mut rob = Rob::new();
        rob.push(Kind::Arith, 0, 0);
        rob.push(Kind::Arith, 0, 4);
        rob.flush();
        assert!(rob.is_empty());
        assert_eq!(rob.next_tag(), 1);
        assert_eq!(rob.push(Kind::Arith, 0, 8), 1);
    }
}
