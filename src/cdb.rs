//! Common Data Bus: single-writer-per-cycle (tag, value) broadcast.

/// A CDB broadcast: the ROB tag of the producing instruction and its
/// result.
#[derive(Debug, Clone, Copy)]
pub struct Broadcast {
    pub tag: u32,
    pub value: u32,
}

/// Holds at most one broadcast, valid for the duration of a single
/// Write-Result phase. Cleared at the start of every Write-Result so a
/// stale broadcast can never be observed twice.
#[derive(Debug, Default)]
pub struct Cdb {
    current: Option<Broadcast>,
}

impl Cdb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&mut self, tag: u32, value: u32) {
        debug_assert!(
            self.current.is_none(),
            "at most one CDB broadcast is allowed per cycle"
        );
        self.current = Some(Broadcast { tag, value });
    }

    pub fn current(&self) -> Option<Broadcast> {
        self.current
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
