//! Load/store buffer: address computation, memory-order disambiguation and
//! multi-cycle memory timing for loads and stores.

use crate::cdb::Cdb;
use crate::decode::{Decoded, Op};
use crate::memory::{Memory, Wordsize};
use crate::registers::RegisterFile;
use crate::reservation::resolve_operand;
use crate::rob::Rob;

/// Number of load/store-buffer slots.
pub const CAPACITY: usize = 3;

/// Memory-access latency, in cycles, for both loads and stores.
const MEMORY_LATENCY: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Empty,
    WaitingCdb,
    GetAddr,
    Loading,
    WaitingStore,
    Storing,
    Executed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Load,
    Store,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: State,
    op: Op,
    kind: Kind,
    tag: u32,
    qj: u32,
    qk: u32,
    vj: u32,
    vk: u32,
    addr: u32,
    data: u32,
    time: u64,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: State::Empty,
            op: Op::Nope,
            kind: Kind::Load,
            tag: 0,
            qj: 0,
            qk: 0,
            vj: 0,
            vk: 0,
            addr: 0,
            data: 0,
            time: 0,
        }
    }
}

impl Slot {
    fn ready(&self) -> bool {
        self.qj == 0 && self.qk == 0
    }
}

/// Result of `LoadStoreBuffer::tick_storing`.
pub enum StoreTick {
    /// No store is draining this cycle.
    Idle,
    /// A store's countdown is still running; the driver must not look at
    /// the ROB head this cycle.
    Busy,
    /// A store just wrote to memory and its ROB entry was dequeued.
    Completed,
}

/// The fixed pool of 3 load/store-buffer slots.
pub struct LoadStoreBuffer {
    slots: [Slot; CAPACITY],
    free: Vec<usize>,
    load_clock: Option<(usize, u32)>,
    store_clock: Option<(usize, u32)>,
}

impl Default for LoadStoreBuffer {
    fn default() -> Self {
        Self {
            slots: [Slot::default(); CAPACITY],
            free: (0..CAPACITY).rev().collect(),
            load_clock: None,
            store_clock: None,
        }
    }
}

impl LoadStoreBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.free.len() == CAPACITY
    }

    /// Issue a load or store, capturing operands per SPEC_FULL.md §4.8.
    /// `time` is the current cycle, establishing program order for
    /// disambiguation.
    pub fn issue(
        &mut self,
        tag: u32,
        decoded: &Decoded,
        regs: &RegisterFile,
        rob: &Rob,
        time: u64,
    ) {
        let idx = self.free.pop().expect("issue called on a full LSB pool");
        let mut slot = Slot {
            state: State::WaitingCdb,
            op: decoded.op,
            tag,
            time,
            ..Default::default()
        };

        if decoded.op.is_load() {
            slot.kind = Kind::Load;
            let (vj, qj) = resolve_operand(decoded.rs1, regs, rob);
            slot.vj = vj;
            slot.qj = qj;
            slot.vk = decoded.imm;
            slot.qk = 0;
        } else {
            slot.kind = Kind::Store;
            slot.vj = decoded.imm;
            let (base, qj) = resolve_operand(decoded.rs1, regs, rob);
            if qj == 0 {
                slot.vj = slot.vj.wrapping_add(base);
            } else {
                slot.qj = qj;
            }
            let (vk, qk) = resolve_operand(decoded.rs2, regs, rob);
            slot.vk = vk;
            slot.qk = qk;
        }

        self.slots[idx] = slot;
    }

    /// Advance memory timing and address resolution. `rob` is used to write
    /// a store's effective address into its ROB entry once known.
    pub fn execute(&mut self, memory: &Memory, rob: &mut Rob) {
        // Finish an in-flight load's memory access.
        if let Some((idx, time)) = self.load_clock {
            let time = time - 1;
            if time == 0 {
                self.slots[idx].state = State::Executed;
                self.load_clock = None;
            } else {
                self.load_clock = Some((idx, time));
            }
        }

        // Resolve addresses for loads waiting on memory disambiguation.
        for i in 0..CAPACITY {
            if self.slots[i].state != State::GetAddr || self.slots[i].kind != Kind::Load {
                continue;
            }

            let stalls_on_unresolved_store = (0..CAPACITY).any(|j| {
                self.slots[j].kind == Kind::Store
                    && self.slots[j].state == State::WaitingCdb
                    && self.slots[j].time < self.slots[i].time
            });
            if stalls_on_unresolved_store {
                continue;
            }

            // Forward from the newest older store to the same address.
            let mut forwarded: Option<(u64, u32)> = None;
            for j in 0..CAPACITY {
                let older_store_with_data = matches!(
                    self.slots[j].state,
                    State::WaitingStore | State::Storing | State::Executed
                );
                if older_store_with_data
                    && self.slots[j].addr == self.slots[i].addr
                    && self.slots[j].time < self.slots[i].time
                    && forwarded.map_or(true, |(t, _)| self.slots[j].time > t)
                {
                    forwarded = Some((self.slots[j].time, self.slots[j].data));
                }
            }

            if let Some((_, data)) = forwarded {
                self.slots[i].data = data;
                self.slots[i].state = State::Executed;
                continue;
            }

            if self.load_clock.is_none() {
                let addr = self.slots[i].addr;
                self.slots[i].data = match self.slots[i].op {
                    Op::Lb => crate::utils::sign_extend(memory.read(addr, Wordsize::Byte), 8),
                    Op::Lh => crate::utils::sign_extend(memory.read(addr, Wordsize::Halfword), 16),
                    Op::Lw => memory.read(addr, Wordsize::Word),
                    Op::Lbu => memory.read(addr, Wordsize::Byte),
                    Op::Lhu => memory.read(addr, Wordsize::Halfword),
                    other => unreachable!("non-load opcode {other:?} in load slot"),
                };
                self.slots[i].state = State::Loading;
                self.load_clock = Some((i, MEMORY_LATENCY));
            }
        }

        // Wake the first ready waiting slot (load computes its address;
        // store computes its address, captures its data, and publishes the
        // effective address into the ROB).
        for i in 0..CAPACITY {
            if self.slots[i].state == State::WaitingCdb && self.slots[i].ready() {
                match self.slots[i].kind {
                    Kind::Load => {
                        self.slots[i].addr = self.slots[i].vj.wrapping_add(self.slots[i].vk);
                        self.slots[i].state = State::GetAddr;
                    }
                    Kind::Store => {
                        let addr = self.slots[i].vj;
                        self.slots[i].addr = addr;
                        self.slots[i].data = self.slots[i].vk;
                        self.slots[i].state = State::Executed;
                        if let Some(entry) = rob.get_mut(self.slots[i].tag) {
                            entry.dest = addr;
                        }
                    }
                }
                break;
            }
        }
    }

    /// Post the first executed slot's data on the CDB. Loads free their
    /// slot immediately; stores move to `WaitingStore` and hold their slot
    /// until commit. Returns `true` iff a broadcast happened.
    pub fn broadcast(&mut self, cdb: &mut Cdb) -> bool {
        for idx in 0..CAPACITY {
            if self.slots[idx].state != State::Executed {
                continue;
            }
            cdb.post(self.slots[idx].tag, self.slots[idx].data);
            match self.slots[idx].kind {
                Kind::Load => {
                    self.slots[idx] = Slot::default();
                    self.free.push(idx);
                }
                Kind::Store => {
                    self.slots[idx].state = State::WaitingStore;
                }
            }
            return true;
        }
        false
    }

    /// Wake any slot waiting on the tag that just broadcast. A store's base
    /// address accumulates (`+=`) rather than overwrites, matching issue's
    /// accumulation of base + immediate.
    pub fn receive(&mut self, cdb: &Cdb) {
        let Some(b) = cdb.current() else { return };
        for slot in &mut self.slots {
            if slot.state != State::WaitingCdb {
                continue;
            }
            if slot.qj == b.tag {
                slot.qj = 0;
                match slot.kind {
                    Kind::Load => slot.vj = b.value,
                    Kind::Store => slot.vj = slot.vj.wrapping_add(b.value),
                }
            } else if slot.qk == b.tag {
                slot.qk = 0;
                slot.vk = b.value;
            }
        }
    }

    /// Called by Commit when the ROB head is the matching store: begin its
    /// storing countdown.
    pub fn commit_store(&mut self, tag: u32) {
        let idx = self
            .slots
            .iter()
            .position(|s| s.tag == tag && s.state == State::WaitingStore)
            .expect("commit_store called for a tag with no waiting store slot");
        self.slots[idx].state = State::Storing;
        self.store_clock = Some((idx, MEMORY_LATENCY));
    }

    /// Advance the storing countdown, if any. On completion, performs the
    /// memory write, frees the slot, and pops the ROB head.
    pub fn tick_storing(&mut self, memory: &mut Memory, rob: &mut Rob) -> StoreTick {
        let Some((idx, time)) = self.store_clock else {
            return StoreTick::Idle;
        };
        let time = time - 1;
        if time > 0 {
            self.store_clock = Some((idx, time));
            return StoreTick::Busy;
        }

        self.store_clock = None;
        let slot = self.slots[idx];
        match slot.op {
            Op::Sb => memory.write(slot.addr, slot.data, Wordsize::Byte),
            Op::Sh => memory.write(slot.addr, slot.data, Wordsize::Halfword),
            Op::Sw => memory.write(slot.addr, slot.data, Wordsize::Word),
            other => unreachable!("non-store opcode {other:?} in store slot"),
        }
        self.slots[idx] = Slot::default();
        self.free.push(idx);
        rob.pop_front();
        StoreTick::Completed
    }

    /// Discard all in-flight slots, as happens on a branch misprediction.
    pub fn flush(&mut self) {
        self.slots = [Slot::default(); CAPACITY];
        self.free = (0..CAPACITY).rev().collect();
        self.load_clock = None;
        self.store_clock = None;
    }
}
