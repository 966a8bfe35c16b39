//! Reservation stations: a fixed pool of slots for arithmetic, logical,
//! compare and branch operations awaiting operands.

use crate::alu;
use crate::cdb::Cdb;
use crate::decode::{Decoded, Format, Op};
use crate::registers::RegisterFile;
use crate::rob::Rob;

/// Number of reservation-station slots.
pub const CAPACITY: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Empty,
    WaitingCdb,
    Executed,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: State,
    op: Op,
    tag: u32,
    qj: u32,
    qk: u32,
    vj: u32,
    vk: u32,
    result: u32,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: State::Empty,
            op: Op::Nope,
            tag: 0,
            qj: 0,
            qk: 0,
            vj: 0,
            vk: 0,
            result: 0,
        }
    }
}

impl Slot {
    fn ready(&self) -> bool {
        self.qj == 0 && self.qk == 0
    }
}

/// The result of an Execute step that happened to run a JALR: the
/// simulator driver must swap the architectural PC and clear the fetch
/// stall on the spot.
pub struct JalrEffect {
    pub new_pc: u32,
}

/// The fixed pool of 6 reservation-station slots, with a LIFO free list
/// giving the same slot-reuse discipline as the reference implementation.
pub struct ReservationStations {
    slots: [Slot; CAPACITY],
    free: Vec<usize>,
}

impl Default for ReservationStations {
    fn default() -> Self {
        Self {
            slots: [Slot::default(); CAPACITY],
            free: (0..CAPACITY).rev().collect(),
        }
    }
}

impl ReservationStations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.free.len() == CAPACITY
    }

    /// Issue a new R/I/B operation, consulting the register file and ROB to
    /// capture operand values or rename tags. `tag` is the ROB tag of this
    /// instruction.
    pub fn issue(&mut self, tag: u32, decoded: &Decoded, regs: &RegisterFile, rob: &Rob) {
        let slot_idx = self.free.pop().expect("issue called on a full RS pool");
        let slot = &mut self.slots[slot_idx];
        *slot = Slot {
            state: State::WaitingCdb,
            op: decoded.op,
            tag,
            ..Default::default()
        };

        let (vj, qj) = resolve_operand(decoded.rs1, regs, rob);
        slot.vj = vj;
        slot.qj = qj;

        if decoded.format == Format::I {
            slot.vk = decoded.imm;
            slot.qk = 0;
        } else {
            let (vk, qk) = resolve_operand(decoded.rs2, regs, rob);
            slot.vk = vk;
            slot.qk = qk;
        }
    }

    /// Run the ALU for the first ready slot. Returns `Some` if the executed
    /// operation was a JALR, so the driver can apply its special PC-swap
    /// effect.
    pub fn execute(&mut self, pc: u32) -> Option<JalrEffect> {
        for slot in &mut self.slots {
            if slot.state == State::WaitingCdb && slot.ready() {
                slot.result = alu::eval(slot.op, slot.vj, slot.vk);
                slot.state = State::Executed;
                if slot.op == Op::Jalr {
                    let target = slot.result;
                    slot.result = pc.wrapping_add(4);
                    return Some(JalrEffect { new_pc: target });
                }
                return None;
            }
        }
        None
    }

    /// Post the first executed slot's result on the CDB, freeing its slot.
    /// Returns `true` iff a broadcast happened.
    pub fn broadcast(&mut self, cdb: &mut Cdb) -> bool {
        for idx in 0..CAPACITY {
            if self.slots[idx].state == State::Executed {
                cdb.post(self.slots[idx].tag, self.slots[idx].result);
                self.slots[idx] = Slot::default();
                self.free.push(idx);
                return true;
            }
        }
        false
    }

    /// Wake any slot waiting on the tag that just broadcast.
    pub fn receive(&mut self, cdb: &Cdb) {
        let Some(b) = cdb.current() else { return };
        for slot in &mut self.slots {
            if slot.state == State::WaitingCdb {
                if slot.qj == b.tag {
                    slot.qj = 0;
                    slot.vj = b.value;
                } else if slot.qk == b.tag {
                    slot.qk = 0;
                    slot.vk = b.value;
                }
            }
        }
    }

    /// Discard all in-flight slots, as happens on a branch misprediction.
    pub fn flush(&mut self) {
        self.slots = [Slot::default(); CAPACITY];
        self.free = (0..CAPACITY).rev().collect();
    }
}

/// Look up the current producer of register `index`: if it has a live
/// rename tag, either copy the ROB's already-ready value or return the tag
/// to wait on; otherwise the architectural value is authoritative.
pub(crate) fn resolve_operand(index: u8, regs: &RegisterFile, rob: &Rob) -> (u32, u32) {
    let tag = regs.tag(index);
    if tag != 0 {
        match rob.get(tag) {
            Some(entry) if entry.ready => (entry.value, 0),
            _ => (0, tag),
        }
    } else {
        (regs.value(index), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rob::Kind;
    use pretty_assertions::assert_eq;

    #[test]
    fn issue_captures_immediate_for_i_format() {
        let mut rs = ReservationStations::new();
        let regs = RegisterFile::new();
        let rob = Rob::new();
        let decoded = Decoded {
            format: Format::I,
            op: Op::Addi,
            rd: 1,
            rs1: 0,
            rs2: 0,
            imm: 42,
            raw: 0,
        };
        rs.issue(1, &decoded, &regs, &rob);
        let mut cdb = Cdb::new();
        assert!(rs.execute(0).is_none());
        assert!(rs.broadcast(&mut cdb));
        assert_eq!(cdb.current().unwrap().value, 42);
    }

    #[test]
    fn waits_on_unready_producer_then_wakes_on_cdb() {
        let mut rs = ReservationStations::new();
        let mut regs = RegisterFile::new();
        let mut rob = Rob::new();
        let producer_tag = rob.push(Kind::Arith, 0, 0);
        regs.set_tag(5, producer_tag);

        let decoded = Decoded {
            format: Format::R,
            op: Op::Add,
            rd: 6,
            rs1: 5,
            rs2: 0,
            imm: 0,
            raw: 0,
        };
        rs.issue(2, &decoded, &regs, &rob);

        // Not ready yet: nothing executes.
        assert!(rs.execute(0).is_none());

        let mut cdb = Cdb::new();
        cdb.post(producer_tag, 7);
        rs.receive(&cdb);
        cdb.clear();

        assert!(rs.execute(0).is_none());
        assert!(rs.broadcast(&mut cdb));
        assert_eq!(cdb.current().unwrap().value, 7);
    }

    #[test]
    fn jalr_reports_target_and_link_is_pc_plus_four() {
        let mut rs = ReservationStations::new();
        let regs = RegisterFile::new();
        let rob = Rob::new();
        let decoded = Decoded {
            format: Format::I,
            op: Op::Jalr,
            rd: 1,
            rs1: 0,
            rs2: 0,
            imm: 0,
            raw: 0,
        };
        rs.issue(1, &decoded, &regs, &rob);
        let effect = rs.execute(0x100).expect("jalr effect");
        assert_eq!(effect.new_pc, 0);
        let mut cdb = Cdb::new();
        rs.broadcast(&mut cdb);
        assert_eq!(cdb.current().unwrap().value, 0x104);
    }
}
