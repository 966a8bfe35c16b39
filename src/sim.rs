//! The simulator driver: owns every pipeline component and advances them
//! one cycle at a time under a randomized intra-cycle stage order.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::cdb::Cdb;
use crate::decode::{self, Decoded, Format, Op};
use crate::iqueue::{IqEntry, InstructionQueue};
use crate::lsb::{LoadStoreBuffer, StoreTick};
use crate::memory::Memory;
use crate::predictor::Predictor;
use crate::registers::RegisterFile;
use crate::reservation::ReservationStations;
use crate::rob::{Kind as RobKind, Rob};

#[derive(Debug, Clone, Copy)]
enum Stage {
    Commit,
    WriteResult,
    Execute,
    Issue,
}

/// Owns the whole pipeline and drives it one cycle at a time.
pub struct Simulator {
    memory: Memory,
    predictor: Predictor,
    regs: RegisterFile,
    iq: InstructionQueue,
    rob: Rob,
    rs: ReservationStations,
    lsb: LoadStoreBuffer,
    cdb: Cdb,
    pc: u32,
    cycle: u64,
    rng: StdRng,
}

impl Simulator {
    /// Build a fresh simulator with zeroed architectural state. `seed` pins
    /// the per-cycle stage-order RNG; if `None`, a seed is drawn from the OS
    /// entropy source and logged so the run can be replayed later.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| rand::random());
        log::info!("cycle-order RNG seed: {seed:#018x}");
        Self {
            memory: Memory::new(),
            predictor: Predictor::new(),
            regs: RegisterFile::new(),
            iq: InstructionQueue::new(),
            rob: Rob::new(),
            rs: ReservationStations::new(),
            lsb: LoadStoreBuffer::new(),
            cdb: Cdb::new(),
            pc: 0,
            cycle: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn regs(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// True once every speculative buffer has drained: no in-flight
    /// instructions anywhere in the pipeline. Useful for asserting a clean
    /// post-flush state in tests.
    pub fn is_quiescent(&self) -> bool {
        self.iq.is_empty() && self.rob.is_empty() && self.rs.is_empty() && self.lsb.is_empty()
    }

    /// Advance the pipeline by one cycle, running Commit/WriteResult/Execute
    /// /Issue in a random order. Returns the terminator's output byte the
    /// instant the terminator retires, and stops running stages for the
    /// rest of this cycle — mirroring the reference driver's immediate exit
    /// on termination.
    pub fn step(&mut self) -> Option<u8> {
        self.cycle += 1;
        let mut order = [Stage::Commit, Stage::WriteResult, Stage::Execute, Stage::Issue];
        order.shuffle(&mut self.rng);

        for stage in order {
            let output = match stage {
                Stage::Commit => self.commit(),
                Stage::WriteResult => {
                    self.write_result();
                    None
                }
                Stage::Execute => {
                    self.execute();
                    None
                }
                Stage::Issue => {
                    self.issue();
                    None
                }
            };
            if output.is_some() {
                return output;
            }
        }
        None
    }

    /// Run until the terminator commits, with no cycle limit. Intended for
    /// library callers and tests that already know their program halts.
    pub fn run_to_completion(&mut self) -> u8 {
        loop {
            if let Some(result) = self.step() {
                return result;
            }
        }
    }

    fn fetch(&mut self) {
        if self.iq.end || self.iq.stall || self.iq.is_full() {
            return;
        }

        let pc = self.pc;
        let raw = self.memory.read(pc, crate::memory::Wordsize::Word);
        let decoded = decode::decode(raw);

        if raw == decode::TERMINATOR {
            self.iq.end = true;
        }

        let mut predicted_taken = false;
        match decoded.format {
            Format::J => self.pc = self.pc.wrapping_add(decoded.imm),
            Format::B => {
                predicted_taken = self.predictor.predict(pc);
                self.pc = if predicted_taken {
                    self.pc.wrapping_add(decoded.imm)
                } else {
                    self.pc.wrapping_add(4)
                };
            }
            Format::I if decoded.op == Op::Jalr => {
                self.iq.stall = true;
            }
            _ => self.pc = self.pc.wrapping_add(4),
        }

        let has_effect = decoded.op.is_store()
            || decoded.op.is_branch()
            || decoded.op == Op::Jalr
            || decoded.rd != 0;
        if has_effect {
            log::trace!("fetch pc={pc:#010x} instr={raw:#010x} op={:?}", decoded.op);
            self.iq.push(IqEntry {
                pc,
                instr: raw,
                predicted_taken,
            });
        }
    }

    fn issue(&mut self) {
        self.fetch();
        let Some(entry) = self.iq.front() else {
            return;
        };
        let decoded = decode::decode(entry.instr);

        match decoded.format {
            Format::U => {
                if self.rob.is_full() {
                    return;
                }
                self.iq.pop();
                let value = match decoded.op {
                    Op::Lui => decoded.imm,
                    Op::Auipc => decoded.imm.wrapping_add(entry.pc),
                    other => unreachable!("non-upper-immediate opcode {other:?} in U format"),
                };
                self.issue_immediate_result(&decoded, entry.pc, value);
            }
            Format::J => {
                if self.rob.is_full() {
                    return;
                }
                self.iq.pop();
                let link = entry.pc.wrapping_add(4);
                self.issue_immediate_result(&decoded, entry.pc, link);
            }
            Format::L | Format::S => {
                if self.lsb.is_full() || self.rob.is_full() {
                    return;
                }
                self.iq.pop();
                let kind = if decoded.format == Format::S {
                    RobKind::Store
                } else {
                    RobKind::Load
                };
                let tag = self.rob.push(kind, entry.instr, entry.pc);
                if kind != RobKind::Store {
                    if let Some(e) = self.rob.get_mut(tag) {
                        e.dest = decoded.rd as u32;
                    }
                    if decoded.rd != 0 {
                        self.regs.set_tag(decoded.rd, tag);
                    }
                }
                self.lsb
                    .issue(tag, &decoded, &self.regs, &self.rob, self.cycle);
            }
            Format::B => {
                if self.rs.is_full() || self.rob.is_full() {
                    return;
                }
                self.iq.pop();
                let target = entry.pc.wrapping_add(decoded.imm);
                let tag = self.rob.push(RobKind::Branch, entry.instr, entry.pc);
                if let Some(e) = self.rob.get_mut(tag) {
                    e.predicted_taken = entry.predicted_taken;
                    e.target_pc = target;
                }
                self.rs.issue(tag, &decoded, &self.regs, &self.rob);
            }
            Format::I | Format::R => {
                if self.rs.is_full() || self.rob.is_full() {
                    return;
                }
                self.iq.pop();
                let tag = self.rob.push(RobKind::Arith, entry.instr, entry.pc);
                if let Some(e) = self.rob.get_mut(tag) {
                    e.dest = decoded.rd as u32;
                }
                if decoded.rd != 0 {
                    self.regs.set_tag(decoded.rd, tag);
                }
                self.rs.issue(tag, &decoded, &self.regs, &self.rob);
            }
        }

        self.fetch();
    }

    /// LUI/AUIPC/JAL need no operands: their result is known at issue time,
    /// so they skip the reservation stations entirely and land in the ROB
    /// already marked ready.
    fn issue_immediate_result(&mut self, decoded: &Decoded, pc: u32, value: u32) {
        let tag = self.rob.push(RobKind::Arith, decoded.raw, pc);
        if let Some(e) = self.rob.get_mut(tag) {
            e.dest = decoded.rd as u32;
            e.value = value;
            e.ready = true;
        }
        if decoded.rd != 0 {
            self.regs.set_tag(decoded.rd, tag);
        }
    }

    fn execute(&mut self) {
        self.lsb.execute(&self.memory, &mut self.rob);
        if let Some(effect) = self.rs.execute(self.pc) {
            log::debug!("jalr redirect pc={:#010x} -> {:#010x}", self.pc, effect.new_pc);
            self.pc = effect.new_pc;
            self.iq.stall = false;
        }
    }

    fn write_result(&mut self) {
        self.cdb.clear();
        let broadcast = self.rs.broadcast(&mut self.cdb) || self.lsb.broadcast(&mut self.cdb);
        if !broadcast {
            return;
        }
        self.rs.receive(&self.cdb);
        self.lsb.receive(&self.cdb);
        let b = self.cdb.current().expect("broadcast just posted a value");
        self.rob.receive(b.tag, b.value);
    }

    fn commit(&mut self) -> Option<u8> {
        if let StoreTick::Busy = self.lsb.tick_storing(&mut self.memory, &mut self.rob) {
            return None;
        }

        let head = *self.rob.front()?;
        if !head.ready {
            return None;
        }

        if head.raw == decode::TERMINATOR {
            self.regs.commit(head.dest as u8, head.value, head.tag);
            let result = (self.regs.value(10) & 0xff) as u8;
            log::info!("terminator committed at cycle {}: a0 = {result}", self.cycle);
            return Some(result);
        }

        match head.kind {
            RobKind::Store => {
                self.lsb.commit_store(head.tag);
            }
            RobKind::Branch => {
                let actual_taken = head.value != 0;
                if actual_taken != head.predicted_taken {
                    log::debug!(
                        "branch mispredict at pc={:#010x}: predicted={}, actual={}",
                        head.pc,
                        head.predicted_taken,
                        actual_taken
                    );
                    self.pc = if head.predicted_taken {
                        head.pc.wrapping_add(4)
                    } else {
                        head.target_pc
                    };
                    self.iq.flush();
                    self.rs.flush();
                    self.lsb.flush();
                    self.rob.flush();
                    self.regs.clear_tags();
                    self.predictor.feedback(head.pc, actual_taken, false);
                    self.fetch();
                } else {
                    self.rob.pop_front();
                    self.predictor.feedback(head.pc, actual_taken, true);
                }
            }
            RobKind::Arith | RobKind::Load => {
                self.regs.commit(head.dest as u8, head.value, head.tag);
                self.cdb.clear();
                self.cdb.post(head.tag, head.value);
                self.rs.receive(&self.cdb);
                self.lsb.receive(&self.cdb);
                self.rob.pop_front();
            }
        }
        None
    }
}
