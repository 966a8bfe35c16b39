//! Pure RV32I instruction decode.
//!
//! A single free function, [`decode`], turns a raw 32-bit instruction word
//! into a [`Decoded`] record. No state is read or mutated; the same word
//! always decodes to the same record.

use crate::utils::{extract_field, sign_extend};

/// The instruction-format class, following the RV32I base encoding plus the
/// two derived classes the reference design tracks separately: loads (`L`,
/// a specialization of I-type) and stores (`S`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    U,
    J,
    I,
    B,
    L,
    S,
    R,
}

/// Every RV32I opcode this simulator executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nope,
    Lui,
    Auipc,
    Jal,
    Jalr,
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
    Sb,
    Sh,
    Sw,
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
}

impl Op {
    /// True for the six comparison opcodes that produce a boolean branch
    /// outcome, and for the register/immediate set-less-than family, which
    /// the ALU evaluates the same way.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Op::Beq | Op::Bne | Op::Blt | Op::Bge | Op::Bltu | Op::Bgeu
        )
    }

    pub fn is_load(self) -> bool {
        matches!(self, Op::Lb | Op::Lh | Op::Lw | Op::Lbu | Op::Lhu)
    }

    pub fn is_store(self) -> bool {
        matches!(self, Op::Sb | Op::Sh | Op::Sw)
    }
}

/// A decoded instruction, carrying every field downstream pipeline stages
/// might need. Cheap to copy; this is stored by value in ROB/RS/LSB entries.
#[derive(Debug, Clone, Copy)]
pub struct Decoded {
    pub format: Format,
    pub op: Op,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub imm: u32,
    pub raw: u32,
}

/// The terminator instruction word: `addi a0, zero, 0xff`. Committing this
/// instruction ends the simulation (see `sim::Simulator`).
pub const TERMINATOR: u32 = 0x0ff0_0513;

fn opcode(instr: u32) -> u32 {
    extract_field(instr, 6, 0)
}

fn rd(instr: u32) -> u8 {
    extract_field::<u32>(instr, 11, 7) as u8
}

fn rs1(instr: u32) -> u8 {
    extract_field::<u32>(instr, 19, 15) as u8
}

fn rs2(instr: u32) -> u8 {
    extract_field::<u32>(instr, 24, 20) as u8
}

fn funct3(instr: u32) -> u32 {
    extract_field(instr, 14, 12)
}

fn funct7_bit5(instr: u32) -> bool {
    extract_field::<u32>(instr, 30, 30) != 0
}

/// I-type immediate: instr[31:20], sign-extended.
fn imm_i(instr: u32) -> u32 {
    sign_extend(extract_field(instr, 31, 20), 12)
}

/// I-type immediate used only for JALR's target offset: the raw 12-bit
/// I-immediate, left-shifted by one bit before sign extension over 13 bits.
/// This mirrors the reference implementation's `get_imm_Ij` exactly (see
/// SPEC_FULL.md §4.2/§9); it is not the standard RV32I JALR immediate.
fn imm_jalr(instr: u32) -> u32 {
    let raw = extract_field::<u32>(instr, 31, 20) << 1;
    sign_extend(raw, 13)
}

/// I-type immediate for shift-by-immediate: just the 5-bit shift amount,
/// zero-extended (bit 30, used to distinguish SRLI/SRAI, is not part of it).
fn imm_shamt(instr: u32) -> u32 {
    extract_field(instr, 24, 20)
}

/// U-type immediate: instr[31:12] placed in the top 20 bits.
fn imm_u(instr: u32) -> u32 {
    extract_field::<u32>(instr, 31, 12) << 12
}

/// J-type immediate (JAL), sign-extended over 21 bits.
fn imm_j(instr: u32) -> u32 {
    let imm20 = extract_field::<u32>(instr, 31, 31);
    let imm19_12 = extract_field::<u32>(instr, 19, 12);
    let imm11 = extract_field::<u32>(instr, 20, 20);
    let imm10_1 = extract_field::<u32>(instr, 30, 21);
    let imm = (imm20 << 20) | (imm19_12 << 12) | (imm11 << 11) | (imm10_1 << 1);
    sign_extend(imm, 21)
}

/// B-type immediate, sign-extended over 13 bits.
fn imm_b(instr: u32) -> u32 {
    let imm12 = extract_field::<u32>(instr, 31, 31);
    let imm11 = extract_field::<u32>(instr, 7, 7);
    let imm10_5 = extract_field::<u32>(instr, 30, 25);
    let imm4_1 = extract_field::<u32>(instr, 11, 8);
    let imm = (imm12 << 12) | (imm11 << 11) | (imm10_5 << 5) | (imm4_1 << 1);
    sign_extend(imm, 13)
}

/// S-type immediate, sign-extended over 12 bits.
fn imm_s(instr: u32) -> u32 {
    let imm11_5 = extract_field::<u32>(instr, 31, 25);
    let imm4_0 = extract_field::<u32>(instr, 11, 7);
    sign_extend((imm11_5 << 5) | imm4_0, 12)
}

/// Decode a raw instruction word into a [`Decoded`] record.
///
/// # Panics
///
/// Panics on an opcode/funct3/funct7 combination outside the RV32I integer
/// subset this simulator implements. Per the core's error design, unknown
/// opcodes are undefined behavior and the implementation chooses to fail
/// loudly rather than silently fabricate an instruction.
pub fn decode(instr: u32) -> Decoded {
    let base = Decoded {
        format: Format::I,
        op: Op::Nope,
        rd: 0,
        rs1: 0,
        rs2: 0,
        imm: 0,
        raw: instr,
    };

    match opcode(instr) {
        0x37 => Decoded {
            format: Format::U,
            op: Op::Lui,
            rd: rd(instr),
            imm: imm_u(instr),
            ..base
        },
        0x17 => Decoded {
            format: Format::U,
            op: Op::Auipc,
            rd: rd(instr),
            imm: imm_u(instr),
            ..base
        },
        0x6f => Decoded {
            format: Format::J,
            op: Op::Jal,
            rd: rd(instr),
            imm: imm_j(instr),
            ..base
        },
        0x67 => Decoded {
            format: Format::I,
            op: Op::Jalr,
            rd: rd(instr),
            rs1: rs1(instr),
            imm: imm_jalr(instr),
            ..base
        },
        0x63 => {
            let op = match funct3(instr) {
                0 => Op::Beq,
                1 => Op::Bne,
                4 => Op::Blt,
                5 => Op::Bge,
                6 => Op::Bltu,
                7 => Op::Bgeu,
                f => panic!("unknown branch funct3 {f:#x} in instruction {instr:#010x}"),
            };
            Decoded {
                format: Format::B,
                op,
                rs1: rs1(instr),
                rs2: rs2(instr),
                imm: imm_b(instr),
                ..base
            }
        }
        0x03 => {
            let op = match funct3(instr) {
                0 => Op::Lb,
                1 => Op::Lh,
                2 => Op::Lw,
                4 => Op::Lbu,
                5 => Op::Lhu,
                f => panic!("unknown load funct3 {f:#x} in instruction {instr:#010x}"),
            };
            Decoded {
                format: Format::L,
                op,
                rd: rd(instr),
                rs1: rs1(instr),
                imm: imm_i(instr),
                ..base
            }
        }
        0x23 => {
            let op = match funct3(instr) {
                0 => Op::Sb,
                1 => Op::Sh,
                2 => Op::Sw,
                f => panic!("unknown store funct3 {f:#x} in instruction {instr:#010x}"),
            };
            Decoded {
                format: Format::S,
                op,
                rs1: rs1(instr),
                rs2: rs2(instr),
                imm: imm_s(instr),
                ..base
            }
        }
        0x13 => {
            let (op, imm) = match funct3(instr) {
                0 => (Op::Addi, imm_i(instr)),
                2 => (Op::Slti, imm_i(instr)),
                3 => (Op::Sltiu, imm_i(instr)),
                4 => (Op::Xori, imm_i(instr)),
                6 => (Op::Ori, imm_i(instr)),
                7 => (Op::Andi, imm_i(instr)),
                1 => (Op::Slli, imm_shamt(instr)),
                5 => {
                    if funct7_bit5(instr) {
                        (Op::Srai, imm_shamt(instr))
                    } else {
                        (Op::Srli, imm_shamt(instr))
                    }
                }
                f => panic!("unknown immediate-alu funct3 {f:#x} in instruction {instr:#010x}"),
            };
            Decoded {
                format: Format::I,
                op,
                rd: rd(instr),
                rs1: rs1(instr),
                imm,
                ..base
            }
        }
        0x33 => {
            let op = match (funct3(instr), funct7_bit5(instr)) {
                (0, false) => Op::Add,
                (0, true) => Op::Sub,
                (1, _) => Op::Sll,
                (2, _) => Op::Slt,
                (3, _) => Op::Sltu,
                (4, _) => Op::Xor,
                (5, false) => Op::Srl,
                (5, true) => Op::Sra,
                (6, _) => Op::Or,
                (7, _) => Op::And,
                (f, _) => panic!("unknown register-alu funct3 {f:#x} in instruction {instr:#010x}"),
            };
            Decoded {
                format: Format::R,
                op,
                rd: rd(instr),
                rs1: rs1(instr),
                rs2: rs2(instr),
                ..base
            }
        }
        op => panic!("unknown opcode {op:#04x} in instruction {instr:#010x}"),
    }
}
