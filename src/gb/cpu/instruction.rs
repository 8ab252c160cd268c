use crate::gb::Bus;
use crate::gb::cpu::CPU;
use crate::gb::cpu::ops::{
    ByteSource, ByteTarget, JumpCondition, Register, ResetVector, StackRegister, WordRegister,
};
use std::fmt;

/// The eight CB sub-operations that apply uniformly to any `ByteTarget`.
#[derive(Copy, Clone, Debug)]
pub enum CbOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
    Bit(u8),
    Res(u8),
    Set(u8),
}

impl fmt::Display for CbOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CbOp::Rlc => write!(f, "RLC"),
            CbOp::Rrc => write!(f, "RRC"),
            CbOp::Rl => write!(f, "RL"),
            CbOp::Rr => write!(f, "RR"),
            CbOp::Sla => write!(f, "SLA"),
            CbOp::Sra => write!(f, "SRA"),
            CbOp::Swap => write!(f, "SWAP"),
            CbOp::Srl => write!(f, "SRL"),
            CbOp::Bit(b) => write!(f, "BIT {b},"),
            CbOp::Res(b) => write!(f, "RES {b},"),
            CbOp::Set(b) => write!(f, "SET {b},"),
        }
    }
}

/// A single decoded instruction with its operands fully resolved. Building
/// one of these consumes the opcode and any trailing immediate bytes from
/// the instruction stream, advancing PC as a side effect of decoding.
#[derive(Debug, Copy, Clone)]
pub enum Instruction {
    Nop,
    Halt,
    Stop,
    Di,
    Ei,

    Ld(ByteTarget, ByteSource),
    LdhFromA(u8),
    LdhToA(u8),
    LdHlFromSp(i8),
    LdSpFromHl,
    LdWordImm(WordRegister, u16),
    LdIndirectFromSp(u16),
    LdiAtoHl,
    LdiHlToA,
    LddAtoHl,
    LddHlToA,

    Push(StackRegister),
    Pop(StackRegister),

    Add(ByteSource),
    Adc(ByteSource),
    Sub(ByteSource),
    Sbc(ByteSource),
    And(ByteSource),
    Xor(ByteSource),
    Or(ByteSource),
    Cp(ByteSource),

    AddHl(WordRegister),
    AddSp(i8),
    IncWord(WordRegister),
    DecWord(WordRegister),
    IncByte(ByteTarget),
    DecByte(ByteTarget),

    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,

    Jp(u16),
    JpHl,
    JpCond(JumpCondition, u16),
    Jr(i8),
    JrCond(JumpCondition, i8),

    Call(u16),
    CallCond(JumpCondition, u16),
    Ret,
    RetCond(JumpCondition),
    Reti,
    Rst(ResetVector),

    Cb(CbOp, ByteTarget),

    Unknown(u8),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Nop => write!(f, "NOP"),
            Instruction::Halt => write!(f, "HALT"),
            Instruction::Stop => write!(f, "STOP"),
            Instruction::Di => write!(f, "DI"),
            Instruction::Ei => write!(f, "EI"),
            Instruction::Ld(t, s) => write!(f, "LD {t},{s}"),
            Instruction::LdhFromA(n) => write!(f, "LDH ({n:#04x}),A"),
            Instruction::LdhToA(n) => write!(f, "LDH A,({n:#04x})"),
            Instruction::LdHlFromSp(e) => write!(f, "LD HL,SP+{e}"),
            Instruction::LdSpFromHl => write!(f, "LD SP,HL"),
            Instruction::LdWordImm(r, n) => write!(f, "LD {r},{n:#06x}"),
            Instruction::LdIndirectFromSp(n) => write!(f, "LD ({n:#06x}),SP"),
            Instruction::LdiAtoHl => write!(f, "LD (HL+),A"),
            Instruction::LdiHlToA => write!(f, "LD A,(HL+)"),
            Instruction::LddAtoHl => write!(f, "LD (HL-),A"),
            Instruction::LddHlToA => write!(f, "LD A,(HL-)"),
            Instruction::Push(r) => write!(f, "PUSH {r}"),
            Instruction::Pop(r) => write!(f, "POP {r}"),
            Instruction::Add(s) => write!(f, "ADD A,{s}"),
            Instruction::Adc(s) => write!(f, "ADC A,{s}"),
            Instruction::Sub(s) => write!(f, "SUB {s}"),
            Instruction::Sbc(s) => write!(f, "SBC A,{s}"),
            Instruction::And(s) => write!(f, "AND {s}"),
            Instruction::Xor(s) => write!(f, "XOR {s}"),
            Instruction::Or(s) => write!(f, "OR {s}"),
            Instruction::Cp(s) => write!(f, "CP {s}"),
            Instruction::AddHl(r) => write!(f, "ADD HL,{r}"),
            Instruction::AddSp(e) => write!(f, "ADD SP,{e}"),
            Instruction::IncWord(r) => write!(f, "INC {r}"),
            Instruction::DecWord(r) => write!(f, "DEC {r}"),
            Instruction::IncByte(t) => write!(f, "INC {t}"),
            Instruction::DecByte(t) => write!(f, "DEC {t}"),
            Instruction::Rlca => write!(f, "RLCA"),
            Instruction::Rrca => write!(f, "RRCA"),
            Instruction::Rla => write!(f, "RLA"),
            Instruction::Rra => write!(f, "RRA"),
            Instruction::Daa => write!(f, "DAA"),
            Instruction::Cpl => write!(f, "CPL"),
            Instruction::Scf => write!(f, "SCF"),
            Instruction::Ccf => write!(f, "CCF"),
            Instruction::Jp(n) => write!(f, "JP {n:#06x}"),
            Instruction::JpHl => write!(f, "JP (HL)"),
            Instruction::JpCond(c, n) => write!(f, "JP {c},{n:#06x}"),
            Instruction::Jr(e) => write!(f, "JR {e}"),
            Instruction::JrCond(c, e) => write!(f, "JR {c},{e}"),
            Instruction::Call(n) => write!(f, "CALL {n:#06x}"),
            Instruction::CallCond(c, n) => write!(f, "CALL {c},{n:#06x}"),
            Instruction::Ret => write!(f, "RET"),
            Instruction::RetCond(c) => write!(f, "RET {c}"),
            Instruction::Reti => write!(f, "RETI"),
            Instruction::Rst(v) => write!(f, "RST {v}"),
            Instruction::Cb(op, t) => write!(f, "{op} {t}"),
            Instruction::Unknown(op) => write!(f, "UNKNOWN {op:#04x}"),
        }
    }
}

/// Maps the standard B,C,D,E,H,L,(HL),A register index used throughout the
/// primary and CB opcode tables to a `ByteSource`.
fn source_by_index(index: u8) -> ByteSource {
    match index {
        0 => ByteSource::Reg(Register::B),
        1 => ByteSource::Reg(Register::C),
        2 => ByteSource::Reg(Register::D),
        3 => ByteSource::Reg(Register::E),
        4 => ByteSource::Reg(Register::H),
        5 => ByteSource::Reg(Register::L),
        6 => ByteSource::Indirect(WordRegister::HL),
        7 => ByteSource::Reg(Register::A),
        _ => unreachable!("register index is masked to 3 bits"),
    }
}

fn target_by_index(index: u8) -> ByteTarget {
    match index {
        0 => ByteTarget::Reg(Register::B),
        1 => ByteTarget::Reg(Register::C),
        2 => ByteTarget::Reg(Register::D),
        3 => ByteTarget::Reg(Register::E),
        4 => ByteTarget::Reg(Register::H),
        5 => ByteTarget::Reg(Register::L),
        6 => ByteTarget::Indirect(WordRegister::HL),
        7 => ByteTarget::Reg(Register::A),
        _ => unreachable!("register index is masked to 3 bits"),
    }
}

fn word_register_by_index(index: u8) -> WordRegister {
    match index & 0x3 {
        0 => WordRegister::BC,
        1 => WordRegister::DE,
        2 => WordRegister::HL,
        3 => WordRegister::SP,
        _ => unreachable!(),
    }
}

fn stack_register_by_index(index: u8) -> StackRegister {
    match index & 0x3 {
        0 => StackRegister::BC,
        1 => StackRegister::DE,
        2 => StackRegister::HL,
        3 => StackRegister::AF,
        _ => unreachable!(),
    }
}

fn condition_by_index(index: u8) -> JumpCondition {
    match index & 0x3 {
        0 => JumpCondition::NotZero,
        1 => JumpCondition::Zero,
        2 => JumpCondition::NotCarry,
        3 => JumpCondition::Carry,
        _ => unreachable!(),
    }
}

const RESET_VECTORS: [ResetVector; 8] = [
    ResetVector::H00,
    ResetVector::H08,
    ResetVector::H10,
    ResetVector::H18,
    ResetVector::H20,
    ResetVector::H28,
    ResetVector::H30,
    ResetVector::H38,
];

/// Decodes one instruction starting at `cpu.r.pc`, consuming its bytes from
/// `bus` and advancing `cpu.r.pc` past them. Only reads the bus; safe to
/// call against a scratch `CPU` for disassembly without side effects on the
/// real machine.
pub fn decode<B: Bus>(cpu: &mut CPU, bus: &B) -> Instruction {
    let opcode = cpu.consume_byte(bus);
    if opcode == 0xCB {
        let cb = cpu.consume_byte(bus);
        return decode_cb(cb);
    }

    match opcode {
        0x00 => Instruction::Nop,
        0x76 => Instruction::Halt,
        0x10 => {
            let _ = cpu.consume_byte(bus); // STOP's second byte is always 0x00
            Instruction::Stop
        }
        0xF3 => Instruction::Di,
        0xFB => Instruction::Ei,

        // LD r,r' / r,(HL) / (HL),r -- excludes 0x76 (HALT), handled above.
        0x40..=0x7F => {
            let dest = target_by_index((opcode >> 3) & 0x7);
            let src = source_by_index(opcode & 0x7);
            Instruction::Ld(dest, src)
        }

        // LD r,n
        0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
            let dest = target_by_index((opcode >> 3) & 0x7);
            Instruction::Ld(dest, ByteSource::Immediate)
        }

        0x02 => Instruction::Ld(ByteTarget::Indirect(WordRegister::BC), ByteSource::Reg(Register::A)),
        0x12 => Instruction::Ld(ByteTarget::Indirect(WordRegister::DE), ByteSource::Reg(Register::A)),
        0x0A => Instruction::Ld(ByteTarget::Reg(Register::A), ByteSource::Indirect(WordRegister::BC)),
        0x1A => Instruction::Ld(ByteTarget::Reg(Register::A), ByteSource::Indirect(WordRegister::DE)),

        0x22 => Instruction::LdiAtoHl,
        0x2A => Instruction::LdiHlToA,
        0x32 => Instruction::LddAtoHl,
        0x3A => Instruction::LddHlToA,

        0xEA => Instruction::Ld(ByteTarget::IndirectImmediate, ByteSource::Reg(Register::A)),
        0xFA => Instruction::Ld(ByteTarget::Reg(Register::A), ByteSource::IndirectImmediate),

        0xE0 => {
            let offset = cpu.consume_byte(bus);
            Instruction::LdhFromA(offset)
        }
        0xF0 => {
            let offset = cpu.consume_byte(bus);
            Instruction::LdhToA(offset)
        }
        0xE2 => Instruction::Ld(ByteTarget::IndirectC, ByteSource::Reg(Register::A)),
        0xF2 => Instruction::Ld(ByteTarget::Reg(Register::A), ByteSource::IndirectC),

        // LD rr,nn
        0x01 | 0x11 | 0x21 | 0x31 => {
            let reg = word_register_by_index(opcode >> 4);
            let value = cpu.consume_word(bus);
            Instruction::LdWordImm(reg, value)
        }
        0x08 => {
            let addr = cpu.consume_word(bus);
            Instruction::LdIndirectFromSp(addr)
        }
        0xF9 => Instruction::LdSpFromHl,
        0xF8 => {
            let e = cpu.consume_signed(bus);
            Instruction::LdHlFromSp(e)
        }

        0xC1 | 0xD1 | 0xE1 | 0xF1 => Instruction::Pop(stack_register_by_index(opcode >> 4)),
        0xC5 | 0xD5 | 0xE5 | 0xF5 => Instruction::Push(stack_register_by_index(opcode >> 4)),

        // ALU A,{r,(HL),n}
        0x80..=0xBF => {
            let src = source_by_index(opcode & 0x7);
            alu_instruction((opcode >> 3) & 0x7, src)
        }
        0xC6 => alu_instruction(0, ByteSource::Immediate),
        0xCE => alu_instruction(1, ByteSource::Immediate),
        0xD6 => alu_instruction(2, ByteSource::Immediate),
        0xDE => alu_instruction(3, ByteSource::Immediate),
        0xE6 => alu_instruction(4, ByteSource::Immediate),
        0xEE => alu_instruction(5, ByteSource::Immediate),
        0xF6 => alu_instruction(6, ByteSource::Immediate),
        0xFE => alu_instruction(7, ByteSource::Immediate),

        0x09 | 0x19 | 0x29 | 0x39 => Instruction::AddHl(word_register_by_index(opcode >> 4)),
        0xE8 => {
            let e = cpu.consume_signed(bus);
            Instruction::AddSp(e)
        }
        0x03 | 0x13 | 0x23 | 0x33 => Instruction::IncWord(word_register_by_index(opcode >> 4)),
        0x0B | 0x1B | 0x2B | 0x3B => Instruction::DecWord(word_register_by_index(opcode >> 4)),

        // INC r / DEC r, bit pattern 00xxx100 / 00xxx101
        _ if opcode & 0xC7 == 0x04 => Instruction::IncByte(target_by_index((opcode >> 3) & 0x7)),
        _ if opcode & 0xC7 == 0x05 => Instruction::DecByte(target_by_index((opcode >> 3) & 0x7)),

        0x07 => Instruction::Rlca,
        0x0F => Instruction::Rrca,
        0x17 => Instruction::Rla,
        0x1F => Instruction::Rra,
        0x27 => Instruction::Daa,
        0x2F => Instruction::Cpl,
        0x37 => Instruction::Scf,
        0x3F => Instruction::Ccf,

        0xC3 => {
            let addr = cpu.consume_word(bus);
            Instruction::Jp(addr)
        }
        0xE9 => Instruction::JpHl,
        0xC2 | 0xCA | 0xD2 | 0xDA => {
            let cond = condition_by_index(opcode >> 3);
            let addr = cpu.consume_word(bus);
            Instruction::JpCond(cond, addr)
        }
        0x18 => {
            let e = cpu.consume_signed(bus);
            Instruction::Jr(e)
        }
        0x20 | 0x28 | 0x30 | 0x38 => {
            let cond = condition_by_index(opcode >> 3);
            let e = cpu.consume_signed(bus);
            Instruction::JrCond(cond, e)
        }

        0xCD => {
            let addr = cpu.consume_word(bus);
            Instruction::Call(addr)
        }
        0xC4 | 0xCC | 0xD4 | 0xDC => {
            let cond = condition_by_index(opcode >> 3);
            let addr = cpu.consume_word(bus);
            Instruction::CallCond(cond, addr)
        }
        0xC9 => Instruction::Ret,
        0xC0 | 0xC8 | 0xD0 | 0xD8 => Instruction::RetCond(condition_by_index(opcode >> 3)),
        0xD9 => Instruction::Reti,
        0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
            Instruction::Rst(RESET_VECTORS[((opcode >> 3) & 0x7) as usize])
        }

        _ => Instruction::Unknown(opcode),
    }
}

fn alu_instruction(op: u8, src: ByteSource) -> Instruction {
    match op {
        0 => Instruction::Add(src),
        1 => Instruction::Adc(src),
        2 => Instruction::Sub(src),
        3 => Instruction::Sbc(src),
        4 => Instruction::And(src),
        5 => Instruction::Xor(src),
        6 => Instruction::Or(src),
        7 => Instruction::Cp(src),
        _ => unreachable!("ALU op is masked to 3 bits"),
    }
}

fn decode_cb(opcode: u8) -> Instruction {
    let target = target_by_index(opcode & 0x7);
    let group = (opcode >> 3) & 0x7;
    let op = match opcode >> 6 {
        0 => match group {
            0 => CbOp::Rlc,
            1 => CbOp::Rrc,
            2 => CbOp::Rl,
            3 => CbOp::Rr,
            4 => CbOp::Sla,
            5 => CbOp::Sra,
            6 => CbOp::Swap,
            7 => CbOp::Srl,
            _ => unreachable!(),
        },
        1 => CbOp::Bit(group),
        2 => CbOp::Res(group),
        3 => CbOp::Set(group),
        _ => unreachable!("2-bit group is masked"),
    };
    Instruction::Cb(op, target)
}

/// Disassembles the instruction at `pc` without mutating any real machine
/// state, for use by the instruction-trace debug mode.
pub fn disassemble<B: Bus>(bus: &B, pc: u16) -> String {
    let mut scratch = CPU::default();
    scratch.r.pc = pc;
    decode(&mut scratch, bus).to_string()
}

