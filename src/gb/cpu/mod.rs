pub mod instruction;
pub mod ops;

use crate::gb::cpu::instruction::{CbOp, Instruction, decode};
use crate::gb::cpu::ops::{ByteSource, ByteTarget};
use crate::gb::registers::{FlagsRegister, Registers};
use crate::gb::{Bus, CLOCKS_PER_CYCLE, GBError, GBResult};
use crate::utils::{half_carry_add, half_carry_add_c, half_carry_add_u16, half_carry_sub, half_carry_sub_c};

/// The CPU's run-state, polled by the orchestrator between steps.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Run,
    Halt,
    Stop,
    Quit,
}

/// The Sharp LR35902 core: registers plus the run-state that governs
/// whether `step` executes an instruction at all.
#[derive(Clone)]
pub struct CPU {
    pub r: Registers,
    pub run_state: RunState,
}

impl Default for CPU {
    fn default() -> Self {
        Self {
            r: Registers::default(),
            run_state: RunState::Run,
        }
    }
}

/// Computes the result, half-carry and carry of `sp + e` the way real
/// hardware does for ADD SP,e and LD HL,SP+e: flags are derived from the
/// 8-bit addition of SP's low byte with `e` treated as unsigned, not from
/// the full 16-bit sum.
fn add_sp_signed(sp: u16, e: i8) -> (u16, bool, bool) {
    let e16 = e as i16 as u16;
    let result = sp.wrapping_add(e16);
    let half = (sp & 0x000F) + (e16 & 0x000F) > 0x000F;
    let carry = (sp & 0x00FF) + (e16 & 0x00FF) > 0x00FF;
    (result, half, carry)
}

fn read_byte_target<B: Bus>(target: ByteTarget, cpu: &CPU, bus: &B) -> u8 {
    match target {
        ByteTarget::Reg(r) => r.read(cpu),
        ByteTarget::Indirect(r) => bus.read(r.read(cpu)),
        ByteTarget::IndirectC => bus.read(0xFF00 | u16::from(cpu.r.c)),
        ByteTarget::IndirectImmediate => {
            unreachable!("INC/DEC/CB targets never resolve to a 16-bit immediate address")
        }
    }
}

impl CPU {
    /// Reads the byte at PC and advances PC by one. Only reads the bus, so
    /// it is safe to call with a shared reference for disassembly.
    #[inline]
    pub fn consume_byte<B: Bus>(&mut self, bus: &B) -> u8 {
        let value = bus.read(self.r.pc);
        self.r.pc = self.r.pc.wrapping_add(1);
        value
    }

    #[inline]
    pub fn consume_word<B: Bus>(&mut self, bus: &B) -> u16 {
        let lo = self.consume_byte(bus);
        let hi = self.consume_byte(bus);
        u16::from_le_bytes([lo, hi])
    }

    #[inline]
    pub fn consume_signed<B: Bus>(&mut self, bus: &B) -> i8 {
        self.consume_byte(bus) as i8
    }

    /// Pushes a 16-bit value the way CALL/PUSH/interrupt dispatch do: high
    /// byte first, predecrementing SP before each write.
    pub fn push_word<B: Bus>(&mut self, bus: &mut B, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.r.sp = self.r.sp.wrapping_sub(1);
        bus.write(self.r.sp, hi);
        self.r.sp = self.r.sp.wrapping_sub(1);
        bus.write(self.r.sp, lo);
    }

    pub fn pop_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read(self.r.sp);
        self.r.sp = self.r.sp.wrapping_add(1);
        let hi = bus.read(self.r.sp);
        self.r.sp = self.r.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    /// Services a dispatched interrupt: same stack effect as CALL, jumping
    /// to `vector`. Called by `interrupt::update`, never directly by
    /// `step`.
    pub fn service_interrupt<B: Bus>(&mut self, bus: &mut B, vector: u16) {
        self.push_word(bus, self.r.pc);
        self.r.pc = vector;
    }

    /// Wakes the CPU from HALT, if it was halted. A no-op otherwise.
    #[inline]
    pub fn wake(&mut self) {
        if self.run_state == RunState::Halt {
            self.run_state = RunState::Run;
        }
    }

    /// Fetches, decodes and executes one instruction, returning the number
    /// of clock cycles (T-states) it consumed.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> GBResult<u16> {
        let pc_before = self.r.pc;
        let instr = decode(self, &*bus);
        self.execute(instr, bus, pc_before)
    }

    fn execute<B: Bus>(&mut self, instr: Instruction, bus: &mut B, pc_before: u16) -> GBResult<u16> {
        use Instruction::*;

        let m_cycles: u16 = match instr {
            Nop => 1,
            Halt => {
                self.run_state = RunState::Halt;
                1
            }
            Stop => {
                self.run_state = RunState::Stop;
                1
            }
            Di => {
                bus.set_ime(false);
                1
            }
            Ei => {
                bus.set_ime(true);
                1
            }

            Ld(dest, src) => {
                let cycles = ld_cycles(dest, src);
                let value = src.read(self, bus);
                dest.write(self, bus, value);
                cycles
            }
            LdhFromA(n) => {
                bus.write(0xFF00 | u16::from(n), self.r.a);
                3
            }
            LdhToA(n) => {
                self.r.a = bus.read(0xFF00 | u16::from(n));
                3
            }
            LdiAtoHl => {
                bus.write(self.r.get_hl(), self.r.a);
                self.r.set_hl(self.r.get_hl().wrapping_add(1));
                2
            }
            LdiHlToA => {
                self.r.a = bus.read(self.r.get_hl());
                self.r.set_hl(self.r.get_hl().wrapping_add(1));
                2
            }
            LddAtoHl => {
                bus.write(self.r.get_hl(), self.r.a);
                self.r.set_hl(self.r.get_hl().wrapping_sub(1));
                2
            }
            LddHlToA => {
                self.r.a = bus.read(self.r.get_hl());
                self.r.set_hl(self.r.get_hl().wrapping_sub(1));
                2
            }
            LdWordImm(reg, value) => {
                reg.write(self, value);
                3
            }
            LdIndirectFromSp(addr) => {
                let [lo, hi] = self.r.sp.to_le_bytes();
                bus.write(addr, lo);
                bus.write(addr.wrapping_add(1), hi);
                5
            }
            LdSpFromHl => {
                self.r.sp = self.r.get_hl();
                2
            }
            LdHlFromSp(e) => {
                let (result, half, carry) = add_sp_signed(self.r.sp, e);
                self.r.set_hl(result);
                self.r.f.update(false, false, half, carry);
                3
            }

            Push(reg) => {
                let value = reg.read(self);
                self.push_word(bus, value);
                4
            }
            Pop(reg) => {
                let value = self.pop_word(bus);
                reg.write(self, value);
                3
            }

            Add(src) => {
                let value = src.read(self, bus);
                self.alu_add(value, false);
                alu_cycles(src)
            }
            Adc(src) => {
                let value = src.read(self, bus);
                self.alu_add(value, true);
                alu_cycles(src)
            }
            Sub(src) => {
                let value = src.read(self, bus);
                self.alu_sub(value, false);
                alu_cycles(src)
            }
            Sbc(src) => {
                let value = src.read(self, bus);
                self.alu_sub(value, true);
                alu_cycles(src)
            }
            And(src) => {
                let value = src.read(self, bus);
                self.r.a &= value;
                self.r.f.update(self.r.a == 0, false, true, false);
                alu_cycles(src)
            }
            Xor(src) => {
                let value = src.read(self, bus);
                self.r.a ^= value;
                self.r.f.update(self.r.a == 0, false, false, false);
                alu_cycles(src)
            }
            Or(src) => {
                let value = src.read(self, bus);
                self.r.a |= value;
                self.r.f.update(self.r.a == 0, false, false, false);
                alu_cycles(src)
            }
            Cp(src) => {
                let value = src.read(self, bus);
                let result = self.r.a.wrapping_sub(value);
                self.r.f.update(
                    result == 0,
                    true,
                    half_carry_sub(self.r.a, value),
                    self.r.a < value,
                );
                alu_cycles(src)
            }

            AddHl(reg) => {
                let hl = self.r.get_hl();
                let value = reg.read(self);
                let (result, carry) = hl.overflowing_add(value);
                self.r.set_hl(result);
                self.r
                    .f
                    .set(FlagsRegister::SUBTRACTION, false);
                self.r
                    .f
                    .set(FlagsRegister::HALF_CARRY, half_carry_add_u16(hl, value));
                self.r.f.set(FlagsRegister::CARRY, carry);
                2
            }
            AddSp(e) => {
                let (result, half, carry) = add_sp_signed(self.r.sp, e);
                self.r.sp = result;
                self.r.f.update(false, false, half, carry);
                4
            }
            IncWord(reg) => {
                reg.write(self, reg.read(self).wrapping_add(1));
                2
            }
            DecWord(reg) => {
                reg.write(self, reg.read(self).wrapping_sub(1));
                2
            }
            IncByte(target) => {
                let value = read_byte_target(target, self, &*bus);
                let result = value.wrapping_add(1);
                self.r.f.set(FlagsRegister::ZERO, result == 0);
                self.r.f.set(FlagsRegister::SUBTRACTION, false);
                self.r.f.set(FlagsRegister::HALF_CARRY, half_carry_add(value, 1));
                target.write(self, bus, result);
                if matches!(target, ByteTarget::Indirect(_)) { 3 } else { 1 }
            }
            DecByte(target) => {
                let value = read_byte_target(target, self, &*bus);
                let result = value.wrapping_sub(1);
                self.r.f.set(FlagsRegister::ZERO, result == 0);
                self.r.f.set(FlagsRegister::SUBTRACTION, true);
                self.r.f.set(FlagsRegister::HALF_CARRY, half_carry_sub(value, 1));
                target.write(self, bus, result);
                if matches!(target, ByteTarget::Indirect(_)) { 3 } else { 1 }
            }

            Rlca => {
                let carry = self.r.a & 0x80 != 0;
                self.r.a = self.r.a.rotate_left(1);
                self.r.f.update(false, false, false, carry);
                1
            }
            Rrca => {
                let carry = self.r.a & 0x01 != 0;
                self.r.a = self.r.a.rotate_right(1);
                self.r.f.update(false, false, false, carry);
                1
            }
            Rla => {
                let old_carry = u8::from(self.r.f.c());
                let carry = self.r.a & 0x80 != 0;
                self.r.a = (self.r.a << 1) | old_carry;
                self.r.f.update(false, false, false, carry);
                1
            }
            Rra => {
                let old_carry = u8::from(self.r.f.c());
                let carry = self.r.a & 0x01 != 0;
                self.r.a = (self.r.a >> 1) | (old_carry << 7);
                self.r.f.update(false, false, false, carry);
                1
            }
            Daa => {
                self.daa();
                1
            }
            Cpl => {
                self.r.a = !self.r.a;
                self.r.f.set(FlagsRegister::SUBTRACTION, true);
                self.r.f.set(FlagsRegister::HALF_CARRY, true);
                1
            }
            Scf => {
                self.r.f.set(FlagsRegister::SUBTRACTION, false);
                self.r.f.set(FlagsRegister::HALF_CARRY, false);
                self.r.f.set(FlagsRegister::CARRY, true);
                1
            }
            Ccf => {
                self.r.f.set(FlagsRegister::SUBTRACTION, false);
                self.r.f.set(FlagsRegister::HALF_CARRY, false);
                let carry = self.r.f.c();
                self.r.f.set(FlagsRegister::CARRY, !carry);
                1
            }

            Jp(addr) => {
                self.r.pc = addr;
                4
            }
            JpHl => {
                self.r.pc = self.r.get_hl();
                1
            }
            JpCond(cond, addr) => {
                if cond.resolve(self) {
                    self.r.pc = addr;
                    4
                } else {
                    3
                }
            }
            Jr(e) => {
                self.r.pc = self.r.pc.wrapping_add(e as i16 as u16);
                3
            }
            JrCond(cond, e) => {
                if cond.resolve(self) {
                    self.r.pc = self.r.pc.wrapping_add(e as i16 as u16);
                    3
                } else {
                    2
                }
            }

            Call(addr) => {
                self.push_word(bus, self.r.pc);
                self.r.pc = addr;
                6
            }
            CallCond(cond, addr) => {
                if cond.resolve(self) {
                    self.push_word(bus, self.r.pc);
                    self.r.pc = addr;
                    6
                } else {
                    3
                }
            }
            Ret => {
                self.r.pc = self.pop_word(bus);
                4
            }
            RetCond(cond) => {
                if cond.resolve(self) {
                    self.r.pc = self.pop_word(bus);
                    5
                } else {
                    2
                }
            }
            Reti => {
                self.r.pc = self.pop_word(bus);
                bus.set_ime_immediate(true);
                4
            }
            Rst(vector) => {
                self.push_word(bus, self.r.pc);
                self.r.pc = vector as u16;
                4
            }

            Cb(op, target) => {
                let value = read_byte_target(target, self, &*bus);
                let result = self.apply_cb(op, value);
                if !matches!(op, CbOp::Bit(_)) {
                    target.write(self, bus, result);
                }
                match (op, target) {
                    (CbOp::Bit(_), ByteTarget::Indirect(_)) => 3,
                    (_, ByteTarget::Indirect(_)) => 4,
                    _ => 2,
                }
            }

            Unknown(opcode) => {
                self.run_state = RunState::Quit;
                return Err(GBError::UnimplementedOpcode {
                    opcode,
                    pc: pc_before,
                });
            }
        };

        Ok(m_cycles * CLOCKS_PER_CYCLE)
    }

    fn alu_add(&mut self, value: u8, with_carry: bool) {
        let carry_in = if with_carry && self.r.f.c() { 1 } else { 0 };
        let a = self.r.a;
        let (r1, c1) = a.overflowing_add(value);
        let (result, c2) = r1.overflowing_add(carry_in);
        let half = half_carry_add_c(a, value, carry_in);
        self.r.f.update(result == 0, false, half, c1 || c2);
        self.r.a = result;
    }

    fn alu_sub(&mut self, value: u8, with_carry: bool) {
        let carry_in = if with_carry && self.r.f.c() { 1 } else { 0 };
        let a = self.r.a;
        let (r1, b1) = a.overflowing_sub(value);
        let (result, b2) = r1.overflowing_sub(carry_in);
        let half = half_carry_sub_c(a, value, carry_in);
        self.r.f.update(result == 0, true, half, b1 || b2);
        self.r.a = result;
    }

    fn daa(&mut self) {
        let mut a = self.r.a;
        let mut adjust = 0u8;
        let mut carry = self.r.f.c();
        let subtract = self.r.f.contains(FlagsRegister::SUBTRACTION);
        let half_carry = self.r.f.contains(FlagsRegister::HALF_CARRY);

        if half_carry || (!subtract && (a & 0x0F) > 0x09) {
            adjust |= 0x06;
        }
        if carry || (!subtract && a > 0x99) {
            adjust |= 0x60;
            carry = true;
        }

        a = if subtract {
            a.wrapping_sub(adjust)
        } else {
            a.wrapping_add(adjust)
        };

        self.r.f.set(FlagsRegister::ZERO, a == 0);
        self.r.f.set(FlagsRegister::HALF_CARRY, false);
        self.r.f.set(FlagsRegister::CARRY, carry);
        self.r.a = a;
    }

    fn apply_cb(&mut self, op: CbOp, value: u8) -> u8 {
        match op {
            CbOp::Rlc => {
                let carry = value & 0x80 != 0;
                let result = value.rotate_left(1);
                self.r.f.update(result == 0, false, false, carry);
                result
            }
            CbOp::Rrc => {
                let carry = value & 0x01 != 0;
                let result = value.rotate_right(1);
                self.r.f.update(result == 0, false, false, carry);
                result
            }
            CbOp::Rl => {
                let old_carry = u8::from(self.r.f.c());
                let carry = value & 0x80 != 0;
                let result = (value << 1) | old_carry;
                self.r.f.update(result == 0, false, false, carry);
                result
            }
            CbOp::Rr => {
                let old_carry = u8::from(self.r.f.c());
                let carry = value & 0x01 != 0;
                let result = (value >> 1) | (old_carry << 7);
                self.r.f.update(result == 0, false, false, carry);
                result
            }
            CbOp::Sla => {
                let carry = value & 0x80 != 0;
                let result = value << 1;
                self.r.f.update(result == 0, false, false, carry);
                result
            }
            CbOp::Sra => {
                let carry = value & 0x01 != 0;
                let result = (value >> 1) | (value & 0x80);
                self.r.f.update(result == 0, false, false, carry);
                result
            }
            CbOp::Srl => {
                let carry = value & 0x01 != 0;
                let result = value >> 1;
                self.r.f.update(result == 0, false, false, carry);
                result
            }
            CbOp::Swap => {
                // Recombine nibbles with OR, not AND.
                let result = (value << 4) | (value >> 4);
                self.r.f.update(result == 0, false, false, false);
                result
            }
            CbOp::Bit(b) => {
                let bit_set = value & (1 << b) != 0;
                self.r.f.set(FlagsRegister::ZERO, !bit_set);
                self.r.f.set(FlagsRegister::SUBTRACTION, false);
                self.r.f.set(FlagsRegister::HALF_CARRY, true);
                value
            }
            CbOp::Res(b) => value & !(1 << b),
            CbOp::Set(b) => value | (1 << b),
        }
    }
}

fn alu_cycles(src: ByteSource) -> u16 {
    match src {
        ByteSource::Reg(_) => 1,
        ByteSource::Indirect(_) | ByteSource::Immediate => 2,
        ByteSource::IndirectC | ByteSource::IndirectImmediate => 2,
    }
}

/// Cycle cost of a generic `LD dest,src`, which varies with how many of the
/// two operands touch memory and whether either is a 16-bit immediate.
fn ld_cycles(dest: ByteTarget, src: ByteSource) -> u16 {
    match (dest, src) {
        (ByteTarget::IndirectImmediate, _) | (_, ByteSource::IndirectImmediate) => 4,
        (ByteTarget::Indirect(_), ByteSource::Immediate) => 3,
        (ByteTarget::Indirect(_), _) | (_, ByteSource::Indirect(_)) => 2,
        (ByteTarget::IndirectC, _) | (_, ByteSource::IndirectC) => 2,
        (ByteTarget::Reg(_), ByteSource::Immediate) => 2,
        (ByteTarget::Reg(_), ByteSource::Reg(_)) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::registers::FlagsRegister;

    struct MockBus {
        mem: [u8; 0x10000],
        ime: bool,
    }

    impl MockBus {
        fn new() -> Self {
            Self {
                mem: [0; 0x10000],
                ime: false,
            }
        }

        fn load(&mut self, addr: u16, bytes: &[u8]) {
            for (i, b) in bytes.iter().enumerate() {
                self.mem[addr as usize + i] = *b;
            }
        }
    }

    impl Bus for MockBus {
        fn read(&self, address: u16) -> u8 {
            self.mem[address as usize]
        }

        fn write(&mut self, address: u16, value: u8) {
            self.mem[address as usize] = value;
        }

        fn set_ime(&mut self, enable: bool) {
            self.ime = enable;
        }

        fn set_ime_immediate(&mut self, enable: bool) {
            self.ime = enable;
        }
    }

    fn cpu_at(pc: u16) -> CPU {
        let mut cpu = CPU::default();
        cpu.r.pc = pc;
        cpu
    }

    #[test]
    fn test_nop_advances() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0x00]);
        let mut cpu = cpu_at(0x0100);
        cpu.r.a = 0x12;
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.pc, 0x0101);
        assert_eq!(cpu.r.a, 0x12);
        assert_eq!(cycles, 4);
    }

    #[test]
    fn test_xor_a_clears_a_sets_z() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0xAF]);
        let mut cpu = cpu_at(0x0100);
        cpu.r.a = 0xFF;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.a, 0x00);
        assert!(cpu.r.f.contains(FlagsRegister::ZERO));
        assert!(!cpu.r.f.contains(FlagsRegister::SUBTRACTION));
        assert!(!cpu.r.f.contains(FlagsRegister::HALF_CARRY));
        assert!(!cpu.r.f.contains(FlagsRegister::CARRY));
    }

    #[test]
    fn test_ld_a_n() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0x3E, 0x42]);
        let mut cpu = cpu_at(0x0100);
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.a, 0x42);
        assert_eq!(cpu.r.pc, 0x0102);
        assert_eq!(cycles, 8);
    }

    #[test]
    fn test_jp_nn() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0xC3, 0x50, 0x01]);
        let mut cpu = cpu_at(0x0100);
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.pc, 0x0150);
        assert_eq!(cycles, 16);
    }

    #[test]
    fn test_call_then_ret_restores_pc() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0xCD, 0x10, 0x02]);
        bus.load(0x0210, &[0xC9]);
        let mut cpu = cpu_at(0x0100);
        cpu.r.sp = 0xFFFE;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.pc, 0x0210);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.pc, 0x0103);
        assert_eq!(cpu.r.sp, 0xFFFE);
    }

    #[test]
    fn test_add_overflow_sets_c_and_z() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0x80]);
        let mut cpu = cpu_at(0x0100);
        cpu.r.a = 0xFF;
        cpu.r.b = 0x01;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.a, 0x00);
        assert!(cpu.r.f.contains(FlagsRegister::ZERO));
        assert!(cpu.r.f.contains(FlagsRegister::CARRY));
        assert!(cpu.r.f.contains(FlagsRegister::HALF_CARRY));
        assert!(!cpu.r.f.contains(FlagsRegister::SUBTRACTION));
    }

    #[test]
    fn test_inc_hl_wraps() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0x34]);
        bus.write(0xC000, 0xFF);
        let mut cpu = cpu_at(0x0100);
        cpu.r.set_hl(0xC000);
        cpu.step(&mut bus).unwrap();
        assert_eq!(bus.read(0xC000), 0x00);
        assert!(cpu.r.f.contains(FlagsRegister::ZERO));
        assert!(!cpu.r.f.contains(FlagsRegister::SUBTRACTION));
        assert!(cpu.r.f.contains(FlagsRegister::HALF_CARRY));
    }

    #[test]
    fn test_dec_b_half_carry_uses_proper_formula() {
        // 0x10 - 1 = 0x0F crosses the nibble boundary: H must be set.
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0x05]);
        let mut cpu = cpu_at(0x0100);
        cpu.r.b = 0x10;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.b, 0x0F);
        assert!(cpu.r.f.contains(FlagsRegister::HALF_CARRY));
    }

    #[test]
    fn test_swap_uses_or_not_and() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0xCB, 0x37]); // SWAP A
        let mut cpu = cpu_at(0x0100);
        cpu.r.a = 0x12;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.a, 0x21);
    }

    #[test]
    fn test_cp_tests_result_not_raw_value() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0xB8]); // CP B
        let mut cpu = cpu_at(0x0100);
        cpu.r.a = 0x10;
        cpu.r.b = 0x10;
        cpu.step(&mut bus).unwrap();
        assert!(cpu.r.f.contains(FlagsRegister::ZERO));
        assert_eq!(cpu.r.a, 0x10); // CP does not write back to A
    }

    #[test]
    fn test_16bit_inc_wraps_modulo_0x10000() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0x03]); // INC BC
        let mut cpu = cpu_at(0x0100);
        cpu.r.set_bc(0xFFFF);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.get_bc(), 0x0000);
    }

    #[test]
    fn test_rlca_always_clears_zero() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0x07]); // RLCA
        let mut cpu = cpu_at(0x0100);
        cpu.r.a = 0x00;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.a, 0x00);
        assert!(!cpu.r.f.contains(FlagsRegister::ZERO));
    }

    #[test]
    fn test_push_hl_pop_bc_round_trip() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0xE5, 0xC1]); // PUSH HL; POP BC
        let mut cpu = cpu_at(0x0100);
        cpu.r.sp = 0xFFFE;
        cpu.r.set_hl(0xBEEF);
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.get_bc(), 0xBEEF);
        assert_eq!(cpu.r.sp, 0xFFFE);
    }

    #[test]
    fn test_unknown_opcode_quits() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0xD3]); // not a defined opcode
        let mut cpu = cpu_at(0x0100);
        let err = cpu.step(&mut bus).unwrap_err();
        assert!(matches!(err, GBError::UnimplementedOpcode { opcode: 0xD3, .. }));
        assert_eq!(cpu.run_state, RunState::Quit);
    }

    #[test]
    fn test_halt_then_jr_loops_without_changing_registers() {
        let mut bus = MockBus::new();
        bus.load(0x0100, &[0x76, 0x18, 0xFE]); // HALT; JR -2
        let mut cpu = cpu_at(0x0100);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.run_state, RunState::Halt);
    }
}
