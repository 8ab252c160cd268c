use crate::gb::Bus;
use crate::gb::cpu::CPU;
use crate::gb::memory::MemoryBus;
use bitflags::bitflags;

bitflags! {
    /// Represents both the IF (0xFF0F) and IE (0xFFFF) registers. Only the
    /// lower 5 bits are meaningful; the remaining bits read back as set.
    #[derive(Copy, Clone, Default)]
    pub struct InterruptRegister: u8 {
        const VBLANK = 0b0000_0001;
        const STAT   = 0b0000_0010;
        const TIMER  = 0b0000_0100;
        const SERIAL = 0b0000_1000;
        const JOYPAD = 0b0001_0000;
    }
}

impl InterruptRegister {
    const VECTORS: [(InterruptRegister, u16); 5] = [
        (InterruptRegister::VBLANK, 0x0040),
        (InterruptRegister::STAT, 0x0048),
        (InterruptRegister::TIMER, 0x0050),
        (InterruptRegister::SERIAL, 0x0058),
        (InterruptRegister::JOYPAD, 0x0060),
    ];
}

/// Owns the IF/IE latches and the IME master-enable, including its
/// one-instruction commit delay.
#[derive(Default)]
pub struct InterruptController {
    pub if_reg: InterruptRegister,
    pub ie_reg: InterruptRegister,
    ime: bool,
    pending_ime: Option<bool>,
    ime_delay: u8,
}

impl InterruptController {
    /// Requests the given interrupt source by setting its IF bit.
    #[inline]
    pub fn request(&mut self, source: InterruptRegister) {
        self.if_reg.insert(source);
    }

    /// Schedules IME to change to `enable` after a one-instruction delay.
    /// Both EI and DI are modeled this way; see the design notes for why
    /// that symmetry is an acceptable approximation at this level.
    #[inline]
    pub fn set_ime(&mut self, enable: bool) {
        self.pending_ime = Some(enable);
        self.ime_delay = 2;
    }

    /// Sets IME immediately, with no commit delay. RETI uses this: unlike
    /// EI, the returned-to instruction already runs with interrupts live.
    #[inline]
    pub fn set_ime_immediate(&mut self, enable: bool) {
        self.pending_ime = None;
        self.ime_delay = 0;
        self.ime = enable;
    }

    #[inline]
    pub fn ime(&self) -> bool {
        self.ime
    }

    fn pending(&self) -> InterruptRegister {
        self.if_reg & self.ie_reg
    }
}

/// Advances the IME commit delay and dispatches the highest-priority pending
/// interrupt, if any. Runs once per orchestrator tick, strictly between
/// instructions.
pub fn update(cpu: &mut CPU, bus: &mut MemoryBus) {
    let ic = &mut bus.interrupts;
    if ic.ime_delay > 0 {
        ic.ime_delay -= 1;
        if ic.ime_delay == 0
            && let Some(value) = ic.pending_ime.take()
        {
            ic.ime = value;
        }
    }

    let pending = ic.pending();
    if pending.is_empty() {
        return;
    }

    // A pending interrupt always wakes HALT, even while IME is disabled.
    cpu.wake();

    if !ic.ime {
        return;
    }

    let (source, vector) = InterruptRegister::VECTORS
        .into_iter()
        .find(|(source, _)| pending.contains(*source))
        .expect("pending interrupt set without a matching vector");

    ic.if_reg.remove(source);
    ic.ime = false;
    cpu.service_interrupt(bus, vector);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::cpu::RunState;

    #[test]
    fn test_vblank_vectors_to_0x40() {
        let mut cpu = CPU::default();
        cpu.r.pc = 0x0150;
        cpu.r.sp = 0xFFFE;
        let mut bus = MemoryBus::blank();
        bus.interrupts.set_ime(true);
        bus.interrupts.ime_delay = 0;
        bus.interrupts.ime = true;
        bus.interrupts.request(InterruptRegister::VBLANK);
        bus.interrupts.ie_reg = InterruptRegister::VBLANK;

        update(&mut cpu, &mut bus);

        assert_eq!(cpu.r.pc, 0x0040);
        assert_eq!(cpu.r.sp, 0xFFFC);
        assert!(!bus.interrupts.ime());
        assert!(!bus.interrupts.if_reg.contains(InterruptRegister::VBLANK));
        assert_eq!(bus.read(0xFFFC), 0x50);
        assert_eq!(bus.read(0xFFFD), 0x01);
    }

    #[test]
    fn test_pending_wakes_halt_even_with_ime_disabled() {
        let mut cpu = CPU::default();
        cpu.run_state = RunState::Halt;
        let mut bus = MemoryBus::blank();
        bus.interrupts.request(InterruptRegister::TIMER);
        bus.interrupts.ie_reg = InterruptRegister::TIMER;

        update(&mut cpu, &mut bus);

        assert_eq!(cpu.run_state, RunState::Run);
        // IME was never enabled, so the interrupt itself was not serviced.
        assert_eq!(cpu.r.pc, 0x0000);
        assert!(bus.interrupts.if_reg.contains(InterruptRegister::TIMER));
    }

    #[test]
    fn test_priority_order_favors_lowest_bit() {
        let mut cpu = CPU::default();
        cpu.r.sp = 0xFFFE;
        let mut bus = MemoryBus::blank();
        bus.interrupts.ime = true;
        bus.interrupts.request(InterruptRegister::TIMER);
        bus.interrupts.request(InterruptRegister::VBLANK);
        bus.interrupts.ie_reg = InterruptRegister::TIMER | InterruptRegister::VBLANK;

        update(&mut cpu, &mut bus);

        assert_eq!(cpu.r.pc, 0x0040);
        assert!(bus.interrupts.if_reg.contains(InterruptRegister::TIMER));
        assert!(!bus.interrupts.if_reg.contains(InterruptRegister::VBLANK));
    }
}
