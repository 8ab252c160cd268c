use crate::gb::interrupt::{InterruptController, InterruptRegister};

const TAC_ENABLE: u8 = 0b0000_0100;
const TAC_CLOCK_SELECT: u8 = 0b0000_0011;

/// Divider/counter pair behind DIV (0xFF04), TIMA (0xFF05), TMA (0xFF06)
/// and TAC (0xFF07). DIV is the visible top byte of a free-running 16-bit
/// counter. TIMA has its own sub-counter, separate from DIV's: it only
/// accumulates while TAC's run-enable bit is set, and is held at 0 while
/// disabled, so progress toward the next TIMA tick is lost on disable
/// rather than resuming from where it left off on re-enable.
#[derive(Default)]
pub struct Timer {
    div_counter: u16,
    sub_tima: u16,
    pub tima: u8,
    pub tma: u8,
    tac: u8,
}

fn period(tac: u8) -> u16 {
    match tac & TAC_CLOCK_SELECT {
        0b00 => 1024,
        0b01 => 16,
        0b10 => 64,
        0b11 => 256,
        _ => unreachable!(),
    }
}

impl Timer {
    pub fn div(&self) -> u8 {
        (self.div_counter >> 8) as u8
    }

    pub fn reset_div(&mut self) {
        self.div_counter = 0;
    }

    pub fn tac(&self) -> u8 {
        self.tac | 0xF8
    }

    pub fn set_tac(&mut self, value: u8) {
        self.tac = value & 0x07;
        if !self.enabled() {
            self.sub_tima = 0;
        }
    }

    fn enabled(&self) -> bool {
        self.tac & TAC_ENABLE != 0
    }

    /// Advances the divider by `cycles` clock cycles, ticking TIMA at the
    /// rate selected by TAC and raising the timer interrupt on overflow.
    /// DIV always advances; TIMA's sub-counter only accumulates while the
    /// timer is enabled and is reset (not merely paused) on disable.
    pub fn update(&mut self, cycles: u16, interrupts: &mut InterruptController) {
        self.div_counter = self.div_counter.wrapping_add(cycles);

        if !self.enabled() {
            self.sub_tima = 0;
            return;
        }

        let period = period(self.tac);
        self.sub_tima += u16::from(cycles);
        while self.sub_tima >= period {
            self.sub_tima -= period;
            let (next, overflowed) = self.tima.overflowing_add(1);
            if overflowed {
                self.tima = self.tma;
                interrupts.request(InterruptRegister::TIMER);
            } else {
                self.tima = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_div_increments_every_256_cycles() {
        let mut timer = Timer::default();
        let mut interrupts = InterruptController::default();
        timer.update(256, &mut interrupts);
        assert_eq!(timer.div(), 1);
    }

    #[test]
    fn test_div_write_resets_counter() {
        let mut timer = Timer::default();
        let mut interrupts = InterruptController::default();
        timer.update(512, &mut interrupts);
        timer.reset_div();
        assert_eq!(timer.div(), 0);
    }

    #[test]
    fn test_tima_overflow_reloads_from_tma_and_requests_interrupt() {
        let mut timer = Timer::default();
        let mut interrupts = InterruptController::default();
        timer.tma = 0x10;
        timer.tima = 0xFF;
        timer.set_tac(0b101); // enabled, fastest clock select (16 cycles)
        timer.update(16, &mut interrupts);
        assert_eq!(timer.tima, 0x10);
        assert!(interrupts.if_reg.contains(InterruptRegister::TIMER));
    }

    #[test]
    fn test_disabled_timer_does_not_tick_tima() {
        let mut timer = Timer::default();
        let mut interrupts = InterruptController::default();
        timer.set_tac(0b001); // clock select fast, but enable bit clear
        timer.update(1000, &mut interrupts);
        assert_eq!(timer.tima, 0);
    }

    #[test]
    fn test_disabling_loses_partial_progress_toward_next_tick() {
        let mut timer = Timer::default();
        let mut interrupts = InterruptController::default();
        timer.set_tac(0b101); // enabled, period 16
        timer.update(8, &mut interrupts);
        assert_eq!(timer.tima, 0);

        timer.set_tac(0b001); // disable, same clock select
        timer.update(100, &mut interrupts);
        assert_eq!(timer.tima, 0, "disabled timer must not tick TIMA");

        timer.set_tac(0b101); // re-enable
        timer.update(4, &mut interrupts);
        assert_eq!(timer.tima, 0, "progress toward the next tick was lost on disable");

        timer.update(12, &mut interrupts);
        assert_eq!(timer.tima, 1, "a fresh full period after re-enable ticks TIMA once");
    }

    #[test]
    fn test_multiple_overflows_in_one_update() {
        let mut timer = Timer::default();
        let mut interrupts = InterruptController::default();
        timer.tima = 0xFE;
        timer.tma = 0x00;
        timer.set_tac(0b101); // period 16
        timer.update(16 * 3, &mut interrupts);
        assert_eq!(timer.tima, 1);
        assert!(interrupts.if_reg.contains(InterruptRegister::TIMER));
    }
}
