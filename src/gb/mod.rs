pub mod cartridge;
pub mod cpu;
pub mod display;
pub mod interrupt;
pub mod joypad;
pub mod memory;
pub mod ppu;
pub mod registers;
pub mod serial;
pub mod timer;

use crate::gb::cpu::CPU;
use crate::gb::display::Display;
use crate::gb::memory::MemoryBus;
use std::{fmt, io};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

/// One quarter of the CPU's clock tick. Machine-cycle-counted instruction
/// lengths are converted to clock ticks by multiplying by this constant.
pub const CLOCKS_PER_CYCLE: u16 = 4;

/// Common interface to interact with the memory-mapped address space. The
/// CPU is generic over this trait so it can be exercised against a plain
/// byte array in tests without constructing a full `MemoryBus`.
pub trait Bus {
    fn read(&self, address: u16) -> u8;
    fn write(&mut self, address: u16, value: u8);

    #[inline]
    fn read_signed(&self, address: u16) -> i8 {
        self.read(address) as i8
    }

    /// Schedules IME to take effect after the next instruction completes
    /// (the real EI/DI delay). Buses with no interrupt controller of their
    /// own (e.g. a `MockBus` used for isolated CPU tests) can ignore this.
    #[inline]
    fn set_ime(&mut self, _enable: bool) {}

    /// Sets IME with no delay, as RETI does.
    #[inline]
    fn set_ime_immediate(&mut self, _enable: bool) {}

    #[inline]
    fn ime(&self) -> bool {
        false
    }
}

/// The crate-wide error type. Carries enough context to print a useful
/// diagnostic at the CLI boundary.
#[derive(thiserror::Error, Debug)]
pub enum GBError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unimplemented opcode {opcode:#04x} at {pc:#06x}")]
    UnimplementedOpcode { opcode: u8, pc: u16 },

    #[error("{0}")]
    Other(String),
}

impl From<String> for GBError {
    fn from(msg: String) -> Self {
        GBError::Other(msg)
    }
}

impl From<&str> for GBError {
    fn from(msg: &str) -> Self {
        GBError::Other(msg.to_string())
    }
}

pub type GBResult<T> = Result<T, GBError>;

/// Debug dump verbosity selected from the CLI.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DebugMode {
    None,
    Instructions,
    Registers,
    Header,
    Title,
    Memory,
    All,
}

impl DebugMode {
    #[inline]
    fn shows(self, other: DebugMode) -> bool {
        self == DebugMode::All || self == other
    }
}

/// Wires the CPU, memory bus and display together and drives the per-step
/// orchestration loop: interrupts.update -> cpu.step -> timer.update ->
/// ppu.update.
pub struct Emulator {
    pub cpu: CPU,
    pub bus: MemoryBus,
    pub display: Box<dyn Display>,
    debug_mode: DebugMode,
    cycles_elapsed: u64,
}

impl Emulator {
    pub fn new(cartridge: cartridge::Cartridge, display: Box<dyn Display>, debug_mode: DebugMode) -> Self {
        if debug_mode.shows(DebugMode::Header) || debug_mode.shows(DebugMode::Title) {
            println!("{}", cartridge.header);
        }
        Self {
            cpu: CPU::default(),
            bus: MemoryBus::new(cartridge),
            display,
            debug_mode,
            cycles_elapsed: 0,
        }
    }

    /// Runs a single orchestrator tick. Returns `Ok(false)` once the CPU has
    /// reached a terminal run-state (STOP or QUIT reported as an error).
    pub fn step(&mut self) -> GBResult<bool> {
        interrupt::update(&mut self.cpu, &mut self.bus);

        if self.cpu.run_state == cpu::RunState::Stop {
            return Ok(false);
        }

        let cycles = if self.cpu.run_state == cpu::RunState::Halt {
            CLOCKS_PER_CYCLE
        } else {
            if self.debug_mode.shows(DebugMode::Instructions) {
                println!(
                    "{:#06x}: {}",
                    self.cpu.r.pc,
                    cpu::instruction::disassemble(&self.bus, self.cpu.r.pc)
                );
            }
            self.cpu.step(&mut self.bus)?
        };

        if self.cpu.run_state == cpu::RunState::Quit {
            return Ok(false);
        }

        self.bus
            .timer
            .update(cycles, &mut self.bus.interrupts);
        self.bus
            .ppu
            .update(cycles, &mut self.bus.interrupts, self.display.as_mut());

        self.cycles_elapsed += u64::from(cycles);

        if self.debug_mode.shows(DebugMode::Registers) {
            println!(
                "A={:02x} F={:02x} B={:02x} C={:02x} D={:02x} E={:02x} H={:02x} L={:02x} SP={:04x} PC={:04x}",
                self.cpu.r.a,
                self.cpu.r.f.bits(),
                self.cpu.r.b,
                self.cpu.r.c,
                self.cpu.r.d,
                self.cpu.r.e,
                self.cpu.r.h,
                self.cpu.r.l,
                self.cpu.r.sp,
                self.cpu.r.pc,
            );
        }

        Ok(true)
    }

    /// Runs the emulator until the CPU halts with QUIT/STOP, or until
    /// `max_cycles` total clock ticks have elapsed (if given).
    pub fn run(&mut self, max_cycles: Option<u64>) -> GBResult<()> {
        loop {
            if let Some(budget) = max_cycles
                && self.cycles_elapsed >= budget
            {
                return Ok(());
            }
            if !self.step()? {
                return Ok(());
            }
        }
    }

    #[inline]
    pub fn cycles_elapsed(&self) -> u64 {
        self.cycles_elapsed
    }

    /// Prints a hex dump of the 256 bytes around PC, for the MEMORY debug
    /// mode and as the "memory dump" an invariant-violation error shows.
    pub fn dump_memory(&self) {
        let base = self.cpu.r.pc.saturating_sub(0x80);
        println!("memory dump around PC={:#06x}:", self.cpu.r.pc);
        for row_start in (base..base.saturating_add(0x100)).step_by(16) {
            print!("{row_start:#06x}: ");
            for offset in 0..16u16 {
                print!("{:02x} ", self.bus.read(row_start.wrapping_add(offset)));
            }
            println!();
        }
    }
}

impl fmt::Debug for Emulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emulator")
            .field("cycles_elapsed", &self.cycles_elapsed)
            .finish()
    }
}
