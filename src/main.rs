mod gb;
mod utils;

use crate::gb::cartridge::Cartridge;
use crate::gb::display::NullDisplay;
use crate::gb::DebugMode;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about = "DMG core emulator")]
struct Cli {
    /// Path of the ROM image to load.
    rom_path: PathBuf,

    /// Verbosity of the debug trace printed while running.
    #[arg(long, value_enum, default_value = "none")]
    debug_mode: DebugMode,

    /// Stop after this many clock cycles have elapsed. Unbounded if absent.
    #[arg(long)]
    max_cycles: Option<u64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let rom = match std::fs::read(&cli.rom_path) {
        Ok(rom) => rom,
        Err(err) => {
            eprintln!("unable to read {}: {err}", cli.rom_path.display());
            return ExitCode::FAILURE;
        }
    };

    let cartridge = match Cartridge::from_bytes(rom) {
        Ok(cartridge) => cartridge,
        Err(err) => {
            eprintln!("unable to parse cartridge: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut emulator = gb::Emulator::new(cartridge, Box::new(NullDisplay), cli.debug_mode);

    match emulator.run(cli.max_cycles) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("emulator stopped: {err}");
            if matches!(cli.debug_mode, DebugMode::Memory | DebugMode::All) {
                emulator.dump_memory();
            }
            ExitCode::FAILURE
        }
    }
}
