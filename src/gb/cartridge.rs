use crate::gb::{GBError, GBResult};
use std::fmt;

/// This area of memory contains the cartridge title.
const TITLE_BEGIN: usize = 0x0134;
const TITLE_END: usize = 0x0143;

/// Identifies the MBC chip (if any) and the hardware features wired to it.
/// See https://gbdev.io/pandocs/The_Cartridge_Header.html#0147--cartridge-type
const CARTRIDGE_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const RAM_SIZE: usize = 0x0149;
/// Region flag: 0x00 Japanese, 0x01 Non-Japanese.
const DESTINATION_CODE: usize = 0x014A;
const GLOBAL_CHECKSUM_HI: usize = 0x014E;
const GLOBAL_CHECKSUM_LO: usize = 0x014F;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

/// The bank-switching scheme wired into the cartridge. Only the schemes this
/// core is specified to support are recognized; every other cartridge-type
/// byte is a load-time error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerKind {
    NoMBC,
    MBC1,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerKind::NoMBC => "ROM ONLY",
            ControllerKind::MBC1 => "MBC1",
        };
        write!(f, "{name}")
    }
}

/// Hardware features implied by the cartridge-type byte, orthogonal to the
/// bank-switching scheme itself.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CartridgeFeatures {
    pub ram: bool,
    pub battery: bool,
    pub timer: bool,
    pub rumble: bool,
}

fn decode_cartridge_type(byte: u8) -> GBResult<(ControllerKind, CartridgeFeatures)> {
    use ControllerKind::*;
    let features = CartridgeFeatures::default();
    Ok(match byte {
        0x00 => (NoMBC, features),
        0x08 => (NoMBC, CartridgeFeatures { ram: true, ..features }),
        0x09 => (
            NoMBC,
            CartridgeFeatures { ram: true, battery: true, ..features },
        ),
        0x01 => (MBC1, features),
        0x02 => (MBC1, CartridgeFeatures { ram: true, ..features }),
        0x03 => (
            MBC1,
            CartridgeFeatures { ram: true, battery: true, ..features },
        ),
        other => {
            return Err(GBError::Other(format!(
                "cartridge type {other:#04x} is not a supported MBC (only ROM-only and MBC1 carts are implemented)"
            )));
        }
    })
}

fn decode_rom_banks(byte: u8) -> GBResult<u16> {
    match byte {
        0x00..=0x08 => Ok(2u16 << byte),
        other => Err(GBError::Other(format!("unsupported ROM size code {other:#04x}"))),
    }
}

fn decode_ram_banks(byte: u8) -> GBResult<u16> {
    match byte {
        0x00 | 0x01 => Ok(0),
        0x02 => Ok(1),
        0x03 => Ok(4),
        0x04 => Ok(16),
        0x05 => Ok(8),
        other => Err(GBError::Other(format!("unsupported RAM size code {other:#04x}"))),
    }
}

/// Parsed cartridge header. See https://gbdev.io/pandocs/The_Cartridge_Header.html
#[derive(Clone, Debug)]
pub struct CartridgeHeader {
    pub title: String,
    pub controller: ControllerKind,
    pub features: CartridgeFeatures,
    pub rom_banks: u16,
    pub ram_banks: u16,
    /// 0x00 Japanese, 0x01 Non-Japanese; any other value is preserved as-is.
    pub destination_code: u8,
}

impl CartridgeHeader {
    fn parse(rom: &[u8]) -> GBResult<Self> {
        if rom.len() < GLOBAL_CHECKSUM_LO + 1 {
            return Err(GBError::Other("ROM is too small to contain a header".into()));
        }
        let (controller, features) = decode_cartridge_type(rom[CARTRIDGE_TYPE])?;
        let rom_banks = decode_rom_banks(rom[ROM_SIZE])?;
        let ram_banks = decode_ram_banks(rom[RAM_SIZE])?;
        let title = rom[TITLE_BEGIN..TITLE_END]
            .iter()
            .take_while(|&&b| b != 0)
            .filter(|&&b| b.is_ascii_graphic() || b == b' ')
            .map(|&b| b as char)
            .collect::<String>();
        Ok(Self {
            title: if title.is_empty() { "UNTITLED".to_string() } else { title },
            controller,
            features,
            rom_banks,
            ram_banks,
            destination_code: rom[DESTINATION_CODE],
        })
    }

    #[inline]
    pub const fn ram_size(&self) -> usize {
        self.ram_banks as usize * RAM_BANK_SIZE
    }
}

impl fmt::Display for CartridgeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} ROM bank(s), {} RAM bank(s))",
            self.title, self.controller, self.rom_banks, self.ram_banks
        )
    }
}

/// Verifies the 16-bit big-endian checksum of all ROM bytes except the two
/// checksum bytes themselves. A mismatch is a warning, not a load failure.
fn checksum_warning(rom: &[u8]) -> Option<String> {
    let expected = (u16::from(rom[GLOBAL_CHECKSUM_HI]) << 8) | u16::from(rom[GLOBAL_CHECKSUM_LO]);
    let actual = rom
        .iter()
        .enumerate()
        .fold(0u16, |sum, (addr, &byte)| match addr {
            GLOBAL_CHECKSUM_HI | GLOBAL_CHECKSUM_LO => sum,
            _ => sum.wrapping_add(u16::from(byte)),
        });
    (expected != actual).then(|| {
        format!("global checksum mismatch: header says {expected:#06x}, computed {actual:#06x}")
    })
}

/// MBC1's bank-select latches. ROM is addressed with 5 low bits plus 2 bits
/// shared between the ROM high bits and the RAM bank, switched by mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BankingMode {
    Rom,
    Ram,
}

#[derive(Clone)]
struct Mbc1State {
    ram_enabled: bool,
    bank_low: u8,
    bank_high: u8,
    mode: BankingMode,
}

impl Default for Mbc1State {
    fn default() -> Self {
        Self {
            ram_enabled: false,
            bank_low: 0x01,
            bank_high: 0x00,
            mode: BankingMode::Rom,
        }
    }
}

impl Mbc1State {
    fn rom_bank(&self) -> u16 {
        match self.mode {
            BankingMode::Rom => u16::from(self.bank_high) << 5 | u16::from(self.bank_low),
            BankingMode::Ram => u16::from(self.bank_low),
        }
    }

    fn ram_bank(&self) -> u16 {
        match self.mode {
            BankingMode::Ram => u16::from(self.bank_high),
            BankingMode::Rom => 0,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x1FFF => self.ram_enabled = value & 0x0F == 0x0A,
            0x2000..=0x3FFF => {
                self.bank_low = match value & 0x1F {
                    0 => 1,
                    n => n,
                };
            }
            0x4000..=0x5FFF => self.bank_high = value & 0x03,
            0x6000..=0x7FFF => {
                self.mode = if value & 0x01 == 0 { BankingMode::Rom } else { BankingMode::Ram };
            }
            _ => unreachable!("ROM region writes are decoded to 0x0000..=0x7FFF"),
        }
    }
}

/// Owns the immutable ROM image, the parsed header, and whatever mutable
/// bank-select / cartridge-RAM state the controller kind requires.
#[derive(Clone)]
pub struct Cartridge {
    pub header: CartridgeHeader,
    rom: Box<[u8]>,
    ram: Vec<u8>,
    mbc1: Mbc1State,
}

impl Cartridge {
    pub fn from_bytes(rom: Vec<u8>) -> GBResult<Self> {
        let header = CartridgeHeader::parse(&rom)?;
        if let Some(msg) = checksum_warning(&rom) {
            eprintln!("WARNING: {msg}");
        }
        Ok(Self {
            ram: vec![0; header.ram_size()],
            rom: rom.into_boxed_slice(),
            mbc1: Mbc1State::default(),
            header,
        })
    }

    /// A minimal ROM-only cartridge with an empty ROM, for tests that need a
    /// `MemoryBus` but exercise no cartridge-specific behavior.
    pub fn blank() -> Self {
        let mut rom = vec![0u8; ROM_BANK_SIZE * 2];
        rom[CARTRIDGE_TYPE] = 0x00;
        rom[ROM_SIZE] = 0x00;
        rom[RAM_SIZE] = 0x00;
        Self::from_bytes(rom).expect("synthetic blank cartridge header is always valid")
    }

    #[inline]
    fn is_mbc1(&self) -> bool {
        self.header.controller == ControllerKind::MBC1
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            0x0000..=0x3FFF => match self.is_mbc1() {
                true => {
                    let bank = match self.mbc1.mode {
                        BankingMode::Rom => 0,
                        BankingMode::Ram => u16::from(self.mbc1.bank_high) << 5,
                    };
                    self.rom_byte(bank, address)
                }
                false => self.rom.get(address as usize).copied().unwrap_or(0),
            },
            0x4000..=0x7FFF => match self.is_mbc1() {
                true => self.rom_byte(self.mbc1.rom_bank(), address - 0x4000),
                false => {
                    // A fixed bank 1 regardless of address for NoMBC carts
                    // with more than one bank (rare, but not invalid).
                    self.rom.get(address as usize).copied().unwrap_or(0)
                }
            },
            0xA000..=0xBFFF => {
                if self.is_mbc1() && !self.mbc1.ram_enabled {
                    return 0;
                }
                let offset = self.mbc1.ram_bank() as usize * RAM_BANK_SIZE + (address - 0xA000) as usize;
                self.ram.get(offset).copied().unwrap_or(0)
            }
            _ => 0,
        }
    }

    fn rom_byte(&self, bank: u16, offset_in_bank: u16) -> u8 {
        let masked_bank = bank as usize & (self.header.rom_banks as usize - 1);
        let addr = masked_bank * ROM_BANK_SIZE + offset_in_bank as usize;
        self.rom.get(addr).copied().unwrap_or(0)
    }

    /// ROM-region writes never mutate ROM bytes; under MBC1 they mutate the
    /// bank-select latches. NoMBC cartridges ignore all such writes.
    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x7FFF => {
                if self.is_mbc1() {
                    self.mbc1.write(address, value);
                }
            }
            0xA000..=0xBFFF => {
                if self.is_mbc1() && !self.mbc1.ram_enabled {
                    return;
                }
                let offset = self.mbc1.ram_bank() as usize * RAM_BANK_SIZE + (address - 0xA000) as usize;
                if let Some(slot) = self.ram.get_mut(offset) {
                    *slot = value;
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_banks(banks: usize, controller_byte: u8, rom_size_code: u8, ram_size_code: u8) -> Vec<u8> {
        let mut rom = vec![0u8; ROM_BANK_SIZE * banks];
        for (i, bank) in rom.chunks_mut(ROM_BANK_SIZE).enumerate() {
            bank.fill(i as u8);
        }
        rom[CARTRIDGE_TYPE] = controller_byte;
        rom[ROM_SIZE] = rom_size_code;
        rom[RAM_SIZE] = ram_size_code;
        rom
    }

    #[test]
    fn test_mbc1_bank_select() {
        let rom = rom_with_banks(8, 0x01, 0x02, 0x00);
        let mut cart = Cartridge::from_bytes(rom).unwrap();
        assert_eq!(cart.header.controller, ControllerKind::MBC1);

        cart.write(0x2000, 0x05);
        assert_eq!(cart.mbc1.bank_low, 0x05);
        assert_eq!(cart.read(0x4000), 5, "bank 5 should be mapped at 0x4000");
    }

    #[test]
    fn test_mbc1_bank_0_substitutes_bank_1() {
        let rom = rom_with_banks(8, 0x01, 0x02, 0x00);
        let mut cart = Cartridge::from_bytes(rom).unwrap();
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), 1);
    }

    #[test]
    fn test_mbc1_ram_enable_gate() {
        let rom = rom_with_banks(2, 0x02, 0x00, 0x02);
        let mut cart = Cartridge::from_bytes(rom).unwrap();
        cart.write(0xA000, 0x42);
        assert_eq!(cart.read(0xA000), 0, "writes before RAM enable are discarded");

        cart.write(0x0000, 0x0A);
        cart.write(0xA000, 0x42);
        assert_eq!(cart.read(0xA000), 0x42);

        cart.write(0x0000, 0x00);
        assert_eq!(cart.read(0xA000), 0, "RAM reads are 0 while disabled");
    }

    #[test]
    fn test_nombc_ignores_rom_writes() {
        let rom = rom_with_banks(2, 0x00, 0x00, 0x00);
        let mut cart = Cartridge::from_bytes(rom).unwrap();
        let before = cart.read(0x4000);
        cart.write(0x2000, 0xFF);
        assert_eq!(cart.read(0x4000), before);
    }

    #[test]
    fn test_title_parsing_trims_trailing_nul() {
        let mut rom = rom_with_banks(2, 0x00, 0x00, 0x00);
        rom[TITLE_BEGIN..TITLE_BEGIN + 6].copy_from_slice(b"TETRIS");
        let cart = Cartridge::from_bytes(rom).unwrap();
        assert_eq!(cart.header.title, "TETRIS");
    }

    #[test]
    fn test_unsupported_controller_is_rejected() {
        let rom = rom_with_banks(2, 0x05, 0x00, 0x00); // MBC2
        assert!(Cartridge::from_bytes(rom).is_err());
    }
}
