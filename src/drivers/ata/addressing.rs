use bit_field::BitField;
use super::regs::DriveSelect;

/// First LBA that cannot be expressed in 28 bits.
pub const LBA28_LIMIT: u64 = 1 << 28;
/// First LBA that cannot be expressed in 48 bits.
pub const LBA48_LIMIT: u64 = 1 << 48;

/// Fixed translation geometry for drives without LBA support.
pub const SECTORS_PER_TRACK: u64 = 63;
pub const HEADS_PER_CYLINDER: u64 = 16;

/// Capabilities word bit advertising LBA support.
pub const CAPABILITY_LBA: u16 = 1 << 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressingMode {
    Chs   = 0,
    Lba28 = 1,
    Lba48 = 2,
}

/// A sector address in the form the task file needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Chs { cylinder: u32, head: u8, sector: u8 },
    Lba28(u32),
    Lba48(u64),
}

impl Address {
    /// Picks the addressing mode for `lba`.
    ///
    /// Anything at or past 2^28 needs LBA48 whatever the drive claims;
    /// below that, drives without LBA support get CHS translation.
    pub fn resolve(lba: u64, supports_lba: bool) -> Address {
        if lba >= LBA28_LIMIT {
            Address::Lba48(lba.get_bits(0..48))
        } else if supports_lba {
            Address::Lba28(lba as u32)
        } else {
            let sector = lba % SECTORS_PER_TRACK + 1;
            let track_start = lba + 1 - sector;
            let cylinder = track_start / (HEADS_PER_CYLINDER * SECTORS_PER_TRACK);
            let head = (track_start % (HEADS_PER_CYLINDER * SECTORS_PER_TRACK)) / SECTORS_PER_TRACK;
            Address::Chs {
                cylinder: cylinder as u32,
                head: head as u8,
                sector: sector as u8,
            }
        }
    }

    /// Like [`Address::resolve`], but for a run of `sectors` starting at
    /// `lba`: a run whose last sector lies at or past 2^28 goes out as LBA48
    /// even when it starts below.
    pub fn resolve_span(lba: u64, sectors: u64, supports_lba: bool) -> Address {
        match lba.checked_add(sectors) {
            Some(end) if end <= LBA28_LIMIT => Address::resolve(lba, supports_lba),
            _ => Address::Lba48(lba.get_bits(0..48)),
        }
    }

    pub fn mode(&self) -> AddressingMode {
        match self {
            Address::Chs { .. } => AddressingMode::Chs,
            Address::Lba28(_)   => AddressingMode::Lba28,
            Address::Lba48(_)   => AddressingMode::Lba48,
        }
    }

    /// Values for LBA0..LBA5, low byte first.
    /// For CHS: sector number, cylinder low, cylinder high.
    pub fn lba_bytes(&self) -> [u8; 6] {
        match *self {
            Address::Chs { cylinder, sector, .. } => [
                sector,
                cylinder.get_bits(0..8) as u8,
                cylinder.get_bits(8..16) as u8,
                0, 0, 0,
            ],
            Address::Lba28(lba) => [
                lba.get_bits(0..8) as u8,
                lba.get_bits(8..16) as u8,
                lba.get_bits(16..24) as u8,
                0, 0, 0,
            ],
            Address::Lba48(lba) => [
                lba.get_bits(0..8) as u8,
                lba.get_bits(8..16) as u8,
                lba.get_bits(16..24) as u8,
                lba.get_bits(24..32) as u8,
                lba.get_bits(32..40) as u8,
                lba.get_bits(40..48) as u8,
            ],
        }
    }

    /// Low nibble of the drive/head register.
    pub fn head(&self) -> u8 {
        match *self {
            Address::Chs { head, .. } => head & 0x0F,
            Address::Lba28(lba)       => lba.get_bits(24..28) as u8,
            Address::Lba48(_)         => 0,
        }
    }

    /// Full drive/head register value: `0xA0` for CHS, `0xE0` (LBA bit) otherwise.
    pub fn drive_head(&self, drive: DriveSelect) -> u8 {
        let base = match self.mode() {
            AddressingMode::Chs => 0xA0,
            AddressingMode::Lba28 | AddressingMode::Lba48 => 0xE0,
        };
        base | drive.bit() | self.head()
    }
}
