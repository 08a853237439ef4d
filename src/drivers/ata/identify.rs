//! Parsing of the 512-byte block returned by IDENTIFY DEVICE and
//! IDENTIFY PACKET DEVICE.

use bit_field::BitField;

pub const IDENTIFY_BLOCK_SIZE: usize = 512;

// Byte offsets into the identification space.
pub(crate) const IDENT_DEVICETYPE: usize   = 0;
pub(crate) const IDENT_SERIAL: usize       = 20;
pub(crate) const IDENT_MODEL: usize        = 54;
pub(crate) const IDENT_CAPABILITIES: usize = 98;
pub(crate) const IDENT_MAX_LBA: usize      = 120;
pub(crate) const IDENT_COMMANDSETS: usize  = 164;
pub(crate) const IDENT_MAX_LBA_EXT: usize  = 200;

pub const MODEL_LEN: usize = 40;
pub const SERIAL_LEN: usize = 20;

/// Command-set bit advertising 48-bit addressing.
const COMMANDSET_LBA48_BIT: usize = 26;

/// Fields of the identification space the driver keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyData {
    pub signature: u16,
    pub capabilities: u16,
    pub command_sets: u32,
    /// Addressable sectors, from the 48-bit field when the drive supports it.
    pub size: u64,
    model: [u8; MODEL_LEN],
    model_len: usize,
    serial: [u8; SERIAL_LEN],
    serial_len: usize,
}

impl IdentifyData {
    pub fn parse(block: &[u8; IDENTIFY_BLOCK_SIZE]) -> IdentifyData {
        let command_sets = read_u32(block, IDENT_COMMANDSETS);
        let size = if command_sets.get_bit(COMMANDSET_LBA48_BIT) {
            read_u64(block, IDENT_MAX_LBA_EXT).get_bits(0..48)
        } else {
            read_u32(block, IDENT_MAX_LBA) as u64
        };

        let mut model = [0u8; MODEL_LEN];
        let model_len = copy_ata_string(&block[IDENT_MODEL..IDENT_MODEL + MODEL_LEN], &mut model);
        let mut serial = [0u8; SERIAL_LEN];
        let serial_len = copy_ata_string(&block[IDENT_SERIAL..IDENT_SERIAL + SERIAL_LEN], &mut serial);

        IdentifyData {
            signature: read_u16(block, IDENT_DEVICETYPE),
            capabilities: read_u16(block, IDENT_CAPABILITIES),
            command_sets,
            size,
            model,
            model_len,
            serial,
            serial_len,
        }
    }

    pub fn supports_lba48(&self) -> bool {
        self.command_sets.get_bit(COMMANDSET_LBA48_BIT)
    }

    /// The model string, or `"unknown"` when the drive reported only blanks.
    pub fn model(&self) -> &str {
        match core::str::from_utf8(&self.model[..self.model_len]) {
            Ok(model) if !model.is_empty() => model,
            _ => "unknown",
        }
    }

    pub fn serial(&self) -> &str {
        core::str::from_utf8(&self.serial[..self.serial_len]).unwrap_or("")
    }
}

fn read_u16(block: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([block[offset], block[offset + 1]])
}

fn read_u32(block: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([block[offset], block[offset + 1], block[offset + 2], block[offset + 3]])
}

fn read_u64(block: &[u8], offset: usize) -> u64 {
    read_u32(block, offset) as u64 | (read_u32(block, offset + 4) as u64) << 32
}

/// ATA strings store two characters per word with the first one in the high
/// byte. Swaps each pair into `out`, maps non-printable bytes to spaces and
/// returns the length without trailing blanks.
fn copy_ata_string(raw: &[u8], out: &mut [u8]) -> usize {
    for (src, dst) in raw.chunks_exact(2).zip(out.chunks_exact_mut(2)) {
        dst[0] = src[1];
        dst[1] = src[0];
    }
    for byte in out.iter_mut() {
        if *byte < 0x20 || *byte >= 0x7F {
            *byte = b' ';
        }
    }
    out.iter().rposition(|&b| b != b' ').map_or(0, |last| last + 1)
}

#[cfg(test)]
pub(crate) fn encode_ata_string(text: &str, out: &mut [u8]) {
    let mut padded = [b' '; 64];
    padded[..text.len()].copy_from_slice(text.as_bytes());
    for (i, dst) in out.chunks_exact_mut(2).enumerate() {
        dst[0] = padded[i * 2 + 1];
        dst[1] = padded[i * 2];
    }
}
