use super::addressing::AddressingMode;

/// Commands written to the command register.
/// The full list lives in the ATA command matrix; only what this driver
/// speaks is named here.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AtaCommand {
    /// Read sectors using PIO (28-bit LBA or CHS)
    ReadPio        = 0x20,
    /// Read sectors using PIO (48-bit LBA)
    ReadPioExt     = 0x24,
    ReadDma        = 0xC8,
    ReadDmaExt     = 0x25,
    /// Write sectors using PIO (28-bit LBA or CHS)
    WritePio       = 0x30,
    /// Write sectors using PIO (48-bit LBA)
    WritePioExt    = 0x34,
    WriteDma       = 0xCA,
    WriteDmaExt    = 0x35,
    /// Flush the drive's write cache, issued after each write.
    CacheFlush     = 0xE7,
    CacheFlushExt  = 0xEA,
    /// Sends a 12-byte SCSI packet to an ATAPI device.
    Packet         = 0xA0,
    IdentifyPacket = 0xA1,
    Identify       = 0xEC,
}

/// SCSI opcodes carried inside an ATAPI packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AtapiCommand {
    Read12 = 0xA8,
    /// START STOP UNIT; with LoEj set it ejects the medium.
    Eject  = 0x1B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Read  = 0,
    Write = 1,
}

/// PIO opcodes indexed by `[AddressingMode][Direction]`.
const PIO_COMMANDS: [[AtaCommand; 2]; 3] = [
    /* Chs   */ [AtaCommand::ReadPio,    AtaCommand::WritePio],
    /* Lba28 */ [AtaCommand::ReadPio,    AtaCommand::WritePio],
    /* Lba48 */ [AtaCommand::ReadPioExt, AtaCommand::WritePioExt],
];

/// Cache flush opcodes indexed by `AddressingMode`.
const FLUSH_COMMANDS: [AtaCommand; 3] = [
    AtaCommand::CacheFlush,
    AtaCommand::CacheFlush,
    AtaCommand::CacheFlushExt,
];

pub fn pio_command(mode: AddressingMode, direction: Direction) -> AtaCommand {
    PIO_COMMANDS[mode as usize][direction as usize]
}

pub fn flush_command(mode: AddressingMode) -> AtaCommand {
    FLUSH_COMMANDS[mode as usize]
}
