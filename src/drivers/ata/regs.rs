//! Register access for one IDE channel.
//!
//! Registers are addressed by a logical number that spans four physical
//! windows: the command block (`BAR0`/`BAR2`), the high-order half of the
//! command block reached through the HOB latch, the control block
//! (`BAR1`/`BAR3`) and the bus-master block (`BAR4`).

use core::fmt;
use bitflags::bitflags;
use super::hal::PortIo;

bitflags! {
    /// Bits of the status / alternate status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AtaStatus: u8 {
        /// The drive owns the task file; no other bit is valid while set.
        const BUSY                = 0x80;
        const DRIVE_READY         = 0x40;
        const DRIVE_WRITE_FAULT   = 0x20;
        const DRIVE_SEEK_COMPLETE = 0x10;
        /// The drive has PIO data to transfer, or is ready to accept it.
        const DATA_REQUEST        = 0x08;
        const CORRECTED_DATA      = 0x04;
        const INDEX               = 0x02;
        const ERROR               = 0x01;
    }
}

bitflags! {
    /// Bits of the error register, valid when `AtaStatus::ERROR` is set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AtaErrorBits: u8 {
        const BAD_BLOCK              = 0x80;
        const UNCORRECTABLE_DATA     = 0x40;
        const MEDIA_CHANGED          = 0x20;
        const ID_MARK_NOT_FOUND      = 0x10;
        const MEDIA_CHANGE_REQUEST   = 0x08;
        const COMMAND_ABORTED        = 0x04;
        const TRACK_0_NOT_FOUND      = 0x02;
        const ADDRESS_MARK_NOT_FOUND = 0x01;
    }
}

bitflags! {
    /// Bits of the device control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AtaControl: u8 {
        /// High Order Byte: selects the previous (high) byte of the LBA48 FIFOs.
        const HOB  = 0x80;
        /// No interrupt enable: set to mask INTRQ from the drives.
        const NIEN = 0x02;
    }
}

/// A logical register number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg(pub u8);

impl Reg {
    pub const DATA: Reg       = Reg(0x00);
    pub const ERROR: Reg      = Reg(0x01);
    pub const FEATURES: Reg   = Reg(0x01);
    pub const SECCOUNT0: Reg  = Reg(0x02);
    pub const LBA0: Reg       = Reg(0x03);
    pub const LBA1: Reg       = Reg(0x04);
    pub const LBA2: Reg       = Reg(0x05);
    pub const HDDEVSEL: Reg   = Reg(0x06);
    pub const COMMAND: Reg    = Reg(0x07);
    pub const STATUS: Reg     = Reg(0x07);
    pub const SECCOUNT1: Reg  = Reg(0x08);
    pub const LBA3: Reg       = Reg(0x09);
    pub const LBA4: Reg       = Reg(0x0A);
    pub const LBA5: Reg       = Reg(0x0B);
    pub const CONTROL: Reg    = Reg(0x0C);
    pub const ALTSTATUS: Reg  = Reg(0x0C);
    pub const DEVADDRESS: Reg = Reg(0x0D);
    pub const BM_COMMAND: Reg = Reg(0x0E);
    pub const BM_STATUS: Reg  = Reg(0x10);
    pub const BM_PRDT: Reg    = Reg(0x12);

    /// Registers 8..=11 share ports with 2..=5 and are only visible with HOB set.
    fn is_high_order(self) -> bool {
        (0x08..0x0C).contains(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelId {
    Primary   = 0,
    Secondary = 1,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::Primary, ChannelId::Secondary];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChannelId::Primary   => write!(f, "Primary"),
            ChannelId::Secondary => write!(f, "Secondary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriveSelect {
    Master = 0,
    Slave  = 1,
}

impl DriveSelect {
    pub const ALL: [DriveSelect; 2] = [DriveSelect::Master, DriveSelect::Slave];

    /// The drive bit of the drive/head register.
    pub fn bit(self) -> u8 {
        (self as u8) << 4
    }
}

impl fmt::Display for DriveSelect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DriveSelect::Master => write!(f, "Master"),
            DriveSelect::Slave  => write!(f, "Slave"),
        }
    }
}

/// The port ranges of one channel plus its interrupt-enable state.
#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    /// Command block base (data register).
    base: u16,
    /// Device control / alternate status port.
    ctrl: u16,
    /// Bus-master IDE base for this channel.
    bmide: u16,
    /// Either empty or `NIEN`; OR-ed into every control register write.
    nien: AtaControl,
}

impl Channel {
    pub fn new(id: ChannelId, base: u16, ctrl: u16, bmide: u16) -> Self {
        Channel {
            id,
            base,
            ctrl,
            bmide,
            nien: AtaControl::empty(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn ctrl(&self) -> u16 {
        self.ctrl
    }

    pub fn bmide(&self) -> u16 {
        self.bmide
    }

    pub fn interrupts_enabled(&self) -> bool {
        !self.nien.contains(AtaControl::NIEN)
    }

    /// Physical port backing a logical register.
    pub fn port(&self, reg: Reg) -> Option<u16> {
        match reg.0 {
            0x00..=0x07 => Some(self.base + reg.0 as u16),
            0x08..=0x0B => Some(self.base + reg.0 as u16 - 0x06),
            0x0C..=0x0D => Some(self.ctrl + reg.0 as u16 - 0x0C),
            0x0E..=0x15 => Some(self.bmide + reg.0 as u16 - 0x0E),
            _ => None,
        }
    }

    pub fn read<P: PortIo>(&self, ports: &mut P, reg: Reg) -> u8 {
        let Some(port) = self.port(reg) else {
            debug_assert!(false, "read of unmapped IDE register {:#x}", reg.0);
            return 0;
        };
        if reg.is_high_order() {
            let mut latch = HobLatch::enter(self, ports);
            latch.ports().inb(port)
        } else {
            ports.inb(port)
        }
    }

    pub fn write<P: PortIo>(&self, ports: &mut P, reg: Reg, value: u8) {
        let Some(port) = self.port(reg) else {
            debug_assert!(false, "write of unmapped IDE register {:#x}", reg.0);
            return;
        };
        if reg.is_high_order() {
            let mut latch = HobLatch::enter(self, ports);
            latch.ports().outb(port, value);
        } else {
            ports.outb(port, value);
        }
    }

    pub fn status<P: PortIo>(&self, ports: &mut P) -> AtaStatus {
        AtaStatus::from_bits_truncate(self.read(ports, Reg::STATUS))
    }

    /// Sets or clears `nIEN` and writes it to the control register.
    pub fn set_interrupts<P: PortIo>(&mut self, ports: &mut P, enabled: bool) {
        self.nien = if enabled { AtaControl::empty() } else { AtaControl::NIEN };
        self.write(ports, Reg::CONTROL, self.nien.bits());
    }

    /// Fills `buf` from the data register, one little-endian word per two bytes.
    pub fn read_buffer<P: PortIo>(&self, ports: &mut P, buf: &mut [u8]) {
        let port = self.base;
        for chunk in buf.chunks_exact_mut(2) {
            let word = ports.inw(port);
            chunk[0] = word as u8;
            chunk[1] = (word >> 8) as u8;
        }
    }

    pub fn write_buffer<P: PortIo>(&self, ports: &mut P, buf: &[u8]) {
        let port = self.base;
        for chunk in buf.chunks_exact(2) {
            let word = (chunk[1] as u16) << 8 | chunk[0] as u16;
            ports.outw(port, word);
        }
    }
}

/// Holds the HOB bit set in the control register for as long as it lives.
///
/// Dropping the latch writes back the plain `nIEN` state, so the channel's
/// interrupt-enable setting survives every exit path.
pub struct HobLatch<'a, P: PortIo> {
    ports: &'a mut P,
    ctrl: u16,
    nien: AtaControl,
}

impl<'a, P: PortIo> HobLatch<'a, P> {
    pub fn enter(channel: &Channel, ports: &'a mut P) -> Self {
        ports.outb(channel.ctrl, (AtaControl::HOB | channel.nien).bits());
        HobLatch {
            ports,
            ctrl: channel.ctrl,
            nien: channel.nien,
        }
    }

    pub fn ports(&mut self) -> &mut P {
        &mut *self.ports
    }
}

impl<P: PortIo> Drop for HobLatch<'_, P> {
    fn drop(&mut self) {
        self.ports.outb(self.ctrl, self.nien.bits());
    }
}
