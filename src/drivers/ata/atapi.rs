//! ATAPI packet commands: READ(12) and START STOP UNIT (eject).
//!
//! Packet devices answer in interrupt-gated steps, so unlike the PIO path
//! these run with the channel's interrupts enabled and block on the shared
//! pending-interrupt flag.

use bit_field::BitField;
use log::trace;
use super::command::{AtaCommand, AtapiCommand};
use super::controller::{Device, IdeController, ATAPI_SECTOR_SIZE};
use super::hal::{Delay, PortIo};
use super::polling::PollError;
use super::regs::{AtaStatus, Reg};

pub const PACKET_SIZE: usize = 12;

/// Byte-count limit announced in LBA1/LBA2 for data-bearing packets.
const READ_BYTE_COUNT: u16 = ATAPI_SECTOR_SIZE as u16;

/// START STOP UNIT with LoEj set and Start clear.
const EJECT_PACKET: [u8; PACKET_SIZE] = [AtapiCommand::Eject as u8, 0, 0, 0, 0x02, 0, 0, 0, 0, 0, 0, 0];

fn read_packet(lba: u32, count: u8) -> [u8; PACKET_SIZE] {
    [
        AtapiCommand::Read12 as u8,
        0,
        lba.get_bits(24..32) as u8,
        lba.get_bits(16..24) as u8,
        lba.get_bits(8..16) as u8,
        lba.get_bits(0..8) as u8,
        0,
        0,
        0,
        count,
        0,
        0,
    ]
}

impl<P: PortIo, D: Delay> IdeController<'_, P, D> {
    /// Reads `count` 2048-byte sectors at `lba` into `buf` with one READ(12).
    ///
    /// Expects one interrupt per sector plus a final one once the drive is
    /// done, each consumed by exactly one wait.
    pub(super) fn packet_read(&mut self, device: &Device, lba: u32, count: u8, buf: &mut [u8]) -> Result<(), PollError> {
        let channel = device.channel;
        trace!("IDE: READ(12) {} sectors at {} on {} {}", count, lba, channel, device.drive);
        self.start_packet(device, READ_BYTE_COUNT, &read_packet(lba, count))?;

        for chunk in buf.chunks_exact_mut(ATAPI_SECTOR_SIZE).take(count as usize) {
            self.irq.wait();
            self.poll(channel, true)?;
            self.read_data(channel, chunk);
        }

        self.irq.wait();
        while self.status(channel).intersects(AtaStatus::BUSY | AtaStatus::DATA_REQUEST) {
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// Asks the drive to unload its medium.
    pub(super) fn packet_eject(&mut self, device: &Device) -> Result<(), PollError> {
        trace!("IDE: eject on {} {}", device.channel, device.drive);
        self.start_packet(device, 0, &EJECT_PACKET)?;
        self.irq.wait();
        match self.poll(device.channel, true) {
            // No data phase follows a START STOP UNIT.
            Err(PollError::NoData) => Ok(()),
            outcome => outcome,
        }
    }

    /// Issues PACKET and hands the drive its command block.
    fn start_packet(&mut self, device: &Device, byte_count: u16, packet: &[u8; PACKET_SIZE]) -> Result<(), PollError> {
        let channel = device.channel;
        self.set_interrupts(channel, true);
        self.irq.clear();

        self.write_reg(channel, Reg::HDDEVSEL, 0xA0 | device.drive.bit());
        for _ in 0..4 {
            self.read_reg(channel, Reg::ALTSTATUS);
        }

        // PIO, not DMA
        self.write_reg(channel, Reg::FEATURES, 0);
        self.write_reg(channel, Reg::LBA1, byte_count.get_bits(0..8) as u8);
        self.write_reg(channel, Reg::LBA2, byte_count.get_bits(8..16) as u8);
        self.write_reg(channel, Reg::COMMAND, AtaCommand::Packet as u8);
        self.poll(channel, true)?;

        self.write_data(channel, packet);
        Ok(())
    }
}
