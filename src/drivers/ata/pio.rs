use bit_field::BitField;
use log::trace;
use super::addressing::{Address, AddressingMode};
use super::command::{flush_command, pio_command, Direction};
use super::controller::{Device, IdeController, ATA_SECTOR_SIZE};
use super::hal::{Delay, PortIo};
use super::polling::PollError;
use super::regs::{AtaStatus, Reg};

/// Caller memory for one PIO transfer; the variant decides the direction.
pub enum PioBuffer<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl PioBuffer<'_> {
    pub fn direction(&self) -> Direction {
        match self {
            PioBuffer::Read(_) => Direction::Read,
            PioBuffer::Write(_) => Direction::Write,
        }
    }
}

impl<P: PortIo, D: Delay> IdeController<'_, P, D> {
    /// Moves `sectors` 512-byte sectors between `device` and `buffer` with PIO.
    ///
    /// Performs no range or buffer checks; [`IdeController::read_sectors`]
    /// and [`IdeController::write_sectors`] do those before calling this.
    /// Returns the first failed poll. After a write the drive cache is
    /// flushed and the outcome of that flush is ignored.
    pub(super) fn ata_access(
        &mut self,
        device: &Device,
        lba: u64,
        sectors: u64,
        mut buffer: PioBuffer,
    ) -> Result<(), PollError> {
        let channel = device.channel;
        let direction = buffer.direction();
        self.set_interrupts(channel, false);

        let address = Address::resolve_span(lba, sectors, device.supports_lba());
        let mode = address.mode();
        let lba_io = address.lba_bytes();
        trace!("IDE: {:?} {} sectors at {:?} on {} {}", direction, sectors, address, channel, device.drive);

        while self.status(channel).contains(AtaStatus::BUSY) {
            core::hint::spin_loop();
        }

        self.write_reg(channel, Reg::HDDEVSEL, address.drive_head(device.drive));
        if mode == AddressingMode::Lba48 {
            // The high bytes go in first; each register is a two-deep FIFO.
            self.write_reg(channel, Reg::SECCOUNT1, sectors.get_bits(8..16) as u8);
            self.write_reg(channel, Reg::LBA3, lba_io[3]);
            self.write_reg(channel, Reg::LBA4, lba_io[4]);
            self.write_reg(channel, Reg::LBA5, lba_io[5]);
        }
        self.write_reg(channel, Reg::SECCOUNT0, sectors.get_bits(0..8) as u8);
        self.write_reg(channel, Reg::LBA0, lba_io[0]);
        self.write_reg(channel, Reg::LBA1, lba_io[1]);
        self.write_reg(channel, Reg::LBA2, lba_io[2]);

        self.write_reg(channel, Reg::COMMAND, pio_command(mode, direction) as u8);

        for sector in 0..sectors as usize {
            self.poll(channel, true)?;
            let range = sector * ATA_SECTOR_SIZE..(sector + 1) * ATA_SECTOR_SIZE;
            match &mut buffer {
                PioBuffer::Read(buf) => self.read_data(channel, &mut buf[range]),
                PioBuffer::Write(buf) => self.write_data(channel, &buf[range]),
            }
        }

        if direction == Direction::Write {
            self.write_reg(channel, Reg::COMMAND, flush_command(mode) as u8);
            let _ = self.poll(channel, false);
        }
        Ok(())
    }
}
