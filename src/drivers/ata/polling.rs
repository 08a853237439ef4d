use core::fmt;
use log::warn;
use super::controller::IdeController;
use super::hal::{Delay, PortIo};
use super::regs::{AtaStatus, ChannelId, Reg};

/// How a command ended when it did not end ready for data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollError {
    DeviceFault,
    Error,
    /// BSY, ERR and DF clear, but DRQ clear too.
    NoData,
}

impl PollError {
    pub fn code(self) -> u8 {
        match self {
            PollError::DeviceFault => 1,
            PollError::Error       => 2,
            PollError::NoData      => 3,
        }
    }
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PollError::DeviceFault => write!(f, "device fault"),
            PollError::Error       => write!(f, "error"),
            PollError::NoData      => write!(f, "no data requested"),
        }
    }
}

const LONG_WAIT_ITERATIONS: u64 = 1_000_000;

impl<P: PortIo, D: Delay> IdeController<'_, P, D> {
    /// Waits out a just-issued command.
    ///
    /// Reads the alternate status four times (about 400ns, enough for the
    /// drive to raise BSY), then spins until BSY clears. There is no timeout.
    /// With `advanced_check` the final status is inspected: ERR, then DF,
    /// then a missing DRQ are reported in that order.
    pub fn poll(&mut self, channel: ChannelId, advanced_check: bool) -> Result<(), PollError> {
        for _ in 0..4 {
            self.read_reg(channel, Reg::ALTSTATUS);
        }

        let mut loops: u64 = 0;
        while self.status(channel).contains(AtaStatus::BUSY) {
            loops += 1;
            if loops % LONG_WAIT_ITERATIONS == 0 {
                warn!("IDE: {} channel has been busy for a long time, is the drive wedged?", channel);
            }
            core::hint::spin_loop();
        }

        if advanced_check {
            let status = self.status(channel);
            if status.contains(AtaStatus::ERROR) {
                return Err(PollError::Error);
            }
            if status.contains(AtaStatus::DRIVE_WRITE_FAULT) {
                return Err(PollError::DeviceFault);
            }
            if !status.contains(AtaStatus::DATA_REQUEST) {
                return Err(PollError::NoData);
            }
        }
        Ok(())
    }
}
