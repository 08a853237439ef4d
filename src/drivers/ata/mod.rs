//! PIO driver for a dual-channel PCI IDE controller with ATA disks and
//! ATAPI optical drives.
//!
//! [`IdeController`] is the driver proper and is generic over port access,
//! so it runs against real hardware or the test simulator. The functions in
//! this module wrap one kernel-wide instance and report numeric result codes.

pub mod addressing;
pub mod command;
pub mod controller;
pub mod error;
pub mod hal;
pub mod identify;
pub mod irq;
pub mod polling;
pub mod regs;
mod atapi;
mod pio;
#[cfg(test)]
mod sim;

pub use controller::{Device, DeviceClass, IdeController, ATAPI_SECTOR_SIZE, ATA_SECTOR_SIZE, MAX_DEVICES};
pub use error::{result_code, AtaError, AtaResult, ControllerErrorKind};
pub use hal::{Delay, HaltDelay, PortIo, X86Ports};
pub use irq::IrqFlag;
pub use regs::{ChannelId, DriveSelect};

use log::{info, warn};
use spin::Mutex;

pub type KernelIde = IdeController<'static, X86Ports, HaltDelay>;

/// Set by [`irq_handler`], consumed by ATAPI transfers.
pub static IDE_IRQ: IrqFlag = IrqFlag::new();

pub static IDE: Mutex<Option<KernelIde>> = Mutex::new(None);

/// Detects drives behind the controller described by `bars` and installs it.
///
/// Detection sleeps with `hlt`, so the timer interrupt must already be live.
pub fn init(bars: [u32; 5]) {
    // Safe: the IDE port ranges belong to this driver alone.
    let ports = unsafe { X86Ports::new() };
    let controller = IdeController::new(bars, ports, HaltDelay, &IDE_IRQ);
    match controller.devices().count() {
        0 => warn!("IDE: no drives detected"),
        n => info!("IDE: {} drive(s) ready", n),
    }
    *IDE.lock() = Some(controller);
}

/// Entry point for IRQ 14 and IRQ 15. Acknowledging the PIC is up to the caller.
pub fn irq_handler() {
    IDE_IRQ.notify();
}

/// Reads `count` sectors (0 means 256) from drive slot `drive`; returns a result code.
pub fn read_sectors(drive: usize, lba: u64, count: u8, buf: &mut [u8]) -> u8 {
    with_controller(|ide| ide.read_sectors(drive, lba, count, buf))
}

pub fn write_sectors(drive: usize, lba: u64, count: u8, buf: &[u8]) -> u8 {
    with_controller(|ide| ide.write_sectors(drive, lba, count, buf))
}

pub fn eject(drive: usize) -> u8 {
    with_controller(|ide| ide.eject(drive))
}

fn with_controller(op: impl FnOnce(&mut KernelIde) -> AtaResult<()>) -> u8 {
    let mut guard = IDE.lock();
    let result = match guard.as_mut() {
        Some(ide) => op(ide),
        None => Err(AtaError::DriveAbsent),
    };
    result_code(result)
}
