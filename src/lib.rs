#![cfg_attr(not(test), no_std)]

pub mod serial;
pub mod drivers;

/// Brings up logging, then the IDE driver.
pub fn init(ide_bars: [u32; 5]) {
    serial::init(log::LevelFilter::Info);
    log::info!("AtomicIDE starting.");
    drivers::init(ide_bars);
}
