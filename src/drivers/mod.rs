pub mod ata;

/// `ide_bars` are BAR0..BAR4 of the PCI IDE function; zeros select legacy ports.
pub fn init(ide_bars: [u32; 5]) {
    ata::init(ide_bars);
    log::info!("Drivers subsystem initialized.");
}
