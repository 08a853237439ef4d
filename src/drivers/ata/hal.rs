use x86_64::instructions::port::Port;

/// Byte and word access to the I/O port space.
///
/// The controller never touches ports directly; every access goes through
/// this trait so the same protocol code drives real hardware or a simulated bus.
pub trait PortIo {
    fn inb(&mut self, port: u16) -> u8;
    fn outb(&mut self, port: u16, value: u8);
    fn inw(&mut self, port: u16) -> u16;
    fn outw(&mut self, port: u16, value: u16);
}

/// Millisecond sleep used for drive-select and IDENTIFY settle times.
pub trait Delay {
    fn sleep_ms(&mut self, ms: u32);
}

/// Port I/O through the `in`/`out` instructions.
pub struct X86Ports {
    _private: (),
}

impl X86Ports {
    /// # Safety
    /// The caller must own the IDE port ranges: nothing else may program
    /// the controller while this value is alive.
    pub unsafe fn new() -> Self {
        X86Ports { _private: () }
    }
}

impl PortIo for X86Ports {
    fn inb(&mut self, port: u16) -> u8 {
        let mut port = Port::<u8>::new(port);
        unsafe { port.read() }
    }

    fn outb(&mut self, port: u16, value: u8) {
        let mut port = Port::<u8>::new(port);
        unsafe { port.write(value) }
    }

    fn inw(&mut self, port: u16) -> u16 {
        let mut port = Port::<u16>::new(port);
        unsafe { port.read() }
    }

    fn outw(&mut self, port: u16, value: u16) {
        let mut port = Port::<u16>::new(port);
        unsafe { port.write(value) }
    }
}

/// Sleeps by halting until the next interrupt, once per millisecond.
///
/// Only accurate when the PIT fires at 1 kHz and interrupts are enabled.
pub struct HaltDelay;

impl Delay for HaltDelay {
    fn sleep_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            x86_64::instructions::hlt();
        }
    }
}
