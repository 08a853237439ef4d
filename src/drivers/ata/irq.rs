use core::sync::atomic::{AtomicBool, Ordering};

/// Pending-interrupt flag shared between the IDE interrupt handler and the
/// ATAPI packet engine.
///
/// The handler calls [`IrqFlag::notify`]; the engine blocks in
/// [`IrqFlag::wait`], which consumes exactly one pending interrupt.
pub struct IrqFlag {
    pending: AtomicBool,
}

impl IrqFlag {
    pub const fn new() -> Self {
        IrqFlag {
            pending: AtomicBool::new(false),
        }
    }

    pub fn notify(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Drops an interrupt left over from a previous command.
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Spins until an interrupt is pending, then takes it.
    pub fn wait(&self) {
        while self
            .pending
            .compare_exchange_weak(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }
}

impl Default for IrqFlag {
    fn default() -> Self {
        Self::new()
    }
}
