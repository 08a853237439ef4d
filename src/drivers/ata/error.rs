use core::fmt;
use log::error;
use super::controller::{Device, IdeController};
use super::hal::{Delay, PortIo};
use super::polling::PollError;
use super::regs::{AtaErrorBits, Reg};

/// What the error register said went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerErrorKind {
    AddressMarkNotFound,
    /// Track 0 not found, media change request or media changed.
    MediaError,
    CommandAborted,
    IdMarkNotFound,
    UncorrectableData,
    BadSectors,
}

impl ControllerErrorKind {
    /// Later bits override earlier ones, so the highest set bit decides.
    /// An ERR status with an empty error register is treated as an abort.
    pub fn from_bits(bits: AtaErrorBits) -> ControllerErrorKind {
        if bits.contains(AtaErrorBits::BAD_BLOCK) {
            ControllerErrorKind::BadSectors
        } else if bits.contains(AtaErrorBits::UNCORRECTABLE_DATA) {
            ControllerErrorKind::UncorrectableData
        } else if bits.contains(AtaErrorBits::MEDIA_CHANGED) {
            ControllerErrorKind::MediaError
        } else if bits.contains(AtaErrorBits::ID_MARK_NOT_FOUND) {
            ControllerErrorKind::IdMarkNotFound
        } else if bits.contains(AtaErrorBits::MEDIA_CHANGE_REQUEST) {
            ControllerErrorKind::MediaError
        } else if bits.contains(AtaErrorBits::COMMAND_ABORTED) {
            ControllerErrorKind::CommandAborted
        } else if bits.contains(AtaErrorBits::TRACK_0_NOT_FOUND) {
            ControllerErrorKind::MediaError
        } else if bits.contains(AtaErrorBits::ADDRESS_MARK_NOT_FOUND) {
            ControllerErrorKind::AddressMarkNotFound
        } else {
            ControllerErrorKind::CommandAborted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaError {
    DriveAbsent,
    OutOfRange,
    BufferTooSmall,
    DeviceFault,
    ControllerError(ControllerErrorKind),
    /// The drive finished the command without asking for data.
    DataNotReady,
    /// Write attempted on an ATAPI device.
    WriteProtected,
}

impl AtaError {
    /// Stable numeric result code; 0 is reserved for success.
    pub fn code(&self) -> u8 {
        match self {
            AtaError::DriveAbsent    => 1,
            AtaError::OutOfRange     => 2,
            AtaError::BufferTooSmall => 4,
            AtaError::DeviceFault    => 19,
            AtaError::DataNotReady   => 23,
            AtaError::WriteProtected => 8,
            AtaError::ControllerError(kind) => match kind {
                ControllerErrorKind::MediaError          => 3,
                ControllerErrorKind::AddressMarkNotFound => 7,
                ControllerErrorKind::BadSectors          => 13,
                ControllerErrorKind::CommandAborted      => 20,
                ControllerErrorKind::IdMarkNotFound      => 21,
                ControllerErrorKind::UncorrectableData   => 22,
            },
        }
    }
}

impl fmt::Display for AtaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AtaError::DriveAbsent    => write!(f, "Drive not found"),
            AtaError::OutOfRange     => write!(f, "Sector range out of bounds"),
            AtaError::BufferTooSmall => write!(f, "Buffer too small"),
            AtaError::DeviceFault    => write!(f, "Device fault"),
            AtaError::DataNotReady   => write!(f, "Reads nothing"),
            AtaError::WriteProtected => write!(f, "Write protected"),
            AtaError::ControllerError(kind) => match kind {
                ControllerErrorKind::AddressMarkNotFound => write!(f, "No address mark found"),
                ControllerErrorKind::MediaError          => write!(f, "No media or media error"),
                ControllerErrorKind::CommandAborted      => write!(f, "Command aborted"),
                ControllerErrorKind::IdMarkNotFound      => write!(f, "ID mark not found"),
                ControllerErrorKind::UncorrectableData   => write!(f, "Uncorrectable data error"),
                ControllerErrorKind::BadSectors          => write!(f, "Bad sectors"),
            },
        }
    }
}

pub type AtaResult<T> = Result<T, AtaError>;

/// Collapses a driver result into the numeric code handed to callers.
pub fn result_code(result: AtaResult<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

const ERROR_BIT_NAMES: [(AtaErrorBits, &str); 8] = [
    (AtaErrorBits::ADDRESS_MARK_NOT_FOUND, "No address mark found"),
    (AtaErrorBits::TRACK_0_NOT_FOUND,      "No media or media error (track 0)"),
    (AtaErrorBits::COMMAND_ABORTED,        "Command aborted"),
    (AtaErrorBits::MEDIA_CHANGE_REQUEST,   "No media or media error (change request)"),
    (AtaErrorBits::ID_MARK_NOT_FOUND,      "ID mark not found"),
    (AtaErrorBits::MEDIA_CHANGED,          "No media or media error (media changed)"),
    (AtaErrorBits::UNCORRECTABLE_DATA,     "Uncorrectable data error"),
    (AtaErrorBits::BAD_BLOCK,              "Bad sectors"),
];

impl<P: PortIo, D: Delay> IdeController<'_, P, D> {
    /// Turns an engine outcome into a fault, logging a diagnostic for it.
    ///
    /// Success yields `None` without touching the hardware. For
    /// `PollError::Error` the device's error register is read and decoded.
    pub fn report(&mut self, device: &Device, outcome: Result<(), PollError>) -> Option<AtaError> {
        let fault = outcome.err()?;
        let error = match fault {
            PollError::DeviceFault => AtaError::DeviceFault,
            PollError::NoData => AtaError::DataNotReady,
            PollError::Error => {
                let bits = AtaErrorBits::from_bits_truncate(self.read_reg(device.channel, Reg::ERROR));
                for (bit, name) in ERROR_BIT_NAMES {
                    if bits.contains(bit) {
                        error!("IDE: - {}", name);
                    }
                }
                AtaError::ControllerError(ControllerErrorKind::from_bits(bits))
            }
        };
        Some(self.diagnose(device, error))
    }

    /// Logs `error` against `device` and hands it back.
    pub fn diagnose(&self, device: &Device, error: AtaError) -> AtaError {
        error!("IDE: {} [{} {}] {}", error, device.channel, device.drive, device.model());
        error
    }
}
