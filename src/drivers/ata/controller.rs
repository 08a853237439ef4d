//! The IDE controller: channel setup, device detection and the public
//! sector-level entry points.

use log::{debug, info, trace, warn};
use super::addressing::{CAPABILITY_LBA, LBA48_LIMIT};
use super::command::AtaCommand;
use super::error::{AtaError, AtaResult, ControllerErrorKind};
use super::hal::{Delay, PortIo};
use super::identify::{IdentifyData, IDENTIFY_BLOCK_SIZE};
use super::irq::IrqFlag;
use super::pio::PioBuffer;
use super::regs::{AtaStatus, Channel, ChannelId, DriveSelect, Reg};

pub const ATA_SECTOR_SIZE: usize = 512;
pub const ATAPI_SECTOR_SIZE: usize = 2048;
pub const MAX_DEVICES: usize = 4;

const LEGACY_PRIMARY_BASE: u16 = 0x1F0;
const LEGACY_PRIMARY_CTRL: u16 = 0x3F6;
const LEGACY_SECONDARY_BASE: u16 = 0x170;
const LEGACY_SECONDARY_CTRL: u16 = 0x376;

/// I/O BARs carry flag bits in their lowest two bits.
const BAR_PORT_MASK: u32 = 0xFFFF_FFFC;
/// Device control sits two ports into the control block a BAR points at.
const CONTROL_BLOCK_OFFSET: u16 = 2;
const SECONDARY_BUS_MASTER_OFFSET: u16 = 8;

/// LBA1/LBA2 after a failed IDENTIFY on packet devices.
const ATAPI_SIGNATURES: [(u8, u8); 2] = [
    (0x14, 0xEB), // PATAPI
    (0x69, 0x96), // SATAPI
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Ata,
    Atapi,
}

/// A drive found during detection.
#[derive(Debug, Clone)]
pub struct Device {
    pub channel: ChannelId,
    pub drive: DriveSelect,
    pub class: DeviceClass,
    pub ident: IdentifyData,
}

impl Device {
    /// Registry slot: `channel * 2 + drive`.
    pub fn index(&self) -> usize {
        self.channel.index() * 2 + self.drive as usize
    }

    pub fn model(&self) -> &str {
        self.ident.model()
    }

    pub fn serial(&self) -> &str {
        self.ident.serial()
    }

    /// Number of addressable sectors.
    pub fn size(&self) -> u64 {
        self.ident.size
    }

    pub fn supports_lba(&self) -> bool {
        self.ident.capabilities & CAPABILITY_LBA != 0
    }

    pub fn sector_size(&self) -> usize {
        match self.class {
            DeviceClass::Ata => ATA_SECTOR_SIZE,
            DeviceClass::Atapi => ATAPI_SECTOR_SIZE,
        }
    }
}

/// Resolves the five BARs of an IDE controller into channel port ranges,
/// falling back to the legacy ISA ports for any BAR that is zero.
pub fn resolve_channels(bars: [u32; 5]) -> [Channel; 2] {
    fn command_block(bar: u32, legacy: u16) -> u16 {
        if bar == 0 { legacy } else { (bar & BAR_PORT_MASK) as u16 }
    }
    fn control_port(bar: u32, legacy: u16) -> u16 {
        if bar == 0 { legacy } else { (bar & BAR_PORT_MASK) as u16 + CONTROL_BLOCK_OFFSET }
    }
    let bus_master = (bars[4] & BAR_PORT_MASK) as u16;
    [
        Channel::new(
            ChannelId::Primary,
            command_block(bars[0], LEGACY_PRIMARY_BASE),
            control_port(bars[1], LEGACY_PRIMARY_CTRL),
            bus_master,
        ),
        Channel::new(
            ChannelId::Secondary,
            command_block(bars[2], LEGACY_SECONDARY_BASE),
            control_port(bars[3], LEGACY_SECONDARY_CTRL),
            bus_master + SECONDARY_BUS_MASTER_OFFSET,
        ),
    ]
}

/// A dual-channel IDE controller and the drives attached to it.
///
/// Every operation takes `&mut self`, so a controller never has more than
/// one command in flight.
pub struct IdeController<'irq, P: PortIo, D: Delay> {
    pub(super) ports: P,
    pub(super) delay: D,
    pub(super) irq: &'irq IrqFlag,
    pub(super) channels: [Channel; 2],
    pub(super) devices: [Option<Device>; MAX_DEVICES],
}

impl<'irq, P: PortIo, D: Delay> IdeController<'irq, P, D> {
    /// Sets up both channels with interrupts masked and probes all four slots.
    ///
    /// `irq` must be the flag the IDE interrupt handler notifies.
    pub fn new(bars: [u32; 5], ports: P, delay: D, irq: &'irq IrqFlag) -> Self {
        let mut controller = IdeController {
            ports,
            delay,
            irq,
            channels: resolve_channels(bars),
            devices: [None, None, None, None],
        };
        for channel in ChannelId::ALL {
            controller.set_interrupts(channel, false);
        }
        controller.detect();
        controller
    }

    /// Probes every (channel, drive) pair once and fills the registry.
    fn detect(&mut self) {
        for channel in ChannelId::ALL {
            for drive in DriveSelect::ALL {
                let slot = channel.index() * 2 + drive as usize;
                self.devices[slot] = self.probe(channel, drive);
            }
        }

        for device in self.devices() {
            let class = match device.class {
                DeviceClass::Ata => "ATA",
                DeviceClass::Atapi => "ATAPI",
            };
            info!("IDE: Found {} drive {}GB - {} (serial {}) [{} {}]",
                class, device.size() / 1024 / 1024 / 2, device.model(), device.serial(), device.channel, device.drive);
        }
    }

    fn probe(&mut self, channel: ChannelId, drive: DriveSelect) -> Option<Device> {
        self.write_reg(channel, Reg::HDDEVSEL, 0xA0 | drive.bit());
        self.delay.sleep_ms(1);
        self.write_reg(channel, Reg::COMMAND, AtaCommand::Identify as u8);
        self.delay.sleep_ms(1);

        if self.read_reg(channel, Reg::STATUS) == 0 {
            trace!("IDE: nothing attached at {} {}", channel, drive);
            return None;
        }

        let mut not_ata = false;
        loop {
            let status = self.status(channel);
            if status.contains(AtaStatus::ERROR) {
                not_ata = true;
                break;
            }
            if !status.contains(AtaStatus::BUSY) && status.contains(AtaStatus::DATA_REQUEST) {
                break;
            }
            core::hint::spin_loop();
        }

        let mut class = DeviceClass::Ata;
        if not_ata {
            let signature = (self.read_reg(channel, Reg::LBA1), self.read_reg(channel, Reg::LBA2));
            if !ATAPI_SIGNATURES.contains(&signature) {
                debug!("IDE: unknown device signature {:02x?} at {} {}", signature, channel, drive);
                return None;
            }
            class = DeviceClass::Atapi;
            self.write_reg(channel, Reg::COMMAND, AtaCommand::IdentifyPacket as u8);
            self.delay.sleep_ms(1);
        }

        let mut block = [0u8; IDENTIFY_BLOCK_SIZE];
        self.read_data(channel, &mut block);
        Some(Device {
            channel,
            drive,
            class,
            ident: IdentifyData::parse(&block),
        })
    }

    pub fn device(&self, index: usize) -> Option<&Device> {
        self.devices.get(index).and_then(Option::as_ref)
    }

    /// Present devices in slot order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().flatten()
    }

    pub fn channel(&self, channel: ChannelId) -> &Channel {
        &self.channels[channel.index()]
    }

    pub fn ports(&self) -> &P {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut P {
        &mut self.ports
    }

    /// Reads `count` sectors starting at `lba` into `buf`.
    ///
    /// `count == 0` means 256 sectors. ATA drives use 512-byte sectors,
    /// ATAPI drives 2048-byte sectors read one packet at a time.
    pub fn read_sectors(&mut self, index: usize, lba: u64, count: u8, buf: &mut [u8]) -> AtaResult<()> {
        let device = self.present(index)?;
        let sectors = sector_count(count);
        check_buffer(&device, sectors, buf.len())?;

        match device.class {
            DeviceClass::Ata => {
                check_range(&device, lba, sectors)?;
                let outcome = self.ata_access(&device, lba, sectors, PioBuffer::Read(buf));
                self.report(&device, outcome).map_or(Ok(()), Err)
            }
            DeviceClass::Atapi => {
                let Some(end) = lba.checked_add(sectors as u64).filter(|&end| end <= 1 << 32) else {
                    warn!("IDE: ATAPI read of {} sectors at {} is past the 32-bit LBA limit", sectors, lba);
                    return Err(AtaError::OutOfRange);
                };
                let chunks = buf.chunks_exact_mut(ATAPI_SECTOR_SIZE);
                for (sector_lba, chunk) in (lba..end).zip(chunks) {
                    let outcome = self.packet_read(&device, sector_lba as u32, 1, chunk);
                    if let Some(error) = self.report(&device, outcome) {
                        return Err(error);
                    }
                }
                Ok(())
            }
        }
    }

    /// Writes `count` sectors from `buf` starting at `lba`; ATA drives only.
    pub fn write_sectors(&mut self, index: usize, lba: u64, count: u8, buf: &[u8]) -> AtaResult<()> {
        let device = self.present(index)?;
        let sectors = sector_count(count);

        match device.class {
            DeviceClass::Ata => {
                check_buffer(&device, sectors, buf.len())?;
                check_range(&device, lba, sectors)?;
                let outcome = self.ata_access(&device, lba, sectors, PioBuffer::Write(buf));
                self.report(&device, outcome).map_or(Ok(()), Err)
            }
            DeviceClass::Atapi => Err(self.diagnose(&device, AtaError::WriteProtected)),
        }
    }

    /// Reads `count` 2048-byte sectors from an ATAPI drive with a single packet.
    pub fn atapi_read(&mut self, index: usize, lba: u32, count: u8, buf: &mut [u8]) -> AtaResult<()> {
        let device = self.present(index)?;
        if device.class != DeviceClass::Atapi {
            return Err(self.diagnose(&device, AtaError::ControllerError(ControllerErrorKind::CommandAborted)));
        }
        if count == 0 {
            return Err(AtaError::OutOfRange);
        }
        check_buffer(&device, count as u64, buf.len())?;
        let outcome = self.packet_read(&device, lba, count, buf);
        self.report(&device, outcome).map_or(Ok(()), Err)
    }

    /// Ejects the medium of an ATAPI drive.
    pub fn eject(&mut self, index: usize) -> AtaResult<()> {
        let device = self.present(index)?;
        match device.class {
            DeviceClass::Ata => {
                Err(self.diagnose(&device, AtaError::ControllerError(ControllerErrorKind::CommandAborted)))
            }
            DeviceClass::Atapi => {
                let outcome = self.packet_eject(&device);
                self.report(&device, outcome).map_or(Ok(()), Err)
            }
        }
    }

    fn present(&self, index: usize) -> AtaResult<Device> {
        self.device(index).cloned().ok_or(AtaError::DriveAbsent)
    }

    pub(super) fn read_reg(&mut self, channel: ChannelId, reg: Reg) -> u8 {
        self.channels[channel.index()].read(&mut self.ports, reg)
    }

    pub(super) fn write_reg(&mut self, channel: ChannelId, reg: Reg, value: u8) {
        self.channels[channel.index()].write(&mut self.ports, reg, value)
    }

    pub(super) fn status(&mut self, channel: ChannelId) -> AtaStatus {
        self.channels[channel.index()].status(&mut self.ports)
    }

    pub(super) fn read_data(&mut self, channel: ChannelId, buf: &mut [u8]) {
        self.channels[channel.index()].read_buffer(&mut self.ports, buf)
    }

    pub(super) fn write_data(&mut self, channel: ChannelId, buf: &[u8]) {
        self.channels[channel.index()].write_buffer(&mut self.ports, buf)
    }

    pub(super) fn set_interrupts(&mut self, channel: ChannelId, enabled: bool) {
        self.channels[channel.index()].set_interrupts(&mut self.ports, enabled)
    }
}

/// The sector count register treats 0 as 256.
fn sector_count(count: u8) -> u64 {
    if count == 0 { 256 } else { count as u64 }
}

fn check_range(device: &Device, lba: u64, sectors: u64) -> AtaResult<()> {
    match lba.checked_add(sectors) {
        Some(end) if end <= device.size() && end <= LBA48_LIMIT => Ok(()),
        _ => {
            warn!("IDE: sectors {}..+{} are outside {} ({} sectors)", lba, sectors, device.model(), device.size());
            Err(AtaError::OutOfRange)
        }
    }
}

fn check_buffer(device: &Device, sectors: u64, len: usize) -> AtaResult<()> {
    if (len as u64) < sectors * device.sector_size() as u64 {
        warn!("IDE: buffer of {} bytes cannot hold {} sectors", len, sectors);
        return Err(AtaError::BufferTooSmall);
    }
    Ok(())
}
