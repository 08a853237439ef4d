//! A simulated two-channel IDE controller for host tests.
//!
//! Decodes the legacy port ranges, keeps a task file per channel (with the
//! two-deep LBA48 FIFOs) and plays the drive side of IDENTIFY, PIO and
//! PACKET commands against sparse in-memory media.

use std::collections::BTreeMap;
use super::addressing::{CAPABILITY_LBA, HEADS_PER_CYLINDER, SECTORS_PER_TRACK};
use super::controller::{IdeController, ATAPI_SECTOR_SIZE, ATA_SECTOR_SIZE};
use super::hal::{Delay, PortIo};
use super::identify::*;
use super::irq::IrqFlag;
use super::regs::{AtaControl, AtaStatus};

const BASES: [u16; 2] = [0x1F0, 0x170];
const CTRLS: [u16; 2] = [0x3F6, 0x376];

const READY: u8 = AtaStatus::DRIVE_READY.bits() | AtaStatus::DRIVE_SEEK_COMPLETE.bits();
const READY_DRQ: u8 = READY | AtaStatus::DATA_REQUEST.bits();
const ABORTED: u8 = AtaStatus::DRIVE_READY.bits() | AtaStatus::ERROR.bits();
const ABRT: u8 = 0x04;

const ATA_SIGNATURE: u16 = 0x0040;
const ATAPI_SIGNATURE: u16 = 0x85C0;

/// Backing media for a simulated drive. Unwritten sectors read as zeros on
/// disks and as the low byte of their LBA on packet media.
pub struct Disk {
    model: &'static str,
    sectors: u64,
    lba: bool,
    lba48: bool,
    store: BTreeMap<u64, Vec<u8>>,
}

#[derive(Default)]
pub enum SimDrive {
    #[default]
    Absent,
    /// Aborts IDENTIFY with a signature that is neither ATA nor ATAPI.
    Unknown,
    Ata(Disk),
    Atapi(Disk),
}

impl SimDrive {
    pub fn ata(model: &'static str, sectors: u64, lba: bool, lba48: bool) -> SimDrive {
        SimDrive::Ata(Disk { model, sectors, lba, lba48, store: BTreeMap::new() })
    }

    pub fn atapi(model: &'static str, sectors: u64) -> SimDrive {
        SimDrive::Atapi(Disk { model, sectors, lba: true, lba48: false, store: BTreeMap::new() })
    }

    fn identify_block(&self) -> Vec<u8> {
        let (disk, signature) = match self {
            SimDrive::Ata(disk) => (disk, ATA_SIGNATURE),
            SimDrive::Atapi(disk) => (disk, ATAPI_SIGNATURE),
            SimDrive::Absent | SimDrive::Unknown => return vec![0; IDENTIFY_BLOCK_SIZE],
        };
        let capabilities = if disk.lba { CAPABILITY_LBA } else { 0 };
        let command_sets: u32 = if disk.lba48 { 1 << 26 } else { 0 };
        let max_lba = disk.sectors.min(0x0FFF_FFFF) as u32;

        let mut block = vec![0u8; IDENTIFY_BLOCK_SIZE];
        block[IDENT_DEVICETYPE..IDENT_DEVICETYPE + 2].copy_from_slice(&signature.to_le_bytes());
        encode_ata_string("SIM0001", &mut block[IDENT_SERIAL..IDENT_SERIAL + SERIAL_LEN]);
        encode_ata_string(disk.model, &mut block[IDENT_MODEL..IDENT_MODEL + MODEL_LEN]);
        block[IDENT_CAPABILITIES..IDENT_CAPABILITIES + 2].copy_from_slice(&capabilities.to_le_bytes());
        block[IDENT_MAX_LBA..IDENT_MAX_LBA + 4].copy_from_slice(&max_lba.to_le_bytes());
        block[IDENT_COMMANDSETS..IDENT_COMMANDSETS + 4].copy_from_slice(&command_sets.to_le_bytes());
        block[IDENT_MAX_LBA_EXT..IDENT_MAX_LBA_EXT + 8].copy_from_slice(&disk.sectors.to_le_bytes());
        block
    }

    fn load(&self, lba: u64) -> Vec<u8> {
        match self {
            SimDrive::Ata(disk) => disk.store.get(&lba).cloned().unwrap_or_else(|| vec![0; ATA_SECTOR_SIZE]),
            SimDrive::Atapi(disk) => {
                disk.store.get(&lba).cloned().unwrap_or_else(|| vec![lba as u8; ATAPI_SECTOR_SIZE])
            }
            SimDrive::Absent | SimDrive::Unknown => Vec::new(),
        }
    }

    fn store(&mut self, lba: u64, data: Vec<u8>) {
        if let SimDrive::Ata(disk) | SimDrive::Atapi(disk) = self {
            disk.store.insert(lba, data);
        }
    }

    fn sector(&self, lba: u64) -> Option<Vec<u8>> {
        match self {
            SimDrive::Ata(disk) | SimDrive::Atapi(disk) => disk.store.get(&lba).cloned(),
            SimDrive::Absent | SimDrive::Unknown => None,
        }
    }
}

/// One task-file register: the value last written and the one before it.
#[derive(Default, Clone, Copy)]
struct Fifo {
    cur: u8,
    prev: u8,
}

impl Fifo {
    fn push(&mut self, value: u8) {
        self.prev = self.cur;
        self.cur = value;
    }

    fn get(&self, hob: bool) -> u8 {
        if hob { self.prev } else { self.cur }
    }
}

#[derive(Default)]
enum Phase {
    #[default]
    Idle,
    DataIn { packet: bool, lba: u64, remaining: u64, block: Vec<u8>, pos: usize },
    DataOut { lba: u64, remaining: u64, block: Vec<u8> },
    Packet { bytes: Vec<u8> },
}

struct SimChannel {
    drives: [SimDrive; 2],
    selected: usize,
    devsel: u8,
    hob: bool,
    nien: bool,
    features: Fifo,
    seccount: Fifo,
    lba: [Fifo; 3],
    status: u8,
    forced_status: Option<u8>,
    error: u8,
    phase: Phase,
    pending_irqs: usize,
    fail_next: Option<(u8, u8)>,
    fail_packet: Option<u8>,
    fail_flush: bool,
    flushes: usize,
    packets: usize,
    ejects: usize,
    last_transfer: Option<(u8, u64, u64)>,
}

impl SimChannel {
    fn new() -> SimChannel {
        SimChannel {
            drives: Default::default(),
            selected: 0,
            devsel: 0xA0,
            hob: false,
            nien: false,
            features: Fifo::default(),
            seccount: Fifo::default(),
            lba: [Fifo::default(); 3],
            status: READY,
            forced_status: None,
            error: 0,
            phase: Phase::Idle,
            pending_irqs: 0,
            fail_next: None,
            fail_packet: None,
            fail_flush: false,
            flushes: 0,
            packets: 0,
            ejects: 0,
            last_transfer: None,
        }
    }

    fn drive(&self) -> &SimDrive {
        &self.drives[self.selected]
    }

    fn current_status(&self) -> u8 {
        if let Some(status) = self.forced_status {
            return status;
        }
        match self.drive() {
            SimDrive::Absent => 0,
            _ => self.status,
        }
    }

    fn read_register(&self, offset: u16) -> u8 {
        match offset {
            1 => if self.hob { 0 } else { self.error },
            2 => self.seccount.get(self.hob),
            3..=5 => self.lba[offset as usize - 3].get(self.hob),
            6 => self.devsel,
            _ => 0,
        }
    }

    fn write_register(&mut self, offset: u16, value: u8) {
        match offset {
            1 => self.features.push(value),
            2 => self.seccount.push(value),
            3..=5 => self.lba[offset as usize - 3].push(value),
            6 => {
                self.devsel = value;
                self.selected = ((value >> 4) & 1) as usize;
            }
            7 => self.command(value),
            _ => {}
        }
    }

    fn abort(&mut self) {
        self.status = ABORTED;
        self.error = ABRT;
    }

    fn command(&mut self, cmd: u8) {
        self.forced_status = None;
        self.phase = Phase::Idle;
        if matches!(self.drive(), SimDrive::Absent) {
            return;
        }
        if let Some((status, error)) = self.fail_next.take() {
            self.status = status;
            self.error = error;
            return;
        }

        match (self.drive(), cmd) {
            (SimDrive::Unknown, _) => {
                self.abort();
                self.lba[1].push(0x3C);
                self.lba[2].push(0xC3);
            }
            (SimDrive::Ata(_), 0xEC) | (SimDrive::Atapi(_), 0xA1) => {
                let block = self.drive().identify_block();
                self.phase = Phase::DataIn { packet: false, lba: 0, remaining: 1, block, pos: 0 };
                self.status = READY_DRQ;
            }
            (SimDrive::Atapi(_), 0xEC) => {
                self.abort();
                self.lba[1].push(0x14);
                self.lba[2].push(0xEB);
            }
            (SimDrive::Atapi(_), 0xA0) => {
                self.phase = Phase::Packet { bytes: Vec::new() };
                self.status = READY_DRQ;
            }
            (SimDrive::Ata(_), 0x20 | 0x24) => {
                let (lba, count) = self.decode_task_file(cmd == 0x24);
                self.last_transfer = Some((cmd, lba, count));
                let block = self.drive().load(lba);
                self.phase = Phase::DataIn { packet: false, lba, remaining: count, block, pos: 0 };
                self.status = READY_DRQ;
            }
            (SimDrive::Ata(_), 0x30 | 0x34) => {
                let (lba, count) = self.decode_task_file(cmd == 0x34);
                self.last_transfer = Some((cmd, lba, count));
                self.phase = Phase::DataOut { lba, remaining: count, block: Vec::new() };
                self.status = READY_DRQ;
            }
            (SimDrive::Ata(_), 0xE7 | 0xEA) => {
                self.flushes += 1;
                if self.fail_flush {
                    self.fail_flush = false;
                    self.abort();
                } else {
                    self.status = READY;
                }
            }
            _ => self.abort(),
        }
    }

    /// Start LBA and sector count of the command just issued.
    fn decode_task_file(&self, ext: bool) -> (u64, u64) {
        if ext {
            let count = (self.seccount.prev as u64) << 8 | self.seccount.cur as u64;
            let lba = (0..3).fold(0u64, |acc, i| {
                acc | (self.lba[i].cur as u64) << (8 * i) | (self.lba[i].prev as u64) << (8 * i + 24)
            });
            return (lba, if count == 0 { 65_536 } else { count });
        }

        let count = if self.seccount.cur == 0 { 256 } else { self.seccount.cur as u64 };
        let head = (self.devsel & 0x0F) as u64;
        let lba = if self.devsel & 0x40 != 0 {
            self.lba[0].cur as u64 | (self.lba[1].cur as u64) << 8 | (self.lba[2].cur as u64) << 16 | head << 24
        } else {
            let cylinder = self.lba[1].cur as u64 | (self.lba[2].cur as u64) << 8;
            let sector = self.lba[0].cur as u64;
            (cylinder * HEADS_PER_CYLINDER + head) * SECTORS_PER_TRACK + sector.saturating_sub(1)
        };
        (lba, count)
    }

    fn read_word(&mut self) -> u16 {
        let Phase::DataIn { packet, lba, remaining, block, pos } = &mut self.phase else {
            return 0;
        };
        let word = u16::from_le_bytes([block[*pos], block[*pos + 1]]);
        *pos += 2;
        if *pos == block.len() {
            let packet = *packet;
            *remaining -= 1;
            *lba += 1;
            if *remaining > 0 {
                *block = self.drives[self.selected].load(*lba);
                *pos = 0;
            } else {
                self.phase = Phase::Idle;
                self.status = READY;
            }
            if packet {
                self.pending_irqs += 1;
            }
        }
        word
    }

    fn write_word(&mut self, word: u16) {
        match &mut self.phase {
            Phase::DataOut { lba, remaining, block } => {
                block.extend_from_slice(&word.to_le_bytes());
                if block.len() == ATA_SECTOR_SIZE {
                    let data = core::mem::take(block);
                    self.drives[self.selected].store(*lba, data);
                    *lba += 1;
                    *remaining -= 1;
                    if *remaining == 0 {
                        self.phase = Phase::Idle;
                        self.status = READY;
                    }
                }
            }
            Phase::Packet { bytes } => {
                bytes.extend_from_slice(&word.to_le_bytes());
                if bytes.len() == 12 {
                    let packet = core::mem::take(bytes);
                    self.run_packet(&packet);
                }
            }
            _ => {}
        }
    }

    fn run_packet(&mut self, packet: &[u8]) {
        self.packets += 1;
        self.pending_irqs += 1;
        if let Some(error) = self.fail_packet.take() {
            self.phase = Phase::Idle;
            self.status = ABORTED;
            self.error = error;
            return;
        }
        match packet[0] {
            0xA8 => {
                let lba = u32::from_be_bytes([packet[2], packet[3], packet[4], packet[5]]) as u64;
                let count = packet[9] as u64;
                self.last_transfer = Some((0xA8, lba, count));
                if count == 0 {
                    self.phase = Phase::Idle;
                    self.status = READY;
                } else {
                    let block = self.drive().load(lba);
                    self.phase = Phase::DataIn { packet: true, lba, remaining: count, block, pos: 0 };
                    self.status = READY_DRQ;
                }
            }
            0x1B => {
                self.ejects += 1;
                self.phase = Phase::Idle;
                self.status = READY;
            }
            _ => {
                self.phase = Phase::Idle;
                self.abort();
            }
        }
    }
}

enum Window {
    Command(u16),
    Control(u16),
}

fn decode(port: u16) -> Option<(usize, Window)> {
    for ch in 0..2 {
        if (BASES[ch]..BASES[ch] + 8).contains(&port) {
            return Some((ch, Window::Command(port - BASES[ch])));
        }
        if (CTRLS[ch]..CTRLS[ch] + 2).contains(&port) {
            return Some((ch, Window::Control(port - CTRLS[ch])));
        }
    }
    None
}

/// The simulated controller, seen by the driver through [`PortIo`].
pub struct SimBus<'irq> {
    irq: &'irq IrqFlag,
    channels: [SimChannel; 2],
    busy_polls: u32,
    status_reads: usize,
    accesses: usize,
    irqs_raised: usize,
    writes: Vec<(u16, u8)>,
}

impl<'irq> SimBus<'irq> {
    pub fn new(irq: &'irq IrqFlag) -> Self {
        SimBus {
            irq,
            channels: [SimChannel::new(), SimChannel::new()],
            busy_polls: 0,
            status_reads: 0,
            accesses: 0,
            irqs_raised: 0,
            writes: Vec::new(),
        }
    }

    pub fn attach(&mut self, channel: usize, drive: usize, sim: SimDrive) {
        self.channels[channel].drives[drive] = sim;
    }

    /// The next `polls` reads of a status register report BSY.
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    /// Pins the status register until the next command.
    pub fn force_status(&mut self, channel: usize, status: u8) {
        self.channels[channel].forced_status = Some(status);
    }

    pub fn force_error(&mut self, channel: usize, bits: u8) {
        self.channels[channel].error = bits;
    }

    /// The next command on `channel` ends immediately with `status`/`error`.
    pub fn fail_next_command(&mut self, channel: usize, status: u8, error: u8) {
        self.channels[channel].fail_next = Some((status, error));
    }

    /// The next packet on `channel` is rejected with ERR and `error` once received.
    pub fn fail_next_packet(&mut self, channel: usize, error: u8) {
        self.channels[channel].fail_packet = Some(error);
    }

    pub fn fail_flush(&mut self, channel: usize) {
        self.channels[channel].fail_flush = true;
    }

    pub fn status_reads(&self) -> usize {
        self.status_reads
    }

    pub fn accesses(&self) -> usize {
        self.accesses
    }

    pub fn irqs_raised(&self) -> usize {
        self.irqs_raised
    }

    pub fn writes(&self) -> &[(u16, u8)] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// `(opcode, lba, sectors)` of the last data command on `channel`.
    pub fn last_transfer(&self, channel: usize) -> Option<(u8, u64, u64)> {
        self.channels[channel].last_transfer
    }

    pub fn flushes(&self, channel: usize) -> usize {
        self.channels[channel].flushes
    }

    pub fn packets(&self, channel: usize) -> usize {
        self.channels[channel].packets
    }

    pub fn ejects(&self, channel: usize) -> usize {
        self.channels[channel].ejects
    }

    /// ATAPI byte-count limit currently in LBA1/LBA2.
    pub fn byte_count_limit(&self, channel: usize) -> u16 {
        let ch = &self.channels[channel];
        (ch.lba[2].cur as u16) << 8 | ch.lba[1].cur as u16
    }

    pub fn sector(&self, channel: usize, drive: usize, lba: u64) -> Option<Vec<u8>> {
        self.channels[channel].drives[drive].sector(lba)
    }

    fn deliver(&mut self, channel: usize) {
        let ch = &mut self.channels[channel];
        let pending = core::mem::take(&mut ch.pending_irqs);
        if pending > 0 && !ch.nien {
            self.irqs_raised += pending;
            self.irq.notify();
        }
    }
}

impl PortIo for SimBus<'_> {
    fn inb(&mut self, port: u16) -> u8 {
        self.accesses += 1;
        let Some((channel, window)) = decode(port) else {
            return 0xFF;
        };
        let ch = &self.channels[channel];
        match window {
            Window::Control(0) => ch.current_status(),
            Window::Control(_) => 0,
            Window::Command(7) => {
                self.status_reads += 1;
                if self.busy_polls > 0 {
                    self.busy_polls -= 1;
                    return AtaStatus::BUSY.bits();
                }
                ch.current_status()
            }
            Window::Command(offset) => ch.read_register(offset),
        }
    }

    fn outb(&mut self, port: u16, value: u8) {
        self.accesses += 1;
        self.writes.push((port, value));
        let Some((channel, window)) = decode(port) else {
            return;
        };
        let ch = &mut self.channels[channel];
        match window {
            Window::Control(0) => {
                let control = AtaControl::from_bits_truncate(value);
                ch.hob = control.contains(AtaControl::HOB);
                ch.nien = control.contains(AtaControl::NIEN);
            }
            Window::Control(_) => {}
            Window::Command(offset) => ch.write_register(offset, value),
        }
        self.deliver(channel);
    }

    fn inw(&mut self, port: u16) -> u16 {
        self.accesses += 1;
        let Some((channel, Window::Command(0))) = decode(port) else {
            return 0xFFFF;
        };
        let word = self.channels[channel].read_word();
        self.deliver(channel);
        word
    }

    fn outw(&mut self, port: u16, value: u16) {
        self.accesses += 1;
        if let Some((channel, Window::Command(0))) = decode(port) {
            self.channels[channel].write_word(value);
            self.deliver(channel);
        }
    }
}

pub struct NoDelay;

impl Delay for NoDelay {
    fn sleep_ms(&mut self, _ms: u32) {}
}

/// A controller on the legacy ports of `bus`, detection already run.
pub fn controller<'a>(bus: SimBus<'a>, irq: &'a IrqFlag) -> IdeController<'a, SimBus<'a>, NoDelay> {
    IdeController::new([0; 5], bus, NoDelay, irq)
}
