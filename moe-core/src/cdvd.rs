//! CD/DVD drive: N-command seek/read state machine, S-command query queue,
//! and the DMA data port the IOP DMAC drains.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::bus::Bus;
use crate::intc::IopInterrupt;
use crate::iop::dmac as iop_dmac;
use crate::scheduler::EventId;

pub const IOP_CLOCK: i64 = 36_864_000;
const READ_SPEED_CD: i64 = 24 * 153_600;
const READ_SPEED_DVD: i64 = 4 * 1_382_400;

const SECTOR_SIZE_DVD: i64 = 2064;

/* Register window (0x1F402004..0x1F402018) */
const NCMD: u32 = 0x1F40_2004;
const NCMDSTAT: u32 = 0x1F40_2005;
const NCMDPARAM: u32 = 0x1F40_2005;
const ERROR: u32 = 0x1F40_2006;
const MODE: u32 = 0x1F40_2006;
const BREAK: u32 = 0x1F40_2007;
const ISTAT: u32 = 0x1F40_2008;
const DRIVESTAT: u32 = 0x1F40_200A;
const STICKYSTAT: u32 = 0x1F40_200B;
const DISCTYPE: u32 = 0x1F40_200F;
const SCMD: u32 = 0x1F40_2016;
const SCMDSTAT: u32 = 0x1F40_2017;
const SCMDPARAM: u32 = 0x1F40_2017;
const SCMDDATA: u32 = 0x1F40_2018;

/* N commands */
const NCMD_READ_CD: u8 = 0x06;
const NCMD_READ_DVD: u8 = 0x08;

/* S commands */
const SCMD_MECHACON_VERSION: u8 = 0x03;
const SCMD_UPDATE_STICKY_FLAGS: u8 = 0x05;
const SCMD_READ_RTC: u8 = 0x08;

/* N-command status */
const NCMDSTAT_READY: u8 = 1 << 6;
const NCMDSTAT_BUSY: u8 = 1 << 7;

/* S-command status */
const SCMDSTAT_NODATA: u8 = 1 << 6;

/* Drive status */
const DRIVESTAT_SPINNING: u8 = 1 << 1;
const DRIVESTAT_READING: u8 = 1 << 2;
const DRIVESTAT_PAUSED: u8 = 1 << 3;
const DRIVESTAT_SEEKING: u8 = 1 << 4;

/* ISTAT bits */
const ISTAT_NCMD_DONE: u8 = 1 << 0;

#[derive(Clone, Copy, Default)]
struct SeekParam {
    pos: i64,
    num: i64,
    size: i64,
    sector_num: i64,
    old_sector_num: i64,
}

pub struct Cdvd {
    file: Option<File>,
    is_dvd: bool,

    seek: SeekParam,

    read_buf: [u8; SECTOR_SIZE_DVD as usize],
    read_idx: usize,

    ncmd: u8,
    ncmd_param: VecDeque<u8>,
    ncmd_stat: u8,

    scmd: u8,
    scmd_param: VecDeque<u8>,
    scmd_stat: u8,
    scmd_data: VecDeque<u8>,

    drive_stat: u8,
    sticky_stat: u8,
    istat: u8,

    pub id_finish_seek: EventId,
    pub id_request_dma: EventId,
}

impl Cdvd {
    pub fn new(file: Option<File>, id_finish_seek: EventId, id_request_dma: EventId) -> Self {
        Self {
            file,
            is_dvd: false,
            seek: SeekParam::default(),
            read_buf: [0; SECTOR_SIZE_DVD as usize],
            read_idx: 0,
            ncmd: 0,
            ncmd_param: VecDeque::new(),
            ncmd_stat: NCMDSTAT_READY,
            scmd: 0,
            scmd_param: VecDeque::new(),
            scmd_stat: SCMDSTAT_NODATA,
            scmd_data: VecDeque::new(),
            drive_stat: DRIVESTAT_PAUSED,
            sticky_stat: DRIVESTAT_PAUSED,
            istat: 0,

            id_finish_seek,
            id_request_dma,
        }
    }

    pub fn sector_size(&self) -> i64 {
        self.seek.size
    }

    fn read_speed(&self) -> i64 {
        if self.is_dvd {
            READ_SPEED_DVD
        } else {
            READ_SPEED_CD
        }
    }

    /// EE cycles spent reading one sector off the disc.
    fn block_cycles(&self) -> i64 {
        8 * IOP_CLOCK * self.seek.size / self.read_speed()
    }

    /// Searches the first 512 sectors for the `BOOT2 = cdrom0:\` line and
    /// returns the 23-byte boot executable path.
    pub fn exec_path(&mut self) -> [u8; 23] {
        let mut path = *b"cdrom0:\\\\XXXX_000.00;1\0";

        let file = self.file.as_mut().expect("[CDVD] no disc image");

        let mut buf = [0u8; 64];

        for sector in 0..512 {
            if file.seek(SeekFrom::Start(2048 * sector)).is_err() {
                break;
            }
            if file.read_exact(&mut buf).is_err() {
                break;
            }

            if &buf[..16] != b"BOOT2 = cdrom0:\\" {
                continue;
            }

            path[9..20].copy_from_slice(&buf[16..27]);

            tracing::info!(
                target: "moe_core::cdvd",
                "executable path: {:?}", std::str::from_utf8(&path[..22]).unwrap_or("?")
            );

            return path;
        }

        panic!("[CDVD] unable to find executable path");
    }
}

/* --- register file --- */

pub fn read(bus: &mut Bus, addr: u32) -> u8 {
    let cdvd = &mut bus.cdvd;

    match addr {
        NCMD => cdvd.ncmd,
        NCMDSTAT => cdvd.ncmd_stat,
        ERROR => 0,
        ISTAT => cdvd.istat,
        DRIVESTAT => cdvd.drive_stat,
        STICKYSTAT => cdvd.sticky_stat,
        DISCTYPE => {
            if cdvd.is_dvd {
                0x14
            } else {
                0x12
            }
        }
        SCMD => cdvd.scmd,
        SCMDSTAT => cdvd.scmd_stat,
        SCMDDATA => {
            let data = cdvd.scmd_data.pop_front().unwrap_or(0);

            if cdvd.scmd_data.is_empty() {
                cdvd.scmd_stat |= SCMDSTAT_NODATA;
            }

            data
        }
        _ => panic!("[CDVD] unhandled 8-bit read @ {addr:#010X}"),
    }
}

pub fn write(bus: &mut Bus, addr: u32, data: u8) {
    match addr {
        NCMD => do_ncmd(bus, data),
        NCMDPARAM => bus.cdvd.ncmd_param.push_back(data),
        MODE => tracing::trace!(target: "moe_core::cdvd", "MODE = {data:#04X}"),
        BREAK => tracing::warn!(target: "moe_core::cdvd", "BREAK"),
        ISTAT => bus.cdvd.istat &= !data,
        SCMD => do_scmd(bus, data),
        SCMDPARAM => bus.cdvd.scmd_param.push_back(data),
        _ => panic!("[CDVD] unhandled 8-bit write @ {addr:#010X} = {data:#04X}"),
    }
}

/* --- N commands --- */

fn do_ncmd(bus: &mut Bus, cmd: u8) {
    bus.cdvd.ncmd = cmd;
    bus.cdvd.ncmd_stat = NCMDSTAT_BUSY;

    match cmd {
        NCMD_READ_CD => read_disc(bus, false),
        NCMD_READ_DVD => read_disc(bus, true),
        _ => panic!("[CDVD] unhandled N command {cmd:#04X}"),
    }

    bus.cdvd.ncmd_param.clear();
}

/// ReadCD/ReadDVD: POS (4), NUM (4), two unused bytes, sector size.
fn read_disc(bus: &mut Bus, is_dvd: bool) {
    let cdvd = &mut bus.cdvd;

    let mut param = [0u8; 11];
    for byte in &mut param {
        *byte = cdvd.ncmd_param.pop_front().expect("[CDVD] short ReadCD/ReadDVD parameters");
    }

    let pos = i32::from_le_bytes(param[0..4].try_into().unwrap());
    let num = i32::from_le_bytes(param[4..8].try_into().unwrap());

    if pos < 0 {
        panic!("[CDVD] negative seek position {pos}");
    }

    cdvd.is_dvd = is_dvd;

    cdvd.seek.pos = pos as i64;
    cdvd.seek.num = num as i64;
    cdvd.seek.sector_num = 0;

    cdvd.seek.size = if is_dvd {
        SECTOR_SIZE_DVD
    } else {
        match param[10] {
            0 => 2048,
            1 => 2328,
            _ => 2340,
        }
    };

    tracing::info!(
        target: "moe_core::cdvd",
        "{}: POS = {pos}, NUM = {num}, size = {}",
        if is_dvd { "ReadDVD" } else { "ReadCD" },
        cdvd.seek.size
    );

    do_seek(bus);
}

fn do_seek(bus: &mut Bus) {
    let cdvd = &mut bus.cdvd;

    let delta = (cdvd.seek.pos - cdvd.seek.old_sector_num).abs();

    let (contiguous, fast) = if cdvd.is_dvd { (16, 14764) } else { (8, 4371) };

    // Per-block read time, in IOP cycles.
    let block = IOP_CLOCK * cdvd.seek.size / cdvd.read_speed();

    let seek_cycles = if delta < contiguous {
        block * delta
    } else if delta < fast {
        IOP_CLOCK / 33
    } else {
        IOP_CLOCK / 10
    };

    tracing::debug!(
        target: "moe_core::cdvd",
        "seek: delta = {delta}, cycles = {seek_cycles}"
    );

    cdvd.drive_stat = if delta > 0 {
        DRIVESTAT_SEEKING | DRIVESTAT_SPINNING
    } else {
        DRIVESTAT_READING | DRIVESTAT_SPINNING
    };

    cdvd.seek.old_sector_num = cdvd.seek.pos;

    let id = cdvd.id_finish_seek;
    bus.scheduler.add_event(id, 0, (8 * seek_cycles).max(1), true);
}

/// Seek done: pulls one sector into the read buffer, then arms the DMA
/// request one block time later.
pub(crate) fn finish_seek(bus: &mut Bus, _param: i32, _residual: i64) {
    let cdvd = &mut bus.cdvd;

    let offset = cdvd.seek.size * (cdvd.seek.pos + cdvd.seek.sector_num);
    let size = cdvd.seek.size as usize;

    let file = cdvd.file.as_mut().expect("[CDVD] no disc image");

    file.seek(SeekFrom::Start(offset as u64)).expect("[CDVD] seek past end of disc image");
    file.read_exact(&mut cdvd.read_buf[..size]).expect("[CDVD] short disc read");

    cdvd.read_idx = 0;
    cdvd.drive_stat = DRIVESTAT_READING | DRIVESTAT_SPINNING;

    let id = cdvd.id_request_dma;
    let block = cdvd.block_cycles();
    bus.scheduler.add_event(id, 0, block, true);
}

/// The sector is ready for the IOP DMAC.
pub(crate) fn request_dma(bus: &mut Bus, _param: i32, _residual: i64) {
    iop_dmac::set_drq(bus, iop_dmac::Channel::Cdvd, true);
}

/// 32-bit data port read; feeds the CDVD DMA channel.
pub fn read_dmac(bus: &mut Bus) -> u32 {
    let cdvd = &mut bus.cdvd;

    let idx = cdvd.read_idx;
    let data = u32::from_le_bytes(cdvd.read_buf[idx..idx + 4].try_into().unwrap());

    cdvd.read_idx += 4;

    if cdvd.read_idx as i64 == cdvd.seek.size {
        cdvd.seek.sector_num += 1;

        if cdvd.seek.sector_num == cdvd.seek.num {
            // All sectors delivered.
            cdvd.seek.old_sector_num = cdvd.seek.pos + cdvd.seek.sector_num;
            cdvd.seek.sector_num = 0;

            cdvd.drive_stat = DRIVESTAT_PAUSED | DRIVESTAT_SPINNING;
            cdvd.ncmd_stat = NCMDSTAT_READY;
            cdvd.istat |= ISTAT_NCMD_DONE;

            bus.intc.send_interrupt_iop(IopInterrupt::Cdvd);
        } else {
            finish_seek(bus, 0, 0);
        }
    }

    data
}

/* --- S commands --- */

fn do_scmd(bus: &mut Bus, cmd: u8) {
    let cdvd = &mut bus.cdvd;

    cdvd.scmd = cmd;
    cdvd.scmd_data.clear();

    match cmd {
        SCMD_MECHACON_VERSION => {
            let sub = cdvd.scmd_param.pop_front().unwrap_or(0);

            match sub {
                0x00 => cdvd.scmd_data.extend([0x03, 0x06, 0x02, 0x00]),
                _ => panic!("[CDVD] unhandled Mechacon subcommand {sub:#04X}"),
            }
        }
        SCMD_UPDATE_STICKY_FLAGS => {
            cdvd.sticky_stat = cdvd.drive_stat;

            cdvd.scmd_data.push_back(0);
        }
        SCMD_READ_RTC => {
            // Status, seconds, minutes, hours, pad, day, month, year.
            cdvd.scmd_data.extend([0, 0, 0, 0, 0, 1, 1, 0]);
        }
        _ => panic!("[CDVD] unhandled S command {cmd:#04X}"),
    }

    cdvd.scmd_param.clear();

    if !cdvd.scmd_data.is_empty() {
        cdvd.scmd_stat &= !SCMDSTAT_NODATA;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use std::io::Write as _;

    fn disc_with_pattern(sector: u64, pattern: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("moe-cdvd-test-{sector}-{}.iso", std::process::id()));

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&vec![0u8; (2048 * sector) as usize]).unwrap();
        file.write_all(pattern).unwrap();
        // Pad so short reads cannot happen.
        file.write_all(&vec![0u8; 4096]).unwrap();

        path
    }

    /// ReadCD of one sector delivers the sector through the
    /// DMA port and raises the CDVD interrupt with the last word.
    #[test]
    fn read_cd_delivers_a_sector_and_interrupts() {
        let pattern: Vec<u8> = (0..2048u32).map(|i| i as u8).collect();
        let path = disc_with_pattern(100, &pattern);

        let mut bus = Bus::new(vec![0; 0x40_0000], Some(std::fs::File::open(&path).unwrap()));

        // ReadCD: pos = 100, num = 1, size enum 0 (2048).
        for byte in 100u32.to_le_bytes() {
            write(&mut bus, NCMDPARAM, byte);
        }
        for byte in 1u32.to_le_bytes() {
            write(&mut bus, NCMDPARAM, byte);
        }
        write(&mut bus, NCMDPARAM, 0);
        write(&mut bus, NCMDPARAM, 0);
        write(&mut bus, NCMDPARAM, 0);

        write(&mut bus, NCMD, NCMD_READ_CD);
        assert_eq!(read(&mut bus, NCMDSTAT), NCMDSTAT_BUSY);
        assert_eq!(read(&mut bus, DRIVESTAT), DRIVESTAT_SEEKING | DRIVESTAT_SPINNING);

        // Let the seek and the block read complete.
        for _ in 0..20_000 {
            bus.process_events(10_000);
        }
        assert!(bus.iop_dmac.channels[iop_dmac::Channel::Cdvd as usize].drq);

        for i in 0..512u32 {
            let expected = u32::from_le_bytes(
                pattern[(4 * i) as usize..(4 * i + 4) as usize].try_into().unwrap(),
            );
            assert_eq!(read_dmac(&mut bus), expected, "word {i}");
        }

        assert_eq!(read(&mut bus, DRIVESTAT), DRIVESTAT_PAUSED | DRIVESTAT_SPINNING);
        assert_eq!(read(&mut bus, NCMDSTAT), NCMDSTAT_READY);
        assert_eq!(bus.intc.read_i_stat() & (1 << 2), 1 << 2);
        assert_eq!(read(&mut bus, ISTAT) & ISTAT_NCMD_DONE, ISTAT_NCMD_DONE);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn s_commands_queue_responses_and_track_nodata() {
        let mut bus = Bus::new(vec![0; 0x40_0000], None);

        assert_eq!(read(&mut bus, SCMDSTAT) & SCMDSTAT_NODATA, SCMDSTAT_NODATA);

        write(&mut bus, SCMDPARAM, 0x00);
        write(&mut bus, SCMD, SCMD_MECHACON_VERSION);

        assert_eq!(read(&mut bus, SCMDSTAT) & SCMDSTAT_NODATA, 0);
        assert_eq!(read(&mut bus, SCMDDATA), 0x03);
        assert_eq!(read(&mut bus, SCMDDATA), 0x06);
        assert_eq!(read(&mut bus, SCMDDATA), 0x02);
        assert_eq!(read(&mut bus, SCMDDATA), 0x00);
        assert_eq!(read(&mut bus, SCMDSTAT) & SCMDSTAT_NODATA, SCMDSTAT_NODATA);
    }

    #[test]
    fn update_sticky_flags_copies_the_drive_status() {
        let mut bus = Bus::new(vec![0; 0x40_0000], None);

        bus.cdvd.drive_stat = DRIVESTAT_READING | DRIVESTAT_SPINNING;
        write(&mut bus, SCMD, SCMD_UPDATE_STICKY_FLAGS);

        assert_eq!(read(&mut bus, STICKYSTAT), DRIVESTAT_READING | DRIVESTAT_SPINNING);
        assert_eq!(read(&mut bus, SCMDDATA), 0);
    }

    #[test]
    #[should_panic(expected = "negative seek position")]
    fn negative_position_is_fatal() {
        let mut bus = Bus::new(vec![0; 0x40_0000], None);

        for byte in (-5i32).to_le_bytes() {
            write(&mut bus, NCMDPARAM, byte);
        }
        for _ in 0..7 {
            write(&mut bus, NCMDPARAM, 0);
        }

        write(&mut bus, NCMD, NCMD_READ_CD);
    }
}
