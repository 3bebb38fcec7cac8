//! IOP DMA controller: 13 channels, the SIF0/SIF1 chain walkers and the
//! CDVD block engine.

use proc_bitfield::bitfield;

use crate::bus::Bus;
use crate::cdvd;
use crate::ee::dmac as ee_dmac;
use crate::intc::IopInterrupt;

/// IOP DMA channels, in register-bank order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    MdecIn = 0,
    MdecOut = 1,
    Sif2 = 2,
    Cdvd = 3,
    Spu1 = 4,
    Pio = 5,
    Otc = 6,
    Spu2 = 7,
    Dev9 = 8,
    Sif0 = 9,
    Sif1 = 10,
    Sio2In = 11,
    Sio2Out = 12,
}

pub const CHANNEL_NAMES: [&str; 13] = [
    "MDEC_IN", "MDEC_OUT", "SIF2", "CDVD", "SPU1", "PIO", "OTC", "SPU2", "DEV9", "SIF0", "SIF1",
    "SIO2_IN", "SIO2_OUT",
];

/* Channel registers (addr & !0xFF0) */
const MADR: u32 = 0x1F80_1000;
const BCR: u32 = 0x1F80_1004;
const CHCR: u32 = 0x1F80_1008;
const TADR: u32 = 0x1F80_100C;

/* Control registers */
pub const DPCR: u32 = 0x1F80_10F0;
pub const DICR: u32 = 0x1F80_10F4;
pub const DPCR2: u32 = 0x1F80_1570;
pub const DICR2: u32 = 0x1F80_1574;
pub const DMACEN: u32 = 0x1F80_1578;
pub const DMACINTEN: u32 = 0x1F80_157C;

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ChannelControl(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub dir: bool @ 0,
        pub dec: bool @ 1,
        pub tte: bool @ 8,
        pub mode: u8 @ 9..=10,
        pub cpd: u8 @ 16..=18,
        pub cpc: u8 @ 20..=22,
        pub str: bool @ 24,
        pub fst: bool @ 28,
        pub spf: bool @ 30,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Dicr(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub sie: u8 @ 0..=6,
        pub bef: bool @ 15,
        pub im: u8 @ 16..=22,
        pub mie: bool @ 23,
        pub ip: u8 @ 24..=30,
        pub mif: bool @ 31,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Dicr2(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub tie: u16 @ 0..=15,
        pub im: u8 @ 16..=21,
        pub ip: u8 @ 24..=29,
    }
}

#[derive(Clone, Copy)]
pub struct DmaChannel {
    pub chcr: ChannelControl,

    pub size: u16,
    pub count: u16,
    pub madr: u32,
    pub tadr: u32,

    /// Remaining transfer length in words (`size * count`, or tag-driven).
    pub len: u32,

    pub drq: bool,
    pub is_tag_end: bool,
}

impl DmaChannel {
    fn new() -> Self {
        Self {
            chcr: ChannelControl(0),
            size: 0,
            count: 0,
            madr: 0,
            tadr: 0,
            len: 0,
            drq: false,
            is_tag_end: false,
        }
    }
}

pub struct IopDmac {
    pub channels: [DmaChannel; 13],

    pub dicr: Dicr,
    pub dicr2: Dicr2,
    dpcr: u32,
    dpcr2: u32,

    dmacen: bool,

    /// DMACINTEN: channel interrupt enable / master interrupt disable.
    cie: bool,
    mid: bool,

    pub id_transfer_end: crate::scheduler::EventId,
    pub id_sif0_start: crate::scheduler::EventId,
    pub id_sif1_start: crate::scheduler::EventId,
}

fn channel_from_addr(addr: u32) -> Channel {
    match (addr >> 4) & 0xFF {
        0x08 => Channel::MdecIn,
        0x09 => Channel::MdecOut,
        0x0A => Channel::Sif2,
        0x0B => Channel::Cdvd,
        0x0C => Channel::Spu1,
        0x0D => Channel::Pio,
        0x0E => Channel::Otc,
        0x50 => Channel::Spu2,
        0x51 => Channel::Dev9,
        0x52 => Channel::Sif0,
        0x53 => Channel::Sif1,
        0x54 => Channel::Sio2In,
        0x55 => Channel::Sio2Out,
        _ => panic!("[DMAC:IOP] unknown channel @ {addr:#010X}"),
    }
}

fn is_channel_reg(addr: u32) -> bool {
    addr < DPCR || (addr > DICR + 3 && addr < DPCR2)
}

impl IopDmac {
    /// Event IDs are wired afterwards by the bus, which owns the scheduler.
    pub fn new(
        id_transfer_end: crate::scheduler::EventId,
        id_sif0_start: crate::scheduler::EventId,
        id_sif1_start: crate::scheduler::EventId,
    ) -> Self {
        let mut channels = [DmaChannel::new(); 13];

        for chn in [Channel::MdecIn, Channel::Sif2, Channel::Sif0, Channel::Sio2In] {
            channels[chn as usize].drq = true;
        }

        Self {
            channels,
            dicr: Dicr(0),
            dicr2: Dicr2(0),
            dpcr: 0,
            dpcr2: 0,
            dmacen: false,
            cie: true,
            mid: false,
            id_transfer_end,
            id_sif0_start,
            id_sif1_start,
        }
    }

    fn channel_enabled(&self, id: usize) -> bool {
        if id < 7 {
            self.dpcr & (1 << (4 * id + 3)) != 0
        } else {
            self.dpcr2 & (1 << (4 * (id - 7) + 3)) != 0
        }
    }
}

/* --- scheduler callbacks --- */

pub(crate) fn transfer_end_event(bus: &mut Bus, chn_id: i32, _residual: i64) {
    let id = chn_id as usize;

    tracing::debug!(target: "moe_core::iop::dmac", "{} transfer end", CHANNEL_NAMES[id]);

    let chn = &mut bus.iop_dmac.channels[id];

    chn.is_tag_end = false;
    chn.chcr.set_str(false);

    if id < 7 {
        if bus.iop_dmac.dicr.im() & (1 << id) != 0 {
            let ip = bus.iop_dmac.dicr.ip();
            bus.iop_dmac.dicr.set_ip(ip | 1 << id);
        }
    } else if bus.iop_dmac.dicr2.im() & (1 << (id - 7)) != 0 {
        let ip = bus.iop_dmac.dicr2.ip();
        bus.iop_dmac.dicr2.set_ip(ip | 1 << (id - 7));
    }

    check_interrupt(bus);
}

pub(crate) fn sif0_start_event(bus: &mut Bus, _param: i32, _residual: i64) {
    ee_dmac::set_drq(bus, ee_dmac::Channel::Sif0, true);
}

pub(crate) fn sif1_start_event(bus: &mut Bus, _param: i32, _residual: i64) {
    ee_dmac::set_drq(bus, ee_dmac::Channel::Sif1, true);
}

/* --- interrupt plumbing --- */

/// Recomputes the master interrupt flag; a rising edge interrupts the IOP.
fn check_interrupt(bus: &mut Bus) {
    let dmac = &mut bus.iop_dmac;

    let old_mif = dmac.dicr.mif();

    let mif = dmac.cie
        && (dmac.dicr.bef() || (dmac.dicr.mie() && (dmac.dicr.ip() != 0 || dmac.dicr2.ip() != 0)));

    dmac.dicr.set_mif(mif);

    if !old_mif && mif && !dmac.mid {
        bus.intc.send_interrupt_iop(IopInterrupt::Dma);
    }
}

/* --- transfer engines --- */

/// SIF0: walks the chain in IOP RAM and pushes words toward the EE.
fn do_sif0(bus: &mut Bus) {
    let id = Channel::Sif0 as usize;

    tracing::debug!(target: "moe_core::iop::dmac", "SIF0 transfer");

    let chcr = bus.iop_dmac.channels[id].chcr;
    assert!(!chcr.dec());
    assert!(chcr.tte());

    if bus.iop_dmac.channels[id].len == 0 {
        let tadr = bus.iop_dmac.channels[id].tadr;

        let tag =
            bus.iop_dma_read32(tadr) as u64 | ((bus.iop_dma_read32(tadr + 4) as u64) << 32);

        // The EE tag travels in front of the data.
        let ee_tag_lo = bus.iop_dma_read32(tadr + 8);
        let ee_tag_hi = bus.iop_dma_read32(tadr + 12);
        bus.sif.write_sif0(ee_tag_lo);
        bus.sif.write_sif0(ee_tag_hi);

        let chn = &mut bus.iop_dmac.channels[id];

        chn.tadr += 16;

        chn.madr = (tag & 0xFF_FFFC) as u32;
        chn.len = ((tag >> 32) & 0xF_FFFF) as u32;

        if chn.len & 3 != 0 {
            // Forcefully round up to a whole quadword.
            chn.len = (chn.len | 3) + 1;
        }

        chn.is_tag_end = tag & (3 << 30) != 0;

        tracing::debug!(
            target: "moe_core::iop::dmac",
            "SIF0 DMAtag = {tag:#018X}: MADR = {:#08X}, len = {}, tag end = {}",
            chn.madr, chn.len, chn.is_tag_end
        );
    }

    // Up to 32 words per burst, bounded by the FIFO space.
    let chn = bus.iop_dmac.channels[id];
    let len = (32 - bus.sif.sif0_len() as u32).min(chn.len).min(32);

    assert_ne!(len, 0);

    for i in 0..len {
        let data = bus.iop_dma_read32(chn.madr + 4 * i);

        bus.sif.write_sif0(data);
    }

    let chn = &mut bus.iop_dmac.channels[id];

    chn.len -= len;
    chn.madr += 4 * len;
    chn.drq = false;

    let id_sif0_start = bus.iop_dmac.id_sif0_start;
    bus.scheduler.add_event(id_sif0_start, 0, 16 * len as i64, true);

    if bus.iop_dmac.channels[id].len == 0 && bus.iop_dmac.channels[id].is_tag_end {
        // No reschedule needed, the SIF0 start event fires at the same time.
        let id_transfer_end = bus.iop_dmac.id_transfer_end;
        bus.scheduler.add_event(id_transfer_end, id as i32, 16 * len as i64, false);
    }
}

/// SIF1: pops the EE-sent chain out of the FIFO into IOP RAM.
fn do_sif1(bus: &mut Bus) {
    let id = Channel::Sif1 as usize;

    tracing::debug!(target: "moe_core::iop::dmac", "SIF1 transfer");

    let chcr = bus.iop_dmac.channels[id].chcr;
    assert!(!chcr.dec());
    assert!(chcr.tte());

    if bus.iop_dmac.channels[id].len == 0 {
        let tag = bus.sif.read_sif1() as u64 | ((bus.sif.read_sif1() as u64) << 32);

        // Drop the EE-side half of the quadword tag.
        let _ = bus.sif.read_sif1();
        let _ = bus.sif.read_sif1();

        let chn = &mut bus.iop_dmac.channels[id];

        chn.madr = (tag & 0xFF_FFFC) as u32;
        chn.len = ((tag >> 32) & 0xF_FFFF) as u32;

        assert_eq!(chn.len & 3, 0);

        chn.is_tag_end = tag & (3 << 30) != 0;

        tracing::debug!(
            target: "moe_core::iop::dmac",
            "SIF1 DMAtag = {tag:#018X}: MADR = {:#08X}, len = {}, tag end = {}",
            chn.madr, chn.len, chn.is_tag_end
        );
    }

    let chn = bus.iop_dmac.channels[id];
    let len = (bus.sif.sif1_len() as u32).min(chn.len).min(32);

    assert_ne!(len, 0);

    for i in 0..len {
        let data = bus.sif.read_sif1();

        bus.iop_dma_write32(chn.madr + 4 * i, data);
    }

    let chn = &mut bus.iop_dmac.channels[id];

    chn.len -= len;
    chn.madr += 4 * len;
    chn.drq = false;

    let id_sif1_start = bus.iop_dmac.id_sif1_start;
    bus.scheduler.add_event(id_sif1_start, 0, 16 * len as i64, true);

    if bus.iop_dmac.channels[id].len == 0 && bus.iop_dmac.channels[id].is_tag_end {
        // No reschedule needed, the SIF1 start event fires at the same time.
        let id_transfer_end = bus.iop_dmac.id_transfer_end;
        bus.scheduler.add_event(id_transfer_end, id as i32, 16 * len as i64, false);
    }
}

/// CDVD: one drive block per request, word by word off the data port.
fn do_cdvd(bus: &mut Bus) {
    let id = Channel::Cdvd as usize;

    tracing::debug!(target: "moe_core::iop::dmac", "CDVD transfer");

    let block_words = bus.cdvd.sector_size() as u32 / 4;
    let chn = bus.iop_dmac.channels[id];
    let len = chn.len.min(block_words);

    assert_ne!(len, 0);

    for i in 0..len {
        let data = cdvd::read_dmac(bus);

        bus.iop_dma_write32(chn.madr + 4 * i, data);
    }

    let chn = &mut bus.iop_dmac.channels[id];

    chn.len -= len;
    chn.madr += 4 * len;
    chn.drq = false;

    if bus.iop_dmac.channels[id].len == 0 {
        let id_transfer_end = bus.iop_dmac.id_transfer_end;
        bus.scheduler.add_event(id_transfer_end, id as i32, len as i64, true);
    }
}

fn start_dma(bus: &mut Bus, chn: Channel) {
    match chn {
        Channel::Sif0 => do_sif0(bus),
        Channel::Sif1 => do_sif1(bus),
        Channel::Cdvd => do_cdvd(bus),
        _ => panic!(
            "[DMAC:IOP] unhandled channel {} transfer",
            CHANNEL_NAMES[chn as usize]
        ),
    }
}

fn check_running(bus: &mut Bus, chn: Channel) {
    let id = chn as usize;

    if !bus.iop_dmac.dmacen {
        return;
    }

    let channel = &bus.iop_dmac.channels[id];

    if (channel.drq || channel.chcr.fst()) && bus.iop_dmac.channel_enabled(id) && channel.chcr.str()
    {
        start_dma(bus, chn);
    }
}

fn check_running_all(bus: &mut Bus) {
    if !bus.iop_dmac.dmacen {
        return;
    }

    for id in 0..13 {
        let channel = &bus.iop_dmac.channels[id];

        if (channel.drq || channel.chcr.fst())
            && bus.iop_dmac.channel_enabled(id)
            && channel.chcr.str()
        {
            let chn = channel_from_addr(if id < 7 {
                0x1F80_1080 + 0x10 * id as u32
            } else {
                0x1F80_1500 + 0x10 * (id as u32 - 7)
            });

            return start_dma(bus, chn);
        }
    }
}

/// Sets a channel's request line and polls it.
pub fn set_drq(bus: &mut Bus, chn: Channel, drq: bool) {
    bus.iop_dmac.channels[chn as usize].drq = drq;

    check_running(bus, chn);
}

/* --- register file --- */

pub fn read32(bus: &mut Bus, addr: u32) -> u32 {
    let dmac = &bus.iop_dmac;

    if is_channel_reg(addr) {
        let chn = channel_from_addr(addr);
        let channel = &dmac.channels[chn as usize];

        match addr & !0xFF0 {
            MADR => channel.madr,
            BCR => channel.size as u32 | ((channel.count as u32) << 16),
            CHCR => channel.chcr.0,
            TADR => channel.tadr,
            _ => panic!("[DMAC:IOP] unhandled 32-bit channel read @ {addr:#010X}"),
        }
    } else {
        match addr {
            DPCR => dmac.dpcr,
            DICR => dmac.dicr.0,
            DPCR2 => dmac.dpcr2,
            DICR2 => dmac.dicr2.0,
            DMACEN => dmac.dmacen as u32,
            _ => panic!("[DMAC:IOP] unhandled 32-bit control read @ {addr:#010X}"),
        }
    }
}

pub fn write16(bus: &mut Bus, addr: u32, data: u16) {
    if !is_channel_reg(addr) {
        panic!("[DMAC:IOP] unhandled 16-bit control write @ {addr:#010X} = {data:#06X}");
    }

    let chn = channel_from_addr(addr);
    let channel = &mut bus.iop_dmac.channels[chn as usize];

    match addr & !0xFF0 {
        BCR => {
            channel.size = data;
            channel.len = channel.count as u32 * channel.size as u32;
        }
        b if b == BCR + 2 => {
            channel.count = data;
            channel.len = channel.count as u32 * channel.size as u32;
        }
        _ => panic!("[DMAC:IOP] unhandled 16-bit channel write @ {addr:#010X} = {data:#06X}"),
    }
}

pub fn write32(bus: &mut Bus, addr: u32, data: u32) {
    if is_channel_reg(addr) {
        let chn = channel_from_addr(addr);
        let id = chn as usize;

        match addr & !0xFF0 {
            MADR => bus.iop_dmac.channels[id].madr = data & 0xFF_FFFC,
            BCR => {
                let channel = &mut bus.iop_dmac.channels[id];

                channel.size = data as u16;
                channel.count = (data >> 16) as u16;
                channel.len = channel.count as u32 * channel.size as u32;
            }
            CHCR => {
                tracing::debug!(
                    target: "moe_core::iop::dmac",
                    "{} CHCR = {data:#010X}", CHANNEL_NAMES[id]
                );

                assert_eq!(data & (1 << 29), 0);

                bus.iop_dmac.channels[id].chcr.0 = data;

                check_running(bus, chn);
            }
            TADR => bus.iop_dmac.channels[id].tadr = data & 0xFF_FFFC,
            _ => panic!("[DMAC:IOP] unhandled 32-bit channel write @ {addr:#010X} = {data:#010X}"),
        }
    } else {
        match addr {
            DPCR => {
                bus.iop_dmac.dpcr = data;

                check_running_all(bus);
            }
            DICR => {
                let dicr = &mut bus.iop_dmac.dicr;

                dicr.set_sie((data & 0x7F) as u8);
                dicr.set_bef(data & (1 << 15) != 0);
                dicr.set_im(((data >> 16) & 0x7F) as u8);
                dicr.set_mie(data & (1 << 23) != 0);

                // IP is write-1-to-clear.
                let ip = dicr.ip();
                dicr.set_ip(ip & !((data >> 24) as u8) & 0x7F);

                check_interrupt(bus);
            }
            DPCR2 => {
                bus.iop_dmac.dpcr2 = data;

                check_running_all(bus);
            }
            DICR2 => {
                let dicr2 = &mut bus.iop_dmac.dicr2;

                // Only the tag-interrupt bits of CH4/9/10 exist.
                dicr2.set_tie((data & 0x610) as u16);
                dicr2.set_im(((data >> 16) & 0x3F) as u8);

                let ip = dicr2.ip();
                dicr2.set_ip(ip & !((data >> 24) as u8) & 0x3F);

                check_interrupt(bus);
            }
            DMACEN => {
                bus.iop_dmac.dmacen = data & 1 != 0;

                check_running_all(bus);
            }
            DMACINTEN => {
                tracing::debug!(target: "moe_core::iop::dmac", "DMACINTEN = {data:#010X}");
            }
            _ => panic!("[DMAC:IOP] unhandled 32-bit control write @ {addr:#010X} = {data:#010X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;

    fn bus() -> Bus {
        Bus::new(vec![0; 0x40_0000], None)
    }

    /// A one-tag SIF0 chain ends up in the EE-side FIFO with
    /// the EE tag in front, and raises the SIF0 interrupt pending bit.
    #[test]
    fn sif0_chain_reaches_the_fifo_and_dicr() {
        let mut bus = bus();

        // DMAtag @ 0x10_0000: MADR = 0x20_0000, 4 words, tag end.
        let tag_lo: u32 = 0x20_0000;
        let tag_hi: u32 = (1 << 30) | 4;
        bus.iop_dma_write32(0x10_0000, tag_lo);
        bus.iop_dma_write32(0x10_0004, tag_hi);
        bus.iop_dma_write32(0x10_0008, 0xEE00_0001); // EE tag
        bus.iop_dma_write32(0x10_000C, 0xEE00_0002);

        for (i, word) in [0xCAFE_0001u32, 0xCAFE_0002, 0xCAFE_0003, 0xCAFE_0004]
            .iter()
            .enumerate()
        {
            bus.iop_dma_write32(0x20_0000 + 4 * i as u32, *word);
        }

        // Enable the DMAC, SIF0 interrupt mask, channel enable, then start.
        write32(&mut bus, DMACEN, 1);
        write32(&mut bus, DICR, 1 << 23); // master interrupt enable
        write32(&mut bus, DICR2, 1 << (16 + 2));
        write32(&mut bus, DPCR2, 1 << (4 * 2 + 3));
        write32(&mut bus, 0x1F80_152C, 0x10_0000); // SIF0 TADR
        write32(&mut bus, 0x1F80_1528, (1 << 24) | (1 << 8) | (1 << 10)); // STR | TTE | chain

        // The FIFO holds the EE tag followed by the payload.
        assert_eq!(bus.sif.sif0_len(), 6);
        assert_eq!(bus.sif.read_sif0_word(), 0xEE00_0001);
        assert_eq!(bus.sif.read_sif0_word(), 0xEE00_0002);
        for word in [0xCAFE_0001u32, 0xCAFE_0002, 0xCAFE_0003, 0xCAFE_0004] {
            assert_eq!(bus.sif.read_sif0_word(), word);
        }

        // The transfer-end event is pending; drain it and check DICR2.IP.
        bus.process_events(16 * 4 + 1);
        assert_eq!(bus.iop_dmac.dicr2.ip() & (1 << 2), 1 << 2);
        assert!(!bus.iop_dmac.channels[Channel::Sif0 as usize].chcr.str());

        // The DMA interrupt made it to the INTC.
        assert_eq!(bus.intc.read_i_stat() & (1 << 3), 1 << 3);
    }

    #[test]
    fn sif1_pulls_the_ee_chain_into_iop_ram() {
        let mut bus = bus();

        // EE pushed: 2 tag words + 2 padding + 4 data words.
        bus.sif.write_sif1(crate::types::U128::new(
            ((4u64 | (1 << 30)) << 32) | 0x30_0000,
            0,
        ));
        bus.sif.write_sif1(crate::types::U128::new(
            0x1111_2222_3333_4444,
            0x5555_6666_7777_8888,
        ));

        write32(&mut bus, DMACEN, 1);
        write32(&mut bus, DPCR2, 1 << (4 * 3 + 3));
        write32(&mut bus, 0x1F80_1538, (1 << 24) | (1 << 8) | (1 << 10) | 1);

        assert_eq!(bus.iop_dma_read32(0x30_0000), 0x3333_4444);
        assert_eq!(bus.iop_dma_read32(0x30_0004), 0x1111_2222);
        assert_eq!(bus.iop_dma_read32(0x30_0008), 0x7777_8888);
        assert_eq!(bus.iop_dma_read32(0x30_000C), 0x5555_6666);
    }

    #[test]
    fn bcr_len_is_size_times_count() {
        let mut bus = bus();

        write32(&mut bus, 0x1F80_10B4, 8 | (3 << 16)); // CDVD BCR
        assert_eq!(bus.iop_dmac.channels[Channel::Cdvd as usize].len, 24);

        write16(&mut bus, 0x1F80_10B4, 16);
        write16(&mut bus, 0x1F80_10B6, 2);
        assert_eq!(bus.iop_dmac.channels[Channel::Cdvd as usize].len, 32);
    }

    #[test]
    fn dicr_ip_is_write_one_to_clear_and_mif_edges() {
        let mut bus = bus();

        // im bit 3, mie.
        write32(&mut bus, DICR, (1 << (16 + 3)) | (1 << 23));

        transfer_end_event(&mut bus, 3, 0);
        assert_eq!(bus.iop_dmac.dicr.ip() & (1 << 3), 1 << 3);
        assert!(bus.iop_dmac.dicr.mif());
        assert_eq!(bus.intc.read_i_stat() & (1 << 3), 1 << 3);

        // Acknowledge: IP cleared by writing 1, MIF recomputed.
        write32(&mut bus, DICR, (1 << (16 + 3)) | (1 << 23) | (1 << (24 + 3)));
        assert_eq!(bus.iop_dmac.dicr.ip(), 0);
        assert!(!bus.iop_dmac.dicr.mif());
    }
}
