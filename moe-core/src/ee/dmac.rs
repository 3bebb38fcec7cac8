//! EE DMA controller.
//!
//! Ten channels; the live sinks in this machine are the SIF pair and PATH3.
//! Chain walking understands the refe/cnt/end tag flow, everything else is a
//! fatal decode until the remaining sinks exist.

use proc_bitfield::bitfield;

use crate::bus::Bus;
use crate::sif::FIFO_CAPACITY;

/// EE DMA channels, in register-bank order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Vif0 = 0,
    Vif1 = 1,
    Path3 = 2,
    IpuFrom = 3,
    IpuTo = 4,
    Sif0 = 5,
    Sif1 = 6,
    Sif2 = 7,
    SprFrom = 8,
    SprTo = 9,
}

pub const CHANNEL_NAMES: [&str; 10] = [
    "VIF0", "VIF1", "PATH3", "IPU_FROM", "IPU_TO", "SIF0", "SIF1", "SIF2", "SPR_FROM", "SPR_TO",
];

/* Channel registers (addr & !0xFF00) */
const CHCR: u32 = 0x1000_0000;
const MADR: u32 = 0x1000_0010;
const QWC: u32 = 0x1000_0020;
const TADR: u32 = 0x1000_0030;
const ASR0: u32 = 0x1000_0040;
const ASR1: u32 = 0x1000_0050;
const SADR: u32 = 0x1000_0080;

/* Control registers */
const CTRL: u32 = 0x1000_E000;
const STAT: u32 = 0x1000_E010;
const PCR: u32 = 0x1000_E020;
const SQWC: u32 = 0x1000_E030;
const RBSR: u32 = 0x1000_E040;
const RBOR: u32 = 0x1000_E050;
const STADR: u32 = 0x1000_E060;

/* DMAtag IDs */
const TAG_REFE: u32 = 0;
const TAG_CNT: u32 = 1;
const TAG_END: u32 = 7;

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ChannelControl(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub dir: bool @ 0,
        pub mode: u8 @ 2..=3,
        pub asp: u8 @ 4..=5,
        pub tte: bool @ 6,
        pub tie: bool @ 7,
        pub str: bool @ 8,
        pub tag: u16 @ 16..=31,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Control(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub dmae: bool @ 0,
        pub rele: bool @ 1,
        pub mfd: u8 @ 2..=3,
        pub sts: u8 @ 4..=5,
        pub std: u8 @ 6..=7,
        pub rcyc: u8 @ 8..=10,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Stat(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub cis: u16 @ 0..=9,
        pub sis: bool @ 13,
        pub meis: bool @ 14,
        pub beis: bool @ 15,
        pub cim: u16 @ 16..=25,
        pub sim: bool @ 29,
        pub meim: bool @ 30,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Pcr(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub cpc: u16 @ 0..=9,
        pub cde: u16 @ 16..=25,
        pub pce: bool @ 31,
    }
}

#[derive(Clone, Copy)]
pub struct DmaChannel {
    pub chcr: ChannelControl,
    pub madr: u32,
    pub qwc: u32,
    pub tadr: u32,
    pub asr: [u32; 2],
    pub sadr: u32,

    pub drq: bool,
    pub is_tag_end: bool,
}

impl DmaChannel {
    fn new() -> Self {
        Self {
            chcr: ChannelControl(0),
            madr: 0,
            qwc: 0,
            tadr: 0,
            asr: [0; 2],
            sadr: 0,
            drq: false,
            is_tag_end: false,
        }
    }
}

pub struct Dmac {
    pub channels: [DmaChannel; 10],

    pub ctrl: Control,
    pub stat: Stat,
    pub pcr: Pcr,
    sqwc: u32,
    rbsr: u32,
    rbor: u32,
    stadr: u32,
    enable: u32,
}

fn channel_from_addr(addr: u32) -> Channel {
    match (addr >> 8) & 0xFF {
        0x80 => Channel::Vif0,
        0x90 => Channel::Vif1,
        0xA0 => Channel::Path3,
        0xB0 => Channel::IpuFrom,
        0xB4 => Channel::IpuTo,
        0xC0 => Channel::Sif0,
        0xC4 => Channel::Sif1,
        0xC8 => Channel::Sif2,
        0xD0 => Channel::SprFrom,
        0xD4 => Channel::SprTo,
        _ => panic!("[DMAC:EE] invalid channel @ {addr:#010X}"),
    }
}

impl Dmac {
    pub fn new() -> Self {
        let mut channels = [DmaChannel::new(); 10];

        // Channels whose device side is always ready request by default.
        for chn in [
            Channel::Vif0,
            Channel::Vif1,
            Channel::Path3,
            Channel::IpuTo,
            Channel::Sif1,
            Channel::Sif2,
            Channel::SprFrom,
            Channel::SprTo,
        ] {
            channels[chn as usize].drq = true;
        }

        Self {
            channels,
            ctrl: Control(0),
            stat: Stat(0),
            pcr: Pcr(0),
            sqwc: 0,
            rbsr: 0,
            rbor: 0,
            stadr: 0,
            enable: 0x1201,
        }
    }

    pub fn read_enable(&self) -> u32 {
        self.enable
    }

    pub fn write_enable(&mut self, data: u32) {
        if data & (1 << 16) != 0 {
            panic!("[DMAC:EE] D_ENABLE suspension is not handled");
        }

        self.enable = data;
    }

    /// The DMAC interrupt line toward the EE core (INT1).
    pub fn irq_pending(&self) -> bool {
        (self.stat.cis() & self.stat.cim()) != 0
            || (self.stat.sis() && self.stat.sim())
            || (self.stat.meis() && self.stat.meim())
    }

    fn channel_eligible(&self, chn: Channel) -> bool {
        let id = chn as usize;

        if self.enable & (1 << 16) != 0 || !self.ctrl.dmae() {
            return false;
        }

        if self.pcr.pce() && self.pcr.cde() & (1 << id) == 0 {
            return false;
        }

        self.channels[id].drq && self.channels[id].chcr.str()
    }
}

impl Default for Dmac {
    fn default() -> Self {
        Self::new()
    }
}

pub fn read(bus: &mut Bus, addr: u32) -> u32 {
    let dmac = &bus.ee_dmac;

    if addr < CTRL {
        let chn = channel_from_addr(addr);
        let channel = &dmac.channels[chn as usize];

        match addr & !0xFF00 {
            CHCR => channel.chcr.0,
            MADR => channel.madr,
            QWC => channel.qwc,
            TADR => channel.tadr,
            ASR0 => channel.asr[0],
            ASR1 => channel.asr[1],
            SADR => channel.sadr,
            _ => panic!("[DMAC:EE] unhandled 32-bit channel read @ {addr:#010X}"),
        }
    } else {
        match addr {
            CTRL => dmac.ctrl.0,
            STAT => dmac.stat.0,
            PCR => dmac.pcr.0,
            SQWC => dmac.sqwc,
            RBSR => dmac.rbsr,
            RBOR => dmac.rbor,
            STADR => dmac.stadr,
            _ => panic!("[DMAC:EE] unhandled 32-bit control read @ {addr:#010X}"),
        }
    }
}

pub fn write(bus: &mut Bus, addr: u32, data: u32) {
    if addr < CTRL {
        let chn = channel_from_addr(addr);
        let id = chn as usize;

        match addr & !0xFF00 {
            CHCR => {
                tracing::debug!(
                    target: "moe_core::ee::dmac",
                    "{} CHCR = {data:#010X}", CHANNEL_NAMES[id]
                );

                bus.ee_dmac.channels[id].chcr.0 = data;

                check_running(bus, chn);
            }
            MADR => bus.ee_dmac.channels[id].madr = data & !0xF,
            QWC => bus.ee_dmac.channels[id].qwc = data & 0xFFFF,
            TADR => bus.ee_dmac.channels[id].tadr = data & !0xF,
            ASR0 => bus.ee_dmac.channels[id].asr[0] = data & !0xF,
            ASR1 => bus.ee_dmac.channels[id].asr[1] = data & !0xF,
            SADR => bus.ee_dmac.channels[id].sadr = data & 0x3FF0,
            _ => panic!("[DMAC:EE] unhandled 32-bit channel write @ {addr:#010X} = {data:#010X}"),
        }
    } else {
        match addr {
            CTRL => {
                bus.ee_dmac.ctrl.0 = data;

                check_running_all(bus);
            }
            STAT => {
                // Flag half is write-1-to-clear, mask half toggles.
                let stat = &mut bus.ee_dmac.stat;

                stat.0 = (stat.0 & !(data & 0xFFFF)) ^ (data & 0xFFFF_0000);
            }
            PCR => {
                bus.ee_dmac.pcr.0 = data;

                check_running_all(bus);
            }
            SQWC => bus.ee_dmac.sqwc = data,
            RBSR => bus.ee_dmac.rbsr = data,
            RBOR => bus.ee_dmac.rbor = data,
            STADR => bus.ee_dmac.stadr = data,
            _ => panic!("[DMAC:EE] unhandled 32-bit control write @ {addr:#010X} = {data:#010X}"),
        }
    }
}

/// Sets a channel's DMA request line and polls it.
pub fn set_drq(bus: &mut Bus, chn: Channel, drq: bool) {
    bus.ee_dmac.channels[chn as usize].drq = drq;

    check_running(bus, chn);
}

const CHANNELS: [Channel; 10] = [
    Channel::Vif0,
    Channel::Vif1,
    Channel::Path3,
    Channel::IpuFrom,
    Channel::IpuTo,
    Channel::Sif0,
    Channel::Sif1,
    Channel::Sif2,
    Channel::SprFrom,
    Channel::SprTo,
];

fn check_running_all(bus: &mut Bus) {
    for chn in CHANNELS {
        check_running(bus, chn);
    }
}

fn check_running(bus: &mut Bus, chn: Channel) {
    if !bus.ee_dmac.channel_eligible(chn) {
        return;
    }

    match chn {
        Channel::Sif0 => do_sif0(bus),
        Channel::Sif1 => do_sif1(bus),
        Channel::Path3 => do_path3(bus),
        _ => panic!("[DMAC:EE] unhandled channel {} transfer", CHANNEL_NAMES[chn as usize]),
    }
}

/// Decodes a source-chain DMAtag fetched from memory at TADR and advances
/// the channel's address state.
fn follow_source_tag(bus: &mut Bus, chn: Channel) {
    let tag = bus.read128(bus.ee_dmac.channels[chn as usize].tadr);

    let channel = &mut bus.ee_dmac.channels[chn as usize];

    let qwc = (tag.lo & 0xFFFF) as u32;
    let id = ((tag.lo >> 28) & 7) as u32;
    let irq = tag.lo & (1 << 31) != 0;
    let addr = ((tag.lo >> 32) & 0x7FFF_FFF0) as u32;

    tracing::debug!(
        target: "moe_core::ee::dmac",
        "{} DMAtag = {tag}, ID = {id}, QWC = {qwc}", CHANNEL_NAMES[chn as usize]
    );

    channel.chcr.set_tag((tag.lo >> 16) as u16);
    channel.qwc = qwc;

    match id {
        TAG_REFE => {
            channel.madr = addr;
            channel.tadr += 16;
            channel.is_tag_end = true;
        }
        TAG_CNT => {
            channel.madr = channel.tadr + 16;
            channel.tadr = channel.madr + 16 * qwc;
        }
        TAG_END => {
            channel.madr = channel.tadr + 16;
            channel.is_tag_end = true;
        }
        _ => panic!("[DMAC:EE] unhandled source-chain tag ID {id}"),
    }

    if irq && channel.chcr.tie() {
        channel.is_tag_end = true;
    }
}

/// Marks a channel transfer done and raises the channel interrupt flag.
fn transfer_end(bus: &mut Bus, chn: Channel) {
    tracing::debug!(target: "moe_core::ee::dmac", "{} transfer end", CHANNEL_NAMES[chn as usize]);

    let channel = &mut bus.ee_dmac.channels[chn as usize];

    channel.chcr.set_str(false);
    channel.is_tag_end = false;

    let cis = bus.ee_dmac.stat.cis();
    bus.ee_dmac.stat.set_cis(cis | 1 << chn as usize);
}

/// SIF0: drains the IOP-filled FIFO into main RAM (destination chain).
fn do_sif0(bus: &mut Bus) {
    let chn = Channel::Sif0;

    loop {
        if bus.ee_dmac.channels[chn as usize].qwc == 0 {
            if bus.ee_dmac.channels[chn as usize].is_tag_end {
                transfer_end(bus, chn);
                return;
            }

            // The IOP side pushed a two-word EE tag ahead of the data.
            if bus.sif.sif0_len() < 2 {
                set_channel_drq(bus, chn, false);
                return;
            }

            let lo = bus.sif.read_sif0_word() as u64;
            let hi = bus.sif.read_sif0_word() as u64;
            let tag = lo | (hi << 32);

            let channel = &mut bus.ee_dmac.channels[chn as usize];

            channel.qwc = (tag & 0xFFFF) as u32;
            channel.madr = ((tag >> 32) & 0x7FFF_FFF0) as u32;
            channel.chcr.set_tag((tag >> 16) as u16);

            let id = ((tag >> 28) & 7) as u32;
            let irq = tag & (1 << 31) != 0;

            channel.is_tag_end =
                id == TAG_REFE || id == TAG_END || (irq && channel.chcr.tie());

            tracing::debug!(
                target: "moe_core::ee::dmac",
                "SIF0 EEtag = {tag:#018X}, MADR = {:#010X}, QWC = {}",
                channel.madr, channel.qwc
            );
        }

        while bus.ee_dmac.channels[chn as usize].qwc > 0 && bus.sif.sif0_len() >= 4 {
            let data = bus.sif.read_sif0();
            let madr = bus.ee_dmac.channels[chn as usize].madr;

            bus.write128(madr, data);

            let channel = &mut bus.ee_dmac.channels[chn as usize];
            channel.madr += 16;
            channel.qwc -= 1;
        }

        if bus.ee_dmac.channels[chn as usize].qwc > 0 {
            // FIFO drained; the IOP side re-raises our request line.
            set_channel_drq(bus, chn, false);
            return;
        }
    }
}

/// SIF1: walks a source chain in main RAM and feeds the SIF1 FIFO.
fn do_sif1(bus: &mut Bus) {
    let chn = Channel::Sif1;

    loop {
        if bus.ee_dmac.channels[chn as usize].qwc == 0 {
            if bus.ee_dmac.channels[chn as usize].is_tag_end {
                transfer_end(bus, chn);
                return;
            }

            if bus.sif.sif1_len() + 4 > FIFO_CAPACITY {
                set_channel_drq(bus, chn, false);
                return;
            }

            let tadr = bus.ee_dmac.channels[chn as usize].tadr;
            let tag = bus.read128(tadr);

            follow_source_tag(bus, chn);

            // The IOP side expects the raw tag ahead of the data.
            if bus.ee_dmac.channels[chn as usize].chcr.tte() {
                bus.sif.write_sif1(tag);
            }
        }

        while bus.ee_dmac.channels[chn as usize].qwc > 0
            && bus.sif.sif1_len() + 4 <= FIFO_CAPACITY
        {
            let madr = bus.ee_dmac.channels[chn as usize].madr;
            let data = bus.read128(madr);

            bus.sif.write_sif1(data);

            let channel = &mut bus.ee_dmac.channels[chn as usize];
            channel.madr += 16;
            channel.qwc -= 1;
        }

        if bus.ee_dmac.channels[chn as usize].qwc > 0 {
            // FIFO full; the IOP drain event re-raises our request line.
            set_channel_drq(bus, chn, false);
            return;
        }
    }
}

/// PATH3: quadwords from main RAM into the GIF.
fn do_path3(bus: &mut Bus) {
    let chn = Channel::Path3;

    if bus.ee_dmac.channels[chn as usize].chcr.mode() == 1 {
        // Source chain.
        loop {
            if bus.ee_dmac.channels[chn as usize].qwc == 0 {
                if bus.ee_dmac.channels[chn as usize].is_tag_end {
                    transfer_end(bus, chn);
                    return;
                }

                follow_source_tag(bus, chn);
            }

            drain_path3_block(bus);
        }
    } else {
        // Burst: MADR/QWC describe the whole transfer.
        drain_path3_block(bus);

        transfer_end(bus, chn);
    }
}

fn drain_path3_block(bus: &mut Bus) {
    let chn = Channel::Path3;

    while bus.ee_dmac.channels[chn as usize].qwc > 0 {
        let madr = bus.ee_dmac.channels[chn as usize].madr;
        let data = bus.read128(madr);

        bus.gif.write_path3(&mut bus.gs, data);

        let channel = &mut bus.ee_dmac.channels[chn as usize];
        channel.madr += 16;
        channel.qwc -= 1;
    }
}

/// DRQ update that does not re-poll (used inside the engines).
fn set_channel_drq(bus: &mut Bus, chn: Channel, drq: bool) {
    bus.ee_dmac.channels[chn as usize].drq = drq;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;

    fn bus() -> Bus {
        Bus::new(vec![0; 0x40_0000], None)
    }

    #[test]
    fn register_file_round_trip() {
        let mut bus = bus();

        write(&mut bus, 0x1000_C010, 0x0012_3450); // SIF0 MADR
        write(&mut bus, 0x1000_C020, 0x20); // SIF0 QWC
        assert_eq!(read(&mut bus, 0x1000_C010), 0x0012_3450);
        assert_eq!(read(&mut bus, 0x1000_C020), 0x20);

        // MADR is forced 16-byte aligned.
        write(&mut bus, 0x1000_C010, 0x0012_3456);
        assert_eq!(read(&mut bus, 0x1000_C010), 0x0012_3450);
    }

    #[test]
    fn stat_clears_flags_and_toggles_masks() {
        let mut bus = bus();

        bus.ee_dmac.stat.set_cis(0x21);

        write(&mut bus, STAT, 0x1);
        assert_eq!(bus.ee_dmac.stat.cis(), 0x20);

        write(&mut bus, STAT, 0x20 << 16);
        assert_eq!(bus.ee_dmac.stat.cim(), 0x20);
        write(&mut bus, STAT, 0x20 << 16);
        assert_eq!(bus.ee_dmac.stat.cim(), 0x0);
    }

    #[test]
    #[should_panic(expected = "D_ENABLE suspension")]
    fn enable_suspension_is_fatal() {
        let mut bus = bus();

        bus.ee_dmac.write_enable(1 << 16);
    }

    #[test]
    fn initial_drq_set() {
        let dmac = Dmac::new();

        for (chn, expected) in
            [true, true, true, false, true, false, true, true, true, true].iter().enumerate()
        {
            assert_eq!(dmac.channels[chn].drq, *expected, "channel {chn}");
        }
    }

    #[test]
    fn sif0_drains_tag_then_data_into_ram() {
        let mut bus = bus();

        // EE tag: QWC = 1, ID = end, address 0x5000.
        bus.sif.write_sif0(0x7000_0001);
        bus.sif.write_sif0(0x0000_5000);
        for word in [0x1111_1111u32, 0x2222_2222, 0x3333_3333, 0x4444_4444] {
            bus.sif.write_sif0(word);
        }

        bus.ee_dmac.ctrl.set_dmae(true);
        write(&mut bus, 0x1000_C000, 1 << 8); // SIF0 CHCR.STR
        set_drq(&mut bus, Channel::Sif0, true);

        assert_eq!(bus.read32(0x5000), 0x1111_1111);
        assert_eq!(bus.read32(0x500C), 0x4444_4444);
        assert!(!bus.ee_dmac.channels[Channel::Sif0 as usize].chcr.str());
        assert_eq!(bus.ee_dmac.stat.cis() & (1 << 5), 1 << 5);
    }

    #[test]
    fn sif1_pushes_tag_and_data_into_the_fifo() {
        let mut bus = bus();

        // refe tag at 0x6000: QWC = 1, data at 0x7000.
        bus.write128(0x6000, crate::types::U128::new(0x0000_7000_0000_0001, 0));
        bus.write128(0x7000, crate::types::U128::new(0xAAAA_AAAA_BBBB_BBBB, 0xCCCC_CCCC_DDDD_DDDD));

        bus.ee_dmac.ctrl.set_dmae(true);
        write(&mut bus, 0x1000_C430, 0x6000); // SIF1 TADR
        write(&mut bus, 0x1000_C400, (1 << 8) | (1 << 6) | (1 << 2)); // STR | TTE | chain

        // 4 tag words + 4 data words.
        assert_eq!(bus.sif.sif1_len(), 8);
        assert_eq!(bus.sif.read_sif1(), 0x0000_0001);
        assert_eq!(bus.sif.read_sif1(), 0x0000_7000);
        bus.sif.read_sif1();
        bus.sif.read_sif1();
        assert_eq!(bus.sif.read_sif1(), 0xBBBB_BBBB);
    }
}
