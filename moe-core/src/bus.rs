//! System bus: owns every device plus the raw memories, and decodes both the
//! EE and IOP address spaces.

use std::fs::File;

use crate::cdvd::{self, Cdvd};
use crate::ee::dmac::{self as ee_dmac, Dmac};
use crate::ee::timer::Timers as EeTimers;
use crate::gif::Gif;
use crate::gs::{self, Gs};
use crate::intc::Intc;
use crate::iop::dmac::{self as iop_dmac, IopDmac};
use crate::iop::timer::Timers as IopTimers;
use crate::scheduler::{EventId, Scheduler};
use crate::sif::Sif;
use crate::types::U128;
use crate::vif::Vif;
use crate::vu::Vus;

/* --- EE address map --- */

crate::define_addr!(EE_RAM, 0x0000_0000, 0, 0x200_0000, 0);
crate::define_addr!(EE_TIMER, 0x1000_0000, 0, 0x1840, 0);
crate::define_addr!(EE_IPU, 0x1000_2000, 0, 0x40, 0);
crate::define_addr!(EE_GIF, 0x1000_3000, 0, 0x100, 0);
crate::define_addr!(EE_VIF0, 0x1000_3800, 0, 0x180, 0);
crate::define_addr!(EE_VIF1, 0x1000_3C00, 0, 0x180, 0);
crate::define_addr!(EE_DMAC, 0x1000_8000, 0, 0x7000, 0);
crate::define_addr!(EE_SIF, 0x1000_F200, 0, 0x70, 0);
crate::define_addr!(EE_RDRAM, 0x1000_F430, 0, 0x20, 0);
crate::define_addr!(VU0_CODE, 0x1100_0000, 0, 0x1000, 0);
crate::define_addr!(VU0_DATA, 0x1100_4000, 0, 0x1000, 0);
crate::define_addr!(VU1_CODE, 0x1100_8000, 0, 0x4000, 0);
crate::define_addr!(VU1_DATA, 0x1100_C000, 0, 0x4000, 0);
crate::define_addr!(EE_GS, 0x1200_0000, 0, 0x2000, 0);
crate::define_addr!(EE_IOP_RAM, 0x1C00_0000, 0, 0x20_0000, 0);
crate::define_addr!(EE_IOP_IO, 0x1F80_0000, 0, 0x40_0000, 0);
crate::define_addr!(EE_BIOS, 0x1FC0_0000, 0, 0x40_0000, 0);

const GIF_FIFO: u32 = 0x1000_6000;
const INTC_STAT: u32 = 0x1000_F000;
const INTC_MASK: u32 = 0x1000_F010;
const KPUTCHAR: u32 = 0x1000_F180;
const D_ENABLER: u32 = 0x1000_F520;
const D_ENABLE: u32 = 0x1000_F590;

/* --- IOP address map --- */

crate::define_addr!(IOP_RAM, 0x0000_0000, 0, 0x20_0000, 0);
crate::define_addr!(IOP_SIF, 0x1D00_0000, 0, 0x70, 0);
crate::define_addr!(IOP_CDVD, 0x1F40_2004, 0, 0x15, 0);
crate::define_addr!(IOP_DMA0, 0x1F80_1080, 0, 0x80, 0);
crate::define_addr!(IOP_TIMER0, 0x1F80_1100, 0, 0x30, 0);
crate::define_addr!(IOP_TIMER1, 0x1F80_1480, 0, 0x30, 0);
crate::define_addr!(IOP_DMA1, 0x1F80_1500, 0, 0x80, 0);
crate::define_addr!(IOP_SIO2, 0x1F80_8200, 0, 0x84, 0);
crate::define_addr!(IOP_SPU2, 0x1F90_0000, 0, 0x2800, 0);
crate::define_addr!(IOP_BIOS, 0x1FC0_0000, 0, 0x40_0000, 0);

const I_STAT: u32 = 0x1F80_1070;
const I_MASK: u32 = 0x1F80_1074;
const I_CTRL: u32 = 0x1F80_1078;
const RAM_SIZE: u32 = 0x1F80_1060;
const SPRAM_START: u32 = 0x1F80_1420;
const SPRAM_END: u32 = 0x1F80_1424;
const POST: u32 = 0x1F80_2070;

const IOP_SPRAM_SIZE: u32 = 0x400;

/* --- memory helpers --- */

#[inline(always)]
fn mem_read16(mem: &[u8], addr: usize) -> u16 {
    u16::from_le_bytes(mem[addr..addr + 2].try_into().unwrap())
}

#[inline(always)]
fn mem_read32(mem: &[u8], addr: usize) -> u32 {
    u32::from_le_bytes(mem[addr..addr + 4].try_into().unwrap())
}

#[inline(always)]
fn mem_read64(mem: &[u8], addr: usize) -> u64 {
    u64::from_le_bytes(mem[addr..addr + 8].try_into().unwrap())
}

pub struct Bus {
    pub ram: Vec<u8>,
    pub iop_ram: Vec<u8>,
    bios: Vec<u8>,

    iop_spram: Vec<u8>,
    spram_start: u32,
    spram_end: u32,

    pub scheduler: Scheduler,
    pub intc: Intc,
    pub ee_dmac: Dmac,
    pub iop_dmac: IopDmac,
    pub sif: Sif,
    pub gs: Gs,
    pub gif: Gif,
    pub ee_timers: EeTimers,
    pub iop_timers: IopTimers,
    pub vus: Vus,
    pub vifs: [Vif; 2],
    pub cdvd: Cdvd,

    pub gs_hblank_event: EventId,

    /* RDRAM init handshake */
    mch_ricm: u32,
    mch_drd: u32,

    /// EE kernel TTY accumulator.
    tty: String,
}

impl Bus {
    pub fn new(bios: Vec<u8>, disc: Option<File>) -> Self {
        assert_eq!(bios.len(), EE_BIOS.1 as usize - EE_BIOS.0 as usize + 1, "bad BIOS size");

        let mut scheduler = Scheduler::new();

        let gs_hblank_event = scheduler.register_event(gs::hblank_event);

        let id_transfer_end = scheduler.register_event(iop_dmac::transfer_end_event);
        let id_sif0_start = scheduler.register_event(iop_dmac::sif0_start_event);
        let id_sif1_start = scheduler.register_event(iop_dmac::sif1_start_event);

        let id_finish_seek = scheduler.register_event(cdvd::finish_seek);
        let id_request_dma = scheduler.register_event(cdvd::request_dma);

        // The scanline event keeps the queue non-empty forever.
        scheduler.add_event(gs_hblank_event, 0, gs::CYCLES_PER_SCANLINE, true);

        Self {
            ram: vec![0; 0x200_0000],
            iop_ram: vec![0; 0x20_0000],
            bios,
            iop_spram: vec![0; IOP_SPRAM_SIZE as usize],
            spram_start: 0x1F80_0000,
            spram_end: 0x1F80_0000 + IOP_SPRAM_SIZE,
            scheduler,
            intc: Intc::new(),
            ee_dmac: Dmac::new(),
            iop_dmac: IopDmac::new(id_transfer_end, id_sif0_start, id_sif1_start),
            sif: Sif::new(),
            gs: Gs::new(),
            gif: Gif::new(),
            ee_timers: EeTimers::new(),
            iop_timers: IopTimers::new(),
            vus: Vus::new(),
            vifs: [Vif::new(0), Vif::new(1)],
            cdvd: Cdvd::new(disc, id_finish_seek, id_request_dma),
            gs_hblank_event,
            mch_ricm: 0,
            mch_drd: 0,
            tty: String::new(),
        }
    }

    /* --- scheduler drain --- */

    /// Advances global time and fires every expired event.
    pub fn process_events(&mut self, elapsed: i64) {
        self.scheduler.cycle_count += elapsed;

        if self.scheduler.cycle_count < self.scheduler.cycles_until_next_event {
            return;
        }

        self.scheduler.begin_drain();

        while self.scheduler.cycle_count >= self.scheduler.cycles_until_next_event {
            let next = self.scheduler.cycles_until_next_event;

            for fired in self.scheduler.sweep() {
                (fired.func)(self, fired.param, fired.residual);
            }

            self.scheduler.cycle_count -= next;
            self.scheduler.reschedule();
        }
    }

    /* --- EE bus --- */

    pub fn read8(&mut self, addr: u32) -> u8 {
        match addr {
            EE_RAM_START..=EE_RAM_END => self.ram[addr as usize],
            EE_IOP_IO_START..=EE_IOP_IO_END => {
                tracing::warn!(target: "moe_core::bus", "EE 8-bit read @ {addr:#010X} (IOP I/O)");

                0
            }
            EE_BIOS_START..=EE_BIOS_END => self.bios[(addr - EE_BIOS_START) as usize],
            _ => panic!("[Bus:EE] unhandled 8-bit read @ {addr:#010X}"),
        }
    }

    pub fn read16(&mut self, addr: u32) -> u16 {
        match addr {
            EE_RAM_START..=EE_RAM_END => mem_read16(&self.ram, addr as usize),
            EE_BIOS_START..=EE_BIOS_END => mem_read16(&self.bios, (addr - EE_BIOS_START) as usize),
            // SSBUS scratch registers the kernel probes at boot.
            0x1A00_0006 => 1,
            0x1000_F480 | 0x1A00_0010 => 0,
            _ => panic!("[Bus:EE] unhandled 16-bit read @ {addr:#010X}"),
        }
    }

    pub fn read32(&mut self, addr: u32) -> u32 {
        match addr {
            EE_RAM_START..=EE_RAM_END => mem_read32(&self.ram, addr as usize),
            EE_TIMER_START..=EE_TIMER_END => self.ee_timers.read32(addr),
            EE_GIF_START..=EE_GIF_END => self.gif.read(addr),
            EE_VIF0_START..=EE_VIF0_END => self.vifs[0].read(addr),
            EE_VIF1_START..=EE_VIF1_END => self.vifs[1].read(addr),
            EE_DMAC_START..=EE_DMAC_END => ee_dmac::read(self, addr),
            EE_SIF_START..=EE_SIF_END => self.sif.read(addr),
            VU0_CODE_START..=VU0_CODE_END => self.vus.unit(0).read_code32(addr - VU0_CODE_START),
            VU0_DATA_START..=VU0_DATA_END => self.vus.unit(0).read_data32(addr - VU0_DATA_START),
            VU1_CODE_START..=VU1_CODE_END => self.vus.unit(1).read_code32(addr - VU1_CODE_START),
            VU1_DATA_START..=VU1_DATA_END => self.vus.unit(1).read_data32(addr - VU1_DATA_START),
            EE_IOP_RAM_START..=EE_IOP_RAM_END => {
                mem_read32(&self.iop_ram, (addr - EE_IOP_RAM_START) as usize)
            }
            EE_BIOS_START..=EE_BIOS_END => mem_read32(&self.bios, (addr - EE_BIOS_START) as usize),
            INTC_STAT => self.intc.read_stat() as u32,
            INTC_MASK => self.intc.read_mask() as u32,
            D_ENABLER => self.ee_dmac.read_enable(),
            EE_RDRAM_START..=EE_RDRAM_END => self.rdram_read(addr),
            0x1000_F130 | 0x1000_F400 | 0x1000_F410 => 0,
            _ => panic!("[Bus:EE] unhandled 32-bit read @ {addr:#010X}"),
        }
    }

    pub fn read64(&mut self, addr: u32) -> u64 {
        match addr {
            EE_RAM_START..=EE_RAM_END => mem_read64(&self.ram, addr as usize),
            EE_GS_START..=EE_GS_END => self.gs.read_priv(addr),
            EE_BIOS_START..=EE_BIOS_END => mem_read64(&self.bios, (addr - EE_BIOS_START) as usize),
            _ => panic!("[Bus:EE] unhandled 64-bit read @ {addr:#010X}"),
        }
    }

    pub fn read128(&mut self, addr: u32) -> U128 {
        match addr {
            EE_RAM_START..=EE_RAM_END => {
                let addr = addr as usize;

                U128::new(mem_read64(&self.ram, addr), mem_read64(&self.ram, addr + 8))
            }
            EE_BIOS_START..=EE_BIOS_END => {
                let addr = (addr - EE_BIOS_START) as usize;

                U128::new(mem_read64(&self.bios, addr), mem_read64(&self.bios, addr + 8))
            }
            _ => panic!("[Bus:EE] unhandled 128-bit read @ {addr:#010X}"),
        }
    }

    pub fn write8(&mut self, addr: u32, data: u8) {
        match addr {
            EE_RAM_START..=EE_RAM_END => self.ram[addr as usize] = data,
            KPUTCHAR => self.kputchar(data),
            _ => panic!("[Bus:EE] unhandled 8-bit write @ {addr:#010X} = {data:#04X}"),
        }
    }

    pub fn write16(&mut self, addr: u32, data: u16) {
        match addr {
            EE_RAM_START..=EE_RAM_END => {
                self.ram[addr as usize..addr as usize + 2].copy_from_slice(&data.to_le_bytes());
            }
            EE_IOP_IO_START..=EE_IOP_IO_END => {
                tracing::warn!(
                    target: "moe_core::bus",
                    "EE 16-bit write @ {addr:#010X} (IOP I/O) = {data:#06X}"
                );
            }
            0x1A00_0000 | 0x1A00_0002 | 0x1A00_0004 | 0x1A00_0006 | 0x1A00_0008 | 0x1A00_0010 => {
                tracing::trace!(target: "moe_core::bus", "EE 16-bit write @ {addr:#010X} = {data:#06X}");
            }
            _ => panic!("[Bus:EE] unhandled 16-bit write @ {addr:#010X} = {data:#06X}"),
        }
    }

    pub fn write32(&mut self, addr: u32, data: u32) {
        match addr {
            EE_RAM_START..=EE_RAM_END => {
                self.ram[addr as usize..addr as usize + 4].copy_from_slice(&data.to_le_bytes());
            }
            EE_TIMER_START..=EE_TIMER_END => self.ee_timers.write32(addr, data),
            EE_IPU_START..=EE_IPU_END => {
                tracing::trace!(target: "moe_core::bus", "IPU write @ {addr:#010X} = {data:#010X}");
            }
            EE_GIF_START..=EE_GIF_END => self.gif.write(addr, data),
            EE_VIF0_START..=EE_VIF0_END => self.vifs[0].write(addr, data),
            EE_VIF1_START..=EE_VIF1_END => self.vifs[1].write(addr, data),
            EE_DMAC_START..=EE_DMAC_END => ee_dmac::write(self, addr, data),
            EE_SIF_START..=EE_SIF_END => self.sif.write(addr, data),
            VU0_CODE_START..=VU0_CODE_END => {
                self.vus.unit_mut(0).write_code32(addr - VU0_CODE_START, data);
            }
            VU0_DATA_START..=VU0_DATA_END => {
                self.vus.write_data32(0, addr - VU0_DATA_START, data);
            }
            VU1_CODE_START..=VU1_CODE_END => {
                self.vus.unit_mut(1).write_code32(addr - VU1_CODE_START, data);
            }
            VU1_DATA_START..=VU1_DATA_END => {
                self.vus.write_data32(1, addr - VU1_DATA_START, data);
            }
            INTC_STAT => self.intc.write_stat(data as u16),
            INTC_MASK => self.intc.write_mask(data as u16),
            D_ENABLE => self.ee_dmac.write_enable(data),
            EE_RDRAM_START..=EE_RDRAM_END => self.rdram_write(addr, data),
            // Acknowledged-but-unmodeled kernel scratch registers.
            0x1000_F100 | 0x1000_F120 | 0x1000_F140 | 0x1000_F150 | 0x1000_F400 | 0x1000_F410
            | 0x1000_F420 | 0x1000_F450 | 0x1000_F460 | 0x1000_F480 | 0x1000_F490
            | 0x1000_F500 => {
                tracing::trace!(target: "moe_core::bus", "EE 32-bit write @ {addr:#010X} = {data:#010X}");
            }
            _ => panic!("[Bus:EE] unhandled 32-bit write @ {addr:#010X} = {data:#010X}"),
        }
    }

    pub fn write64(&mut self, addr: u32, data: u64) {
        match addr {
            EE_RAM_START..=EE_RAM_END => {
                self.ram[addr as usize..addr as usize + 8].copy_from_slice(&data.to_le_bytes());
            }
            EE_GS_START..=EE_GS_END => self.gs.write_priv(addr, data),
            _ => panic!("[Bus:EE] unhandled 64-bit write @ {addr:#010X} = {data:#018X}"),
        }
    }

    pub fn write128(&mut self, addr: u32, data: U128) {
        match addr {
            EE_RAM_START..=EE_RAM_END => {
                let addr = addr as usize;

                self.ram[addr..addr + 16].copy_from_slice(&data.to_le_bytes());
            }
            GIF_FIFO => self.gif.write_path3(&mut self.gs, data),
            _ => panic!("[Bus:EE] unhandled 128-bit write @ {addr:#010X} = {data}"),
        }
    }

    /* --- IOP bus --- */

    fn in_iop_spram(&self, addr: u32) -> bool {
        addr >= self.spram_start && addr < self.spram_end
    }

    pub fn iop_read8(&mut self, addr: u32) -> u8 {
        if self.in_iop_spram(addr) {
            return self.iop_spram[(addr & (IOP_SPRAM_SIZE - 1)) as usize];
        }

        match addr {
            IOP_RAM_START..=IOP_RAM_END => self.iop_ram[addr as usize],
            IOP_CDVD_START..=IOP_CDVD_END => cdvd::read(self, addr),
            IOP_BIOS_START..=IOP_BIOS_END => self.bios[(addr - IOP_BIOS_START) as usize],
            _ => panic!("[Bus:IOP] unhandled 8-bit read @ {addr:#010X}"),
        }
    }

    pub fn iop_read16(&mut self, addr: u32) -> u16 {
        if self.in_iop_spram(addr) {
            let addr = (addr & (IOP_SPRAM_SIZE - 1)) as usize;

            return mem_read16(&self.iop_spram, addr);
        }

        match addr {
            IOP_RAM_START..=IOP_RAM_END => mem_read16(&self.iop_ram, addr as usize),
            IOP_TIMER0_START..=IOP_TIMER0_END | IOP_TIMER1_START..=IOP_TIMER1_END => {
                self.iop_timers.read16(addr)
            }
            IOP_SPU2_START..=IOP_SPU2_END => 0,
            IOP_BIOS_START..=IOP_BIOS_END => mem_read16(&self.bios, (addr - IOP_BIOS_START) as usize),
            _ => panic!("[Bus:IOP] unhandled 16-bit read @ {addr:#010X}"),
        }
    }

    pub fn iop_read32(&mut self, addr: u32) -> u32 {
        if self.in_iop_spram(addr) {
            let addr = (addr & (IOP_SPRAM_SIZE - 1)) as usize;

            return mem_read32(&self.iop_spram, addr);
        }

        match addr {
            IOP_RAM_START..=IOP_RAM_END => mem_read32(&self.iop_ram, addr as usize),
            IOP_SIF_START..=IOP_SIF_END => self.sif.read_iop(addr),
            IOP_DMA0_START..=IOP_DMA0_END | IOP_DMA1_START..=IOP_DMA1_END => {
                iop_dmac::read32(self, addr)
            }
            IOP_TIMER0_START..=IOP_TIMER0_END | IOP_TIMER1_START..=IOP_TIMER1_END => {
                self.iop_timers.read32(addr)
            }
            IOP_SIO2_START..=IOP_SIO2_END => 0,
            IOP_BIOS_START..=IOP_BIOS_END => mem_read32(&self.bios, (addr - IOP_BIOS_START) as usize),
            I_STAT => self.intc.read_i_stat(),
            I_MASK => self.intc.read_i_mask(),
            I_CTRL => self.intc.read_i_ctrl(),
            RAM_SIZE => 0x0200_0000 >> 4,
            _ => panic!("[Bus:IOP] unhandled 32-bit read @ {addr:#010X}"),
        }
    }

    pub fn iop_write8(&mut self, addr: u32, data: u8) {
        if self.in_iop_spram(addr) {
            self.iop_spram[(addr & (IOP_SPRAM_SIZE - 1)) as usize] = data;
            return;
        }

        match addr {
            IOP_RAM_START..=IOP_RAM_END => self.iop_ram[addr as usize] = data,
            IOP_CDVD_START..=IOP_CDVD_END => cdvd::write(self, addr, data),
            IOP_SIO2_START..=IOP_SIO2_END => {}
            POST => {
                tracing::trace!(target: "moe_core::bus", "POST = {data:#04X}");
            }
            _ => panic!("[Bus:IOP] unhandled 8-bit write @ {addr:#010X} = {data:#04X}"),
        }
    }

    pub fn iop_write16(&mut self, addr: u32, data: u16) {
        if self.in_iop_spram(addr) {
            let addr = (addr & (IOP_SPRAM_SIZE - 1)) as usize;

            self.iop_spram[addr..addr + 2].copy_from_slice(&data.to_le_bytes());
            return;
        }

        match addr {
            IOP_RAM_START..=IOP_RAM_END => {
                let addr = addr as usize;

                self.iop_ram[addr..addr + 2].copy_from_slice(&data.to_le_bytes());
            }
            IOP_DMA0_START..=IOP_DMA0_END | IOP_DMA1_START..=IOP_DMA1_END => {
                iop_dmac::write16(self, addr, data);
            }
            IOP_TIMER0_START..=IOP_TIMER0_END | IOP_TIMER1_START..=IOP_TIMER1_END => {
                self.iop_timers.write16(addr, data);
            }
            IOP_SPU2_START..=IOP_SPU2_END => {}
            _ => panic!("[Bus:IOP] unhandled 16-bit write @ {addr:#010X} = {data:#06X}"),
        }
    }

    pub fn iop_write32(&mut self, addr: u32, data: u32) {
        if self.in_iop_spram(addr) {
            let addr = (addr & (IOP_SPRAM_SIZE - 1)) as usize;

            self.iop_spram[addr..addr + 4].copy_from_slice(&data.to_le_bytes());
            return;
        }

        match addr {
            IOP_RAM_START..=IOP_RAM_END => {
                let addr = addr as usize;

                self.iop_ram[addr..addr + 4].copy_from_slice(&data.to_le_bytes());
            }
            IOP_SIF_START..=IOP_SIF_END => self.sif.write_iop(addr, data),
            IOP_DMA0_START..=IOP_DMA0_END | IOP_DMA1_START..=IOP_DMA1_END => {
                iop_dmac::write32(self, addr, data);
            }
            IOP_TIMER0_START..=IOP_TIMER0_END | IOP_TIMER1_START..=IOP_TIMER1_END => {
                self.iop_timers.write32(addr, data);
            }
            IOP_SIO2_START..=IOP_SIO2_END => {}
            I_STAT => self.intc.write_i_stat(data),
            I_MASK => self.intc.write_i_mask(data),
            I_CTRL => self.intc.write_i_ctrl(data),
            RAM_SIZE => {
                tracing::trace!(target: "moe_core::bus", "RAM_SIZE = {data:#010X}");
            }
            SPRAM_START => self.spram_start = data,
            SPRAM_END => self.spram_end = data,
            // SSBUS delay and memory-control registers.
            0x1F80_1000..=0x1F80_1024 | 0x1F80_1400..=0x1F80_141C | 0x1F80_1450 | 0x1F80_1560
            | 0x1F80_1564 | 0x1F80_1568 | 0x1F80_15F0 => {
                tracing::trace!(target: "moe_core::bus", "SSBUS write @ {addr:#010X} = {data:#010X}");
            }
            _ => panic!("[Bus:IOP] unhandled 32-bit write @ {addr:#010X} = {data:#010X}"),
        }
    }

    /* --- DMA fast paths (IOP RAM only) --- */

    pub fn iop_dma_read32(&self, addr: u32) -> u32 {
        mem_read32(&self.iop_ram, (addr & 0x1F_FFFC) as usize)
    }

    pub fn iop_dma_write32(&mut self, addr: u32, data: u32) {
        let addr = (addr & 0x1F_FFFC) as usize;

        self.iop_ram[addr..addr + 4].copy_from_slice(&data.to_le_bytes());
    }

    /* --- misc --- */

    /// RDRAM init handshake: the kernel writes commands to MCH_RICM, polls
    /// the busy bit and reads device registers back through MCH_DRD.
    fn rdram_write(&mut self, addr: u32, data: u32) {
        match addr {
            0x1000_F430 => self.mch_ricm = data & !(1 << 31),
            0x1000_F440 => self.mch_drd = data,
            _ => panic!("[RDRAM] unhandled 32-bit write @ {addr:#010X} = {data:#010X}"),
        }
    }

    fn rdram_read(&self, addr: u32) -> u32 {
        match addr {
            // Busy bit always clear.
            0x1000_F430 => self.mch_ricm & !(1 << 31),
            // The data port reads back the last write; SDEVID queries start
            // from zero out of reset.
            0x1000_F440 => self.mch_drd,
            _ => panic!("[RDRAM] unhandled 32-bit read @ {addr:#010X}"),
        }
    }

    fn kputchar(&mut self, data: u8) {
        if data == b'\n' {
            tracing::info!(target: "moe_core::tty", "{}", self.tty);

            self.tty.clear();
        } else {
            self.tty.push(data as char);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> Bus {
        Bus::new(vec![0; 0x40_0000], None)
    }

    #[test]
    fn ram_round_trips_at_every_width() {
        let mut bus = bus();

        bus.write8(0x100, 0xAB);
        assert_eq!(bus.read8(0x100), 0xAB);

        bus.write16(0x200, 0xBEEF);
        assert_eq!(bus.read16(0x200), 0xBEEF);
        assert_eq!(bus.read8(0x200), 0xEF);

        bus.write32(0x300, 0xDEAD_BEEF);
        assert_eq!(bus.read32(0x300), 0xDEAD_BEEF);
        assert_eq!(bus.read16(0x300), 0xBEEF);

        bus.write64(0x400, 0x0123_4567_89AB_CDEF);
        assert_eq!(bus.read64(0x400), 0x0123_4567_89AB_CDEF);
        assert_eq!(bus.read32(0x400), 0x89AB_CDEF);

        let quad = U128::new(0x1111_2222_3333_4444, 0x5555_6666_7777_8888);
        bus.write128(0x500, quad);
        assert_eq!(bus.read128(0x500), quad);
        assert_eq!(bus.read64(0x508), 0x5555_6666_7777_8888);
    }

    #[test]
    fn bios_window_is_visible_on_both_sides() {
        let mut bios = vec![0u8; 0x40_0000];
        bios[0..4].copy_from_slice(&0x3C08_BFC0u32.to_le_bytes());

        let mut bus = Bus::new(bios, None);

        assert_eq!(bus.read32(0x1FC0_0000), 0x3C08_BFC0);
        assert_eq!(bus.iop_read32(0x1FC0_0000), 0x3C08_BFC0);
    }

    #[test]
    fn iop_ram_mirror_on_the_ee_side() {
        let mut bus = bus();

        bus.iop_write32(0x1234, 0xCAFE_BABE);
        assert_eq!(bus.read32(0x1C00_1234), 0xCAFE_BABE);
    }

    #[test]
    fn iop_scratchpad_window_moves() {
        let mut bus = bus();

        bus.iop_write32(0x1F80_0000, 0x11223344);
        assert_eq!(bus.iop_read32(0x1F80_0000), 0x11223344);

        // Move the window; the old address is no longer scratchpad.
        bus.iop_write32(SPRAM_START, 0x1F80_4000);
        bus.iop_write32(SPRAM_END, 0x1F80_4400);

        assert_eq!(bus.iop_read32(0x1F80_4000), 0x11223344);
    }

    #[test]
    fn intc_registers_are_reachable_from_both_cpus() {
        let mut bus = bus();

        bus.intc.send_interrupt(crate::intc::Interrupt::VblankStart);
        assert_eq!(bus.read32(INTC_STAT), 1 << 2);

        bus.write32(INTC_STAT, 1 << 2);
        assert_eq!(bus.read32(INTC_STAT), 0);

        bus.iop_write32(I_MASK, 0x3);
        assert_eq!(bus.iop_read32(I_MASK), 0x3);
    }

    #[test]
    fn silent_register_whitelist() {
        let mut bus = bus();

        assert_eq!(bus.read16(0x1A00_0006), 1);
        assert_eq!(bus.read16(0x1000_F480), 0);
        assert_eq!(bus.read32(0x1000_F130), 0);
        assert_eq!(bus.read32(D_ENABLER), 0x1201);

        bus.write32(0x1000_F100, 0x1234_5678);
    }

    #[test]
    #[should_panic(expected = "unhandled 32-bit read")]
    fn unmapped_read_is_fatal() {
        let mut bus = bus();

        bus.read32(0x1000_7000);
    }

    /// 240 scanlines of HBLANK events raise VBLANKStart on both sides and
    /// flip the GS CSR bits.
    #[test]
    fn vblank_start_after_240_scanlines() {
        let mut bus = bus();

        for _ in 0..240 {
            bus.process_events(gs::CYCLES_PER_SCANLINE);
        }
        bus.process_events(1);

        assert_eq!(bus.gs.line_counter, 240);
        assert_eq!(bus.intc.read_stat() & (1 << 2), 1 << 2);
        assert_eq!(bus.intc.read_i_stat() & (1 << 0), 1 << 0);
        assert!(bus.gs.csr & (1 << 3) != 0);
        assert!(bus.gs.csr & (1 << 2) != 0);

        // 22 more lines wrap the frame and raise VBLANKEnd.
        for _ in 0..22 {
            bus.process_events(gs::CYCLES_PER_SCANLINE);
        }
        assert_eq!(bus.gs.line_counter, 0);
        assert_eq!(bus.intc.read_stat() & (1 << 3), 1 << 3);
        assert_eq!(bus.intc.read_i_stat() & (1 << 11), 1 << 11);
    }
}
