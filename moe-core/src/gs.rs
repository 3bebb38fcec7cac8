//! Graphics Synthesizer front-end.
//!
//! Privileged and internal register files plus the scanline event loop.
//! Rasterization is stubbed: primitives are queued per-vertex and the only
//! drawer is the sprite path, which resolves its bounding box and stops.

use crate::bus::Bus;
use crate::intc::{Interrupt, IopInterrupt};
use crate::types::U128;

pub const CYCLES_PER_SCANLINE: i64 = 2 * 9370; // NTSC, in EE cycles
pub const SCANLINES_PER_VDRAW: i64 = 240;
pub const SCANLINES_PER_FRAME: i64 = 262;

/* CSR bits */
const CSR_HBLANK: u64 = 1 << 2;
const CSR_VBLANK: u64 = 1 << 3;
const CSR_FIELD: u64 = 1 << 13;

/// Vertices consumed per primitive kind.
const PRIM_VERTEX_COUNT: [usize; 8] = [1, 2, 2, 3, 3, 3, 2, 1];

const PRIM_SPRITE: u8 = 6;

/* GS internal registers */
pub const PRIM: u8 = 0x00;
pub const RGBAQ: u8 = 0x01;
pub const ST: u8 = 0x02;
pub const UV: u8 = 0x03;
pub const XYZ2: u8 = 0x05;
pub const ADDRDATA: u8 = 0x0E;
pub const NOP: u8 = 0x0F;
pub const XYOFFSET_1: u8 = 0x18;
pub const XYOFFSET_2: u8 = 0x19;
pub const PRMODECONT: u8 = 0x1A;
pub const PRMODE: u8 = 0x1B;
pub const DTHE: u8 = 0x45;
pub const COLCLAMP: u8 = 0x46;
pub const TEST_1: u8 = 0x47;
pub const TEST_2: u8 = 0x48;
pub const SCISSOR_1: u8 = 0x40;
pub const SCISSOR_2: u8 = 0x41;
pub const FRAME_1: u8 = 0x4C;
pub const FRAME_2: u8 = 0x4D;
pub const ZBUF_1: u8 = 0x4E;
pub const ZBUF_2: u8 = 0x4F;
pub const FINISH: u8 = 0x61;

/* GS privileged registers */
const PMODE: u32 = 0x1200_0000;
const SMODE1: u32 = 0x1200_0010;
const SMODE2: u32 = 0x1200_0020;
const SRFSH: u32 = 0x1200_0030;
const SYNCH1: u32 = 0x1200_0040;
const SYNCH2: u32 = 0x1200_0050;
const SYNCV: u32 = 0x1200_0060;
const DISPFB2: u32 = 0x1200_0090;
const DISPLAY2: u32 = 0x1200_00A0;
const BGCOLOR: u32 = 0x1200_00E0;
const CSR: u32 = 0x1200_1000;
const IMR: u32 = 0x1200_1010;

#[derive(Clone, Copy, Debug, Default)]
struct Vertex {
    x: i64,
    y: i64,
    z: i64,

    r: u8,
    g: u8,
    b: u8,
    a: u8,

    q: f32,
}

/// Primitive control (PRIM/PRMODE).
#[derive(Clone, Copy, Debug, Default)]
struct Prim {
    prim: u8,
    iip: bool,
    tme: bool,
    fge: bool,
    abe: bool,
    aa1: bool,
    fst: bool,
    ctxt: bool,
    fix: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct Rgbaq {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
    q: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Frame {
    fbp: u32,
    fbw: u32,
    psm: u8,
    fbmsk: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Scissor {
    scax0: i64,
    scax1: i64,
    scay0: i64,
    scay1: i64,
}

#[derive(Clone, Copy, Debug, Default)]
struct Test {
    ate: bool,
    atst: u8,
    aref: u8,
    afail: u8,
    date: bool,
    datm: bool,
    zte: bool,
    ztst: u8,
}

#[derive(Clone, Copy, Debug, Default)]
struct XyOffset {
    ofx: i64,
    ofy: i64,
}

#[derive(Clone, Copy, Debug, Default)]
struct Zbuf {
    zbp: u32,
    psm: u8,
    zmsk: bool,
}

/// One of the two drawing environment contexts.
#[derive(Clone, Copy, Debug, Default)]
struct Context {
    frame: Frame,
    scissor: Scissor,
    test: Test,
    xyoffset: XyOffset,
    zbuf: Zbuf,
}

pub struct Gs {
    ctx: [Context; 2],

    prim: Prim,
    prmode: Prim,
    /// PRMODECONT.AC: attributes come from PRIM instead of PRMODE.
    use_prim: bool,

    rgbaq: Rgbaq,
    colclamp: bool,

    pub csr: u64,
    imr: u64,
    pmode: u64,
    smode1: u64,
    smode2: u64,
    dispfb2: u64,
    display2: u64,
    bgcolor: u64,

    vram: Vec<u32>,

    vtx_queue: [Vertex; 3],
    vtx_count: usize,

    pub line_counter: i64,
}

impl Gs {
    pub fn new() -> Self {
        Self {
            ctx: [Context::default(); 2],
            prim: Prim::default(),
            prmode: Prim::default(),
            use_prim: true,
            rgbaq: Rgbaq::default(),
            colclamp: false,
            csr: 0,
            imr: 0,
            pmode: 0,
            smode1: 0,
            smode2: 0,
            dispfb2: 0,
            display2: 0,
            bgcolor: 0,
            vram: vec![0; 2048 * 2048 / 4], // 4 MB
            vtx_queue: [Vertex::default(); 3],
            vtx_count: 0,
            line_counter: 0,
        }
    }

    /// Initial value of the Q register (set when a GIFtag arrives).
    pub fn init_q(&mut self) {
        self.rgbaq.q = 1.0;
    }

    fn cmode(&self) -> Prim {
        if self.use_prim {
            self.prim
        } else {
            self.prmode
        }
    }

    pub fn read_priv(&self, addr: u32) -> u64 {
        match addr {
            CSR => self.csr | 2,
            IMR => self.imr,
            _ => panic!("[GS] unhandled 64-bit read @ {addr:#010X}"),
        }
    }

    pub fn write_priv(&mut self, addr: u32, data: u64) {
        tracing::trace!(target: "moe_core::gs", "priv write @ {addr:#010X} = {data:#018X}");

        match addr {
            PMODE => self.pmode = data,
            SMODE1 => self.smode1 = data,
            SMODE2 => self.smode2 = data,
            SRFSH | SYNCH1 | SYNCH2 | SYNCV => {}
            DISPFB2 => self.dispfb2 = data,
            DISPLAY2 => self.display2 = data,
            BGCOLOR => self.bgcolor = data,
            CSR => self.csr = data,
            IMR => self.imr = data,
            _ => panic!("[GS] unhandled 64-bit write @ {addr:#010X} = {data:#018X}"),
        }
    }

    fn decode_prim(data: u64) -> Prim {
        Prim {
            prim: (data & 7) as u8,
            iip: data & (1 << 3) != 0,
            tme: data & (1 << 4) != 0,
            fge: data & (1 << 5) != 0,
            abe: data & (1 << 6) != 0,
            aa1: data & (1 << 7) != 0,
            fst: data & (1 << 8) != 0,
            ctxt: data & (1 << 9) != 0,
            fix: data & (1 << 10) != 0,
        }
    }

    fn decode_test(data: u64) -> Test {
        Test {
            ate: data & 1 != 0,
            atst: ((data >> 1) & 7) as u8,
            aref: (data >> 4) as u8,
            afail: ((data >> 12) & 3) as u8,
            date: data & (1 << 14) != 0,
            datm: data & (1 << 15) != 0,
            zte: data & (1 << 16) != 0,
            ztst: ((data >> 17) & 3) as u8,
        }
    }

    /// Writes an internal GS register.
    pub fn write(&mut self, addr: u8, data: u64) {
        tracing::trace!(target: "moe_core::gs", "write @ {addr:#04X} = {data:#018X}");

        match addr {
            PRIM => {
                self.prim = Self::decode_prim(data);
                self.vtx_count = 0;
            }
            RGBAQ => {
                self.rgbaq.r = data as u8;
                self.rgbaq.g = (data >> 8) as u8;
                self.rgbaq.b = (data >> 16) as u8;
                self.rgbaq.a = (data >> 24) as u8;

                // Low mantissa bits of Q are dropped.
                self.rgbaq.q = f32::from_bits((data >> 32) as u32 & !0xFF);
            }
            ST | UV => {}
            XYZ2 => self.queue_vertex(data),
            NOP => {}
            XYOFFSET_1 | XYOFFSET_2 => {
                let xyoffset = &mut self.ctx[(addr - XYOFFSET_1) as usize].xyoffset;

                xyoffset.ofx = (data & 0xFFFF) as i64;
                xyoffset.ofy = ((data >> 32) & 0xFFFF) as i64;
            }
            PRMODECONT => self.use_prim = data & 1 != 0,
            PRMODE => {
                let prim = self.prmode.prim;

                self.prmode = Self::decode_prim(data);
                self.prmode.prim = prim;
            }
            SCISSOR_1 | SCISSOR_2 => {
                let scissor = &mut self.ctx[(addr - SCISSOR_1) as usize].scissor;

                // Scaled to the 12.4 vertex coordinate format up front.
                scissor.scax0 = ((data & 0x7FF) as i64) << 4;
                scissor.scax1 = (((data >> 16) & 0x7FF) as i64) << 4;
                scissor.scay0 = (((data >> 32) & 0x7FF) as i64) << 4;
                scissor.scay1 = (((data >> 48) & 0x7FF) as i64) << 4;
            }
            DTHE => {}
            COLCLAMP => self.colclamp = data & 1 != 0,
            TEST_1 | TEST_2 => self.ctx[(addr - TEST_1) as usize].test = Self::decode_test(data),
            FRAME_1 | FRAME_2 => {
                let frame = &mut self.ctx[(addr - FRAME_1) as usize].frame;

                // Base pointer and width are pre-scaled to words.
                frame.fbp = 2048 * (data & 0x1FF) as u32;
                frame.fbw = 64 * ((data >> 16) & 0x3F) as u32;
                frame.psm = ((data >> 24) & 0x3F) as u8;
                frame.fbmsk = (data >> 32) as u32;
            }
            ZBUF_1 | ZBUF_2 => {
                let zbuf = &mut self.ctx[(addr - ZBUF_1) as usize].zbuf;

                zbuf.zbp = 2048 * (data & 0x1FF) as u32;
                zbuf.psm = ((data >> 24) & 0xF) as u8;
                zbuf.zmsk = data & (1 << 32) != 0;
            }
            FINISH => {
                // FINISH event: reflected in CSR bit 1, which the privileged
                // read keeps set anyway.
            }
            _ => panic!("[GS] unhandled write @ {addr:#04X} = {data:#018X}"),
        }
    }

    /// IMAGE-mode data destined for the transmission buffer.
    pub fn write_hwreg(&mut self, data: u64) {
        tracing::trace!(target: "moe_core::gs", "HWREG = {data:#018X}");
    }

    /// PACKED-format register write from the GIF.
    pub fn write_packed(&mut self, addr: u8, data: U128) {
        match addr {
            ADDRDATA => self.write(data.u8(8) & 0x7F, data.lo),
            NOP => {}
            _ => panic!("[GS] unhandled PACKED write @ {addr:#04X} = {data}"),
        }
    }

    fn queue_vertex(&mut self, data: u64) {
        let vtx = Vertex {
            x: (data & 0xFFFF) as i64,
            y: ((data >> 16) & 0xFFFF) as i64,
            z: (data >> 32) as i64,
            r: self.rgbaq.r,
            g: self.rgbaq.g,
            b: self.rgbaq.b,
            a: self.rgbaq.a,
            q: self.rgbaq.q,
        };

        self.vtx_queue[self.vtx_count] = vtx;
        self.vtx_count += 1;

        let prim = self.cmode().prim;

        if self.vtx_count == PRIM_VERTEX_COUNT[prim as usize] {
            match prim {
                PRIM_SPRITE => self.draw_sprite(),
                _ => panic!("[GS] unhandled primitive {prim}"),
            }

            self.vtx_count = 0;
        }
    }

    /// Sprite drawing stub: scissored bounding box, flat fill only.
    fn draw_sprite(&mut self) {
        let cmode = self.cmode();
        let cctx = &self.ctx[cmode.ctxt as usize];

        let mut v0 = self.vtx_queue[0];
        let mut v1 = self.vtx_queue[1];

        v0.x -= cctx.xyoffset.ofx;
        v0.y -= cctx.xyoffset.ofy;
        v1.x -= cctx.xyoffset.ofx;
        v1.y -= cctx.xyoffset.ofy;

        let x_min = (v0.x.min(v1.x).max(cctx.scissor.scax0) >> 4) << 4;
        let x_max = (v0.x.max(v1.x).min(cctx.scissor.scax1 + 0x10) >> 4) << 4;
        let y_min = (v0.y.min(v1.y).max(cctx.scissor.scay0) >> 4) << 4;
        let y_max = (v0.y.max(v1.y).min(cctx.scissor.scay1 + 0x10) >> 4) << 4;

        tracing::debug!(
            target: "moe_core::gs",
            "sprite [{}, {}] - [{}, {}], color {:02X}{:02X}{:02X}{:02X}",
            x_min >> 4, y_min >> 4, x_max >> 4, y_max >> 4, v1.a, v1.b, v1.g, v1.r
        );

        // Flat fill, no texturing or blending yet.
        let color =
            v1.r as u32 | (v1.g as u32) << 8 | (v1.b as u32) << 16 | (v1.a as u32) << 24;

        let frame = cctx.frame;

        for y in (y_min >> 4)..(y_max >> 4) {
            for x in (x_min >> 4)..(x_max >> 4) {
                let addr =
                    (frame.fbp + y as u32 * frame.fbw + x as u32) as usize & (self.vram.len() - 1);

                self.vram[addr] = (self.vram[addr] & frame.fbmsk) | (color & !frame.fbmsk);
            }
        }
    }
}

impl Default for Gs {
    fn default() -> Self {
        Self::new()
    }
}

/// Scanline callback. Re-queues itself every `CYCLES_PER_SCANLINE` EE cycles
/// with the residual rolled in, so drift stays bounded.
pub(crate) fn hblank_event(bus: &mut Bus, _param: i32, residual: i64) {
    bus.ee_timers.step_hblank(&mut bus.intc);
    bus.iop_timers.step_hblank(&mut bus.intc);

    bus.gs.csr |= CSR_HBLANK;
    bus.gs.line_counter += 1;

    if bus.gs.line_counter == SCANLINES_PER_VDRAW {
        bus.intc.send_interrupt(Interrupt::VblankStart);
        bus.intc.send_interrupt_iop(IopInterrupt::VblankStart);

        bus.gs.csr |= CSR_VBLANK;
        bus.gs.csr ^= CSR_FIELD;
    } else if bus.gs.line_counter == SCANLINES_PER_FRAME {
        bus.intc.send_interrupt(Interrupt::VblankEnd);
        bus.intc.send_interrupt_iop(IopInterrupt::VblankEnd);

        bus.gs.line_counter = 0;
    }

    let id = bus.gs_hblank_event;
    bus.scheduler.add_event(id, 0, CYCLES_PER_SCANLINE + residual, false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csr_read_keeps_the_fifo_bit() {
        let mut gs = Gs::new();

        gs.write_priv(CSR, 0x10);
        assert_eq!(gs.read_priv(CSR), 0x12);
    }

    #[test]
    fn packed_ad_routes_to_the_register_file() {
        let mut gs = Gs::new();

        // A+D write of COLCLAMP = 1.
        let data = U128::new(1, COLCLAMP as u64);
        gs.write_packed(ADDRDATA, data);
        assert!(gs.colclamp);
    }

    #[test]
    fn sprite_dispatches_after_two_vertices() {
        let mut gs = Gs::new();

        gs.write(PRIM, PRIM_SPRITE as u64);
        gs.write(RGBAQ, 0x80_40_20_10);
        gs.write(XYZ2, (100 << 4) | ((80 << 4) << 16));
        assert_eq!(gs.vtx_count, 1);

        gs.write(XYZ2, (200 << 4) | ((160 << 4) << 16));
        assert_eq!(gs.vtx_count, 0);
    }
}
