//! Graphics Interface: GIFtag decoding and the PATH3 entry point.

use crate::gs::Gs;
use crate::types::U128;

/* GIF registers */
const CTRL: u32 = 0x1000_3000;
const MODE: u32 = 0x1000_3010;
const STAT: u32 = 0x1000_3020;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Packed,
    Reglist,
    Image,
}

/// Decoded GIFtag.
#[derive(Clone, Copy)]
struct GifTag {
    nloop: u16,
    eop: bool,
    prim: bool,
    pdata: u16,
    nregs: u8,
    regs: u64,

    fmt: Format,
}

impl GifTag {
    fn decode(data: U128) -> Self {
        let nregs = match (data.lo >> 60) as u8 {
            0 => 16, // NREGS = 0 encodes 16
            n => n,
        };

        let fmt = match (data.lo >> 58) & 3 {
            0 => Format::Packed,
            1 => Format::Reglist,
            _ => Format::Image,
        };

        Self {
            nloop: data.u16(0) & 0x7FFF,
            eop: data.u16(0) & (1 << 15) != 0,
            prim: data.lo & (1 << 46) != 0,
            pdata: ((data.lo >> 47) & 0x7FF) as u16,
            nregs,
            regs: data.hi,
            fmt,
        }
    }

    /// Register descriptor for slot `n` of the nibble stream.
    fn reg(&self, n: u8) -> u8 {
        ((self.regs >> (4 * n)) & 0xF) as u8
    }
}

pub struct Gif {
    tag: Option<GifTag>,

    nloop: u16,
    nregs: u8,
}

impl Gif {
    pub fn new() -> Self {
        Self { tag: None, nloop: 0, nregs: 0 }
    }

    pub fn read(&self, addr: u32) -> u32 {
        match addr {
            STAT => 0,
            _ => panic!("[GIF] unhandled read @ {addr:#010X}"),
        }
    }

    pub fn write(&mut self, addr: u32, data: u32) {
        match addr {
            CTRL => {
                if data & 1 != 0 {
                    tracing::debug!(target: "moe_core::gif", "GIF reset");

                    self.tag = None;
                    self.nloop = 0;
                    self.nregs = 0;
                }
            }
            MODE => tracing::trace!(target: "moe_core::gif", "GIF_MODE = {data:#010X}"),
            _ => panic!("[GIF] unhandled write @ {addr:#010X} = {data:#010X}"),
        }
    }

    /// PATH3 quadword entry point (EE DMAC channel 2 and the GIF FIFO).
    pub fn write_path3(&mut self, gs: &mut Gs, data: U128) {
        let Some(tag) = self.tag else {
            let tag = GifTag::decode(data);

            tracing::debug!(
                target: "moe_core::gif",
                "new GIFtag: fmt = {:?}, NLOOP = {}, NREGS = {}, EOP = {}",
                tag.fmt, tag.nloop, tag.nregs, tag.eop
            );

            gs.init_q();

            if tag.prim {
                gs.write(crate::gs::PRIM, tag.pdata as u64);
            }

            if tag.nloop != 0 {
                self.nloop = tag.nloop;
                self.nregs = 0;
                self.tag = Some(tag);
            }

            return;
        };

        match tag.fmt {
            Format::Packed => self.do_packed(gs, &tag, data),
            Format::Reglist => self.do_reglist(gs, &tag, data),
            Format::Image => self.do_image(gs, data),
        }
    }

    fn do_packed(&mut self, gs: &mut Gs, tag: &GifTag, data: U128) {
        gs.write_packed(tag.reg(self.nregs), data);

        self.nregs += 1;

        if self.nregs == tag.nregs {
            self.nregs = 0;
            self.nloop -= 1;

            if self.nloop == 0 {
                self.tag = None;
            }
        }
    }

    fn do_reglist(&mut self, gs: &mut Gs, tag: &GifTag, data: U128) {
        for half in [data.lo, data.hi] {
            // The upper doubleword of the last quad is dropped for odd
            // register counts.
            if self.tag.is_none() {
                break;
            }

            let reg = tag.reg(self.nregs);

            if reg != crate::gs::NOP {
                gs.write(reg, half);
            }

            self.nregs += 1;

            if self.nregs == tag.nregs {
                self.nregs = 0;
                self.nloop -= 1;

                if self.nloop == 0 {
                    self.tag = None;
                }
            }
        }
    }

    fn do_image(&mut self, gs: &mut Gs, data: U128) {
        gs.write_hwreg(data.lo);
        gs.write_hwreg(data.hi);

        self.nloop -= 1;

        if self.nloop == 0 {
            self.tag = None;
        }
    }
}

impl Default for Gif {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed_tag(nloop: u16, nregs: u8, regs: u64) -> U128 {
        U128::new((1 << 15) as u64 | nloop as u64 | ((nregs as u64) << 60), regs)
    }

    #[test]
    fn packed_ad_loop_reaches_the_gs() {
        let mut gif = Gif::new();
        let mut gs = Gs::new();

        // One loop of a single A+D register.
        gif.write_path3(&mut gs, packed_tag(2, 1, 0xE));

        // COLCLAMP = 1 via A+D.
        gif.write_path3(&mut gs, U128::new(1, 0x46));
        // PRMODECONT = 0.
        gif.write_path3(&mut gs, U128::new(0, 0x1A));

        // Tag consumed: the next quadword starts a fresh one.
        gif.write_path3(&mut gs, packed_tag(1, 1, 0xF));
        gif.write_path3(&mut gs, U128::ZERO);
    }

    #[test]
    fn nregs_zero_encodes_sixteen() {
        let tag = GifTag::decode(U128::new(1, 0));
        assert_eq!(tag.nregs, 16);
    }

    #[test]
    fn image_transfer_counts_quadwords() {
        let mut gif = Gif::new();
        let mut gs = Gs::new();

        // IMAGE format, NLOOP = 2.
        let tag = U128::new(2 | (2 << 58), 0);
        gif.write_path3(&mut gs, tag);
        gif.write_path3(&mut gs, U128::new(0xAA, 0xBB));
        gif.write_path3(&mut gs, U128::new(0xCC, 0xDD));

        // Back to tag state.
        gif.write_path3(&mut gs, U128::new(1 | (2 << 58), 0));
    }
}
