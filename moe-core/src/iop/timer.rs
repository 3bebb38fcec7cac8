//! IOP timers (x6). Timers 0-2 are 16-bit, timers 3-5 are 32-bit.

use proc_bitfield::bitfield;

use crate::intc::{Intc, IopInterrupt};

/* Register offsets, normalized to the timer 0 bank */
const COUNT: u32 = 0x1F80_1100;
const MODE: u32 = 0x1F80_1104;
const COMP: u32 = 0x1F80_1108;

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Mode(pub u16): Debug, FromStorage, IntoStorage, DerefStorage {
        pub gate: bool @ 0,
        pub gats: u8 @ 1..=2,
        pub zret: bool @ 3,
        pub cmpe: bool @ 4,
        pub ovfe: bool @ 5,
        pub rept: bool @ 6,
        pub levl: bool @ 7,
        pub clks: bool @ 8,
        pub pre2: bool @ 9,
        pub intf: bool @ 10,
        pub equf: bool @ 11,
        pub ovff: bool @ 12,
        pub pre4: u8 @ 13..=14,
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode(0)
    }
}

#[derive(Clone, Copy, Default)]
struct Timer {
    mode: Mode,
    count: u64,
    comp: u32,

    subcount: u32,
    prescaler: u32,
}

fn interrupt_for(timer_id: usize) -> IopInterrupt {
    match timer_id {
        0 => IopInterrupt::Timer0,
        1 => IopInterrupt::Timer1,
        2 => IopInterrupt::Timer2,
        3 => IopInterrupt::Timer3,
        4 => IopInterrupt::Timer4,
        _ => IopInterrupt::Timer5,
    }
}

impl Timer {
    fn width_mask(timer_id: usize) -> u64 {
        if timer_id < 3 {
            0xFFFF
        } else {
            0xFFFF_FFFF
        }
    }

    /// Sends the timer interrupt if INTF allows it, then updates INTF for
    /// the repeat/toggle modes.
    fn send_interrupt(&mut self, timer_id: usize, intc: &mut Intc) {
        if self.mode.intf() {
            intc.send_interrupt_iop(interrupt_for(timer_id));
        }

        if self.mode.rept() && self.mode.levl() {
            let intf = self.mode.intf();
            self.mode.set_intf(!intf);
        } else {
            self.mode.set_intf(false);
        }
    }

    fn tick(&mut self, timer_id: usize, intc: &mut Intc) {
        self.count += 1;

        let overflow = 1 << if timer_id < 3 { 16 } else { 32 };

        if self.count & overflow != 0 {
            if self.mode.ovfe() && !self.mode.ovff() {
                // Edge triggered, like the compare flag below.
                self.mode.set_ovff(true);

                self.send_interrupt(timer_id, intc);
            }

            self.count &= Self::width_mask(timer_id);
        }

        if self.count == self.comp as u64 {
            if self.mode.cmpe() && !self.mode.equf() {
                self.mode.set_equf(true);

                self.send_interrupt(timer_id, intc);
            }

            if self.mode.zret() {
                self.count = 0;
            }
        }
    }
}

pub struct Timers {
    timers: [Timer; 6],
}

fn timer_id(addr: u32) -> usize {
    match (addr >> 4) & 0xFF {
        0x10 => 0,
        0x11 => 1,
        0x12 => 2,
        0x48 => 3,
        0x49 => 4,
        0x4A => 5,
        _ => panic!("[Timer:IOP] invalid timer @ {addr:#010X}"),
    }
}

impl Timers {
    pub fn new() -> Self {
        let mut timers = [Timer::default(); 6];

        for timer in &mut timers {
            timer.prescaler = 1;
        }

        Self { timers }
    }

    pub fn read16(&mut self, addr: u32) -> u16 {
        let chn = timer_id(addr);

        let timer = &mut self.timers[chn];

        match (addr & !0xFF0) | (1 << 8) {
            COUNT => timer.count as u16,
            MODE => {
                let data = timer.mode.0;

                // Flag bits reset after reading.
                timer.mode.set_equf(false);
                timer.mode.set_ovff(false);

                data
            }
            COMP => timer.comp as u16,
            _ => panic!("[Timer:IOP] unhandled 16-bit read @ {addr:#010X}"),
        }
    }

    pub fn read32(&mut self, addr: u32) -> u32 {
        let chn = timer_id(addr);

        match (addr & !0xFF0) | (1 << 8) {
            COUNT => self.timers[chn].count as u32,
            MODE => self.read16(addr) as u32,
            COMP => self.timers[chn].comp,
            _ => panic!("[Timer:IOP] unhandled 32-bit read @ {addr:#010X}"),
        }
    }

    pub fn write16(&mut self, addr: u32, data: u16) {
        self.write32(addr, data as u32);
    }

    pub fn write32(&mut self, addr: u32, data: u32) {
        let chn = timer_id(addr);

        let timer = &mut self.timers[chn];

        match (addr & !0xFF0) | (1 << 8) {
            COUNT => {
                timer.count = (data as u64) & Timer::width_mask(chn);
            }
            MODE => {
                tracing::trace!(target: "moe_core::iop::timer", "T{chn}_MODE = {data:#06X}");

                timer.mode = Mode(data as u16 & 0x63FF);
                timer.mode.set_intf(true); // always reset to 1

                timer.prescaler = if chn == 2 && timer.mode.pre2() {
                    8
                } else if chn >= 4 {
                    match timer.mode.pre4() {
                        0 => 1,
                        1 => 8,
                        2 => 16,
                        _ => 256,
                    }
                } else {
                    1
                };

                timer.subcount = 0;
                timer.count = 0; // always cleared
            }
            COMP => {
                timer.comp = data & Timer::width_mask(chn) as u32;

                if !timer.mode.levl() {
                    timer.mode.set_intf(true);
                }
            }
            _ => panic!("[Timer:IOP] unhandled 32-bit write @ {addr:#010X} = {data:#010X}"),
        }
    }

    /// Steps system-clock sourced timers.
    pub fn step(&mut self, cycles: i64, intc: &mut Intc) {
        for chn in 0..6 {
            // Timers 0, 1 and 3 switch to an external source when CLKS is set.
            if self.timers[chn].mode.clks() && matches!(chn, 0 | 1 | 3) {
                continue;
            }

            let timer = &mut self.timers[chn];

            timer.subcount += cycles as u32;

            while timer.subcount >= timer.prescaler {
                timer.subcount -= timer.prescaler;

                timer.tick(chn, intc);
            }
        }
    }

    /// Ticks HBLANK-sourced timers (1 and 3), once per scanline.
    pub fn step_hblank(&mut self, intc: &mut Intc) {
        for chn in [1, 3] {
            let timer = &mut self.timers[chn];

            if timer.mode.clks() {
                timer.tick(chn, intc);
            }
        }
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_write_clears_count_and_arms_intf() {
        let mut timers = Timers::new();

        timers.write32(COUNT, 0x1234);
        timers.write32(MODE, 1 << 4);

        assert_eq!(timers.read32(COUNT), 0);
        assert!(timers.read16(MODE) & (1 << 10) != 0);
    }

    #[test]
    fn compare_interrupt_reaches_the_intc() {
        let mut timers = Timers::new();
        let mut intc = Intc::new();

        // Timer 2, CMPE, system clock.
        let base = 0x1F80_1120;
        timers.write32(base + 4, 1 << 4);
        timers.write32(base + 8, 3);

        timers.step(3, &mut intc);
        assert_eq!(intc.read_i_stat() & (1 << 6), 1 << 6);
    }

    #[test]
    fn timer4_prescaler_and_32_bit_width() {
        let mut timers = Timers::new();
        let mut intc = Intc::new();

        let base = 0x1F80_1490;
        timers.write32(base + 4, 1 << 13); // PRE4 = /8

        timers.step(16, &mut intc);
        assert_eq!(timers.read32(base), 2);

        timers.write32(base, 0x1_0000);
        assert_eq!(timers.read32(base), 0x1_0000);
    }

    #[test]
    fn mode_read_clears_flag_bits() {
        let mut timers = Timers::new();
        let mut intc = Intc::new();

        timers.write32(MODE, (1 << 4) | (1 << 3)); // CMPE | ZRET
        timers.write32(COMP, 1);
        timers.step(1, &mut intc);

        assert!(timers.read16(MODE) & (1 << 11) != 0);
        assert!(timers.read16(MODE) & (1 << 11) == 0);
    }
}
