//! EE timers (x4).

use proc_bitfield::bitfield;

use crate::intc::{Intc, Interrupt};

/* Register offsets within a timer bank */
const COUNT: u32 = 0x10000000;
const MODE: u32 = 0x10000010;
const COMP: u32 = 0x10000020;
const HOLD: u32 = 0x10000030;

const TIMER_INTS: [Interrupt; 4] =
    [Interrupt::Timer0, Interrupt::Timer1, Interrupt::Timer2, Interrupt::Timer3];

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Mode(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub clks: u8 @ 0..=1,
        pub gate: bool @ 2,
        pub gats: bool @ 3,
        pub gatm: u8 @ 4..=5,
        pub zret: bool @ 6,
        pub cue: bool @ 7,
        pub cmpe: bool @ 8,
        pub ovfe: bool @ 9,
        pub equf: bool @ 10,
        pub ovff: bool @ 11,
    }
}

#[derive(Clone, Copy, Default)]
struct Timer {
    mode: Mode,
    count: u32,
    comp: u16,
    hold: u16,

    subcount: u32,
    prescaler: u32,
}

impl Default for Mode {
    fn default() -> Self {
        Mode(0)
    }
}

impl Timer {
    /// One counter increment; returns true on an interrupt edge.
    fn tick(&mut self) -> bool {
        let mut irq = false;

        self.count += 1;

        if self.count == self.comp as u32 {
            if self.mode.cmpe() && !self.mode.equf() {
                // Timer IRQs are edge triggered.
                self.mode.set_equf(true);

                irq = true;
            }

            if self.mode.zret() {
                self.count = 0;
            }
        } else if self.count & (1 << 16) != 0 {
            if self.mode.ovfe() && !self.mode.ovff() {
                self.mode.set_ovff(true);

                irq = true;
            }

            self.count &= 0xFFFF;
        }

        irq
    }
}

pub struct Timers {
    timers: [Timer; 4],
}

impl Timers {
    pub fn new() -> Self {
        let mut timers = [Timer::default(); 4];

        for timer in &mut timers {
            timer.prescaler = 1;
        }

        Self { timers }
    }

    pub fn read32(&self, addr: u32) -> u32 {
        let chn = ((addr >> 11) & 3) as usize;

        let timer = &self.timers[chn];

        match addr & !0x1800 {
            COUNT => timer.count,
            MODE => timer.mode.0,
            COMP => timer.comp as u32,
            HOLD => timer.hold as u32,
            _ => panic!("[Timer:EE] unhandled 32-bit read @ {addr:#010X}"),
        }
    }

    pub fn write32(&mut self, addr: u32, data: u32) {
        let chn = ((addr >> 11) & 3) as usize;

        let timer = &mut self.timers[chn];

        match addr & !0x1800 {
            COUNT => timer.count = data & 0xFFFF,
            MODE => {
                tracing::trace!(target: "moe_core::ee::timer", "T{chn}_MODE = {data:#010X}");

                let equf = timer.mode.equf() && data & (1 << 10) == 0;
                let ovff = timer.mode.ovff() && data & (1 << 11) == 0;

                timer.mode = Mode(data & 0x3FF);
                timer.mode.set_equf(equf);
                timer.mode.set_ovff(ovff);

                timer.prescaler = match timer.mode.clks() {
                    0 => 1,
                    1 => 16,
                    2 => 256,
                    _ => 1, // HBLANK source, ticked externally
                };

                timer.subcount = 0;
            }
            COMP => timer.comp = data as u16,
            HOLD => timer.hold = data as u16,
            _ => panic!("[Timer:EE] unhandled 32-bit write @ {addr:#010X} = {data:#010X}"),
        }
    }

    /// Steps bus-clock sourced timers.
    pub fn step(&mut self, cycles: i64, intc: &mut Intc) {
        for chn in 0..4 {
            let timer = &mut self.timers[chn];

            if !timer.mode.cue() || timer.mode.clks() == 3 {
                continue;
            }

            timer.subcount += cycles as u32;

            let mut irq = false;
            while timer.subcount >= timer.prescaler {
                timer.subcount -= timer.prescaler;

                irq |= timer.tick();
            }

            if irq {
                intc.send_interrupt(TIMER_INTS[chn]);
            }
        }
    }

    /// Ticks HBLANK-sourced timers, exactly once per scanline.
    pub fn step_hblank(&mut self, intc: &mut Intc) {
        for chn in 0..4 {
            let timer = &mut self.timers[chn];

            if !timer.mode.cue() || timer.mode.clks() != 3 {
                continue;
            }

            if timer.tick() {
                intc.send_interrupt(TIMER_INTS[chn]);
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
    fn compare_edge_fires_once_and_zret_resets() {
        let mut timers = Timers::new();
        let mut intc = Intc::new();

        // Timer 0: bus clock, CUE | CMPE | ZRET.
        timers.write32(MODE, (1 << 6) | (1 << 7) | (1 << 8));
        timers.write32(COMP, 4);

        timers.step(4, &mut intc);
        assert_eq!(timers.read32(COUNT), 0); // ZRET wrapped at COMP
        assert!(timers.read32(MODE) & (1 << 10) != 0); // EQUF
        assert_eq!(intc.read_stat() & (1 << 9), 1 << 9);

        // The edge does not repeat while EQUF stays set.
        intc.write_stat(1 << 9);
        timers.step(4, &mut intc);
        assert_eq!(intc.read_stat(), 0);
    }

    #[test]
    fn prescaler_divides_the_bus_clock() {
        let mut timers = Timers::new();
        let mut intc = Intc::new();

        // Timer 1: clock/16, counting up.
        timers.write32(MODE | 0x800, (1 << 7) | 1);
        timers.step(15, &mut intc);
        assert_eq!(timers.read32(COUNT | 0x800), 0);
        timers.step(1, &mut intc);
        assert_eq!(timers.read32(COUNT | 0x800), 1);
    }

    #[test]
    fn hblank_source_only_ticks_from_hblank() {
        let mut timers = Timers::new();
        let mut intc = Intc::new();

        timers.write32(MODE, (1 << 7) | 3);
        timers.step(1000, &mut intc);
        assert_eq!(timers.read32(COUNT), 0);

        timers.step_hblank(&mut intc);
        assert_eq!(timers.read32(COUNT), 1);
    }

    #[test]
    fn overflow_sets_ovff_and_wraps() {
        let mut timers = Timers::new();
        let mut intc = Intc::new();

        timers.write32(MODE, (1 << 7) | (1 << 9));
        timers.write32(COUNT, 0xFFFF);

        timers.step(1, &mut intc);
        assert_eq!(timers.read32(COUNT), 0);
        assert!(timers.read32(MODE) & (1 << 11) != 0); // OVFF
    }
}
