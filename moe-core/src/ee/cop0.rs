//! EE core system coprocessor.

use proc_bitfield::bitfield;

/* COP0 register indices */
pub const INDEX: usize = 0;
pub const ENTRY_LO0: usize = 2;
pub const ENTRY_LO1: usize = 3;
pub const PAGE_MASK: usize = 5;
pub const WIRED: usize = 6;
pub const BAD_VADDR: usize = 8;
pub const COUNT: usize = 9;
pub const ENTRY_HI: usize = 10;
pub const COMPARE: usize = 11;
pub const STATUS: usize = 12;
pub const CAUSE: usize = 13;
pub const EPC: usize = 14;
pub const PRID: usize = 15;
pub const CONFIG: usize = 16;
pub const ERROR_EPC: usize = 30;

/// Implementation 0x2E, version 1.0.
const PRID_VALUE: u32 = (0x2E << 8) | 0x10;

/// Level 1 exception codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exception {
    Interrupt = 0x0,
    SystemCall = 0x8,
    Break = 0x9,
    ReservedInstruction = 0xA,
    Overflow = 0xC,
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Status(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub ie: bool @ 0,
        pub exl: bool @ 1,
        pub erl: bool @ 2,
        pub ksu: u8 @ 3..=4,
        pub im: u8 @ 10..=11,
        pub bem: bool @ 12,
        pub im7: bool @ 15,
        pub eie: bool @ 16,
        pub edi: bool @ 17,
        pub ch: bool @ 18,
        pub bev: bool @ 22,
        pub dev: bool @ 23,
        pub cu: u8 @ 28..=31,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Cause(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub excode: u8 @ 2..=6,
        pub ip: u8 @ 10..=11,
        pub ip7: bool @ 15,
        pub excode2: u8 @ 16..=18,
        pub ce: u8 @ 28..=29,
        pub bd2: bool @ 30,
        pub bd: bool @ 31,
    }
}

pub struct Cop0 {
    pub status: Status,
    pub cause: Cause,
    pub epc: u32,
    pub error_epc: u32,
    pub count: u32,
    pub compare: u32,
}

impl Cop0 {
    pub fn new() -> Self {
        let mut status = Status(0);

        status.set_erl(true);
        status.set_bev(true);

        Self { status, cause: Cause(0), epc: 0, error_epc: 0, count: 0, compare: 0 }
    }

    /// Advances Count. Done once per interpreter batch.
    pub fn increment_count(&mut self, cycles: i64) {
        self.count = self.count.wrapping_add(cycles as u32);
    }

    /// True when level 1 interrupts can be taken.
    pub fn int_enabled(&self) -> bool {
        self.status.ie() && self.status.eie() && !self.status.exl() && !self.status.erl()
    }

    pub fn get32(&self, idx: usize) -> u32 {
        match idx {
            BAD_VADDR => 0,
            COUNT => self.count,
            COMPARE => self.compare,
            STATUS => self.status.0,
            CAUSE => self.cause.0,
            EPC => self.epc,
            PRID => PRID_VALUE,
            ERROR_EPC => self.error_epc,
            _ => panic!("[COP0:EE] unhandled register read @ {idx}"),
        }
    }

    pub fn set32(&mut self, idx: usize, data: u32) {
        match idx {
            // TLB setup registers, ignored without an MMU.
            INDEX | ENTRY_LO0 | ENTRY_LO1 | PAGE_MASK | WIRED | ENTRY_HI | CONFIG => {}
            COUNT => self.count = data,
            COMPARE => self.compare = data,
            STATUS => self.status.0 = data,
            CAUSE => {
                // Only the software interrupt bits are writable; nothing
                // observes them yet.
            }
            EPC => self.epc = data,
            ERROR_EPC => self.error_epc = data,
            _ => panic!("[COP0:EE] unhandled register write @ {idx} = {data:#010X}"),
        }
    }

    /// Exception vector for a level 1 exception.
    pub fn exception_vector(&self, e: Exception) -> u32 {
        let base = if self.status.bev() { 0xBFC0_0200 } else { 0x8000_0000 };

        if e == Exception::Interrupt {
            base + 0x200
        } else {
            base + 0x180
        }
    }
}

impl Default for Cop0 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_state() {
        let cop0 = Cop0::new();

        assert!(cop0.status.erl());
        assert!(cop0.status.bev());
        assert!(!cop0.int_enabled());
        assert_eq!(cop0.get32(PRID), 0x2E10);
    }

    #[test]
    fn exception_vectors_follow_bev_and_cause() {
        let mut cop0 = Cop0::new();

        assert_eq!(cop0.exception_vector(Exception::SystemCall), 0xBFC0_0380);
        assert_eq!(cop0.exception_vector(Exception::Interrupt), 0xBFC0_0400);

        cop0.status.set_bev(false);
        assert_eq!(cop0.exception_vector(Exception::SystemCall), 0x8000_0180);
        assert_eq!(cop0.exception_vector(Exception::Interrupt), 0x8000_0200);
    }

    #[test]
    fn count_wraps_per_batch() {
        let mut cop0 = Cop0::new();

        cop0.set32(COUNT, 0xFFFF_FFF0);
        cop0.increment_count(0x20);
        assert_eq!(cop0.get32(COUNT), 0x10);
    }
}
