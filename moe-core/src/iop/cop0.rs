//! IOP system coprocessor (R3000A-style COP0).

use proc_bitfield::bitfield;

pub const BAD_VADDR: usize = 8;
pub const STATUS: usize = 12;
pub const CAUSE: usize = 13;
pub const EPC: usize = 14;
pub const PRID: usize = 15;

const PRID_VALUE: u32 = 0x1F;

/// Exception codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exception {
    Interrupt = 0x0,
    AddressErrorLoad = 0x4,
    AddressErrorStore = 0x5,
    SystemCall = 0x8,
    Break = 0x9,
    ReservedInstruction = 0xA,
    Overflow = 0xC,
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Status(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub iec: bool @ 0,
        pub kuc: bool @ 1,
        pub iep: bool @ 2,
        pub kup: bool @ 3,
        pub ieo: bool @ 4,
        pub kuo: bool @ 5,
        pub im: u8 @ 8..=15,
        pub isc: bool @ 16,
        pub swc: bool @ 17,
        pub bev: bool @ 22,
        pub cu: u8 @ 28..=31,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Cause(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub excode: u8 @ 2..=6,
        pub ip: u8 @ 8..=15,
        pub ce: u8 @ 28..=29,
        pub bd: bool @ 31,
    }
}

pub struct Cop0 {
    pub sr: Status,
    pub cause: Cause,
    pub epc: u32,
}

impl Cop0 {
    pub fn new() -> Self {
        let mut sr = Status(0);

        sr.set_bev(true);

        Self { sr, cause: Cause(0), epc: 0 }
    }

    /// True when the current interrupt-enable bit is set.
    pub fn int_enabled(&self) -> bool {
        self.sr.iec() && self.sr.im() & 4 != 0
    }

    /// Stores are suppressed while the data cache is isolated.
    pub fn is_cache_isolated(&self) -> bool {
        self.sr.isc()
    }

    /// Reflects the INTC line into Cause.IP2.
    pub fn set_interrupt_pending(&mut self, pending: bool) {
        let ip = self.cause.ip();

        self.cause.set_ip(if pending { ip | 4 } else { ip & !4 });
    }

    pub fn get(&self, idx: usize) -> u32 {
        match idx {
            BAD_VADDR => 0,
            STATUS => self.sr.0,
            CAUSE => self.cause.0,
            EPC => self.epc,
            PRID => PRID_VALUE,
            _ => panic!("[COP0:IOP] unhandled register read @ {idx}"),
        }
    }

    pub fn set(&mut self, idx: usize, data: u32) {
        match idx {
            // Cache/TLB configuration registers the kernel pokes at boot.
            3 | 5 | 6 | 7 | 9 | 11 => {}
            STATUS => self.sr.0 = data,
            CAUSE => {
                // Software interrupt bits only.
                let ip = (self.cause.ip() & !3) | (data >> 8) as u8 & 3;

                self.cause.set_ip(ip);
            }
            _ => panic!("[COP0:IOP] unhandled register write @ {idx} = {data:#010X}"),
        }
    }

    /// Pushes the interrupt-enable/mode stack and records the exception.
    pub fn enter_exception(&mut self, e: Exception, epc: u32, in_delay_slot: bool) -> u32 {
        let mode = self.sr.0 & 0x3F;

        self.sr.0 = (self.sr.0 & !0x3F) | ((mode << 2) & 0x3F);

        self.cause.set_excode(e as u8);
        self.cause.set_bd(in_delay_slot);

        self.epc = epc;

        if self.sr.bev() {
            0xBFC0_0180
        } else {
            0x8000_0080
        }
    }

    /// RFE: pops the interrupt-enable/mode stack.
    pub fn leave_exception(&mut self) {
        let mode = self.sr.0 & 0x3F;

        self.sr.0 = (self.sr.0 & !0xF) | ((mode >> 2) & 0xF);
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
    fn exception_pushes_and_rfe_pops_the_status_stack() {
        let mut cop0 = Cop0::new();

        cop0.sr.set_iec(true);
        cop0.sr.set_kuc(true);

        let vector = cop0.enter_exception(Exception::SystemCall, 0x8000_1000, false);
        assert_eq!(vector, 0xBFC0_0180);
        assert!(!cop0.sr.iec());
        assert!(cop0.sr.iep());
        assert!(cop0.sr.kup());
        assert_eq!(cop0.cause.excode(), 0x8);
        assert_eq!(cop0.epc, 0x8000_1000);

        cop0.leave_exception();
        assert!(cop0.sr.iec());
        assert!(cop0.sr.kuc());
    }

    #[test]
    fn vector_follows_bev() {
        let mut cop0 = Cop0::new();

        cop0.sr.set_bev(false);
        assert_eq!(cop0.enter_exception(Exception::Break, 0, false), 0x8000_0080);
    }

    #[test]
    fn interrupt_line_reflects_into_ip2() {
        let mut cop0 = Cop0::new();

        cop0.set_interrupt_pending(true);
        assert_eq!(cop0.cause.ip(), 4);

        cop0.sr.set_iec(true);
        cop0.sr.set_im(4);
        assert!(cop0.int_enabled());

        cop0.set_interrupt_pending(false);
        assert_eq!(cop0.cause.ip(), 0);
    }
}
