//! Subsystem Interface: the EE<->IOP bridge.
//!
//! Two 32-word FIFOs (SIF0: IOP->EE, SIF1: EE->IOP) plus the MSCOM/SMCOM
//! command mailboxes and MSFLG/SMFLG flag registers. The DMACs on both sides
//! consult the fill levels before bursting.

use std::collections::VecDeque;

use crate::types::U128;

pub const FIFO_CAPACITY: usize = 32;

/* SIF register offsets (shared between the EE and IOP windows) */
const MSCOM: u32 = 0x00;
const SMCOM: u32 = 0x10;
const MSFLG: u32 = 0x20;
const SMFLG: u32 = 0x30;
const CTRL: u32 = 0x40;
const BD6: u32 = 0x60;

pub struct Sif {
    mscom: u32,
    smcom: u32,
    msflg: u32,
    smflg: u32,
    bd6: u32,

    sif0: VecDeque<u32>,
    sif1: VecDeque<u32>,
}

impl Sif {
    pub fn new() -> Self {
        Self {
            mscom: 0,
            smcom: 0,
            msflg: 0,
            smflg: 0,
            bd6: 0,
            sif0: VecDeque::with_capacity(FIFO_CAPACITY),
            sif1: VecDeque::with_capacity(FIFO_CAPACITY),
        }
    }

    /* --- register file --- */

    pub fn read(&self, addr: u32) -> u32 {
        match addr & 0xFF {
            MSCOM => self.mscom,
            SMCOM => self.smcom,
            MSFLG => self.msflg,
            SMFLG => self.smflg,
            _ => panic!("[SIF:EE] unhandled 32-bit read @ {addr:#010X}"),
        }
    }

    pub fn write(&mut self, addr: u32, data: u32) {
        match addr & 0xFF {
            MSCOM => {
                tracing::debug!(target: "moe_core::sif", "MSCOM = {data:#010X}");

                self.mscom = data;
            }
            MSFLG => self.msflg |= data,
            SMFLG => self.smflg &= !data,
            CTRL => tracing::trace!(target: "moe_core::sif", "EE CTRL = {data:#010X}"),
            BD6 => self.bd6 = data,
            _ => panic!("[SIF:EE] unhandled 32-bit write @ {addr:#010X} = {data:#010X}"),
        }
    }

    pub fn read_iop(&self, addr: u32) -> u32 {
        match addr & 0xFF {
            SMCOM => self.smcom,
            MSCOM => self.mscom,
            MSFLG => self.msflg,
            SMFLG => self.smflg,
            CTRL => 0xF000_0101,
            BD6 => self.bd6,
            _ => panic!("[SIF:IOP] unhandled 32-bit read @ {addr:#010X}"),
        }
    }

    pub fn write_iop(&mut self, addr: u32, data: u32) {
        match addr & 0xFF {
            SMCOM => {
                tracing::debug!(target: "moe_core::sif", "SMCOM = {data:#010X}");

                self.smcom = data;
            }
            MSFLG => self.msflg &= !data,
            SMFLG => self.smflg |= data,
            CTRL => tracing::trace!(target: "moe_core::sif", "IOP CTRL = {data:#010X}"),
            _ => panic!("[SIF:IOP] unhandled 32-bit write @ {addr:#010X} = {data:#010X}"),
        }
    }

    /* --- SIF0: IOP -> EE --- */

    pub fn sif0_len(&self) -> usize {
        self.sif0.len()
    }

    pub fn write_sif0(&mut self, data: u32) {
        assert!(self.sif0.len() < FIFO_CAPACITY, "[SIF] SIF0 FIFO overflow");

        self.sif0.push_back(data);
    }

    pub fn read_sif0_word(&mut self) -> u32 {
        self.sif0.pop_front().expect("[SIF] SIF0 FIFO underflow")
    }

    /// Pops a full quadword, low word first.
    pub fn read_sif0(&mut self) -> U128 {
        let mut data = U128::ZERO;

        for lane in 0..4 {
            data.set_u32(lane, self.read_sif0_word());
        }

        data
    }

    /* --- SIF1: EE -> IOP --- */

    pub fn sif1_len(&self) -> usize {
        self.sif1.len()
    }

    pub fn write_sif1(&mut self, data: U128) {
        assert!(self.sif1.len() + 4 <= FIFO_CAPACITY, "[SIF] SIF1 FIFO overflow");

        for lane in 0..4 {
            self.sif1.push_back(data.u32(lane));
        }
    }

    pub fn read_sif1(&mut self) -> u32 {
        self.sif1.pop_front().expect("[SIF] SIF1 FIFO underflow")
    }
}

impl Default for Sif {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_flag_semantics() {
        let mut sif = Sif::new();

        // EE sets MSFLG bits, the IOP acknowledges them.
        sif.write(MSFLG, 0x3);
        assert_eq!(sif.read_iop(MSFLG), 0x3);
        sif.write_iop(MSFLG, 0x1);
        assert_eq!(sif.read(MSFLG), 0x2);

        // And the mirror image for SMFLG.
        sif.write_iop(SMFLG, 0x10000);
        sif.write(SMFLG, 0x10000);
        assert_eq!(sif.read(SMFLG), 0);
    }

    #[test]
    fn fifo_word_order() {
        let mut sif = Sif::new();

        for word in [1, 2, 3, 4] {
            sif.write_sif0(word);
        }
        assert_eq!(sif.sif0_len(), 4);

        let quad = sif.read_sif0();
        assert_eq!(quad.u32(0), 1);
        assert_eq!(quad.u32(3), 4);
        assert_eq!(sif.sif0_len(), 0);

        sif.write_sif1(U128::new(0x0000_0002_0000_0001, 0x0000_0004_0000_0003));
        assert_eq!(sif.read_sif1(), 1);
        assert_eq!(sif.read_sif1(), 2);
        assert_eq!(sif.read_sif1(), 3);
        assert_eq!(sif.read_sif1(), 4);
    }
}
