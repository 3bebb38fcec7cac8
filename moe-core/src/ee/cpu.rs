//! Emotion Engine core: MIPS-III interpreter with 128-bit GPRs.

pub mod handlers;
pub mod lut;

use crate::bus::Bus;
use crate::ee::cop0::{Cop0, Exception};
use crate::ee::fpu::Fpu;
use crate::types::U128;

pub const RESET_VECTOR: u32 = 0xBFC0_0000;

/// Entry point of the EELOAD boot module, the fast-boot patch point.
const EELOAD: u32 = 0x82000;

/* Register file indices */
pub const R0: usize = 0;
pub const RA: usize = 31;
pub const LO: usize = 32;
pub const HI: usize = 33;

const SPRAM_SIZE: usize = 0x4000;

pub struct Ee {
    /// GPRs plus LO/HI.
    pub regs: [U128; 34],

    pub pc: u32,
    pub cpc: u32,
    pub npc: u32,

    /// Shift amount register.
    pub sa: u8,

    /// Branch delay tracker: slot 0 is "executing a delay slot now",
    /// slot 1 is "the next instruction is a delay slot".
    pub in_delay_slot: [bool; 2],

    pub cop0: Cop0,
    pub fpu: Fpu,

    spram: Vec<u8>,

    /// Fast boot is armed when a disc image is present.
    pub fast_boot: bool,
    fast_boot_done: bool,

    in_bifco: bool,
}

impl Ee {
    pub fn new() -> Self {
        let mut ee = Self {
            regs: [U128::ZERO; 34],
            pc: 0,
            cpc: 0,
            npc: 0,
            sa: 0,
            in_delay_slot: [false; 2],
            cop0: Cop0::new(),
            fpu: Fpu::new(),
            spram: vec![0; SPRAM_SIZE],
            fast_boot: false,
            fast_boot_done: false,
            in_bifco: false,
        };

        ee.set_pc(RESET_VECTOR);

        ee
    }

    /* --- register accessors --- */

    /// 32-bit write, sign-extended into the low lane.
    #[inline(always)]
    pub fn set32(&mut self, idx: usize, data: u32) {
        self.regs[idx].lo = data as i32 as u64;

        self.regs[R0] = U128::ZERO;
    }

    /// 64-bit write into the low lane; the upper lane is untouched.
    #[inline(always)]
    pub fn set64(&mut self, idx: usize, data: u64) {
        self.regs[idx].lo = data;

        self.regs[R0] = U128::ZERO;
    }

    #[inline(always)]
    pub fn set128(&mut self, idx: usize, data: U128) {
        self.regs[idx] = data;

        self.regs[R0] = U128::ZERO;
    }

    /* --- program counter --- */

    pub fn set_pc(&mut self, addr: u32) {
        if addr == 0 {
            panic!("[EE Core] jump to 0 @ {:#010X}", self.cpc);
        }

        if addr & 3 != 0 {
            panic!("[EE Core] misaligned PC {addr:#010X} @ {:#010X}", self.cpc);
        }

        if self.in_bifco && !(0x81FC0..0x81FDC).contains(&addr) {
            tracing::info!(target: "moe_core::ee::cpu", "leaving BIFCO loop");

            self.in_bifco = false;
        }

        self.pc = addr;
        self.npc = addr + 4;
    }

    fn set_branch_pc(&mut self, addr: u32) {
        if addr == 0 {
            panic!("[EE Core] jump to 0 @ {:#010X}", self.cpc);
        }

        if addr & 3 != 0 {
            panic!("[EE Core] misaligned PC {addr:#010X} @ {:#010X}", self.cpc);
        }

        self.npc = addr;
    }

    fn step_pc(&mut self) {
        self.pc = self.npc;
        self.npc += 4;
    }

    /* --- memory accessors --- */

    /// KSEG unmirror; the DECI2 area maps back into low RAM.
    fn translate_addr(addr: u32) -> u32 {
        if addr >= 0xFFFF_8000 {
            addr & 0x7_FFFF
        } else {
            addr & 0x1FFF_FFFF
        }
    }

    #[inline(always)]
    fn is_spram(addr: u32) -> bool {
        (addr >> 28) == 7
    }

    pub fn read8(&self, bus: &mut Bus, addr: u32) -> u8 {
        if Self::is_spram(addr) {
            return self.spram[(addr & 0x3FFF) as usize];
        }

        bus.read8(Self::translate_addr(addr))
    }

    pub fn read16(&self, bus: &mut Bus, addr: u32) -> u16 {
        if addr & 1 != 0 {
            panic!("[EE Core] misaligned 16-bit read @ {:#010X} (address = {addr:#010X})", self.cpc);
        }

        if Self::is_spram(addr) {
            let addr = (addr & 0x3FFE) as usize;
            return u16::from_le_bytes(self.spram[addr..addr + 2].try_into().unwrap());
        }

        bus.read16(Self::translate_addr(addr))
    }

    pub fn read32(&self, bus: &mut Bus, addr: u32) -> u32 {
        if addr & 3 != 0 {
            panic!("[EE Core] misaligned 32-bit read @ {:#010X} (address = {addr:#010X})", self.cpc);
        }

        if Self::is_spram(addr) {
            let addr = (addr & 0x3FFC) as usize;
            return u32::from_le_bytes(self.spram[addr..addr + 4].try_into().unwrap());
        }

        bus.read32(Self::translate_addr(addr))
    }

    pub fn read64(&self, bus: &mut Bus, addr: u32) -> u64 {
        if addr & 7 != 0 {
            panic!("[EE Core] misaligned 64-bit read @ {:#010X} (address = {addr:#010X})", self.cpc);
        }

        if Self::is_spram(addr) {
            let addr = (addr & 0x3FF8) as usize;
            return u64::from_le_bytes(self.spram[addr..addr + 8].try_into().unwrap());
        }

        bus.read64(Self::translate_addr(addr))
    }

    pub fn read128(&self, bus: &mut Bus, addr: u32) -> U128 {
        if addr & 15 != 0 {
            panic!("[EE Core] misaligned 128-bit read @ {:#010X} (address = {addr:#010X})", self.cpc);
        }

        if Self::is_spram(addr) {
            let addr = (addr & 0x3FF0) as usize;
            return U128::from_le_bytes(self.spram[addr..addr + 16].try_into().unwrap());
        }

        bus.read128(Self::translate_addr(addr))
    }

    pub fn write8(&mut self, bus: &mut Bus, addr: u32, data: u8) {
        if Self::is_spram(addr) {
            self.spram[(addr & 0x3FFF) as usize] = data;
            return;
        }

        bus.write8(Self::translate_addr(addr), data);
    }

    pub fn write16(&mut self, bus: &mut Bus, addr: u32, data: u16) {
        if addr & 1 != 0 {
            panic!("[EE Core] misaligned 16-bit write @ {:#010X} (address = {addr:#010X})", self.cpc);
        }

        if Self::is_spram(addr) {
            let addr = (addr & 0x3FFE) as usize;
            self.spram[addr..addr + 2].copy_from_slice(&data.to_le_bytes());
            return;
        }

        bus.write16(Self::translate_addr(addr), data);
    }

    pub fn write32(&mut self, bus: &mut Bus, addr: u32, data: u32) {
        if addr & 3 != 0 {
            panic!("[EE Core] misaligned 32-bit write @ {:#010X} (address = {addr:#010X})", self.cpc);
        }

        if Self::is_spram(addr) {
            let addr = (addr & 0x3FFC) as usize;
            self.spram[addr..addr + 4].copy_from_slice(&data.to_le_bytes());
            return;
        }

        bus.write32(Self::translate_addr(addr), data);
    }

    pub fn write64(&mut self, bus: &mut Bus, addr: u32, data: u64) {
        if addr & 7 != 0 {
            panic!("[EE Core] misaligned 64-bit write @ {:#010X} (address = {addr:#010X})", self.cpc);
        }

        if Self::is_spram(addr) {
            let addr = (addr & 0x3FF8) as usize;
            self.spram[addr..addr + 8].copy_from_slice(&data.to_le_bytes());
            return;
        }

        bus.write64(Self::translate_addr(addr), data);
    }

    pub fn write128(&mut self, bus: &mut Bus, addr: u32, data: U128) {
        if addr & 15 != 0 {
            panic!("[EE Core] misaligned 128-bit write @ {:#010X} (address = {addr:#010X})", self.cpc);
        }

        if Self::is_spram(addr) {
            let addr = (addr & 0x3FF0) as usize;
            self.spram[addr..addr + 16].copy_from_slice(&data.to_le_bytes());
            return;
        }

        bus.write128(Self::translate_addr(addr), data);
    }

    /* --- control flow --- */

    /// Common branch path. `link` is R0 for non-linking branches, which makes
    /// the link write harmless.
    pub(crate) fn do_branch(&mut self, target: u32, cond: bool, link: usize, likely: bool) {
        if self.in_delay_slot[0] {
            panic!("[EE Core] branch instruction in delay slot @ {:#010X}", self.cpc);
        }

        self.set32(link, self.npc);

        self.in_delay_slot[1] = true;

        if cond {
            self.set_branch_pc(target);
        } else if likely {
            // Nullify the delay slot.
            let npc = self.npc;
            self.set_pc(npc);

            self.in_delay_slot[1] = false;
        }
    }

    /// Level 1 exception entry.
    pub(crate) fn exception(&mut self, e: Exception) {
        tracing::debug!(
            target: "moe_core::ee::cpu",
            "{e:?} exception @ {:#010X}", self.cpc
        );

        self.cop0.cause.set_excode(e as u8);

        let vector = self.cop0.exception_vector(e);

        if !self.cop0.status.exl() {
            self.cop0.cause.set_bd(self.in_delay_slot[0]);

            self.cop0.epc = if self.in_delay_slot[0] { self.cpc - 4 } else { self.cpc };
        }

        self.in_delay_slot = [false; 2];

        self.cop0.status.set_exl(true);

        self.set_pc(vector);
    }

    /// Takes a pending hardware interrupt between instructions.
    fn do_interrupt(&mut self) {
        self.cpc = self.pc;

        self.in_delay_slot[0] = self.in_delay_slot[1];
        self.in_delay_slot[1] = false;

        self.exception(Exception::Interrupt);
    }

    /// ERET landed on the EELOAD entry point; let the boot patcher run once.
    pub(crate) fn check_fast_boot(&mut self, bus: &mut Bus) {
        if self.fast_boot && !self.fast_boot_done && self.pc == EELOAD {
            crate::ps2::fast_boot(bus);

            self.fast_boot_done = true;
        }
    }

    /* --- main loop --- */

    pub fn step(&mut self, bus: &mut Bus, cycles: i64) {
        for _ in 0..cycles {
            // The INTC and DMAC lines are reflected into Cause.IP and
            // sampled between instructions.
            let ip = bus.intc.pending_ee() as u8 | ((bus.ee_dmac.irq_pending() as u8) << 1);
            self.cop0.cause.set_ip(ip);

            if self.cop0.int_enabled() && ip & self.cop0.status.im() != 0 {
                self.do_interrupt();
            }

            self.cpc = self.pc;

            if self.cpc == 0x81FC0 && !self.in_bifco {
                tracing::info!(target: "moe_core::ee::cpu", "entering BIFCO loop");

                self.in_bifco = true;
            }

            self.in_delay_slot[0] = self.in_delay_slot[1];
            self.in_delay_slot[1] = false;

            let instr = crate::mips::Instruction(self.read32(bus, self.cpc));
            self.step_pc();

            let entry = &lut::OPCODE_LUT[instr.opcode()];
            (entry.handler)(self, bus, instr);
        }

        self.cop0.increment_count(cycles);
    }
}

impl Default for Ee {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Ee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "PC: {:08X} NPC: {:08X}", self.pc, self.npc)?;

        for (idx, name) in crate::mips::REG_NAMES.iter().enumerate() {
            writeln!(f, "{name}: {}", self.regs[idx])?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(words: &[u32]) -> (Ee, Bus) {
        let mut bios = vec![0u8; 0x40_0000];

        for (i, word) in words.iter().enumerate() {
            bios[4 * i..4 * i + 4].copy_from_slice(&word.to_le_bytes());
        }

        (Ee::new(), Bus::new(bios, None))
    }

    /// LUI at the reset vector, sign-extended into 64 bits.
    #[test]
    fn boot_instruction_fetch() {
        let (mut ee, mut bus) = machine(&[0x3C08_BFC0]); // lui t0, 0xBFC0

        ee.step(&mut bus, 1);

        assert_eq!(ee.regs[8].lo, 0xFFFF_FFFF_BFC0_0000);
        assert_eq!(ee.pc, 0xBFC0_0004);
        assert_eq!(ee.npc, 0xBFC0_0008);
    }

    /// The instruction after a taken branch executes in the delay slot
    /// before the target.
    #[test]
    fn delayed_branch() {
        let (mut ee, mut bus) = machine(&[
            0x1000_0002, // beq r0, r0, +8
            0x3529_1234, // ori t1, t1, 0x1234
        ]);

        ee.step(&mut bus, 2);

        assert_eq!(ee.regs[9].lo & 0xFFFF, 0x1234);
        assert_eq!(ee.pc, 0xBFC0_000C);
    }

    #[test]
    fn gpr0_is_hardwired_to_zero() {
        let (mut ee, mut bus) = machine(&[
            0x2400_1234, // addiu r0, r0, 0x1234
            0x3C00_8000, // lui r0, 0x8000
        ]);

        ee.step(&mut bus, 2);

        assert_eq!(ee.regs[0], U128::ZERO);
    }

    #[test]
    #[should_panic(expected = "branch instruction in delay slot")]
    fn branch_in_delay_slot_is_fatal() {
        let (mut ee, mut bus) = machine(&[
            0x1000_0001, // beq r0, r0, +4
            0x1000_0001, // beq in the delay slot
        ]);

        ee.step(&mut bus, 2);
    }

    #[test]
    fn likely_branch_nullifies_the_delay_slot() {
        let (mut ee, mut bus) = machine(&[
            0x5420_0002, // bnel at, r0, +8 (not taken: at == 0)
            0x2409_0001, // addiu t1, r0, 1 (must be skipped)
            0x2409_0002, // addiu t1, r0, 2
        ]);

        ee.step(&mut bus, 2);

        assert_eq!(ee.regs[9].lo, 2);
    }

    #[test]
    fn scratchpad_aliases_low_14_bits() {
        let (mut ee, mut bus) = machine(&[0]);

        ee.write32(&mut bus, 0x7000_0010, 0xDEAD_BEEF);
        assert_eq!(ee.read32(&mut bus, 0x7000_4010), 0xDEAD_BEEF);
        assert_eq!(ee.read32(&mut bus, 0x7FFF_C010), 0xDEAD_BEEF);
    }

    #[test]
    fn quadword_load_store() {
        let (mut ee, mut bus) = machine(&[
            0x3C08_0000, // lui t0, 0
            0x3508_1000, // ori t0, t0, 0x1000
            0x7D09_0000, // sq t1, 0(t0)
            0x7908_0000, // lq t0, 0(t0)
        ]);

        ee.regs[9] = U128::new(0x1122_3344_5566_7788, 0x99AA_BBCC_DDEE_FF00);
        ee.step(&mut bus, 4);

        assert_eq!(ee.regs[8], U128::new(0x1122_3344_5566_7788, 0x99AA_BBCC_DDEE_FF00));
        assert_eq!(bus.read64(0x1000), 0x1122_3344_5566_7788);
    }

    #[test]
    fn interrupts_are_taken_when_enabled() {
        let (mut ee, mut bus) = machine(&[0, 0, 0, 0]); // nops

        // Unmask VBLANKStart and enable interrupts (IE | EIE | IM).
        bus.intc.write_mask(1 << 2);
        ee.cop0.status.0 = 0;
        ee.cop0.status.set_ie(true);
        ee.cop0.status.set_eie(true);
        ee.cop0.status.set_im(3);
        ee.cop0.status.set_bev(true);

        ee.step(&mut bus, 1);
        assert_eq!(ee.pc, 0xBFC0_0004);

        bus.intc.send_interrupt(crate::intc::Interrupt::VblankStart);
        ee.step(&mut bus, 1);

        // Interrupt vector with EPC pointing at the preempted instruction.
        assert_eq!(ee.cop0.epc, 0xBFC0_0004);
        assert!(ee.cop0.status.exl());
        assert_eq!(ee.pc, 0xBFC0_0404);
        assert_eq!(ee.cop0.cause.excode(), 0);
    }
}
