//! EE instruction handlers. Dispatched through the opcode LUTs; the COP and
//! MMI families sub-decode here.

use crate::bus::Bus;
use crate::ee::cop0::Exception;
use crate::ee::cpu::{Ee, HI, LO, R0, RA};
use crate::ee::cpu::lut::{REGIMM_LUT, SPECIAL_LUT};
use crate::mips::Instruction;

/* COP rs sub-opcodes */
const COP_MF: usize = 0x00;
const COP_QMF: usize = 0x01;
const COP_CF: usize = 0x02;
const COP_MT: usize = 0x04;
const COP_QMT: usize = 0x05;
const COP_CT: usize = 0x06;

/* COP0 CO functions */
const CO_TLBWI: usize = 0x02;
const CO_ERET: usize = 0x18;
const CO_EI: usize = 0x38;
const CO_DI: usize = 0x39;

/* MMI functions */
const MMI_PLZCW: usize = 0x04;
const MMI_MMI0: usize = 0x08;
const MMI_MMI2: usize = 0x09;
const MMI_MFHI1: usize = 0x10;
const MMI_MTHI1: usize = 0x11;
const MMI_MFLO1: usize = 0x12;
const MMI_MTLO1: usize = 0x13;
const MMI_MULT1: usize = 0x18;
const MMI_DIV1: usize = 0x1A;
const MMI_DIVU1: usize = 0x1B;
const MMI_MMI1: usize = 0x28;
const MMI_MMI3: usize = 0x29;

pub fn invalid(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    panic!(
        "[EE Core] unhandled instruction {:#04X} ({:#010X}) @ {:#010X}",
        instr.opcode(),
        instr.0,
        cpu.cpc
    );
}

/* --- dispatchers --- */

pub fn special(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    (SPECIAL_LUT[instr.funct()].handler)(cpu, bus, instr);
}

pub fn regimm(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    (REGIMM_LUT[instr.rt()].handler)(cpu, bus, instr);
}

pub fn invalid_special(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    panic!(
        "[EE Core] unhandled SPECIAL instruction {:#04X} ({:#010X}) @ {:#010X}",
        instr.funct(),
        instr.0,
        cpu.cpc
    );
}

pub fn invalid_regimm(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    panic!(
        "[EE Core] unhandled REGIMM instruction {:#04X} ({:#010X}) @ {:#010X}",
        instr.rt(),
        instr.0,
        cpu.cpc
    );
}

/* --- arithmetic / logic --- */

pub fn addiu(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].u32(0).wrapping_add(instr.simm());

    cpu.set32(instr.rt(), res);
}

pub fn addu(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].u32(0).wrapping_add(cpu.regs[instr.rt()].u32(0));

    cpu.set32(instr.rd(), res);
}

pub fn subu(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].u32(0).wrapping_sub(cpu.regs[instr.rt()].u32(0));

    cpu.set32(instr.rd(), res);
}

pub fn daddiu(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo.wrapping_add(instr.simm() as i32 as u64);

    cpu.set64(instr.rt(), res);
}

pub fn daddu(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo.wrapping_add(cpu.regs[instr.rt()].lo);

    cpu.set64(instr.rd(), res);
}

pub fn dsubu(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo.wrapping_sub(cpu.regs[instr.rt()].lo);

    cpu.set64(instr.rd(), res);
}

pub fn and(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo & cpu.regs[instr.rt()].lo;

    cpu.set64(instr.rd(), res);
}

pub fn andi(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo & instr.imm() as u64;

    cpu.set64(instr.rt(), res);
}

pub fn or(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo | cpu.regs[instr.rt()].lo;

    cpu.set64(instr.rd(), res);
}

pub fn ori(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo | instr.imm() as u64;

    cpu.set64(instr.rt(), res);
}

pub fn xor(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo ^ cpu.regs[instr.rt()].lo;

    cpu.set64(instr.rd(), res);
}

pub fn xori(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo ^ instr.imm() as u64;

    cpu.set64(instr.rt(), res);
}

pub fn nor(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = !(cpu.regs[instr.rs()].lo | cpu.regs[instr.rt()].lo);

    cpu.set64(instr.rd(), res);
}

pub fn lui(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let imm = ((instr.imm() as i16 as i64) << 16) as u64;

    cpu.set64(instr.rt(), imm);
}

pub fn slt(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rs()].lo as i64) < (cpu.regs[instr.rt()].lo as i64);

    cpu.set64(instr.rd(), res as u64);
}

pub fn slti(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rs()].lo as i64) < instr.imm() as i16 as i64;

    cpu.set64(instr.rt(), res as u64);
}

pub fn sltiu(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo < instr.imm() as i16 as u64;

    cpu.set64(instr.rt(), res as u64);
}

pub fn sltu(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].lo < cpu.regs[instr.rt()].lo;

    cpu.set64(instr.rd(), res as u64);
}

pub fn movn(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    if cpu.regs[instr.rt()].lo != 0 {
        let data = cpu.regs[instr.rs()].lo;

        cpu.set64(instr.rd(), data);
    }
}

pub fn movz(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    if cpu.regs[instr.rt()].lo == 0 {
        let data = cpu.regs[instr.rs()].lo;

        cpu.set64(instr.rd(), data);
    }
}

/* --- shifts --- */

pub fn sll(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()].u32(0) << instr.shamt();

    cpu.set32(instr.rd(), res);
}

pub fn srl(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()].u32(0) >> instr.shamt();

    cpu.set32(instr.rd(), res);
}

pub fn sra(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rt()].u32(0) as i32) >> instr.shamt();

    cpu.set32(instr.rd(), res as u32);
}

pub fn sllv(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()].u32(0) << (cpu.regs[instr.rs()].lo & 0x1F);

    cpu.set32(instr.rd(), res);
}

pub fn srlv(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()].u32(0) >> (cpu.regs[instr.rs()].lo & 0x1F);

    cpu.set32(instr.rd(), res);
}

pub fn srav(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rt()].u32(0) as i32) >> (cpu.regs[instr.rs()].lo & 0x1F);

    cpu.set32(instr.rd(), res as u32);
}

pub fn dsll(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()].lo << instr.shamt();

    cpu.set64(instr.rd(), res);
}

pub fn dsrl(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()].lo >> instr.shamt();

    cpu.set64(instr.rd(), res);
}

pub fn dsll32(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()].lo << (instr.shamt() + 32);

    cpu.set64(instr.rd(), res);
}

pub fn dsrl32(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()].lo >> (instr.shamt() + 32);

    cpu.set64(instr.rd(), res);
}

pub fn dsra32(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rt()].lo as i64) >> (instr.shamt() + 32);

    cpu.set64(instr.rd(), res as u64);
}

pub fn dsllv(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()].lo << (cpu.regs[instr.rs()].lo & 0x3F);

    cpu.set64(instr.rd(), res);
}

pub fn dsrav(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rt()].lo as i64) >> (cpu.regs[instr.rs()].lo & 0x3F);

    cpu.set64(instr.rd(), res as u64);
}

/* --- multiply / divide --- */

pub fn mult(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rs()].u32(0) as i32 as i64)
        * (cpu.regs[instr.rt()].u32(0) as i32 as i64);

    cpu.regs[LO].lo = res as i32 as u64;
    cpu.regs[HI].lo = (res >> 32) as i32 as u64;

    // The EE pipeline forwards LO to rd.
    let lo = cpu.regs[LO].lo;
    cpu.set64(instr.rd(), lo);
}

pub fn mult1(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rs()].u32(0) as i32 as i64)
        * (cpu.regs[instr.rt()].u32(0) as i32 as i64);

    cpu.regs[LO].hi = res as i32 as u64;
    cpu.regs[HI].hi = (res >> 32) as i32 as u64;

    let lo = cpu.regs[LO].hi;
    cpu.set64(instr.rd(), lo);
}

/// Signed 32-bit division. A zero divisor or INT_MIN/-1 trips the debug
/// assert; release builds write the architecturally defined results.
fn div_pair(n: i32, d: i32) -> (u64, u64) {
    debug_assert!(d != 0 && !(n == i32::MIN && d == -1));

    if d == 0 {
        let lo = if n >= 0 { -1i64 } else { 1i64 };

        (lo as u64, n as i64 as u64)
    } else if n == i32::MIN && d == -1 {
        (i32::MIN as i64 as u64, 0)
    } else {
        ((n / d) as i64 as u64, (n % d) as i64 as u64)
    }
}

fn divu_pair(n: u32, d: u32) -> (u64, u64) {
    debug_assert!(d != 0);

    if d == 0 {
        (u64::MAX, n as i32 as u64)
    } else {
        ((n / d) as i32 as u64, (n % d) as i32 as u64)
    }
}

pub fn div(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let (lo, hi) = div_pair(
        cpu.regs[instr.rs()].u32(0) as i32,
        cpu.regs[instr.rt()].u32(0) as i32,
    );

    cpu.regs[LO].lo = lo;
    cpu.regs[HI].lo = hi;
}

pub fn div1(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let (lo, hi) = div_pair(
        cpu.regs[instr.rs()].u32(0) as i32,
        cpu.regs[instr.rt()].u32(0) as i32,
    );

    cpu.regs[LO].hi = lo;
    cpu.regs[HI].hi = hi;
}

pub fn divu(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let (lo, hi) = divu_pair(cpu.regs[instr.rs()].u32(0), cpu.regs[instr.rt()].u32(0));

    cpu.regs[LO].lo = lo;
    cpu.regs[HI].lo = hi;
}

pub fn divu1(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let (lo, hi) = divu_pair(cpu.regs[instr.rs()].u32(0), cpu.regs[instr.rt()].u32(0));

    cpu.regs[LO].hi = lo;
    cpu.regs[HI].hi = hi;
}

pub fn mfhi(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let data = cpu.regs[HI].lo;

    cpu.set64(instr.rd(), data);
}

pub fn mthi(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    cpu.regs[HI].lo = cpu.regs[instr.rs()].lo;
}

pub fn mflo(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let data = cpu.regs[LO].lo;

    cpu.set64(instr.rd(), data);
}

pub fn mtlo(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    cpu.regs[LO].lo = cpu.regs[instr.rs()].lo;
}

pub fn mfsa(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let sa = cpu.sa;

    cpu.set64(instr.rd(), sa as u64);
}

pub fn mtsa(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    cpu.sa = cpu.regs[instr.rs()].lo as u8;
}

/* --- branches --- */

pub fn j(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = instr.jump_target(cpu.pc);

    cpu.do_branch(target, true, R0, false);
}

pub fn jal(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = instr.jump_target(cpu.pc);

    cpu.do_branch(target, true, RA, false);
}

pub fn jr(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.regs[instr.rs()].u32(0);

    cpu.do_branch(target, true, R0, false);
}

pub fn jalr(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.regs[instr.rs()].u32(0);

    cpu.do_branch(target, true, instr.rd(), false);
}

pub fn beq(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = cpu.regs[instr.rs()].lo == cpu.regs[instr.rt()].lo;

    cpu.do_branch(target, cond, R0, false);
}

pub fn beql(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = cpu.regs[instr.rs()].lo == cpu.regs[instr.rt()].lo;

    cpu.do_branch(target, cond, R0, true);
}

pub fn bne(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = cpu.regs[instr.rs()].lo != cpu.regs[instr.rt()].lo;

    cpu.do_branch(target, cond, R0, false);
}

pub fn bnel(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = cpu.regs[instr.rs()].lo != cpu.regs[instr.rt()].lo;

    cpu.do_branch(target, cond, R0, true);
}

pub fn blez(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()].lo as i64) <= 0;

    cpu.do_branch(target, cond, R0, false);
}

pub fn blezl(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()].lo as i64) <= 0;

    cpu.do_branch(target, cond, R0, true);
}

pub fn bgtz(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()].lo as i64) > 0;

    cpu.do_branch(target, cond, R0, false);
}

pub fn bltz(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()].lo as i64) < 0;

    cpu.do_branch(target, cond, R0, false);
}

pub fn bltzl(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()].lo as i64) < 0;

    cpu.do_branch(target, cond, R0, true);
}

pub fn bgez(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()].lo as i64) >= 0;

    cpu.do_branch(target, cond, R0, false);
}

pub fn bgezl(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()].lo as i64) >= 0;

    cpu.do_branch(target, cond, R0, true);
}

/* --- loads --- */

#[inline(always)]
fn effective_addr(cpu: &Ee, instr: Instruction) -> u32 {
    cpu.regs[instr.rs()].u32(0).wrapping_add(instr.simm())
}

pub fn lb(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read8(bus, addr) as i8 as u64;

    cpu.set64(instr.rt(), data);
}

pub fn lbu(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read8(bus, addr) as u64;

    cpu.set64(instr.rt(), data);
}

pub fn lh(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read16(bus, addr) as i16 as u32;

    cpu.set32(instr.rt(), data);
}

pub fn lhu(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read16(bus, addr) as u64;

    cpu.set64(instr.rt(), data);
}

pub fn lw(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read32(bus, addr);

    cpu.set32(instr.rt(), data);
}

pub fn lwu(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read32(bus, addr) as u64;

    cpu.set64(instr.rt(), data);
}

pub fn ld(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read64(bus, addr);

    cpu.set64(instr.rt(), data);
}

pub fn lq(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read128(bus, addr);

    cpu.set128(instr.rt(), data);
}

pub fn lwl(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 24 - 8 * (addr & 3);
    let mask = !(!0u32 << shift);

    let data = (cpu.regs[instr.rt()].u32(0) & mask) | (cpu.read32(bus, addr & !3) << shift);

    cpu.set32(instr.rt(), data);
}

pub fn lwr(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 8 * (addr & 3);
    let mask = !(!0u32 >> shift);

    let data = (cpu.regs[instr.rt()].u32(0) & mask) | (cpu.read32(bus, addr & !3) >> shift);

    cpu.set32(instr.rt(), data);
}

pub fn ldl(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 56 - 8 * (addr & 7) as u64;
    let mask = !(!0u64 << shift);

    let data = (cpu.regs[instr.rt()].lo & mask) | (cpu.read64(bus, addr & !7) << shift);

    cpu.set64(instr.rt(), data);
}

pub fn ldr(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 8 * (addr & 7) as u64;
    let mask = !(!0u64 >> shift);

    let data = (cpu.regs[instr.rt()].lo & mask) | (cpu.read64(bus, addr & !7) >> shift);

    cpu.set64(instr.rt(), data);
}

/* --- stores --- */

pub fn sb(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.regs[instr.rt()].u8(0);

    cpu.write8(bus, addr, data);
}

pub fn sh(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.regs[instr.rt()].u16(0);

    cpu.write16(bus, addr, data);
}

pub fn sw(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.regs[instr.rt()].u32(0);

    cpu.write32(bus, addr, data);
}

pub fn sd(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.regs[instr.rt()].lo;

    cpu.write64(bus, addr, data);
}

pub fn sq(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.regs[instr.rt()];

    cpu.write128(bus, addr, data);
}

pub fn swl(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 24 - 8 * (addr & 3);
    let mask = !(!0u32 >> shift);

    let data = (cpu.read32(bus, addr & !3) & mask) | (cpu.regs[instr.rt()].u32(0) >> shift);

    cpu.write32(bus, addr & !3, data);
}

pub fn swr(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 8 * (addr & 3);
    let mask = !(!0u32 << shift);

    let data = (cpu.read32(bus, addr & !3) & mask) | (cpu.regs[instr.rt()].u32(0) << shift);

    cpu.write32(bus, addr & !3, data);
}

pub fn sdl(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 56 - 8 * (addr & 7) as u64;
    let mask = !(!0u64 >> shift);

    let data = (cpu.read64(bus, addr & !7) & mask) | (cpu.regs[instr.rt()].lo >> shift);

    cpu.write64(bus, addr & !7, data);
}

pub fn sdr(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 8 * (addr & 7) as u64;
    let mask = !(!0u64 << shift);

    let data = (cpu.read64(bus, addr & !7) & mask) | (cpu.regs[instr.rt()].lo << shift);

    cpu.write64(bus, addr & !7, data);
}

/* --- system --- */

pub fn syscall(cpu: &mut Ee, _bus: &mut Bus, _instr: Instruction) {
    cpu.exception(Exception::SystemCall);
}

pub fn sync(_cpu: &mut Ee, _bus: &mut Bus, _instr: Instruction) {}

pub fn cache(_cpu: &mut Ee, _bus: &mut Bus, _instr: Instruction) {}

/* --- coprocessors --- */

pub fn cop0(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    match instr.rs() {
        COP_MF => {
            let data = cpu.cop0.get32(instr.rd());

            cpu.set32(instr.rt(), data);
        }
        COP_MT => {
            let data = cpu.regs[instr.rt()].u32(0);

            cpu.cop0.set32(instr.rd(), data);
        }
        rs if rs & 0x10 != 0 => match instr.funct() {
            CO_TLBWI => {
                // No TLB; fixed-segment mirroring only.
                tracing::trace!(target: "moe_core::ee::cpu", "TLBWI");
            }
            CO_ERET => {
                if cpu.cop0.status.erl() {
                    let target = cpu.cop0.error_epc;

                    cpu.set_pc(target);
                    cpu.cop0.status.set_erl(false);
                } else {
                    let target = cpu.cop0.epc;

                    cpu.set_pc(target);
                    cpu.cop0.status.set_exl(false);
                }

                cpu.check_fast_boot(bus);
            }
            CO_EI => {
                if cpu.cop0.status.edi() {
                    cpu.cop0.status.set_eie(true);
                }
            }
            CO_DI => {
                if cpu.cop0.status.edi() {
                    cpu.cop0.status.set_eie(false);
                }
            }
            funct => panic!(
                "[EE Core] unhandled COP0 control instruction {funct:#04X} ({:#010X}) @ {:#010X}",
                instr.0, cpu.cpc
            ),
        },
        rs => panic!(
            "[EE Core] unhandled COP0 instruction {rs:#04X} ({:#010X}) @ {:#010X}",
            instr.0, cpu.cpc
        ),
    }
}

pub fn cop1(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    match instr.rs() {
        COP_MF => {
            let data = cpu.fpu.get(instr.rd()).to_bits();

            cpu.set32(instr.rt(), data);
        }
        COP_CF => {
            let data = cpu.fpu.get_control(instr.rd());

            cpu.set32(instr.rt(), data);
        }
        COP_MT => {
            let data = cpu.regs[instr.rt()].u32(0);

            cpu.fpu.set(instr.rd(), f32::from_bits(data));
        }
        COP_CT => {
            let data = cpu.regs[instr.rt()].u32(0);

            cpu.fpu.set_control(instr.rd(), data);
        }
        0x10 => cpu.fpu.execute_single(instr),
        rs => panic!(
            "[EE Core] unhandled COP1 instruction {rs:#04X} ({:#010X}) @ {:#010X}",
            instr.0, cpu.cpc
        ),
    }
}

pub fn cop2(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    if instr.rs() & 0x10 != 0 {
        return bus.vus.execute_macro(0, instr);
    }

    match instr.rs() {
        COP_QMF => {
            let mut data = crate::types::U128::ZERO;

            for e in 0..4 {
                data.set_u32(e, bus.vus.unit(0).vf(instr.rd(), e).to_bits());
            }

            cpu.set128(instr.rt(), data);
        }
        COP_CF => {
            let data = bus.vus.get_control(0, instr.rd());

            cpu.set32(instr.rt(), data);
        }
        COP_QMT => {
            let data = cpu.regs[instr.rt()];

            for e in 0..4 {
                bus.vus.unit_mut(0).set_vf(instr.rd(), e, f32::from_bits(data.u32(e)));
            }
        }
        COP_CT => {
            let data = cpu.regs[instr.rt()].u32(0);

            bus.vus.set_control(0, instr.rd(), data);
        }
        rs => panic!(
            "[EE Core] unhandled COP2 instruction {rs:#04X} ({:#010X}) @ {:#010X}",
            instr.0, cpu.cpc
        ),
    }
}

/* --- LWC1 / SWC1 --- */

pub fn lwc1(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read32(bus, addr);

    cpu.fpu.set(instr.rt(), f32::from_bits(data));
}

pub fn swc1(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.fpu.get(instr.rt()).to_bits();

    cpu.write32(bus, addr, data);
}

/* --- MMI --- */

pub fn mmi(cpu: &mut Ee, bus: &mut Bus, instr: Instruction) {
    match instr.funct() {
        MMI_PLZCW => plzcw(cpu, instr),
        MMI_MMI0 => mmi0(cpu, bus, instr),
        MMI_MMI2 => mmi2(cpu, bus, instr),
        MMI_MFHI1 => {
            let data = cpu.regs[HI].hi;

            cpu.set64(instr.rd(), data);
        }
        MMI_MTHI1 => cpu.regs[HI].hi = cpu.regs[instr.rs()].lo,
        MMI_MFLO1 => {
            let data = cpu.regs[LO].hi;

            cpu.set64(instr.rd(), data);
        }
        MMI_MTLO1 => cpu.regs[LO].hi = cpu.regs[instr.rs()].lo,
        MMI_MULT1 => mult1(cpu, bus, instr),
        MMI_DIV1 => div1(cpu, bus, instr),
        MMI_DIVU1 => divu1(cpu, bus, instr),
        MMI_MMI1 => mmi1(cpu, bus, instr),
        MMI_MMI3 => mmi3(cpu, bus, instr),
        funct => panic!(
            "[EE Core] unhandled MMI instruction {funct:#04X} ({:#010X}) @ {:#010X}",
            instr.0, cpu.cpc
        ),
    }
}

/// Counts leading bits matching the sign, minus one, per 32-bit half.
fn plzcw(cpu: &mut Ee, instr: Instruction) {
    let rs = cpu.regs[instr.rs()];

    let count = |word: u32| -> u64 {
        if word & (1 << 31) != 0 {
            (word.leading_ones() - 1) as u64
        } else {
            (word.leading_zeros().max(1) - 1) as u64
        }
    };

    let res = count(rs.u32(0)) | (count(rs.u32(1)) << 32);

    cpu.set64(instr.rd(), res);
}

fn mmi0(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    match instr.shamt() {
        // PSUBB
        0x09 => {
            let mut res = crate::types::U128::ZERO;

            for lane in 0..16 {
                let diff = cpu.regs[instr.rs()]
                    .u8(lane)
                    .wrapping_sub(cpu.regs[instr.rt()].u8(lane));

                res.set_u8(lane, diff);
            }

            cpu.set128(instr.rd(), res);
        }
        // PEXTLW
        0x12 => {
            let rs = cpu.regs[instr.rs()];
            let rt = cpu.regs[instr.rt()];

            let mut res = crate::types::U128::ZERO;

            res.set_u32(0, rt.u32(0));
            res.set_u32(1, rs.u32(0));
            res.set_u32(2, rt.u32(1));
            res.set_u32(3, rs.u32(1));

            cpu.set128(instr.rd(), res);
        }
        shamt => panic!(
            "[EE Core] unhandled MMI0 instruction {shamt:#04X} ({:#010X}) @ {:#010X}",
            instr.0, cpu.cpc
        ),
    }
}

fn mmi1(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    match instr.shamt() {
        // PADDUW
        0x10 => {
            let mut res = crate::types::U128::ZERO;

            for lane in 0..4 {
                let sum = cpu.regs[instr.rs()].u32(lane) as u64
                    + cpu.regs[instr.rt()].u32(lane) as u64;

                res.set_u32(lane, sum.min(u32::MAX as u64) as u32);
            }

            cpu.set128(instr.rd(), res);
        }
        shamt => panic!(
            "[EE Core] unhandled MMI1 instruction {shamt:#04X} ({:#010X}) @ {:#010X}",
            instr.0, cpu.cpc
        ),
    }
}

fn mmi2(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    match instr.shamt() {
        // PMFHI
        0x08 => {
            let data = cpu.regs[HI];

            cpu.set128(instr.rd(), data);
        }
        // PMFLO
        0x09 => {
            let data = cpu.regs[LO];

            cpu.set128(instr.rd(), data);
        }
        // PCPYLD
        0x0E => {
            let res =
                crate::types::U128::new(cpu.regs[instr.rt()].lo, cpu.regs[instr.rs()].lo);

            cpu.set128(instr.rd(), res);
        }
        // PAND
        0x12 => {
            let res = crate::types::U128::new(
                cpu.regs[instr.rs()].lo & cpu.regs[instr.rt()].lo,
                cpu.regs[instr.rs()].hi & cpu.regs[instr.rt()].hi,
            );

            cpu.set128(instr.rd(), res);
        }
        shamt => panic!(
            "[EE Core] unhandled MMI2 instruction {shamt:#04X} ({:#010X}) @ {:#010X}",
            instr.0, cpu.cpc
        ),
    }
}

fn mmi3(cpu: &mut Ee, _bus: &mut Bus, instr: Instruction) {
    match instr.shamt() {
        // PMTHI
        0x08 => cpu.regs[HI] = cpu.regs[instr.rs()],
        // PMTLO
        0x09 => cpu.regs[LO] = cpu.regs[instr.rs()],
        // PCPYUD
        0x0E => {
            let res =
                crate::types::U128::new(cpu.regs[instr.rs()].hi, cpu.regs[instr.rt()].hi);

            cpu.set128(instr.rd(), res);
        }
        // POR
        0x12 => {
            let res = crate::types::U128::new(
                cpu.regs[instr.rs()].lo | cpu.regs[instr.rt()].lo,
                cpu.regs[instr.rs()].hi | cpu.regs[instr.rt()].hi,
            );

            cpu.set128(instr.rd(), res);
        }
        // PNOR
        0x13 => {
            let res = crate::types::U128::new(
                !(cpu.regs[instr.rs()].lo | cpu.regs[instr.rt()].lo),
                !(cpu.regs[instr.rs()].hi | cpu.regs[instr.rt()].hi),
            );

            cpu.set128(instr.rd(), res);
        }
        // PCPYH
        0x1B => {
            let rt = cpu.regs[instr.rt()];

            let mut res = crate::types::U128::ZERO;

            for lane in 0..4 {
                res.set_u16(lane, rt.u16(0));
                res.set_u16(lane + 4, rt.u16(4));
            }

            cpu.set128(instr.rd(), res);
        }
        shamt => panic!(
            "[EE Core] unhandled MMI3 instruction {shamt:#04X} ({:#010X}) @ {:#010X}",
            instr.0, cpu.cpc
        ),
    }
}
