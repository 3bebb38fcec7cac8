//! IOP instruction handlers (MIPS-I base set).

use crate::bus::Bus;
use crate::iop::cop0::Exception;
use crate::iop::cpu::lut::{REGIMM_LUT, SPECIAL_LUT};
use crate::iop::cpu::{Iop, HI, LO, R0, RA};
use crate::mips::Instruction;

/* COP rs sub-opcodes */
const COP_MF: usize = 0x00;
const COP_MT: usize = 0x04;

/* COP0 CO functions */
const CO_RFE: usize = 0x10;

pub fn invalid(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    panic!(
        "[IOP] unhandled instruction {:#04X} ({:#010X}) @ {:#010X}",
        instr.opcode(),
        instr.0,
        cpu.cpc
    );
}

pub fn invalid_special(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    panic!(
        "[IOP] unhandled SPECIAL instruction {:#04X} ({:#010X}) @ {:#010X}",
        instr.funct(),
        instr.0,
        cpu.cpc
    );
}

/* --- dispatchers --- */

pub fn special(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    (SPECIAL_LUT[instr.funct()].handler)(cpu, bus, instr);
}

pub fn regimm(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    // Bit 0 selects BGEZ, bit 4 selects the linking variants.
    (REGIMM_LUT[instr.rt() & 0x11].handler)(cpu, bus, instr);
}

/* --- arithmetic / logic --- */

pub fn add(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let rs = cpu.regs[instr.rs()] as i32;
    let rt = cpu.regs[instr.rt()] as i32;

    match rs.checked_add(rt) {
        Some(res) => cpu.set(instr.rd(), res as u32),
        None => cpu.exception(Exception::Overflow),
    }
}

pub fn addi(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let rs = cpu.regs[instr.rs()] as i32;

    match rs.checked_add(instr.simm() as i32) {
        Some(res) => cpu.set(instr.rt(), res as u32),
        None => cpu.exception(Exception::Overflow),
    }
}

pub fn addiu(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].wrapping_add(instr.simm());

    cpu.set(instr.rt(), res);
}

pub fn addu(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].wrapping_add(cpu.regs[instr.rt()]);

    cpu.set(instr.rd(), res);
}

pub fn sub(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let rs = cpu.regs[instr.rs()] as i32;
    let rt = cpu.regs[instr.rt()] as i32;

    match rs.checked_sub(rt) {
        Some(res) => cpu.set(instr.rd(), res as u32),
        None => cpu.exception(Exception::Overflow),
    }
}

pub fn subu(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()].wrapping_sub(cpu.regs[instr.rt()]);

    cpu.set(instr.rd(), res);
}

pub fn and(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()] & cpu.regs[instr.rt()];

    cpu.set(instr.rd(), res);
}

pub fn andi(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()] & instr.imm() as u32;

    cpu.set(instr.rt(), res);
}

pub fn or(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()] | cpu.regs[instr.rt()];

    cpu.set(instr.rd(), res);
}

pub fn ori(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()] | instr.imm() as u32;

    cpu.set(instr.rt(), res);
}

pub fn xor(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()] ^ cpu.regs[instr.rt()];

    cpu.set(instr.rd(), res);
}

pub fn xori(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()] ^ instr.imm() as u32;

    cpu.set(instr.rt(), res);
}

pub fn nor(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = !(cpu.regs[instr.rs()] | cpu.regs[instr.rt()]);

    cpu.set(instr.rd(), res);
}

pub fn lui(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    cpu.set(instr.rt(), (instr.imm() as u32) << 16);
}

pub fn slt(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rs()] as i32) < (cpu.regs[instr.rt()] as i32);

    cpu.set(instr.rd(), res as u32);
}

pub fn slti(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rs()] as i32) < instr.simm() as i32;

    cpu.set(instr.rt(), res as u32);
}

pub fn sltiu(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()] < instr.simm();

    cpu.set(instr.rt(), res as u32);
}

pub fn sltu(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rs()] < cpu.regs[instr.rt()];

    cpu.set(instr.rd(), res as u32);
}

/* --- shifts --- */

pub fn sll(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()] << instr.shamt();

    cpu.set(instr.rd(), res);
}

pub fn srl(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()] >> instr.shamt();

    cpu.set(instr.rd(), res);
}

pub fn sra(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rt()] as i32) >> instr.shamt();

    cpu.set(instr.rd(), res as u32);
}

pub fn sllv(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()] << (cpu.regs[instr.rs()] & 0x1F);

    cpu.set(instr.rd(), res);
}

pub fn srlv(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = cpu.regs[instr.rt()] >> (cpu.regs[instr.rs()] & 0x1F);

    cpu.set(instr.rd(), res);
}

pub fn srav(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rt()] as i32) >> (cpu.regs[instr.rs()] & 0x1F);

    cpu.set(instr.rd(), res as u32);
}

/* --- multiply / divide --- */

pub fn mult(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res =
        (cpu.regs[instr.rs()] as i32 as i64) * (cpu.regs[instr.rt()] as i32 as i64);

    cpu.regs[LO] = res as u32;
    cpu.regs[HI] = (res >> 32) as u32;
}

pub fn multu(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let res = (cpu.regs[instr.rs()] as u64) * (cpu.regs[instr.rt()] as u64);

    cpu.regs[LO] = res as u32;
    cpu.regs[HI] = (res >> 32) as u32;
}

pub fn div(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let n = cpu.regs[instr.rs()] as i32;
    let d = cpu.regs[instr.rt()] as i32;

    if d == 0 {
        cpu.regs[LO] = if n >= 0 { u32::MAX } else { 1 };
        cpu.regs[HI] = n as u32;
    } else if n == i32::MIN && d == -1 {
        cpu.regs[LO] = i32::MIN as u32;
        cpu.regs[HI] = 0;
    } else {
        cpu.regs[LO] = (n / d) as u32;
        cpu.regs[HI] = (n % d) as u32;
    }
}

pub fn divu(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let n = cpu.regs[instr.rs()];
    let d = cpu.regs[instr.rt()];

    if d == 0 {
        cpu.regs[LO] = u32::MAX;
        cpu.regs[HI] = n;
    } else {
        cpu.regs[LO] = n / d;
        cpu.regs[HI] = n % d;
    }
}

pub fn mfhi(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let data = cpu.regs[HI];

    cpu.set(instr.rd(), data);
}

pub fn mthi(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    cpu.regs[HI] = cpu.regs[instr.rs()];
}

pub fn mflo(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let data = cpu.regs[LO];

    cpu.set(instr.rd(), data);
}

pub fn mtlo(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    cpu.regs[LO] = cpu.regs[instr.rs()];
}

/* --- branches --- */

pub fn j(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = instr.jump_target(cpu.pc);

    cpu.do_branch(target, true, R0);
}

pub fn jal(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = instr.jump_target(cpu.pc);

    cpu.do_branch(target, true, RA);
}

pub fn jr(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.regs[instr.rs()];

    cpu.do_branch(target, true, R0);
}

pub fn jalr(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.regs[instr.rs()];

    cpu.do_branch(target, true, instr.rd());
}

pub fn beq(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = cpu.regs[instr.rs()] == cpu.regs[instr.rt()];

    cpu.do_branch(target, cond, R0);
}

pub fn bne(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = cpu.regs[instr.rs()] != cpu.regs[instr.rt()];

    cpu.do_branch(target, cond, R0);
}

pub fn blez(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()] as i32) <= 0;

    cpu.do_branch(target, cond, R0);
}

pub fn bgtz(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()] as i32) > 0;

    cpu.do_branch(target, cond, R0);
}

pub fn bltz(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()] as i32) < 0;

    cpu.do_branch(target, cond, R0);
}

pub fn bgez(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()] as i32) >= 0;

    cpu.do_branch(target, cond, R0);
}

pub fn bltzal(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()] as i32) < 0;

    cpu.do_branch(target, cond, RA);
}

pub fn bgezal(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    let target = cpu.pc.wrapping_add(instr.branch_offset());
    let cond = (cpu.regs[instr.rs()] as i32) >= 0;

    cpu.do_branch(target, cond, RA);
}

/* --- loads / stores --- */

#[inline(always)]
fn effective_addr(cpu: &Iop, instr: Instruction) -> u32 {
    cpu.regs[instr.rs()].wrapping_add(instr.simm())
}

pub fn lb(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read8(bus, addr) as i8 as u32;

    cpu.set(instr.rt(), data);
}

pub fn lbu(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read8(bus, addr) as u32;

    cpu.set(instr.rt(), data);
}

pub fn lh(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read16(bus, addr) as i16 as u32;

    cpu.set(instr.rt(), data);
}

pub fn lhu(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read16(bus, addr) as u32;

    cpu.set(instr.rt(), data);
}

pub fn lw(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.read32(bus, addr);

    cpu.set(instr.rt(), data);
}

pub fn lwl(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 24 - 8 * (addr & 3);
    let mask = !(!0u32 << shift);

    let data = (cpu.regs[instr.rt()] & mask) | (cpu.read32(bus, addr & !3) << shift);

    cpu.set(instr.rt(), data);
}

pub fn lwr(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 8 * (addr & 3);
    let mask = !(!0u32 >> shift);

    let data = (cpu.regs[instr.rt()] & mask) | (cpu.read32(bus, addr & !3) >> shift);

    cpu.set(instr.rt(), data);
}

pub fn sb(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.regs[instr.rt()] as u8;

    cpu.write8(bus, addr, data);
}

pub fn sh(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.regs[instr.rt()] as u16;

    cpu.write16(bus, addr, data);
}

pub fn sw(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);
    let data = cpu.regs[instr.rt()];

    cpu.write32(bus, addr, data);
}

pub fn swl(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 24 - 8 * (addr & 3);
    let mask = !(!0u32 >> shift);

    let data = (cpu.read32(bus, addr & !3) & mask) | (cpu.regs[instr.rt()] >> shift);

    cpu.write32(bus, addr & !3, data);
}

pub fn swr(cpu: &mut Iop, bus: &mut Bus, instr: Instruction) {
    let addr = effective_addr(cpu, instr);

    let shift = 8 * (addr & 3);
    let mask = !(!0u32 << shift);

    let data = (cpu.read32(bus, addr & !3) & mask) | (cpu.regs[instr.rt()] << shift);

    cpu.write32(bus, addr & !3, data);
}

/* --- system --- */

pub fn syscall(cpu: &mut Iop, _bus: &mut Bus, _instr: Instruction) {
    cpu.exception(Exception::SystemCall);
}

pub fn brk(cpu: &mut Iop, _bus: &mut Bus, _instr: Instruction) {
    cpu.exception(Exception::Break);
}

pub fn cop0(cpu: &mut Iop, _bus: &mut Bus, instr: Instruction) {
    match instr.rs() {
        COP_MF => {
            let data = cpu.cop0.get(instr.rd());

            cpu.set(instr.rt(), data);
        }
        COP_MT => {
            let data = cpu.regs[instr.rt()];

            cpu.cop0.set(instr.rd(), data);
        }
        rs if rs & 0x10 != 0 => match instr.funct() {
            CO_RFE => cpu.cop0.leave_exception(),
            funct => panic!(
                "[IOP] unhandled COP0 control instruction {funct:#04X} ({:#010X}) @ {:#010X}",
                instr.0, cpu.cpc
            ),
        },
        rs => panic!(
            "[IOP] unhandled COP0 instruction {rs:#04X} ({:#010X}) @ {:#010X}",
            instr.0, cpu.cpc
        ),
    }
}
