//! Flat dispatch tables for the IOP interpreter.

use crate::bus::Bus;
use crate::iop::cpu::handlers;
use crate::iop::cpu::Iop;
use crate::mips::Instruction;

pub type Handler = fn(&mut Iop, &mut Bus, Instruction);

pub struct OpEntry {
    pub mnemonic: &'static str,
    pub handler: Handler,
}

macro_rules! op {
    ($mnemonic:literal, $handler:path) => {
        OpEntry { mnemonic: $mnemonic, handler: $handler }
    };
}

const INVALID: OpEntry = op!("???", handlers::invalid);
const INVALID_SPECIAL: OpEntry = op!("???", handlers::invalid_special);

pub static OPCODE_LUT: [OpEntry; 64] = [
    /* 0x00 */ op!("special", handlers::special),
    /* 0x01 */ op!("regimm", handlers::regimm),
    /* 0x02 */ op!("j", handlers::j),
    /* 0x03 */ op!("jal", handlers::jal),
    /* 0x04 */ op!("beq", handlers::beq),
    /* 0x05 */ op!("bne", handlers::bne),
    /* 0x06 */ op!("blez", handlers::blez),
    /* 0x07 */ op!("bgtz", handlers::bgtz),
    /* 0x08 */ op!("addi", handlers::addi),
    /* 0x09 */ op!("addiu", handlers::addiu),
    /* 0x0A */ op!("slti", handlers::slti),
    /* 0x0B */ op!("sltiu", handlers::sltiu),
    /* 0x0C */ op!("andi", handlers::andi),
    /* 0x0D */ op!("ori", handlers::ori),
    /* 0x0E */ op!("xori", handlers::xori),
    /* 0x0F */ op!("lui", handlers::lui),
    /* 0x10 */ op!("cop0", handlers::cop0),
    /* 0x11 */ INVALID,
    /* 0x12 */ INVALID, // GTE: PSX mode only
    /* 0x13 */ INVALID,
    /* 0x14 */ INVALID,
    /* 0x15 */ INVALID,
    /* 0x16 */ INVALID,
    /* 0x17 */ INVALID,
    /* 0x18 */ INVALID,
    /* 0x19 */ INVALID,
    /* 0x1A */ INVALID,
    /* 0x1B */ INVALID,
    /* 0x1C */ INVALID,
    /* 0x1D */ INVALID,
    /* 0x1E */ INVALID,
    /* 0x1F */ INVALID,
    /* 0x20 */ op!("lb", handlers::lb),
    /* 0x21 */ op!("lh", handlers::lh),
    /* 0x22 */ op!("lwl", handlers::lwl),
    /* 0x23 */ op!("lw", handlers::lw),
    /* 0x24 */ op!("lbu", handlers::lbu),
    /* 0x25 */ op!("lhu", handlers::lhu),
    /* 0x26 */ op!("lwr", handlers::lwr),
    /* 0x27 */ INVALID,
    /* 0x28 */ op!("sb", handlers::sb),
    /* 0x29 */ op!("sh", handlers::sh),
    /* 0x2A */ op!("swl", handlers::swl),
    /* 0x2B */ op!("sw", handlers::sw),
    /* 0x2C */ INVALID,
    /* 0x2D */ INVALID,
    /* 0x2E */ op!("swr", handlers::swr),
    /* 0x2F */ INVALID,
    /* 0x30 */ INVALID,
    /* 0x31 */ INVALID,
    /* 0x32 */ INVALID,
    /* 0x33 */ INVALID,
    /* 0x34 */ INVALID,
    /* 0x35 */ INVALID,
    /* 0x36 */ INVALID,
    /* 0x37 */ INVALID,
    /* 0x38 */ INVALID,
    /* 0x39 */ INVALID,
    /* 0x3A */ INVALID,
    /* 0x3B */ INVALID,
    /* 0x3C */ INVALID,
    /* 0x3D */ INVALID,
    /* 0x3E */ INVALID,
    /* 0x3F */ INVALID,
];

pub static SPECIAL_LUT: [OpEntry; 64] = [
    /* 0x00 */ op!("sll", handlers::sll),
    /* 0x01 */ INVALID_SPECIAL,
    /* 0x02 */ op!("srl", handlers::srl),
    /* 0x03 */ op!("sra", handlers::sra),
    /* 0x04 */ op!("sllv", handlers::sllv),
    /* 0x05 */ INVALID_SPECIAL,
    /* 0x06 */ op!("srlv", handlers::srlv),
    /* 0x07 */ op!("srav", handlers::srav),
    /* 0x08 */ op!("jr", handlers::jr),
    /* 0x09 */ op!("jalr", handlers::jalr),
    /* 0x0A */ INVALID_SPECIAL,
    /* 0x0B */ INVALID_SPECIAL,
    /* 0x0C */ op!("syscall", handlers::syscall),
    /* 0x0D */ op!("break", handlers::brk),
    /* 0x0E */ INVALID_SPECIAL,
    /* 0x0F */ INVALID_SPECIAL,
    /* 0x10 */ op!("mfhi", handlers::mfhi),
    /* 0x11 */ op!("mthi", handlers::mthi),
    /* 0x12 */ op!("mflo", handlers::mflo),
    /* 0x13 */ op!("mtlo", handlers::mtlo),
    /* 0x14 */ INVALID_SPECIAL,
    /* 0x15 */ INVALID_SPECIAL,
    /* 0x16 */ INVALID_SPECIAL,
    /* 0x17 */ INVALID_SPECIAL,
    /* 0x18 */ op!("mult", handlers::mult),
    /* 0x19 */ op!("multu", handlers::multu),
    /* 0x1A */ op!("div", handlers::div),
    /* 0x1B */ op!("divu", handlers::divu),
    /* 0x1C */ INVALID_SPECIAL,
    /* 0x1D */ INVALID_SPECIAL,
    /* 0x1E */ INVALID_SPECIAL,
    /* 0x1F */ INVALID_SPECIAL,
    /* 0x20 */ op!("add", handlers::add),
    /* 0x21 */ op!("addu", handlers::addu),
    /* 0x22 */ op!("sub", handlers::sub),
    /* 0x23 */ op!("subu", handlers::subu),
    /* 0x24 */ op!("and", handlers::and),
    /* 0x25 */ op!("or", handlers::or),
    /* 0x26 */ op!("xor", handlers::xor),
    /* 0x27 */ op!("nor", handlers::nor),
    /* 0x28 */ INVALID_SPECIAL,
    /* 0x29 */ INVALID_SPECIAL,
    /* 0x2A */ op!("slt", handlers::slt),
    /* 0x2B */ op!("sltu", handlers::sltu),
    /* 0x2C */ INVALID_SPECIAL,
    /* 0x2D */ INVALID_SPECIAL,
    /* 0x2E */ INVALID_SPECIAL,
    /* 0x2F */ INVALID_SPECIAL,
    /* 0x30 */ INVALID_SPECIAL,
    /* 0x31 */ INVALID_SPECIAL,
    /* 0x32 */ INVALID_SPECIAL,
    /* 0x33 */ INVALID_SPECIAL,
    /* 0x34 */ INVALID_SPECIAL,
    /* 0x35 */ INVALID_SPECIAL,
    /* 0x36 */ INVALID_SPECIAL,
    /* 0x37 */ INVALID_SPECIAL,
    /* 0x38 */ INVALID_SPECIAL,
    /* 0x39 */ INVALID_SPECIAL,
    /* 0x3A */ INVALID_SPECIAL,
    /* 0x3B */ INVALID_SPECIAL,
    /* 0x3C */ INVALID_SPECIAL,
    /* 0x3D */ INVALID_SPECIAL,
    /* 0x3E */ INVALID_SPECIAL,
    /* 0x3F */ INVALID_SPECIAL,
];

/// Indexed by `rt & 0x11`: bit 0 selects BGEZ, bit 4 selects the linking
/// variants. The remaining slots are unreachable through the dispatch mask.
pub static REGIMM_LUT: [OpEntry; 32] = [
    /* 0x00 */ op!("bltz", handlers::bltz),
    /* 0x01 */ op!("bgez", handlers::bgez),
    /* 0x02 */ INVALID,
    /* 0x03 */ INVALID,
    /* 0x04 */ INVALID,
    /* 0x05 */ INVALID,
    /* 0x06 */ INVALID,
    /* 0x07 */ INVALID,
    /* 0x08 */ INVALID,
    /* 0x09 */ INVALID,
    /* 0x0A */ INVALID,
    /* 0x0B */ INVALID,
    /* 0x0C */ INVALID,
    /* 0x0D */ INVALID,
    /* 0x0E */ INVALID,
    /* 0x0F */ INVALID,
    /* 0x10 */ op!("bltzal", handlers::bltzal),
    /* 0x11 */ op!("bgezal", handlers::bgezal),
    /* 0x12 */ INVALID,
    /* 0x13 */ INVALID,
    /* 0x14 */ INVALID,
    /* 0x15 */ INVALID,
    /* 0x16 */ INVALID,
    /* 0x17 */ INVALID,
    /* 0x18 */ INVALID,
    /* 0x19 */ INVALID,
    /* 0x1A */ INVALID,
    /* 0x1B */ INVALID,
    /* 0x1C */ INVALID,
    /* 0x1D */ INVALID,
    /* 0x1E */ INVALID,
    /* 0x1F */ INVALID,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lut_entries_line_up_with_their_slots() {
        assert_eq!(OPCODE_LUT[0x23].mnemonic, "lw");
        assert_eq!(SPECIAL_LUT[0x0C].mnemonic, "syscall");
        assert_eq!(REGIMM_LUT[0x11].mnemonic, "bgezal");
    }
}
