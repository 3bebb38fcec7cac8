//! Flat dispatch tables for the EE interpreter.

use crate::bus::Bus;
use crate::ee::cpu::handlers;
use crate::ee::cpu::Ee;
use crate::mips::Instruction;

pub type Handler = fn(&mut Ee, &mut Bus, Instruction);

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
const INVALID_REGIMM: OpEntry = op!("???", handlers::invalid_regimm);

pub static OPCODE_LUT: [OpEntry; 64] = [
    /* 0x00 */ op!("special", handlers::special),
    /* 0x01 */ op!("regimm", handlers::regimm),
    /* 0x02 */ op!("j", handlers::j),
    /* 0x03 */ op!("jal", handlers::jal),
    /* 0x04 */ op!("beq", handlers::beq),
    /* 0x05 */ op!("bne", handlers::bne),
    /* 0x06 */ op!("blez", handlers::blez),
    /* 0x07 */ op!("bgtz", handlers::bgtz),
    /* 0x08 */ INVALID,
    /* 0x09 */ op!("addiu", handlers::addiu),
    /* 0x0A */ op!("slti", handlers::slti),
    /* 0x0B */ op!("sltiu", handlers::sltiu),
    /* 0x0C */ op!("andi", handlers::andi),
    /* 0x0D */ op!("ori", handlers::ori),
    /* 0x0E */ op!("xori", handlers::xori),
    /* 0x0F */ op!("lui", handlers::lui),
    /* 0x10 */ op!("cop0", handlers::cop0),
    /* 0x11 */ op!("cop1", handlers::cop1),
    /* 0x12 */ op!("cop2", handlers::cop2),
    /* 0x13 */ INVALID,
    /* 0x14 */ op!("beql", handlers::beql),
    /* 0x15 */ op!("bnel", handlers::bnel),
    /* 0x16 */ op!("blezl", handlers::blezl),
    /* 0x17 */ INVALID,
    /* 0x18 */ INVALID,
    /* 0x19 */ op!("daddiu", handlers::daddiu),
    /* 0x1A */ op!("ldl", handlers::ldl),
    /* 0x1B */ op!("ldr", handlers::ldr),
    /* 0x1C */ op!("mmi", handlers::mmi),
    /* 0x1D */ INVALID,
    /* 0x1E */ op!("lq", handlers::lq),
    /* 0x1F */ op!("sq", handlers::sq),
    /* 0x20 */ op!("lb", handlers::lb),
    /* 0x21 */ op!("lh", handlers::lh),
    /* 0x22 */ op!("lwl", handlers::lwl),
    /* 0x23 */ op!("lw", handlers::lw),
    /* 0x24 */ op!("lbu", handlers::lbu),
    /* 0x25 */ op!("lhu", handlers::lhu),
    /* 0x26 */ op!("lwr", handlers::lwr),
    /* 0x27 */ op!("lwu", handlers::lwu),
    /* 0x28 */ op!("sb", handlers::sb),
    /* 0x29 */ op!("sh", handlers::sh),
    /* 0x2A */ op!("swl", handlers::swl),
    /* 0x2B */ op!("sw", handlers::sw),
    /* 0x2C */ op!("sdl", handlers::sdl),
    /* 0x2D */ op!("sdr", handlers::sdr),
    /* 0x2E */ op!("swr", handlers::swr),
    /* 0x2F */ op!("cache", handlers::cache),
    /* 0x30 */ INVALID,
    /* 0x31 */ op!("lwc1", handlers::lwc1),
    /* 0x32 */ INVALID,
    /* 0x33 */ INVALID,
    /* 0x34 */ INVALID,
    /* 0x35 */ INVALID,
    /* 0x36 */ INVALID,
    /* 0x37 */ op!("ld", handlers::ld),
    /* 0x38 */ INVALID,
    /* 0x39 */ op!("swc1", handlers::swc1),
    /* 0x3A */ INVALID,
    /* 0x3B */ INVALID,
    /* 0x3C */ INVALID,
    /* 0x3D */ INVALID,
    /* 0x3E */ INVALID,
    /* 0x3F */ op!("sd", handlers::sd),
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
    /* 0x0A */ op!("movz", handlers::movz),
    /* 0x0B */ op!("movn", handlers::movn),
    /* 0x0C */ op!("syscall", handlers::syscall),
    /* 0x0D */ INVALID_SPECIAL,
    /* 0x0E */ INVALID_SPECIAL,
    /* 0x0F */ op!("sync", handlers::sync),
    /* 0x10 */ op!("mfhi", handlers::mfhi),
    /* 0x11 */ op!("mthi", handlers::mthi),
    /* 0x12 */ op!("mflo", handlers::mflo),
    /* 0x13 */ op!("mtlo", handlers::mtlo),
    /* 0x14 */ op!("dsllv", handlers::dsllv),
    /* 0x15 */ INVALID_SPECIAL,
    /* 0x16 */ INVALID_SPECIAL,
    /* 0x17 */ op!("dsrav", handlers::dsrav),
    /* 0x18 */ op!("mult", handlers::mult),
    /* 0x19 */ INVALID_SPECIAL,
    /* 0x1A */ op!("div", handlers::div),
    /* 0x1B */ op!("divu", handlers::divu),
    /* 0x1C */ INVALID_SPECIAL,
    /* 0x1D */ INVALID_SPECIAL,
    /* 0x1E */ INVALID_SPECIAL,
    /* 0x1F */ INVALID_SPECIAL,
    /* 0x20 */ INVALID_SPECIAL,
    /* 0x21 */ op!("addu", handlers::addu),
    /* 0x22 */ INVALID_SPECIAL,
    /* 0x23 */ op!("subu", handlers::subu),
    /* 0x24 */ op!("and", handlers::and),
    /* 0x25 */ op!("or", handlers::or),
    /* 0x26 */ op!("xor", handlers::xor),
    /* 0x27 */ op!("nor", handlers::nor),
    /* 0x28 */ op!("mfsa", handlers::mfsa),
    /* 0x29 */ op!("mtsa", handlers::mtsa),
    /* 0x2A */ op!("slt", handlers::slt),
    /* 0x2B */ op!("sltu", handlers::sltu),
    /* 0x2C */ INVALID_SPECIAL,
    /* 0x2D */ op!("daddu", handlers::daddu),
    /* 0x2E */ INVALID_SPECIAL,
    /* 0x2F */ op!("dsubu", handlers::dsubu),
    /* 0x30 */ INVALID_SPECIAL,
    /* 0x31 */ INVALID_SPECIAL,
    /* 0x32 */ INVALID_SPECIAL,
    /* 0x33 */ INVALID_SPECIAL,
    /* 0x34 */ INVALID_SPECIAL,
    /* 0x35 */ INVALID_SPECIAL,
    /* 0x36 */ INVALID_SPECIAL,
    /* 0x37 */ INVALID_SPECIAL,
    /* 0x38 */ op!("dsll", handlers::dsll),
    /* 0x39 */ INVALID_SPECIAL,
    /* 0x3A */ op!("dsrl", handlers::dsrl),
    /* 0x3B */ INVALID_SPECIAL,
    /* 0x3C */ op!("dsll32", handlers::dsll32),
    /* 0x3D */ INVALID_SPECIAL,
    /* 0x3E */ op!("dsrl32", handlers::dsrl32),
    /* 0x3F */ op!("dsra32", handlers::dsra32),
];

pub static REGIMM_LUT: [OpEntry; 32] = [
    /* 0x00 */ op!("bltz", handlers::bltz),
    /* 0x01 */ op!("bgez", handlers::bgez),
    /* 0x02 */ op!("bltzl", handlers::bltzl),
    /* 0x03 */ op!("bgezl", handlers::bgezl),
    /* 0x04 */ INVALID_REGIMM,
    /* 0x05 */ INVALID_REGIMM,
    /* 0x06 */ INVALID_REGIMM,
    /* 0x07 */ INVALID_REGIMM,
    /* 0x08 */ INVALID_REGIMM,
    /* 0x09 */ INVALID_REGIMM,
    /* 0x0A */ INVALID_REGIMM,
    /* 0x0B */ INVALID_REGIMM,
    /* 0x0C */ INVALID_REGIMM,
    /* 0x0D */ INVALID_REGIMM,
    /* 0x0E */ INVALID_REGIMM,
    /* 0x0F */ INVALID_REGIMM,
    /* 0x10 */ INVALID_REGIMM,
    /* 0x11 */ INVALID_REGIMM,
    /* 0x12 */ INVALID_REGIMM,
    /* 0x13 */ INVALID_REGIMM,
    /* 0x14 */ INVALID_REGIMM,
    /* 0x15 */ INVALID_REGIMM,
    /* 0x16 */ INVALID_REGIMM,
    /* 0x17 */ INVALID_REGIMM,
    /* 0x18 */ INVALID_REGIMM,
    /* 0x19 */ INVALID_REGIMM,
    /* 0x1A */ INVALID_REGIMM,
    /* 0x1B */ INVALID_REGIMM,
    /* 0x1C */ INVALID_REGIMM,
    /* 0x1D */ INVALID_REGIMM,
    /* 0x1E */ INVALID_REGIMM,
    /* 0x1F */ INVALID_REGIMM,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lut_entries_line_up_with_their_slots() {
        assert_eq!(OPCODE_LUT[0x09].mnemonic, "addiu");
        assert_eq!(OPCODE_LUT[0x3F].mnemonic, "sd");
        assert_eq!(SPECIAL_LUT[0x18].mnemonic, "mult");
        assert_eq!(SPECIAL_LUT[0x3F].mnemonic, "dsra32");
        assert_eq!(REGIMM_LUT[0x01].mnemonic, "bgez");
    }
}
