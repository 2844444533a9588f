//! RISC-V branch decoding: bit-field extraction only.

use stf_types::{
    bytes::{
        bit,
        bit_range,
        sign_extend,
    },
    Iem,
};

/// Decoded branch properties of an opcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchInfo {
    /// Computed target. Zero for indirect branches, whose target only the
    /// trace knows.
    pub target: u64,
    /// Conditional branch
    pub conditional: bool,
    /// Call (writes a link register)
    pub call: bool,
    /// Return (jumps through the link register)
    pub ret: bool,
    /// Indirect (target comes from a register)
    pub indirect: bool,
}

fn target(pc: u64, offset: i64) -> u64 {
    pc.wrapping_add(offset as u64)
}

/// Target of a C.J / C.JAL instruction.
fn cj_target(pc: u64, opcode: u16) -> u64 {
    let op = opcode as u64;
    let imm = (bit(op, 12) << 11)
        | (bit(op, 8) << 10)
        | (bit_range(op, 10, 9) << 8)
        | (bit(op, 6) << 7)
        | (bit(op, 7) << 6)
        | (bit(op, 2) << 5)
        | (bit(op, 11) << 4)
        | (bit_range(op, 5, 3) << 1);
    target(pc, sign_extend(imm, 12))
}

/// Decodes a compressed instruction. `None` if it is not a branch.
pub fn decode16(iem: Iem, pc: u64, opcode: u16) -> Option<BranchInfo> {
    let op = opcode as u64;
    let top = bit_range(op, 15, 13);
    let bottom = bit_range(op, 1, 0);

    match top {
        // C.JAL is RV32-only; the same encoding holds C.ADDIW on RV64.
        0b001 => {
            if bottom != 0b01 || iem != Iem::Rv32 {
                return None;
            }
            Some(BranchInfo {
                target: cj_target(pc, opcode),
                call: true,
                ..Default::default()
            })
        }
        // C.BEQZ / C.BNEZ
        0b110 | 0b111 => {
            if bottom != 0b01 {
                return None;
            }
            let imm = (bit(op, 12) << 8)
                | (bit(op, 6) << 7)
                | (bit(op, 5) << 6)
                | (bit(op, 2) << 5)
                | (bit_range(op, 11, 10) << 3)
                | (bit_range(op, 4, 3) << 1);
            Some(BranchInfo {
                target: target(pc, sign_extend(imm, 9)),
                conditional: true,
                ..Default::default()
            })
        }
        // C.JR / C.JALR
        0b100 => {
            let rs1 = bit_range(op, 11, 7);
            let rs2 = bit_range(op, 6, 2);
            if bottom != 0b10 || rs1 == 0 || rs2 != 0 {
                return None;
            }
            let call = bit(op, 12) != 0;
            Some(BranchInfo {
                call,
                ret: !call && rs1 == 1,
                indirect: true,
                ..Default::default()
            })
        }
        // C.J
        0b101 => {
            if bottom != 0b01 {
                return None;
            }
            Some(BranchInfo {
                target: cj_target(pc, opcode),
                ..Default::default()
            })
        }
        _ => None,
    }
}

/// Decodes a full-size instruction. `None` if it is not a branch.
pub fn decode32(pc: u64, opcode: u32) -> Option<BranchInfo> {
    let op = opcode as u64;
    if bit_range(op, 6, 5) != 0b11 || bit_range(op, 1, 0) != 0b11 {
        return None;
    }

    match bit_range(op, 4, 2) {
        // BEQ / BNE / BLT / BGE / BLTU / BGEU
        0b000 => {
            let imm = (bit(op, 31) << 12)
                | (bit(op, 7) << 11)
                | (bit_range(op, 30, 25) << 5)
                | (bit_range(op, 11, 8) << 1);
            Some(BranchInfo {
                target: target(pc, sign_extend(imm, 13)),
                conditional: true,
                ..Default::default()
            })
        }
        // JALR
        0b001 => {
            let rd = bit_range(op, 11, 7);
            let rs1 = bit_range(op, 19, 15);
            Some(BranchInfo {
                call: rd != 0,
                ret: rd == 0 && rs1 == 1,
                indirect: true,
                ..Default::default()
            })
        }
        // JAL
        0b011 => {
            let imm = (bit(op, 31) << 20)
                | (bit_range(op, 19, 12) << 12)
                | (bit(op, 20) << 11)
                | (bit_range(op, 30, 21) << 1);
            Some(BranchInfo {
                target: target(pc, sign_extend(imm, 21)),
                call: bit_range(op, 11, 7) != 0,
                ..Default::default()
            })
        }
        _ => None,
    }
}

/// Decodes either opcode width.
pub fn decode(iem: Iem, pc: u64, opcode: u32, opcode_size: u8) -> Option<BranchInfo> {
    match opcode_size {
        2 => decode16(iem, pc, opcode as u16),
        _ => decode32(pc, opcode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jal_decodes_as_call() {
        // JAL x1, +8
        let info = decode32(0x1000, 0x008000ef).unwrap();
        assert!(info.call);
        assert!(!info.conditional);
        assert!(!info.indirect);
        assert_eq!(info.target, 0x1008);
    }

    #[test]
    fn jal_negative_offset() {
        // JAL x0, -16 (a plain backwards jump)
        let info = decode32(0x1000, 0xff1ff06f).unwrap();
        assert!(!info.call);
        assert_eq!(info.target, 0xff0);
    }

    #[test]
    fn jalr_return() {
        // JALR x0, x1, 0 (ret)
        let info = decode32(0x2000, 0x00008067).unwrap();
        assert!(info.indirect);
        assert!(info.ret);
        assert!(!info.call);
        assert_eq!(info.target, 0);
    }

    #[test]
    fn jalr_indirect_call() {
        // JALR x1, x5, 0
        let info = decode32(0x2000, 0x000280e7).unwrap();
        assert!(info.indirect);
        assert!(info.call);
        assert!(!info.ret);
    }

    #[test]
    fn conditional_branch_forward() {
        // BEQ x0, x0, +16
        let info = decode32(0x1000, 0x00000863).unwrap();
        assert!(info.conditional);
        assert_eq!(info.target, 0x1010);
    }

    #[test]
    fn conditional_branch_backward() {
        // BNE x10, x11, -4
        let info = decode32(0x1000, 0xfeb51ee3).unwrap();
        assert!(info.conditional);
        assert_eq!(info.target, 0xffc);
    }

    #[test]
    fn loads_are_not_branches() {
        assert!(decode32(0x1000, 0x0000a503).is_none()); // LW
        assert!(decode32(0x1000, 0x00a50533).is_none()); // ADD
    }

    #[test]
    fn compressed_jump() {
        // C.J +0 encodes as 0b101_00000000000_01
        let info = decode16(Iem::Rv64, 0x1000, 0xa001).unwrap();
        assert!(!info.call);
        assert_eq!(info.target, 0x1000);
    }

    #[test]
    fn compressed_jr_is_return() {
        // C.JR x1
        let info = decode16(Iem::Rv64, 0x1000, 0x8082).unwrap();
        assert!(info.indirect);
        assert!(info.ret);
    }

    #[test]
    fn compressed_jal_only_on_rv32() {
        // 0b001 quadrant-1 encoding: C.JAL on RV32, C.ADDIW on RV64.
        let opcode = 0x2001;
        assert!(decode16(Iem::Rv32, 0x1000, opcode).is_some());
        assert!(decode16(Iem::Rv64, 0x1000, opcode).is_none());
    }

    #[test]
    fn compressed_beqz() {
        // C.BEQZ x8, +0
        let info = decode16(Iem::Rv64, 0x1000, 0xc001).unwrap();
        assert!(info.conditional);
        assert_eq!(info.target, 0x1000);
    }
}
