//! Instruction dispatch and semantics for the 78K/0.
//!
//! One match arm per opcode row: rows that differ only in the register or
//! bit index embedded in the opcode share an arm and decode the index by
//! masking. The prefix bytes 0x61, 0x71, and 0x31 dispatch on a second
//! byte in their own functions.

use crate::flags::{AC, CY, Z};
use crate::registers::{A, AX, B, C, DE, HL};

use super::{Opcode, StepError, Upd78k0};

/// First `callt` vector; the 32 word vectors occupy 0x0040-0x007F.
const CALLT_BASE: u16 = 0x0040;

impl Upd78k0 {
    // =========================================================================
    // Primary opcodes
    // =========================================================================

    /// Execute one instruction whose first byte is `op`. `start_pc` is the
    /// address the byte was fetched from, for error reporting.
    pub(super) fn execute_primary(&mut self, op: u8, start_pc: u16) -> Result<(), StepError> {
        match op {
            // NOP
            0x00 => {}

            // NOT1 CY
            0x01 => {
                let cy = self.flag(CY);
                self.set_flag(CY, !cy);
            }

            // DBNZ saddr, $rel
            0x04 => {
                let addr = self.consume_saddr();
                let value = self.read_byte(addr).wrapping_sub(1);
                self.write_byte(addr, value);
                let disp = self.consume_byte();
                if value != 0 {
                    self.branch_rel(disp);
                }
            }

            // XCH A, [DE] / XCH A, [HL]
            0x05 | 0x07 => {
                let addr = self.read_gp_pair(if op == 0x05 { DE } else { HL });
                let a = self.read_gp_reg(A);
                let other = self.read_byte(addr);
                self.write_gp_reg(A, other);
                self.write_byte(addr, a);
            }

            // MOVW rp, #word (10=AX, 12=BC, 14=DE, 16=HL)
            0x10 | 0x12 | 0x14 | 0x16 => {
                let value = self.consume_word();
                self.write_gp_pair((op >> 1) & 3, value);
            }

            // MOV saddr, #byte
            0x11 => {
                let addr = self.consume_saddr();
                let value = self.consume_byte();
                self.write_byte(addr, value);
            }

            // MOV sfr, #byte
            0x13 => {
                let addr = self.consume_sfr();
                let value = self.consume_byte();
                self.write_byte(addr, value);
            }

            // SET1 CY
            0x20 => self.set_flag(CY, true),

            // CLR1 CY
            0x21 => self.set_flag(CY, false),

            // PUSH PSW
            0x22 => {
                let psw = self.read_psw();
                self.push_byte(psw);
            }

            // POP PSW
            0x23 => {
                let psw = self.pop_byte();
                self.write_psw(psw);
            }

            // ROR A, 1 - bit 0 to both CY and bit 7
            0x24 => {
                let a = self.read_gp_reg(A);
                self.set_flag(CY, a & 0x01 != 0);
                self.write_gp_reg(A, a.rotate_right(1));
            }

            // RORC A, 1 - rotate right through carry
            0x25 => {
                let a = self.read_gp_reg(A);
                let carry_in = if self.flag(CY) { 0x80 } else { 0x00 };
                self.set_flag(CY, a & 0x01 != 0);
                self.write_gp_reg(A, (a >> 1) | carry_in);
            }

            // ROL A, 1 - bit 7 to both CY and bit 0
            0x26 => {
                let a = self.read_gp_reg(A);
                self.set_flag(CY, a & 0x80 != 0);
                self.write_gp_reg(A, a.rotate_left(1));
            }

            // ROLC A, 1 - rotate left through carry
            0x27 => {
                let a = self.read_gp_reg(A);
                let carry_in = u8::from(self.flag(CY));
                self.set_flag(CY, a & 0x80 != 0);
                self.write_gp_reg(A, (a << 1) | carry_in);
            }

            // XCH A, r (30=X, 32=C .. 37=H; 31 is a prefix)
            0x30 | 0x32..=0x37 => {
                let r = op & 7;
                let a = self.read_gp_reg(A);
                let other = self.read_gp_reg(r);
                self.write_gp_reg(A, other);
                self.write_gp_reg(r, a);
            }

            // Prefixes
            0x31 => return self.execute_prefix_31(start_pc),
            0x61 => return self.execute_prefix_61(start_pc),
            0x71 => return self.execute_prefix_71(start_pc),

            // INC r (40=X .. 47=H)
            0x40..=0x47 => {
                let r = op & 7;
                let result = self.inc8(self.read_gp_reg(r));
                self.write_gp_reg(r, result);
            }

            // DEC r (50=X .. 57=H)
            0x50..=0x57 => {
                let r = op & 7;
                let result = self.dec8(self.read_gp_reg(r));
                self.write_gp_reg(r, result);
            }

            // AND A, !addr16
            0x58 => {
                let addr = self.consume_word();
                let result = self.read_gp_reg(A) & self.read_byte(addr);
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // AND A, #byte
            0x5D => {
                let result = self.read_gp_reg(A) & self.consume_byte();
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // AND A, saddr
            0x5E => {
                let addr = self.consume_saddr();
                let result = self.read_gp_reg(A) & self.read_byte(addr);
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // MOV A, r (60=X, 62=C .. 67=H; 61 is a prefix)
            0x60 | 0x62..=0x67 => {
                let value = self.read_gp_reg(op & 7);
                self.write_gp_reg(A, value);
            }

            // OR A, !addr16
            0x68 => {
                let addr = self.consume_word();
                let result = self.read_gp_reg(A) | self.read_byte(addr);
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // OR A, #byte
            0x6D => {
                let result = self.read_gp_reg(A) | self.consume_byte();
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // OR A, saddr
            0x6E => {
                let addr = self.consume_saddr();
                let result = self.read_gp_reg(A) | self.read_byte(addr);
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // MOV r, A (70=X, 72=C .. 77=H; 71 is a prefix)
            0x70 | 0x72..=0x77 => {
                let value = self.read_gp_reg(A);
                self.write_gp_reg(op & 7, value);
            }

            // XOR A, !addr16
            0x78 => {
                let addr = self.consume_word();
                let result = self.read_gp_reg(A) ^ self.read_byte(addr);
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // XOR A, #byte
            0x7D => {
                let result = self.read_gp_reg(A) ^ self.consume_byte();
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // XOR A, saddr
            0x7E => {
                let addr = self.consume_saddr();
                let result = self.read_gp_reg(A) ^ self.read_byte(addr);
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // INCW rp (80=AX, 82=BC, 84=DE, 86=HL) - PSW untouched
            0x80 | 0x82 | 0x84 | 0x86 => {
                let rp = (op >> 1) & 3;
                let value = self.read_gp_pair(rp).wrapping_add(1);
                self.write_gp_pair(rp, value);
            }

            // INC saddr
            0x81 => {
                let addr = self.consume_saddr();
                let result = self.inc8(self.read_byte(addr));
                self.write_byte(addr, result);
            }

            // XCH A, saddr
            0x83 => {
                let addr = self.consume_saddr();
                let a = self.read_gp_reg(A);
                let other = self.read_byte(addr);
                self.write_gp_reg(A, other);
                self.write_byte(addr, a);
            }

            // MOV A, [DE] / MOV A, [HL]
            0x85 | 0x87 => {
                let addr = self.read_gp_pair(if op == 0x85 { DE } else { HL });
                let value = self.read_byte(addr);
                self.write_gp_reg(A, value);
            }

            // DBNZ C, $rel / DBNZ B, $rel
            0x8A | 0x8B => {
                let r = if op == 0x8A { C } else { B };
                let value = self.read_gp_reg(r).wrapping_sub(1);
                self.write_gp_reg(r, value);
                let disp = self.consume_byte();
                if value != 0 {
                    self.branch_rel(disp);
                }
            }

            // BC $rel - branch if CY set
            0x8D => {
                let disp = self.consume_byte();
                if self.flag(CY) {
                    self.branch_rel(disp);
                }
            }

            // MOV A, !addr16
            0x8E => {
                let addr = self.consume_word();
                let value = self.read_byte(addr);
                self.write_gp_reg(A, value);
            }

            // RETI - pop pc, then PSW
            0x8F => {
                self.pc = self.pop_word();
                let psw = self.pop_byte();
                self.write_psw(psw);
            }

            // DECW rp (90=AX, 92=BC, 94=DE, 96=HL) - PSW untouched
            0x90 | 0x92 | 0x94 | 0x96 => {
                let rp = (op >> 1) & 3;
                let value = self.read_gp_pair(rp).wrapping_sub(1);
                self.write_gp_pair(rp, value);
            }

            // DEC saddr
            0x91 => {
                let addr = self.consume_saddr();
                let result = self.dec8(self.read_byte(addr));
                self.write_byte(addr, result);
            }

            // XCH A, sfr
            0x93 => {
                let addr = self.consume_sfr();
                let a = self.read_gp_reg(A);
                let other = self.read_byte(addr);
                self.write_gp_reg(A, other);
                self.write_byte(addr, a);
            }

            // MOV [DE], A / MOV [HL], A
            0x95 | 0x97 => {
                let addr = self.read_gp_pair(if op == 0x95 { DE } else { HL });
                let value = self.read_gp_reg(A);
                self.write_byte(addr, value);
            }

            // CALL !addr16
            0x9A => {
                let target = self.consume_word();
                self.push_word(self.pc);
                self.pc = target;
            }

            // BR !addr16
            0x9B => {
                self.pc = self.consume_word();
            }

            // BNC $rel - branch if CY clear
            0x9D => {
                let disp = self.consume_byte();
                if !self.flag(CY) {
                    self.branch_rel(disp);
                }
            }

            // MOV !addr16, A
            0x9E => {
                let addr = self.consume_word();
                let value = self.read_gp_reg(A);
                self.write_byte(addr, value);
            }

            // MOV r, #byte (A0=X .. A7=H)
            0xA0..=0xA7 => {
                let value = self.consume_byte();
                self.write_gp_reg(op & 7, value);
            }

            // BZ $rel - branch if Z set
            0xAD => {
                let disp = self.consume_byte();
                if self.flag(Z) {
                    self.branch_rel(disp);
                }
            }

            // RET
            0xAF => {
                self.pc = self.pop_word();
            }

            // POP rp (B0=AX, B2=BC, B4=DE, B6=HL)
            0xB0 | 0xB2 | 0xB4 | 0xB6 => {
                let value = self.pop_word();
                self.write_gp_pair((op >> 1) & 3, value);
            }

            // PUSH rp (B1=AX, B3=BC, B5=DE, B7=HL) - high member at sp-1
            0xB1 | 0xB3 | 0xB5 | 0xB7 => {
                let value = self.read_gp_pair((op >> 1) & 3);
                self.push_word(value);
            }

            // BNZ $rel - branch if Z clear
            0xBD => {
                let disp = self.consume_byte();
                if !self.flag(Z) {
                    self.branch_rel(disp);
                }
            }

            // XCH A, !addr16
            0xCE => {
                let addr = self.consume_word();
                let a = self.read_gp_reg(A);
                let other = self.read_byte(addr);
                self.write_gp_reg(A, other);
                self.write_byte(addr, a);
            }

            // AND saddr, #byte
            0xD8 => {
                let addr = self.consume_saddr();
                let result = self.read_byte(addr) & self.consume_byte();
                self.update_z(result);
                self.write_byte(addr, result);
            }

            // XCHW AX, rp (E2=BC, E4=DE, E6=HL)
            0xE2 | 0xE4 | 0xE6 => {
                let rp = (op >> 1) & 3;
                let ax = self.read_gp_pair(AX);
                let other = self.read_gp_pair(rp);
                self.write_gp_pair(AX, other);
                self.write_gp_pair(rp, ax);
            }

            // OR saddr, #byte
            0xE8 => {
                let addr = self.consume_saddr();
                let result = self.read_byte(addr) | self.consume_byte();
                self.update_z(result);
                self.write_byte(addr, result);
            }

            // MOVW SP, #word - encoded as the SFR write EE 1C
            0xEE => {
                let op2 = self.consume_byte();
                if op2 != 0x1C {
                    return Err(StepError::UnimplementedOpcode {
                        opcode: Opcode::Prefixed(op, op2),
                        pc: start_pc,
                    });
                }
                self.sp = self.consume_word();
            }

            // MOV A, saddr
            0xF0 => {
                let addr = self.consume_saddr();
                let value = self.read_byte(addr);
                self.write_gp_reg(A, value);
            }

            // MOV saddr, A
            0xF2 => {
                let addr = self.consume_saddr();
                let value = self.read_gp_reg(A);
                self.write_byte(addr, value);
            }

            // MOV A, sfr - pure read; the SFR cell is not written back
            0xF4 => {
                let addr = self.consume_sfr();
                let value = self.read_byte(addr);
                self.write_gp_reg(A, value);
            }

            // MOV sfr, A
            0xF6 => {
                let addr = self.consume_sfr();
                let value = self.read_gp_reg(A);
                self.write_byte(addr, value);
            }

            // XOR saddr, #byte
            0xF8 => {
                let addr = self.consume_saddr();
                let result = self.read_byte(addr) ^ self.consume_byte();
                self.update_z(result);
                self.write_byte(addr, result);
            }

            // BR $rel
            0xFA => {
                let disp = self.consume_byte();
                self.branch_rel(disp);
            }

            // SET1 saddr.bit (0A/1A/../7A - bit index in the high nibble)
            _ if op & 0x8F == 0x0A => {
                let addr = self.consume_saddr();
                let value = self.read_byte(addr) | (1 << (op >> 4));
                self.write_byte(addr, value);
            }

            // CLR1 saddr.bit (0B/1B/../7B)
            _ if op & 0x8F == 0x0B => {
                let addr = self.consume_saddr();
                let value = self.read_byte(addr) & !(1 << (op >> 4));
                self.write_byte(addr, value);
            }

            // CALLF !addr11 (0C/1C/../7C - target page 0x08xx-0x0Fxx)
            _ if op & 0x8F == 0x0C => {
                let low = self.consume_byte();
                let target = 0x0800 | (u16::from(op & 0x70) << 4) | u16::from(low);
                self.push_word(self.pc);
                self.pc = target;
            }

            // BT saddr.bit, $rel (8C/9C/../FC)
            _ if op & 0x8F == 0x8C => {
                let bit = (op >> 4) & 7;
                let addr = self.consume_saddr();
                let disp = self.consume_byte();
                if self.read_byte(addr) & (1 << bit) != 0 {
                    self.branch_rel(disp);
                }
            }

            // CALLT [addr5] (odd C1..FF - vector index in bits 5..1)
            _ if op & 0xC1 == 0xC1 => {
                let vector = CALLT_BASE + u16::from(op & 0x3E);
                let low = self.read_byte(vector);
                let high = self.read_byte(vector + 1);
                let target = u16::from(low) | (u16::from(high) << 8);
                self.push_word(self.pc);
                self.pc = target;
            }

            _ => {
                return Err(StepError::UnimplementedOpcode {
                    opcode: Opcode::Primary(op),
                    pc: start_pc,
                });
            }
        }

        Ok(())
    }

    // =========================================================================
    // Prefix 0x31: bit-test-and-branch on A and sfr
    // =========================================================================

    fn execute_prefix_31(&mut self, start_pc: u16) -> Result<(), StepError> {
        let op2 = self.consume_byte();
        let bit = (op2 >> 4) & 7;

        match op2 & 0x8F {
            // BT sfr.bit, $rel (31 06/16/../76)
            0x06 => {
                let addr = self.consume_sfr();
                let disp = self.consume_byte();
                if self.read_byte(addr) & (1 << bit) != 0 {
                    self.branch_rel(disp);
                }
            }

            // BT A.bit, $rel (31 0E/1E/../7E)
            0x0E => {
                let disp = self.consume_byte();
                if self.read_gp_reg(A) & (1 << bit) != 0 {
                    self.branch_rel(disp);
                }
            }

            _ => {
                return Err(StepError::UnimplementedOpcode {
                    opcode: Opcode::Prefixed(0x31, op2),
                    pc: start_pc,
                });
            }
        }

        Ok(())
    }

    // =========================================================================
    // Prefix 0x61: register-register logic, bank select, bit ops on A
    // =========================================================================

    fn execute_prefix_61(&mut self, start_pc: u16) -> Result<(), StepError> {
        let op2 = self.consume_byte();

        match op2 {
            // AND r, A (61 50..57; 61 51 is AND A, A)
            0x50..=0x57 => {
                let r = op2 & 7;
                let result = self.read_gp_reg(r) & self.read_gp_reg(A);
                self.update_z(result);
                self.write_gp_reg(r, result);
            }

            // AND A, r (61 58/5A..5F)
            0x58 | 0x5A..=0x5F => {
                let result = self.read_gp_reg(A) & self.read_gp_reg(op2 & 7);
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // OR r, A (61 60..67; 61 61 is OR A, A)
            0x60..=0x67 => {
                let r = op2 & 7;
                let result = self.read_gp_reg(r) | self.read_gp_reg(A);
                self.update_z(result);
                self.write_gp_reg(r, result);
            }

            // OR A, r (61 68/6A..6F)
            0x68 | 0x6A..=0x6F => {
                let result = self.read_gp_reg(A) | self.read_gp_reg(op2 & 7);
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // XOR r, A (61 70..77; 61 71 is XOR A, A)
            0x70..=0x77 => {
                let r = op2 & 7;
                let result = self.read_gp_reg(r) ^ self.read_gp_reg(A);
                self.update_z(result);
                self.write_gp_reg(r, result);
            }

            // XOR A, r (61 78/7A..7F)
            0x78 | 0x7A..=0x7F => {
                let result = self.read_gp_reg(A) ^ self.read_gp_reg(op2 & 7);
                self.update_z(result);
                self.write_gp_reg(A, result);
            }

            // SEL RBn (61 D0/D8/F0/F8)
            0xD0 => self.write_rb(0),
            0xD8 => self.write_rb(1),
            0xF0 => self.write_rb(2),
            0xF8 => self.write_rb(3),

            // MOV1 A.bit, CY (61 89/99/../F9)
            _ if op2 & 0x8F == 0x89 => {
                let bit = (op2 >> 4) & 7;
                let a = self.read_gp_reg(A);
                let value = if self.flag(CY) {
                    a | (1 << bit)
                } else {
                    a & !(1 << bit)
                };
                self.write_gp_reg(A, value);
            }

            // SET1 A.bit (61 8A/9A/../FA)
            _ if op2 & 0x8F == 0x8A => {
                let bit = (op2 >> 4) & 7;
                let value = self.read_gp_reg(A) | (1 << bit);
                self.write_gp_reg(A, value);
            }

            // CLR1 A.bit (61 8B/9B/../FB)
            _ if op2 & 0x8F == 0x8B => {
                let bit = (op2 >> 4) & 7;
                let value = self.read_gp_reg(A) & !(1 << bit);
                self.write_gp_reg(A, value);
            }

            // MOV1 CY, A.bit (61 8C/9C/../FC)
            _ if op2 & 0x8F == 0x8C => {
                let bit = (op2 >> 4) & 7;
                let a = self.read_gp_reg(A);
                self.set_flag(CY, a & (1 << bit) != 0);
            }

            _ => {
                return Err(StepError::UnimplementedOpcode {
                    opcode: Opcode::Prefixed(0x61, op2),
                    pc: start_pc,
                });
            }
        }

        Ok(())
    }

    // =========================================================================
    // Prefix 0x71: bit ops on saddr, sfr, and [HL]
    // =========================================================================

    fn execute_prefix_71(&mut self, start_pc: u16) -> Result<(), StepError> {
        let op2 = self.consume_byte();
        let bit = (op2 >> 4) & 7;

        match op2 & 0x8F {
            // MOV1 saddr.bit, CY (71 01/11/../71)
            0x01 => {
                let addr = self.consume_saddr();
                let value = self.apply_cy_to_bit(self.read_byte(addr), bit);
                self.write_byte(addr, value);
            }

            // MOV1 CY, saddr.bit (71 04/14/../74)
            0x04 => {
                let addr = self.consume_saddr();
                let value = self.read_byte(addr);
                self.set_flag(CY, value & (1 << bit) != 0);
            }

            // MOV1 sfr.bit, CY (71 09/19/../79)
            0x09 => {
                let addr = self.consume_sfr();
                let value = self.apply_cy_to_bit(self.read_byte(addr), bit);
                self.write_byte(addr, value);
            }

            // SET1 sfr.bit (71 0A/1A/../7A)
            0x0A => {
                let addr = self.consume_sfr();
                let value = self.read_byte(addr) | (1 << bit);
                self.write_byte(addr, value);
            }

            // CLR1 sfr.bit (71 0B/1B/../7B)
            0x0B => {
                let addr = self.consume_sfr();
                let value = self.read_byte(addr) & !(1 << bit);
                self.write_byte(addr, value);
            }

            // MOV1 CY, sfr.bit (71 0C/1C/../7C)
            0x0C => {
                let addr = self.consume_sfr();
                let value = self.read_byte(addr);
                self.set_flag(CY, value & (1 << bit) != 0);
            }

            // SET1 [HL].bit (71 82/92/../F2)
            0x82 => {
                let addr = self.read_gp_pair(HL);
                let value = self.read_byte(addr) | (1 << bit);
                self.write_byte(addr, value);
            }

            // CLR1 [HL].bit (71 83/93/../F3)
            0x83 => {
                let addr = self.read_gp_pair(HL);
                let value = self.read_byte(addr) & !(1 << bit);
                self.write_byte(addr, value);
            }

            _ => {
                return Err(StepError::UnimplementedOpcode {
                    opcode: Opcode::Prefixed(0x71, op2),
                    pc: start_pc,
                });
            }
        }

        Ok(())
    }

    // =========================================================================
    // Shared operation bodies
    // =========================================================================

    /// Increment with Z and AC. AC is set on a carry out of bit 3, i.e.
    /// when the old low nibble was 0xF. CY is untouched.
    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.update_z(result);
        self.set_flag(AC, value & 0x0F == 0x0F);
        result
    }

    /// Decrement with Z and AC. AC is set on a borrow into bit 3, i.e.
    /// when the old low nibble was 0x0. CY is untouched.
    fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.update_z(result);
        self.set_flag(AC, value & 0x0F == 0x00);
        result
    }

    /// Copy the current CY into bit `bit` of `value`.
    fn apply_cy_to_bit(&self, value: u8, bit: u8) -> u8 {
        if self.flag(CY) {
            value | (1 << bit)
        } else {
            value & !(1 << bit)
        }
    }
}
