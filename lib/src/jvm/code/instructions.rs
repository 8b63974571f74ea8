use crate::jvm::class_file::{Code, ConstantIndex};
use crate::jvm::{BinaryName, Error, MethodDescriptor};
use std::collections::BTreeSet;

/// Opcodes which the rewriting passes need to recognize or emit
pub mod opcodes {
    pub const NOP: u8 = 0x00;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const LDC2_W: u8 = 0x14;
    pub const IINC: u8 = 0x84;
    pub const GOTO: u8 = 0xa7;
    pub const JSR: u8 = 0xa8;
    pub const RET: u8 = 0xa9;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const INVOKEDYNAMIC: u8 = 0xba;
    pub const NEW: u8 = 0xbb;
    pub const ANEWARRAY: u8 = 0xbd;
    pub const CHECKCAST: u8 = 0xc0;
    pub const INSTANCEOF: u8 = 0xc1;
    pub const WIDE: u8 = 0xc4;
    pub const MULTIANEWARRAY: u8 = 0xc5;
    pub const IFNULL: u8 = 0xc6;
    pub const IFNONNULL: u8 = 0xc7;
    pub const GOTO_W: u8 = 0xc8;
    pub const JSR_W: u8 = 0xc9;
    pub const RETURN: u8 = 0xb1;
}

/// Instruction in a method body, located by its offset
///
/// Only the opcode is decoded eagerly. Operands are read on demand from `bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub offset: usize,
    pub opcode: u8,

    /// Encoded instruction, including the opcode
    pub bytes: &'a [u8],
}

impl<'a> Instruction<'a> {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Constant pool operand, for instructions which have one
    pub fn constant_index(&self) -> Option<ConstantIndex> {
        match self.opcode {
            opcodes::LDC => Some(ConstantIndex(self.bytes[1] as u16)),
            opcodes::LDC_W
            | opcodes::LDC2_W
            | opcodes::GETSTATIC..=opcodes::INVOKEDYNAMIC
            | opcodes::NEW
            | opcodes::ANEWARRAY
            | opcodes::CHECKCAST
            | opcodes::INSTANCEOF
            | opcodes::MULTIANEWARRAY => Some(ConstantIndex(read_u16(self.bytes, 1))),
            _ => None,
        }
    }

    /// Kind of method invocation, if this is one (not counting `invokedynamic`)
    pub fn invoke_kind(&self) -> Option<InvokeKind> {
        InvokeKind::from_opcode(self.opcode)
    }

    /// Offsets this instruction can jump to
    pub fn branch_targets(&self) -> Vec<usize> {
        let relative = |delta: i64| (self.offset as i64 + delta) as usize;
        match self.opcode {
            0x99..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL => {
                vec![relative(read_u16(self.bytes, 1) as i16 as i64)]
            }
            opcodes::GOTO_W | opcodes::JSR_W => vec![relative(read_i32(self.bytes, 1) as i64)],
            opcodes::TABLESWITCH => {
                let base = 1 + padding(self.offset);
                let low = read_i32(self.bytes, base + 4) as i64;
                let high = read_i32(self.bytes, base + 8) as i64;
                let mut targets = vec![relative(read_i32(self.bytes, base) as i64)];
                for i in 0..(high - low + 1) as usize {
                    targets.push(relative(read_i32(self.bytes, base + 12 + 4 * i) as i64));
                }
                targets
            }
            opcodes::LOOKUPSWITCH => {
                let base = 1 + padding(self.offset);
                let npairs = read_i32(self.bytes, base + 4) as usize;
                let mut targets = vec![relative(read_i32(self.bytes, base) as i64)];
                for i in 0..npairs {
                    targets.push(relative(read_i32(self.bytes, base + 12 + 8 * i) as i64));
                }
                targets
            }
            _ => vec![],
        }
    }
}

/// Decode the instruction boundaries of a method body
pub fn decode_instructions(code: &[u8]) -> Result<Vec<Instruction<'_>>, Error> {
    let mut instructions = vec![];
    let mut offset = 0;
    while offset < code.len() {
        let length = instruction_length(code, offset)?;
        if offset + length > code.len() {
            return Err(Error::MalformedCode {
                offset,
                reason: String::from("instruction runs past the end of the code"),
            });
        }
        instructions.push(Instruction {
            offset,
            opcode: code[offset],
            bytes: &code[offset..offset + length],
        });
        offset += length;
    }
    Ok(instructions)
}

/// Every offset which control can transfer to other than by falling through: branch targets,
/// plus the boundaries and handlers of exception table entries
pub fn jump_targets(code: &Code, instructions: &[Instruction]) -> BTreeSet<usize> {
    let mut targets = BTreeSet::new();
    for instruction in instructions {
        targets.extend(instruction.branch_targets());
    }
    for handler in &code.exception_table {
        targets.insert(handler.start_pc as usize);
        targets.insert(handler.end_pc as usize);
        targets.insert(handler.handler_pc as usize);
    }
    targets
}

/// Length of the instruction starting at an offset
pub fn instruction_length(code: &[u8], offset: usize) -> Result<usize, Error> {
    let opcode = code[offset];
    let length = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        opcodes::LDC => 2,
        opcodes::LDC_W | opcodes::LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        opcodes::IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa6 => 3,
        opcodes::GOTO | opcodes::JSR => 3,
        opcodes::RET => 2,
        opcodes::TABLESWITCH => {
            let base = offset + 1 + padding(offset);
            let low = checked_i32(code, base + 4, offset)?;
            let high = checked_i32(code, base + 8, offset)?;
            if high < low {
                return Err(malformed(offset, "tableswitch with high < low"));
            }
            1 + padding(offset) + 12 + ((high as i64 - low as i64 + 1) as usize) * 4
        }
        opcodes::LOOKUPSWITCH => {
            let base = offset + 1 + padding(offset);
            let npairs = checked_i32(code, base + 4, offset)?;
            if npairs < 0 {
                return Err(malformed(offset, "lookupswitch with negative pairs"));
            }
            1 + padding(offset) + 8 + (npairs as usize) * 8
        }
        0xac..=0xb1 => 1,
        opcodes::GETSTATIC..=opcodes::PUTFIELD => 3,
        opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKESTATIC => 3,
        opcodes::INVOKEINTERFACE | opcodes::INVOKEDYNAMIC => 5,
        opcodes::NEW => 3,
        0xbc => 2,
        opcodes::ANEWARRAY => 3,
        0xbe | 0xbf => 1,
        opcodes::CHECKCAST | opcodes::INSTANCEOF => 3,
        0xc2 | 0xc3 => 1,
        opcodes::WIDE => match code.get(offset + 1) {
            Some(&opcodes::IINC) => 6,
            Some(_) => 4,
            None => return Err(malformed(offset, "missing opcode after wide")),
        },
        opcodes::MULTIANEWARRAY => 4,
        opcodes::IFNULL | opcodes::IFNONNULL => 3,
        opcodes::GOTO_W | opcodes::JSR_W => 5,
        0xca | 0xfe | 0xff => 1,
        other => return Err(malformed(offset, &format!("unknown opcode 0x{:02x}", other))),
    };
    Ok(length)
}

/// Switch operands are aligned to 4 bytes from the start of the method
fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn malformed(offset: usize, reason: &str) -> Error {
    Error::MalformedCode {
        offset,
        reason: reason.to_owned(),
    }
}

fn checked_i32(code: &[u8], at: usize, offset: usize) -> Result<i32, Error> {
    match code.get(at..at + 4) {
        Some(_) => Ok(read_i32(code, at)),
        None => Err(malformed(offset, "switch operands out of bounds")),
    }
}

/// Only call on decoded instructions, where operand bounds were checked
fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// The four ways to invoke a method symbolically
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeKind {
    pub fn opcode(self) -> u8 {
        match self {
            InvokeKind::Virtual => opcodes::INVOKEVIRTUAL,
            InvokeKind::Special => opcodes::INVOKESPECIAL,
            InvokeKind::Static => opcodes::INVOKESTATIC,
            InvokeKind::Interface => opcodes::INVOKEINTERFACE,
        }
    }

    pub fn from_opcode(opcode: u8) -> Option<InvokeKind> {
        match opcode {
            opcodes::INVOKEVIRTUAL => Some(InvokeKind::Virtual),
            opcodes::INVOKESPECIAL => Some(InvokeKind::Special),
            opcodes::INVOKESTATIC => Some(InvokeKind::Static),
            opcodes::INVOKEINTERFACE => Some(InvokeKind::Interface),
            _ => None,
        }
    }

    /// Size of the encoded instruction
    pub fn encoded_len(self) -> usize {
        match self {
            InvokeKind::Interface => 5,
            _ => 3,
        }
    }

    /// Encode an invocation of a method reference
    ///
    /// `invokeinterface` redundantly encodes the size of its arguments (including the receiver),
    /// which is why the descriptor is needed.
    pub fn encode(self, method: ConstantIndex, descriptor: &MethodDescriptor<BinaryName>) -> Vec<u8> {
        let [hi, lo] = method.0.to_be_bytes();
        match self {
            InvokeKind::Interface => {
                let count = descriptor.parameter_length(true) as u8;
                vec![self.opcode(), hi, lo, count, 0]
            }
            _ => vec![self.opcode(), hi, lo],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ClassConstantIndex, ExceptionHandler};
    use crate::jvm::ParseDescriptor;

    #[test]
    fn decoding_boundaries() {
        let code = vec![
            0x2a, // aload_0
            0xb9, 0x00, 0x07, 0x01, 0x00, // invokeinterface #7, 1
            0x12, 0x03, // ldc #3
            0xc4, 0x84, 0x01, 0x00, 0x00, 0x05, // wide iinc 256, 5
            0xb1, // return
        ];
        let instructions = decode_instructions(&code).unwrap();
        let offsets: Vec<usize> = instructions.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 1, 6, 8, 14]);
        assert_eq!(instructions[1].invoke_kind(), Some(InvokeKind::Interface));
        assert_eq!(instructions[1].constant_index(), Some(ConstantIndex(7)));
        assert_eq!(instructions[2].constant_index(), Some(ConstantIndex(3)));
        assert_eq!(instructions[3].constant_index(), None);
    }

    #[test]
    fn switches_and_branches() {
        let code = vec![
            0x1a, // iload_0
            0xaa, 0x00, 0x00, // tableswitch (padded to offset 4)
            0x00, 0x00, 0x00, 0x1c, // default: +28 -> 29
            0x00, 0x00, 0x00, 0x00, // low = 0
            0x00, 0x00, 0x00, 0x01, // high = 1
            0x00, 0x00, 0x00, 0x1c, // 0: +28 -> 29
            0x00, 0x00, 0x00, 0x19, // 1: +25 -> 26
            0x04, // iconst_1 (offset 24)
            0xac, // ireturn
            0xa7, 0x00, 0x03, // goto +3 -> 29 (offset 26)
            0x03, // iconst_0 (offset 29)
            0xac, // ireturn
        ];
        let instructions = decode_instructions(&code).unwrap();
        assert_eq!(instructions[1].len(), 23);
        assert_eq!(instructions[1].branch_targets(), vec![29, 29, 26]);
        assert_eq!(instructions[4].offset, 26);
        assert_eq!(instructions[4].branch_targets(), vec![29]);

        let code_attribute = Code {
            max_stack: 1,
            max_locals: 1,
            code_array: code.clone(),
            exception_table: vec![ExceptionHandler {
                start_pc: 0,
                end_pc: 24,
                handler_pc: 29,
                catch_type: ClassConstantIndex(ConstantIndex(0)),
            }],
            attributes: vec![],
        };
        let targets: Vec<usize> = jump_targets(&code_attribute, &instructions)
            .into_iter()
            .collect();
        assert_eq!(targets, vec![0, 24, 26, 29]);
    }

    #[test]
    fn malformed_code() {
        assert!(decode_instructions(&[0xb8, 0x00]).is_err());
        assert!(decode_instructions(&[0xfd]).is_err());
        assert!(decode_instructions(&[0xc4]).is_err());
    }

    #[test]
    fn encoding_invokes() {
        let descriptor = MethodDescriptor::parse("(JI)V").unwrap();
        assert_eq!(
            InvokeKind::Interface.encode(ConstantIndex(0x0102), &descriptor),
            vec![0xb9, 0x01, 0x02, 4, 0]
        );
        assert_eq!(
            InvokeKind::Static.encode(ConstantIndex(0x0102), &descriptor),
            vec![0xb8, 0x01, 0x02]
        );
        assert_eq!(InvokeKind::Static.encoded_len(), 3);
    }
}
