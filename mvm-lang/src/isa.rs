//! Instruction set of the MVM
//!
//! One static table maps every opcode to its mnemonic and operand arity. The
//! assembler, the disassembler, the machine and the native backend all decode
//! through it, so none of them carries its own idea of how long an
//! instruction is.

use std::fmt;

use thiserror::Error;

/// The machine's single scalar type
#[cfg(not(feature = "wide-word"))]
pub type Word = u16;

/// The machine's single scalar type
#[cfg(feature = "wide-word")]
pub type Word = u32;

/// Width of an operand word on the wire, in bytes
pub const WORD_SIZE: usize = std::mem::size_of::<Word>();

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Native calls
    CALL = 0x00,

    NOP = 0x01,

    // Stack
    PUSH = 0x02,
    POP = 0x03,
    LOAD = 0x04,

    // Comparison
    EQU = 0x05,
    NEQU = 0x06,
    GT = 0x07,
    GTEQ = 0x08,
    LT = 0x09,
    LTEQ = 0x0A,

    // Math
    ADD = 0x0B,
    SUB = 0x0C,
    MUL = 0x0D,
    DIV = 0x0E,

    // Bitwise
    XOR = 0x0F,
    OR = 0x10,
    MOD = 0x11,
    NEG = 0x12,
    AND = 0x13,

    // Jumping
    JMP = 0x14,
    JMPZ = 0x15,
    JMPNZ = 0x16,

    PRINT = 0x17,
    HALT = 0x18,
}

/// A registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    pub op: Op,
    pub mnemonic: &'static str,
    pub arity: usize,
}

macro_rules! registry {
    ($($op:ident => $arity:expr),* $(,)?) => {
        /// Every instruction, indexed by its opcode byte
        pub static INSTRUCTIONS: &[OpInfo] = &[
            $(OpInfo {
                op: Op::$op,
                mnemonic: stringify!($op),
                arity: $arity,
            }),*
        ];
    };
}

registry! {
    CALL => 1,
    NOP => 0,
    PUSH => 1,
    POP => 0,
    LOAD => 0,
    EQU => 0,
    NEQU => 0,
    GT => 0,
    GTEQ => 0,
    LT => 0,
    LTEQ => 0,
    ADD => 0,
    SUB => 0,
    MUL => 0,
    DIV => 0,
    XOR => 0,
    OR => 0,
    MOD => 0,
    NEG => 0,
    AND => 0,
    JMP => 1,
    JMPZ => 1,
    JMPNZ => 1,
    PRINT => 0,
    HALT => 0,
}

impl Op {
    pub fn info(self) -> &'static OpInfo {
        // The table is laid out in opcode order, checked by the tests below
        &INSTRUCTIONS[self as usize]
    }

    pub fn arity(self) -> usize {
        self.info().arity
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    /// Exact, case-sensitive lookup
    pub fn from_mnemonic(name: &str) -> Option<Op> {
        INSTRUCTIONS
            .iter()
            .find(|info| info.mnemonic == name)
            .map(|info| info.op)
    }

    /// Number of bytes one occurrence of this op occupies in a program
    pub fn encoded_len(self) -> usize {
        1 + self.arity() * WORD_SIZE
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Op::JMP | Op::JMPZ | Op::JMPNZ)
    }
}

impl TryFrom<u8> for Op {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        INSTRUCTIONS
            .get(byte as usize)
            .map(|info| info.op)
            .ok_or(byte)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

pub fn arity_of(op: Op) -> usize {
    op.arity()
}

pub fn mnemonic_of(op: Op) -> &'static str {
    op.mnemonic()
}

pub fn opcode_of(mnemonic: &str) -> Option<Op> {
    Op::from_mnemonic(mnemonic)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode 0x{byte:02X} at offset {offset}")]
    InvalidOpcode { byte: u8, offset: usize },

    #[error("{op} at offset {offset} is missing operand bytes")]
    Truncated { op: Op, offset: usize },

    #[error("offset {offset} is past the end of the program")]
    OutOfBounds { offset: usize },
}

/// A decoded instruction: one op plus its operand, if it takes one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub operand: Option<Word>,
}

impl Instruction {
    pub fn new(op: Op, operand: Option<Word>) -> Self {
        Self { op, operand }
    }

    /// Decode the instruction starting at `offset`
    pub fn decode(program: &[u8], offset: usize) -> Result<Self, DecodeError> {
        let byte = *program
            .get(offset)
            .ok_or(DecodeError::OutOfBounds { offset })?;
        let op = Op::try_from(byte).map_err(|byte| DecodeError::InvalidOpcode { byte, offset })?;

        let operand = match op.arity() {
            0 => None,
            _ => {
                let start = offset + 1;
                let bytes = program
                    .get(start..start + WORD_SIZE)
                    .ok_or(DecodeError::Truncated { op, offset })?;

                let mut raw = [0u8; WORD_SIZE];
                raw.copy_from_slice(bytes);
                Some(Word::from_le_bytes(raw))
            }
        };

        Ok(Self { op, operand })
    }

    pub fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.op as u8);
        if self.op.arity() == 1 {
            buffer.extend_from_slice(&self.operand.unwrap_or_default().to_le_bytes());
        }
    }

    pub fn encoded_len(&self) -> usize {
        self.op.encoded_len()
    }

    /// The operand, or zero for ops that take none
    pub fn operand(&self) -> Word {
        self.operand.unwrap_or_default()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Some(operand) => write!(f, "{} {}", self.op, operand),
            None => write!(f, "{}", self.op),
        }
    }
}

/// Walks a program instruction by instruction, stopping at the first bad byte
pub struct Decoder<'p> {
    program: &'p [u8],
    offset: usize,
    failed: bool,
}

impl<'p> Decoder<'p> {
    pub fn new(program: &'p [u8]) -> Self {
        Self {
            program,
            offset: 0,
            failed: false,
        }
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.program.len() {
            return None;
        }

        let offset = self.offset;
        match Instruction::decode(self.program, offset) {
            Ok(instr) => {
                self.offset += instr.encoded_len();
                Some(Ok((offset, instr)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_in_opcode_order() {
        for (i, info) in INSTRUCTIONS.iter().enumerate() {
            assert_eq!(info.op as usize, i, "{} is out of place", info.mnemonic);
        }
        assert_eq!(INSTRUCTIONS.len(), 25);
    }

    #[test]
    fn every_mnemonic_round_trips() {
        for info in INSTRUCTIONS {
            assert_eq!(opcode_of(info.mnemonic), Some(info.op));
            assert_eq!(mnemonic_of(info.op), info.mnemonic);
            assert_eq!(Op::try_from(info.op as u8), Ok(info.op));
        }
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert_eq!(opcode_of("PUSH"), Some(Op::PUSH));
        assert_eq!(opcode_of("push"), None);
        assert_eq!(opcode_of("Push"), None);
    }

    #[test]
    fn arities() {
        let with_operand: Vec<_> = INSTRUCTIONS
            .iter()
            .filter(|info| info.arity == 1)
            .map(|info| info.op)
            .collect();

        assert_eq!(
            with_operand,
            vec![Op::CALL, Op::PUSH, Op::JMP, Op::JMPZ, Op::JMPNZ]
        );
        assert_eq!(arity_of(Op::MOD), 0);
    }

    #[test]
    fn unknown_byte_is_rejected() {
        assert_eq!(Op::try_from(0x19), Err(0x19));
        assert_eq!(Op::try_from(0xFF), Err(0xFF));
    }

    #[test]
    fn decode_push() {
        let mut program = vec![Op::PUSH as u8];
        program.extend_from_slice(&(513 as Word).to_le_bytes());

        let instr = Instruction::decode(&program, 0).unwrap();
        assert_eq!(instr, Instruction::new(Op::PUSH, Some(513)));
        assert_eq!(instr.encoded_len(), 1 + WORD_SIZE);
        assert_eq!(instr.to_string(), "PUSH 513");
    }

    #[test]
    fn decode_truncated_operand() {
        let program = [Op::NOP as u8, Op::JMP as u8, 0x01];
        let err = Instruction::decode(&program, 1).unwrap_err();

        if WORD_SIZE > 1 {
            assert_eq!(err, DecodeError::Truncated { op: Op::JMP, offset: 1 });
        }
    }

    #[test]
    fn encode_writes_operand_little_endian() {
        let mut buffer = Vec::new();
        Instruction::new(Op::JMPNZ, Some(0x0102)).encode(&mut buffer);
        Instruction::new(Op::HALT, None).encode(&mut buffer);

        let mut expected = vec![Op::JMPNZ as u8];
        expected.extend_from_slice(&(0x0102 as Word).to_le_bytes());
        expected.push(Op::HALT as u8);

        assert_eq!(buffer, expected);
        assert_eq!(buffer[1], 0x02);
    }

    #[test]
    fn decoder_stops_at_first_error() {
        let program = [Op::NOP as u8, 0xEE, Op::HALT as u8];
        let items: Vec<_> = Decoder::new(&program).collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok((0, Instruction::new(Op::NOP, None))));
        assert_eq!(
            items[1],
            Err(DecodeError::InvalidOpcode {
                byte: 0xEE,
                offset: 1
            })
        );
    }
}
