use mvm_lang::isa::Op;
use thiserror::Error;

/// Anything that stops a source file from assembling. No bytecode is produced
/// once one of these is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("line {line}: invalid opcode '{name}'")]
    InvalidOpcode { line: usize, name: String },

    #[error("line {line}: duplicate label '{name}'")]
    DuplicateLabel { line: usize, name: String },

    #[error("line {line}: invalid label '{name}'")]
    InvalidLabel { line: usize, name: String },

    #[error("line {line}: '{name}' is not a valid label name")]
    InvalidLabelName { line: usize, name: String },

    #[error("line {line}: invalid operand '{operand}'")]
    InvalidOperand { line: usize, operand: String },

    #[error("line {line}: {op} expects an operand")]
    MissingOperand { line: usize, op: Op },

    #[error("line {line}: unexpected operand '{operand}' for {op}")]
    UnexpectedOperand {
        line: usize,
        op: Op,
        operand: String,
    },

    #[error("line {line}: expected an instruction or a label, found '{found}'")]
    UnexpectedToken { line: usize, found: String },

    #[error("program is {size} bytes, more than a jump can reach")]
    ProgramTooLarge { size: usize },

    #[error("label '{name}' moved from offset {expected} to {found} between passes")]
    LabelDrift {
        name: String,
        expected: usize,
        found: usize,
    },
}
