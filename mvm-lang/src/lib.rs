//! The MVM: a small stack machine, its instruction set, and a backend that
//! lowers its bytecode to native assembly

pub mod codegen;
pub mod isa;
pub mod runtime;

pub use codegen::{TranslateError, translate};
pub use isa::{Instruction, Op, WORD_SIZE, Word};
pub use runtime::disasm::disassemble;
pub use runtime::machine::{Flow, RuntimeFault, VM};
