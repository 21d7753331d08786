//! Assembler for MVM bytecode
//!
//! Source text goes through the lexer, the parser and finally the two pass
//! assembler, which produces the flat byte buffer the VM loads.

pub mod assembler;
pub mod error;
pub mod lexer;
pub mod parser;

pub use error::CompileError;

use assembler::Assembler;
use lexer::Lexer;
use parser::Parser;

/// Assemble a whole source file into bytecode
pub fn assemble(source: &str) -> Result<Vec<u8>, CompileError> {
    let mut lexer = Lexer::new(source);
    let mut parser = Parser::new(lexer.lex());
    let ast = parser.parse()?;

    Assembler::new().assemble(&ast)
}
