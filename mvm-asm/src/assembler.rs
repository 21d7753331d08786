//! Assembler for MVM bytecode
//!
//! Bytecode assembler.
//!
//! Takes the AST from the parser, resolves labels to byte offsets and outputs
//! the bytecode for the VM. This takes two passes: the first only measures
//! instructions to find where every label lands, the second writes the
//! bytes with every label reference replaced by its offset.

use std::collections::HashMap;

use mvm_lang::isa::{Instruction, Op, Word};
use tracing::debug;

use super::error::CompileError;
use super::parser::{Ast, Node, Operand, Statement};

#[derive(Debug, Clone, Default)]
pub struct Assembler {
    pub ptr: usize, // offset reached by the first pass, translates to pc

    buffer: Vec<u8>,

    // Labels to resolve to addresses
    pub labels: HashMap<String, Word>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    // Visitors
    // --------------------------------------

    fn resolve_operand(&self, line: usize, operand: &Operand) -> Result<Word, CompileError> {
        match operand {
            Operand::Int(value) => Ok(*value),
            Operand::Label(name) => {
                self.labels
                    .get(name)
                    .copied()
                    .ok_or_else(|| CompileError::InvalidLabel {
                        line,
                        name: name.clone(),
                    })
            }
        }
    }

    fn visit_instruction(
        &mut self,
        line: usize,
        op: Op,
        operand: Option<&Operand>,
    ) -> Result<(), CompileError> {
        let operand = operand
            .map(|operand| self.resolve_operand(line, operand))
            .transpose()?;

        Instruction::new(op, operand).encode(&mut self.buffer);
        Ok(())
    }

    fn visit_label(&mut self, name: &str) -> Result<(), CompileError> {
        // Nothing is written, the offset was fixed by the first pass. The
        // buffer must have reached the same place though.
        let expected = self.labels.get(name).copied().unwrap_or_default() as usize;
        let found = self.buffer.len();

        if expected != found {
            return Err(CompileError::LabelDrift {
                name: name.to_string(),
                expected,
                found,
            });
        }

        Ok(())
    }

    fn visit_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match &statement.node {
            Node::Instruction(op, operand) => {
                self.visit_instruction(statement.line, *op, operand.as_ref())
            }
            Node::Label(name) => self.visit_label(name),
        }
    }

    // Pass to resolve labels to addresses
    fn resolve_label_pass(&mut self, ast: &Ast) -> Result<(), CompileError> {
        for statement in ast {
            match &statement.node {
                Node::Label(name) => {
                    if self.labels.contains_key(name) {
                        return Err(CompileError::DuplicateLabel {
                            line: statement.line,
                            name: name.clone(),
                        });
                    }

                    let offset = Word::try_from(self.ptr)
                        .map_err(|_| CompileError::ProgramTooLarge { size: self.ptr })?;
                    self.labels.insert(name.clone(), offset);
                    debug!("assembler: defined label {} at {:04X}", name, offset);
                }

                // Count instruction size, and append that much to the ptr
                Node::Instruction(op, _) => self.ptr += op.encoded_len(),
            }
        }

        // Every offset, including the end, has to fit a jump operand
        if self.ptr > Word::MAX as usize {
            return Err(CompileError::ProgramTooLarge { size: self.ptr });
        }

        Ok(())
    }

    // --------------------------------------

    pub fn assemble(&mut self, ast: &Ast) -> Result<Vec<u8>, CompileError> {
        // First pass: collect and resolve labels, nothing is written
        debug!("assembler: performing first pass");
        self.ptr = 0;
        self.labels.clear();
        self.buffer.clear();

        self.resolve_label_pass(ast)?;

        debug!(
            labels = self.labels.len(),
            size = self.ptr,
            "assembler: resolved labels"
        );

        // Second pass: generate bytecode
        debug!("assembler: performing second pass");
        for statement in ast {
            self.visit_statement(statement)?;
        }

        debug_assert_eq!(self.buffer.len(), self.ptr);
        debug!(size = self.buffer.len(), "assembler: done");

        Ok(std::mem::take(&mut self.buffer))
    }
}
