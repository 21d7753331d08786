//! Assembler for MVM bytecode
//!
//! Parser for the assembly syntax
//!
//! Turns the token stream into one statement per source line. Mnemonics are
//! resolved against the instruction set here, operands are checked against
//! the instruction's arity, and integer literals are range checked. Label
//! references are left by name for the assembler to resolve.
use std::iter::Peekable;

use mvm_lang::isa::{Op, Word};

use super::error::CompileError;
use super::lexer::{Token, TokenKind};

#[derive(Debug, Clone)]
pub struct Parser<I>
where
    I: Iterator<Item = Token>,
{
    pub tokens: Peekable<I>,
    pub ast: Ast,
}

// --------------------------------------------
// AST definition

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Int(Word),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Instruction(Op, Option<Operand>),
    Label(String),
}

/// A node and the source line it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub line: usize,
    pub node: Node,
}

pub type Ast = Vec<Statement>;

// --------------------------------------------
// Parsing

pub type ParseResult<T> = Result<T, CompileError>;

fn is_label_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && !name.contains(|c: char| c.is_whitespace() || c == ':')
}

impl<I> Parser<I>
where
    I: Iterator<Item = Token>,
{
    pub fn new(tokens: I) -> Self {
        Self {
            tokens: tokens.peekable(),
            ast: Vec::new(),
        }
    }

    /// Everything left on the current line, consuming the end of line marker
    fn parse_args(&mut self) -> Vec<Token> {
        let mut args = Vec::new();
        for token in self.tokens.by_ref() {
            if token.kind == TokenKind::EndOfLine {
                break;
            }
            args.push(token);
        }
        args
    }

    fn parse_operand(&self, token: Token) -> ParseResult<Operand> {
        match token.kind {
            TokenKind::Int => token
                .literal
                .parse::<Word>()
                .map(Operand::Int)
                .map_err(|_| CompileError::InvalidOperand {
                    line: token.line,
                    operand: token.literal,
                }),
            _ => Ok(Operand::Label(token.literal)),
        }
    }

    fn parse_instruction(&mut self, token: Token) -> ParseResult<Statement> {
        let line = token.line;
        let op = Op::from_mnemonic(&token.literal).ok_or_else(|| CompileError::InvalidOpcode {
            line,
            name: token.literal.clone(),
        })?;

        let mut args = self.parse_args().into_iter();
        let operand = match (op.arity(), args.next()) {
            (0, None) => None,
            (0, Some(arg)) => {
                return Err(CompileError::UnexpectedOperand {
                    line,
                    op,
                    operand: arg.literal,
                });
            }
            (_, None) => return Err(CompileError::MissingOperand { line, op }),
            (_, Some(arg)) => Some(self.parse_operand(arg)?),
        };

        if let Some(extra) = args.next() {
            return Err(CompileError::UnexpectedOperand {
                line,
                op,
                operand: extra.literal,
            });
        }

        Ok(Statement {
            line,
            node: Node::Instruction(op, operand),
        })
    }

    fn parse_label(&mut self, token: Token, name: String) -> ParseResult<Statement> {
        // The lexer closes every label line straight away
        self.parse_args();

        if !is_label_name(&name) {
            return Err(CompileError::InvalidLabelName {
                line: token.line,
                name,
            });
        }

        Ok(Statement {
            line: token.line,
            node: Node::Label(name),
        })
    }

    // --------------------------------------

    pub fn parse(&mut self) -> ParseResult<Ast> {
        while let Some(token) = self.tokens.next() {
            let statement = match token.kind.clone() {
                TokenKind::Ident => self.parse_instruction(token)?,
                TokenKind::Label(name) => self.parse_label(token, name)?,
                TokenKind::EndOfLine => continue,
                TokenKind::Int => {
                    return Err(CompileError::UnexpectedToken {
                        line: token.line,
                        found: token.literal,
                    });
                }
            };

            self.ast.push(statement);
        }

        Ok(std::mem::take(&mut self.ast))
    }
}
