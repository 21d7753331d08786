//! Assembler for MVM bytecode
//!
//! Lexer for the assembly syntax
//!
//! The syntax is line oriented. A line is either a label definition
//! (`name:`) or a mnemonic followed by at most one operand. A line holding a
//! `#` anywhere is a comment in its entirety, and blank lines are skipped.

use std::iter::Peekable;
use std::vec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Label(String), // name:
    Ident,         // PUSH, loop
    Int,           // 42, anything starting with a digit
    EndOfLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct Lexer<'l> {
    pub src: &'l str,
    pub line: usize,
}

impl<'l> Lexer<'l> {
    pub fn new(src: &'l str) -> Self {
        Lexer { src, line: 0 }
    }

    fn push(&self, kind: TokenKind, literal: &str, tokens: &mut Vec<Token>) {
        tokens.push(Token {
            kind,
            literal: literal.to_string(),
            line: self.line,
        });
    }

    fn lex_word(&self, word: &str, tokens: &mut Vec<Token>) {
        if word.starts_with(|c: char| c.is_ascii_digit()) {
            self.push(TokenKind::Int, word, tokens);
        } else {
            self.push(TokenKind::Ident, word, tokens);
        }
    }

    fn lex_line(&self, line: &str, tokens: &mut Vec<Token>) {
        let line = line.trim();

        if line.is_empty() || line.contains('#') {
            return;
        }

        if let Some(name) = line.strip_suffix(':') {
            self.push(TokenKind::Label(name.to_string()), line, tokens);
        } else {
            for word in line.split_whitespace() {
                self.lex_word(word, tokens);
            }
        }

        self.push(TokenKind::EndOfLine, "", tokens);
    }

    pub fn lex(&mut self) -> Peekable<vec::IntoIter<Token>> {
        let mut tokens = Vec::new();

        for line in self.src.lines() {
            self.line += 1;
            self.lex_line(line, &mut tokens);
        }

        tokens.into_iter().peekable()
    }
}
