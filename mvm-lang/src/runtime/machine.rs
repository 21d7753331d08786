//! Core of the MVM
//! Our VM is a trivial stack machine with a single scratch register, which
//! executes the bytecode produced by the assembler

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, trace};

use crate::isa::{DecodeError, Instruction, Op, Word};
use crate::runtime::disasm;
use crate::runtime::natives::NativeTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Halted,
}

/// What the machine does after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FaultKind {
    #[error("invalid opcode 0x{0:02X}")]
    InvalidOpcode(u8),

    #[error("{0} is missing operand bytes")]
    Truncated(Op),

    #[error("program counter is past the end of the program")]
    PcOutOfBounds,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("no native function at index {0}")]
    UnknownNative(Word),

    #[error("failed to write output: {0}")]
    Output(io::ErrorKind),
}

impl From<DecodeError> for FaultKind {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::InvalidOpcode { byte, .. } => FaultKind::InvalidOpcode(byte),
            DecodeError::Truncated { op, .. } => FaultKind::Truncated(op),
            DecodeError::OutOfBounds { .. } => FaultKind::PcOutOfBounds,
        }
    }
}

/// A fatal error raised while executing, with enough context for a post-mortem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind}\n\nPC: 0x{pc:X}\nR0: 0x{reg:X}\nprogram size: 0x{program_size:X}")]
pub struct RuntimeFault {
    pub kind: FaultKind,
    pub pc: Word,
    pub reg: Word,
    pub program_size: usize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("program is empty")]
    Empty,

    #[error("program is {size} bytes, more than a program counter can address")]
    TooLarge { size: usize },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct VM {
    pub pc: Word,  // program counter
    pub reg: Word, // scratch register, written by POP and read by LOAD
    pub stack: Vec<Word>,

    program: Vec<u8>,
    natives: NativeTable,
    state: State,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    pub fn new() -> Self {
        Self::with_natives(NativeTable::default())
    }

    pub fn with_natives(natives: NativeTable) -> Self {
        Self {
            pc: 0,
            reg: 0,
            stack: Vec::new(),

            program: Vec::new(),
            natives,
            state: State::Idle,
        }
    }

    /// Replace the program and reset the machine state
    pub fn load(&mut self, program: impl Into<Vec<u8>>) -> Result<(), LoadError> {
        let program = program.into();
        if program.is_empty() {
            return Err(LoadError::Empty);
        }
        if program.len() > Word::MAX as usize {
            return Err(LoadError::TooLarge {
                size: program.len(),
            });
        }

        debug!(size = program.len(), "vm: program loaded");

        self.program = program;
        self.reset();
        Ok(())
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), LoadError> {
        let program = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        self.load(program)
    }

    pub fn program(&self) -> &[u8] {
        &self.program
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn reset(&mut self) {
        self.pc = 0;
        self.reg = 0;
        self.stack.clear();
        self.state = State::Idle;
    }

    /// Begin running from the current program counter. A halted machine
    /// stays halted until `load` or `reset`.
    pub fn start(&mut self) {
        if self.state == State::Idle {
            self.state = State::Running;
        }
    }

    /// Stop before the next instruction
    pub fn stop(&mut self) {
        self.state = State::Halted;
    }

    fn fault(&self, pc: Word, kind: FaultKind) -> RuntimeFault {
        RuntimeFault {
            kind,
            pc,
            reg: self.reg,
            program_size: self.program.len(),
        }
    }

    fn fetch_decode(&self) -> Result<Instruction, FaultKind> {
        Ok(Instruction::decode(&self.program, self.pc as usize)?)
    }

    fn pop(&mut self) -> Result<Word, FaultKind> {
        self.stack.pop().ok_or(FaultKind::StackUnderflow)
    }

    // Pops `a` (the top) and then `b`, pushes `f(a, b)`
    fn binary<F>(&mut self, f: F) -> Result<(), FaultKind>
    where
        F: FnOnce(Word, Word) -> Result<Word, FaultKind>,
    {
        let a = self.pop()?;
        let b = self.pop()?;
        self.stack.push(f(a, b)?);
        Ok(())
    }

    fn compare<F>(&mut self, f: F) -> Result<(), FaultKind>
    where
        F: FnOnce(Word, Word) -> bool,
    {
        self.binary(|a, b| Ok(f(a, b) as Word))
    }

    fn execute<W: Write>(&mut self, instr: Instruction, out: &mut W) -> Result<Flow, FaultKind> {
        match instr.op {
            Op::NOP => {}

            Op::HALT => {
                self.state = State::Halted;
                return Ok(Flow::Halted);
            }

            // Stack
            Op::PUSH => self.stack.push(instr.operand()),
            Op::POP => self.reg = self.pop()?,
            Op::LOAD => self.stack.push(self.reg),

            // Comparison
            Op::EQU => self.compare(|a, b| a == b)?,
            Op::NEQU => self.compare(|a, b| a != b)?,
            Op::GT => self.compare(|a, b| a > b)?,
            Op::GTEQ => self.compare(|a, b| a >= b)?,
            Op::LT => self.compare(|a, b| a < b)?,
            Op::LTEQ => self.compare(|a, b| a <= b)?,

            // Math
            Op::ADD => self.binary(|a, b| Ok(a.wrapping_add(b)))?,
            Op::SUB => self.binary(|a, b| Ok(b.wrapping_sub(a)))?,
            Op::MUL => self.binary(|a, b| Ok(a.wrapping_mul(b)))?,
            Op::DIV => self.binary(|a, b| b.checked_div(a).ok_or(FaultKind::DivisionByZero))?,
            Op::MOD => self.binary(|a, b| a.checked_rem(b).ok_or(FaultKind::DivisionByZero))?,

            // Bitwise
            Op::XOR => self.binary(|a, b| Ok(a ^ b))?,
            Op::OR => self.binary(|a, b| Ok(a | b))?,
            Op::AND => self.binary(|a, b| Ok(a & b))?,
            Op::NEG => {
                let value = self.pop()?;
                self.stack.push(!value);
            }

            // Jumping, the program counter already points past the operand
            Op::JMP => self.pc = instr.operand(),
            Op::JMPZ => {
                if self.pop()? == 0 {
                    self.pc = instr.operand();
                }
            }
            Op::JMPNZ => {
                if self.pop()? != 0 {
                    self.pc = instr.operand();
                }
            }

            Op::CALL => {
                let index = instr.operand();
                let native = *self
                    .natives
                    .get(index)
                    .ok_or(FaultKind::UnknownNative(index))?;
                let arg = self.pop()?;

                debug!(native = native.name, arg, "vm: calling native");
                (native.func)(arg);
            }

            Op::PRINT => {
                let top = *self.stack.last().ok_or(FaultKind::StackUnderflow)?;
                writeln!(out, "{}", top).map_err(|e| FaultKind::Output(e.kind()))?;
            }
        }

        Ok(Flow::Continue)
    }

    /// Fetch, decode and execute a single instruction
    pub fn step<W: Write>(&mut self, out: &mut W) -> Result<Flow, RuntimeFault> {
        match self.state {
            State::Halted => return Ok(Flow::Halted),
            State::Idle => self.start(),
            State::Running => {}
        }

        let at = self.pc;
        if at as usize >= self.program.len() {
            // Running off the end is a normal stop
            self.state = State::Halted;
            return Ok(Flow::Halted);
        }

        let instr = match self.fetch_decode() {
            Ok(instr) => instr,
            Err(kind) => {
                self.state = State::Halted;
                return Err(self.fault(at, kind));
            }
        };

        trace!(pc = at, %instr, depth = self.stack.len(), "vm: step");

        // Decoding succeeded, so the whole instruction lies inside the program
        self.pc = at + instr.encoded_len() as Word;

        self.execute(instr, out).map_err(|kind| {
            // Leave the program counter on the faulting instruction
            self.pc = at;
            self.state = State::Halted;
            self.fault(at, kind)
        })
    }

    /// Run until HALT, the end of the program, or a fault
    pub fn run_to<W: Write>(&mut self, out: &mut W) -> Result<(), RuntimeFault> {
        if self.state == State::Halted {
            return Ok(());
        }

        self.start();
        debug!(size = self.program.len(), pc = self.pc, "vm: running");

        loop {
            match self.step(out) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halted) => break,
                Err(fault) => {
                    error!(pc = fault.pc, "vm: {}", fault.kind);
                    return Err(fault);
                }
            }
        }

        debug!(pc = self.pc, reg = self.reg, depth = self.stack.len(), "vm: halted");
        out.flush()
            .map_err(|e| self.fault(self.pc, FaultKind::Output(e.kind())))
    }

    /// Run with PRINT going to stdout
    pub fn run(&mut self) -> Result<(), RuntimeFault> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.run_to(&mut out)
    }

    /// Registers, the code around the program counter and the stack
    pub fn dump_ctx(&self) -> String {
        let mut ctx = String::new();
        ctx.push_str("------------------------------------------------------------\n");
        ctx.push_str(&format!(
            "pc: {:04X}\treg: {:04X}\tstate: {:?}\n",
            self.pc, self.reg, self.state
        ));
        ctx.push_str("------------------------------------------------------------\n");

        let start = (self.pc as usize).saturating_sub(16);
        ctx.push_str(&disasm::dump_memory(&self.program, start, start + 48));
        ctx.push_str(&disasm::dump_stack(&self.stack));
        ctx
    }
}
