//! Native backend
//!
//! Lowers bytecode to x86-64 assembly in AT&T syntax for Linux, instead of
//! interpreting it. The operand stack becomes the hardware stack with one
//! quadword per word, `%rax` and `%rbx` are scratch, and the machine's
//! register lives in `%r12`. Every instruction gets a `.L<offset>` label so
//! jump operands translate directly.
//!
//! There is no optimisation: each opcode has exactly one emission rule.
//! DIV and MOD by zero keep the host's SIGFPE trap rather than a VM fault.

use std::collections::HashSet;
use std::iter;

use thiserror::Error;
use tracing::debug;

use crate::isa::{DecodeError, Decoder, Instruction, Op, WORD_SIZE, Word};
use crate::runtime::natives::NativeTable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{op} at offset {offset} targets {target}, which is not the start of an instruction")]
    BadJumpTarget { op: Op, offset: usize, target: Word },

    #[error("CALL {index} at offset {offset} has no native lowering")]
    UnsupportedNative { offset: usize, index: Word },
}

const EXIT: &[&str] = &["mov $60, %eax", "xor %edi, %edi", "syscall"];

// nanosleep(&timespec { tv_sec: arg, tv_nsec: 0 }, NULL)
const SLEEP: &[&str] = &[
    "pop %rax",
    "push $0",
    "push %rax",
    "mov %rsp, %rdi",
    "xor %esi, %esi",
    "mov $35, %eax",
    "syscall",
    "add $16, %rsp",
];

// Writes %rax in decimal plus a newline to stdout
const PRINT_ROUTINE: &[&str] = &[
    "__mvm_print:",
    "    sub $32, %rsp",
    "    lea 32(%rsp), %r8",
    "    mov %r8, %rsi",
    "    dec %rsi",
    "    movb $10, (%rsi)",
    "    mov $10, %rcx",
    ".Lmvm_print_digit:",
    "    xor %edx, %edx",
    "    div %rcx",
    "    add $48, %dl",
    "    dec %rsi",
    "    mov %dl, (%rsi)",
    "    test %rax, %rax",
    "    jnz .Lmvm_print_digit",
    "    mov %r8, %rdx",
    "    sub %rsi, %rdx",
    "    mov $1, %eax",
    "    mov $1, %edi",
    "    syscall",
    "    add $32, %rsp",
    "    ret",
];

fn native_lowering(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "sleep" => Some(SLEEP),
        _ => None,
    }
}

struct Emitter {
    text: String,
}

impl Emitter {
    fn new() -> Self {
        Self {
            text: String::new(),
        }
    }

    fn raw(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn op(&mut self, line: &str) {
        self.text.push_str("    ");
        self.raw(line);
    }

    fn ops(&mut self, lines: &[&str]) {
        for line in lines {
            self.op(line);
        }
    }

    fn label(&mut self, offset: usize) {
        self.raw(&format!(".L{}:", offset));
    }

    // Truncate %rax to the word width, so overflow wraps like it does in the VM
    fn wrap(&mut self) {
        match WORD_SIZE {
            2 => self.op("movzwq %ax, %rax"),
            4 => self.op("movl %eax, %eax"),
            _ => {}
        }
    }

    fn binary(&mut self, lines: &[&str], wrap: bool) {
        self.ops(lines);
        if wrap {
            self.wrap();
        }
        self.op("push %rax");
    }

    // a is the top of the stack, b the one below; pushes (a <cc> b) as 0 or 1
    fn compare(&mut self, set: &str) {
        self.ops(&["pop %rax", "pop %rbx", "cmp %rbx, %rax"]);
        self.op(&format!("{} %al", set));
        self.ops(&["movzbq %al, %rax", "push %rax"]);
    }

    fn jump(&mut self, branch: &str, target: Word) {
        self.op(&format!("{} .L{}", branch, target));
    }
}

/// Translate a whole program into an assembly translation unit
pub fn translate(program: &[u8]) -> Result<String, TranslateError> {
    let instrs: Vec<(usize, Instruction)> = Decoder::new(program).collect::<Result<_, _>>()?;

    // Falling off the end is a valid jump target too
    let boundaries: HashSet<usize> = instrs
        .iter()
        .map(|&(offset, _)| offset)
        .chain(iter::once(program.len()))
        .collect();

    for &(offset, instr) in &instrs {
        if instr.op.is_jump() && !boundaries.contains(&(instr.operand() as usize)) {
            return Err(TranslateError::BadJumpTarget {
                op: instr.op,
                offset,
                target: instr.operand(),
            });
        }
    }

    let natives = NativeTable::default();
    let mut asm = Emitter::new();

    asm.raw(".section .text");
    asm.raw(".globl _start");
    asm.raw("_start:");
    asm.op("xor %r12d, %r12d");

    for &(offset, instr) in &instrs {
        asm.label(offset);
        lower(&mut asm, &natives, offset, instr)?;
    }

    asm.label(program.len());
    asm.ops(EXIT);

    if instrs.iter().any(|(_, instr)| instr.op == Op::PRINT) {
        asm.raw("");
        for line in PRINT_ROUTINE {
            asm.raw(line);
        }
    }

    // Nothing is ever placed in the data segment
    asm.raw("");
    asm.raw(".section .rodata");

    debug!(
        instructions = instrs.len(),
        lines = asm.text.lines().count(),
        "codegen: translated program"
    );

    Ok(asm.text)
}

fn lower(
    asm: &mut Emitter,
    natives: &NativeTable,
    offset: usize,
    instr: Instruction,
) -> Result<(), TranslateError> {
    match instr.op {
        Op::NOP => asm.op("nop"),
        Op::HALT => asm.ops(EXIT),

        // Stack
        Op::PUSH => {
            asm.op(&format!("movl ${}, %eax", instr.operand()));
            asm.op("push %rax");
        }
        Op::POP => asm.op("pop %r12"),
        Op::LOAD => asm.op("push %r12"),

        // Comparison, unsigned like the words themselves
        Op::EQU => asm.compare("sete"),
        Op::NEQU => asm.compare("setne"),
        Op::GT => asm.compare("seta"),
        Op::GTEQ => asm.compare("setae"),
        Op::LT => asm.compare("setb"),
        Op::LTEQ => asm.compare("setbe"),

        // Math
        Op::ADD => asm.binary(&["pop %rax", "pop %rbx", "add %rbx, %rax"], true),
        Op::SUB => asm.binary(&["pop %rbx", "pop %rax", "sub %rbx, %rax"], true),
        Op::MUL => asm.binary(&["pop %rax", "pop %rbx", "imul %rbx, %rax"], true),
        Op::DIV => asm.binary(&["pop %rbx", "pop %rax", "xor %edx, %edx", "div %rbx"], false),
        Op::MOD => {
            asm.ops(&["pop %rax", "pop %rbx", "xor %edx, %edx", "div %rbx"]);
            asm.op("push %rdx");
        }

        // Bitwise
        Op::XOR => asm.binary(&["pop %rax", "pop %rbx", "xor %rbx, %rax"], false),
        Op::OR => asm.binary(&["pop %rax", "pop %rbx", "or %rbx, %rax"], false),
        Op::AND => asm.binary(&["pop %rax", "pop %rbx", "and %rbx, %rax"], false),
        Op::NEG => asm.binary(&["pop %rax", "not %rax"], true),

        // Jumping
        Op::JMP => asm.jump("jmp", instr.operand()),
        Op::JMPZ | Op::JMPNZ => {
            asm.ops(&["pop %rax", "test %rax, %rax"]);
            let branch = if instr.op == Op::JMPZ { "jz" } else { "jnz" };
            asm.jump(branch, instr.operand());
        }

        Op::CALL => {
            let index = instr.operand();
            let lowering = natives
                .get(index)
                .and_then(|native| native_lowering(native.name))
                .ok_or(TranslateError::UnsupportedNative { offset, index })?;
            asm.ops(lowering);
        }

        Op::PRINT => {
            asm.op("mov (%rsp), %rax");
            asm.op("call __mvm_print");
        }
    }

    Ok(())
}
