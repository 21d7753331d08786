use crate::isa::{DecodeError, Instruction, Word};

/// Turn a program back into assembly text, one instruction per line
///
/// This is a diagnostic, so a bad byte does not stop it: it is reported as
/// `INVALID OPCODE` and scanning resumes at the next byte.
pub fn disassemble(program: &[u8]) -> String {
    let mut text = String::new();
    let mut addr = 0;

    while addr < program.len() {
        match Instruction::decode(program, addr) {
            Ok(instr) => {
                text.push_str(&instr.to_string());
                text.push('\n');
                addr += instr.encoded_len();
            }
            Err(DecodeError::Truncated { .. }) => {
                // Nothing after a cut-short operand can be decoded
                text.push_str("TRUNCATED OPERAND\n");
                break;
            }
            Err(_) => {
                text.push_str("INVALID OPCODE\n");
                addr += 1;
            }
        }
    }

    text
}

/// Print the disassembly of an instruction, and how many bytes it spans
pub fn disasm_instruction(program: &[u8], addr: usize) -> (String, usize) {
    match Instruction::decode(program, addr) {
        Ok(instr) => (instr.to_string(), instr.encoded_len()),
        Err(DecodeError::Truncated { op, .. }) => (format!("{} ?", op), program.len() - addr),
        Err(DecodeError::InvalidOpcode { byte, .. }) => (format!("${:02X}", byte), 1),
        Err(DecodeError::OutOfBounds { .. }) => (String::new(), 1),
    }
}

/// Offset, raw bytes and disassembly of every instruction in `start..end`
pub fn dump_memory(program: &[u8], start: usize, end: usize) -> String {
    let end = end.min(program.len());
    let mut dump = String::new();
    let mut addr = start;

    while addr < end {
        let (disasm, size) = disasm_instruction(program, addr);

        let bytes: Vec<String> = program[addr..(addr + size).min(program.len())]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();

        dump.push_str(&format!("{:04X}: {:<12}{}\n", addr, bytes.join(" "), disasm));
        addr += size;
    }

    dump
}

pub fn dump_stack(stack: &[Word]) -> String {
    let mut dump = format!("Stack (depth={}):\n", stack.len());
    for (i, val) in stack.iter().enumerate() {
        dump.push_str(&format!("  [{}]: {}\n", i, val));
    }
    dump
}
