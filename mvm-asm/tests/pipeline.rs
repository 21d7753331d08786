use mvm_asm::{CompileError, assemble};
use mvm_lang::isa::{Decoder, INSTRUCTIONS, WORD_SIZE, Word};
use mvm_lang::runtime::machine::FaultKind;
use mvm_lang::{VM, disassemble, translate};

const COUNTDOWN: &str = "\
# count down from 3
PUSH 3
top:
PRINT
PUSH 1
SUB
POP
LOAD
LOAD
JMPNZ top
HALT
";

fn run_source(source: &str) -> (VM, String) {
    let program = assemble(source).unwrap();
    let mut vm = VM::new();
    vm.load(program).unwrap();

    let mut out = Vec::new();
    vm.run_to(&mut out).unwrap();
    (vm, String::from_utf8(out).unwrap())
}

#[test]
fn add_example_prints_eight() {
    let (vm, out) = run_source("PUSH 5\nPUSH 3\nADD\nPRINT\nHALT");

    // PRINT leaves its operand on the stack
    assert_eq!(out, "8\n");
    assert_eq!(vm.stack, vec![8]);
}

#[test]
fn loop_example_terminates_on_first_test() {
    // The pushed 1 is consumed by JMPZ, which falls through to HALT
    let (vm, out) = run_source("loop:\nPUSH 1\nJMPZ loop\nHALT");

    assert_eq!(out, "");
    assert!(vm.stack.is_empty());
}

#[test]
fn countdown_loop_runs() {
    let (vm, out) = run_source(COUNTDOWN);
    assert_eq!(out, "3\n2\n1\n");
    assert_eq!(vm.stack, vec![0]);
}

#[test]
fn disassembly_reassembles_to_the_same_bytes() {
    let program = assemble(COUNTDOWN).unwrap();
    let text = disassemble(&program);

    // Labels come back as offsets, everything else verbatim
    assert!(text.contains(&format!("JMPNZ {}", 1 + WORD_SIZE)));
    assert_eq!(assemble(&text).unwrap(), program);
}

#[test]
fn every_mnemonic_survives_a_round_trip() {
    let source: String = INSTRUCTIONS
        .iter()
        .map(|info| match info.arity {
            0 => format!("{}\n", info.mnemonic),
            _ => format!("{} 7\n", info.mnemonic),
        })
        .collect();

    let program = assemble(&source).unwrap();
    assert_eq!(disassemble(&program), source);
}

#[test]
fn assembling_is_deterministic() {
    assert_eq!(assemble(COUNTDOWN).unwrap(), assemble(COUNTDOWN).unwrap());
}

#[test]
fn program_length_follows_arity() {
    let program = assemble(COUNTDOWN).unwrap();

    let expected: usize = Decoder::new(&program)
        .map(|item| {
            let (_, instr) = item.unwrap();
            1 + instr.op.arity() * WORD_SIZE
        })
        .sum();
    assert_eq!(program.len(), expected);
}

#[test]
fn forward_reference_resolves() {
    let (_, out) = run_source("PUSH 1\nJMP skip\nPRINT\nskip:\nPUSH 2\nPRINT\nHALT");
    assert_eq!(out, "2\n");
}

#[test]
fn division_by_zero_faults() {
    let program = assemble("PUSH 1\nPUSH 0\nDIV\nHALT").unwrap();
    let mut vm = VM::new();
    vm.load(program).unwrap();

    let fault = vm.run_to(&mut Vec::new()).unwrap_err();
    assert_eq!(fault.kind, FaultKind::DivisionByZero);
    assert_eq!(fault.pc as usize, 2 * (1 + WORD_SIZE));
}

#[test]
fn duplicate_label_fails_to_compile() {
    let err = assemble("x:\nNOP\nx:\nHALT").unwrap_err();
    assert!(matches!(err, CompileError::DuplicateLabel { ref name, .. } if name == "x"));
}

#[test]
fn invalid_mnemonic_fails_to_compile() {
    let err = assemble("PUSH 1\nFROB\n").unwrap_err();
    assert_eq!(
        err,
        CompileError::InvalidOpcode {
            line: 2,
            name: "FROB".into()
        }
    );
}

#[test]
fn compiled_program_translates() {
    let program = assemble(COUNTDOWN).unwrap();
    let asm = translate(&program).unwrap();

    assert!(asm.contains("_start:"));
    assert!(asm.contains(&format!(".L{}:", 1 + WORD_SIZE)));
    assert!(asm.contains("__mvm_print"));
}

#[test]
fn wrapping_matches_word_width() {
    let (_, out) = run_source(&format!("PUSH {}\nPUSH 1\nADD\nPRINT", Word::MAX));
    assert_eq!(out, "0\n");
}
