pub mod disasm;
pub mod machine;
pub mod natives;
