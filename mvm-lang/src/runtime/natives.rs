//! Host functions reachable from bytecode through `CALL <index>`
//!
//! The table is fixed when the machine is built. Each function takes the word
//! popped off the stack and returns nothing the machine can see.

use std::thread;
use std::time::Duration;

use crate::isa::Word;

/// Index of the built-in `sleep` native
pub const SLEEP: Word = 0;

#[derive(Debug, Clone, Copy)]
pub struct Native {
    pub name: &'static str,
    pub func: fn(Word),
}

/// Built-in natives, in index order
pub static BUILTINS: &[Native] = &[Native {
    name: "sleep",
    func: sleep,
}];

/// Block the calling thread for `seconds`
fn sleep(seconds: Word) {
    thread::sleep(Duration::from_secs(seconds as u64));
}

#[derive(Debug, Clone, Copy)]
pub struct NativeTable {
    natives: &'static [Native],
}

impl NativeTable {
    pub fn new(natives: &'static [Native]) -> Self {
        Self { natives }
    }

    pub fn get(&self, index: Word) -> Option<&Native> {
        self.natives.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.natives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.natives.is_empty()
    }
}

impl Default for NativeTable {
    fn default() -> Self {
        Self::new(BUILTINS)
    }
}
