//! Process-global runtime state.
//!
//! The runtime intentionally keeps the args store, the RNG, the file
//! channel table and the allocation hook in one process-global [`Runtime`]
//! instance; the C ABI symbols delegate to it. Concurrent VM instances in
//! the same process are not supported.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Instant;

use viper_il::TrapKind;

use crate::error::{RtResult, RtTrap};
use crate::io::Channel;

/// Replaceable allocation gate. Returning `false` makes the next
/// allocating helper trap, which is how tests exercise out-of-memory
/// paths.
pub type AllocHook = fn(bytes: usize) -> bool;

/// Default RNG seed; any nonzero constant keeps `rt_rnd` reproducible
/// before `rt_randomize_i64` runs.
pub(crate) const DEFAULT_RNG_SEED: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// Mutable state shared by the runtime helpers.
pub struct Runtime {
    pub(crate) rng_state: u64,
    pub(crate) args: Vec<Vec<u8>>,
    pub(crate) channels: HashMap<i64, Channel>,
    pub(crate) epoch: Instant,
}

impl Runtime {
    fn new() -> Self {
        Runtime {
            rng_state: DEFAULT_RNG_SEED,
            args: Vec::new(),
            channels: HashMap::new(),
            epoch: Instant::now(),
        }
    }
}

fn cell() -> &'static Mutex<Runtime> {
    static RUNTIME: OnceLock<Mutex<Runtime>> = OnceLock::new();
    RUNTIME.get_or_init(|| Mutex::new(Runtime::new()))
}

/// Lock the process-global runtime.
pub(crate) fn lock() -> MutexGuard<'static, Runtime> {
    cell().lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

thread_local! {
    static ALLOC_HOOK: Cell<Option<AllocHook>> = const { Cell::new(None) };
}

/// Install or clear the allocation hook for the current thread. Tests use
/// this to force out-of-memory traps; production code leaves it unset.
pub fn set_alloc_hook(hook: Option<AllocHook>) {
    ALLOC_HOOK.with(|cell| cell.set(hook));
}

/// Gate one prospective allocation through the hook.
pub fn alloc_check(bytes: usize, message: &str) -> RtResult<()> {
    let allowed = ALLOC_HOOK.with(|cell| cell.get().map_or(true, |hook| hook(bytes)));
    if allowed {
        Ok(())
    } else {
        Err(RtTrap::new(TrapKind::OutOfMemory, message))
    }
}
