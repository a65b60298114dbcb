//! Linear byte memory addressed by `Ptr` slots.
//!
//! Two regions share one address space: the stack (globals at the bottom,
//! then `alloca` storage, growing up from a small guard offset so address
//! 0 stays null) and a bump heap for `rt_alloc`, placed high so the
//! regions can never collide. Frames save and restore the stack pointer
//! around calls.

use viper_il::TrapKind;

use crate::error::TrapError;

/// First valid stack address; 0..8 is the null guard.
pub const STACK_BASE: u64 = 8;
/// First heap address.
pub const HEAP_BASE: u64 = 1 << 32;
/// Stack size cap.
const STACK_LIMIT: u64 = 8 << 20;
/// Heap size cap.
const HEAP_LIMIT: u64 = 256 << 20;

#[derive(Debug, Default)]
pub(crate) struct Memory {
    stack: Vec<u8>,
    heap: Vec<u8>,
    /// Stack bytes below this hold global data and are never reclaimed.
    data_end: u64,
}

/// Trap constructor filled in by the VM with site information; memory only
/// knows the kind and message.
pub(crate) type MemResult<T> = Result<T, (TrapKind, String)>;

impl Memory {
    /// Current stack pointer.
    pub fn sp(&self) -> u64 {
        STACK_BASE + self.stack.len() as u64
    }

    /// Copy global data into the bottom of the stack region; returns its
    /// address. Only valid before any `alloca`.
    pub fn place_data(&mut self, bytes: &[u8]) -> u64 {
        let addr = self.sp();
        self.stack.extend_from_slice(bytes);
        // Keep data 8-byte aligned for the slots that follow.
        while self.stack.len() % 8 != 0 {
            self.stack.push(0);
        }
        self.data_end = self.sp();
        addr
    }

    /// Reserve `size` zeroed stack bytes. Negative sizes trap; zero is
    /// valid and returns the current stack pointer.
    pub fn alloca(&mut self, size: i64) -> MemResult<u64> {
        if size < 0 {
            return Err((
                TrapKind::InvalidOperation,
                "alloca: negative size".to_string(),
            ));
        }
        let addr = self.sp();
        let new_len = self.stack.len() as u64 + size as u64;
        if new_len > STACK_LIMIT {
            return Err((TrapKind::OutOfMemory, "stack overflow".to_string()));
        }
        self.stack.resize(new_len as usize, 0);
        Ok(addr)
    }

    /// Restore the stack pointer saved at frame entry, reclaiming the
    /// frame's allocas. Global data is never reclaimed.
    pub fn restore(&mut self, sp: u64) {
        let floor = sp.max(self.data_end);
        self.stack.truncate((floor - STACK_BASE) as usize);
    }

    /// Bump-allocate `size` zeroed heap bytes (the VM-side `rt_alloc`).
    pub fn heap_alloc(&mut self, size: i64) -> MemResult<u64> {
        if size < 0 {
            return Err((
                TrapKind::InvalidOperation,
                "rt_alloc: negative size".to_string(),
            ));
        }
        let addr = HEAP_BASE + self.heap.len() as u64;
        let new_len = self.heap.len() as u64 + (size as u64).max(1);
        if new_len > HEAP_LIMIT {
            return Err((TrapKind::OutOfMemory, "out of memory".to_string()));
        }
        self.heap.resize(new_len as usize, 0);
        Ok(addr)
    }

    fn region(&mut self, addr: u64, len: u64) -> MemResult<&mut [u8]> {
        let oob = || {
            (
                TrapKind::Bounds,
                format!("memory access out of bounds: addr=0x{addr:x} len={len}"),
            )
        };
        let end = addr.checked_add(len).ok_or_else(oob)?;
        if addr >= HEAP_BASE {
            let hi = HEAP_BASE + self.heap.len() as u64;
            if end > hi {
                return Err(oob());
            }
            let from = (addr - HEAP_BASE) as usize;
            Ok(&mut self.heap[from..from + len as usize])
        } else if addr >= STACK_BASE {
            let hi = self.sp();
            if end > hi {
                return Err(oob());
            }
            let from = (addr - STACK_BASE) as usize;
            Ok(&mut self.stack[from..from + len as usize])
        } else {
            Err(oob())
        }
    }

    /// Read `len` bytes at `addr`.
    pub fn read(&mut self, addr: u64, len: u64) -> MemResult<&[u8]> {
        self.region(addr, len).map(|s| &*s)
    }

    /// Write `bytes` at `addr`.
    pub fn write(&mut self, addr: u64, bytes: &[u8]) -> MemResult<()> {
        let dst = self.region(addr, bytes.len() as u64)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }
}

impl TrapError {
    /// Attach a memory failure to a trap site skeleton.
    pub(crate) fn from_mem(mut self, failure: (TrapKind, String)) -> TrapError {
        self.kind = failure.0;
        self.message = failure.1;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloca_and_restore() {
        let mut mem = Memory::default();
        let sp0 = mem.sp();
        let a = mem.alloca(8).unwrap();
        assert_eq!(a, sp0);
        mem.write(a, &42i64.to_le_bytes()).unwrap();
        assert_eq!(mem.read(a, 8).unwrap(), 42i64.to_le_bytes());
        mem.restore(sp0);
        assert!(mem.read(a, 8).is_err());
    }

    #[test]
    fn zero_sized_alloca_is_valid() {
        let mut mem = Memory::default();
        let a = mem.alloca(0).unwrap();
        assert_eq!(a, mem.sp());
    }

    #[test]
    fn negative_alloca_traps() {
        let mut mem = Memory::default();
        let (kind, msg) = mem.alloca(-1).unwrap_err();
        assert_eq!(kind, TrapKind::InvalidOperation);
        assert_eq!(msg, "alloca: negative size");
    }

    #[test]
    fn null_page_is_unmapped() {
        let mut mem = Memory::default();
        mem.alloca(16).unwrap();
        assert!(mem.read(0, 1).is_err());
        assert!(mem.read(7, 1).is_err());
    }

    #[test]
    fn heap_survives_stack_restore() {
        let mut mem = Memory::default();
        let sp0 = mem.sp();
        mem.alloca(8).unwrap();
        let h = mem.heap_alloc(16).unwrap();
        mem.write(h, &[1; 16]).unwrap();
        mem.restore(sp0);
        assert_eq!(mem.read(h, 16).unwrap(), [1; 16]);
    }

    #[test]
    fn data_segment_survives_restore() {
        let mut mem = Memory::default();
        let g = mem.place_data(b"hello");
        let sp0 = mem.sp();
        mem.alloca(32).unwrap();
        mem.restore(sp0);
        assert_eq!(mem.read(g, 5).unwrap(), b"hello");
    }
}
