//! Zero-initialized allocation helper.

use viper_il::TrapKind;

use crate::error::{RtResult, RtTrap};
use crate::runtime;

/// Allocate `bytes` of zero-initialized memory. Negative sizes trap and a
/// zero size is valid (the returned buffer is still distinct and
/// writable). The allocation hook can force an `"out of memory"` trap.
pub fn alloc(bytes: i64) -> RtResult<*mut u8> {
    if bytes < 0 {
        return Err(RtTrap::new(
            TrapKind::InvalidOperation,
            "rt_alloc: negative size",
        ));
    }
    runtime::alloc_check(bytes as usize, "out of memory")?;
    let buf = vec![0u8; (bytes as usize).max(1)].into_boxed_slice();
    Ok(Box::into_raw(buf).cast())
}

/// Consult the allocation hook for a prospective allocation without
/// performing it; used by embedders that allocate from their own arena.
pub fn hook_gate(bytes: i64) -> RtResult<()> {
    runtime::alloc_check(bytes.max(0) as usize, "out of memory")
}

#[no_mangle]
pub extern "C" fn rt_alloc(bytes: i64) -> *mut u8 {
    match alloc(bytes) {
        Ok(p) => p,
        Err(t) => crate::trap_abort(&t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::set_alloc_hook;

    #[test]
    fn zero_size_is_valid() {
        let p = alloc(0).unwrap();
        assert!(!p.is_null());
        unsafe {
            assert_eq!(*p, 0);
            *p = 0xff;
        }
    }

    #[test]
    fn zero_initialized() {
        let p = alloc(64).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(p, 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn negative_size_traps() {
        let err = alloc(-1).unwrap_err();
        assert_eq!(err.message, "rt_alloc: negative size");
    }

    #[test]
    fn hook_failure_reports_out_of_memory() {
        set_alloc_hook(Some(|_| false));
        let err = alloc(16).unwrap_err();
        set_alloc_hook(None);
        assert_eq!(err.message, "out of memory");
    }
}
