//! Program argument store.
//!
//! The driver pushes the command-line tail before running a program;
//! BASIC's `COMMAND$`/argument functions read it back. Pushed strings are
//! retained as byte copies and `get` returns fresh retained handles.

use viper_il::TrapKind;

use crate::error::{RtResult, RtTrap};
use crate::runtime;
use crate::string::{string_bytes, string_from_bytes, RtString};

/// Append one argument.
pub fn args_push(s: RtString) {
    let bytes = string_bytes(s).to_vec();
    runtime::lock().args.push(bytes);
}

/// Number of stored arguments.
pub fn args_count() -> i64 {
    runtime::lock().args.len() as i64
}

/// Retained copy of argument `i`; out-of-range indices trap.
pub fn args_get(i: i64) -> RtResult<RtString> {
    let rt = runtime::lock();
    let Some(bytes) = usize::try_from(i).ok().and_then(|i| rt.args.get(i)) else {
        return Err(RtTrap::new(
            TrapKind::Bounds,
            "rt_args_get: index out of range",
        ));
    };
    let bytes = bytes.clone();
    drop(rt);
    string_from_bytes(&bytes)
}

/// Drop every stored argument.
pub fn args_clear() {
    runtime::lock().args.clear();
}

/// The stored arguments joined with single spaces.
pub fn cmdline() -> RtResult<RtString> {
    let joined = runtime::lock().args.join(&b' ');
    string_from_bytes(&joined)
}

// --- C ABI -----------------------------------------------------------------

#[no_mangle]
pub extern "C" fn rt_args_push(s: RtString) {
    args_push(s);
}

#[no_mangle]
pub extern "C" fn rt_args_count() -> i64 {
    args_count()
}

#[no_mangle]
pub extern "C" fn rt_args_get(i: i64) -> RtString {
    match args_get(i) {
        Ok(s) => s,
        Err(t) => crate::trap_abort(&t),
    }
}

#[no_mangle]
pub extern "C" fn rt_args_clear() {
    args_clear();
}

#[no_mangle]
pub extern "C" fn rt_cmdline() -> RtString {
    match cmdline() {
        Ok(s) => s,
        Err(t) => crate::trap_abort(&t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string::string_unref;

    // One test exercises the whole surface so parallel tests never observe
    // each other's argument store.
    #[test]
    fn push_get_clear() {
        args_clear();
        let a = string_from_bytes(b"alpha").unwrap();
        let b = string_from_bytes(b"beta").unwrap();
        args_push(a);
        args_push(b);
        // The store retains copies; the originals can be released.
        string_unref(a);
        string_unref(b);

        assert_eq!(args_count(), 2);
        let got = args_get(1).unwrap();
        assert_eq!(string_bytes(got), b"beta");
        string_unref(got);

        let joined = cmdline().unwrap();
        assert_eq!(string_bytes(joined), b"alpha beta");
        string_unref(joined);

        let err = args_get(2).unwrap_err();
        assert_eq!(err.message, "rt_args_get: index out of range");
        assert_eq!(args_get(-1).unwrap_err().kind, TrapKind::Bounds);

        args_clear();
        assert_eq!(args_count(), 0);
    }
}
