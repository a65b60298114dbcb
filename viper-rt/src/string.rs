//! Reference-counted runtime strings with small-string optimization.
//!
//! A handle is a raw pointer to an [`RtStr`]; payloads of up to
//! [`SSO_CAPACITY`] bytes live inline, longer ones spill to the heap.
//! Literal handles created by `rt_const_cstr` alias foreign storage and are
//! never reference counted; releasing one is a no-op. A null handle reads
//! as the empty string everywhere.

use std::ffi::c_char;

use viper_il::TrapKind;

use crate::error::{RtResult, RtTrap};
use crate::runtime;

/// Inline capacity of the small-string representation.
pub const SSO_CAPACITY: usize = 32;

/// Sentinel refcount marking a non-refcounted literal handle.
const REFS_LITERAL: i64 = -1;

/// Heap-allocated runtime string object.
#[derive(Debug)]
pub struct RtStr {
    refs: i64,
    repr: Repr,
}

#[derive(Debug)]
enum Repr {
    Inline { len: u8, buf: [u8; SSO_CAPACITY] },
    Heap(Vec<u8>),
    Literal { ptr: *const u8, len: usize },
}

/// Raw string handle carried in VM slots and across the C ABI.
pub type RtString = *mut RtStr;

fn new_handle(refs: i64, repr: Repr) -> RtString {
    Box::into_raw(Box::new(RtStr { refs, repr }))
}

/// Allocate a runtime string holding `bytes`. Consults the allocation hook
/// and traps `"rt_string_wrap: alloc"` when it refuses.
pub fn string_from_bytes(bytes: &[u8]) -> RtResult<RtString> {
    runtime::alloc_check(bytes.len(), "rt_string_wrap: alloc")?;
    let repr = if bytes.len() <= SSO_CAPACITY {
        let mut buf = [0u8; SSO_CAPACITY];
        buf[..bytes.len()].copy_from_slice(bytes);
        Repr::Inline {
            len: bytes.len() as u8,
            buf,
        }
    } else {
        Repr::Heap(bytes.to_vec())
    };
    Ok(new_handle(1, repr))
}

/// Wrap foreign storage as a literal handle; never refcounted, never freed.
///
/// # Safety
/// `ptr` must stay valid and unchanged for the lifetime of the handle.
pub unsafe fn string_literal(ptr: *const u8, len: usize) -> RtString {
    new_handle(REFS_LITERAL, Repr::Literal { ptr, len })
}

/// Payload bytes of a handle; a null handle is the empty string.
pub fn string_bytes<'a>(s: RtString) -> &'a [u8] {
    if s.is_null() {
        return &[];
    }
    let obj = unsafe { &*s };
    match &obj.repr {
        Repr::Inline { len, buf } => &buf[..*len as usize],
        Repr::Heap(v) => v.as_slice(),
        Repr::Literal { ptr, len } => unsafe { std::slice::from_raw_parts(*ptr, *len) },
    }
}

/// Length in bytes, clamped to the `i64` range.
pub fn string_len(s: RtString) -> i64 {
    i64::try_from(string_bytes(s).len()).unwrap_or(i64::MAX)
}

/// Bump the refcount. Literals and null handles are untouched.
pub fn string_ref(s: RtString) {
    if s.is_null() {
        return;
    }
    let obj = unsafe { &mut *s };
    if obj.refs != REFS_LITERAL {
        obj.refs += 1;
    }
}

/// Drop one reference, freeing the object when the count reaches zero.
/// Releasing a literal or null handle is a no-op.
pub fn string_unref(s: RtString) {
    if s.is_null() {
        return;
    }
    let obj = unsafe { &mut *s };
    if obj.refs == REFS_LITERAL {
        return;
    }
    obj.refs -= 1;
    if obj.refs == 0 {
        drop(unsafe { Box::from_raw(s) });
    }
}

fn trap(kind: TrapKind, msg: &str) -> RtTrap {
    RtTrap::new(kind, msg)
}

/// Concatenate two strings into a fresh handle.
pub fn concat(a: RtString, b: RtString) -> RtResult<RtString> {
    let mut out = Vec::with_capacity(string_bytes(a).len() + string_bytes(b).len());
    out.extend_from_slice(string_bytes(a));
    out.extend_from_slice(string_bytes(b));
    string_from_bytes(&out)
}

/// 0-based substring with clamping; negative start or length traps.
pub fn substr(s: RtString, start: i64, len: i64) -> RtResult<RtString> {
    if start < 0 {
        return Err(trap(TrapKind::Bounds, "rt_substr: negative start"));
    }
    if len < 0 {
        return Err(trap(TrapKind::Bounds, "rt_substr: negative length"));
    }
    let bytes = string_bytes(s);
    let start = (start as usize).min(bytes.len());
    let end = start.saturating_add(len as usize).min(bytes.len());
    string_from_bytes(&bytes[start..end])
}

/// Byte-wise equality.
pub fn str_eq(a: RtString, b: RtString) -> bool {
    string_bytes(a) == string_bytes(b)
}

/// `LEFT$(s, n)`.
pub fn left(s: RtString, n: i64) -> RtResult<RtString> {
    if n < 0 {
        return Err(trap(TrapKind::Bounds, "LEFT$: count must be >= 0"));
    }
    let bytes = string_bytes(s);
    string_from_bytes(&bytes[..(n as usize).min(bytes.len())])
}

/// `RIGHT$(s, n)`.
pub fn right(s: RtString, n: i64) -> RtResult<RtString> {
    if n < 0 {
        return Err(trap(TrapKind::Bounds, "RIGHT$: count must be >= 0"));
    }
    let bytes = string_bytes(s);
    let skip = bytes.len().saturating_sub(n as usize);
    string_from_bytes(&bytes[skip..])
}

/// `MID$(s, start)`: 1-based tail. Start past the end yields the empty
/// string, not a trap.
pub fn mid2(s: RtString, start: i64) -> RtResult<RtString> {
    if start < 1 {
        return Err(trap(TrapKind::Bounds, "MID$: start must be >= 1"));
    }
    let bytes = string_bytes(s);
    let from = ((start - 1) as usize).min(bytes.len());
    string_from_bytes(&bytes[from..])
}

/// `MID$(s, start, len)`.
pub fn mid3(s: RtString, start: i64, len: i64) -> RtResult<RtString> {
    if start < 1 {
        return Err(trap(TrapKind::Bounds, "MID$: start must be >= 1"));
    }
    if len < 0 {
        return Err(trap(TrapKind::Bounds, "MID$: length must be >= 0"));
    }
    let bytes = string_bytes(s);
    let from = ((start - 1) as usize).min(bytes.len());
    let to = from.saturating_add(len as usize).min(bytes.len());
    string_from_bytes(&bytes[from..to])
}

/// Strip leading ASCII whitespace.
pub fn ltrim(s: RtString) -> RtResult<RtString> {
    let bytes = string_bytes(s);
    let from = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    string_from_bytes(&bytes[from..])
}

/// Strip trailing ASCII whitespace.
pub fn rtrim(s: RtString) -> RtResult<RtString> {
    let bytes = string_bytes(s);
    let to = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    string_from_bytes(&bytes[..to])
}

/// Strip whitespace on both ends.
pub fn trim(s: RtString) -> RtResult<RtString> {
    let t = ltrim(s)?;
    let out = rtrim(t);
    string_unref(t);
    out
}

/// ASCII uppercase copy.
pub fn ucase(s: RtString) -> RtResult<RtString> {
    string_from_bytes(&string_bytes(s).to_ascii_uppercase())
}

/// ASCII lowercase copy.
pub fn lcase(s: RtString) -> RtResult<RtString> {
    string_from_bytes(&string_bytes(s).to_ascii_lowercase())
}

/// `CHR$(code)`: one-byte string; code outside `[0, 255]` traps.
pub fn chr(code: i64) -> RtResult<RtString> {
    if !(0..=255).contains(&code) {
        return Err(trap(TrapKind::DomainError, "CHR$: code must be 0-255"));
    }
    string_from_bytes(&[code as u8])
}

/// `ASC(s)`: first byte; the empty string traps.
pub fn asc(s: RtString) -> RtResult<i64> {
    match string_bytes(s).first() {
        Some(b) => Ok(*b as i64),
        None => Err(trap(TrapKind::DomainError, "ASC: empty string")),
    }
}

/// `INSTR(hay, needle)`: 1-based position of the first match, 0 when
/// absent; an empty needle matches at position 1.
pub fn instr2(hay: RtString, needle: RtString) -> i64 {
    instr_from(1, hay, needle)
}

/// `INSTR(start, hay, needle)` with a 1-based start; `start < 1` traps.
pub fn instr3(start: i64, hay: RtString, needle: RtString) -> RtResult<i64> {
    if start < 1 {
        return Err(trap(TrapKind::Bounds, "INSTR: start must be >= 1"));
    }
    Ok(instr_from(start, hay, needle))
}

fn instr_from(start: i64, hay: RtString, needle: RtString) -> i64 {
    let hay = string_bytes(hay);
    let needle = string_bytes(needle);
    let from = (start - 1) as usize;
    if from > hay.len() {
        return 0;
    }
    if needle.is_empty() {
        return start;
    }
    hay[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map_or(0, |i| (from + i + 1) as i64)
}

// --- C ABI -----------------------------------------------------------------

fn ok_or_abort<T>(r: RtResult<T>) -> T {
    match r {
        Ok(v) => v,
        Err(t) => crate::trap_abort(&t),
    }
}

#[no_mangle]
pub extern "C" fn rt_string_from_bytes(ptr: *const u8, len: i64) -> RtString {
    let bytes = if ptr.is_null() || len <= 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(ptr, len as usize) }
    };
    ok_or_abort(string_from_bytes(bytes))
}

#[no_mangle]
pub extern "C" fn rt_string_ref(s: RtString) {
    string_ref(s);
}

#[no_mangle]
pub extern "C" fn rt_string_unref(s: RtString) {
    string_unref(s);
}

#[no_mangle]
pub extern "C" fn rt_const_cstr(ptr: *const c_char) -> RtString {
    if ptr.is_null() {
        return unsafe { string_literal(std::ptr::null(), 0) };
    }
    let len = unsafe { std::ffi::CStr::from_ptr(ptr) }.to_bytes().len();
    unsafe { string_literal(ptr.cast(), len) }
}

#[no_mangle]
pub extern "C" fn rt_len(s: RtString) -> i64 {
    string_len(s)
}

#[no_mangle]
pub extern "C" fn rt_concat(a: RtString, b: RtString) -> RtString {
    ok_or_abort(concat(a, b))
}

#[no_mangle]
pub extern "C" fn rt_substr(s: RtString, start: i64, len: i64) -> RtString {
    ok_or_abort(substr(s, start, len))
}

#[no_mangle]
pub extern "C" fn rt_str_eq(a: RtString, b: RtString) -> i64 {
    str_eq(a, b) as i64
}

#[no_mangle]
pub extern "C" fn rt_left(s: RtString, n: i64) -> RtString {
    ok_or_abort(left(s, n))
}

#[no_mangle]
pub extern "C" fn rt_right(s: RtString, n: i64) -> RtString {
    ok_or_abort(right(s, n))
}

#[no_mangle]
pub extern "C" fn rt_mid2(s: RtString, start: i64) -> RtString {
    ok_or_abort(mid2(s, start))
}

#[no_mangle]
pub extern "C" fn rt_mid3(s: RtString, start: i64, len: i64) -> RtString {
    ok_or_abort(mid3(s, start, len))
}

#[no_mangle]
pub extern "C" fn rt_ltrim(s: RtString) -> RtString {
    ok_or_abort(ltrim(s))
}

#[no_mangle]
pub extern "C" fn rt_rtrim(s: RtString) -> RtString {
    ok_or_abort(rtrim(s))
}

#[no_mangle]
pub extern "C" fn rt_trim(s: RtString) -> RtString {
    ok_or_abort(trim(s))
}

#[no_mangle]
pub extern "C" fn rt_ucase(s: RtString) -> RtString {
    ok_or_abort(ucase(s))
}

#[no_mangle]
pub extern "C" fn rt_lcase(s: RtString) -> RtString {
    ok_or_abort(lcase(s))
}

#[no_mangle]
pub extern "C" fn rt_str_chr(code: i64) -> RtString {
    ok_or_abort(chr(code))
}

#[no_mangle]
pub extern "C" fn rt_str_asc(s: RtString) -> i64 {
    ok_or_abort(asc(s))
}

#[no_mangle]
pub extern "C" fn rt_instr2(hay: RtString, needle: RtString) -> i64 {
    instr2(hay, needle)
}

#[no_mangle]
pub extern "C" fn rt_instr3(start: i64, hay: RtString, needle: RtString) -> i64 {
    ok_or_abort(instr3(start, hay, needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> RtString {
        string_from_bytes(text.as_bytes()).unwrap()
    }

    #[test]
    fn sso_boundary() {
        let short = s(&"a".repeat(SSO_CAPACITY));
        let long = s(&"b".repeat(SSO_CAPACITY + 1));
        assert!(matches!(unsafe { &(*short).repr }, Repr::Inline { .. }));
        assert!(matches!(unsafe { &(*long).repr }, Repr::Heap(_)));
        assert_eq!(string_len(short), SSO_CAPACITY as i64);
        assert_eq!(string_len(long), SSO_CAPACITY as i64 + 1);
        string_unref(short);
        string_unref(long);
    }

    #[test]
    fn refcount_balances() {
        let h = s("hello");
        string_ref(h);
        string_unref(h);
        assert_eq!(string_bytes(h), b"hello");
        string_unref(h);
    }

    #[test]
    fn literal_release_is_noop() {
        static TEXT: &[u8] = b"static text";
        let lit = unsafe { string_literal(TEXT.as_ptr(), TEXT.len()) };
        string_unref(lit);
        string_unref(lit);
        assert_eq!(string_bytes(lit), TEXT);
    }

    #[test]
    fn null_handle_is_empty() {
        assert_eq!(string_len(std::ptr::null_mut()), 0);
        assert_eq!(string_bytes(std::ptr::null_mut()), b"");
    }

    #[test]
    fn mid_semantics() {
        let h = s("BASIC");
        assert_eq!(string_bytes(mid2(h, 3).unwrap()), b"SIC");
        assert_eq!(string_bytes(mid3(h, 2, 3).unwrap()), b"ASI");
        // Start past the end is empty, not a trap.
        assert_eq!(string_bytes(mid2(h, 99).unwrap()), b"");
        let err = mid3(h, 0, 1).unwrap_err();
        assert_eq!(err.message, "MID$: start must be >= 1");
        let err = mid3(h, 1, -1).unwrap_err();
        assert_eq!(err.message, "MID$: length must be >= 0");
        string_unref(h);
    }

    #[test]
    fn chr_bounds() {
        assert_eq!(string_bytes(chr(65).unwrap()), b"A");
        let err = chr(256).unwrap_err();
        assert_eq!(err.message, "CHR$: code must be 0-255");
        assert_eq!(chr(-1).unwrap_err().message, "CHR$: code must be 0-255");
    }

    #[test]
    fn instr_matches_basic() {
        let hay = s("hello world");
        let needle = s("o");
        assert_eq!(instr2(hay, needle), 5);
        assert_eq!(instr3(6, hay, needle).unwrap(), 8);
        assert_eq!(instr3(9, hay, needle).unwrap(), 0);
        assert_eq!(
            instr3(0, hay, needle).unwrap_err().message,
            "INSTR: start must be >= 1"
        );
        let empty = s("");
        assert_eq!(instr2(hay, empty), 1);
        string_unref(hay);
        string_unref(needle);
        string_unref(empty);
    }

    #[test]
    fn trim_family() {
        let h = s("  spaced\t");
        assert_eq!(string_bytes(ltrim(h).unwrap()), b"spaced\t");
        assert_eq!(string_bytes(rtrim(h).unwrap()), b"  spaced");
        assert_eq!(string_bytes(trim(h).unwrap()), b"spaced");
        string_unref(h);
    }

    #[test]
    fn case_conversion() {
        let h = s("MiXeD 123");
        assert_eq!(string_bytes(ucase(h).unwrap()), b"MIXED 123");
        assert_eq!(string_bytes(lcase(h).unwrap()), b"mixed 123");
        string_unref(h);
    }
}
