//! Console printing, line input and the BASIC file-channel table.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};

use crate::convert::float_format;
use crate::error::{RtError, RtErrorKind, RtResult, RT_ERROR_NONE};
use crate::runtime;
use crate::string::{string_bytes, string_from_bytes, RtString};

/// Write string payload bytes verbatim.
pub fn write_str(w: &mut dyn Write, s: RtString) {
    let _ = w.write_all(string_bytes(s));
}

/// Write a decimal integer.
pub fn write_i64(w: &mut dyn Write, v: i64) {
    let _ = write!(w, "{v}");
}

/// Write a float in canonical form.
pub fn write_f64(w: &mut dyn Write, v: f64) {
    let _ = w.write_all(float_format(v).as_bytes());
}

/// Read one line, growing dynamically. Strips the trailing `\n` and a
/// preceding `\r`, so LF, CRLF and missing-final-newline files all read
/// the same. EOF with no pending bytes yields the empty string.
pub fn input_line_from(r: &mut dyn BufRead) -> RtResult<RtString> {
    let mut buf = Vec::new();
    loop {
        runtime::alloc_check(buf.len() + 128, "out of memory")?;
        let chunk = match r.fill_buf() {
            Ok(chunk) => chunk,
            Err(_) => break,
        };
        if chunk.is_empty() {
            break;
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                buf.extend_from_slice(&chunk[..pos]);
                r.consume(pos + 1);
                break;
            }
            None => {
                let len = chunk.len();
                buf.extend_from_slice(chunk);
                r.consume(len);
            }
        }
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    string_from_bytes(&buf)
}

/// Read one line from standard input.
pub fn input_line() -> RtResult<RtString> {
    let stdin = std::io::stdin();
    input_line_from(&mut stdin.lock())
}

/// BASIC `OPEN` modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `FOR INPUT`: text read; the file must exist.
    Input,
    /// `FOR OUTPUT`: text write, truncating.
    Output,
    /// `FOR APPEND`: text write at the end.
    Append,
    /// `FOR BINARY`: byte read/write, created on demand.
    Binary,
    /// `FOR RANDOM`: record read/write, created on demand.
    Random,
}

impl OpenMode {
    /// Decode the mode ordinal used across the ABI.
    pub fn from_i64(v: i64) -> Option<Self> {
        Some(match v {
            0 => OpenMode::Input,
            1 => OpenMode::Output,
            2 => OpenMode::Append,
            3 => OpenMode::Binary,
            4 => OpenMode::Random,
            _ => return None,
        })
    }
}

/// One open file channel.
pub(crate) struct Channel {
    io: ChannelIo,
}

enum ChannelIo {
    Reader(BufReader<File>),
    Writer(File),
}

fn os_error(e: &std::io::Error) -> RtError {
    let kind = match e.kind() {
        std::io::ErrorKind::NotFound => RtErrorKind::FileNotFound,
        _ => RtErrorKind::RuntimeError,
    };
    RtError {
        kind,
        code: e.raw_os_error().unwrap_or(0),
    }
}

/// Open `path` on `channel`. Missing files surface `Err_FileNotFound`;
/// reusing an open channel or passing a bad mode is `Err_InvalidOperation`.
pub fn open_channel(path: &[u8], mode: i64, channel: i64) -> RtError {
    let Some(mode) = OpenMode::from_i64(mode) else {
        return RtError::new(RtErrorKind::InvalidOperation);
    };
    let Ok(path) = std::str::from_utf8(path) else {
        return RtError::new(RtErrorKind::InvalidOperation);
    };
    let mut rt = runtime::lock();
    if rt.channels.contains_key(&channel) {
        return RtError::new(RtErrorKind::InvalidOperation);
    }
    let opened = match mode {
        OpenMode::Input => File::open(path).map(|f| ChannelIo::Reader(BufReader::new(f))),
        OpenMode::Output => File::create(path).map(ChannelIo::Writer),
        OpenMode::Append => OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(ChannelIo::Writer),
        OpenMode::Binary | OpenMode::Random => OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map(ChannelIo::Writer),
    };
    match opened {
        Ok(io) => {
            rt.channels.insert(channel, Channel { io });
            RT_ERROR_NONE
        }
        Err(e) => os_error(&e),
    }
}

/// Close `channel`; closing one that is not open is `Err_InvalidOperation`.
pub fn close_channel(channel: i64) -> RtError {
    match runtime::lock().channels.remove(&channel) {
        Some(_) => RT_ERROR_NONE,
        None => RtError::new(RtErrorKind::InvalidOperation),
    }
}

/// Write string bytes to an open output channel.
pub fn write_channel(channel: i64, s: RtString) -> RtError {
    let mut rt = runtime::lock();
    match rt.channels.get_mut(&channel) {
        Some(Channel {
            io: ChannelIo::Writer(f),
        }) => match f.write_all(string_bytes(s)) {
            Ok(()) => RT_ERROR_NONE,
            Err(e) => os_error(&e),
        },
        Some(_) => RtError::new(RtErrorKind::InvalidOperation),
        None => RtError::new(RtErrorKind::InvalidOperation),
    }
}

/// Read one line from an open input channel.
pub fn line_input_channel(channel: i64) -> Result<RtString, RtError> {
    let mut rt = runtime::lock();
    match rt.channels.get_mut(&channel) {
        Some(Channel {
            io: ChannelIo::Reader(r),
        }) => input_line_from(r).map_err(|_| RtError::new(RtErrorKind::RuntimeError)),
        _ => Err(RtError::new(RtErrorKind::InvalidOperation)),
    }
}

/// True at end of file; unopened or write channels read as exhausted.
pub fn eof_channel(channel: i64) -> bool {
    let mut rt = runtime::lock();
    match rt.channels.get_mut(&channel) {
        Some(Channel {
            io: ChannelIo::Reader(r),
        }) => r.fill_buf().map(|b| b.is_empty()).unwrap_or(true),
        _ => true,
    }
}

// --- C ABI -----------------------------------------------------------------

#[no_mangle]
pub extern "C" fn rt_print_str(s: RtString) {
    write_str(&mut std::io::stdout(), s);
}

#[no_mangle]
pub extern "C" fn rt_print_i64(v: i64) {
    write_i64(&mut std::io::stdout(), v);
}

#[no_mangle]
pub extern "C" fn rt_print_f64(v: f64) {
    write_f64(&mut std::io::stdout(), v);
}

#[no_mangle]
pub extern "C" fn rt_input_line() -> RtString {
    match input_line() {
        Ok(s) => s,
        Err(t) => crate::trap_abort(&t),
    }
}

#[no_mangle]
pub extern "C" fn rt_open_err_vstr(path: RtString, mode: i64, channel: i64) -> RtError {
    open_channel(string_bytes(path), mode, channel)
}

#[no_mangle]
pub extern "C" fn rt_close_err(channel: i64) -> RtError {
    close_channel(channel)
}

#[no_mangle]
pub extern "C" fn rt_write_ch_err(channel: i64, s: RtString) -> RtError {
    write_channel(channel, s)
}

#[no_mangle]
pub extern "C" fn rt_line_input_ch_err(channel: i64, out: *mut RtString) -> RtError {
    match line_input_channel(channel) {
        Ok(s) => {
            if !out.is_null() {
                unsafe { *out = s };
            }
            RT_ERROR_NONE
        }
        Err(e) => e,
    }
}

#[no_mangle]
pub extern "C" fn rt_eof_ch(channel: i64) -> i64 {
    eof_channel(channel) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string::string_unref;
    use std::io::Cursor;

    fn line(input: &[u8]) -> Vec<u8> {
        let mut cur = Cursor::new(input.to_vec());
        let h = input_line_from(&mut cur).unwrap();
        let out = string_bytes(h).to_vec();
        string_unref(h);
        out
    }

    #[test]
    fn long_line_with_and_without_newline() {
        let long = vec![b'x'; 1500];
        let mut with_nl = long.clone();
        with_nl.push(b'\n');
        assert_eq!(line(&with_nl), long);
        assert_eq!(line(&long), long);
    }

    #[test]
    fn crlf_is_stripped() {
        let mut input = vec![b'y'; 1500];
        input.extend_from_slice(b"\r\n");
        assert_eq!(line(&input), vec![b'y'; 1500]);
        assert_eq!(line(b"a\r\nb\n"), b"a");
    }

    #[test]
    fn eof_reads_empty() {
        assert_eq!(line(b""), b"");
    }

    #[test]
    fn channel_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path_bytes = path.to_str().unwrap().as_bytes();

        assert!(open_channel(path_bytes, 1, 71).is_ok());
        let text = string_from_bytes(b"first\nsecond\n").unwrap();
        assert!(write_channel(71, text).is_ok());
        string_unref(text);
        assert!(close_channel(71).is_ok());

        assert!(open_channel(path_bytes, 0, 71).is_ok());
        let first = line_input_channel(71).unwrap();
        assert_eq!(string_bytes(first), b"first");
        string_unref(first);
        assert!(!eof_channel(71));
        let second = line_input_channel(71).unwrap();
        assert_eq!(string_bytes(second), b"second");
        string_unref(second);
        assert!(eof_channel(71));
        assert!(close_channel(71).is_ok());
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = open_channel(b"/definitely/not/here.txt", 0, 72);
        assert_eq!(err.kind, RtErrorKind::FileNotFound);
    }

    #[test]
    fn closing_unopened_channel_is_invalid() {
        let err = close_channel(73);
        assert_eq!(err.kind, RtErrorKind::InvalidOperation);
    }
}
