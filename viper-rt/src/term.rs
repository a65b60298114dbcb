//! Terminal color helper for the 16-color BASIC palette.

use std::io::Write;

/// ANSI escape selecting `fg`/`bg` from the 16-color palette. `-1` leaves
/// a channel unchanged; 8-15 map to the bright SGR ranges (90-97/100-107)
/// rather than 256-color escapes. Out-of-range values yield no escape.
pub fn color_escape(fg: i32, bg: i32) -> Option<String> {
    let mut codes: Vec<u8> = Vec::new();
    match fg {
        -1 => {}
        0..=7 => codes.push(30 + fg as u8),
        8..=15 => codes.push(90 + (fg - 8) as u8),
        _ => return None,
    }
    match bg {
        -1 => {}
        0..=7 => codes.push(40 + bg as u8),
        8..=15 => codes.push(100 + (bg - 8) as u8),
        _ => return None,
    }
    if codes.is_empty() {
        return None;
    }
    let joined = codes
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(";");
    Some(format!("\x1b[{joined}m"))
}

/// True when `VIPERTUI_NO_TTY=1` disables TTY-dependent behavior for
/// headless test runs.
pub fn tty_disabled() -> bool {
    std::env::var("VIPERTUI_NO_TTY").is_ok_and(|v| v == "1")
}

#[no_mangle]
pub extern "C" fn rt_term_color_i32(fg: i32, bg: i32) {
    if tty_disabled() {
        return;
    }
    if let Some(escape) = color_escape(fg, bg) {
        let _ = std::io::stdout().write_all(escape.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(7, 0, "\x1b[37;40m")]
    #[case(15, -1, "\x1b[97m")]
    #[case(-1, 12, "\x1b[104m")]
    #[case(1, 9, "\x1b[31;101m")]
    fn basic_palette_codes(#[case] fg: i32, #[case] bg: i32, #[case] expected: &str) {
        assert_eq!(color_escape(fg, bg).unwrap(), expected);
    }

    #[test]
    fn unchanged_and_out_of_range() {
        assert_eq!(color_escape(-1, -1), None);
        assert_eq!(color_escape(16, 0), None);
        assert_eq!(color_escape(0, 99), None);
    }

    #[test]
    fn never_uses_256_color_escapes() {
        for fg in 0..16 {
            let escape = color_escape(fg, -1).unwrap();
            assert!(!escape.contains("38;5"), "256-color escape for {fg}");
        }
    }
}
