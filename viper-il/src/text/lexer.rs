//! Line tokenizer for the textual IL.

/// A single token within one line of IL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tok<'a> {
    /// Single punctuation character: one of `( ) , = : { }`.
    Punct(char),
    /// The `->` arrow.
    Arrow,
    /// A double-quoted string literal with escapes resolved.
    Str(Vec<u8>),
    /// Any other whitespace-delimited word (identifiers, sigils, numbers,
    /// mnemonics).
    Word(&'a str),
}

/// Whitespace-insensitive token cursor over a single line.
///
/// Comment tails (`// ...`) are stripped unless they start inside a string
/// literal. Errors carry a message only; the caller owns the line number.
pub(crate) struct LineLexer<'a> {
    rest: &'a str,
    peeked: Option<Option<Result<Tok<'a>, String>>>,
}

const PUNCT: &[char] = &['(', ')', ',', '=', ':', '{', '}'];

impl<'a> LineLexer<'a> {
    pub(crate) fn new(line: &'a str) -> Self {
        LineLexer {
            rest: line,
            peeked: None,
        }
    }

    /// Next token, or `None` at end of line.
    pub(crate) fn next(&mut self) -> Option<Result<Tok<'a>, String>> {
        if let Some(peeked) = self.peeked.take() {
            return peeked;
        }
        self.lex()
    }

    /// Peek without consuming.
    pub(crate) fn peek(&mut self) -> Option<&Result<Tok<'a>, String>> {
        if self.peeked.is_none() {
            let tok = self.lex();
            self.peeked = Some(tok);
        }
        self.peeked.as_ref().and_then(|t| t.as_ref())
    }

    /// True when only whitespace (or a comment) remains.
    pub(crate) fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn lex(&mut self) -> Option<Result<Tok<'a>, String>> {
        self.rest = self.rest.trim_start();
        if self.rest.is_empty() || self.rest.starts_with("//") {
            return None;
        }
        if let Some(stripped) = self.rest.strip_prefix("->") {
            self.rest = stripped;
            return Some(Ok(Tok::Arrow));
        }
        let c = self.rest.chars().next()?;
        if PUNCT.contains(&c) {
            self.rest = &self.rest[c.len_utf8()..];
            return Some(Ok(Tok::Punct(c)));
        }
        if c == '"' {
            return Some(self.lex_string());
        }
        let end = self
            .rest
            .find(|ch: char| ch.is_whitespace() || PUNCT.contains(&ch) || ch == '"')
            .unwrap_or(self.rest.len());
        let (word, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(Ok(Tok::Word(word)))
    }

    fn lex_string(&mut self) -> Result<Tok<'a>, String> {
        let mut bytes = Vec::new();
        let mut chars = self.rest[1..].char_indices();
        loop {
            let (i, c) = match chars.next() {
                Some(x) => x,
                None => return Err("unterminated string literal".to_string()),
            };
            match c {
                '"' => {
                    self.rest = &self.rest[1 + i + 1..];
                    return Ok(Tok::Str(bytes));
                }
                '\\' => {
                    let (_, esc) = chars
                        .next()
                        .ok_or_else(|| "unterminated string literal".to_string())?;
                    match esc {
                        'n' => bytes.push(b'\n'),
                        't' => bytes.push(b'\t'),
                        'r' => bytes.push(b'\r'),
                        '0' => bytes.push(0),
                        '\\' => bytes.push(b'\\'),
                        '"' => bytes.push(b'"'),
                        'x' => {
                            let hi = chars.next().map(|(_, c)| c);
                            let lo = chars.next().map(|(_, c)| c);
                            let byte = match (hi.and_then(|c| c.to_digit(16)), lo.and_then(|c| c.to_digit(16)))
                            {
                                (Some(h), Some(l)) => (h * 16 + l) as u8,
                                _ => return Err("bad \\x escape".to_string()),
                            };
                            bytes.push(byte);
                        }
                        other => return Err(format!("bad escape '\\{other}'")),
                    }
                }
                other => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<Tok<'_>> {
        let mut lx = LineLexer::new(line);
        let mut out = Vec::new();
        while let Some(tok) = lx.next() {
            out.push(tok.unwrap());
        }
        out
    }

    #[test]
    fn instruction_line() {
        assert_eq!(
            words("%t0 = add 40, 2"),
            vec![
                Tok::Word("%t0"),
                Tok::Punct('='),
                Tok::Word("add"),
                Tok::Word("40"),
                Tok::Punct(','),
                Tok::Word("2"),
            ]
        );
    }

    #[test]
    fn arrow_and_negative_number() {
        assert_eq!(
            words("ret -7 -> i64"),
            vec![Tok::Word("ret"), Tok::Word("-7"), Tok::Arrow, Tok::Word("i64")]
        );
    }

    #[test]
    fn comment_tail_is_dropped() {
        assert_eq!(words("trap // boom"), vec![Tok::Word("trap")]);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            words(r#""a\n\x41\"b""#),
            vec![Tok::Str(b"a\nA\"b".to_vec())]
        );
    }
}
