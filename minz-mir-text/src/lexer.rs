//! Tokenizer for the canonical MIR text form (spec §4.2, §6.3).
//!
//! Comments start with `;` and run to end of line (spec §6.3). Whitespace
//! within a line is insignificant except as a token separator; newlines are
//! significant (each instruction/attribute/local occupies exactly one
//! line, per spec §4.2's grammar sketch), so they are emitted as their own
//! token rather than being swallowed as whitespace.

use crate::error::{Location, ParseError, ParseResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Reg(u32),
    Label(u32),
    Int(i64),
    Str(String),
    Arrow, // ->
    Colon,
    Comma,
    LParen,
    RParen,
    Eq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Shl, // <<
    Shr, // >>
    EqEq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    At, // attribute lines: @smc, @recursive, @interrupt
    Newline,
    Eof,
}

pub struct Lexed {
    pub toks: Vec<Tok>,
    pub locs: Vec<Location>,
    /// Trailing `; comment` text per source line (trimmed, semicolon
    /// stripped), keyed by 1-based line number. The parser attaches these to
    /// whatever instruction/declaration occupied that line so
    /// `Instruction.comment` round-trips through the text form.
    pub line_comments: std::collections::HashMap<usize, String>,
}

fn int_literal(text: &str, line_number: usize) -> ParseResult<i64> {
    text.parse().map_err(|_| ParseError {
        location: Location { line_number },
        message: format!("invalid integer literal '{text}'"),
    })
}

pub fn lex(src: &str) -> ParseResult<Lexed> {
    let mut toks = Vec::new();
    let mut locs = Vec::new();
    let mut line_comments = std::collections::HashMap::new();

    for (line_idx, raw_line) in src.lines().enumerate() {
        let line_number = line_idx + 1;
        let line = match raw_line.split_once(';') {
            Some((code, comment)) => {
                let trimmed = comment.trim();
                if !trimmed.is_empty() {
                    line_comments.insert(line_number, trimmed.to_string());
                }
                code
            }
            None => raw_line,
        };
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0usize;
        let mut any = false;

        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
                continue;
            }
            any = true;

            let tok = match c {
                '(' => {
                    i += 1;
                    Tok::LParen
                }
                ')' => {
                    i += 1;
                    Tok::RParen
                }
                ':' => {
                    i += 1;
                    Tok::Colon
                }
                ',' => {
                    i += 1;
                    Tok::Comma
                }
                '@' => {
                    i += 1;
                    Tok::At
                }
                '+' => {
                    i += 1;
                    Tok::Plus
                }
                '*' => {
                    i += 1;
                    Tok::Star
                }
                '/' => {
                    i += 1;
                    Tok::Slash
                }
                '%' => {
                    i += 1;
                    Tok::Percent
                }
                '&' => {
                    i += 1;
                    Tok::Amp
                }
                '|' => {
                    i += 1;
                    Tok::Pipe
                }
                '^' => {
                    i += 1;
                    Tok::Caret
                }
                '=' if chars.get(i + 1) == Some(&'=') => {
                    i += 2;
                    Tok::EqEq
                }
                '=' => {
                    i += 1;
                    Tok::Eq
                }
                '!' if chars.get(i + 1) == Some(&'=') => {
                    i += 2;
                    Tok::Ne
                }
                '<' if chars.get(i + 1) == Some(&'<') => {
                    i += 2;
                    Tok::Shl
                }
                '<' if chars.get(i + 1) == Some(&'=') => {
                    i += 2;
                    Tok::Le
                }
                '<' => {
                    i += 1;
                    Tok::Lt
                }
                '>' if chars.get(i + 1) == Some(&'>') => {
                    i += 2;
                    Tok::Shr
                }
                '>' if chars.get(i + 1) == Some(&'=') => {
                    i += 2;
                    Tok::Ge
                }
                '>' => {
                    i += 1;
                    Tok::Gt
                }
                '-' if chars.get(i + 1) == Some(&'>') => {
                    i += 2;
                    Tok::Arrow
                }
                '-' if chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                    let start = i;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    let text: String = chars[start..i].iter().collect();
                    Tok::Int(int_literal(&text, line_number)?)
                }
                '-' => {
                    i += 1;
                    Tok::Minus
                }
                '"' => {
                    let mut s = String::new();
                    i += 1;
                    loop {
                        match chars.get(i) {
                            None => return err!(Location { line_number }, "unterminated string literal"),
                            Some('"') => {
                                i += 1;
                                break;
                            }
                            Some('\\') => {
                                i += 1;
                                match chars.get(i) {
                                    Some('n') => s.push('\n'),
                                    Some('t') => s.push('\t'),
                                    Some('"') => s.push('"'),
                                    Some('\\') => s.push('\\'),
                                    Some(other) => s.push(*other),
                                    None => return err!(Location { line_number }, "unterminated escape sequence"),
                                }
                                i += 1;
                            }
                            Some(other) => {
                                s.push(*other);
                                i += 1;
                            }
                        }
                    }
                    Tok::Str(s)
                }
                '.' if chars.get(i + 1) == Some(&'L') => {
                    let start = i + 2;
                    let mut j = start;
                    while j < chars.len() && chars[j].is_ascii_digit() {
                        j += 1;
                    }
                    if j == start {
                        return err!(Location { line_number }, "expected digits in label name");
                    }
                    let n: u32 = chars[start..j].iter().collect::<String>().parse().unwrap();
                    i = j;
                    Tok::Label(n)
                }
                c if c.is_ascii_digit() => {
                    let start = i;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    let text: String = chars[start..i].iter().collect();
                    Tok::Int(int_literal(&text, line_number)?)
                }
                'r' if chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                    let start = i + 1;
                    let mut j = start;
                    while j < chars.len() && chars[j].is_ascii_digit() {
                        j += 1;
                    }
                    let n: u32 = chars[start..j].iter().collect::<String>().parse().unwrap();
                    i = j;
                    Tok::Reg(n)
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let start = i;
                    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                        i += 1;
                    }
                    Tok::Ident(chars[start..i].iter().collect())
                }
                other => return err!(Location { line_number }, "unexpected character '{other}'"),
            };

            toks.push(tok);
            locs.push(Location { line_number });
        }

        if any {
            toks.push(Tok::Newline);
            locs.push(Location { line_number });
        }
    }

    toks.push(Tok::Eof);
    locs.push(Location { line_number: src.lines().count() + 1 });
    Ok(Lexed { toks, locs, line_comments })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_an_arithmetic_instruction_line() {
        let l = lex("  r3 = r1 + r2\n").unwrap();
        assert_eq!(
            l.toks,
            vec![
                Tok::Reg(3),
                Tok::Eq,
                Tok::Reg(1),
                Tok::Plus,
                Tok::Reg(2),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_arrow_from_negative_literal_and_minus() {
        let l = lex("a -> b\nr1 = const -5\nr2 = r1 - r3\n").unwrap();
        assert!(l.toks.contains(&Tok::Arrow));
        assert!(l.toks.contains(&Tok::Int(-5)));
        assert!(l.toks.contains(&Tok::Minus));
    }

    #[test]
    fn captures_trailing_comment_text() {
        let l = lex("r1 = const 2 ; peephole hint\n").unwrap();
        assert_eq!(l.line_comments.get(&1).map(String::as_str), Some("peephole hint"));
    }

    #[test]
    fn lexes_label_and_register_tokens() {
        let l = lex(".L3:\njumpif r1, .L3\n").unwrap();
        assert_eq!(l.toks[0], Tok::Label(3));
        assert_eq!(l.toks[1], Tok::Colon);
    }

    #[test]
    fn string_literal_handles_escapes() {
        let l = lex("r1 = addr s:str_0 ; \"hi\\n\"\n").unwrap();
        assert!(l.toks.iter().any(|t| matches!(t, Tok::Ident(s) if s == "addr")));
    }

    #[test]
    fn mangled_function_names_keep_their_dollar_sign() {
        let l = lex("func f:prog_double$u16 -> u16\n").unwrap();
        assert!(l.toks.iter().any(|t| matches!(t, Tok::Ident(s) if s == "prog_double$u16")));
    }
}
