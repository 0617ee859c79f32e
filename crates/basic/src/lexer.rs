//! BASIC lexer
//!
//! Line-oriented: newlines are significant tokens because statements
//! end at end of line. Keywords and identifiers are case-insensitive
//! and canonicalised to upper case; type suffixes (`% & ! # $`) stay
//! attached to the identifier. `REM` and `'` start comments that run to
//! the end of the line.

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Upper-cased identifier or keyword, suffix included (`N%`, `A$`).
    Ident(String),
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    /// Punctuation or operator, e.g. `+`, `<=`, `(`, `:`.
    Sym(&'static str),
    /// End of a source line.
    Eol,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based source line.
    pub line: u32,
    /// 1-based column.
    pub col: u32,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    for (line_idx, line) in source.lines().enumerate() {
        let line_no = (line_idx + 1) as u32;
        tokenize_line(line, line_no, &mut tokens)?;
        tokens.push(Token {
            kind: TokenKind::Eol,
            line: line_no,
            col: (line.len() + 1) as u32,
        });
    }
    let last_line = source.lines().count() as u32;
    tokens.push(Token {
        kind: TokenKind::Eof,
        line: last_line + 1,
        col: 1,
    });
    Ok(tokens)
}

fn tokenize_line(line: &str, line_no: u32, out: &mut Vec<Token>) -> Result<(), String> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        let col = (i + 1) as u32;
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '\'' => break, // comment to end of line
            '"' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(format!(
                                "line {line_no}: unterminated string literal"
                            ));
                        }
                        Some('"') => {
                            // Doubled quote is an escaped quote.
                            if chars.get(i + 1) == Some(&'"') {
                                text.push('"');
                                i += 2;
                            } else {
                                i += 1;
                                break;
                            }
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                out.push(Token {
                    kind: TokenKind::StrLit(text),
                    line: line_no,
                    col,
                });
            }
            c if c.is_ascii_digit()
                || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let start = i;
                let mut saw_dot = false;
                let mut saw_exp = false;
                while let Some(&d) = chars.get(i) {
                    if d.is_ascii_digit() {
                        i += 1;
                    } else if d == '.' && !saw_dot && !saw_exp {
                        saw_dot = true;
                        i += 1;
                    } else if (d == 'e' || d == 'E')
                        && !saw_exp
                        && chars
                            .get(i + 1)
                            .is_some_and(|n| n.is_ascii_digit() || *n == '-' || *n == '+')
                    {
                        saw_exp = true;
                        i += 2;
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let kind = if saw_dot || saw_exp {
                    TokenKind::FloatLit(
                        text.parse()
                            .map_err(|_| format!("line {line_no}: malformed number '{text}'"))?,
                    )
                } else {
                    TokenKind::IntLit(
                        text.parse()
                            .map_err(|_| format!("line {line_no}: malformed number '{text}'"))?,
                    )
                };
                out.push(Token {
                    kind,
                    line: line_no,
                    col,
                });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|d| d.is_ascii_alphanumeric() || *d == '_')
                {
                    i += 1;
                }
                // Keep a trailing type suffix on the identifier.
                if chars
                    .get(i)
                    .is_some_and(|d| matches!(d, '%' | '&' | '!' | '#' | '$'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect::<String>().to_uppercase();
                if word == "REM" {
                    break;
                }
                out.push(Token {
                    kind: TokenKind::Ident(word),
                    line: line_no,
                    col,
                });
            }
            '<' => {
                let sym = match chars.get(i + 1) {
                    Some('=') => {
                        i += 2;
                        "<="
                    }
                    Some('>') => {
                        i += 2;
                        "<>"
                    }
                    _ => {
                        i += 1;
                        "<"
                    }
                };
                out.push(Token {
                    kind: TokenKind::Sym(sym),
                    line: line_no,
                    col,
                });
            }
            '>' => {
                let sym = if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    ">="
                } else {
                    i += 1;
                    ">"
                };
                out.push(Token {
                    kind: TokenKind::Sym(sym),
                    line: line_no,
                    col,
                });
            }
            '+' | '-' | '*' | '/' | '\\' | '^' | '(' | ')' | ',' | ';' | ':' | '=' => {
                let sym: &'static str = match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    '\\' => "\\",
                    '^' => "^",
                    '(' => "(",
                    ')' => ")",
                    ',' => ",",
                    ';' => ";",
                    ':' => ":",
                    _ => "=",
                };
                i += 1;
                out.push(Token {
                    kind: TokenKind::Sym(sym),
                    line: line_no,
                    col,
                });
            }
            other => {
                return Err(format!(
                    "line {line_no}: unexpected character '{other}'"
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_line() {
        let toks = kinds("10 LET x = 5");
        assert_eq!(
            toks,
            vec![
                TokenKind::IntLit(10),
                TokenKind::Ident("LET".to_string()),
                TokenKind::Ident("X".to_string()),
                TokenKind::Sym("="),
                TokenKind::IntLit(5),
                TokenKind::Eol,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_type_suffixes_stay_attached() {
        let toks = kinds("count% = n& + f! * d# + s$");
        assert!(toks.contains(&TokenKind::Ident("COUNT%".to_string())));
        assert!(toks.contains(&TokenKind::Ident("N&".to_string())));
        assert!(toks.contains(&TokenKind::Ident("F!".to_string())));
        assert!(toks.contains(&TokenKind::Ident("D#".to_string())));
        assert!(toks.contains(&TokenKind::Ident("S$".to_string())));
    }

    #[test]
    fn test_string_with_doubled_quote() {
        let toks = kinds("PRINT \"say \"\"hi\"\"\"");
        assert!(toks.contains(&TokenKind::StrLit("say \"hi\"".to_string())));
    }

    #[test]
    fn test_comments_are_stripped() {
        assert_eq!(
            kinds("x = 1 ' trailing"),
            kinds("x = 1 REM trailing")
        );
        let toks = kinds("REM whole line");
        assert_eq!(toks, vec![TokenKind::Eol, TokenKind::Eof]);
    }

    #[test]
    fn test_numbers() {
        let toks = kinds("1 2.5 1e3 .25");
        assert_eq!(toks[0], TokenKind::IntLit(1));
        assert_eq!(toks[1], TokenKind::FloatLit(2.5));
        assert_eq!(toks[2], TokenKind::FloatLit(1000.0));
        assert_eq!(toks[3], TokenKind::FloatLit(0.25));
    }

    #[test]
    fn test_comparison_operators() {
        let toks = kinds("a <= b <> c >= d");
        assert!(toks.contains(&TokenKind::Sym("<=")));
        assert!(toks.contains(&TokenKind::Sym("<>")));
        assert!(toks.contains(&TokenKind::Sym(">=")));
    }

    #[test]
    fn test_unterminated_string_errors() {
        assert!(tokenize("PRINT \"oops").is_err());
    }
}
