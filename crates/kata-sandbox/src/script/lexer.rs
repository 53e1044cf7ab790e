//! Tokenizer for the script dialect.

use super::ScriptFault;

/// Multi-character punctuators come first so the longest match wins.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "**=", "...", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "=>", "++", "--",
    "+=", "-=", "*=", "/=", "%=", "**", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "!", "?", ":", "=", ".",
];

/// A piece of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    /// Literal text, escapes already decoded.
    Text(String),
    /// Source of an embedded `${...}` expression.
    Expr(String),
}

/// Token kinds. Keywords are lexed as identifiers.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Num(f64),
    Str(String),
    Template(Vec<TemplateChunk>),
    Ident(String),
    Punct(&'static str),
    Eof,
}

/// A token plus whether a line break preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub nl_before: bool,
}

/// Splits `source` into tokens, ending with [`Tok::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptFault> {
    Lexer {
        chars: source.chars().collect(),
        pos: 0,
    }
    .run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

fn invalid() -> ScriptFault {
    ScriptFault::syntax("Invalid or unexpected token")
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<Vec<Token>, ScriptFault> {
        let mut tokens = Vec::new();
        let mut nl_before = false;
        loop {
            nl_before |= self.skip_trivia()?;
            let Some(ch) = self.peek(0) else {
                tokens.push(Token {
                    tok: Tok::Eof,
                    nl_before: true,
                });
                return Ok(tokens);
            };
            let tok = if ch.is_ascii_digit()
                || (ch == '.' && self.peek(1).is_some_and(|c| c.is_ascii_digit()))
            {
                self.number()?
            } else if ch == '"' || ch == '\'' {
                Tok::Str(self.string(ch)?)
            } else if ch == '`' {
                Tok::Template(self.template()?)
            } else if ch.is_alphabetic() || ch == '_' || ch == '$' {
                let start = self.pos;
                while self
                    .peek(0)
                    .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
                {
                    self.pos += 1;
                }
                Tok::Ident(self.chars[start..self.pos].iter().collect())
            } else {
                self.punct()?
            };
            tokens.push(Token { tok, nl_before });
            nl_before = false;
        }
    }

    /// Skips whitespace and comments, returning `true` if a newline was seen.
    fn skip_trivia(&mut self) -> Result<bool, ScriptFault> {
        let mut newline = false;
        while let Some(ch) = self.peek(0) {
            if ch == '\n' || ch == '\r' || ch == '\u{2028}' || ch == '\u{2029}' {
                newline = true;
                self.pos += 1;
            } else if ch.is_whitespace() || ch == '\u{feff}' {
                self.pos += 1;
            } else if ch == '/' && self.peek(1) == Some('/') {
                while self.peek(0).is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
            } else if ch == '/' && self.peek(1) == Some('*') {
                self.pos += 2;
                loop {
                    match self.peek(0) {
                        None => return Err(invalid()),
                        Some('*') if self.peek(1) == Some('/') => {
                            self.pos += 2;
                            break;
                        }
                        Some(c) => {
                            newline |= c == '\n';
                            self.pos += 1;
                        }
                    }
                }
            } else {
                break;
            }
        }
        Ok(newline)
    }

    fn number(&mut self) -> Result<Tok, ScriptFault> {
        let start = self.pos;
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X' | 'b' | 'B' | 'o' | 'O')) {
            let radix = match self.peek(1) {
                Some('x' | 'X') => 16,
                Some('b' | 'B') => 2,
                _ => 8,
            };
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek(0).is_some_and(|c| c.is_digit(radix) || c == '_') {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let value = u64::from_str_radix(&digits, radix).map_err(|_| invalid())?;
            #[allow(clippy::cast_precision_loss)]
            let value = value as f64;
            return Ok(Tok::Num(value));
        }
        while self.peek(0).is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
        if self.peek(0) == Some('.') {
            self.pos += 1;
            while self.peek(0).is_some_and(|c| c.is_ascii_digit() || c == '_') {
                self.pos += 1;
            }
        }
        if matches!(self.peek(0), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek(1), Some('+' | '-')));
            if self.peek(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1 + sign;
                while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        if self
            .peek(0)
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        {
            return Err(invalid());
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        text.parse().map(Tok::Num).map_err(|_| invalid())
    }

    fn escape(&mut self, out: &mut String) -> Result<(), ScriptFault> {
        // Positioned just after the backslash.
        let ch = self.peek(0).ok_or_else(invalid)?;
        self.pos += 1;
        match ch {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek(0).is_some_and(|c| c.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let code = self.hex_digits(2)?;
                out.push(char::from_u32(code).ok_or_else(invalid)?);
            }
            'u' => {
                let code = if self.peek(0) == Some('{') {
                    self.pos += 1;
                    let start = self.pos;
                    while self.peek(0).is_some_and(|c| c != '}') {
                        self.pos += 1;
                    }
                    let hex: String = self.chars[start..self.pos].iter().collect();
                    self.pos += 1;
                    u32::from_str_radix(&hex, 16).map_err(|_| invalid())?
                } else {
                    self.hex_digits(4)?
                };
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            '\r' => {
                if self.peek(0) == Some('\n') {
                    self.pos += 1;
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            other => out.push(other),
        }
        Ok(())
    }

    fn hex_digits(&mut self, count: usize) -> Result<u32, ScriptFault> {
        let end = self.pos + count;
        if end > self.chars.len() {
            return Err(invalid());
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16).map_err(|_| invalid())
    }

    fn string(&mut self, quote: char) -> Result<String, ScriptFault> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek(0) {
                None | Some('\n') => return Err(invalid()),
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    self.escape(&mut out)?;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn template(&mut self) -> Result<Vec<TemplateChunk>, ScriptFault> {
        let unterminated = || ScriptFault::syntax("Unterminated template literal");
        self.pos += 1;
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek(0) {
                None => return Err(unterminated()),
                Some('`') => {
                    self.pos += 1;
                    chunks.push(TemplateChunk::Text(text));
                    return Ok(chunks);
                }
                Some('\\') => {
                    self.pos += 1;
                    self.escape(&mut text)?;
                }
                Some('$') if self.peek(1) == Some('{') => {
                    self.pos += 2;
                    chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    let start = self.pos;
                    self.skip_balanced().ok_or_else(unterminated)?;
                    let expr: String = self.chars[start..self.pos].iter().collect();
                    self.pos += 1;
                    chunks.push(TemplateChunk::Expr(expr));
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    /// Advances to the `}` closing an embedded template expression.
    fn skip_balanced(&mut self) -> Option<()> {
        let mut depth = 0usize;
        while let Some(ch) = self.peek(0) {
            match ch {
                '{' => depth += 1,
                '}' if depth == 0 => return Some(()),
                '}' => depth -= 1,
                '"' | '\'' | '`' => {
                    self.pos += 1;
                    while let Some(c) = self.peek(0) {
                        if c == '\\' {
                            self.pos += 1;
                        } else if c == ch {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        None
    }

    fn punct(&mut self) -> Result<Tok, ScriptFault> {
        for punct in PUNCTUATORS {
            let len = punct.chars().count();
            let matches = punct
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek(i) == Some(c));
            if !matches {
                continue;
            }
            // `a?.5:1` is a conditional, not optional chaining.
            if *punct == "?." && self.peek(2).is_some_and(|c| c.is_ascii_digit()) {
                continue;
            }
            self.pos += len;
            return Ok(Tok::Punct(punct));
        }
        Err(invalid())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 .5 1e3 0xff 1_000"),
            vec![
                Tok::Num(1.0),
                Tok::Num(2.5),
                Tok::Num(0.5),
                Tok::Num(1000.0),
                Tok::Num(255.0),
                Tok::Num(1000.0),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'a\'b' "line\nnext" "A\x42""#),
            vec![
                Tok::Str("a'b".to_string()),
                Tok::Str("line\nnext".to_string()),
                Tok::Str("AB".to_string()),
                Tok::Eof
            ]
        );
        assert!(tokenize("'open").is_err());
    }

    #[test]
    fn test_template_chunks() {
        assert_eq!(
            kinds("`Hi ${user.name}, ${ {a: 1}.a }!`"),
            vec![
                Tok::Template(vec![
                    TemplateChunk::Text("Hi ".to_string()),
                    TemplateChunk::Expr("user.name".to_string()),
                    TemplateChunk::Text(", ".to_string()),
                    TemplateChunk::Expr(" {a: 1}.a ".to_string()),
                    TemplateChunk::Text("!".to_string()),
                ]),
                Tok::Eof
            ]
        );
        let err = tokenize("`abc").unwrap_err();
        assert_eq!(err.message, "Unterminated template literal");
    }

    #[test]
    fn test_punctuators_and_newlines() {
        let tokens = tokenize("a?.b ?? c\n=== d // note\n/* x\n */ e?.5:1").unwrap();
        let puncts: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t.tok {
                Tok::Punct(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(puncts, vec!["?.", "??", "===", "?", ":"]);
        let newline_flags: Vec<_> = tokens.iter().map(|t| t.nl_before).collect();
        assert_eq!(
            newline_flags,
            vec![false, false, false, false, false, true, false, true, false, false, false, false, true]
        );
    }

    #[test]
    fn test_invalid_characters() {
        assert_eq!(tokenize("a # b").unwrap_err().to_string(), "SyntaxError: Invalid or unexpected token");
        assert!(tokenize("3px").is_err());
    }
}
