//! Tokenizer for spell scripts.
//!
//! Whitespace and comments (`#` or `//` to the end of the line) are dropped.
//! Every token remembers the line it started on for error reporting.

use std::fmt;

use crate::error::ParseError;

/// A classified token produced by the tokenizer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A name: `[A-Za-z_][A-Za-z0-9_]*` that is not a keyword.
    Ident(String),
    /// An integer literal.
    Integer(i64),
    /// A float literal: digits, `.`, digits.
    Float(f64),
    /// A string literal with its escapes resolved.
    Str(String),
    Let,
    If,
    Else,
    While,
    True,
    False,
    Null,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{name}'"),
            Token::Integer(n) => write!(f, "{n}"),
            Token::Float(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "'{}'", other.symbol()),
        }
    }
}

impl Token {
    fn symbol(&self) -> &'static str {
        match self {
            Token::Let => "let",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::LeftParen => "(",
            Token::RightParen => ")",
            Token::LeftBrace => "{",
            Token::RightBrace => "}",
            Token::LeftBracket => "[",
            Token::RightBracket => "]",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Dot => ".",
            Token::Assign => "=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::Less => "<",
            Token::LessEqual => "<=",
            Token::Greater => ">",
            Token::GreaterEqual => ">=",
            Token::Equal => "==",
            Token::NotEqual => "!=",
            Token::And => "&&",
            Token::Or => "||",
            Token::Ident(_) | Token::Integer(_) | Token::Float(_) | Token::Str(_) => "literal",
        }
    }
}

/// A [`Token`] and the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub line: usize,
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "let" => Token::Let,
        "if" => Token::If,
        "else" => Token::Else,
        "while" => Token::While,
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        _ => return None,
    })
}

/// Tokenize a whole script.
pub fn tokenize(input: &str) -> Result<Vec<Lexeme>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut lexemes = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < len {
        let ch = chars[i];

        if ch == '\n' {
            line += 1;
            i += 1;
            continue;
        }

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch == '#' || (ch == '/' && chars.get(i + 1) == Some(&'/')) {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let start = i;
            while i < len && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let token = keyword(&word).unwrap_or(Token::Ident(word));
            lexemes.push(Lexeme { token, line });
            continue;
        }

        if ch.is_ascii_digit() {
            let start = i;
            while i < len && chars[i].is_ascii_digit() {
                i += 1;
            }
            // `1.5` is a float, `1.foo` is a field access on 1.
            let is_float = i + 1 < len && chars[i] == '.' && chars[i + 1].is_ascii_digit();
            if is_float {
                i += 1;
                while i < len && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let token = if is_float {
                text.parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .map(Token::Float)
            } else {
                text.parse().map(Token::Integer).ok()
            };
            let token = token.ok_or(ParseError::InvalidNumber { text, line })?;
            lexemes.push(Lexeme { token, line });
            continue;
        }

        if ch == '"' || ch == '\'' {
            let start_line = line;
            let mut text = String::new();
            i += 1;
            loop {
                let Some(&next) = chars.get(i) else {
                    return Err(ParseError::UnterminatedString { line: start_line });
                };
                i += 1;
                match next {
                    quote if quote == ch => break,
                    '\\' => {
                        let Some(&escaped) = chars.get(i) else {
                            return Err(ParseError::UnterminatedString { line: start_line });
                        };
                        i += 1;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '0' => '\0',
                            '\\' | '\'' | '"' => escaped,
                            found => return Err(ParseError::InvalidEscape { found, line }),
                        });
                    }
                    '\n' => {
                        line += 1;
                        text.push(next);
                    }
                    _ => text.push(next),
                }
            }
            lexemes.push(Lexeme {
                token: Token::Str(text),
                line: start_line,
            });
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (ch, next) {
            ('<', Some('=')) => (Token::LessEqual, 2),
            ('>', Some('=')) => (Token::GreaterEqual, 2),
            ('=', Some('=')) => (Token::Equal, 2),
            ('!', Some('=')) => (Token::NotEqual, 2),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('(', _) => (Token::LeftParen, 1),
            (')', _) => (Token::RightParen, 1),
            ('{', _) => (Token::LeftBrace, 1),
            ('}', _) => (Token::RightBrace, 1),
            ('[', _) => (Token::LeftBracket, 1),
            (']', _) => (Token::RightBracket, 1),
            (',', _) => (Token::Comma, 1),
            (':', _) => (Token::Colon, 1),
            (';', _) => (Token::Semicolon, 1),
            ('.', _) => (Token::Dot, 1),
            ('=', _) => (Token::Assign, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('!', _) => (Token::Bang, 1),
            ('<', _) => (Token::Less, 1),
            ('>', _) => (Token::Greater, 1),
            (found, _) => return Err(ParseError::UnexpectedCharacter { found, line }),
        };
        lexemes.push(Lexeme { token, line });
        i += width;
    }

    Ok(lexemes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|lexeme| lexeme.token)
            .collect()
    }

    #[test]
    fn it_tokenizes_a_statement() {
        assert_eq!(
            tokens("let total = args.count * 2.5;"),
            vec![
                Token::Let,
                Token::Ident("total".into()),
                Token::Assign,
                Token::Ident("args".into()),
                Token::Dot,
                Token::Ident("count".into()),
                Token::Star,
                Token::Float(2.5),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn it_skips_comments() {
        assert_eq!(
            tokens("# hash comment\nx // slash comment\n// another"),
            vec![Token::Ident("x".into())]
        );
    }

    #[test]
    fn it_reads_both_string_quotes_with_escapes() {
        assert_eq!(
            tokens(r#"'it\'s' "say \"hi\"\n""#),
            vec![Token::Str("it's".into()), Token::Str("say \"hi\"\n".into())]
        );
    }

    #[test]
    fn it_prefers_two_character_operators() {
        assert_eq!(
            tokens("a <= b != c && !d"),
            vec![
                Token::Ident("a".into()),
                Token::LessEqual,
                Token::Ident("b".into()),
                Token::NotEqual,
                Token::Ident("c".into()),
                Token::And,
                Token::Bang,
                Token::Ident("d".into()),
            ]
        );
    }

    #[test]
    fn it_tracks_lines() {
        let lexemes = tokenize("a\n\n'multi\nline'\nb").unwrap();
        let lines: Vec<usize> = lexemes.iter().map(|lexeme| lexeme.line).collect();
        assert_eq!(lines, vec![1, 3, 5]);
    }

    #[test]
    fn it_reports_lexical_errors() {
        assert_eq!(
            tokenize("x = 'open"),
            Err(ParseError::UnterminatedString { line: 1 })
        );
        assert_eq!(
            tokenize("x = @"),
            Err(ParseError::UnexpectedCharacter {
                found: '@',
                line: 1
            })
        );
        assert_eq!(
            tokenize("99999999999999999999"),
            Err(ParseError::InvalidNumber {
                text: "99999999999999999999".into(),
                line: 1
            })
        );
    }

    #[test]
    fn it_rejects_floats_too_large_to_represent() {
        let huge = format!("{}.0", "9".repeat(400));
        assert_eq!(
            tokenize(&huge),
            Err(ParseError::InvalidNumber {
                text: huge.clone(),
                line: 1
            })
        );
    }
}
