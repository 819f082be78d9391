//! Lexer for the config dialect using logos
//!
//! Logos produces raw tokens; [`tokenize`] then turns line breaks into
//! logical `Newline`, `Indent` and `Dedent` tokens. Line breaks inside
//! brackets are ignored.

use crate::error::ParseError;
use logos::{Lexer as LogosLexer, Logos};
use std::fmt;
use std::ops::Range;

/// Byte range of a token in the source
pub type Span = Range<usize>;

#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Token<'a> {
    // Keywords
    #[token("and", priority = 10)]
    And,
    #[token("break", priority = 10)]
    Break,
    #[token("continue", priority = 10)]
    Continue,
    #[token("def", priority = 10)]
    Def,
    #[token("elif", priority = 10)]
    Elif,
    #[token("else", priority = 10)]
    Else,
    #[token("for", priority = 10)]
    For,
    #[token("if", priority = 10)]
    If,
    #[token("in", priority = 10)]
    In,
    #[token("lambda", priority = 10)]
    Lambda,
    #[token("load", priority = 10)]
    Load,
    #[token("not", priority = 10)]
    Not,
    #[token("or", priority = 10)]
    Or,
    #[token("pass", priority = 10)]
    Pass,
    #[token("return", priority = 10)]
    Return,
    #[token("None", priority = 10)]
    None,
    #[token("True", priority = 10)]
    True,
    #[token("False", priority = 10)]
    False,

    // Literals
    #[regex(r"[0-9]+", priority = 5, callback = |lex| lex.slice().parse::<i64>().ok())]
    #[regex(r"0[xX][0-9a-fA-F]+", priority = 5, callback = |lex| i64::from_str_radix(&lex.slice()[2..], 16).ok())]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| quoted(lex.slice()))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| quoted(lex.slice()))]
    #[regex(r#"r"([^"\\\n]|\\.)*""#, |lex| raw(lex.slice()))]
    #[regex(r#"r'([^'\\\n]|\\.)*'"#, |lex| raw(lex.slice()))]
    #[token(r#"""""#, |lex| triple_quoted(lex, r#"""""#))]
    #[token("'''", |lex| triple_quoted(lex, "'''"))]
    String(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice())]
    Ident(&'a str),

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,

    // Operators
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("//=")]
    SlashSlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,

    /// A physical line break followed by `n` columns of indentation
    #[regex(r"\n[ \t]*", |lex| lex.slice().len() - 1)]
    Newline(usize),

    // Whitespace, comments and line continuations
    #[regex(r"[ \t\r\f]+", logos::skip)]
    #[regex(r"#[^\n]*", logos::skip)]
    #[regex(r"\\\r?\n", logos::skip)]

    // Synthesized by the layout pass
    Indent,
    Dedent,
    Eof,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(n) => write!(f, "integer {}", n),
            Token::Float(n) => write!(f, "float {}", n),
            Token::String(s) => write!(f, "string {:?}", s),
            Token::Ident(name) => write!(f, "identifier {}", name),
            Token::Newline(_) => f.write_str("newline"),
            Token::Indent => f.write_str("indent"),
            Token::Dedent => f.write_str("outdent"),
            Token::Eof => f.write_str("end of file"),
            other => write!(f, "{:?}", token_text(other)),
        }
    }
}

fn token_text(token: &Token<'_>) -> &'static str {
    match token {
        Token::And => "and",
        Token::Break => "break",
        Token::Continue => "continue",
        Token::Def => "def",
        Token::Elif => "elif",
        Token::Else => "else",
        Token::For => "for",
        Token::If => "if",
        Token::In => "in",
        Token::Lambda => "lambda",
        Token::Load => "load",
        Token::Not => "not",
        Token::Or => "or",
        Token::Pass => "pass",
        Token::Return => "return",
        Token::None => "None",
        Token::True => "True",
        Token::False => "False",
        Token::LParen => "(",
        Token::RParen => ")",
        Token::LBracket => "[",
        Token::RBracket => "]",
        Token::LBrace => "{",
        Token::RBrace => "}",
        Token::Comma => ",",
        Token::Colon => ":",
        Token::Semicolon => ";",
        Token::Dot => ".",
        Token::Assign => "=",
        Token::PlusAssign => "+=",
        Token::MinusAssign => "-=",
        Token::StarAssign => "*=",
        Token::SlashAssign => "/=",
        Token::SlashSlashAssign => "//=",
        Token::PercentAssign => "%=",
        Token::Eq => "==",
        Token::NotEq => "!=",
        Token::Lt => "<",
        Token::Le => "<=",
        Token::Gt => ">",
        Token::Ge => ">=",
        Token::Plus => "+",
        Token::Minus => "-",
        Token::Star => "*",
        Token::StarStar => "**",
        Token::Slash => "/",
        Token::SlashSlash => "//",
        Token::Percent => "%",
        _ => "token",
    }
}

fn quoted(slice: &str) -> String {
    unescape(&slice[1..slice.len() - 1])
}

fn raw(slice: &str) -> String {
    slice[2..slice.len() - 1].to_string()
}

fn triple_quoted<'a>(lex: &mut LogosLexer<'a, Token<'a>>, delimiter: &str) -> Option<String> {
    let rest = lex.remainder();
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i..].starts_with(delimiter.as_bytes()) {
            let body = unescape(&rest[..i]);
            lex.bump(i + delimiter.len());
            return Some(body);
        }
        i += 1;
    }
    None
}

/// Process escape sequences in a string literal body
#[doc(hidden)]
pub fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('\'') => result.push('\''),
            // An escaped line break joins the lines.
            Some('\n') => {}
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) if hex.len() == 2 => result.push(char::from(byte)),
                    _ => {
                        result.push_str("\\x");
                        result.push_str(&hex);
                    }
                }
            }
            Some(c) => {
                result.push('\\');
                result.push(c);
            }
            None => result.push('\\'),
        }
    }

    result
}

fn lex_error(slice: &str, offset: usize) -> ParseError {
    match slice.chars().next() {
        Some('"') | Some('\'') => ParseError::UnterminatedString { offset },
        Some('r') if slice.len() > 1 => ParseError::UnterminatedString { offset },
        Some(c) if c.is_ascii_digit() || c == '.' => ParseError::InvalidNumber {
            offset,
            text: slice.to_string(),
        },
        _ => ParseError::UnexpectedCharacter {
            offset,
            found: slice.to_string(),
        },
    }
}

/// Lex `source` into tokens, including the layout tokens the parser needs.
///
/// The result always ends with `Eof`. Every logical line is terminated by
/// `Newline(0)`, and blocks are delimited by `Indent`/`Dedent`.
pub fn tokenize(source: &str) -> Result<Vec<(Token<'_>, Span)>, ParseError> {
    let mut tokens = Vec::new();
    let mut indents = vec![0usize];
    let mut depth = 0usize;
    let leading = source.len() - source.trim_start_matches(|c: char| c == ' ' || c == '\t').len();
    let mut pending: Option<(usize, Span)> = Some((leading, 0..0));

    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let token = match result {
            Ok(token) => token,
            Err(()) => return Err(lex_error(lexer.slice(), span.start)),
        };

        if let Token::Newline(width) = token {
            if depth == 0 {
                pending = Some((width, span));
            }
            continue;
        }

        if let Some((width, newline)) = pending.take() {
            if !tokens.is_empty() {
                tokens.push((Token::Newline(0), newline));
            }
            let current = indents.last().copied().unwrap_or(0);
            if width > current {
                indents.push(width);
                tokens.push((Token::Indent, span.start..span.start));
            } else {
                while width < indents.last().copied().unwrap_or(0) {
                    indents.pop();
                    tokens.push((Token::Dedent, span.start..span.start));
                }
                if indents.last().copied().unwrap_or(0) != width {
                    return Err(ParseError::InconsistentIndent { offset: span.start });
                }
            }
        }

        match token {
            Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
            _ => {}
        }
        tokens.push((token, span));
    }

    let end = source.len();
    if !tokens.is_empty() {
        tokens.push((Token::Newline(0), end..end));
    }
    while indents.len() > 1 {
        indents.pop();
        tokens.push((Token::Dedent, end..end));
    }
    tokens.push((Token::Eof, end..end));
    Ok(tokens)
}
