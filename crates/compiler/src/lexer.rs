//! Pull lexer for Ada 83 source text.
//!
//! The lexer hands tokens to the parser through a two-token lookahead buffer
//! (`peek`/`peek2`). Keywords and identifiers compare case-insensitively;
//! identifiers keep their written case for diagnostics and mangling. A bad
//! character is reported once and the lexer skips to the next statement
//! boundary (`;`) before continuing.

use crate::ast::Loc;
use num_bigint::BigInt;
use num_traits::Num;
use std::collections::VecDeque;

/// Ada 83 reserved words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kw {
    Abort,
    Abs,
    Accept,
    Access,
    All,
    And,
    Array,
    At,
    Begin,
    Body,
    Case,
    Constant,
    Declare,
    Delay,
    Delta,
    Digits,
    Do,
    Else,
    Elsif,
    End,
    Entry,
    Exception,
    Exit,
    For,
    Function,
    Generic,
    Goto,
    If,
    In,
    Is,
    Limited,
    Loop,
    Mod,
    New,
    Not,
    Null,
    Of,
    Or,
    Others,
    Out,
    Package,
    Pragma,
    Private,
    Procedure,
    Raise,
    Range,
    Record,
    Rem,
    Renames,
    Return,
    Reverse,
    Select,
    Separate,
    Subtype,
    Task,
    Terminate,
    Then,
    Type,
    Use,
    When,
    While,
    With,
    Xor,
}

fn keyword(s: &str) -> Option<Kw> {
    Some(match s {
        "abort" => Kw::Abort,
        "abs" => Kw::Abs,
        "accept" => Kw::Accept,
        "access" => Kw::Access,
        "all" => Kw::All,
        "and" => Kw::And,
        "array" => Kw::Array,
        "at" => Kw::At,
        "begin" => Kw::Begin,
        "body" => Kw::Body,
        "case" => Kw::Case,
        "constant" => Kw::Constant,
        "declare" => Kw::Declare,
        "delay" => Kw::Delay,
        "delta" => Kw::Delta,
        "digits" => Kw::Digits,
        "do" => Kw::Do,
        "else" => Kw::Else,
        "elsif" => Kw::Elsif,
        "end" => Kw::End,
        "entry" => Kw::Entry,
        "exception" => Kw::Exception,
        "exit" => Kw::Exit,
        "for" => Kw::For,
        "function" => Kw::Function,
        "generic" => Kw::Generic,
        "goto" => Kw::Goto,
        "if" => Kw::If,
        "in" => Kw::In,
        "is" => Kw::Is,
        "limited" => Kw::Limited,
        "loop" => Kw::Loop,
        "mod" => Kw::Mod,
        "new" => Kw::New,
        "not" => Kw::Not,
        "null" => Kw::Null,
        "of" => Kw::Of,
        "or" => Kw::Or,
        "others" => Kw::Others,
        "out" => Kw::Out,
        "package" => Kw::Package,
        "pragma" => Kw::Pragma,
        "private" => Kw::Private,
        "procedure" => Kw::Procedure,
        "raise" => Kw::Raise,
        "range" => Kw::Range,
        "record" => Kw::Record,
        "rem" => Kw::Rem,
        "renames" => Kw::Renames,
        "return" => Kw::Return,
        "reverse" => Kw::Reverse,
        "select" => Kw::Select,
        "separate" => Kw::Separate,
        "subtype" => Kw::Subtype,
        "task" => Kw::Task,
        "terminate" => Kw::Terminate,
        "then" => Kw::Then,
        "type" => Kw::Type,
        "use" => Kw::Use,
        "when" => Kw::When,
        "while" => Kw::While,
        "with" => Kw::With,
        "xor" => Kw::Xor,
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(BigInt),
    Real(f64),
    Char(char),
    Str(String),
    Kw(Kw),
    LParen,
    RParen,
    Comma,
    Semi,
    Colon,
    Dot,
    DotDot,
    /// `:=`
    Assign,
    /// `=>`
    Arrow,
    Tick,
    Bar,
    /// `<>`
    Box,
    /// `<<`
    LLabel,
    /// `>>`
    RLabel,
    Plus,
    Minus,
    Star,
    Slash,
    StarStar,
    Amp,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::Int(v) => write!(f, "{}", v),
            TokenKind::Real(v) => write!(f, "{}", v),
            TokenKind::Char(c) => write!(f, "'{}'", c),
            TokenKind::Str(s) => write!(f, "\"{}\"", s),
            TokenKind::Kw(k) => write!(f, "{:?}", k),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Semi => write!(f, ";"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::DotDot => write!(f, ".."),
            TokenKind::Assign => write!(f, ":="),
            TokenKind::Arrow => write!(f, "=>"),
            TokenKind::Tick => write!(f, "'"),
            TokenKind::Bar => write!(f, "|"),
            TokenKind::Box => write!(f, "<>"),
            TokenKind::LLabel => write!(f, "<<"),
            TokenKind::RLabel => write!(f, ">>"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::StarStar => write!(f, "**"),
            TokenKind::Amp => write!(f, "&"),
            TokenKind::Eq => write!(f, "="),
            TokenKind::Ne => write!(f, "/="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Le => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Ge => write!(f, ">="),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Loc,
}

impl Token {
    pub fn is_kw(&self, kw: Kw) -> bool {
        matches!(self.kind, TokenKind::Kw(k) if k == kw)
    }
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    buffer: VecDeque<Token>,
    /// True after a token that can prefix an attribute, which makes a
    /// following tick an attribute tick rather than a character literal.
    attr_prefix: bool,
    pub errors: Vec<String>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            buffer: VecDeque::new(),
            attr_prefix: false,
            errors: Vec::new(),
        }
    }

    pub fn peek(&mut self) -> &Token {
        self.fill(1);
        &self.buffer[0]
    }

    pub fn peek2(&mut self) -> &Token {
        self.fill(2);
        &self.buffer[1]
    }

    pub fn bump(&mut self) -> Token {
        self.fill(1);
        self.buffer.pop_front().expect("buffer filled")
    }

    fn fill(&mut self, n: usize) {
        while self.buffer.len() < n {
            let tok = self.scan();
            self.buffer.push_back(tok);
        }
    }

    fn cur(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.cur()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.cur() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('-') if self.at(1) == Some('-') => {
                    while let Some(c) = self.cur() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan(&mut self) -> Token {
        self.skip_trivia();
        let loc = Loc::new(self.line, self.col);
        let c = match self.cur() {
            Some(c) => c,
            None => return self.token(TokenKind::Eof, loc),
        };
        if c.is_ascii_alphabetic() {
            return self.scan_word(loc);
        }
        if c.is_ascii_digit() {
            return self.scan_number(loc);
        }
        match c {
            '"' => self.scan_string(loc),
            '\'' => {
                if self.attr_prefix {
                    self.advance();
                    self.token(TokenKind::Tick, loc)
                } else if self.at(2) == Some('\'') && self.at(1).is_some() {
                    self.advance();
                    let ch = self.advance().unwrap_or('\0');
                    self.advance();
                    self.token(TokenKind::Char(ch), loc)
                } else {
                    self.advance();
                    self.token(TokenKind::Tick, loc)
                }
            }
            '(' => self.punct(TokenKind::LParen, 1, loc),
            ')' => self.punct(TokenKind::RParen, 1, loc),
            ',' => self.punct(TokenKind::Comma, 1, loc),
            ';' => self.punct(TokenKind::Semi, 1, loc),
            '|' | '!' => self.punct(TokenKind::Bar, 1, loc),
            '&' => self.punct(TokenKind::Amp, 1, loc),
            '+' => self.punct(TokenKind::Plus, 1, loc),
            '-' => self.punct(TokenKind::Minus, 1, loc),
            '*' => {
                if self.at(1) == Some('*') {
                    self.punct(TokenKind::StarStar, 2, loc)
                } else {
                    self.punct(TokenKind::Star, 1, loc)
                }
            }
            '/' => {
                if self.at(1) == Some('=') {
                    self.punct(TokenKind::Ne, 2, loc)
                } else {
                    self.punct(TokenKind::Slash, 1, loc)
                }
            }
            '=' => {
                if self.at(1) == Some('>') {
                    self.punct(TokenKind::Arrow, 2, loc)
                } else {
                    self.punct(TokenKind::Eq, 1, loc)
                }
            }
            '<' => match self.at(1) {
                Some('=') => self.punct(TokenKind::Le, 2, loc),
                Some('>') => self.punct(TokenKind::Box, 2, loc),
                Some('<') => self.punct(TokenKind::LLabel, 2, loc),
                _ => self.punct(TokenKind::Lt, 1, loc),
            },
            '>' => match self.at(1) {
                Some('=') => self.punct(TokenKind::Ge, 2, loc),
                Some('>') => self.punct(TokenKind::RLabel, 2, loc),
                _ => self.punct(TokenKind::Gt, 1, loc),
            },
            ':' => {
                if self.at(1) == Some('=') {
                    self.punct(TokenKind::Assign, 2, loc)
                } else {
                    self.punct(TokenKind::Colon, 1, loc)
                }
            }
            '.' => {
                if self.at(1) == Some('.') {
                    self.punct(TokenKind::DotDot, 2, loc)
                } else {
                    self.punct(TokenKind::Dot, 1, loc)
                }
            }
            other => {
                self.errors.push(format!(
                    "{}: illegal character '{}'",
                    loc, other
                ));
                // Skip to the next statement boundary and resume there.
                while let Some(c) = self.cur() {
                    if c == ';' {
                        break;
                    }
                    self.advance();
                }
                self.scan()
            }
        }
    }

    fn punct(&mut self, kind: TokenKind, width: usize, loc: Loc) -> Token {
        for _ in 0..width {
            self.advance();
        }
        self.token(kind, loc)
    }

    fn token(&mut self, kind: TokenKind, loc: Loc) -> Token {
        self.attr_prefix = matches!(
            kind,
            TokenKind::Ident(_) | TokenKind::RParen | TokenKind::Str(_) | TokenKind::Kw(Kw::All)
        );
        Token { kind, loc }
    }

    fn scan_word(&mut self, loc: Loc) -> Token {
        let mut text = String::new();
        while let Some(c) = self.cur() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let lower = text.to_ascii_lowercase();
        match keyword(&lower) {
            Some(kw) => self.token(TokenKind::Kw(kw), loc),
            None => self.token(TokenKind::Ident(text), loc),
        }
    }

    fn scan_number(&mut self, loc: Loc) -> Token {
        let mut text = String::new();
        let mut is_real = false;
        while let Some(c) = self.cur() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        // Based literal: 16#FF#, 2#1010#E3
        if self.cur() == Some('#') {
            self.advance();
            let radix: u32 = text.parse().unwrap_or(10);
            let radix = radix.clamp(2, 16);
            let mut digits = String::new();
            while let Some(c) = self.cur() {
                if c.is_ascii_hexdigit() {
                    digits.push(c);
                    self.advance();
                } else if c == '_' {
                    self.advance();
                } else {
                    break;
                }
            }
            if self.cur() == Some('#') {
                self.advance();
            } else {
                self.errors.push(format!("{}: unterminated based literal", loc));
            }
            let mut value = BigInt::from_str_radix(&digits, radix).unwrap_or_default();
            if matches!(self.cur(), Some('e') | Some('E')) {
                self.advance();
                let mut exp = String::new();
                while let Some(c) = self.cur() {
                    if c.is_ascii_digit() {
                        exp.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                let exp: u32 = exp.parse().unwrap_or(0);
                value *= BigInt::from(radix).pow(exp);
            }
            return self.token(TokenKind::Int(value), loc);
        }
        // Fractional part; a ".." is a range, not a fraction.
        if self.cur() == Some('.') && self.at(1) != Some('.') {
            is_real = true;
            text.push('.');
            self.advance();
            while let Some(c) = self.cur() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else if c == '_' {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if matches!(self.cur(), Some('e') | Some('E')) {
            let mut probe = 1;
            if matches!(self.at(1), Some('+') | Some('-')) {
                probe = 2;
            }
            if self.at(probe).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                is_real = is_real || self.at(1) == Some('-');
                text.push('e');
                self.advance();
                if matches!(self.cur(), Some('+') | Some('-')) {
                    text.push(self.cur().unwrap());
                    self.advance();
                }
                while let Some(c) = self.cur() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.advance();
                    } else if c == '_' {
                        self.advance();
                    } else {
                        break;
                    }
                }
                // An exponent on an integer literal keeps it integral.
                if !is_real {
                    let mut parts = text.splitn(2, 'e');
                    let mantissa = parts.next().unwrap_or("0");
                    let exp: u32 = parts.next().unwrap_or("0").parse().unwrap_or(0);
                    let value = mantissa.parse::<BigInt>().unwrap_or_default()
                        * BigInt::from(10u32).pow(exp);
                    return self.token(TokenKind::Int(value), loc);
                }
            }
        }
        if is_real {
            let value: f64 = text.parse().unwrap_or(0.0);
            self.token(TokenKind::Real(value), loc)
        } else {
            let value: BigInt = text.parse().unwrap_or_default();
            self.token(TokenKind::Int(value), loc)
        }
    }

    fn scan_string(&mut self, loc: Loc) -> Token {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.cur() {
                Some('"') => {
                    self.advance();
                    if self.cur() == Some('"') {
                        text.push('"');
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some('\n') | None => {
                    self.errors.push(format!("{}: unterminated string literal", loc));
                    break;
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
        self.token(TokenKind::Str(text), loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let tok = lexer.bump();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let toks = kinds("BEGIN Begin begin");
        assert_eq!(
            toks,
            vec![
                TokenKind::Kw(Kw::Begin),
                TokenKind::Kw(Kw::Begin),
                TokenKind::Kw(Kw::Begin),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let toks = kinds("42 1_000 3.14 16#FF# 2#1010# 1E3");
        assert_eq!(toks[0], TokenKind::Int(BigInt::from(42)));
        assert_eq!(toks[1], TokenKind::Int(BigInt::from(1000)));
        assert_eq!(toks[2], TokenKind::Real(3.14));
        assert_eq!(toks[3], TokenKind::Int(BigInt::from(255)));
        assert_eq!(toks[4], TokenKind::Int(BigInt::from(10)));
        assert_eq!(toks[5], TokenKind::Int(BigInt::from(1000)));
    }

    #[test]
    fn test_range_is_not_a_fraction() {
        let toks = kinds("1..10");
        assert_eq!(
            toks,
            vec![
                TokenKind::Int(BigInt::from(1)),
                TokenKind::DotDot,
                TokenKind::Int(BigInt::from(10)),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_char_vs_attribute_tick() {
        // After an identifier a tick starts an attribute.
        let toks = kinds("X'First");
        assert_eq!(toks[1], TokenKind::Tick);
        // After an assignment it starts a character literal.
        let toks = kinds("X := 'a'");
        assert_eq!(toks[2], TokenKind::Char('a'));
    }

    #[test]
    fn test_string_with_doubled_quote() {
        let toks = kinds(r#""he said ""hi""""#);
        assert_eq!(toks[0], TokenKind::Str("he said \"hi\"".to_string()));
    }

    #[test]
    fn test_comment_skipped() {
        let toks = kinds("x -- the rest is comment\n y");
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[0], TokenKind::Ident("x".to_string()));
        assert_eq!(toks[1], TokenKind::Ident("y".to_string()));
    }

    #[test]
    fn test_compound_delimiters() {
        let toks = kinds(":= => .. ** /= <= >= <> << >>");
        assert_eq!(
            toks,
            vec![
                TokenKind::Assign,
                TokenKind::Arrow,
                TokenKind::DotDot,
                TokenKind::StarStar,
                TokenKind::Ne,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Box,
                TokenKind::LLabel,
                TokenKind::RLabel,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_illegal_character_reported_once() {
        let mut lexer = Lexer::new("x $ y; z");
        let mut toks = Vec::new();
        loop {
            let t = lexer.bump();
            if t.kind == TokenKind::Eof {
                break;
            }
            toks.push(t.kind);
        }
        assert_eq!(lexer.errors.len(), 1);
        // Skipped to the statement boundary.
        assert!(toks.contains(&TokenKind::Semi));
        assert!(toks.contains(&TokenKind::Ident("z".to_string())));
    }

    #[test]
    fn test_lookahead_buffer() {
        let mut lexer = Lexer::new("a b c");
        assert_eq!(lexer.peek().kind, TokenKind::Ident("a".to_string()));
        assert_eq!(lexer.peek2().kind, TokenKind::Ident("b".to_string()));
        assert_eq!(lexer.bump().kind, TokenKind::Ident("a".to_string()));
        assert_eq!(lexer.peek().kind, TokenKind::Ident("b".to_string()));
    }
}
