//! Lexer for ALM source files.
//!
//! A single forward scan over the bytes of the source with one byte of
//! lookahead. Operators are matched by maximal munch, identifiers are
//! scanned greedily and then checked against the reserved-word table.
//! Whitespace and both comment forms are trivia, skipped in one place
//! before every token so no other rule has to know about them.
//!
//! The lexer never reports diagnostics itself. A character it cannot
//! classify becomes a [`TokenKind::Invalid`] token whose lexeme holds the
//! explanation; the parser turns it into a syntax error where it is used.

use crate::span::{FileId, Position, Span};
use crate::types::Primitive;

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Special
    Eof,
    Invalid,

    // Identifiers and literals
    Ident,
    IntLiteral,
    RealLiteral,
    CharLiteral,
    StringLiteral,
    BoolLiteral, // true / false

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Semi,     // ;
    Colon,    // :

    // Arithmetic and bitwise operators
    Plus,    // +
    Minus,   // -
    Star,    // *
    StarStar, // **
    Slash,   // /
    Percent, // %
    Amp,     // &
    Pipe,    // |
    Caret,   // ^
    Tilde,   // ~
    Shl,     // <<
    Shr,     // >>

    // Boolean operators
    AndAnd,     // &&
    OrOr,       // ||
    CaretCaret, // ^^
    Bang,       // !

    // Comparisons
    EqEq,      // ==
    NotEq,     // !=
    Less,      // <
    LessEq,    // <=
    Greater,   // >
    GreaterEq, // >=

    // Assignment
    Assign,        // =
    PlusAssign,    // +=
    MinusAssign,   // -=
    StarAssign,    // *=
    SlashAssign,   // /=
    PercentAssign, // %=
    AmpAssign,     // &=
    PipeAssign,    // |=
    CaretAssign,   // ^=
    ShlAssign,     // <<=
    ShrAssign,     // >>=

    // Keywords
    Import,
    Func,
    External, // @external
    Return,
    If,
    Else,
    While,
    Do,
    For,
    Break,
    Continue,
    New,
    /// A primitive type name such as `integer` or `string`.
    Type(Primitive),
}

impl TokenKind {
    /// True for every compound or plain assignment operator.
    pub fn is_assign_op(self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::PlusAssign
                | TokenKind::MinusAssign
                | TokenKind::StarAssign
                | TokenKind::SlashAssign
                | TokenKind::PercentAssign
                | TokenKind::AmpAssign
                | TokenKind::PipeAssign
                | TokenKind::CaretAssign
                | TokenKind::ShlAssign
                | TokenKind::ShrAssign
        )
    }
}

/// A single token.
///
/// `lexeme` holds the source text of the token, except for string and
/// character literals where it holds the unescaped value, and for
/// [`TokenKind::Invalid`] where it holds a description of the problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// The token sequence of one file with a movable cursor.
///
/// The last token is always [`TokenKind::Eof`]. Lookahead past the end
/// clamps to that token.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(tokens.last().is_some_and(|t| t.kind == TokenKind::Eof));
        TokenStream { tokens, cursor: 0 }
    }

    /// Token at `offset` from the cursor. Negative offsets look backwards
    /// and yield `None` before the first token.
    pub fn peek(&self, offset: isize) -> Option<&Token> {
        let index = self.cursor as isize + offset;
        if index < 0 {
            return None;
        }
        let index = (index as usize).min(self.tokens.len() - 1);
        self.tokens.get(index)
    }

    /// Token under the cursor.
    pub fn current(&self) -> &Token {
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    pub fn previous(&self) -> Option<&Token> {
        self.peek(-1)
    }

    pub fn kind(&self) -> TokenKind {
        self.current().kind
    }

    pub fn kind_at(&self, offset: isize) -> Option<TokenKind> {
        self.peek(offset).map(|t| t.kind)
    }

    /// Move the cursor forward and return the token that was current.
    pub fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        token
    }

    /// Index of the cursor, used to detect lack of progress.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn at_eof(&self) -> bool {
        self.kind() == TokenKind::Eof
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Lex a whole source file.
pub fn lex(file: FileId, source: &str) -> TokenStream {
    let mut lexer = Lexer {
        file,
        source,
        chars: source.as_bytes(),
        index: 0,
        line: 1,
        column: 1,
    };
    let tokens = lexer.run();
    tracing::trace!(file = file.0, tokens = tokens.len(), "lexed file");
    TokenStream::new(tokens)
}

struct Lexer<'src> {
    file: FileId,
    source: &'src str,
    chars: &'src [u8],
    index: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia();
            let Some(ch) = self.peek_char() else {
                break;
            };

            let start = self.position();
            let token = match ch {
                b'(' => self.single(TokenKind::LParen, start),
                b')' => self.single(TokenKind::RParen, start),
                b'{' => self.single(TokenKind::LBrace, start),
                b'}' => self.single(TokenKind::RBrace, start),
                b'[' => self.single(TokenKind::LBracket, start),
                b']' => self.single(TokenKind::RBracket, start),
                b',' => self.single(TokenKind::Comma, start),
                b';' => self.single(TokenKind::Semi, start),
                b':' => self.single(TokenKind::Colon, start),
                b'~' => self.single(TokenKind::Tilde, start),
                b'+' => self.with_assign(TokenKind::Plus, TokenKind::PlusAssign, start),
                b'-' => self.with_assign(TokenKind::Minus, TokenKind::MinusAssign, start),
                b'/' => self.with_assign(TokenKind::Slash, TokenKind::SlashAssign, start),
                b'%' => self.with_assign(TokenKind::Percent, TokenKind::PercentAssign, start),
                b'*' => {
                    self.consume_char();
                    if self.eat(b'*') {
                        self.token(TokenKind::StarStar, start)
                    } else if self.eat(b'=') {
                        self.token(TokenKind::StarAssign, start)
                    } else {
                        self.token(TokenKind::Star, start)
                    }
                }
                b'&' => self.doubled_or_assign(
                    b'&',
                    TokenKind::Amp,
                    TokenKind::AndAnd,
                    TokenKind::AmpAssign,
                    start,
                ),
                b'|' => self.doubled_or_assign(
                    b'|',
                    TokenKind::Pipe,
                    TokenKind::OrOr,
                    TokenKind::PipeAssign,
                    start,
                ),
                b'^' => self.doubled_or_assign(
                    b'^',
                    TokenKind::Caret,
                    TokenKind::CaretCaret,
                    TokenKind::CaretAssign,
                    start,
                ),
                b'=' => self.with_assign(TokenKind::Assign, TokenKind::EqEq, start),
                b'!' => self.with_assign(TokenKind::Bang, TokenKind::NotEq, start),
                b'<' => {
                    self.consume_char();
                    if self.eat(b'<') {
                        if self.eat(b'=') {
                            self.token(TokenKind::ShlAssign, start)
                        } else {
                            self.token(TokenKind::Shl, start)
                        }
                    } else if self.eat(b'=') {
                        self.token(TokenKind::LessEq, start)
                    } else {
                        self.token(TokenKind::Less, start)
                    }
                }
                b'>' => {
                    self.consume_char();
                    if self.eat(b'>') {
                        if self.eat(b'=') {
                            self.token(TokenKind::ShrAssign, start)
                        } else {
                            self.token(TokenKind::Shr, start)
                        }
                    } else if self.eat(b'=') {
                        self.token(TokenKind::GreaterEq, start)
                    } else {
                        self.token(TokenKind::Greater, start)
                    }
                }
                b'"' => self.lex_quoted(b'"', start),
                b'\'' => self.lex_quoted(b'\'', start),
                b'@' => self.lex_annotation(start),
                b'0'..=b'9' => self.lex_number(start),
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(start),
                _ => {
                    let shown = self.current_char_text();
                    for _ in 0..shown.len().max(1) {
                        self.consume_char();
                    }
                    self.invalid(format!("unexpected character '{shown}'"), start)
                }
            };

            tokens.push(token);
        }

        let end = self.position();
        tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            span: Span::point(self.file, end),
        });
        tokens
    }

    fn position(&self) -> Position {
        Position::new(self.index as u32, self.line, self.column)
    }

    fn token(&self, kind: TokenKind, start: Position) -> Token {
        let end = self.position();
        Token {
            kind,
            lexeme: self.source[start.offset as usize..end.offset as usize].to_string(),
            span: Span::new(self.file, start, end),
        }
    }

    fn invalid(&self, message: String, start: Position) -> Token {
        Token {
            kind: TokenKind::Invalid,
            lexeme: message,
            span: Span::new(self.file, start, self.position()),
        }
    }

    fn single(&mut self, kind: TokenKind, start: Position) -> Token {
        self.consume_char();
        self.token(kind, start)
    }

    /// `x` or `x=`.
    fn with_assign(&mut self, plain: TokenKind, assign: TokenKind, start: Position) -> Token {
        self.consume_char();
        if self.eat(b'=') {
            self.token(assign, start)
        } else {
            self.token(plain, start)
        }
    }

    /// `x`, `xx` or `x=`.
    fn doubled_or_assign(
        &mut self,
        ch: u8,
        plain: TokenKind,
        doubled: TokenKind,
        assign: TokenKind,
        start: Position,
    ) -> Token {
        self.consume_char();
        if self.eat(ch) {
            self.token(doubled, start)
        } else if self.eat(b'=') {
            self.token(assign, start)
        } else {
            self.token(plain, start)
        }
    }

    fn lex_annotation(&mut self, start: Position) -> Token {
        self.consume_char(); // '@'
        let name_start = self.index;
        while self.peek_char().is_some_and(is_ident_continue) {
            self.consume_char();
        }
        let name = &self.source[name_start..self.index];
        if name == "external" {
            self.token(TokenKind::External, start)
        } else {
            self.invalid(format!("unknown annotation '@{name}'"), start)
        }
    }

    /// String (`"`) or character (`'`) literal. Neither may span lines.
    fn lex_quoted(&mut self, quote: u8, start: Position) -> Token {
        self.consume_char(); // opening quote

        let mut value = String::new();
        loop {
            match self.peek_char() {
                None | Some(b'\n') => {
                    let what = if quote == b'"' { "string" } else { "character" };
                    return self.invalid(format!("unterminated {what} literal"), start);
                }
                Some(ch) if ch == quote => {
                    self.consume_char();
                    break;
                }
                Some(b'\\') => {
                    self.consume_char();
                    let escaped = match self.peek_char() {
                        Some(b'n') => '\n',
                        Some(b't') => '\t',
                        Some(b'r') => '\r',
                        Some(b'0') => '\0',
                        Some(b'\\') => '\\',
                        Some(b'\'') => '\'',
                        Some(b'"') => '"',
                        None | Some(b'\n') => continue,
                        Some(_) => {
                            let shown = self.current_char_text();
                            for _ in 0..shown.len().max(1) {
                                self.consume_char();
                            }
                            return self.invalid(format!("unknown escape sequence '\\{shown}'"), start);
                        }
                    };
                    self.consume_char();
                    value.push(escaped);
                }
                Some(_) => {
                    let text = self.current_char_text();
                    for _ in 0..text.len() {
                        self.consume_char();
                    }
                    value.push_str(&text);
                }
            }
        }

        let end = self.position();
        let span = Span::new(self.file, start, end);
        if quote == b'"' {
            return Token {
                kind: TokenKind::StringLiteral,
                lexeme: value,
                span,
            };
        }
        if value.chars().count() != 1 {
            return self.invalid(
                "character literal must contain exactly one character".to_string(),
                start,
            );
        }
        Token {
            kind: TokenKind::CharLiteral,
            lexeme: value,
            span,
        }
    }

    fn lex_number(&mut self, start: Position) -> Token {
        // integer or real: digits [ '.' digits ]?
        while self.peek_char().is_some_and(|ch| ch.is_ascii_digit()) {
            self.consume_char();
        }

        let mut is_real = false;
        if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|ch| ch.is_ascii_digit()) {
            is_real = true;
            self.consume_char(); // '.'
            while self.peek_char().is_some_and(|ch| ch.is_ascii_digit()) {
                self.consume_char();
            }
        }

        let kind = if is_real {
            TokenKind::RealLiteral
        } else {
            TokenKind::IntLiteral
        };
        self.token(kind, start)
    }

    fn lex_ident_or_keyword(&mut self, start: Position) -> Token {
        while self.peek_char().is_some_and(is_ident_continue) {
            self.consume_char();
        }

        let text = &self.source[start.offset as usize..self.index];
        let kind = match text {
            "import" => TokenKind::Import,
            "func" => TokenKind::Func,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "new" => TokenKind::New,
            "true" | "false" => TokenKind::BoolLiteral,
            _ => match Primitive::from_keyword(text) {
                Some(primitive) => TokenKind::Type(primitive),
                None => TokenKind::Ident,
            },
        };
        self.token(kind, start)
    }

    fn skip_trivia(&mut self) {
        loop {
            match (self.peek_char(), self.peek_next()) {
                (Some(ch), _) if is_whitespace(ch) => self.consume_char(),
                (Some(b'/'), Some(b'/')) => {
                    while self.peek_char().is_some_and(|ch| ch != b'\n') {
                        self.consume_char();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.consume_char();
                    self.consume_char();
                    while self.peek_char().is_some() {
                        if self.peek_char() == Some(b'*') && self.peek_next() == Some(b'/') {
                            self.consume_char();
                            self.consume_char();
                            break;
                        }
                        self.consume_char();
                    }
                }
                _ => break,
            }
        }
    }

    /// The full (possibly multi-byte) character at the cursor.
    fn current_char_text(&self) -> String {
        self.source[self.index..]
            .chars()
            .next()
            .map(String::from)
            .unwrap_or_default()
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek_char() == Some(expected) {
            self.consume_char();
            true
        } else {
            false
        }
    }

    fn consume_char(&mut self) {
        let Some(ch) = self.peek_char() else {
            return;
        };
        self.index += 1;
        if ch == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if ch & 0xC0 != 0x80 {
            // continuation bytes of a UTF-8 sequence do not advance the column
            self.column += 1;
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
