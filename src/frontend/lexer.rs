use std::{collections::BTreeMap, str::CharIndices};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::{Display, EnumString};

use super::{Span, SyntaxError, SyntaxErrorKind};
use crate::frontend::SourceFile;

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    chars: PeekNth<CharIndices<'source>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // recipe
    Identifier,       // main

    /* Literals */
    BooleanLiteral, // fresh
    IntegerLiteral, // 1
    FloatLiteral,   // 1.0
    StringLiteral,  // "hello, world"

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Semicolon,    // ;
    Comma,        // ,

    /* Other */
    Colon,          // :
    ColonEquals,    // :=
    Arrow,          // ->
    Dot,            // .
    DoubleDot,      // ..
    QuestionDot,    // ?.
    Question,       // ?
    DoubleQuestion, // ??
    Increment,      // ++
    Decrement,      // --
    Equals,         // =

    /* Unary Ops */
    Bang, // !
    Hash, // #

    /* Unary + Binary Ops */
    Minus, // -

    /* Binary Ops */
    Plus,                 // +
    Asterisk,             // *
    DoubleAsterisk,       // **
    Divide,               // /
    Modulus,              // %
    LogicalAnd,           // &&
    LogicalOr,            // ||
    BitwiseXor,           // ^
    BitwiseAnd,           // &
    BitwiseOr,            // |
    ShiftLeft,            // <<
    ShiftRight,           // >>
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
}

impl TokenKind {
    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::NotEquals
                | Self::DoubleEquals
                | Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_bit_shift_operator(&self) -> bool {
        matches!(self, Self::ShiftLeft | Self::ShiftRight)
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Divide | Self::Modulus)
    }

    pub fn is_unary_operator(&self) -> bool {
        matches!(
            self,
            Self::Minus
                | Self::Bang
                | Self::Hash
                | Self::Keyword(Keyword::Random)
                | Self::Keyword(Keyword::Poached)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Ingredient,
    Const,
    Recipe,
    #[strum(serialize = "Dish")]
    Dish,
    New,
    Raw,
    Random,
    Poached,
    If,
    Else,
    While,
    For,
    In,
    Break,
    Continue,
    Return,
    Prep,
    Rescue,
    Cleanup,
    Eightysix,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('[', TokenKind::OpenBracket),
        (']', TokenKind::CloseBracket),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        (':', TokenKind::Colon),
        ('.', TokenKind::Dot),
        ('?', TokenKind::Question),
        ('=', TokenKind::Equals),
        ('!', TokenKind::Bang),
        ('#', TokenKind::Hash),
        ('-', TokenKind::Minus),
        ('+', TokenKind::Plus),
        ('*', TokenKind::Asterisk),
        ('/', TokenKind::Divide),
        ('%', TokenKind::Modulus),
        ('^', TokenKind::BitwiseXor),
        ('&', TokenKind::BitwiseAnd),
        ('|', TokenKind::BitwiseOr),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

/// Two char tokens, checked before [`SINGLE_TOKENS`]
static DOUBLE_TOKENS: Lazy<BTreeMap<(char, char), TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ((':', '='), TokenKind::ColonEquals),
        (('-', '>'), TokenKind::Arrow),
        (('.', '.'), TokenKind::DoubleDot),
        (('?', '.'), TokenKind::QuestionDot),
        (('?', '?'), TokenKind::DoubleQuestion),
        (('+', '+'), TokenKind::Increment),
        (('-', '-'), TokenKind::Decrement),
        (('*', '*'), TokenKind::DoubleAsterisk),
        (('&', '&'), TokenKind::LogicalAnd),
        (('|', '|'), TokenKind::LogicalOr),
        (('<', '<'), TokenKind::ShiftLeft),
        (('>', '>'), TokenKind::ShiftRight),
        (('=', '='), TokenKind::DoubleEquals),
        (('!', '='), TokenKind::NotEquals),
        (('<', '='), TokenKind::LessThanOrEqualTo),
        (('>', '='), TokenKind::GreaterThanOrEqualTo),
    ])
});

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.char_indices()),
            position: 0,
        }
    }

    /// Lexes the whole file up front so the parser can look arbitrarily far
    /// ahead
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn error(&self, offset: usize, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError {
            kind,
            position: self.source.position_of(offset),
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_nth_char(&mut self, n: usize) -> Option<char> {
        self.chars.peek_nth(n).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let (offset, c) = self.chars.next()?;
        self.position = offset + c.len_utf8();
        Some(c)
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }

            self.bump();
        }
    }

    fn read_string(&mut self, start_position: usize) -> Result<Token, SyntaxError> {
        // Opening quote
        self.bump();

        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }

            self.bump();

            match c {
                '\\' => {
                    // The escaped char is kept verbatim
                    if self.peek_char().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                '"' => {
                    return Ok(Token {
                        kind: TokenKind::StringLiteral,
                        span: self.new_span(start_position),
                    });
                }
                _ => {}
            }
        }

        Err(self.error(start_position, SyntaxErrorKind::UnterminatedString))
    }

    // Keyword, identifier, or boolean literal
    fn read_word(&mut self, start_position: usize) -> Token {
        while let Some(c) = self.peek_char() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }

            self.bump();
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = if let Ok(keyword) = value.parse() {
            TokenKind::Keyword(keyword)
        } else {
            match value {
                "fresh" | "stale" => TokenKind::BooleanLiteral,
                _ => TokenKind::Identifier,
            }
        };

        Token { kind, span }
    }

    fn read_digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn read_number(&mut self, start_position: usize) -> Result<Token, SyntaxError> {
        let mut kind = TokenKind::IntegerLiteral;

        self.read_digits();

        // `1..5` is a range, not a float
        if self.peek_char() == Some('.') && self.peek_nth_char(1).is_some_and(|c| c.is_ascii_digit())
        {
            kind = TokenKind::FloatLiteral;
            self.bump();
            self.read_digits();
        }

        if matches!(self.peek_char(), Some('e' | 'E')) {
            let signed = matches!(self.peek_nth_char(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };

            if !self.peek_nth_char(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
                let span = self.new_span(start_position);

                return Err(self.error(
                    start_position,
                    SyntaxErrorKind::MalformedNumber(self.source.value_of_span(span).to_string()),
                ));
            }

            kind = TokenKind::FloatLiteral;
            for _ in 0..digit_at {
                self.bump();
            }
            self.read_digits();
        }

        Ok(Token {
            kind,
            span: self.new_span(start_position),
        })
    }

    fn read_fixed(&mut self, start_position: usize, length: usize, kind: TokenKind) -> Token {
        for _ in 0..length {
            self.bump();
        }

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, SyntaxError> {
        while let Some(&(start_position, c)) = self.chars.peek() {
            let token = match c {
                // Ignore whitespace
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                // Ignore comments
                '/' if self.peek_nth_char(1) == Some('/') => {
                    self.ignore_line();
                    continue;
                }

                '"' => self.read_string(start_position)?,
                n if n.is_ascii_digit() => self.read_number(start_position)?,

                // Identifiers, keywords, and boolean literals
                a if a.is_alphabetic() || a == '_' => self.read_word(start_position),

                c => {
                    let double = self
                        .peek_nth_char(1)
                        .and_then(|next| DOUBLE_TOKENS.get(&(c, next)).copied());

                    if let Some(kind) = double {
                        self.read_fixed(start_position, 2, kind)
                    } else if let Some(kind) = SINGLE_TOKENS.get(&c).copied() {
                        self.read_fixed(start_position, 1, kind)
                    } else {
                        return Err(
                            self.error(start_position, SyntaxErrorKind::UnexpectedCharacter(c))
                        );
                    }
                }
            };

            return Ok(Some(token));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::Position;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = SourceFile::from_memory(source);

        Lexer::new(&source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("ingredient x := 3 * 7 | const; // trailing"),
            vec![
                TokenKind::Keyword(Keyword::Ingredient),
                TokenKind::Identifier,
                TokenKind::ColonEquals,
                TokenKind::IntegerLiteral,
                TokenKind::Asterisk,
                TokenKind::IntegerLiteral,
                TokenKind::BitwiseOr,
                TokenKind::Keyword(Keyword::Const),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn distinguishes_ranges_from_floats() {
        assert_eq!(
            kinds("1..5 1.5 2e3 2.5e-3"),
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::DoubleDot,
                TokenKind::IntegerLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
            ]
        );
    }

    #[test]
    fn lexes_multi_char_operators() {
        assert_eq!(
            kinds("a ?? b?.c ** ++ -- -> == != <= >= << >> && ||"),
            vec![
                TokenKind::Identifier,
                TokenKind::DoubleQuestion,
                TokenKind::Identifier,
                TokenKind::QuestionDot,
                TokenKind::Identifier,
                TokenKind::DoubleAsterisk,
                TokenKind::Increment,
                TokenKind::Decrement,
                TokenKind::Arrow,
                TokenKind::DoubleEquals,
                TokenKind::NotEquals,
                TokenKind::LessThanOrEqualTo,
                TokenKind::GreaterThanOrEqualTo,
                TokenKind::ShiftLeft,
                TokenKind::ShiftRight,
                TokenKind::LogicalAnd,
                TokenKind::LogicalOr,
            ]
        );
    }

    #[test]
    fn keywords_and_booleans() {
        assert_eq!(
            kinds("Dish dish fresh stale eightysix π"),
            vec![
                TokenKind::Keyword(Keyword::Dish),
                TokenKind::Identifier,
                TokenKind::BooleanLiteral,
                TokenKind::BooleanLiteral,
                TokenKind::Keyword(Keyword::Eightysix),
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn strings_keep_escapes() {
        let source = SourceFile::from_memory(r#"serve("a\"b");"#);
        let tokens = Lexer::new(&source).tokenize().unwrap();

        assert_eq!(tokens[2].kind, TokenKind::StringLiteral);
        assert_eq!(source.value_of_span(tokens[2].span), r#""a\"b""#);
    }

    #[test]
    fn unterminated_string_is_reported() {
        let source = SourceFile::from_memory("ingredient s := \"oops;\n");
        let error = Lexer::new(&source).tokenize().unwrap_err();

        assert_eq!(error.kind, SyntaxErrorKind::UnterminatedString);
        assert_eq!(error.position, Position::new(1, 17));
    }

    #[test]
    fn unexpected_character_is_reported() {
        let source = SourceFile::from_memory("x @ y");
        let error = Lexer::new(&source).tokenize().unwrap_err();

        assert_eq!(error.to_string(), "1:3: unexpected character `@`");
    }
}
