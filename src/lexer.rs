use crate::token::{Token, TokenKind};

/// Scanning mode. Text outside tags, tag contents, or the raw body of a
/// `{literal}` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Tag,
    Raw,
}

const END_LITERAL: &str = "{/literal}";

/// Lazy tokenizer over template source.
///
/// Never fails: characters it does not understand come back as
/// [`TokenKind::Illegal`] tokens and the parser reports them. After the
/// input is exhausted every call returns [`TokenKind::Eof`].
#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    line: usize,
    column: usize,
    mode: Mode,
    // The last two token kinds handed out; `{literal}` is recognised from these.
    recent: [TokenKind; 2],
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            line: 1,
            column: 1,
            mode: Mode::Text,
            recent: [TokenKind::Eof, TokenKind::Eof],
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.cursor += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek_char(), Some(' ' | '\t' | '\r' | '\n')) {
            self.bump();
        }
    }

    fn token_from(&self, kind: TokenKind, start: usize, line: usize, column: usize) -> Token<'a> {
        Token::new(kind, &self.input[start..self.cursor], line, column)
    }

    pub fn next_token(&mut self) -> Token<'a> {
        let token = match self.mode {
            Mode::Text => self.next_in_text(),
            Mode::Tag => self.next_in_tag(),
            Mode::Raw => self.next_in_raw(),
        };
        self.recent = [self.recent[1], token.kind];
        token
    }

    fn next_in_text(&mut self) -> Token<'a> {
        let (start, line, column) = (self.cursor, self.line, self.column);
        while let Some(c) = self.peek_char() {
            if c == '{' {
                break;
            }
            self.bump();
        }

        if self.cursor > start {
            return self.token_from(TokenKind::Text, start, line, column);
        }

        if self.peek_char() == Some('{') {
            self.mode = Mode::Tag;
            return self.next_in_tag();
        }

        Token::new(TokenKind::Eof, "", line, column)
    }

    fn next_in_tag(&mut self) -> Token<'a> {
        self.skip_whitespace();

        let (start, line, column) = (self.cursor, self.line, self.column);
        let Some(ch) = self.peek_char() else {
            return Token::new(TokenKind::Eof, "", line, column);
        };

        let kind = match ch {
            '{' if self.peek_second() == Some('*') => return self.read_comment(),
            '{' => {
                self.bump();
                TokenKind::LeftDelim
            }
            '}' => {
                self.bump();
                self.mode = if self.recent == [TokenKind::LeftDelim, TokenKind::Literal] {
                    Mode::Raw
                } else {
                    Mode::Text
                };
                TokenKind::RightDelim
            }
            '$' => self.single(TokenKind::Dollar),
            '|' => self.single(TokenKind::Pipe),
            '.' => self.single(TokenKind::Dot),
            '[' => self.single(TokenKind::LeftBracket),
            ']' => self.single(TokenKind::RightBracket),
            '=' => self.one_or_two('=', TokenKind::Assign, TokenKind::Eq),
            '!' => self.one_or_two('=', TokenKind::Illegal, TokenKind::NotEq),
            '<' => self.one_or_two('=', TokenKind::Lt, TokenKind::Lte),
            '>' => self.one_or_two('=', TokenKind::Gt, TokenKind::Gte),
            '"' | '\'' => return self.read_string(ch),
            c if c.is_alphabetic() || c == '/' => return self.read_identifier(),
            c if c.is_ascii_digit() => return self.read_number(),
            _ => self.single(TokenKind::Illegal),
        };

        self.token_from(kind, start, line, column)
    }

    fn next_in_raw(&mut self) -> Token<'a> {
        self.mode = Mode::Text;
        let (start, line, column) = (self.cursor, self.line, self.column);
        let body_len = self
            .remaining()
            .find(END_LITERAL)
            .unwrap_or(self.remaining().len());
        if body_len == 0 {
            return self.next_in_text();
        }
        while self.cursor < start + body_len {
            self.bump();
        }
        self.token_from(TokenKind::Text, start, line, column)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn one_or_two(&mut self, second: char, one: TokenKind, two: TokenKind) -> TokenKind {
        self.bump();
        if self.peek_char() == Some(second) {
            self.bump();
            two
        } else {
            one
        }
    }

    fn read_identifier(&mut self) -> Token<'a> {
        let (start, line, column) = (self.cursor, self.line, self.column);
        // Closing tags such as `/if` keep their slash.
        if self.peek_char() == Some('/') {
            self.bump();
        }
        while matches!(self.peek_char(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        let literal = &self.input[start..self.cursor];
        Token::new(TokenKind::lookup_ident(literal), literal, line, column)
    }

    fn read_number(&mut self) -> Token<'a> {
        let (start, line, column) = (self.cursor, self.line, self.column);
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        self.token_from(TokenKind::Number, start, line, column)
    }

    /// Reads a quoted string. No escapes; an unterminated string runs to the
    /// end of input.
    fn read_string(&mut self, quote: char) -> Token<'a> {
        let (line, column) = (self.line, self.column);
        self.bump();
        let start = self.cursor;
        while matches!(self.peek_char(), Some(c) if c != quote) {
            self.bump();
        }
        let literal = &self.input[start..self.cursor];
        self.bump();
        Token::new(TokenKind::String, literal, line, column)
    }

    /// Reads `{* ... *}`. The literal is the comment body; an unterminated
    /// comment runs to the end of input. Scanning resumes in text mode.
    fn read_comment(&mut self) -> Token<'a> {
        let (line, column) = (self.line, self.column);
        self.bump();
        self.bump();
        let start = self.cursor;
        let body_len = self
            .remaining()
            .find("*}")
            .unwrap_or(self.remaining().len());
        while self.cursor < start + body_len {
            self.bump();
        }
        let literal = &self.input[start..self.cursor];
        self.bump();
        self.bump();
        self.mode = Mode::Text;
        Token::new(TokenKind::Comment, literal, line, column)
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    /// Yields tokens up to, but not including, end of input.
    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.next_token();
        (!token.is(TokenKind::Eof)).then_some(token)
    }
}
