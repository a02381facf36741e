use std::fmt;

/// Kind of a lexed token.
///
/// The `Display` form is what parse diagnostics print for the offending
/// token, so keywords render as their source spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Illegal,
    Text,
    LeftDelim,
    RightDelim,
    Dollar,
    Ident,
    Number,
    String,
    Comment,
    Pipe,
    Dot,
    LeftBracket,
    RightBracket,
    Assign,

    // Comparisons
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,

    // Logical keywords
    And,
    Or,

    // Control keywords
    If,
    Else,
    ElseIf,
    EndIf,
    Foreach,
    ForeachElse,
    EndForeach,
    Literal,
    EndLiteral,
}

impl TokenKind {
    /// Source spelling for punctuation and keywords, an upper-case class
    /// name for everything else.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Eof => "EOF",
            TokenKind::Illegal => "ILLEGAL",
            TokenKind::Text => "TEXT",
            TokenKind::LeftDelim => "{",
            TokenKind::RightDelim => "}",
            TokenKind::Dollar => "$",
            TokenKind::Ident => "IDENT",
            TokenKind::Number => "NUMBER",
            TokenKind::String => "STRING",
            TokenKind::Comment => "COMMENT",
            TokenKind::Pipe => "|",
            TokenKind::Dot => ".",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::Assign => "=",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Lte => "<=",
            TokenKind::Gt => ">",
            TokenKind::Gte => ">=",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::ElseIf => "elseif",
            TokenKind::EndIf => "/if",
            TokenKind::Foreach => "foreach",
            TokenKind::ForeachElse => "foreachelse",
            TokenKind::EndForeach => "/foreach",
            TokenKind::Literal => "literal",
            TokenKind::EndLiteral => "/literal",
        }
    }

    /// Reclassify an identifier as a keyword, if it is one.
    pub fn lookup_ident(ident: &str) -> TokenKind {
        match ident {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "elseif" => TokenKind::ElseIf,
            "/if" => TokenKind::EndIf,
            "foreach" => TokenKind::Foreach,
            "foreachelse" => TokenKind::ForeachElse,
            "/foreach" => TokenKind::EndForeach,
            "literal" => TokenKind::Literal,
            "/literal" => TokenKind::EndLiteral,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            _ => TokenKind::Ident,
        }
    }

    /// Identifier-shaped tokens: plain identifiers and every keyword.
    ///
    /// Used where a name is expected after `.` or `|`, so that
    /// `$smarty.foreach.loop` still reads as a property chain.
    pub fn is_word(self) -> bool {
        matches!(
            self,
            TokenKind::Ident
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::ElseIf
                | TokenKind::Foreach
                | TokenKind::ForeachElse
                | TokenKind::Literal
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single token. `literal` borrows from the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub literal: &'a str,
    /// 1-based line of the first character.
    pub line: usize,
    /// 1-based column of the first character, counted in chars.
    pub column: usize,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, literal: &'a str, line: usize, column: usize) -> Self {
        Self {
            kind,
            literal,
            line,
            column,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}
