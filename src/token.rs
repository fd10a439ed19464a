use std::fmt;

/// A row/column position in the source text, 1-based.
///
/// [`Location::UNKNOWN`] is a wildcard that compares equal to any other
/// location. Tests that don't care about positions use it; real diagnostics
/// never produce it. Because equality is non-structural, `Location` gets no
/// `Eq`/`Hash` derives.
#[derive(Copy, Clone, Debug)]
pub struct Location {
    pub row: u32,
    pub col: u32,
}

impl Location {
    pub const UNKNOWN: Location = Location {
        row: u32::MAX,
        col: u32::MAX,
    };

    pub fn new(row: u32, col: u32) -> Location {
        Location { row, col }
    }

    pub fn is_unknown(self) -> bool {
        self.row == u32::MAX
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        if self.is_unknown() || other.is_unknown() {
            return true;
        }
        self.row == other.row && self.col == other.col
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "(?, ?)")
        } else {
            write!(f, "({}, {})", self.row, self.col)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Location,
}

impl Token {
    pub fn new(kind: TokenKind, loc: Location) -> Token {
        Token { kind, loc }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    If,
    Then,
    Else,
    While,
    Do,
    Var,
    Fun,
    Return,
    Break,
    Continue,
    And,
    Or,
    Not,
    True,
    False,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `=`
    Assign,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Colon,
    Semicolon,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,

    Identifier(String),
    Int(i64),

    Eof,
}

impl TokenKind {
    /// How the token reads in source, used by parser diagnostics.
    pub fn describe(&self) -> String {
        use TokenKind::*;
        let s = match self {
            If => "if",
            Then => "then",
            Else => "else",
            While => "while",
            Do => "do",
            Var => "var",
            Fun => "fun",
            Return => "return",
            Break => "break",
            Continue => "continue",
            And => "and",
            Or => "or",
            Not => "not",
            True => "true",
            False => "false",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Assign => "=",
            EqEq => "==",
            NotEq => "!=",
            Less => "<",
            LessEq => "<=",
            Greater => ">",
            GreaterEq => ">=",
            Colon => ":",
            Semicolon => ";",
            Comma => ",",
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            Identifier(name) => return format!("identifier `{name}`"),
            Int(value) => return format!("integer `{value}`"),
            Eof => return "end of input".to_owned(),
        };
        format!("`{s}`")
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "if" => TokenKind::If,
    "then" => TokenKind::Then,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "do" => TokenKind::Do,
    "var" => TokenKind::Var,
    "fun" => TokenKind::Fun,
    "return" => TokenKind::Return,
    "break" => TokenKind::Break,
    "continue" => TokenKind::Continue,
    "and" => TokenKind::And,
    "or" => TokenKind::Or,
    "not" => TokenKind::Not,
    "true" => TokenKind::True,
    "false" => TokenKind::False,
};
