use crate::language::span::Range;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: Range,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Possibly qualified lowercase identifier: `map`, `String.length`.
    LowerName {
        qualifier: Vec<String>,
        name: String,
    },
    /// Possibly qualified uppercase identifier: `Maybe`, `Json.Decode`.
    UpperName {
        qualifier: Vec<String>,
        name: String,
    },
    Int(i64),
    Hex(i64),
    Float(f64),
    Str(String),
    Char(char),
    Glsl(String),

    Module,
    Port,
    Import,
    Exposing,
    As,
    Type,
    Where,
    If,
    Then,
    Else,
    Case,
    Of,
    Let,
    In,

    /// Symbolic operator that is not one of the reserved punctuators.
    Operator(String),
    Equals,
    Arrow,
    Colon,
    Pipe,
    Backslash,
    Dot,
    DotDot,
    Underscore,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl Token {
    pub fn lower_name(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::LowerName { qualifier, name } if qualifier.is_empty() => Some(name),
            _ => None,
        }
    }

    pub fn upper_name(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::UpperName { qualifier, name } if qualifier.is_empty() => Some(name),
            _ => None,
        }
    }

    /// The full dotted spelling of a name token, e.g. `Json.Decode.map`.
    pub fn dotted(&self) -> Option<String> {
        match &self.kind {
            TokenKind::LowerName { qualifier, name }
            | TokenKind::UpperName { qualifier, name } => {
                let mut parts = qualifier.clone();
                parts.push(name.clone());
                Some(parts.join("."))
            }
            _ => None,
        }
    }
}
