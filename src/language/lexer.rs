use crate::language::{
    ast::Comment,
    span::{Position, Range},
    token::{Token, TokenKind},
};

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub range: Range,
}

pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

pub fn lex(source: &str) -> Result<LexOutput, Vec<LexError>> {
    let lexer = Lexer::new(source);
    lexer.run()
}

const OPERATOR_CHARS: &str = "+-/*=.<>:&|^?%!";

struct Lexer<'a> {
    chars: std::str::Chars<'a>,
    current: Option<char>,
    line: u32,
    col: u32,
    tokens: Vec<Token>,
    comments: Vec<Comment>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        let mut chars = src.chars();
        let current = chars.next();
        Self {
            chars,
            current,
            line: 1,
            col: 1,
            tokens: Vec::new(),
            comments: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Result<LexOutput, Vec<LexError>> {
        while let Some(ch) = self.current {
            match ch {
                '-' if self.peek() == Some('-') => self.eat_line_comment(),
                '{' if self.peek() == Some('-') => self.eat_block_comment(),
                ch if ch.is_whitespace() => {
                    self.bump();
                }
                ch if ch.is_alphabetic() => self.lex_name(),
                '_' => self.lex_underscore(),
                ch if ch.is_ascii_digit() => self.lex_number(),
                '"' => self.lex_string(),
                '\'' => self.lex_char(),
                '[' if self.looking_at("[glsl|") => self.lex_glsl(),
                '\\' => {
                    let start = self.pos();
                    self.bump();
                    self.push(TokenKind::Backslash, start);
                }
                ch if OPERATOR_CHARS.contains(ch) => self.lex_operator(),
                _ => self.lex_symbol(),
            }
        }
        let at_end = self.pos();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            range: Range::point(at_end),
        });

        if self.errors.is_empty() {
            Ok(LexOutput {
                tokens: self.tokens,
                comments: self.comments,
            })
        } else {
            Err(self.errors)
        }
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn bump(&mut self) -> Option<char> {
        if let Some(ch) = self.current {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.current = self.chars.next();
        self.current
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn looking_at(&self, prefix: &str) -> bool {
        let mut rest = String::new();
        if let Some(ch) = self.current {
            rest.push(ch);
        }
        rest.extend(self.chars.clone().take(prefix.len().saturating_sub(1)));
        rest.starts_with(prefix)
    }

    fn push(&mut self, kind: TokenKind, start: Position) {
        self.tokens.push(Token {
            kind,
            range: Range::new(start, self.pos()),
        });
    }

    fn error(&mut self, start: Position, message: impl Into<String>) {
        self.errors.push(LexError {
            message: message.into(),
            range: Range::new(start, self.pos()),
        });
    }

    fn eat_line_comment(&mut self) {
        let start = self.pos();
        let mut text = String::new();
        while let Some(ch) = self.current {
            if ch == '\n' {
                break;
            }
            text.push(ch);
            self.bump();
        }
        self.comments.push(Comment {
            text,
            range: Range::new(start, self.pos()),
        });
    }

    fn eat_block_comment(&mut self) {
        let start = self.pos();
        let mut text = String::new();
        let mut depth = 0u32;
        while let Some(ch) = self.current {
            if ch == '{' && self.peek() == Some('-') {
                depth += 1;
                text.push_str("{-");
                self.bump();
                self.bump();
            } else if ch == '-' && self.peek() == Some('}') {
                depth = depth.saturating_sub(1);
                text.push_str("-}");
                self.bump();
                self.bump();
                if depth == 0 {
                    self.comments.push(Comment {
                        text,
                        range: Range::new(start, self.pos()),
                    });
                    return;
                }
            } else {
                text.push(ch);
                self.bump();
            }
        }
        self.error(start, "Unterminated block comment");
    }

    fn scan_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.current {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn lex_name(&mut self) {
        let start = self.pos();
        let mut qualifier: Vec<String> = Vec::new();
        loop {
            let word = self.scan_word();
            let upper = word.chars().next().is_some_and(|ch| ch.is_uppercase());
            // An uppercase segment glued to `.letter` extends the qualifier.
            if upper
                && self.current == Some('.')
                && self.peek().is_some_and(|ch| ch.is_alphabetic() || ch == '_')
            {
                qualifier.push(word);
                self.bump();
                continue;
            }
            let kind = if qualifier.is_empty() {
                keyword(&word).unwrap_or_else(|| bare_name(word, upper))
            } else if upper {
                TokenKind::UpperName {
                    qualifier: std::mem::take(&mut qualifier),
                    name: word,
                }
            } else {
                TokenKind::LowerName {
                    qualifier: std::mem::take(&mut qualifier),
                    name: word,
                }
            };
            self.push(kind, start);
            return;
        }
    }

    fn lex_underscore(&mut self) {
        let start = self.pos();
        if self
            .peek()
            .is_some_and(|ch| ch.is_alphanumeric() || ch == '_')
        {
            let word = self.scan_word();
            self.push(
                TokenKind::LowerName {
                    qualifier: Vec::new(),
                    name: word,
                },
                start,
            );
        } else {
            self.bump();
            self.push(TokenKind::Underscore, start);
        }
    }

    fn lex_number(&mut self) {
        let start = self.pos();
        if self.current == Some('0') && self.peek() == Some('x') {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(ch) = self.current {
                if ch.is_ascii_hexdigit() {
                    digits.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            match i64::from_str_radix(&digits, 16) {
                Ok(value) => self.push(TokenKind::Hex(value), start),
                Err(_) => self.error(start, "Invalid hex literal"),
            }
            return;
        }

        let mut text = String::new();
        while let Some(ch) = self.current {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        let mut is_float = false;
        if self.current == Some('.') && self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(ch) = self.current {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.current, Some('e') | Some('E')) {
            is_float = true;
            text.push('e');
            self.bump();
            if matches!(self.current, Some('+') | Some('-')) {
                if self.current == Some('-') {
                    text.push('-');
                }
                self.bump();
            }
            while let Some(ch) = self.current {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        if is_float {
            match text.parse::<f64>() {
                Ok(value) => self.push(TokenKind::Float(value), start),
                Err(_) => self.error(start, "Invalid float literal"),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => self.push(TokenKind::Int(value), start),
                Err(_) => self.error(start, "Invalid integer literal"),
            }
        }
    }

    fn lex_string(&mut self) {
        let start = self.pos();
        if self.looking_at("\"\"\"") {
            self.bump();
            self.bump();
            self.bump();
            let mut value = String::new();
            while self.current.is_some() {
                if self.looking_at("\"\"\"") {
                    self.bump();
                    self.bump();
                    self.bump();
                    self.push(TokenKind::Str(value), start);
                    return;
                }
                if self.current == Some('\\') {
                    self.bump();
                    if let Some(escaped) = self.escape_char() {
                        value.push(escaped);
                    }
                } else {
                    value.push(self.current.unwrap_or('\0'));
                    self.bump();
                }
            }
            self.error(start, "Unterminated string literal");
            return;
        }

        self.bump();
        let mut value = String::new();
        while let Some(ch) = self.current {
            match ch {
                '"' => {
                    self.bump();
                    self.push(TokenKind::Str(value), start);
                    return;
                }
                '\n' => break,
                '\\' => {
                    self.bump();
                    if let Some(escaped) = self.escape_char() {
                        value.push(escaped);
                    }
                }
                _ => {
                    value.push(ch);
                    self.bump();
                }
            }
        }
        self.error(start, "Unterminated string literal");
    }

    fn escape_char(&mut self) -> Option<char> {
        let ch = self.current?;
        if ch == 'u' {
            self.bump();
            if self.current == Some('{') {
                self.bump();
            }
            let mut digits = String::new();
            while let Some(d) = self.current {
                if d.is_ascii_hexdigit() {
                    digits.push(d);
                    self.bump();
                } else {
                    break;
                }
            }
            if self.current == Some('}') {
                self.bump();
            }
            return u32::from_str_radix(&digits, 16)
                .ok()
                .and_then(char::from_u32);
        }
        let value = match ch {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            other => other,
        };
        self.bump();
        Some(value)
    }

    fn lex_char(&mut self) {
        let start = self.pos();
        self.bump();
        let value = if self.current == Some('\\') {
            self.bump();
            match self.escape_char() {
                Some(ch) => ch,
                None => {
                    self.error(start, "Invalid escape in character literal");
                    return;
                }
            }
        } else {
            let Some(ch) = self.current else {
                self.error(start, "Unterminated character literal");
                return;
            };
            self.bump();
            ch
        };
        if self.current != Some('\'') {
            self.error(start, "Unterminated character literal");
            return;
        }
        self.bump();
        self.push(TokenKind::Char(value), start);
    }

    fn lex_glsl(&mut self) {
        let start = self.pos();
        for _ in 0.."[glsl|".len() {
            self.bump();
        }
        let mut body = String::new();
        while self.current.is_some() {
            if self.current == Some('|') && self.peek() == Some(']') {
                self.bump();
                self.bump();
                self.push(TokenKind::Glsl(body), start);
                return;
            }
            body.push(self.current.unwrap_or('\0'));
            self.bump();
        }
        self.error(start, "Unterminated glsl block");
    }

    fn lex_operator(&mut self) {
        let start = self.pos();
        let mut op = String::new();
        while let Some(ch) = self.current {
            if OPERATOR_CHARS.contains(ch) {
                op.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        let kind = match op.as_str() {
            "=" => TokenKind::Equals,
            "->" => TokenKind::Arrow,
            ":" => TokenKind::Colon,
            "|" => TokenKind::Pipe,
            "." => TokenKind::Dot,
            ".." => TokenKind::DotDot,
            _ => TokenKind::Operator(op),
        };
        self.push(kind, start);
    }

    fn lex_symbol(&mut self) {
        let start = self.pos();
        let Some(ch) = self.current else {
            return;
        };
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            _ => {
                self.bump();
                self.error(start, format!("Unexpected character '{ch}'"));
                return;
            }
        };
        self.bump();
        self.push(kind, start);
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "module" => TokenKind::Module,
        "port" => TokenKind::Port,
        "import" => TokenKind::Import,
        "exposing" => TokenKind::Exposing,
        "as" => TokenKind::As,
        "type" => TokenKind::Type,
        "where" => TokenKind::Where,
        "if" => TokenKind::If,
        "then" => TokenKind::Then,
        "else" => TokenKind::Else,
        "case" => TokenKind::Case,
        "of" => TokenKind::Of,
        "let" => TokenKind::Let,
        "in" => TokenKind::In,
        _ => return None,
    };
    Some(kind)
}

fn bare_name(word: String, upper: bool) -> TokenKind {
    if upper {
        TokenKind::UpperName {
            qualifier: Vec::new(),
            name: word,
        }
    } else {
        TokenKind::LowerName {
            qualifier: Vec::new(),
            name: word,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .tokens
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn qualified_names_fold_into_one_token() {
        let kinds = kinds("Json.Decode.map model.field");
        assert_eq!(
            kinds[0],
            TokenKind::LowerName {
                qualifier: vec!["Json".into(), "Decode".into()],
                name: "map".into(),
            }
        );
        // `model.field` is a record access, not a qualified name.
        assert_eq!(
            kinds[1],
            TokenKind::LowerName {
                qualifier: vec![],
                name: "model".into(),
            }
        );
        assert_eq!(kinds[2], TokenKind::Dot);
        assert_eq!(
            kinds[3],
            TokenKind::LowerName {
                qualifier: vec![],
                name: "field".into(),
            }
        );
    }

    #[test]
    fn ranges_are_one_based_lines_and_columns() {
        let out = lex("module Main exposing (..)\n\nadd x =\n    x\n").expect("lex");
        let add = out
            .tokens
            .iter()
            .find(|t| t.lower_name() == Some("add"))
            .expect("add token");
        assert_eq!(add.range.start, Position::new(3, 1));
        assert_eq!(add.range.end, Position::new(3, 4));
    }

    #[test]
    fn block_comments_nest_and_are_collected() {
        let out = lex("{- outer {- inner -} still -}\nx = 1\n").expect("lex");
        assert_eq!(out.comments.len(), 1);
        assert!(out.comments[0].text.contains("inner"));
        assert_eq!(out.tokens[0].lower_name(), Some("x"));
    }

    #[test]
    fn doc_comments_keep_their_marker() {
        let out = lex("{-| Adds things. -}\nadd x = x\n").expect("lex");
        assert!(out.comments[0].text.starts_with("{-|"));
        assert_eq!(out.comments[0].range.start.line, 1);
    }

    #[test]
    fn operators_and_punctuators_are_distinguished() {
        let kinds = kinds("x = a |> b :: c .. | -> :");
        assert!(kinds.contains(&TokenKind::Equals));
        assert!(kinds.contains(&TokenKind::Operator("|>".into())));
        assert!(kinds.contains(&TokenKind::Operator("::".into())));
        assert!(kinds.contains(&TokenKind::DotDot));
        assert!(kinds.contains(&TokenKind::Pipe));
        assert!(kinds.contains(&TokenKind::Arrow));
        assert!(kinds.contains(&TokenKind::Colon));
    }

    #[test]
    fn string_and_char_literals() {
        let kinds = kinds(r#"s = "he\"llo" c = 'a' u = '\u{1F600}'"#);
        assert!(kinds.contains(&TokenKind::Str("he\"llo".into())));
        assert!(kinds.contains(&TokenKind::Char('a')));
        assert!(kinds.contains(&TokenKind::Char('\u{1F600}')));
    }

    #[test]
    fn triple_quoted_strings_span_lines() {
        let kinds = kinds("s = \"\"\"line1\nline2\"\"\"");
        assert!(kinds.contains(&TokenKind::Str("line1\nline2".into())));
    }

    #[test]
    fn numbers_ints_hex_floats() {
        let kinds = kinds("a = 42 b = 0x2A c = 4.5 d = 1e3");
        assert!(kinds.contains(&TokenKind::Int(42)));
        assert!(kinds.contains(&TokenKind::Hex(42)));
        assert!(kinds.contains(&TokenKind::Float(4.5)));
        assert!(kinds.contains(&TokenKind::Float(1000.0)));
    }
}
