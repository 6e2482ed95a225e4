use crate::language::span::Range;

#[derive(Clone, Debug)]
pub struct SyntaxError {
    pub message: String,
    pub range: Range,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, range: Range) -> Self {
        Self {
            message: message.into(),
            range,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SyntaxErrors {
    pub errors: Vec<SyntaxError>,
}

impl SyntaxErrors {
    pub fn new(errors: Vec<SyntaxError>) -> Self {
        Self { errors }
    }
}
