use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::{Position, Range},
    token::{Token, TokenKind},
};

pub fn parse(source: &str) -> Result<Ast, SyntaxErrors> {
    let output = match lex(source) {
        Ok(output) => output,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.range))
                .collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(output.tokens, output.comments).parse()
}

struct Parser {
    tokens: Vec<Token>,
    comments: Vec<Comment>,
    pos: usize,
    prev_end: Position,
    errors: Vec<SyntaxError>,
}

impl Parser {
    fn new(tokens: Vec<Token>, comments: Vec<Comment>) -> Self {
        Self {
            tokens,
            comments,
            pos: 0,
            prev_end: Position::new(1, 1),
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Ast, SyntaxErrors> {
        let header = match self.parse_module_header() {
            Ok(header) => header,
            Err(err) => {
                self.errors.push(err);
                return Err(SyntaxErrors::new(self.errors));
            }
        };

        let mut imports = Vec::new();
        while self.check(&TokenKind::Import) {
            match self.parse_import() {
                Ok(import) => imports.push(import),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }

        let mut declarations = Vec::new();
        while !self.is_eof() {
            match self.parse_declaration() {
                Ok(decl) => declarations.push(decl),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(Ast {
                header,
                imports,
                declarations,
                comments: self.comments,
            })
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    // Token plumbing

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn is_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !self.is_eof() {
            self.prev_end = token.range.end;
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.kind() == kind
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<Token, SyntaxError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message, self.current().range)
    }

    /// A continuation token must be indented past `min_col`.
    fn layout_ok(&self, min_col: u32) -> bool {
        !self.is_eof() && self.current().range.start.col > min_col
    }

    fn col(&self) -> u32 {
        self.current().range.start.col
    }

    /// Skip to the next top-level declaration start.
    fn synchronize(&mut self) {
        loop {
            if self.is_eof() {
                return;
            }
            self.advance();
            if self.col() == 1 && !self.is_eof() {
                return;
            }
        }
    }

    fn doc_comment_before(&self, line: u32) -> Option<Comment> {
        self.comments
            .iter()
            .find(|comment| comment.is_doc() && comment.range.end.line + 1 == line)
            .cloned()
    }

    // Header and imports

    fn parse_module_header(&mut self) -> Result<ModuleHeader, SyntaxError> {
        let start = self.current().range.start;
        let kind = if self.matches(&TokenKind::Port) {
            self.expect(&TokenKind::Module, "Expected `module` after `port`")?;
            ModuleKind::Port
        } else if self.current().lower_name() == Some("effect") {
            self.advance();
            self.expect(&TokenKind::Module, "Expected `module` after `effect`")?;
            ModuleKind::Effect
        } else if self.matches(&TokenKind::Module) {
            ModuleKind::Normal
        } else {
            return Err(self.error_here("Expected module header"));
        };

        let name = self.expect_module_name()?;

        if kind == ModuleKind::Effect && self.matches(&TokenKind::Where) {
            self.skip_effect_manager_record()?;
        }

        self.expect(&TokenKind::Exposing, "Expected `exposing`")?;
        let exposing = self.parse_exposing_list()?;
        Ok(ModuleHeader {
            kind,
            name,
            exposing,
            range: Range::new(start, self.prev_end),
        })
    }

    fn expect_module_name(&mut self) -> Result<Name, SyntaxError> {
        match self.kind().clone() {
            TokenKind::UpperName { qualifier, name } => {
                let token = self.advance();
                let mut parts = qualifier;
                parts.push(name);
                Ok(Name {
                    value: parts.join("."),
                    range: token.range,
                })
            }
            _ => Err(self.error_here("Expected module name")),
        }
    }

    fn skip_effect_manager_record(&mut self) -> Result<(), SyntaxError> {
        self.expect(&TokenKind::LBrace, "Expected `{` after `where`")?;
        let mut depth = 1u32;
        while depth > 0 {
            if self.is_eof() {
                return Err(self.error_here("Unterminated effect manager record"));
            }
            match self.kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                _ => {}
            }
            self.advance();
        }
        Ok(())
    }

    fn parse_exposing_list(&mut self) -> Result<ExposingList, SyntaxError> {
        self.expect(&TokenKind::LParen, "Expected `(` after `exposing`")?;
        if self.check(&TokenKind::DotDot) {
            let token = self.advance();
            self.expect(&TokenKind::RParen, "Expected `)` after `..`")?;
            return Ok(ExposingList::All(token.range));
        }

        let mut items = Vec::new();
        loop {
            items.push(self.parse_exposed_item()?);
            if self.matches(&TokenKind::Comma) {
                continue;
            }
            break;
        }
        self.expect(&TokenKind::RParen, "Expected `)` to close exposing list")?;
        Ok(ExposingList::Explicit(items))
    }

    fn parse_exposed_item(&mut self) -> Result<ExposedItem, SyntaxError> {
        match self.kind().clone() {
            TokenKind::LowerName { qualifier, name } if qualifier.is_empty() => {
                let token = self.advance();
                Ok(ExposedItem {
                    kind: ExposedKind::Value,
                    name,
                    range: token.range,
                })
            }
            TokenKind::UpperName { qualifier, name } if qualifier.is_empty() => {
                let token = self.advance();
                let mut range = token.range;
                let kind = if self.check(&TokenKind::LParen) {
                    let open_start = self.advance().range.start;
                    self.expect(&TokenKind::DotDot, "Expected `..` in type exposing")?;
                    let close = self.expect(&TokenKind::RParen, "Expected `)` after `..`")?;
                    range = Range::new(range.start, close.range.end);
                    ExposedKind::Type {
                        open: Some(Range::new(open_start, close.range.end)),
                    }
                } else {
                    ExposedKind::TypeOrAlias
                };
                Ok(ExposedItem { kind, name, range })
            }
            TokenKind::LParen => {
                let open = self.advance();
                let name = match self.kind().clone() {
                    TokenKind::Operator(op) => {
                        self.advance();
                        op
                    }
                    TokenKind::Comma => {
                        let mut text = String::new();
                        while self.check(&TokenKind::Comma) {
                            self.advance();
                            text.push(',');
                        }
                        text
                    }
                    _ => return Err(self.error_here("Expected operator in exposing list")),
                };
                let close = self.expect(&TokenKind::RParen, "Expected `)` after operator")?;
                Ok(ExposedItem {
                    kind: ExposedKind::Infix,
                    name,
                    range: Range::new(open.range.start, close.range.end),
                })
            }
            _ => Err(self.error_here("Expected exposing list item")),
        }
    }

    fn parse_import(&mut self) -> Result<Import, SyntaxError> {
        let start = self
            .expect(&TokenKind::Import, "Expected `import`")?
            .range
            .start;
        let module_name = self.expect_module_name()?;
        let alias = if self.matches(&TokenKind::As) {
            match self.kind().clone() {
                TokenKind::UpperName { qualifier, name } if qualifier.is_empty() => {
                    let token = self.advance();
                    Some(Name {
                        value: name,
                        range: token.range,
                    })
                }
                _ => return Err(self.error_here("Expected alias name after `as`")),
            }
        } else {
            None
        };
        let exposing = if self.matches(&TokenKind::Exposing) {
            Some(self.parse_exposing_list()?)
        } else {
            None
        };
        Ok(Import {
            module_name,
            alias,
            exposing,
            range: Range::new(start, self.prev_end),
        })
    }

    // Declarations

    fn parse_declaration(&mut self) -> Result<Declaration, SyntaxError> {
        let start_line = self.current().range.start.line;
        let documentation = self.doc_comment_before(start_line);

        match self.kind().clone() {
            TokenKind::Type => self.parse_type_declaration(documentation),
            TokenKind::Port => self.parse_port_declaration(),
            TokenKind::LowerName { qualifier, name } if qualifier.is_empty() => {
                if name == "infix" {
                    self.parse_infix_declaration()
                } else {
                    self.parse_value_declaration(documentation)
                }
            }
            TokenKind::LParen | TokenKind::LBrace | TokenKind::Underscore => {
                let start = self.current().range.start;
                let pattern = self.parse_pattern(1)?;
                self.expect(&TokenKind::Equals, "Expected `=` after pattern")?;
                let expression = self.parse_expression(1)?;
                Ok(Declaration::Destructuring(DestructuringDecl {
                    pattern,
                    expression,
                    range: Range::new(start, self.prev_end),
                }))
            }
            _ => Err(self.error_here("Expected declaration")),
        }
    }

    fn parse_type_declaration(
        &mut self,
        documentation: Option<Comment>,
    ) -> Result<Declaration, SyntaxError> {
        let start = self.advance().range.start;
        if self.current().lower_name() == Some("alias") {
            self.advance();
            let name = self.expect_upper_bare("Expected type alias name")?;
            let generics = self.parse_generics();
            self.expect(&TokenKind::Equals, "Expected `=` in type alias")?;
            let type_annotation = self.parse_type_annotation(1)?;
            return Ok(Declaration::TypeAlias(TypeAliasDecl {
                documentation,
                name,
                generics,
                type_annotation,
                range: Range::new(start, self.prev_end),
            }));
        }

        let name = self.expect_upper_bare("Expected type name")?;
        let generics = self.parse_generics();
        self.expect(&TokenKind::Equals, "Expected `=` in type declaration")?;
        let mut constructors = vec![self.parse_constructor()?];
        while self.check(&TokenKind::Pipe) && self.layout_ok(1) {
            self.advance();
            constructors.push(self.parse_constructor()?);
        }
        Ok(Declaration::CustomType(CustomTypeDecl {
            documentation,
            name,
            generics,
            constructors,
            range: Range::new(start, self.prev_end),
        }))
    }

    fn parse_constructor(&mut self) -> Result<ValueConstructor, SyntaxError> {
        let name = self.expect_upper_bare("Expected constructor name")?;
        let start = name.range.start;
        let mut arguments = Vec::new();
        while self.type_atom_starts() && self.layout_ok(1) {
            arguments.push(self.parse_type_atom(1)?);
        }
        Ok(ValueConstructor {
            name,
            arguments,
            range: Range::new(start, self.prev_end),
        })
    }

    fn parse_port_declaration(&mut self) -> Result<Declaration, SyntaxError> {
        let start = self.advance().range.start;
        let name = self.expect_lower_bare("Expected port name")?;
        self.expect(&TokenKind::Colon, "Expected `:` after port name")?;
        let type_annotation = self.parse_type_annotation(1)?;
        let range = Range::new(start, self.prev_end);
        Ok(Declaration::Port(PortDecl {
            signature: Signature {
                range: Range::new(name.range.start, range.end),
                name,
                type_annotation,
            },
            range,
        }))
    }

    fn parse_infix_declaration(&mut self) -> Result<Declaration, SyntaxError> {
        let start = self.advance().range.start;
        let direction = self.expect_lower_bare("Expected infix direction")?;
        let precedence = match self.kind().clone() {
            TokenKind::Int(value) => {
                self.advance();
                value
            }
            _ => return Err(self.error_here("Expected infix precedence")),
        };
        self.expect(&TokenKind::LParen, "Expected `(` around operator")?;
        let operator = match self.kind().clone() {
            TokenKind::Operator(op) => {
                let token = self.advance();
                Name {
                    value: op,
                    range: token.range,
                }
            }
            _ => return Err(self.error_here("Expected operator symbol")),
        };
        self.expect(&TokenKind::RParen, "Expected `)` after operator")?;
        self.expect(&TokenKind::Equals, "Expected `=` in infix declaration")?;
        let function = self.expect_lower_bare("Expected function name")?;
        Ok(Declaration::Infix(InfixDecl {
            direction,
            precedence,
            operator,
            function,
            range: Range::new(start, self.prev_end),
        }))
    }

    fn parse_value_declaration(
        &mut self,
        documentation: Option<Comment>,
    ) -> Result<Declaration, SyntaxError> {
        let decl_col = self.col();
        let name = self.expect_lower_bare("Expected declaration name")?;

        if self.matches(&TokenKind::Colon) {
            let type_annotation = self.parse_type_annotation(decl_col)?;
            let signature = Signature {
                range: Range::new(name.range.start, self.prev_end),
                name: name.clone(),
                type_annotation,
            };
            if self.current().lower_name() != Some(name.value.as_str()) || self.col() != decl_col {
                return Err(self.error_here("Expected implementation after type annotation"));
            }
            let impl_name = self.expect_lower_bare("Expected declaration name")?;
            let mut decl = self.parse_function_body(impl_name, decl_col)?;
            decl.documentation = documentation;
            decl.range = Range::new(signature.range.start, decl.range.end);
            decl.signature = Some(signature);
            return Ok(Declaration::Function(decl));
        }

        let mut decl = self.parse_function_body(name, decl_col)?;
        decl.documentation = documentation;
        Ok(Declaration::Function(decl))
    }

    fn parse_function_body(
        &mut self,
        name: Name,
        min_col: u32,
    ) -> Result<FunctionDecl, SyntaxError> {
        let start = name.range.start;
        let mut arguments = Vec::new();
        while self.pattern_atom_starts() && self.layout_ok(min_col) {
            arguments.push(self.parse_pattern_atomic(min_col)?);
        }
        self.expect(&TokenKind::Equals, "Expected `=` in declaration")?;
        let expression = self.parse_expression(min_col)?;
        Ok(FunctionDecl {
            documentation: None,
            signature: None,
            name,
            arguments,
            expression,
            range: Range::new(start, self.prev_end),
        })
    }

    fn parse_generics(&mut self) -> Vec<Name> {
        let mut generics = Vec::new();
        while let TokenKind::LowerName { qualifier, name } = self.kind().clone() {
            if !qualifier.is_empty() {
                break;
            }
            let token = self.advance();
            generics.push(Name {
                value: name,
                range: token.range,
            });
        }
        generics
    }

    fn expect_lower_bare(&mut self, message: &str) -> Result<Name, SyntaxError> {
        match self.kind().clone() {
            TokenKind::LowerName { qualifier, name } if qualifier.is_empty() => {
                let token = self.advance();
                Ok(Name {
                    value: name,
                    range: token.range,
                })
            }
            _ => Err(self.error_here(message)),
        }
    }

    fn expect_upper_bare(&mut self, message: &str) -> Result<Name, SyntaxError> {
        match self.kind().clone() {
            TokenKind::UpperName { qualifier, name } if qualifier.is_empty() => {
                let token = self.advance();
                Ok(Name {
                    value: name,
                    range: token.range,
                })
            }
            _ => Err(self.error_here(message)),
        }
    }

    // Type annotations

    fn type_atom_starts(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::UpperName { .. }
                | TokenKind::LowerName { .. }
                | TokenKind::LParen
                | TokenKind::LBrace
        )
    }

    fn parse_type_annotation(&mut self, min_col: u32) -> Result<TypeAnnotation, SyntaxError> {
        let left = self.parse_type_application(min_col)?;
        if self.check(&TokenKind::Arrow) && self.layout_ok(min_col) {
            self.advance();
            let right = self.parse_type_annotation(min_col)?;
            let range = left.range.merge(right.range);
            return Ok(TypeAnnotation {
                kind: TypeAnnotationKind::Function {
                    left: Box::new(left),
                    right: Box::new(right),
                },
                range,
            });
        }
        Ok(left)
    }

    fn parse_type_application(&mut self, min_col: u32) -> Result<TypeAnnotation, SyntaxError> {
        let head = self.parse_type_atom(min_col)?;
        if let TypeAnnotationKind::Typed {
            module_parts,
            name,
            ..
        } = &head.kind
        {
            let (module_parts, name) = (module_parts.clone(), name.clone());
            let mut args = Vec::new();
            while self.type_atom_starts() && self.layout_ok(min_col) {
                args.push(self.parse_type_atom(min_col)?);
            }
            if !args.is_empty() {
                let range = args
                    .iter()
                    .fold(head.range, |range, arg| range.merge(arg.range));
                return Ok(TypeAnnotation {
                    kind: TypeAnnotationKind::Typed {
                        module_parts,
                        name,
                        args,
                    },
                    range,
                });
            }
        }
        Ok(head)
    }

    fn parse_type_atom(&mut self, min_col: u32) -> Result<TypeAnnotation, SyntaxError> {
        match self.kind().clone() {
            TokenKind::UpperName { qualifier, name } => {
                let token = self.advance();
                Ok(TypeAnnotation {
                    kind: TypeAnnotationKind::Typed {
                        module_parts: qualifier,
                        name,
                        args: Vec::new(),
                    },
                    range: token.range,
                })
            }
            TokenKind::LowerName { qualifier, name } if qualifier.is_empty() => {
                let token = self.advance();
                Ok(TypeAnnotation {
                    kind: TypeAnnotationKind::Generic(name),
                    range: token.range,
                })
            }
            TokenKind::LParen => {
                let open = self.advance();
                if self.check(&TokenKind::RParen) {
                    let close = self.advance();
                    return Ok(TypeAnnotation {
                        kind: TypeAnnotationKind::Unit,
                        range: Range::new(open.range.start, close.range.end),
                    });
                }
                let first = self.parse_type_annotation(0)?;
                let mut items = vec![first];
                while self.matches(&TokenKind::Comma) {
                    items.push(self.parse_type_annotation(0)?);
                }
                let close = self.expect(&TokenKind::RParen, "Expected `)` in type")?;
                let range = Range::new(open.range.start, close.range.end);
                if items.len() == 1 {
                    let mut only = items.remove(0);
                    only.range = range;
                    Ok(only)
                } else {
                    Ok(TypeAnnotation {
                        kind: TypeAnnotationKind::Tupled(items),
                        range,
                    })
                }
            }
            TokenKind::LBrace => self.parse_record_type(min_col),
            _ => Err(self.error_here("Expected type")),
        }
    }

    fn parse_record_type(&mut self, _min_col: u32) -> Result<TypeAnnotation, SyntaxError> {
        let open = self.advance();
        if self.check(&TokenKind::RBrace) {
            let close = self.advance();
            return Ok(TypeAnnotation {
                kind: TypeAnnotationKind::Record(Vec::new()),
                range: Range::new(open.range.start, close.range.end),
            });
        }
        let first = self.expect_lower_bare("Expected record field or type variable")?;
        if self.matches(&TokenKind::Pipe) {
            let fields = self.parse_record_fields()?;
            let close = self.expect(&TokenKind::RBrace, "Expected `}` in record type")?;
            return Ok(TypeAnnotation {
                kind: TypeAnnotationKind::GenericRecord {
                    generic: first,
                    fields,
                },
                range: Range::new(open.range.start, close.range.end),
            });
        }
        self.expect(&TokenKind::Colon, "Expected `:` after record field")?;
        let first_ty = self.parse_type_annotation(0)?;
        let mut fields = vec![RecordField {
            range: first.range.merge(first_ty.range),
            name: first,
            type_annotation: first_ty,
        }];
        while self.matches(&TokenKind::Comma) {
            fields.push(self.parse_record_field()?);
        }
        let close = self.expect(&TokenKind::RBrace, "Expected `}` in record type")?;
        Ok(TypeAnnotation {
            kind: TypeAnnotationKind::Record(fields),
            range: Range::new(open.range.start, close.range.end),
        })
    }

    fn parse_record_fields(&mut self) -> Result<Vec<RecordField>, SyntaxError> {
        let mut fields = vec![self.parse_record_field()?];
        while self.matches(&TokenKind::Comma) {
            fields.push(self.parse_record_field()?);
        }
        Ok(fields)
    }

    fn parse_record_field(&mut self) -> Result<RecordField, SyntaxError> {
        let name = self.expect_lower_bare("Expected record field name")?;
        self.expect(&TokenKind::Colon, "Expected `:` after record field")?;
        let type_annotation = self.parse_type_annotation(0)?;
        Ok(RecordField {
            range: name.range.merge(type_annotation.range),
            name,
            type_annotation,
        })
    }

    // Patterns

    fn pattern_atom_starts(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Underscore
                | TokenKind::LowerName { .. }
                | TokenKind::UpperName { .. }
                | TokenKind::Int(_)
                | TokenKind::Hex(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Char(_)
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
        )
    }

    fn parse_pattern(&mut self, min_col: u32) -> Result<Pattern, SyntaxError> {
        let head = self.parse_pattern_application(min_col)?;
        if let TokenKind::Operator(op) = self.kind() {
            if op == "::" {
                self.advance();
                let tail = self.parse_pattern(min_col)?;
                let range = head.range.merge(tail.range);
                return self.maybe_as_pattern(Pattern {
                    kind: PatternKind::UnCons {
                        head: Box::new(head),
                        tail: Box::new(tail),
                    },
                    range,
                });
            }
        }
        self.maybe_as_pattern(head)
    }

    fn maybe_as_pattern(&mut self, pattern: Pattern) -> Result<Pattern, SyntaxError> {
        if self.matches(&TokenKind::As) {
            let name = self.expect_lower_bare("Expected name after `as`")?;
            let range = pattern.range.merge(name.range);
            return Ok(Pattern {
                kind: PatternKind::As {
                    pattern: Box::new(pattern),
                    name,
                },
                range,
            });
        }
        Ok(pattern)
    }

    fn parse_pattern_application(&mut self, min_col: u32) -> Result<Pattern, SyntaxError> {
        if let TokenKind::UpperName { qualifier, name } = self.kind().clone() {
            let token = self.advance();
            let mut patterns = Vec::new();
            while self.pattern_atom_starts() && self.layout_ok(min_col) {
                patterns.push(self.parse_pattern_atomic(min_col)?);
            }
            let range = patterns
                .iter()
                .fold(token.range, |range, p| range.merge(p.range));
            return Ok(Pattern {
                kind: PatternKind::Named {
                    module_parts: qualifier,
                    name,
                    patterns,
                },
                range,
            });
        }
        self.parse_pattern_atomic(min_col)
    }

    fn parse_pattern_atomic(&mut self, min_col: u32) -> Result<Pattern, SyntaxError> {
        match self.kind().clone() {
            TokenKind::Underscore => {
                let token = self.advance();
                Ok(Pattern {
                    kind: PatternKind::Wildcard,
                    range: token.range,
                })
            }
            TokenKind::LowerName { qualifier, name } if qualifier.is_empty() => {
                let token = self.advance();
                Ok(Pattern {
                    kind: PatternKind::Var(name),
                    range: token.range,
                })
            }
            TokenKind::UpperName { qualifier, name } => {
                let token = self.advance();
                Ok(Pattern {
                    kind: PatternKind::Named {
                        module_parts: qualifier,
                        name,
                        patterns: Vec::new(),
                    },
                    range: token.range,
                })
            }
            TokenKind::Int(value) => {
                let token = self.advance();
                Ok(Pattern {
                    kind: PatternKind::Int(value),
                    range: token.range,
                })
            }
            TokenKind::Hex(value) => {
                let token = self.advance();
                Ok(Pattern {
                    kind: PatternKind::Hex(value),
                    range: token.range,
                })
            }
            TokenKind::Float(value) => {
                let token = self.advance();
                Ok(Pattern {
                    kind: PatternKind::Float(value),
                    range: token.range,
                })
            }
            TokenKind::Str(value) => {
                let token = self.advance();
                Ok(Pattern {
                    kind: PatternKind::String(value),
                    range: token.range,
                })
            }
            TokenKind::Char(value) => {
                let token = self.advance();
                Ok(Pattern {
                    kind: PatternKind::Char(value),
                    range: token.range,
                })
            }
            TokenKind::LParen => {
                let open = self.advance();
                if self.check(&TokenKind::RParen) {
                    let close = self.advance();
                    return Ok(Pattern {
                        kind: PatternKind::Unit,
                        range: Range::new(open.range.start, close.range.end),
                    });
                }
                let first = self.parse_pattern(0)?;
                let mut items = vec![first];
                while self.matches(&TokenKind::Comma) {
                    items.push(self.parse_pattern(0)?);
                }
                let close = self.expect(&TokenKind::RParen, "Expected `)` in pattern")?;
                let range = Range::new(open.range.start, close.range.end);
                if items.len() == 1 {
                    Ok(Pattern {
                        kind: PatternKind::Parenthesized(Box::new(items.remove(0))),
                        range,
                    })
                } else {
                    Ok(Pattern {
                        kind: PatternKind::Tuple(items),
                        range,
                    })
                }
            }
            TokenKind::LBracket => {
                let open = self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    items.push(self.parse_pattern(0)?);
                    while self.matches(&TokenKind::Comma) {
                        items.push(self.parse_pattern(0)?);
                    }
                }
                let close = self.expect(&TokenKind::RBracket, "Expected `]` in pattern")?;
                Ok(Pattern {
                    kind: PatternKind::List(items),
                    range: Range::new(open.range.start, close.range.end),
                })
            }
            TokenKind::LBrace => {
                let open = self.advance();
                let mut fields = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    fields.push(self.expect_lower_bare("Expected field name")?);
                    while self.matches(&TokenKind::Comma) {
                        fields.push(self.expect_lower_bare("Expected field name")?);
                    }
                }
                let close = self.expect(&TokenKind::RBrace, "Expected `}` in pattern")?;
                Ok(Pattern {
                    kind: PatternKind::Record(fields),
                    range: Range::new(open.range.start, close.range.end),
                })
            }
            _ => Err(self.error_here("Expected pattern")),
        }
    }

    // Expressions

    fn atom_starts(&self) -> bool {
        match self.kind() {
            TokenKind::LowerName { .. }
            | TokenKind::UpperName { .. }
            | TokenKind::Int(_)
            | TokenKind::Hex(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Char(_)
            | TokenKind::Glsl(_)
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::Backslash => true,
            TokenKind::Dot => self.accessor_follows(),
            _ => false,
        }
    }

    /// `.name` written with no gap forms an accessor function.
    fn accessor_follows(&self) -> bool {
        let dot = self.current();
        match self.tokens.get(self.pos + 1) {
            Some(next) => {
                next.lower_name().is_some()
                    && next.range.start == dot.range.end
                    && next.range.start.line == dot.range.start.line
            }
            None => false,
        }
    }

    fn parse_expression(&mut self, min_col: u32) -> Result<Expression, SyntaxError> {
        self.parse_binary(min_col, 0)
    }

    fn parse_binary(&mut self, min_col: u32, min_prec: u8) -> Result<Expression, SyntaxError> {
        let mut left = self.parse_application(min_col)?;
        loop {
            let TokenKind::Operator(op) = self.kind().clone() else {
                break;
            };
            if !self.layout_ok(min_col) {
                break;
            }
            let (prec, right_assoc) = operator_info(&op);
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = if right_assoc { prec } else { prec + 1 };
            let right = self.parse_binary(min_col, next_min)?;
            let range = left.range.merge(right.range);
            left = Expression {
                kind: ExpressionKind::OperatorApplication {
                    operator: op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                range,
            };
        }
        Ok(left)
    }

    fn parse_application(&mut self, min_col: u32) -> Result<Expression, SyntaxError> {
        let first = self.parse_atom_postfix(min_col)?;
        let mut items = vec![first];
        while self.atom_starts() && self.layout_ok(min_col) {
            items.push(self.parse_atom_postfix(min_col)?);
        }
        if items.len() == 1 {
            Ok(items.remove(0))
        } else {
            let range = items
                .iter()
                .skip(1)
                .fold(items[0].range, |range, item| range.merge(item.range));
            Ok(Expression {
                kind: ExpressionKind::Application(items),
                range,
            })
        }
    }

    fn parse_atom_postfix(&mut self, min_col: u32) -> Result<Expression, SyntaxError> {
        let mut atom = self.parse_atom(min_col)?;
        loop {
            if !self.check(&TokenKind::Dot) {
                break;
            }
            let dot = self.current().clone();
            let glued_to_atom = dot.range.start == atom.range.end;
            if !glued_to_atom || !self.accessor_follows() {
                break;
            }
            self.advance();
            let field = self.expect_lower_bare("Expected field name after `.`")?;
            let range = atom.range.merge(field.range);
            atom = Expression {
                kind: ExpressionKind::RecordAccess {
                    expression: Box::new(atom),
                    name: field,
                },
                range,
            };
        }
        Ok(atom)
    }

    fn parse_atom(&mut self, min_col: u32) -> Result<Expression, SyntaxError> {
        match self.kind().clone() {
            TokenKind::Int(value) => Ok(self.literal(ExpressionKind::Integer(value))),
            TokenKind::Hex(value) => Ok(self.literal(ExpressionKind::Hex(value))),
            TokenKind::Float(value) => Ok(self.literal(ExpressionKind::Floatable(value))),
            TokenKind::Str(value) => Ok(self.literal(ExpressionKind::Literal(value))),
            TokenKind::Char(value) => Ok(self.literal(ExpressionKind::CharLiteral(value))),
            TokenKind::Glsl(value) => Ok(self.literal(ExpressionKind::Glsl(value))),
            TokenKind::LowerName { qualifier, name }
            | TokenKind::UpperName { qualifier, name } => {
                let token = self.advance();
                Ok(Expression {
                    kind: ExpressionKind::FunctionOrValue {
                        module_parts: qualifier,
                        name,
                    },
                    range: token.range,
                })
            }
            TokenKind::Dot => {
                let dot = self.advance();
                let field = self.expect_lower_bare("Expected field name after `.`")?;
                Ok(Expression {
                    kind: ExpressionKind::RecordAccessFunction(field.value),
                    range: Range::new(dot.range.start, field.range.end),
                })
            }
            TokenKind::Operator(op) if op == "-" => {
                let minus = self.advance();
                let operand = self.parse_atom_postfix(min_col)?;
                let range = Range::new(minus.range.start, operand.range.end);
                Ok(Expression {
                    kind: ExpressionKind::Negation(Box::new(operand)),
                    range,
                })
            }
            TokenKind::Backslash => {
                let start = self.advance().range.start;
                let mut patterns = vec![self.parse_pattern_atomic(min_col)?];
                while self.pattern_atom_starts() {
                    patterns.push(self.parse_pattern_atomic(min_col)?);
                }
                self.expect(&TokenKind::Arrow, "Expected `->` in lambda")?;
                let body = self.parse_expression(min_col)?;
                let range = Range::new(start, body.range.end);
                Ok(Expression {
                    kind: ExpressionKind::Lambda {
                        patterns,
                        expression: Box::new(body),
                    },
                    range,
                })
            }
            TokenKind::If => {
                let start = self.advance().range.start;
                let condition = self.parse_expression(min_col)?;
                self.expect(&TokenKind::Then, "Expected `then`")?;
                let then_branch = self.parse_expression(min_col)?;
                self.expect(&TokenKind::Else, "Expected `else`")?;
                let else_branch = self.parse_expression(min_col)?;
                let range = Range::new(start, else_branch.range.end);
                Ok(Expression {
                    kind: ExpressionKind::IfBlock {
                        condition: Box::new(condition),
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    },
                    range,
                })
            }
            TokenKind::Let => self.parse_let(min_col),
            TokenKind::Case => self.parse_case(min_col),
            TokenKind::LParen => self.parse_parenthesized(),
            TokenKind::LBracket => {
                let open = self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    items.push(self.parse_expression(0)?);
                    while self.matches(&TokenKind::Comma) {
                        items.push(self.parse_expression(0)?);
                    }
                }
                let close = self.expect(&TokenKind::RBracket, "Expected `]` to close list")?;
                Ok(Expression {
                    kind: ExpressionKind::ListExpr(items),
                    range: Range::new(open.range.start, close.range.end),
                })
            }
            TokenKind::LBrace => self.parse_record_expression(),
            _ => Err(self.error_here("Expected expression")),
        }
    }

    fn literal(&mut self, kind: ExpressionKind) -> Expression {
        let token = self.advance();
        Expression {
            kind,
            range: token.range,
        }
    }

    fn parse_parenthesized(&mut self) -> Result<Expression, SyntaxError> {
        let open = self.advance();
        match self.kind().clone() {
            TokenKind::RParen => {
                let close = self.advance();
                Ok(Expression {
                    kind: ExpressionKind::Unit,
                    range: Range::new(open.range.start, close.range.end),
                })
            }
            TokenKind::Operator(op)
                if matches!(
                    self.tokens.get(self.pos + 1).map(|t| &t.kind),
                    Some(TokenKind::RParen)
                ) =>
            {
                // An operator section such as `(+)`.
                self.advance();
                let close = self.expect(&TokenKind::RParen, "Expected `)` after operator")?;
                Ok(Expression {
                    kind: ExpressionKind::PrefixOperator(op),
                    range: Range::new(open.range.start, close.range.end),
                })
            }
            TokenKind::Comma => {
                let mut text = String::new();
                while self.check(&TokenKind::Comma) {
                    self.advance();
                    text.push(',');
                }
                let close = self.expect(&TokenKind::RParen, "Expected `)` after `,`")?;
                Ok(Expression {
                    kind: ExpressionKind::PrefixOperator(text),
                    range: Range::new(open.range.start, close.range.end),
                })
            }
            _ => {
                let first = self.parse_expression(0)?;
                let mut items = vec![first];
                while self.matches(&TokenKind::Comma) {
                    items.push(self.parse_expression(0)?);
                }
                let close = self.expect(&TokenKind::RParen, "Expected `)`")?;
                let range = Range::new(open.range.start, close.range.end);
                if items.len() == 1 {
                    Ok(Expression {
                        kind: ExpressionKind::Parenthesized(Box::new(items.remove(0))),
                        range,
                    })
                } else {
                    Ok(Expression {
                        kind: ExpressionKind::Tupled(items),
                        range,
                    })
                }
            }
        }
    }

    fn parse_record_expression(&mut self) -> Result<Expression, SyntaxError> {
        let open = self.advance();
        if self.check(&TokenKind::RBrace) {
            let close = self.advance();
            return Ok(Expression {
                kind: ExpressionKind::Record(Vec::new()),
                range: Range::new(open.range.start, close.range.end),
            });
        }
        let first = self.expect_lower_bare("Expected record field")?;
        if self.matches(&TokenKind::Pipe) {
            let setters = self.parse_setters()?;
            let close = self.expect(&TokenKind::RBrace, "Expected `}` in record update")?;
            return Ok(Expression {
                kind: ExpressionKind::RecordUpdate {
                    name: first,
                    setters,
                },
                range: Range::new(open.range.start, close.range.end),
            });
        }
        self.expect(&TokenKind::Equals, "Expected `=` after record field")?;
        let first_value = self.parse_expression(0)?;
        let mut setters = vec![RecordSetter {
            range: first.range.merge(first_value.range),
            field: first,
            expression: first_value,
        }];
        while self.matches(&TokenKind::Comma) {
            setters.push(self.parse_setter()?);
        }
        let close = self.expect(&TokenKind::RBrace, "Expected `}` to close record")?;
        Ok(Expression {
            kind: ExpressionKind::Record(setters),
            range: Range::new(open.range.start, close.range.end),
        })
    }

    fn parse_setters(&mut self) -> Result<Vec<RecordSetter>, SyntaxError> {
        let mut setters = vec![self.parse_setter()?];
        while self.matches(&TokenKind::Comma) {
            setters.push(self.parse_setter()?);
        }
        Ok(setters)
    }

    fn parse_setter(&mut self) -> Result<RecordSetter, SyntaxError> {
        let field = self.expect_lower_bare("Expected record field")?;
        self.expect(&TokenKind::Equals, "Expected `=` after record field")?;
        let expression = self.parse_expression(0)?;
        Ok(RecordSetter {
            range: field.range.merge(expression.range),
            field,
            expression,
        })
    }

    fn parse_let(&mut self, min_col: u32) -> Result<Expression, SyntaxError> {
        let start = self.advance().range.start;
        if self.is_eof() {
            return Err(self.error_here("Expected let declarations"));
        }
        let decl_col = self.col();
        let mut declarations = Vec::new();
        loop {
            declarations.push(self.parse_let_declaration(decl_col)?);
            if self.check(&TokenKind::In) {
                break;
            }
            if self.is_eof() || self.col() != decl_col {
                break;
            }
        }
        self.expect(&TokenKind::In, "Expected `in` to close let block")?;
        let body = self.parse_expression(min_col)?;
        let range = Range::new(start, body.range.end);
        Ok(Expression {
            kind: ExpressionKind::LetExpression {
                declarations,
                expression: Box::new(body),
            },
            range,
        })
    }

    fn parse_let_declaration(&mut self, decl_col: u32) -> Result<LetDeclaration, SyntaxError> {
        let starts_with_name = matches!(
            self.kind(),
            TokenKind::LowerName { qualifier, .. } if qualifier.is_empty()
        );
        if !starts_with_name {
            let start = self.current().range.start;
            let pattern = self.parse_pattern(decl_col)?;
            self.expect(&TokenKind::Equals, "Expected `=` in let declaration")?;
            let expression = self.parse_expression(decl_col)?;
            return Ok(LetDeclaration::Destructuring(DestructuringDecl {
                pattern,
                expression,
                range: Range::new(start, self.prev_end),
            }));
        }

        let name_token = self.expect_lower_bare("Expected name")?;
        if self.matches(&TokenKind::Colon) {
            let type_annotation = self.parse_type_annotation(decl_col)?;
            let signature = Signature {
                range: Range::new(name_token.range.start, self.prev_end),
                name: name_token.clone(),
                type_annotation,
            };
            if self.current().lower_name() != Some(name_token.value.as_str())
                || self.col() != decl_col
            {
                return Err(self.error_here("Expected implementation after type annotation"));
            }
            let impl_name = self.expect_lower_bare("Expected name")?;
            let mut decl = self.parse_function_body(impl_name, decl_col)?;
            decl.range = Range::new(signature.range.start, decl.range.end);
            decl.signature = Some(signature);
            return Ok(LetDeclaration::Function(decl));
        }
        let decl = self.parse_function_body(name_token, decl_col)?;
        Ok(LetDeclaration::Function(decl))
    }

    fn parse_case(&mut self, min_col: u32) -> Result<Expression, SyntaxError> {
        let start = self.advance().range.start;
        let scrutinee = self.parse_expression(min_col)?;
        self.expect(&TokenKind::Of, "Expected `of`")?;
        if self.is_eof() {
            return Err(self.error_here("Expected case branches"));
        }
        let branch_col = self.col();
        let mut cases = Vec::new();
        loop {
            let branch_start = self.current().range.start;
            let pattern = self.parse_pattern(branch_col)?;
            self.expect(&TokenKind::Arrow, "Expected `->` in case branch")?;
            let body = self.parse_expression(branch_col)?;
            cases.push(CaseBranch {
                range: Range::new(branch_start, body.range.end),
                pattern,
                expression: body,
            });
            if self.is_eof() || self.col() != branch_col || !self.pattern_atom_starts() {
                break;
            }
        }
        let range = Range::new(start, self.prev_end);
        Ok(Expression {
            kind: ExpressionKind::CaseExpression {
                expression: Box::new(scrutinee),
                cases,
            },
            range,
        })
    }
}

/// Binding strength and associativity of the core operators; anything
/// unknown binds tightly to the left.
fn operator_info(op: &str) -> (u8, bool) {
    match op {
        "<|" => (1, true),
        "|>" => (1, false),
        "||" => (2, true),
        "&&" => (3, true),
        "==" | "/=" | "<" | ">" | "<=" | ">=" => (4, false),
        "++" | "::" => (5, true),
        "|=" => (5, false),
        "|." => (6, false),
        "+" | "-" => (6, false),
        "*" | "/" | "//" => (7, false),
        "^" => (8, true),
        "<<" => (9, true),
        ">>" => (9, false),
        _ => (9, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Ast {
        match parse(source) {
            Ok(ast) => ast,
            Err(errs) => panic!("parse failed: {:?}", errs.errors),
        }
    }

    const FIXTURE: &str = "\
module Main exposing (main, Msg(..))

import Helpers exposing (add, greet)
import Json.Decode as Decode
import Types

type Msg
    = Increment
    | Decrement
    | SetName String

type alias Model =
    { count : Int
    , name : String
    }

main : Model
main =
    { count = 0, name = greet \"world\" }

update : Msg -> Model -> Model
update msg model =
    case msg of
        Increment ->
            { model | count = add model.count 1 }

        Decrement ->
            { model | count = model.count - 1 }

        SetName name ->
            { model | name = name }
";

    #[test]
    fn parses_header_imports_and_declarations() {
        let ast = parse_ok(FIXTURE);
        assert_eq!(ast.module_name(), "Main");
        assert_eq!(ast.imports.len(), 3);
        assert_eq!(ast.imports[1].alias.as_ref().map(|n| n.value.as_str()), Some("Decode"));
        assert_eq!(ast.declarations.len(), 4);
        assert!(ast.find_declaration("update").is_some());
        let (ty, ctor) = ast.find_constructor("SetName").expect("SetName");
        assert_eq!(ty.name.value, "Msg");
        assert_eq!(ctor.arguments.len(), 1);
    }

    #[test]
    fn exposing_list_items_carry_kinds() {
        let ast = parse_ok(FIXTURE);
        let ExposingList::Explicit(items) = &ast.header.exposing else {
            panic!("expected explicit exposing");
        };
        assert_eq!(items[0].name, "main");
        assert_eq!(items[0].kind, ExposedKind::Value);
        assert_eq!(items[1].name, "Msg");
        assert!(matches!(items[1].kind, ExposedKind::Type { open: Some(_) }));
    }

    #[test]
    fn declaration_ranges_enclose_their_expressions() {
        let ast = parse_ok(FIXTURE);
        for decl in &ast.declarations {
            if let Declaration::Function(func) = decl {
                assert!(
                    decl.range().encloses(func.expression.range),
                    "expression of {} escapes its declaration",
                    func.name.value
                );
            }
        }
    }

    #[test]
    fn case_branches_bind_patterns() {
        let ast = parse_ok(FIXTURE);
        let Some(Declaration::Function(update)) = ast.find_declaration("update") else {
            panic!("update missing");
        };
        let ExpressionKind::CaseExpression { cases, .. } = &update.expression.kind else {
            panic!("expected case expression");
        };
        assert_eq!(cases.len(), 3);
        let binders = pattern_binders(&cases[2].pattern);
        assert_eq!(binders.len(), 1);
        assert_eq!(binders[0].value, "name");
    }

    #[test]
    fn signatures_attach_to_their_functions() {
        let ast = parse_ok(FIXTURE);
        let Some(Declaration::Function(update)) = ast.find_declaration("update") else {
            panic!("update missing");
        };
        let signature = update.signature.as_ref().expect("signature");
        assert_eq!(signature.name.value, "update");
        let TypeAnnotationKind::Function { left, .. } = &signature.type_annotation.kind else {
            panic!("expected function type");
        };
        let TypeAnnotationKind::Typed { name, .. } = &left.kind else {
            panic!("expected typed argument");
        };
        assert_eq!(name, "Msg");
    }

    #[test]
    fn let_expressions_nest_and_close_on_in() {
        let ast = parse_ok(
            "module X exposing (..)\n\nvalue =\n    let\n        twice n =\n            n * 2\n\n        ( a, b ) =\n            ( 1, 2 )\n    in\n    twice a + b\n",
        );
        let Some(Declaration::Function(value)) = ast.find_declaration("value") else {
            panic!("value missing");
        };
        let ExpressionKind::LetExpression { declarations, .. } = &value.expression.kind else {
            panic!("expected let expression");
        };
        assert_eq!(declarations.len(), 2);
        assert!(matches!(declarations[0], LetDeclaration::Function(_)));
        assert!(matches!(declarations[1], LetDeclaration::Destructuring(_)));
    }

    #[test]
    fn lambdas_records_and_accessors() {
        let ast = parse_ok(
            "module X exposing (..)\n\nf =\n    List.map (\\item -> item.label) [ { label = .name person } ]\n",
        );
        let Some(Declaration::Function(f)) = ast.find_declaration("f") else {
            panic!("f missing");
        };
        // Application of a qualified function to a lambda and a list.
        let ExpressionKind::Application(items) = &f.expression.kind else {
            panic!("expected application");
        };
        let ExpressionKind::FunctionOrValue { module_parts, name } = &items[0].kind else {
            panic!("expected qualified head");
        };
        assert_eq!(module_parts, &vec!["List".to_string()]);
        assert_eq!(name, "map");
    }

    #[test]
    fn port_modules_and_ports() {
        let ast = parse_ok(
            "port module Ports exposing (save)\n\nport save : String -> Cmd msg\n",
        );
        assert_eq!(ast.header.kind, ModuleKind::Port);
        let Some(Declaration::Port(port)) = ast.find_declaration("save") else {
            panic!("port missing");
        };
        assert_eq!(port.signature.name.value, "save");
    }

    #[test]
    fn effect_module_header_skips_manager_record() {
        let ast = parse_ok(
            "effect module Time where { subscriptions = MySub } exposing (every)\n\nevery = 1\n",
        );
        assert_eq!(ast.header.kind, ModuleKind::Effect);
        assert_eq!(ast.module_name(), "Time");
    }

    #[test]
    fn doc_comments_attach_to_following_declaration() {
        let ast = parse_ok(
            "module X exposing (..)\n\n{-| Doubles a number. -}\ndouble n =\n    n * 2\n",
        );
        let Some(Declaration::Function(double)) = ast.find_declaration("double") else {
            panic!("double missing");
        };
        let doc = double.documentation.as_ref().expect("doc");
        assert_eq!(doc.doc_body(), "Doubles a number.");
    }

    #[test]
    fn operator_application_keeps_precedence() {
        let ast = parse_ok("module X exposing (..)\n\nv = 1 + 2 * 3\n");
        let Some(Declaration::Function(v)) = ast.find_declaration("v") else {
            panic!("v missing");
        };
        let ExpressionKind::OperatorApplication { operator, right, .. } = &v.expression.kind
        else {
            panic!("expected operator application");
        };
        assert_eq!(operator, "+");
        assert!(matches!(
            right.kind,
            ExpressionKind::OperatorApplication { .. }
        ));
    }

    #[test]
    fn parse_failure_reports_errors() {
        assert!(parse("module X exposing (..)\n\nbroken = = =\n").is_err());
        assert!(parse("not a module\n").is_err());
    }

    #[test]
    fn record_update_expression() {
        let ast = parse_ok("module X exposing (..)\n\nbump model =\n    { model | count = 1 }\n");
        let Some(Declaration::Function(bump)) = ast.find_declaration("bump") else {
            panic!("bump missing");
        };
        let ExpressionKind::RecordUpdate { name, setters } = &bump.expression.kind else {
            panic!("expected record update");
        };
        assert_eq!(name.value, "model");
        assert_eq!(setters.len(), 1);
    }
}
