use crate::language::span::Range;

/// A parsed module: header, imports, top-level declarations and the
/// comments that were attached to none of them.
#[derive(Clone, Debug)]
pub struct Ast {
    pub header: ModuleHeader,
    pub imports: Vec<Import>,
    pub declarations: Vec<Declaration>,
    pub comments: Vec<Comment>,
}

#[derive(Clone, Debug)]
pub struct Comment {
    pub text: String,
    pub range: Range,
}

impl Comment {
    pub fn is_doc(&self) -> bool {
        self.text.starts_with("{-|")
    }

    /// Doc comment body without the `{-|`/`-}` markers.
    pub fn doc_body(&self) -> &str {
        self.text
            .trim_start_matches("{-|")
            .trim_end_matches("-}")
            .trim()
    }
}

/// A name together with the range it was written at.
#[derive(Clone, Debug, PartialEq)]
pub struct Name {
    pub value: String,
    pub range: Range,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleKind {
    Normal,
    Port,
    Effect,
}

#[derive(Clone, Debug)]
pub struct ModuleHeader {
    pub kind: ModuleKind,
    pub name: Name,
    pub exposing: ExposingList,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub enum ExposingList {
    All(Range),
    Explicit(Vec<ExposedItem>),
}

#[derive(Clone, Debug)]
pub struct ExposedItem {
    pub kind: ExposedKind,
    pub name: String,
    pub range: Range,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExposedKind {
    Value,
    TypeOrAlias,
    /// `Type` or `Type(..)`; the range of `(..)` when constructors come too.
    Type { open: Option<Range> },
    Infix,
}

#[derive(Clone, Debug)]
pub struct Import {
    pub module_name: Name,
    pub alias: Option<Name>,
    pub exposing: Option<ExposingList>,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub enum Declaration {
    Function(FunctionDecl),
    TypeAlias(TypeAliasDecl),
    CustomType(CustomTypeDecl),
    Port(PortDecl),
    Destructuring(DestructuringDecl),
    Infix(InfixDecl),
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub documentation: Option<Comment>,
    pub signature: Option<Signature>,
    pub name: Name,
    pub arguments: Vec<Pattern>,
    pub expression: Expression,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub struct Signature {
    pub name: Name,
    pub type_annotation: TypeAnnotation,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub struct TypeAliasDecl {
    pub documentation: Option<Comment>,
    pub name: Name,
    pub generics: Vec<Name>,
    pub type_annotation: TypeAnnotation,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub struct CustomTypeDecl {
    pub documentation: Option<Comment>,
    pub name: Name,
    pub generics: Vec<Name>,
    pub constructors: Vec<ValueConstructor>,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub struct ValueConstructor {
    pub name: Name,
    pub arguments: Vec<TypeAnnotation>,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub struct PortDecl {
    pub signature: Signature,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub struct DestructuringDecl {
    pub pattern: Pattern,
    pub expression: Expression,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub struct InfixDecl {
    pub direction: Name,
    pub precedence: i64,
    pub operator: Name,
    pub function: Name,
    pub range: Range,
}

impl Declaration {
    pub fn range(&self) -> Range {
        match self {
            Declaration::Function(decl) => decl.range,
            Declaration::TypeAlias(decl) => decl.range,
            Declaration::CustomType(decl) => decl.range,
            Declaration::Port(decl) => decl.range,
            Declaration::Destructuring(decl) => decl.range,
            Declaration::Infix(decl) => decl.range,
        }
    }

    /// The declared name, when the declaration has one.
    pub fn name(&self) -> Option<&Name> {
        match self {
            Declaration::Function(decl) => Some(&decl.name),
            Declaration::TypeAlias(decl) => Some(&decl.name),
            Declaration::CustomType(decl) => Some(&decl.name),
            Declaration::Port(decl) => Some(&decl.signature.name),
            Declaration::Destructuring(_) => None,
            Declaration::Infix(decl) => Some(&decl.operator),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub enum ExpressionKind {
    Unit,
    Integer(i64),
    Hex(i64),
    Floatable(f64),
    Literal(String),
    CharLiteral(char),
    Glsl(String),
    FunctionOrValue {
        module_parts: Vec<String>,
        name: String,
    },
    Application(Vec<Expression>),
    OperatorApplication {
        operator: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    IfBlock {
        condition: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
    LetExpression {
        declarations: Vec<LetDeclaration>,
        expression: Box<Expression>,
    },
    CaseExpression {
        expression: Box<Expression>,
        cases: Vec<CaseBranch>,
    },
    Lambda {
        patterns: Vec<Pattern>,
        expression: Box<Expression>,
    },
    Parenthesized(Box<Expression>),
    Negation(Box<Expression>),
    Tupled(Vec<Expression>),
    ListExpr(Vec<Expression>),
    RecordAccess {
        expression: Box<Expression>,
        name: Name,
    },
    RecordAccessFunction(String),
    Record(Vec<RecordSetter>),
    RecordUpdate {
        name: Name,
        setters: Vec<RecordSetter>,
    },
    PrefixOperator(String),
    Operator(String),
}

#[derive(Clone, Debug)]
pub struct RecordSetter {
    pub field: Name,
    pub expression: Expression,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub enum LetDeclaration {
    Function(FunctionDecl),
    Destructuring(DestructuringDecl),
}

impl LetDeclaration {
    pub fn range(&self) -> Range {
        match self {
            LetDeclaration::Function(decl) => decl.range,
            LetDeclaration::Destructuring(decl) => decl.range,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CaseBranch {
    pub pattern: Pattern,
    pub expression: Expression,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub struct Pattern {
    pub kind: PatternKind,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub enum PatternKind {
    Wildcard,
    Unit,
    Char(char),
    String(String),
    Int(i64),
    Hex(i64),
    Float(f64),
    Var(String),
    Named {
        module_parts: Vec<String>,
        name: String,
        patterns: Vec<Pattern>,
    },
    Tuple(Vec<Pattern>),
    List(Vec<Pattern>),
    UnCons {
        head: Box<Pattern>,
        tail: Box<Pattern>,
    },
    As {
        pattern: Box<Pattern>,
        name: Name,
    },
    Record(Vec<Name>),
    Parenthesized(Box<Pattern>),
}

#[derive(Clone, Debug)]
pub struct TypeAnnotation {
    pub kind: TypeAnnotationKind,
    pub range: Range,
}

#[derive(Clone, Debug)]
pub enum TypeAnnotationKind {
    Generic(String),
    Typed {
        module_parts: Vec<String>,
        name: String,
        args: Vec<TypeAnnotation>,
    },
    Unit,
    Tupled(Vec<TypeAnnotation>),
    Record(Vec<RecordField>),
    GenericRecord {
        generic: Name,
        fields: Vec<RecordField>,
    },
    Function {
        left: Box<TypeAnnotation>,
        right: Box<TypeAnnotation>,
    },
}

#[derive(Clone, Debug)]
pub struct RecordField {
    pub name: Name,
    pub type_annotation: TypeAnnotation,
    pub range: Range,
}

impl Ast {
    pub fn module_name(&self) -> &str {
        &self.header.name.value
    }

    pub fn find_declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|decl| decl.name().is_some_and(|n| n.value == name))
    }

    pub fn find_constructor(&self, name: &str) -> Option<(&CustomTypeDecl, &ValueConstructor)> {
        self.declarations.iter().find_map(|decl| match decl {
            Declaration::CustomType(ty) => ty
                .constructors
                .iter()
                .find(|ctor| ctor.name.value == name)
                .map(|ctor| (ty, ctor)),
            _ => None,
        })
    }

    /// The type whose constructor list contains `name`.
    pub fn constructor_owner(&self, name: &str) -> Option<&CustomTypeDecl> {
        self.find_constructor(name).map(|(ty, _)| ty)
    }
}

/// Whether `name` is visible to importers of this module. A type exposed
/// with `(..)` exposes every one of its constructors as well.
pub fn is_exposed_from_module(ast: &Ast, name: &str) -> bool {
    match &ast.header.exposing {
        ExposingList::All(_) => true,
        ExposingList::Explicit(items) => {
            for item in items {
                if item.name == name {
                    return true;
                }
                if let ExposedKind::Type { open: Some(_) } = item.kind {
                    if let Some(ty) = find_custom_type(ast, &item.name) {
                        if ty.constructors.iter().any(|ctor| ctor.name.value == name) {
                            return true;
                        }
                    }
                }
            }
            false
        }
    }
}

fn find_custom_type<'a>(ast: &'a Ast, name: &str) -> Option<&'a CustomTypeDecl> {
    ast.declarations.iter().find_map(|decl| match decl {
        Declaration::CustomType(ty) if ty.name.value == name => Some(ty),
        _ => None,
    })
}

/// Every name bound by a pattern, with the range it was bound at.
pub fn pattern_binders(pattern: &Pattern) -> Vec<Name> {
    let mut binders = Vec::new();
    collect_pattern_binders(pattern, &mut binders);
    binders
}

fn collect_pattern_binders(pattern: &Pattern, binders: &mut Vec<Name>) {
    match &pattern.kind {
        PatternKind::Var(name) => binders.push(Name {
            value: name.clone(),
            range: pattern.range,
        }),
        PatternKind::As { pattern: inner, name } => {
            collect_pattern_binders(inner, binders);
            binders.push(name.clone());
        }
        PatternKind::Tuple(items) | PatternKind::List(items) => {
            for item in items {
                collect_pattern_binders(item, binders);
            }
        }
        PatternKind::UnCons { head, tail } => {
            collect_pattern_binders(head, binders);
            collect_pattern_binders(tail, binders);
        }
        PatternKind::Named { patterns, .. } => {
            for item in patterns {
                collect_pattern_binders(item, binders);
            }
        }
        PatternKind::Record(fields) => binders.extend(fields.iter().cloned()),
        PatternKind::Parenthesized(inner) => collect_pattern_binders(inner, binders),
        PatternKind::Wildcard
        | PatternKind::Unit
        | PatternKind::Char(_)
        | PatternKind::String(_)
        | PatternKind::Int(_)
        | PatternKind::Hex(_)
        | PatternKind::Float(_) => {}
    }
}

/// The names a let block brings into scope.
pub fn let_declaration_binders(declaration: &LetDeclaration) -> Vec<Name> {
    match declaration {
        LetDeclaration::Function(decl) => vec![decl.name.clone()],
        LetDeclaration::Destructuring(decl) => pattern_binders(&decl.pattern),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse;

    #[test]
    fn every_exposed_name_is_exposed_and_open_types_expose_constructors() {
        let ast = parse(
            "module Types exposing (Msg(..), Model, decode)\n\n\
             type Msg\n    = Increment\n    | SetName String\n\n\
             type alias Model =\n    { count : Int }\n\n\
             decode : Int -> Int\ndecode n =\n    n\n\n\
             internal : Int\ninternal =\n    0\n",
        )
        .expect("parse");
        let ExposingList::Explicit(items) = &ast.header.exposing else {
            panic!("expected explicit exposing");
        };
        for item in items {
            assert!(
                is_exposed_from_module(&ast, &item.name),
                "{} should be exposed",
                item.name
            );
        }
        // Constructors of a type exposed with `(..)` come along.
        assert!(is_exposed_from_module(&ast, "Increment"));
        assert!(is_exposed_from_module(&ast, "SetName"));
        assert!(!is_exposed_from_module(&ast, "internal"));

        let all = parse("module Open exposing (..)\n\nanything = 1\n").expect("parse");
        assert!(is_exposed_from_module(&all, "anything"));
    }

    #[test]
    fn pattern_binders_flatten_every_binding_form() {
        let ast = parse(
            "module X exposing (..)\n\nf ( a, b ) ({ x, y } as whole) (Just inner) (h :: t) =\n    a\n",
        )
        .expect("parse");
        let Some(Declaration::Function(func)) = ast.find_declaration("f") else {
            panic!("f missing");
        };
        let names: Vec<String> = func
            .arguments
            .iter()
            .flat_map(pattern_binders)
            .map(|binder| binder.value)
            .collect();
        assert_eq!(names, ["a", "b", "x", "y", "whole", "inner", "h", "t"]);
    }
}
