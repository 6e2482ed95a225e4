use crate::language::{
    ast::*,
    span::{Position, Range},
};
use crate::lsp::imports::ImportTracker;
use crate::lsp::text::qualified_name_range;

/// Canonical cross-file key of a symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolIdentity {
    pub def_module: String,
    pub name: String,
    pub kind: IdentityKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityKind {
    Value,
    Type,
    Constructor,
}

/// A name bound somewhere up the lexical scope; later entries shadow
/// earlier ones.
#[derive(Clone, Debug)]
pub struct ScopeEntry {
    pub name: String,
    pub range: Range,
}

pub fn scope_lookup<'a>(scope: &'a [ScopeEntry], name: &str) -> Option<&'a ScopeEntry> {
    scope.iter().rev().find(|entry| entry.name == name)
}

/// What the cursor is on, after walking the AST down to the position.
#[derive(Clone, Debug)]
pub enum Target {
    /// An item of the module header's exposing list.
    HeaderExposed { item: ExposedItem },
    /// The dotted module name of an import.
    ImportModule { index: usize },
    /// An item of an import's exposing list.
    ImportExposed { module: String, item: ExposedItem },
    /// A declaration's own name node.
    DeclarationName { index: usize },
    /// A constructor name inside a custom type declaration.
    ConstructorName { type_index: usize, ctor_index: usize },
    /// The name node of a standalone type signature.
    SignatureName { index: usize },
    /// A `Typed` reference inside a type annotation; range covers the
    /// bare name only.
    TypedName {
        module_parts: Vec<String>,
        name: String,
        range: Range,
    },
    /// A constructor name in a pattern; range covers the bare name only.
    PatternConstructor {
        module_parts: Vec<String>,
        name: String,
        range: Range,
    },
    /// A `functionOrValue` expression, with the scope in force there.
    ExprName {
        module_parts: Vec<String>,
        name: String,
        range: Range,
        scope: Vec<ScopeEntry>,
    },
    /// The base record of a record-update expression.
    RecordUpdateName {
        name: String,
        range: Range,
        scope: Vec<ScopeEntry>,
    },
}

/// Find what the cursor points at. Resolution order: module-header
/// exposing, import lists, then the first declaration whose range
/// contains the position.
pub fn locate(ast: &Ast, position: Position) -> Option<Target> {
    if let ExposingList::Explicit(items) = &ast.header.exposing {
        for item in items {
            if item.range.contains(position) {
                return Some(Target::HeaderExposed { item: item.clone() });
            }
        }
    }

    for (index, import) in ast.imports.iter().enumerate() {
        if import.module_name.range.contains(position) {
            return Some(Target::ImportModule { index });
        }
        if let Some(ExposingList::Explicit(items)) = &import.exposing {
            for item in items {
                if item.range.contains(position) {
                    return Some(Target::ImportExposed {
                        module: import.module_name.value.clone(),
                        item: item.clone(),
                    });
                }
            }
        }
    }

    let (index, declaration) = ast
        .declarations
        .iter()
        .enumerate()
        .find(|(_, decl)| decl.range().contains(position))?;
    locate_in_declaration(index, declaration, position)
}

fn locate_in_declaration(
    index: usize,
    declaration: &Declaration,
    position: Position,
) -> Option<Target> {
    match declaration {
        Declaration::Function(func) => locate_in_function(index, func, position, Vec::new()),
        Declaration::TypeAlias(alias) => {
            if alias.name.range.contains(position) {
                return Some(Target::DeclarationName { index });
            }
            locate_in_annotation(&alias.type_annotation, position)
        }
        Declaration::CustomType(ty) => {
            if ty.name.range.contains(position) {
                return Some(Target::DeclarationName { index });
            }
            for (ctor_index, ctor) in ty.constructors.iter().enumerate() {
                if ctor.name.range.contains(position) {
                    return Some(Target::ConstructorName {
                        type_index: index,
                        ctor_index,
                    });
                }
                for argument in &ctor.arguments {
                    if argument.range.contains(position) {
                        return locate_in_annotation(argument, position);
                    }
                }
            }
            None
        }
        Declaration::Port(port) => {
            if port.signature.name.range.contains(position) {
                return Some(Target::DeclarationName { index });
            }
            locate_in_annotation(&port.signature.type_annotation, position)
        }
        Declaration::Destructuring(destructuring) => {
            if let Some(target) = locate_in_pattern(&destructuring.pattern, position) {
                return Some(target);
            }
            locate_in_expression(&destructuring.expression, position, &mut Vec::new())
        }
        Declaration::Infix(_) => None,
    }
}

fn locate_in_function(
    index: usize,
    func: &FunctionDecl,
    position: Position,
    seed: Vec<ScopeEntry>,
) -> Option<Target> {
    if func.name.range.contains(position) {
        return Some(Target::DeclarationName { index });
    }
    if let Some(signature) = &func.signature {
        if signature.name.range.contains(position) {
            return Some(Target::SignatureName { index });
        }
        if signature.type_annotation.range.contains(position) {
            return locate_in_annotation(&signature.type_annotation, position);
        }
    }
    for argument in &func.arguments {
        if let Some(target) = locate_in_pattern(argument, position) {
            return Some(target);
        }
    }
    let mut scope = seed;
    for argument in &func.arguments {
        for binder in pattern_binders(argument) {
            scope.push(ScopeEntry {
                name: binder.value,
                range: binder.range,
            });
        }
    }
    locate_in_expression(&func.expression, position, &mut scope)
}

fn locate_in_annotation(annotation: &TypeAnnotation, position: Position) -> Option<Target> {
    if !annotation.range.contains(position) {
        return None;
    }
    match &annotation.kind {
        TypeAnnotationKind::Typed {
            module_parts,
            name,
            args,
        } => {
            let name_range = qualified_name_range(annotation.range.start, module_parts, name);
            let head = Range::new(annotation.range.start, name_range.end);
            if head.contains(position) {
                return Some(Target::TypedName {
                    module_parts: module_parts.clone(),
                    name: name.clone(),
                    range: name_range,
                });
            }
            args.iter()
                .find_map(|arg| locate_in_annotation(arg, position))
        }
        TypeAnnotationKind::Function { left, right } => locate_in_annotation(left, position)
            .or_else(|| locate_in_annotation(right, position)),
        TypeAnnotationKind::Tupled(items) => items
            .iter()
            .find_map(|item| locate_in_annotation(item, position)),
        TypeAnnotationKind::Record(fields) => fields
            .iter()
            .find_map(|field| locate_in_annotation(&field.type_annotation, position)),
        TypeAnnotationKind::GenericRecord { fields, .. } => fields
            .iter()
            .find_map(|field| locate_in_annotation(&field.type_annotation, position)),
        TypeAnnotationKind::Generic(_) | TypeAnnotationKind::Unit => None,
    }
}

fn locate_in_pattern(pattern: &Pattern, position: Position) -> Option<Target> {
    if !pattern.range.contains(position) {
        return None;
    }
    match &pattern.kind {
        PatternKind::Named {
            module_parts,
            name,
            patterns,
        } => {
            let name_range = qualified_name_range(pattern.range.start, module_parts, name);
            let head = Range::new(pattern.range.start, name_range.end);
            if head.contains(position) {
                return Some(Target::PatternConstructor {
                    module_parts: module_parts.clone(),
                    name: name.clone(),
                    range: name_range,
                });
            }
            patterns
                .iter()
                .find_map(|sub| locate_in_pattern(sub, position))
        }
        PatternKind::Tuple(items) | PatternKind::List(items) => items
            .iter()
            .find_map(|item| locate_in_pattern(item, position)),
        PatternKind::UnCons { head, tail } => {
            locate_in_pattern(head, position).or_else(|| locate_in_pattern(tail, position))
        }
        PatternKind::As { pattern, .. } | PatternKind::Parenthesized(pattern) => {
            locate_in_pattern(pattern, position)
        }
        _ => None,
    }
}

fn locate_in_expression(
    expression: &Expression,
    position: Position,
    scope: &mut Vec<ScopeEntry>,
) -> Option<Target> {
    if !expression.range.contains(position) {
        return None;
    }
    match &expression.kind {
        ExpressionKind::FunctionOrValue { module_parts, name } => Some(Target::ExprName {
            module_parts: module_parts.clone(),
            name: name.clone(),
            range: expression.range,
            scope: scope.clone(),
        }),
        ExpressionKind::Application(items) => items
            .iter()
            .find(|item| item.range.contains(position))
            .and_then(|item| locate_in_expression(item, position, scope)),
        ExpressionKind::OperatorApplication { left, right, .. } => {
            if left.range.contains(position) {
                locate_in_expression(left, position, scope)
            } else {
                locate_in_expression(right, position, scope)
            }
        }
        ExpressionKind::IfBlock {
            condition,
            then_branch,
            else_branch,
        } => [condition, then_branch, else_branch]
            .into_iter()
            .find(|branch| branch.range.contains(position))
            .and_then(|branch| locate_in_expression(branch, position, scope)),
        ExpressionKind::LetExpression {
            declarations,
            expression,
        } => {
            for declaration in declarations {
                for binder in let_declaration_binders(declaration) {
                    scope.push(ScopeEntry {
                        name: binder.value,
                        range: binder.range,
                    });
                }
            }
            for declaration in declarations {
                if declaration.range().contains(position) {
                    return locate_in_let_declaration(declaration, position, scope);
                }
            }
            locate_in_expression(expression, position, scope)
        }
        ExpressionKind::CaseExpression {
            expression: scrutinee,
            cases,
        } => {
            if scrutinee.range.contains(position) {
                return locate_in_expression(scrutinee, position, scope);
            }
            for case in cases {
                if !case.range.contains(position) {
                    continue;
                }
                if let Some(target) = locate_in_pattern(&case.pattern, position) {
                    return Some(target);
                }
                for binder in pattern_binders(&case.pattern) {
                    scope.push(ScopeEntry {
                        name: binder.value,
                        range: binder.range,
                    });
                }
                return locate_in_expression(&case.expression, position, scope);
            }
            None
        }
        ExpressionKind::Lambda {
            patterns,
            expression,
        } => {
            for pattern in patterns {
                if let Some(target) = locate_in_pattern(pattern, position) {
                    return Some(target);
                }
            }
            for pattern in patterns {
                for binder in pattern_binders(pattern) {
                    scope.push(ScopeEntry {
                        name: binder.value,
                        range: binder.range,
                    });
                }
            }
            locate_in_expression(expression, position, scope)
        }
        ExpressionKind::Parenthesized(inner) | ExpressionKind::Negation(inner) => {
            locate_in_expression(inner, position, scope)
        }
        ExpressionKind::Tupled(items) | ExpressionKind::ListExpr(items) => items
            .iter()
            .find(|item| item.range.contains(position))
            .and_then(|item| locate_in_expression(item, position, scope)),
        ExpressionKind::RecordAccess { expression, .. } => {
            locate_in_expression(expression, position, scope)
        }
        ExpressionKind::Record(setters) => setters
            .iter()
            .find(|setter| setter.expression.range.contains(position))
            .and_then(|setter| locate_in_expression(&setter.expression, position, scope)),
        ExpressionKind::RecordUpdate { name, setters } => {
            if name.range.contains(position) {
                return Some(Target::RecordUpdateName {
                    name: name.value.clone(),
                    range: name.range,
                    scope: scope.clone(),
                });
            }
            setters
                .iter()
                .find(|setter| setter.expression.range.contains(position))
                .and_then(|setter| locate_in_expression(&setter.expression, position, scope))
        }
        _ => None,
    }
}

fn locate_in_let_declaration(
    declaration: &LetDeclaration,
    position: Position,
    scope: &mut Vec<ScopeEntry>,
) -> Option<Target> {
    match declaration {
        LetDeclaration::Function(func) => {
            if func.name.range.contains(position) {
                return Some(Target::ExprName {
                    module_parts: Vec::new(),
                    name: func.name.value.clone(),
                    range: func.name.range,
                    scope: scope.clone(),
                });
            }
            if let Some(signature) = &func.signature {
                if signature.type_annotation.range.contains(position) {
                    return locate_in_annotation(&signature.type_annotation, position);
                }
            }
            for pattern in &func.arguments {
                if let Some(target) = locate_in_pattern(pattern, position) {
                    return Some(target);
                }
            }
            for pattern in &func.arguments {
                for binder in pattern_binders(pattern) {
                    scope.push(ScopeEntry {
                        name: binder.value,
                        range: binder.range,
                    });
                }
            }
            locate_in_expression(&func.expression, position, scope)
        }
        LetDeclaration::Destructuring(destructuring) => {
            if let Some(target) = locate_in_pattern(&destructuring.pattern, position) {
                return Some(target);
            }
            locate_in_expression(&destructuring.expression, position, scope)
        }
    }
}

/// The outcome of identity resolution: settled, or in need of probing the
/// ASTs of open imports (which requires file access the resolver does not
/// have).
#[derive(Clone, Debug)]
pub enum IdentityOutcome {
    Found(SymbolIdentity),
    Probe {
        name: String,
        modules: Vec<String>,
        kind: IdentityKind,
    },
    Unknown,
}

/// Resolve the canonical identity named at a target, consulting local
/// declarations, the tracker's explicit exposings, alias rewrites and
/// finally the open imports (via probe).
pub fn resolve_identity(ast: &Ast, tracker: &ImportTracker, target: &Target) -> IdentityOutcome {
    let current = ast.module_name().to_string();
    match target {
        Target::HeaderExposed { item } => IdentityOutcome::Found(SymbolIdentity {
            def_module: current,
            name: item.name.clone(),
            kind: exposed_kind(&item.kind),
        }),
        Target::ImportExposed { module, item } => IdentityOutcome::Found(SymbolIdentity {
            def_module: module.clone(),
            name: item.name.clone(),
            kind: exposed_kind(&item.kind),
        }),
        Target::ImportModule { .. } => IdentityOutcome::Unknown,
        Target::DeclarationName { index } => {
            let Some(declaration) = ast.declarations.get(*index) else {
                return IdentityOutcome::Unknown;
            };
            let Some(name) = declaration.name() else {
                return IdentityOutcome::Unknown;
            };
            let kind = match declaration {
                Declaration::TypeAlias(_) | Declaration::CustomType(_) => IdentityKind::Type,
                _ => IdentityKind::Value,
            };
            IdentityOutcome::Found(SymbolIdentity {
                def_module: current,
                name: name.value.clone(),
                kind,
            })
        }
        Target::ConstructorName {
            type_index,
            ctor_index,
        } => {
            let ctor = ast.declarations.get(*type_index).and_then(|decl| match decl {
                Declaration::CustomType(ty) => ty.constructors.get(*ctor_index),
                _ => None,
            });
            match ctor {
                Some(ctor) => IdentityOutcome::Found(SymbolIdentity {
                    def_module: current,
                    name: ctor.name.value.clone(),
                    kind: IdentityKind::Constructor,
                }),
                None => IdentityOutcome::Unknown,
            }
        }
        Target::SignatureName { index } => {
            let name = ast
                .declarations
                .get(*index)
                .and_then(|declaration| declaration.name());
            match name {
                Some(name) => IdentityOutcome::Found(SymbolIdentity {
                    def_module: current,
                    name: name.value.clone(),
                    kind: IdentityKind::Value,
                }),
                None => IdentityOutcome::Unknown,
            }
        }
        Target::TypedName {
            module_parts, name, ..
        } => {
            if !module_parts.is_empty() {
                let qualifier = module_parts.join(".");
                let modules = tracker.resolve_qualifier(&qualifier);
                return match modules.first() {
                    Some(module) => IdentityOutcome::Found(SymbolIdentity {
                        def_module: module.clone(),
                        name: name.clone(),
                        kind: IdentityKind::Type,
                    }),
                    None => IdentityOutcome::Unknown,
                };
            }
            if matches!(
                ast.find_declaration(name),
                Some(Declaration::TypeAlias(_)) | Some(Declaration::CustomType(_))
            ) {
                return IdentityOutcome::Found(SymbolIdentity {
                    def_module: current,
                    name: name.clone(),
                    kind: IdentityKind::Type,
                });
            }
            if let Some(modules) = tracker.explicit_exposing.get(name) {
                if let Some(module) = modules.first() {
                    return IdentityOutcome::Found(SymbolIdentity {
                        def_module: module.clone(),
                        name: name.clone(),
                        kind: IdentityKind::Type,
                    });
                }
            }
            IdentityOutcome::Probe {
                name: name.clone(),
                modules: tracker.unknown_imports.clone(),
                kind: IdentityKind::Type,
            }
        }
        Target::PatternConstructor {
            module_parts, name, ..
        } => {
            if !module_parts.is_empty() {
                let qualifier = module_parts.join(".");
                let modules = tracker.resolve_qualifier(&qualifier);
                return match modules.first() {
                    Some(module) => IdentityOutcome::Found(SymbolIdentity {
                        def_module: module.clone(),
                        name: name.clone(),
                        kind: IdentityKind::Constructor,
                    }),
                    None => IdentityOutcome::Unknown,
                };
            }
            if ast.find_constructor(name).is_some() {
                return IdentityOutcome::Found(SymbolIdentity {
                    def_module: current,
                    name: name.clone(),
                    kind: IdentityKind::Constructor,
                });
            }
            if let Some(modules) = tracker.explicit_exposing.get(name) {
                if let Some(module) = modules.first() {
                    return IdentityOutcome::Found(SymbolIdentity {
                        def_module: module.clone(),
                        name: name.clone(),
                        kind: IdentityKind::Constructor,
                    });
                }
            }
            IdentityOutcome::Probe {
                name: name.clone(),
                modules: probe_modules(tracker),
                kind: IdentityKind::Constructor,
            }
        }
        Target::ExprName {
            module_parts,
            name,
            scope,
            ..
        } => {
            if module_parts.is_empty() && scope_lookup(scope, name).is_some() {
                // A pure local never owns a cross-file identity.
                return IdentityOutcome::Unknown;
            }
            if !module_parts.is_empty() {
                let qualifier = module_parts.join(".");
                let modules = tracker.resolve_qualifier(&qualifier);
                return match modules.first() {
                    Some(module) => IdentityOutcome::Found(SymbolIdentity {
                        def_module: module.clone(),
                        name: name.clone(),
                        kind: IdentityKind::Value,
                    }),
                    None => IdentityOutcome::Unknown,
                };
            }
            if ast.find_declaration(name).is_some() {
                return IdentityOutcome::Found(SymbolIdentity {
                    def_module: current,
                    name: name.clone(),
                    kind: IdentityKind::Value,
                });
            }
            if ast.find_constructor(name).is_some() {
                return IdentityOutcome::Found(SymbolIdentity {
                    def_module: current,
                    name: name.clone(),
                    kind: IdentityKind::Constructor,
                });
            }
            if let Some(modules) = tracker.explicit_exposing.get(name) {
                if let Some(module) = modules.first() {
                    return IdentityOutcome::Found(SymbolIdentity {
                        def_module: module.clone(),
                        name: name.clone(),
                        kind: IdentityKind::Value,
                    });
                }
            }
            IdentityOutcome::Probe {
                name: name.clone(),
                modules: probe_modules(tracker),
                kind: IdentityKind::Value,
            }
        }
        Target::RecordUpdateName { name, scope, .. } => {
            if scope_lookup(scope, name).is_some() {
                return IdentityOutcome::Unknown;
            }
            if ast.find_declaration(name).is_some() {
                return IdentityOutcome::Found(SymbolIdentity {
                    def_module: current,
                    name: name.clone(),
                    kind: IdentityKind::Value,
                });
            }
            IdentityOutcome::Unknown
        }
    }
}

/// Open imports in encounter order, then modules reached through
/// `T(..)` exposing items; first match wins on probing.
fn probe_modules(tracker: &ImportTracker) -> Vec<String> {
    let mut modules = tracker.unknown_imports.clone();
    for extra in tracker.open_type_imports.values().flatten() {
        if !modules.iter().any(|m| m == extra) {
            modules.push(extra.clone());
        }
    }
    modules
}

fn exposed_kind(kind: &ExposedKind) -> IdentityKind {
    match kind {
        ExposedKind::TypeOrAlias | ExposedKind::Type { .. } => IdentityKind::Type,
        ExposedKind::Value | ExposedKind::Infix => IdentityKind::Value,
    }
}
