use crate::language::ast::*;
use tower_lsp_server::lsp_types::{DocumentSymbol, SymbolKind};

/// A tree of the module's declarations; let-bound function names become
/// children of their enclosing function.
pub fn collect_document_symbols(ast: &Ast) -> Vec<DocumentSymbol> {
    let mut symbols = Vec::new();
    for declaration in &ast.declarations {
        match declaration {
            Declaration::Function(func) => {
                let mut children = Vec::new();
                collect_let_functions(&func.expression, &mut children);
                symbols.push(symbol(
                    &func.name.value,
                    SymbolKind::FUNCTION,
                    func.range,
                    func.name.range,
                    children,
                ));
            }
            Declaration::TypeAlias(alias) => {
                symbols.push(symbol(
                    &alias.name.value,
                    SymbolKind::OBJECT,
                    alias.range,
                    alias.name.range,
                    Vec::new(),
                ));
            }
            Declaration::CustomType(ty) => {
                let children = ty
                    .constructors
                    .iter()
                    .map(|ctor| {
                        symbol(
                            &ctor.name.value,
                            SymbolKind::ENUM_MEMBER,
                            ctor.range,
                            ctor.name.range,
                            Vec::new(),
                        )
                    })
                    .collect();
                symbols.push(symbol(
                    &ty.name.value,
                    SymbolKind::ENUM,
                    ty.range,
                    ty.name.range,
                    children,
                ));
            }
            Declaration::Port(port) => {
                symbols.push(symbol(
                    &port.signature.name.value,
                    SymbolKind::FUNCTION,
                    port.range,
                    port.signature.name.range,
                    Vec::new(),
                ));
            }
            Declaration::Destructuring(destructuring) => {
                for binder in pattern_binders(&destructuring.pattern) {
                    symbols.push(symbol(
                        &binder.value,
                        SymbolKind::VARIABLE,
                        destructuring.range,
                        binder.range,
                        Vec::new(),
                    ));
                }
            }
            Declaration::Infix(_) => {}
        }
    }
    symbols
}

fn collect_let_functions(expression: &Expression, out: &mut Vec<DocumentSymbol>) {
    match &expression.kind {
        ExpressionKind::LetExpression {
            declarations,
            expression,
        } => {
            for declaration in declarations {
                if let LetDeclaration::Function(func) = declaration {
                    let mut children = Vec::new();
                    collect_let_functions(&func.expression, &mut children);
                    out.push(symbol(
                        &func.name.value,
                        SymbolKind::FUNCTION,
                        func.range,
                        func.name.range,
                        children,
                    ));
                }
            }
            collect_let_functions(expression, out);
        }
        ExpressionKind::Application(items)
        | ExpressionKind::Tupled(items)
        | ExpressionKind::ListExpr(items) => {
            for item in items {
                collect_let_functions(item, out);
            }
        }
        ExpressionKind::OperatorApplication { left, right, .. } => {
            collect_let_functions(left, out);
            collect_let_functions(right, out);
        }
        ExpressionKind::IfBlock {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_let_functions(condition, out);
            collect_let_functions(then_branch, out);
            collect_let_functions(else_branch, out);
        }
        ExpressionKind::CaseExpression {
            expression: scrutinee,
            cases,
        } => {
            collect_let_functions(scrutinee, out);
            for case in cases {
                collect_let_functions(&case.expression, out);
            }
        }
        ExpressionKind::Lambda { expression, .. }
        | ExpressionKind::Parenthesized(expression)
        | ExpressionKind::Negation(expression)
        | ExpressionKind::RecordAccess { expression, .. } => {
            collect_let_functions(expression, out);
        }
        ExpressionKind::Record(setters) | ExpressionKind::RecordUpdate { setters, .. } => {
            for setter in setters {
                collect_let_functions(&setter.expression, out);
            }
        }
        _ => {}
    }
}

fn symbol(
    name: &str,
    kind: SymbolKind,
    range: crate::language::span::Range,
    selection: crate::language::span::Range,
    children: Vec<DocumentSymbol>,
) -> DocumentSymbol {
    #[allow(deprecated)]
    DocumentSymbol {
        name: name.to_string(),
        detail: None,
        kind,
        tags: None,
        deprecated: None,
        range: range.to_lsp(),
        selection_range: selection.to_lsp(),
        children: if children.is_empty() {
            None
        } else {
            Some(children)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse;

    #[test]
    fn let_bound_functions_nest_under_their_parent() {
        let ast = parse(
            "module X exposing (..)\n\ntype Msg\n    = Go\n\nupdate msg =\n    let\n        helper n =\n            n\n    in\n    helper msg\n",
        )
        .expect("parse");
        let symbols = collect_document_symbols(&ast);
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "Msg");
        assert_eq!(symbols[0].kind, SymbolKind::ENUM);
        let ctors = symbols[0].children.as_ref().expect("constructors");
        assert_eq!(ctors[0].name, "Go");

        assert_eq!(symbols[1].name, "update");
        let children = symbols[1].children.as_ref().expect("let children");
        assert_eq!(children[0].name, "helper");
        assert_eq!(children[0].kind, SymbolKind::FUNCTION);
    }
}
