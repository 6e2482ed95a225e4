use crate::language::{
    ast::*,
    span::Position,
};
use crate::lsp::imports::ImportTracker;
use crate::lsp::loader::ModuleLoader;
use crate::lsp::resolve::{locate, resolve_identity, scope_lookup, Target};
use crate::project::{load_docs, ModuleDocs};
use tower_lsp_server::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind};

/// Markdown hover for the symbol at a position: local project sources
/// first, package docs second.
pub async fn hover(
    ast: &Ast,
    tracker: &ImportTracker,
    position: Position,
    loader: &ModuleLoader<'_>,
) -> Option<Hover> {
    let target = locate(ast, position)?;

    // Locals have no declaration to render; show the binder name.
    if let Target::ExprName {
        module_parts,
        name,
        scope,
        range,
    } = &target
    {
        if module_parts.is_empty() && scope_lookup(scope, name).is_some() {
            return Some(markdown_hover(format!("```elm\n{name}\n```"), *range));
        }
    }

    let range = target_range(ast, &target)?;
    let outcome = resolve_identity(ast, tracker, &target);
    let identity = loader.settle_identity(outcome).await?;

    // The defining module's own source wins when it is a project file.
    if identity.def_module == ast.module_name() {
        let markdown = render_from_ast(ast, &identity.name)?;
        return Some(markdown_hover(markdown, range));
    }
    if let Some(loaded) = loader.load(&identity.def_module).await {
        let markdown = render_from_ast(&loaded.ast, &identity.name)?;
        return Some(markdown_hover(markdown, range));
    }
    let markdown = render_from_docs(loader, &identity.def_module, &identity.name)?;
    Some(markdown_hover(markdown, range))
}

fn target_range(ast: &Ast, target: &Target) -> Option<crate::language::span::Range> {
    match target {
        Target::HeaderExposed { item } | Target::ImportExposed { item, .. } => Some(item.range),
        Target::ImportModule { index } => Some(ast.imports.get(*index)?.module_name.range),
        Target::DeclarationName { index } | Target::SignatureName { index } => {
            Some(ast.declarations.get(*index)?.name()?.range)
        }
        Target::ConstructorName {
            type_index,
            ctor_index,
        } => match ast.declarations.get(*type_index)? {
            Declaration::CustomType(ty) => Some(ty.constructors.get(*ctor_index)?.name.range),
            _ => None,
        },
        Target::TypedName { range, .. }
        | Target::PatternConstructor { range, .. }
        | Target::ExprName { range, .. }
        | Target::RecordUpdateName { range, .. } => Some(*range),
    }
}

fn markdown_hover(markdown: String, range: crate::language::span::Range) -> Hover {
    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: markdown,
        }),
        range: Some(range.to_lsp()),
    }
}

/// Render a declaration or constructor defined in a parsed module.
fn render_from_ast(ast: &Ast, name: &str) -> Option<String> {
    let module = ast.module_name();
    if let Some(declaration) = ast.find_declaration(name) {
        return Some(match declaration {
            Declaration::Function(func) => render_function(func, module),
            Declaration::TypeAlias(alias) => render_type_alias(alias, module),
            Declaration::CustomType(ty) => render_custom_type(ty, module),
            Declaration::Port(port) => render_port(port, module),
            Declaration::Destructuring(_) | Declaration::Infix(_) => {
                format!("```elm\n{name}\n```\n\n*{module}*")
            }
        });
    }
    let (ty, ctor) = ast.find_constructor(name)?;
    Some(render_constructor(
        &ctor.name.value,
        &ctor
            .arguments
            .iter()
            .map(render_annotation_atom)
            .collect::<Vec<_>>(),
        &ty.name.value,
        module,
    ))
}

fn render_function(func: &FunctionDecl, module: &str) -> String {
    let mut out = String::new();
    match &func.signature {
        Some(signature) => {
            let ty = render_annotation(&signature.type_annotation);
            out.push_str(&format!("```elm\n{} : {}\n```\n", func.name.value, ty));
        }
        None => out.push_str(&format!("```elm\n{}\n```\n", func.name.value)),
    }
    push_doc(&mut out, func.documentation.as_ref());
    out.push_str(&format!("\n*{module}*"));
    out
}

fn render_type_alias(alias: &TypeAliasDecl, module: &str) -> String {
    let mut out = format!(
        "```elm\ntype alias {} =\n    {}\n```\n",
        alias.name.value,
        render_annotation(&alias.type_annotation)
    );
    push_doc(&mut out, alias.documentation.as_ref());
    out.push_str(&format!("\n*{module}*"));
    out
}

fn render_custom_type(ty: &CustomTypeDecl, module: &str) -> String {
    let mut body = format!("type {}", ty.name.value);
    for (index, ctor) in ty.constructors.iter().enumerate() {
        let sep = if index == 0 { "=" } else { "|" };
        body.push_str(&format!("\n    {sep} {}", ctor.name.value));
        for argument in &ctor.arguments {
            body.push(' ');
            body.push_str(&render_annotation_atom(argument));
        }
    }
    let mut out = format!("```elm\n{body}\n```\n");
    push_doc(&mut out, ty.documentation.as_ref());
    out.push_str(&format!("\n*{module}*"));
    out
}

fn render_port(port: &PortDecl, module: &str) -> String {
    format!(
        "```elm\nport {} : {}\n```\n\n*{module}*",
        port.signature.name.value,
        render_annotation(&port.signature.type_annotation)
    )
}

fn render_constructor(name: &str, args: &[String], owner: &str, module: &str) -> String {
    let mut line = name.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    format!("```elm\n{line}\n```\n\nConstructor of `{owner}`\n\n*{module}*")
}

fn push_doc(out: &mut String, documentation: Option<&Comment>) {
    if let Some(doc) = documentation {
        let body = doc.doc_body();
        if !body.is_empty() {
            out.push('\n');
            out.push_str(body);
            out.push('\n');
        }
    }
}

/// Find the symbol in the package docs of the direct dependencies, in
/// declaration order; first hit wins.
fn render_from_docs(loader: &ModuleLoader<'_>, module: &str, name: &str) -> Option<String> {
    let manifest = loader.manifest()?;
    for dependency in &manifest.dependencies {
        let docs = load_docs(&dependency.docs_path(&manifest.elm_version));
        let Some(module_docs) = docs.iter().find(|docs| docs.name == module) else {
            continue;
        };
        if let Some(markdown) = render_docs_entry(module_docs, name) {
            return Some(markdown);
        }
    }
    None
}

fn render_docs_entry(docs: &ModuleDocs, name: &str) -> Option<String> {
    let module = &docs.name;
    if let Some(value) = docs
        .values
        .iter()
        .chain(docs.binops.iter())
        .find(|value| value.name == name)
    {
        let mut out = format!("```elm\n{} : {}\n```\n", value.name, value.tipe);
        if !value.comment.trim().is_empty() {
            out.push('\n');
            out.push_str(value.comment.trim());
            out.push('\n');
        }
        out.push_str(&format!("\n*{module}*"));
        return Some(out);
    }
    if let Some(alias) = docs.aliases.iter().find(|alias| alias.name == name) {
        let mut out = format!("```elm\ntype alias {} =\n    {}\n```\n", alias.name, alias.tipe);
        if !alias.comment.trim().is_empty() {
            out.push('\n');
            out.push_str(alias.comment.trim());
            out.push('\n');
        }
        out.push_str(&format!("\n*{module}*"));
        return Some(out);
    }
    if let Some(union) = docs.unions.iter().find(|union| union.name == name) {
        let mut body = format!("type {}", union.name);
        for arg in &union.args {
            body.push(' ');
            body.push_str(arg);
        }
        for (index, (ctor, args)) in union.cases.iter().enumerate() {
            let sep = if index == 0 { "=" } else { "|" };
            body.push_str(&format!("\n    {sep} {ctor}"));
            for arg in args {
                body.push(' ');
                body.push_str(arg);
            }
        }
        let mut out = format!("```elm\n{body}\n```\n");
        if !union.comment.trim().is_empty() {
            out.push('\n');
            out.push_str(union.comment.trim());
            out.push('\n');
        }
        out.push_str(&format!("\n*{module}*"));
        return Some(out);
    }
    // A constructor of one of the module's unions.
    for union in &docs.unions {
        if let Some((ctor, args)) = union.case(name) {
            let rendered: Vec<String> = args.clone();
            return Some(render_constructor(ctor, &rendered, &union.name, module));
        }
    }
    None
}

/// Structural rendering of a type annotation.
pub fn render_annotation(annotation: &TypeAnnotation) -> String {
    match &annotation.kind {
        TypeAnnotationKind::Generic(name) => name.clone(),
        TypeAnnotationKind::Unit => "()".to_string(),
        TypeAnnotationKind::Typed {
            module_parts,
            name,
            args,
        } => {
            let mut out = if module_parts.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", module_parts.join("."), name)
            };
            for arg in args {
                out.push(' ');
                out.push_str(&render_annotation_atom(arg));
            }
            out
        }
        TypeAnnotationKind::Function { left, right } => {
            let left_rendered = match left.kind {
                TypeAnnotationKind::Function { .. } => {
                    format!("({})", render_annotation(left))
                }
                _ => render_annotation(left),
            };
            format!("{} -> {}", left_rendered, render_annotation(right))
        }
        TypeAnnotationKind::Tupled(items) => {
            let rendered: Vec<String> = items.iter().map(render_annotation).collect();
            format!("( {} )", rendered.join(", "))
        }
        TypeAnnotationKind::Record(fields) => render_record(fields, None),
        TypeAnnotationKind::GenericRecord { generic, fields } => {
            render_record(fields, Some(&generic.value))
        }
    }
}

/// Parenthesize arguments that would otherwise swallow what follows.
fn render_annotation_atom(annotation: &TypeAnnotation) -> String {
    match &annotation.kind {
        TypeAnnotationKind::Function { .. } => format!("({})", render_annotation(annotation)),
        TypeAnnotationKind::Typed { args, .. } if !args.is_empty() => {
            format!("({})", render_annotation(annotation))
        }
        _ => render_annotation(annotation),
    }
}

fn render_record(fields: &[RecordField], generic: Option<&str>) -> String {
    let rendered: Vec<String> = fields
        .iter()
        .map(|field| {
            format!(
                "{} : {}",
                field.name.value,
                render_annotation(&field.type_annotation)
            )
        })
        .collect();
    match generic {
        Some(generic) => format!("{{ {} | {} }}", generic, rendered.join(", ")),
        None => format!("{{ {} }}", rendered.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse;

    fn annotation_of(source: &str) -> TypeAnnotation {
        let ast = parse(source).expect("parse");
        for declaration in ast.declarations {
            if let Declaration::Function(func) = declaration {
                if let Some(signature) = func.signature {
                    return signature.type_annotation;
                }
            }
        }
        panic!("no signature in fixture");
    }

    #[test]
    fn function_types_parenthesize_function_arguments() {
        let annotation =
            annotation_of("module X exposing (..)\n\nf : (Int -> Int) -> List Int -> List Int\nf g xs = xs\n");
        assert_eq!(
            render_annotation(&annotation),
            "(Int -> Int) -> List Int -> List Int"
        );
    }

    #[test]
    fn records_tuples_and_generics_render_structurally() {
        let annotation = annotation_of(
            "module X exposing (..)\n\nf : { r | name : String } -> ( Int, Maybe a ) -> ()\nf r t = ()\n",
        );
        assert_eq!(
            render_annotation(&annotation),
            "{ r | name : String } -> ( Int, Maybe a ) -> ()"
        );
    }

    #[test]
    fn custom_types_render_with_their_constructors() {
        let ast = parse(
            "module Types exposing (..)\n\ntype Msg\n    = Increment\n    | SetName String\n",
        )
        .expect("parse");
        let markdown = render_from_ast(&ast, "Msg").expect("hover");
        assert!(markdown.contains("type Msg"));
        assert!(markdown.contains("= Increment"));
        assert!(markdown.contains("| SetName String"));
        assert!(markdown.ends_with("*Types*"));
    }

    #[test]
    fn constructors_name_their_owner() {
        let ast = parse(
            "module Types exposing (..)\n\ntype Msg\n    = SetName String\n",
        )
        .expect("parse");
        let markdown = render_from_ast(&ast, "SetName").expect("hover");
        assert!(markdown.contains("SetName String"));
        assert!(markdown.contains("Constructor of `Msg`"));
    }

    #[test]
    fn functions_render_signature_doc_and_footer() {
        let ast = parse(
            "module Helpers exposing (..)\n\n{-| Add two numbers. -}\nadd : Int -> Int -> Int\nadd a b =\n    a + b\n",
        )
        .expect("parse");
        let markdown = render_from_ast(&ast, "add").expect("hover");
        assert!(markdown.starts_with("```elm\nadd : Int -> Int -> Int\n```"));
        assert!(markdown.contains("Add two numbers."));
        assert!(markdown.ends_with("*Helpers*"));
    }

    #[test]
    fn ports_render_with_the_port_keyword() {
        let ast = parse(
            "port module Ports exposing (save)\n\nport save : String -> Cmd msg\n",
        )
        .expect("parse");
        let markdown = render_from_ast(&ast, "save").expect("hover");
        assert!(markdown.starts_with("```elm\nport save : String -> Cmd msg\n```"));
    }
}
