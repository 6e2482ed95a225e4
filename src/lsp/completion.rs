use crate::language::ast::{Ast, Declaration, ExposedKind, ExposingList};
use crate::lsp::hover::render_annotation;
use crate::lsp::imports::ImportTracker;
use crate::lsp::loader::ModuleLoader;
use crate::project::load_docs;
use std::collections::HashSet;
use tower_lsp_server::lsp_types::{CompletionItem, CompletionItemKind, Position};

/// Completion triggered after `.`: qualified members of the module the
/// prefix denotes, plus continuations of deeper module names. Without a
/// qualifier, same-file declarations and explicit exposings.
pub async fn completions(
    ast: Option<&Ast>,
    tracker: Option<&ImportTracker>,
    text: &str,
    position: Position,
    loader: &ModuleLoader<'_>,
) -> Vec<CompletionItem> {
    match qualifier_before_cursor(text, position) {
        Some(qualifier) => {
            let widened = match tracker {
                Some(tracker) => tracker.resolve_qualifier(&qualifier),
                None => vec![qualifier.clone()],
            };
            let mut items = Vec::new();
            for module in &widened {
                module_member_items(module, loader, &mut items).await;
            }
            for module in &widened {
                submodule_items(module, loader, &mut items).await;
            }
            items
        }
        None => unqualified_items(ast, tracker),
    }
}

/// The dotted uppercase chain ending in the `.` just before the cursor.
fn qualifier_before_cursor(text: &str, position: Position) -> Option<String> {
    let line = text.lines().nth(position.line as usize)?;
    let before: String = line.chars().take(position.character as usize).collect();
    let trimmed = before.strip_suffix('.')?;
    let start = trimmed
        .rfind(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '.'))
        .map(|index| index + 1)
        .unwrap_or(0);
    let chain = &trimmed[start..];
    if chain.is_empty() || !chain.chars().next().is_some_and(|ch| ch.is_uppercase()) {
        return None;
    }
    Some(chain.to_string())
}

/// Exposed members of a module: project file first, package docs second.
async fn module_member_items(
    module: &str,
    loader: &ModuleLoader<'_>,
    items: &mut Vec<CompletionItem>,
) {
    if let Some(loaded) = loader.load(module).await {
        ast_member_items(&loaded.ast, items);
        return;
    }
    let Some(manifest) = loader.manifest() else {
        return;
    };
    for dependency in &manifest.dependencies {
        let docs = load_docs(&dependency.docs_path(&manifest.elm_version));
        let Some(module_docs) = docs.iter().find(|docs| docs.name == module) else {
            continue;
        };
        for value in &module_docs.values {
            items.push(item(
                &value.name,
                CompletionItemKind::FUNCTION,
                Some(value.tipe.clone()),
            ));
        }
        for alias in &module_docs.aliases {
            items.push(item(&alias.name, CompletionItemKind::STRUCT, None));
        }
        for union in &module_docs.unions {
            items.push(item(&union.name, CompletionItemKind::ENUM, None));
            for (ctor, _) in &union.cases {
                items.push(item(ctor, CompletionItemKind::ENUM_MEMBER, None));
            }
        }
        return;
    }
}

fn ast_member_items(ast: &Ast, items: &mut Vec<CompletionItem>) {
    for declaration in &ast.declarations {
        match declaration {
            Declaration::Function(func) => {
                if !crate::language::ast::is_exposed_from_module(ast, &func.name.value) {
                    continue;
                }
                let detail = func
                    .signature
                    .as_ref()
                    .map(|signature| render_annotation(&signature.type_annotation));
                items.push(item(&func.name.value, CompletionItemKind::FUNCTION, detail));
            }
            Declaration::TypeAlias(alias) => {
                if crate::language::ast::is_exposed_from_module(ast, &alias.name.value) {
                    items.push(item(&alias.name.value, CompletionItemKind::STRUCT, None));
                }
            }
            Declaration::CustomType(ty) => {
                if crate::language::ast::is_exposed_from_module(ast, &ty.name.value) {
                    items.push(item(&ty.name.value, CompletionItemKind::ENUM, None));
                }
                for ctor in &ty.constructors {
                    if crate::language::ast::is_exposed_from_module(ast, &ctor.name.value) {
                        items.push(item(
                            &ctor.name.value,
                            CompletionItemKind::ENUM_MEMBER,
                            None,
                        ));
                    }
                }
            }
            Declaration::Port(port) => {
                if crate::language::ast::is_exposed_from_module(ast, &port.signature.name.value) {
                    items.push(item(
                        &port.signature.name.value,
                        CompletionItemKind::FUNCTION,
                        Some(render_annotation(&port.signature.type_annotation)),
                    ));
                }
            }
            Declaration::Destructuring(_) | Declaration::Infix(_) => {}
        }
    }
}

/// The next dotted segment of any known module extending `prefix.`.
async fn submodule_items(prefix: &str, loader: &ModuleLoader<'_>, items: &mut Vec<CompletionItem>) {
    let Some(manifest) = loader.manifest() else {
        return;
    };
    let mut known: Vec<String> = Vec::new();
    for path in manifest.source_files() {
        if let Some(name) = manifest.module_name_for_path(&path) {
            known.push(name);
        }
    }
    for dependency in &manifest.dependencies {
        let docs = load_docs(&dependency.docs_path(&manifest.elm_version));
        known.extend(docs.iter().map(|docs| docs.name.clone()));
    }

    let wanted = format!("{prefix}.");
    let mut offered: HashSet<String> = HashSet::new();
    for module in known {
        let Some(rest) = module.strip_prefix(&wanted) else {
            continue;
        };
        let Some(segment) = rest.split('.').next() else {
            continue;
        };
        if segment.is_empty() || !offered.insert(segment.to_string()) {
            continue;
        }
        items.push(item(segment, CompletionItemKind::MODULE, None));
    }
}

fn unqualified_items(ast: Option<&Ast>, tracker: Option<&ImportTracker>) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    if let Some(ast) = ast {
        for declaration in &ast.declarations {
            let Some(name) = declaration.name() else {
                continue;
            };
            if !seen.insert(name.value.clone()) {
                continue;
            }
            let kind = match declaration {
                Declaration::TypeAlias(_) => CompletionItemKind::STRUCT,
                Declaration::CustomType(_) => CompletionItemKind::ENUM,
                _ => CompletionItemKind::FUNCTION,
            };
            items.push(item(&name.value, kind, None));
        }
    }
    if let Some(tracker) = tracker {
        let mut exposed: Vec<&String> = tracker.explicit_exposing.keys().collect();
        exposed.sort();
        for name in exposed {
            if seen.insert(name.clone()) {
                items.push(item(name, CompletionItemKind::VALUE, None));
            }
        }
    }
    items
}

fn item(label: &str, kind: CompletionItemKind, detail: Option<String>) -> CompletionItem {
    CompletionItem {
        label: label.to_string(),
        kind: Some(kind),
        detail,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse;
    use crate::lsp::backend::state::Documents;
    use crate::lsp::parse_service::ParseService;
    use crate::project::find_manifest_for;
    use std::fs;

    #[test]
    fn qualifier_extraction_stops_at_the_dot() {
        let text = "module Main exposing (..)\n\nx = H.\n";
        assert_eq!(
            qualifier_before_cursor(text, Position::new(2, 6)).as_deref(),
            Some("H")
        );
        let nested = "module Main exposing (..)\n\ny = Json.Decode.\n";
        assert_eq!(
            qualifier_before_cursor(nested, Position::new(2, 16)).as_deref(),
            Some("Json.Decode")
        );
        // `model.` is a record access, not a module qualifier.
        let record = "module Main exposing (..)\n\nz = model.\n";
        assert_eq!(qualifier_before_cursor(record, Position::new(2, 10)), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn alias_qualified_completion_lists_the_target_module() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("elm.json"),
            r#"{ "type": "application", "source-directories": ["src"],
                 "elm-version": "0.19.1", "dependencies": { "direct": {} } }"#,
        )
        .expect("write elm.json");
        fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        fs::write(
            dir.path().join("src/Helpers.elm"),
            "module Helpers exposing (add, multiply, greet)\n\n\
             add : Int -> Int -> Int\nadd a b =\n    a + b\n\n\
             multiply : Int -> Int -> Int\nmultiply a b =\n    a * b\n\n\
             greet : String -> String\ngreet name =\n    name\n",
        )
        .expect("write Helpers");

        // The live buffer does not parse mid-word; imports come from the
        // last good version of the document.
        let main_text = "module Main exposing (..)\n\nimport Helpers as H\n\nx = H.\n";
        let stale = "module Main exposing (..)\n\nimport Helpers as H\n\nx = 1\n";
        let ast = parse(stale).expect("parse");
        let tracker = ImportTracker::new(&ast);
        let manifest = find_manifest_for(dir.path()).expect("manifest");
        let service = ParseService::default();
        let documents = Documents::default();
        let loader = ModuleLoader::new(Some(manifest), &service, &documents);

        let items = completions(
            Some(&ast),
            Some(&tracker),
            main_text,
            Position::new(4, 6),
            &loader,
        )
        .await;
        let labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
        assert!(labels.contains(&"add"));
        assert!(labels.contains(&"multiply"));
        assert!(labels.contains(&"greet"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submodule_segments_complete_one_level() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("elm.json"),
            r#"{ "type": "application", "source-directories": ["src"],
                 "elm-version": "0.19.1", "dependencies": { "direct": {} } }"#,
        )
        .expect("write elm.json");
        fs::create_dir_all(dir.path().join("src/Api/Deep")).expect("mkdir");
        fs::write(
            dir.path().join("src/Api/Client.elm"),
            "module Api.Client exposing (..)\n\nget x =\n    x\n",
        )
        .expect("write Client");
        fs::write(
            dir.path().join("src/Api/Deep/Inner.elm"),
            "module Api.Deep.Inner exposing (..)\n\ninner x =\n    x\n",
        )
        .expect("write Inner");

        let main_text = "module Main exposing (..)\n\nimport Api.Client\n\nx = Api.\n";
        let stale = "module Main exposing (..)\n\nimport Api.Client\n\nx = 1\n";
        let ast = parse(stale).expect("parse");
        let tracker = ImportTracker::new(&ast);
        let manifest = find_manifest_for(dir.path()).expect("manifest");
        let service = ParseService::default();
        let documents = Documents::default();
        let loader = ModuleLoader::new(Some(manifest), &service, &documents);

        let items = completions(
            Some(&ast),
            Some(&tracker),
            main_text,
            Position::new(4, 8),
            &loader,
        )
        .await;
        let labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
        assert!(labels.contains(&"Client"));
        assert!(labels.contains(&"Deep"), "only the next segment is offered");
        assert!(!labels.contains(&"Inner"));
    }

    #[test]
    fn unqualified_completion_offers_own_declarations_and_exposings() {
        let ast = parse(
            "module Main exposing (..)\n\nimport Helpers exposing (add)\n\nupdate msg model =\n    model\n",
        )
        .expect("parse");
        let tracker = ImportTracker::new(&ast);
        let items = unqualified_items(Some(&ast), Some(&tracker));
        let labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
        assert!(labels.contains(&"update"));
        assert!(labels.contains(&"add"));
        assert!(labels.contains(&"Just"), "prelude names are offered");
    }
}
