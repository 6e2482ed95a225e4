use crate::language::{
    ast::{is_exposed_from_module, Ast, Declaration},
    span::{Position, Range},
};
use crate::lsp::imports::ImportTracker;
use crate::lsp::loader::ModuleLoader;
use crate::lsp::resolve::{locate, scope_lookup, Target};
use crate::lsp::text::path_to_uri;
use tower_lsp_server::lsp_types::{Location, Uri};

/// Resolve goto-definition at a position. Local scope wins over
/// same-file declarations, which win over imports.
pub async fn goto_definition(
    ast: &Ast,
    tracker: &ImportTracker,
    uri: &Uri,
    position: Position,
    loader: &ModuleLoader<'_>,
) -> Option<Location> {
    let target = locate(ast, position)?;
    match target {
        Target::HeaderExposed { item } => {
            same_file_location(ast, uri, &item.name)
        }
        Target::ImportModule { index } => {
            let import = ast.imports.get(index)?;
            let manifest = loader.manifest()?;
            let path = manifest.resolve_module_to_file(&import.module_name.value)?;
            let file_uri = path_to_uri(&path)?;
            let start = Range::new(Position::new(1, 1), Position::new(1, 1));
            Some(Location::new(file_uri, start.to_lsp()))
        }
        Target::ImportExposed { module, item } => {
            find_in_module(loader, &module, &item.name).await
        }
        Target::DeclarationName { index } => {
            let declaration = ast.declarations.get(index)?;
            let name = declaration.name()?;
            Some(Location::new(uri.clone(), name.range.to_lsp()))
        }
        Target::SignatureName { index } => {
            let declaration = ast.declarations.get(index)?;
            let name = declaration.name()?;
            Some(Location::new(uri.clone(), name.range.to_lsp()))
        }
        Target::ConstructorName {
            type_index,
            ctor_index,
        } => {
            let Declaration::CustomType(ty) = ast.declarations.get(type_index)? else {
                return None;
            };
            let ctor = ty.constructors.get(ctor_index)?;
            Some(Location::new(uri.clone(), ctor.name.range.to_lsp()))
        }
        Target::TypedName {
            module_parts, name, ..
        } => {
            if module_parts.is_empty() {
                if let Some(location) = same_file_type_location(ast, uri, &name) {
                    return Some(location);
                }
                resolve_through_tracker(tracker, loader, &name).await
            } else {
                let qualifier = module_parts.join(".");
                for module in tracker.resolve_qualifier(&qualifier) {
                    if let Some(location) = find_in_module(loader, &module, &name).await {
                        return Some(location);
                    }
                }
                None
            }
        }
        Target::PatternConstructor {
            module_parts, name, ..
        } => {
            if module_parts.is_empty() {
                if let Some((_, ctor)) = ast.find_constructor(&name) {
                    return Some(Location::new(uri.clone(), ctor.name.range.to_lsp()));
                }
                resolve_through_tracker(tracker, loader, &name).await
            } else {
                let qualifier = module_parts.join(".");
                for module in tracker.resolve_qualifier(&qualifier) {
                    if let Some(location) = find_in_module(loader, &module, &name).await {
                        return Some(location);
                    }
                }
                None
            }
        }
        Target::ExprName {
            module_parts,
            name,
            scope,
            ..
        } => {
            if module_parts.is_empty() {
                if let Some(entry) = scope_lookup(&scope, &name) {
                    return Some(Location::new(uri.clone(), entry.range.to_lsp()));
                }
                if let Some(location) = same_file_location(ast, uri, &name) {
                    return Some(location);
                }
                resolve_through_tracker(tracker, loader, &name).await
            } else {
                let qualifier = module_parts.join(".");
                for module in tracker.resolve_qualifier(&qualifier) {
                    if let Some(location) = find_in_module(loader, &module, &name).await {
                        return Some(location);
                    }
                }
                None
            }
        }
        Target::RecordUpdateName { name, scope, .. } => {
            if let Some(entry) = scope_lookup(&scope, &name) {
                return Some(Location::new(uri.clone(), entry.range.to_lsp()));
            }
            same_file_location(ast, uri, &name)
        }
    }
}

/// A declaration or constructor in the current file.
fn same_file_location(ast: &Ast, uri: &Uri, name: &str) -> Option<Location> {
    if let Some(declaration) = ast.find_declaration(name) {
        let target = declaration.name()?;
        return Some(Location::new(uri.clone(), target.range.to_lsp()));
    }
    if let Some((_, ctor)) = ast.find_constructor(name) {
        return Some(Location::new(uri.clone(), ctor.name.range.to_lsp()));
    }
    None
}

fn same_file_type_location(ast: &Ast, uri: &Uri, name: &str) -> Option<Location> {
    match ast.find_declaration(name)? {
        declaration @ (Declaration::TypeAlias(_) | Declaration::CustomType(_)) => {
            let target = declaration.name()?;
            Some(Location::new(uri.clone(), target.range.to_lsp()))
        }
        _ => None,
    }
}

/// Explicit exposings first, then open imports, then `T(..)` items.
async fn resolve_through_tracker(
    tracker: &ImportTracker,
    loader: &ModuleLoader<'_>,
    name: &str,
) -> Option<Location> {
    if let Some(modules) = tracker.explicit_exposing.get(name) {
        for module in modules {
            if let Some(location) = find_in_module(loader, module, name).await {
                return Some(location);
            }
        }
    }
    for module in &tracker.unknown_imports {
        if let Some(location) = find_in_module(loader, module, name).await {
            return Some(location);
        }
    }
    for modules in tracker.open_type_imports.values() {
        for module in modules {
            if let Some(location) = find_in_module(loader, module, name).await {
                return Some(location);
            }
        }
    }
    None
}

/// A declaration or constructor in another module, honoring that
/// module's own exposing list.
async fn find_in_module(
    loader: &ModuleLoader<'_>,
    module: &str,
    name: &str,
) -> Option<Location> {
    let loaded = loader.load(module).await?;
    if !is_exposed_from_module(&loaded.ast, name) {
        return None;
    }
    same_file_location(&loaded.ast, &loaded.uri, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse;
    use crate::lsp::backend::state::Documents;
    use crate::lsp::hover::hover;
    use crate::lsp::parse_service::ParseService;
    use crate::project::find_manifest_for;
    use std::fs;
    use std::path::Path;

    const ELM_JSON: &str = r#"{
        "type": "application",
        "source-directories": ["src"],
        "elm-version": "0.19.1",
        "dependencies": { "direct": {}, "indirect": {} }
    }"#;

    const HELPERS: &str = "\
module Helpers exposing (add, greet)

add : Int -> Int -> Int
add a b =
    a + b

greet : String -> String
greet name =
    name

hidden : Int
hidden =
    1
";

    const TYPES: &str = "\
module Types exposing (Msg(..), Model)

type Msg
    = Increment
    | Decrement
    | SetName String

type alias Model =
    { count : Int
    , name : String
    }
";

    const MAIN: &str = "\
module Main exposing (main, update)

import Helpers exposing (add, greet)
import Types exposing (Msg(..), Model)

main : Model
main =
    { count = add 1 2, name = greet \"hi\" }

update : Msg -> Model -> Model
update msg model =
    case msg of
        SetName name ->
            { model | name = name }

        Increment ->
            { model | count = add model.count 1 }

        Decrement ->
            model
";

    struct Fixture {
        _dir: tempfile::TempDir,
        manifest: crate::project::Manifest,
        main_uri: Uri,
    }

    fn workspace() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("elm.json"), ELM_JSON).expect("write elm.json");
        fs::create_dir_all(dir.path().join("src")).expect("mkdir src");
        fs::write(dir.path().join("src/Helpers.elm"), HELPERS).expect("write Helpers");
        fs::write(dir.path().join("src/Types.elm"), TYPES).expect("write Types");
        fs::write(dir.path().join("src/Main.elm"), MAIN).expect("write Main");
        let manifest = find_manifest_for(dir.path()).expect("manifest");
        let main_uri = path_to_uri(&dir.path().join("src/Main.elm")).expect("uri");
        Fixture {
            _dir: dir,
            manifest,
            main_uri,
        }
    }

    async fn definition_at(fixture: &Fixture, line: u32, col: u32) -> Option<Location> {
        let ast = parse(MAIN).expect("parse");
        let tracker = ImportTracker::new(&ast);
        let service = ParseService::default();
        let documents = Documents::default();
        let loader = ModuleLoader::new(Some(fixture.manifest.clone()), &service, &documents);
        goto_definition(
            &ast,
            &tracker,
            &fixture.main_uri,
            Position::new(line, col),
            &loader,
        )
        .await
    }

    fn file_name(location: &Location) -> String {
        let text = location.uri.to_string();
        Path::new(&text)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or(text)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cross_module_definition_through_import_exposing() {
        let fixture = workspace();
        // `add` inside `import Helpers exposing (add, greet)`.
        let location = definition_at(&fixture, 3, 27).await.expect("location");
        assert_eq!(file_name(&location), "Helpers.elm");
        // The defining equation's name node, not the signature line.
        assert_eq!(location.range.start.line, 3);
        assert_eq!(location.range.start.character, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn type_annotation_names_jump_to_the_defining_module() {
        let fixture = workspace();
        // `Msg` in `update : Msg -> Model -> Model`.
        let location = definition_at(&fixture, 10, 10).await.expect("location");
        assert_eq!(file_name(&location), "Types.elm");
        assert_eq!(location.range.start.line, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn local_pattern_binders_win_over_everything() {
        let fixture = workspace();
        // The right-hand `name` in `{ model | name = name }`.
        let location = definition_at(&fixture, 14, 31).await.expect("location");
        assert_eq!(file_name(&location), "Main.elm");
        assert_eq!(location.range.start.line, 12, "the `SetName name` binder");
        assert_eq!(location.range.start.character, 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unqualified_calls_resolve_through_explicit_exposing() {
        let fixture = workspace();
        // `add` in `{ count = add 1 2, ... }`.
        let location = definition_at(&fixture, 8, 15).await.expect("location");
        assert_eq!(file_name(&location), "Helpers.elm");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unexposed_names_do_not_resolve_across_modules() {
        let fixture = workspace();
        let ast = parse(
            "module Other exposing (x)\n\nimport Helpers exposing (..)\n\nx =\n    hidden\n",
        )
        .expect("parse");
        let tracker = ImportTracker::new(&ast);
        let service = ParseService::default();
        let documents = Documents::default();
        let loader = ModuleLoader::new(Some(fixture.manifest.clone()), &service, &documents);
        // `hidden` exists in Helpers but is not in its exposing list.
        let location = goto_definition(
            &ast,
            &tracker,
            &fixture.main_uri,
            Position::new(6, 5),
            &loader,
        )
        .await;
        assert!(location.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn constructor_patterns_jump_to_their_variant() {
        let fixture = workspace();
        // `Increment` as a case pattern.
        let location = definition_at(&fixture, 16, 9).await.expect("location");
        assert_eq!(file_name(&location), "Types.elm");
        assert_eq!(location.range.start.line, 3, "the `= Increment` variant");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn import_module_names_jump_to_the_file_start() {
        let fixture = workspace();
        // `Helpers` in `import Helpers exposing (add, greet)`.
        let location = definition_at(&fixture, 3, 9).await.expect("location");
        assert_eq!(file_name(&location), "Helpers.elm");
        assert_eq!(location.range.start.line, 0);
        assert_eq!(location.range.start.character, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hover_renders_the_signature_from_the_defining_module() {
        let fixture = workspace();
        let ast = parse(MAIN).expect("parse");
        let tracker = ImportTracker::new(&ast);
        let service = ParseService::default();
        let documents = Documents::default();
        let loader = ModuleLoader::new(Some(fixture.manifest.clone()), &service, &documents);
        let hover = hover(&ast, &tracker, Position::new(8, 15), &loader)
            .await
            .expect("hover");
        let tower_lsp_server::lsp_types::HoverContents::Markup(markup) = hover.contents else {
            panic!("expected markup hover");
        };
        assert!(markup.value.contains("add : Int -> Int -> Int"));
        assert!(markup.value.ends_with("*Helpers*"));
    }
}
