use crate::language::{
    ast::*,
    span::{Position, Range},
};
use crate::lsp::imports::{ImportTracker, PRELUDE_MODULES};
use crate::lsp::loader::ModuleLoader;
use crate::lsp::resolve::{IdentityKind, SymbolIdentity};
use crate::lsp::text::{exposed_name_range, qualified_name_range};
use std::collections::{HashMap, HashSet};
use tower_lsp_server::lsp_types::{Location, TextEdit, Uri, WorkspaceEdit};

/// Every binding and use site of an identity across the workspace.
/// Ranges are trimmed to the bare name so rename edits never eat a
/// qualifier or a `(..)` suffix.
pub async fn find_references(
    identity: &SymbolIdentity,
    loader: &ModuleLoader<'_>,
    include_declaration: bool,
) -> Vec<Location> {
    let Some(manifest) = loader.manifest() else {
        return Vec::new();
    };

    // The constructor's owning type gates `T(..)` imports.
    let owner_type = if identity.kind == IdentityKind::Constructor {
        match loader.load(&identity.def_module).await {
            Some(loaded) => loaded
                .ast
                .constructor_owner(&identity.name)
                .map(|ty| ty.name.value.clone()),
            None => None,
        }
    } else {
        None
    };

    let mut locations = Vec::new();
    let mut seen: HashSet<(String, u32, u32)> = HashSet::new();
    let mut declaration_sites: Vec<(Uri, Position)> = Vec::new();

    for path in manifest.source_files() {
        let Some((uri, ast)) = loader.parse_file(&path).await else {
            continue;
        };
        if !can_reference(&ast, identity) {
            continue;
        }
        let tracker = ImportTracker::new(&ast);
        let collector = Collector {
            identity,
            tracker: &tracker,
            is_def_module: ast.module_name() == identity.def_module,
            owner_type: owner_type.as_deref(),
        };
        let mut found = Vec::new();
        collector.collect(&ast, &mut found);
        for hit in found {
            let key = (uri.to_string(), hit.range.start.line, hit.range.start.col);
            if !seen.insert(key) {
                continue;
            }
            if hit.is_declaration {
                declaration_sites.push((uri.clone(), hit.range.start));
            }
            locations.push(Location::new(uri.clone(), hit.range.to_lsp()));
        }
    }

    if !include_declaration {
        let excluded: HashSet<(String, u32, u32)> = declaration_sites
            .iter()
            .map(|(uri, start)| (uri.to_string(), start.line, start.col))
            .collect();
        locations.retain(|location| {
            let start = Position::from_lsp(location.range.start);
            !excluded.contains(&(location.uri.to_string(), start.line, start.col))
        });
    }
    locations
}

/// Group the reference set into one workspace edit per file.
pub async fn rename_edits(
    identity: &SymbolIdentity,
    loader: &ModuleLoader<'_>,
    new_name: &str,
) -> Option<WorkspaceEdit> {
    let locations = find_references(identity, loader, true).await;
    if locations.is_empty() {
        return None;
    }
    let mut changes: HashMap<Uri, Vec<TextEdit>> = HashMap::new();
    for location in locations {
        changes.entry(location.uri).or_default().push(TextEdit {
            range: location.range,
            new_text: new_name.to_string(),
        });
    }
    Some(WorkspaceEdit {
        changes: Some(changes),
        ..Default::default()
    })
}

/// A file can mention the identity only if it is the defining module,
/// imports it, or the module is part of the implicit prelude.
fn can_reference(ast: &Ast, identity: &SymbolIdentity) -> bool {
    if ast.module_name() == identity.def_module {
        return true;
    }
    if ast
        .imports
        .iter()
        .any(|import| import.module_name.value == identity.def_module)
    {
        return true;
    }
    PRELUDE_MODULES.contains(&identity.def_module.as_str())
}

struct Hit {
    range: Range,
    is_declaration: bool,
}

struct Collector<'a> {
    identity: &'a SymbolIdentity,
    tracker: &'a ImportTracker,
    is_def_module: bool,
    owner_type: Option<&'a str>,
}

impl Collector<'_> {
    fn collect(&self, ast: &Ast, out: &mut Vec<Hit>) {
        self.collect_exposing(ast, out);
        for declaration in &ast.declarations {
            self.collect_declaration(declaration, out);
        }
    }

    fn collect_exposing(&self, ast: &Ast, out: &mut Vec<Hit>) {
        if self.is_def_module {
            if let ExposingList::Explicit(items) = &ast.header.exposing {
                for item in items {
                    if item.name == self.identity.name {
                        out.push(Hit {
                            range: exposed_name_range(item.range.start, &item.name),
                            is_declaration: false,
                        });
                    }
                }
            }
        }
        for import in &ast.imports {
            if import.module_name.value != self.identity.def_module {
                continue;
            }
            if let Some(ExposingList::Explicit(items)) = &import.exposing {
                for item in items {
                    if item.name == self.identity.name {
                        out.push(Hit {
                            range: exposed_name_range(item.range.start, &item.name),
                            is_declaration: false,
                        });
                    }
                }
            }
        }
    }

    fn collect_declaration(&self, declaration: &Declaration, out: &mut Vec<Hit>) {
        if self.is_def_module {
            self.collect_declaration_names(declaration, out);
        }
        if self.identity.kind == IdentityKind::Type {
            self.collect_declaration_annotations(declaration, out);
        }
        match declaration {
            Declaration::Function(func) => self.collect_function(func, out),
            Declaration::Destructuring(destructuring) => {
                self.collect_pattern(&destructuring.pattern, out);
                let mut locals = Vec::new();
                self.collect_expression(&destructuring.expression, &mut locals, out);
            }
            _ => {}
        }
    }

    fn collect_declaration_names(&self, declaration: &Declaration, out: &mut Vec<Hit>) {
        match (self.identity.kind, declaration) {
            (IdentityKind::Value, Declaration::Function(func)) => {
                if func.name.value == self.identity.name {
                    out.push(Hit {
                        range: func.name.range,
                        is_declaration: true,
                    });
                    if let Some(signature) = &func.signature {
                        out.push(Hit {
                            range: signature.name.range,
                            is_declaration: false,
                        });
                    }
                }
            }
            (IdentityKind::Value, Declaration::Port(port)) => {
                if port.signature.name.value == self.identity.name {
                    out.push(Hit {
                        range: port.signature.name.range,
                        is_declaration: true,
                    });
                }
            }
            (IdentityKind::Type, Declaration::TypeAlias(alias)) => {
                if alias.name.value == self.identity.name {
                    out.push(Hit {
                        range: alias.name.range,
                        is_declaration: true,
                    });
                }
            }
            (IdentityKind::Type, Declaration::CustomType(ty)) => {
                if ty.name.value == self.identity.name {
                    out.push(Hit {
                        range: ty.name.range,
                        is_declaration: true,
                    });
                }
            }
            (IdentityKind::Constructor, Declaration::CustomType(ty)) => {
                for ctor in &ty.constructors {
                    if ctor.name.value == self.identity.name {
                        out.push(Hit {
                            range: ctor.name.range,
                            is_declaration: true,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_declaration_annotations(&self, declaration: &Declaration, out: &mut Vec<Hit>) {
        match declaration {
            Declaration::Function(func) => {
                if let Some(signature) = &func.signature {
                    self.collect_annotation(&signature.type_annotation, out);
                }
            }
            Declaration::TypeAlias(alias) => {
                self.collect_annotation(&alias.type_annotation, out);
            }
            Declaration::CustomType(ty) => {
                for ctor in &ty.constructors {
                    for argument in &ctor.arguments {
                        self.collect_annotation(argument, out);
                    }
                }
            }
            Declaration::Port(port) => {
                self.collect_annotation(&port.signature.type_annotation, out);
            }
            _ => {}
        }
    }

    fn collect_function(&self, func: &FunctionDecl, out: &mut Vec<Hit>) {
        for argument in &func.arguments {
            self.collect_pattern(argument, out);
        }
        let mut locals: Vec<String> = func
            .arguments
            .iter()
            .flat_map(|argument| pattern_binders(argument))
            .map(|binder| binder.value)
            .collect();
        self.collect_expression(&func.expression, &mut locals, out);
    }

    fn collect_annotation(&self, annotation: &TypeAnnotation, out: &mut Vec<Hit>) {
        match &annotation.kind {
            TypeAnnotationKind::Typed {
                module_parts,
                name,
                args,
            } => {
                if name == &self.identity.name && self.type_gate(module_parts) {
                    out.push(Hit {
                        range: qualified_name_range(
                            annotation.range.start,
                            module_parts,
                            name,
                        ),
                        is_declaration: false,
                    });
                }
                for arg in args {
                    self.collect_annotation(arg, out);
                }
            }
            TypeAnnotationKind::Function { left, right } => {
                self.collect_annotation(left, out);
                self.collect_annotation(right, out);
            }
            TypeAnnotationKind::Tupled(items) => {
                for item in items {
                    self.collect_annotation(item, out);
                }
            }
            TypeAnnotationKind::Record(fields) => {
                for field in fields {
                    self.collect_annotation(&field.type_annotation, out);
                }
            }
            TypeAnnotationKind::GenericRecord { fields, .. } => {
                for field in fields {
                    self.collect_annotation(&field.type_annotation, out);
                }
            }
            TypeAnnotationKind::Generic(_) | TypeAnnotationKind::Unit => {}
        }
    }

    fn collect_pattern(&self, pattern: &Pattern, out: &mut Vec<Hit>) {
        if self.identity.kind != IdentityKind::Constructor {
            return;
        }
        match &pattern.kind {
            PatternKind::Named {
                module_parts,
                name,
                patterns,
            } => {
                if name == &self.identity.name && self.constructor_gate(module_parts) {
                    out.push(Hit {
                        range: qualified_name_range(pattern.range.start, module_parts, name),
                        is_declaration: false,
                    });
                }
                for sub in patterns {
                    self.collect_pattern(sub, out);
                }
            }
            PatternKind::Tuple(items) | PatternKind::List(items) => {
                for item in items {
                    self.collect_pattern(item, out);
                }
            }
            PatternKind::UnCons { head, tail } => {
                self.collect_pattern(head, out);
                self.collect_pattern(tail, out);
            }
            PatternKind::As { pattern, .. } | PatternKind::Parenthesized(pattern) => {
                self.collect_pattern(pattern, out);
            }
            _ => {}
        }
    }

    fn collect_expression(
        &self,
        expression: &Expression,
        locals: &mut Vec<String>,
        out: &mut Vec<Hit>,
    ) {
        match &expression.kind {
            ExpressionKind::FunctionOrValue { module_parts, name } => {
                if name != &self.identity.name {
                    return;
                }
                if module_parts.is_empty() {
                    let shadowed = self.identity.kind != IdentityKind::Constructor
                        && locals.iter().any(|local| local == name);
                    if !shadowed && self.unqualified_gate() {
                        out.push(Hit {
                            range: expression.range,
                            is_declaration: false,
                        });
                    }
                } else {
                    let qualifier = module_parts.join(".");
                    if self
                        .tracker
                        .resolve_qualifier(&qualifier)
                        .iter()
                        .any(|module| module == &self.identity.def_module)
                    {
                        out.push(Hit {
                            range: qualified_name_range(
                                expression.range.start,
                                module_parts,
                                name,
                            ),
                            is_declaration: false,
                        });
                    }
                }
            }
            ExpressionKind::Application(items) => {
                for item in items {
                    self.collect_expression(item, locals, out);
                }
            }
            ExpressionKind::OperatorApplication { left, right, .. } => {
                self.collect_expression(left, locals, out);
                self.collect_expression(right, locals, out);
            }
            ExpressionKind::IfBlock {
                condition,
                then_branch,
                else_branch,
            } => {
                self.collect_expression(condition, locals, out);
                self.collect_expression(then_branch, locals, out);
                self.collect_expression(else_branch, locals, out);
            }
            ExpressionKind::LetExpression {
                declarations,
                expression,
            } => {
                for declaration in declarations {
                    for binder in let_declaration_binders(declaration) {
                        locals.push(binder.value);
                    }
                }
                for declaration in declarations {
                    match declaration {
                        LetDeclaration::Function(func) => {
                            if self.identity.kind == IdentityKind::Type {
                                if let Some(signature) = &func.signature {
                                    self.collect_annotation(&signature.type_annotation, out);
                                }
                            }
                            for argument in &func.arguments {
                                self.collect_pattern(argument, out);
                            }
                            let mut inner = locals.clone();
                            inner.extend(
                                func.arguments
                                    .iter()
                                    .flat_map(|argument| pattern_binders(argument))
                                    .map(|binder| binder.value),
                            );
                            self.collect_expression(&func.expression, &mut inner, out);
                        }
                        LetDeclaration::Destructuring(destructuring) => {
                            self.collect_pattern(&destructuring.pattern, out);
                            self.collect_expression(&destructuring.expression, locals, out);
                        }
                    }
                }
                self.collect_expression(expression, locals, out);
            }
            ExpressionKind::CaseExpression {
                expression: scrutinee,
                cases,
            } => {
                self.collect_expression(scrutinee, locals, out);
                for case in cases {
                    self.collect_pattern(&case.pattern, out);
                    let mut inner = locals.clone();
                    inner.extend(
                        pattern_binders(&case.pattern)
                            .into_iter()
                            .map(|binder| binder.value),
                    );
                    self.collect_expression(&case.expression, &mut inner, out);
                }
            }
            ExpressionKind::Lambda {
                patterns,
                expression,
            } => {
                for pattern in patterns {
                    self.collect_pattern(pattern, out);
                }
                let mut inner = locals.clone();
                inner.extend(
                    patterns
                        .iter()
                        .flat_map(|pattern| pattern_binders(pattern))
                        .map(|binder| binder.value),
                );
                self.collect_expression(expression, &mut inner, out);
            }
            ExpressionKind::Parenthesized(inner) | ExpressionKind::Negation(inner) => {
                self.collect_expression(inner, locals, out);
            }
            ExpressionKind::Tupled(items) | ExpressionKind::ListExpr(items) => {
                for item in items {
                    self.collect_expression(item, locals, out);
                }
            }
            ExpressionKind::RecordAccess { expression, .. } => {
                self.collect_expression(expression, locals, out);
            }
            ExpressionKind::Record(setters) => {
                for setter in setters {
                    self.collect_expression(&setter.expression, locals, out);
                }
            }
            ExpressionKind::RecordUpdate { setters, .. } => {
                for setter in setters {
                    self.collect_expression(&setter.expression, locals, out);
                }
            }
            _ => {}
        }
    }

    fn type_gate(&self, module_parts: &[String]) -> bool {
        if module_parts.is_empty() {
            self.is_def_module
                || self
                    .tracker
                    .explicitly_exposed_from(&self.identity.name, &self.identity.def_module)
                || self.tracker.has_open_import_of(&self.identity.def_module)
        } else {
            let qualifier = module_parts.join(".");
            self.tracker
                .resolve_qualifier(&qualifier)
                .iter()
                .any(|module| module == &self.identity.def_module)
        }
    }

    fn unqualified_gate(&self) -> bool {
        if self.is_def_module
            || self
                .tracker
                .explicitly_exposed_from(&self.identity.name, &self.identity.def_module)
            || self.tracker.has_open_import_of(&self.identity.def_module)
        {
            return true;
        }
        self.identity.kind == IdentityKind::Constructor
            && self.owner_type.is_some_and(|owner| {
                self.tracker
                    .has_open_type_from(owner, &self.identity.def_module)
            })
    }

    fn constructor_gate(&self, module_parts: &[String]) -> bool {
        if module_parts.is_empty() {
            self.unqualified_gate()
        } else {
            let qualifier = module_parts.join(".");
            self.tracker
                .resolve_qualifier(&qualifier)
                .iter()
                .any(|module| module == &self.identity.def_module)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::backend::state::Documents;
    use crate::lsp::parse_service::ParseService;
    use crate::lsp::text::uri_to_path;
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
module Helpers exposing (add, multiply, greet)

add : Int -> Int -> Int
add a b =
    a + b

multiply : Int -> Int -> Int
multiply a b =
    a * b

greet : String -> String
greet name =
    \"Hello, \" ++ name
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

import Helpers as H exposing (add, greet)
import Types exposing (Msg(..), Model)

main : Model
main =
    { count = add 1 2, name = greet \"world\" }

double : Int -> Int
double n =
    H.multiply n 2

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

    fn write_workspace(dir: &Path) {
        fs::write(dir.join("elm.json"), ELM_JSON).expect("write elm.json");
        fs::create_dir_all(dir.join("src")).expect("mkdir src");
        fs::write(dir.join("src/Helpers.elm"), HELPERS).expect("write Helpers");
        fs::write(dir.join("src/Types.elm"), TYPES).expect("write Types");
        fs::write(dir.join("src/Main.elm"), MAIN).expect("write Main");
    }

    fn identity(def_module: &str, name: &str, kind: IdentityKind) -> SymbolIdentity {
        SymbolIdentity {
            def_module: def_module.into(),
            name: name.into(),
            kind,
        }
    }

    fn slice_at(location: &Location) -> String {
        let path = uri_to_path(&location.uri).expect("path");
        let text = fs::read_to_string(path).expect("read");
        let line = text
            .lines()
            .nth(location.range.start.line as usize)
            .expect("line");
        line.chars()
            .skip(location.range.start.character as usize)
            .take((location.range.end.character - location.range.start.character) as usize)
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn value_references_cover_exposings_declarations_and_uses() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_workspace(dir.path());
        let manifest = find_manifest_for(dir.path()).expect("manifest");
        let service = ParseService::default();
        let documents = Documents::default();
        let loader = ModuleLoader::new(Some(manifest), &service, &documents);

        let locations =
            find_references(&identity("Helpers", "add", IdentityKind::Value), &loader, true).await;
        // Helpers: exposing item, signature name, declaration name.
        // Main: import exposing item, two call sites.
        assert_eq!(locations.len(), 6);
        for location in &locations {
            assert_eq!(slice_at(location), "add", "every range covers the bare name");
        }

        let without_decl =
            find_references(&identity("Helpers", "add", IdentityKind::Value), &loader, false)
                .await;
        assert_eq!(without_decl.len(), 5, "declaration name node dropped");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn qualified_uses_are_trimmed_past_the_alias() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_workspace(dir.path());
        let manifest = find_manifest_for(dir.path()).expect("manifest");
        let service = ParseService::default();
        let documents = Documents::default();
        let loader = ModuleLoader::new(Some(manifest), &service, &documents);

        let locations = find_references(
            &identity("Helpers", "multiply", IdentityKind::Value),
            &loader,
            true,
        )
        .await;
        // Helpers: exposing item, signature, declaration. Main: `H.multiply`.
        assert_eq!(locations.len(), 4);
        for location in &locations {
            assert_eq!(slice_at(location), "multiply");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn constructor_references_reach_patterns_through_open_type_imports() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_workspace(dir.path());
        let manifest = find_manifest_for(dir.path()).expect("manifest");
        let service = ParseService::default();
        let documents = Documents::default();
        let loader = ModuleLoader::new(Some(manifest), &service, &documents);

        let locations = find_references(
            &identity("Types", "Increment", IdentityKind::Constructor),
            &loader,
            true,
        )
        .await;
        // Types: the constructor declaration. Main: the case pattern.
        assert_eq!(locations.len(), 2);
        let mut uris: Vec<String> = locations
            .iter()
            .map(|location| location.uri.to_string())
            .collect();
        uris.sort();
        assert!(uris[0].ends_with("Main.elm"));
        assert!(uris[1].ends_with("Types.elm"));
        for location in &locations {
            assert_eq!(slice_at(location), "Increment");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn type_references_traverse_signatures_and_exposings() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_workspace(dir.path());
        let manifest = find_manifest_for(dir.path()).expect("manifest");
        let service = ParseService::default();
        let documents = Documents::default();
        let loader = ModuleLoader::new(Some(manifest), &service, &documents);

        let locations =
            find_references(&identity("Types", "Model", IdentityKind::Type), &loader, true).await;
        // Types: exposing item, alias declaration.
        // Main: import exposing item, `main : Model`, two in `update`'s
        // signature.
        assert_eq!(locations.len(), 6);
        for location in &locations {
            assert_eq!(slice_at(location), "Model");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shadowed_names_are_not_references() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_workspace(dir.path());
        // `greet` is shadowed by a lambda parameter in Shadow.elm; the
        // lambda body use must not count.
        fs::write(
            dir.path().join("src/Shadow.elm"),
            "module Shadow exposing (run)\n\nimport Helpers exposing (greet)\n\nrun =\n    List.map (\\greet -> greet) []\n",
        )
        .expect("write Shadow");
        let manifest = find_manifest_for(dir.path()).expect("manifest");
        let service = ParseService::default();
        let documents = Documents::default();
        let loader = ModuleLoader::new(Some(manifest), &service, &documents);

        let locations =
            find_references(&identity("Helpers", "greet", IdentityKind::Value), &loader, true)
                .await;
        // Helpers: exposing, signature, declaration. Main: import item and
        // one use. Shadow: only the import item.
        assert_eq!(locations.len(), 6);
        let shadow_hits = locations
            .iter()
            .filter(|location| location.uri.to_string().ends_with("Shadow.elm"))
            .count();
        assert_eq!(shadow_hits, 1);
    }

    fn apply_edits(edit: &WorkspaceEdit) {
        let changes = edit.changes.as_ref().expect("changes");
        for (uri, edits) in changes {
            let path = uri_to_path(uri).expect("path");
            let mut text = fs::read_to_string(&path).expect("read");
            let mut sorted = edits.clone();
            sorted.sort_by(|a, b| {
                (b.range.start.line, b.range.start.character)
                    .cmp(&(a.range.start.line, a.range.start.character))
            });
            for edit in sorted {
                let mut lines: Vec<String> =
                    text.split('\n').map(|line| line.to_string()).collect();
                let line = &mut lines[edit.range.start.line as usize];
                let chars: Vec<char> = line.chars().collect();
                let start = edit.range.start.character as usize;
                let end = edit.range.end.character as usize;
                let mut updated: String = chars[..start].iter().collect();
                updated.push_str(&edit.new_text);
                updated.extend(chars[end..].iter());
                *line = updated;
                text = lines.join("\n");
            }
            fs::write(&path, text).expect("write");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rename_is_idempotent_over_the_reference_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_workspace(dir.path());
        let manifest = find_manifest_for(dir.path()).expect("manifest");
        let service = ParseService::default();
        let documents = Documents::default();

        let before = {
            let loader = ModuleLoader::new(Some(manifest.clone()), &service, &documents);
            let edit = rename_edits(
                &identity("Helpers", "add", IdentityKind::Value),
                &loader,
                "plus",
            )
            .await
            .expect("rename edit");
            let count: usize = edit
                .changes
                .as_ref()
                .expect("changes")
                .values()
                .map(|edits| edits.len())
                .sum();
            apply_edits(&edit);
            count
        };

        let loader = ModuleLoader::new(Some(manifest), &service, &documents);
        let after = find_references(
            &identity("Helpers", "plus", IdentityKind::Value),
            &loader,
            true,
        )
        .await;
        assert_eq!(after.len(), before);
        for location in &after {
            assert_eq!(slice_at(location), "plus");
        }
    }
}
