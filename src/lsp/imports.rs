use crate::language::ast::{Ast, ExposedKind, ExposingList};
use std::collections::HashMap;

/// The modules every file can reach without writing an `import`.
pub const PRELUDE_MODULES: &[&str] = &[
    "Basics",
    "List",
    "Maybe",
    "Result",
    "String",
    "Char",
    "Tuple",
    "Debug",
    "Platform",
    "Platform.Cmd",
    "Platform.Sub",
];

/// What a file's imports (plus the implicit prelude) make visible, and
/// under which names.
#[derive(Debug, Clone)]
pub struct ImportTracker {
    /// Bare name to the modules that explicitly expose it to this file.
    pub explicit_exposing: HashMap<String, Vec<String>>,
    /// Modules imported with `exposing (..)`.
    pub unknown_imports: Vec<String>,
    /// Alias to the real modules it denotes.
    pub alias_mapping: HashMap<String, Vec<String>>,
    /// Type name exposed as `T(..)` to the modules providing it; the
    /// type's constructors arrive unqualified through these.
    pub open_type_imports: HashMap<String, Vec<String>>,
}

impl ImportTracker {
    pub fn new(ast: &Ast) -> Self {
        let mut tracker = Self::prelude();
        for import in &ast.imports {
            let module = import.module_name.value.clone();
            if let Some(alias) = &import.alias {
                push_unique(
                    tracker.alias_mapping.entry(alias.value.clone()).or_default(),
                    &module,
                );
            }
            match &import.exposing {
                Some(ExposingList::All(_)) => {
                    push_unique(&mut tracker.unknown_imports, &module);
                }
                Some(ExposingList::Explicit(items)) => {
                    for item in items {
                        push_unique(
                            tracker
                                .explicit_exposing
                                .entry(item.name.clone())
                                .or_default(),
                            &module,
                        );
                        if let ExposedKind::Type { open: Some(_) } = item.kind {
                            push_unique(
                                tracker
                                    .open_type_imports
                                    .entry(item.name.clone())
                                    .or_default(),
                                &module,
                            );
                        }
                    }
                }
                None => {}
            }
        }
        tracker
    }

    fn prelude() -> Self {
        let mut explicit_exposing: HashMap<String, Vec<String>> = HashMap::new();
        let seeded = [
            ("List", "List"),
            ("::", "List"),
            ("Maybe", "Maybe"),
            ("Just", "Maybe"),
            ("Nothing", "Maybe"),
            ("Result", "Result"),
            ("Ok", "Result"),
            ("Err", "Result"),
            ("String", "String"),
            ("Char", "Char"),
            ("Program", "Platform"),
            ("Cmd", "Platform.Cmd"),
            ("Sub", "Platform.Sub"),
        ];
        for (name, module) in seeded {
            explicit_exposing
                .entry(name.to_string())
                .or_default()
                .push(module.to_string());
        }
        let mut alias_mapping: HashMap<String, Vec<String>> = HashMap::new();
        alias_mapping.insert("Cmd".to_string(), vec!["Platform.Cmd".to_string()]);
        alias_mapping.insert("Sub".to_string(), vec!["Platform.Sub".to_string()]);
        Self {
            explicit_exposing,
            unknown_imports: vec!["Basics".to_string()],
            alias_mapping,
            open_type_imports: HashMap::new(),
        }
    }

    /// The real modules a written qualifier may stand for.
    pub fn resolve_qualifier(&self, qualifier: &str) -> Vec<String> {
        match self.alias_mapping.get(qualifier) {
            Some(modules) => modules.clone(),
            None => vec![qualifier.to_string()],
        }
    }

    pub fn explicitly_exposed_from(&self, name: &str, module: &str) -> bool {
        self.explicit_exposing
            .get(name)
            .is_some_and(|modules| modules.iter().any(|m| m == module))
    }

    pub fn has_open_import_of(&self, module: &str) -> bool {
        self.unknown_imports.iter().any(|m| m == module)
    }

    /// Whether the constructors of `type_name` arrive unqualified from
    /// `module` through a `T(..)` exposing item.
    pub fn has_open_type_from(&self, type_name: &str, module: &str) -> bool {
        self.open_type_imports
            .get(type_name)
            .is_some_and(|modules| modules.iter().any(|m| m == module))
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}
